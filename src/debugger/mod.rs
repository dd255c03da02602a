pub mod annotation;
pub mod breakpoint;
pub mod command;
pub mod dispatcher;
pub mod error;
pub mod output;
pub mod process;
pub mod queue;
pub mod store;
pub mod watch;

pub use error::Error;

use crate::debugger::breakpoint::{Breakpoint, BreakpointStore};
use crate::debugger::command::{Command, CommandOrigin, TextEncoding};
use crate::debugger::dispatcher::{ParseFlags, DEFAULT_ASM_HEADER_OFFSET};
use crate::debugger::output::console_lines;
use crate::debugger::process::{lock_stores, DebugProcess, ProcessConfig, SessionEvent};
use crate::debugger::queue::{CommandQueue, WatchUpdate, WatchUpdateHook};
use crate::debugger::store::{
    Disassembly, Register, ResultStores, SourcePosition, StackFrame,
};
use crate::debugger::watch::{WatchId, WatchList};
use log::{debug, error, info};
use regex::Regex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

/// Session settings source.
pub trait ConfigProvider {
    /// Debugger executable, `None` if not configured.
    fn debugger_path(&self) -> Option<PathBuf>;

    fn encoding(&self) -> TextEncoding {
        TextEncoding::default()
    }

    /// Echo every command and response into the console.
    fn show_command_log(&self) -> bool {
        false
    }

    /// Show raw annotations in the console.
    fn show_annotations(&self) -> bool {
        false
    }

    fn start_timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    fn poll_interval(&self) -> Duration {
        Duration::from_millis(100)
    }

    fn asm_header_offset(&self) -> usize {
        DEFAULT_ASM_HEADER_OFFSET
    }
}

/// Receiver of session results. Called on the thread that owns the [`Debugger`].
#[allow(unused_variables)]
pub trait SessionHook {
    /// New console line (command echo or response text).
    fn on_debug_output(&self, line: &str) {}

    fn on_eval_ready(&self, value: &str) {}

    fn on_backtrace(&self, frames: &[StackFrame]) {}

    fn on_registers(&self, registers: &[Register]) {}

    fn on_disassembly(&self, disassembly: &Disassembly) {}

    fn on_locals(&self, locals: &[String]) {}

    fn on_arguments(&self, arguments: &[String]) {}

    fn on_watches(&self, watches: &WatchList) {}

    /// Debugee stopped at a new place.
    ///
    /// # Arguments
    ///
    /// * `position`: source file and line
    /// * `focus`: whether an editor should move focus to the position
    fn on_execution_position(&self, position: &SourcePosition, focus: bool) {}

    fn on_signal(&self, signal: &str) {}

    fn on_write_failed(&self, command: &Command, reason: &str) {}

    fn on_process_error(&self, reason: &str) {}

    fn on_watch_update(&self, update: WatchUpdate) {}

    /// Sources are newer than the debugee. Return `true` to stop the session and rebuild.
    fn on_stale_source(&self) -> bool {
        false
    }

    fn on_rebuild_requested(&self) {}

    /// Breakpoint decorations must be reset, debugger numbers are gone.
    fn on_breakpoint_marks_reset(&self) {}

    fn on_session_finished(&self, exit_code: Option<i32>) {}

    /// Whether the CPU view (registers and disassembly) is shown and needs updates.
    fn cpu_view_visible(&self) -> bool {
        false
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
}

/// Forwards queue notifications into the session event channel.
struct WatchUpdateForwarder(Mutex<Sender<SessionEvent>>);

impl WatchUpdateHook for WatchUpdateForwarder {
    fn on_watch_update(&self, update: WatchUpdate) {
        let tx = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        _ = tx.send(SessionEvent::WatchUpdate(update));
    }
}

struct Session {
    queue: Arc<CommandQueue>,
    stop: Arc<AtomicBool>,
    events: Receiver<SessionEvent>,
    thread: Option<JoinHandle<()>>,
}

impl Session {
    fn request_stop(&self) {
        self.queue.clear();
        self.stop.store(true, Ordering::SeqCst);
    }

    fn join(&mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!(target: "debugger", "session thread panicked");
            }
        }
    }
}

fn breakpoint_number_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Breakpoint (\d+) at").expect("must compile"))
}

/// Debugger session facade.
///
/// Owns breakpoints and watch expressions across sessions, starts and stops the debugger
/// process and turns parsed responses into [`SessionHook`] calls. Session events are
/// handled only inside [`Debugger::process_events`] and [`Debugger::wait_event`].
pub struct Debugger<C: ConfigProvider, H: SessionHook> {
    config: C,
    hook: H,
    state: SessionState,
    breakpoints: BreakpointStore,
    stores: Arc<Mutex<ResultStores>>,
    session: Option<Session>,
}

impl<C: ConfigProvider, H: SessionHook> Debugger<C, H> {
    pub fn new(config: C, hook: H) -> Self {
        Self {
            config,
            hook,
            state: SessionState::Idle,
            breakpoints: BreakpointStore::default(),
            stores: Arc::default(),
            session: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        self.state == SessionState::Running
    }

    pub fn hook(&self) -> &H {
        &self.hook
    }

    pub fn breakpoints(&self) -> &BreakpointStore {
        &self.breakpoints
    }

    /// Read access to parse results. Do not hold the guard across event processing.
    pub fn stores(&self) -> MutexGuard<'_, ResultStores> {
        lock_stores(&self.stores)
    }

    /// Start a debugger session, block until the debugger process is spawned.
    /// Breakpoints and watches are replayed into the new session.
    pub fn start(&mut self) -> Result<(), Error> {
        if self.state != SessionState::Idle {
            return Err(Error::AlreadyRun);
        }

        let debugger = self
            .config
            .debugger_path()
            .ok_or(Error::NoDebuggerConfigured)?;
        if !debugger.exists() {
            return Err(Error::DebuggerNotFound(debugger));
        }

        self.state = SessionState::Starting;
        lock_stores(&self.stores).reset();
        self.breakpoints.reset_handles();

        let (events_tx, events_rx) = mpsc::channel();
        let forwarder = WatchUpdateForwarder(Mutex::new(events_tx.clone()));
        let queue = Arc::new(CommandQueue::new(Arc::new(forwarder)));
        let stop = Arc::new(AtomicBool::new(false));

        let process = DebugProcess::new(
            ProcessConfig {
                debugger,
                encoding: self.config.encoding(),
                poll_interval: self.config.poll_interval(),
                show_command_log: self.config.show_command_log(),
                asm_header_offset: self.config.asm_header_offset(),
            },
            queue.clone(),
            self.stores.clone(),
            stop.clone(),
            events_tx,
        );

        let (started_tx, started_rx) = mpsc::sync_channel(1);
        let thread = process.start(started_tx);

        let timeout = self.config.start_timeout();
        let started = match started_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                // thread is detached, it exits on the stop flag
                stop.store(true, Ordering::SeqCst);
                Err(Error::StartTimeout(timeout.as_millis() as u64))
            }
            Err(RecvTimeoutError::Disconnected) => Err(Error::StartAborted),
        };
        if let Err(e) = started {
            if !matches!(e, Error::StartTimeout(_)) {
                _ = thread.join();
            }
            self.state = SessionState::Idle;
            return Err(e);
        }

        self.session = Some(Session {
            queue,
            stop,
            events: events_rx,
            thread: Some(thread),
        });
        self.state = SessionState::Running;
        info!(target: "debugger", "debugger session started");

        self.replay();
        Ok(())
    }

    /// Send stored breakpoints and watches into a fresh session.
    fn replay(&self) {
        for brkpt in self.breakpoints.iter() {
            self.send_command(Command::new("break", brkpt.break_args()).with_update_watch(false));
        }

        let expressions: Vec<String> = lock_stores(&self.stores)
            .watches
            .iter_roots()
            .map(|(_, var)| var.expression.clone())
            .collect();
        for expression in expressions {
            self.send_command(Command::new("display", expression).with_update_watch(false));
        }
    }

    /// Ask the debugger process to terminate. The session is torn down when the process is gone.
    pub fn stop(&mut self) {
        if self.state != SessionState::Running {
            return;
        }
        if let Some(session) = &self.session {
            session.request_stop();
        }
        self.state = SessionState::Stopping;
        debug!(target: "debugger", "debugger session stopping");
    }

    /// Enqueue a command. Does nothing unless the session is running.
    pub fn send_command(&self, cmd: Command) {
        match (&self.session, self.state) {
            (Some(session), SessionState::Running) => session.queue.enqueue(cmd),
            _ => debug!(target: "debugger", "no session, command `{}` dropped", cmd.text()),
        }
    }

    pub fn send(&self, verb: &str, args: &str) {
        self.send_command(Command::new(verb, args));
    }

    /// Request backtrace, locals and arguments of the current frame.
    pub fn update_debug_info(&self) {
        for verb in ["backtrace", "info locals", "info args"] {
            self.send_command(Command::new(verb, "").with_update_watch(false));
        }
    }

    /// Evaluate an expression, the result comes through [`SessionHook::on_eval_ready`].
    pub fn evaluate(&self, expression: &str) {
        self.send_command(Command::new("print", expression).with_update_watch(false));
    }

    // --------------------------------- breakpoints ----------------------------------------------

    /// Add a breakpoint, returns its index in the store.
    pub fn add_breakpoint(&mut self, file: impl Into<PathBuf>, line: u32) -> Result<usize, Error> {
        let brkpt = Breakpoint::new(file, line)?;
        let cmd = Command::new("break", brkpt.break_args()).with_update_watch(false);
        let index = self.breakpoints.add(brkpt);
        self.send_command(cmd);
        Ok(index)
    }

    /// Remove every breakpoint at a location, the debugger clears them with one command.
    pub fn remove_breakpoint(&mut self, file: &Path, line: u32) -> Vec<Breakpoint> {
        let removed = self.breakpoints.remove(file, line);
        if let Some(brkpt) = removed.first() {
            self.send_clear(brkpt);
        }
        removed
    }

    pub fn remove_breakpoint_at(&mut self, index: usize) -> Result<Breakpoint, Error> {
        let brkpt = self.breakpoints.remove_at(index)?;
        self.send_clear(&brkpt);
        Ok(brkpt)
    }

    fn send_clear(&self, brkpt: &Breakpoint) {
        self.send_command(Command::new("clear", brkpt.location()).with_update_watch(false));
    }

    /// Forget every breakpoint of a file, the debugger is not notified.
    pub fn delete_breakpoints(&mut self, file: &Path) -> Vec<Breakpoint> {
        self.breakpoints.remove_file(file)
    }

    /// Remove breakpoints at duplicated locations, return removed count.
    pub fn dedup_breakpoints(&mut self) -> usize {
        self.breakpoints.dedup()
    }

    pub fn set_breakpoint_condition(
        &mut self,
        index: usize,
        condition: Option<String>,
    ) -> Result<(), Error> {
        let args = self.breakpoints.set_condition(index, condition)?.cond_args();
        self.send_command(Command::new("cond", args).with_update_watch(false));
        Ok(())
    }

    // --------------------------------- watches --------------------------------------------------

    /// Watch an expression. Returns `None` if it is watched already.
    pub fn add_watch(&mut self, expression: &str) -> Option<WatchId> {
        let id = lock_stores(&self.stores).watches.add(expression)?;
        self.send_command(Command::new("display", expression).with_update_watch(false));
        Some(id)
    }

    pub fn remove_watch(&mut self, expression: &str) -> bool {
        let handle = {
            let mut stores = lock_stores(&self.stores);
            let Some(id) = stores.watches.find(expression) else {
                return false;
            };
            stores.watches.remove(id).and_then(|var| var.handle)
        };

        if let Some(handle) = handle {
            self.send_command(
                Command::new("undisplay", handle.to_string()).with_update_watch(false),
            );
        }
        true
    }

    pub fn rename_watch(&mut self, old: &str, new: &str) -> bool {
        let handle = {
            let mut stores = lock_stores(&self.stores);
            if stores.watches.find(new).is_some() {
                return false;
            }
            let Some(id) = stores.watches.find(old) else {
                return false;
            };
            let handle = stores.watches.get(id).and_then(|var| var.handle);
            stores.watches.rename(id, new);
            handle
        };

        if let Some(handle) = handle {
            self.send_command(
                Command::new("undisplay", handle.to_string()).with_update_watch(false),
            );
        }
        self.send_command(Command::new("display", new).with_update_watch(false));
        true
    }

    /// Ask the debugger to print all displays again.
    pub fn refresh_watches(&self) {
        self.send_command(Command::new("display", "").with_update_watch(false));
    }

    pub fn clear_watches(&mut self) {
        let handles: Vec<u32> = {
            let mut stores = lock_stores(&self.stores);
            let handles = stores
                .watches
                .iter_roots()
                .filter_map(|(_, var)| var.handle)
                .collect();
            stores.watches.clear();
            handles
        };

        for handle in handles {
            self.send_command(
                Command::new("undisplay", handle.to_string()).with_update_watch(false),
            );
        }
    }

    /// Forget debugger handles and values of all watches.
    pub fn invalidate_watches(&mut self) {
        lock_stores(&self.stores).watches.invalidate_all();
    }

    // --------------------------------- session events -------------------------------------------

    /// Handle all pending session events without blocking. Return the number of handled events.
    pub fn process_events(&mut self) -> usize {
        let mut handled = 0;
        while let Some(event) = self.try_next_event() {
            self.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Wait for one session event and handle it. Return `false` if nothing arrived in time.
    pub fn wait_event(&mut self, timeout: Duration) -> bool {
        let Some(session) = &self.session else {
            return false;
        };

        let event = match session.events.recv_timeout(timeout) {
            Ok(event) => event,
            Err(RecvTimeoutError::Timeout) => match self.try_next_event() {
                Some(event) => event,
                None => return false,
            },
            Err(RecvTimeoutError::Disconnected) => SessionEvent::Finished { exit_code: None },
        };
        self.handle_event(event);
        true
    }

    fn try_next_event(&self) -> Option<SessionEvent> {
        let session = self.session.as_ref()?;
        match session.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Disconnected) => Some(SessionEvent::Finished { exit_code: None }),
            Err(TryRecvError::Empty) => {
                // a thread that died without a final event still ends the session
                let dead = session
                    .thread
                    .as_ref()
                    .map(|t| t.is_finished())
                    .unwrap_or(true);
                dead.then_some(SessionEvent::Finished { exit_code: None })
            }
        }
    }

    fn handle_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ParseFinished {
                flags,
                output,
                command,
                ack,
            } => {
                self.on_parse_finished(flags, &output, command.as_ref());
                _ = ack.send(());
            }
            SessionEvent::ConsoleLine { line, ack } => {
                self.hook.on_debug_output(&line);
                _ = ack.send(());
            }
            SessionEvent::WriteFailed { command, reason } => {
                self.hook.on_write_failed(&command, &reason)
            }
            SessionEvent::ProcessError(reason) => {
                error!(target: "debugger", "debugger process error: {reason}");
                self.hook.on_process_error(&reason);
            }
            SessionEvent::WatchUpdate(update) => self.hook.on_watch_update(update),
            SessionEvent::Finished { exit_code } => self.teardown(exit_code),
        }
    }

    fn on_parse_finished(&mut self, flags: ParseFlags, output: &str, command: Option<&Command>) {
        if let Some(cmd) = command.filter(|cmd| cmd.verb == "break") {
            self.learn_breakpoint_number(cmd, output);
        }

        if flags.stale_source_warning && self.hook.on_stale_source() {
            self.stop();
            self.hook.on_rebuild_requested();
            return;
        }

        if flags.process_exited {
            self.stop();
            return;
        }

        let echo = command.map(|cmd| cmd.echo).unwrap_or_default();
        let focus = command
            .map(|cmd| cmd.origin != CommandOrigin::Console)
            .unwrap_or(true);
        let is_display = command.map(|cmd| cmd.verb == "display").unwrap_or_default();

        let execution_moved = {
            let stores = lock_stores(&self.stores);

            if flags.eval_ready {
                self.hook.on_eval_ready(&stores.eval_value);
            }

            if self.config.show_command_log() || echo {
                for line in console_lines(output, self.config.show_annotations()) {
                    self.hook.on_debug_output(&line);
                }
            }

            if flags.backtrace_ready {
                self.hook.on_backtrace(&stores.frames);
            }
            if flags.registers_ready {
                self.hook.on_registers(&stores.registers);
            }
            if flags.disassembly_ready {
                self.hook.on_disassembly(&stores.disassembly);
            }
            if flags.locals_ready {
                self.hook.on_locals(&stores.locals);
            }
            if flags.arguments_ready {
                self.hook.on_arguments(&stores.arguments);
            }
            if flags.rescan_watches || is_display {
                self.hook.on_watches(&stores.watches);
            }

            match (&stores.execution_position, flags.update_execution) {
                (Some(position), true) => {
                    self.hook.on_execution_position(position, focus);
                    true
                }
                _ => false,
            }
        };

        if execution_moved {
            self.refresh_watches();
        }

        if flags.received_signal {
            if let Some(signal) = lock_stores(&self.stores).signal.as_deref() {
                self.hook.on_signal(signal);
            }
        }

        if flags.update_cpu_window && !flags.received_signal && self.hook.cpu_view_visible() {
            self.send_command(Command::new("disas", "").with_update_watch(false));
            self.send_command(Command::new("info registers", "").with_update_watch(false));
        }
    }

    fn learn_breakpoint_number(&mut self, cmd: &Command, output: &str) {
        let Some(number) = breakpoint_number_re()
            .captures(output)
            .and_then(|caps| caps[1].parse::<u32>().ok())
        else {
            return;
        };

        let location = self
            .breakpoints
            .iter()
            .find(|b| b.handle.is_none() && b.break_args() == cmd.args)
            .map(|b| (b.file.clone(), b.line));
        if let Some((file, line)) = location {
            self.breakpoints.set_handle(&file, line, number);
        }
    }

    fn teardown(&mut self, exit_code: Option<i32>) {
        if let Some(mut session) = self.session.take() {
            session.join();
        }
        self.state = SessionState::Idle;

        {
            let mut stores = lock_stores(&self.stores);
            stores.frames.clear();
            stores.watches.invalidate_all();
        }
        self.breakpoints.reset_handles();
        self.hook.on_breakpoint_marks_reset();

        info!(target: "debugger", "debugger session finished, exit code {exit_code:?}");
        self.hook.on_session_finished(exit_code);
    }
}

impl<C: ConfigProvider, H: SessionHook> Drop for Debugger<C, H> {
    fn drop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.request_stop();
            session.join();
        }
    }
}
