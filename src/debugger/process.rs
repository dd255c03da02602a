//! Debugger child process.
//!
//! [`DebugProcess`] runs on its own thread: it spawns gdb, feeds it commands from the
//! [`CommandQueue`], buffers output until a complete response (ending with a `prompt`
//! annotation) arrives, parses it and hands the result to the session owner.
//! Parse results and console lines are delivered synchronously: the thread waits until
//! the receiver acknowledges the event before it sends the next command.

use crate::debugger::annotation::{last_annotation, Annotation};
use crate::debugger::command::{Command, TextEncoding};
use crate::debugger::dispatcher::{OutputDispatcher, ParseFlags};
use crate::debugger::error::Error;
use crate::debugger::queue::{CommandQueue, WatchUpdate};
use crate::debugger::store::ResultStores;
use crate::{muted_error, weak_error};
use log::{debug, info, trace, warn};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use os_pipe::PipeReader;
use std::io::{self, Read, Write};
use std::path::PathBuf;
use std::process::{Child, ChildStdin, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, SyncSender};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use timeout_readwrite::TimeoutReader;

/// Fixed debugger arguments.
pub const DEBUGGER_ARGS: [&str; 2] = ["--annotate=2", "--silent"];
const READ_CHUNK: usize = 4096;
/// Poll intervals to wait for the debugger exit after SIGTERM.
const TERMINATE_POLLS: u32 = 20;

/// Events delivered from the session thread to the session owner.
#[derive(Debug)]
pub enum SessionEvent {
    /// A complete response was parsed. The session thread is blocked until `ack` fires.
    ParseFinished {
        flags: ParseFlags,
        /// Raw response text, annotations included.
        output: String,
        /// Command that produced the response.
        command: Option<Command>,
        ack: SyncSender<()>,
    },
    /// A command line was sent and must be shown in the console.
    /// The session thread is blocked until `ack` fires.
    ConsoleLine { line: String, ack: SyncSender<()> },
    /// Command was not written into debugger stdin, it is dropped.
    WriteFailed { command: Command, reason: String },
    ProcessError(String),
    WatchUpdate(WatchUpdate),
    /// Debugger process is gone, this is the last event of a session.
    Finished { exit_code: Option<i32> },
}

/// Session process settings.
#[derive(Clone, Debug)]
pub struct ProcessConfig {
    pub debugger: PathBuf,
    pub encoding: TextEncoding,
    pub poll_interval: Duration,
    pub show_command_log: bool,
    pub asm_header_offset: usize,
}

pub fn lock_stores(stores: &Mutex<ResultStores>) -> MutexGuard<'_, ResultStores> {
    stores.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct DebugProcess {
    config: ProcessConfig,
    queue: Arc<CommandQueue>,
    stores: Arc<Mutex<ResultStores>>,
    stop: Arc<AtomicBool>,
    events: Sender<SessionEvent>,
}

impl DebugProcess {
    pub fn new(
        config: ProcessConfig,
        queue: Arc<CommandQueue>,
        stores: Arc<Mutex<ResultStores>>,
        stop: Arc<AtomicBool>,
        events: Sender<SessionEvent>,
    ) -> Self {
        Self {
            config,
            queue,
            stores,
            stop,
            events,
        }
    }

    /// Run the session on a new thread.
    ///
    /// # Arguments
    ///
    /// * `started`: one-shot channel, receives the spawn result
    pub fn start(self, started: SyncSender<Result<(), Error>>) -> JoinHandle<()> {
        thread::spawn(move || self.run(started))
    }

    fn spawn_child(&self) -> Result<(Child, PipeReader), Error> {
        let (reader, writer) = os_pipe::pipe()?;

        let child = {
            let mut cmd = std::process::Command::new(&self.config.debugger);
            cmd.args(DEBUGGER_ARGS)
                .stdin(Stdio::piped())
                .stdout(writer.try_clone()?)
                .stderr(writer);
            if let Some(dir) = self
                .config
                .debugger
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
            {
                cmd.current_dir(dir);
            }
            // command must be dropped here, it owns the write ends of the pipe
            cmd.spawn().map_err(Error::Spawn)?
        };

        debug!(
            target: "debugger",
            "debugger {:?} started, pid {}",
            self.config.debugger,
            child.id()
        );
        Ok((child, reader))
    }

    fn run(self, started: SyncSender<Result<(), Error>>) {
        let (mut child, reader) = match self.spawn_child() {
            Ok(spawned) => spawned,
            Err(e) => {
                warn!(target: "debugger", "spawn debugger: {e:#}");
                _ = started.send(Err(e));
                return;
            }
        };
        _ = started.send(Ok(()));

        let mut stdin = child.stdin.take();
        let mut reader = TimeoutReader::new(reader, self.config.poll_interval);
        let mut dispatcher = OutputDispatcher::new(self.config.encoding)
            .with_asm_header_offset(self.config.asm_header_offset);
        let mut buffer: Vec<u8> = vec![];
        let mut chunk = [0u8; READ_CHUNK];
        let mut eof = false;

        let exit_code = loop {
            if self.stop.load(Ordering::SeqCst) {
                stdin = None;
                break Self::terminate(&mut child, self.config.poll_interval);
            }

            match child.try_wait() {
                Ok(Some(status)) => break status.code(),
                Ok(None) => {}
                Err(e) => {
                    self.send(SessionEvent::ProcessError(e.to_string()));
                    break Self::terminate(&mut child, self.config.poll_interval);
                }
            }

            let read = if eof {
                thread::sleep(self.config.poll_interval);
                0
            } else {
                match reader.read(&mut chunk) {
                    Ok(0) => {
                        eof = true;
                        0
                    }
                    Ok(n) => {
                        buffer.extend_from_slice(&chunk[..n]);
                        n
                    }
                    Err(e) if e.kind() == io::ErrorKind::TimedOut => 0,
                    Err(e) => {
                        self.send(SessionEvent::ProcessError(e.to_string()));
                        break Self::terminate(&mut child, self.config.poll_interval);
                    }
                }
            };

            if read > 0 && last_annotation(&buffer) == Annotation::Prompt {
                self.dispatch_response(&mut dispatcher, &buffer);
                buffer.clear();
                self.run_next(&mut stdin);
            } else if read == 0 && !eof && !self.queue.is_in_flight() {
                self.run_next(&mut stdin);
            }
        };
        drop(stdin);

        info!(target: "debugger", "debugger process exit with code {exit_code:?}");
        self.send(SessionEvent::Finished { exit_code });
    }

    fn dispatch_response(&self, dispatcher: &mut OutputDispatcher, buffer: &[u8]) {
        let command = self.queue.current();
        trace!(target: "debugger", "response of {} bytes", buffer.len());

        let flags = {
            let mut stores = lock_stores(&self.stores);
            dispatcher.parse(buffer, command.as_ref(), &mut stores)
        };

        let output = self.config.encoding.decode(buffer);
        self.notify(|ack| SessionEvent::ParseFinished {
            flags,
            output,
            command,
            ack,
        });
        self.queue.complete();
    }

    /// Send the next queued command if nothing is in flight.
    fn run_next(&self, stdin: &mut Option<ChildStdin>) {
        let Some(cmd) = self.queue.dequeue_next() else {
            return;
        };

        let bytes = cmd.to_bytes(self.config.encoding);
        let written = match stdin.as_mut() {
            Some(stdin) => stdin.write_all(&bytes).and_then(|_| stdin.flush()),
            None => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "debugger stdin closed",
            )),
        };

        if let Err(e) = written {
            warn!(target: "debugger", "write command `{}`: {e}", cmd.text());
            self.queue.abort_current();
            self.send(SessionEvent::WriteFailed {
                command: cmd,
                reason: e.to_string(),
            });
            return;
        }
        debug!(target: "debugger", "command sent: {}", cmd.text());

        if self.config.show_command_log || cmd.echo {
            let line = format!("(gdb) {}", cmd.text());
            self.notify(|ack| SessionEvent::ConsoleLine { line, ack });
        }
    }

    fn send(&self, event: SessionEvent) {
        // receiver is gone only when the session owner is dropped
        _ = self.events.send(event);
    }

    /// Send an event and wait until the receiver handles it.
    fn notify(&self, event: impl FnOnce(SyncSender<()>) -> SessionEvent) {
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if self.events.send(event(ack_tx)).is_err() {
            return;
        }
        self.wait_ack(ack_rx);
    }

    fn wait_ack(&self, ack: Receiver<()>) {
        loop {
            match ack.recv_timeout(self.config.poll_interval) {
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
                Err(RecvTimeoutError::Timeout) => {
                    if self.stop.load(Ordering::SeqCst) {
                        return;
                    }
                }
            }
        }
    }

    /// Ask the debugger to exit with SIGTERM, kill it if it is still alive after
    /// [`TERMINATE_POLLS`] poll intervals.
    fn terminate(child: &mut Child, poll_interval: Duration) -> Option<i32> {
        let pid = Pid::from_raw(child.id() as i32);
        if weak_error!(signal::kill(pid, Signal::SIGTERM), "terminate debugger:").is_some() {
            for _ in 0..TERMINATE_POLLS {
                match child.try_wait() {
                    Ok(Some(status)) => return status.code(),
                    Ok(None) => thread::sleep(poll_interval),
                    Err(e) => {
                        warn!(target: "debugger", "wait debugger exit: {e}");
                        break;
                    }
                }
            }
            warn!(target: "debugger", "debugger ignores SIGTERM, kill it");
        }

        // fails when the process is gone already
        muted_error!(child.kill(), "kill debugger:");
        weak_error!(child.wait(), "wait debugger exit:").and_then(|status| status.code())
    }
}
