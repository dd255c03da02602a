use crate::config::SessionConfig;
use crate::debugger::command::{Command, CommandOrigin};
use crate::debugger::{Debugger, SessionState};
use crate::ui::console::hook::TerminalHook;
use crate::ui::console::print::style;
use crate::ui::console::print::ExternalPrinter;
use anyhow::Context;
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, RecvTimeoutError, SyncSender};
use std::sync::{mpsc, Once};
use std::thread;
use std::time::Duration;

pub mod hook;
pub mod print;

const WELCOME_TEXT: &str = r#"
gdbs: annotated gdb session, `q` to quit
"#;
const PROMT: &str = "(gdbs) ";
const EVENT_POLL: Duration = Duration::from_millis(50);
const SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(5);

type SessionDebugger = Debugger<SessionConfig, TerminalHook>;

enum Control {
    /// New command from user received
    Cmd(String),
    /// Terminate application
    Terminate,
}

pub struct TerminalApplication {
    debugger: SessionDebugger,
    editor: DefaultEditor,
    program: Option<PathBuf>,
    control_tx: SyncSender<Control>,
    control_rx: Receiver<Control>,
}

pub static LOGGER_ONCE: Once = Once::new();

impl TerminalApplication {
    pub fn new(config: SessionConfig, program: Option<PathBuf>) -> anyhow::Result<Self> {
        let (control_tx, control_rx) = mpsc::sync_channel::<Control>(0);
        let mut editor = DefaultEditor::new()?;
        let hook = TerminalHook::new(ExternalPrinter::new(&mut editor)?);

        Ok(Self {
            debugger: Debugger::new(config, hook),
            editor,
            program,
            control_tx,
            control_rx,
        })
    }

    pub fn run(self) -> anyhow::Result<()> {
        LOGGER_ONCE.call_once(|| {
            env_logger::init();
        });

        let TerminalApplication {
            mut debugger,
            mut editor,
            program,
            control_tx,
            control_rx,
        } = self;

        debugger.start().context("start debugger session")?;
        if let Some(program) = program {
            let path = program.to_string_lossy().replace('\\', "/");
            debugger.send_command(Command::new("file", format!("\"{path}\"")).with_echo(true));
        }

        thread::spawn(move || {
            println!("{WELCOME_TEXT}");

            loop {
                match editor.readline(PROMT) {
                    Ok(input) => {
                        if input == "q" || input == "quit" {
                            _ = control_tx.send(Control::Terminate);
                            break;
                        }
                        _ = editor.add_history_entry(&input);
                        _ = control_tx.send(Control::Cmd(input));
                    }
                    Err(ReadlineError::Eof | ReadlineError::Interrupted) => {
                        _ = control_tx.send(Control::Terminate);
                        break;
                    }
                    Err(err) => {
                        println!("error: {:#}", err);
                        _ = control_tx.send(Control::Terminate);
                        break;
                    }
                }
            }
        });

        loop {
            match control_rx.recv_timeout(EVENT_POLL) {
                Ok(Control::Cmd(line)) => handle_command(&mut debugger, &line),
                Ok(Control::Terminate) | Err(RecvTimeoutError::Disconnected) => break,
                Err(RecvTimeoutError::Timeout) => {}
            }

            debugger.process_events();
            if debugger.state() == SessionState::Idle {
                break;
            }
        }

        shutdown(&mut debugger);
        Ok(())
    }
}

fn shutdown(debugger: &mut SessionDebugger) {
    debugger.stop();
    let deadline = std::time::Instant::now() + SHUTDOWN_TIMEOUT;
    while debugger.state() != SessionState::Idle && std::time::Instant::now() < deadline {
        debugger.wait_event(EVENT_POLL);
    }
}

/// Parse `FILE:LINE`.
fn parse_location(text: &str) -> Option<(PathBuf, u32)> {
    let (file, line) = text.trim().rsplit_once(':')?;
    let line = line.trim().parse().ok()?;
    (!file.is_empty()).then(|| (PathBuf::from(file), line))
}

fn handle_command(debugger: &mut SessionDebugger, line: &str) {
    let line = line.trim();
    let (verb, args) = line
        .split_once(' ')
        .map(|(verb, args)| (verb, args.trim()))
        .unwrap_or((line, ""));

    match verb {
        "" => {}
        "break" | "b" if parse_location(args).is_some() => {
            if let Some((file, line)) = parse_location(args) {
                if let Err(e) = debugger.add_breakpoint(file, line) {
                    debugger.hook().error(e);
                }
            }
        }
        "clear" if parse_location(args).is_some() => {
            if let Some((file, line)) = parse_location(args) {
                if debugger.remove_breakpoint(&file, line).is_empty() {
                    debugger
                        .hook()
                        .error(format!("no breakpoint at {}:{line}", file.display()));
                }
            }
        }
        "watch" if !args.is_empty() => {
            if debugger.add_watch(args).is_none() {
                debugger
                    .hook()
                    .error(format!("expression `{args}` already watched"));
            }
        }
        "unwatch" if !args.is_empty() => {
            if !debugger.remove_watch(args) {
                debugger.hook().error(format!("expression `{args}` not watched"));
            }
        }
        "bt" => debugger.update_debug_info(),
        "regs" => debugger.send_command(
            Command::new("info registers", "").with_origin(CommandOrigin::Console),
        ),
        "cpu" => {
            let enabled = debugger.hook().toggle_cpu_view();
            debugger
                .hook()
                .printer()
                .println(format!("cpu view: {}", style::keyword(enabled)));
        }
        _ => debugger.send_command(
            Command::new(verb, args)
                .with_echo(true)
                .with_origin(CommandOrigin::Console),
        ),
    }
}
