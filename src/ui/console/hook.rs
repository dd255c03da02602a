use crate::debugger::command::Command;
use crate::debugger::queue::WatchUpdate;
use crate::debugger::store::{Disassembly, Register, SourcePosition, StackFrame};
use crate::debugger::watch::WatchList;
use crate::debugger::SessionHook;
use crate::ui::console::print::style;
use crate::ui::console::print::ExternalPrinter;
use log::debug;
use std::cell::Cell;
use std::fs;

pub struct TerminalHook {
    printer: ExternalPrinter,
    cpu_view: Cell<bool>,
}

impl TerminalHook {
    pub fn new(printer: ExternalPrinter) -> Self {
        Self {
            printer,
            cpu_view: Cell::new(false),
        }
    }

    pub fn printer(&self) -> &ExternalPrinter {
        &self.printer
    }

    /// Show registers and disassembly after every stop.
    pub fn toggle_cpu_view(&self) -> bool {
        let enabled = !self.cpu_view.get();
        self.cpu_view.set(enabled);
        enabled
    }

    pub fn error(&self, msg: impl std::fmt::Display) {
        self.printer.println(style::error(msg));
    }
}

fn source_line(position: &SourcePosition) -> Option<String> {
    let text = fs::read_to_string(&position.file).ok()?;
    let idx = (position.line as usize).checked_sub(1)?;
    text.lines().nth(idx).map(ToString::to_string)
}

impl SessionHook for TerminalHook {
    fn on_debug_output(&self, line: &str) {
        self.printer.transcript_line(line);
    }

    fn on_eval_ready(&self, value: &str) {
        self.printer.println(value);
    }

    fn on_backtrace(&self, frames: &[StackFrame]) {
        for (num, frame) in frames.iter().enumerate() {
            let place = match (&frame.file, frame.line) {
                (Some(file), Some(line)) => {
                    format!(" at {}:{line}", style::file_path(file.display()))
                }
                _ => String::new(),
            };
            self.printer.println(format!(
                "#{num} {} {}{place}",
                style::function_name(&frame.function_name),
                frame.arguments,
            ));
        }
    }

    fn on_registers(&self, registers: &[Register]) {
        for reg in registers {
            self.printer.println(format!(
                "{:<10} {:<20} {}",
                reg.name,
                style::address(&reg.hex_value),
                reg.dec_value
            ));
        }
    }

    fn on_disassembly(&self, disassembly: &Disassembly) {
        self.printer.println(format!(
            "{}:",
            style::function_name(&disassembly.function)
        ));
        for line in &disassembly.lines {
            self.printer.println(style::asm(line));
        }
    }

    fn on_locals(&self, locals: &[String]) {
        locals.iter().for_each(|var| self.printer.println(var));
    }

    fn on_arguments(&self, arguments: &[String]) {
        arguments.iter().for_each(|arg| self.printer.println(arg));
    }

    fn on_watches(&self, watches: &WatchList) {
        for (_, var) in watches.iter_roots() {
            self.printer.println(format!(
                "{} = {}",
                style::keyword(&var.expression),
                var.value.as_deref().unwrap_or("<not available>")
            ));
        }
    }

    fn on_execution_position(&self, position: &SourcePosition, _focus: bool) {
        let code = source_line(position).unwrap_or_default();
        self.printer.println(format!(
            "{}:{} {code}",
            style::file_path(position.file.display()),
            position.line
        ));
    }

    fn on_signal(&self, signal: &str) {
        self.printer.println(style::keyword(signal));
    }

    fn on_write_failed(&self, command: &Command, reason: &str) {
        self.error(format!("command `{}` not sent: {reason}", command.text()));
    }

    fn on_process_error(&self, reason: &str) {
        self.error(format!("debugger process error: {reason}"));
    }

    fn on_watch_update(&self, update: WatchUpdate) {
        debug!(target: "debugger", "watch update: {update:?}");
    }

    fn on_stale_source(&self) -> bool {
        self.printer.println(style::keyword(
            "Source files are newer than the program, rebuild it to keep lines in sync.",
        ));
        false
    }

    fn on_session_finished(&self, exit_code: Option<i32>) {
        self.printer.println(format!(
            "Debugger exit with code: {}",
            style::keyword(exit_code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))
        ));
    }

    fn cpu_view_visible(&self) -> bool {
        self.cpu_view.get()
    }
}
