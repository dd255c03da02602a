use crate::debugger::watch::WatchList;
use std::path::PathBuf;

/// One backtrace entry, innermost frame first.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct StackFrame {
    pub function_name: String,
    pub arguments: String,
    pub file: Option<PathBuf>,
    pub line: Option<u32>,
}

#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Register {
    pub name: String,
    pub hex_value: String,
    pub dec_value: String,
}

/// Captured `disas` output.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct Disassembly {
    /// Label of the disassembled function taken from the listing header.
    pub function: String,
    pub lines: Vec<String>,
}

/// Place where the debugee stopped.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SourcePosition {
    pub file: PathBuf,
    pub line: u32,
}

/// Everything the output dispatcher learns from debugger responses.
///
/// Collections are rebuilt by the handler that owns them, never patched in place.
#[derive(Clone, PartialEq, Eq, Debug, Default)]
pub struct ResultStores {
    pub frames: Vec<StackFrame>,
    pub registers: Vec<Register>,
    pub disassembly: Disassembly,
    pub locals: Vec<String>,
    pub arguments: Vec<String>,
    pub watches: WatchList,
    /// Last value produced by a value history record (`print` output).
    pub eval_value: String,
    pub execution_position: Option<SourcePosition>,
    pub signal: Option<String>,
    pub exit_code: Option<i32>,
}

impl ResultStores {
    /// Drop every session-bound result. Watch expressions survive, their values do not.
    pub fn reset(&mut self) {
        self.frames.clear();
        self.registers.clear();
        self.disassembly = Disassembly::default();
        self.locals.clear();
        self.arguments.clear();
        self.eval_value.clear();
        self.execution_position = None;
        self.signal = None;
        self.exit_code = None;
        self.watches.invalidate_all();
    }
}
