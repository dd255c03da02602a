//! Output dispatcher.
//!
//! Scans one complete debugger response (everything up to and including a `prompt`
//! annotation) and routes every recognized annotation to its handler. Handlers read their
//! payload through the [`Lexer`] cursor and rebuild the matching store in [`ResultStores`].
//!
//! A handler that does not find an annotation it expects gives up silently: nothing it
//! has built so far is stored and scanning continues with the next top level annotation.

use crate::debugger::annotation::{Annotation, Lexer};
use crate::debugger::command::{Command, TextEncoding};
use crate::debugger::store::{
    Disassembly, Register, ResultStores, SourcePosition, StackFrame,
};
use log::{debug, trace};
use std::path::PathBuf;

/// Warning printed by gdb when the debugee binary is older than its sources.
pub const STALE_SOURCE_WARNING: &str = "warning: Source file is more recent than executable.";
/// Error text gdb prints when the debugee went away under a stepping command.
const NO_FUNCTION_BOUNDS_ERROR: &str = "cannot find bounds of current function";
const NO_SYMBOL_ERROR: &str = "No symbol \"";
const ASM_HEADER: &str = "Dump of assembler code for function ";
const ASM_FOOTER: &str = "End of assembler dump";
/// Column where the function label starts in a disassembly header.
pub const DEFAULT_ASM_HEADER_OFFSET: usize = ASM_HEADER.len();
const NO_LOCALS: &str = "No locals.";
const NO_ARGUMENTS: &str = "No arguments.";
const MARKER_PREFIX: &str = "\u{1a}\u{1a}";
const INDENT: usize = 4;

/// One-shot results of a single response.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub struct ParseFlags {
    pub backtrace_ready: bool,
    pub disassembly_ready: bool,
    pub registers_ready: bool,
    pub locals_ready: bool,
    pub arguments_ready: bool,
    pub rescan_watches: bool,
    pub eval_ready: bool,
    pub process_exited: bool,
    pub update_execution: bool,
    pub received_signal: bool,
    pub update_cpu_window: bool,
    pub stale_source_warning: bool,
}

impl ParseFlags {
    pub fn is_empty(&self) -> bool {
        *self == ParseFlags::default()
    }
}

/// Formatted structured value with its top level fields.
struct EvalValue {
    text: String,
    fields: Vec<(String, String)>,
}

pub struct OutputDispatcher {
    encoding: TextEncoding,
    asm_header_offset: usize,
    /// Set until the first response of a session is parsed.
    invalidate_watches: bool,
}

impl OutputDispatcher {
    pub fn new(encoding: TextEncoding) -> Self {
        Self {
            encoding,
            asm_header_offset: DEFAULT_ASM_HEADER_OFFSET,
            invalidate_watches: true,
        }
    }

    /// Column used to cut the function label from a disassembly header
    /// that lacks the usual `Dump of assembler code for function` prefix.
    pub fn with_asm_header_offset(mut self, offset: usize) -> Self {
        self.asm_header_offset = offset;
        self
    }

    /// Parse a complete response of the `current` command.
    pub fn parse(
        &mut self,
        buffer: &[u8],
        current: Option<&Command>,
        stores: &mut ResultStores,
    ) -> ParseFlags {
        if self.invalidate_watches {
            stores.watches.invalidate_all();
            self.invalidate_watches = false;
        }

        let stale = contains(buffer, STALE_SOURCE_WARNING.as_bytes());

        let mut lexer = Lexer::new(buffer, self.encoding)
            .with_current_verb(current.map(|cmd| cmd.verb.as_str()));
        let mut flags = self.scan(&mut lexer, stores);
        flags.stale_source_warning |= stale;
        flags
    }

    /// Drive `lexer` to the end of its buffer, dispatching every annotation on the way.
    pub fn scan(&self, lexer: &mut Lexer<'_>, stores: &mut ResultStores) -> ParseFlags {
        let mut pass = Pass {
            lx: lexer,
            stores,
            flags: ParseFlags::default(),
            frames_rebuilt: false,
            asm_header_offset: self.asm_header_offset,
        };
        pass.run();
        pass.flags
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

/// State of one scan over a response.
struct Pass<'l, 'a, 's> {
    lx: &'l mut Lexer<'a>,
    stores: &'s mut ResultStores,
    flags: ParseFlags,
    /// Frame store is cleared before the first frame of a response.
    frames_rebuilt: bool,
    asm_header_offset: usize,
}

impl Pass<'_, '_, '_> {
    fn run(&mut self) {
        loop {
            let annotation = self.lx.next_annotation();
            let handled = match annotation {
                Annotation::Eof => break,
                Annotation::ValueHistoryValue => {
                    self.handle_value_history_value();
                    Some(())
                }
                Annotation::Signal => self.handle_signal(),
                Annotation::Exited => {
                    self.handle_exit();
                    Some(())
                }
                Annotation::FrameBegin => self.handle_frames(),
                Annotation::InfoAsm => {
                    self.handle_disassembly();
                    Some(())
                }
                Annotation::InfoRegisters => {
                    self.handle_registers();
                    Some(())
                }
                Annotation::Locals => {
                    self.stores.locals = self.handle_local_output();
                    self.flags.locals_ready = true;
                    Some(())
                }
                Annotation::Params => {
                    self.stores.arguments = self.handle_local_output();
                    self.flags.arguments_ready = true;
                    Some(())
                }
                Annotation::ErrorBegin => {
                    self.handle_error();
                    Some(())
                }
                Annotation::DisplayBegin => self.handle_display(),
                Annotation::Source => self.handle_source(),
                _ => Some(()),
            };

            if handled.is_none() {
                debug!(target: "debugger", "incomplete {annotation:?} section skipped");
            }
        }
    }

    fn find(&mut self, annotation: Annotation) -> Option<()> {
        self.lx.find_annotation(annotation).then_some(())
    }

    fn handle_frames(&mut self) -> Option<()> {
        let line = self.lx.next_line();

        // a frame outside a backtrace dump reports a new location only
        if !line.starts_with('#') {
            self.flags.update_cpu_window = true;
            return Some(());
        }

        self.find(Annotation::FrameFunctionName)?;
        let function_name = self.lx.next_line();

        self.find(Annotation::FrameArgs)?;
        let mut arguments = self.lx.next_line();
        while self.lx.peek_annotation() == Annotation::ArgBegin {
            self.find(Annotation::ArgBegin)?;
            arguments += &self.lx.next_line();

            self.find(Annotation::ArgNameEnd)?;
            arguments.push(' ');
            arguments += &self.lx.next_line();
            arguments.push(' ');

            self.find(Annotation::ArgValue)?;
            arguments += &self.lx.next_line();

            self.find(Annotation::ArgEnd)?;
            arguments += &self.lx.next_line();
        }

        let (file, line) = if self.lx.peek_annotation() == Annotation::FrameSourceBegin {
            self.find(Annotation::FrameSourceFile)?;
            let file = PathBuf::from(self.lx.next_line());
            self.find(Annotation::FrameSourceLine)?;
            let line = self.lx.next_line().trim().parse().ok();
            (Some(file), line)
        } else {
            (None, None)
        };

        self.find(Annotation::FrameEnd)?;

        if !self.frames_rebuilt {
            self.stores.frames.clear();
            self.frames_rebuilt = true;
        }
        self.stores.frames.push(StackFrame {
            function_name,
            arguments: arguments.trim().to_string(),
            file,
            line,
        });

        if self.lx.peek_annotation() != Annotation::FrameBegin {
            self.flags.backtrace_ready = true;
        }
        Some(())
    }

    fn handle_disassembly(&mut self) {
        let header = self.lx.next_filled_line();
        let function = match header.strip_prefix(ASM_HEADER) {
            Some(label) => label.trim_end().trim_end_matches(':').to_string(),
            None => header.chars().skip(self.asm_header_offset).collect(),
        };

        let mut lines = vec![];
        let mut line = self.lx.next_line();
        while !line.is_empty() && !line.starts_with(ASM_FOOTER) {
            lines.push(line);
            line = self.lx.next_line();
        }

        self.stores.disassembly = Disassembly { function, lines };
        self.flags.disassembly_ready = true;
    }

    fn handle_registers(&mut self) {
        let mut registers = vec![];

        let mut line = self.lx.next_filled_line();
        while !line.is_empty() && !line.starts_with(MARKER_PREFIX) {
            registers.push(parse_register(&line));
            line = self.lx.next_line();
        }

        self.stores.registers = registers;
        self.flags.registers_ready = true;
    }

    /// Collect `info locals` / `info args` entries.
    fn handle_local_output(&mut self) -> Vec<String> {
        let mut entries: Vec<String> = vec![];

        let mut line = self.lx.next_filled_line();
        loop {
            let continuation = match line.strip_prefix(MARKER_PREFIX) {
                Some(text) => {
                    let text = text.trim_start();
                    if text == NO_LOCALS || text == NO_ARGUMENTS {
                        return vec![];
                    }
                    entries.push(text.to_string());
                    false
                }
                None => {
                    if line == NO_LOCALS || line == NO_ARGUMENTS {
                        return vec![];
                    }
                    if !line.is_empty() {
                        match entries.last_mut() {
                            Some(last) => last.push_str(&line),
                            None => entries.push(line.clone()),
                        }
                    }
                    true
                }
            };

            if self.lx.is_eof() {
                break;
            }
            let line_start = self.lx.position();
            line = self.lx.next_line();
            if line.is_empty() && !continuation {
                break;
            }
            if is_annotation_line(&line) {
                // the section is over, let the outer scan see this marker
                self.lx.seek(line_start);
                break;
            }
        }

        entries
    }

    fn handle_error(&mut self) {
        let text = self.lx.next_line();
        trace!(target: "debugger", "debugger error: {text}");

        if text
            .to_ascii_lowercase()
            .starts_with(NO_FUNCTION_BOUNDS_ERROR)
        {
            self.flags.process_exited = true;
        } else if text.starts_with(NO_SYMBOL_ERROR) {
            let (Some(head), Some(tail)) = (text.find('"'), text.rfind('"')) else {
                return;
            };
            if tail <= head {
                return;
            }
            let name = &text[head + 1..tail];
            if let Some(id) = self.stores.watches.find(name) {
                self.stores.watches.invalidate(id);
                self.flags.rescan_watches = true;
            }
        }
    }

    fn handle_exit(&mut self) {
        if let Ok(code) = self.lx.next_word().parse() {
            self.stores.exit_code = Some(code);
        }
        self.flags.process_exited = true;
    }

    fn handle_display(&mut self) -> Option<()> {
        let number = self.lx.next_line();

        self.find(Annotation::DisplayExpression)?;
        let expression = self.lx.next_line();

        self.find(Annotation::DisplayValue)?;
        let id = self.stores.watches.find(expression.trim())?;

        let value = self.eval_output();
        let fields = value
            .fields
            .into_iter()
            .map(|(name, value)| (format!("{}.{name}", expression.trim()), value))
            .collect();

        let var = self.stores.watches.get_mut(id)?;
        var.handle = number.trim().parse().ok();
        var.value = Some(value.text);
        self.stores.watches.set_children(id, fields);
        Some(())
    }

    /// Parse `filename:line:offset:beg|middle|end:address`.
    fn handle_source(&mut self) -> Option<()> {
        let mut location = self.lx.remaining_line().trim_start().to_string();

        for _ in 0..3 {
            let delimiter = location.rfind(':')?;
            location.truncate(delimiter);
        }

        let line = match location.rfind(':') {
            Some(delimiter) => {
                let line = location[delimiter + 1..].trim().parse().unwrap_or_default();
                location.truncate(delimiter);
                line
            }
            None => 0,
        };

        self.stores.execution_position = Some(SourcePosition {
            file: PathBuf::from(location),
            line,
        });
        self.flags.update_execution = true;
        self.flags.update_cpu_window = true;
        Some(())
    }

    fn handle_signal(&mut self) -> Option<()> {
        // "Program received signal ", name, ", ", description, "."
        let mut signal = self.lx.next_filled_line();

        self.find(Annotation::SignalName)?;
        signal += &self.lx.next_filled_line();

        self.find(Annotation::SignalNameEnd)?;
        signal += &self.lx.next_filled_line();

        self.find(Annotation::SignalString)?;
        signal += &self.lx.next_filled_line();

        self.find(Annotation::SignalStringEnd)?;
        signal += &self.lx.next_filled_line();

        self.stores.signal = Some(signal);
        self.flags.received_signal = true;
        Some(())
    }

    fn handle_value_history_value(&mut self) {
        self.stores.eval_value = self.eval_output().text;
        self.flags.eval_ready = true;
    }

    /// Flatten a structured value into indented text.
    fn eval_output(&mut self) -> EvalValue {
        let mut indent = 0;
        let mut fields = vec![];
        let mut field_name = None;

        let mut text = self.lx.next_line();
        if text.starts_with('{') {
            indent += INDENT;
        }

        loop {
            let annotation = self.lx.next_annotation();
            let line = self.lx.next_line();

            match annotation {
                Annotation::FieldBegin => {
                    text.push('\n');
                    text.push_str(&" ".repeat(indent));
                    if indent == INDENT {
                        field_name = Some(line.trim().to_string());
                    }
                }
                Annotation::FieldValue => {
                    if indent == INDENT {
                        if let Some(name) = field_name.take() {
                            fields.push((name, line.trim().to_string()));
                        }
                    }
                    if line.starts_with('{') && self.lx.peek_annotation() != Annotation::ArrayBegin
                    {
                        indent += INDENT;
                    }
                }
                Annotation::FieldEnd => {
                    if line.ends_with('}') {
                        indent = indent.saturating_sub(INDENT);
                        text.push('\n');
                        text.push_str(&" ".repeat(indent));
                    }
                }
                Annotation::Eof | Annotation::ValueHistoryEnd | Annotation::DisplayEnd => {
                    text.push_str(&line);
                    break;
                }
                _ => {}
            }
            text.push_str(&line);
        }

        EvalValue { text, fields }
    }
}

fn is_annotation_line(line: &str) -> bool {
    line.strip_prefix(MARKER_PREFIX)
        .and_then(|rest| rest.split_whitespace().next())
        .map(|name| Annotation::from_name(name) != Annotation::Unknown)
        .unwrap_or(false)
}

/// Split a `name  hex<TAB>decimal` register dump line.
fn parse_register(line: &str) -> Register {
    let (name, rest) = line.split_once(' ').unwrap_or((line, ""));
    let rest = rest.trim_start();
    let split = rest.find('\t').or_else(|| rest.find(' ')).unwrap_or(rest.len());
    let (hex, dec) = rest.split_at(split);

    Register {
        name: name.to_string(),
        hex_value: hex.to_string(),
        dec_value: dec.trim_start().to_string(),
    }
}
