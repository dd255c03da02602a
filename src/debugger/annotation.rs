use crate::debugger::command::TextEncoding;
use std::str::FromStr;
use strum_macros::EnumString;

/// Byte that introduces an annotation. GDB writes it twice before the marker name.
pub const MARKER: u8 = 0x1a;

/// Marker names of the annotate-level-2 protocol.
///
/// Variants without a serialization are never produced from a marker name directly:
/// they are results of `post-prompt` disambiguation or scanner states.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug, EnumString)]
pub enum Annotation {
    #[strum(serialize = "pre-prompt")]
    PrePrompt,
    #[strum(serialize = "prompt")]
    Prompt,
    #[strum(serialize = "post-prompt")]
    PostPrompt,

    #[strum(serialize = "error-begin")]
    ErrorBegin,
    #[strum(serialize = "error-end")]
    ErrorEnd,

    #[strum(serialize = "display-begin")]
    DisplayBegin,
    #[strum(serialize = "display-number-end")]
    DisplayNumberEnd,
    #[strum(serialize = "display-format")]
    DisplayFormat,
    #[strum(serialize = "display-expression")]
    DisplayExpression,
    #[strum(serialize = "display-expression-end")]
    DisplayExpressionEnd,
    #[strum(serialize = "display-value")]
    DisplayValue,
    #[strum(serialize = "display-end")]
    DisplayEnd,

    #[strum(serialize = "frame-begin")]
    FrameBegin,
    #[strum(serialize = "frame-address")]
    FrameAddress,
    #[strum(serialize = "frame-address-end")]
    FrameAddressEnd,
    #[strum(serialize = "frame-function-name")]
    FrameFunctionName,
    #[strum(serialize = "frame-args")]
    FrameArgs,
    #[strum(serialize = "frame-source-begin")]
    FrameSourceBegin,
    #[strum(serialize = "frame-source-file")]
    FrameSourceFile,
    #[strum(serialize = "frame-source-file-end")]
    FrameSourceFileEnd,
    #[strum(serialize = "frame-source-line")]
    FrameSourceLine,
    #[strum(serialize = "frame-source-end")]
    FrameSourceEnd,
    #[strum(serialize = "frame-where")]
    FrameWhere,
    #[strum(serialize = "frame-end")]
    FrameEnd,

    #[strum(serialize = "source")]
    Source,
    #[strum(serialize = "exited")]
    Exited,
    #[strum(serialize = "starting")]
    Starting,
    #[strum(serialize = "stopped")]
    Stopped,
    #[strum(serialize = "breakpoints-invalid")]
    BreakpointsInvalid,

    #[strum(serialize = "arg-begin")]
    ArgBegin,
    #[strum(serialize = "arg-name-end")]
    ArgNameEnd,
    #[strum(serialize = "arg-value")]
    ArgValue,
    #[strum(serialize = "arg-end")]
    ArgEnd,

    #[strum(serialize = "array-section-begin")]
    ArrayBegin,
    #[strum(serialize = "array-section-end")]
    ArrayEnd,
    #[strum(serialize = "elt")]
    Elt,
    #[strum(serialize = "elt-rep")]
    EltRep,
    #[strum(serialize = "elt-rep-end")]
    EltRepEnd,

    #[strum(serialize = "field-begin")]
    FieldBegin,
    #[strum(serialize = "field-name-end")]
    FieldNameEnd,
    #[strum(serialize = "field-value")]
    FieldValue,
    #[strum(serialize = "field-end")]
    FieldEnd,

    #[strum(serialize = "value-history-begin")]
    ValueHistoryBegin,
    #[strum(serialize = "value-history-value")]
    ValueHistoryValue,
    #[strum(serialize = "value-history-end")]
    ValueHistoryEnd,

    #[strum(serialize = "signal")]
    Signal,
    #[strum(serialize = "signal-name")]
    SignalName,
    #[strum(serialize = "signal-name-end")]
    SignalNameEnd,
    #[strum(serialize = "signal-string")]
    SignalString,
    #[strum(serialize = "signal-string-end")]
    SignalStringEnd,

    /// `post-prompt` followed by the output of `info locals`.
    #[strum(disabled)]
    Locals,
    /// `post-prompt` followed by the output of `info args`.
    #[strum(disabled)]
    Params,
    /// `post-prompt` followed by a register dump.
    #[strum(disabled)]
    InfoRegisters,
    /// `post-prompt` followed by a disassembly listing.
    #[strum(disabled)]
    InfoAsm,

    #[strum(disabled)]
    Unknown,
    #[strum(disabled)]
    Eof,
}

impl Annotation {
    /// Map a marker name to an annotation without any context.
    /// Unrecognized names map to [`Annotation::Unknown`].
    pub fn from_name(name: &str) -> Self {
        Annotation::from_str(name).unwrap_or(Annotation::Unknown)
    }
}

/// Return the annotation introduced by the last marker in `text`,
/// or [`Annotation::Eof`] if `text` contains no marker at all.
pub fn last_annotation(text: &[u8]) -> Annotation {
    let Some(marker_pos) = text.iter().rposition(|&b| b == MARKER) else {
        return Annotation::Eof;
    };

    let name_start = marker_pos + 1;
    let name_len = text[name_start..]
        .iter()
        .take_while(|&&b| b > b' ')
        .count();
    match std::str::from_utf8(&text[name_start..name_start + name_len]) {
        Ok(name) => Annotation::from_name(name),
        Err(_) => Annotation::Unknown,
    }
}

fn is_line_end(b: u8) -> bool {
    b == b'\r' || b == b'\n' || b == 0
}

/// Cursor over one buffered debugger response.
///
/// All read primitives advance the cursor; `peek_*` primitives restore it.
pub struct Lexer<'a> {
    buf: &'a [u8],
    pos: usize,
    encoding: TextEncoding,
    /// Verb of the in-flight command, used to disambiguate `post-prompt`.
    current_verb: Option<&'a str>,
}

impl<'a> Lexer<'a> {
    pub fn new(buf: &'a [u8], encoding: TextEncoding) -> Self {
        Self {
            buf,
            pos: 0,
            encoding,
            current_verb: None,
        }
    }

    pub fn with_current_verb(mut self, verb: Option<&'a str>) -> Self {
        self.current_verb = verb;
        self
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move the cursor, clamping to the buffer end.
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.buf.len());
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn byte(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn decode(&self, from: usize) -> String {
        self.encoding.decode(&self.buf[from..self.pos])
    }

    fn skip_spaces(&mut self) {
        while matches!(self.byte(), Some(b' ' | b'\t')) {
            self.pos += 1;
        }
    }

    fn skip_to_annotation(&mut self) {
        while matches!(self.byte(), Some(b) if b != MARKER) {
            self.pos += 1;
        }
        while self.byte() == Some(MARKER) {
            self.pos += 1;
        }
    }

    fn skip_to_line_end(&mut self) {
        while matches!(self.byte(), Some(b) if !is_line_end(b)) {
            self.pos += 1;
        }
    }

    /// Skip separator whitespace and return the following run of printable bytes.
    pub fn next_word(&mut self) -> String {
        self.skip_spaces();
        let start = self.pos;
        while matches!(self.byte(), Some(b) if b > b' ' && b != MARKER) {
            self.pos += 1;
        }
        self.decode(start)
    }

    /// Return the rest of the current line without consuming its terminator.
    pub fn remaining_line(&mut self) -> String {
        let start = self.pos;
        self.skip_to_line_end();
        self.decode(start)
    }

    /// Skip to the end of the current line, consume exactly one terminator (CRLF, CR, LF)
    /// and return the line that follows.
    pub fn next_line(&mut self) -> String {
        self.skip_to_line_end();
        match self.byte() {
            None => return String::new(),
            Some(b'\r') if self.buf.get(self.pos + 1) == Some(&b'\n') => self.pos += 2,
            Some(_) => self.pos += 1,
        }
        self.remaining_line()
    }

    /// Skip to the end of the current line, consume every consecutive terminator
    /// and return the next non-empty line.
    pub fn next_filled_line(&mut self) -> String {
        self.skip_to_line_end();
        while matches!(self.byte(), Some(b) if is_line_end(b)) {
            self.pos += 1;
        }
        self.remaining_line()
    }

    /// Advance past the next marker and return its annotation.
    pub fn next_annotation(&mut self) -> Annotation {
        self.skip_to_annotation();
        let name = self.next_word();
        self.classify(&name)
    }

    /// Same as [`Lexer::next_annotation`] but leaves the cursor untouched.
    pub fn peek_annotation(&mut self) -> Annotation {
        let backup = self.pos;
        let annotation = self.next_annotation();
        self.pos = backup;
        annotation
    }

    /// Advance until `target` is consumed. Return `false` if the buffer ends first.
    pub fn find_annotation(&mut self, target: Annotation) -> bool {
        loop {
            let next = self.next_annotation();
            if next == target {
                return true;
            }
            if next == Annotation::Eof {
                return false;
            }
        }
    }

    fn classify(&mut self, name: &str) -> Annotation {
        match Annotation::from_name(name) {
            Annotation::PostPrompt => self.disambiguate_post_prompt(),
            Annotation::Unknown if self.is_eof() => Annotation::Eof,
            annotation => annotation,
        }
    }

    fn disambiguate_post_prompt(&mut self) -> Annotation {
        match self.current_verb {
            Some("info locals") => return Annotation::Locals,
            Some("info args") => return Annotation::Params,
            _ => {}
        }

        let backup = self.pos;
        let line = self.next_filled_line();
        self.pos = backup;

        if line.starts_with("rax ") || line.starts_with("eax ") {
            Annotation::InfoRegisters
        } else if line.starts_with("Dump of assembler code for function ") {
            Annotation::InfoAsm
        } else {
            Annotation::PostPrompt
        }
    }
}
