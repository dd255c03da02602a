use serde::Deserialize;
use strum_macros::{Display, EnumString};

/// Who issued a command.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default)]
pub enum CommandOrigin {
    /// Typed by the user into the debugger console.
    Console,
    /// Issued by the session itself or by any other UI trigger.
    #[default]
    Other,
}

/// A single command line for the debugger process.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Command {
    pub verb: String,
    pub args: String,
    /// Watch values must be refreshed once the queue drains.
    pub update_watch: bool,
    /// Echo the command and its response into the console even if the command log is off.
    pub echo: bool,
    pub origin: CommandOrigin,
}

impl Command {
    /// Create a command with default flags: watch update requested, no echo, non-console origin.
    pub fn new(verb: impl Into<String>, args: impl Into<String>) -> Self {
        Self {
            verb: verb.into(),
            args: args.into(),
            update_watch: true,
            echo: false,
            origin: CommandOrigin::Other,
        }
    }

    pub fn with_update_watch(mut self, update_watch: bool) -> Self {
        self.update_watch = update_watch;
        self
    }

    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn with_origin(mut self, origin: CommandOrigin) -> Self {
        self.origin = origin;
        self
    }

    /// Command text as typed in a gdb console: `verb[ args]`.
    pub fn text(&self) -> String {
        if self.args.is_empty() {
            self.verb.clone()
        } else {
            format!("{} {}", self.verb, self.args)
        }
    }

    /// Bytes written to the debugger stdin, terminator included.
    pub fn to_bytes(&self, encoding: TextEncoding) -> Vec<u8> {
        let mut line = encoding.encode(&self.text());
        line.push(b'\n');
        line
    }
}

/// Text encoding used on the debugger pipes.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, Deserialize, EnumString, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TextEncoding {
    Utf8,
    /// Single byte local code page, decoded as Latin-1.
    #[default]
    Local8Bit,
}

impl TextEncoding {
    pub fn decode(self, bytes: &[u8]) -> String {
        match self {
            TextEncoding::Utf8 => String::from_utf8_lossy(bytes).into_owned(),
            TextEncoding::Local8Bit => bytes.iter().map(|&b| b as char).collect(),
        }
    }

    pub fn encode(self, text: &str) -> Vec<u8> {
        match self {
            TextEncoding::Utf8 => text.as_bytes().to_vec(),
            TextEncoding::Local8Bit => text
                .chars()
                .map(|c| u8::try_from(u32::from(c)).unwrap_or(b'?'))
                .collect(),
        }
    }
}
