use log::warn;
use rustyline::history::History;
use rustyline::{Editor, ExternalPrinter as RLExternalPrinter, Helper};
use std::cell::RefCell;
use std::fmt::Display;

/// Prints session output above the line being edited, so asynchronous debugger output
/// never breaks the user input.
pub struct ExternalPrinter {
    printer: RefCell<Box<dyn RLExternalPrinter>>,
}

impl ExternalPrinter {
    pub fn new<H: Helper, I: History>(editor: &mut Editor<H, I>) -> rustyline::Result<Self> {
        let printer = editor.create_external_printer()?;
        Ok(Self {
            printer: RefCell::new(Box::new(printer)),
        })
    }

    pub fn println(&self, msg: impl Display) {
        if let Err(e) = self.printer.borrow_mut().print(format!("{msg}\n")) {
            warn!(target: "debugger", "external printer error: {e}");
        }
    }

    /// Print one line of the debugger transcript.
    pub fn transcript_line(&self, line: &str) {
        self.println(style::transcript(line))
    }
}

pub mod style {
    use crossterm::style::{Color, StyledContent, Stylize};
    use std::fmt::Display;

    /// Declare a function painting any displayable value with one color.
    macro_rules! painter {
        ($name: ident, $color: expr) => {
            pub fn $name(text: impl Display) -> StyledContent<String> {
                text.to_string().with($color)
            }
        };
    }

    painter!(address, Color::Blue);
    painter!(file_path, Color::Green);
    painter!(function_name, Color::Yellow);
    painter!(keyword, Color::Magenta);
    painter!(asm, Color::DarkRed);
    painter!(error, Color::Red);
    painter!(annotation, Color::DarkGrey);
    painter!(prompt, Color::Cyan);

    /// Kind of a line in the rendered transcript.
    #[derive(Copy, Clone, PartialEq, Eq, Debug)]
    pub enum LineKind {
        /// Annotation shown with `>` instead of marker bytes.
        Annotation,
        /// Debugger prompt, possibly followed by an echoed command.
        Prompt,
        Text,
    }

    pub fn line_kind(line: &str) -> LineKind {
        if line.starts_with(">>") {
            LineKind::Annotation
        } else if line.starts_with("(gdb)") {
            LineKind::Prompt
        } else {
            LineKind::Text
        }
    }

    pub fn transcript(line: &str) -> StyledContent<String> {
        match line_kind(line) {
            LineKind::Annotation => annotation(line),
            LineKind::Prompt => prompt(line),
            LineKind::Text => line.to_string().stylize(),
        }
    }

}
