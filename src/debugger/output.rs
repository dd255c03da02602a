//! Console rendering of raw debugger responses.

use crate::debugger::annotation::MARKER;

/// Split a response into console lines.
///
/// With `show_annotations` every marker byte is rendered as `>` and the response is followed by
/// two empty lines. Otherwise annotation lines are dropped and the line following an annotation
/// is glued to the previous visible line, which is how gdb text looks without annotations.
pub fn console_lines(output: &str, show_annotations: bool) -> Vec<String> {
    let marker = char::from(MARKER);

    if show_annotations {
        let mut lines: Vec<String> = output
            .replace(marker, ">")
            .lines()
            .map(ToString::to_string)
            .collect();
        lines.extend([String::new(), String::new()]);
        return lines;
    }

    let mut lines: Vec<String> = vec![];
    let mut glue = false;
    for line in output.lines() {
        if line.starts_with(marker) {
            glue = true;
            continue;
        }

        match lines.last_mut() {
            Some(last) if glue => last.push_str(line),
            _ => lines.push(line.to_string()),
        }
        glue = false;
    }
    lines
}
