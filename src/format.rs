//! Interleaving of a message template with its arguments.
//!
//! `%s` and `%r` are the only recognized placeholders and both mean "the
//! next argument". Formatting never fails: missing arguments leave their
//! placeholder out, surplus arguments are appended at the end.

use crate::record::{FormattedEntry, LogArgs, LogValue};
use std::collections::VecDeque;

/// A piece of a template, as produced by [`split_template`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Segment<'a> {
    Literal(&'a str),
    Placeholder,
}

/// Split `template` into literal text and placeholder tokens, in order.
///
/// Every token is preceded by a literal and the split ends with one, so
/// literals may be empty: `"%s%s"` yields five segments starting and
/// ending with `""`. Literals thus always sit at even positions, which
/// keeps the first console argument a plain string.
pub fn split_template(template: &str) -> Vec<Segment<'_>> {
    let mut segments = Vec::new();
    let bytes = template.as_bytes();
    let mut start = 0;
    let mut i = 0;

    while i + 1 < bytes.len() {
        if bytes[i] == b'%' && (bytes[i + 1] == b's' || bytes[i + 1] == b'r') {
            segments.push(Segment::Literal(&template[start..i]));
            segments.push(Segment::Placeholder);
            i += 2;
            start = i;
        } else {
            i += 1;
        }
    }
    segments.push(Segment::Literal(&template[start..]));
    segments
}

/// Merge `template` and `args` into an ordered sequence of display values.
pub fn format_message(template: &str, args: LogArgs) -> FormattedEntry {
    let mut queue: VecDeque<LogValue> = args.into_queue().into();
    let mut out = Vec::new();

    for segment in split_template(template) {
        match segment {
            Segment::Literal(text) => out.push(LogValue::Str(text.to_string())),
            Segment::Placeholder => {
                if let Some(arg) = queue.pop_front() {
                    out.push(arg);
                }
            }
        }
    }

    out.extend(queue);
    out
}
