//! Pretty-printing raw FHIR JSON for display.
//!
//! Raw resource data arrives from third-party apps, often compact and occasionally malformed.
//! The formatter re-indents it with a single character scan instead of parsing it into a tree,
//! so the exact text of every string, number and key is preserved (no float re-rendering, no
//! key reordering, no escape normalisation). Input that fails the structural check in
//! [`RawFhirFormatter::is_valid_json`] is returned unchanged.

use crate::FhirResource;

const INDENT: &str = "    ";

/// String/escape tracking shared by the validator and the formatter.
#[derive(Default)]
struct StringScanner {
    in_string: bool,
    escaped: bool,
}

impl StringScanner {
    /// Feeds one character. Returns `true` when the character is outside any string literal and
    /// is not a quote, meaning it carries JSON structure.
    fn is_structural(&mut self, c: char) -> bool {
        if self.in_string {
            if self.escaped {
                self.escaped = false;
            } else if c == '\\' {
                self.escaped = true;
            } else if c == '"' {
                self.in_string = false;
            }
            return false;
        }

        if c == '"' {
            self.in_string = true;
            return false;
        }

        true
    }
}

/// Display formatter for raw FHIR JSON.
///
/// This is a zero-sized type used for namespacing. Neither method fails.
pub struct RawFhirFormatter;

impl RawFhirFormatter {
    /// Formats the raw data of `resource`. See [`RawFhirFormatter::format_str`].
    pub fn format(resource: &FhirResource) -> String {
        Self::format_str(resource.data())
    }

    /// Re-indents `json` with four spaces per nesting level.
    ///
    /// Outside string literals:
    /// - `{` / `[` are followed by a newline and the next level's indent
    /// - `}` / `]` are preceded by a newline and the enclosing level's indent
    /// - `,` is followed by a newline and the current indent
    /// - `:` is followed by a single space
    /// - whitespace is dropped
    ///
    /// Everything inside string literals is copied verbatim. Returns `json` unchanged when
    /// [`RawFhirFormatter::is_valid_json`] rejects it.
    pub fn format_str(json: &str) -> String {
        if !Self::is_valid_json(json) {
            return json.to_owned();
        }

        let mut out = String::with_capacity(json.len() * 2);
        let mut scanner = StringScanner::default();
        let mut level = 0usize;

        for c in json.chars() {
            if !scanner.is_structural(c) {
                out.push(c);
                continue;
            }

            match c {
                '{' | '[' => {
                    out.push(c);
                    push_newline_and_indent(&mut out, level + 1);
                    level += 1;
                }
                '}' | ']' => {
                    level = level.saturating_sub(1);
                    push_newline_and_indent(&mut out, level);
                    out.push(c);
                }
                ',' => {
                    out.push(c);
                    push_newline_and_indent(&mut out, level);
                }
                ':' => {
                    out.push(c);
                    out.push(' ');
                }
                c if c.is_whitespace() => {}
                _ => out.push(c),
            }
        }

        out
    }

    /// Cheap structural check used to decide whether `input` is safe to re-indent.
    ///
    /// Returns `false` if the trimmed input is empty, is not wrapped in a matching `{}` or `[]`
    /// pair, closes more brackets than it opened at any point, leaves brackets open, or ends
    /// inside a string literal. Brackets inside string literals are ignored. This is not a full
    /// JSON parser: it accepts some documents a strict parser would reject.
    pub fn is_valid_json(input: &str) -> bool {
        let trimmed = input.trim();
        let bytes = trimmed.as_bytes();
        let (Some(first), Some(last)) = (bytes.first(), bytes.last()) else {
            return false;
        };
        if bytes.len() < 2 || !matches!((first, last), (b'{', b'}') | (b'[', b']')) {
            return false;
        }

        let mut scanner = StringScanner::default();
        let mut depth: i64 = 0;

        for c in trimmed.chars() {
            if !scanner.is_structural(c) {
                continue;
            }
            match c {
                '{' | '[' => depth += 1,
                '}' | ']' => {
                    depth -= 1;
                    if depth < 0 {
                        return false;
                    }
                }
                _ => {}
            }
        }

        depth == 0 && !scanner.in_string
    }
}

fn push_newline_and_indent(out: &mut String, level: usize) {
    out.push('\n');
    for _ in 0..level {
        out.push_str(INDENT);
    }
}
