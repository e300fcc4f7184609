//! Turning recorded diagnostics into text.
//!
//! The engine pre-groups errors by position and hands the groups to a
//! formatter. Hosts that want different rendering implement
//! [`ErrorFormatter`]; everyone else gets [`DefaultFormatter`]. A bitfield
//! of [`ErrorFormattingFlags`] selects which sections are rendered.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::error::ParsingError;
use crate::grammar::Grammar;
use crate::position::LineMap;

bitflags! {
    /// Which sections of a diagnostic to render.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ErrorFormattingFlags: u32 {
        /// The `line L column C` prefix.
        const LINE_COLUMN = 1 << 0;
        /// The raw byte offset.
        const OFFSET = 1 << 1;
        /// The expected-set.
        const EXPECTED = 1 << 2;
        /// The chain of enclosing rules.
        const RULE_STACK = 1 << 3;
        /// Mark recovery events distinctly.
        const RECOVERY_MARKERS = 1 << 4;
        /// The offending source line with a caret under the position.
        const SOURCE_LINE = 1 << 5;
    }
}

impl Default for ErrorFormattingFlags {
    fn default() -> Self {
        ErrorFormattingFlags::LINE_COLUMN
            | ErrorFormattingFlags::EXPECTED
            | ErrorFormattingFlags::RECOVERY_MARKERS
    }
}

/// Diagnostics grouped by position, ready for a formatter.
pub struct ErrorReport<'a> {
    /// The parsed text.
    pub source: &'a str,
    /// The grammar, for resolving rule ids in rule stacks.
    pub grammar: &'a Grammar,
    /// One group per distinct position, farthest first.
    pub groups: Vec<ErrorGroup<'a>>,
}

/// The diagnostics recorded at one position.
pub struct ErrorGroup<'a> {
    /// Byte offset shared by the group.
    pub position: usize,
    /// 1-based line of the position.
    pub line: usize,
    /// 1-based column of the position.
    pub column: usize,
    /// The errors, paired with whether each is a recovery event.
    pub errors: Vec<(&'a ParsingError, bool)>,
}

/// Renders a pre-grouped report.
pub trait ErrorFormatter {
    /// Produce the full diagnostic text.
    fn format(&self, report: &ErrorReport<'_>, flags: ErrorFormattingFlags) -> String;
}

pub(crate) fn group_errors<'a>(
    source: &'a str,
    grammar: &'a Grammar,
    errors: &'a [ParsingError],
    recovery_indices: &[usize],
) -> ErrorReport<'a> {
    let line_map = LineMap::new(source);
    let mut by_position: BTreeMap<usize, Vec<(&'a ParsingError, bool)>> = BTreeMap::new();
    for (index, err) in errors.iter().enumerate() {
        let is_recovery = recovery_indices.contains(&index);
        by_position
            .entry(err.position)
            .or_default()
            .push((err, is_recovery));
    }
    let groups = by_position
        .into_iter()
        .rev()
        .map(|(position, errors)| {
            let (line, column) = line_map.line_col(source, position);
            ErrorGroup {
                position,
                line,
                column,
                errors,
            }
        })
        .collect();
    ErrorReport {
        source,
        grammar,
        groups,
    }
}

/// The built-in formatter: one line per group, optional source excerpt.
pub struct DefaultFormatter;

impl ErrorFormatter for DefaultFormatter {
    fn format(&self, report: &ErrorReport<'_>, flags: ErrorFormattingFlags) -> String {
        let mut out = String::new();
        for group in &report.groups {
            let mut line = String::new();
            if flags.contains(ErrorFormattingFlags::LINE_COLUMN) {
                line.push_str(&format!("line {} column {}", group.line, group.column));
            }
            if flags.contains(ErrorFormattingFlags::OFFSET) {
                line.push_str(&format!(" (offset {})", group.position));
            }
            if !line.is_empty() {
                line.push_str(": ");
            }

            let recovered = group.errors.iter().any(|(_, is_recovery)| *is_recovery);
            if recovered && flags.contains(ErrorFormattingFlags::RECOVERY_MARKERS) {
                line.push_str("(recovered) ");
            }

            if flags.contains(ErrorFormattingFlags::EXPECTED) {
                let mut expected: Vec<&str> = Vec::new();
                for (err, _) in &group.errors {
                    for e in &err.expected {
                        if !expected.contains(&e.as_str()) {
                            expected.push(e);
                        }
                    }
                }
                if expected.is_empty() {
                    line.push_str("parse failed");
                } else {
                    line.push_str("expected ");
                    line.push_str(&expected.join(" or "));
                }
            }

            if flags.contains(ErrorFormattingFlags::RULE_STACK) {
                if let Some((err, _)) = group
                    .errors
                    .iter()
                    .find(|(err, _)| !err.rule_stack.is_empty())
                {
                    let stack: Vec<&str> = err
                        .rule_stack
                        .iter()
                        .map(|&id| report.grammar.alias_of_rule(id))
                        .collect();
                    line.push_str(&format!(" [in {}]", stack.join(" > ")));
                }
            }

            out.push_str(line.trim_end());
            out.push('\n');

            if flags.contains(ErrorFormattingFlags::SOURCE_LINE) {
                out.push_str(&excerpt(report.source, group.position, group.column));
            }
        }
        out
    }
}

fn excerpt(source: &str, position: usize, column: usize) -> String {
    let line_start = source[..position.min(source.len())]
        .rfind('\n')
        .map_or(0, |i| i + 1);
    let line_end = source[line_start..]
        .find('\n')
        .map_or(source.len(), |i| line_start + i);
    let mut out = String::new();
    out.push_str("    ");
    out.push_str(&source[line_start..line_end]);
    out.push('\n');
    out.push_str("    ");
    for _ in 1..column {
        out.push(' ');
    }
    out.push_str("^\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn test_default_formatter_sections() {
        let p = token_sequence_parser(&["a", "b"]);
        let result = p.parse("ax");
        let text = p.format_errors(&result, ErrorFormattingFlags::default());
        assert!(text.contains("line 1 column 2"));
        assert!(text.contains("expected \"b\""));
        assert!(!text.contains("offset"));

        let text = p.format_errors(
            &result,
            ErrorFormattingFlags::default() | ErrorFormattingFlags::OFFSET,
        );
        assert!(text.contains("(offset 1)"));
    }

    #[test]
    fn test_source_line_excerpt() {
        let p = token_sequence_parser(&["a", "b"]);
        let result = p.parse("ax");
        let text = p.format_errors(
            &result,
            ErrorFormattingFlags::default() | ErrorFormattingFlags::SOURCE_LINE,
        );
        assert!(text.contains("    ax\n"));
        assert!(text.contains("     ^\n"));
    }

    #[test]
    fn test_rule_stack_section() {
        let p = token_sequence_parser(&["a", "b"]);
        let result = p.parse("ax");
        let text = p.format_errors(
            &result,
            ErrorFormattingFlags::EXPECTED | ErrorFormattingFlags::RULE_STACK,
        );
        assert!(text.contains("[in start]"));
    }
}
