//! Error types and the farthest-failure recorder.

use thiserror::Error;

use crate::barriers::IntermediateBarrierToken;
use crate::element::offset_by;
use crate::grammar::{RuleId, TokenId};
use crate::position;

/// What category of failure an error records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A token pattern did not match.
    ExpectedToken,
    /// A rule did not match.
    ExpectedRule,
    /// Character-level matching ran into an unconsumed barrier token.
    UnexpectedBarrier,
    /// Matching needed more input than was available.
    UnexpectedEof,
    /// A recovery strategy converted a failure into a resumption point.
    RecoveryTriggered,
    /// An internal bound was hit: rule nesting depth or retry budget.
    InternalLimitExceeded,
}

/// A diagnostic built when character-level matching would step over a barrier
/// token that the grammar never consumed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnexpectedBarrierToken {
    barrier: IntermediateBarrierToken,
    alias: String,
}

impl UnexpectedBarrierToken {
    pub(crate) fn new(barrier: IntermediateBarrierToken, alias: String) -> Self {
        UnexpectedBarrierToken { barrier, alias }
    }

    /// The id of the barrier's token pattern.
    pub fn id(&self) -> TokenId {
        self.barrier.token_id
    }

    /// The human name of the barrier's token pattern.
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Index of the offending barrier within the barrier list.
    pub fn barrier_index(&self) -> u32 {
        self.barrier.index
    }

    /// Byte offset of the offending barrier in the text.
    pub fn start_index(&self) -> usize {
        self.barrier.start_index
    }
}

/// One recorded parse diagnostic.
///
/// The engine tracks the farthest position reached by any failing attempt;
/// errors recorded at earlier positions are dominated and discarded, while
/// recovery events are retained unconditionally.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsingError {
    /// Byte offset the failing attempt reached.
    pub position: usize,
    /// Human names of the things that would have allowed progress.
    pub expected: Vec<String>,
    /// The enclosing rules at the moment the error was recorded, outermost
    /// first.
    pub rule_stack: Vec<RuleId>,
    /// Failure category.
    pub kind: ErrorKind,
    /// True for errors a recovery strategy skipped past.
    pub recovered: bool,
    /// Present when `kind` is `UnexpectedBarrier`.
    pub barrier: Option<UnexpectedBarrierToken>,
}

impl ParsingError {
    pub(crate) fn expected_at(
        position: usize,
        kind: ErrorKind,
        expected: impl Into<String>,
        rule_stack: Vec<RuleId>,
    ) -> Self {
        ParsingError {
            position,
            expected: vec![expected.into()],
            rule_stack,
            kind,
            recovered: false,
            barrier: None,
        }
    }

    pub(crate) fn shift(&mut self, delta: isize) {
        self.position = offset_by(self.position, delta);
        if let Some(barrier) = &mut self.barrier {
            barrier.barrier.start_index = offset_by(barrier.barrier.start_index, delta);
        }
    }
}

/// Tracks a set of errors at a single farthest position.
///
/// Nontrivial patterns try several alternatives, and by the time matching
/// fails there is an abundance of candidate messages. The one we want is
/// where matching progressed farthest; when several alternatives tie at that
/// position their expected-sets are unioned.
#[derive(Debug, Clone, Default)]
pub(crate) struct FarthestSet {
    position: usize,
    entries: Vec<ParsingError>,
}

impl FarthestSet {
    pub(crate) fn new() -> Self {
        FarthestSet::default()
    }

    /// Offer an error. Entries behind the current farthest position are
    /// dominated and dropped; an entry at a new farthest position resets the
    /// set; ties accumulate, deduplicated.
    pub(crate) fn offer(&mut self, err: ParsingError) {
        if err.position > self.position || self.entries.is_empty() {
            self.position = err.position;
            self.entries.clear();
            self.entries.push(err);
        } else if err.position == self.position && !self.entries.contains(&err) {
            self.entries.push(err);
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.position
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> &[ParsingError] {
        &self.entries
    }

    pub(crate) fn into_entries(self) -> Vec<ParsingError> {
        self.entries
    }
}

/// Collects diagnostics for a whole parse: the farthest-failure set plus
/// every recovery event in source order.
#[derive(Debug, Default)]
pub(crate) struct ErrorRecorder {
    failures: FarthestSet,
    recovery_events: Vec<ParsingError>,
}

impl ErrorRecorder {
    pub(crate) fn new() -> Self {
        ErrorRecorder::default()
    }

    pub(crate) fn offer(&mut self, err: ParsingError) {
        self.failures.offer(err);
    }

    /// Record a recovery event and return its index among recovery events.
    /// Events are never dominated; they are kept in the order they happened.
    pub(crate) fn record_recovery(&mut self, err: ParsingError) -> usize {
        let index = self.recovery_events.len();
        self.recovery_events.push(err);
        index
    }

    #[cfg(test)]
    pub(crate) fn farthest(&self) -> &FarthestSet {
        &self.failures
    }

    /// Assemble the final error list: recovery events in source order, then
    /// the farthest-failure set if the parse did not fully succeed. Returns
    /// the list and the indices of the recovery events within it.
    pub(crate) fn finish(self, parse_succeeded: bool) -> (Vec<ParsingError>, Vec<usize>) {
        let mut errors = self.recovery_events;
        let recovery_indices = (0..errors.len()).collect();
        if !parse_succeeded {
            errors.extend(self.failures.into_entries());
        }
        (errors, recovery_indices)
    }
}

/// The user-facing error returned by [`crate::Parser::try_parse`] when a
/// parse fails outright.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at line {line} column {column}")]
pub struct ParseError {
    message: String,
    /// Byte offset of the failure.
    pub position: usize,
    /// 1-based line of the failure.
    pub line: usize,
    /// 1-based column of the failure.
    pub column: usize,
}

impl ParseError {
    pub(crate) fn new(source: &str, position: usize, message: String) -> Self {
        let (line, column) = position::describe(source, position);
        ParseError {
            message,
            position,
            line,
            column,
        }
    }

    /// Summarize the non-recovered errors at their farthest position.
    pub(crate) fn from_errors(source: &str, errors: &[ParsingError]) -> Self {
        let position = errors
            .iter()
            .filter(|e| !e.recovered)
            .map(|e| e.position)
            .max()
            .unwrap_or(0);
        let mut expected: Vec<&str> = Vec::new();
        for err in errors.iter().filter(|e| !e.recovered && e.position == position) {
            for e in &err.expected {
                if !expected.contains(&e.as_str()) {
                    expected.push(e);
                }
            }
        }
        let message = if expected.is_empty() {
            "parse failed".to_string()
        } else {
            format!("expected {}", expected.join(" or "))
        };
        ParseError::new(source, position, message)
    }

    /// The failure description, without the position suffix.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Errors detected while building a [`crate::Grammar`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GrammarError {
    /// Two patterns or rules were registered under the same alias.
    #[error("duplicate alias {0:?}")]
    DuplicateAlias(String),
    /// A rule was declared with `declare_rule` but never given a body.
    #[error("rule {0:?} was declared but never defined")]
    UndefinedRule(String),
    /// A regex pattern failed to compile.
    #[error("invalid regex for token {alias:?}: {message}")]
    InvalidRegex {
        /// The pattern's alias.
        alias: String,
        /// The regex engine's complaint.
        message: String,
    },
    /// A repeat pattern with `max < min`.
    #[error("repeat bounds for {0:?} are inverted")]
    InvalidRepeatBounds(String),
    /// A choice or sequence with no children.
    #[error("{0:?} has no child patterns")]
    EmptyComposite(String),
    /// No start rule was set.
    #[error("grammar has no start rule")]
    NoStartRule,
    /// The start rule is excluded from the AST, which would leave a
    /// successful parse with no root node.
    #[error("start rule {0:?} must not be excluded from the AST")]
    ExcludedStartRule(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expected(position: usize, what: &str) -> ParsingError {
        ParsingError::expected_at(position, ErrorKind::ExpectedToken, what, vec![])
    }

    #[test]
    fn test_farthest_set_domination() {
        let mut set = FarthestSet::new();
        set.offer(expected(3, "a"));
        set.offer(expected(1, "b"));
        assert_eq!(set.position(), 3);
        assert_eq!(set.entries().len(), 1);

        // A new farthest position resets the set.
        set.offer(expected(7, "c"));
        assert_eq!(set.position(), 7);
        assert_eq!(set.entries().len(), 1);
        assert_eq!(set.entries()[0].expected, vec!["c".to_string()]);
    }

    #[test]
    fn test_farthest_set_union_dedup() {
        let mut set = FarthestSet::new();
        set.offer(expected(5, "a"));
        set.offer(expected(5, "b"));
        set.offer(expected(5, "a"));
        assert_eq!(set.entries().len(), 2);
    }

    #[test]
    fn test_recorder_finish_order() {
        let mut recorder = ErrorRecorder::new();
        recorder.offer(expected(9, "x"));
        let mut event = expected(2, "stmt");
        event.kind = ErrorKind::RecoveryTriggered;
        event.recovered = true;
        let index = recorder.record_recovery(event);
        assert_eq!(index, 0);

        let (errors, recovery_indices) = recorder.finish(false);
        assert_eq!(errors.len(), 2);
        assert_eq!(recovery_indices, vec![0]);
        assert_eq!(errors[0].kind, ErrorKind::RecoveryTriggered);
        assert_eq!(errors[1].position, 9);
    }

    #[test]
    fn test_recorder_finish_success_drops_failures() {
        let mut recorder = ErrorRecorder::new();
        recorder.offer(expected(9, "x"));
        let (errors, recovery_indices) = recorder.finish(true);
        assert!(errors.is_empty());
        assert!(recovery_indices.is_empty());
    }

    #[test]
    fn test_parse_error_display() {
        let err = ParseError::new("ab\ncd", 4, "expected digit".to_string());
        assert_eq!(err.to_string(), "expected digit at line 2 column 2");
    }
}
