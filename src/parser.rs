//! The parser facade: owns the grammar, runs parses, reparses
//! incrementally, and formats errors.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use crate::ast::{self, AstNode};
use crate::barriers::{BarrierStream, BarrierToken};
use crate::context::{ErrorHandlingMode, ParserContext, Reported};
use crate::element::ParsedElement;
use crate::error::{ErrorKind, ParseError, ParsingError, UnexpectedBarrierToken};
use crate::format::{self, ErrorFormatter, ErrorFormattingFlags, DefaultFormatter};
use crate::grammar::{Grammar, RuleId};
use crate::incremental::{self, TextChange};
use crate::memo::{MemoStats, MemoTable};
use crate::rules;

/// The host's barrier lexer: runs over the whole text before each parse and
/// produces the ordered barrier list.
pub type BarrierLexer = Arc<dyn Fn(&str) -> Vec<BarrierToken> + Send + Sync>;

/// A compiled parser. Cheap to clone; the grammar is shared.
#[derive(Clone)]
pub struct Parser {
    grammar: Arc<Grammar>,
    barrier_lexer: Option<BarrierLexer>,
    mode: ErrorHandlingMode,
}

impl Parser {
    /// Wrap a built grammar.
    pub fn new(grammar: Grammar) -> Self {
        Parser {
            grammar: Arc::new(grammar),
            barrier_lexer: None,
            mode: ErrorHandlingMode::Default,
        }
    }

    /// Install a barrier lexer. It runs over the whole text before every
    /// parse (and reparse) and must produce a sorted, non-overlapping list.
    pub fn with_barrier_lexer(
        mut self,
        lexer: impl Fn(&str) -> Vec<BarrierToken> + Send + Sync + 'static,
    ) -> Self {
        self.barrier_lexer = Some(Arc::new(lexer));
        self
    }

    /// Change the error-handling mode. `Throw` makes the first recorded
    /// error halt the parse, which is handy when debugging a grammar.
    pub fn with_error_mode(mut self, mode: ErrorHandlingMode) -> Self {
        self.mode = mode;
        self
    }

    /// The grammar this parser runs.
    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    /// Parse `text` from the grammar's start rule.
    pub fn parse(&self, text: &str) -> ParseResult {
        self.parse_from(text, self.grammar.start_rule())
    }

    /// Parse `text` from a specific rule.
    pub fn parse_from(&self, text: &str, start: RuleId) -> ParseResult {
        self.run(text.to_string(), start, MemoTable::new(), None, None)
    }

    /// Parse with a cancellation flag. Setting the flag from another thread
    /// makes the parse fail promptly without recording further errors.
    pub fn parse_cancellable(&self, text: &str, cancel: Arc<AtomicBool>) -> ParseResult {
        self.run(
            text.to_string(),
            self.grammar.start_rule(),
            MemoTable::new(),
            Some(cancel),
            None,
        )
    }

    /// Parse `text` and return the root element, or the best error.
    pub fn try_parse(&self, text: &str) -> Result<ParsedElement, ParseError> {
        self.try_parse_from(text, self.grammar.start_rule())
    }

    /// Like [`Parser::try_parse`], from a specific rule.
    pub fn try_parse_from(&self, text: &str, start: RuleId) -> Result<ParsedElement, ParseError> {
        let result = self.parse_from(text, start);
        if result.ast.is_some() && result.errors.iter().all(|e| e.recovered) {
            Ok(result.root.expect("a successful parse has a root element"))
        } else {
            Err(ParseError::from_errors(text, &result.errors))
        }
    }

    /// Reparse after the given changes, reusing every memoized sub-parse
    /// the changes left untouched.
    pub fn parse_incremental(&self, previous: &ParseResult, changes: &[TextChange]) -> ParseResult {
        let _span = tracing::debug_span!("parse_incremental", changes = changes.len()).entered();
        let mut memo = previous.memo.clone();
        memo.stats = MemoStats::default();

        let mut shifted_old: Vec<(u32, BarrierToken)> = previous
            .barriers
            .iter()
            .enumerate()
            .map(|(i, b)| (i as u32, b.clone()))
            .collect();
        let mut changed_regions: Vec<(usize, usize)> = Vec::new();
        let mut text = previous.text.clone();
        for change in changes {
            incremental::shift_cache(&mut memo, change);
            shifted_old = incremental::shift_barriers(shifted_old, change);
            let old_end = change.start_index + change.old_length;
            let delta = change.delta();
            for region in &mut changed_regions {
                if region.0 >= old_end {
                    region.0 = crate::element::offset_by(region.0, delta);
                    region.1 = crate::element::offset_by(region.1, delta);
                }
            }
            changed_regions.push((change.start_index, change.start_index + change.new_length));
            text = change.resulting_text.clone();
        }

        let barriers = self.lex_barriers(&text);
        if !shifted_old.is_empty() || !barriers.is_empty() {
            match incremental::compute_remap(
                &shifted_old,
                &barriers,
                &changed_regions,
                previous.barriers.len(),
            ) {
                Some(remap) => incremental::apply_remap(&mut memo, &remap),
                None => {
                    // The barrier lexer was not stable outside the changed
                    // regions; nothing in the cache can be trusted.
                    tracing::debug!("barrier list unstable; dropping cache");
                    let invalidated = memo.len();
                    memo = MemoTable::new();
                    memo.stats.invalidated = invalidated;
                }
            }
        }

        self.run(text, self.grammar.start_rule(), memo, None, Some(barriers))
    }

    /// Render a result's diagnostics with the default formatter.
    pub fn format_errors(&self, result: &ParseResult, flags: ErrorFormattingFlags) -> String {
        self.format_errors_with(result, flags, &DefaultFormatter)
    }

    /// Render a result's diagnostics with a custom formatter.
    pub fn format_errors_with(
        &self,
        result: &ParseResult,
        flags: ErrorFormattingFlags,
        formatter: &dyn ErrorFormatter,
    ) -> String {
        let report = format::group_errors(
            &result.text,
            &self.grammar,
            &result.errors,
            &result.recovery_indices,
        );
        formatter.format(&report, flags)
    }

    fn lex_barriers(&self, text: &str) -> Vec<BarrierToken> {
        match &self.barrier_lexer {
            Some(lexer) => lexer(text),
            None => Vec::new(),
        }
    }

    fn run(
        &self,
        text: String,
        start: RuleId,
        memo: MemoTable,
        cancel: Option<Arc<AtomicBool>>,
        barriers: Option<Vec<BarrierToken>>,
    ) -> ParseResult {
        let _span = tracing::debug_span!("parse", len = text.len()).entered();
        let barriers = barriers.unwrap_or_else(|| self.lex_barriers(&text));
        let grammar = &*self.grammar;
        let stream = BarrierStream::from_tokens(grammar, &barriers);
        let mut ctx = ParserContext::new(&text, grammar, stream, memo, self.mode, cancel);

        let mut success = false;
        let root = match rules::try_parse_rule(&mut ctx, start, 0) {
            Ok(element) => {
                success = !ctx.halted();
                let end = element.end_index();
                if end < text.len() {
                    ctx.error_expected(end, ErrorKind::ExpectedToken, "end of input");
                    success = false;
                }
                if let Some(barrier) = ctx.barriers.current().cloned() {
                    let alias = grammar.alias_of_token(barrier.token_id).to_string();
                    ctx.error_unexpected_barrier(UnexpectedBarrierToken::new(barrier, alias));
                    success = false;
                }
                Some(element)
            }
            Err(Reported) => None,
        };

        let (mut memo, recorder, _) = ctx.into_parts();
        memo.purge_pending();
        let (errors, recovery_indices) = recorder.finish(success);
        let stats = memo.stats;
        let ast = if success { root.as_ref().map(ast::build) } else { None };
        tracing::debug!(
            success,
            errors = errors.len(),
            cache_hits = stats.hits,
            cache_misses = stats.misses,
            "parse finished"
        );
        ParseResult {
            ast,
            errors,
            recovery_indices,
            stats,
            root,
            text,
            barriers,
            memo,
        }
    }
}

/// Everything a parse produced, plus the retained state an incremental
/// reparse builds on.
pub struct ParseResult {
    ast: Option<AstNode>,
    errors: Vec<ParsingError>,
    recovery_indices: Vec<usize>,
    stats: MemoStats,
    root: Option<ParsedElement>,
    text: String,
    pub(crate) barriers: Vec<BarrierToken>,
    pub(crate) memo: MemoTable,
}

impl ParseResult {
    /// The built AST, present when the parse consumed the whole input.
    pub fn ast(&self) -> Option<&AstNode> {
        self.ast.as_ref()
    }

    /// All retained diagnostics: recovery events in source order, then the
    /// farthest-failure set if the parse failed.
    pub fn errors(&self) -> &[ParsingError] {
        &self.errors
    }

    /// Indices into [`ParseResult::errors`] of the recovery events.
    pub fn recovery_indices(&self) -> &[usize] {
        &self.recovery_indices
    }

    /// Cache behavior counters for this parse.
    pub fn cache_stats(&self) -> &MemoStats {
        &self.stats
    }

    /// The root parsed element, if the start rule matched at all (even when
    /// trailing input then failed the parse).
    pub fn root_element(&self) -> Option<&ParsedElement> {
        self.root.as_ref()
    }

    /// The text this result describes.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// True when an AST was produced and every retained error was
    /// recovered. This is the "exit status zero" condition for hosts.
    pub fn is_success(&self) -> bool {
        self.ast.is_some() && self.errors.iter().all(|e| e.recovered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::*;

    #[test]
    fn test_trailing_input_fails() {
        let p = literal_parser("ok");
        let result = p.parse("okok");
        assert!(!result.is_success());
        assert!(result.root_element().is_some());
        assert!(result
            .errors()
            .iter()
            .any(|e| e.expected.contains(&"end of input".to_string()) && e.position == 2));
    }

    #[test]
    fn test_cancellation() {
        use std::sync::atomic::{AtomicBool, Ordering};
        let p = literal_parser("ok");
        let cancel = Arc::new(AtomicBool::new(true));
        let result = p.parse_cancellable("ok", cancel.clone());
        assert!(!result.is_success());
        // Cancellation fails the parse without recording anything.
        assert!(result.errors().is_empty());

        cancel.store(false, Ordering::Relaxed);
        let result = p.parse_cancellable("ok", cancel);
        assert!(result.is_success());
    }

    #[test]
    fn test_throw_mode_stops_at_first_error() {
        let p = token_choice_parser(&["cow", "cat"]).with_error_mode(ErrorHandlingMode::Throw);
        let result = p.parse("cup");
        assert!(!result.is_success());
        // Only the first alternative got to record before the halt.
        let expected: Vec<&str> = result
            .errors()
            .iter()
            .flat_map(|e| e.expected.iter().map(String::as_str))
            .collect();
        assert_eq!(expected, vec!["\"cow\""]);
    }

    #[test]
    fn test_unconsumed_barrier_fails_parse() {
        use crate::error::ErrorKind;
        // The grammar parses "x" fine but never consumes the trailing
        // zero-length barrier the lexer emitted.
        let p = trailing_barrier_parser();
        let result = p.parse("x");
        assert!(!result.is_success());
        assert!(result
            .errors()
            .iter()
            .any(|e| e.kind == ErrorKind::UnexpectedBarrier));
    }
}
