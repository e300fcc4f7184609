//! Ambient parse state and error tracking for the overall parse.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::barriers::BarrierStream;
use crate::error::{ErrorKind, ErrorRecorder, FarthestSet, ParsingError, UnexpectedBarrierToken};
use crate::grammar::{Grammar, RuleId};
use crate::memo::MemoTable;

/// Error type for when an error has been reported to the context.
///
/// It's OK to discard this kind of error and return success: the error
/// itself lives on the context, and if some later alternative matches, the
/// recorded error simply never surfaces.
pub struct Reported;

/// What the context does with recorded errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorHandlingMode {
    /// Track the farthest-failure set. The normal mode.
    #[default]
    Default,
    /// Drop records silently. Used for speculative matching: negative
    /// lookahead bodies and recovery probes.
    NoRecord,
    /// The first record halts the entire parse. Useful when debugging a
    /// grammar: the first failure is the one you see, not the farthest.
    Throw,
}

/// Contains the parse state and tracks errors.
///
/// We track errors in the context, not in `Result`s, because often a pattern
/// produces both a successful match *and* the error that will later prove to
/// be the best message for the overall parse attempt. A repetition that
/// stops after three items still succeeded; the reason it stopped is an
/// error record, and if nothing downstream matches the rest of the input,
/// that record, being the farthest one, is the message the user wants.
///
/// The context also owns everything else a single parse mutates: the memo
/// table, the barrier cursor, the rule stack, and the cancellation and halt
/// flags. A parse owns its context exclusively; nothing here is locked.
pub struct ParserContext<'parse> {
    source: &'parse str,
    grammar: &'parse Grammar,
    pub(crate) barriers: BarrierStream,
    pub(crate) memo: MemoTable,
    recorder: ErrorRecorder,
    mode: ErrorHandlingMode,
    rule_stack: Vec<RuleId>,
    /// One frame per active rule evaluation, collecting the errors that
    /// evaluation contributes so they can be cached and replayed on memo
    /// hits.
    captures: Vec<FarthestSet>,
    cancel: Option<Arc<AtomicBool>>,
    halted: bool,
    depth: usize,
    /// Farthest byte offset any match attempt has inspected. Rule
    /// evaluation brackets this to compute per-entry examined lengths for
    /// the incremental driver.
    probe_high: usize,
}

impl<'parse> ParserContext<'parse> {
    pub(crate) fn new(
        source: &'parse str,
        grammar: &'parse Grammar,
        barriers: BarrierStream,
        memo: MemoTable,
        mode: ErrorHandlingMode,
        cancel: Option<Arc<AtomicBool>>,
    ) -> Self {
        ParserContext {
            source,
            grammar,
            barriers,
            memo,
            recorder: ErrorRecorder::new(),
            mode,
            rule_stack: Vec::new(),
            captures: Vec::new(),
            cancel,
            halted: false,
            depth: 0,
            probe_high: 0,
        }
    }

    /// The text being parsed.
    pub fn source(&self) -> &'parse str {
        self.source
    }

    /// The grammar being matched.
    pub fn grammar(&self) -> &'parse Grammar {
        self.grammar
    }

    /// Record an error.
    ///
    /// In the default mode only entries at the farthest position reached are
    /// retained; strictly earlier entries are dominated and dropped. In
    /// `NoRecord` mode the record disappears. In `Throw` mode the first
    /// record halts the parse: everything unwinds through ordinary `Err`
    /// returns, checked at rule entries and repetition steps.
    pub(crate) fn record(&mut self, err: ParsingError) -> Reported {
        if self.mode == ErrorHandlingMode::NoRecord {
            return Reported;
        }
        if let Some(frame) = self.captures.last_mut() {
            frame.offer(err.clone());
        }
        self.recorder.offer(err);
        if self.mode == ErrorHandlingMode::Throw {
            self.halted = true;
        }
        Reported
    }

    /// Record a `foo expected` error.
    pub(crate) fn error_expected(
        &mut self,
        position: usize,
        kind: ErrorKind,
        expected: &str,
    ) -> Reported {
        self.record(ParsingError::expected_at(
            position,
            kind,
            expected,
            self.rule_stack.clone(),
        ))
    }

    /// Record an error for character-level matching running into an
    /// unconsumed barrier.
    pub(crate) fn error_unexpected_barrier(
        &mut self,
        barrier: UnexpectedBarrierToken,
    ) -> Reported {
        let err = ParsingError {
            position: barrier.start_index(),
            expected: vec![barrier.alias().to_string()],
            rule_stack: self.rule_stack.clone(),
            kind: ErrorKind::UnexpectedBarrier,
            recovered: false,
            barrier: Some(barrier),
        };
        self.record(err)
    }

    pub(crate) fn record_recovery(&mut self, err: ParsingError) -> usize {
        self.recorder.record_recovery(err)
    }

    /// Run `f` under a different error-handling mode, restoring the current
    /// one afterwards.
    pub(crate) fn with_mode<T>(
        &mut self,
        mode: ErrorHandlingMode,
        f: impl FnOnce(&mut Self) -> T,
    ) -> T {
        let saved = self.mode;
        self.mode = mode;
        let result = f(self);
        self.mode = saved;
        result
    }

    /// True once the parse must stop: cancellation was requested or a
    /// throw-mode record fired. Checked at rule entry and at every
    /// repetition step; evaluation fails all the way up without recording
    /// anything further.
    pub(crate) fn halted(&self) -> bool {
        self.halted
            || self
                .cancel
                .as_ref()
                .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    pub(crate) fn push_rule(&mut self, rule: RuleId) {
        self.rule_stack.push(rule);
    }

    pub(crate) fn pop_rule(&mut self) {
        self.rule_stack
            .pop()
            .expect("internal error: rule stack underflow");
    }

    /// The chain of rules currently being evaluated, outermost first.
    pub fn rule_stack(&self) -> &[RuleId] {
        &self.rule_stack
    }

    pub(crate) fn enter_depth(&mut self) -> usize {
        self.depth += 1;
        self.depth
    }

    pub(crate) fn exit_depth(&mut self) {
        self.depth -= 1;
    }

    pub(crate) fn push_capture(&mut self) {
        self.captures.push(FarthestSet::new());
    }

    /// Close the current capture frame, folding its entries into the parent
    /// frame (the parent evaluation also wants them in its cache entry).
    pub(crate) fn pop_capture(&mut self) -> Vec<ParsingError> {
        let frame = self
            .captures
            .pop()
            .expect("internal error: capture stack underflow");
        let entries = frame.into_entries();
        if let Some(parent) = self.captures.last_mut() {
            for err in &entries {
                parent.offer(err.clone());
            }
        }
        entries
    }

    /// Farthest position recorded in the current capture frame, if any.
    pub(crate) fn capture_position(&self) -> Option<usize> {
        self.captures
            .last()
            .filter(|frame| !frame.is_empty())
            .map(FarthestSet::position)
    }

    /// Note that matching inspected the text up to `end`. An `end` one past
    /// the input means the attempt was decided by running out of input, so
    /// an insertion at the very end invalidates it.
    pub(crate) fn note_probe(&mut self, end: usize) {
        let end = end.min(self.source.len() + 1);
        if end > self.probe_high {
            self.probe_high = end;
        }
    }

    pub(crate) fn probe_high(&self) -> usize {
        self.probe_high
    }

    pub(crate) fn set_probe_high(&mut self, value: usize) {
        self.probe_high = value;
    }

    pub(crate) fn into_parts(self) -> (MemoTable, ErrorRecorder, BarrierStream) {
        (self.memo, self.recorder, self.barriers)
    }

    #[cfg(test)]
    pub(crate) fn recorder(&self) -> &ErrorRecorder {
        &self.recorder
    }
}

/// A lightweight handle on the context, passed to user callbacks.
///
/// Value projections and custom patterns receive one of these instead of the
/// context itself, so the engine can keep mutating the context around the
/// callback without handing out aliases.
#[derive(Clone, Copy)]
pub struct ContextRef<'a> {
    source: &'a str,
    grammar: &'a Grammar,
}

impl<'a> ContextRef<'a> {
    pub(crate) fn new(source: &'a str, grammar: &'a Grammar) -> Self {
        ContextRef { source, grammar }
    }

    /// The text being parsed.
    pub fn source(&self) -> &'a str {
        self.source
    }

    /// The grammar being matched.
    pub fn grammar(&self) -> &'a Grammar {
        self.grammar
    }
}
