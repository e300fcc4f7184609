//! Error recovery: per-rule policies for continuing past a failure.
//!
//! A rule with a recovery policy gets a second chance when its body fails:
//! the driver scans forward for a resynchronization point and, if it finds
//! one before the stop rule would match, fabricates a success spanning the
//! skipped region and records a `RecoveryTriggered` event. The containing
//! parse carries on as if the rule had matched.

use crate::context::{ErrorHandlingMode, ParserContext, Reported};
use crate::element::{ParsedElement, Value};
use crate::error::{ErrorKind, ParsingError};
use crate::grammar::{ElementId, RuleId};
use crate::rules::{eval_rule_body, try_parse_rule, Rule};

/// How a rule recovers from a failed body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum RecoveryStrategy {
    /// No recovery; failure propagates to the caller.
    #[default]
    None,
    /// Scan forward to the first position where the anchor rule matches and
    /// resume there, leaving the anchor unconsumed.
    SkipUntilAnchor,
    /// Like `SkipUntilAnchor`, but consume the anchor before resuming.
    SkipUntilAfterAnchor,
    /// Skip one character and re-attempt the rule, up to a bounded number
    /// of times.
    SkipAndRetry,
    /// Scan forward until any rule in the grammar's sync set matches.
    PanicMode,
}

/// A rule's declarative recovery policy. Equality is structural, so two
/// policies with the same strategy and rules compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ErrorRecovery {
    /// The strategy to run when the rule's body fails.
    pub strategy: RecoveryStrategy,
    /// The rule scanning looks for, where the strategy takes one.
    pub anchor_rule: Option<RuleId>,
    /// A rule bounding the scan: if it matches first, recovery gives up.
    pub stop_rule: Option<RuleId>,
}

impl ErrorRecovery {
    /// No recovery. The default for every rule.
    pub fn none() -> Self {
        ErrorRecovery::default()
    }

    /// Resume at the first position where `anchor` matches.
    pub fn skip_until_anchor(anchor: RuleId) -> Self {
        ErrorRecovery {
            strategy: RecoveryStrategy::SkipUntilAnchor,
            anchor_rule: Some(anchor),
            stop_rule: None,
        }
    }

    /// Resume after consuming the first match of `anchor`.
    pub fn skip_until_after_anchor(anchor: RuleId) -> Self {
        ErrorRecovery {
            strategy: RecoveryStrategy::SkipUntilAfterAnchor,
            anchor_rule: Some(anchor),
            stop_rule: None,
        }
    }

    /// Skip one character at a time and re-attempt the rule.
    pub fn skip_and_retry() -> Self {
        ErrorRecovery {
            strategy: RecoveryStrategy::SkipAndRetry,
            anchor_rule: None,
            stop_rule: None,
        }
    }

    /// Scan for the grammar's ambient sync set.
    pub fn panic_mode() -> Self {
        ErrorRecovery {
            strategy: RecoveryStrategy::PanicMode,
            anchor_rule: None,
            stop_rule: None,
        }
    }

    /// Bound the scan: if `stop` matches before the resync point is found,
    /// recovery gives up and the original failure propagates.
    pub fn with_stop(mut self, stop: RuleId) -> Self {
        self.stop_rule = Some(stop);
        self
    }
}

/// Retry budget for [`RecoveryStrategy::SkipAndRetry`].
pub(crate) const MAX_SKIP_RETRIES: usize = 64;

/// Run `rule`'s recovery policy after its body failed at `start`.
pub(crate) fn attempt(
    ctx: &mut ParserContext<'_>,
    rule: &Rule,
    start: usize,
) -> Result<ParsedElement, Reported> {
    // The failure position is where the failed evaluation got farthest; the
    // capture frame for this rule is still open and remembers it.
    let fail_pos = ctx.capture_position().unwrap_or(start).max(start);
    match rule.recovery.strategy {
        RecoveryStrategy::None => Err(Reported),
        RecoveryStrategy::SkipUntilAnchor => scan_to_anchor(ctx, rule, start, fail_pos, false),
        RecoveryStrategy::SkipUntilAfterAnchor => scan_to_anchor(ctx, rule, start, fail_pos, true),
        RecoveryStrategy::SkipAndRetry => skip_and_retry(ctx, rule, start, fail_pos),
        RecoveryStrategy::PanicMode => panic_mode(ctx, rule, start, fail_pos),
    }
}

fn scan_to_anchor(
    ctx: &mut ParserContext<'_>,
    rule: &Rule,
    start: usize,
    fail_pos: usize,
    consume_anchor: bool,
) -> Result<ParsedElement, Reported> {
    let Some(anchor) = rule.recovery.anchor_rule else {
        return Err(Reported);
    };
    let entry_cursor = ctx.barriers.cursor();
    let source = ctx.source();
    let mut position = fail_pos;
    while position <= source.len() {
        if ctx.halted() {
            break;
        }
        ctx.barriers.skip_through(position);
        if stop_matches(ctx, rule, position) {
            break;
        }
        if let Some(anchor_el) = probe_parse(ctx, anchor, position, consume_anchor) {
            let resume = if consume_anchor {
                anchor_el.end_index()
            } else {
                position
            };
            let children = if consume_anchor {
                vec![anchor_el]
            } else {
                Vec::new()
            };
            let alias = ctx.grammar().alias_of_rule(anchor).to_string();
            record_event(ctx, rule, fail_pos, &alias);
            return Ok(recovered_element(rule, start, resume, children));
        }
        match source[position..].chars().next() {
            Some(c) => position += c.len_utf8(),
            None => break,
        }
    }
    ctx.barriers.set_cursor(entry_cursor);
    Err(Reported)
}

fn skip_and_retry(
    ctx: &mut ParserContext<'_>,
    rule: &Rule,
    start: usize,
    fail_pos: usize,
) -> Result<ParsedElement, Reported> {
    let entry_cursor = ctx.barriers.cursor();
    let source = ctx.source();
    let mut position = start;
    for _ in 0..MAX_SKIP_RETRIES {
        if ctx.halted() {
            break;
        }
        let Some(c) = source[position..].chars().next() else {
            break;
        };
        position += c.len_utf8();
        ctx.barriers.skip_through(position);
        if stop_matches(ctx, rule, position) {
            break;
        }
        if let Ok(mut el) = eval_rule_body(ctx, rule, position) {
            let end = el.end_index();
            el.start_index = start;
            el.length = end - start;
            record_event(ctx, rule, fail_pos, &rule.alias);
            return Ok(el);
        }
    }
    ctx.barriers.set_cursor(entry_cursor);
    Err(Reported)
}

fn panic_mode(
    ctx: &mut ParserContext<'_>,
    rule: &Rule,
    start: usize,
    fail_pos: usize,
) -> Result<ParsedElement, Reported> {
    let sync = ctx.grammar().sync_rules();
    if sync.is_empty() {
        return Err(Reported);
    }
    let entry_cursor = ctx.barriers.cursor();
    let source = ctx.source();
    let mut position = fail_pos;
    while position <= source.len() {
        if ctx.halted() {
            break;
        }
        ctx.barriers.skip_through(position);
        if stop_matches(ctx, rule, position) {
            break;
        }
        for &sync_rule in sync {
            if probe(ctx, sync_rule, position) {
                record_event(ctx, rule, fail_pos, "sync point");
                return Ok(recovered_element(rule, start, position, Vec::new()));
            }
        }
        match source[position..].chars().next() {
            Some(c) => position += c.len_utf8(),
            None => break,
        }
    }
    ctx.barriers.set_cursor(entry_cursor);
    Err(Reported)
}

fn recovered_element(
    rule: &Rule,
    start: usize,
    resume: usize,
    children: Vec<ParsedElement>,
) -> ParsedElement {
    ParsedElement {
        id: ElementId::Rule(rule.id),
        exclude_from_ast: rule.exclude_from_ast,
        start_index: start,
        length: resume - start,
        value: Value::Null,
        children,
    }
}

fn stop_matches(ctx: &mut ParserContext<'_>, rule: &Rule, position: usize) -> bool {
    match rule.recovery.stop_rule {
        Some(stop) => probe(ctx, stop, position),
        None => false,
    }
}

/// Speculatively check whether `rule_id` matches at `position`. Nothing is
/// recorded and the cursor is put back.
fn probe(ctx: &mut ParserContext<'_>, rule_id: RuleId, position: usize) -> bool {
    let cursor = ctx.barriers.cursor();
    let matched = ctx.with_mode(ErrorHandlingMode::NoRecord, |ctx| {
        try_parse_rule(ctx, rule_id, position).is_ok()
    });
    ctx.barriers.set_cursor(cursor);
    matched
}

/// Like [`probe`], but on success optionally keep the match's barrier
/// consumption (for strategies that resume after the anchor).
fn probe_parse(
    ctx: &mut ParserContext<'_>,
    rule_id: RuleId,
    position: usize,
    commit: bool,
) -> Option<ParsedElement> {
    let cursor = ctx.barriers.cursor();
    let result = ctx.with_mode(ErrorHandlingMode::NoRecord, |ctx| {
        try_parse_rule(ctx, rule_id, position)
    });
    match result {
        Ok(el) => {
            if !commit {
                ctx.barriers.set_cursor(cursor);
            }
            Some(el)
        }
        Err(Reported) => {
            ctx.barriers.set_cursor(cursor);
            None
        }
    }
}

fn record_event(ctx: &mut ParserContext<'_>, rule: &Rule, fail_pos: usize, resumed_at: &str) {
    let err = ParsingError {
        position: fail_pos,
        expected: vec![resumed_at.to_string()],
        rule_stack: ctx.rule_stack().to_vec(),
        kind: ErrorKind::RecoveryTriggered,
        recovered: true,
        barrier: None,
    };
    let index = ctx.record_recovery(err);
    tracing::debug!(
        rule = rule.alias.as_str(),
        position = fail_pos,
        index,
        "recovered from parse error"
    );
}
