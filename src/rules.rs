//! Rules and the top-down rule evaluator.
//!
//! Rules compose token patterns and other rules with the same algebra the
//! token side has, plus lookahead. Every rule evaluation goes through the
//! memo table: the slot is seeded `Pending` before the body runs, so a
//! left-recursive lookup of the same `(rule, position, cursor)` fails
//! immediately instead of recursing forever. Grammars that need true left
//! recursion must be rewritten; that is the standard packrat trade.

use std::sync::Arc;

use crate::context::{ContextRef, ErrorHandlingMode, ParserContext, Reported};
use crate::element::{ParsedElement, Value};
use crate::error::ErrorKind;
use crate::grammar::{ElementId, RuleId, TokenId};
use crate::memo::{CachedResult, MemoKey, Slot};
use crate::patterns;
use crate::recovery::{self, ErrorRecovery, RecoveryStrategy};

/// A value-projection callback: runs after a rule's body matches, receiving
/// the element and its children's intermediate values, and produces the
/// rule's own value.
pub type ProjectionFn =
    Arc<dyn Fn(ContextRef<'_>, &ParsedElement, &[Value]) -> Value + Send + Sync>;

/// A named rule: a body expression plus the policies hung off it.
pub struct Rule {
    pub(crate) id: RuleId,
    pub(crate) alias: String,
    pub(crate) body: RuleExpr,
    pub(crate) projection: Option<ProjectionFn>,
    pub(crate) recovery: ErrorRecovery,
    pub(crate) exclude_from_ast: bool,
}

/// The body of a rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RuleExpr {
    /// Match a token pattern.
    Token(TokenId),
    /// Match another rule (or this one, for cyclic grammars).
    Rule(RuleId),
    /// Match each expression in order. The grammar's skip pattern, if any,
    /// is applied before each item.
    Sequence(Vec<RuleExpr>),
    /// Try each expression in declared order; first match wins.
    Choice(Vec<RuleExpr>),
    /// Match an expression greedily between `min` and `max` times.
    Repeat {
        /// The repeated expression.
        expr: Box<RuleExpr>,
        /// Minimum number of matches.
        min: usize,
        /// Maximum number of matches, or `None` for unbounded.
        max: Option<usize>,
        /// Expression matched between elements.
        separator: Option<Box<RuleExpr>>,
    },
    /// Match an expression or nothing.
    Optional(Box<RuleExpr>),
    /// Succeed if the expression matches here, consuming nothing.
    Lookahead(Box<RuleExpr>),
    /// Succeed if the expression does *not* match here, consuming nothing
    /// and recording nothing.
    NotLookahead(Box<RuleExpr>),
}

/// What a rule-body expression matched: where it ended, the value it
/// carries, and the named elements it produced.
pub(crate) struct ExprMatch {
    pub(crate) end: usize,
    pub(crate) value: Value,
    pub(crate) elements: Vec<ParsedElement>,
}

/// Rule nesting deeper than this records `InternalLimitExceeded` and fails
/// the branch. With segmented stacks the engine won't overflow before this,
/// so the limit exists to flag runaway grammars, not to protect the stack.
pub(crate) const MAX_RULE_DEPTH: usize = 512;

const STACK_RED_ZONE: usize = 64 * 1024;
const STACK_GROW: usize = 1024 * 1024;

/// Evaluate `rule_id` at `position`, memoized.
///
/// On failure the barrier cursor is restored to its entry value and
/// `Err(Reported)` comes back; the reasons live on the context.
pub(crate) fn try_parse_rule(
    ctx: &mut ParserContext<'_>,
    rule_id: RuleId,
    position: usize,
) -> Result<ParsedElement, Reported> {
    if ctx.halted() {
        return Err(Reported);
    }
    let key = MemoKey {
        rule: rule_id,
        position,
        cursor: ctx.barriers.cursor(),
    };
    match ctx.memo.get(&key) {
        Some(Slot::Pending) => {
            // Left-recursion cut: the rule is already being evaluated at
            // this exact spot, so this inner attempt fails.
            ctx.memo.stats.recursion_cuts += 1;
            return Err(Reported);
        }
        Some(Slot::Done(cached)) => {
            let cached = cached.clone();
            ctx.memo.stats.hits += 1;
            ctx.note_probe(position + cached.examined_len);
            for err in cached.errors {
                ctx.record(err);
            }
            if ctx.halted() {
                return Err(Reported);
            }
            return match cached.outcome {
                Some(el) => {
                    ctx.barriers.set_cursor(key.cursor + cached.consumed_barriers);
                    Ok(el)
                }
                None => Err(Reported),
            };
        }
        None => {}
    }
    ctx.memo.stats.misses += 1;

    if ctx.enter_depth() > MAX_RULE_DEPTH {
        ctx.exit_depth();
        ctx.error_expected(
            position,
            ErrorKind::InternalLimitExceeded,
            "shallower rule nesting",
        );
        return Err(Reported);
    }

    ctx.memo.seed_pending(key);
    ctx.push_rule(rule_id);
    ctx.push_capture();
    let saved_probe = ctx.probe_high();
    ctx.set_probe_high(position);

    let rule = ctx.grammar().rule(rule_id);
    tracing::trace!(rule = rule.alias.as_str(), position, "rule");
    let mut result =
        stacker::maybe_grow(STACK_RED_ZONE, STACK_GROW, || eval_rule_body(ctx, rule, position));

    if result.is_err() && !ctx.halted() && rule.recovery.strategy != RecoveryStrategy::None {
        result = recovery::attempt(ctx, rule, position);
    }

    // A rule can fail without any deeper record, e.g. through a negative
    // lookahead, which fails silently. Name the rule itself so the failure
    // still shows up in diagnostics.
    if result.is_err() && !ctx.halted() && ctx.capture_position().is_none() {
        ctx.error_expected(position, ErrorKind::ExpectedRule, &rule.alias);
    }

    let errors = ctx.pop_capture();
    ctx.pop_rule();
    ctx.exit_depth();

    let matched_end = match &result {
        Ok(el) => el.end_index(),
        Err(_) => position,
    };
    let examined_end = ctx.probe_high().max(matched_end);
    ctx.set_probe_high(saved_probe.max(examined_end));
    let examined_len = examined_end - position;

    if ctx.halted() {
        // Don't cache anything computed on the way down from a halt.
        ctx.memo.abandon(&key);
        ctx.barriers.set_cursor(key.cursor);
        return Err(Reported);
    }

    match result {
        Ok(el) => {
            let consumed_barriers = ctx.barriers.cursor() - key.cursor;
            ctx.memo.complete(
                key,
                CachedResult {
                    outcome: Some(el.clone()),
                    consumed_barriers,
                    examined_len,
                    errors,
                },
            );
            Ok(el)
        }
        Err(Reported) => {
            ctx.barriers.set_cursor(key.cursor);
            ctx.memo.complete(
                key,
                CachedResult {
                    outcome: None,
                    consumed_barriers: 0,
                    examined_len,
                    errors,
                },
            );
            Err(Reported)
        }
    }
}

/// Evaluate a rule's body and assemble its element, bypassing the memo.
/// Recovery's retry strategy calls this directly so a retry attempt doesn't
/// overwrite the rule's own memo slot.
pub(crate) fn eval_rule_body(
    ctx: &mut ParserContext<'_>,
    rule: &Rule,
    position: usize,
) -> Result<ParsedElement, Reported> {
    let m = eval_expr(ctx, &rule.body, position)?;
    let mut element = ParsedElement {
        id: ElementId::Rule(rule.id),
        exclude_from_ast: rule.exclude_from_ast,
        start_index: position,
        length: m.end - position,
        value: m.value,
        children: m.elements,
    };
    if let Some(projection) = &rule.projection {
        let values: Vec<Value> = element.children.iter().map(|c| c.value.clone()).collect();
        let handle = ContextRef::new(ctx.source(), ctx.grammar());
        let value = projection(handle, &element, &values);
        element.value = value;
    }
    Ok(element)
}

/// Evaluate one body expression. On failure the barrier cursor is restored
/// to where this expression started.
pub(crate) fn eval_expr(
    ctx: &mut ParserContext<'_>,
    expr: &RuleExpr,
    position: usize,
) -> Result<ExprMatch, Reported> {
    let cursor = ctx.barriers.cursor();
    let result = eval_expr_inner(ctx, expr, position);
    if result.is_err() {
        ctx.barriers.set_cursor(cursor);
    }
    result
}

fn eval_expr_inner(
    ctx: &mut ParserContext<'_>,
    expr: &RuleExpr,
    position: usize,
) -> Result<ExprMatch, Reported> {
    match expr {
        RuleExpr::Token(token) => {
            let el = patterns::try_match(ctx, *token, position)?;
            Ok(ExprMatch {
                end: el.end_index(),
                value: el.value.clone(),
                elements: vec![el],
            })
        }
        RuleExpr::Rule(rule) => {
            let el = try_parse_rule(ctx, *rule, position)?;
            Ok(ExprMatch {
                end: el.end_index(),
                value: el.value.clone(),
                elements: vec![el],
            })
        }
        RuleExpr::Sequence(items) => {
            let mut end = position;
            let mut values = Vec::with_capacity(items.len());
            let mut elements = Vec::new();
            for item in items {
                let item_pos = skip_ws(ctx, end);
                let m = eval_expr(ctx, item, item_pos)?;
                end = m.end;
                values.push(m.value);
                elements.extend(m.elements);
            }
            Ok(ExprMatch {
                end,
                value: Value::List(values),
                elements,
            })
        }
        RuleExpr::Choice(alternatives) => {
            for alternative in alternatives {
                match eval_expr(ctx, alternative, position) {
                    Ok(m) => return Ok(m),
                    Err(Reported) => {
                        if ctx.halted() {
                            return Err(Reported);
                        }
                    }
                }
            }
            Err(Reported)
        }
        RuleExpr::Repeat {
            expr,
            min,
            max,
            separator,
        } => eval_repeat(ctx, expr, *min, *max, separator.as_deref(), position),
        RuleExpr::Optional(inner) => match eval_expr(ctx, inner, position) {
            Ok(m) => Ok(m),
            Err(Reported) => {
                if ctx.halted() {
                    return Err(Reported);
                }
                Ok(ExprMatch {
                    end: position,
                    value: Value::Null,
                    elements: Vec::new(),
                })
            }
        },
        RuleExpr::Lookahead(inner) => {
            let cursor = ctx.barriers.cursor();
            eval_expr(ctx, inner, position)?;
            // The body matched; give back everything it consumed.
            ctx.barriers.set_cursor(cursor);
            Ok(ExprMatch {
                end: position,
                value: Value::Null,
                elements: Vec::new(),
            })
        }
        RuleExpr::NotLookahead(inner) => {
            let outcome =
                ctx.with_mode(ErrorHandlingMode::NoRecord, |ctx| eval_expr(ctx, inner, position));
            if ctx.halted() {
                return Err(Reported);
            }
            match outcome {
                // Inverted success: the body matched, so this fails, and it
                // fails silently; the cursor is restored by the outer
                // wrapper.
                Ok(_) => Err(Reported),
                Err(Reported) => Ok(ExprMatch {
                    end: position,
                    value: Value::Null,
                    elements: Vec::new(),
                }),
            }
        }
    }
}

fn eval_repeat(
    ctx: &mut ParserContext<'_>,
    expr: &RuleExpr,
    min: usize,
    max: Option<usize>,
    separator: Option<&RuleExpr>,
    position: usize,
) -> Result<ExprMatch, Reported> {
    let mut values = Vec::new();
    let mut elements = Vec::new();
    let mut end = position;
    let mut committed_cursor = ctx.barriers.cursor();
    let mut count = 0usize;
    loop {
        if ctx.halted() {
            return Err(Reported);
        }
        if let Some(max) = max {
            if count >= max {
                break;
            }
        }
        let mut attempt_pos = end;
        if count > 0 {
            if let Some(sep) = separator {
                match eval_expr(ctx, sep, attempt_pos) {
                    Ok(m) => attempt_pos = m.end,
                    Err(Reported) => break,
                }
            }
        }
        match eval_expr(ctx, expr, attempt_pos) {
            Ok(m) => {
                let progressed = m.end > end || ctx.barriers.cursor() != committed_cursor;
                end = m.end;
                committed_cursor = ctx.barriers.cursor();
                values.push(m.value);
                elements.extend(m.elements);
                count += 1;
                if !progressed {
                    break;
                }
            }
            Err(Reported) => {
                // Roll back a separator consumed for the element that never
                // came.
                ctx.barriers.set_cursor(committed_cursor);
                break;
            }
        }
    }
    if count < min {
        return Err(Reported);
    }
    Ok(ExprMatch {
        end,
        value: Value::List(values),
        elements,
    })
}

/// Advance past the grammar's skip pattern, if one is configured. Skipping
/// is speculative, records nothing, and never steps over a barrier (the
/// barrier guard fails the skip match instead).
fn skip_ws(ctx: &mut ParserContext<'_>, position: usize) -> usize {
    let Some(skip) = ctx.grammar().skip_token() else {
        return position;
    };
    ctx.with_mode(ErrorHandlingMode::NoRecord, |ctx| {
        match patterns::try_match(ctx, skip, position) {
            Ok(el) => el.end_index(),
            Err(Reported) => position,
        }
    })
}

#[cfg(test)]
mod tests {
    use crate::element::Value;
    use crate::grammar::GrammarBuilder;
    use crate::parser::Parser;
    use crate::testing::*;

    use super::RuleExpr;

    #[test]
    fn test_rule_reference_and_nesting() {
        // item := '(' item ')' | 'x'
        let mut g = GrammarBuilder::new();
        let open = g.literal("(");
        let close = g.literal(")");
        let x = g.literal("x");
        let item = g.declare_rule("item");
        g.define_rule(
            item,
            RuleExpr::Choice(vec![
                RuleExpr::Sequence(vec![
                    RuleExpr::Token(open),
                    RuleExpr::Rule(item),
                    RuleExpr::Token(close),
                ]),
                RuleExpr::Token(x),
            ]),
        );
        g.start(item);
        let p = Parser::new(g.build().unwrap());
        assert_parses(&p, "x");
        assert_parses(&p, "(x)");
        assert_parses(&p, "(((x)))");
        assert_no_parse(&p, "((x)");
        assert_no_parse(&p, "()");
    }

    #[test]
    fn test_left_recursion_cut() {
        // expr := expr '+' 'a' | 'a' is directly left-recursive. The packrat
        // seed makes the inner `expr` lookup fail, so the rule can only ever
        // match the second alternative. The parse of "a+a" therefore leaves
        // "+a" unconsumed and fails overall, but it must not hang or
        // overflow.
        let mut g = GrammarBuilder::new();
        let plus = g.literal("+");
        let a = g.literal("a");
        let expr = g.declare_rule("expr");
        g.define_rule(
            expr,
            RuleExpr::Choice(vec![
                RuleExpr::Sequence(vec![
                    RuleExpr::Rule(expr),
                    RuleExpr::Token(plus),
                    RuleExpr::Token(a),
                ]),
                RuleExpr::Token(a),
            ]),
        );
        g.start(expr);
        let p = Parser::new(g.build().unwrap());
        assert_parses(&p, "a");
        assert_no_parse(&p, "a+a");
        let result = p.parse("a+a");
        assert!(result.cache_stats().recursion_cuts > 0);
    }

    #[test]
    fn test_lookahead_consumes_nothing() {
        // start := &"ab" "a" "b"
        let mut g = GrammarBuilder::new();
        let ab = g.literal("ab");
        let a = g.literal("a");
        let b = g.literal("b");
        let start = g.rule(
            "start",
            RuleExpr::Sequence(vec![
                RuleExpr::Lookahead(Box::new(RuleExpr::Token(ab))),
                RuleExpr::Token(a),
                RuleExpr::Token(b),
            ]),
        );
        g.start(start);
        let p = Parser::new(g.build().unwrap());
        assert_parses(&p, "ab");
        assert_no_parse(&p, "ba");
    }

    #[test]
    fn test_negative_lookahead() {
        // ident := !"if" letter+
        let mut g = GrammarBuilder::new();
        let kw = g.literal("if");
        let letter = g.char_class("letter", char::is_alphabetic);
        let letters = g.repeat("letters", letter, 1, None);
        let ident = g.rule(
            "ident",
            RuleExpr::Sequence(vec![
                RuleExpr::NotLookahead(Box::new(RuleExpr::Token(kw))),
                RuleExpr::Token(letters),
            ]),
        );
        g.start(ident);
        let p = Parser::new(g.build().unwrap());
        assert_parses(&p, "cow");
        assert_no_parse(&p, "if");
        // The negative lookahead's internal failure must not pollute the
        // error set when the overall parse fails elsewhere.
        let result = p.parse("123");
        assert!(result
            .errors()
            .iter()
            .all(|e| !e.expected.contains(&"\"if\"".to_string())));
    }

    #[test]
    fn test_rule_projection() {
        let mut g = GrammarBuilder::new();
        let num = g.regex("number", "[0-9]+");
        let rule = g.rule("value", RuleExpr::Token(num));
        g.set_projection(
            rule,
            std::sync::Arc::new(|ctx, el, _values| {
                let text = el.text(ctx.source());
                Value::Int(text.parse().unwrap())
            }),
        );
        g.start(rule);
        let p = Parser::new(g.build().unwrap());
        let root = p.try_parse("420").unwrap();
        assert_eq!(root.value, Value::Int(420));
    }

    #[test]
    fn test_skip_pattern_between_sequence_items() {
        let mut g = GrammarBuilder::new();
        let ws_char = g.char_class("space", |c| c == ' ' || c == '\t');
        let ws = g.repeat("whitespace", ws_char, 0, None);
        let a = g.literal("let");
        let b = g.regex("name", "[a-z]+");
        let start = g.rule(
            "start",
            RuleExpr::Sequence(vec![RuleExpr::Token(a), RuleExpr::Token(b)]),
        );
        g.skip(ws);
        g.start(start);
        let p = Parser::new(g.build().unwrap());
        assert_parses(&p, "let  x");
        assert_parses(&p, "letx");
    }

    #[test]
    fn test_packrat_determinism() {
        // The same rule at the same position is evaluated once; the second
        // encounter is a cache hit with an equal element.
        let mut g = GrammarBuilder::new();
        let a = g.literal("aa");
        let word = g.rule("word", RuleExpr::Token(a));
        // start := (word "b") | (word "c") forces `word` to be looked up
        // twice at position 0 after the first alternative fails.
        let lit_b = g.literal("b");
        let lit_c = g.literal("c");
        let start = g.rule(
            "start",
            RuleExpr::Choice(vec![
                RuleExpr::Sequence(vec![RuleExpr::Rule(word), RuleExpr::Token(lit_b)]),
                RuleExpr::Sequence(vec![RuleExpr::Rule(word), RuleExpr::Token(lit_c)]),
            ]),
        );
        g.start(start);
        let p = Parser::new(g.build().unwrap());
        let result = p.parse("aac");
        assert!(result.is_success());
        assert!(result.cache_stats().hits >= 1);
    }

    #[test]
    fn test_depth_limit_recorded() {
        use crate::error::ErrorKind;
        // nest := '(' nest ')' | 'x' against deeply nested input overflows
        // the rule depth bound and records InternalLimitExceeded.
        let mut g = GrammarBuilder::new();
        let open = g.literal("(");
        let close = g.literal(")");
        let x = g.literal("x");
        let nest = g.declare_rule("nest");
        g.define_rule(
            nest,
            RuleExpr::Choice(vec![
                RuleExpr::Sequence(vec![
                    RuleExpr::Token(open),
                    RuleExpr::Rule(nest),
                    RuleExpr::Token(close),
                ]),
                RuleExpr::Token(x),
            ]),
        );
        g.start(nest);
        let p = Parser::new(g.build().unwrap());
        let depth = super::MAX_RULE_DEPTH + 10;
        let input = format!("{}x{}", "(".repeat(depth), ")".repeat(depth));
        let result = p.parse(&input);
        assert!(!result.is_success());
        assert!(result
            .errors()
            .iter()
            .any(|e| e.kind == ErrorKind::InternalLimitExceeded));
    }
}
