//! Composite token patterns: sequence, ordered choice, repetition,
//! optional.

use crate::context::{ParserContext, Reported};
use crate::element::{ParsedElement, Value};
use crate::grammar::TokenId;

use super::{element, try_match, PassageFn, TokenPattern};

pub(super) fn match_sequence(
    ctx: &mut ParserContext<'_>,
    pattern: &TokenPattern,
    children: &[TokenId],
    passage: Option<&PassageFn>,
    position: usize,
) -> Result<ParsedElement, Reported> {
    let mut end = position;
    let mut elements = Vec::with_capacity(children.len());
    let mut values = Vec::with_capacity(children.len());
    for &child in children {
        let el = try_match(ctx, child, end)?;
        end = el.end_index();
        values.push(el.value.clone());
        elements.push(el);
    }
    let value = match passage {
        Some(f) => f(&values),
        None => Value::List(values),
    };
    Ok(element(pattern, position, end - position, value, elements))
}

/// Ordered choice: the first child that matches wins and its element passes
/// through unwrapped. When every child fails, the farthest-failure recorder
/// has already unioned their expected-sets; there is nothing new to report
/// here.
pub(super) fn match_choice(
    ctx: &mut ParserContext<'_>,
    children: &[TokenId],
    position: usize,
) -> Result<ParsedElement, Reported> {
    for &child in children {
        match try_match(ctx, child, position) {
            Ok(el) => return Ok(el),
            Err(Reported) => {
                if ctx.halted() {
                    return Err(Reported);
                }
            }
        }
    }
    Err(Reported)
}

pub(super) fn match_repeat(
    ctx: &mut ParserContext<'_>,
    pattern: &TokenPattern,
    child: TokenId,
    min: usize,
    max: Option<usize>,
    separator: Option<TokenId>,
    position: usize,
) -> Result<ParsedElement, Reported> {
    let mut elements: Vec<ParsedElement> = Vec::new();
    let mut values = Vec::new();
    // End and cursor after the last committed element, so a trailing
    // separator can be rolled back.
    let mut end = position;
    let mut committed_cursor = ctx.barriers.cursor();
    loop {
        if ctx.halted() {
            return Err(Reported);
        }
        if let Some(max) = max {
            if values.len() >= max {
                break;
            }
        }
        let mut attempt_pos = end;
        if !elements.is_empty() {
            if let Some(sep) = separator {
                match try_match(ctx, sep, attempt_pos) {
                    Ok(sep_el) => attempt_pos = sep_el.end_index(),
                    // A separator failure after the last element is
                    // absorbed, like any failure past `min`.
                    Err(Reported) => break,
                }
            }
        }
        match try_match(ctx, child, attempt_pos) {
            Ok(el) => {
                let progressed =
                    el.end_index() > end || ctx.barriers.cursor() != committed_cursor;
                end = el.end_index();
                committed_cursor = ctx.barriers.cursor();
                values.push(el.value.clone());
                elements.push(el);
                if !progressed {
                    // An iteration that consumes nothing would repeat
                    // forever; one epsilon match is as greedy as it gets.
                    break;
                }
            }
            Err(Reported) => {
                // The element failed; drop any separator we just consumed.
                ctx.barriers.set_cursor(committed_cursor);
                break;
            }
        }
    }
    if values.len() < min {
        // The failing child already recorded why.
        return Err(Reported);
    }
    Ok(element(
        pattern,
        position,
        end - position,
        Value::List(values),
        elements,
    ))
}

pub(super) fn match_optional(
    ctx: &mut ParserContext<'_>,
    pattern: &TokenPattern,
    child: TokenId,
    position: usize,
) -> Result<ParsedElement, Reported> {
    match try_match(ctx, child, position) {
        Ok(el) => Ok(el),
        Err(Reported) => {
            if ctx.halted() {
                return Err(Reported);
            }
            Ok(element(pattern, position, 0, Value::Null, Vec::new()))
        }
    }
}
