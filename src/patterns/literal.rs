//! Matching an exact string.

use crate::context::{ParserContext, Reported};
use crate::element::{ParsedElement, Value};
use crate::error::ErrorKind;

use super::{element, guard_barrier, TokenPattern};

pub(super) fn match_literal(
    ctx: &mut ParserContext<'_>,
    pattern: &TokenPattern,
    text: &str,
    case_insensitive: bool,
    position: usize,
) -> Result<ParsedElement, Reported> {
    let source = ctx.source();
    let end = position + text.len();
    ctx.note_probe(end);
    if end > source.len() {
        return Err(ctx.error_expected(position, ErrorKind::UnexpectedEof, &pattern.main_alias));
    }
    // Compare bytes: `end` may not be a character boundary when the match is
    // about to fail, and string slicing would panic there.
    let window = &source.as_bytes()[position..end];
    let matched = if case_insensitive {
        window.eq_ignore_ascii_case(text.as_bytes())
    } else {
        window == text.as_bytes()
    };
    if !matched {
        return Err(ctx.error_expected(position, ErrorKind::ExpectedToken, &pattern.main_alias));
    }
    guard_barrier(ctx, end)?;
    Ok(element(pattern, position, text.len(), Value::Null, Vec::new()))
}
