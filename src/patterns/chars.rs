//! Matching a single character against a predicate.

use crate::context::{ParserContext, Reported};
use crate::element::{ParsedElement, Value};
use crate::error::ErrorKind;

use super::{element, guard_barrier, TokenPattern};

pub(super) fn match_char_class(
    ctx: &mut ParserContext<'_>,
    pattern: &TokenPattern,
    predicate: fn(char) -> bool,
    position: usize,
) -> Result<ParsedElement, Reported> {
    let source = ctx.source();
    match source[position..].chars().next() {
        Some(c) if predicate(c) => {
            let end = position + c.len_utf8();
            ctx.note_probe(end);
            guard_barrier(ctx, end)?;
            Ok(element(
                pattern,
                position,
                c.len_utf8(),
                Value::Char(c),
                Vec::new(),
            ))
        }
        Some(c) => {
            ctx.note_probe(position + c.len_utf8());
            Err(ctx.error_expected(position, ErrorKind::ExpectedToken, &pattern.main_alias))
        }
        None => {
            // The attempt was decided by the end of input; an append there
            // could change the outcome.
            ctx.note_probe(source.len() + 1);
            Err(ctx.error_expected(position, ErrorKind::UnexpectedEof, &pattern.main_alias))
        }
    }
}
