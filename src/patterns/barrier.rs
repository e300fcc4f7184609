//! Consuming a barrier token from the pre-lexed list.

use crate::context::{ParserContext, Reported};
use crate::element::{ParsedElement, Value};
use crate::error::ErrorKind;

use super::{element, TokenPattern};

/// A barrier reference matches only when the cursor's current barrier has
/// this pattern's id *and* starts exactly at the parse position. Consuming
/// it advances the cursor by one and the position by the barrier's length.
pub(super) fn match_barrier(
    ctx: &mut ParserContext<'_>,
    pattern: &TokenPattern,
    position: usize,
) -> Result<ParsedElement, Reported> {
    match ctx.barriers.current() {
        Some(b) if b.token_id == pattern.id && b.start_index == position => {
            let length = b.length;
            ctx.barriers.advance();
            Ok(element(pattern, position, length, Value::Null, Vec::new()))
        }
        _ => Err(ctx.error_expected(position, ErrorKind::ExpectedToken, &pattern.main_alias)),
    }
}
