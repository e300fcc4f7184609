//! User-defined leaf patterns.

use crate::context::{ParserContext, Reported};
use crate::element::ParsedElement;
use crate::error::ErrorKind;

use super::{element, guard_barrier, LeafFn, TokenPattern};

pub(super) fn match_custom(
    ctx: &mut ParserContext<'_>,
    pattern: &TokenPattern,
    matcher: &LeafFn,
    position: usize,
) -> Result<ParsedElement, Reported> {
    let source = ctx.source();
    match matcher(source, position) {
        Some(m) => {
            let end = position + m.length;
            // Assume the matcher peeked one character past its match, the
            // way a greedy regex does.
            ctx.note_probe(end + 1);
            guard_barrier(ctx, end)?;
            Ok(element(pattern, position, m.length, m.value, Vec::new()))
        }
        None => {
            // Like a failed regex, a custom matcher may have looked at
            // anything; assume it examined the rest of the input.
            ctx.note_probe(source.len() + 1);
            let kind = if position >= source.len() {
                ErrorKind::UnexpectedEof
            } else {
                ErrorKind::ExpectedToken
            };
            Err(ctx.error_expected(position, kind, &pattern.main_alias))
        }
    }
}
