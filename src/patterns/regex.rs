//! Matching with a regex.

use regex::Regex;

use crate::context::{ParserContext, Reported};
use crate::element::{MatchData, ParsedElement, Value};
use crate::error::ErrorKind;

use super::{element, guard_barrier, TokenPattern};

/// Regex patterns are compiled with an `\A` anchor at grammar build time, so
/// a find here either matches at `position` or not at all; there is no
/// falling back to a later or shorter match. The match object becomes the
/// element's intermediate value.
pub(super) fn match_regex(
    ctx: &mut ParserContext<'_>,
    pattern: &TokenPattern,
    regex: &Regex,
    position: usize,
) -> Result<ParsedElement, Reported> {
    let source = ctx.source();
    let Some(rest) = source.get(position..) else {
        return Err(ctx.error_expected(position, ErrorKind::ExpectedToken, &pattern.main_alias));
    };
    match regex.find(rest) {
        Some(m) => {
            let end = position + m.end();
            // A greedy match reads one character past its end to know where
            // to stop; the examined span must cover that, or an insertion
            // right at the boundary would reuse a stale match.
            ctx.note_probe(end + 1);
            guard_barrier(ctx, end)?;
            let data = MatchData {
                start: position,
                end,
                text: m.as_str().to_string(),
            };
            Ok(element(
                pattern,
                position,
                m.end(),
                Value::Match(data),
                Vec::new(),
            ))
        }
        None => {
            // A failed regex may have inspected anything up to the end of
            // the input; the incremental driver has to assume it did.
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
