//! Token patterns and the evaluator that matches them.
//!
//! A token pattern is a value, not a type: grammars are data, built at
//! runtime and addressed by [`TokenId`]. The evaluator dispatches on the
//! pattern kind; each family of kinds lives in its own submodule.

mod barrier;
mod chars;
mod composite;
mod custom;
mod literal;
mod regex;

use std::sync::Arc;

use crate::context::{ParserContext, Reported};
use crate::element::{ParsedElement, Value};
use crate::error::UnexpectedBarrierToken;
use crate::grammar::{ElementId, TokenId};

/// Combines the intermediate values of a token sequence's children into the
/// sequence's own value. Without one, the sequence's value is the ordered
/// list of child values.
pub type PassageFn = Arc<dyn Fn(&[Value]) -> Value + Send + Sync>;

/// A user-defined leaf matcher: `(source, position)` to a match, or `None`.
pub type LeafFn = Arc<dyn Fn(&str, usize) -> Option<CustomMatch> + Send + Sync>;

/// What a custom leaf pattern matched.
pub struct CustomMatch {
    /// Length of the match in bytes.
    pub length: usize,
    /// The intermediate value to attach to the element.
    pub value: Value,
}

/// One registered token pattern. Immutable once the grammar is built.
pub struct TokenPattern {
    pub(crate) id: TokenId,
    pub(crate) main_alias: String,
    pub(crate) exclude_from_ast: bool,
    pub(crate) kind: TokenPatternKind,
}

impl TokenPattern {
    /// The pattern's id.
    pub fn id(&self) -> TokenId {
        self.id
    }

    /// The pattern's human name, used in error messages.
    pub fn main_alias(&self) -> &str {
        &self.main_alias
    }
}

/// The variants a token pattern can take.
pub(crate) enum TokenPatternKind {
    /// An exact string, optionally ignoring ASCII case.
    Literal {
        text: String,
        case_insensitive: bool,
    },
    /// A single character satisfying a predicate.
    CharClass { predicate: fn(char) -> bool },
    /// An anchored regex; the longest anchored match wins.
    Regex { regex: ::regex::Regex },
    /// Each child in order.
    Sequence {
        children: Vec<TokenId>,
        passage: Option<PassageFn>,
    },
    /// The first child that matches, in declared order.
    Choice { children: Vec<TokenId> },
    /// A child matched greedily between `min` and `max` times, with an
    /// optional separator between elements.
    Repeat {
        child: TokenId,
        min: usize,
        max: Option<usize>,
        separator: Option<TokenId>,
    },
    /// A child or nothing.
    Optional { child: TokenId },
    /// A layout token from the pre-lexed barrier list.
    Barrier,
    /// A user-defined leaf.
    Custom { matcher: LeafFn },
}

/// Match the token pattern `token` at `position`.
///
/// On failure the barrier cursor is left exactly where it was, an error has
/// been recorded on the context (unless the mode suppressed it), and the
/// caller gets `Err(Reported)`.
pub(crate) fn try_match(
    ctx: &mut ParserContext<'_>,
    token: TokenId,
    position: usize,
) -> Result<ParsedElement, Reported> {
    let pattern = ctx.grammar().token(token);
    let cursor = ctx.barriers.cursor();
    let result = match &pattern.kind {
        TokenPatternKind::Literal {
            text,
            case_insensitive,
        } => literal::match_literal(ctx, pattern, text, *case_insensitive, position),
        TokenPatternKind::CharClass { predicate } => {
            chars::match_char_class(ctx, pattern, *predicate, position)
        }
        TokenPatternKind::Regex { regex } => regex::match_regex(ctx, pattern, regex, position),
        TokenPatternKind::Sequence { children, passage } => {
            composite::match_sequence(ctx, pattern, children, passage.as_ref(), position)
        }
        TokenPatternKind::Choice { children } => {
            composite::match_choice(ctx, children, position)
        }
        TokenPatternKind::Repeat {
            child,
            min,
            max,
            separator,
        } => composite::match_repeat(ctx, pattern, *child, *min, *max, *separator, position),
        TokenPatternKind::Optional { child } => {
            composite::match_optional(ctx, pattern, *child, position)
        }
        TokenPatternKind::Barrier => barrier::match_barrier(ctx, pattern, position),
        TokenPatternKind::Custom { matcher } => {
            custom::match_custom(ctx, pattern, matcher, position)
        }
    };
    if result.is_err() {
        ctx.barriers.set_cursor(cursor);
    }
    result
}

/// Build the element for a successful match of `pattern`.
fn element(
    pattern: &TokenPattern,
    start_index: usize,
    length: usize,
    value: Value,
    children: Vec<ParsedElement>,
) -> ParsedElement {
    ParsedElement {
        id: ElementId::Token(pattern.id),
        exclude_from_ast: pattern.exclude_from_ast,
        start_index,
        length,
        value,
        children,
    }
}

/// Fail if a character-level match spanning `[position, end)` would step
/// over an unconsumed barrier. Barriers are layout boundaries; they must be
/// consumed by a barrier pattern, never swallowed as ordinary text.
fn guard_barrier(
    ctx: &mut ParserContext<'_>,
    end: usize,
) -> Result<(), Reported> {
    match ctx.barriers.next_unconsumed_start() {
        Some(start) if start < end => {
            let barrier = ctx
                .barriers
                .current()
                .cloned()
                .expect("internal error: barrier disappeared under cursor");
            let alias = ctx
                .grammar()
                .alias_of_token(barrier.token_id)
                .to_string();
            Err(ctx.error_unexpected_barrier(UnexpectedBarrierToken::new(barrier, alias)))
        }
        _ => Ok(()),
    }
}
