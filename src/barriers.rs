//! Barrier tokens: pre-lexed layout boundaries and the cursor that walks
//! them.
//!
//! The host lexes layout tokens (INDENT, DEDENT, NEWLINE, ...) before the
//! parse and hands them over as a [`BarrierToken`] list. The engine resolves
//! each alias to its token pattern and walks the list with a cursor,
//! interleaved with character-level matching: a barrier must be consumed
//! exactly when the parse position reaches it, never stepped over.

use crate::grammar::{Grammar, TokenId};

/// A caller-supplied barrier token, identified by the alias of the barrier
/// pattern it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarrierToken {
    /// Byte offset where the barrier starts.
    pub start_index: usize,
    /// Length of the barrier in bytes. Zero-length barriers (a DEDENT at a
    /// line start, say) are common.
    pub length: usize,
    /// Alias of the barrier token pattern in the grammar.
    pub token_alias: String,
}

impl BarrierToken {
    /// Convenience constructor.
    pub fn new(start_index: usize, length: usize, token_alias: impl Into<String>) -> Self {
        BarrierToken {
            start_index,
            length,
            token_alias: token_alias.into(),
        }
    }
}

/// The engine-internal form of a barrier: alias resolved to a token id, plus
/// the barrier's index within the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct IntermediateBarrierToken {
    pub(crate) token_id: TokenId,
    pub(crate) index: u32,
    pub(crate) start_index: usize,
    pub(crate) length: usize,
}

/// The resolved barrier list plus the cursor position within it.
///
/// The cursor is an index into the list; it only ever moves forward during a
/// successful match, and is saved and restored around backtracking the same
/// way the text position is.
#[derive(Debug, Clone)]
pub(crate) struct BarrierStream {
    tokens: Vec<IntermediateBarrierToken>,
    cursor: u32,
}

impl BarrierStream {
    /// Resolve a caller-supplied barrier list against the grammar.
    ///
    /// # Panics
    ///
    /// The list is a host contract: it must be sorted strictly by text
    /// position, non-overlapping, and use only aliases the grammar declares
    /// as barrier patterns. Violations panic.
    pub(crate) fn from_tokens(grammar: &Grammar, tokens: &[BarrierToken]) -> Self {
        let mut resolved = Vec::with_capacity(tokens.len());
        let mut previous_end: Option<usize> = None;
        let mut previous_start: Option<usize> = None;
        for (index, token) in tokens.iter().enumerate() {
            let token_id = grammar
                .barrier_by_alias(&token.token_alias)
                .unwrap_or_else(|| {
                    panic!(
                        "barrier alias {:?} is not a barrier pattern in this grammar",
                        token.token_alias
                    )
                });
            if let (Some(end), Some(start)) = (previous_end, previous_start) {
                assert!(
                    token.start_index > start && token.start_index >= end,
                    "barrier list must be sorted and non-overlapping; \
                     barrier {index} at {} follows one ending at {end}",
                    token.start_index,
                );
            }
            previous_end = Some(token.start_index + token.length);
            previous_start = Some(token.start_index);
            resolved.push(IntermediateBarrierToken {
                token_id,
                index: index as u32,
                start_index: token.start_index,
                length: token.length,
            });
        }
        BarrierStream {
            tokens: resolved,
            cursor: 0,
        }
    }

    #[cfg(test)]
    pub(crate) fn empty() -> Self {
        BarrierStream {
            tokens: Vec::new(),
            cursor: 0,
        }
    }

    /// The barrier the cursor currently points at, if any remain.
    pub(crate) fn current(&self) -> Option<&IntermediateBarrierToken> {
        self.tokens.get(self.cursor as usize)
    }

    /// Start position of the next unconsumed barrier. Character-level
    /// matching may not extend past this offset.
    pub(crate) fn next_unconsumed_start(&self) -> Option<usize> {
        self.current().map(|b| b.start_index)
    }

    pub(crate) fn cursor(&self) -> u32 {
        self.cursor
    }

    pub(crate) fn set_cursor(&mut self, cursor: u32) {
        debug_assert!(cursor as usize <= self.tokens.len());
        self.cursor = cursor;
    }

    pub(crate) fn advance(&mut self) {
        debug_assert!((self.cursor as usize) < self.tokens.len());
        self.cursor += 1;
    }

    /// Consume every barrier that starts before `position`. Recovery uses
    /// this when it skips a region of text wholesale.
    pub(crate) fn skip_through(&mut self, position: usize) {
        while let Some(b) = self.current() {
            if b.start_index < position {
                self.cursor += 1;
            } else {
                break;
            }
        }
    }

    /// Number of barriers not yet consumed.
    #[cfg(test)]
    pub(crate) fn remaining(&self) -> usize {
        self.tokens.len() - self.cursor as usize
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.tokens.len()
    }
}
