//! Parsed elements and the intermediate values they carry.

use std::any::Any;
use std::sync::Arc;

use crate::grammar::ElementId;

/// The intermediate value a matched pattern carries up to value-projection
/// callbacks.
///
/// Most variants are produced by the engine itself: `Null` for literals and
/// epsilon matches, `Char` for character classes, `Match` for regex patterns,
/// `List` for sequences and repetitions. `Opaque` is the catch-all for
/// whatever a projection or a custom leaf pattern decides to produce.
#[derive(Clone)]
pub enum Value {
    /// No value. Literals, optionals that didn't match, and lookaheads.
    Null,
    /// A single matched character.
    Char(char),
    /// An owned string, typically produced by a projection.
    Text(String),
    /// An integer, typically produced by a projection.
    Int(i64),
    /// The match object of a regex pattern.
    Match(MatchData),
    /// Ordered child values of a sequence or repetition.
    List(Vec<Value>),
    /// An arbitrary user value produced by a projection or custom pattern.
    Opaque(Arc<dyn Any + Send + Sync>),
}

/// What a regex pattern matched: the span relative to the whole input, plus
/// the matched text itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MatchData {
    /// Byte offset where the match begins.
    pub start: usize,
    /// Byte offset one past the end of the match.
    pub end: usize,
    /// The matched text.
    pub text: String,
}

impl std::fmt::Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => f.write_str("Null"),
            Value::Char(c) => f.debug_tuple("Char").field(c).finish(),
            Value::Text(s) => f.debug_tuple("Text").field(s).finish(),
            Value::Int(i) => f.debug_tuple("Int").field(i).finish(),
            Value::Match(m) => f.debug_tuple("Match").field(m).finish(),
            Value::List(items) => f.debug_tuple("List").field(items).finish(),
            Value::Opaque(_) => f.write_str("Opaque(..)"),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Match(a), Value::Match(b)) => a == b,
            (Value::List(a), Value::List(b)) => a == b,
            // Opaque values compare by identity; two handles to the same
            // allocation are the same value.
            (Value::Opaque(a), Value::Opaque(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl Value {
    /// True if this is `Value::Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Downcast an `Opaque` value to a concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match self {
            Value::Opaque(v) => v.downcast_ref(),
            _ => None,
        }
    }
}

/// A successful match of a token pattern or rule at some position.
///
/// Failure does not get an element; evaluator functions return
/// `Result<ParsedElement, Reported>` and the error lives on the context.
/// A zero-length element is legitimate: epsilon matches and lookaheads
/// produce them.
#[derive(Clone, Debug, PartialEq)]
pub struct ParsedElement {
    /// Which pattern or rule produced this element.
    pub id: ElementId,
    /// Elements marked excluded are spliced out of the AST, their children
    /// promoted into the parent.
    pub exclude_from_ast: bool,
    /// Byte offset where the match begins.
    pub start_index: usize,
    /// Length of the match in bytes. Zero is allowed.
    pub length: usize,
    /// The intermediate value carried up to projection callbacks.
    pub value: Value,
    /// Child elements, in match order.
    pub children: Vec<ParsedElement>,
}

impl ParsedElement {
    #[cfg(test)]
    pub(crate) fn leaf(id: ElementId, start_index: usize, length: usize, value: Value) -> Self {
        ParsedElement {
            id,
            exclude_from_ast: false,
            start_index,
            length,
            value,
            children: Vec::new(),
        }
    }

    /// Byte offset one past the end of the match.
    pub fn end_index(&self) -> usize {
        self.start_index + self.length
    }

    /// The slice of `source` this element matched.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start_index..self.end_index()]
    }

    /// Total number of elements in this subtree, this one included.
    pub fn subtree_len(&self) -> usize {
        1 + self.children.iter().map(ParsedElement::subtree_len).sum::<usize>()
    }

    /// Shift every position in this subtree by `delta` bytes. Used when the
    /// incremental driver re-keys cache entries that survived a text change.
    pub(crate) fn shift(&mut self, delta: isize) {
        self.start_index = offset_by(self.start_index, delta);
        if let Value::Match(m) = &mut self.value {
            m.start = offset_by(m.start, delta);
            m.end = offset_by(m.end, delta);
        }
        for child in &mut self.children {
            child.shift(delta);
        }
    }
}

pub(crate) fn offset_by(position: usize, delta: isize) -> usize {
    if delta < 0 {
        position - delta.unsigned_abs()
    } else {
        position + delta as usize
    }
}
