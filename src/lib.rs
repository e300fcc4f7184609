//! A grammar-driven packrat parsing engine.
//!
//! You declare a grammar of token patterns and rules at runtime, point the
//! parser at a string, and get back an AST with positions and intermediate
//! values, or a set of diagnostics. The engine is a memoized recursive
//! descent parser with ordered choice, so grammars read like PEGs: the
//! first alternative that matches wins, and every `(rule, position)` pair
//! is evaluated at most once per parse.
//!
//! # How to use packrat-parse
//!
//! Build a grammar, wrap it in a [`Parser`], parse:
//!
//! ```
//! use packrat_parse::{GrammarBuilder, Parser, RuleExpr};
//!
//! let mut g = GrammarBuilder::new();
//! let number = g.regex("number", "[0-9]+");
//! let plus = g.literal("+");
//! let sum = g.rule(
//!     "sum",
//!     RuleExpr::Repeat {
//!         expr: Box::new(RuleExpr::Token(number)),
//!         min: 1,
//!         max: None,
//!         separator: Some(Box::new(RuleExpr::Token(plus))),
//!     },
//! );
//! g.start(sum);
//!
//! let parser = Parser::new(g.build().unwrap());
//! let result = parser.parse("1+20+3");
//! assert!(result.is_success());
//! assert_eq!(result.ast().unwrap().children.len(), 3);
//! ```
//!
//! Rules can reference each other cyclically (declare first, define later),
//! attach value projections that turn matched elements into your own
//! values, and carry [`ErrorRecovery`] policies so one malformed statement
//! doesn't take the whole parse down with it.
//!
//! # Barrier tokens
//!
//! Layout-sensitive languages lex INDENT/DEDENT style tokens before
//! parsing. Hand the parser a barrier lexer and the engine threads the
//! resulting [`BarrierToken`] list through the parse: a barrier must be
//! consumed by a barrier pattern exactly where it stands, and
//! character-level matching can never step over one. See
//! [`GrammarBuilder::barrier`] and [`Parser::with_barrier_lexer`].
//!
//! # Incremental reparsing
//!
//! [`Parser::parse_incremental`] takes the previous [`ParseResult`] and a
//! list of [`TextChange`]s, invalidates exactly the memoized sub-parses
//! that looked at changed text, shifts the rest, and re-runs the start
//! rule. Untouched regions come straight out of the cache; the result is
//! equivalent to parsing the new text from scratch.
//!
//! # What this engine is not
//!
//! There is no grammar DSL here, no streaming input, and no tolerance for
//! left recursion: like any packrat parser, a directly left-recursive rule
//! fails its inner lookup and must be rewritten as a repetition. Indirect
//! left recursion is likewise unsupported; the engine cuts it rather than
//! looping, but which alternative wins is unspecified.

#![warn(missing_docs)]

mod ast;
mod barriers;
mod context;
mod element;
mod error;
mod format;
mod grammar;
mod incremental;
mod memo;
mod parser;
mod patterns;
mod position;
mod recovery;
mod rules;
#[cfg(test)]
mod testing;

pub use ast::AstNode;
pub use barriers::BarrierToken;
pub use context::{ContextRef, ErrorHandlingMode, Reported};
pub use element::{MatchData, ParsedElement, Value};
pub use error::{
    ErrorKind, GrammarError, ParseError, ParsingError, UnexpectedBarrierToken,
};
pub use format::{
    DefaultFormatter, ErrorFormatter, ErrorFormattingFlags, ErrorGroup, ErrorReport,
};
pub use grammar::{ElementId, Grammar, GrammarBuilder, RuleId, TokenId};
pub use incremental::TextChange;
pub use memo::MemoStats;
pub use parser::{BarrierLexer, ParseResult, Parser};
pub use patterns::{CustomMatch, LeafFn, PassageFn};
pub use position::LineMap;
pub use recovery::{ErrorRecovery, RecoveryStrategy};
pub use rules::{ProjectionFn, RuleExpr};
