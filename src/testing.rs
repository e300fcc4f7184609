//! Helpers shared by the unit tests: tiny grammars and assert functions.

use crate::barriers::BarrierToken;
use crate::grammar::GrammarBuilder;
use crate::parser::Parser;
use crate::patterns::CustomMatch;
use crate::rules::RuleExpr;

#[track_caller]
pub(crate) fn assert_parses(parser: &Parser, text: &str) {
    let result = parser.parse(text);
    assert!(
        result.is_success(),
        "parse of {text:?} failed: {:?}",
        result.errors()
    );
}

#[track_caller]
pub(crate) fn assert_no_parse(parser: &Parser, text: &str) {
    let result = parser.parse(text);
    assert!(
        !result.is_success(),
        "parse of {text:?} unexpectedly succeeded"
    );
}

#[track_caller]
pub(crate) fn assert_parse_error(parser: &Parser, text: &str, expected_message: &str) {
    match parser.try_parse(text) {
        Ok(_) => panic!("parse of {text:?} unexpectedly succeeded"),
        Err(err) => {
            let message = err.to_string();
            assert!(
                message.contains(expected_message),
                "got error {message:?}, expected it to contain {expected_message:?}"
            );
        }
    }
}

/// A parser whose start rule is a single literal.
pub(crate) fn literal_parser(text: &str) -> Parser {
    let mut g = GrammarBuilder::new();
    let token = g.literal(text);
    let start = g.rule("start", RuleExpr::Token(token));
    g.start(start);
    Parser::new(g.build().unwrap())
}

/// A parser whose start rule is a case-insensitive literal.
pub(crate) fn literal_ci_parser(text: &str) -> Parser {
    let mut g = GrammarBuilder::new();
    let token = g.literal_ci(text);
    let start = g.rule("start", RuleExpr::Token(token));
    g.start(start);
    Parser::new(g.build().unwrap())
}

/// A parser whose start rule is a single character-class pattern.
pub(crate) fn char_class_parser(alias: &str, predicate: fn(char) -> bool) -> Parser {
    let mut g = GrammarBuilder::new();
    let token = g.char_class(alias, predicate);
    let start = g.rule("start", RuleExpr::Token(token));
    g.start(start);
    Parser::new(g.build().unwrap())
}

/// A parser whose start rule is a single regex pattern.
pub(crate) fn regex_parser(alias: &str, pattern: &str) -> Parser {
    let mut g = GrammarBuilder::new();
    let token = g.regex(alias, pattern);
    let start = g.rule("start", RuleExpr::Token(token));
    g.start(start);
    Parser::new(g.build().unwrap())
}

/// A parser whose start rule is a single custom leaf pattern.
pub(crate) fn custom_parser(
    alias: &str,
    matcher: impl Fn(&str, usize) -> Option<CustomMatch> + Send + Sync + 'static,
) -> Parser {
    let mut g = GrammarBuilder::new();
    let token = g.custom(alias, matcher);
    let start = g.rule("start", RuleExpr::Token(token));
    g.start(start);
    Parser::new(g.build().unwrap())
}

/// A parser for a token-level sequence of literals.
pub(crate) fn token_sequence_parser(literals: &[&str]) -> Parser {
    let mut g = GrammarBuilder::new();
    let children = literals.iter().map(|s| g.literal(s)).collect();
    let seq = g.sequence("sequence", children);
    let start = g.rule("start", RuleExpr::Token(seq));
    g.start(start);
    Parser::new(g.build().unwrap())
}

/// A parser for a token-level ordered choice of literals.
pub(crate) fn token_choice_parser(literals: &[&str]) -> Parser {
    let mut g = GrammarBuilder::new();
    let children = literals.iter().map(|s| g.literal(s)).collect();
    let choice = g.choice("choice", children);
    let start = g.rule("start", RuleExpr::Token(choice));
    g.start(start);
    Parser::new(g.build().unwrap())
}

/// A parser for a token-level repetition of one literal.
pub(crate) fn token_repeat_parser(literal: &str, min: usize, max: Option<usize>) -> Parser {
    let mut g = GrammarBuilder::new();
    let child = g.literal(literal);
    let repeat = g.repeat("repeat", child, min, max);
    let start = g.rule("start", RuleExpr::Token(repeat));
    g.start(start);
    Parser::new(g.build().unwrap())
}

/// A parser for a separated token-level repetition.
pub(crate) fn token_repeat_sep_parser(
    literal: &str,
    separator: &str,
    min: usize,
    max: Option<usize>,
) -> Parser {
    let mut g = GrammarBuilder::new();
    let child = g.literal(literal);
    let sep = g.literal(separator);
    let repeat = g.repeat_sep("repeat", child, sep, min, max);
    let start = g.rule("start", RuleExpr::Token(repeat));
    g.start(start);
    Parser::new(g.build().unwrap())
}

/// A parser matching `optional(first) second`.
pub(crate) fn token_optional_then_parser(first: &str, second: &str) -> Parser {
    let mut g = GrammarBuilder::new();
    let first = g.literal(first);
    let opt = g.optional("maybe", first);
    let second = g.literal(second);
    let seq = g.sequence("sequence", vec![opt, second]);
    let start = g.rule("start", RuleExpr::Token(seq));
    g.start(start);
    Parser::new(g.build().unwrap())
}

/// An indentation lexer good enough for tests: one INDENT covering the new
/// leading spaces when a line indents, one zero-length DEDENT at the end of
/// the last indented line when it dedents back out.
pub(crate) fn indent_lexer(text: &str) -> Vec<BarrierToken> {
    let mut barriers = Vec::new();
    let mut indent = 0usize;
    let mut line_start = 0usize;
    let mut previous_line_end = 0usize;
    for line in text.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        if !content.is_empty() {
            let spaces = content.len() - content.trim_start_matches(' ').len();
            if spaces > indent {
                barriers.push(BarrierToken::new(line_start + indent, spaces - indent, "INDENT"));
            } else if spaces < indent {
                barriers.push(BarrierToken::new(previous_line_end, 0, "DEDENT"));
            }
            indent = spaces;
        }
        previous_line_end = line_start + content.len();
        line_start += line.len();
    }
    if indent > 0 {
        barriers.push(BarrierToken::new(previous_line_end, 0, "DEDENT"));
    }
    barriers
}

/// An indentation-aware grammar for inputs like `"if:\n  x\n"`:
/// `start := "if:" NL INDENT "x" DEDENT NL`.
pub(crate) fn indent_block_parser() -> Parser {
    let mut g = GrammarBuilder::new();
    let head = g.literal("if:");
    let nl = g.literal("\n");
    let indent = g.barrier("INDENT");
    let dedent = g.barrier("DEDENT");
    let x = g.literal("x");
    let start = g.rule(
        "start",
        RuleExpr::Sequence(vec![
            RuleExpr::Token(head),
            RuleExpr::Token(nl),
            RuleExpr::Token(indent),
            RuleExpr::Token(x),
            RuleExpr::Token(dedent),
            RuleExpr::Token(nl),
        ]),
    );
    g.start(start);
    Parser::new(g.build().unwrap()).with_barrier_lexer(indent_lexer)
}

/// Same input language as [`indent_block_parser`], but the grammar tries to
/// chew through the indentation as plain text instead of consuming the
/// barriers.
pub(crate) fn barrier_blind_parser() -> Parser {
    let mut g = GrammarBuilder::new();
    // Register the barrier patterns so the lexer's aliases resolve, even
    // though no rule consumes them.
    g.barrier("INDENT");
    g.barrier("DEDENT");
    let head = g.literal("if:");
    let nl = g.literal("\n");
    let spaces = g.literal("  ");
    let x = g.literal("x");
    let start = g.rule(
        "start",
        RuleExpr::Sequence(vec![
            RuleExpr::Token(head),
            RuleExpr::Token(nl),
            RuleExpr::Token(spaces),
            RuleExpr::Token(x),
            RuleExpr::Token(nl),
        ]),
    );
    g.start(start);
    Parser::new(g.build().unwrap()).with_barrier_lexer(indent_lexer)
}

/// A grammar whose lexer emits a barrier the rules never consume.
pub(crate) fn trailing_barrier_parser() -> Parser {
    let mut g = GrammarBuilder::new();
    g.barrier("EOL");
    let x = g.literal("x");
    let start = g.rule("start", RuleExpr::Token(x));
    g.start(start);
    Parser::new(g.build().unwrap())
        .with_barrier_lexer(|text| vec![BarrierToken::new(text.len(), 0, "EOL")])
}
