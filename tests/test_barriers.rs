//! Barrier tokens: layout boundaries interleaved with character-level
//! parsing.

use indoc::indoc;
use packrat_parse::{
    BarrierToken, ElementId, ErrorKind, GrammarBuilder, ParsedElement, Parser, RuleExpr, TokenId,
};

/// A small indentation lexer: INDENT covers the newly indented spaces,
/// DEDENT is a zero-length token at the end of the last indented line.
/// Only one level of nesting, which is all these grammars use.
fn indent_lexer(text: &str) -> Vec<BarrierToken> {
    let mut barriers = Vec::new();
    let mut indent = 0usize;
    let mut line_start = 0usize;
    let mut previous_line_end = 0usize;
    for line in text.split_inclusive('\n') {
        let content = line.strip_suffix('\n').unwrap_or(line);
        if !content.is_empty() {
            let spaces = content.len() - content.trim_start_matches(' ').len();
            if spaces > indent {
                barriers.push(BarrierToken::new(
                    line_start + indent,
                    spaces - indent,
                    "INDENT",
                ));
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

struct BlockGrammar {
    parser: Parser,
    indent: TokenId,
    dedent: TokenId,
}

/// `start := "if:" NL INDENT stmt+ DEDENT NL`, where a statement is a line
/// of lowercase letters.
fn block_grammar() -> BlockGrammar {
    let mut g = GrammarBuilder::new();
    let head = g.literal("if:");
    let nl = g.literal("\n");
    let indent = g.barrier("INDENT");
    let dedent = g.barrier("DEDENT");
    let word = g.regex("word", "[a-z]+");
    // Plain leading spaces (same-level continuation lines) are skipped;
    // the barrier guard keeps the skip from swallowing an INDENT.
    let spaces = g.regex("spaces", " +");
    g.skip(spaces);
    let stmt = g.rule(
        "stmt",
        RuleExpr::Sequence(vec![RuleExpr::Token(word)]),
    );
    let body = g.rule(
        "body",
        RuleExpr::Repeat {
            expr: Box::new(RuleExpr::Sequence(vec![
                RuleExpr::Rule(stmt),
                RuleExpr::Optional(Box::new(RuleExpr::Token(nl))),
            ])),
            min: 1,
            max: None,
            separator: None,
        },
    );
    let start = g.rule(
        "start",
        RuleExpr::Sequence(vec![
            RuleExpr::Token(head),
            RuleExpr::Token(nl),
            RuleExpr::Token(indent),
            RuleExpr::Rule(body),
            RuleExpr::Token(dedent),
            RuleExpr::Token(nl),
        ]),
    );
    g.start(start);
    let parser = Parser::new(g.build().unwrap()).with_barrier_lexer(indent_lexer);
    BlockGrammar {
        parser,
        indent,
        dedent,
    }
}

#[test]
fn test_lexer_emits_expected_barriers() {
    let barriers = indent_lexer("if:\n  x\n");
    assert_eq!(
        barriers,
        vec![
            BarrierToken::new(4, 2, "INDENT"),
            BarrierToken::new(7, 0, "DEDENT"),
        ]
    );
}

#[test]
fn test_indented_block_parses() {
    let g = block_grammar();
    let result = g.parser.parse("if:\n  x\n");
    assert!(result.is_success(), "errors: {:?}", result.errors());

    // The INDENT and DEDENT elements appear in the tree with the barrier's
    // span and id.
    let root = result.root_element().unwrap();
    let indent_el = find_element(root, ElementId::Token(g.indent)).unwrap();
    assert_eq!((indent_el.start_index, indent_el.length), (4, 2));
    let dedent_el = find_element(root, ElementId::Token(g.dedent)).unwrap();
    assert_eq!((dedent_el.start_index, dedent_el.length), (7, 0));
}

#[test]
fn test_unindented_body_fails() {
    let g = block_grammar();
    assert!(!g.parser.parse("if:\nx\n").is_success());
}

#[test]
fn test_barrier_cannot_be_stepped_over() {
    // A grammar that tries to match the indentation as whitespace trips
    // over the INDENT barrier.
    let mut builder = GrammarBuilder::new();
    builder.barrier("INDENT");
    builder.barrier("DEDENT");
    let head = builder.literal("if:");
    let nl = builder.literal("\n");
    let spaces = builder.regex("spaces", " +");
    let word = builder.regex("word", "[a-z]+");
    let start = builder.rule(
        "start",
        RuleExpr::Sequence(vec![
            RuleExpr::Token(head),
            RuleExpr::Token(nl),
            RuleExpr::Token(spaces),
            RuleExpr::Token(word),
            RuleExpr::Token(nl),
        ]),
    );
    builder.start(start);
    let parser = Parser::new(builder.build().unwrap()).with_barrier_lexer(indent_lexer);

    let result = parser.parse("if:\n  x\n");
    assert!(!result.is_success());
    let err = result
        .errors()
        .iter()
        .find(|e| e.kind == ErrorKind::UnexpectedBarrier)
        .expect("expected an unexpected-barrier diagnostic");
    assert_eq!(err.position, 4);
    let barrier = err.barrier.as_ref().unwrap();
    assert_eq!(barrier.alias(), "INDENT");
    assert_eq!(barrier.barrier_index(), 0);
}

#[test]
fn test_barrier_monotonicity() {
    // Consumed barriers appear in list order and never overlap: with two
    // statements in the block, INDENT precedes DEDENT and their spans are
    // disjoint and ordered.
    let g = block_grammar();
    let input = indoc! {"
        if:
          ab
          cd
    "};
    let result = g.parser.parse(input);
    assert!(result.is_success(), "errors: {:?}", result.errors());

    let root = result.root_element().unwrap();
    let mut consumed = Vec::new();
    collect_barriers(root, &[g.indent, g.dedent], &mut consumed);
    assert_eq!(consumed.len(), 2);
    for pair in consumed.windows(2) {
        assert!(pair[0].start_index + pair[0].length <= pair[1].start_index);
    }
}

fn find_element(element: &ParsedElement, id: ElementId) -> Option<&ParsedElement> {
    if element.id == id {
        return Some(element);
    }
    element.children.iter().find_map(|c| find_element(c, id))
}

fn collect_barriers<'e>(
    element: &'e ParsedElement,
    barrier_ids: &[TokenId],
    out: &mut Vec<&'e ParsedElement>,
) {
    if let ElementId::Token(id) = element.id {
        if barrier_ids.contains(&id) {
            out.push(element);
        }
    }
    for child in &element.children {
        collect_barriers(child, barrier_ids, out);
    }
}
