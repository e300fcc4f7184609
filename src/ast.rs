//! Building the AST from the parsed-element tree.

use crate::element::{ParsedElement, Value};
use crate::grammar::ElementId;

/// One node of the built AST.
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    /// The pattern or rule that produced this node.
    pub id: ElementId,
    /// Byte offset where the node's match begins.
    pub start_index: usize,
    /// Length of the node's match in bytes.
    pub length: usize,
    /// The node's intermediate value.
    pub value: Value,
    /// Child nodes, in source order.
    pub children: Vec<AstNode>,
}

impl AstNode {
    /// Byte offset one past the end of the node's match.
    pub fn end_index(&self) -> usize {
        self.start_index + self.length
    }

    /// Total number of nodes in this subtree, this one included.
    pub fn node_count(&self) -> usize {
        1 + self.children.iter().map(AstNode::node_count).sum::<usize>()
    }

    /// The slice of `source` this node covers.
    pub fn text<'s>(&self, source: &'s str) -> &'s str {
        &source[self.start_index..self.end_index()]
    }
}

/// Build the AST for a root element. Elements marked excluded are spliced
/// out, their children promoted into the parent's child list. The walk is
/// pure; it reads the element tree and touches nothing else.
pub(crate) fn build(root: &ParsedElement) -> AstNode {
    debug_assert!(!root.exclude_from_ast, "the root element is never excluded");
    AstNode {
        id: root.id,
        start_index: root.start_index,
        length: root.length,
        value: root.value.clone(),
        children: collect(&root.children),
    }
}

fn collect(elements: &[ParsedElement]) -> Vec<AstNode> {
    let mut nodes = Vec::with_capacity(elements.len());
    for element in elements {
        if element.exclude_from_ast {
            nodes.extend(collect(&element.children));
        } else {
            nodes.push(build(element));
        }
    }
    nodes
}
