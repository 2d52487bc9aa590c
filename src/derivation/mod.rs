/*
    This module holds derivation trees: expansions of grammar symbols, either
    partial (while sampling) or complete (after rendering or parsing)
*/

pub mod chart;

use std::ops::Range;

use crate::grammar::{GrammarModel, Symbol};

pub use chart::SyntaxError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DerivationNode {
    pub symbol: Symbol,
    pub children: Vec<NodeId>,
    // Navigation only; the tree owns every node
    pub parent: Option<NodeId>,
    // Index of the alternative this node was expanded with
    pub alternative: Option<usize>,
    // Byte range in the rendered text. Meaningful after `finalize`.
    pub span: Range<usize>,
}

impl DerivationNode {
    fn leaf(symbol: Symbol, parent: Option<NodeId>) -> Self {
        DerivationNode {
            symbol,
            children: Vec::new(),
            parent,
            alternative: None,
            span: 0..0,
        }
    }

    // A nonterminal leaf still waiting for an alternative
    pub fn is_unexpanded(&self) -> bool {
        !self.symbol.is_terminal() && self.alternative.is_none()
    }
}

// Arena of derivation nodes. The root is always the first node.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationTree {
    nodes: Vec<DerivationNode>,
}

impl DerivationTree {
    pub fn new(root: Symbol) -> Self {
        DerivationTree {
            nodes: vec![DerivationNode::leaf(root, None)],
        }
    }

    pub fn root(&self) -> NodeId {
        NodeId(0)
    }

    pub fn node(&self, id: NodeId) -> &DerivationNode {
        &self.nodes[id.0]
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub fn children_symbols(&self, id: NodeId) -> Vec<&Symbol> {
        self.nodes[id.0].children.iter().map(|child| &self.nodes[child.0].symbol).collect()
    }

    // Position of a node among its parent's children
    pub fn child_index(&self, id: NodeId) -> Option<usize> {
        let parent = self.parent(id)?;
        self.nodes[parent.0].children.iter().position(|child| *child == id)
    }

    // Attaches one child per symbol of the chosen alternative and returns
    // their ids.
    pub fn expand(&mut self, id: NodeId, alternative: usize, symbols: &[Symbol]) -> Vec<NodeId> {
        let first = self.nodes.len();
        self.nodes.extend(symbols.iter().map(|symbol| DerivationNode::leaf(symbol.clone(), Some(id))));
        let children: Vec<NodeId> = (first..self.nodes.len()).map(NodeId).collect();

        let node = &mut self.nodes[id.0];
        node.alternative = Some(alternative);
        node.children = children.clone();
        children
    }

    pub fn unexpanded(&self) -> Vec<NodeId> {
        self.preorder().into_iter().filter(|id| self.node(*id).is_unexpanded()).collect()
    }

    // Node ids in document order, parents before their children.
    pub fn preorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack = vec![self.root()];
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id.0].children.iter().rev());
        }
        order
    }

    // Renders the terminals in document order and records every node's span.
    pub fn finalize(&mut self) -> String {
        let mut text = String::new();
        self.finalize_node(self.root(), &mut text);
        text
    }

    fn finalize_node(&mut self, id: NodeId, text: &mut String) {
        let start = text.len();
        if let Symbol::Terminal(literal) = &self.nodes[id.0].symbol {
            text.push_str(literal);
        }
        for i in 0..self.nodes[id.0].children.len() {
            let child = self.nodes[id.0].children[i];
            self.finalize_node(child, text);
        }
        self.nodes[id.0].span = start..text.len();
    }

    // Concatenation of the terminal literals. Unexpanded nonterminals
    // contribute nothing.
    pub fn render(&self) -> String {
        self.preorder()
            .into_iter()
            .filter_map(|id| match &self.node(id).symbol {
                Symbol::Terminal(literal) => Some(literal.as_str()),
                Symbol::Nonterminal(_) => None,
            })
            .collect()
    }

    // Renders a partial tree with unexpanded nonterminals shown as `<name>`,
    // returning the byte span of `focus` in that rendering.
    pub fn render_with_placeholders(&self, focus: NodeId) -> (String, Range<usize>) {
        let mut text = String::new();
        let mut focus_span = 0..0;
        self.placeholder_node(self.root(), focus, &mut text, &mut focus_span);
        (text, focus_span)
    }

    fn placeholder_node(&self, id: NodeId, focus: NodeId, text: &mut String, focus_span: &mut Range<usize>) {
        let start = text.len();
        let node = self.node(id);
        match &node.symbol {
            Symbol::Terminal(literal) => text.push_str(literal),
            Symbol::Nonterminal(name) if node.is_unexpanded() => {
                text.push('<');
                text.push_str(name);
                text.push('>');
            }
            Symbol::Nonterminal(_) => {
                for child in &node.children {
                    self.placeholder_node(*child, focus, text, focus_span);
                }
            }
        }
        if id == focus {
            *focus_span = start..text.len();
        }
    }

    // Primitive count of every subtree, indexed by node: one for the node
    // itself if its symbol is primitive, plus its children's counts.
    pub fn primitive_counts(&self, model: &GrammarModel) -> Vec<usize> {
        let mut counts = vec![0; self.nodes.len()];
        for id in self.preorder().into_iter().rev() {
            let node = self.node(id);
            let own = model.is_primitive(&node.symbol) as usize;
            counts[id.0] = own + node.children.iter().map(|child| counts[child.0]).sum::<usize>();
        }
        counts
    }

    pub fn primitive_count(&self, model: &GrammarModel) -> usize {
        self.primitive_counts(model)[self.root().0]
    }

    pub(crate) fn from_nodes(nodes: Vec<DerivationNode>) -> Self {
        DerivationTree { nodes }
    }
}
