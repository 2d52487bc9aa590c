use std::collections::{BTreeSet, HashMap, HashSet};

use tracing::trace;

use super::{DerivationNode, DerivationTree, NodeId};
use crate::grammar::{GrammarModel, Rewrite, Symbol};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SyntaxError {
    #[error("`{0}` is not a rule of the grammar")]
    UnknownRule(String),
    #[error("Input of {len} bytes does not derive from `{rule}`")]
    NoDerivation { rule: String, len: usize },
}

// Parses `text` as a complete derivation of `rule`.
//
// Recognition fills a chart of `ends[rule][i]`, every `j` such that `rule`
// derives `text[i..j]`, by iterating to a fixpoint, so left recursion and
// empty literals need no special treatment. The first alternative (and the
// shortest first split) that completes is the one kept.
pub fn parse(model: &GrammarModel, text: &str, rule: &str) -> Result<DerivationTree, SyntaxError> {
    let (name, _) = model
        .rules()
        .get_key_value(rule)
        .ok_or_else(|| SyntaxError::UnknownRule(rule.to_string()))?;

    let mut chart = Chart::new(model.rules(), text.as_bytes());
    chart.fill();

    let mut path = HashSet::new();
    let parsed = chart
        .build(name, 0, text.len(), &mut path)
        .ok_or_else(|| SyntaxError::NoDerivation {
            rule: rule.to_string(),
            len: text.len(),
        })?;

    let mut nodes = Vec::new();
    push_parsed(&mut nodes, parsed, None);
    let mut tree = DerivationTree::from_nodes(nodes);
    tree.finalize();
    Ok(tree)
}

// A derivation found in the chart, before it is laid out in an arena
struct Parsed {
    symbol: Symbol,
    alternative: Option<usize>,
    children: Vec<Parsed>,
}

fn push_parsed(nodes: &mut Vec<DerivationNode>, parsed: Parsed, parent: Option<NodeId>) -> NodeId {
    let id = NodeId(nodes.len());
    let mut node = DerivationNode::leaf(parsed.symbol, parent);
    node.alternative = parsed.alternative;
    nodes.push(node);

    let children = parsed.children
        .into_iter()
        .map(|child| push_parsed(nodes, child, Some(id)))
        .collect();
    nodes[id.0].children = children;
    id
}

type Item<'a> = (&'a str, usize, usize);

struct Chart<'a> {
    rules: &'a HashMap<String, Rewrite>,
    text: &'a [u8],
    ends: HashMap<&'a str, Vec<BTreeSet<usize>>>,
}

impl<'a> Chart<'a> {
    fn new(rules: &'a HashMap<String, Rewrite>, text: &'a [u8]) -> Self {
        let ends = rules
            .keys()
            .map(|name| (name.as_str(), vec![BTreeSet::new(); text.len() + 1]))
            .collect();
        Chart { rules, text, ends }
    }

    fn fill(&mut self) {
        let rules = self.rules;
        let mut rounds = 0;
        loop {
            rounds += 1;
            let mut changed = false;
            for (name, rewrite) in rules {
                for start in 0..=self.text.len() {
                    let found: BTreeSet<usize> = rewrite
                        .iter()
                        .flat_map(|alternative| self.sequence_ends(alternative, start))
                        .collect();

                    if let Some(slots) = self.ends.get_mut(name.as_str()) {
                        for end in found {
                            changed |= slots[start].insert(end);
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }
        trace!("Chart for {} bytes settled after {} rounds", self.text.len(), rounds);
    }

    fn ends_of(&self, rule: &str, start: usize) -> Option<&BTreeSet<usize>> {
        self.ends.get(rule).map(|slots| &slots[start])
    }

    fn derives(&self, rule: &str, start: usize, end: usize) -> bool {
        self.ends_of(rule, start).is_some_and(|ends| ends.contains(&end))
    }

    fn terminal_at(&self, literal: &str, start: usize) -> Option<usize> {
        self.text[start..]
            .starts_with(literal.as_bytes())
            .then(|| start + literal.len())
    }

    // Every position the symbol sequence can end at when started at `start`
    fn sequence_ends(&self, symbols: &[Symbol], start: usize) -> BTreeSet<usize> {
        let mut positions = BTreeSet::from([start]);
        for symbol in symbols {
            let mut next = BTreeSet::new();
            for &position in &positions {
                match symbol {
                    Symbol::Terminal(literal) => next.extend(self.terminal_at(literal, position)),
                    Symbol::Nonterminal(name) => {
                        if let Some(ends) = self.ends_of(name, position) {
                            next.extend(ends.iter().copied());
                        }
                    }
                }
            }
            if next.is_empty() {
                return next;
            }
            positions = next;
        }
        positions
    }

    // `path` holds the items being built further up; revisiting one would only
    // loop through unit or empty derivations
    fn build(&self, rule: &'a str, start: usize, end: usize, path: &mut HashSet<Item<'a>>) -> Option<Parsed> {
        if !self.derives(rule, start, end) {
            return None;
        }

        let item = (rule, start, end);
        if !path.insert(item) {
            return None;
        }

        let rewrite = &self.rules[rule];
        let parsed = rewrite.iter().enumerate().find_map(|(index, alternative)| {
            self.build_sequence(alternative, start, end, path).map(|children| Parsed {
                symbol: Symbol::Nonterminal(rule.to_string()),
                alternative: Some(index),
                children,
            })
        });

        path.remove(&item);
        parsed
    }

    fn build_sequence(&self, symbols: &'a [Symbol], start: usize, end: usize, path: &mut HashSet<Item<'a>>) -> Option<Vec<Parsed>> {
        let (first, rest) = match symbols.split_first() {
            Some(split) => split,
            None => return (start == end).then(Vec::new),
        };

        match first {
            Symbol::Terminal(literal) => {
                let next = self.terminal_at(literal, start).filter(|next| *next <= end)?;
                let mut tail = self.build_sequence(rest, next, end, path)?;
                tail.insert(0, Parsed {
                    symbol: first.clone(),
                    alternative: None,
                    children: Vec::new(),
                });
                Some(tail)
            }
            Symbol::Nonterminal(name) => {
                let splits: Vec<usize> = match self.ends_of(name, start) {
                    Some(ends) => ends.range(start..=end).copied().collect(),
                    None => return None,
                };

                for mid in splits {
                    if !self.sequence_ends(rest, mid).contains(&end) {
                        continue;
                    }
                    let head = match self.build(name, start, mid, path) {
                        Some(head) => head,
                        None => continue,
                    };
                    if let Some(mut tail) = self.build_sequence(rest, mid, end, path) {
                        tail.insert(0, head);
                        return Some(tail);
                    }
                }
                None
            }
        }
    }
}
