use std::collections::{HashMap, HashSet};

use itertools::Itertools;
use rand::distributions::WeightedIndex;
use tracing::{debug, warn};

use super::cost::{Cost, CostQuery};
use super::{terminal_name, Alternative, Grammar, Rewrite, Symbol};
use crate::derivation::chart;
use crate::derivation::{DerivationTree, NodeId, SyntaxError};
use crate::error_handling::describe;
use crate::parser::{self, CompileErrors};

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("{}", describe(.0))]
    Compile(CompileErrors),
    #[error("Start symbol `{0}` has no usable rule")]
    UnknownStart(String),
    #[error("Weights given for `{0}`, which is not a rule")]
    UnknownWeightedRule(String),
    #[error("`{rule}` has {alternatives} alternatives but {weights} weights")]
    WeightCountMismatch {
        rule: String,
        alternatives: usize,
        weights: usize,
    },
    #[error("Weights for `{0}` must be finite, non-negative and not all zero")]
    InvalidWeights(String),
}

impl From<CompileErrors> for ModelError {
    fn from(errors: CompileErrors) -> Self {
        ModelError::Compile(errors)
    }
}

// Options for compiling a rule set into a [`GrammarModel`].
#[derive(Debug, Clone, Default)]
pub struct ModelConfig {
    // Overrides the rule set's own start symbol
    pub start: Option<String>,
    // Nonterminals counted as one unit toward size budgets
    pub primitives: Vec<String>,
    // Sampling weights, one per alternative in rule-set order
    pub weights: HashMap<String, Vec<f64>>,
}

impl ModelConfig {
    pub fn with_start(mut self, start: impl Into<String>) -> Self {
        self.start = Some(start.into());
        self
    }

    pub fn with_primitives<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.primitives.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_weights(mut self, rule: impl Into<String>, weights: Vec<f64>) -> Self {
        self.weights.insert(rule.into(), weights);
        self
    }
}

// A compiled rule set: the production table with dead rules removed, plus
// the minimum-primitive-cost of every symbol and alternative.
//
// Immutable once built, so one model can back any number of samplers and
// mutation engines, across threads if needed.
#[derive(Debug, Clone)]
pub struct GrammarModel {
    vocabulary: Vec<String>,
    terminal_map: HashMap<String, String>,
    rev_terminal_map: HashMap<String, String>,
    rules: HashMap<String, Rewrite>,
    primitives: HashSet<String>,
    costs: HashMap<Symbol, Cost>,
    alternative_costs: HashMap<String, Vec<Cost>>,
    start: Symbol,
    weights: HashMap<String, Vec<f64>>,
    choosers: HashMap<String, WeightedIndex<f64>>,
}

// Alternatives tagged with their index in the rule set as written, so that
// weights can follow them through elimination
type TaggedRules = HashMap<String, Vec<(usize, Alternative)>>;

impl GrammarModel {
    pub fn build(grammar: Grammar, config: &ModelConfig) -> Result<Self, ModelError> {
        let start_name = config.start.clone().unwrap_or(grammar.start_symbol);

        validate_weights(&grammar.rules, &config.weights)?;

        let tagged: TaggedRules = grammar.rules
            .into_iter()
            .map(|(name, rewrite)| (name, rewrite.into_iter().enumerate().collect()))
            .collect();
        let tagged = eliminate_dead_rules(tagged);

        let weights = realign_weights(&tagged, &config.weights)?;
        let choosers: HashMap<String, WeightedIndex<f64>> = weights
            .iter()
            .map(|(rule, values)| {
                WeightedIndex::new(values)
                    .map(|chooser| (rule.clone(), chooser))
                    .map_err(|_| ModelError::InvalidWeights(rule.clone()))
            })
            .collect::<Result<_, _>>()?;

        let rules: HashMap<String, Rewrite> = tagged
            .into_iter()
            .map(|(name, alternatives)| (name, alternatives.into_iter().map(|(_, a)| a).collect()))
            .collect();

        if !rules.contains_key(&start_name) {
            return Err(ModelError::UnknownStart(start_name));
        }

        let primitives: HashSet<String> = config.primitives.iter().cloned().collect();
        for name in primitives.iter().sorted() {
            if !rules.contains_key(name) {
                warn!("Primitive `{}` is not a rule of the grammar", name);
            }
        }

        let vocabulary = rules
            .values()
            .flatten()
            .flatten()
            .filter_map(|symbol| match symbol {
                Symbol::Terminal(literal) => Some(literal.clone()),
                Symbol::Nonterminal(_) => None,
            })
            .sorted()
            .dedup()
            .collect_vec();
        let terminal_map: HashMap<String, String> = vocabulary
            .iter()
            .map(|literal| (terminal_name(literal), literal.clone()))
            .collect();
        let rev_terminal_map = terminal_map
            .iter()
            .map(|(name, literal)| (literal.clone(), name.clone()))
            .collect();

        let query = CostQuery::new(&rules, &primitives);
        let symbols: HashSet<Symbol> = rules
            .values()
            .flatten()
            .flatten()
            .cloned()
            .chain(rules.keys().map(|name| Symbol::nonterminal(name)))
            .collect();
        let costs: HashMap<Symbol, Cost> = symbols
            .into_iter()
            .map(|symbol| {
                let cost = query.cost(&symbol);
                (symbol, cost)
            })
            .collect();

        let alternative_costs = rules
            .iter()
            .map(|(name, rewrite)| {
                let per_alternative = rewrite
                    .iter()
                    .map(|alternative| alternative.iter().map(|s| costs[s]).sum::<Cost>())
                    .collect_vec();
                (name.clone(), per_alternative)
            })
            .collect();

        debug!(
            "Compiled grammar: {} rules, {} terminals, start `{}` costs {}",
            rules.len(),
            vocabulary.len(),
            start_name,
            costs[&Symbol::nonterminal(&start_name)]
        );

        Ok(GrammarModel {
            vocabulary,
            terminal_map,
            rev_terminal_map,
            rules,
            primitives,
            costs,
            alternative_costs,
            start: Symbol::Nonterminal(start_name),
            weights,
            choosers,
        })
    }

    // Reads a BNF rule set and compiles it in one step.
    pub fn from_bnf(text: &str, config: &ModelConfig) -> Result<Self, ModelError> {
        let grammar = parser::parse_str(text, "<inline>")?;
        GrammarModel::build(grammar, config)
    }

    pub fn vocabulary(&self) -> &[String] {
        &self.vocabulary
    }

    // Terminal name to literal
    pub fn vocabulary_map(&self) -> &HashMap<String, String> {
        &self.terminal_map
    }

    // Terminal literal to name
    pub fn rev_vocabulary_map(&self) -> &HashMap<String, String> {
        &self.rev_terminal_map
    }

    pub fn start_symbol(&self) -> &Symbol {
        &self.start
    }

    pub fn start_name(&self) -> &str {
        match &self.start {
            Symbol::Nonterminal(name) => name,
            Symbol::Terminal(literal) => literal,
        }
    }

    pub fn rules(&self) -> &HashMap<String, Rewrite> {
        &self.rules
    }

    pub fn alternatives(&self, rule: &str) -> Option<&Rewrite> {
        self.rules.get(rule)
    }

    pub fn primitives(&self) -> &HashSet<String> {
        &self.primitives
    }

    pub fn is_primitive(&self, symbol: &Symbol) -> bool {
        match symbol {
            Symbol::Nonterminal(name) => self.primitives.contains(name),
            Symbol::Terminal(_) => false,
        }
    }

    // Minimum-primitive-cost of a symbol. Symbols that do not occur in the
    // compiled grammar are infinitely expensive.
    pub fn cost(&self, symbol: &Symbol) -> Cost {
        match symbol {
            Symbol::Terminal(_) => Cost::ZERO,
            Symbol::Nonterminal(_) => self.costs.get(symbol).copied().unwrap_or(Cost::Infinite),
        }
    }

    pub fn costs(&self) -> &HashMap<Symbol, Cost> {
        &self.costs
    }

    pub fn alternative_costs(&self, rule: &str) -> Option<&[Cost]> {
        self.alternative_costs.get(rule).map(Vec::as_slice)
    }

    // Cheapest alternative of a rule. Equal to the rule's own cost unless it
    // is a primitive, whose unit is counted separately from its contents.
    pub fn expansion_cost(&self, rule: &str) -> Cost {
        self.alternative_costs(rule)
            .and_then(|costs| costs.iter().min().copied())
            .unwrap_or(Cost::Infinite)
    }

    // Fewest primitives in any complete derivation rooted at `symbol`,
    // counting the symbol itself when it is a primitive.
    pub fn min_primitives(&self, symbol: &Symbol) -> Cost {
        match symbol {
            Symbol::Terminal(_) => Cost::ZERO,
            Symbol::Nonterminal(name) => Cost::Finite(self.is_primitive(symbol) as usize) + self.expansion_cost(name),
        }
    }

    pub fn weights(&self, rule: &str) -> Option<&[f64]> {
        self.weights.get(rule).map(Vec::as_slice)
    }

    // Draws alternative indices of a weighted rule
    pub fn chooser(&self, rule: &str) -> Option<&WeightedIndex<f64>> {
        self.choosers.get(rule)
    }

    pub fn parse(&self, text: &str) -> Result<DerivationTree, SyntaxError> {
        chart::parse(self, text, self.start_name())
    }

    pub fn parse_rule(&self, text: &str, rule: &str) -> Result<DerivationTree, SyntaxError> {
        chart::parse(self, text, rule)
    }

    // Which alternative of `rule` the children of `node` spell out.
    pub fn match_production(&self, tree: &DerivationTree, node: NodeId, rule: &str) -> Option<usize> {
        let children = tree.children_symbols(node);
        self.rules
            .get(rule)?
            .iter()
            .position(|alternative| alternative.iter().eq(children.iter().copied()))
    }
}

fn validate_weights(rules: &HashMap<String, Rewrite>, weights: &HashMap<String, Vec<f64>>) -> Result<(), ModelError> {
    for (rule, values) in weights.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
        let rewrite = rules
            .get(rule)
            .ok_or_else(|| ModelError::UnknownWeightedRule(rule.clone()))?;

        if rewrite.len() != values.len() {
            return Err(ModelError::WeightCountMismatch {
                rule: rule.clone(),
                alternatives: rewrite.len(),
                weights: values.len(),
            });
        }

        if !usable_weights(values) {
            return Err(ModelError::InvalidWeights(rule.clone()));
        }
    }
    Ok(())
}

// The total must stay finite too, or the weights cannot be drawn from
fn usable_weights(values: &[f64]) -> bool {
    values.iter().all(|w| w.is_finite() && *w >= 0.0)
        && values.iter().any(|w| *w > 0.0)
        && values.iter().sum::<f64>().is_finite()
}

// Removes alternatives that mention undefined nonterminals, then rules left
// with no alternatives, until nothing changes
fn eliminate_dead_rules(mut rules: TaggedRules) -> TaggedRules {
    loop {
        let defined: HashSet<String> = rules
            .iter()
            .filter(|(_, alternatives)| !alternatives.is_empty())
            .map(|(name, _)| name.clone())
            .collect();

        let mut changed = false;
        for (name, alternatives) in rules.iter_mut() {
            let before = alternatives.len();
            alternatives.retain(|(_, alternative)| alternative.iter().all(|symbol| match symbol {
                Symbol::Terminal(_) => true,
                Symbol::Nonterminal(n) => defined.contains(n),
            }));
            if alternatives.len() != before {
                debug!("Removed {} unresolvable alternative(s) of `{}`", before - alternatives.len(), name);
                changed = true;
            }
        }

        let dead = rules
            .iter()
            .filter(|(_, alternatives)| alternatives.is_empty())
            .map(|(name, _)| name.clone())
            .sorted()
            .collect_vec();
        for name in dead {
            debug!("Removed rule `{}`", name);
            rules.remove(&name);
            changed = true;
        }

        if !changed {
            return rules;
        }
    }
}

fn realign_weights(rules: &TaggedRules, weights: &HashMap<String, Vec<f64>>) -> Result<HashMap<String, Vec<f64>>, ModelError> {
    let mut aligned = HashMap::with_capacity(weights.len());
    for (rule, values) in weights {
        let alternatives = match rules.get(rule) {
            Some(alternatives) => alternatives,
            None => {
                debug!("Dropped weights of removed rule `{}`", rule);
                continue;
            }
        };

        let kept = alternatives.iter().map(|(index, _)| values[*index]).collect_vec();
        if !usable_weights(&kept) {
            return Err(ModelError::InvalidWeights(rule.clone()));
        }
        aligned.insert(rule.clone(), kept);
    }
    Ok(aligned)
}
