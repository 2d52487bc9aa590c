/*
    This module rewrites one bounded subtree of an existing derivation into a
    fresh derivation of the same category
*/

mod edit;

use std::ops::Range;

use itertools::Itertools;
use rand::seq::SliceRandom;
use rand::Rng;
use tracing::{debug, trace};

use crate::derivation::{DerivationTree, NodeId, SyntaxError};
use crate::generator::{SampleError, SampleRequest, Sampler};
use crate::grammar::{GrammarModel, Symbol};

pub use edit::{Edit, EditError};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MutateError {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Sample(#[from] SampleError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    // The splice to apply, and the rule whose derivation it replaces
    Edit { edit: Edit, rule: String },
    NoMutationFound,
}

impl Mutation {
    pub fn edit(&self) -> Option<&Edit> {
        match self {
            Mutation::Edit { edit, .. } => Some(edit),
            Mutation::NoMutationFound => None,
        }
    }
}

// Budgets for one mutation.
//
// `selection_budget` bounds the primitive count of the subtree taken out,
// `replacement_budget` that of the subtree put in. `max_attempts` is how
// many samples a candidate gets to differ from its current text.
//
// Replacement counts are drawn uniformly from the category's minimum up to
// the replacement budget, never below the minimum: an `s` with a budget of 2
// is replaced by one or two shapes with equal odds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MutationEngine {
    pub selection_budget: usize,
    pub replacement_budget: usize,
    pub max_attempts: usize,
}

impl Default for MutationEngine {
    fn default() -> Self {
        MutationEngine {
            selection_budget: 2,
            replacement_budget: 2,
            max_attempts: 100,
        }
    }
}

// A subtree that may be replaced, resolved to the rule it stands for
struct Site {
    rule: String,
    span: Range<usize>,
}

impl MutationEngine {
    pub fn with_selection_budget(mut self, budget: usize) -> Self {
        self.selection_budget = budget;
        self
    }

    pub fn with_replacement_budget(mut self, budget: usize) -> Self {
        self.replacement_budget = budget;
        self
    }

    pub fn with_max_attempts(mut self, attempts: usize) -> Self {
        self.max_attempts = attempts;
        self
    }

    pub fn mutate<R: Rng + ?Sized>(
        &self,
        text: &str,
        model: &GrammarModel,
        sampler: &Sampler,
        rng: &mut R,
    ) -> Result<Mutation, MutateError> {
        let tree = model.parse(text)?;
        let counts = tree.primitive_counts(model);

        let candidates: Vec<NodeId> = tree
            .preorder()
            .into_iter()
            .filter(|id| !tree.node(*id).symbol.is_terminal() && counts[id.index()] <= self.selection_budget)
            .collect();

        // One size class at a time, so common sizes do not crowd out rare ones
        let sizes: Vec<usize> = candidates.iter().map(|id| counts[id.index()]).sorted().dedup().collect();
        let size = match sizes.choose(rng) {
            Some(size) => *size,
            None => return Ok(Mutation::NoMutationFound),
        };
        let mut candidates: Vec<NodeId> = candidates.into_iter().filter(|id| counts[id.index()] == size).collect();
        debug!("{} candidates with {} primitives", candidates.len(), size);

        while !candidates.is_empty() {
            let slot = rng.gen_range(0..candidates.len());
            let candidate = candidates[slot];

            let site = match self.resolve(&tree, candidate, text, model) {
                Some(site) => site,
                None => {
                    candidates.swap_remove(slot);
                    continue;
                }
            };

            if let Some(replacement) = self.resample(&site, text, model, sampler, rng)? {
                debug!("Replacing `{}` at {:?} with {:?}", site.rule, site.span, replacement);
                return Ok(Mutation::Edit {
                    edit: Edit::new(site.span.start, site.span.end, replacement),
                    rule: site.rule,
                });
            }
            debug!("No differing `{}` found for {:?}", site.rule, &text[site.span.clone()]);
            candidates.swap_remove(slot);
        }

        Ok(Mutation::NoMutationFound)
    }

    // The rule a candidate occupies, or None if it cannot be resampled
    // within budget
    fn resolve(&self, tree: &DerivationTree, candidate: NodeId, text: &str, model: &GrammarModel) -> Option<Site> {
        let site = match tree.parent(candidate) {
            None => Site {
                rule: model.start_name().to_string(),
                span: 0..text.len(),
            },
            Some(parent) => {
                let parent_rule = match &tree.node(parent).symbol {
                    Symbol::Nonterminal(name) => name,
                    Symbol::Terminal(_) => return None,
                };
                let alternative = model.match_production(tree, parent, parent_rule)?;
                let index = tree.child_index(candidate)?;
                let rule = match &model.alternatives(parent_rule)?[alternative][index] {
                    Symbol::Nonterminal(name) => name.clone(),
                    Symbol::Terminal(_) => return None,
                };

                if model.alternatives(&rule).map_or(0, Vec::len) <= 1 {
                    trace!("`{}` has no alternative to switch to", rule);
                    return None;
                }
                Site {
                    rule,
                    span: tree.node(candidate).span.clone(),
                }
            }
        };

        let floor = model.min_primitives(&Symbol::Nonterminal(site.rule.clone())).finite()?;
        if floor > self.replacement_budget {
            trace!("`{}` needs {} primitives, over the budget of {}", site.rule, floor, self.replacement_budget);
            return None;
        }
        Some(site)
    }

    fn resample<R: Rng + ?Sized>(
        &self,
        site: &Site,
        text: &str,
        model: &GrammarModel,
        sampler: &Sampler,
        rng: &mut R,
    ) -> Result<Option<String>, SampleError> {
        let symbol = Symbol::Nonterminal(site.rule.clone());
        let floor = model.min_primitives(&symbol).finite().unwrap_or(0);
        let request = SampleRequest::new(symbol).with_primitives(floor, self.replacement_budget);
        let original = &text[site.span.clone()];

        for _ in 0..self.max_attempts {
            match sampler.sample(rng, &request) {
                Ok(sample) if sample.text != original => return Ok(Some(sample.text)),
                Ok(_) => {}
                // The drawn count is not derivable from this rule; draw again
                Err(SampleError::TargetUnreachable { target, .. }) => {
                    trace!("`{}` cannot hold exactly {} primitives", site.rule, target);
                }
                Err(error) => return Err(error),
            }
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::grammar::ModelConfig;

    const FOUR_SHAPES: &str = "(+ (- (Circle 1 2 3) (Quad 4 5 6 7 H)) (+ (Circle 8 9 A) (Circle B C D)))";

    fn csg() -> GrammarModel {
        GrammarModel::from_bnf(
            include_str!("../../example_data/csg.bnf"),
            &ModelConfig::default().with_primitives(["circle", "quad"]),
        ).unwrap()
    }

    // Some node of `tree` derives `rule` over exactly `span`
    fn has_node(tree: &DerivationTree, rule: &str, span: Range<usize>) -> bool {
        tree.preorder()
            .into_iter()
            .any(|id| tree.node(id).symbol == Symbol::nonterminal(rule) && tree.node(id).span == span)
    }

    #[test]
    fn mutation_keeps_the_category() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        let engine = MutationEngine::default();
        assert_eq!(model.parse(FOUR_SHAPES).unwrap().primitive_count(&model), 4);

        for seed in 0..50 {
            let mut rng = StdRng::seed_from_u64(seed);
            let (edit, rule) = match engine.mutate(FOUR_SHAPES, &model, &sampler, &mut rng).unwrap() {
                Mutation::Edit { edit, rule } => (edit, rule),
                Mutation::NoMutationFound => panic!("seed {} found no mutation", seed),
            };

            let mutated = edit.apply(FOUR_SHAPES).unwrap();
            assert_ne!(mutated, FOUR_SHAPES);

            let tree = model.parse(&mutated).unwrap();
            let span = edit.start..edit.start + edit.replacement.len();
            assert!(has_node(&tree, &rule, span), "seed {}: {} is not a `{}`", seed, edit, rule);

            let replaced = model.parse_rule(&edit.replacement, &rule).unwrap();
            assert!(replaced.primitive_count(&model) <= engine.replacement_budget);
        }
    }

    #[test]
    fn selection_budget_bounds_the_removed_subtree() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        let engine = MutationEngine::default().with_selection_budget(1);
        let original = model.parse(FOUR_SHAPES).unwrap();
        let counts = original.primitive_counts(&model);

        for seed in 0..30 {
            let mutation = engine.mutate(FOUR_SHAPES, &model, &sampler, &mut StdRng::seed_from_u64(seed)).unwrap();
            let edit = mutation.edit().unwrap();
            let removed = original
                .preorder()
                .into_iter()
                .filter(|id| original.node(*id).span == (edit.start..edit.end))
                .map(|id| counts[id.index()])
                .min()
                .unwrap();
            assert!(removed <= 1, "{} removed {} primitives", edit, removed);
        }
    }

    #[test]
    fn same_seed_same_edit() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        let engine = MutationEngine::default();

        let first = engine.mutate(FOUR_SHAPES, &model, &sampler, &mut StdRng::seed_from_u64(21)).unwrap();
        let second = engine.mutate(FOUR_SHAPES, &model, &sampler, &mut StdRng::seed_from_u64(21)).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn root_is_resampled_from_the_start_symbol() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        // The circle under the root has a single alternative, so the only
        // one-primitive site is the root itself
        let engine = MutationEngine::default().with_selection_budget(1).with_replacement_budget(1);
        let text = "(Circle 1 2 3)";

        let mut roots = 0;
        for seed in 0..40 {
            let mutation = engine.mutate(text, &model, &sampler, &mut StdRng::seed_from_u64(seed)).unwrap();
            if let Mutation::Edit { edit, rule } = mutation {
                if edit.start == 0 && edit.end == text.len() {
                    assert_eq!(rule, "s");
                    roots += 1;
                }
                assert!(model.parse(&edit.apply(text).unwrap()).is_ok());
            }
        }
        assert!(roots > 0);
    }

    #[test]
    fn nothing_to_change() {
        let model = GrammarModel::from_bnf("s = \"(\" item \")\"\nitem = \"x\"", &ModelConfig::default()).unwrap();
        let sampler = Sampler::constrained(&model);
        let mutation = MutationEngine::default()
            .mutate("(x)", &model, &sampler, &mut StdRng::seed_from_u64(0))
            .unwrap();

        assert_eq!(mutation, Mutation::NoMutationFound);
        assert_eq!(mutation.edit(), None);
    }

    #[test]
    fn replacement_budget_excludes_expensive_categories() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        // A binop needs two shapes; with room for one only shapes and their
        // parts can be swapped in
        let engine = MutationEngine::default().with_replacement_budget(1);
        let text = "(+ (Circle 1 2 3) (Circle 4 5 6))";

        for seed in 0..30 {
            let mutation = engine.mutate(text, &model, &sampler, &mut StdRng::seed_from_u64(seed)).unwrap();
            if let Mutation::Edit { edit, rule } = mutation {
                let replaced = model.parse_rule(&edit.replacement, &rule).unwrap();
                assert!(replaced.primitive_count(&model) <= 1, "{}", edit);
            }
        }
    }

    #[test]
    fn unparsable_input_is_an_error() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        let error = MutationEngine::default()
            .mutate("(Circle", &model, &sampler, &mut StdRng::seed_from_u64(0))
            .unwrap_err();

        assert_eq!(error, MutateError::Syntax(SyntaxError::NoDerivation { rule: "s".to_string(), len: 7 }));
    }

    #[test]
    fn unconstrained_sampler_also_mutates() {
        let model = csg();
        let sampler = Sampler::unconstrained(&model);
        let mutation = MutationEngine::default()
            .mutate(FOUR_SHAPES, &model, &sampler, &mut StdRng::seed_from_u64(4))
            .unwrap();

        let edit = mutation.edit().unwrap();
        assert!(model.parse(&edit.apply(FOUR_SHAPES).unwrap()).is_ok());
    }

    #[test]
    fn identical_resamples_exhaust_attempts() {
        // Both alternatives of `item` render as "x", so every draw repeats
        // the text it would replace
        let model = GrammarModel::from_bnf("s = \"(\" item \")\"\nitem = \"x\" | \"x\"", &ModelConfig::default()).unwrap();
        let sampler = Sampler::constrained(&model);
        let engine = MutationEngine::default().with_max_attempts(5);

        for seed in 0..10 {
            let mutation = engine.mutate("(x)", &model, &sampler, &mut StdRng::seed_from_u64(seed)).unwrap();
            assert_eq!(mutation, Mutation::NoMutationFound, "seed {}", seed);
        }
    }

    #[test]
    fn underivable_counts_are_redrawn() {
        // A pair holds one or two dots, so a drawn count of three cannot be met
        let model = GrammarModel::from_bnf(
            "pair = dot dot | dot\ndot = \".\"",
            &ModelConfig::default().with_primitives(["dot"]),
        ).unwrap();
        let sampler = Sampler::constrained(&model);
        let engine = MutationEngine::default().with_selection_budget(3).with_replacement_budget(3);

        let mut edits = 0;
        for seed in 0..20 {
            match engine.mutate("..", &model, &sampler, &mut StdRng::seed_from_u64(seed)).unwrap() {
                Mutation::Edit { edit, rule } => {
                    assert_eq!(edit, Edit::new(0, 2, "."));
                    assert_eq!(rule, "pair");
                    edits += 1;
                }
                Mutation::NoMutationFound => {}
            }
        }
        assert!(edits > 0);
    }
}
