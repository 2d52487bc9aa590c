use rand::seq::SliceRandom;
use rand::Rng;
use tracing::trace;

use super::{DerivationStep, GenResult, Sample, SampleError, SampleRequest};
use crate::derivation::{DerivationTree, NodeId};
use crate::grammar::{Alternative, Cost, GrammarModel, Symbol};

// Grows a derivation one leaf at a time so that its primitive count lands
// exactly on a target drawn from the requested range.
//
// The sampler tracks a *potential*: primitives already placed plus the
// cheapest way to finish every unexpanded leaf. While the potential is below
// the target each expansion takes the most expensive alternative that does
// not overshoot; once it reaches the target only the cheapest alternatives
// are taken. The potential never decreases, so the tree stops growing as
// soon as the target is within reach.
#[derive(Debug, Clone, Copy)]
pub struct ConstrainedSampler<'g> {
    model: &'g GrammarModel,
}

impl<'g> ConstrainedSampler<'g> {
    pub fn new(model: &'g GrammarModel) -> Self {
        ConstrainedSampler { model }
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, request: &SampleRequest) -> GenResult<Sample> {
        let symbol = &request.symbol;
        if let Symbol::Nonterminal(name) = symbol {
            if self.model.alternatives(name).is_none() {
                return Err(SampleError::UnknownSymbol(name.clone()));
            }
        }

        // A primitive root is counted up front; its contents are still pending
        let mut consumed = self.model.is_primitive(symbol) as usize;
        let floor = self.model.min_primitives(symbol);

        let min = request.min_primitives.or(floor.finite()).unwrap_or(0);
        let max = request.max_primitives.unwrap_or(min);
        if min > max {
            return Err(SampleError::InvertedRange { min, max });
        }
        if floor > Cost::Finite(min) {
            return Err(SampleError::UnreachableTarget {
                symbol: symbol.name().into_owned(),
                requested: min,
                minimum: floor,
            });
        }

        let target = rng.gen_range(min..=max);
        let mut pending = self.residual(symbol).finite().unwrap_or(0);

        let mut tree = DerivationTree::new(symbol.clone());
        let mut queue: Vec<NodeId> = tree.unexpanded();
        let mut steps = request.trace.then(Vec::new);

        while !queue.is_empty() {
            let potential = consumed + pending;

            let leaf = queue.swap_remove(rng.gen_range(0..queue.len()));
            let rule = match &tree.node(leaf).symbol {
                Symbol::Nonterminal(name) => name.clone(),
                Symbol::Terminal(_) => continue,
            };
            let rewrite = self.model
                .alternatives(&rule)
                .ok_or_else(|| SampleError::UnknownSymbol(rule.clone()))?;
            let leaf_residual = self.model.expansion_cost(&rule).finite().unwrap_or(0);

            let growth: Vec<Cost> = rewrite.iter().map(|alternative| self.growth(alternative)).collect();
            let eligible = eligible_alternatives(&growth, leaf_residual, potential, target);
            let chosen = *eligible.choose(rng).ok_or_else(|| SampleError::TargetUnreachable {
                symbol: symbol.name().into_owned(),
                target,
                reached: consumed,
            })?;

            if let Some(steps) = steps.as_mut() {
                let (partial_expression, span) = tree.render_with_placeholders(leaf);
                steps.push(DerivationStep {
                    partial_expression,
                    span,
                    rule: rule.clone(),
                    alternatives: rewrite.clone(),
                    chosen,
                });
            }

            for child in tree.expand(leaf, chosen, &rewrite[chosen]) {
                let child_symbol = &tree.node(child).symbol;
                if child_symbol.is_terminal() {
                    continue;
                }
                consumed += self.model.is_primitive(child_symbol) as usize;
                pending += self.residual(child_symbol).finite().unwrap_or(0);
                queue.push(child);
            }
            pending -= leaf_residual;

            trace!(
                "Expanded `{}` with alternative {} of {}: potential {} -> {} (target {})",
                rule,
                chosen,
                rewrite.len(),
                potential,
                consumed + pending,
                target
            );
        }

        if consumed != target {
            return Err(SampleError::TargetUnreachable {
                symbol: symbol.name().into_owned(),
                target,
                reached: consumed,
            });
        }

        Ok(Sample {
            text: tree.finalize(),
            trace: steps,
        })
    }

    // Cheapest way to finish a symbol that has already been placed
    fn residual(&self, symbol: &Symbol) -> Cost {
        match symbol {
            Symbol::Terminal(_) => Cost::ZERO,
            Symbol::Nonterminal(name) => self.model.expansion_cost(name),
        }
    }

    // How far an alternative raises the potential, before subtracting the
    // residual of the leaf it replaces
    fn growth(&self, alternative: &Alternative) -> Cost {
        alternative
            .iter()
            .map(|symbol| Cost::Finite(self.model.is_primitive(symbol) as usize) + self.residual(symbol))
            .sum()
    }
}

// Indices of the alternatives the bias allows. Infinite alternatives are never
// eligible; below the target the largest growth that fits wins, otherwise the
// smallest.
fn eligible_alternatives(growth: &[Cost], leaf_residual: usize, potential: usize, target: usize) -> Vec<usize> {
    let finite: Vec<(usize, usize)> = growth
        .iter()
        .enumerate()
        .filter_map(|(index, cost)| cost.finite().map(|g| (index, g)))
        .collect();

    let wanted = if potential < target {
        let slack = target - potential;
        finite
            .iter()
            .map(|(_, g)| *g)
            .filter(|g| g.saturating_sub(leaf_residual) <= slack)
            .max()
    } else {
        finite.iter().map(|(_, g)| *g).min()
    };

    match wanted {
        Some(wanted) => finite.iter().filter(|(_, g)| *g == wanted).map(|(index, _)| *index).collect(),
        None => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::generator::Sampler;
    use crate::grammar::ModelConfig;

    fn csg() -> GrammarModel {
        GrammarModel::from_bnf(
            include_str!("../../example_data/csg.bnf"),
            &ModelConfig::default().with_primitives(["circle", "quad"]),
        ).unwrap()
    }

    #[test]
    fn exact_target_over_many_seeds() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        let request = SampleRequest::rule("s").exactly(4);

        for seed in 0..100 {
            let mut rng = StdRng::seed_from_u64(seed);
            let sample = sampler.sample(&mut rng, &request).unwrap();
            let tree = model.parse(&sample.text).unwrap();
            assert_eq!(tree.primitive_count(&model), 4, "seed {} gave {}", seed, sample.text);
        }
    }

    #[test]
    fn counts_stay_in_range() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        let request = SampleRequest::rule("s").with_primitives(2, 6);
        let mut rng = StdRng::seed_from_u64(11);
        let mut seen = HashSet::new();

        for _ in 0..200 {
            let sample = sampler.sample(&mut rng, &request).unwrap();
            let count = model.parse(&sample.text).unwrap().primitive_count(&model);
            assert!((2..=6).contains(&count), "{} has {} primitives", sample.text, count);
            seen.insert(count);
        }
        assert_eq!(seen.len(), 5);
    }

    #[test]
    fn same_seed_same_sample_and_trace() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        let request = SampleRequest::rule("s").with_primitives(3, 5).with_trace();

        let first = sampler.sample(&mut StdRng::seed_from_u64(99), &request).unwrap();
        let second = sampler.sample(&mut StdRng::seed_from_u64(99), &request).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn trace_records_every_expansion() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        let request = SampleRequest::rule("circle").with_trace();
        let sample = sampler.sample(&mut StdRng::seed_from_u64(5), &request).unwrap();
        let steps = sample.trace.unwrap();

        // circle, then its three numbers
        assert_eq!(steps.len(), 4);
        assert_eq!(steps[0].partial_expression, "<circle>");
        assert_eq!(steps[0].span, 0..8);
        assert_eq!(steps[0].rule, "circle");
        for step in &steps[1..] {
            assert_eq!(step.rule, "number");
            assert_eq!(step.alternatives.len(), 16);
            assert_eq!(&step.partial_expression[step.span.clone()], "<number>");
        }
        assert!(sample.text.starts_with("(Circle "));
    }

    #[test]
    fn default_range_is_the_cheapest_derivation() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        let mut rng = StdRng::seed_from_u64(8);

        for _ in 0..20 {
            let sample = sampler.sample(&mut rng, &SampleRequest::rule("s")).unwrap();
            assert_eq!(model.parse(&sample.text).unwrap().primitive_count(&model), 1);
        }
    }

    #[test]
    fn left_recursive_primitive_grows_to_target() {
        let model = GrammarModel::from_bnf("S = S \"+\" \"a\" | \"a\"", &ModelConfig::default().with_primitives(["S"])).unwrap();
        let sampler = Sampler::constrained(&model);
        let mut rng = StdRng::seed_from_u64(2);

        let sample = sampler.sample(&mut rng, &SampleRequest::rule("S").exactly(3)).unwrap();
        assert_eq!(sample.text, "a+a+a");
    }

    #[test]
    fn precondition_errors() {
        let model = csg();
        let sampler = Sampler::constrained(&model);
        let mut rng = StdRng::seed_from_u64(0);

        let inverted = sampler.sample(&mut rng, &SampleRequest::rule("s").with_primitives(5, 2)).unwrap_err();
        assert_eq!(inverted, SampleError::InvertedRange { min: 5, max: 2 });

        let too_small = sampler.sample(&mut rng, &SampleRequest::rule("binop").exactly(1)).unwrap_err();
        assert_eq!(too_small, SampleError::UnreachableTarget {
            symbol: "binop".to_string(),
            requested: 1,
            minimum: Cost::Finite(2),
        });
        assert!(too_small.is_precondition());
    }

    #[test]
    fn infinite_symbol_cannot_be_sampled() {
        let model = GrammarModel::from_bnf("loop = \"a\" loop", &ModelConfig::default()).unwrap();
        let sampler = Sampler::constrained(&model);
        let error = sampler.sample(&mut StdRng::seed_from_u64(0), &SampleRequest::rule("loop").exactly(0)).unwrap_err();

        assert!(matches!(error, SampleError::UnreachableTarget { minimum: Cost::Infinite, .. }));
    }

    #[test]
    fn bounded_grammar_reports_missed_target() {
        let model = GrammarModel::from_bnf(
            "pair = dot dot | dot\ndot = \".\"",
            &ModelConfig::default().with_primitives(["dot"]),
        ).unwrap();
        let sampler = Sampler::constrained(&model);
        let error = sampler.sample(&mut StdRng::seed_from_u64(0), &SampleRequest::rule("pair").exactly(5)).unwrap_err();

        assert_eq!(error, SampleError::TargetUnreachable {
            symbol: "pair".to_string(),
            target: 5,
            reached: 2,
        });
    }

    #[test]
    fn eligibility_follows_potential() {
        let growth = [Cost::Finite(2), Cost::Finite(1), Cost::Finite(1), Cost::Infinite, Cost::Finite(4)];

        // Below target: largest growth that fits the slack of 1
        assert_eq!(eligible_alternatives(&growth, 1, 3, 4), vec![0]);
        // Plenty of slack: the largest finite growth
        assert_eq!(eligible_alternatives(&growth, 1, 0, 10), vec![4]);
        // At or above target: cheapest only
        assert_eq!(eligible_alternatives(&growth, 1, 4, 4), vec![1, 2]);
        assert!(eligible_alternatives(&[Cost::Infinite], 0, 0, 1).is_empty());
    }
}
