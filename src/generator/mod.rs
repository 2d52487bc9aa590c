/*
    This module generates derivations from a compiled grammar
*/

mod constrained;
mod trace;

use rand::distributions::Distribution;
use rand::Rng;

use crate::grammar::*;

pub use constrained::ConstrainedSampler;
pub use trace::DerivationStep;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SampleError {
    // Asked for a range whose lower end is above its upper end
    #[error("Primitive range {min}..={max} is empty")]
    InvertedRange { min: usize, max: usize },
    // The symbol is not part of the compiled grammar
    #[error("No rule for `{0}`")]
    UnknownSymbol(String),
    // The symbol needs more primitives than the range allows
    #[error("`{symbol}` needs at least {minimum} primitives but at most {requested} were requested")]
    UnreachableTarget { symbol: String, requested: usize, minimum: Cost },
    // The grammar could not grow the derivation to the drawn target
    #[error("Derivation of `{symbol}` ended with {reached} primitives instead of {target}")]
    TargetUnreachable { symbol: String, target: usize, reached: usize },
    #[error("Derivation of `{symbol}` went deeper than {limit} levels")]
    DepthLimitExceeded { symbol: String, limit: usize },
}

impl SampleError {
    // The caller asked for something the grammar cannot provide
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            SampleError::InvertedRange { .. } | SampleError::UnknownSymbol(_) | SampleError::UnreachableTarget { .. }
        )
    }
}

pub type GenResult<T> = Result<T, SampleError>;

// What to sample. Without bounds the constrained sampler aims for the
// cheapest derivation of the symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleRequest {
    pub symbol: Symbol,
    pub min_primitives: Option<usize>,
    pub max_primitives: Option<usize>,
    pub trace: bool,
}

impl SampleRequest {
    pub fn new(symbol: Symbol) -> Self {
        SampleRequest {
            symbol,
            min_primitives: None,
            max_primitives: None,
            trace: false,
        }
    }

    pub fn rule(name: &str) -> Self {
        SampleRequest::new(Symbol::nonterminal(name))
    }

    pub fn with_primitives(mut self, min: usize, max: usize) -> Self {
        self.min_primitives = Some(min);
        self.max_primitives = Some(max);
        self
    }

    pub fn exactly(self, primitives: usize) -> Self {
        self.with_primitives(primitives, primitives)
    }

    pub fn with_trace(mut self) -> Self {
        self.trace = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub text: String,
    pub trace: Option<Vec<DerivationStep>>,
}

// The two sampling strategies behind one `sample` call.
#[derive(Debug, Clone, Copy)]
pub enum Sampler<'g> {
    Unconstrained(UnconstrainedSampler<'g>),
    Constrained(ConstrainedSampler<'g>),
}

impl<'g> Sampler<'g> {
    pub fn unconstrained(model: &'g GrammarModel) -> Self {
        Sampler::Unconstrained(UnconstrainedSampler::new(model))
    }

    pub fn constrained(model: &'g GrammarModel) -> Self {
        Sampler::Constrained(ConstrainedSampler::new(model))
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, request: &SampleRequest) -> GenResult<Sample> {
        match self {
            Sampler::Unconstrained(sampler) => sampler.sample(rng, request),
            Sampler::Constrained(sampler) => sampler.sample(rng, request),
        }
    }
}

// Expands top-down with no budget. A grammar whose recursion can avoid
// terminating alternatives may recurse without bound unless a depth limit
// is set.
#[derive(Debug, Clone, Copy)]
pub struct UnconstrainedSampler<'g> {
    model: &'g GrammarModel,
    depth_limit: Option<usize>,
}

impl<'g> UnconstrainedSampler<'g> {
    pub fn new(model: &'g GrammarModel) -> Self {
        UnconstrainedSampler {
            model,
            depth_limit: None,
        }
    }

    pub fn with_depth_limit(mut self, limit: usize) -> Self {
        self.depth_limit = Some(limit);
        self
    }

    // Primitive bounds and tracing do not apply here
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R, request: &SampleRequest) -> GenResult<Sample> {
        let mut text = String::new();
        self.generate_symbol(&request.symbol, rng, 0, &mut text)?;
        Ok(Sample { text, trace: None })
    }

    fn generate_symbol<R: Rng + ?Sized>(&self, symbol: &Symbol, rng: &mut R, depth: usize, text: &mut String) -> GenResult<()> {
        match symbol {
            Symbol::Nonterminal(name) => self.generate_nonterminal(name, rng, depth, text),
            Symbol::Terminal(literal) => {
                text.push_str(literal);
                Ok(())
            }
        }
    }

    fn generate_nonterminal<R: Rng + ?Sized>(&self, nonterminal: &str, rng: &mut R, depth: usize, text: &mut String) -> GenResult<()> {
        if let Some(limit) = self.depth_limit {
            if depth >= limit {
                return Err(SampleError::DepthLimitExceeded {
                    symbol: nonterminal.to_string(),
                    limit,
                });
            }
        }

        let rewrite = self.model
            .alternatives(nonterminal)
            .ok_or_else(|| SampleError::UnknownSymbol(nonterminal.to_string()))?;
        let alternative = &rewrite[self.choose_alternative(nonterminal, rewrite, rng)];

        for symbol in alternative {
            self.generate_symbol(symbol, rng, depth + 1, text)?;
        }
        Ok(())
    }

    fn choose_alternative<R: Rng + ?Sized>(&self, nonterminal: &str, rewrite: &Rewrite, rng: &mut R) -> usize {
        match self.model.chooser(nonterminal) {
            Some(chooser) => chooser.sample(rng),
            None => rng.gen_range(0..rewrite.len()),
        }
    }
}
