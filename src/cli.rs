use std::path::PathBuf;

use clap::{Parser, Subcommand};

use grafter::grammar::ModelConfig;
use grafter::mutation::MutationEngine;

#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// File containing the grammar
    pub file: PathBuf,

    /// Start symbol (default: first in the file)
    #[arg(short, long, value_name = "SYMBOL")]
    pub start: Option<String>,

    /// Nonterminal counted as one primitive unit; repeat for more
    #[arg(short, long = "primitive", value_name = "RULE")]
    pub primitives: Vec<String>,

    /// Weights for the alternatives of a rule, in order
    #[arg(short, long = "weight", value_name = "RULE=W1,W2,...", value_parser = parse_weights)]
    pub weights: Vec<(String, Vec<f64>)>,

    /// Seed for the random source (default: from entropy)
    #[arg(long, value_name = "SEED")]
    pub seed: Option<u64>,

    /// Log debug output
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Sample strings from the start symbol
    Sample {
        /// Amount to generate
        #[arg(short = 'n', long, value_name = "AMOUNT", default_value_t = 1)]
        amount: u32,

        /// Fewest primitives (default: the fewest the start symbol can derive)
        #[arg(long, value_name = "COUNT")]
        min: Option<usize>,

        /// Most primitives (default: equal to --min)
        #[arg(long, value_name = "COUNT")]
        max: Option<usize>,

        /// Pick alternatives by weight alone, ignoring primitive counts
        #[arg(short, long)]
        unconstrained: bool,

        /// Give up on unconstrained derivations deeper than this
        #[arg(long, value_name = "DEPTH", requires = "unconstrained")]
        depth_limit: Option<usize>,

        /// Print every expansion step
        #[arg(short, long, conflicts_with = "unconstrained")]
        trace: bool,
    },
    /// Replace one subtree of an existing string
    Mutate {
        /// String derived from the start symbol
        expr: String,

        /// Amount of independent mutations to print
        #[arg(short = 'n', long, value_name = "AMOUNT", default_value_t = 1)]
        amount: u32,

        /// Most primitives in the subtree taken out
        #[arg(long, value_name = "COUNT", default_value_t = 2)]
        selection_budget: usize,

        /// Most primitives in the subtree put in
        #[arg(long, value_name = "COUNT", default_value_t = 2)]
        replacement_budget: usize,

        /// Samples per subtree before trying another
        #[arg(long, value_name = "COUNT", default_value_t = 100)]
        attempts: usize,
    },
    /// List the minimum primitive cost of every rule and alternative
    Costs,
}

impl Cli {
    pub fn model_config(&self) -> ModelConfig {
        let mut config = ModelConfig::default().with_primitives(self.primitives.iter().cloned());
        config.start = self.start.clone();
        for (rule, weights) in &self.weights {
            config = config.with_weights(rule.clone(), weights.clone());
        }
        config
    }
}

pub fn mutation_engine(selection_budget: usize, replacement_budget: usize, attempts: usize) -> MutationEngine {
    MutationEngine::default()
        .with_selection_budget(selection_budget)
        .with_replacement_budget(replacement_budget)
        .with_max_attempts(attempts)
}

// `op=3,1` -> ("op", [3.0, 1.0])
fn parse_weights(arg: &str) -> Result<(String, Vec<f64>), String> {
    let (rule, weights) = arg
        .split_once('=')
        .ok_or_else(|| format!("expected RULE=W1,W2,... but got `{}`", arg))?;

    let rule = rule.trim();
    if rule.is_empty() {
        return Err("missing rule name before `=`".to_string());
    }

    let weights = weights
        .split(',')
        .map(|weight| weight.trim().parse::<f64>().map_err(|e| format!("bad weight `{}`: {}", weight.trim(), e)))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((rule.to_string(), weights))
}
