mod cli;

use std::io;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use itertools::Itertools;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use grafter::error_handling::describe;
use grafter::generator::{SampleRequest, Sampler, UnconstrainedSampler};
use grafter::grammar::{format_alternative, GrammarModel};
use grafter::mutation::Mutation;
use grafter::parser;

use cli::{Cli, Command};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(io::stderr)
        .init();

    let grammar = parser::parse_file(&cli.file).map_err(|errors| anyhow!(describe(&errors)))?;
    let model = GrammarModel::build(grammar, &cli.model_config())
        .with_context(|| format!("Cannot use the rules in {}", cli.file.display()))?;
    debug!("{} rules, start `{}`", model.rules().len(), model.start_name());

    let mut rng = match cli.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    match &cli.command {
        Command::Sample { amount, min, max, unconstrained, depth_limit, trace } => {
            let sampler = if *unconstrained {
                let sampler = UnconstrainedSampler::new(&model);
                Sampler::Unconstrained(match depth_limit {
                    Some(limit) => sampler.with_depth_limit(*limit),
                    None => sampler,
                })
            } else {
                Sampler::constrained(&model)
            };

            let mut request = SampleRequest::new(model.start_symbol().clone());
            request.min_primitives = *min;
            request.max_primitives = *max;
            request.trace = *trace;

            for _ in 0..*amount {
                let sample = sampler.sample(&mut rng, &request).context("Sampling failed")?;
                for step in sample.trace.iter().flatten() {
                    println!("{}\n", step.pretty());
                }
                println!("{}", sample.text);
            }
        }
        Command::Mutate { expr, amount, selection_budget, replacement_budget, attempts } => {
            let sampler = Sampler::constrained(&model);
            let engine = cli::mutation_engine(*selection_budget, *replacement_budget, *attempts);

            for _ in 0..*amount {
                match engine.mutate(expr, &model, &sampler, &mut rng).context("Mutation failed")? {
                    Mutation::Edit { edit, rule } => {
                        info!("Resampled a `{}`", rule);
                        println!("{}", edit.pretty(expr));
                        println!("{}", edit.apply(expr)?);
                    }
                    Mutation::NoMutationFound => warn!("No subtree of the input could be changed within budget"),
                }
            }
        }
        Command::Costs => print_costs(&model),
    }

    Ok(())
}

fn print_costs(model: &GrammarModel) {
    for name in model.rules().keys().sorted() {
        let primitive = if model.primitives().contains(name) { " (primitive)" } else { "" };
        println!("{} = {}{}", name, model.expansion_cost(name), primitive);

        let alternatives = model.alternatives(name).into_iter().flatten();
        let costs = model.alternative_costs(name).unwrap_or_default();
        for (alternative, cost) in alternatives.zip(costs) {
            println!("    {:>3}  {}", cost.to_string(), format_alternative(alternative));
        }
    }
}
