use std::collections::HashMap;

use crate::grammar::Symbol::Nonterminal;
use super::CompileErrorType::DuplicateRule;
use super::{Alternative, CompileError, CompileErrors, Location, Rewrite};

pub type IntermediateRuleset = HashMap<String, (Rewrite, Location)>;

// A reference to a nonterminal that no rule defines, and where it was made
pub type Dangling = (String, Location);

fn get_alternative_undefined_symbols(alternative: &Alternative, location: &Location, rules: &IntermediateRuleset) -> Vec<Dangling> {
    // Keep the nonterminals only, then the ones no rule defines
    alternative.iter()
        .filter_map(|symbol| match symbol {
            Nonterminal(symbol) => Some(symbol),
            _ => None
        })
        .filter(|symbol| !rules.contains_key(*symbol))
        .map(|symbol_text| (symbol_text.to_owned(), location.to_owned()))
        .collect()
}

fn get_rewrite_undefined_symbols(rewrite: &Rewrite, location: &Location, rules: &IntermediateRuleset) -> Vec<Dangling> {
    rewrite.iter()
        .flat_map(|alternative| get_alternative_undefined_symbols(alternative, location, rules))
        .collect()
}

// Undefined references are not fatal: the model drops the alternatives that
// use them. They are returned so the caller can report them.
pub fn get_undefined_symbols(rules: &IntermediateRuleset) -> Vec<Dangling> {
    let mut dangling: Vec<Dangling> = rules.iter()
        .flat_map(|(_, (rewrite, location))| get_rewrite_undefined_symbols(rewrite, location, rules))
        .collect();
    dangling.sort_by(|a, b| (a.1.line, &a.0).cmp(&(b.1.line, &b.0)));
    dangling
}

// Inserts a rule, refusing a second definition of the same symbol
pub fn insert_rule(rules: &mut IntermediateRuleset, symbol: String, rewrite: Rewrite, location: Location) -> Result<(), CompileError> {
    if rules.contains_key(&symbol) {
        return Err(CompileError {
            location,
            error: DuplicateRule(symbol)
        });
    }
    rules.insert(symbol, (rewrite, location));
    Ok(())
}

pub fn verify_rules(rules: Vec<(String, Rewrite, Location)>) -> Result<IntermediateRuleset, CompileErrors> {
    let mut ruleset = IntermediateRuleset::with_capacity(rules.len());
    let mut errors = Vec::new();

    for (symbol, rewrite, location) in rules {
        if let Err(e) = insert_rule(&mut ruleset, symbol, rewrite, location) {
            errors.push(e);
        }
    }

    if errors.len() > 0 {
        Err(errors)
    } else {
        Ok(ruleset)
    }
}
