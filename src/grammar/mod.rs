/*
    This module is for storing and analysing grammars
*/

mod cost;
mod model;

use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Display;

pub use cost::Cost;
pub use model::{GrammarModel, ModelConfig, ModelError};

// The base unit in a grammar rule. Terminals hold their literal text.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Terminal(String),
    Nonterminal(String),
}

impl Symbol {
    pub fn nonterminal(name: &str) -> Self {
        Symbol::Nonterminal(name.to_string())
    }

    pub fn terminal(literal: &str) -> Self {
        Symbol::Terminal(literal.to_string())
    }

    // Terminals are named by their quoted literal, the way they are written
    // in a rule set
    pub fn name(&self) -> Cow<'_, str> {
        match self {
            Symbol::Terminal(literal) => Cow::Owned(terminal_name(literal)),
            Symbol::Nonterminal(name) => Cow::Borrowed(name),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

pub fn terminal_name(literal: &str) -> String {
    format!("\"{}\"", literal)
}

// The symbols in a single alternative
pub type Alternative = Vec<Symbol>;

// The alternatives of a rewrite rule
pub type Rewrite = Vec<Alternative>;

pub fn format_alternative(alternative: &Alternative) -> String {
    if alternative.is_empty() {
        return "ε".to_string();
    }
    alternative.iter().map(|s| s.name()).collect::<Vec<_>>().join(" ")
}

// A rule set as read from text, before any analysis
#[derive(Debug, PartialEq, Clone)]
pub struct Grammar {
    pub start_symbol: String,
    pub rules: HashMap<String, Rewrite>,
}
