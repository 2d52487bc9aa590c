use std::collections::{HashMap, HashSet};
use std::fmt::Display;
use std::iter::Sum;
use std::ops::Add;

use super::{Alternative, Rewrite, Symbol};

// The fewest primitive units needed to fully resolve a symbol.
//
// `Infinite` sorts after every finite cost, and adding anything to it stays
// infinite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Cost {
    Finite(usize),
    Infinite,
}

impl Cost {
    pub const ZERO: Cost = Cost::Finite(0);

    pub fn is_finite(&self) -> bool {
        matches!(self, Cost::Finite(_))
    }

    pub fn finite(self) -> Option<usize> {
        match self {
            Cost::Finite(n) => Some(n),
            Cost::Infinite => None,
        }
    }
}

impl Add for Cost {
    type Output = Cost;

    fn add(self, rhs: Cost) -> Cost {
        match (self, rhs) {
            (Cost::Finite(a), Cost::Finite(b)) => Cost::Finite(a + b),
            _ => Cost::Infinite,
        }
    }
}

impl Sum for Cost {
    fn sum<I: Iterator<Item = Cost>>(iter: I) -> Cost {
        iter.fold(Cost::ZERO, Add::add)
    }
}

impl Display for Cost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cost::Finite(n) => write!(f, "{}", n),
            Cost::Infinite => write!(f, "∞"),
        }
    }
}

// Answers minimum-cost queries over a fixed rule table. Each top-level query
// carries its own recursion path; nothing is shared between queries.
pub(super) struct CostQuery<'a> {
    rules: &'a HashMap<String, Rewrite>,
    primitives: &'a HashSet<String>,
}

impl<'a> CostQuery<'a> {
    pub fn new(rules: &'a HashMap<String, Rewrite>, primitives: &'a HashSet<String>) -> Self {
        CostQuery { rules, primitives }
    }

    pub fn cost(&self, symbol: &Symbol) -> Cost {
        let mut path = HashSet::new();
        self.cost_on_path(symbol, &mut path)
    }

    fn cost_on_path(&self, symbol: &Symbol, path: &mut HashSet<String>) -> Cost {
        let name = match symbol {
            Symbol::Terminal(_) => return Cost::ZERO,
            Symbol::Nonterminal(name) => name,
        };

        if self.primitives.contains(name) {
            return Cost::Finite(1);
        }

        // Reached again before any primitive: this occurrence never resolves
        if path.contains(name) {
            return Cost::Infinite;
        }

        let rewrite = match self.rules.get(name) {
            Some(rewrite) => rewrite,
            None => return Cost::Infinite,
        };

        path.insert(name.clone());
        let best = rewrite
            .iter()
            .map(|alternative| self.alternative_on_path(alternative, path))
            .min()
            .unwrap_or(Cost::Infinite);
        path.remove(name);

        best
    }

    fn alternative_on_path(&self, alternative: &Alternative, path: &mut HashSet<String>) -> Cost {
        let mut total = Cost::ZERO;
        for symbol in alternative {
            total = total + self.cost_on_path(symbol, path);
            if !total.is_finite() {
                break;
            }
        }
        total
    }
}
