use std::ops::Range;

use crate::grammar::{format_alternative, Alternative, Rewrite};

// One expansion decision made while sampling.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivationStep {
    // The derivation so far, unexpanded nonterminals written as `<name>`
    pub partial_expression: String,
    // Byte span of the placeholder being expanded
    pub span: Range<usize>,
    pub rule: String,
    // Every alternative of `rule`, whether or not it was eligible
    pub alternatives: Rewrite,
    pub chosen: usize,
}

impl DerivationStep {
    pub fn chosen_alternative(&self) -> &Alternative {
        &self.alternatives[self.chosen]
    }

    pub fn pretty(&self) -> String {
        let indent = self.partial_expression[..self.span.start].chars().count();
        let width = self.partial_expression[self.span.clone()].chars().count();
        format!(
            "{}\n{}{} -> {}",
            self.partial_expression,
            " ".repeat(indent),
            "^".repeat(width),
            format_alternative(self.chosen_alternative())
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::Symbol;

    #[test]
    fn pretty_points_at_placeholder() {
        let step = DerivationStep {
            partial_expression: "(+ <s> (Circle 1 2 3))".to_string(),
            span: 3..6,
            rule: "s".to_string(),
            alternatives: vec![
                vec![Symbol::nonterminal("binop")],
                vec![Symbol::nonterminal("circle")],
            ],
            chosen: 1,
        };

        assert_eq!(step.pretty(), "(+ <s> (Circle 1 2 3))\n   ^^^ -> circle");
        assert_eq!(step.chosen_alternative(), &vec![Symbol::nonterminal("circle")]);
    }

    #[test]
    fn pretty_shows_empty_alternative() {
        let step = DerivationStep {
            partial_expression: "<tail>".to_string(),
            span: 0..6,
            rule: "tail".to_string(),
            alternatives: vec![vec![]],
            chosen: 0,
        };

        assert_eq!(step.pretty(), "<tail>\n^^^^^^ -> ε");
    }
}
