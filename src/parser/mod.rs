/*
    This module parses BNF rule sets
*/

mod lexer;
mod verifier;

use std::collections::HashMap;
use std::fs::File;
use std::io::BufRead;
use std::path::{Path, PathBuf};

use crate::grammar::*;
use crate::error_handling::*;
use itertools::Itertools;
use lexer::*;
use tracing::warn;
use verifier::{get_undefined_symbols, verify_rules};

#[derive(Debug, thiserror::Error)]
pub enum CompileErrorType {
    // A line which should contain a rule does not
    #[error("Expected `=` after nonterminal")]
    MissingEquals,
    // A rule has multiple equals signs
    #[error("Unexpected `=` encountered")]
    UnexpectedEquals,
    // The user starts a rule line with something other than a nonterminal
    #[error("Tried to define something other than a nonterminal")]
    MissingNonterminal,
    // There is an unclosed quote
    #[error("Unmatched quotes")]
    UnmatchedQuote,
    // The same nonterminal is defined on two lines
    #[error("`{0}` is already defined")]
    DuplicateRule(String),
    // The rule set defines no rules at all
    #[error("No rules defined")]
    EmptyRuleset,
    // Somehow a full rewrite was parsed as a base alternative
    // This is a problem with grafter, not the grammar
    #[error("Rewrite was not fully split (this is a problem with grafter, not the grammar)")]
    UnsplitRewrite,
    // A blank line got too deep into the parser
    // This is a problem with grafter, not the grammar
    #[error("Blank line encountered in rule parser (this is a problem with grafter, not the grammar)")]
    UnexpectedBlankLine,
    // There was an issue with reading a file
    #[error("File error: {0}")]
    FileError(std::io::Error),
}

impl ErrorType for CompileErrorType {}

impl PartialEq for CompileErrorType {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (CompileErrorType::FileError(a), CompileErrorType::FileError(b)) => a.kind() == b.kind(),
            (CompileErrorType::DuplicateRule(a), CompileErrorType::DuplicateRule(b)) => a == b,
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

pub type CompileError = Error<CompileErrorType>;
pub type CompileErrors = Errors<CompileErrorType>;

fn io_error(error: std::io::Error, file: PathBuf) -> CompileError {
    CompileError {
        location: Location {
            file,
            line: 0
        },
        error: CompileErrorType::FileError(error)
    }
}

pub type Result<T> = std::result::Result<T, CompileErrorType>;
pub type LineResult<T> = std::result::Result<T, CompileError>;
pub type FileResult<T> = std::result::Result<T, CompileErrors>;

#[derive(PartialEq, Debug)]
struct Rule {
    symbol: String,
    rewrite: Rewrite,
    location: Location
}

fn parse_alternative(tokens: &[Token]) -> Result<Alternative> {
    tokens.iter().map(|t| match t {
        Token::Equals => Err(CompileErrorType::UnexpectedEquals),
        Token::Or => Err(CompileErrorType::UnsplitRewrite),
        Token::Nonterminal(s) => Ok(Symbol::Nonterminal(s.clone())),
        Token::Terminal(s) => Ok(Symbol::Terminal(s.clone()))
    }).collect()
}

fn parse_rewrite(tokens: &[Token]) -> Result<Rewrite> {
    tokens.split(|t| *t == Token::Or).map(parse_alternative).collect()
}

fn parse_line(tokens: &[Token], location: Location) -> Result<Rule> {
    // Try to get the token the rule is for. The match returns a result which
    // is then unwrapped with the ? operator
    let symbol = match tokens.get(0) {
        Some(Token::Nonterminal(s)) => Ok(s.clone()),
        Some(_) => Err(CompileErrorType::MissingNonterminal),
        None => Err(CompileErrorType::UnexpectedBlankLine)
    }?;

    if tokens.get(1) != Some(&Token::Equals) {
        return Err(CompileErrorType::MissingEquals)
    }

    let rewrite = parse_rewrite(&tokens[2..])?;

    return Ok(Rule {
        symbol,
        rewrite,
        location
    });
}

fn parse_lex_line(line: &str, location: Location) -> LineResult<Rule> {
    lexer::lex_line(line)
        .and_then(|lexed_line| parse_line(&lexed_line, location.clone()))
        .map_err(|error| CompileError { location: location, error })
}

fn is_rule_line(line: &String) -> bool {
    let trimmed = line.trim();
    !trimmed.is_empty() && !trimmed.starts_with(';')
}

// Returns an iterator over the rule lines of a reader, with the io errors
// wrapped in CompileError and numbered from 1
fn reader_line_nums<'a>(reader: impl BufRead + 'a, path: &'a Path) -> impl Iterator<Item = (usize, LineResult<String>)> + 'a {
    reader
        .lines()
        .map(move |line| line.map_err(|e| io_error(e, path.to_path_buf())))
        .enumerate()
        .filter(|(_, line)| line.as_ref().is_ok_and(is_rule_line) || line.is_err())
        .map(|(num, line)| (num + 1, line))
}

// Generates a rule hashmap from a vector of rules
fn ruleset_from_rules(rules: Vec<Rule>) -> FileResult<HashMap<String, Rewrite>> {
    let rule_count = rules.len();

    let checked = verify_rules(
        rules.into_iter().map(|rule| (rule.symbol, rule.rewrite, rule.location)).collect()
    )?;

    for (symbol, location) in get_undefined_symbols(&checked) {
        warn!("[{}] `{}` is not defined; alternatives using it will be dropped", location, symbol);
    }

    let mut ruleset = HashMap::<String, Rewrite>::with_capacity(rule_count);
    for (symbol, (rewrite, _)) in checked {
        ruleset.insert(symbol, rewrite);
    }

    return Ok(ruleset);
}

fn grammar_from_rules(rule_list: Vec<Rule>, origin: &Location) -> FileResult<Grammar> {
    let start_symbol = match rule_list.first() {
        Some(rule) => rule.symbol.clone(),
        None => return Err(vec![CompileError {
            location: origin.clone(),
            error: CompileErrorType::EmptyRuleset
        }])
    };

    let rules = ruleset_from_rules(rule_list)?;

    return Ok(Grammar {
        start_symbol,
        rules
    })
}

fn parse_lines(lines: impl Iterator<Item = (usize, LineResult<String>)>, origin: &Location) -> FileResult<Grammar> {
    let parsed_lines = lines.map(|(num, line_res)| {
        line_res.and_then(|line| parse_lex_line(&line, origin.at_line(num)))
    });

    let (rules, errors): (Vec<_>, Vec<_>) = parsed_lines.partition_result();
    if errors.len() > 0 {
        return Err(errors);
    }

    return grammar_from_rules(rules, origin);
}

pub fn parse_file(path: &Path) -> FileResult<Grammar> {
    let file = File::open(path).map_err(|e| vec![io_error(e, path.to_path_buf())])?;
    let lines = reader_line_nums(std::io::BufReader::new(file), path);

    parse_lines(lines, &Location { file: path.to_path_buf(), line: 0 })
}

// Parses a rule set held in memory. `origin` names it in error locations.
pub fn parse_str(text: &str, origin: &str) -> FileResult<Grammar> {
    let origin = Location::inline(origin);
    let lines = reader_line_nums(text.as_bytes(), &origin.file);

    parse_lines(lines.collect_vec().into_iter(), &origin)
}
