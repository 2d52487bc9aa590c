use itertools::{Itertools, PeekingNext};

use super::{CompileErrorType, Result};

#[derive(PartialEq, Debug)]
pub enum Token {
    Equals,
    Or,
    Nonterminal(String),
    Terminal(String)
}

// Reads a quoted literal. Inside the quotes `\"`, `\\`, `\n` and `\t` are
// escapes; any other backslash is kept as written.
pub fn lex_terminal(line: &mut impl PeekingNext<Item = char>) -> Result<Token> {
    line.next(); // Consume open quote
    let mut token_text = String::new();

    loop {
        token_text.extend(line.peeking_take_while(|&c| c != '\"' && c != '\\'));
        match line.next() {
            Some('\"') => break,
            Some('\\') => match line.next() {
                Some('n') => token_text.push('\n'),
                Some('t') => token_text.push('\t'),
                Some(c @ ('\"' | '\\')) => token_text.push(c),
                Some(c) => {
                    token_text.push('\\');
                    token_text.push(c);
                }
                None => return Err(CompileErrorType::UnmatchedQuote),
            },
            _ => return Err(CompileErrorType::UnmatchedQuote),
        }
    }

    Ok(Token::Terminal(token_text))
}

pub fn lex_nonterminal(line: &mut impl Iterator<Item = char>) -> Result<Token> {
    Ok(Token::Nonterminal(line.take_while(|c| !c.is_whitespace()).collect()))
}

pub fn lex_line(line: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();

    let mut line_chars = line.chars().peekable();

    while let Some(c) = line_chars.peek() {
        if *c == '=' {
            line_chars.next();
            tokens.push(Token::Equals);
        } else if *c == '|' {
            line_chars.next();
            tokens.push(Token::Or);
        } else if *c == '\"' {
            tokens.push(lex_terminal(&mut line_chars)?);
        } else if !c.is_whitespace() {
            tokens.push(lex_nonterminal(&mut line_chars)?);
        } else {
            line_chars.next();
        }
    }

    return Ok(tokens);
}

#[cfg(test)]
mod tests {
    use std::iter::zip;

    use super::*;

    #[test]
    fn lex_normal_terminal() {
        let lines = vec![
            "\"Circle\" number \" \"",
            "\"(\"",
            "\"+\"\"-\"\"*\"",
            "\"\" rest"
        ];
        // (result from the function, rest of the iterator)
        let answers = vec![
            (Token::Terminal("Circle".to_string()), " number \" \""),
            (Token::Terminal("(".to_string()), ""),
            (Token::Terminal("+".to_string()), "\"-\"\"*\""),
            (Token::Terminal("".to_string()), " rest")
        ];

        for (line, (answer_token, answer_rest)) in zip(lines, answers) {
            let mut chars = line.chars().peekable();
            assert_eq!(lex_terminal(&mut chars).unwrap(), answer_token);
            assert_eq!(chars.collect::<String>(), answer_rest);
        }
    }

    #[test]
    fn lex_escaped_terminal() {
        let lines = vec![
            r#""say \"hi\"""#,
            r#""a\\b""#,
            r#""line\n""#,
            r#""\d""#
        ];
        let answers = vec!["say \"hi\"", "a\\b", "line\n", "\\d"];

        for (line, answer) in zip(lines, answers) {
            let mut chars = line.chars().peekable();
            assert_eq!(lex_terminal(&mut chars).unwrap(), Token::Terminal(answer.to_string()));
        }
    }

    #[test]
    fn lex_mismatched_terminal() {
        let lines = vec![
            "\"welcome",
            "\"alpha bravo charlie",
            "\"trailing \\"
        ];

        for line in lines {
            let mut chars = line.chars().peekable();

            assert_eq!(lex_terminal(&mut chars).unwrap_err(), CompileErrorType::UnmatchedQuote);
        }
    }

    #[test]
    fn lex_normal_nonterminal() {
        let lines = vec![
            "binop op s",
            "number",
            "noun.phrase verb.phrase"
        ];
        // (result from the function, rest of the iterator)
        let answers = vec![
            (Token::Nonterminal("binop".to_string()), "op s"),
            (Token::Nonterminal("number".to_string()), ""),
            (Token::Nonterminal("noun.phrase".to_string()), "verb.phrase")
        ];

        for (line, (answer_token, answer_rest)) in zip(lines, answers) {
            let mut chars = line.chars();
            assert_eq!(lex_nonterminal(&mut chars).unwrap(), answer_token);
            assert_eq!(chars.collect::<String>(), answer_rest);
        }
    }

    #[test]
    fn lex_normal_line() {
        let lines = vec![
            "s = binop | circle | quad",
            "binop = \"(\" op \" \" s \" \" s \")\""
        ];
        let answers = vec![
            vec![
                Token::Nonterminal("s".to_string()),
                Token::Equals,
                Token::Nonterminal("binop".to_string()),
                Token::Or,
                Token::Nonterminal("circle".to_string()),
                Token::Or,
                Token::Nonterminal("quad".to_string())
            ],
            vec![
                Token::Nonterminal("binop".to_string()),
                Token::Equals,
                Token::Terminal("(".to_string()),
                Token::Nonterminal("op".to_string()),
                Token::Terminal(" ".to_string()),
                Token::Nonterminal("s".to_string()),
                Token::Terminal(" ".to_string()),
                Token::Nonterminal("s".to_string()),
                Token::Terminal(")".to_string())
            ]
        ];

        for (line, answer) in zip(lines, answers) {
            assert_eq!(lex_line(line).unwrap(), answer)
        }
    }
}
