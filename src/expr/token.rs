//! # Expression Lexer
//!
//! Transforms an expression source string into a token stream. Operators
//! are matched longest-first so `>=` never splits into `>` and `=`, the
//! same strategy the markup side uses for `/>` versus `>`.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while, take_while1},
    character::complete::{char, digit1, multispace0},
    combinator::{map, map_res, recognize},
    error::context,
    sequence::{delimited, pair, tuple},
    IResult,
};
use strum_macros::{AsRefStr, Display, EnumString};
use thiserror::Error;

/// One lexical element of an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Identifier(String),
    Integer(i64),
    Float(f64),
    Str(String),
    Bool(bool),
    Null,
    Operator(Operator),
    Delimiter(Delimiter),
}

impl core::fmt::Display for Token {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        match self {
            Token::Identifier(name) => write!(f, "{}", name),
            Token::Integer(i) => write!(f, "{}", i),
            Token::Float(fl) => write!(f, "{}", fl),
            Token::Str(s) => write!(f, "{:?}", s),
            Token::Bool(b) => write!(f, "{}", b),
            Token::Null => write!(f, "null"),
            Token::Operator(op) => write!(f, "{}", op),
            Token::Delimiter(d) => write!(f, "{}", d),
        }
    }
}

/// Operators, ordered here for reference; matching order lives in
/// [`operator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, Display, AsRefStr)]
pub enum Operator {
    #[strum(serialize = "==")]
    EqualEqual,
    #[strum(serialize = "!=")]
    NotEqual,
    #[strum(serialize = ">=")]
    GreaterEqual,
    #[strum(serialize = "<=")]
    LessEqual,
    #[strum(serialize = ">")]
    Greater,
    #[strum(serialize = "<")]
    Less,
    #[strum(serialize = "&&")]
    And,
    #[strum(serialize = "||")]
    Or,
    #[strum(serialize = "!")]
    Not,
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Multiply,
    #[strum(serialize = "/")]
    Divide,
    #[strum(serialize = "%")]
    Modulo,
    #[strum(serialize = "?")]
    Question,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, AsRefStr)]
pub enum Delimiter {
    #[strum(serialize = "(")]
    OpenParen,
    #[strum(serialize = ")")]
    CloseParen,
    #[strum(serialize = "[")]
    OpenBracket,
    #[strum(serialize = "]")]
    CloseBracket,
    #[strum(serialize = "{")]
    OpenBrace,
    #[strum(serialize = "}")]
    CloseBrace,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ".")]
    Dot,
    #[strum(serialize = ":")]
    Colon,
}

// The brace variants cannot go through strum's Display derive: their
// serialized forms would land unescaped inside the generated format
// string. Delegate to the AsRefStr form instead.
impl core::fmt::Display for Delimiter {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.write_str(self.as_ref())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("unexpected character at offset {0}")]
    UnexpectedChar(usize),
}

/// Lexes a full expression string. Any unrecognized character is a
/// [`LexError`]; the evaluator facade turns that into a soft failure.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexError> {
    let mut tokens = Vec::new();
    let mut remaining = input.trim_start();
    while !remaining.is_empty() {
        match token(remaining) {
            Ok((rest, tok)) => {
                tokens.push(tok);
                remaining = rest.trim_start();
            }
            Err(_) => return Err(LexError::UnexpectedChar(input.len() - remaining.len())),
        }
    }
    Ok(tokens)
}

fn token(input: &str) -> IResult<&str, Token> {
    delimited(
        multispace0,
        alt((string_literal, float_literal, integer_literal, word, operator, delimiter)),
        multispace0,
    )(input)
}

#[tracing::instrument(level = "trace", skip(input))]
fn string_literal(input: &str) -> IResult<&str, Token> {
    context(
        "string literal",
        alt((
            map(
                delimited(char('"'), take_while(|c| c != '"'), char('"')),
                |s: &str| Token::Str(s.to_string()),
            ),
            map(
                delimited(char('\''), take_while(|c| c != '\''), char('\'')),
                |s: &str| Token::Str(s.to_string()),
            ),
        )),
    )(input)
}

fn float_literal(input: &str) -> IResult<&str, Token> {
    context(
        "float literal",
        map_res(
            recognize(tuple((digit1, char('.'), digit1))),
            |s: &str| s.parse::<f64>().map(Token::Float),
        ),
    )(input)
}

fn integer_literal(input: &str) -> IResult<&str, Token> {
    context(
        "integer literal",
        map_res(digit1, |s: &str| s.parse::<i64>().map(Token::Integer)),
    )(input)
}

/// Identifiers and the keyword literals `true` / `false` / `null`.
fn word(input: &str) -> IResult<&str, Token> {
    let (rest, ident) = recognize(pair(
        take_while1(|c: char| c.is_alphabetic() || c == '_' || c == '$'),
        take_while(|c: char| c.is_alphanumeric() || c == '_' || c == '$'),
    ))(input)?;
    let token = match ident {
        "true" => Token::Bool(true),
        "false" => Token::Bool(false),
        "null" | "undefined" => Token::Null,
        other => Token::Identifier(other.to_string()),
    };
    Ok((rest, token))
}

/// Longest operators first so multi-char forms win.
fn operator(input: &str) -> IResult<&str, Token> {
    context(
        "operator",
        map(
            alt((
                map(tag("=="), |_| Operator::EqualEqual),
                map(tag("!="), |_| Operator::NotEqual),
                map(tag(">="), |_| Operator::GreaterEqual),
                map(tag("<="), |_| Operator::LessEqual),
                map(tag("&&"), |_| Operator::And),
                map(tag("||"), |_| Operator::Or),
                map(char('>'), |_| Operator::Greater),
                map(char('<'), |_| Operator::Less),
                map(char('!'), |_| Operator::Not),
                map(char('+'), |_| Operator::Plus),
                map(char('-'), |_| Operator::Minus),
                map(char('*'), |_| Operator::Multiply),
                map(char('/'), |_| Operator::Divide),
                map(char('%'), |_| Operator::Modulo),
                map(char('?'), |_| Operator::Question),
            )),
            Token::Operator,
        ),
    )(input)
}

fn delimiter(input: &str) -> IResult<&str, Token> {
    context(
        "delimiter",
        map(
            alt((
                map(char('('), |_| Delimiter::OpenParen),
                map(char(')'), |_| Delimiter::CloseParen),
                map(char('['), |_| Delimiter::OpenBracket),
                map(char(']'), |_| Delimiter::CloseBracket),
                map(char('{'), |_| Delimiter::OpenBrace),
                map(char('}'), |_| Delimiter::CloseBrace),
                map(char(','), |_| Delimiter::Comma),
                map(char('.'), |_| Delimiter::Dot),
                map(char(':'), |_| Delimiter::Colon),
            )),
            Token::Delimiter,
        ),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_tokenize_arithmetic() {
        let tokens = tokenize("1 + 2.5 * count").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Integer(1),
                Token::Operator(Operator::Plus),
                Token::Float(2.5),
                Token::Operator(Operator::Multiply),
                Token::Identifier("count".to_string()),
            ]
        );
    }

    #[test]
    fn test_tokenize_longest_operator_wins() {
        let tokens = tokenize("a >= b").unwrap();
        assert_eq!(tokens[1], Token::Operator(Operator::GreaterEqual));
    }

    #[test]
    fn test_tokenize_keywords() {
        let tokens = tokenize("true false null undefined").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Bool(true),
                Token::Bool(false),
                Token::Null,
                Token::Null
            ]
        );
    }

    #[test]
    fn test_tokenize_member_and_call() {
        let tokens = tokenize("user.name(1)").unwrap();
        assert_eq!(tokens.len(), 6);
        assert_eq!(tokens[1], Token::Delimiter(Delimiter::Dot));
    }

    #[test]
    fn test_tokenize_rejects_garbage() {
        assert!(tokenize("a # b").is_err());
    }

    #[test]
    fn test_delimiter_display_round_trips_brace_forms() {
        assert_eq!(Delimiter::OpenBrace.to_string(), "{");
        assert_eq!(Delimiter::CloseBrace.to_string(), "}");
        assert_eq!(Token::Delimiter(Delimiter::OpenBrace).to_string(), "{");
        assert_eq!(Delimiter::Comma.to_string(), ",");
    }
}
