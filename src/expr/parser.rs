//! # Expression Parser
//!
//! Recursive descent over the token stream, one method per precedence
//! level:
//!
//! ```text
//! ternary → logical or → logical and → comparison → additive
//!         → multiplicative → unary → postfix → primary
//! ```
//!
//! Each binary level parses a head expression and folds trailing
//! `(operator, operand)` pairs left-associatively.

use thiserror::Error;

use super::ast::{BinaryOperator, Expression, Literal, UnaryOperator};
use super::token::{Delimiter, Operator, Token};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprParseError {
    #[error("unexpected token {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },
    #[error("unexpected end of expression")]
    UnexpectedEof,
    #[error("trailing tokens from position {position}")]
    Trailing { position: usize },
}

type ParseResult<T> = Result<T, ExprParseError>;

/// Parses a complete expression; every token must be consumed.
pub fn parse_expression(tokens: &[Token]) -> ParseResult<Expression> {
    let mut parser = ExprParser { tokens, pos: 0 };
    let expression = parser.parse_ternary()?;
    if parser.pos != tokens.len() {
        return Err(ExprParseError::Trailing { position: parser.pos });
    }
    Ok(expression)
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl<'a> ExprParser<'a> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> ParseResult<&Token> {
        let token = self
            .tokens
            .get(self.pos)
            .ok_or(ExprParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(token)
    }

    fn eat_operator(&mut self, op: Operator) -> bool {
        if self.peek() == Some(&Token::Operator(op)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_delimiter(&mut self, delimiter: Delimiter) -> bool {
        if self.peek() == Some(&Token::Delimiter(delimiter)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_delimiter(&mut self, delimiter: Delimiter) -> ParseResult<()> {
        if self.eat_delimiter(delimiter) {
            Ok(())
        } else {
            Err(self.unexpected())
        }
    }

    fn unexpected(&self) -> ExprParseError {
        match self.peek() {
            Some(token) => ExprParseError::UnexpectedToken {
                found: token.to_string(),
                position: self.pos,
            },
            None => ExprParseError::UnexpectedEof,
        }
    }

    fn parse_ternary(&mut self) -> ParseResult<Expression> {
        let condition = self.parse_logical_or()?;
        if !self.eat_operator(Operator::Question) {
            return Ok(condition);
        }
        let then_branch = self.parse_ternary()?;
        if !self.eat_delimiter(Delimiter::Colon) {
            return Err(self.unexpected());
        }
        let else_branch = self.parse_ternary()?;
        Ok(Expression::Ternary {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: Box::new(else_branch),
        })
    }

    fn parse_logical_or(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_logical_and()?;
        while self.eat_operator(Operator::Or) {
            let right = self.parse_logical_and()?;
            left = Expression::BinaryOp {
                op: BinaryOperator::Or,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_comparison()?;
        while self.eat_operator(Operator::And) {
            let right = self.parse_comparison()?;
            left = Expression::BinaryOp {
                op: BinaryOperator::And,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_additive()?;
        while let Some(op) = self.comparison_operator() {
            self.pos += 1;
            let right = self.parse_additive()?;
            left = Expression::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn comparison_operator(&self) -> Option<BinaryOperator> {
        match self.peek() {
            Some(Token::Operator(Operator::EqualEqual)) => Some(BinaryOperator::Equal),
            Some(Token::Operator(Operator::NotEqual)) => Some(BinaryOperator::NotEqual),
            Some(Token::Operator(Operator::Greater)) => Some(BinaryOperator::GreaterThan),
            Some(Token::Operator(Operator::GreaterEqual)) => Some(BinaryOperator::GreaterThanEqual),
            Some(Token::Operator(Operator::Less)) => Some(BinaryOperator::LessThan),
            Some(Token::Operator(Operator::LessEqual)) => Some(BinaryOperator::LessThanEqual),
            _ => None,
        }
    }

    fn parse_additive(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = if self.eat_operator(Operator::Plus) {
                BinaryOperator::Add
            } else if self.eat_operator(Operator::Minus) {
                BinaryOperator::Subtract
            } else {
                return Ok(left);
            };
            let right = self.parse_multiplicative()?;
            left = Expression::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_multiplicative(&mut self) -> ParseResult<Expression> {
        let mut left = self.parse_unary()?;
        loop {
            let op = if self.eat_operator(Operator::Multiply) {
                BinaryOperator::Multiply
            } else if self.eat_operator(Operator::Divide) {
                BinaryOperator::Divide
            } else if self.eat_operator(Operator::Modulo) {
                BinaryOperator::Modulo
            } else {
                return Ok(left);
            };
            let right = self.parse_unary()?;
            left = Expression::BinaryOp {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
    }

    fn parse_unary(&mut self) -> ParseResult<Expression> {
        if self.eat_operator(Operator::Not) {
            return Ok(Expression::Unary {
                op: UnaryOperator::Not,
                operand: Box::new(self.parse_unary()?),
            });
        }
        if self.eat_operator(Operator::Minus) {
            return Ok(Expression::Unary {
                op: UnaryOperator::Negate,
                operand: Box::new(self.parse_unary()?),
            });
        }
        self.parse_postfix()
    }

    /// Member access, index access.
    fn parse_postfix(&mut self) -> ParseResult<Expression> {
        let mut expression = self.parse_primary()?;
        loop {
            if self.eat_delimiter(Delimiter::Dot) {
                let property = match self.advance()? {
                    Token::Identifier(name) => name.clone(),
                    _ => return Err(self.unexpected()),
                };
                expression = Expression::Member {
                    object: Box::new(expression),
                    property,
                };
            } else if self.eat_delimiter(Delimiter::OpenBracket) {
                let index = self.parse_ternary()?;
                self.expect_delimiter(Delimiter::CloseBracket)?;
                expression = Expression::Index {
                    object: Box::new(expression),
                    index: Box::new(index),
                };
            } else {
                return Ok(expression);
            }
        }
    }

    fn parse_primary(&mut self) -> ParseResult<Expression> {
        let token = self.advance()?.clone();
        match token {
            Token::Integer(i) => Ok(Expression::Literal(Literal::Integer(i))),
            Token::Float(f) => Ok(Expression::Literal(Literal::Float(f))),
            Token::Str(s) => Ok(Expression::Literal(Literal::String(s))),
            Token::Bool(b) => Ok(Expression::Literal(Literal::Boolean(b))),
            Token::Null => Ok(Expression::Literal(Literal::Null)),
            Token::Identifier(name) => {
                if self.eat_delimiter(Delimiter::OpenParen) {
                    let arguments = self.parse_arguments()?;
                    Ok(Expression::Call {
                        function: name,
                        arguments,
                    })
                } else {
                    Ok(Expression::Identifier(name))
                }
            }
            Token::Delimiter(Delimiter::OpenParen) => {
                let inner = self.parse_ternary()?;
                self.expect_delimiter(Delimiter::CloseParen)?;
                Ok(inner)
            }
            Token::Delimiter(Delimiter::OpenBracket) => self.parse_list(),
            Token::Delimiter(Delimiter::OpenBrace) => self.parse_map(),
            _ => {
                self.pos -= 1;
                Err(self.unexpected())
            }
        }
    }

    fn parse_arguments(&mut self) -> ParseResult<Vec<Expression>> {
        let mut arguments = Vec::new();
        if self.eat_delimiter(Delimiter::CloseParen) {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.parse_ternary()?);
            if self.eat_delimiter(Delimiter::Comma) {
                continue;
            }
            self.expect_delimiter(Delimiter::CloseParen)?;
            return Ok(arguments);
        }
    }

    fn parse_list(&mut self) -> ParseResult<Expression> {
        let mut items = Vec::new();
        if self.eat_delimiter(Delimiter::CloseBracket) {
            return Ok(Expression::List(items));
        }
        loop {
            items.push(self.parse_ternary()?);
            if self.eat_delimiter(Delimiter::Comma) {
                if self.eat_delimiter(Delimiter::CloseBracket) {
                    return Ok(Expression::List(items));
                }
                continue;
            }
            self.expect_delimiter(Delimiter::CloseBracket)?;
            return Ok(Expression::List(items));
        }
    }

    fn parse_map(&mut self) -> ParseResult<Expression> {
        let mut entries = Vec::new();
        if self.eat_delimiter(Delimiter::CloseBrace) {
            return Ok(Expression::Map(entries));
        }
        loop {
            let key = match self.advance()? {
                Token::Identifier(name) => name.clone(),
                Token::Str(s) => s.clone(),
                _ => return Err(self.unexpected()),
            };
            self.expect_delimiter(Delimiter::Colon)?;
            let value = self.parse_ternary()?;
            entries.push((key, value));
            if self.eat_delimiter(Delimiter::Comma) {
                if self.eat_delimiter(Delimiter::CloseBrace) {
                    return Ok(Expression::Map(entries));
                }
                continue;
            }
            self.expect_delimiter(Delimiter::CloseBrace)?;
            return Ok(Expression::Map(entries));
        }
    }
}
