//! Parser and evaluator for objective formulas.
//!
//! Recursive descent over the token stream, producing a small expression
//! tree. Evaluation walks the tree against a typed name→number
//! environment; there is no host-language evaluation anywhere, so a
//! user-authored formula can only ever do arithmetic.

use crate::errors::{CoreError, Result};
use crate::formula::lexer::{Lexer, Token, TokenKind};
use std::collections::{BTreeMap, BTreeSet};

/// A parsed formula expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    /// Numeric literal.
    Number(f64),
    /// Named variable, bound at evaluation time.
    Variable(String),
    /// Unary negation.
    Negate(Box<Expr>),
    /// Binary arithmetic operation.
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
}

/// The closed operator set formulas may use.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl Expr {
    /// Collect the free variables of this expression.
    pub fn variables(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Variable(name) => {
                out.insert(name.clone());
            }
            Expr::Negate(inner) => inner.variables(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.variables(out);
                rhs.variables(out);
            }
        }
    }

    /// Evaluate against a variable environment.
    ///
    /// An unbound variable or a division by zero is a [`CoreError::Formula`].
    pub fn evaluate(&self, env: &BTreeMap<String, f64>) -> Result<f64> {
        match self {
            Expr::Number(n) => Ok(*n),
            Expr::Variable(name) => env
                .get(name)
                .copied()
                .ok_or_else(|| CoreError::Formula(format!("unbound variable '{}'", name))),
            Expr::Negate(inner) => Ok(-inner.evaluate(env)?),
            Expr::Binary { op, lhs, rhs } => {
                let left = lhs.evaluate(env)?;
                let right = rhs.evaluate(env)?;

                match op {
                    BinaryOp::Add => Ok(left + right),
                    BinaryOp::Sub => Ok(left - right),
                    BinaryOp::Mul => Ok(left * right),
                    BinaryOp::Div => {
                        if right == 0.0 {
                            Err(CoreError::Formula("division by zero".to_string()))
                        } else {
                            Ok(left / right)
                        }
                    }
                }
            }
        }
    }
}

/// Recursive descent parser for formulas.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    /// Parse formula text into an expression tree.
    pub fn parse(input: &str) -> Result<Expr> {
        let tokens = Lexer::new(input).tokenize()?;
        let mut parser = Self { tokens, pos: 0 };

        let expr = parser.parse_expr()?;
        parser.expect(TokenKind::Eof)?;
        Ok(expr)
    }

    // expr := term (('+' | '-') term)*
    fn parse_expr(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_term()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.advance();

            let rhs = self.parse_term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    // term := factor (('*' | '/') factor)*
    fn parse_term(&mut self) -> Result<Expr> {
        let mut lhs = self.parse_factor()?;

        loop {
            let op = match self.peek_kind() {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                _ => break,
            };
            self.advance();

            let rhs = self.parse_factor()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }

        Ok(lhs)
    }

    // factor := number | identifier | '(' expr ')' | '-' factor
    fn parse_factor(&mut self) -> Result<Expr> {
        let token = self.peek().clone();

        match token.kind {
            TokenKind::Number => {
                self.advance();
                let value: f64 = token.text.parse().map_err(|_| {
                    CoreError::Validation(format!(
                        "malformed number '{}' at column {}",
                        token.text, token.col
                    ))
                })?;
                Ok(Expr::Number(value))
            }
            TokenKind::Identifier => {
                self.advance();
                Ok(Expr::Variable(token.text))
            }
            TokenKind::OpenParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::CloseParen)?;
                Ok(inner)
            }
            TokenKind::Minus => {
                self.advance();
                let inner = self.parse_factor()?;
                Ok(Expr::Negate(Box::new(inner)))
            }
            other => Err(CoreError::Validation(format!(
                "expected a value at column {}, found {}",
                token.col, other
            ))),
        }
    }

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn peek_kind(&self) -> TokenKind {
        self.tokens[self.pos].kind
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn expect(&mut self, kind: TokenKind) -> Result<&Token> {
        if self.peek_kind() == kind {
            let token = &self.tokens[self.pos];
            if self.pos < self.tokens.len() - 1 {
                self.pos += 1;
            }
            Ok(token)
        } else {
            Err(CoreError::Validation(format!(
                "expected {} at column {}, found {}",
                kind,
                self.peek().col,
                self.peek_kind()
            )))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(vars: &[(&str, f64)]) -> BTreeMap<String, f64> {
        vars.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = Parser::parse("1 + 2 * 3").unwrap();
        assert_eq!(expr.evaluate(&env(&[])).unwrap(), 7.0);
    }

    #[test]
    fn test_parentheses_override_precedence() {
        let expr = Parser::parse("(1 + 2) * 3").unwrap();
        assert_eq!(expr.evaluate(&env(&[])).unwrap(), 9.0);
    }

    #[test]
    fn test_left_associative_subtraction() {
        let expr = Parser::parse("10 - 3 - 2").unwrap();
        assert_eq!(expr.evaluate(&env(&[])).unwrap(), 5.0);
    }

    #[test]
    fn test_variables_and_negation() {
        let expr = Parser::parse("-score + 10").unwrap();
        assert_eq!(expr.evaluate(&env(&[("score", 4.0)])).unwrap(), 6.0);
    }

    #[test]
    fn test_collects_free_variables() {
        let expr = Parser::parse("a * (b + a) - 2").unwrap();
        let mut vars = BTreeSet::new();
        expr.variables(&mut vars);
        assert_eq!(
            vars.into_iter().collect::<Vec<_>>(),
            vec!["a".to_string(), "b".to_string()]
        );
    }

    #[test]
    fn test_unbound_variable_is_formula_error() {
        let expr = Parser::parse("missing + 1").unwrap();
        let err = expr.evaluate(&env(&[])).unwrap_err();
        assert!(matches!(err, CoreError::Formula(_)));
    }

    #[test]
    fn test_division_by_zero_is_formula_error() {
        let expr = Parser::parse("1 / x").unwrap();
        let err = expr.evaluate(&env(&[("x", 0.0)])).unwrap_err();
        assert!(matches!(err, CoreError::Formula(_)));
    }

    #[test]
    fn test_dangling_operator_is_validation_error() {
        let err = Parser::parse("1 +").unwrap_err();
        assert!(matches!(err, CoreError::Validation(_)));
    }

    #[test]
    fn test_unbalanced_parenthesis_is_validation_error() {
        assert!(Parser::parse("(1 + 2").is_err());
        assert!(Parser::parse("1 + 2)").is_err());
    }
}
