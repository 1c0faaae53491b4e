//! Recursive-descent parser for the policy expression DSL.
//!
//! Grammar (lowest to highest precedence):
//! ```text
//! expr := or_expr
//! or_expr := and_expr ("or" and_expr)*
//! and_expr:= not_expr ("and" not_expr)*
//! not_expr:= "not" not_expr | cmp_expr
//! cmp_expr:= add_expr (("==" | "!=" | "<" | "<=" | ">" | ">=") add_expr)?
//! add_expr:= mul_expr (("+" | "-") mul_expr)*
//! mul_expr:= unary (("*" | "/" | "%") unary)*
//! unary := "-" unary | primary
//! primary := number | bool | ident ("." ident)* | ident "(" args ")" | "(" expr ")"
//! ```

use crate::error::PolicyError;
use crate::policy::ast::{BinOp, Expr};
use crate::policy::lexer::{lex, Spanned, Token};

pub(crate) fn parse(src: &str) -> Result<Expr, PolicyError> {
    let tokens = lex(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expr()?;
    parser.expect(&Token::Eof, "end of expression")?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].token
    }

    fn offset(&self) -> usize {
        self.tokens[self.pos].offset
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].token.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, want: &Token, what: &str) -> Result<(), PolicyError> {
        if self.peek() == want {
            self.advance();
            Ok(())
        } else {
            Err(PolicyError::ParseError {
                    offset: self.offset(),
                    message: format!("expected {what}, found {:?}", self.peek()),
            })
        }
    }

    fn parse_expr(&mut self) -> Result<Expr, PolicyError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, PolicyError> {
        let mut lhs = self.parse_and()?;
        while matches!(self.peek(), Token::Or) {
            self.advance();
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> Result<Expr, PolicyError> {
        let mut lhs = self.parse_not()?;
        while matches!(self.peek(), Token::And) {
            self.advance();
            let rhs = self.parse_not()?;
            lhs = Expr::Binary(BinOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_not(&mut self) -> Result<Expr, PolicyError> {
        if matches!(self.peek(), Token::Not) {
            self.advance();
            let inner = self.parse_not()?;
            Ok(Expr::Not(Box::new(inner)))
        } else {
            self.parse_cmp()
        }
    }

    fn parse_cmp(&mut self) -> Result<Expr, PolicyError> {
        let lhs = self.parse_add()?;
        let op = match self.peek() {
            Token::Eq => BinOp::Eq,
            Token::Ne => BinOp::Ne,
            Token::Lt => BinOp::Lt,
            Token::Le => BinOp::Le,
            Token::Gt => BinOp::Gt,
            Token::Ge => BinOp::Ge,
            _ => return Ok(lhs),
        };
        self.advance();
        let rhs = self.parse_add()?;
        Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
    }

    fn parse_add(&mut self) -> Result<Expr, PolicyError> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Token::Plus => BinOp::Add,
                Token::Minus => BinOp::Sub,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_mul(&mut self) -> Result<Expr, PolicyError> {
        let mut lhs = self.parse_unary()?;
        loop {
            let op = match self.peek() {
                Token::Star => BinOp::Mul,
                Token::Slash => BinOp::Div,
                Token::Percent => BinOp::Mod,
                _ => break,
            };
            self.advance();
            let rhs = self.parse_unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, PolicyError> {
        if matches!(self.peek(), Token::Minus) {
            self.advance();
            let inner = self.parse_unary()?;
            Ok(Expr::Neg(Box::new(inner)))
        } else {
            self.parse_primary()
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, PolicyError> {
        match self.peek().clone() {
            Token::Number(n) => {
                self.advance();
                Ok(Expr::Number(n))
            }
            Token::Bool(b) => {
                self.advance();
                Ok(Expr::Bool(b))
            }
            Token::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(&Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::Ident(name) => {
                self.advance();
                if matches!(self.peek(), Token::LParen) {
                    self.advance();
                    let mut args = Vec::new();
                    if !matches!(self.peek(), Token::RParen) {
                        args.push(self.parse_expr()?);
                        while matches!(self.peek(), Token::Comma) {
                            self.advance();
                            args.push(self.parse_expr()?);
                        }
                    }
                    self.expect(&Token::RParen, "')'")?;
                    Ok(Expr::Call(name, args))
                } else {
                    let mut path = name;
                    while matches!(self.peek(), Token::Dot) {
                        self.advance();
                        match self.advance() {
                            Token::Ident(part) => {
                                path.push('.');
                                path.push_str(&part);
                            }
                            other => {
                                return Err(PolicyError::ParseError {
                                        offset: self.offset(),
                                        message: format!(
                                            "expected identifier after '.', found {other:?}"
                                        ),
                                })
                            }
                        }
                    }
                    Ok(Expr::Ident(path))
                }
            }
            other => Err(PolicyError::ParseError {
                    offset: self.offset(),
                    message: format!("unexpected token: {other:?}"),
            }),
        }
    }
}
