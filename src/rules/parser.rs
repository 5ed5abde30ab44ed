//! Recursive-descent parser for the rule DSL, shaped after the staged
//! lexer/parser split used by query-engine parsers in the wider ecosystem,
//! but hand-written: the grammar is small and fixed, and every production
//! must stay auditable against the whitelist rule below.

use super::ast::{CmpOp, Expr, Term};
use super::lexer::{lex, Token};

#[derive(Debug)]
pub struct ParseError(pub String);

pub fn parse(src: &str) -> Result<Expr, ParseError> {
    let tokens = lex(src).map_err(|e| ParseError(e.0))?;
    let mut p = Parser { tokens, pos: 0 };
    let expr = p.or_expr()?;
    p.expect(&Token::Eof)?;
    Ok(expr)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let t = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, want: &Token) -> Result<(), ParseError> {
        if self.peek() == want {
            self.advance();
            Ok(())
        } else {
            Err(ParseError(format!("expected {want:?}, found {:?}", self.peek())))
        }
    }

    fn or_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.and_expr()?;
        while *self.peek() == Token::Or {
            self.advance();
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.not_expr()?;
        while *self.peek() == Token::And {
            self.advance();
            let rhs = self.not_expr()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn not_expr(&mut self) -> Result<Expr, ParseError> {
        if *self.peek() == Token::Not {
            self.advance();
            let inner = self.not_expr()?;
            Ok(Expr::Not(Box::new(inner)))
        } else {
            self.cmp()
        }
    }

    fn cmp(&mut self) -> Result<Expr, ParseError> {
        let lhs = self.term()?;
        let op = match self.peek() {
            Token::Lt => Some(CmpOp::Lt),
            Token::Le => Some(CmpOp::Le),
            Token::Gt => Some(CmpOp::Gt),
            Token::Ge => Some(CmpOp::Ge),
            Token::EqEq => Some(CmpOp::Eq),
            Token::NotEq => Some(CmpOp::Ne),
            Token::In => Some(CmpOp::In),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let rhs = self.term()?;
                Ok(Expr::Cmp(Box::new(lhs), op, Box::new(rhs)))
            }
            None => Ok(Expr::Bare(Box::new(lhs))),
        }
    }

    fn term(&mut self) -> Result<Term, ParseError> {
        match self.advance() {
            Token::Number(n) => Ok(Term::Number(n)),
            Token::Str(s) => Ok(Term::Str(s)),
            Token::Ident(base) => {
                let mut suffixes = Vec::new();
                while *self.peek() == Token::Dot {
                    self.advance();
                    match self.advance() {
                        Token::Ident(s) => suffixes.push(s),
                        other => return Err(ParseError(format!("expected identifier after '.', found {other:?}"))),
                    }
                }
                let call = if *self.peek() == Token::LParen {
                    self.advance();
                    let mut args = Vec::new();
                    if *self.peek() != Token::RParen {
                        args.push(self.or_expr()?);
                        while *self.peek() == Token::Comma {
                            self.advance();
                            args.push(self.or_expr()?);
                        }
                    }
                    self.expect(&Token::RParen)?;
                    Some(args)
                } else {
                    None
                };
                Ok(Term::Ident { base, suffixes, call })
            }
            other => Err(ParseError(format!("unexpected token {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_comparison() {
        let expr = parse("cpu_idle.top < 5").unwrap();
        assert!(matches!(expr, Expr::Cmp(_, CmpOp::Lt, _)));
    }

    #[test]
    fn parses_boolean_combinators_with_precedence() {
        // `and` binds tighter than `or`.
        let expr = parse("a < 1 or b < 2 and c < 3").unwrap();
        match expr {
            Expr::Or(lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Cmp(..)));
                assert!(matches!(*rhs, Expr::And(..)));
            }
            other => panic!("expected Or at the top, got {other:?}"),
        }
    }

    #[test]
    fn parses_not_and_bare_identifier() {
        let expr = parse("not up").unwrap();
        assert!(matches!(expr, Expr::Not(_)));
    }

    #[test]
    fn parses_call_syntax_structurally_even_though_it_is_rejected_later() {
        let expr = parse("os.system(\"rm -rf /\")").unwrap();
        match expr {
            Expr::Bare(term) => match *term {
                Term::Ident { call: Some(_), .. } => {}
                other => panic!("expected a call term, got {other:?}"),
            },
            other => panic!("expected Bare, got {other:?}"),
        }
    }

    #[test]
    fn rejects_malformed_input() {
        assert!(parse("cpu_idle <").is_err());
        assert!(parse("(((").is_err());
    }
}
