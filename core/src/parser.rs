/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * This file is part of the Ark Sovereign Compiler.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * 1. OPEN SOURCE: You may use this file under the terms of the GNU Affero
 * General Public License v3.0. If you link to this code, your ENTIRE
 * application must be open-sourced under AGPLv3.
 *
 * 2. COMMERCIAL: For proprietary use, you must obtain a Commercial License
 * from Sovereign Systems.
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

//! Source Parser: Recursive Descent with Precedence Climbing
//!
//! Statements are dispatched on their first token. Expressions are parsed by
//! `parse_expression(min_precedence)`, which folds infix operators whose
//! precedence is strictly greater than the caller's, so every binary operator
//! is left-associative.
//!
//! String literals are interned into the compilation's symbol table as they
//! are parsed, which fixes their linear-memory layout before any later pass.

use crate::ast::{
    BinaryOp, Expression, ExpressionKind, Field, FunctionDecl, LetSpec, Location, Program,
    Statement, StatementKind, StructDecl, TypeName, UnaryOp,
};
use crate::lexer::{LexError, Lexer, Token, TokenKind};
use crate::symbols::SymbolTable;
use thiserror::Error;

// ─── Error Types ─────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Syntax Error at {line}:{column}: {message}")]
    Syntax {
        message: String,
        line: u32,
        column: u32,
    },
    #[error("Unexpected token: expected {expected}, found {found} at {line}:{column}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: u32,
        column: u32,
    },
    #[error("{0}")]
    Lex(#[from] LexError),
}

impl ParseError {
    fn syntax(msg: impl Into<String>, tok: &Token) -> Self {
        ParseError::Syntax {
            message: msg.into(),
            line: tok.line,
            column: tok.column,
        }
    }

    fn unexpected(expected: impl Into<String>, tok: &Token) -> Self {
        ParseError::UnexpectedToken {
            expected: expected.into(),
            found: tok.kind.describe(),
            line: tok.line,
            column: tok.column,
        }
    }
}

// ─── Precedence Table ────────────────────────────────────────────────────────

const PREC_LOWEST: u8 = 0;
const PREC_OR: u8 = 2;
const PREC_AND: u8 = 3;
const PREC_COMPARE: u8 = 4;
const PREC_SUM: u8 = 5;
const PREC_PRODUCT: u8 = 6;
const PREC_POSTFIX: u8 = 7;

/// Deepest expression or block nesting accepted. Every later pass walks the
/// tree recursively, so this bounds their stack use as well.
pub const MAX_NESTING_DEPTH: u32 = 256;

fn infix_precedence(kind: &TokenKind) -> Option<u8> {
    match kind {
        TokenKind::LParen | TokenKind::LBracket | TokenKind::Dot => Some(PREC_POSTFIX),
        TokenKind::Star | TokenKind::Slash => Some(PREC_PRODUCT),
        TokenKind::Plus | TokenKind::Minus => Some(PREC_SUM),
        TokenKind::Eq
        | TokenKind::Neq
        | TokenKind::Lt
        | TokenKind::Gt
        | TokenKind::Le
        | TokenKind::Ge => Some(PREC_COMPARE),
        TokenKind::AndAnd => Some(PREC_AND),
        TokenKind::OrOr => Some(PREC_OR),
        _ => None,
    }
}

fn binary_op(kind: &TokenKind) -> Option<BinaryOp> {
    Some(match kind {
        TokenKind::Plus => BinaryOp::Add,
        TokenKind::Minus => BinaryOp::Sub,
        TokenKind::Star => BinaryOp::Mul,
        TokenKind::Slash => BinaryOp::Div,
        TokenKind::Eq => BinaryOp::Eq,
        TokenKind::Neq => BinaryOp::Neq,
        TokenKind::Lt => BinaryOp::Lt,
        TokenKind::Gt => BinaryOp::Gt,
        TokenKind::Le => BinaryOp::Le,
        TokenKind::Ge => BinaryOp::Ge,
        TokenKind::AndAnd => BinaryOp::And,
        TokenKind::OrOr => BinaryOp::Or,
        _ => return None,
    })
}

fn location_of(tok: &Token) -> Location {
    Location::new(tok.line, tok.column)
}

// ─── Parser ──────────────────────────────────────────────────────────────────

pub struct Parser<'a> {
    lexer: Lexer,
    current: Token,
    symbols: &'a mut SymbolTable,
    depth: u32,
}

impl<'a> Parser<'a> {
    pub fn new(source: &str, symbols: &'a mut SymbolTable) -> Result<Self, ParseError> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Parser {
            lexer,
            current,
            symbols,
            depth: 0,
        })
    }

    fn peek(&self) -> &Token {
        &self.current
    }

    fn advance(&mut self) -> Result<Token, ParseError> {
        let next = self.lexer.next_token()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    fn expect(&mut self, expected: &TokenKind) -> Result<Token, ParseError> {
        if self.check(expected) {
            self.advance()
        } else {
            Err(ParseError::unexpected(expected.describe(), self.peek()))
        }
    }

    fn expect_identifier(&mut self, what: &str) -> Result<(String, Location), ParseError> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                let tok = self.advance()?;
                Ok((name, location_of(&tok)))
            }
            _ => Err(ParseError::unexpected(what, self.peek())),
        }
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn match_tok(&mut self, kind: &TokenKind) -> Result<bool, ParseError> {
        if self.check(kind) {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn at_end(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Eof)
    }

    fn descend(&mut self) -> Result<(), ParseError> {
        self.depth += 1;
        if self.depth > MAX_NESTING_DEPTH {
            return Err(ParseError::syntax(
                format!("nesting exceeds {} levels", MAX_NESTING_DEPTH),
                self.peek(),
            ));
        }
        Ok(())
    }

    /// Run `parse` one nesting level deeper.
    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, ParseError>,
    ) -> Result<T, ParseError> {
        let entry = self.depth;
        let result = match self.descend() {
            Ok(()) => parse(self),
            Err(e) => Err(e),
        };
        self.depth = entry;
        result
    }

    fn skip_semicolons(&mut self) -> Result<(), ParseError> {
        while self.match_tok(&TokenKind::Semicolon)? {}
        Ok(())
    }

    // ─── Top-Level ───────────────────────────────────────────────────────

    pub fn parse_program(&mut self) -> Result<Program, ParseError> {
        let mut statements = Vec::new();
        self.skip_semicolons()?;
        while !self.at_end() {
            statements.push(self.parse_statement()?);
        }
        Ok(Program { statements })
    }

    // ─── Statements ──────────────────────────────────────────────────────

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        let stmt = match &self.peek().kind {
            TokenKind::Export => self.parse_export()?,
            TokenKind::Func => self.parse_function(false)?,
            TokenKind::Return => self.parse_return()?,
            TokenKind::Let | TokenKind::Var => self.parse_let()?,
            TokenKind::If => self.parse_if()?,
            TokenKind::While => self.parse_while()?,
            TokenKind::Print => self.parse_print()?,
            TokenKind::Struct => self.parse_struct()?,
            TokenKind::LBrace => {
                let location = location_of(self.peek());
                let body = self.parse_block()?;
                Statement::new(StatementKind::Block(body), location)
            }
            _ => self.parse_expr_or_assign()?,
        };
        self.skip_semicolons()?;
        Ok(stmt)
    }

    fn parse_export(&mut self) -> Result<Statement, ParseError> {
        self.expect(&TokenKind::Export)?;
        if !self.check(&TokenKind::Func) {
            return Err(ParseError::unexpected("'func' after 'export'", self.peek()));
        }
        self.parse_function(true)
    }

    fn parse_function(&mut self, exported: bool) -> Result<Statement, ParseError> {
        let func_tok = self.expect(&TokenKind::Func)?;
        let (name, _) = self.expect_identifier("function name")?;

        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        if !self.check(&TokenKind::RParen) {
            loop {
                params.push(self.parse_field("parameter name")?);
                if !self.match_tok(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;

        let return_type = if self.match_tok(&TokenKind::Arrow)? {
            Some(self.parse_type()?)
        } else {
            None
        };

        let body = self.parse_block()?;

        Ok(Statement::new(
            StatementKind::Function(FunctionDecl {
                name,
                params,
                return_type,
                body,
                exported,
            }),
            location_of(&func_tok),
        ))
    }

    /// `name: type`
    fn parse_field(&mut self, what: &str) -> Result<Field, ParseError> {
        let (name, location) = self.expect_identifier(what)?;
        self.expect(&TokenKind::Colon)?;
        let ty = self.parse_type()?;
        Ok(Field { name, ty, location })
    }

    fn parse_struct(&mut self) -> Result<Statement, ParseError> {
        let struct_tok = self.expect(&TokenKind::Struct)?;
        let (name, _) = self.expect_identifier("struct name")?;
        self.expect(&TokenKind::LBrace)?;

        let mut fields = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.at_end() {
            fields.push(self.parse_field("field name")?);
            // Separators between fields are optional.
            self.match_tok(&TokenKind::Comma)?;
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(Statement::new(
            StatementKind::Struct(StructDecl { name, fields }),
            location_of(&struct_tok),
        ))
    }

    fn parse_return(&mut self) -> Result<Statement, ParseError> {
        let tok = self.expect(&TokenKind::Return)?;
        let value = if self.check(&TokenKind::Semicolon)
            || self.check(&TokenKind::RBrace)
            || self.at_end()
        {
            None
        } else {
            Some(self.parse_expression(PREC_LOWEST)?)
        };
        Ok(Statement::new(StatementKind::Return(value), location_of(&tok)))
    }

    fn parse_let(&mut self) -> Result<Statement, ParseError> {
        let tok = self.advance()?;
        let mutable = tok.kind == TokenKind::Var;

        let mut specs = Vec::new();
        loop {
            let (name, location) = self.expect_identifier("variable name")?;
            let declared = if self.match_tok(&TokenKind::Colon)? {
                Some(self.parse_type()?)
            } else {
                None
            };
            specs.push(LetSpec {
                name,
                declared,
                resolved: None,
                location,
            });
            if !self.match_tok(&TokenKind::Comma)? {
                break;
            }
        }

        let value = if self.match_tok(&TokenKind::Assign)? {
            Some(self.parse_expression(PREC_LOWEST)?)
        } else {
            None
        };

        Ok(Statement::new(
            StatementKind::Let {
                mutable,
                specs,
                value,
            },
            location_of(&tok),
        ))
    }

    fn parse_if(&mut self) -> Result<Statement, ParseError> {
        let tok = self.expect(&TokenKind::If)?;
        let condition = self.parse_expression(PREC_LOWEST)?;
        let body = self.parse_block()?;

        let alternate = if self.match_tok(&TokenKind::Else)? {
            if self.check(&TokenKind::If) {
                Some(Box::new(self.nested(|p| p.parse_if())?))
            } else {
                let location = location_of(self.peek());
                let block = self.parse_block()?;
                Some(Box::new(Statement::new(StatementKind::Block(block), location)))
            }
        } else {
            None
        };

        Ok(Statement::new(
            StatementKind::If {
                condition,
                body,
                alternate,
            },
            location_of(&tok),
        ))
    }

    fn parse_while(&mut self) -> Result<Statement, ParseError> {
        let tok = self.expect(&TokenKind::While)?;
        let condition = self.parse_expression(PREC_LOWEST)?;
        let body = self.parse_block()?;
        Ok(Statement::new(
            StatementKind::While { condition, body },
            location_of(&tok),
        ))
    }

    fn parse_print(&mut self) -> Result<Statement, ParseError> {
        let tok = self.expect(&TokenKind::Print)?;
        let value = self.parse_expression(PREC_LOWEST)?;
        Ok(Statement::new(StatementKind::Print(value), location_of(&tok)))
    }

    fn parse_expr_or_assign(&mut self) -> Result<Statement, ParseError> {
        let start = self.peek().clone();
        let expr = self.parse_expression(PREC_LOWEST)?;

        if !self.check(&TokenKind::Assign) {
            return Ok(Statement::new(
                StatementKind::Expression(expr),
                location_of(&start),
            ));
        }

        match expr.kind {
            ExpressionKind::Identifier(_) | ExpressionKind::Member { .. } => {}
            _ => {
                return Err(ParseError::syntax(
                    "assignment target must be a variable or a field access",
                    &start,
                ))
            }
        }
        self.advance()?; // =
        let value = self.parse_expression(PREC_LOWEST)?;
        Ok(Statement::new(
            StatementKind::Assignment {
                target: expr,
                value,
            },
            location_of(&start),
        ))
    }

    fn parse_block(&mut self) -> Result<Vec<Statement>, ParseError> {
        self.expect(&TokenKind::LBrace)?;
        let stmts = self.nested(|p| {
            let mut stmts = Vec::new();
            p.skip_semicolons()?;
            while !p.check(&TokenKind::RBrace) && !p.at_end() {
                stmts.push(p.parse_statement()?);
            }
            Ok(stmts)
        })?;
        self.expect(&TokenKind::RBrace)?;
        Ok(stmts)
    }

    // ─── Types ───────────────────────────────────────────────────────────

    fn parse_type(&mut self) -> Result<TypeName, ParseError> {
        match &self.peek().kind {
            TokenKind::Identifier(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(TypeName::Named(name))
            }
            TokenKind::LBracket => {
                self.advance()?;
                let inner = self.parse_type()?;
                self.expect(&TokenKind::RBracket)?;
                Ok(TypeName::Array(Box::new(inner)))
            }
            TokenKind::LParen => {
                self.advance()?;
                let first = self.parse_type()?;
                if !self.check(&TokenKind::Comma) {
                    self.expect(&TokenKind::RParen)?;
                    return Ok(first);
                }
                let mut elements = vec![first];
                while self.match_tok(&TokenKind::Comma)? {
                    if self.check(&TokenKind::RParen) {
                        break;
                    }
                    elements.push(self.parse_type()?);
                }
                self.expect(&TokenKind::RParen)?;
                Ok(TypeName::Tuple(elements))
            }
            _ => Err(ParseError::unexpected("type", self.peek())),
        }
    }

    // ─── Expressions (Precedence Climbing) ───────────────────────────────

    pub fn parse_expression(&mut self, min_precedence: u8) -> Result<Expression, ParseError> {
        self.nested(|p| p.climb(min_precedence))
    }

    // Each folded operator deepens the left spine, so it counts as a level.
    fn climb(&mut self, min_precedence: u8) -> Result<Expression, ParseError> {
        let mut left = self.parse_prefix()?;
        while let Some(precedence) = infix_precedence(&self.peek().kind) {
            if precedence <= min_precedence {
                break;
            }
            self.descend()?;
            left = self.parse_infix(left, precedence)?;
        }
        Ok(left)
    }

    fn parse_infix(&mut self, left: Expression, precedence: u8) -> Result<Expression, ParseError> {
        let op_tok = self.advance()?;
        let location = left.location;

        match &op_tok.kind {
            TokenKind::LParen => {
                let callee = match left.kind {
                    ExpressionKind::Identifier(name) => name,
                    _ => {
                        return Err(ParseError::syntax(
                            "only named functions can be called",
                            &op_tok,
                        ))
                    }
                };
                let args = self.parse_expression_list(&TokenKind::RParen)?;
                Ok(Expression::new(ExpressionKind::Call { callee, args }, location))
            }
            TokenKind::LBracket => {
                let index = self.parse_expression(PREC_LOWEST)?;
                self.expect(&TokenKind::RBracket)?;
                Ok(Expression::new(
                    ExpressionKind::Index {
                        base: Box::new(left),
                        index: Box::new(index),
                    },
                    location,
                ))
            }
            TokenKind::Dot => {
                let (member, _) = self.expect_identifier("field name")?;
                Ok(Expression::new(
                    ExpressionKind::Member {
                        base: Box::new(left),
                        member,
                    },
                    location,
                ))
            }
            kind => {
                let op = binary_op(kind)
                    .ok_or_else(|| ParseError::unexpected("binary operator", &op_tok))?;
                let right = self.parse_expression(precedence)?;
                Ok(Expression::new(
                    ExpressionKind::Binary {
                        left: Box::new(left),
                        op,
                        right: Box::new(right),
                    },
                    location,
                ))
            }
        }
    }

    /// Comma separated expressions up to and including `close`.
    fn parse_expression_list(&mut self, close: &TokenKind) -> Result<Vec<Expression>, ParseError> {
        let mut items = Vec::new();
        if !self.check(close) {
            loop {
                items.push(self.parse_expression(PREC_LOWEST)?);
                if !self.match_tok(&TokenKind::Comma)? {
                    break;
                }
            }
        }
        self.expect(close)?;
        Ok(items)
    }

    fn parse_unary(&mut self, op: UnaryOp) -> Result<ExpressionKind, ParseError> {
        // Binds tighter than `*` but looser than postfix operators.
        let operand = self.parse_expression(PREC_PRODUCT)?;
        Ok(ExpressionKind::Unary {
            op,
            operand: Box::new(operand),
        })
    }

    fn parse_prefix(&mut self) -> Result<Expression, ParseError> {
        let tok = self.advance()?;
        let location = location_of(&tok);

        let kind = match &tok.kind {
            TokenKind::Integer(v) => ExpressionKind::Integer(*v),
            TokenKind::Float(v) => ExpressionKind::Float(*v),
            TokenKind::True => ExpressionKind::Integer(1),
            TokenKind::False => ExpressionKind::Integer(0),
            TokenKind::StringLit(s) => {
                if self.symbols.intern_string(s).is_none() {
                    return Err(ParseError::syntax(
                        "string literals do not fit in linear memory",
                        &tok,
                    ));
                }
                ExpressionKind::Str(s.clone())
            }
            TokenKind::Identifier(name) => ExpressionKind::Identifier(name.clone()),
            TokenKind::Minus => self.parse_unary(UnaryOp::Negate)?,
            TokenKind::Bang => self.parse_unary(UnaryOp::Not)?,
            TokenKind::LParen => {
                let first = self.parse_expression(PREC_LOWEST)?;
                if !self.check(&TokenKind::Comma) {
                    self.expect(&TokenKind::RParen)?;
                    return Ok(first);
                }
                let mut elements = vec![first];
                while self.match_tok(&TokenKind::Comma)? {
                    if self.check(&TokenKind::RParen) {
                        break;
                    }
                    elements.push(self.parse_expression(PREC_LOWEST)?);
                }
                self.expect(&TokenKind::RParen)?;
                ExpressionKind::Tuple(elements)
            }
            TokenKind::LBracket => {
                ExpressionKind::Array(self.parse_expression_list(&TokenKind::RBracket)?)
            }
            _ => return Err(ParseError::unexpected("expression", &tok)),
        };

        Ok(Expression::new(kind, location))
    }
}

// ─── Public API ──────────────────────────────────────────────────────────────

/// Parse source text into a `Program`, interning string literals into
/// `symbols`.
pub fn parse_program(source: &str, symbols: &mut SymbolTable) -> Result<Program, ParseError> {
    let mut parser = Parser::new(source, symbols)?;
    parser.parse_program()
}

/// Parse source text with a throwaway symbol table.
pub fn parse_source(source: &str) -> Result<Program, ParseError> {
    let mut symbols = SymbolTable::new();
    parse_program(source, &mut symbols)
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Vec<Statement> {
        parse_source(source).unwrap().statements
    }

    fn function_body(source: &str) -> Vec<Statement> {
        match parse(source).remove(0).kind {
            StatementKind::Function(f) => f.body,
            other => panic!("Expected Function, got {:?}", other),
        }
    }

    fn returned(source: &str) -> Expression {
        match function_body(source).remove(0).kind {
            StatementKind::Return(Some(expr)) => expr,
            other => panic!("Expected Return, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_function_def() {
        let stmts = parse("func add(a: i32, b: i32) -> i32 { return a + b; }");
        assert_eq!(stmts.len(), 1);
        if let StatementKind::Function(f) = &stmts[0].kind {
            assert_eq!(f.name, "add");
            assert_eq!(f.params.len(), 2);
            assert_eq!(f.params[1].name, "b");
            assert_eq!(f.return_type, Some(TypeName::Named("i32".to_string())));
            assert!(!f.exported);
        } else {
            panic!("Expected Function, got {:?}", stmts[0]);
        }
    }

    #[test]
    fn test_parse_export_and_default_return() {
        let stmts = parse("export func tick() { }");
        if let StatementKind::Function(f) = &stmts[0].kind {
            assert!(f.exported);
            assert_eq!(f.return_type, None);
        } else {
            panic!("Expected Function");
        }
        assert!(parse_source("export struct S { }").is_err());
    }

    #[test]
    fn test_parse_arithmetic_precedence() {
        // 2 + (3 * 4)
        let expr = returned("func main() -> i32 { return 2 + 3 * 4; }");
        if let ExpressionKind::Binary { left, op, right } = expr.kind {
            assert_eq!(op, BinaryOp::Add);
            assert_eq!(left.kind, ExpressionKind::Integer(2));
            assert!(matches!(right.kind, ExpressionKind::Binary { op: BinaryOp::Mul, .. }));
        } else {
            panic!("Expected Binary");
        }
    }

    #[test]
    fn test_parse_left_associative() {
        // (10 - 3) - 2
        let expr = returned("func f() -> i32 { return 10 - 3 - 2; }");
        if let ExpressionKind::Binary { left, op, right } = expr.kind {
            assert_eq!(op, BinaryOp::Sub);
            assert!(matches!(left.kind, ExpressionKind::Binary { op: BinaryOp::Sub, .. }));
            assert_eq!(right.kind, ExpressionKind::Integer(2));
        } else {
            panic!("Expected Binary");
        }
    }

    #[test]
    fn test_parse_logical_below_comparison() {
        // (a < b) || ((c == d) && e)
        let expr = returned("func f() -> i32 { return a < b || c == d && e; }");
        if let ExpressionKind::Binary { left, op, right } = expr.kind {
            assert_eq!(op, BinaryOp::Or);
            assert!(matches!(left.kind, ExpressionKind::Binary { op: BinaryOp::Lt, .. }));
            assert!(matches!(right.kind, ExpressionKind::Binary { op: BinaryOp::And, .. }));
        } else {
            panic!("Expected Binary");
        }
    }

    #[test]
    fn test_parse_unary_binds_tighter_than_product() {
        let expr = returned("func f() -> i32 { return -a * b; }");
        if let ExpressionKind::Binary { left, op, .. } = expr.kind {
            assert_eq!(op, BinaryOp::Mul);
            assert!(matches!(left.kind, ExpressionKind::Unary { op: UnaryOp::Negate, .. }));
        } else {
            panic!("Expected Binary");
        }
    }

    #[test]
    fn test_parse_postfix_chain() {
        // f(x).a.b[1]
        let expr = returned("func g() -> i32 { return f(x).a.b[1]; }");
        let ExpressionKind::Index { base, index } = expr.kind else {
            panic!("Expected Index");
        };
        assert_eq!(index.kind, ExpressionKind::Integer(1));
        let ExpressionKind::Member { base, member } = base.kind else {
            panic!("Expected Member");
        };
        assert_eq!(member, "b");
        let ExpressionKind::Member { base, member } = base.kind else {
            panic!("Expected Member");
        };
        assert_eq!(member, "a");
        assert!(matches!(base.kind, ExpressionKind::Call { ref callee, .. } if callee == "f"));
    }

    #[test]
    fn test_parse_tuple_and_group() {
        let expr = returned("func f() -> i32 { return (1 + 2); }");
        assert!(matches!(expr.kind, ExpressionKind::Binary { .. }));

        let expr = returned("func f() -> (i32, f64) { return (1, 2.5); }");
        assert!(matches!(expr.kind, ExpressionKind::Tuple(ref items) if items.len() == 2));
    }

    #[test]
    fn test_parse_array_literal() {
        let expr = returned("func f() -> [i32] { return [1, 2, 3]; }");
        assert!(matches!(expr.kind, ExpressionKind::Array(ref items) if items.len() == 3));
    }

    #[test]
    fn test_parse_let_specs() {
        let body = function_body("func f() { let a, b: i32 = 5; var c: f64; }");
        if let StatementKind::Let { mutable, specs, value } = &body[0].kind {
            assert!(!mutable);
            assert_eq!(specs.len(), 2);
            assert_eq!(specs[0].declared, None);
            assert_eq!(specs[1].declared, Some(TypeName::Named("i32".to_string())));
            assert!(value.is_some());
        } else {
            panic!("Expected Let");
        }
        if let StatementKind::Let { mutable, value, .. } = &body[1].kind {
            assert!(mutable);
            assert!(value.is_none());
        } else {
            panic!("Expected Let");
        }
    }

    #[test]
    fn test_parse_if_else_chain() {
        let body = function_body(
            "func f(x: i32) { if x > 0 { print 1; } else if x < 0 { print 2; } else { print 3; } }",
        );
        let StatementKind::If { alternate, .. } = &body[0].kind else {
            panic!("Expected If");
        };
        let nested = alternate.as_ref().unwrap();
        let StatementKind::If { alternate, .. } = &nested.kind else {
            panic!("Expected nested If");
        };
        assert!(matches!(
            alternate.as_ref().unwrap().kind,
            StatementKind::Block(_)
        ));
    }

    #[test]
    fn test_parse_struct_fields_with_and_without_commas() {
        let stmts = parse("struct P { x: i32, y: i32 } struct Q { a: f64 b: [i32] }");
        for stmt in &stmts {
            if let StatementKind::Struct(decl) = &stmt.kind {
                assert_eq!(decl.fields.len(), 2);
            } else {
                panic!("Expected Struct");
            }
        }
    }

    #[test]
    fn test_parse_assignment_targets() {
        let body = function_body("func f() { x = 1; p.a.b = 2;;; }");
        assert_eq!(body.len(), 2);
        assert!(matches!(body[0].kind, StatementKind::Assignment { .. }));
        assert!(matches!(body[1].kind, StatementKind::Assignment { .. }));

        let err = parse_source("func f() { f(1) = 2; }").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn test_call_requires_named_callee() {
        let err = parse_source("func f() { (g)(1); }");
        assert!(err.is_ok(), "a grouped identifier is still a bare identifier");
        let err = parse_source("func f() { a.b(1); }").unwrap_err();
        assert!(matches!(err, ParseError::Syntax { .. }));
    }

    #[test]
    fn test_unexpected_token_reports_position() {
        let err = parse_source("func f( { }").unwrap_err();
        match err {
            ParseError::UnexpectedToken { line, column, .. } => {
                assert_eq!((line, column), (1, 9));
            }
            other => panic!("Expected UnexpectedToken, got {:?}", other),
        }
    }

    #[test]
    fn test_lex_errors_surface_through_parser() {
        let err = parse_source("func f() { let x = 1 $ 2; }").unwrap_err();
        assert!(matches!(err, ParseError::Lex(LexError::IllegalCharacter { character: '$', .. })));
    }

    #[test]
    fn test_string_literals_are_interned_while_parsing() {
        let mut symbols = SymbolTable::new();
        parse_program("func f() { print 'hi'; print 'hi'; print 'yo'; }", &mut symbols).unwrap();
        assert_eq!(symbols.memory_segments().len(), 2);
        assert!(symbols.string_offset("hi").is_some());
        assert!(symbols.string_offset("yo").is_some());
    }

    #[test]
    fn test_nesting_depth_is_bounded() {
        let deep = format!("func f() -> i32 {{ return {}1{}; }}", "(".repeat(20000), ")".repeat(20000));
        let err = parse_source(&deep).unwrap_err();
        match err {
            ParseError::Syntax { message, .. } => assert!(message.contains("nesting")),
            other => panic!("Expected Syntax, got {:?}", other),
        }

        let blocks = format!("func f() {{ {}{} }}", "{ ".repeat(5000), "} ".repeat(5000));
        assert!(matches!(parse_source(&blocks), Err(ParseError::Syntax { .. })));

        let shallow = format!("func f() -> i32 {{ return {}1{}; }}", "(".repeat(100), ")".repeat(100));
        assert!(parse_source(&shallow).is_ok());
        let chain = format!("func f() -> i32 {{ return 1{}; }}", " + 1".repeat(100));
        assert!(parse_source(&chain).is_ok());
    }

    #[test]
    fn test_string_outside_address_space_is_rejected() {
        let mut symbols = SymbolTable::with_memory_start(u32::MAX);
        let err = parse_program("func f() { print 'hi'; }", &mut symbols).unwrap_err();
        assert!(matches!(err, ParseError::Syntax { line: 1, column: 18, .. }));
    }
}
