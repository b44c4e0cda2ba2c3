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

//! Lexer: converts source text into tokens, one token at a time.
//!
//! The lexer never buffers more than the token it is producing. `peek_token`
//! re-lexes from a saved cursor, so peeking is free of side effects on the
//! position, line and column.

use thiserror::Error;

// ─── Error Types ─────────────────────────────────────────────────────────────

#[derive(Error, Debug, Clone, PartialEq)]
pub enum LexError {
    #[error("Illegal character '{character}' at offset {offset} ({line}:{column})")]
    IllegalCharacter {
        character: char,
        offset: usize,
        line: u32,
        column: u32,
    },
    #[error("Integer literal {literal} does not fit in i32 ({line}:{column})")]
    IntegerOverflow {
        literal: String,
        line: u32,
        column: u32,
    },
}

// ─── Token Types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Integer(i64),
    Float(f64),
    StringLit(String),
    Identifier(String),

    // Keywords
    Let,
    Var,
    Func,
    Return,
    If,
    Else,
    While,
    Struct,
    Export,
    Print,
    True,
    False,

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Bang,
    Assign, // =
    Eq,     // ==
    Neq,    // !=
    Lt,
    Gt,
    Le,     // <=
    Ge,     // >=
    AndAnd, // &&
    OrOr,   // ||
    Arrow,  // ->

    // Delimiters
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Dot,
    Colon,
    Semicolon,

    // Special
    Eof,
}

impl TokenKind {
    /// Short human readable form used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Integer(v) => format!("integer {}", v),
            TokenKind::Float(v) => format!("float {}", v),
            TokenKind::StringLit(s) => format!("string '{}'", s),
            TokenKind::Identifier(n) => format!("identifier '{}'", n),
            TokenKind::Eof => "end of input".to_string(),
            other => match symbol_of(other) {
                Some(sym) => format!("'{}'", sym),
                None => format!("{:?}", other),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub line: u32,
    pub column: u32,
}

impl Token {
    fn new(kind: TokenKind, line: u32, column: u32) -> Self {
        Token { kind, line, column }
    }
}

const KEYWORDS: &[(&str, TokenKind)] = &[
    ("let", TokenKind::Let),
    ("var", TokenKind::Var),
    ("func", TokenKind::Func),
    ("return", TokenKind::Return),
    ("if", TokenKind::If),
    ("else", TokenKind::Else),
    ("while", TokenKind::While),
    ("struct", TokenKind::Struct),
    ("export", TokenKind::Export),
    ("print", TokenKind::Print),
    ("true", TokenKind::True),
    ("false", TokenKind::False),
];

// Checked before the single-character table.
const TWO_CHAR_OPERATORS: &[(&str, TokenKind)] = &[
    ("||", TokenKind::OrOr),
    ("&&", TokenKind::AndAnd),
    ("->", TokenKind::Arrow),
    ("==", TokenKind::Eq),
    ("!=", TokenKind::Neq),
    ("<=", TokenKind::Le),
    (">=", TokenKind::Ge),
];

const ONE_CHAR_OPERATORS: &[(char, TokenKind)] = &[
    ('+', TokenKind::Plus),
    ('-', TokenKind::Minus),
    ('*', TokenKind::Star),
    ('/', TokenKind::Slash),
    ('!', TokenKind::Bang),
    ('=', TokenKind::Assign),
    ('<', TokenKind::Lt),
    ('>', TokenKind::Gt),
    ('(', TokenKind::LParen),
    (')', TokenKind::RParen),
    ('{', TokenKind::LBrace),
    ('}', TokenKind::RBrace),
    ('[', TokenKind::LBracket),
    (']', TokenKind::RBracket),
    (',', TokenKind::Comma),
    ('.', TokenKind::Dot),
    (':', TokenKind::Colon),
    (';', TokenKind::Semicolon),
];

fn symbol_of(kind: &TokenKind) -> Option<String> {
    TWO_CHAR_OPERATORS
        .iter()
        .find(|(_, k)| k == kind)
        .map(|(s, _)| s.to_string())
        .or_else(|| {
            ONE_CHAR_OPERATORS
                .iter()
                .find(|(_, k)| k == kind)
                .map(|(c, _)| c.to_string())
        })
        .or_else(|| {
            KEYWORDS
                .iter()
                .find(|(_, k)| k == kind)
                .map(|(s, _)| s.to_string())
        })
}

// ─── Lexer ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct Cursor {
    pos: usize,
    line: u32,
    column: u32,
}

pub struct Lexer {
    source: Vec<char>,
    cursor: Cursor,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            cursor: Cursor {
                pos: 0,
                line: 1,
                column: 1,
            },
        }
    }

    /// Consume and return the next token. Yields `Eof` forever once the
    /// input is exhausted.
    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_whitespace_and_comments();
        let start_line = self.cursor.line;
        let start_column = self.cursor.column;

        let ch = match self.peek() {
            Some(ch) => ch,
            None => return Ok(Token::new(TokenKind::Eof, start_line, start_column)),
        };

        let kind = if ch.is_ascii_digit() {
            self.lex_number(start_line, start_column)?
        } else if ch.is_ascii_alphabetic() || ch == '_' {
            self.lex_word()
        } else if ch == '\'' {
            self.lex_string()
        } else {
            self.lex_operator(ch)?
        };

        Ok(Token::new(kind, start_line, start_column))
    }

    /// Return the next token without consuming it.
    pub fn peek_token(&mut self) -> Result<Token, LexError> {
        let saved = self.cursor;
        let result = self.next_token();
        self.cursor = saved;
        result
    }

    /// Lex the whole input, including the trailing `Eof`.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexError> {
        let mut tokens = Vec::new();
        loop {
            let tok = self.next_token()?;
            let done = tok.kind == TokenKind::Eof;
            tokens.push(tok);
            if done {
                return Ok(tokens);
            }
        }
    }

    /// Absolute character offset of the cursor.
    pub fn offset(&self) -> usize {
        self.cursor.pos
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.cursor.pos).copied()
    }

    fn peek_ahead(&self, offset: usize) -> Option<char> {
        self.source.get(self.cursor.pos + offset).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.source.get(self.cursor.pos).copied()?;
        self.cursor.pos += 1;
        if ch == '\n' {
            self.cursor.line += 1;
            self.cursor.column = 1;
        } else {
            self.cursor.column += 1;
        }
        Some(ch)
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            while let Some(ch) = self.peek() {
                if ch.is_whitespace() {
                    self.advance();
                } else {
                    break;
                }
            }

            if self.peek() == Some('/') && self.peek_ahead(1) == Some('/') {
                while let Some(ch) = self.peek() {
                    if ch == '\n' {
                        break;
                    }
                    self.advance();
                }
                continue;
            }

            break;
        }
    }

    fn lex_number(&mut self, line: u32, column: u32) -> Result<TokenKind, LexError> {
        let mut num = String::new();
        while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
            num.push(c);
            self.advance();
        }

        if self.peek() == Some('.') && self.peek_ahead(1).is_some_and(|n| n.is_ascii_digit()) {
            num.push('.');
            self.advance();
            while let Some(c) = self.peek().filter(|c| c.is_ascii_digit()) {
                num.push(c);
                self.advance();
            }
            // digits '.' digits always parses
            let val: f64 = num.parse().unwrap_or(0.0);
            return Ok(TokenKind::Float(val));
        }

        match num.parse::<i64>() {
            Ok(val) if val <= i64::from(i32::MAX) => Ok(TokenKind::Integer(val)),
            _ => Err(LexError::IntegerOverflow {
                literal: num,
                line,
                column,
            }),
        }
    }

    fn lex_word(&mut self) -> TokenKind {
        let mut ident = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }
        KEYWORDS
            .iter()
            .find(|(word, _)| *word == ident)
            .map(|(_, kind)| kind.clone())
            .unwrap_or(TokenKind::Identifier(ident))
    }

    fn lex_string(&mut self) -> TokenKind {
        self.advance(); // opening '
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('\'') | None => break,
                Some(c) => s.push(c),
            }
        }
        TokenKind::StringLit(s)
    }

    fn lex_operator(&mut self, ch: char) -> Result<TokenKind, LexError> {
        if let Some(next) = self.peek_ahead(1) {
            let pair: String = [ch, next].iter().collect();
            if let Some((_, kind)) = TWO_CHAR_OPERATORS.iter().find(|(op, _)| *op == pair) {
                self.advance();
                self.advance();
                return Ok(kind.clone());
            }
        }

        if let Some((_, kind)) = ONE_CHAR_OPERATORS.iter().find(|(op, _)| *op == ch) {
            self.advance();
            return Ok(kind.clone());
        }

        Err(LexError::IllegalCharacter {
            character: ch,
            offset: self.cursor.pos,
            line: self.cursor.line,
            column: self.cursor.column,
        })
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
