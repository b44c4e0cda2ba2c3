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

use crate::ast::Location;
use crate::codegen::CodegenError;
use crate::lexer::LexError;
use crate::parser::ParseError;
use thiserror::Error;

/// Errors found while resolving names and checking types. Every variant is
/// fatal to the compilation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SemanticError {
    #[error("Duplicate definition of '{name}' at {location}")]
    DuplicateDefinition { name: String, location: Location },
    #[error("Undefined {what} '{name}' at {location}")]
    UndefinedReference {
        what: &'static str,
        name: String,
        location: Location,
    },
    #[error("Type mismatch in {context}: expected {expected}, found {found} at {location}")]
    TypeMismatch {
        context: String,
        expected: String,
        found: String,
        location: Location,
    },
    #[error("Function '{name}' expects {expected} argument(s), got {found} at {location}")]
    ArityMismatch {
        name: String,
        expected: usize,
        found: usize,
        location: Location,
    },
    #[error("Cannot determine the type of '{name}' at {location}: add a type or an initializer")]
    MissingType { name: String, location: Location },
    #[error("{message} at {location}")]
    InvalidStatement { message: String, location: Location },
}

impl SemanticError {
    pub fn mismatch(
        context: impl Into<String>,
        expected: impl ToString,
        found: impl ToString,
        location: Location,
    ) -> Self {
        SemanticError::TypeMismatch {
            context: context.into(),
            expected: expected.to_string(),
            found: found.to_string(),
            location,
        }
    }

    pub fn undefined(what: &'static str, name: impl Into<String>, location: Location) -> Self {
        SemanticError::UndefinedReference {
            what,
            name: name.into(),
            location,
        }
    }

    pub fn location(&self) -> Location {
        match self {
            SemanticError::DuplicateDefinition { location, .. }
            | SemanticError::UndefinedReference { location, .. }
            | SemanticError::TypeMismatch { location, .. }
            | SemanticError::ArityMismatch { location, .. }
            | SemanticError::MissingType { location, .. }
            | SemanticError::InvalidStatement { location, .. } => *location,
        }
    }
}

/// Everything that can abort a compilation.
#[derive(Error, Debug)]
pub enum CompileError {
    #[error("Lex error: {0}")]
    Lex(#[from] LexError),
    #[error("Parse error: {0}")]
    Parse(ParseError),
    #[error("Semantic error: {0}")]
    Semantic(#[from] SemanticError),
    #[error("Codegen error: {0}")]
    Codegen(CodegenError),
    #[error("Generated module failed validation: {0}")]
    InvalidModule(String),
    #[error("Invalid options: {0}")]
    InvalidOptions(String),
}

// Stage errors that wrap an earlier stage's error are flattened so the
// variant names the stage that actually failed.
impl From<ParseError> for CompileError {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::Lex(lex) => CompileError::Lex(lex),
            other => CompileError::Parse(other),
        }
    }
}

impl From<CodegenError> for CompileError {
    fn from(err: CodegenError) -> Self {
        match err {
            CodegenError::Semantic(sem) => CompileError::Semantic(sem),
            other => CompileError::Codegen(other),
        }
    }
}
