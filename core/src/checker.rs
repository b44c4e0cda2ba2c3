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

//! Semantic analysis: name resolution and type checking.
//!
//! The checker walks every function body with the same scope discipline the
//! code generator uses, so a `SymbolTable` driven by either pass hands out
//! identical slots. Types of `let`/`var` bindings are written back into the
//! AST (`LetSpec::resolved`) for the generator to reuse.

use crate::ast::{
    BinaryOp, Expression, ExpressionKind, FunctionDecl, LetSpec, Location, Program, Statement,
    StatementKind, UnaryOp,
};
use crate::error::SemanticError;
use crate::symbols::{Role, SymbolTable, BUILTIN_PRINT, BUILTIN_PRINT_STRING};
use crate::types::DataType;

pub struct Checker<'a> {
    symbols: &'a mut SymbolTable,
    return_type: Option<DataType>,
}

/// Check a whole program. Signatures must already be registered with
/// `SymbolTable::declare_program`.
pub fn check(program: &mut Program, symbols: &mut SymbolTable) -> Result<(), SemanticError> {
    Checker::new(symbols).check_program(program)
}

impl<'a> Checker<'a> {
    pub fn new(symbols: &'a mut SymbolTable) -> Self {
        Checker {
            symbols,
            return_type: None,
        }
    }

    pub fn check_program(&mut self, program: &mut Program) -> Result<(), SemanticError> {
        for stmt in program.statements.iter_mut() {
            let location = stmt.location;
            match &mut stmt.kind {
                StatementKind::Function(decl) => self.check_function(decl, location)?,
                StatementKind::Struct(_) => {}
                _ => {
                    return Err(SemanticError::InvalidStatement {
                        message: "only functions and structs may appear at the top level"
                            .to_string(),
                        location,
                    })
                }
            }
        }
        Ok(())
    }

    fn check_function(
        &mut self,
        decl: &mut FunctionDecl,
        location: Location,
    ) -> Result<(), SemanticError> {
        let signature = self
            .symbols
            .lookup_function(&decl.name)
            .cloned()
            .ok_or_else(|| SemanticError::undefined("function", decl.name.clone(), location))?;

        self.symbols.enter_function();
        for (param, ty) in decl.params.iter().zip(signature.params) {
            if ty.is_none() {
                return Err(SemanticError::mismatch(
                    format!("parameter '{}'", param.name),
                    "a value type",
                    &ty,
                    param.location,
                ));
            }
            self.symbols
                .define_variable(&param.name, ty, Role::Parameter, param.location)?;
        }

        self.return_type = Some(signature.return_type);
        // Parameters and top-level body statements share one frame.
        let result = self.check_statements(&mut decl.body);
        self.return_type = None;
        self.symbols.exit_function();
        result
    }

    fn check_statements(&mut self, stmts: &mut [Statement]) -> Result<(), SemanticError> {
        for stmt in stmts.iter_mut() {
            self.check_statement(stmt)?;
        }
        Ok(())
    }

    fn check_block(&mut self, stmts: &mut [Statement]) -> Result<(), SemanticError> {
        self.symbols.enter_scope();
        let result = self.check_statements(stmts);
        self.symbols.exit_scope();
        result
    }

    fn check_statement(&mut self, stmt: &mut Statement) -> Result<(), SemanticError> {
        let location = stmt.location;
        match &mut stmt.kind {
            StatementKind::Let { specs, value, .. } => self.check_let(specs, value.as_ref()),
            StatementKind::Function(decl) => Err(SemanticError::InvalidStatement {
                message: format!("function '{}' must be declared at the top level", decl.name),
                location,
            }),
            StatementKind::Struct(decl) => Err(SemanticError::InvalidStatement {
                message: format!("struct '{}' must be declared at the top level", decl.name),
                location,
            }),
            StatementKind::Return(value) => self.check_return(value.as_ref(), location),
            StatementKind::Assignment { target, value } => self.check_assignment(target, value),
            StatementKind::If {
                condition,
                body,
                alternate,
            } => {
                self.check_condition(condition)?;
                self.check_block(body)?;
                match alternate {
                    Some(alt) => self.check_statement(alt),
                    None => Ok(()),
                }
            }
            StatementKind::While { condition, body } => {
                self.check_condition(condition)?;
                self.check_block(body)
            }
            StatementKind::Print(value) => {
                let ty = type_of(value, self.symbols)?;
                if ty != DataType::I32 && ty != DataType::STRING {
                    return Err(SemanticError::mismatch(
                        "print",
                        "i32 or string",
                        &ty,
                        value.location,
                    ));
                }
                Ok(())
            }
            StatementKind::Expression(expr) => type_of(expr, self.symbols).map(|_| ()),
            StatementKind::Block(body) => self.check_block(body),
        }
    }

    fn check_condition(&mut self, condition: &Expression) -> Result<(), SemanticError> {
        let ty = type_of(condition, self.symbols)?;
        if ty != DataType::I32 {
            return Err(SemanticError::mismatch(
                "condition",
                DataType::I32,
                &ty,
                condition.location,
            ));
        }
        Ok(())
    }

    fn check_let(
        &mut self,
        specs: &mut [LetSpec],
        value: Option<&Expression>,
    ) -> Result<(), SemanticError> {
        // The initializer is typed before any name in this statement exists.
        let init_type = match value {
            Some(expr) if is_empty_array(expr) => None,
            Some(expr) => Some(type_of(expr, self.symbols)?),
            None => None,
        };

        let mut resolved = Vec::with_capacity(specs.len());
        for spec in specs.iter() {
            let ty = match (&spec.declared, &init_type) {
                (Some(declared), init) => {
                    let declared = self.symbols.resolve_type(declared, spec.location)?;
                    match init {
                        Some(found) if *found != declared => {
                            return Err(SemanticError::mismatch(
                                format!("initializer of '{}'", spec.name),
                                &declared,
                                found,
                                spec.location,
                            ))
                        }
                        None if value.is_some() && !matches!(declared, DataType::Array(_)) => {
                            return Err(SemanticError::mismatch(
                                format!("initializer of '{}'", spec.name),
                                &declared,
                                "[]",
                                spec.location,
                            ))
                        }
                        _ => {}
                    }
                    declared
                }
                (None, Some(found)) => found.clone(),
                (None, None) => {
                    return Err(SemanticError::MissingType {
                        name: spec.name.clone(),
                        location: spec.location,
                    })
                }
            };
            if ty.is_none() {
                return Err(SemanticError::mismatch(
                    format!("variable '{}'", spec.name),
                    "a value type",
                    &ty,
                    spec.location,
                ));
            }
            resolved.push(ty);
        }

        for (spec, ty) in specs.iter_mut().zip(resolved) {
            self.symbols
                .define_variable(&spec.name, ty.clone(), Role::Declaration, spec.location)?;
            spec.resolved = Some(ty);
        }
        Ok(())
    }

    fn check_assignment(
        &mut self,
        target: &Expression,
        value: &Expression,
    ) -> Result<(), SemanticError> {
        let (target_type, context) = match &target.kind {
            ExpressionKind::Identifier(name) => {
                let var = self.symbols.lookup_variable(name).ok_or_else(|| {
                    SemanticError::undefined("variable", name.clone(), target.location)
                })?;
                (var.data_type.clone(), format!("assignment to '{}'", name))
            }
            ExpressionKind::Member { member, .. } => (
                type_of(target, self.symbols)?,
                format!("assignment to field '{}'", member),
            ),
            _ => {
                return Err(SemanticError::InvalidStatement {
                    message: "invalid assignment target".to_string(),
                    location: target.location,
                })
            }
        };
        expect_type(value, &target_type, context, self.symbols)
    }

    fn check_return(
        &mut self,
        value: Option<&Expression>,
        location: Location,
    ) -> Result<(), SemanticError> {
        let expected = self
            .return_type
            .clone()
            .ok_or_else(|| SemanticError::InvalidStatement {
                message: "return outside of a function".to_string(),
                location,
            })?;

        match value {
            None if expected.is_none() => Ok(()),
            None => Err(SemanticError::mismatch("return", &expected, DataType::NONE, location)),
            Some(expr) if expected.is_none() => {
                let found = type_of(expr, self.symbols)?;
                Err(SemanticError::mismatch("return", &expected, &found, expr.location))
            }
            Some(expr) => expect_type(expr, &expected, "return", self.symbols),
        }
    }
}

// ─── Expression Typing ───────────────────────────────────────────────────────

pub fn is_empty_array(expr: &Expression) -> bool {
    matches!(&expr.kind, ExpressionKind::Array(items) if items.is_empty())
}

/// Check `expr` against a known type. An empty array literal is accepted
/// wherever an array type is expected.
fn expect_type(
    expr: &Expression,
    expected: &DataType,
    context: impl Into<String>,
    symbols: &SymbolTable,
) -> Result<(), SemanticError> {
    if is_empty_array(expr) && matches!(expected, DataType::Array(_)) {
        return Ok(());
    }
    let found = type_of(expr, symbols)?;
    if found != *expected {
        return Err(SemanticError::mismatch(context, expected, &found, expr.location));
    }
    Ok(())
}

/// Result type of a binary operator, or `None` when the operands are not
/// accepted.
pub fn binary_result(op: BinaryOp, left: &DataType, right: &DataType) -> Option<DataType> {
    if op.is_arithmetic() {
        DataType::arithmetic_result(left, right)
    } else if op.is_comparison() {
        let comparable = DataType::arithmetic_result(left, right).is_some()
            || (left == right && left.fits_cell());
        comparable.then_some(DataType::I32)
    } else {
        (*left == DataType::I32 && *right == DataType::I32).then_some(DataType::I32)
    }
}

/// Type of an expression in the current scope. Pure with respect to the
/// symbol table, so the code generator can ask the same question.
pub fn type_of(expr: &Expression, symbols: &SymbolTable) -> Result<DataType, SemanticError> {
    let location = expr.location;
    match &expr.kind {
        ExpressionKind::Integer(_) => Ok(DataType::I32),
        ExpressionKind::Float(_) => Ok(DataType::F64),
        ExpressionKind::Str(_) => Ok(DataType::STRING),
        ExpressionKind::Identifier(name) => symbols
            .lookup_variable(name)
            .map(|v| v.data_type.clone())
            .ok_or_else(|| SemanticError::undefined("variable", name.clone(), location)),

        ExpressionKind::Unary { op, operand } => {
            let ty = type_of(operand, symbols)?;
            match op {
                UnaryOp::Negate if ty.is_numeric() => Ok(ty),
                UnaryOp::Negate => Err(SemanticError::mismatch(
                    "operand of unary '-'",
                    "i32 or f64",
                    &ty,
                    location,
                )),
                UnaryOp::Not => Err(SemanticError::mismatch(
                    "unary operator",
                    "'-' on i32 or f64",
                    format!("'!' on {}", ty),
                    location,
                )),
            }
        }

        ExpressionKind::Binary { left, op, right } => {
            let l = type_of(left, symbols)?;
            let r = type_of(right, symbols)?;
            binary_result(*op, &l, &r).ok_or_else(|| {
                let expected = if op.is_arithmetic() {
                    "i32 or f64 operands"
                } else if op.is_comparison() {
                    "operands of the same type"
                } else {
                    "i32 operands"
                };
                SemanticError::mismatch(
                    format!("operands of '{}'", op.symbol()),
                    expected,
                    format!("{} and {}", l, r),
                    location,
                )
            })
        }

        ExpressionKind::Call { callee, args } => call_type(callee, args, location, symbols),

        ExpressionKind::Member { base, member } => {
            let base_type = type_of(base, symbols)?;
            match &base_type {
                DataType::Struct(name, _) => base_type
                    .field(member)
                    .map(|(_, ty)| ty.clone())
                    .ok_or_else(|| {
                        SemanticError::undefined("field", format!("{}.{}", name, member), location)
                    }),
                other => Err(SemanticError::mismatch(
                    format!("access of field '{}'", member),
                    "a struct",
                    other,
                    location,
                )),
            }
        }

        ExpressionKind::Index { base, index } => {
            let base_type = type_of(base, symbols)?;
            match base_type {
                DataType::Array(element) => {
                    let index_type = type_of(index, symbols)?;
                    if index_type != DataType::I32 {
                        return Err(SemanticError::mismatch(
                            "array index",
                            DataType::I32,
                            &index_type,
                            index.location,
                        ));
                    }
                    Ok(*element)
                }
                DataType::Tuple(mut elements) => {
                    let len = elements.len();
                    match index.kind {
                        ExpressionKind::Integer(i) if (i as usize) < len => {
                            Ok(elements.swap_remove(i as usize))
                        }
                        _ => Err(SemanticError::mismatch(
                            "tuple index",
                            format!("an integer literal below {}", len),
                            "an expression",
                            index.location,
                        )),
                    }
                }
                other => Err(SemanticError::mismatch(
                    "indexing",
                    "an array or tuple",
                    &other,
                    location,
                )),
            }
        }

        ExpressionKind::Array(items) => {
            let first = items.first().ok_or_else(|| SemanticError::MissingType {
                name: "[]".to_string(),
                location,
            })?;
            let element = type_of(first, symbols)?;
            if !element.fits_cell() {
                return Err(SemanticError::mismatch(
                    "array element",
                    "a single-value type",
                    &element,
                    first.location,
                ));
            }
            for item in &items[1..] {
                expect_type(item, &element, "array element", symbols)?;
            }
            Ok(DataType::Array(Box::new(element)))
        }

        ExpressionKind::Tuple(items) => {
            let mut elements = Vec::with_capacity(items.len());
            for item in items {
                let ty = type_of(item, symbols)?;
                if ty.is_none() {
                    return Err(SemanticError::mismatch(
                        "tuple element",
                        "a value type",
                        &ty,
                        item.location,
                    ));
                }
                elements.push(ty);
            }
            Ok(DataType::Tuple(elements))
        }
    }
}

fn call_type(
    callee: &str,
    args: &[Expression],
    location: Location,
    symbols: &SymbolTable,
) -> Result<DataType, SemanticError> {
    let check_args = |params: &[DataType]| -> Result<(), SemanticError> {
        if args.len() != params.len() {
            return Err(SemanticError::ArityMismatch {
                name: callee.to_string(),
                expected: params.len(),
                found: args.len(),
                location,
            });
        }
        for (i, (arg, param)) in args.iter().zip(params).enumerate() {
            expect_type(
                arg,
                param,
                format!("argument {} of '{}'", i + 1, callee),
                symbols,
            )?;
        }
        Ok(())
    };

    if callee == BUILTIN_PRINT {
        check_args(&[DataType::I32])?;
        return Ok(DataType::NONE);
    }
    if callee == BUILTIN_PRINT_STRING {
        check_args(&[DataType::STRING])?;
        return Ok(DataType::NONE);
    }
    if let Some(signature) = symbols.lookup_function(callee) {
        check_args(&signature.params)?;
        return Ok(signature.return_type.clone());
    }
    if let Some(info) = symbols.lookup_struct(callee) {
        let params: Vec<DataType> = info.fields.iter().map(|(_, ty)| ty.clone()).collect();
        check_args(&params)?;
        return Ok(info.data_type(callee));
    }
    Err(SemanticError::undefined("function", callee, location))
}
