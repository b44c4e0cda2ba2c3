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

//! Symbol table: lexical scopes, local slot allocation, the top-level
//! function/struct registry and the string-literal pool.
//!
//! One `SymbolTable` belongs to exactly one compilation. The semantic
//! analyzer and the code generator both drive it through the same sequence
//! of `enter_*`/`define_*`/`exit_*` calls, which is what keeps the slot
//! numbers they observe identical.

use crate::ast::{Location, Program, StatementKind, TypeName};
use crate::error::SemanticError;
use crate::types::{DataType, Primitive, CELL_SIZE};
use std::collections::HashMap;

/// Import-backed functions callable by name.
pub const BUILTIN_PRINT: &str = "print";
pub const BUILTIN_PRINT_STRING: &str = "printString";

/// Type names that can never be redefined by a struct or function.
pub const PRIMITIVE_NAMES: [&str; 4] = ["i32", "f64", "string", "none"];

/// Export name of the module's linear memory.
pub const MEMORY_EXPORT: &str = "memory";

/// First byte of the string segment. Bytes below it stay zero so that no
/// object is ever placed at address 0.
pub const DEFAULT_MEMORY_START: u32 = 8;

/// Highest accepted `memory_start`; leaves the upper address space to string
/// data and the heap.
pub const MAX_MEMORY_START: u32 = 1 << 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Declaration,
    Parameter,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub data_type: DataType,
    /// First local slot. Tuples occupy `data_type.width()` consecutive slots.
    pub slot: u32,
    pub role: Role,
    pub struct_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionSignature {
    pub params: Vec<DataType>,
    pub return_type: DataType,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructInfo {
    pub fields: Vec<(String, DataType)>,
    pub size: u32,
}

impl StructInfo {
    pub fn data_type(&self, name: &str) -> DataType {
        DataType::Struct(name.to_string(), self.fields.clone())
    }
}

#[derive(Debug, Default)]
struct Scope {
    variables: HashMap<String, Variable>,
}

// =============================================================================
// String Pool
// =============================================================================

/// Interned string literals laid out as `[u32 LE length][bytes]` records.
#[derive(Debug, Clone)]
pub struct StringPool {
    offsets: HashMap<String, u32>,
    segments: Vec<(u32, Vec<u8>)>,
    cursor: u32,
}

impl StringPool {
    pub fn new(start: u32) -> Self {
        StringPool {
            offsets: HashMap::new(),
            segments: Vec::new(),
            cursor: start,
        }
    }

    /// Offset of the record for `value`, or `None` once the pool would run
    /// past the 32-bit address space.
    pub fn intern(&mut self, value: &str) -> Option<u32> {
        if let Some(&offset) = self.offsets.get(value) {
            return Some(offset);
        }
        let offset = self.cursor;
        let bytes = value.as_bytes();
        let len = u32::try_from(bytes.len()).ok()?;
        let end = offset.checked_add(4)?.checked_add(len)?;
        let cursor = align_to(end, CELL_SIZE)?;

        let mut record = Vec::with_capacity(4 + bytes.len());
        record.extend_from_slice(&len.to_le_bytes());
        record.extend_from_slice(bytes);
        self.cursor = cursor;
        self.segments.push((offset, record));
        self.offsets.insert(value.to_string(), offset);
        Some(offset)
    }

    pub fn offset_of(&self, value: &str) -> Option<u32> {
        self.offsets.get(value).copied()
    }

    pub fn segments(&self) -> &[(u32, Vec<u8>)] {
        &self.segments
    }

    /// First free, cell-aligned byte after the last record.
    pub fn end(&self) -> u32 {
        self.cursor
    }
}

fn align_to(x: u32, align: u32) -> Option<u32> {
    let mask = align - 1;
    x.checked_add(mask).map(|v| v & !mask)
}

// =============================================================================
// Symbol Table
// =============================================================================

#[derive(Debug)]
pub struct SymbolTable {
    scopes: Vec<Scope>,
    functions: HashMap<String, FunctionSignature>,
    structs: HashMap<String, StructInfo>,
    strings: StringPool,
    next_slot: u32,
    declared: Vec<Variable>,
    export_memory: bool,
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::with_memory_start(DEFAULT_MEMORY_START)
    }

    /// A start too close to the top of the address space leaves no room
    /// for any string; interning then fails instead of wrapping.
    pub fn with_memory_start(start: u32) -> Self {
        let start = align_to(start, CELL_SIZE).unwrap_or(u32::MAX & !(CELL_SIZE - 1));
        SymbolTable {
            scopes: Vec::new(),
            functions: HashMap::new(),
            structs: HashMap::new(),
            strings: StringPool::new(start),
            next_slot: 0,
            declared: Vec::new(),
            export_memory: true,
        }
    }

    /// Whether linear memory is exported, which reserves its export name.
    pub fn set_export_memory(&mut self, export: bool) {
        self.export_memory = export;
    }

    pub fn exports_memory(&self) -> bool {
        self.export_memory
    }

    // Scoping helpers
    pub fn enter_scope(&mut self) {
        self.scopes.push(Scope::default());
    }

    pub fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    /// Start a function body: slot numbering restarts at zero.
    pub fn enter_function(&mut self) {
        self.next_slot = 0;
        self.declared.clear();
        self.enter_scope();
    }

    /// Leave a function body, returning its `let`/`var` locals in slot order.
    pub fn exit_function(&mut self) -> Vec<Variable> {
        self.exit_scope();
        self.next_slot = 0;
        std::mem::take(&mut self.declared)
    }

    /// Total slots handed out in the current function so far.
    pub fn slot_count(&self) -> u32 {
        self.next_slot
    }

    pub fn define_variable(
        &mut self,
        name: &str,
        data_type: DataType,
        role: Role,
        location: Location,
    ) -> Result<Variable, SemanticError> {
        let slot = self.next_slot;
        let scope = self.scopes.last_mut().ok_or_else(|| SemanticError::InvalidStatement {
            message: format!("variable '{}' declared outside of any scope", name),
            location,
        })?;
        if scope.variables.contains_key(name) {
            return Err(SemanticError::DuplicateDefinition {
                name: name.to_string(),
                location,
            });
        }

        let struct_name = match &data_type {
            DataType::Struct(s, _) => Some(s.clone()),
            _ => None,
        };
        let variable = Variable {
            name: name.to_string(),
            slot,
            role,
            struct_name,
            data_type,
        };
        self.next_slot += variable.data_type.width();
        scope.variables.insert(name.to_string(), variable.clone());
        if role == Role::Declaration {
            self.declared.push(variable.clone());
        }
        Ok(variable)
    }

    /// Nearest enclosing definition of `name`.
    pub fn lookup_variable(&self, name: &str) -> Option<&Variable> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.variables.get(name))
    }

    // ─── Registry ────────────────────────────────────────────────────────

    fn check_global_name(&self, name: &str, location: Location) -> Result<(), SemanticError> {
        let taken = self.functions.contains_key(name)
            || self.structs.contains_key(name)
            || name == BUILTIN_PRINT
            || name == BUILTIN_PRINT_STRING
            || PRIMITIVE_NAMES.contains(&name);
        if taken {
            return Err(SemanticError::DuplicateDefinition {
                name: name.to_string(),
                location,
            });
        }
        Ok(())
    }

    pub fn define_function(
        &mut self,
        name: &str,
        signature: FunctionSignature,
        location: Location,
    ) -> Result<(), SemanticError> {
        self.check_global_name(name, location)?;
        self.functions.insert(name.to_string(), signature);
        Ok(())
    }

    pub fn lookup_function(&self, name: &str) -> Option<&FunctionSignature> {
        self.functions.get(name)
    }

    pub fn define_struct(
        &mut self,
        name: &str,
        fields: Vec<(String, DataType)>,
        location: Location,
    ) -> Result<(), SemanticError> {
        self.check_global_name(name, location)?;
        let size = DataType::struct_size(&fields);
        self.structs
            .insert(name.to_string(), StructInfo { fields, size });
        Ok(())
    }

    pub fn lookup_struct(&self, name: &str) -> Option<&StructInfo> {
        self.structs.get(name)
    }

    /// Resolve a source annotation to a concrete type.
    pub fn resolve_type(&self, ty: &TypeName, location: Location) -> Result<DataType, SemanticError> {
        match ty {
            TypeName::Named(name) => match name.as_str() {
                "i32" => Ok(DataType::Primitive(Primitive::I32)),
                "f64" => Ok(DataType::Primitive(Primitive::F64)),
                "string" => Ok(DataType::Primitive(Primitive::String)),
                "none" => Ok(DataType::Primitive(Primitive::None)),
                _ => self
                    .lookup_struct(name)
                    .map(|info| info.data_type(name))
                    .ok_or_else(|| SemanticError::undefined("type", name.clone(), location)),
            },
            TypeName::Array(inner) => {
                let element = self.resolve_type(inner, location)?;
                if !element.fits_cell() {
                    return Err(SemanticError::mismatch(
                        "array element type",
                        "a single-value type",
                        &element,
                        location,
                    ));
                }
                Ok(DataType::Array(Box::new(element)))
            }
            TypeName::Tuple(elements) => elements
                .iter()
                .map(|e| self.resolve_type(e, location))
                .collect::<Result<Vec<_>, _>>()
                .map(DataType::Tuple),
        }
    }

    /// Register every struct and function signature of the program before
    /// any body is looked at, so bodies may refer to later declarations.
    ///
    /// Structs are registered first, in source order; a struct field may only
    /// name a struct declared above it.
    pub fn declare_program(&mut self, program: &Program) -> Result<(), SemanticError> {
        for stmt in &program.statements {
            if let StatementKind::Struct(decl) = &stmt.kind {
                let mut fields: Vec<(String, DataType)> = Vec::new();
                for field in &decl.fields {
                    if fields.iter().any(|(name, _)| *name == field.name) {
                        return Err(SemanticError::DuplicateDefinition {
                            name: format!("{}.{}", decl.name, field.name),
                            location: field.location,
                        });
                    }
                    let ty = self.resolve_type(&field.ty, field.location)?;
                    if !ty.fits_cell() {
                        return Err(SemanticError::mismatch(
                            format!("field '{}.{}'", decl.name, field.name),
                            "a single-value type",
                            &ty,
                            field.location,
                        ));
                    }
                    fields.push((field.name.clone(), ty));
                }
                self.define_struct(&decl.name, fields, stmt.location)?;
            }
        }

        for stmt in &program.statements {
            if let StatementKind::Function(decl) = &stmt.kind {
                let params = decl
                    .params
                    .iter()
                    .map(|p| self.resolve_type(&p.ty, p.location))
                    .collect::<Result<Vec<_>, _>>()?;
                let return_type = match &decl.return_type {
                    Some(ty) => self.resolve_type(ty, stmt.location)?,
                    None => DataType::NONE,
                };
                if decl.exported && self.export_memory && decl.name == MEMORY_EXPORT {
                    return Err(SemanticError::DuplicateDefinition {
                        name: decl.name.clone(),
                        location: stmt.location,
                    });
                }
                self.define_function(
                    &decl.name,
                    FunctionSignature {
                        params,
                        return_type,
                    },
                    stmt.location,
                )?;
            }
        }
        Ok(())
    }

    // ─── Strings ─────────────────────────────────────────────────────────

    pub fn intern_string(&mut self, value: &str) -> Option<u32> {
        self.strings.intern(value)
    }

    pub fn string_offset(&self, value: &str) -> Option<u32> {
        self.strings.offset_of(value)
    }

    pub fn memory_segments(&self) -> &[(u32, Vec<u8>)] {
        self.strings.segments()
    }

    /// Initial value of the bump allocator: the first byte after string data.
    pub fn heap_base(&self) -> u32 {
        self.strings.end()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location::new(1, 1)
    }

    #[test]
    fn test_slots_are_monotonic_per_function() {
        let mut table = SymbolTable::new();
        table.enter_function();
        let a = table
            .define_variable("a", DataType::I32, Role::Parameter, loc())
            .unwrap();
        let x = table
            .define_variable("x", DataType::I32, Role::Declaration, loc())
            .unwrap();
        table.enter_scope();
        let y = table
            .define_variable("y", DataType::F64, Role::Declaration, loc())
            .unwrap();
        table.exit_scope();
        table.enter_scope();
        // Sibling block: the slot of `y` is not reused.
        let z = table
            .define_variable("z", DataType::I32, Role::Declaration, loc())
            .unwrap();
        table.exit_scope();

        assert_eq!((a.slot, x.slot, y.slot, z.slot), (0, 1, 2, 3));

        let declared = table.exit_function();
        let names: Vec<&str> = declared.iter().map(|v| v.name.as_str()).collect();
        assert_eq!(names, vec!["x", "y", "z"]);

        table.enter_function();
        let b = table
            .define_variable("b", DataType::I32, Role::Declaration, loc())
            .unwrap();
        assert_eq!(b.slot, 0);
    }

    #[test]
    fn test_tuple_occupies_consecutive_slots() {
        let mut table = SymbolTable::new();
        table.enter_function();
        let pair = DataType::Tuple(vec![DataType::I32, DataType::F64]);
        let t = table
            .define_variable("t", pair, Role::Declaration, loc())
            .unwrap();
        let n = table
            .define_variable("n", DataType::I32, Role::Declaration, loc())
            .unwrap();
        assert_eq!(t.slot, 0);
        assert_eq!(n.slot, 2);
        assert_eq!(table.slot_count(), 3);
    }

    #[test]
    fn test_duplicate_in_same_scope_fails() {
        let mut table = SymbolTable::new();
        table.enter_function();
        table
            .define_variable("x", DataType::I32, Role::Declaration, loc())
            .unwrap();
        let err = table
            .define_variable("x", DataType::I32, Role::Declaration, loc())
            .unwrap_err();
        assert!(matches!(err, SemanticError::DuplicateDefinition { ref name, .. } if name == "x"));
    }

    #[test]
    fn test_shadowing_searches_innermost_first() {
        let mut table = SymbolTable::new();
        table.enter_function();
        let outer = table
            .define_variable("x", DataType::I32, Role::Declaration, loc())
            .unwrap();
        table.enter_scope();
        let inner = table
            .define_variable("x", DataType::STRING, Role::Declaration, loc())
            .unwrap();
        assert_eq!(table.lookup_variable("x"), Some(&inner));
        table.exit_scope();
        assert_eq!(table.lookup_variable("x"), Some(&outer));
        assert_ne!(outer.slot, inner.slot);
        assert!(table.lookup_variable("missing").is_none());
    }

    #[test]
    fn test_define_outside_scope_is_an_error() {
        let mut table = SymbolTable::new();
        assert!(table
            .define_variable("x", DataType::I32, Role::Declaration, loc())
            .is_err());
    }

    #[test]
    fn test_registry_rejects_redefinition() {
        let mut table = SymbolTable::new();
        let sig = FunctionSignature {
            params: vec![],
            return_type: DataType::NONE,
        };
        table.define_function("f", sig.clone(), loc()).unwrap();
        assert!(table.define_function("f", sig.clone(), loc()).is_err());
        assert!(table.define_struct("f", vec![], loc()).is_err());
        assert!(table
            .define_function(BUILTIN_PRINT_STRING, sig, loc())
            .is_err());
        for name in PRIMITIVE_NAMES {
            assert!(table.define_struct(name, vec![], loc()).is_err());
        }
    }

    #[test]
    fn test_struct_size_and_type() {
        let mut table = SymbolTable::new();
        table
            .define_struct(
                "P",
                vec![
                    ("x".to_string(), DataType::I32),
                    ("y".to_string(), DataType::F64),
                ],
                loc(),
            )
            .unwrap();
        let info = table.lookup_struct("P").unwrap();
        assert_eq!(info.size, 8);
        assert_eq!(
            table
                .resolve_type(&TypeName::Named("P".to_string()), loc())
                .unwrap(),
            info.data_type("P")
        );
        assert!(table
            .resolve_type(&TypeName::Named("Q".to_string()), loc())
            .is_err());
    }

    #[test]
    fn test_resolve_composite_types() {
        let table = SymbolTable::new();
        let ty = TypeName::Tuple(vec![
            TypeName::Named("i32".to_string()),
            TypeName::Array(Box::new(TypeName::Named("string".to_string()))),
        ]);
        assert_eq!(
            table.resolve_type(&ty, loc()).unwrap(),
            DataType::Tuple(vec![
                DataType::I32,
                DataType::Array(Box::new(DataType::STRING))
            ])
        );
        let bad = TypeName::Array(Box::new(TypeName::Tuple(vec![
            TypeName::Named("i32".to_string()),
            TypeName::Named("i32".to_string()),
        ])));
        assert!(table.resolve_type(&bad, loc()).is_err());
    }

    #[test]
    fn test_string_interning_is_idempotent() {
        let mut table = SymbolTable::new();
        let hello = table.intern_string("hello").unwrap();
        let world = table.intern_string("world!").unwrap();
        let again = table.intern_string("hello").unwrap();

        assert_eq!(hello, DEFAULT_MEMORY_START);
        assert_eq!(again, hello);
        // 4-byte length + 5 bytes, rounded up to a cell boundary.
        assert_eq!(world, hello + 12);
        assert_eq!(table.memory_segments().len(), 2);

        let (offset, bytes) = &table.memory_segments()[0];
        assert_eq!(*offset, hello);
        assert_eq!(&bytes[..4], &5u32.to_le_bytes());
        assert_eq!(&bytes[4..], b"hello");

        assert_eq!(table.heap_base(), world + 12);
        assert_eq!(table.string_offset("world!"), Some(world));
    }

    #[test]
    fn test_string_pool_stops_at_address_space_end() {
        let mut table = SymbolTable::with_memory_start(u32::MAX);
        assert_eq!(table.intern_string("x"), None);
        assert!(table.memory_segments().is_empty());

        let mut table = SymbolTable::with_memory_start(u32::MAX - 12);
        assert!(table.intern_string("").is_some());
        assert_eq!(table.intern_string("too long"), None);
    }
}
