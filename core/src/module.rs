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

//! Binary emission and validation for a `ModuleDescriptor`.

use crate::codegen::ModuleDescriptor;
use crate::symbols::MEMORY_EXPORT;
use wasm_encoder::{
    CodeSection, ConstExpr, DataSection, EntityType, ExportKind, ExportSection, Function,
    FunctionSection, GlobalSection, GlobalType, ImportSection, MemorySection, MemoryType, Module,
    TypeSection, ValType,
};

/// Deduplicated function signatures, in first-use order.
#[derive(Default)]
struct TypeTable {
    types: Vec<(Vec<ValType>, Vec<ValType>)>,
}

impl TypeTable {
    fn index_of(&mut self, params: &[ValType], results: &[ValType]) -> u32 {
        if let Some(idx) = self
            .types
            .iter()
            .position(|(p, r)| p.as_slice() == params && r.as_slice() == results)
        {
            return idx as u32;
        }
        self.types.push((params.to_vec(), results.to_vec()));
        (self.types.len() - 1) as u32
    }
}

/// Run-length encode a local list the way the code section stores it.
fn compress_locals(locals: &[ValType]) -> Vec<(u32, ValType)> {
    let mut groups: Vec<(u32, ValType)> = Vec::new();
    for ty in locals {
        match groups.last_mut() {
            Some((count, last)) if last == ty => *count += 1,
            _ => groups.push((1, *ty)),
        }
    }
    groups
}

/// Encode a descriptor into a WebAssembly binary.
pub fn encode(desc: &ModuleDescriptor) -> Vec<u8> {
    let mut module = Module::new();
    let mut table = TypeTable::default();

    let import_types: Vec<u32> = desc
        .imports
        .iter()
        .map(|i| table.index_of(&i.params, &i.results))
        .collect();
    let function_types: Vec<u32> = desc
        .functions
        .iter()
        .map(|f| table.index_of(&f.params, &f.results))
        .collect();

    // --- Type Section ---
    let mut types = TypeSection::new();
    for (params, results) in &table.types {
        types.ty().function(params.clone(), results.clone());
    }
    module.section(&types);

    // --- Import Section ---
    let mut imports = ImportSection::new();
    for (import, type_idx) in desc.imports.iter().zip(&import_types) {
        imports.import(&import.module, &import.name, EntityType::Function(*type_idx));
    }
    module.section(&imports);

    // --- Function Section ---
    let mut functions = FunctionSection::new();
    for type_idx in &function_types {
        functions.function(*type_idx);
    }
    module.section(&functions);

    // --- Memory Section ---
    let mut memories = MemorySection::new();
    memories.memory(MemoryType {
        minimum: desc.memory_pages,
        maximum: None,
        memory64: false,
        shared: false,
        page_size_log2: None,
    });
    module.section(&memories);

    // --- Global Section (heap pointer) ---
    let mut globals = GlobalSection::new();
    globals.global(
        GlobalType {
            val_type: ValType::I32,
            mutable: true,
            shared: false,
        },
        &ConstExpr::i32_const(desc.heap_base as i32),
    );
    module.section(&globals);

    // --- Export Section ---
    let mut exports = ExportSection::new();
    if desc.export_memory {
        exports.export(MEMORY_EXPORT, ExportKind::Memory, 0);
    }
    let import_count = desc.imports.len() as u32;
    for (i, func) in desc.functions.iter().enumerate() {
        if func.exported {
            exports.export(&func.name, ExportKind::Func, import_count + i as u32);
        }
    }
    module.section(&exports);

    // --- Code Section ---
    let mut codes = CodeSection::new();
    for func in &desc.functions {
        let mut body = Function::new(compress_locals(&func.locals));
        for instr in &func.body {
            body.instruction(instr);
        }
        codes.function(&body);
    }
    module.section(&codes);

    // --- Data Section (string literals) ---
    if !desc.segments.is_empty() {
        let mut data = DataSection::new();
        for (offset, bytes) in &desc.segments {
            data.active(0, &ConstExpr::i32_const(*offset as i32), bytes.clone());
        }
        module.section(&data);
    }

    module.finish()
}

/// Whether `bytes` is a valid WebAssembly module.
pub fn validate(bytes: &[u8]) -> bool {
    validate_detailed(bytes).is_ok()
}

/// Validate `bytes`, returning the validator's message on failure.
pub fn validate_detailed(bytes: &[u8]) -> Result<(), String> {
    wasmparser::Validator::new()
        .validate_all(bytes)
        .map(|_| ())
        .map_err(|e| e.to_string())
}
