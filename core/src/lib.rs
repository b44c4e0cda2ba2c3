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

pub mod ast;
pub mod checker;
pub mod codegen;
pub mod error;
pub mod lexer;
pub mod module;
pub mod parser;
#[cfg(not(target_arch = "wasm32"))]
pub mod runner;
pub mod symbols;
pub mod types;
pub mod wasm;

pub use codegen::ModuleDescriptor;
pub use error::{CompileError, SemanticError};

use symbols::{SymbolTable, DEFAULT_MEMORY_START, MAX_MEMORY_START};

#[derive(Debug, Clone, Copy)]
pub struct CompileOptions {
    /// Emit per-stage compiler logs on stderr.
    pub verbose: bool,
    /// Address of the first string literal record.
    pub memory_start: u32,
    /// Export linear memory as `memory` so the host can read strings.
    pub export_memory: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            verbose: false,
            memory_start: DEFAULT_MEMORY_START,
            export_memory: true,
        }
    }
}

/// Parse, check and lower `source` into a module descriptor.
pub fn compile(source: &str, options: &CompileOptions) -> Result<ModuleDescriptor, CompileError> {
    if options.memory_start > MAX_MEMORY_START {
        return Err(CompileError::InvalidOptions(format!(
            "memory start {} is above {}",
            options.memory_start, MAX_MEMORY_START
        )));
    }
    let mut symbols = SymbolTable::with_memory_start(options.memory_start);
    symbols.set_export_memory(options.export_memory);

    let mut program = parser::parse_program(source, &mut symbols)?;
    if options.verbose {
        eprintln!(
            "wasmc: parsed {} top-level statement(s), {} string literal(s)",
            program.statements.len(),
            symbols.memory_segments().len()
        );
    }

    let desc = codegen::generate(&mut program, &mut symbols)?;
    if options.verbose {
        for func in &desc.functions {
            eprintln!(
                "wasmc: lowered {} ({} param(s), {} local(s), {} instruction(s))",
                func.name,
                func.params.len(),
                func.locals.len(),
                func.body.len()
            );
        }
        eprintln!(
            "wasmc: heap starts at {}, {} page(s) of memory",
            desc.heap_base, desc.memory_pages
        );
    }
    Ok(desc)
}

/// Compile `source` all the way to a validated WebAssembly binary.
pub fn compile_to_bytes(source: &str, options: &CompileOptions) -> Result<Vec<u8>, CompileError> {
    let desc = compile(source, options)?;
    let bytes = module::encode(&desc);
    module::validate_detailed(&bytes).map_err(CompileError::InvalidModule)?;
    if options.verbose {
        eprintln!("wasmc: emitted {} byte(s), validation passed", bytes.len());
    }
    Ok(bytes)
}
