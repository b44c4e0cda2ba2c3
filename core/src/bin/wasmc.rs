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

use ark_wasmc::runner::run_main;
use ark_wasmc::symbols::{SymbolTable, DEFAULT_MEMORY_START, MAX_MEMORY_START};
use ark_wasmc::{compile_to_bytes, parser, CompileOptions};
use clap::Parser;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Debug, clap::Parser)]
#[clap(author, version, about)]
struct Args {
    /// Source file
    input: PathBuf,

    /// Output file (defaults to the input with a .wasm extension)
    #[clap(short, long)]
    output: Option<PathBuf>,

    /// Print the parsed AST as JSON instead of compiling
    #[clap(long)]
    emit_ast: bool,

    /// Run `main` after compiling and print its output
    #[clap(short, long)]
    run: bool,

    /// Address of the first string literal in linear memory
    #[clap(
        long,
        default_value_t = DEFAULT_MEMORY_START,
        value_parser = clap::value_parser!(u32).range(..=MAX_MEMORY_START as i64)
    )]
    memory_start: u32,

    /// Enable verbose output
    #[clap(short, long)]
    verbose: bool,
}

fn default_output(input: &Path) -> PathBuf {
    input.with_extension("wasm")
}

fn main() -> ExitCode {
    let args = Args::parse();

    let source = match fs::read_to_string(&args.input) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Failed to read {}: {}", args.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if args.emit_ast {
        let mut symbols = SymbolTable::with_memory_start(args.memory_start);
        return match parser::parse_program(&source, &mut symbols) {
            Ok(program) => match serde_json::to_string_pretty(&program) {
                Ok(json) => {
                    println!("{}", json);
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    eprintln!("Failed to serialize AST: {}", e);
                    ExitCode::FAILURE
                }
            },
            Err(e) => {
                eprintln!("{}: {}", args.input.display(), e);
                ExitCode::FAILURE
            }
        };
    }

    let options = CompileOptions {
        verbose: args.verbose,
        memory_start: args.memory_start,
        ..CompileOptions::default()
    };

    let bytes = match compile_to_bytes(&source, &options) {
        Ok(bytes) => bytes,
        Err(e) => {
            eprintln!("{}: {}", args.input.display(), e);
            return ExitCode::FAILURE;
        }
    };

    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output(&args.input));
    if let Err(e) = fs::write(&output, &bytes) {
        eprintln!("Failed to write {}: {}", output.display(), e);
        return ExitCode::FAILURE;
    }
    if args.verbose {
        eprintln!("wasmc: wrote {}", output.display());
    }

    if args.run {
        match run_main(&bytes) {
            Ok(result) => {
                print!("{}", result.stdout);
                for value in &result.results {
                    println!("=> {}", value);
                }
            }
            Err(e) => {
                eprintln!("Runtime Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    ExitCode::SUCCESS
}
