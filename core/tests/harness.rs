#![allow(dead_code)]

use ark_wasmc::runner::{run_main, WasmOutput};
use ark_wasmc::{compile_to_bytes, CompileError, CompileOptions};

/// Compile source to wasm bytes.
pub fn compile_src(src: &str) -> Vec<u8> {
    compile_to_bytes(src, &CompileOptions::default()).expect("compile failure")
}

/// Compile and run `main`, returning everything it printed and returned.
pub fn run(src: &str) -> WasmOutput {
    let wasm = compile_src(src);
    run_main(&wasm).expect("run failure")
}

/// Compile and run `main`, which must return a single i32.
pub fn run_main_i32(src: &str) -> i32 {
    let output = run(src);
    output
        .single_i32()
        .unwrap_or_else(|| panic!("main did not return one i32: {:?}", output.results))
}

pub fn compile_err(src: &str) -> CompileError {
    match compile_to_bytes(src, &CompileOptions::default()) {
        Ok(_) => panic!("expected a compile error for:\n{}", src),
        Err(e) => e,
    }
}
