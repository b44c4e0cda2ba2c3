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

//! Embedding entry points for hosts that load the compiler itself as a
//! WebAssembly module: a `wasm-bindgen` export for JavaScript and a raw
//! pointer/length ABI for everything else.

use crate::{compile_to_bytes, CompileOptions};
use std::mem;
use std::slice;
use std::str;
use wasm_bindgen::prelude::*;

/// Compile source text to a WebAssembly binary. Errors surface as their
/// display string.
#[wasm_bindgen]
pub fn compile_to_wasm(source: &str) -> Result<Vec<u8>, JsValue> {
    compile_to_bytes(source, &CompileOptions::default())
        .map_err(|e| JsValue::from_str(&e.to_string()))
}

/// Allocates memory for a string of `size` bytes.
/// Returns a pointer to the allocated memory.
#[no_mangle]
pub extern "C" fn wasmc_alloc(size: usize) -> *mut u8 {
    let mut buf = Vec::with_capacity(size);
    let ptr = buf.as_mut_ptr();
    mem::forget(buf);
    ptr
}

/// Deallocates memory returned by `wasmc_alloc` or `wasmc_compile`.
///
/// # Safety
/// `ptr` must come from one of those functions with the same `size`.
#[no_mangle]
pub unsafe extern "C" fn wasmc_dealloc(ptr: *mut u8, size: usize) {
    let _ = Vec::from_raw_parts(ptr, 0, size);
}

/// Compiles UTF-8 source text.
///
/// Returns a pointer to `[status (u8)][len (u32 LE)][payload]`, where status 0
/// means the payload is a module binary and 1 means it is an error message.
/// The caller frees it with `wasmc_dealloc(ptr, len + 5)`.
///
/// # Safety
/// `input_ptr` must point to `input_len` readable bytes.
#[no_mangle]
pub unsafe extern "C" fn wasmc_compile(input_ptr: *const u8, input_len: usize) -> *mut u8 {
    let input = slice::from_raw_parts(input_ptr, input_len);
    match str::from_utf8(input) {
        Ok(source) => match compile_to_bytes(source, &CompileOptions::default()) {
            Ok(bytes) => make_response(0, &bytes),
            Err(e) => make_response(1, e.to_string().as_bytes()),
        },
        Err(_) => make_response(1, b"Error: Invalid UTF-8 input"),
    }
}

fn encode_response(status: u8, payload: &[u8]) -> Vec<u8> {
    // Layout: [status (1 byte)] [len (4 bytes)] [payload...]
    let mut buf = Vec::with_capacity(5 + payload.len());
    buf.push(status);
    buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    buf.extend_from_slice(payload);
    buf
}

fn make_response(status: u8, payload: &[u8]) -> *mut u8 {
    // A boxed slice has capacity == len, matching `wasmc_dealloc`.
    Box::into_raw(encode_response(status, payload).into_boxed_slice()) as *mut u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_layout() {
        let buf = encode_response(1, b"oops");
        assert_eq!(buf, vec![1, 4, 0, 0, 0, b'o', b'o', b'p', b's']);
    }

    #[test]
    fn test_compile_roundtrip_through_raw_abi() {
        let source = b"func main() -> i32 { return 1; }";
        unsafe {
            let ptr = wasmc_compile(source.as_ptr(), source.len());
            let header = slice::from_raw_parts(ptr, 5);
            assert_eq!(header[0], 0);
            let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
            let payload = slice::from_raw_parts(ptr.add(5), len);
            assert_eq!(&payload[0..4], b"\0asm");
            wasmc_dealloc(ptr, len + 5);
        }
    }

    #[test]
    fn test_compile_error_through_raw_abi() {
        let source = b"func main() { print y; }";
        unsafe {
            let ptr = wasmc_compile(source.as_ptr(), source.len());
            let header = slice::from_raw_parts(ptr, 5);
            assert_eq!(header[0], 1);
            let len = u32::from_le_bytes([header[1], header[2], header[3], header[4]]) as usize;
            let message = str::from_utf8(slice::from_raw_parts(ptr.add(5), len)).unwrap();
            assert!(message.contains("Undefined variable 'y'"), "{}", message);
            wasmc_dealloc(ptr, len + 5);
        }
    }
}
