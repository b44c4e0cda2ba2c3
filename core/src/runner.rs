/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * Wasmtime Runtime Execution for compiled modules.
 *
 * Supplies the two host imports the code generator declares:
 *   env::print(i32)        prints a decimal integer
 *   env::printString(i32)  prints the [u32 length][bytes] record at ptr
 *
 * Output is captured in the store rather than written to the process
 * stdout, so callers decide where it goes.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 */

use crate::symbols::MEMORY_EXPORT;
use std::fmt;
use wasmtime::{Caller, Engine, Extern, Instance, Linker, Module, Store, Val};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Debug, Clone)]
pub struct WasmRunError {
    pub message: String,
    pub context: String,
}

impl fmt::Display for WasmRunError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}] {}", self.context, self.message)
    }
}

impl std::error::Error for WasmRunError {}

fn run_error(message: impl Into<String>, context: &str) -> WasmRunError {
    WasmRunError {
        message: message.into(),
        context: context.to_string(),
    }
}

// =============================================================================
// Host State
// =============================================================================

/// Store data: captured output and the first host-side fault, if any.
#[derive(Debug, Clone, Default)]
pub struct HostState {
    pub stdout: String,
    pub fault: Option<String>,
}

// =============================================================================
// Output
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum WasmValue {
    I32(i32),
    F32(f32),
}

impl fmt::Display for WasmValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WasmValue::I32(v) => write!(f, "{}", v),
            WasmValue::F32(v) => write!(f, "{}", v),
        }
    }
}

impl WasmValue {
    fn to_val(self) -> Val {
        match self {
            WasmValue::I32(v) => Val::I32(v),
            WasmValue::F32(v) => Val::F32(v.to_bits()),
        }
    }

    fn from_val(val: &Val) -> Option<Self> {
        match val {
            Val::I32(v) => Some(WasmValue::I32(*v)),
            Val::F32(bits) => Some(WasmValue::F32(f32::from_bits(*bits))),
            _ => None,
        }
    }
}

/// Result of calling an exported function.
#[derive(Debug, Clone)]
pub struct WasmOutput {
    /// Everything printed through the host imports, one line per call.
    pub stdout: String,
    pub results: Vec<WasmValue>,
    /// Snapshot of linear memory after the call (empty if not exported).
    pub memory: Vec<u8>,
}

impl WasmOutput {
    pub fn single_i32(&self) -> Option<i32> {
        match self.results.as_slice() {
            [WasmValue::I32(v)] => Some(*v),
            _ => None,
        }
    }

    pub fn single_f32(&self) -> Option<f32> {
        match self.results.as_slice() {
            [WasmValue::F32(v)] => Some(*v),
            _ => None,
        }
    }

    /// Little-endian i32 at `addr` in the memory snapshot.
    pub fn read_i32(&self, addr: u32) -> Option<i32> {
        let start = addr as usize;
        let bytes = self.memory.get(start..start + 4)?;
        Some(i32::from_le_bytes(bytes.try_into().ok()?))
    }
}

// =============================================================================
// Public API
// =============================================================================

/// Instantiate the module and call `main()`.
pub fn run_main(bytes: &[u8]) -> Result<WasmOutput, WasmRunError> {
    call_exported(bytes, "main", &[])
}

/// Instantiate the module and call the exported function `name`.
pub fn call_exported(
    bytes: &[u8],
    name: &str,
    args: &[WasmValue],
) -> Result<WasmOutput, WasmRunError> {
    let engine = Engine::default();
    let module = Module::from_binary(&engine, bytes)
        .map_err(|e| run_error(format!("Failed to load WASM module: {}", e), "load"))?;

    let mut linker = Linker::<HostState>::new(&engine);
    link_host_imports(&mut linker)?;

    let mut store = Store::new(&engine, HostState::default());
    let instance = linker
        .instantiate(&mut store, &module)
        .map_err(|e| run_error(format!("Failed to instantiate: {}", e), "instantiate"))?;

    let func = instance
        .get_func(&mut store, name)
        .ok_or_else(|| run_error(format!("Export '{}' not found", name), "get_func"))?;

    let params: Vec<Val> = args.iter().map(|a| a.to_val()).collect();
    let result_count = func.ty(&store).results().len();
    let mut results = vec![Val::I32(0); result_count];

    func.call(&mut store, &params, &mut results)
        .map_err(|e| run_error(format!("Call to '{}' trapped: {}", name, e), "call"))?;

    if let Some(fault) = store.data().fault.clone() {
        return Err(run_error(fault, "host"));
    }

    let results = results
        .iter()
        .map(|v| {
            WasmValue::from_val(v)
                .ok_or_else(|| run_error(format!("Unsupported result {:?}", v), "results"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(WasmOutput {
        stdout: store.data().stdout.clone(),
        results,
        memory: memory_snapshot(&instance, &mut store),
    })
}

fn memory_snapshot(instance: &Instance, store: &mut Store<HostState>) -> Vec<u8> {
    match instance.get_memory(&mut *store, MEMORY_EXPORT) {
        Some(memory) => memory.data(&*store).to_vec(),
        None => Vec::new(),
    }
}

// =============================================================================
// Host Imports
// =============================================================================

/// Read the `[u32 LE length][bytes]` record at `ptr`.
fn read_string_record(data: &[u8], ptr: usize) -> Result<String, String> {
    let header = data
        .get(ptr..ptr + 4)
        .ok_or_else(|| format!("string pointer {} is out of bounds", ptr))?;
    let len = u32::from_le_bytes([header[0], header[1], header[2], header[3]]) as usize;
    let body = data
        .get(ptr + 4..ptr + 4 + len)
        .ok_or_else(|| format!("string at {} with length {} is out of bounds", ptr, len))?;
    Ok(String::from_utf8_lossy(body).into_owned())
}

fn link_host_imports(linker: &mut Linker<HostState>) -> Result<(), WasmRunError> {
    linker
        .func_wrap("env", "print", |mut caller: Caller<'_, HostState>, value: i32| {
            let state = caller.data_mut();
            state.stdout.push_str(&value.to_string());
            state.stdout.push('\n');
        })
        .map_err(|e| run_error(format!("Failed to link print: {}", e), "link"))?;

    linker
        .func_wrap(
            "env",
            "printString",
            |mut caller: Caller<'_, HostState>, ptr: i32| {
                let text = match caller.get_export(MEMORY_EXPORT) {
                    Some(Extern::Memory(mem)) => read_string_record(mem.data(&caller), ptr as u32 as usize),
                    _ => Err("module does not export its memory".to_string()),
                };
                let state = caller.data_mut();
                match text {
                    Ok(text) => {
                        state.stdout.push_str(&text);
                        state.stdout.push('\n');
                    }
                    Err(fault) => {
                        state.fault.get_or_insert(fault);
                    }
                }
            },
        )
        .map_err(|e| run_error(format!("Failed to link printString: {}", e), "link"))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile_to_bytes, CompileOptions};

    fn compile(source: &str) -> Vec<u8> {
        compile_to_bytes(source, &CompileOptions::default()).expect("compile failed")
    }

    #[test]
    fn test_read_string_record() {
        let mut data = vec![0u8; 4];
        data.extend_from_slice(&3u32.to_le_bytes());
        data.extend_from_slice(b"abc");
        assert_eq!(read_string_record(&data, 4).unwrap(), "abc");
        assert!(read_string_record(&data, 6).is_err());
        assert!(read_string_record(&data, 100).is_err());
    }

    #[test]
    fn test_run_main_returns_value() {
        let wasm = compile("func main() -> i32 { return 2 + 3 * 4; }");
        let output = run_main(&wasm).expect("run failed");
        assert_eq!(output.single_i32(), Some(14));
        assert_eq!(output.stdout, "");
    }

    #[test]
    fn test_prints_are_captured_in_order() {
        let wasm = compile("func main() { print 7; print 'seven'; printString('done'); }");
        let output = run_main(&wasm).expect("run failed");
        assert_eq!(output.stdout, "7\nseven\ndone\n");
        assert!(output.results.is_empty());
    }

    #[test]
    fn test_call_exported_with_arguments() {
        let wasm = compile("export func scale(x: i32, k: f64) -> f64 { return x * k; } func main() { }");
        let output = call_exported(&wasm, "scale", &[WasmValue::I32(4), WasmValue::F32(0.5)])
            .expect("call failed");
        assert_eq!(output.single_f32(), Some(2.0));
    }

    #[test]
    fn test_invalid_wasm() {
        assert!(run_main(&[0, 1, 2, 3]).is_err());
    }

    #[test]
    fn test_missing_export() {
        let wasm = compile("func main() { }");
        let err = call_exported(&wasm, "nonexistent", &[]).unwrap_err();
        assert_eq!(err.context, "get_func");
    }
}
