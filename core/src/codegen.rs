/*
 * Copyright (c) 2026 Mohamad Al-Zawahreh (dba Sovereign Systems).
 *
 * WASM Code Generator for the Ark WebAssembly compiler.
 *
 * Lowers a checked `Program` into a `ModuleDescriptor`: an ordered list of
 * function bodies made of `wasm-encoder` instructions, plus the imports,
 * exports and data segments the module builder needs to emit a binary.
 *
 * LICENSE: DUAL-LICENSED (AGPLv3 or COMMERCIAL).
 *
 * PATENT NOTICE: Protected by US Patent App #63/935,467.
 * NO IMPLIED LICENSE to rights of Mohamad Al-Zawahreh or Sovereign Systems.
 */

use crate::ast::{
    BinaryOp, Expression, ExpressionKind, FunctionDecl, Program, Statement, StatementKind,
    UnaryOp,
};
use crate::checker::{self, binary_result};
use crate::error::SemanticError;
use crate::symbols::{Role, SymbolTable, BUILTIN_PRINT, BUILTIN_PRINT_STRING};
use crate::types::{DataType, CELL_SIZE};
use std::collections::HashMap;
use thiserror::Error;
use wasm_encoder::{BlockType, Instruction, MemArg, ValType};

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodegenError {
    #[error(transparent)]
    Semantic(#[from] SemanticError),
    #[error("internal code generation error: {message} ({context})")]
    Invariant { message: String, context: String },
}

impl CodegenError {
    fn invariant(message: impl Into<String>, context: impl Into<String>) -> Self {
        CodegenError::Invariant {
            message: message.into(),
            context: context.into(),
        }
    }
}

// =============================================================================
// Module Descriptor
// =============================================================================

/// Function index of the `env.print` import.
pub const PRINT_FUNC_IDX: u32 = 0;
/// Function index of the `env.printString` import.
pub const PRINT_STRING_FUNC_IDX: u32 = 1;
const IMPORT_COUNT: u32 = 2;
/// Global holding the bump allocator's next free address.
pub const HEAP_GLOBAL_IDX: u32 = 0;

const WASM_PAGE_SIZE: u32 = 65536;
const PAGE_SHIFT: i32 = 16;

/// Name of the synthesized bump allocator. Not an identifier, so it can
/// never collide with a user function.
pub const ALLOC_FUNC_NAME: &str = "$alloc";

#[derive(Debug, Clone, PartialEq)]
pub struct Import {
    pub module: String,
    pub name: String,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub params: Vec<ValType>,
    pub results: Vec<ValType>,
    /// Locals beyond the parameters, one entry per slot.
    pub locals: Vec<ValType>,
    /// Complete body, terminated by `End`.
    pub body: Vec<Instruction<'static>>,
    pub exported: bool,
}

/// Everything the module builder needs to emit a binary.
#[derive(Debug, Clone)]
pub struct ModuleDescriptor {
    pub imports: Vec<Import>,
    /// Defined functions; function index = `imports.len()` + position.
    pub functions: Vec<FunctionDef>,
    /// `(offset, bytes)` active data segments.
    pub segments: Vec<(u32, Vec<u8>)>,
    pub heap_base: u32,
    pub memory_pages: u64,
    pub export_memory: bool,
}

impl ModuleDescriptor {
    pub fn export_names(&self) -> Vec<&str> {
        self.functions
            .iter()
            .filter(|f| f.exported)
            .map(|f| f.name.as_str())
            .collect()
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.functions.iter().find(|f| f.name == name)
    }

    pub fn function_index(&self, name: &str) -> Option<u32> {
        self.functions
            .iter()
            .position(|f| f.name == name)
            .map(|i| self.imports.len() as u32 + i as u32)
    }
}

fn host_imports() -> Vec<Import> {
    vec![
        Import {
            module: "env".to_string(),
            name: BUILTIN_PRINT.to_string(),
            params: vec![ValType::I32],
            results: vec![],
        },
        Import {
            module: "env".to_string(),
            name: BUILTIN_PRINT_STRING.to_string(),
            params: vec![ValType::I32],
            results: vec![],
        },
    ]
}

fn memarg(offset: u32) -> MemArg {
    MemArg {
        offset: offset as u64,
        align: 2,
        memory_index: 0,
    }
}

fn load(ty: &DataType, offset: u32) -> Instruction<'static> {
    if ty.is_float() {
        Instruction::F32Load(memarg(offset))
    } else {
        Instruction::I32Load(memarg(offset))
    }
}

fn store(ty: &DataType, offset: u32) -> Instruction<'static> {
    if ty.is_float() {
        Instruction::F32Store(memarg(offset))
    } else {
        Instruction::I32Store(memarg(offset))
    }
}

fn zero(ty: ValType) -> Instruction<'static> {
    match ty {
        ValType::F32 => Instruction::F32Const(0.0f32.into()),
        _ => Instruction::I32Const(0),
    }
}

/// `$alloc(size) -> ptr`: bumps the heap global by `size` bytes and grows
/// linear memory one page at a time until the new top fits. Traps when the
/// host refuses to grow.
fn build_allocator() -> FunctionDef {
    const SIZE: u32 = 0;
    const PTR: u32 = 1;
    const TOP: u32 = 2;
    let body = vec![
        Instruction::GlobalGet(HEAP_GLOBAL_IDX),
        Instruction::LocalTee(PTR),
        Instruction::LocalGet(SIZE),
        Instruction::I32Add,
        Instruction::LocalTee(TOP),
        Instruction::GlobalSet(HEAP_GLOBAL_IDX),
        Instruction::Block(BlockType::Empty),
        Instruction::Loop(BlockType::Empty),
        // top <= memory.size * 64 KiB
        Instruction::LocalGet(TOP),
        Instruction::MemorySize(0),
        Instruction::I32Const(PAGE_SHIFT),
        Instruction::I32Shl,
        Instruction::I32LeU,
        Instruction::BrIf(1),
        Instruction::I32Const(1),
        Instruction::MemoryGrow(0),
        Instruction::I32Const(-1),
        Instruction::I32Eq,
        Instruction::If(BlockType::Empty),
        Instruction::Unreachable,
        Instruction::End,
        Instruction::Br(0),
        Instruction::End,
        Instruction::End,
        Instruction::LocalGet(PTR),
        Instruction::End,
    ];
    FunctionDef {
        name: ALLOC_FUNC_NAME.to_string(),
        params: vec![ValType::I32],
        results: vec![ValType::I32],
        locals: vec![ValType::I32, ValType::I32],
        body,
        exported: false,
    }
}

// =============================================================================
// Function Compilation Context
// =============================================================================

/// Context for compiling a single function body.
struct FuncContext {
    instructions: Vec<Instruction<'static>>,
    /// First local index past every named slot of the function.
    scratch_base: u32,
    /// Codegen temporaries, allocated after all named slots.
    scratch: Vec<ValType>,
}

impl FuncContext {
    fn new(frame_size: u32) -> Self {
        Self {
            instructions: Vec::new(),
            scratch_base: frame_size,
            scratch: Vec::new(),
        }
    }

    fn emit(&mut self, instr: Instruction<'static>) {
        self.instructions.push(instr);
    }

    fn alloc_scratch(&mut self, ty: ValType) -> u32 {
        let idx = self.scratch_base + self.scratch.len() as u32;
        self.scratch.push(ty);
        idx
    }
}

/// Number of slots the `let`/`var` bindings in `stmts` will occupy. Slots are
/// never reused, so this is exact once the checker has resolved every binding.
fn frame_width(stmts: &[Statement]) -> Result<u32, CodegenError> {
    let mut width = 0;
    for stmt in stmts {
        width += match &stmt.kind {
            StatementKind::Let { specs, .. } => {
                let mut w = 0;
                for spec in specs {
                    let ty = spec.resolved.as_ref().ok_or_else(|| {
                        CodegenError::invariant(
                            format!("type of '{}' was never resolved", spec.name),
                            stmt.location.to_string(),
                        )
                    })?;
                    w += ty.width();
                }
                w
            }
            StatementKind::If {
                body, alternate, ..
            } => {
                let alt = match alternate {
                    Some(alt) => frame_width(std::slice::from_ref(&**alt))?,
                    None => 0,
                };
                frame_width(body)? + alt
            }
            StatementKind::While { body, .. } | StatementKind::Block(body) => frame_width(body)?,
            _ => 0,
        };
    }
    Ok(width)
}

// =============================================================================
// Code Generator
// =============================================================================

pub struct Codegen<'a> {
    symbols: &'a mut SymbolTable,
    /// Function and constructor name → function index.
    func_index_map: HashMap<String, u32>,
    functions: Vec<FunctionDef>,
    /// Index of the allocator, placed after every source-level function.
    alloc_index: u32,
}

/// Generate a module for `program`. Runs signature registration and the
/// semantic analyzer before lowering; any error aborts with no output.
pub fn generate(
    program: &mut Program,
    symbols: &mut SymbolTable,
) -> Result<ModuleDescriptor, CodegenError> {
    let mut codegen = Codegen::new(symbols);

    // Phase 1: forward registration of structs, constructors and signatures
    codegen.register(program)?;

    // Phase 2: semantic analysis gate
    checker::check(program, codegen.symbols)?;

    // Phase 3: lower function bodies
    codegen.lower_program(program)?;

    Ok(codegen.finish())
}

impl<'a> Codegen<'a> {
    pub fn new(symbols: &'a mut SymbolTable) -> Self {
        Self {
            symbols,
            func_index_map: HashMap::new(),
            functions: Vec::new(),
            alloc_index: IMPORT_COUNT,
        }
    }

    fn next_func_index(&self) -> u32 {
        IMPORT_COUNT + self.functions.len() as u32
    }

    fn register(&mut self, program: &Program) -> Result<(), CodegenError> {
        self.symbols.declare_program(program)?;

        let declared = program
            .statements
            .iter()
            .filter(|s| matches!(s.kind, StatementKind::Struct(_) | StatementKind::Function(_)))
            .count();
        self.alloc_index = IMPORT_COUNT + declared as u32;

        for stmt in &program.statements {
            match &stmt.kind {
                StatementKind::Struct(decl) => {
                    let ctor = self.build_constructor(&decl.name)?;
                    self.func_index_map
                        .insert(decl.name.clone(), self.next_func_index());
                    self.functions.push(ctor);
                }
                StatementKind::Function(decl) => {
                    let signature = self.symbols.lookup_function(&decl.name).ok_or_else(|| {
                        CodegenError::invariant(
                            format!("function '{}' was not registered", decl.name),
                            "register",
                        )
                    })?;
                    let params = signature
                        .params
                        .iter()
                        .flat_map(|p| p.machine_types())
                        .collect();
                    let results = signature.return_type.machine_types();
                    let placeholder = FunctionDef {
                        name: decl.name.clone(),
                        params,
                        results,
                        locals: Vec::new(),
                        body: Vec::new(),
                        exported: decl.exported || decl.name == "main",
                    };
                    self.func_index_map
                        .insert(decl.name.clone(), self.next_func_index());
                    self.functions.push(placeholder);
                }
                _ => {}
            }
        }

        if self.next_func_index() != self.alloc_index {
            return Err(CodegenError::invariant(
                "allocator index does not follow the declared functions",
                "register",
            ));
        }
        self.functions.push(build_allocator());
        Ok(())
    }

    /// Constructor for a struct: takes the fields as parameters, allocates
    /// one cell per field and returns the base address.
    fn build_constructor(&self, name: &str) -> Result<FunctionDef, CodegenError> {
        let info = self.symbols.lookup_struct(name).ok_or_else(|| {
            CodegenError::invariant(format!("struct '{}' was not registered", name), "register")
        })?;

        let params: Vec<ValType> = info
            .fields
            .iter()
            .flat_map(|(_, ty)| ty.machine_types())
            .collect();
        let base = params.len() as u32;

        let mut body = vec![
            Instruction::I32Const(info.size as i32),
            Instruction::Call(self.alloc_index),
            Instruction::LocalSet(base),
        ];
        for (i, (_, ty)) in info.fields.iter().enumerate() {
            body.push(Instruction::LocalGet(base));
            body.push(Instruction::LocalGet(i as u32));
            body.push(store(ty, i as u32 * CELL_SIZE));
        }
        body.extend([Instruction::LocalGet(base), Instruction::End]);

        Ok(FunctionDef {
            name: name.to_string(),
            params,
            results: vec![ValType::I32],
            locals: vec![ValType::I32],
            body,
            exported: false,
        })
    }

    fn lower_program(&mut self, program: &Program) -> Result<(), CodegenError> {
        for stmt in &program.statements {
            if let StatementKind::Function(decl) = &stmt.kind {
                let idx = self.function_position(&decl.name)?;
                let (locals, body) = self.lower_function(decl)?;
                let def = &mut self.functions[idx];
                def.locals = locals;
                def.body = body;
            }
        }
        Ok(())
    }

    fn function_position(&self, name: &str) -> Result<usize, CodegenError> {
        self.func_index_map
            .get(name)
            .map(|idx| (idx - IMPORT_COUNT) as usize)
            .ok_or_else(|| {
                CodegenError::invariant(format!("no function index for '{}'", name), "lower")
            })
    }

    fn lower_function(
        &mut self,
        decl: &FunctionDecl,
    ) -> Result<(Vec<ValType>, Vec<Instruction<'static>>), CodegenError> {
        let signature = self
            .symbols
            .lookup_function(&decl.name)
            .cloned()
            .ok_or_else(|| {
                CodegenError::invariant(format!("function '{}' vanished", decl.name), "lower")
            })?;

        self.symbols.enter_function();
        for (param, ty) in decl.params.iter().zip(signature.params) {
            self.symbols
                .define_variable(&param.name, ty, Role::Parameter, param.location)?;
        }
        let param_slots = self.symbols.slot_count();
        let frame_size = param_slots + frame_width(&decl.body)?;

        let mut ctx = FuncContext::new(frame_size);
        self.lower_statements(&mut ctx, &decl.body)?;
        let declared = self.symbols.exit_function();

        // A body that falls off the end of a value-returning function.
        if !signature.return_type.is_none() {
            ctx.emit(Instruction::Unreachable);
        }
        ctx.emit(Instruction::End);

        let mut locals: Vec<ValType> = declared
            .iter()
            .flat_map(|v| v.data_type.machine_types())
            .collect();
        if param_slots + locals.len() as u32 != frame_size {
            return Err(CodegenError::invariant(
                format!(
                    "frame of '{}' has {} slots, expected {}",
                    decl.name,
                    param_slots + locals.len() as u32,
                    frame_size
                ),
                "locals",
            ));
        }
        locals.extend(ctx.scratch);
        Ok((locals, ctx.instructions))
    }

    fn finish(self) -> ModuleDescriptor {
        let heap_base = self.symbols.heap_base();
        ModuleDescriptor {
            imports: host_imports(),
            functions: self.functions,
            segments: self.symbols.memory_segments().to_vec(),
            heap_base,
            memory_pages: (heap_base / WASM_PAGE_SIZE + 1) as u64,
            export_memory: self.symbols.exports_memory(),
        }
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn lower_statements(
        &mut self,
        ctx: &mut FuncContext,
        stmts: &[Statement],
    ) -> Result<(), CodegenError> {
        for stmt in stmts {
            self.lower_stmt(ctx, stmt)?;
        }
        Ok(())
    }

    fn lower_block(&mut self, ctx: &mut FuncContext, stmts: &[Statement]) -> Result<(), CodegenError> {
        self.symbols.enter_scope();
        let result = self.lower_statements(ctx, stmts);
        self.symbols.exit_scope();
        result
    }

    fn lower_stmt(&mut self, ctx: &mut FuncContext, stmt: &Statement) -> Result<(), CodegenError> {
        match &stmt.kind {
            StatementKind::Let { specs, value, .. } => {
                if let Some(value) = value {
                    self.lower_expr(ctx, value)?;
                }

                let mut vars = Vec::with_capacity(specs.len());
                for spec in specs {
                    let ty = spec.resolved.clone().ok_or_else(|| {
                        CodegenError::invariant(
                            format!("type of '{}' was never resolved", spec.name),
                            stmt.location.to_string(),
                        )
                    })?;
                    vars.push(self.symbols.define_variable(
                        &spec.name,
                        ty,
                        Role::Declaration,
                        spec.location,
                    )?);
                }

                if value.is_some() {
                    // One evaluation: the first binding takes the value and
                    // the others copy it.
                    let (first, rest) = vars.split_first().ok_or_else(|| {
                        CodegenError::invariant("let without bindings", stmt.location.to_string())
                    })?;
                    let width = first.data_type.width();
                    for k in (0..width).rev() {
                        ctx.emit(Instruction::LocalSet(first.slot + k));
                    }
                    for var in rest {
                        for k in 0..width {
                            ctx.emit(Instruction::LocalGet(first.slot + k));
                            ctx.emit(Instruction::LocalSet(var.slot + k));
                        }
                    }
                } else {
                    for var in &vars {
                        for (k, ty) in var.data_type.machine_types().into_iter().enumerate() {
                            ctx.emit(zero(ty));
                            ctx.emit(Instruction::LocalSet(var.slot + k as u32));
                        }
                    }
                }
                Ok(())
            }

            StatementKind::Assignment { target, value } => match &target.kind {
                ExpressionKind::Identifier(name) => {
                    let var = self.symbols.lookup_variable(name).cloned().ok_or_else(|| {
                        SemanticError::undefined("variable", name.clone(), target.location)
                    })?;
                    self.lower_expr(ctx, value)?;
                    for k in (0..var.data_type.width()).rev() {
                        ctx.emit(Instruction::LocalSet(var.slot + k));
                    }
                    Ok(())
                }
                ExpressionKind::Member { base, member } => {
                    let base_type = self.lower_expr(ctx, base)?;
                    let (index, field_type) = self.field_of(&base_type, member, base)?;
                    self.lower_expr(ctx, value)?;
                    ctx.emit(store(&field_type, index * CELL_SIZE));
                    Ok(())
                }
                _ => Err(CodegenError::invariant(
                    "invalid assignment target",
                    target.location.to_string(),
                )),
            },

            StatementKind::Return(value) => {
                if let Some(value) = value {
                    self.lower_expr(ctx, value)?;
                }
                ctx.emit(Instruction::Return);
                Ok(())
            }

            StatementKind::If {
                condition,
                body,
                alternate,
            } => {
                self.lower_expr(ctx, condition)?;
                ctx.emit(Instruction::If(BlockType::Empty));
                self.lower_block(ctx, body)?;
                if let Some(alt) = alternate {
                    ctx.emit(Instruction::Else);
                    self.lower_stmt(ctx, alt)?;
                }
                ctx.emit(Instruction::End);
                Ok(())
            }

            StatementKind::While { condition, body } => {
                // block $break
                //   loop $continue
                //     condition
                //     i32.eqz
                //     br_if $break
                //     body...
                //     br $continue
                //   end
                // end
                ctx.emit(Instruction::Block(BlockType::Empty));
                ctx.emit(Instruction::Loop(BlockType::Empty));
                self.lower_expr(ctx, condition)?;
                ctx.emit(Instruction::I32Eqz);
                ctx.emit(Instruction::BrIf(1));
                self.lower_block(ctx, body)?;
                ctx.emit(Instruction::Br(0));
                ctx.emit(Instruction::End);
                ctx.emit(Instruction::End);
                Ok(())
            }

            StatementKind::Print(value) => {
                let ty = self.lower_expr(ctx, value)?;
                ctx.emit(Instruction::Call(if ty == DataType::STRING {
                    PRINT_STRING_FUNC_IDX
                } else {
                    PRINT_FUNC_IDX
                }));
                Ok(())
            }

            StatementKind::Expression(expr) => {
                let width = self.lower_expr(ctx, expr)?.width();
                for _ in 0..width {
                    ctx.emit(Instruction::Drop);
                }
                Ok(())
            }

            StatementKind::Block(body) => self.lower_block(ctx, body),

            StatementKind::Function(_) | StatementKind::Struct(_) => Err(
                CodegenError::invariant("nested declaration", stmt.location.to_string()),
            ),
        }
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn field_of(
        &self,
        base_type: &DataType,
        member: &str,
        base: &Expression,
    ) -> Result<(u32, DataType), CodegenError> {
        base_type
            .field(member)
            .map(|(i, ty)| (i as u32, ty.clone()))
            .ok_or_else(|| {
                CodegenError::invariant(
                    format!("no field '{}' on {}", member, base_type),
                    base.location.to_string(),
                )
            })
    }

    fn call_result(&self, callee: &str, expr: &Expression) -> Result<DataType, CodegenError> {
        if callee == BUILTIN_PRINT || callee == BUILTIN_PRINT_STRING {
            return Ok(DataType::NONE);
        }
        if let Some(signature) = self.symbols.lookup_function(callee) {
            return Ok(signature.return_type.clone());
        }
        self.symbols
            .lookup_struct(callee)
            .map(|info| info.data_type(callee))
            .ok_or_else(|| SemanticError::undefined("function", callee, expr.location).into())
    }

    /// Lower `expr` and return the type of the value(s) it leaves on the
    /// stack.
    fn lower_expr(
        &mut self,
        ctx: &mut FuncContext,
        expr: &Expression,
    ) -> Result<DataType, CodegenError> {
        let ty = match &expr.kind {
            ExpressionKind::Integer(v) => {
                let v = i32::try_from(*v).map_err(|_| {
                    CodegenError::invariant(
                        format!("integer literal {} out of range", v),
                        expr.location.to_string(),
                    )
                })?;
                ctx.emit(Instruction::I32Const(v));
                DataType::I32
            }
            ExpressionKind::Float(v) => {
                ctx.emit(Instruction::F32Const((*v as f32).into()));
                DataType::F64
            }
            ExpressionKind::Str(s) => {
                let offset = self.symbols.string_offset(s).ok_or_else(|| {
                    CodegenError::invariant(
                        format!("string literal {:?} was not interned", s),
                        expr.location.to_string(),
                    )
                })?;
                ctx.emit(Instruction::I32Const(offset as i32));
                DataType::STRING
            }
            ExpressionKind::Identifier(name) => {
                let var = self.symbols.lookup_variable(name).ok_or_else(|| {
                    SemanticError::undefined("variable", name.clone(), expr.location)
                })?;
                for k in 0..var.data_type.width() {
                    ctx.emit(Instruction::LocalGet(var.slot + k));
                }
                var.data_type.clone()
            }

            ExpressionKind::Unary { op, operand } => match op {
                UnaryOp::Negate => {
                    let ty = self.lower_expr(ctx, operand)?;
                    if ty.is_float() {
                        ctx.emit(Instruction::F32Neg);
                    } else {
                        // Wrapping, same as 0 - x.
                        ctx.emit(Instruction::I32Const(-1));
                        ctx.emit(Instruction::I32Mul);
                    }
                    ty
                }
                UnaryOp::Not => {
                    return Err(CodegenError::invariant(
                        "unsupported unary operator '!'",
                        expr.location.to_string(),
                    ))
                }
            },

            ExpressionKind::Binary { left, op, right } => {
                self.lower_binary(ctx, left, *op, right)?
            }

            ExpressionKind::Call { callee, args } => {
                for arg in args {
                    self.lower_expr(ctx, arg)?;
                }
                let idx = match callee.as_str() {
                    BUILTIN_PRINT => PRINT_FUNC_IDX,
                    BUILTIN_PRINT_STRING => PRINT_STRING_FUNC_IDX,
                    name => *self.func_index_map.get(name).ok_or_else(|| {
                        SemanticError::undefined("function", name, expr.location)
                    })?,
                };
                ctx.emit(Instruction::Call(idx));
                self.call_result(callee, expr)?
            }

            ExpressionKind::Member { base, member } => {
                let base_type = self.lower_expr(ctx, base)?;
                let (index, field_type) = self.field_of(&base_type, member, base)?;
                ctx.emit(load(&field_type, index * CELL_SIZE));
                field_type
            }

            ExpressionKind::Index { base, index } => self.lower_index(ctx, expr, base, index)?,

            ExpressionKind::Array(items) => {
                let base = ctx.alloc_scratch(ValType::I32);
                let size = CELL_SIZE * (items.len() as u32 + 1);

                // Reserve the block before evaluating elements so nested
                // allocations land after it.
                ctx.emit(Instruction::I32Const(size as i32));
                ctx.emit(Instruction::Call(self.alloc_index));
                ctx.emit(Instruction::LocalTee(base));
                ctx.emit(Instruction::I32Const(items.len() as i32));
                ctx.emit(Instruction::I32Store(memarg(0)));

                // An empty literal only appears where an array type was
                // declared, so its element type is never consulted.
                let mut element = DataType::I32;
                for (i, item) in items.iter().enumerate() {
                    ctx.emit(Instruction::LocalGet(base));
                    element = self.lower_expr(ctx, item)?;
                    ctx.emit(store(&element, CELL_SIZE * (i as u32 + 1)));
                }
                ctx.emit(Instruction::LocalGet(base));
                DataType::Array(Box::new(element))
            }

            ExpressionKind::Tuple(items) => {
                let mut elements = Vec::with_capacity(items.len());
                for item in items {
                    elements.push(self.lower_expr(ctx, item)?);
                }
                DataType::Tuple(elements)
            }
        };
        Ok(ty)
    }

    fn lower_index(
        &mut self,
        ctx: &mut FuncContext,
        expr: &Expression,
        base: &Expression,
        index: &Expression,
    ) -> Result<DataType, CodegenError> {
        let literal = match index.kind {
            ExpressionKind::Integer(i) => usize::try_from(i).ok(),
            _ => None,
        };

        // Tuple locals: read the component slots directly.
        if let ExpressionKind::Identifier(name) = &base.kind {
            let var = self.symbols.lookup_variable(name).ok_or_else(|| {
                SemanticError::undefined("variable", name.clone(), base.location)
            })?;
            if let DataType::Tuple(elements) = &var.data_type {
                let i = tuple_position(elements, literal, index)?;
                let start: u32 = elements[..i].iter().map(|e| e.width()).sum();
                for k in start..start + elements[i].width() {
                    ctx.emit(Instruction::LocalGet(var.slot + k));
                }
                return Ok(elements[i].clone());
            }
        }

        match self.lower_expr(ctx, base)? {
            DataType::Array(element) => {
                // [len][e0][e1]...: element i lives at base + 4 + i * 4
                self.lower_expr(ctx, index)?;
                ctx.emit(Instruction::I32Const(CELL_SIZE as i32));
                ctx.emit(Instruction::I32Mul);
                ctx.emit(Instruction::I32Add);
                ctx.emit(load(&element, CELL_SIZE));
                Ok(*element)
            }
            DataType::Tuple(elements) => {
                let i = tuple_position(&elements, literal, index)?;
                self.spill_tuple(ctx, &elements, i);
                Ok(elements[i].clone())
            }
            other => Err(CodegenError::invariant(
                format!("cannot index {}", other),
                expr.location.to_string(),
            )),
        }
    }

    fn lower_binary(
        &mut self,
        ctx: &mut FuncContext,
        left: &Expression,
        op: BinaryOp,
        right: &Expression,
    ) -> Result<DataType, CodegenError> {
        if op.is_logical() {
            // Short-circuit; the result is normalized to 0 or 1.
            self.lower_expr(ctx, left)?;
            ctx.emit(Instruction::If(BlockType::Result(ValType::I32)));
            if op == BinaryOp::And {
                self.lower_expr(ctx, right)?;
                ctx.emit(Instruction::I32Const(0));
                ctx.emit(Instruction::I32Ne);
                ctx.emit(Instruction::Else);
                ctx.emit(Instruction::I32Const(0));
            } else {
                ctx.emit(Instruction::I32Const(1));
                ctx.emit(Instruction::Else);
                self.lower_expr(ctx, right)?;
                ctx.emit(Instruction::I32Const(0));
                ctx.emit(Instruction::I32Ne);
            }
            ctx.emit(Instruction::End);
            return Ok(DataType::I32);
        }

        let lt = self.lower_expr(ctx, left)?;
        let after_left = ctx.instructions.len();
        let rt = self.lower_expr(ctx, right)?;
        let float = lt.is_float() || rt.is_float();

        // Mixed operands: the integer side is converted where it was pushed.
        if float && !lt.is_float() {
            ctx.instructions.insert(after_left, Instruction::F32ConvertI32S);
        }
        if float && !rt.is_float() {
            ctx.emit(Instruction::F32ConvertI32S);
        }

        let instr = match (op, float) {
            (BinaryOp::Add, false) => Instruction::I32Add,
            (BinaryOp::Sub, false) => Instruction::I32Sub,
            (BinaryOp::Mul, false) => Instruction::I32Mul,
            (BinaryOp::Div, false) => Instruction::I32DivS,
            (BinaryOp::Eq, false) => Instruction::I32Eq,
            (BinaryOp::Neq, false) => Instruction::I32Ne,
            (BinaryOp::Lt, false) => Instruction::I32LtS,
            (BinaryOp::Gt, false) => Instruction::I32GtS,
            (BinaryOp::Le, false) => Instruction::I32LeS,
            (BinaryOp::Ge, false) => Instruction::I32GeS,
            (BinaryOp::Add, true) => Instruction::F32Add,
            (BinaryOp::Sub, true) => Instruction::F32Sub,
            (BinaryOp::Mul, true) => Instruction::F32Mul,
            (BinaryOp::Div, true) => Instruction::F32Div,
            (BinaryOp::Eq, true) => Instruction::F32Eq,
            (BinaryOp::Neq, true) => Instruction::F32Ne,
            (BinaryOp::Lt, true) => Instruction::F32Lt,
            (BinaryOp::Gt, true) => Instruction::F32Gt,
            (BinaryOp::Le, true) => Instruction::F32Le,
            (BinaryOp::Ge, true) => Instruction::F32Ge,
            (BinaryOp::And | BinaryOp::Or, _) => {
                return Err(CodegenError::invariant(
                    "logical operator reached arithmetic lowering",
                    left.location.to_string(),
                ))
            }
        };
        ctx.emit(instr);

        binary_result(op, &lt, &rt).ok_or_else(|| {
            CodegenError::invariant(
                format!("operands {} and {} were not checked", lt, rt),
                left.location.to_string(),
            )
        })
    }

    /// With every component of a tuple on the stack, keep only element
    /// `index`: spill all of them to scratch locals and reload the selected
    /// ones.
    fn spill_tuple(&mut self, ctx: &mut FuncContext, elements: &[DataType], index: usize) {
        let start: u32 = elements[..index].iter().map(|e| e.width()).sum();
        let width = elements[index].width();
        let components: Vec<ValType> = elements.iter().flat_map(|e| e.machine_types()).collect();
        let temps: Vec<u32> = components
            .iter()
            .map(|ty| ctx.alloc_scratch(*ty))
            .collect();
        for temp in temps.iter().rev() {
            ctx.emit(Instruction::LocalSet(*temp));
        }
        for temp in &temps[start as usize..(start + width) as usize] {
            ctx.emit(Instruction::LocalGet(*temp));
        }
    }
}

fn tuple_position(
    elements: &[DataType],
    literal: Option<usize>,
    index: &Expression,
) -> Result<usize, CodegenError> {
    literal.filter(|i| *i < elements.len()).ok_or_else(|| {
        CodegenError::invariant(
            "tuple index must be an in-range literal",
            index.location.to_string(),
        )
    })
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module;
    use crate::parser::parse_program;

    fn generate_source(source: &str) -> Result<ModuleDescriptor, CodegenError> {
        let mut symbols = SymbolTable::new();
        let mut program = parse_program(source, &mut symbols).expect("parse failed");
        generate(&mut program, &mut symbols)
    }

    fn assert_valid(desc: &ModuleDescriptor) {
        let bytes = module::encode(desc);
        let result = wasmparser::Validator::new().validate_all(&bytes);
        assert!(result.is_ok(), "Module validation failed: {:?}", result.err());
    }

    #[test]
    fn test_imports_come_first() {
        let desc = generate_source("func main() { }").unwrap();
        assert_eq!(desc.imports.len(), 2);
        assert_eq!(desc.imports[0].name, "print");
        assert_eq!(desc.imports[1].name, "printString");
        assert_eq!(desc.function_index("main"), Some(2));
        assert_valid(&desc);
    }

    #[test]
    fn test_exports_main_and_marked_functions() {
        let desc = generate_source(
            "func helper() -> i32 { return 1; } export func api() -> i32 { return helper(); } func main() { }",
        )
        .unwrap();
        assert_eq!(desc.export_names(), vec!["api", "main"]);
        assert!(desc.export_memory);
        assert_valid(&desc);
    }

    #[test]
    fn test_allocator_follows_declared_functions() {
        let desc = generate_source("struct P { a: i32 } func main() { let xs = [P(1)]; }").unwrap();
        assert_eq!(desc.function_index(ALLOC_FUNC_NAME), Some(4));
        let alloc = desc.function(ALLOC_FUNC_NAME).unwrap();
        assert!(!alloc.exported);
        assert!(alloc.body.iter().any(|i| matches!(i, Instruction::MemoryGrow(0))));

        let ctor = desc.function("P").unwrap();
        assert!(ctor.body.iter().any(|i| matches!(i, Instruction::Call(4))));
        let main = desc.function("main").unwrap();
        assert!(main.body.iter().any(|i| matches!(i, Instruction::Call(4))));
        assert!(!main.body.iter().any(|i| matches!(i, Instruction::GlobalSet(_))));
        assert_eq!(desc.export_names(), vec!["main"]);
        assert_valid(&desc);
    }

    #[test]
    fn test_constructor_synthesized() {
        let desc = generate_source("struct P { a: i32, b: f64 } func main() { let p = P(1, 2.0); }")
            .unwrap();
        let ctor = desc.function("P").unwrap();
        assert_eq!(ctor.params, vec![ValType::I32, ValType::F32]);
        assert_eq!(ctor.results, vec![ValType::I32]);
        assert!(!ctor.exported);
        assert!(matches!(ctor.body.last(), Some(Instruction::End)));
        assert_valid(&desc);
    }

    #[test]
    fn test_while_shape() {
        let desc = generate_source(
            "func main() -> i32 { var i = 0; while i < 3 { i = i + 1; } return i; }",
        )
        .unwrap();
        let body = &desc.function("main").unwrap().body;
        let block = body
            .iter()
            .position(|i| matches!(i, Instruction::Block(BlockType::Empty)))
            .unwrap();
        assert!(matches!(body[block + 1], Instruction::Loop(BlockType::Empty)));
        assert!(body.iter().any(|i| matches!(i, Instruction::BrIf(1))));
        assert!(body.iter().any(|i| matches!(i, Instruction::Br(0))));
        assert!(matches!(body[body.len() - 2], Instruction::Unreachable));
        assert_valid(&desc);
    }

    #[test]
    fn test_locals_follow_slots() {
        let desc = generate_source(
            "func f(a: i32) -> f64 { let x = 1.5; { let t = (1, 2.5); } let y = a; return x; }",
        )
        .unwrap();
        let f = desc.function("f").unwrap();
        // x:f32, t:(i32, f32), y:i32
        assert_eq!(
            f.locals,
            vec![ValType::F32, ValType::I32, ValType::F32, ValType::I32]
        );
        assert_valid(&desc);
    }

    #[test]
    fn test_mixed_arithmetic_converts_integer_side() {
        let desc = generate_source("func f(a: i32) -> f64 { return a * 2.5; }").unwrap();
        let body = &desc.function("f").unwrap().body;
        assert!(matches!(body[0], Instruction::LocalGet(0)));
        assert!(matches!(body[1], Instruction::F32ConvertI32S));
        assert!(body.iter().any(|i| matches!(i, Instruction::F32Mul)));
        assert_valid(&desc);
    }

    #[test]
    fn test_expression_statement_drops_each_value() {
        let desc = generate_source(
            "func pair() -> (i32, i32) { return (1, 2); } func main() { pair(); }",
        )
        .unwrap();
        let body = &desc.function("main").unwrap().body;
        let drops = body.iter().filter(|i| matches!(i, Instruction::Drop)).count();
        assert_eq!(drops, 2);
        assert_valid(&desc);
    }

    #[test]
    fn test_tuple_index_of_call_uses_scratch() {
        let desc = generate_source(
            "func pair() -> (i32, f64) { return (1, 2.5); } func main() -> f64 { let k = 3; return pair()[1]; }",
        )
        .unwrap();
        let main = desc.function("main").unwrap();
        assert_eq!(main.locals, vec![ValType::I32, ValType::I32, ValType::F32]);
        assert_valid(&desc);
    }

    #[test]
    fn test_strings_become_segments() {
        let desc = generate_source("func main() { print 'hi'; printString('hi'); }").unwrap();
        assert_eq!(desc.segments.len(), 1);
        assert_eq!(desc.segments[0].0, 8);
        assert_eq!(desc.segments[0].1, vec![2, 0, 0, 0, b'h', b'i']);
        assert_eq!(desc.heap_base, 16);
        assert_valid(&desc);
    }

    #[test]
    fn test_semantic_errors_abort() {
        let err = generate_source("func main() { let x = y; }").unwrap_err();
        assert!(matches!(
            err,
            CodegenError::Semantic(SemanticError::UndefinedReference { .. })
        ));
    }

    #[test]
    fn test_full_feature_module_validates() {
        let src = "
            struct Point { x: i32, y: i32 }
            struct Line { a: Point, b: Point }
            func dot(p: Point, q: Point) -> i32 { return p.x * q.x + p.y * q.y; }
            func split(v: f64) -> (i32, f64) { return (1, v * 2); }
            func main() -> i32 {
                let l = Line(Point(1, 2), Point(3, 4));
                l.a.x = 5;
                var xs = [1, 2, 3];
                var total = 0;
                var i = 0;
                while i < 3 && xs[i] > 0 { total = total + xs[i]; i = i + 1; }
                let s = split(1.5);
                if s[1] > 2 || total == 6 { print 'big'; } else if total < 0 { print -1; } else { print total; }
                let a, b: i32 = dot(l.a, l.b);
                return a + b;
            }";
        let desc = generate_source(src).unwrap();
        assert_valid(&desc);
    }
}
