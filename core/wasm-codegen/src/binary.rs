#![allow(clippy::cast_possible_truncation)]
//! WebAssembly binary format emitter.
//!
//! Writes the same [`IrModule`] the text emitter consumes as a binary module,
//! version 1, with sections in the order: type, import, function, memory,
//! global, export, code, data. Integers use LEB128 via the `leb128` crate.
//! Emission is fully deterministic: section contents follow the IR's
//! insertion orders and type signatures are deduplicated in first-use order.

use rustc_hash::FxHashMap;

use crate::errors::EmitError;
use crate::ir::{FuncRef, IrFunction, IrModule, IrStmt, Operand, Rvalue};

const MAGIC: [u8; 4] = [0x00, 0x61, 0x73, 0x6D];
const VERSION: [u8; 4] = [0x01, 0x00, 0x00, 0x00];

const SECTION_TYPE: u8 = 1;
const SECTION_IMPORT: u8 = 2;
const SECTION_FUNCTION: u8 = 3;
const SECTION_MEMORY: u8 = 5;
const SECTION_GLOBAL: u8 = 6;
const SECTION_EXPORT: u8 = 7;
const SECTION_CODE: u8 = 10;
const SECTION_DATA: u8 = 11;

const VALTYPE_I32: u8 = 0x7F;
const FUNCTYPE: u8 = 0x60;
const EXPORT_FUNC: u8 = 0x00;

const OP_UNREACHABLE: u8 = 0x00;
const OP_BLOCK: u8 = 0x02;
const OP_LOOP: u8 = 0x03;
const OP_END: u8 = 0x0B;
const OP_BR: u8 = 0x0C;
const OP_BR_IF: u8 = 0x0D;
const OP_RETURN: u8 = 0x0F;
const OP_CALL: u8 = 0x10;
const OP_LOCAL_GET: u8 = 0x20;
const OP_LOCAL_SET: u8 = 0x21;
const OP_GLOBAL_GET: u8 = 0x23;
const OP_GLOBAL_SET: u8 = 0x24;
const OP_I32_LOAD: u8 = 0x28;
const OP_I32_STORE: u8 = 0x36;
const OP_I32_CONST: u8 = 0x41;
const OP_I32_EQZ: u8 = 0x45;
const BLOCKTYPE_EMPTY: u8 = 0x40;

/// A function signature: parameter count and whether there is an i32 result.
/// Everything is i32, so this pair identifies the type.
type Signature = (u32, bool);

/// Encode the module as a WebAssembly binary.
///
/// # Errors
///
/// Returns an [`EmitError`] when the IR references an unknown function or
/// branches outside its block; both are compiler bugs on well-typed input.
pub(crate) fn emit_binary(module: &IrModule) -> Result<Vec<u8>, EmitError> {
    let mut types: Vec<Signature> = Vec::new();
    let mut type_index: FxHashMap<Signature, u32> = FxHashMap::default();
    let mut intern_type = |sig: Signature, types: &mut Vec<Signature>| -> u32 {
        if let Some(&index) = type_index.get(&sig) {
            return index;
        }
        let index = types.len() as u32;
        types.push(sig);
        type_index.insert(sig, index);
        index
    };

    let import_types: Vec<u32> = module
        .imports
        .iter()
        .map(|import| intern_type((import.n_params, import.has_result), &mut types))
        .collect();
    let function_types: Vec<u32> = module
        .functions
        .iter()
        .map(|function| intern_type((function.n_params, function.has_result), &mut types))
        .collect();

    let mut host_index: FxHashMap<(String, String), u32> = FxHashMap::default();
    for (index, import) in module.imports.iter().enumerate() {
        host_index.insert(
            (import.module.clone(), import.name.clone()),
            index as u32,
        );
    }
    let mut user_index: FxHashMap<String, u32> = FxHashMap::default();
    for (index, function) in module.functions.iter().enumerate() {
        user_index.insert(
            function.name.clone(),
            module.imports.len() as u32 + index as u32,
        );
    }

    let mut out = Vec::new();
    out.extend_from_slice(&MAGIC);
    out.extend_from_slice(&VERSION);

    // Type section.
    let mut payload = Vec::new();
    uleb(&mut payload, types.len() as u64);
    for (n_params, has_result) in &types {
        payload.push(FUNCTYPE);
        uleb(&mut payload, u64::from(*n_params));
        for _ in 0..*n_params {
            payload.push(VALTYPE_I32);
        }
        if *has_result {
            payload.push(1);
            payload.push(VALTYPE_I32);
        } else {
            payload.push(0);
        }
    }
    section(&mut out, SECTION_TYPE, &payload);

    // Import section.
    if !module.imports.is_empty() {
        let mut payload = Vec::new();
        uleb(&mut payload, module.imports.len() as u64);
        for (import, type_idx) in module.imports.iter().zip(&import_types) {
            name(&mut payload, &import.module);
            name(&mut payload, &import.name);
            payload.push(EXPORT_FUNC);
            uleb(&mut payload, u64::from(*type_idx));
        }
        section(&mut out, SECTION_IMPORT, &payload);
    }

    // Function section.
    let mut payload = Vec::new();
    uleb(&mut payload, module.functions.len() as u64);
    for type_idx in &function_types {
        uleb(&mut payload, u64::from(*type_idx));
    }
    section(&mut out, SECTION_FUNCTION, &payload);

    // Memory section: one memory, no maximum.
    let mut payload = Vec::new();
    uleb(&mut payload, 1);
    payload.push(0x00);
    uleb(&mut payload, u64::from(module.memory_pages));
    section(&mut out, SECTION_MEMORY, &payload);

    // Global section: the mutable heap pointer.
    let mut payload = Vec::new();
    uleb(&mut payload, 1);
    payload.push(VALTYPE_I32);
    payload.push(0x01);
    payload.push(OP_I32_CONST);
    sleb(&mut payload, i64::from(module.heap_start));
    payload.push(OP_END);
    section(&mut out, SECTION_GLOBAL, &payload);

    // Export section.
    let exports: Vec<(&str, u32)> = module
        .functions
        .iter()
        .filter_map(|function| {
            function
                .export
                .as_deref()
                .map(|export| (export, user_index[&function.name]))
        })
        .collect();
    if !exports.is_empty() {
        let mut payload = Vec::new();
        uleb(&mut payload, exports.len() as u64);
        for (export, index) in exports {
            name(&mut payload, export);
            payload.push(EXPORT_FUNC);
            uleb(&mut payload, u64::from(index));
        }
        section(&mut out, SECTION_EXPORT, &payload);
    }

    // Code section.
    let mut payload = Vec::new();
    uleb(&mut payload, module.functions.len() as u64);
    for function in &module.functions {
        let body = encode_function(function, &user_index, &host_index)?;
        uleb(&mut payload, body.len() as u64);
        payload.extend_from_slice(&body);
    }
    section(&mut out, SECTION_CODE, &payload);

    // Data section.
    if !module.data.is_empty() {
        let mut payload = Vec::new();
        uleb(&mut payload, module.data.len() as u64);
        for segment in &module.data {
            uleb(&mut payload, 0);
            payload.push(OP_I32_CONST);
            sleb(&mut payload, i64::from(segment.offset));
            payload.push(OP_END);
            uleb(&mut payload, segment.bytes.len() as u64);
            payload.extend_from_slice(&segment.bytes);
        }
        section(&mut out, SECTION_DATA, &payload);
    }

    Ok(out)
}

fn encode_function(
    function: &IrFunction,
    user_index: &FxHashMap<String, u32>,
    host_index: &FxHashMap<(String, String), u32>,
) -> Result<Vec<u8>, EmitError> {
    let mut body = Vec::new();
    let extra_locals = function.n_locals - function.n_params;
    if extra_locals > 0 {
        uleb(&mut body, 1);
        uleb(&mut body, u64::from(extra_locals));
        body.push(VALTYPE_I32);
    } else {
        uleb(&mut body, 0);
    }
    let mut labels = Vec::new();
    encode_stmts(&function.body, &mut labels, user_index, host_index, &mut body)?;
    body.push(OP_END);
    Ok(body)
}

fn encode_stmts(
    statements: &[IrStmt],
    labels: &mut Vec<u32>,
    user_index: &FxHashMap<String, u32>,
    host_index: &FxHashMap<(String, String), u32>,
    out: &mut Vec<u8>,
) -> Result<(), EmitError> {
    for statement in statements {
        encode_stmt(statement, labels, user_index, host_index, out)?;
    }
    Ok(())
}

#[allow(clippy::too_many_lines)]
fn encode_stmt(
    statement: &IrStmt,
    labels: &mut Vec<u32>,
    user_index: &FxHashMap<String, u32>,
    host_index: &FxHashMap<(String, String), u32>,
    out: &mut Vec<u8>,
) -> Result<(), EmitError> {
    match statement {
        IrStmt::Assign { dest, value } => {
            encode_rvalue(value, out);
            out.push(OP_LOCAL_SET);
            uleb(out, u64::from(*dest));
        }
        IrStmt::Store {
            addr,
            offset,
            value,
        } => {
            encode_operand(addr, out);
            encode_operand(value, out);
            out.push(OP_I32_STORE);
            uleb(out, 2);
            uleb(out, u64::from(*offset));
        }
        IrStmt::Call { dest, func, args } => {
            for arg in args {
                encode_operand(arg, out);
            }
            let index = match func {
                FuncRef::User(name) => {
                    *user_index
                        .get(name)
                        .ok_or_else(|| EmitError::UnknownFunction { name: name.clone() })?
                }
                FuncRef::Host { module, name } => *host_index
                    .get(&(module.clone(), name.clone()))
                    .ok_or_else(|| EmitError::UnknownHostImport {
                        module: module.clone(),
                        name: name.clone(),
                    })?,
            };
            out.push(OP_CALL);
            uleb(out, u64::from(index));
            if let Some(dest) = dest {
                out.push(OP_LOCAL_SET);
                uleb(out, u64::from(*dest));
            }
        }
        IrStmt::SetHeapPtr(operand) => {
            encode_operand(operand, out);
            out.push(OP_GLOBAL_SET);
            uleb(out, 0);
        }
        IrStmt::Return(operand) => {
            if let Some(operand) = operand {
                encode_operand(operand, out);
            }
            out.push(OP_RETURN);
        }
        IrStmt::Block { label, body } => {
            out.push(OP_BLOCK);
            out.push(BLOCKTYPE_EMPTY);
            labels.push(*label);
            encode_stmts(body, labels, user_index, host_index, out)?;
            labels.pop();
            out.push(OP_END);
        }
        IrStmt::Loop { label, body } => {
            out.push(OP_LOOP);
            out.push(BLOCKTYPE_EMPTY);
            labels.push(*label);
            encode_stmts(body, labels, user_index, host_index, out)?;
            labels.pop();
            out.push(OP_END);
        }
        IrStmt::Br(label) => {
            out.push(OP_BR);
            uleb(out, u64::from(branch_depth(labels, *label)?));
        }
        IrStmt::BrIf { cond, label } => {
            encode_operand(cond, out);
            out.push(OP_BR_IF);
            uleb(out, u64::from(branch_depth(labels, *label)?));
        }
        IrStmt::Unreachable => out.push(OP_UNREACHABLE),
    }
    Ok(())
}

fn encode_rvalue(rvalue: &Rvalue, out: &mut Vec<u8>) {
    match rvalue {
        Rvalue::Operand(operand) => encode_operand(operand, out),
        Rvalue::Binary { op, left, right } => {
            encode_operand(left, out);
            encode_operand(right, out);
            out.push(op.opcode());
        }
        Rvalue::Eqz(operand) => {
            encode_operand(operand, out);
            out.push(OP_I32_EQZ);
        }
        Rvalue::Load { addr, offset } => {
            encode_operand(addr, out);
            out.push(OP_I32_LOAD);
            uleb(out, 2);
            uleb(out, u64::from(*offset));
        }
        Rvalue::HeapPtr => {
            out.push(OP_GLOBAL_GET);
            uleb(out, 0);
        }
    }
}

fn encode_operand(operand: &Operand, out: &mut Vec<u8>) {
    match operand {
        Operand::Local(local) => {
            out.push(OP_LOCAL_GET);
            uleb(out, u64::from(*local));
        }
        Operand::Const(value) => {
            out.push(OP_I32_CONST);
            sleb(out, i64::from(*value));
        }
    }
}

/// Relative depth of a label from the current position: 0 is the innermost
/// enclosing block.
fn branch_depth(labels: &[u32], label: u32) -> Result<u32, EmitError> {
    labels
        .iter()
        .rev()
        .position(|&candidate| candidate == label)
        .map(|depth| depth as u32)
        .ok_or(EmitError::BrokenBranch { label })
}

fn section(out: &mut Vec<u8>, id: u8, payload: &[u8]) {
    out.push(id);
    uleb(out, payload.len() as u64);
    out.extend_from_slice(payload);
}

fn name(out: &mut Vec<u8>, value: &str) {
    uleb(out, value.len() as u64);
    out.extend_from_slice(value.as_bytes());
}

fn uleb(out: &mut Vec<u8>, value: u64) {
    leb128::write::unsigned(out, value).expect("writing to a Vec cannot fail");
}

fn sleb(out: &mut Vec<u8>, value: i64) {
    leb128::write::signed(out, value).expect("writing to a Vec cannot fail");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lower;
    use std::path::Path;

    fn wasm_for(source: &str) -> Vec<u8> {
        let program =
            muni_ast::imports::load_program_from_source(source, "test.mun", Path::new("."))
                .expect("source should load");
        let typed = muni_type_checker::resolve_program(&program).expect("source should resolve");
        let module = lower::lower_program(&typed).expect("lowering should succeed");
        emit_binary(&module).expect("encoding should succeed")
    }

    #[test]
    fn header_is_wasm_version_one() {
        let wasm = wasm_for("void main() { }");
        assert_eq!(&wasm[0..4], b"\0asm");
        assert_eq!(&wasm[4..8], &[1, 0, 0, 0]);
    }

    #[test]
    fn emitted_module_validates() {
        let wasm = wasm_for(
            "structure Point {
                int x;
                int y;

                Point(int x0, int y0) {
                    this.x = x0;
                    this.y = y0;
                }

                int manhattan() {
                    return this.x + this.y;
                }
            }
            void main() {
                Point p = Point(3, 4);
                write_int(p.manhattan());
                array<int> a = [10, 20, 30];
                write_int(a[2]);
                print(\"ok\");
            }",
        );
        wasmparser::validate(&wasm).expect("emitted module must validate");
    }

    #[test]
    fn control_flow_heavy_module_validates() {
        let wasm = wasm_for(
            "int collatz_steps(int n) {
                int steps = 0;
                while (n != 1) {
                    if (n % 2 == 0) {
                        n /= 2;
                    } else {
                        n = 3 * n + 1;
                    }
                    steps += 1;
                }
                return steps;
            }
            void main() {
                for (int i = 1; i <= 6; i += 1) {
                    write_int(collatz_steps(i));
                }
                int j = 10;
                until (j == 0) {
                    j -= 1;
                    if (j == 5) { continue; }
                    if (j == 2) { break; }
                }
                do {
                    j += 1;
                } while (j < 4);
            }",
        );
        wasmparser::validate(&wasm).expect("emitted module must validate");
    }

    #[test]
    fn emission_is_deterministic() {
        let source = "void main() { print(\"abc\"); write_int(7); }";
        assert_eq!(wasm_for(source), wasm_for(source));
    }

    #[test]
    fn branch_depth_counts_from_innermost() {
        let labels = vec![3, 7, 9];
        assert_eq!(branch_depth(&labels, 9).unwrap(), 0);
        assert_eq!(branch_depth(&labels, 7).unwrap(), 1);
        assert_eq!(branch_depth(&labels, 3).unwrap(), 2);
        assert!(matches!(
            branch_depth(&labels, 42),
            Err(EmitError::BrokenBranch { label: 42 })
        ));
    }
}
