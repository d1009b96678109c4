#![warn(clippy::pedantic)]
//! Core Orchestration Crate for the Muni Compiler
//!
//! This crate wires the compilation pipeline together and exposes the two
//! library entry points:
//!
//! ```text
//! .mun source → lex/parse → import resolution → resolve + monomorphize → IR → .wat / .wasm
//! ```
//!
//! - [`compile`] produces the WebAssembly binary for a source file.
//! - [`compile_to_wat`] produces the WebAssembly text form of the same module.
//!
//! The individual phases ([`parse`], [`resolve`], [`lower`]) are exposed so
//! tests and tooling can stop the pipeline at any stage.
//!
//! ## Error handling
//!
//! Every phase collects all the diagnostics it can before failing. A failing
//! phase aborts the pipeline with a single `anyhow` error whose message lists
//! each diagnostic on its own line as `source:line:column: message`.
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::path::Path;
//!
//! fn build(path: &Path) -> anyhow::Result<()> {
//!     let wasm = muni::compile(path)?;
//!     std::fs::write("out.wasm", wasm)?;
//!     Ok(())
//! }
//! ```

use std::fmt::Display;
use std::path::Path;

use muni_ast::imports::Program;
use muni_type_checker::typed_ast::TypedProgram;
use muni_wasm_codegen::ir::IrModule;

/// Load and parse a program: the standard prelude, the entry file, and every
/// transitively imported file.
///
/// # Errors
///
/// Returns an error listing every lexical, syntactic, and import diagnostic.
pub fn parse(source_path: &Path) -> anyhow::Result<Program> {
    muni_ast::imports::load_program(source_path).map_err(aggregate)
}

/// [`parse`] for in-memory source; file imports resolve against `base_dir`.
///
/// # Errors
///
/// Returns an error listing every lexical, syntactic, and import diagnostic.
pub fn parse_source(source: &str, source_name: &str, base_dir: &Path) -> anyhow::Result<Program> {
    muni_ast::imports::load_program_from_source(source, source_name, base_dir).map_err(aggregate)
}

/// Resolve names and types and monomorphize every generic instantiation.
///
/// # Errors
///
/// Returns an error listing every resolution diagnostic.
pub fn resolve(program: &Program) -> anyhow::Result<TypedProgram> {
    muni_type_checker::resolve_program(program).map_err(aggregate)
}

/// Lower the typed program to module IR.
///
/// # Errors
///
/// Fails only on internal invariant violations (compiler bugs).
pub fn lower(program: &TypedProgram) -> anyhow::Result<IrModule> {
    Ok(muni_wasm_codegen::lower(program)?)
}

/// Compile a source file to a WebAssembly binary.
///
/// # Errors
///
/// Returns the aggregated diagnostics of the first failing phase.
pub fn compile(source_path: &Path) -> anyhow::Result<Vec<u8>> {
    let program = parse(source_path)?;
    let typed = resolve(&program)?;
    let module = lower(&typed)?;
    Ok(muni_wasm_codegen::emit_wasm(&module)?)
}

/// Compile a source file to WebAssembly text.
///
/// # Errors
///
/// Returns the aggregated diagnostics of the first failing phase.
pub fn compile_to_wat(source_path: &Path) -> anyhow::Result<String> {
    let program = parse(source_path)?;
    let typed = resolve(&program)?;
    let module = lower(&typed)?;
    Ok(muni_wasm_codegen::emit_wat(&module))
}

/// [`compile`] for in-memory source; used by tests and tooling.
///
/// # Errors
///
/// Returns the aggregated diagnostics of the first failing phase.
pub fn compile_source(source: &str, source_name: &str, base_dir: &Path) -> anyhow::Result<Vec<u8>> {
    let program = parse_source(source, source_name, base_dir)?;
    let typed = resolve(&program)?;
    let module = lower(&typed)?;
    Ok(muni_wasm_codegen::emit_wasm(&module)?)
}

/// [`compile_to_wat`] for in-memory source; used by tests and tooling.
///
/// # Errors
///
/// Returns the aggregated diagnostics of the first failing phase.
pub fn compile_source_to_wat(
    source: &str,
    source_name: &str,
    base_dir: &Path,
) -> anyhow::Result<String> {
    let program = parse_source(source, source_name, base_dir)?;
    let typed = resolve(&program)?;
    let module = lower(&typed)?;
    Ok(muni_wasm_codegen::emit_wat(&module))
}

/// Collapse a phase's diagnostics into one error, one rendered diagnostic per
/// line.
fn aggregate<E: Display>(errors: Vec<E>) -> anyhow::Error {
    anyhow::anyhow!(
        errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_str(source: &str) -> anyhow::Result<Vec<u8>> {
        compile_source(source, "test.mun", Path::new("."))
    }

    #[test]
    fn compilation_is_byte_deterministic() {
        let source = "void main() { print(\"determinism\"); write_int(9); }";
        let first = compile_str(source).unwrap();
        let second = compile_str(source).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn wat_and_wasm_come_from_the_same_module() {
        let source = "void main() { write_int(1); }";
        let wat = compile_source_to_wat(source, "test.mun", Path::new(".")).unwrap();
        let wasm = compile_str(source).unwrap();
        assert!(wat.contains("call $env.write_int"));
        assert_eq!(&wasm[0..4], b"\0asm");
    }

    #[test]
    fn alias_cycle_aborts_with_a_named_diagnostic() {
        let err = compile_str("alias A = B;\nalias B = A;\nvoid main() { }").unwrap_err();
        assert!(err.to_string().contains("alias cycle"));
    }

    #[test]
    fn diagnostics_arrive_one_per_line() {
        let err = compile_str(
            "void f() { write_int(a); }
             void g() { write_int(b); }
             void main() { }",
        )
        .unwrap_err();
        assert_eq!(err.to_string().lines().count(), 2);
    }
}
