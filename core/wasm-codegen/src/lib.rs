#![warn(clippy::pedantic)]
//! WebAssembly Code Generation Crate
//!
//! Consumes the typed, monomorphic program from `muni-type-checker` and
//! produces a WebAssembly module in both encodings:
//!
//! 1. [`lower`] translates the typed AST into a linear, typed IR organized by
//!    function, with explicit memory operations for aggregates and structured
//!    labeled control flow.
//! 2. [`emit_wat`] renders the IR as WebAssembly text (the debugging form).
//! 3. [`emit_wasm`] encodes the same IR as a WebAssembly binary, version 1.
//!
//! Both encodings are produced from the same [`ir::IrModule`], so the textual
//! and binary forms always describe equivalent modules.

pub mod errors;
pub mod ir;
pub mod layout;

mod binary;
mod lower;
mod wat;

use muni_type_checker::typed_ast::TypedProgram;

use crate::errors::EmitError;
use crate::ir::IrModule;

pub use lower::{ALLOC_FN, ARRAY_LIT_FN, STRING_LIT_FN};

/// Lower a typed program into module IR.
///
/// # Errors
///
/// Returns an [`EmitError`] only on internal invariant violations; well-typed
/// input cannot fail.
pub fn lower(program: &TypedProgram) -> Result<IrModule, EmitError> {
    lower::lower_program(program)
}

/// Render module IR as WebAssembly text.
#[must_use]
pub fn emit_wat(module: &IrModule) -> String {
    wat::emit_wat(module)
}

/// Encode module IR as a WebAssembly binary.
///
/// # Errors
///
/// Returns an [`EmitError`] when the IR references an unknown callee or
/// label, both compiler bugs on well-typed input.
pub fn emit_wasm(module: &IrModule) -> Result<Vec<u8>, EmitError> {
    binary::emit_binary(module)
}
