//! Emission diagnostics.
//!
//! An [`EmitError`] signals an internal invariant violation during lowering
//! or encoding. On well-typed input none of these can occur; any occurrence
//! is a compiler bug, not a user error, which is why the messages carry no
//! source location.

use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum EmitError {
    #[error("internal error: structure `{name}` has no layout")]
    UnknownStruct { name: String },

    #[error("internal error: no field `{field}` on structure `{name}`")]
    UnknownField { name: String, field: String },

    #[error("internal error: call to unknown function `{name}`")]
    UnknownFunction { name: String },

    #[error("internal error: call to undeclared host import `{module}.{name}`")]
    UnknownHostImport { module: String, name: String },

    #[error("internal error: branch to label {label} outside its block")]
    BrokenBranch { label: u32 },
}
