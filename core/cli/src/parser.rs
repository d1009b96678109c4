//! Command line argument parsing for the Muni compiler.
//!
//! This module defines the CLI interface using `clap`. The `Cli` struct
//! captures all flags and subcommands of the `munic` binary.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Command line interface definition for the Muni compiler.
///
/// ## Examples
///
/// Compile to a binary module:
/// ```bash
/// munic compile program.mun program.wasm
/// ```
///
/// Compile to the text format:
/// ```bash
/// munic compile program.mun program.wat
/// ```
///
/// Run a compiled module under the built-in host:
/// ```bash
/// munic run program.wasm
/// ```
#[derive(Parser)]
#[command(
    name = "munic",
    author,
    version,
    about = "Muni compiler CLI (munic)",
    long_about = "The 'munic' command compiles Muni source files to WebAssembly and runs \
compiled modules under a minimal host that wires env.write_int and env.write_chr to stdout."
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,

    /// Verbose error reporting.
    ///
    /// Prints the full error chain with backtrace formatting instead of the
    /// one-line-per-diagnostic summary.
    #[clap(long = "debug", global = true, action = clap::ArgAction::SetTrue)]
    pub(crate) debug: bool,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Compile a `.mun` source file to WebAssembly.
    ///
    /// The output format is selected by the output path's suffix: `.wat`
    /// produces the text format, anything else the binary format.
    Compile {
        /// Path to the `.mun` source file.
        input: PathBuf,
        /// Output path (`.wat` for text, otherwise binary).
        output: PathBuf,
    },

    /// Run a compiled WebAssembly module.
    ///
    /// Instantiates the module with `env.write_int` and `env.write_chr`
    /// writing to stdout, then invokes its exported `main`.
    Run {
        /// Path to the compiled `.wasm` module.
        module: PathBuf,
    },
}
