#![warn(clippy::pedantic)]
//! # Muni Compiler CLI
//!
//! The `munic` binary drives the compiler library:
//!
//! - `munic compile <input> <output>` compiles a source file; the output
//!   suffix selects the encoding (`.wat` text, anything else binary).
//! - `munic run <module>` loads a compiled module under wasmtime with the
//!   two standard host imports wired to stdout and calls `main`.
//!
//! Exit code 0 on success, 1 on any compilation or runtime error. With
//! `--debug` the full error chain is printed instead of the one-line
//! diagnostics.

mod parser;

use std::io::Write;
use std::path::Path;
use std::process;

use clap::Parser;

use crate::parser::{Cli, Command};

fn main() {
    let args = Cli::parse();
    let debug = args.debug;
    if let Err(error) = run(args) {
        if debug {
            eprintln!("{error:?}");
        } else {
            eprintln!("{error}");
        }
        process::exit(1);
    }
}

fn run(args: Cli) -> anyhow::Result<()> {
    match args.command {
        Command::Compile { input, output } => compile(&input, &output),
        Command::Run { module } => run_module(&module),
    }
}

fn compile(input: &Path, output: &Path) -> anyhow::Result<()> {
    let wants_text = output
        .extension()
        .is_some_and(|extension| extension.eq_ignore_ascii_case("wat"));
    if wants_text {
        let wat = muni::compile_to_wat(input)?;
        std::fs::write(output, wat)?;
    } else {
        let wasm = muni::compile(input)?;
        std::fs::write(output, wasm)?;
    }
    Ok(())
}

/// Minimal host shell: `env.write_int` prints a decimal integer and
/// `env.write_chr` a single character, both to stdout.
fn run_module(path: &Path) -> anyhow::Result<()> {
    use wasmtime::{Engine, Linker, Module, Store};

    let engine = Engine::default();
    let module = Module::from_file(&engine, path)?;
    let mut store = Store::new(&engine, ());
    let mut linker = Linker::new(&engine);
    linker.func_wrap("env", "write_int", |value: i32| {
        print!("{value}");
    })?;
    linker.func_wrap("env", "write_chr", |value: i32| {
        #[allow(clippy::cast_sign_loss)]
        if let Some(character) = char::from_u32(value as u32) {
            print!("{character}");
        }
    })?;
    let instance = linker.instantiate(&mut store, &module)?;
    let main = instance.get_typed_func::<(), ()>(&mut store, "main")?;
    main.call(&mut store, ())?;
    std::io::stdout().flush()?;
    Ok(())
}
