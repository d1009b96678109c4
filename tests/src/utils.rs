use std::path::Path;

use wasmtime::{Caller, Engine, Linker, Module, Store};

/// Output captured from the module's host imports.
#[derive(Default)]
pub(crate) struct HostOutput {
    pub(crate) buffer: String,
}

pub(crate) fn compile(source: &str) -> anyhow::Result<Vec<u8>> {
    muni::compile_source(source, "test.mun", Path::new("."))
}

pub(crate) fn compile_ok(source: &str) -> Vec<u8> {
    match compile(source) {
        Ok(wasm) => wasm,
        Err(error) => panic!("expected successful compilation, got:\n{error}"),
    }
}

pub(crate) fn compile_wat(source: &str) -> String {
    muni::compile_source_to_wat(source, "test.mun", Path::new("."))
        .unwrap_or_else(|error| panic!("expected successful compilation, got:\n{error}"))
}

/// Instantiate the module with `env.write_int` / `env.write_chr` appending to
/// a buffer and invoke its exported `main`.
pub(crate) fn run_wasm(wasm: &[u8]) -> anyhow::Result<String> {
    let engine = Engine::default();
    let module = Module::new(&engine, wasm)?;
    let mut store = Store::new(&engine, HostOutput::default());
    let mut linker: Linker<HostOutput> = Linker::new(&engine);
    linker.func_wrap(
        "env",
        "write_int",
        |mut caller: Caller<'_, HostOutput>, value: i32| {
            caller.data_mut().buffer.push_str(&value.to_string());
        },
    )?;
    linker.func_wrap(
        "env",
        "write_chr",
        |mut caller: Caller<'_, HostOutput>, value: i32| {
            #[allow(clippy::cast_sign_loss)]
            if let Some(character) = char::from_u32(value as u32) {
                caller.data_mut().buffer.push(character);
            }
        },
    )?;
    let instance = linker.instantiate(&mut store, &module)?;
    let main = instance.get_typed_func::<(), ()>(&mut store, "main")?;
    main.call(&mut store, ())?;
    Ok(store.into_data().buffer)
}

/// Compile, validate, and execute; returns the captured host output.
pub(crate) fn run(source: &str) -> String {
    let wasm = compile_ok(source);
    wasmparser::validate(&wasm)
        .unwrap_or_else(|error| panic!("emitted module is invalid: {error}"));
    run_wasm(&wasm).unwrap_or_else(|error| panic!("execution failed: {error}"))
}
