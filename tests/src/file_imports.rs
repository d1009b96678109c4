//! File-import tests: programs split across files compile and run as one
//! merged module.

use std::fs;
use std::path::Path;

use crate::utils::run_wasm;

fn run_entry(dir: &Path, entry: &str) -> String {
    let wasm = muni::compile(&dir.join(entry))
        .unwrap_or_else(|error| panic!("expected successful compilation, got:\n{error}"));
    wasmparser::validate(&wasm).expect("emitted module must validate");
    run_wasm(&wasm).expect("execution should succeed")
}

#[test]
fn imported_functions_are_callable() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("math.mun"),
        "int triple(int n) { return 3 * n; }",
    )
    .unwrap();
    fs::write(
        dir.path().join("main.mun"),
        "import <math.mun>\nvoid main() { write_int(triple(14)); }",
    )
    .unwrap();
    assert_eq!(run_entry(dir.path(), "main.mun"), "42");
}

#[test]
fn imported_structures_are_usable() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("point.mun"),
        "structure Point {
            int x;
            int y;

            Point(int x0, int y0) {
                this.x = x0;
                this.y = y0;
            }
        }",
    )
    .unwrap();
    fs::write(
        dir.path().join("main.mun"),
        "import <point.mun>\nvoid main() { write_int(Point(5, 6).y); }",
    )
    .unwrap();
    assert_eq!(run_entry(dir.path(), "main.mun"), "6");
}

#[test]
fn transitive_imports_resolve_relative_to_each_file() {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir(dir.path().join("lib")).unwrap();
    fs::write(
        dir.path().join("lib/inner.mun"),
        "int inner_value() { return 7; }",
    )
    .unwrap();
    fs::write(
        dir.path().join("lib/outer.mun"),
        "import <inner.mun>\nint outer_value() { return inner_value() + 1; }",
    )
    .unwrap();
    fs::write(
        dir.path().join("main.mun"),
        "import <lib/outer.mun>\nvoid main() { write_int(outer_value()); }",
    )
    .unwrap();
    assert_eq!(run_entry(dir.path(), "main.mun"), "8");
}

#[test]
fn cyclic_imports_compile_and_run() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("a.mun"),
        "import <b.mun>\nint from_a() { return from_b() + 1; }",
    )
    .unwrap();
    fs::write(
        dir.path().join("b.mun"),
        "import <a.mun>\nint from_b() { return 1; }",
    )
    .unwrap();
    fs::write(
        dir.path().join("main.mun"),
        "import <a.mun>\nvoid main() { write_int(from_a()); }",
    )
    .unwrap();
    assert_eq!(run_entry(dir.path(), "main.mun"), "2");
}

#[test]
fn diamond_imports_declare_each_symbol_once() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(
        dir.path().join("shared.mun"),
        "int shared_value() { return 10; }",
    )
    .unwrap();
    fs::write(dir.path().join("left.mun"), "import <shared.mun>").unwrap();
    fs::write(dir.path().join("right.mun"), "import <shared.mun>").unwrap();
    fs::write(
        dir.path().join("main.mun"),
        "import <left.mun>\nimport <right.mun>\nvoid main() { write_int(shared_value()); }",
    )
    .unwrap();
    assert_eq!(run_entry(dir.path(), "main.mun"), "10");
}
