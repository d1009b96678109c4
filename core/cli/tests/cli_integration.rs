//! End-to-end tests for the `munic` binary.

use assert_cmd::Command;
use predicates::prelude::*;

fn munic() -> Command {
    Command::cargo_bin("munic").expect("munic binary should build")
}

#[test]
fn compile_produces_a_binary_module() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("answer.mun");
    let output = dir.path().join("answer.wasm");
    std::fs::write(&input, "void main() { write_int(42); }").unwrap();

    munic()
        .arg("compile")
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    let wasm = std::fs::read(&output).unwrap();
    assert_eq!(&wasm[0..4], b"\0asm");
}

#[test]
fn wat_suffix_selects_the_text_format() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("answer.mun");
    let output = dir.path().join("answer.wat");
    std::fs::write(&input, "void main() { write_int(42); }").unwrap();

    munic()
        .arg("compile")
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    let wat = std::fs::read_to_string(&output).unwrap();
    assert!(wat.starts_with("(module"));
    assert!(wat.contains("(export \"main\""));
}

#[test]
fn compile_then_run_prints_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("answer.mun");
    let output = dir.path().join("answer.wasm");
    std::fs::write(&input, "void main() { write_int(42); }").unwrap();

    munic()
        .arg("compile")
        .arg(&input)
        .arg(&output)
        .assert()
        .success();

    munic()
        .arg("run")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::eq("42"));
}

#[test]
fn alias_cycle_fails_without_writing_output() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("cycle.mun");
    let output = dir.path().join("cycle.wasm");
    std::fs::write(&input, "alias A = B;\nalias B = A;\nvoid main() { }").unwrap();

    munic()
        .arg("compile")
        .arg(&input)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("alias cycle"));

    assert!(!output.exists(), "no output file on failed compilation");
}

#[test]
fn diagnostics_name_file_line_and_column() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("broken.mun");
    let output = dir.path().join("broken.wasm");
    std::fs::write(&input, "void main() {\n    write_int(missing);\n}").unwrap();

    munic()
        .arg("compile")
        .arg(&input)
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("broken.mun:2:15"));
}

#[test]
fn missing_input_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    munic()
        .arg("compile")
        .arg(dir.path().join("nope.mun"))
        .arg(dir.path().join("out.wasm"))
        .assert()
        .failure();
}
