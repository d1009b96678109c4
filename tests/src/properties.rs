//! Property-style tests over the emitted modules: determinism, validation,
//! import preservation, offset stability, and monomorphization closure.

use rustc_hash::FxHashSet;
use wasmparser::{Parser, Payload};

use crate::utils::{compile_ok, compile_wat};

const PROGRAMS: &[&str] = &[
    "void main() { write_int(42); }",
    "void main() { print(\"validate me\"); }",
    "void main() { array<int> a = [1, 2, 3]; write_int(a[0] + a.length); }",
    "structure P { int x; P(int v) { this.x = v; } }
     void main() { write_int(P(3).x); }",
    "void main() {
        int s = 0;
        for (int i = 0; i < 5; i += 1) { s += i; }
        while (s > 3) { s -= 1; }
        until (s == 0) { s -= 1; }
        write_int(s);
    }",
];

fn import_entries(wasm: &[u8]) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    for payload in Parser::new(0).parse_all(wasm) {
        if let Payload::ImportSection(reader) = payload.expect("module should parse") {
            for import in reader {
                let import = import.expect("import entry should parse");
                entries.push((import.module.to_string(), import.name.to_string()));
            }
        }
    }
    entries
}

#[test]
fn every_emitted_module_validates() {
    for source in PROGRAMS {
        let wasm = compile_ok(source);
        wasmparser::validate(&wasm)
            .unwrap_or_else(|error| panic!("invalid module for {source:?}: {error}"));
    }
}

#[test]
fn compilation_is_deterministic() {
    for source in PROGRAMS {
        assert_eq!(compile_ok(source), compile_ok(source));
        assert_eq!(compile_wat(source), compile_wat(source));
    }
}

#[test]
fn standard_imports_appear_exactly_once() {
    let wasm = compile_ok("void main() { write_int(1); write_chr(10); print(\"x\"); }");
    let entries = import_entries(&wasm);
    assert_eq!(
        entries,
        vec![
            ("env".to_string(), "write_int".to_string()),
            ("env".to_string(), "write_chr".to_string()),
        ]
    );
}

#[test]
fn declared_host_imports_are_preserved() {
    let wasm = compile_ok(
        "import host.magic(int, int) -> int;
         void main() { }",
    );
    let entries = import_entries(&wasm);
    assert!(entries.contains(&("host".to_string(), "magic".to_string())));
    let unique: FxHashSet<_> = entries.iter().collect();
    assert_eq!(unique.len(), entries.len(), "imports must not duplicate");
}

#[test]
fn duplicate_host_declarations_merge_into_one_entry() {
    let wasm = compile_ok(
        "import env.write_int(int) -> void;
         import env.write_int(int) -> void;
         void main() { }",
    );
    let count = import_entries(&wasm)
        .iter()
        .filter(|(_, name)| name == "write_int")
        .count();
    assert_eq!(count, 1);
}

#[test]
fn field_offsets_are_stable_across_uses() {
    let wat = compile_wat(
        "structure Triple { int a; int b; int c; }
         int read_c(Triple t) { return t.c; }
         void write_c(Triple t) { t.c = 9; }
         void main() {
            Triple t = Triple();
            write_c(t);
            write_int(read_c(t));
         }",
    );
    // Every access to field `c` uses the same 8-byte offset, once as a load
    // and once as a store.
    assert!(wat.contains("i32.load offset=8"));
    assert!(wat.contains("i32.store offset=8"));
    assert!(!wat.contains("offset=12"), "no access past the struct");
}

#[test]
fn monomorphization_closure_leaves_no_generic_placeholders() {
    let wat = compile_wat(
        "structure Box<T> {
            T value;

            Box(T first) { this.value = first; }
        }
        void main() {
            Box<int> a = Box<int>(1);
            Box<boolean> b = Box<boolean>(true);
            write_int(a.value);
        }",
    );
    assert!(wat.contains("$Box$int$$Box"));
    assert!(wat.contains("$Box$boolean$$Box"));
    // The unmangled generic name never appears as a bare identifier.
    assert!(!wat.contains("$Box "), "generic template must not be emitted");
    assert!(!wat.contains("$Box\n"));
}

#[test]
fn mangled_function_names_are_unique() {
    let wasm = compile_ok(
        "structure Box<T> {
            T value;

            Box(T first) { this.value = first; }

            T get() { return this.value; }
        }
        void main() {
            write_int(Box<int>(4).get());
            write_chr(Box<char>('z').get());
        }",
    );
    wasmparser::validate(&wasm).expect("module must validate");
}

#[test]
fn text_and_binary_describe_the_same_interface() {
    let source = "import host.magic(int) -> int;
        void main() { write_int(1); }";
    let wasm = compile_ok(source);
    let wat = compile_wat(source);
    for (module, name) in import_entries(&wasm) {
        assert!(
            wat.contains(&format!("(import \"{module}\" \"{name}\"")),
            "import {module}.{name} missing from the text form"
        );
    }
    assert!(wat.contains("(export \"main\""));
}

#[test]
fn heap_starts_past_the_data_segments() {
    let wat = compile_wat("void main() { print(\"0123\"); }");
    // Four characters intern as one 16-byte segment at offset 16; the heap
    // pointer starts at 32.
    assert!(wat.contains("(data (i32.const 16)"));
    assert!(wat.contains("(global $__heap_ptr (mut i32) (i32.const 32))"));
}

#[test]
fn ast_nodes_serialize_for_tooling() {
    let program = muni_ast::parser::parse_source("int one() { return 1; }", "test.mun")
        .expect("source should parse");
    let json = serde_json::to_string(&program.declarations[0]).expect("nodes serialize");
    assert!(json.contains("\"one\""));
}
