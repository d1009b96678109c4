//! Diagnostic tests: failing programs abort compilation with located,
//! human-readable errors and produce no output.

use crate::utils::compile;

fn error_for(source: &str) -> String {
    compile(source)
        .expect_err("compilation should fail")
        .to_string()
}

mod lexical {
    use super::*;

    #[test]
    fn unterminated_string() {
        let error = error_for("void main() { print(\"oops); }");
        assert!(error.contains("unterminated string literal"));
    }

    #[test]
    fn unknown_character() {
        let error = error_for("void main() { int x = 1 @ 2; }");
        assert!(error.contains("unknown character `@`"));
    }

    #[test]
    fn illegal_escape() {
        let error = error_for("void main() { print(\"\\z\"); }");
        assert!(error.contains("illegal escape sequence"));
    }
}

mod syntactic {
    use super::*;

    #[test]
    fn missing_semicolon() {
        let error = error_for("void main() { write_int(1) }");
        assert!(error.contains("expected `;`"));
    }

    #[test]
    fn error_points_at_file_line_and_column() {
        let error = error_for("void main() {\n    return 1 + ;\n}");
        assert!(error.contains("test.mun:2:"), "got: {error}");
    }

    #[test]
    fn integer_literal_out_of_range() {
        let error = error_for("void main() { write_int(2147483648); }");
        assert!(error.contains("out of range"));
    }
}

mod imports {
    use super::*;

    #[test]
    fn missing_file() {
        let error = error_for("import <no/such/file.mun>\nvoid main() { }");
        assert!(error.contains("imported file not found"));
    }

    #[test]
    fn conflicting_host_import_signature() {
        let error = error_for("import env.write_int(int, int) -> void;\nvoid main() { }");
        assert!(error.contains("conflicting host import `env.write_int`"));
    }
}

mod typing {
    use super::*;

    #[test]
    fn unknown_identifier_with_location() {
        let error = error_for("void main() { write_int(missing); }");
        assert!(error.contains("use of undeclared identifier `missing`"));
        assert!(error.contains("test.mun:1:"));
    }

    #[test]
    fn type_mismatch_names_both_types() {
        let error = error_for("void main() { int x = true; }");
        assert!(error.contains("expected `int`, found `boolean`"));
    }

    #[test]
    fn float_is_unimplemented() {
        let error = error_for("float half(float x) { return x; }\nvoid main() { }");
        assert!(error.contains("`float` is not implemented"));
    }

    #[test]
    fn alias_cycle() {
        let error = error_for("alias A = B;\nalias B = A;\nvoid main() { }");
        assert!(error.contains("alias cycle involving"));
    }

    #[test]
    fn monomorphization_divergence_names_the_bound() {
        let error = error_for(
            "structure Nest<T> {
                Nest<vec<T>> deeper;
                int value;
            }
            void main() {
                Nest<int> n = null;
            }",
        );
        assert!(error.contains("instantiation depth bound of 64"));
    }

    #[test]
    fn all_function_errors_are_listed() {
        let error = error_for(
            "void f() { write_int(one); }
             void g() { write_int(two); }
             void main() { write_int(three); }",
        );
        assert!(error.contains("one"));
        assert!(error.contains("two"));
        assert!(error.contains("three"));
        assert_eq!(error.lines().count(), 3);
    }
}
