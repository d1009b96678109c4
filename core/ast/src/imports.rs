//! Import resolution: file imports, host imports, and the standard prelude.
//!
//! A program is loaded from one entry file. The standard prelude is always
//! prepended, then the entry file's declarations are merged with those of
//! every transitively imported file. File imports are resolved relative to
//! the importing file and deduplicated by canonical absolute path; revisiting
//! a path (including through an import cycle) contributes nothing, which
//! makes inclusion idempotent.
//!
//! Host imports are collected in source order and deduplicated by
//! `(module, name)`. A duplicate with an identical signature is merged;
//! a conflicting signature is an [`ImportError`].

use std::path::{Path, PathBuf};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::errors::{ImportError, LoadError, SyntaxError};
use crate::nodes::{Declaration, HostImportDecl, Location, TypeExpr};
use crate::parser;
use crate::prelude;

/// A fully loaded program: the prelude plus the entry file and every file it
/// transitively imports, with file-import declarations already inlined and
/// host imports split out.
#[derive(Debug, Clone)]
pub struct Program {
    /// Functions, structures, and aliases in inclusion order.
    pub declarations: Vec<Declaration>,
    /// Host imports in first-occurrence order, deduplicated.
    pub host_imports: Vec<HostImportDecl>,
}

/// Load the program rooted at `entry`.
///
/// # Errors
///
/// Returns every syntax and import diagnostic collected across all files.
pub fn load_program(entry: &Path) -> Result<Program, Vec<LoadError>> {
    let mut loader = Loader::default();
    loader.include_prelude();
    let entry_location = Location {
        source: entry.display().to_string(),
        ..Location::default()
    };
    loader.include_file(entry, &entry_location);
    loader.finish()
}

/// Load a program from in-memory source, resolving its file imports relative
/// to `base_dir`. Used by tests and tooling that compile snippets.
///
/// # Errors
///
/// Returns every syntax and import diagnostic collected across all files.
pub fn load_program_from_source(
    source: &str,
    source_name: &str,
    base_dir: &Path,
) -> Result<Program, Vec<LoadError>> {
    let mut loader = Loader::default();
    loader.include_prelude();
    loader.include_source(source, source_name, base_dir);
    loader.finish()
}

#[derive(Default)]
struct Loader {
    visited: FxHashSet<PathBuf>,
    declarations: Vec<Declaration>,
    host_imports: Vec<HostImportDecl>,
    host_index: FxHashMap<(String, String), usize>,
    errors: Vec<LoadError>,
}

impl Loader {
    fn finish(self) -> Result<Program, Vec<LoadError>> {
        if self.errors.is_empty() {
            Ok(Program {
                declarations: self.declarations,
                host_imports: self.host_imports,
            })
        } else {
            Err(self.errors)
        }
    }

    fn include_prelude(&mut self) {
        let file = parser::parse_source(prelude::PRELUDE_SOURCE, prelude::PRELUDE_NAME)
            .expect("standard prelude is well-formed");
        // The prelude contains no file imports, so the base directory is moot.
        self.merge_declarations(file.declarations, Path::new("."));
    }

    fn include_file(&mut self, path: &Path, import_location: &Location) {
        let canonical = match path.canonicalize() {
            Ok(canonical) => canonical,
            Err(_) => {
                self.errors.push(
                    ImportError::FileNotFound {
                        path: path.to_path_buf(),
                        location: import_location.clone(),
                    }
                    .into(),
                );
                return;
            }
        };
        if !self.visited.insert(canonical.clone()) {
            return;
        }
        let source = match std::fs::read_to_string(&canonical) {
            Ok(source) => source,
            Err(error) => {
                self.errors.push(
                    ImportError::FileReadError {
                        path: canonical,
                        location: import_location.clone(),
                        source: error,
                    }
                    .into(),
                );
                return;
            }
        };
        let base_dir = canonical
            .parent()
            .map_or_else(|| PathBuf::from("."), Path::to_path_buf);
        self.include_source(&source, &canonical.display().to_string(), &base_dir);
    }

    fn include_source(&mut self, source: &str, source_name: &str, base_dir: &Path) {
        match parser::parse_source(source, source_name) {
            Ok(file) => self.merge_declarations(file.declarations, base_dir),
            Err(errors) => self
                .errors
                .extend(errors.into_iter().map(LoadError::Syntax)),
        }
    }

    fn merge_declarations(&mut self, declarations: Vec<Declaration>, base_dir: &Path) {
        for declaration in declarations {
            match declaration {
                Declaration::FileImport(import) => {
                    let target = base_dir.join(&import.path);
                    self.include_file(&target, &import.location);
                }
                Declaration::HostImport(import) => self.register_host_import(import),
                other => self.declarations.push(other),
            }
        }
    }

    fn register_host_import(&mut self, import: HostImportDecl) {
        let key = (import.module.name.clone(), import.name.name.clone());
        if let Some(&existing) = self.host_index.get(&key) {
            let known = &self.host_imports[existing];
            if !host_signatures_match(known, &import) {
                self.errors.push(
                    ImportError::ConflictingHostImport {
                        module: key.0,
                        name: key.1,
                        location: import.location.clone(),
                    }
                    .into(),
                );
            }
            return;
        }
        self.host_index.insert(key, self.host_imports.len());
        self.host_imports.push(import);
    }
}

fn host_signatures_match(a: &HostImportDecl, b: &HostImportDecl) -> bool {
    a.params.len() == b.params.len()
        && a.params
            .iter()
            .zip(&b.params)
            .all(|(x, y)| type_shape_eq(x, y))
        && type_shape_eq(&a.return_type, &b.return_type)
}

/// Structural type equality, ignoring node ids and locations.
fn type_shape_eq(a: &TypeExpr, b: &TypeExpr) -> bool {
    match (a, b) {
        (TypeExpr::Void(_), TypeExpr::Void(_)) => true,
        (TypeExpr::Array(x), TypeExpr::Array(y)) => type_shape_eq(&x.element, &y.element),
        (TypeExpr::Named(x), TypeExpr::Named(y)) => {
            x.name.name == y.name.name
                && x.type_args.len() == y.type_args.len()
                && x.type_args
                    .iter()
                    .zip(&y.type_args)
                    .all(|(p, q)| type_shape_eq(p, q))
        }
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn names(program: &Program) -> Vec<String> {
        program
            .declarations
            .iter()
            .filter_map(|d| d.name().map(str::to_string))
            .collect()
    }

    #[test]
    fn prelude_is_always_included() {
        let program =
            load_program_from_source("void main() { }", "main.mun", Path::new(".")).unwrap();
        let names = names(&program);
        assert!(names.contains(&"vec".to_string()));
        assert!(names.contains(&"string".to_string()));
        assert!(names.contains(&"print".to_string()));
        assert!(names.contains(&"main".to_string()));
        let hosts: Vec<_> = program
            .host_imports
            .iter()
            .map(|h| h.name.name.clone())
            .collect();
        assert_eq!(hosts, vec!["write_int", "write_chr"]);
    }

    #[test]
    fn file_import_merges_declarations() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("util.mun"), "int helper() { return 7; }").unwrap();
        let source = "import <util.mun>\nvoid main() { }";
        let program = load_program_from_source(source, "main.mun", dir.path()).unwrap();
        let names = names(&program);
        assert!(names.contains(&"helper".to_string()));
        assert!(names.contains(&"main".to_string()));
    }

    #[test]
    fn import_cycle_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("a.mun"),
            "import <b.mun>\nint from_a() { return 1; }",
        )
        .unwrap();
        fs::write(
            dir.path().join("b.mun"),
            "import <a.mun>\nint from_b() { return 2; }",
        )
        .unwrap();
        let source = "import <a.mun>\nvoid main() { }";
        let program = load_program_from_source(source, "main.mun", dir.path()).unwrap();
        let names = names(&program);
        assert_eq!(
            names.iter().filter(|n| *n == "from_a").count(),
            1,
            "cyclic import must include each file exactly once"
        );
        assert_eq!(names.iter().filter(|n| *n == "from_b").count(), 1);
    }

    #[test]
    fn diamond_import_includes_file_once() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("shared.mun"), "int shared() { return 1; }").unwrap();
        fs::write(dir.path().join("left.mun"), "import <shared.mun>").unwrap();
        fs::write(dir.path().join("right.mun"), "import <shared.mun>").unwrap();
        let source = "import <left.mun>\nimport <right.mun>\nvoid main() { }";
        let program = load_program_from_source(source, "main.mun", dir.path()).unwrap();
        let names = names(&program);
        assert_eq!(names.iter().filter(|n| *n == "shared").count(), 1);
    }

    #[test]
    fn missing_file_is_an_import_error() {
        let dir = tempfile::tempdir().unwrap();
        let source = "import <does_not_exist.mun>\nvoid main() { }";
        let errors = load_program_from_source(source, "main.mun", dir.path()).unwrap_err();
        assert!(matches!(
            errors[0],
            LoadError::Import(ImportError::FileNotFound { .. })
        ));
    }

    #[test]
    fn duplicate_host_import_with_same_signature_merges() {
        let source = "import env.write_int(int) -> void;\nvoid main() { }";
        let program = load_program_from_source(source, "main.mun", Path::new(".")).unwrap();
        let count = program
            .host_imports
            .iter()
            .filter(|h| h.name.name == "write_int")
            .count();
        assert_eq!(count, 1);
    }

    #[test]
    fn conflicting_host_import_is_rejected() {
        let source = "import env.write_int(int, int) -> void;\nvoid main() { }";
        let errors = load_program_from_source(source, "main.mun", Path::new(".")).unwrap_err();
        assert!(matches!(
            errors[0],
            LoadError::Import(ImportError::ConflictingHostImport { .. })
        ));
    }
}
