//! Symbol table with nested scopes.
//!
//! Top-level declarations (functions, structures, aliases, host imports) live
//! in a single global frame; local variables live in a stack of scope frames.
//! Lookup walks the stack innermost-first. Shadowing across nested scopes is
//! permitted; redeclaration within one scope is rejected.

use rustc_hash::FxHashMap;

use crate::type_info::ConcreteType;

/// Signature of a top-level function, resolved before any body.
#[derive(Debug, Clone)]
pub(crate) struct FuncSig {
    pub(crate) name: String,
    pub(crate) params: Vec<ConcreteType>,
    pub(crate) return_type: ConcreteType,
}

/// A top-level declaration. Structures, aliases, and host imports are indices
/// into the resolver's declaration lists.
#[derive(Debug, Clone)]
pub(crate) enum GlobalSymbol {
    Function(FuncSig),
    Structure(usize),
    Alias(usize),
    HostImport(usize),
}

/// A local variable binding: the function-local slot index and its type.
#[derive(Debug, Clone)]
pub(crate) struct VarBinding {
    pub(crate) local: u32,
    pub(crate) ty: ConcreteType,
}

#[derive(Debug, Default)]
pub(crate) struct SymbolTable {
    globals: FxHashMap<String, GlobalSymbol>,
    scopes: Vec<FxHashMap<String, VarBinding>>,
}

impl SymbolTable {
    /// Register a top-level symbol. Returns `false` when the name is taken;
    /// all declaration kinds share one namespace.
    pub(crate) fn insert_global(&mut self, name: &str, symbol: GlobalSymbol) -> bool {
        if self.globals.contains_key(name) {
            return false;
        }
        self.globals.insert(name.to_string(), symbol);
        true
    }

    #[must_use = "this is a pure lookup with no side effects"]
    pub(crate) fn lookup_global(&self, name: &str) -> Option<&GlobalSymbol> {
        self.globals.get(name)
    }

    /// Swap a function placeholder for its resolved signature. Leaves the
    /// entry alone when the name was claimed by a different declaration kind.
    pub(crate) fn replace_function(&mut self, name: &str, sig: FuncSig) {
        if let Some(entry @ GlobalSymbol::Function(_)) = self.globals.get_mut(name) {
            *entry = GlobalSymbol::Function(sig);
        }
    }

    pub(crate) fn push_scope(&mut self) {
        self.scopes.push(FxHashMap::default());
    }

    pub(crate) fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    /// Remove every local scope; used between function bodies.
    pub(crate) fn reset_scopes(&mut self) {
        self.scopes.clear();
    }

    /// Bind a variable in the innermost scope. Returns `false` when the name
    /// is already bound in that scope (shadowing an outer scope is fine).
    pub(crate) fn declare_variable(&mut self, name: &str, local: u32, ty: ConcreteType) -> bool {
        let Some(scope) = self.scopes.last_mut() else {
            return false;
        };
        if scope.contains_key(name) {
            return false;
        }
        scope.insert(name.to_string(), VarBinding { local, ty });
        true
    }

    #[must_use = "this is a pure lookup with no side effects"]
    pub(crate) fn lookup_variable(&self, name: &str) -> Option<&VarBinding> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int() -> ConcreteType {
        ConcreteType::Int
    }

    mod globals {
        use super::*;

        #[test]
        fn duplicate_global_is_rejected() {
            let mut table = SymbolTable::default();
            assert!(table.insert_global("Point", GlobalSymbol::Structure(0)));
            assert!(!table.insert_global("Point", GlobalSymbol::Structure(1)));
        }

        #[test]
        fn namespace_is_shared_across_kinds() {
            let mut table = SymbolTable::default();
            assert!(table.insert_global("thing", GlobalSymbol::Alias(0)));
            assert!(!table.insert_global(
                "thing",
                GlobalSymbol::Function(FuncSig {
                    name: "thing".to_string(),
                    params: vec![],
                    return_type: ConcreteType::Void,
                })
            ));
        }
    }

    mod scoping {
        use super::*;

        #[test]
        fn lookup_walks_innermost_first() {
            let mut table = SymbolTable::default();
            table.push_scope();
            assert!(table.declare_variable("x", 0, int()));
            table.push_scope();
            assert!(table.declare_variable("x", 1, ConcreteType::Boolean));
            let binding = table.lookup_variable("x").unwrap();
            assert_eq!(binding.local, 1, "inner scope shadows outer");
            table.pop_scope();
            let binding = table.lookup_variable("x").unwrap();
            assert_eq!(binding.local, 0, "popping restores the outer binding");
        }

        #[test]
        fn redeclaration_in_same_scope_is_rejected() {
            let mut table = SymbolTable::default();
            table.push_scope();
            assert!(table.declare_variable("x", 0, int()));
            assert!(!table.declare_variable("x", 1, int()));
        }

        #[test]
        fn shadowing_in_nested_scope_is_permitted() {
            let mut table = SymbolTable::default();
            table.push_scope();
            assert!(table.declare_variable("x", 0, int()));
            table.push_scope();
            assert!(table.declare_variable("x", 1, int()));
        }

        #[test]
        fn binding_disappears_after_pop() {
            let mut table = SymbolTable::default();
            table.push_scope();
            table.push_scope();
            assert!(table.declare_variable("temp", 0, int()));
            table.pop_scope();
            assert!(table.lookup_variable("temp").is_none());
        }

        #[test]
        fn globals_survive_scope_reset() {
            let mut table = SymbolTable::default();
            table.insert_global("f", GlobalSymbol::Structure(0));
            table.push_scope();
            table.declare_variable("x", 0, int());
            table.reset_scopes();
            assert!(table.lookup_global("f").is_some());
            assert!(table.lookup_variable("x").is_none());
        }
    }
}
