//! Monomorphization worklist.
//!
//! Each distinct `(structure, concrete type-argument tuple)` pair used by the
//! program is instantiated exactly once. Requests are deduplicated by mangled
//! name, so the worklist reaches a fixed point whenever the set of concrete
//! types reachable from the entry points is finite. A recursive generic that
//! instantiates itself with a strictly larger argument grows its depth with
//! every step and is cut off at [`INSTANTIATION_DEPTH_BOUND`].

use std::collections::VecDeque;

use muni_ast::nodes::Location;
use rustc_hash::FxHashSet;

use crate::errors::TypeCheckError;
use crate::type_info::{mangle_struct, ConcreteType};

/// Maximum instantiation chain length before monomorphization is declared
/// divergent.
pub const INSTANTIATION_DEPTH_BOUND: usize = 64;

#[derive(Debug, Clone)]
pub(crate) struct Instantiation {
    pub(crate) name: String,
    pub(crate) type_args: Vec<ConcreteType>,
    pub(crate) depth: usize,
}

#[derive(Debug, Default)]
pub(crate) struct Monomorphizer {
    queue: VecDeque<Instantiation>,
    requested: FxHashSet<String>,
}

impl Monomorphizer {
    /// Enqueue an instantiation unless it was already requested. Requests
    /// beyond the depth bound report [`TypeCheckError::MonomorphizationDiverges`]
    /// instead of growing the worklist.
    pub(crate) fn request(
        &mut self,
        name: &str,
        type_args: &[ConcreteType],
        depth: usize,
        location: &Location,
        errors: &mut Vec<TypeCheckError>,
    ) {
        let mangled = mangle_struct(name, type_args);
        if !self.requested.insert(mangled) {
            return;
        }
        if depth > INSTANTIATION_DEPTH_BOUND {
            errors.push(TypeCheckError::MonomorphizationDiverges {
                name: name.to_string(),
                bound: INSTANTIATION_DEPTH_BOUND,
                location: location.clone(),
            });
            return;
        }
        self.queue.push_back(Instantiation {
            name: name.to_string(),
            type_args: type_args.to_vec(),
            depth,
        });
    }

    pub(crate) fn next(&mut self) -> Option<Instantiation> {
        self.queue.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location::default()
    }

    #[test]
    fn duplicate_requests_are_merged() {
        let mut mono = Monomorphizer::default();
        let mut errors = Vec::new();
        mono.request("List", &[ConcreteType::Int], 0, &loc(), &mut errors);
        mono.request("List", &[ConcreteType::Int], 5, &loc(), &mut errors);
        assert!(mono.next().is_some());
        assert!(mono.next().is_none(), "second request must be deduplicated");
        assert!(errors.is_empty());
    }

    #[test]
    fn distinct_argument_tuples_are_distinct_requests() {
        let mut mono = Monomorphizer::default();
        let mut errors = Vec::new();
        mono.request("vec", &[ConcreteType::Int], 0, &loc(), &mut errors);
        mono.request("vec", &[ConcreteType::Char], 0, &loc(), &mut errors);
        assert_eq!(mono.next().unwrap().type_args, vec![ConcreteType::Int]);
        assert_eq!(mono.next().unwrap().type_args, vec![ConcreteType::Char]);
    }

    #[test]
    fn requests_drain_in_fifo_order() {
        let mut mono = Monomorphizer::default();
        let mut errors = Vec::new();
        mono.request("A", &[], 0, &loc(), &mut errors);
        mono.request("B", &[], 0, &loc(), &mut errors);
        assert_eq!(mono.next().unwrap().name, "A");
        assert_eq!(mono.next().unwrap().name, "B");
    }

    #[test]
    fn depth_beyond_bound_reports_divergence() {
        let mut mono = Monomorphizer::default();
        let mut errors = Vec::new();
        mono.request(
            "Nest",
            &[ConcreteType::Int],
            INSTANTIATION_DEPTH_BOUND + 1,
            &loc(),
            &mut errors,
        );
        assert!(mono.next().is_none());
        assert!(matches!(
            errors[0],
            TypeCheckError::MonomorphizationDiverges { bound: 64, .. }
        ));
    }
}
