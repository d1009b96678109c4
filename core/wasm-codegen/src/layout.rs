#![allow(clippy::cast_possible_truncation)]
//! Memory layout of aggregates in linear memory.
//!
//! Every value is one 4-byte word: scalars by value, structures and arrays by
//! pointer. Structure fields are laid out in declaration order at 4-byte
//! slots, so offsets are assigned once and never renumbered. An array is a
//! single allocation `{ i32 length, i32 buffer_ptr }` followed by its
//! payload, with the buffer pointer addressing the payload.

use muni_type_checker::typed_ast::TypedProgram;
use rustc_hash::FxHashMap;

use crate::errors::EmitError;

/// Size of every Muni value slot.
pub const WORD_SIZE: u32 = 4;
/// Array header: `{ i32 length, i32 buffer_ptr }`.
pub const ARRAY_HEADER_SIZE: u32 = 8;
pub const ARRAY_LENGTH_OFFSET: u32 = 0;
pub const ARRAY_BUFFER_OFFSET: u32 = 4;
/// Static data starts here; the low 16 bytes are reserved as a null sink.
pub const DATA_BASE_OFFSET: u32 = 16;
/// The bump allocator hands out 8-byte-aligned blocks.
pub const HEAP_ALIGNMENT: u32 = 8;
/// WebAssembly page size.
pub const PAGE_SIZE: u32 = 65536;

#[derive(Debug, Clone)]
pub struct StructLayout {
    pub size: u32,
    offsets: FxHashMap<String, u32>,
}

impl StructLayout {
    #[must_use]
    pub fn field_offset(&self, field: &str) -> Option<u32> {
        self.offsets.get(field).copied()
    }
}

#[derive(Debug, Default)]
pub struct Layouts {
    map: FxHashMap<String, StructLayout>,
}

impl Layouts {
    /// Compute the layout of every structure instantiation in the program.
    #[must_use]
    pub fn build(program: &TypedProgram) -> Layouts {
        let mut map = FxHashMap::default();
        for mono in &program.structs {
            let mut offsets = FxHashMap::default();
            for (index, (name, _)) in mono.fields.iter().enumerate() {
                offsets.insert(name.clone(), index as u32 * WORD_SIZE);
            }
            let size = mono.fields.len() as u32 * WORD_SIZE;
            map.insert(mono.mangled.clone(), StructLayout { size, offsets });
        }
        Layouts { map }
    }

    /// # Errors
    ///
    /// Returns [`EmitError::UnknownStruct`] when the structure was never
    /// instantiated; on well-typed input this is a compiler bug.
    pub fn get(&self, mangled: &str) -> Result<&StructLayout, EmitError> {
        self.map.get(mangled).ok_or_else(|| EmitError::UnknownStruct {
            name: mangled.to_string(),
        })
    }

    /// # Errors
    ///
    /// Returns [`EmitError::UnknownField`] for a field the resolver never
    /// registered; on well-typed input this is a compiler bug.
    pub fn field_offset(&self, mangled: &str, field: &str) -> Result<u32, EmitError> {
        self.get(mangled)?
            .field_offset(field)
            .ok_or_else(|| EmitError::UnknownField {
                name: mangled.to_string(),
                field: field.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn layouts_for(source: &str) -> Layouts {
        let program =
            muni_ast::imports::load_program_from_source(source, "test.mun", Path::new("."))
                .expect("source should load");
        let typed = muni_type_checker::resolve_program(&program).expect("source should resolve");
        Layouts::build(&typed)
    }

    #[test]
    fn fields_are_laid_out_in_declaration_order() {
        let layouts = layouts_for(
            "structure Point {
                int x;
                int y;
                int z;
            }
            void main() { Point p = Point(); p.x = 1; }",
        );
        let point = layouts.get("Point").unwrap();
        assert_eq!(point.field_offset("x"), Some(0));
        assert_eq!(point.field_offset("y"), Some(4));
        assert_eq!(point.field_offset("z"), Some(8));
        assert_eq!(point.size, 12);
    }

    #[test]
    fn pointer_fields_occupy_one_word() {
        let layouts = layouts_for(
            "structure Node {
                int value;
                Node next;
                array<int> items;
            }
            void main() { Node n = Node(); n.value = 1; }",
        );
        let node = layouts.get("Node").unwrap();
        assert_eq!(node.size, 12, "struct and array fields are pointers");
        assert_eq!(node.field_offset("next"), Some(4));
        assert_eq!(node.field_offset("items"), Some(8));
    }

    #[test]
    fn unknown_struct_is_an_emit_error() {
        let layouts = layouts_for("void main() { }");
        assert!(matches!(
            layouts.get("Ghost"),
            Err(EmitError::UnknownStruct { .. })
        ));
    }

    #[test]
    fn prelude_vec_layout_is_stable() {
        let layouts = layouts_for("void main() { print(\"x\"); }");
        let vec_char = layouts.get("vec$char").unwrap();
        assert_eq!(vec_char.field_offset("length"), Some(0));
        assert_eq!(vec_char.field_offset("data"), Some(4));
        assert_eq!(vec_char.size, 8);
    }
}
