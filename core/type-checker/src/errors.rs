//! Diagnostics produced during name resolution, type checking, and
//! monomorphization. Every error carries the source [`Location`] it points at
//! and renders as `source:line:column: message`.

use std::fmt::{self, Display, Formatter};

use muni_ast::nodes::{BinaryOp, Location, UnaryOp};
use thiserror::Error;

use crate::type_info::ConcreteType;

/// Context for type mismatch errors to sharpen the message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeMismatchContext {
    Assignment,
    Return,
    VariableDefinition,
    ArrayElement,
    Argument { callee: String, index: usize },
}

impl Display for TypeMismatchContext {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            TypeMismatchContext::Assignment => write!(f, "in assignment"),
            TypeMismatchContext::Return => write!(f, "in return statement"),
            TypeMismatchContext::VariableDefinition => write!(f, "in variable definition"),
            TypeMismatchContext::ArrayElement => write!(f, "in array element"),
            TypeMismatchContext::Argument { callee, index } => {
                write!(f, "in argument {index} of `{callee}`")
            }
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum TypeCheckError {
    #[error("{location}: type mismatch {context}: expected `{expected}`, found `{found}`")]
    TypeMismatch {
        expected: ConcreteType,
        found: ConcreteType,
        context: TypeMismatchContext,
        location: Location,
    },

    #[error("{location}: unknown type `{name}`")]
    UnknownType { name: String, location: Location },

    #[error("{location}: `float` is not implemented")]
    FloatUnsupported { location: Location },

    #[error("{location}: use of undeclared identifier `{name}`")]
    UnknownIdentifier { name: String, location: Location },

    #[error("{location}: call to undefined function `{name}`")]
    UndefinedFunction { name: String, location: Location },

    #[error("{location}: duplicate declaration of `{name}`")]
    DuplicateDeclaration { name: String, location: Location },

    #[error("{location}: variable `{name}` is already declared in this scope")]
    DuplicateVariable { name: String, location: Location },

    #[error("{location}: `{name}` is not callable")]
    NotCallable { name: String, location: Location },

    #[error("{location}: `{name}` is not a structure")]
    NotAStructure { name: String, location: Location },

    #[error("{location}: {kind} `{name}` expects {expected} arguments, but {found} provided")]
    ArgumentCountMismatch {
        kind: &'static str,
        name: String,
        expected: usize,
        found: usize,
        location: Location,
    },

    #[error(
        "{location}: `{name}` expects {expected} type arguments, but {found} provided"
    )]
    TypeArgumentCountMismatch {
        name: String,
        expected: usize,
        found: usize,
        location: Location,
    },

    #[error(
        "{location}: operator `{operator}` cannot be applied to `{left}` and `{right}`"
    )]
    InvalidBinaryOperands {
        operator: BinaryOp,
        left: ConcreteType,
        right: ConcreteType,
        location: Location,
    },

    #[error("{location}: unary operator `{operator}` cannot be applied to `{found}`")]
    InvalidUnaryOperand {
        operator: UnaryOp,
        found: ConcreteType,
        location: Location,
    },

    #[error("{location}: condition must be `boolean`, found `{found}`")]
    ConditionNotBoolean {
        found: ConcreteType,
        location: Location,
    },

    #[error("{location}: field or method access requires a structure, found `{found}`")]
    ExpectedStructReceiver {
        found: ConcreteType,
        location: Location,
    },

    #[error("{location}: indexing requires an array, found `{found}`")]
    ExpectedArrayReceiver {
        found: ConcreteType,
        location: Location,
    },

    #[error("{location}: array index must be `int`, found `{found}`")]
    IndexNotInteger {
        found: ConcreteType,
        location: Location,
    },

    #[error("{location}: field `{field_name}` not found on `{struct_name}`")]
    FieldNotFound {
        struct_name: String,
        field_name: String,
        location: Location,
    },

    #[error("{location}: method `{method_name}` not found on `{struct_name}`")]
    MethodNotFound {
        struct_name: String,
        method_name: String,
        location: Location,
    },

    #[error(
        "{location}: method `{struct_name}.{method_name}` requires a receiver, call it on an instance"
    )]
    InstanceMethodCalledStatically {
        struct_name: String,
        method_name: String,
        location: Location,
    },

    #[error(
        "{location}: `{struct_name}.{method_name}` is static, call it on the structure"
    )]
    StaticMethodCalledOnInstance {
        struct_name: String,
        method_name: String,
        location: Location,
    },

    #[error("{location}: `{name}` has no constructor but arguments were provided")]
    MissingConstructor { name: String, location: Location },

    #[error("{location}: the length of an array cannot be assigned")]
    ArrayLengthImmutable { location: Location },

    #[error("{location}: `this` is only allowed inside methods and constructors")]
    ThisOutsideMethod { location: Location },

    #[error("{location}: `{keyword}` outside of a loop")]
    OutsideLoop {
        keyword: &'static str,
        location: Location,
    },

    #[error("{location}: `void` is not allowed here")]
    InvalidVoidType { location: Location },

    #[error("{location}: cannot infer a type for `null` here")]
    CannotInferNull { location: Location },

    #[error("{location}: cannot infer the element type of an empty array literal")]
    CannotInferArrayLiteral { location: Location },

    #[error("{location}: `null` is not assignable to `{expected}`")]
    NullNotAllowed {
        expected: ConcreteType,
        location: Location,
    },

    #[error("{location}: cannot cast `{from}` to `{to}`")]
    InvalidCast {
        from: ConcreteType,
        to: String,
        location: Location,
    },

    #[error("{location}: alias cycle involving `{name}`")]
    AliasCycle { name: String, location: Location },

    #[error(
        "{location}: monomorphization of `{name}` exceeds the instantiation depth bound of {bound}"
    )]
    MonomorphizationDiverges {
        name: String,
        bound: usize,
        location: Location,
    },
}

impl TypeCheckError {
    /// Returns the source location associated with this error.
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            TypeCheckError::TypeMismatch { location, .. }
            | TypeCheckError::UnknownType { location, .. }
            | TypeCheckError::FloatUnsupported { location }
            | TypeCheckError::UnknownIdentifier { location, .. }
            | TypeCheckError::UndefinedFunction { location, .. }
            | TypeCheckError::DuplicateDeclaration { location, .. }
            | TypeCheckError::DuplicateVariable { location, .. }
            | TypeCheckError::NotCallable { location, .. }
            | TypeCheckError::NotAStructure { location, .. }
            | TypeCheckError::ArgumentCountMismatch { location, .. }
            | TypeCheckError::TypeArgumentCountMismatch { location, .. }
            | TypeCheckError::InvalidBinaryOperands { location, .. }
            | TypeCheckError::InvalidUnaryOperand { location, .. }
            | TypeCheckError::ConditionNotBoolean { location, .. }
            | TypeCheckError::ExpectedStructReceiver { location, .. }
            | TypeCheckError::ExpectedArrayReceiver { location, .. }
            | TypeCheckError::IndexNotInteger { location, .. }
            | TypeCheckError::FieldNotFound { location, .. }
            | TypeCheckError::MethodNotFound { location, .. }
            | TypeCheckError::InstanceMethodCalledStatically { location, .. }
            | TypeCheckError::StaticMethodCalledOnInstance { location, .. }
            | TypeCheckError::MissingConstructor { location, .. }
            | TypeCheckError::ArrayLengthImmutable { location }
            | TypeCheckError::ThisOutsideMethod { location }
            | TypeCheckError::OutsideLoop { location, .. }
            | TypeCheckError::InvalidVoidType { location }
            | TypeCheckError::CannotInferNull { location }
            | TypeCheckError::CannotInferArrayLiteral { location }
            | TypeCheckError::NullNotAllowed { location, .. }
            | TypeCheckError::InvalidCast { location, .. }
            | TypeCheckError::AliasCycle { location, .. }
            | TypeCheckError::MonomorphizationDiverges { location, .. } => location,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_location() -> Location {
        Location {
            offset_start: 4,
            offset_end: 9,
            start_line: 3,
            start_column: 5,
            end_line: 3,
            end_column: 10,
            source: "main.mun".to_string(),
        }
    }

    #[test]
    fn display_type_mismatch() {
        let err = TypeCheckError::TypeMismatch {
            expected: ConcreteType::Int,
            found: ConcreteType::Boolean,
            context: TypeMismatchContext::Assignment,
            location: test_location(),
        };
        assert_eq!(
            err.to_string(),
            "main.mun:3:5: type mismatch in assignment: expected `int`, found `boolean`"
        );
    }

    #[test]
    fn display_argument_context() {
        let ctx = TypeMismatchContext::Argument {
            callee: "write_int".to_string(),
            index: 0,
        };
        assert_eq!(ctx.to_string(), "in argument 0 of `write_int`");
    }

    #[test]
    fn display_float_unsupported() {
        let err = TypeCheckError::FloatUnsupported {
            location: test_location(),
        };
        assert_eq!(err.to_string(), "main.mun:3:5: `float` is not implemented");
    }

    #[test]
    fn display_alias_cycle() {
        let err = TypeCheckError::AliasCycle {
            name: "A".to_string(),
            location: test_location(),
        };
        assert_eq!(err.to_string(), "main.mun:3:5: alias cycle involving `A`");
    }

    #[test]
    fn display_monomorphization_diverges() {
        let err = TypeCheckError::MonomorphizationDiverges {
            name: "Nest".to_string(),
            bound: 64,
            location: test_location(),
        };
        assert_eq!(
            err.to_string(),
            "main.mun:3:5: monomorphization of `Nest` exceeds the instantiation depth bound of 64"
        );
    }

    #[test]
    fn display_argument_count_mismatch() {
        let err = TypeCheckError::ArgumentCountMismatch {
            kind: "function",
            name: "add".to_string(),
            expected: 2,
            found: 3,
            location: test_location(),
        };
        assert_eq!(
            err.to_string(),
            "main.mun:3:5: function `add` expects 2 arguments, but 3 provided"
        );
    }

    #[test]
    fn display_field_not_found() {
        let err = TypeCheckError::FieldNotFound {
            struct_name: "Point".to_string(),
            field_name: "z".to_string(),
            location: test_location(),
        };
        assert_eq!(
            err.to_string(),
            "main.mun:3:5: field `z` not found on `Point`"
        );
    }

    #[test]
    fn error_location_accessor() {
        let location = test_location();
        let err = TypeCheckError::UnknownType {
            name: "Foo".to_string(),
            location: location.clone(),
        };
        assert_eq!(err.location(), &location);
    }
}
