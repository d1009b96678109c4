//! The fully-typed, monomorphic program produced by resolution.
//!
//! Every expression carries its [`ConcreteType`]; every callee is a mangled
//! name; every variable is a function-local slot index. Generic definitions
//! no longer exist at this level — the lowerer consumes this form directly.

use muni_ast::nodes::{BinaryOp, UnaryOp};
use rustc_hash::FxHashMap;

use crate::type_info::ConcreteType;

#[derive(Debug, Clone)]
pub struct TypedProgram {
    /// Host imports in first-occurrence order; these occupy the leading
    /// slots of the emitted function index space.
    pub host_imports: Vec<HostImport>,
    /// Top-level functions in declaration order, then instantiated
    /// constructors and methods in instantiation order.
    pub functions: Vec<TypedFunction>,
    /// Structure instantiations in the order the monomorphizer produced them.
    pub structs: Vec<MonoStruct>,
    /// Mangled structure name to index in `structs`.
    pub struct_index: FxHashMap<String, usize>,
}

impl TypedProgram {
    #[must_use]
    pub fn get_struct(&self, mangled: &str) -> Option<&MonoStruct> {
        self.struct_index.get(mangled).map(|&i| &self.structs[i])
    }
}

#[derive(Debug, Clone)]
pub struct HostImport {
    pub module: String,
    pub name: String,
    pub params: Vec<ConcreteType>,
    pub return_type: ConcreteType,
}

/// One structure instantiation with fully concrete field types.
/// Field order is declaration order and is never renumbered.
#[derive(Debug, Clone)]
pub struct MonoStruct {
    pub mangled: String,
    pub source_name: String,
    pub type_args: Vec<ConcreteType>,
    pub fields: Vec<(String, ConcreteType)>,
}

impl MonoStruct {
    #[must_use]
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(field, _)| field == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypedFunctionKind {
    /// Free function or static method: parameters only.
    Function,
    /// Instance method: local 0 is the receiver pointer.
    Method,
    /// Constructor: `this` is a non-parameter local the lowerer allocates
    /// before the body runs and returns afterwards.
    Constructor {
        struct_mangled: String,
        this_local: u32,
    },
}

#[derive(Debug, Clone)]
pub struct Local {
    pub name: String,
    pub ty: ConcreteType,
}

#[derive(Debug, Clone)]
pub struct TypedFunction {
    pub mangled: String,
    pub kind: TypedFunctionKind,
    /// Leading entries of `locals` that arrive as WASM parameters.
    pub n_params: usize,
    pub return_type: ConcreteType,
    /// All named locals, parameters first, indexed by slot.
    pub locals: Vec<Local>,
    pub body: Vec<TypedStmt>,
    /// Exported from the module (only `main`).
    pub exported: bool,
}

#[derive(Debug, Clone)]
pub enum TypedStmt {
    VarDecl {
        local: u32,
        value: Option<TypedExpr>,
    },
    Assign {
        target: AssignTarget,
        /// `Some` for compound assignment (`+=` carries `BinaryOp::Add`).
        op: Option<BinaryOp>,
        value: TypedExpr,
    },
    Expression(TypedExpr),
    If {
        condition: TypedExpr,
        then_branch: Vec<TypedStmt>,
        else_branch: Vec<TypedStmt>,
    },
    While {
        condition: TypedExpr,
        body: Vec<TypedStmt>,
    },
    Until {
        condition: TypedExpr,
        body: Vec<TypedStmt>,
    },
    DoWhile {
        body: Vec<TypedStmt>,
        condition: TypedExpr,
    },
    For {
        init: Vec<TypedStmt>,
        condition: Option<TypedExpr>,
        step: Vec<TypedStmt>,
        body: Vec<TypedStmt>,
    },
    Return(Option<TypedExpr>),
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub enum AssignTarget {
    Local(u32),
    Field {
        receiver: TypedExpr,
        struct_mangled: String,
        field: String,
    },
    Index {
        receiver: TypedExpr,
        index: TypedExpr,
    },
}

#[derive(Debug, Clone)]
pub struct TypedExpr {
    pub kind: TypedExprKind,
    pub ty: ConcreteType,
}

#[derive(Debug, Clone)]
pub enum TypedExprKind {
    Int(i32),
    Bool(bool),
    Char(i32),
    /// String literal; lowers to a `vec<char>` constructor invocation seeded
    /// from an interned data segment.
    Str(String),
    ArrayLiteral(Vec<TypedExpr>),
    /// `array<T>(n)`: runtime-sized zeroed array.
    ArrayNew { length: Box<TypedExpr> },
    Null,
    Local(u32),
    FieldGet {
        receiver: Box<TypedExpr>,
        struct_mangled: String,
        field: String,
    },
    ArrayLength { receiver: Box<TypedExpr> },
    Index {
        receiver: Box<TypedExpr>,
        index: Box<TypedExpr>,
    },
    /// Call to a compiled function by mangled name. For instance methods the
    /// receiver is the first argument.
    Call {
        mangled: String,
        arguments: Vec<TypedExpr>,
    },
    /// Structure construction. `ctor` is `None` for structures without a
    /// declared constructor (fields stay zeroed).
    CtorCall {
        struct_mangled: String,
        ctor: Option<String>,
        arguments: Vec<TypedExpr>,
    },
    HostCall {
        module: String,
        name: String,
        arguments: Vec<TypedExpr>,
    },
    Binary {
        op: BinaryOp,
        left: Box<TypedExpr>,
        right: Box<TypedExpr>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<TypedExpr>,
    },
    /// Scalar cast; a cast to `boolean` normalizes to 0/1.
    Cast { operand: Box<TypedExpr> },
}
