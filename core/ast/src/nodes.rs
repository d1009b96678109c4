//! AST node definitions for the Muni language.
//!
//! Every node struct carries a unique `id` and a source [`Location`]; both are
//! injected by the `ast_nodes!` macro. Node kinds are grouped into enums
//! (declarations, types, statements, expressions) so that every traversal in
//! the resolver and the lowerer is an exhaustive match.

use core::fmt;
use std::fmt::{Display, Formatter};

#[derive(Clone, PartialEq, Eq, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct Location {
    pub offset_start: u32,
    pub offset_end: u32,
    pub start_line: u32,
    pub start_column: u32,
    pub end_line: u32,
    pub end_column: u32,
    pub source: String,
}

impl Location {
    #[must_use]
    pub fn new(
        offset_start: u32,
        offset_end: u32,
        start_line: u32,
        start_column: u32,
        end_line: u32,
        end_column: u32,
        source: String,
    ) -> Self {
        Self {
            offset_start,
            offset_end,
            start_line,
            start_column,
            end_line,
            end_column,
            source,
        }
    }

    /// Merge two locations into one covering both, keeping the first source.
    #[must_use]
    pub fn span(start: &Location, end: &Location) -> Location {
        Location {
            offset_start: start.offset_start,
            offset_end: end.offset_end,
            start_line: start.start_line,
            start_column: start.start_column,
            end_line: end.end_line,
            end_column: end.end_column,
            source: start.source.clone(),
        }
    }
}

impl Display for Location {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.source, self.start_line, self.start_column
        )
    }
}

#[macro_export]
macro_rules! ast_node {
    (
        $(#[$outer:meta])*
        $struct_vis:vis struct $name:ident {
            $(
                $(#[$field_attr:meta])*
                $field_vis:vis $field_name:ident : $field_ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$outer])*
        #[derive(Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
        $struct_vis struct $name {
            pub id: u32,
            pub location: $crate::nodes::Location,
            $(
                $(#[$field_attr])*
                $field_vis $field_name : $field_ty,
            )*
        }
    };
}

macro_rules! ast_nodes {
    (
        $(
            $(#[$outer:meta])*
            $struct_vis:vis struct $name:ident { $($fields:tt)* }
        )+
    ) => {
        $(
            ast_node! {
                $(#[$outer])*
                $struct_vis struct $name { $($fields)* }
            }
        )+
    };
}

macro_rules! ast_enum {
    (
        $(#[$outer:meta])*
        $enum_vis:vis enum $name:ident {
            $(
                $(#[$arm_attr:meta])*
                $arm:ident ( $($tuple:tt)* ) ,
            )*
        }
    ) => {
        $(#[$outer])*
        #[derive(Clone, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
        $enum_vis enum $name {
            $(
                $(#[$arm_attr])*
                $arm ( $($tuple)* ) ,
            )*
        }
    }
}

macro_rules! ast_enums {
    (
        $(
            $(#[$outer:meta])*
            $enum_vis:vis enum $name:ident { $($arms:tt)* }
        )+
    ) => {
        $(
            ast_enum! {
                $(#[$outer])*
                $enum_vis enum $name { $($arms)* }
            }
        )+
    };
}

ast_enums! {

    pub enum Declaration {
        Function(FunctionDecl),
        Structure(StructureDecl),
        Alias(AliasDecl),
        HostImport(HostImportDecl),
        FileImport(FileImportDecl),
    }

    pub enum TypeExpr {
        Void(VoidType),
        Array(Box<ArrayType>),
        Named(NamedType),
    }

    pub enum Statement {
        Block(Block),
        VarDecl(VarDeclStatement),
        Assign(AssignStatement),
        Expression(ExpressionStatement),
        If(Box<IfStatement>),
        While(Box<WhileStatement>),
        Until(Box<UntilStatement>),
        DoWhile(Box<DoWhileStatement>),
        For(Box<ForStatement>),
        Return(ReturnStatement),
        Break(BreakStatement),
        Continue(ContinueStatement),
    }

    pub enum Expression {
        IntLiteral(IntLiteral),
        BoolLiteral(BoolLiteral),
        CharLiteral(CharLiteral),
        StringLiteral(StringLiteral),
        ArrayLiteral(ArrayLiteral),
        Null(NullLiteral),
        Identifier(Identifier),
        This(ThisExpression),
        FieldAccess(Box<FieldAccessExpression>),
        MethodCall(Box<MethodCallExpression>),
        Call(Box<CallExpression>),
        Constructor(Box<ConstructorExpression>),
        StaticCall(Box<StaticCallExpression>),
        Index(Box<IndexExpression>),
        Binary(Box<BinaryExpression>),
        Unary(Box<UnaryExpression>),
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    /// Source-level spelling, used in diagnostics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }

    #[must_use]
    pub const fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem
        )
    }

    #[must_use]
    pub const fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    #[must_use]
    pub const fn is_logical(self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

impl Display for BinaryOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum UnaryOp {
    Not,
    Neg,
}

impl Display for UnaryOp {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        match self {
            UnaryOp::Not => write!(f, "!"),
            UnaryOp::Neg => write!(f, "-"),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, serde::Serialize, serde::Deserialize)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    /// The arithmetic operator a compound assignment desugars to.
    #[must_use]
    pub const fn binary_op(self) -> Option<BinaryOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinaryOp::Add),
            AssignOp::SubAssign => Some(BinaryOp::Sub),
            AssignOp::MulAssign => Some(BinaryOp::Mul),
            AssignOp::DivAssign => Some(BinaryOp::Div),
        }
    }
}

ast_nodes! {

    pub struct SourceFile {
        pub declarations: Vec<Declaration>,
    }

    pub struct Identifier {
        pub name: String,
    }

    pub struct FunctionDecl {
        pub return_type: TypeExpr,
        pub name: Identifier,
        pub params: Vec<Parameter>,
        pub body: Block,
        pub is_static: bool,
    }

    pub struct Parameter {
        pub ty: TypeExpr,
        pub name: Identifier,
    }

    pub struct StructureDecl {
        pub name: Identifier,
        pub type_params: Vec<Identifier>,
        pub fields: Vec<FieldDecl>,
        pub constructor: Option<ConstructorDecl>,
        pub methods: Vec<FunctionDecl>,
    }

    pub struct FieldDecl {
        pub ty: TypeExpr,
        pub name: Identifier,
    }

    pub struct ConstructorDecl {
        pub params: Vec<Parameter>,
        pub body: Block,
    }

    pub struct AliasDecl {
        pub name: Identifier,
        pub type_params: Vec<Identifier>,
        pub body: TypeExpr,
    }

    pub struct HostImportDecl {
        pub module: Identifier,
        pub name: Identifier,
        pub params: Vec<TypeExpr>,
        pub return_type: TypeExpr,
    }

    pub struct FileImportDecl {
        pub path: String,
    }

    pub struct VoidType {}

    pub struct ArrayType {
        pub element: TypeExpr,
    }

    pub struct NamedType {
        pub name: Identifier,
        pub type_args: Vec<TypeExpr>,
    }

    pub struct Block {
        pub statements: Vec<Statement>,
    }

    pub struct VarDeclStatement {
        pub ty: TypeExpr,
        pub name: Identifier,
        pub value: Option<Expression>,
    }

    pub struct AssignStatement {
        pub target: Expression,
        pub op: AssignOp,
        pub value: Expression,
    }

    pub struct ExpressionStatement {
        pub expression: Expression,
    }

    pub struct IfStatement {
        pub condition: Expression,
        pub then_branch: Statement,
        pub else_branch: Option<Statement>,
    }

    pub struct WhileStatement {
        pub condition: Expression,
        pub body: Statement,
    }

    pub struct UntilStatement {
        pub condition: Expression,
        pub body: Statement,
    }

    pub struct DoWhileStatement {
        pub body: Statement,
        pub condition: Expression,
    }

    pub struct ForStatement {
        pub init: Option<Box<Statement>>,
        pub condition: Option<Expression>,
        pub step: Option<Box<Statement>>,
        pub body: Box<Statement>,
    }

    pub struct ReturnStatement {
        pub value: Option<Expression>,
    }

    pub struct BreakStatement {}

    pub struct ContinueStatement {}

    pub struct IntLiteral {
        pub value: i32,
    }

    pub struct BoolLiteral {
        pub value: bool,
    }

    pub struct CharLiteral {
        pub value: char,
    }

    pub struct StringLiteral {
        pub value: String,
    }

    pub struct ArrayLiteral {
        pub elements: Vec<Expression>,
    }

    pub struct NullLiteral {}

    pub struct ThisExpression {}

    pub struct FieldAccessExpression {
        pub receiver: Expression,
        pub field: Identifier,
    }

    pub struct MethodCallExpression {
        pub receiver: Expression,
        pub method: Identifier,
        pub arguments: Vec<Expression>,
    }

    pub struct CallExpression {
        pub callee: Identifier,
        pub arguments: Vec<Expression>,
    }

    pub struct ConstructorExpression {
        pub ty: TypeExpr,
        pub arguments: Vec<Expression>,
    }

    pub struct StaticCallExpression {
        pub ty: TypeExpr,
        pub method: Identifier,
        pub arguments: Vec<Expression>,
    }

    pub struct IndexExpression {
        pub receiver: Expression,
        pub index: Expression,
    }

    pub struct BinaryExpression {
        pub left: Expression,
        pub operator: BinaryOp,
        pub right: Expression,
    }

    pub struct UnaryExpression {
        pub operator: UnaryOp,
        pub operand: Expression,
    }
}

impl Identifier {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl Expression {
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            Expression::IntLiteral(n) => &n.location,
            Expression::BoolLiteral(n) => &n.location,
            Expression::CharLiteral(n) => &n.location,
            Expression::StringLiteral(n) => &n.location,
            Expression::ArrayLiteral(n) => &n.location,
            Expression::Null(n) => &n.location,
            Expression::Identifier(n) => &n.location,
            Expression::This(n) => &n.location,
            Expression::FieldAccess(n) => &n.location,
            Expression::MethodCall(n) => &n.location,
            Expression::Call(n) => &n.location,
            Expression::Constructor(n) => &n.location,
            Expression::StaticCall(n) => &n.location,
            Expression::Index(n) => &n.location,
            Expression::Binary(n) => &n.location,
            Expression::Unary(n) => &n.location,
        }
    }
}

impl Statement {
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            Statement::Block(n) => &n.location,
            Statement::VarDecl(n) => &n.location,
            Statement::Assign(n) => &n.location,
            Statement::Expression(n) => &n.location,
            Statement::If(n) => &n.location,
            Statement::While(n) => &n.location,
            Statement::Until(n) => &n.location,
            Statement::DoWhile(n) => &n.location,
            Statement::For(n) => &n.location,
            Statement::Return(n) => &n.location,
            Statement::Break(n) => &n.location,
            Statement::Continue(n) => &n.location,
        }
    }
}

impl TypeExpr {
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            TypeExpr::Void(n) => &n.location,
            TypeExpr::Array(n) => &n.location,
            TypeExpr::Named(n) => &n.location,
        }
    }
}

impl Declaration {
    #[must_use]
    pub fn location(&self) -> &Location {
        match self {
            Declaration::Function(n) => &n.location,
            Declaration::Structure(n) => &n.location,
            Declaration::Alias(n) => &n.location,
            Declaration::HostImport(n) => &n.location,
            Declaration::FileImport(n) => &n.location,
        }
    }

    /// The declared name, used for duplicate detection. File imports have none.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        match self {
            Declaration::Function(n) => Some(&n.name.name),
            Declaration::Structure(n) => Some(&n.name.name),
            Declaration::Alias(n) => Some(&n.name.name),
            Declaration::HostImport(n) => Some(&n.name.name),
            Declaration::FileImport(_) => None,
        }
    }
}
