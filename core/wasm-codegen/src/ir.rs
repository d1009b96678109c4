//! The linear intermediate representation consumed by the emitters.
//!
//! IR is organized per function. Expressions are fully decomposed: every
//! operand is either a function-local slot or an i32 constant, and every
//! intermediate value has been assigned to a temporary by the lowerer.
//! Control flow is structured — labeled blocks and loops with branches that
//! always target an enclosing label — which maps one-to-one onto WebAssembly
//! control instructions.
//!
//! All value types are i32: scalars by value, structures and arrays by
//! pointer into linear memory.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrOp {
    Add,
    Sub,
    Mul,
    /// Signed division; division by zero traps at runtime.
    Div,
    Rem,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    /// Unsigned compare used by array bounds checks: a negative index wraps
    /// to a large unsigned value and fails the check.
    LtU,
}

impl IrOp {
    /// The WebAssembly instruction mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            IrOp::Add => "i32.add",
            IrOp::Sub => "i32.sub",
            IrOp::Mul => "i32.mul",
            IrOp::Div => "i32.div_s",
            IrOp::Rem => "i32.rem_s",
            IrOp::Eq => "i32.eq",
            IrOp::Ne => "i32.ne",
            IrOp::Lt => "i32.lt_s",
            IrOp::Le => "i32.le_s",
            IrOp::Gt => "i32.gt_s",
            IrOp::Ge => "i32.ge_s",
            IrOp::LtU => "i32.lt_u",
        }
    }

    /// The WebAssembly binary opcode.
    #[must_use]
    pub const fn opcode(self) -> u8 {
        match self {
            IrOp::Add => 0x6A,
            IrOp::Sub => 0x6B,
            IrOp::Mul => 0x6C,
            IrOp::Div => 0x6D,
            IrOp::Rem => 0x6F,
            IrOp::Eq => 0x46,
            IrOp::Ne => 0x47,
            IrOp::Lt => 0x48,
            IrOp::Le => 0x4C,
            IrOp::Gt => 0x4A,
            IrOp::Ge => 0x4E,
            IrOp::LtU => 0x49,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operand {
    Local(u32),
    Const(i32),
}

/// Callee reference. Host imports occupy the leading function indices in the
/// emitted module; user functions are identified by mangled name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FuncRef {
    User(String),
    Host { module: String, name: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rvalue {
    Operand(Operand),
    Binary {
        op: IrOp,
        left: Operand,
        right: Operand,
    },
    Eqz(Operand),
    /// 32-bit load from `addr + offset`.
    Load { addr: Operand, offset: u32 },
    /// Read of the `__heap_ptr` global.
    HeapPtr,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IrStmt {
    Assign {
        dest: u32,
        value: Rvalue,
    },
    /// 32-bit store to `addr + offset`.
    Store {
        addr: Operand,
        offset: u32,
        value: Operand,
    },
    /// Call with arguments; `dest` is `None` exactly when the callee returns
    /// nothing.
    Call {
        dest: Option<u32>,
        func: FuncRef,
        args: Vec<Operand>,
    },
    /// Write of the `__heap_ptr` global.
    SetHeapPtr(Operand),
    Return(Option<Operand>),
    Block { label: u32, body: Vec<IrStmt> },
    Loop { label: u32, body: Vec<IrStmt> },
    /// Branch to the end of the labeled block (or the start of the labeled
    /// loop). The target is always an enclosing label of this statement.
    Br(u32),
    BrIf { cond: Operand, label: u32 },
    Unreachable,
}

#[derive(Debug, Clone)]
pub struct IrFunction {
    pub name: String,
    pub n_params: u32,
    /// Total local count including parameters.
    pub n_locals: u32,
    pub has_result: bool,
    pub body: Vec<IrStmt>,
    pub export: Option<String>,
}

#[derive(Debug, Clone)]
pub struct IrHostImport {
    pub module: String,
    pub name: String,
    pub n_params: u32,
    pub has_result: bool,
}

#[derive(Debug, Clone)]
pub struct DataSegment {
    pub offset: u32,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct IrModule {
    pub imports: Vec<IrHostImport>,
    pub functions: Vec<IrFunction>,
    pub data: Vec<DataSegment>,
    /// First byte past the static data, 8-byte aligned; initial value of the
    /// `__heap_ptr` global.
    pub heap_start: u32,
    pub memory_pages: u32,
}
