#![allow(clippy::cast_possible_wrap, clippy::cast_possible_truncation)]
//! Lowering from the typed program to IR.
//!
//! Every nested subexpression is decomposed into an assignment to a fresh
//! temporary, so IR operands are only locals and constants. Control flow is
//! rebuilt from structured blocks:
//!
//! - `if`/`else` becomes a labeled block plus branch-if;
//! - every loop form becomes `block exit { loop head { … } }` with an inner
//!   `block cont { body }` as the `continue` target;
//! - `&&` and `||` become branches, not arithmetic;
//! - array indexing performs an unsigned bounds check that traps.
//!
//! Heap allocation goes through the compiler-emitted `__alloc` bump
//! allocator. String literals call the emitted `__string_lit` helper, which
//! seeds a `vec<char>` from an interned data segment; constant array literals
//! go through `__array_lit` the same way. Identical literals share one
//! segment.
//!
//! Trivial constant folding happens here: arithmetic and comparisons over two
//! literal operands collapse to a constant, except where WebAssembly would
//! trap at runtime (division by zero, `INT_MIN / -1`).

use muni_ast::nodes::BinaryOp;
use muni_type_checker::typed_ast::{
    AssignTarget, TypedExpr, TypedExprKind, TypedFunction, TypedFunctionKind, TypedProgram,
    TypedStmt,
};
use rustc_hash::FxHashMap;

use crate::errors::EmitError;
use crate::ir::{
    DataSegment, FuncRef, IrFunction, IrHostImport, IrModule, IrOp, IrStmt, Operand, Rvalue,
};
use crate::layout::{
    Layouts, ARRAY_BUFFER_OFFSET, ARRAY_HEADER_SIZE, ARRAY_LENGTH_OFFSET, DATA_BASE_OFFSET,
    HEAP_ALIGNMENT, PAGE_SIZE, WORD_SIZE,
};

/// Name of the emitted bump allocator.
pub const ALLOC_FN: &str = "__alloc";
/// Name of the emitted string-literal constructor helper.
pub const STRING_LIT_FN: &str = "__string_lit";
/// Name of the emitted constant-array-literal helper.
pub const ARRAY_LIT_FN: &str = "__array_lit";

/// Lower a resolved program into a module IR.
///
/// # Errors
///
/// Returns an [`EmitError`] only on internal invariant violations; well-typed
/// input cannot fail.
pub(crate) fn lower_program(program: &TypedProgram) -> Result<IrModule, EmitError> {
    let layouts = Layouts::build(program);
    let mut lowerer = Lowerer {
        layouts,
        data: Vec::new(),
        interned: FxHashMap::default(),
        next_data_offset: DATA_BASE_OFFSET,
        needs_string_helper: false,
        needs_array_helper: false,
        n_locals: 0,
        next_label: 0,
        loop_stack: Vec::new(),
        ctor_this: None,
    };

    let mut functions = vec![lowerer.build_alloc()];
    for function in &program.functions {
        functions.push(lowerer.lower_function(function)?);
    }
    if lowerer.needs_string_helper {
        functions.push(lowerer.build_string_helper()?);
    }
    if lowerer.needs_array_helper {
        functions.push(lowerer.build_array_helper());
    }

    let heap_start = lowerer.next_data_offset.div_ceil(HEAP_ALIGNMENT) * HEAP_ALIGNMENT;
    let memory_pages = heap_start.div_ceil(PAGE_SIZE).max(1);
    let imports = program
        .host_imports
        .iter()
        .map(|import| IrHostImport {
            module: import.module.clone(),
            name: import.name.clone(),
            n_params: import.params.len() as u32,
            has_result: !import.return_type.is_void(),
        })
        .collect();

    Ok(IrModule {
        imports,
        functions,
        data: lowerer.data,
        heap_start,
        memory_pages,
    })
}

struct Lowerer {
    layouts: Layouts,
    data: Vec<DataSegment>,
    interned: FxHashMap<Vec<u8>, u32>,
    next_data_offset: u32,
    needs_string_helper: bool,
    needs_array_helper: bool,
    // Per-function state.
    n_locals: u32,
    next_label: u32,
    loop_stack: Vec<(u32, u32)>,
    ctor_this: Option<u32>,
}

impl Lowerer {
    // ---- per-function plumbing --------------------------------------------

    fn reset_function(&mut self, n_locals: u32) {
        self.n_locals = n_locals;
        self.next_label = 0;
        self.loop_stack.clear();
        self.ctor_this = None;
    }

    fn temp(&mut self) -> u32 {
        let index = self.n_locals;
        self.n_locals += 1;
        index
    }

    fn label(&mut self) -> u32 {
        let label = self.next_label;
        self.next_label += 1;
        label
    }

    /// Assign an rvalue to a fresh temporary and return its slot.
    fn assign(&mut self, out: &mut Vec<IrStmt>, value: Rvalue) -> u32 {
        let dest = self.temp();
        out.push(IrStmt::Assign { dest, value });
        dest
    }

    /// Materialize an operand into a local slot when it is a constant.
    fn force_local(&mut self, out: &mut Vec<IrStmt>, operand: Operand) -> u32 {
        match operand {
            Operand::Local(local) => local,
            Operand::Const(_) => self.assign(out, Rvalue::Operand(operand)),
        }
    }

    /// Intern a literal payload; identical content shares one data segment.
    fn intern(&mut self, bytes: &[u8]) -> u32 {
        if let Some(&offset) = self.interned.get(bytes) {
            return offset;
        }
        let offset = self.next_data_offset;
        self.interned.insert(bytes.to_vec(), offset);
        self.data.push(DataSegment {
            offset,
            bytes: bytes.to_vec(),
        });
        let end = offset + bytes.len() as u32;
        self.next_data_offset = end.div_ceil(WORD_SIZE) * WORD_SIZE;
        offset
    }

    // ---- functions ---------------------------------------------------------

    fn lower_function(&mut self, function: &TypedFunction) -> Result<IrFunction, EmitError> {
        self.reset_function(function.locals.len() as u32);
        self.ctor_this = match &function.kind {
            TypedFunctionKind::Constructor { this_local, .. } => Some(*this_local),
            _ => None,
        };

        let mut body = Vec::new();
        if let TypedFunctionKind::Constructor {
            struct_mangled,
            this_local,
        } = &function.kind
        {
            let size = self.layouts.get(struct_mangled)?.size;
            body.push(IrStmt::Call {
                dest: Some(*this_local),
                func: FuncRef::User(ALLOC_FN.to_string()),
                args: vec![Operand::Const(size as i32)],
            });
        }
        for statement in &function.body {
            self.lower_stmt(statement, &mut body)?;
        }

        let has_result;
        match &function.kind {
            TypedFunctionKind::Constructor { this_local, .. } => {
                body.push(IrStmt::Return(Some(Operand::Local(*this_local))));
                has_result = true;
            }
            _ => {
                has_result = !function.return_type.is_void();
                // A non-void body that can fall off the end traps instead of
                // producing an undefined value.
                if has_result && !matches!(body.last(), Some(IrStmt::Return(_))) {
                    body.push(IrStmt::Unreachable);
                }
            }
        }

        Ok(IrFunction {
            name: function.mangled.clone(),
            n_params: function.n_params as u32,
            n_locals: self.n_locals,
            has_result,
            body,
            export: function.exported.then(|| function.mangled.clone()),
        })
    }

    // ---- statements --------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn lower_stmt(&mut self, statement: &TypedStmt, out: &mut Vec<IrStmt>) -> Result<(), EmitError> {
        match statement {
            TypedStmt::VarDecl { local, value } => {
                if let Some(value) = value {
                    let operand = self.lower_expr(value, out)?;
                    out.push(IrStmt::Assign {
                        dest: *local,
                        value: Rvalue::Operand(operand),
                    });
                }
                Ok(())
            }
            TypedStmt::Assign { target, op, value } => match target {
                AssignTarget::Local(local) => {
                    let operand = self.lower_expr(value, out)?;
                    let rvalue = match op {
                        Some(op) => Rvalue::Binary {
                            op: arithmetic_op(*op),
                            left: Operand::Local(*local),
                            right: operand,
                        },
                        None => Rvalue::Operand(operand),
                    };
                    out.push(IrStmt::Assign {
                        dest: *local,
                        value: rvalue,
                    });
                    Ok(())
                }
                AssignTarget::Field {
                    receiver,
                    struct_mangled,
                    field,
                } => {
                    let base = self.lower_expr(receiver, out)?;
                    let base = self.force_local(out, base);
                    let offset = self.layouts.field_offset(struct_mangled, field)?;
                    let stored = match op {
                        Some(op) => {
                            let current = self.assign(
                                out,
                                Rvalue::Load {
                                    addr: Operand::Local(base),
                                    offset,
                                },
                            );
                            let operand = self.lower_expr(value, out)?;
                            let result = self.assign(
                                out,
                                Rvalue::Binary {
                                    op: arithmetic_op(*op),
                                    left: Operand::Local(current),
                                    right: operand,
                                },
                            );
                            Operand::Local(result)
                        }
                        None => self.lower_expr(value, out)?,
                    };
                    out.push(IrStmt::Store {
                        addr: Operand::Local(base),
                        offset,
                        value: stored,
                    });
                    Ok(())
                }
                AssignTarget::Index { receiver, index } => {
                    let addr = self.lower_element_addr(receiver, index, out)?;
                    let stored = match op {
                        Some(op) => {
                            let current = self.assign(
                                out,
                                Rvalue::Load {
                                    addr: Operand::Local(addr),
                                    offset: 0,
                                },
                            );
                            let operand = self.lower_expr(value, out)?;
                            let result = self.assign(
                                out,
                                Rvalue::Binary {
                                    op: arithmetic_op(*op),
                                    left: Operand::Local(current),
                                    right: operand,
                                },
                            );
                            Operand::Local(result)
                        }
                        None => self.lower_expr(value, out)?,
                    };
                    out.push(IrStmt::Store {
                        addr: Operand::Local(addr),
                        offset: 0,
                        value: stored,
                    });
                    Ok(())
                }
            },
            TypedStmt::Expression(expression) => {
                let _ = self.lower_expr(expression, out)?;
                Ok(())
            }
            TypedStmt::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.lower_expr(condition, out)?;
                let exit = self.label();
                if else_branch.is_empty() {
                    let mut inner = Vec::new();
                    let inverted = self.assign(&mut inner, Rvalue::Eqz(cond));
                    inner.push(IrStmt::BrIf {
                        cond: Operand::Local(inverted),
                        label: exit,
                    });
                    for statement in then_branch {
                        self.lower_stmt(statement, &mut inner)?;
                    }
                    out.push(IrStmt::Block {
                        label: exit,
                        body: inner,
                    });
                } else {
                    let else_label = self.label();
                    let mut then_body = Vec::new();
                    let inverted = self.assign(&mut then_body, Rvalue::Eqz(cond));
                    then_body.push(IrStmt::BrIf {
                        cond: Operand::Local(inverted),
                        label: else_label,
                    });
                    for statement in then_branch {
                        self.lower_stmt(statement, &mut then_body)?;
                    }
                    then_body.push(IrStmt::Br(exit));
                    let mut outer = vec![IrStmt::Block {
                        label: else_label,
                        body: then_body,
                    }];
                    for statement in else_branch {
                        self.lower_stmt(statement, &mut outer)?;
                    }
                    out.push(IrStmt::Block {
                        label: exit,
                        body: outer,
                    });
                }
                Ok(())
            }
            TypedStmt::While { condition, body } => {
                self.lower_loop(out, Some(condition), false, body, &[])
            }
            TypedStmt::Until { condition, body } => {
                self.lower_loop(out, Some(condition), true, body, &[])
            }
            TypedStmt::DoWhile { body, condition } => {
                // block exit { loop head { block cont { body }  br_if head (cond) } }
                let exit = self.label();
                let head = self.label();
                let cont = self.label();
                let mut cont_body = Vec::new();
                self.loop_stack.push((exit, cont));
                for statement in body {
                    self.lower_stmt(statement, &mut cont_body)?;
                }
                self.loop_stack.pop();
                let mut loop_body = vec![IrStmt::Block {
                    label: cont,
                    body: cont_body,
                }];
                let cond = self.lower_expr(condition, &mut loop_body)?;
                loop_body.push(IrStmt::BrIf {
                    cond,
                    label: head,
                });
                out.push(IrStmt::Block {
                    label: exit,
                    body: vec![IrStmt::Loop {
                        label: head,
                        body: loop_body,
                    }],
                });
                Ok(())
            }
            TypedStmt::For {
                init,
                condition,
                step,
                body,
            } => {
                for statement in init {
                    self.lower_stmt(statement, out)?;
                }
                self.lower_loop(out, condition.as_ref(), false, body, step)
            }
            TypedStmt::Return(value) => {
                if let Some(this) = self.ctor_this {
                    out.push(IrStmt::Return(Some(Operand::Local(this))));
                } else {
                    let operand = match value {
                        Some(value) => Some(self.lower_expr(value, out)?),
                        None => None,
                    };
                    out.push(IrStmt::Return(operand));
                }
                Ok(())
            }
            TypedStmt::Break => {
                let (exit, _) = self
                    .loop_stack
                    .last()
                    .copied()
                    .ok_or(EmitError::BrokenBranch { label: 0 })?;
                out.push(IrStmt::Br(exit));
                Ok(())
            }
            TypedStmt::Continue => {
                let (_, cont) = self
                    .loop_stack
                    .last()
                    .copied()
                    .ok_or(EmitError::BrokenBranch { label: 0 })?;
                out.push(IrStmt::Br(cont));
                Ok(())
            }
        }
    }

    /// Shared shape of `while`, `until`, and `for` loops:
    ///
    /// ```text
    /// block exit {
    ///   loop head {
    ///     [test; br_if exit]     // inverted unless `until`
    ///     block cont { body }    // `continue` branches here
    ///     step
    ///     br head
    ///   }
    /// }
    /// ```
    fn lower_loop(
        &mut self,
        out: &mut Vec<IrStmt>,
        condition: Option<&TypedExpr>,
        until: bool,
        body: &[TypedStmt],
        step: &[TypedStmt],
    ) -> Result<(), EmitError> {
        let exit = self.label();
        let head = self.label();
        let cont = self.label();

        let mut loop_body = Vec::new();
        if let Some(condition) = condition {
            let cond = self.lower_expr(condition, &mut loop_body)?;
            let test = if until {
                cond
            } else {
                Operand::Local(self.assign(&mut loop_body, Rvalue::Eqz(cond)))
            };
            loop_body.push(IrStmt::BrIf {
                cond: test,
                label: exit,
            });
        }
        let mut cont_body = Vec::new();
        self.loop_stack.push((exit, cont));
        for statement in body {
            self.lower_stmt(statement, &mut cont_body)?;
        }
        self.loop_stack.pop();
        loop_body.push(IrStmt::Block {
            label: cont,
            body: cont_body,
        });
        for statement in step {
            self.lower_stmt(statement, &mut loop_body)?;
        }
        loop_body.push(IrStmt::Br(head));

        out.push(IrStmt::Block {
            label: exit,
            body: vec![IrStmt::Loop {
                label: head,
                body: loop_body,
            }],
        });
        Ok(())
    }

    // ---- expressions -------------------------------------------------------

    /// Compute the address of `receiver[index]` with a bounds check that
    /// traps on out-of-range access.
    fn lower_element_addr(
        &mut self,
        receiver: &TypedExpr,
        index: &TypedExpr,
        out: &mut Vec<IrStmt>,
    ) -> Result<u32, EmitError> {
        let base = self.lower_expr(receiver, out)?;
        let base = self.force_local(out, base);
        let idx = self.lower_expr(index, out)?;
        let idx = self.force_local(out, idx);
        let length = self.assign(
            out,
            Rvalue::Load {
                addr: Operand::Local(base),
                offset: ARRAY_LENGTH_OFFSET,
            },
        );
        let in_bounds = self.assign(
            out,
            Rvalue::Binary {
                op: IrOp::LtU,
                left: Operand::Local(idx),
                right: Operand::Local(length),
            },
        );
        let ok = self.label();
        out.push(IrStmt::Block {
            label: ok,
            body: vec![
                IrStmt::BrIf {
                    cond: Operand::Local(in_bounds),
                    label: ok,
                },
                IrStmt::Unreachable,
            ],
        });
        let buffer = self.assign(
            out,
            Rvalue::Load {
                addr: Operand::Local(base),
                offset: ARRAY_BUFFER_OFFSET,
            },
        );
        let byte_offset = self.assign(
            out,
            Rvalue::Binary {
                op: IrOp::Mul,
                left: Operand::Local(idx),
                right: Operand::Const(WORD_SIZE as i32),
            },
        );
        let addr = self.assign(
            out,
            Rvalue::Binary {
                op: IrOp::Add,
                left: Operand::Local(buffer),
                right: Operand::Local(byte_offset),
            },
        );
        Ok(addr)
    }

    #[allow(clippy::too_many_lines)]
    fn lower_expr(
        &mut self,
        expression: &TypedExpr,
        out: &mut Vec<IrStmt>,
    ) -> Result<Operand, EmitError> {
        match &expression.kind {
            TypedExprKind::Int(value) => Ok(Operand::Const(*value)),
            TypedExprKind::Bool(value) => Ok(Operand::Const(i32::from(*value))),
            TypedExprKind::Char(value) => Ok(Operand::Const(*value)),
            TypedExprKind::Null => Ok(Operand::Const(0)),
            TypedExprKind::Local(local) => Ok(Operand::Local(*local)),
            TypedExprKind::Str(value) => {
                // Each element is one Unicode scalar value stored as a 4-byte
                // little-endian word, so a string element and the equivalent
                // `char` literal carry the same i32.
                let words: Vec<i32> = value.chars().map(|character| character as i32).collect();
                let mut bytes = Vec::with_capacity(words.len() * 4);
                for word in &words {
                    bytes.extend_from_slice(&word.to_le_bytes());
                }
                let length = words.len() as i32;
                let offset = self.intern(&bytes) as i32;
                self.needs_string_helper = true;
                let dest = self.temp();
                out.push(IrStmt::Call {
                    dest: Some(dest),
                    func: FuncRef::User(STRING_LIT_FN.to_string()),
                    args: vec![Operand::Const(offset), Operand::Const(length)],
                });
                Ok(Operand::Local(dest))
            }
            TypedExprKind::ArrayLiteral(elements) => {
                let constants: Option<Vec<i32>> =
                    elements.iter().map(const_literal_value).collect();
                if let Some(values) = constants {
                    if !values.is_empty() {
                        let mut bytes = Vec::with_capacity(values.len() * 4);
                        for value in &values {
                            bytes.extend_from_slice(&value.to_le_bytes());
                        }
                        let offset = self.intern(&bytes) as i32;
                        self.needs_array_helper = true;
                        let dest = self.temp();
                        out.push(IrStmt::Call {
                            dest: Some(dest),
                            func: FuncRef::User(ARRAY_LIT_FN.to_string()),
                            args: vec![
                                Operand::Const(offset),
                                Operand::Const(values.len() as i32),
                            ],
                        });
                        return Ok(Operand::Local(dest));
                    }
                }
                // Runtime construction for non-constant (or empty) literals.
                let length = elements.len() as i32;
                let total = ARRAY_HEADER_SIZE as i32 + length * WORD_SIZE as i32;
                let array = self.temp();
                out.push(IrStmt::Call {
                    dest: Some(array),
                    func: FuncRef::User(ALLOC_FN.to_string()),
                    args: vec![Operand::Const(total)],
                });
                out.push(IrStmt::Store {
                    addr: Operand::Local(array),
                    offset: ARRAY_LENGTH_OFFSET,
                    value: Operand::Const(length),
                });
                let payload = self.assign(
                    out,
                    Rvalue::Binary {
                        op: IrOp::Add,
                        left: Operand::Local(array),
                        right: Operand::Const(ARRAY_HEADER_SIZE as i32),
                    },
                );
                out.push(IrStmt::Store {
                    addr: Operand::Local(array),
                    offset: ARRAY_BUFFER_OFFSET,
                    value: Operand::Local(payload),
                });
                for (index, element) in elements.iter().enumerate() {
                    let value = self.lower_expr(element, out)?;
                    out.push(IrStmt::Store {
                        addr: Operand::Local(payload),
                        offset: index as u32 * WORD_SIZE,
                        value,
                    });
                }
                Ok(Operand::Local(array))
            }
            TypedExprKind::ArrayNew { length } => {
                let length = self.lower_expr(length, out)?;
                let length = self.force_local(out, length);
                let non_negative = self.assign(
                    out,
                    Rvalue::Binary {
                        op: IrOp::Ge,
                        left: Operand::Local(length),
                        right: Operand::Const(0),
                    },
                );
                let ok = self.label();
                out.push(IrStmt::Block {
                    label: ok,
                    body: vec![
                        IrStmt::BrIf {
                            cond: Operand::Local(non_negative),
                            label: ok,
                        },
                        IrStmt::Unreachable,
                    ],
                });
                let byte_length = self.assign(
                    out,
                    Rvalue::Binary {
                        op: IrOp::Mul,
                        left: Operand::Local(length),
                        right: Operand::Const(WORD_SIZE as i32),
                    },
                );
                let total = self.assign(
                    out,
                    Rvalue::Binary {
                        op: IrOp::Add,
                        left: Operand::Local(byte_length),
                        right: Operand::Const(ARRAY_HEADER_SIZE as i32),
                    },
                );
                let array = self.temp();
                out.push(IrStmt::Call {
                    dest: Some(array),
                    func: FuncRef::User(ALLOC_FN.to_string()),
                    args: vec![Operand::Local(total)],
                });
                out.push(IrStmt::Store {
                    addr: Operand::Local(array),
                    offset: ARRAY_LENGTH_OFFSET,
                    value: Operand::Local(length),
                });
                let payload = self.assign(
                    out,
                    Rvalue::Binary {
                        op: IrOp::Add,
                        left: Operand::Local(array),
                        right: Operand::Const(ARRAY_HEADER_SIZE as i32),
                    },
                );
                out.push(IrStmt::Store {
                    addr: Operand::Local(array),
                    offset: ARRAY_BUFFER_OFFSET,
                    value: Operand::Local(payload),
                });
                Ok(Operand::Local(array))
            }
            TypedExprKind::FieldGet {
                receiver,
                struct_mangled,
                field,
            } => {
                let base = self.lower_expr(receiver, out)?;
                let offset = self.layouts.field_offset(struct_mangled, field)?;
                let value = self.assign(out, Rvalue::Load { addr: base, offset });
                Ok(Operand::Local(value))
            }
            TypedExprKind::ArrayLength { receiver } => {
                let base = self.lower_expr(receiver, out)?;
                let value = self.assign(
                    out,
                    Rvalue::Load {
                        addr: base,
                        offset: ARRAY_LENGTH_OFFSET,
                    },
                );
                Ok(Operand::Local(value))
            }
            TypedExprKind::Index { receiver, index } => {
                let addr = self.lower_element_addr(receiver, index, out)?;
                let value = self.assign(
                    out,
                    Rvalue::Load {
                        addr: Operand::Local(addr),
                        offset: 0,
                    },
                );
                Ok(Operand::Local(value))
            }
            TypedExprKind::Call { mangled, arguments } => {
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.lower_expr(argument, out)?);
                }
                self.emit_call(out, FuncRef::User(mangled.clone()), args, expression)
            }
            TypedExprKind::CtorCall {
                struct_mangled,
                ctor,
                arguments,
            } => match ctor {
                Some(ctor) => {
                    let mut args = Vec::with_capacity(arguments.len());
                    for argument in arguments {
                        args.push(self.lower_expr(argument, out)?);
                    }
                    let dest = self.temp();
                    out.push(IrStmt::Call {
                        dest: Some(dest),
                        func: FuncRef::User(ctor.clone()),
                        args,
                    });
                    Ok(Operand::Local(dest))
                }
                None => {
                    // No constructor: allocate and leave the fields zeroed
                    // (fresh heap memory is always zero).
                    let size = self.layouts.get(struct_mangled)?.size;
                    let dest = self.temp();
                    out.push(IrStmt::Call {
                        dest: Some(dest),
                        func: FuncRef::User(ALLOC_FN.to_string()),
                        args: vec![Operand::Const(size as i32)],
                    });
                    Ok(Operand::Local(dest))
                }
            },
            TypedExprKind::HostCall {
                module,
                name,
                arguments,
            } => {
                let mut args = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    args.push(self.lower_expr(argument, out)?);
                }
                self.emit_call(
                    out,
                    FuncRef::Host {
                        module: module.clone(),
                        name: name.clone(),
                    },
                    args,
                    expression,
                )
            }
            TypedExprKind::Binary { op, left, right } => {
                self.lower_binary(*op, left, right, out)
            }
            TypedExprKind::Unary { op, operand } => {
                let value = self.lower_expr(operand, out)?;
                match op {
                    muni_ast::nodes::UnaryOp::Not => {
                        if let Operand::Const(constant) = value {
                            return Ok(Operand::Const(i32::from(constant == 0)));
                        }
                        Ok(Operand::Local(self.assign(out, Rvalue::Eqz(value))))
                    }
                    muni_ast::nodes::UnaryOp::Neg => {
                        if let Operand::Const(constant) = value {
                            return Ok(Operand::Const(constant.wrapping_neg()));
                        }
                        let negated = self.assign(
                            out,
                            Rvalue::Binary {
                                op: IrOp::Sub,
                                left: Operand::Const(0),
                                right: value,
                            },
                        );
                        Ok(Operand::Local(negated))
                    }
                }
            }
            TypedExprKind::Cast { operand } => {
                let value = self.lower_expr(operand, out)?;
                if expression.ty.is_boolean() && !operand.ty.is_boolean() {
                    if let Operand::Const(constant) = value {
                        return Ok(Operand::Const(i32::from(constant != 0)));
                    }
                    let normalized = self.assign(
                        out,
                        Rvalue::Binary {
                            op: IrOp::Ne,
                            left: value,
                            right: Operand::Const(0),
                        },
                    );
                    return Ok(Operand::Local(normalized));
                }
                Ok(value)
            }
        }
    }

    fn emit_call(
        &mut self,
        out: &mut Vec<IrStmt>,
        func: FuncRef,
        args: Vec<Operand>,
        expression: &TypedExpr,
    ) -> Result<Operand, EmitError> {
        if expression.ty.is_void() {
            out.push(IrStmt::Call {
                dest: None,
                func,
                args,
            });
            Ok(Operand::Const(0))
        } else {
            let dest = self.temp();
            out.push(IrStmt::Call {
                dest: Some(dest),
                func,
                args,
            });
            Ok(Operand::Local(dest))
        }
    }

    fn lower_binary(
        &mut self,
        op: BinaryOp,
        left: &TypedExpr,
        right: &TypedExpr,
        out: &mut Vec<IrStmt>,
    ) -> Result<Operand, EmitError> {
        match op {
            BinaryOp::And => {
                let first = self.lower_expr(left, out)?;
                let result = self.force_local(out, first);
                let done = self.label();
                let mut inner = Vec::new();
                let falsy = self.assign(&mut inner, Rvalue::Eqz(Operand::Local(result)));
                inner.push(IrStmt::BrIf {
                    cond: Operand::Local(falsy),
                    label: done,
                });
                let second = self.lower_expr(right, &mut inner)?;
                inner.push(IrStmt::Assign {
                    dest: result,
                    value: Rvalue::Operand(second),
                });
                out.push(IrStmt::Block {
                    label: done,
                    body: inner,
                });
                Ok(Operand::Local(result))
            }
            BinaryOp::Or => {
                let first = self.lower_expr(left, out)?;
                let result = self.force_local(out, first);
                let done = self.label();
                let mut inner = Vec::new();
                inner.push(IrStmt::BrIf {
                    cond: Operand::Local(result),
                    label: done,
                });
                let second = self.lower_expr(right, &mut inner)?;
                inner.push(IrStmt::Assign {
                    dest: result,
                    value: Rvalue::Operand(second),
                });
                out.push(IrStmt::Block {
                    label: done,
                    body: inner,
                });
                Ok(Operand::Local(result))
            }
            _ => {
                let lhs = self.lower_expr(left, out)?;
                let rhs = self.lower_expr(right, out)?;
                if let (Operand::Const(a), Operand::Const(b)) = (lhs, rhs) {
                    if let Some(folded) = fold_binary(op, a, b) {
                        return Ok(Operand::Const(folded));
                    }
                }
                let result = self.assign(
                    out,
                    Rvalue::Binary {
                        op: arithmetic_op(op),
                        left: lhs,
                        right: rhs,
                    },
                );
                Ok(Operand::Local(result))
            }
        }
    }

    // ---- emitted runtime helpers ------------------------------------------

    /// The bump allocator over linear memory: rounds the request up to the
    /// heap alignment, advances `__heap_ptr`, and returns the old value.
    fn build_alloc(&mut self) -> IrFunction {
        self.reset_function(1);
        let mut body = Vec::new();
        let padded = self.assign(
            &mut body,
            Rvalue::Binary {
                op: IrOp::Add,
                left: Operand::Local(0),
                right: Operand::Const(HEAP_ALIGNMENT as i32 - 1),
            },
        );
        let units = self.assign(
            &mut body,
            Rvalue::Binary {
                op: IrOp::Div,
                left: Operand::Local(padded),
                right: Operand::Const(HEAP_ALIGNMENT as i32),
            },
        );
        let aligned = self.assign(
            &mut body,
            Rvalue::Binary {
                op: IrOp::Mul,
                left: Operand::Local(units),
                right: Operand::Const(HEAP_ALIGNMENT as i32),
            },
        );
        let pointer = self.assign(&mut body, Rvalue::HeapPtr);
        let bumped = self.assign(
            &mut body,
            Rvalue::Binary {
                op: IrOp::Add,
                left: Operand::Local(pointer),
                right: Operand::Local(aligned),
            },
        );
        body.push(IrStmt::SetHeapPtr(Operand::Local(bumped)));
        body.push(IrStmt::Return(Some(Operand::Local(pointer))));
        IrFunction {
            name: ALLOC_FN.to_string(),
            n_params: 1,
            n_locals: self.n_locals,
            has_result: true,
            body,
            export: None,
        }
    }

    /// `__string_lit(data_ptr, length) -> vec<char>`: invokes the `vec<char>`
    /// constructor with the literal's length as capacity, then copies one
    /// 4-byte word per element out of the data segment.
    fn build_string_helper(&mut self) -> Result<IrFunction, EmitError> {
        self.reset_function(2);
        let length_offset = self.layouts.field_offset("vec$char", "length")?;
        let data_offset = self.layouts.field_offset("vec$char", "data")?;

        let mut body = Vec::new();
        let vec_ptr = self.temp();
        body.push(IrStmt::Call {
            dest: Some(vec_ptr),
            func: FuncRef::User("vec$char$$vec".to_string()),
            args: vec![Operand::Local(1)],
        });
        body.push(IrStmt::Store {
            addr: Operand::Local(vec_ptr),
            offset: length_offset,
            value: Operand::Local(1),
        });
        let buffer = self.assign(
            &mut body,
            Rvalue::Load {
                addr: Operand::Local(vec_ptr),
                offset: data_offset,
            },
        );
        let payload = self.assign(
            &mut body,
            Rvalue::Load {
                addr: Operand::Local(buffer),
                offset: ARRAY_BUFFER_OFFSET,
            },
        );
        let index = self.temp();
        body.push(IrStmt::Assign {
            dest: index,
            value: Rvalue::Operand(Operand::Const(0)),
        });

        let exit = self.label();
        let head = self.label();
        let mut loop_body = Vec::new();
        let done = self.assign(
            &mut loop_body,
            Rvalue::Binary {
                op: IrOp::Ge,
                left: Operand::Local(index),
                right: Operand::Local(1),
            },
        );
        loop_body.push(IrStmt::BrIf {
            cond: Operand::Local(done),
            label: exit,
        });
        let word_offset = self.assign(
            &mut loop_body,
            Rvalue::Binary {
                op: IrOp::Mul,
                left: Operand::Local(index),
                right: Operand::Const(WORD_SIZE as i32),
            },
        );
        let src = self.assign(
            &mut loop_body,
            Rvalue::Binary {
                op: IrOp::Add,
                left: Operand::Local(0),
                right: Operand::Local(word_offset),
            },
        );
        let word = self.assign(
            &mut loop_body,
            Rvalue::Load {
                addr: Operand::Local(src),
                offset: 0,
            },
        );
        let dst = self.assign(
            &mut loop_body,
            Rvalue::Binary {
                op: IrOp::Add,
                left: Operand::Local(payload),
                right: Operand::Local(word_offset),
            },
        );
        loop_body.push(IrStmt::Store {
            addr: Operand::Local(dst),
            offset: 0,
            value: Operand::Local(word),
        });
        loop_body.push(IrStmt::Assign {
            dest: index,
            value: Rvalue::Binary {
                op: IrOp::Add,
                left: Operand::Local(index),
                right: Operand::Const(1),
            },
        });
        loop_body.push(IrStmt::Br(head));
        body.push(IrStmt::Block {
            label: exit,
            body: vec![IrStmt::Loop {
                label: head,
                body: loop_body,
            }],
        });
        body.push(IrStmt::Return(Some(Operand::Local(vec_ptr))));

        Ok(IrFunction {
            name: STRING_LIT_FN.to_string(),
            n_params: 2,
            n_locals: self.n_locals,
            has_result: true,
            body,
            export: None,
        })
    }

    /// `__array_lit(data_ptr, length) -> array<T>`: allocates an array and
    /// copies the interned word payload into it, so identical literals can
    /// share a segment while remaining independently mutable.
    fn build_array_helper(&mut self) -> IrFunction {
        self.reset_function(2);
        let mut body = Vec::new();
        let byte_length = self.assign(
            &mut body,
            Rvalue::Binary {
                op: IrOp::Mul,
                left: Operand::Local(1),
                right: Operand::Const(WORD_SIZE as i32),
            },
        );
        let total = self.assign(
            &mut body,
            Rvalue::Binary {
                op: IrOp::Add,
                left: Operand::Local(byte_length),
                right: Operand::Const(ARRAY_HEADER_SIZE as i32),
            },
        );
        let array = self.temp();
        body.push(IrStmt::Call {
            dest: Some(array),
            func: FuncRef::User(ALLOC_FN.to_string()),
            args: vec![Operand::Local(total)],
        });
        body.push(IrStmt::Store {
            addr: Operand::Local(array),
            offset: ARRAY_LENGTH_OFFSET,
            value: Operand::Local(1),
        });
        let payload = self.assign(
            &mut body,
            Rvalue::Binary {
                op: IrOp::Add,
                left: Operand::Local(array),
                right: Operand::Const(ARRAY_HEADER_SIZE as i32),
            },
        );
        body.push(IrStmt::Store {
            addr: Operand::Local(array),
            offset: ARRAY_BUFFER_OFFSET,
            value: Operand::Local(payload),
        });
        let index = self.temp();
        body.push(IrStmt::Assign {
            dest: index,
            value: Rvalue::Operand(Operand::Const(0)),
        });

        let exit = self.label();
        let head = self.label();
        let mut loop_body = Vec::new();
        let done = self.assign(
            &mut loop_body,
            Rvalue::Binary {
                op: IrOp::Ge,
                left: Operand::Local(index),
                right: Operand::Local(1),
            },
        );
        loop_body.push(IrStmt::BrIf {
            cond: Operand::Local(done),
            label: exit,
        });
        let word_offset = self.assign(
            &mut loop_body,
            Rvalue::Binary {
                op: IrOp::Mul,
                left: Operand::Local(index),
                right: Operand::Const(WORD_SIZE as i32),
            },
        );
        let src = self.assign(
            &mut loop_body,
            Rvalue::Binary {
                op: IrOp::Add,
                left: Operand::Local(0),
                right: Operand::Local(word_offset),
            },
        );
        let word = self.assign(
            &mut loop_body,
            Rvalue::Load {
                addr: Operand::Local(src),
                offset: 0,
            },
        );
        let dst = self.assign(
            &mut loop_body,
            Rvalue::Binary {
                op: IrOp::Add,
                left: Operand::Local(payload),
                right: Operand::Local(word_offset),
            },
        );
        loop_body.push(IrStmt::Store {
            addr: Operand::Local(dst),
            offset: 0,
            value: Operand::Local(word),
        });
        loop_body.push(IrStmt::Assign {
            dest: index,
            value: Rvalue::Binary {
                op: IrOp::Add,
                left: Operand::Local(index),
                right: Operand::Const(1),
            },
        });
        loop_body.push(IrStmt::Br(head));
        body.push(IrStmt::Block {
            label: exit,
            body: vec![IrStmt::Loop {
                label: head,
                body: loop_body,
            }],
        });
        body.push(IrStmt::Return(Some(Operand::Local(array))));

        IrFunction {
            name: ARRAY_LIT_FN.to_string(),
            n_params: 2,
            n_locals: self.n_locals,
            has_result: true,
            body,
            export: None,
        }
    }
}

/// The IR operator for a non-short-circuit source operator.
fn arithmetic_op(op: BinaryOp) -> IrOp {
    match op {
        BinaryOp::Add => IrOp::Add,
        BinaryOp::Sub => IrOp::Sub,
        BinaryOp::Mul => IrOp::Mul,
        BinaryOp::Div => IrOp::Div,
        BinaryOp::Rem => IrOp::Rem,
        BinaryOp::Eq => IrOp::Eq,
        BinaryOp::Ne => IrOp::Ne,
        BinaryOp::Lt => IrOp::Lt,
        BinaryOp::Le => IrOp::Le,
        BinaryOp::Gt => IrOp::Gt,
        BinaryOp::Ge => IrOp::Ge,
        BinaryOp::And | BinaryOp::Or => {
            unreachable!("short-circuit operators are lowered to branches")
        }
    }
}

fn const_literal_value(expression: &TypedExpr) -> Option<i32> {
    match &expression.kind {
        TypedExprKind::Int(value) | TypedExprKind::Char(value) => Some(*value),
        TypedExprKind::Bool(value) => Some(i32::from(*value)),
        _ => None,
    }
}

/// Fold a binary operation over two constants. Operations that would trap at
/// runtime (division by zero, `INT_MIN / -1`) are left unfolded so the trap
/// is preserved.
fn fold_binary(op: BinaryOp, a: i32, b: i32) -> Option<i32> {
    match op {
        BinaryOp::Add => Some(a.wrapping_add(b)),
        BinaryOp::Sub => Some(a.wrapping_sub(b)),
        BinaryOp::Mul => Some(a.wrapping_mul(b)),
        BinaryOp::Div => a.checked_div(b),
        BinaryOp::Rem => a.checked_rem(b),
        BinaryOp::Eq => Some(i32::from(a == b)),
        BinaryOp::Ne => Some(i32::from(a != b)),
        BinaryOp::Lt => Some(i32::from(a < b)),
        BinaryOp::Le => Some(i32::from(a <= b)),
        BinaryOp::Gt => Some(i32::from(a > b)),
        BinaryOp::Ge => Some(i32::from(a >= b)),
        BinaryOp::And | BinaryOp::Or => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn lower(source: &str) -> IrModule {
        let program =
            muni_ast::imports::load_program_from_source(source, "test.mun", Path::new("."))
                .expect("source should load");
        let typed = muni_type_checker::resolve_program(&program).expect("source should resolve");
        lower_program(&typed).expect("lowering should succeed")
    }

    fn function<'m>(module: &'m IrModule, name: &str) -> &'m IrFunction {
        module
            .functions
            .iter()
            .find(|f| f.name == name)
            .unwrap_or_else(|| panic!("function `{name}` should exist"))
    }

    #[test]
    fn alloc_is_always_emitted_first() {
        let module = lower("void main() { }");
        assert_eq!(module.functions[0].name, ALLOC_FN);
        assert!(module.functions[0].has_result);
    }

    #[test]
    fn main_is_exported_under_its_own_name() {
        let module = lower("void main() { }");
        let main = function(&module, "main");
        assert_eq!(main.export.as_deref(), Some("main"));
        assert!(function(&module, ALLOC_FN).export.is_none());
    }

    #[test]
    fn string_literals_are_interned_by_content() {
        let module = lower(
            "void main() {
                print(\"same\");
                print(\"same\");
                print(\"different\");
            }",
        );
        assert_eq!(module.data.len(), 2, "identical literals share a segment");
        assert_eq!(module.data[0].offset, DATA_BASE_OFFSET);
        assert!(module.heap_start >= module.data[1].offset);
        assert_eq!(module.heap_start % HEAP_ALIGNMENT, 0);
    }

    #[test]
    fn string_helper_is_emitted_only_when_used() {
        let with = lower("void main() { print(\"x\"); }");
        assert!(with.functions.iter().any(|f| f.name == STRING_LIT_FN));
        let without = lower("void main() { write_int(1); }");
        assert!(!without.functions.iter().any(|f| f.name == STRING_LIT_FN));
    }

    #[test]
    fn constant_array_literal_becomes_a_data_segment() {
        let module = lower("void main() { array<int> a = [10, 20, 30]; write_int(a[1]); }");
        assert!(module.functions.iter().any(|f| f.name == ARRAY_LIT_FN));
        let segment = &module.data[0];
        assert_eq!(segment.bytes.len(), 12);
        assert_eq!(&segment.bytes[4..8], &20i32.to_le_bytes());
    }

    #[test]
    fn constant_folding_collapses_literal_arithmetic() {
        let module = lower("void main() { write_int(2 + 3 * 4); }");
        let main = function(&module, "main");
        let folded = main.body.iter().any(|stmt| {
            matches!(
                stmt,
                IrStmt::Call { args, .. } if args.contains(&Operand::Const(14))
            )
        });
        assert!(folded, "2 + 3 * 4 should fold to 14: {:#?}", main.body);
    }

    #[test]
    fn division_by_zero_is_not_folded() {
        let module = lower("void main() { write_int(1 / 0); }");
        let main = function(&module, "main");
        let has_div = fn_contains_op(&main.body, IrOp::Div);
        assert!(has_div, "the trapping division must survive folding");
    }

    #[test]
    fn non_void_fall_off_gets_unreachable() {
        let module = lower(
            "int f() {
                if (true) {
                    return 1;
                }
            }
            void main() { write_int(f()); }",
        );
        let f = function(&module, "f");
        assert!(matches!(f.body.last(), Some(IrStmt::Unreachable)));
    }

    #[test]
    fn host_imports_are_carried_in_order() {
        let module = lower("void main() { }");
        let names: Vec<_> = module.imports.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["write_int", "write_chr"]);
        assert_eq!(module.imports[0].module, "env");
    }

    #[test]
    fn constructors_allocate_their_struct() {
        let module = lower(
            "structure Point {
                int x;
                int y;

                Point(int x0) {
                    this.x = x0;
                }
            }
            void main() { Point p = Point(1); write_int(p.x); }",
        );
        let ctor = function(&module, "Point$$Point");
        let allocates = ctor.body.iter().any(|stmt| {
            matches!(
                stmt,
                IrStmt::Call { func: FuncRef::User(name), args, .. }
                    if name == ALLOC_FN && args.contains(&Operand::Const(8))
            )
        });
        assert!(allocates, "constructor must allocate 8 bytes: {:#?}", ctor.body);
        assert!(matches!(ctor.body.last(), Some(IrStmt::Return(Some(_)))));
    }

    fn fn_contains_op(stmts: &[IrStmt], op: IrOp) -> bool {
        stmts.iter().any(|stmt| match stmt {
            IrStmt::Assign {
                value: Rvalue::Binary { op: found, .. },
                ..
            } => *found == op,
            IrStmt::Block { body, .. } | IrStmt::Loop { body, .. } => fn_contains_op(body, op),
            _ => false,
        })
    }
}
