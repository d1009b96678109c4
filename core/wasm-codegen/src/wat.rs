//! WebAssembly text format emitter.
//!
//! Renders an [`IrModule`] as a WAT module, one instruction per line. The
//! text form is for debugging; the binary emitter is the primary output and
//! both are produced from the same IR. Host imports are named `$module.name`
//! and user functions by their mangled names, which are valid WAT
//! identifiers.

use crate::ir::{FuncRef, IrFunction, IrModule, IrStmt, Operand, Rvalue};

/// Render the module as WebAssembly text.
#[must_use]
pub(crate) fn emit_wat(module: &IrModule) -> String {
    let mut emitter = WatEmitter {
        lines: Vec::new(),
        indent: 0,
    };
    emitter.emit_module(module);
    let mut text = emitter.lines.join("\n");
    text.push('\n');
    text
}

struct WatEmitter {
    lines: Vec<String>,
    indent: usize,
}

impl WatEmitter {
    fn push(&mut self, line: impl AsRef<str>) {
        let mut indented = "  ".repeat(self.indent);
        indented.push_str(line.as_ref());
        self.lines.push(indented);
    }

    fn emit_module(&mut self, module: &IrModule) {
        self.push("(module");
        self.indent += 1;

        for import in &module.imports {
            let params = if import.n_params > 0 {
                format!(" (param{})", " i32".repeat(import.n_params as usize))
            } else {
                String::new()
            };
            let result = if import.has_result { " (result i32)" } else { "" };
            self.push(format!(
                "(import \"{}\" \"{}\" (func ${}.{}{params}{result}))",
                import.module, import.name, import.module, import.name
            ));
        }

        self.push(format!("(memory {})", module.memory_pages));
        self.push(format!(
            "(global $__heap_ptr (mut i32) (i32.const {}))",
            module.heap_start
        ));

        for function in &module.functions {
            self.emit_function(function);
        }

        for function in &module.functions {
            if let Some(export) = &function.export {
                self.push(format!(
                    "(export \"{export}\" (func ${}))",
                    function.name
                ));
            }
        }

        for segment in &module.data {
            self.push(format!(
                "(data (i32.const {}) \"{}\")",
                segment.offset,
                escape_bytes(&segment.bytes)
            ));
        }

        self.indent -= 1;
        self.push(")");
    }

    fn emit_function(&mut self, function: &IrFunction) {
        let mut header = format!("(func ${}", function.name);
        if function.n_params > 0 {
            header.push_str(&format!(
                " (param{})",
                " i32".repeat(function.n_params as usize)
            ));
        }
        if function.has_result {
            header.push_str(" (result i32)");
        }
        self.push(header);
        self.indent += 1;
        let extra_locals = function.n_locals - function.n_params;
        if extra_locals > 0 {
            self.push(format!("(local{})", " i32".repeat(extra_locals as usize)));
        }
        self.emit_stmts(&function.body);
        self.indent -= 1;
        self.push(")");
    }

    fn emit_stmts(&mut self, statements: &[IrStmt]) {
        for statement in statements {
            self.emit_stmt(statement);
        }
    }

    fn emit_stmt(&mut self, statement: &IrStmt) {
        match statement {
            IrStmt::Assign { dest, value } => {
                self.emit_rvalue(value);
                self.push(format!("local.set {dest}"));
            }
            IrStmt::Store {
                addr,
                offset,
                value,
            } => {
                self.emit_operand(addr);
                self.emit_operand(value);
                self.push(store_instr(*offset));
            }
            IrStmt::Call { dest, func, args } => {
                for arg in args {
                    self.emit_operand(arg);
                }
                match func {
                    FuncRef::User(name) => self.push(format!("call ${name}")),
                    FuncRef::Host { module, name } => {
                        self.push(format!("call ${module}.{name}"));
                    }
                }
                if let Some(dest) = dest {
                    self.push(format!("local.set {dest}"));
                }
            }
            IrStmt::SetHeapPtr(operand) => {
                self.emit_operand(operand);
                self.push("global.set $__heap_ptr");
            }
            IrStmt::Return(operand) => {
                if let Some(operand) = operand {
                    self.emit_operand(operand);
                }
                self.push("return");
            }
            IrStmt::Block { label, body } => {
                self.push(format!("block $L{label}"));
                self.indent += 1;
                self.emit_stmts(body);
                self.indent -= 1;
                self.push("end");
            }
            IrStmt::Loop { label, body } => {
                self.push(format!("loop $L{label}"));
                self.indent += 1;
                self.emit_stmts(body);
                self.indent -= 1;
                self.push("end");
            }
            IrStmt::Br(label) => self.push(format!("br $L{label}")),
            IrStmt::BrIf { cond, label } => {
                self.emit_operand(cond);
                self.push(format!("br_if $L{label}"));
            }
            IrStmt::Unreachable => self.push("unreachable"),
        }
    }

    fn emit_rvalue(&mut self, rvalue: &Rvalue) {
        match rvalue {
            Rvalue::Operand(operand) => self.emit_operand(operand),
            Rvalue::Binary { op, left, right } => {
                self.emit_operand(left);
                self.emit_operand(right);
                self.push(op.mnemonic());
            }
            Rvalue::Eqz(operand) => {
                self.emit_operand(operand);
                self.push("i32.eqz");
            }
            Rvalue::Load { addr, offset } => {
                self.emit_operand(addr);
                self.push(load_instr(*offset));
            }
            Rvalue::HeapPtr => self.push("global.get $__heap_ptr"),
        }
    }

    fn emit_operand(&mut self, operand: &Operand) {
        match operand {
            Operand::Local(local) => self.push(format!("local.get {local}")),
            Operand::Const(value) => self.push(format!("i32.const {value}")),
        }
    }
}

fn load_instr(offset: u32) -> String {
    if offset == 0 {
        "i32.load".to_string()
    } else {
        format!("i32.load offset={offset}")
    }
}

fn store_instr(offset: u32) -> String {
    if offset == 0 {
        "i32.store".to_string()
    } else {
        format!("i32.store offset={offset}")
    }
}

fn escape_bytes(bytes: &[u8]) -> String {
    let mut escaped = String::with_capacity(bytes.len());
    for &byte in bytes {
        match byte {
            b'"' => escaped.push_str("\\\""),
            b'\\' => escaped.push_str("\\\\"),
            0x20..=0x7E => escaped.push(byte as char),
            _ => escaped.push_str(&format!("\\{byte:02x}")),
        }
    }
    escaped
}
