#![allow(clippy::cast_possible_wrap)]
//! Name resolution and type checking.
//!
//! Resolution runs in phases over the loaded program:
//!
//! 1. Declaration collection: every top-level function, structure, alias, and
//!    host import is registered by name; duplicates are diagnosed.
//! 2. Alias validation: the alias reference graph is checked for cycles so a
//!    cyclic alias fails even when nothing uses it.
//! 3. Signature resolution: host import and function signatures are resolved
//!    to concrete types.
//! 4. Body resolution: every top-level function body is type checked with a
//!    scoped environment, producing typed statements over function-local
//!    slots. Structure instantiations discovered along the way are queued.
//! 5. Monomorphization: the worklist drains to a fixed point, resolving each
//!    instantiation's fields, constructor, and methods under its type
//!    parameter substitution.
//!
//! Every phase collects all the diagnostics it can; compilation fails if any
//! phase produced one.

use muni_ast::imports::Program;
use muni_ast::nodes::{
    AliasDecl, BinaryOp, Block, ConstructorDecl, Declaration, Expression, FunctionDecl,
    HostImportDecl, Identifier, Location, Parameter, Statement, StructureDecl, TypeExpr, UnaryOp,
};
use rustc_hash::FxHashMap;

use crate::errors::{TypeCheckError, TypeMismatchContext};
use crate::monomorphize::{Instantiation, Monomorphizer};
use crate::symbol_table::{FuncSig, GlobalSymbol, SymbolTable};
use crate::type_info::{mangle_method, mangle_struct, ConcreteType};
use crate::typed_ast::{
    AssignTarget, HostImport, Local, MonoStruct, TypedExpr, TypedExprKind, TypedFunction,
    TypedFunctionKind, TypedProgram, TypedStmt,
};

type TypeEnv = FxHashMap<String, ConcreteType>;

/// Resolve and type check a loaded program, monomorphizing every generic
/// structure instantiation it uses.
///
/// # Errors
///
/// Returns every diagnostic collected across all resolution phases.
pub fn resolve_program(program: &Program) -> Result<TypedProgram, Vec<TypeCheckError>> {
    Resolver::default().run(program)
}

#[derive(Default)]
struct Resolver {
    structures: Vec<StructureDecl>,
    aliases: Vec<AliasDecl>,
    host_decls: Vec<HostImportDecl>,
    table: SymbolTable,
    mono: Monomorphizer,
    errors: Vec<TypeCheckError>,
    typed_hosts: Vec<HostImport>,
    typed_functions: Vec<TypedFunction>,
    mono_structs: Vec<MonoStruct>,
    struct_index: FxHashMap<String, usize>,
}

/// Per-function resolution state.
struct FuncCtx<'e> {
    env: &'e TypeEnv,
    locals: Vec<Local>,
    this_local: Option<u32>,
    this_type: Option<ConcreteType>,
    return_type: ConcreteType,
    loop_depth: usize,
    inst_depth: usize,
}

impl FuncCtx<'_> {
    fn alloc_local(&mut self, name: &str, ty: ConcreteType) -> u32 {
        let index = u32::try_from(self.locals.len()).unwrap_or(u32::MAX);
        self.locals.push(Local {
            name: name.to_string(),
            ty,
        });
        index
    }
}

impl Resolver {
    fn run(mut self, program: &Program) -> Result<TypedProgram, Vec<TypeCheckError>> {
        let mut functions: Vec<FunctionDecl> = Vec::new();
        for declaration in &program.declarations {
            match declaration {
                Declaration::Function(decl) => functions.push(decl.clone()),
                Declaration::Structure(decl) => self.structures.push(decl.clone()),
                Declaration::Alias(decl) => self.aliases.push(decl.clone()),
                Declaration::HostImport(_) | Declaration::FileImport(_) => {}
            }
        }
        self.host_decls = program.host_imports.clone();

        self.collect_declarations(&functions);
        self.check_alias_cycles();
        self.resolve_host_signatures();
        self.resolve_function_signatures(&functions);
        for decl in &functions {
            self.resolve_top_function(decl);
        }
        while let Some(instantiation) = self.mono.next() {
            self.instantiate(&instantiation);
        }

        if self.errors.is_empty() {
            Ok(TypedProgram {
                host_imports: self.typed_hosts,
                functions: self.typed_functions,
                structs: self.mono_structs,
                struct_index: self.struct_index,
            })
        } else {
            Err(self.errors)
        }
    }

    // ---- phase 1: declaration collection -----------------------------------

    fn collect_declarations(&mut self, functions: &[FunctionDecl]) {
        for (index, decl) in self.structures.clone().iter().enumerate() {
            if !self
                .table
                .insert_global(&decl.name.name, GlobalSymbol::Structure(index))
            {
                self.errors.push(TypeCheckError::DuplicateDeclaration {
                    name: decl.name.name.clone(),
                    location: decl.location.clone(),
                });
            }
        }
        for (index, decl) in self.aliases.clone().iter().enumerate() {
            if !self
                .table
                .insert_global(&decl.name.name, GlobalSymbol::Alias(index))
            {
                self.errors.push(TypeCheckError::DuplicateDeclaration {
                    name: decl.name.name.clone(),
                    location: decl.location.clone(),
                });
            }
        }
        for (index, decl) in self.host_decls.clone().iter().enumerate() {
            if !self
                .table
                .insert_global(&decl.name.name, GlobalSymbol::HostImport(index))
            {
                self.errors.push(TypeCheckError::DuplicateDeclaration {
                    name: decl.name.name.clone(),
                    location: decl.location.clone(),
                });
            }
        }
        // Function names are claimed up front so signature resolution can
        // overwrite the placeholder with the real signature.
        for decl in functions {
            let placeholder = FuncSig {
                name: decl.name.name.clone(),
                params: Vec::new(),
                return_type: ConcreteType::Void,
            };
            if !self
                .table
                .insert_global(&decl.name.name, GlobalSymbol::Function(placeholder))
            {
                self.errors.push(TypeCheckError::DuplicateDeclaration {
                    name: decl.name.name.clone(),
                    location: decl.location.clone(),
                });
            }
        }
    }

    // ---- phase 2: alias cycle validation -----------------------------------

    fn check_alias_cycles(&mut self) {
        const WHITE: u8 = 0;
        const GRAY: u8 = 1;
        const BLACK: u8 = 2;

        fn referenced_aliases(resolver: &Resolver, ty: &TypeExpr, out: &mut Vec<String>) {
            match ty {
                TypeExpr::Void(_) => {}
                TypeExpr::Array(array) => referenced_aliases(resolver, &array.element, out),
                TypeExpr::Named(named) => {
                    if matches!(
                        resolver.table.lookup_global(&named.name.name),
                        Some(GlobalSymbol::Alias(_))
                    ) {
                        out.push(named.name.name.clone());
                    }
                    for arg in &named.type_args {
                        referenced_aliases(resolver, arg, out);
                    }
                }
            }
        }

        fn visit(
            resolver: &Resolver,
            name: &str,
            colors: &mut FxHashMap<String, u8>,
            cycles: &mut Vec<(String, Location)>,
        ) {
            match colors.get(name).copied().unwrap_or(WHITE) {
                BLACK => return,
                GRAY => {
                    let location = resolver
                        .alias_by_name(name)
                        .map(|a| a.location.clone())
                        .unwrap_or_default();
                    cycles.push((name.to_string(), location));
                    return;
                }
                _ => {}
            }
            colors.insert(name.to_string(), GRAY);
            if let Some(alias) = resolver.alias_by_name(name) {
                let mut deps = Vec::new();
                referenced_aliases(resolver, &alias.body, &mut deps);
                for dep in deps {
                    visit(resolver, &dep, colors, cycles);
                }
            }
            colors.insert(name.to_string(), BLACK);
        }

        let mut colors = FxHashMap::default();
        let mut cycles = Vec::new();
        let names: Vec<String> = self.aliases.iter().map(|a| a.name.name.clone()).collect();
        for name in names {
            visit(self, &name, &mut colors, &mut cycles);
        }
        for (name, location) in cycles {
            self.errors
                .push(TypeCheckError::AliasCycle { name, location });
        }
    }

    fn alias_by_name(&self, name: &str) -> Option<&AliasDecl> {
        match self.table.lookup_global(name) {
            Some(GlobalSymbol::Alias(index)) => Some(&self.aliases[*index]),
            _ => None,
        }
    }

    fn structure_template(&self, name: &str) -> Option<&StructureDecl> {
        match self.table.lookup_global(name) {
            Some(GlobalSymbol::Structure(index)) => Some(&self.structures[*index]),
            _ => None,
        }
    }

    // ---- phase 3: signatures ----------------------------------------------

    fn resolve_host_signatures(&mut self) {
        let empty = TypeEnv::default();
        for decl in self.host_decls.clone() {
            let params = decl
                .params
                .iter()
                .map(|ty| {
                    self.resolve_value_type(ty, &empty, 0)
                        .unwrap_or(ConcreteType::Int)
                })
                .collect();
            let return_type = self
                .resolve_type(&decl.return_type, &empty, 0)
                .unwrap_or(ConcreteType::Void);
            self.typed_hosts.push(HostImport {
                module: decl.module.name.clone(),
                name: decl.name.name.clone(),
                params,
                return_type,
            });
        }
    }

    fn resolve_function_signatures(&mut self, functions: &[FunctionDecl]) {
        let empty = TypeEnv::default();
        for decl in functions {
            let params = decl
                .params
                .iter()
                .map(|param| {
                    self.resolve_value_type(&param.ty, &empty, 0)
                        .unwrap_or(ConcreteType::Int)
                })
                .collect();
            let return_type = self
                .resolve_type(&decl.return_type, &empty, 0)
                .unwrap_or(ConcreteType::Void);
            let sig = FuncSig {
                name: decl.name.name.clone(),
                params,
                return_type,
            };
            // Overwrites the placeholder registered during collection.
            self.table.replace_function(&decl.name.name, sig);
        }
    }

    // ---- phase 4: top-level bodies -----------------------------------------

    fn resolve_top_function(&mut self, decl: &FunctionDecl) {
        let empty = TypeEnv::default();
        let return_type = self
            .resolve_type(&decl.return_type, &empty, 0)
            .unwrap_or(ConcreteType::Void);
        let exported = decl.name.name == "main";
        let function = self.resolve_callable(
            decl.name.name.clone(),
            TypedFunctionKind::Function,
            return_type,
            &decl.params,
            &decl.body,
            &empty,
            None,
            0,
            exported,
        );
        self.typed_functions.push(function);
    }

    // ---- phase 5: monomorphization -----------------------------------------

    fn instantiate(&mut self, instantiation: &Instantiation) {
        let Some(template) = self.structure_template(&instantiation.name).cloned() else {
            return;
        };
        let mangled = mangle_struct(&instantiation.name, &instantiation.type_args);
        if self.struct_index.contains_key(&mangled) {
            return;
        }
        let env = build_env(&template.type_params, &instantiation.type_args);
        let inner_depth = instantiation.depth + 1;

        let mut fields = Vec::new();
        for field in &template.fields {
            let ty = self
                .resolve_value_type(&field.ty, &env, inner_depth)
                .unwrap_or(ConcreteType::Int);
            fields.push((field.name.name.clone(), ty));
        }
        self.struct_index
            .insert(mangled.clone(), self.mono_structs.len());
        self.mono_structs.push(MonoStruct {
            mangled: mangled.clone(),
            source_name: instantiation.name.clone(),
            type_args: instantiation.type_args.clone(),
            fields,
        });

        let this_type = ConcreteType::Struct {
            name: instantiation.name.clone(),
            type_args: instantiation.type_args.clone(),
        };

        if let Some(ctor) = &template.constructor {
            let function = self.resolve_constructor(&mangled, &template, ctor, &env, inner_depth);
            self.typed_functions.push(function);
        }
        for method in template.methods.clone() {
            let return_type = self
                .resolve_type(&method.return_type, &env, inner_depth)
                .unwrap_or(ConcreteType::Void);
            let kind = if method.is_static {
                TypedFunctionKind::Function
            } else {
                TypedFunctionKind::Method
            };
            let this = if method.is_static {
                None
            } else {
                Some(this_type.clone())
            };
            let function = self.resolve_callable(
                mangle_method(&mangled, &method.name.name),
                kind,
                return_type,
                &method.params,
                &method.body,
                &env,
                this,
                inner_depth,
                false,
            );
            self.typed_functions.push(function);
        }
    }

    fn resolve_constructor(
        &mut self,
        struct_mangled: &str,
        template: &StructureDecl,
        ctor: &ConstructorDecl,
        env: &TypeEnv,
        inst_depth: usize,
    ) -> TypedFunction {
        let this_type = ConcreteType::Struct {
            name: template.name.name.clone(),
            type_args: template
                .type_params
                .iter()
                .map(|p| env[&p.name].clone())
                .collect(),
        };
        let this_local = u32::try_from(ctor.params.len()).unwrap_or(u32::MAX);
        let mut function = self.resolve_callable(
            mangle_method(struct_mangled, &template.name.name),
            TypedFunctionKind::Constructor {
                struct_mangled: struct_mangled.to_string(),
                this_local,
            },
            ConcreteType::Void,
            &ctor.params,
            &ctor.body,
            env,
            Some(this_type.clone()),
            inst_depth,
            false,
        );
        // The constructor returns the receiver pointer it allocated.
        function.return_type = this_type;
        function
    }

    // ---- callable bodies ---------------------------------------------------

    #[allow(clippy::too_many_arguments)]
    fn resolve_callable(
        &mut self,
        mangled: String,
        kind: TypedFunctionKind,
        return_type: ConcreteType,
        params: &[Parameter],
        body: &Block,
        env: &TypeEnv,
        this_type: Option<ConcreteType>,
        inst_depth: usize,
        exported: bool,
    ) -> TypedFunction {
        let mut ctx = FuncCtx {
            env,
            locals: Vec::new(),
            this_local: None,
            this_type,
            return_type: if matches!(kind, TypedFunctionKind::Constructor { .. }) {
                ConcreteType::Void
            } else {
                return_type.clone()
            },
            loop_depth: 0,
            inst_depth,
        };

        self.table.reset_scopes();
        self.table.push_scope();

        let mut n_params = params.len();
        if matches!(kind, TypedFunctionKind::Method) {
            let this_ty = ctx.this_type.clone().unwrap_or(ConcreteType::Int);
            ctx.this_local = Some(ctx.alloc_local("this", this_ty));
            n_params += 1;
        }
        for param in params {
            let ty = self
                .resolve_value_type(&param.ty, env, inst_depth)
                .unwrap_or(ConcreteType::Int);
            let local = ctx.alloc_local(&param.name.name, ty.clone());
            if !self.table.declare_variable(&param.name.name, local, ty) {
                self.errors.push(TypeCheckError::DuplicateVariable {
                    name: param.name.name.clone(),
                    location: param.location.clone(),
                });
            }
        }
        if let TypedFunctionKind::Constructor { .. } = kind {
            let this_ty = ctx.this_type.clone().unwrap_or(ConcreteType::Int);
            ctx.this_local = Some(ctx.alloc_local("this", this_ty));
        }

        let mut statements = Vec::new();
        for statement in &body.statements {
            self.resolve_stmt_into(statement, &mut ctx, &mut statements);
        }
        self.table.pop_scope();

        TypedFunction {
            mangled,
            kind,
            n_params,
            return_type,
            locals: ctx.locals,
            body: statements,
            exported,
        }
    }

    #[allow(clippy::too_many_lines)]
    fn resolve_stmt_into(
        &mut self,
        statement: &Statement,
        ctx: &mut FuncCtx,
        out: &mut Vec<TypedStmt>,
    ) {
        match statement {
            Statement::Block(block) => {
                self.table.push_scope();
                for inner in &block.statements {
                    self.resolve_stmt_into(inner, ctx, out);
                }
                self.table.pop_scope();
            }
            Statement::VarDecl(decl) => {
                let ty = match self.resolve_value_type(&decl.ty, ctx.env, ctx.inst_depth) {
                    Some(ty) => ty,
                    None => ConcreteType::Int,
                };
                let value = decl.value.as_ref().and_then(|value| {
                    let typed = self.resolve_expr(value, Some(&ty), ctx)?;
                    self.check_assignable(
                        &ty,
                        &typed,
                        TypeMismatchContext::VariableDefinition,
                        value.location(),
                    );
                    Some(typed)
                });
                let local = ctx.alloc_local(&decl.name.name, ty.clone());
                if !self.table.declare_variable(&decl.name.name, local, ty) {
                    self.errors.push(TypeCheckError::DuplicateVariable {
                        name: decl.name.name.clone(),
                        location: decl.location.clone(),
                    });
                }
                out.push(TypedStmt::VarDecl { local, value });
            }
            Statement::Assign(assign) => {
                let Some((target, target_ty)) = self.resolve_assign_target(&assign.target, ctx)
                else {
                    return;
                };
                let op = assign.op.binary_op();
                if op.is_some() && !target_ty.is_integer() {
                    self.errors.push(TypeCheckError::TypeMismatch {
                        expected: ConcreteType::Int,
                        found: target_ty.clone(),
                        context: TypeMismatchContext::Assignment,
                        location: assign.location.clone(),
                    });
                }
                let Some(value) = self.resolve_expr(&assign.value, Some(&target_ty), ctx) else {
                    return;
                };
                if op.is_some() {
                    if !value.ty.is_integer() {
                        self.errors.push(TypeCheckError::TypeMismatch {
                            expected: ConcreteType::Int,
                            found: value.ty.clone(),
                            context: TypeMismatchContext::Assignment,
                            location: assign.value.location().clone(),
                        });
                    }
                } else {
                    self.check_assignable(
                        &target_ty,
                        &value,
                        TypeMismatchContext::Assignment,
                        assign.value.location(),
                    );
                }
                out.push(TypedStmt::Assign { target, op, value });
            }
            Statement::Expression(stmt) => {
                if let Some(expression) = self.resolve_expr(&stmt.expression, None, ctx) {
                    out.push(TypedStmt::Expression(expression));
                }
            }
            Statement::If(stmt) => {
                let Some(condition) = self.resolve_condition(&stmt.condition, ctx) else {
                    return;
                };
                let then_branch = self.resolve_branch(&stmt.then_branch, ctx);
                let else_branch = stmt
                    .else_branch
                    .as_ref()
                    .map(|branch| self.resolve_branch(branch, ctx))
                    .unwrap_or_default();
                out.push(TypedStmt::If {
                    condition,
                    then_branch,
                    else_branch,
                });
            }
            Statement::While(stmt) => {
                let Some(condition) = self.resolve_condition(&stmt.condition, ctx) else {
                    return;
                };
                let body = self.resolve_loop_body(&stmt.body, ctx);
                out.push(TypedStmt::While { condition, body });
            }
            Statement::Until(stmt) => {
                let Some(condition) = self.resolve_condition(&stmt.condition, ctx) else {
                    return;
                };
                let body = self.resolve_loop_body(&stmt.body, ctx);
                out.push(TypedStmt::Until { condition, body });
            }
            Statement::DoWhile(stmt) => {
                let body = self.resolve_loop_body(&stmt.body, ctx);
                let Some(condition) = self.resolve_condition(&stmt.condition, ctx) else {
                    return;
                };
                out.push(TypedStmt::DoWhile { body, condition });
            }
            Statement::For(stmt) => {
                self.table.push_scope();
                let mut init = Vec::new();
                if let Some(init_stmt) = &stmt.init {
                    self.resolve_stmt_into(init_stmt, ctx, &mut init);
                }
                let condition = stmt
                    .condition
                    .as_ref()
                    .and_then(|c| self.resolve_condition(c, ctx));
                let mut step = Vec::new();
                if let Some(step_stmt) = &stmt.step {
                    self.resolve_stmt_into(step_stmt, ctx, &mut step);
                }
                let body = self.resolve_loop_body(&stmt.body, ctx);
                self.table.pop_scope();
                out.push(TypedStmt::For {
                    init,
                    condition,
                    step,
                    body,
                });
            }
            Statement::Return(stmt) => {
                let expected = ctx.return_type.clone();
                match (&stmt.value, expected.is_void()) {
                    (None, true) => out.push(TypedStmt::Return(None)),
                    (Some(value), false) => {
                        if let Some(typed) = self.resolve_expr(value, Some(&expected), ctx) {
                            self.check_assignable(
                                &expected,
                                &typed,
                                TypeMismatchContext::Return,
                                value.location(),
                            );
                            out.push(TypedStmt::Return(Some(typed)));
                        }
                    }
                    (None, false) => {
                        self.errors.push(TypeCheckError::TypeMismatch {
                            expected,
                            found: ConcreteType::Void,
                            context: TypeMismatchContext::Return,
                            location: stmt.location.clone(),
                        });
                    }
                    (Some(value), true) => {
                        if let Some(typed) = self.resolve_expr(value, None, ctx) {
                            self.errors.push(TypeCheckError::TypeMismatch {
                                expected: ConcreteType::Void,
                                found: typed.ty,
                                context: TypeMismatchContext::Return,
                                location: stmt.location.clone(),
                            });
                        }
                    }
                }
            }
            Statement::Break(stmt) => {
                if ctx.loop_depth == 0 {
                    self.errors.push(TypeCheckError::OutsideLoop {
                        keyword: "break",
                        location: stmt.location.clone(),
                    });
                } else {
                    out.push(TypedStmt::Break);
                }
            }
            Statement::Continue(stmt) => {
                if ctx.loop_depth == 0 {
                    self.errors.push(TypeCheckError::OutsideLoop {
                        keyword: "continue",
                        location: stmt.location.clone(),
                    });
                } else {
                    out.push(TypedStmt::Continue);
                }
            }
        }
    }

    fn resolve_branch(&mut self, statement: &Statement, ctx: &mut FuncCtx) -> Vec<TypedStmt> {
        self.table.push_scope();
        let mut out = Vec::new();
        self.resolve_stmt_into(statement, ctx, &mut out);
        self.table.pop_scope();
        out
    }

    fn resolve_loop_body(&mut self, statement: &Statement, ctx: &mut FuncCtx) -> Vec<TypedStmt> {
        ctx.loop_depth += 1;
        let body = self.resolve_branch(statement, ctx);
        ctx.loop_depth -= 1;
        body
    }

    fn resolve_condition(&mut self, condition: &Expression, ctx: &mut FuncCtx) -> Option<TypedExpr> {
        let typed = self.resolve_expr(condition, None, ctx)?;
        if !typed.ty.is_boolean() {
            self.errors.push(TypeCheckError::ConditionNotBoolean {
                found: typed.ty.clone(),
                location: condition.location().clone(),
            });
        }
        Some(typed)
    }

    fn resolve_assign_target(
        &mut self,
        target: &Expression,
        ctx: &mut FuncCtx,
    ) -> Option<(AssignTarget, ConcreteType)> {
        match target {
            Expression::Identifier(ident) => {
                if let Some(binding) = self.table.lookup_variable(&ident.name) {
                    let (local, ty) = (binding.local, binding.ty.clone());
                    Some((AssignTarget::Local(local), ty))
                } else {
                    self.errors.push(TypeCheckError::UnknownIdentifier {
                        name: ident.name.clone(),
                        location: ident.location.clone(),
                    });
                    None
                }
            }
            Expression::FieldAccess(access) => {
                let receiver = self.resolve_expr(&access.receiver, None, ctx)?;
                match receiver.ty.clone() {
                    ConcreteType::Array(_) => {
                        if access.field.name == "length" {
                            self.errors.push(TypeCheckError::ArrayLengthImmutable {
                                location: access.location.clone(),
                            });
                        } else {
                            self.errors.push(TypeCheckError::FieldNotFound {
                                struct_name: receiver.ty.to_string(),
                                field_name: access.field.name.clone(),
                                location: access.field.location.clone(),
                            });
                        }
                        None
                    }
                    ConcreteType::Struct { name, type_args } => {
                        let (struct_mangled, field_ty) = self.struct_field_type(
                            &name,
                            &type_args,
                            &access.field,
                            ctx.inst_depth,
                        )?;
                        Some((
                            AssignTarget::Field {
                                receiver,
                                struct_mangled,
                                field: access.field.name.clone(),
                            },
                            field_ty,
                        ))
                    }
                    other => {
                        self.errors.push(TypeCheckError::ExpectedStructReceiver {
                            found: other,
                            location: access.receiver.location().clone(),
                        });
                        None
                    }
                }
            }
            Expression::Index(index) => {
                let receiver = self.resolve_expr(&index.receiver, None, ctx)?;
                let ConcreteType::Array(element) = receiver.ty.clone() else {
                    self.errors.push(TypeCheckError::ExpectedArrayReceiver {
                        found: receiver.ty.clone(),
                        location: index.receiver.location().clone(),
                    });
                    return None;
                };
                let index_expr = self.resolve_expr(&index.index, None, ctx)?;
                if !index_expr.ty.is_integer() {
                    self.errors.push(TypeCheckError::IndexNotInteger {
                        found: index_expr.ty.clone(),
                        location: index.index.location().clone(),
                    });
                }
                Some((
                    AssignTarget::Index {
                        receiver,
                        index: index_expr,
                    },
                    *element,
                ))
            }
            // The parser only produces the three target shapes above.
            _ => unreachable!("invalid assignment target survived parsing"),
        }
    }

    fn check_assignable(
        &mut self,
        expected: &ConcreteType,
        value: &TypedExpr,
        context: TypeMismatchContext,
        location: &Location,
    ) {
        if !expected.assignable_from(&value.ty) {
            self.errors.push(TypeCheckError::TypeMismatch {
                expected: expected.clone(),
                found: value.ty.clone(),
                context,
                location: location.clone(),
            });
        }
    }

    // ---- expressions -------------------------------------------------------

    #[allow(clippy::too_many_lines)]
    fn resolve_expr(
        &mut self,
        expression: &Expression,
        expected: Option<&ConcreteType>,
        ctx: &mut FuncCtx,
    ) -> Option<TypedExpr> {
        match expression {
            Expression::IntLiteral(lit) => Some(TypedExpr {
                kind: TypedExprKind::Int(lit.value),
                ty: ConcreteType::Int,
            }),
            Expression::BoolLiteral(lit) => Some(TypedExpr {
                kind: TypedExprKind::Bool(lit.value),
                ty: ConcreteType::Boolean,
            }),
            Expression::CharLiteral(lit) => Some(TypedExpr {
                kind: TypedExprKind::Char(lit.value as i32),
                ty: ConcreteType::Char,
            }),
            Expression::StringLiteral(lit) => {
                self.mono.request(
                    "vec",
                    &[ConcreteType::Char],
                    ctx.inst_depth,
                    &lit.location,
                    &mut self.errors,
                );
                Some(TypedExpr {
                    kind: TypedExprKind::Str(lit.value.clone()),
                    ty: ConcreteType::structure("vec", vec![ConcreteType::Char]),
                })
            }
            Expression::ArrayLiteral(lit) => {
                let expected_element = match expected {
                    Some(ConcreteType::Array(element)) => Some((**element).clone()),
                    _ => None,
                };
                if lit.elements.is_empty() {
                    let Some(element) = expected_element else {
                        self.errors.push(TypeCheckError::CannotInferArrayLiteral {
                            location: lit.location.clone(),
                        });
                        return None;
                    };
                    return Some(TypedExpr {
                        kind: TypedExprKind::ArrayLiteral(Vec::new()),
                        ty: ConcreteType::Array(Box::new(element)),
                    });
                }
                let first = self.resolve_expr(
                    &lit.elements[0],
                    expected_element.as_ref(),
                    ctx,
                )?;
                let element_ty = first.ty.clone();
                let mut elements = vec![first];
                for element in &lit.elements[1..] {
                    let typed = self.resolve_expr(element, Some(&element_ty), ctx)?;
                    if !element_ty.assignable_from(&typed.ty) {
                        self.errors.push(TypeCheckError::TypeMismatch {
                            expected: element_ty.clone(),
                            found: typed.ty.clone(),
                            context: TypeMismatchContext::ArrayElement,
                            location: element.location().clone(),
                        });
                    }
                    elements.push(typed);
                }
                Some(TypedExpr {
                    kind: TypedExprKind::ArrayLiteral(elements),
                    ty: ConcreteType::Array(Box::new(element_ty)),
                })
            }
            Expression::Null(lit) => match expected {
                Some(ty) if ty.is_reference() => Some(TypedExpr {
                    kind: TypedExprKind::Null,
                    ty: ty.clone(),
                }),
                Some(ty) => {
                    self.errors.push(TypeCheckError::NullNotAllowed {
                        expected: ty.clone(),
                        location: lit.location.clone(),
                    });
                    None
                }
                None => {
                    self.errors.push(TypeCheckError::CannotInferNull {
                        location: lit.location.clone(),
                    });
                    None
                }
            },
            Expression::Identifier(ident) => {
                if let Some(binding) = self.table.lookup_variable(&ident.name) {
                    Some(TypedExpr {
                        kind: TypedExprKind::Local(binding.local),
                        ty: binding.ty.clone(),
                    })
                } else {
                    self.errors.push(TypeCheckError::UnknownIdentifier {
                        name: ident.name.clone(),
                        location: ident.location.clone(),
                    });
                    None
                }
            }
            Expression::This(expr) => match (ctx.this_local, ctx.this_type.clone()) {
                (Some(local), Some(ty)) => Some(TypedExpr {
                    kind: TypedExprKind::Local(local),
                    ty,
                }),
                _ => {
                    self.errors.push(TypeCheckError::ThisOutsideMethod {
                        location: expr.location.clone(),
                    });
                    None
                }
            },
            Expression::FieldAccess(access) => {
                let receiver = self.resolve_expr(&access.receiver, None, ctx)?;
                match receiver.ty.clone() {
                    ConcreteType::Array(_) if access.field.name == "length" => Some(TypedExpr {
                        kind: TypedExprKind::ArrayLength {
                            receiver: Box::new(receiver),
                        },
                        ty: ConcreteType::Int,
                    }),
                    ConcreteType::Array(_) => {
                        self.errors.push(TypeCheckError::FieldNotFound {
                            struct_name: receiver.ty.to_string(),
                            field_name: access.field.name.clone(),
                            location: access.field.location.clone(),
                        });
                        None
                    }
                    ConcreteType::Struct { name, type_args } => {
                        let (struct_mangled, field_ty) = self.struct_field_type(
                            &name,
                            &type_args,
                            &access.field,
                            ctx.inst_depth,
                        )?;
                        Some(TypedExpr {
                            kind: TypedExprKind::FieldGet {
                                receiver: Box::new(receiver),
                                struct_mangled,
                                field: access.field.name.clone(),
                            },
                            ty: field_ty,
                        })
                    }
                    other => {
                        self.errors.push(TypeCheckError::ExpectedStructReceiver {
                            found: other,
                            location: access.receiver.location().clone(),
                        });
                        None
                    }
                }
            }
            Expression::Index(index) => {
                let receiver = self.resolve_expr(&index.receiver, None, ctx)?;
                let ConcreteType::Array(element) = receiver.ty.clone() else {
                    self.errors.push(TypeCheckError::ExpectedArrayReceiver {
                        found: receiver.ty.clone(),
                        location: index.receiver.location().clone(),
                    });
                    return None;
                };
                let index_expr = self.resolve_expr(&index.index, None, ctx)?;
                if !index_expr.ty.is_integer() {
                    self.errors.push(TypeCheckError::IndexNotInteger {
                        found: index_expr.ty.clone(),
                        location: index.index.location().clone(),
                    });
                }
                Some(TypedExpr {
                    kind: TypedExprKind::Index {
                        receiver: Box::new(receiver),
                        index: Box::new(index_expr),
                    },
                    ty: *element,
                })
            }
            Expression::MethodCall(call) => self.resolve_method_call(call, ctx),
            Expression::StaticCall(call) => {
                let ty = self.resolve_value_type(&call.ty, ctx.env, ctx.inst_depth)?;
                let ConcreteType::Struct { name, type_args } = ty else {
                    self.errors.push(TypeCheckError::ExpectedStructReceiver {
                        found: ty,
                        location: call.ty.location().clone(),
                    });
                    return None;
                };
                self.resolve_static_call(
                    &name,
                    &type_args,
                    &call.method,
                    &call.arguments,
                    ctx,
                )
            }
            Expression::Call(call) => self.resolve_call(call, ctx),
            Expression::Constructor(ctor) => {
                let ty = self.resolve_value_type(&ctor.ty, ctx.env, ctx.inst_depth)?;
                match ty {
                    ConcreteType::Array(element) => {
                        if ctor.arguments.len() != 1 {
                            self.errors.push(TypeCheckError::ArgumentCountMismatch {
                                kind: "array constructor",
                                name: "array".to_string(),
                                expected: 1,
                                found: ctor.arguments.len(),
                                location: ctor.location.clone(),
                            });
                            return None;
                        }
                        let length = self.resolve_expr(&ctor.arguments[0], None, ctx)?;
                        if !length.ty.is_integer() {
                            self.errors.push(TypeCheckError::TypeMismatch {
                                expected: ConcreteType::Int,
                                found: length.ty.clone(),
                                context: TypeMismatchContext::Argument {
                                    callee: "array".to_string(),
                                    index: 0,
                                },
                                location: ctor.arguments[0].location().clone(),
                            });
                        }
                        Some(TypedExpr {
                            kind: TypedExprKind::ArrayNew {
                                length: Box::new(length),
                            },
                            ty: ConcreteType::Array(element),
                        })
                    }
                    ConcreteType::Struct { name, type_args } => self.construct(
                        &name,
                        type_args,
                        &ctor.arguments,
                        &ctor.location,
                        ctx,
                    ),
                    other => {
                        self.errors.push(TypeCheckError::NotAStructure {
                            name: other.to_string(),
                            location: ctor.location.clone(),
                        });
                        None
                    }
                }
            }
            Expression::Binary(binary) => self.resolve_binary(binary, ctx),
            Expression::Unary(unary) => {
                let operand = self.resolve_expr(&unary.operand, None, ctx)?;
                let ty = match unary.operator {
                    UnaryOp::Not => {
                        if !operand.ty.is_boolean() {
                            self.errors.push(TypeCheckError::InvalidUnaryOperand {
                                operator: unary.operator,
                                found: operand.ty.clone(),
                                location: unary.location.clone(),
                            });
                        }
                        ConcreteType::Boolean
                    }
                    UnaryOp::Neg => {
                        if !operand.ty.is_integer() {
                            self.errors.push(TypeCheckError::InvalidUnaryOperand {
                                operator: unary.operator,
                                found: operand.ty.clone(),
                                location: unary.location.clone(),
                            });
                        }
                        ConcreteType::Int
                    }
                };
                Some(TypedExpr {
                    kind: TypedExprKind::Unary {
                        op: unary.operator,
                        operand: Box::new(operand),
                    },
                    ty,
                })
            }
        }
    }

    fn resolve_binary(
        &mut self,
        binary: &muni_ast::nodes::BinaryExpression,
        ctx: &mut FuncCtx,
    ) -> Option<TypedExpr> {
        let op = binary.operator;
        if op.is_logical() {
            let left = self.resolve_expr(&binary.left, None, ctx)?;
            let right = self.resolve_expr(&binary.right, None, ctx)?;
            if !left.ty.is_boolean() || !right.ty.is_boolean() {
                self.errors.push(TypeCheckError::InvalidBinaryOperands {
                    operator: op,
                    left: left.ty.clone(),
                    right: right.ty.clone(),
                    location: binary.location.clone(),
                });
            }
            return Some(TypedExpr {
                kind: TypedExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                ty: ConcreteType::Boolean,
            });
        }
        if op.is_arithmetic() {
            let left = self.resolve_expr(&binary.left, None, ctx)?;
            let right = self.resolve_expr(&binary.right, None, ctx)?;
            if !left.ty.is_integer() || !right.ty.is_integer() {
                self.errors.push(TypeCheckError::InvalidBinaryOperands {
                    operator: op,
                    left: left.ty.clone(),
                    right: right.ty.clone(),
                    location: binary.location.clone(),
                });
            }
            return Some(TypedExpr {
                kind: TypedExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                ty: ConcreteType::Int,
            });
        }
        // Comparison. `null` operands take their type from the other side.
        let (left, right) = match (
            matches!(binary.left, Expression::Null(_)),
            matches!(binary.right, Expression::Null(_)),
        ) {
            (true, true) => {
                let null = TypedExpr {
                    kind: TypedExprKind::Null,
                    ty: ConcreteType::Int,
                };
                (null.clone(), null)
            }
            (true, false) => {
                let right = self.resolve_expr(&binary.right, None, ctx)?;
                let left = self.resolve_expr(&binary.left, Some(&right.ty), ctx)?;
                (left, right)
            }
            _ => {
                let left = self.resolve_expr(&binary.left, None, ctx)?;
                let right = self.resolve_expr(&binary.right, Some(&left.ty), ctx)?;
                (left, right)
            }
        };
        let equality = matches!(op, BinaryOp::Eq | BinaryOp::Ne);
        let comparable = if equality {
            left.ty.assignable_from(&right.ty) || right.ty.assignable_from(&left.ty)
        } else {
            (left.ty.is_integer() && right.ty.is_integer())
                || (left.ty.is_boolean() && right.ty.is_boolean())
        };
        if !comparable {
            self.errors.push(TypeCheckError::InvalidBinaryOperands {
                operator: op,
                left: left.ty.clone(),
                right: right.ty.clone(),
                location: binary.location.clone(),
            });
        }
        Some(TypedExpr {
            kind: TypedExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            },
            ty: ConcreteType::Boolean,
        })
    }

    fn resolve_method_call(
        &mut self,
        call: &muni_ast::nodes::MethodCallExpression,
        ctx: &mut FuncCtx,
    ) -> Option<TypedExpr> {
        // `S.method(...)` on a structure name is a static call.
        if let Expression::Identifier(ident) = &call.receiver {
            if self.table.lookup_variable(&ident.name).is_none()
                && matches!(
                    self.table.lookup_global(&ident.name),
                    Some(GlobalSymbol::Structure(_))
                )
            {
                let name = ident.name.clone();
                let template_arity = self
                    .structure_template(&name)
                    .map(|t| t.type_params.len())
                    .unwrap_or(0);
                if template_arity != 0 {
                    self.errors.push(TypeCheckError::TypeArgumentCountMismatch {
                        name,
                        expected: template_arity,
                        found: 0,
                        location: ident.location.clone(),
                    });
                    return None;
                }
                self.mono
                    .request(&name, &[], ctx.inst_depth, &ident.location, &mut self.errors);
                return self.resolve_static_call(&name, &[], &call.method, &call.arguments, ctx);
            }
        }
        let receiver = self.resolve_expr(&call.receiver, None, ctx)?;
        let ConcreteType::Struct { name, type_args } = receiver.ty.clone() else {
            self.errors.push(TypeCheckError::ExpectedStructReceiver {
                found: receiver.ty.clone(),
                location: call.receiver.location().clone(),
            });
            return None;
        };
        let Some((param_tys, return_ty, is_static)) =
            self.method_signature(&name, &type_args, &call.method.name, ctx.inst_depth)
        else {
            self.errors.push(TypeCheckError::MethodNotFound {
                struct_name: ConcreteType::structure(&name, type_args).to_string(),
                method_name: call.method.name.clone(),
                location: call.method.location.clone(),
            });
            return None;
        };
        if is_static {
            self.errors.push(TypeCheckError::StaticMethodCalledOnInstance {
                struct_name: name,
                method_name: call.method.name.clone(),
                location: call.method.location.clone(),
            });
            return None;
        }
        let mangled = mangle_method(
            &mangle_struct(&name, &type_args),
            &call.method.name,
        );
        let mut arguments = vec![receiver];
        self.resolve_arguments(
            &call.method.name,
            "method",
            &param_tys,
            &call.arguments,
            &call.location,
            ctx,
            &mut arguments,
        )?;
        Some(TypedExpr {
            kind: TypedExprKind::Call { mangled, arguments },
            ty: return_ty,
        })
    }

    fn resolve_static_call(
        &mut self,
        name: &str,
        type_args: &[ConcreteType],
        method: &Identifier,
        arguments: &[Expression],
        ctx: &mut FuncCtx,
    ) -> Option<TypedExpr> {
        let Some((param_tys, return_ty, is_static)) =
            self.method_signature(name, type_args, &method.name, ctx.inst_depth)
        else {
            self.errors.push(TypeCheckError::MethodNotFound {
                struct_name: ConcreteType::structure(name, type_args.to_vec()).to_string(),
                method_name: method.name.clone(),
                location: method.location.clone(),
            });
            return None;
        };
        if !is_static {
            self.errors.push(TypeCheckError::InstanceMethodCalledStatically {
                struct_name: name.to_string(),
                method_name: method.name.clone(),
                location: method.location.clone(),
            });
            return None;
        }
        let mangled = mangle_method(&mangle_struct(name, type_args), &method.name);
        let mut typed_args = Vec::new();
        self.resolve_arguments(
            &method.name,
            "static method",
            &param_tys,
            arguments,
            &method.location,
            ctx,
            &mut typed_args,
        )?;
        Some(TypedExpr {
            kind: TypedExprKind::Call {
                mangled,
                arguments: typed_args,
            },
            ty: return_ty,
        })
    }

    fn resolve_call(
        &mut self,
        call: &muni_ast::nodes::CallExpression,
        ctx: &mut FuncCtx,
    ) -> Option<TypedExpr> {
        let name = call.callee.name.clone();

        // Casts use constructor-call syntax on a scalar head.
        let cast_target = match name.as_str() {
            "int" => Some(ConcreteType::Int),
            "char" => Some(ConcreteType::Char),
            "boolean" => Some(ConcreteType::Boolean),
            _ => None,
        };
        if let Some(target) = cast_target {
            if call.arguments.len() != 1 {
                self.errors.push(TypeCheckError::ArgumentCountMismatch {
                    kind: "cast",
                    name,
                    expected: 1,
                    found: call.arguments.len(),
                    location: call.location.clone(),
                });
                return None;
            }
            let operand = self.resolve_expr(&call.arguments[0], None, ctx)?;
            if !operand.ty.is_scalar() {
                self.errors.push(TypeCheckError::InvalidCast {
                    from: operand.ty.clone(),
                    to: name,
                    location: call.location.clone(),
                });
                return None;
            }
            return Some(TypedExpr {
                kind: TypedExprKind::Cast {
                    operand: Box::new(operand),
                },
                ty: target,
            });
        }

        if self.table.lookup_variable(&name).is_some() {
            self.errors.push(TypeCheckError::NotCallable {
                name,
                location: call.location.clone(),
            });
            return None;
        }

        match self.table.lookup_global(&name).cloned() {
            Some(GlobalSymbol::Function(sig)) => {
                let mut arguments = Vec::new();
                self.resolve_arguments(
                    &name,
                    "function",
                    &sig.params,
                    &call.arguments,
                    &call.location,
                    ctx,
                    &mut arguments,
                )?;
                Some(TypedExpr {
                    kind: TypedExprKind::Call {
                        mangled: name,
                        arguments,
                    },
                    ty: sig.return_type,
                })
            }
            Some(GlobalSymbol::HostImport(index)) => {
                let host = self.typed_hosts[index].clone();
                let mut arguments = Vec::new();
                self.resolve_arguments(
                    &name,
                    "host import",
                    &host.params,
                    &call.arguments,
                    &call.location,
                    ctx,
                    &mut arguments,
                )?;
                Some(TypedExpr {
                    kind: TypedExprKind::HostCall {
                        module: host.module,
                        name: host.name,
                        arguments,
                    },
                    ty: host.return_type,
                })
            }
            Some(GlobalSymbol::Structure(_)) => {
                let arity = self
                    .structure_template(&name)
                    .map(|t| t.type_params.len())
                    .unwrap_or(0);
                if arity != 0 {
                    self.errors.push(TypeCheckError::TypeArgumentCountMismatch {
                        name,
                        expected: arity,
                        found: 0,
                        location: call.location.clone(),
                    });
                    return None;
                }
                self.construct(&name, Vec::new(), &call.arguments, &call.location, ctx)
            }
            Some(GlobalSymbol::Alias(_)) => {
                let named = TypeExpr::Named(muni_ast::nodes::NamedType {
                    id: 0,
                    location: call.location.clone(),
                    name: call.callee.clone(),
                    type_args: Vec::new(),
                });
                let ty = self.resolve_value_type(&named, ctx.env, ctx.inst_depth)?;
                match ty {
                    ConcreteType::Struct { name, type_args } => {
                        self.construct(&name, type_args, &call.arguments, &call.location, ctx)
                    }
                    other => {
                        self.errors.push(TypeCheckError::NotAStructure {
                            name: other.to_string(),
                            location: call.location.clone(),
                        });
                        None
                    }
                }
            }
            None => {
                self.errors.push(TypeCheckError::UndefinedFunction {
                    name,
                    location: call.location.clone(),
                });
                None
            }
        }
    }

    /// Resolve a construction of `name<type_args>(arguments)`.
    fn construct(
        &mut self,
        name: &str,
        type_args: Vec<ConcreteType>,
        arguments: &[Expression],
        location: &Location,
        ctx: &mut FuncCtx,
    ) -> Option<TypedExpr> {
        let Some(template) = self.structure_template(name) else {
            self.errors.push(TypeCheckError::NotAStructure {
                name: name.to_string(),
                location: location.clone(),
            });
            return None;
        };
        let ctor_params: Option<Vec<TypeExpr>> = template
            .constructor
            .as_ref()
            .map(|ctor| ctor.params.iter().map(|p| p.ty.clone()).collect());
        let type_param_names = template.type_params.clone();
        self.mono
            .request(name, &type_args, ctx.inst_depth, location, &mut self.errors);

        let struct_mangled = mangle_struct(name, &type_args);
        let result_ty = ConcreteType::Struct {
            name: name.to_string(),
            type_args: type_args.clone(),
        };
        match ctor_params {
            Some(param_exprs) => {
                let env = build_env(&type_param_names, &type_args);
                let param_tys: Vec<ConcreteType> = param_exprs
                    .iter()
                    .map(|ty| {
                        self.resolve_value_type(ty, &env, ctx.inst_depth)
                            .unwrap_or(ConcreteType::Int)
                    })
                    .collect();
                let mut typed_args = Vec::new();
                self.resolve_arguments(
                    name,
                    "constructor",
                    &param_tys,
                    arguments,
                    location,
                    ctx,
                    &mut typed_args,
                )?;
                Some(TypedExpr {
                    kind: TypedExprKind::CtorCall {
                        ctor: Some(mangle_method(&struct_mangled, name)),
                        struct_mangled,
                        arguments: typed_args,
                    },
                    ty: result_ty,
                })
            }
            None => {
                if arguments.is_empty() {
                    Some(TypedExpr {
                        kind: TypedExprKind::CtorCall {
                            ctor: None,
                            struct_mangled,
                            arguments: Vec::new(),
                        },
                        ty: result_ty,
                    })
                } else {
                    self.errors.push(TypeCheckError::MissingConstructor {
                        name: name.to_string(),
                        location: location.clone(),
                    });
                    None
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_arguments(
        &mut self,
        callee: &str,
        kind: &'static str,
        params: &[ConcreteType],
        arguments: &[Expression],
        location: &Location,
        ctx: &mut FuncCtx,
        out: &mut Vec<TypedExpr>,
    ) -> Option<()> {
        if params.len() != arguments.len() {
            self.errors.push(TypeCheckError::ArgumentCountMismatch {
                kind,
                name: callee.to_string(),
                expected: params.len(),
                found: arguments.len(),
                location: location.clone(),
            });
            return None;
        }
        for (index, (param, argument)) in params.iter().zip(arguments).enumerate() {
            let typed = self.resolve_expr(argument, Some(param), ctx)?;
            if !param.assignable_from(&typed.ty) {
                self.errors.push(TypeCheckError::TypeMismatch {
                    expected: param.clone(),
                    found: typed.ty.clone(),
                    context: TypeMismatchContext::Argument {
                        callee: callee.to_string(),
                        index,
                    },
                    location: argument.location().clone(),
                });
            }
            out.push(typed);
        }
        Some(())
    }

    /// Look up a method on a structure and resolve its signature under the
    /// instantiation's substitution. Returns `(params, return, is_static)`.
    fn method_signature(
        &mut self,
        struct_name: &str,
        type_args: &[ConcreteType],
        method_name: &str,
        inst_depth: usize,
    ) -> Option<(Vec<ConcreteType>, ConcreteType, bool)> {
        let template = self.structure_template(struct_name)?;
        let method = template
            .methods
            .iter()
            .find(|m| m.name.name == method_name)?;
        let param_exprs: Vec<TypeExpr> = method.params.iter().map(|p| p.ty.clone()).collect();
        let return_expr = method.return_type.clone();
        let is_static = method.is_static;
        let env = build_env(&template.type_params.clone(), type_args);
        let params = param_exprs
            .iter()
            .map(|ty| {
                self.resolve_value_type(ty, &env, inst_depth)
                    .unwrap_or(ConcreteType::Int)
            })
            .collect();
        let return_type = self
            .resolve_type(&return_expr, &env, inst_depth)
            .unwrap_or(ConcreteType::Void);
        Some((params, return_type, is_static))
    }

    /// Look up a field on a structure instantiation. Returns the mangled
    /// structure name and the field's substituted type.
    fn struct_field_type(
        &mut self,
        struct_name: &str,
        type_args: &[ConcreteType],
        field: &Identifier,
        inst_depth: usize,
    ) -> Option<(String, ConcreteType)> {
        let Some(template) = self.structure_template(struct_name) else {
            return None;
        };
        let Some(field_decl) = template.fields.iter().find(|f| f.name.name == field.name) else {
            self.errors.push(TypeCheckError::FieldNotFound {
                struct_name: ConcreteType::structure(struct_name, type_args.to_vec()).to_string(),
                field_name: field.name.clone(),
                location: field.location.clone(),
            });
            return None;
        };
        let field_ty_expr = field_decl.ty.clone();
        let env = build_env(&template.type_params.clone(), type_args);
        let ty = self
            .resolve_value_type(&field_ty_expr, &env, inst_depth)
            .unwrap_or(ConcreteType::Int);
        Some((mangle_struct(struct_name, type_args), ty))
    }

    // ---- type resolution ---------------------------------------------------

    fn resolve_value_type(
        &mut self,
        ty: &TypeExpr,
        env: &TypeEnv,
        inst_depth: usize,
    ) -> Option<ConcreteType> {
        let resolved = self.resolve_type(ty, env, inst_depth)?;
        if resolved.is_void() {
            self.errors.push(TypeCheckError::InvalidVoidType {
                location: ty.location().clone(),
            });
            return None;
        }
        Some(resolved)
    }

    fn resolve_type(
        &mut self,
        ty: &TypeExpr,
        env: &TypeEnv,
        inst_depth: usize,
    ) -> Option<ConcreteType> {
        self.resolve_type_inner(ty, env, inst_depth, 0)
    }

    fn resolve_type_inner(
        &mut self,
        ty: &TypeExpr,
        env: &TypeEnv,
        inst_depth: usize,
        alias_depth: usize,
    ) -> Option<ConcreteType> {
        match ty {
            TypeExpr::Void(_) => Some(ConcreteType::Void),
            TypeExpr::Array(array) => {
                let element =
                    self.resolve_type_inner(&array.element, env, inst_depth, alias_depth)?;
                if element.is_void() {
                    self.errors.push(TypeCheckError::InvalidVoidType {
                        location: array.element.location().clone(),
                    });
                    return None;
                }
                Some(ConcreteType::Array(Box::new(element)))
            }
            TypeExpr::Named(named) => {
                let name = &named.name.name;
                if let Some(bound) = env.get(name) {
                    if !named.type_args.is_empty() {
                        self.errors.push(TypeCheckError::TypeArgumentCountMismatch {
                            name: name.clone(),
                            expected: 0,
                            found: named.type_args.len(),
                            location: named.location.clone(),
                        });
                        return None;
                    }
                    return Some(bound.clone());
                }
                let scalar = match name.as_str() {
                    "int" => Some(ConcreteType::Int),
                    "boolean" => Some(ConcreteType::Boolean),
                    "char" => Some(ConcreteType::Char),
                    "float" => {
                        self.errors.push(TypeCheckError::FloatUnsupported {
                            location: named.location.clone(),
                        });
                        return None;
                    }
                    _ => None,
                };
                if let Some(scalar) = scalar {
                    if !named.type_args.is_empty() {
                        self.errors.push(TypeCheckError::TypeArgumentCountMismatch {
                            name: name.clone(),
                            expected: 0,
                            found: named.type_args.len(),
                            location: named.location.clone(),
                        });
                        return None;
                    }
                    return Some(scalar);
                }
                let symbol = match self.table.lookup_global(name) {
                    Some(GlobalSymbol::Structure(index)) => Some((true, *index)),
                    Some(GlobalSymbol::Alias(index)) => Some((false, *index)),
                    _ => None,
                };
                match symbol {
                    Some((true, index)) => {
                        let arity = self.structures[index].type_params.len();
                        if arity != named.type_args.len() {
                            self.errors.push(TypeCheckError::TypeArgumentCountMismatch {
                                name: name.clone(),
                                expected: arity,
                                found: named.type_args.len(),
                                location: named.location.clone(),
                            });
                            return None;
                        }
                        let mut args = Vec::new();
                        for arg in &named.type_args {
                            let resolved =
                                self.resolve_type_inner(arg, env, inst_depth, alias_depth)?;
                            if resolved.is_void() {
                                self.errors.push(TypeCheckError::InvalidVoidType {
                                    location: arg.location().clone(),
                                });
                                return None;
                            }
                            args.push(resolved);
                        }
                        self.mono.request(
                            name,
                            &args,
                            inst_depth,
                            &named.location,
                            &mut self.errors,
                        );
                        Some(ConcreteType::Struct {
                            name: name.clone(),
                            type_args: args,
                        })
                    }
                    Some((false, index)) => {
                        // Cycles were rejected up front; the depth guard only
                        // stops expansion of aliases already reported there.
                        if alias_depth >= self.aliases.len() {
                            return None;
                        }
                        let alias = self.aliases[index].clone();
                        if alias.type_params.len() != named.type_args.len() {
                            self.errors.push(TypeCheckError::TypeArgumentCountMismatch {
                                name: name.clone(),
                                expected: alias.type_params.len(),
                                found: named.type_args.len(),
                                location: named.location.clone(),
                            });
                            return None;
                        }
                        let mut args = Vec::new();
                        for arg in &named.type_args {
                            args.push(self.resolve_type_inner(arg, env, inst_depth, alias_depth)?);
                        }
                        let alias_env = build_env(&alias.type_params, &args);
                        self.resolve_type_inner(&alias.body, &alias_env, inst_depth, alias_depth + 1)
                    }
                    _ => {
                        self.errors.push(TypeCheckError::UnknownType {
                            name: name.clone(),
                            location: named.location.clone(),
                        });
                        None
                    }
                }
            }
        }
    }
}

fn build_env(params: &[Identifier], args: &[ConcreteType]) -> TypeEnv {
    params
        .iter()
        .map(|p| p.name.clone())
        .zip(args.iter().cloned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn resolve(source: &str) -> Result<TypedProgram, Vec<TypeCheckError>> {
        let program =
            muni_ast::imports::load_program_from_source(source, "test.mun", Path::new("."))
                .expect("source should load");
        resolve_program(&program)
    }

    fn resolve_ok(source: &str) -> TypedProgram {
        match resolve(source) {
            Ok(program) => program,
            Err(errors) => {
                let rendered: Vec<String> = errors.iter().map(ToString::to_string).collect();
                panic!("expected successful resolution, got: {rendered:#?}");
            }
        }
    }

    fn function_names(program: &TypedProgram) -> Vec<&str> {
        program
            .functions
            .iter()
            .map(|f| f.mangled.as_str())
            .collect()
    }

    mod programs {
        use super::*;

        #[test]
        fn minimal_main_resolves() {
            let program = resolve_ok("void main() { write_int(42); }");
            let names = function_names(&program);
            assert!(names.contains(&"main"));
            assert!(names.contains(&"print"));
            // `print` takes a `string`, so vec<char> is always instantiated.
            assert!(names.contains(&"vec$char$$push"));
            assert!(program.struct_index.contains_key("vec$char"));
        }

        #[test]
        fn main_is_the_only_export() {
            let program = resolve_ok("void main() { }");
            let exported: Vec<_> = program
                .functions
                .iter()
                .filter(|f| f.exported)
                .map(|f| f.mangled.as_str())
                .collect();
            assert_eq!(exported, vec!["main"]);
        }

        #[test]
        fn generic_structure_instantiates_per_argument_tuple() {
            let program = resolve_ok(
                "structure Box<T> {
                    T value;

                    Box(T first) {
                        this.value = first;
                    }
                }
                void main() {
                    Box<int> a = Box<int>(1);
                    Box<boolean> b = Box<boolean>(true);
                }",
            );
            assert!(program.struct_index.contains_key("Box$int"));
            assert!(program.struct_index.contains_key("Box$boolean"));
            let names = function_names(&program);
            assert!(names.contains(&"Box$int$$Box"));
            assert!(names.contains(&"Box$boolean$$Box"));
        }

        #[test]
        fn self_referential_generic_reaches_fixed_point() {
            let program = resolve_ok(
                "structure List<T> {
                    T element;
                    List<T> next;

                    List(T first) {
                        this.element = first;
                    }

                    void append(T value) {
                        this.next = List<T>(value);
                    }
                }
                void main() {
                    List<int> xs = List<int>(1);
                    xs.append(2);
                }",
            );
            let count = program
                .structs
                .iter()
                .filter(|s| s.source_name == "List")
                .count();
            assert_eq!(count, 1, "List<int> must be instantiated exactly once");
        }

        #[test]
        fn field_order_is_declaration_order() {
            let program = resolve_ok(
                "structure Point {
                    int x;
                    int y;
                    int z;
                }
                void main() {
                    Point p = Point();
                    p.z = 3;
                }",
            );
            let point = program.get_struct("Point").unwrap();
            let fields: Vec<_> = point.fields.iter().map(|(n, _)| n.as_str()).collect();
            assert_eq!(fields, vec!["x", "y", "z"]);
        }

        #[test]
        fn alias_is_transparent() {
            let program = resolve_ok(
                "alias numbers = array<int>;
                 void main() {
                    numbers xs = [1, 2, 3];
                    write_int(xs[0]);
                 }",
            );
            // No structure named `numbers` exists after resolution.
            assert!(!program.struct_index.contains_key("numbers"));
        }

        #[test]
        fn generic_alias_substitutes_arguments() {
            let program = resolve_ok(
                "alias grid<T> = array<array<T>>;
                 void main() {
                    grid<int> g = null;
                 }",
            );
            assert!(function_names(&program).contains(&"main"));
        }

        #[test]
        fn char_and_int_interchange_in_calls() {
            resolve_ok("void main() { write_chr('a'); write_int('b'); }");
        }

        #[test]
        fn string_literal_types_as_vec_of_char() {
            let program = resolve_ok("void main() { print(\"hi\"); }");
            assert!(program.struct_index.contains_key("vec$char"));
        }

        #[test]
        fn static_method_resolves_without_receiver() {
            let program = resolve_ok(
                "structure Counter {
                    int value;

                    static int zero() {
                        return 0;
                    }
                }
                void main() {
                    write_int(Counter.zero());
                }",
            );
            assert!(function_names(&program).contains(&"Counter$$zero"));
        }
    }

    mod diagnostics {
        use super::*;

        fn first_error(source: &str) -> TypeCheckError {
            resolve(source).expect_err("expected resolution to fail")[0].clone()
        }

        #[test]
        fn unknown_identifier() {
            assert!(matches!(
                first_error("void main() { write_int(missing); }"),
                TypeCheckError::UnknownIdentifier { name, .. } if name == "missing"
            ));
        }

        #[test]
        fn assignment_type_mismatch() {
            assert!(matches!(
                first_error("void main() { int x = true; }"),
                TypeCheckError::TypeMismatch { .. }
            ));
        }

        #[test]
        fn condition_must_be_boolean() {
            assert!(matches!(
                first_error("void main() { if (1) { } }"),
                TypeCheckError::ConditionNotBoolean { .. }
            ));
        }

        #[test]
        fn duplicate_declaration() {
            assert!(matches!(
                first_error("int f() { return 1; } int f() { return 2; }"),
                TypeCheckError::DuplicateDeclaration { name, .. } if name == "f"
            ));
        }

        #[test]
        fn duplicate_variable_in_same_scope() {
            assert!(matches!(
                first_error("void main() { int x = 1; int x = 2; }"),
                TypeCheckError::DuplicateVariable { name, .. } if name == "x"
            ));
        }

        #[test]
        fn shadowing_in_nested_scope_is_allowed() {
            resolve_ok("void main() { int x = 1; { int x = 2; write_int(x); } }");
        }

        #[test]
        fn float_is_rejected() {
            assert!(matches!(
                first_error("void main() { float x = 1; }"),
                TypeCheckError::FloatUnsupported { .. }
            ));
        }

        #[test]
        fn alias_cycle_fails_even_when_unused() {
            let errors = resolve("alias A = B;\nalias B = A;\nvoid main() { }")
                .expect_err("cyclic aliases must fail");
            assert!(errors
                .iter()
                .any(|e| matches!(e, TypeCheckError::AliasCycle { .. })));
        }

        #[test]
        fn diverging_generic_is_cut_off() {
            let errors = resolve(
                "structure Nest<T> {
                    Nest<vec<T>> deeper;
                    int value;
                }
                void main() {
                    Nest<int> n = null;
                }",
            )
            .expect_err("divergent monomorphization must fail");
            assert!(errors
                .iter()
                .any(|e| matches!(e, TypeCheckError::MonomorphizationDiverges { .. })));
        }

        #[test]
        fn argument_count_mismatch() {
            assert!(matches!(
                first_error("void main() { write_int(1, 2); }"),
                TypeCheckError::ArgumentCountMismatch { .. }
            ));
        }

        #[test]
        fn method_not_found() {
            assert!(matches!(
                first_error(
                    "structure Point { int x; }
                     void main() { Point p = Point(); p.missing(); }"
                ),
                TypeCheckError::MethodNotFound { .. }
            ));
        }

        #[test]
        fn field_not_found() {
            assert!(matches!(
                first_error(
                    "structure Point { int x; }
                     void main() { Point p = Point(); write_int(p.y); }"
                ),
                TypeCheckError::FieldNotFound { .. }
            ));
        }

        #[test]
        fn static_method_called_on_instance() {
            assert!(matches!(
                first_error(
                    "structure C {
                        int v;
                        static int zero() { return 0; }
                     }
                     void main() { C c = C(); write_int(c.zero()); }"
                ),
                TypeCheckError::StaticMethodCalledOnInstance { .. }
            ));
        }

        #[test]
        fn break_outside_loop() {
            assert!(matches!(
                first_error("void main() { break; }"),
                TypeCheckError::OutsideLoop { keyword: "break", .. }
            ));
        }

        #[test]
        fn this_outside_method() {
            assert!(matches!(
                first_error("void main() { write_int(this.x); }"),
                TypeCheckError::ThisOutsideMethod { .. }
            ));
        }

        #[test]
        fn null_needs_reference_context() {
            assert!(matches!(
                first_error("void main() { int x = null; }"),
                TypeCheckError::NullNotAllowed { .. }
            ));
        }

        #[test]
        fn null_is_assignable_to_structures() {
            resolve_ok(
                "structure Point { int x; }
                 void main() { Point p = null; }",
            );
        }

        #[test]
        fn null_comparison_with_structure() {
            resolve_ok(
                "structure Point { int x; }
                 void main() {
                    Point p = null;
                    if (p == null) { write_int(1); }
                 }",
            );
        }

        #[test]
        fn array_length_cannot_be_assigned() {
            assert!(matches!(
                first_error("void main() { array<int> a = [1]; a.length = 5; }"),
                TypeCheckError::ArrayLengthImmutable { .. }
            ));
        }

        #[test]
        fn missing_constructor_with_arguments() {
            assert!(matches!(
                first_error(
                    "structure Point { int x; }
                     void main() { Point p = Point(1); }"
                ),
                TypeCheckError::MissingConstructor { .. }
            ));
        }

        #[test]
        fn casts_between_scalars_resolve() {
            resolve_ok(
                "void main() {
                    int n = int('a');
                    char c = char(65);
                    boolean b = boolean(5);
                    write_int(n);
                 }",
            );
        }

        #[test]
        fn cast_from_structure_is_rejected() {
            assert!(matches!(
                first_error(
                    "structure Point { int x; }
                     void main() { Point p = Point(); int n = int(p); }"
                ),
                TypeCheckError::InvalidCast { .. }
            ));
        }

        #[test]
        fn errors_are_collected_across_functions() {
            let errors = resolve(
                "void f() { write_int(missing1); }
                 void g() { write_int(missing2); }
                 void main() { }",
            )
            .expect_err("both bodies must be diagnosed");
            assert_eq!(errors.len(), 2);
        }
    }
}
