// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Code generation: turns a verified IR module into code units.
//!
//! Every call (function, method, operator, closure) becomes an `Invoke*`
//! instruction addressing a fresh call site that carries only the symbolic
//! descriptor. Linking happens at run time.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::chunk::{
    Chunk, CodeUnit, FunctionBody, FunctionPrototype, FunctionRefConstant, HandlerEntry, LineInfo,
    UnitFunction, UnitKind,
};
use crate::dispatch::CallSite;
use crate::opcode::OpCode;
use crate::value::{TypeKey, Value};

use super::emit::{BytecodeEmitter, control};
use golo_parser::CollectionKind;

use super::ir::{
    Assignment, Block, Conditional, Constant, ElseBranch, Expr, FlowKind,
    Function, InvocationMode, Loop, Module, NodeId, OperatorKind, RefId, ScopeId, Stmt,
    TryCatchFinally,
};
use super::types::{CodegenError, LoopContext, Result, TryContext};
use super::units;

/// The code units produced from one module: the module unit first, then its
/// auxiliary units.
#[derive(Debug)]
pub struct CompiledModule {
    pub name: String,
    pub units: Vec<CodeUnit>,
}

impl CompiledModule {
    /// The primary module unit.
    pub fn module_unit(&self) -> Option<&CodeUnit> {
        self.units.first()
    }
}

/// Generate code for a module that passed verification.
pub fn generate(module: &Module) -> Result<CompiledModule> {
    let state: Vec<String> = module
        .module_state()
        .into_iter()
        .map(|r| module.scopes.reference(r).name.clone())
        .collect();
    let mut statics = HashMap::with_capacity(state.len());
    for (i, name) in state.iter().enumerate() {
        let slot = u16::try_from(i).map_err(|_| CodegenError::TooManyLocals(name.clone()))?;
        statics.insert(name.clone(), slot);
    }
    let shared_statics = Arc::new(RwLock::new(vec![Value::Null; state.len()]));
    let imports: Vec<String> = module.imports.iter().cloned().collect();

    let context = GenContext {
        module,
        statics: &statics,
    };

    let mut main = UnitBuilder::new(&module.name, UnitKind::Module, module);
    for function in module.functions.values() {
        compile_function(&context, &mut main, function)?;
    }
    let init = match &module.initializer {
        Some(init) => Some(compile_function(&context, &mut main, init)?),
        None => None,
    };

    let mut auxiliary = Vec::new();
    let mut augmented = Vec::new();
    for (target, functions) in &module.augmentations {
        let key = resolve_class(module, target);
        let name = format!("{}${}", module.name, key.mangled_name());
        let mut builder = UnitBuilder::new(&name, UnitKind::Augmentation(key.clone()), module);
        for function in functions {
            compile_function(&context, &mut builder, function)?;
        }
        augmented.push(key);
        auxiliary.push(builder);
    }
    for (augmentation, functions) in &module.named_augmentations {
        let name = format!("{}${}", module.name, augmentation);
        let mut builder = UnitBuilder::new(&name, UnitKind::NamedAugmentation, module);
        for function in functions {
            compile_function(&context, &mut builder, function)?;
        }
        auxiliary.push(builder);
    }
    let applications = module
        .augmentation_applications
        .iter()
        .map(|(target, names)| (resolve_class(module, target), names.clone()))
        .collect();

    let mut units = Vec::with_capacity(1 + auxiliary.len());
    let mut main = main.finish()?;
    main.init = init;
    main.augmentations = augmented;
    main.applications = applications;
    units.push(main);
    for builder in auxiliary {
        units.push(builder.finish()?);
    }
    units.extend(units::type_units(module));

    for unit in &mut units {
        unit.imports = imports.clone();
        unit.statics = Arc::clone(&shared_statics);
    }

    log::debug!(
        "generated {} unit(s) for module {}",
        units.len(),
        module.name
    );
    Ok(CompiledModule {
        name: module.name.clone(),
        units,
    })
}

/// Map a class name as written in the source to its runtime class.
///
/// Built-in names win, then the module's own structs, unions and union
/// variants. Anything else is taken as a fully-qualified struct name.
pub fn resolve_class(module: &Module, name: &str) -> TypeKey {
    if let Some(key) = TypeKey::builtin(name) {
        return key;
    }
    if module.has_struct(name) {
        return TypeKey::Struct(units::qualified_type_name(&module.name, name).into());
    }
    if module.has_union(name) {
        return TypeKey::Union(units::qualified_type_name(&module.name, name).into());
    }
    if let Some((union, variant)) = name.split_once('.')
        && module
            .unions
            .iter()
            .any(|u| u.name == union && u.variants.iter().any(|(v, _)| v == variant))
    {
        return TypeKey::UnionValue(units::qualified_type_name(&module.name, name).into());
    }
    TypeKey::Struct(name.into())
}

// ============================================================================
// Units under construction
// ============================================================================

struct GenContext<'a> {
    module: &'a Module,
    /// Module-state name to static slot.
    statics: &'a HashMap<String, u16>,
}

/// Functions of a unit, filled in as they are compiled. A slot is reserved
/// before a body is compiled so the body can refer to its own index.
struct UnitBuilder {
    name: String,
    kind: UnitKind,
    module: String,
    functions: Vec<Option<UnitFunction>>,
}

impl UnitBuilder {
    fn new(name: &str, kind: UnitKind, module: &Module) -> Self {
        UnitBuilder {
            name: name.to_string(),
            kind,
            module: module.name.clone(),
            functions: Vec::new(),
        }
    }

    fn reserve(&mut self) -> usize {
        self.functions.push(None);
        self.functions.len() - 1
    }

    fn fill(&mut self, index: usize, function: UnitFunction) {
        self.functions[index] = Some(function);
    }

    fn finish(self) -> Result<CodeUnit> {
        let mut unit = CodeUnit::new(self.name, self.kind, self.module);
        for (i, function) in self.functions.into_iter().enumerate() {
            let function = function.ok_or_else(|| {
                CodegenError::Internal(format!("function #{} of {} never compiled", i, unit.name))
            })?;
            unit.add_function(function);
        }
        Ok(unit)
    }
}

fn compile_function(
    context: &GenContext<'_>,
    unit: &mut UnitBuilder,
    function: &Function,
) -> Result<usize> {
    let index = unit.reserve();
    let mut compiler = FunctionCompiler::new(context, unit, function);
    compiler.compile_body(function, index)?;
    let prototype = compiler.finish(function)?;
    log::trace!(
        "compiled {}::{} ({} instructions)",
        unit.name,
        function.name,
        prototype.chunk.code.len()
    );
    unit.fill(
        index,
        UnitFunction {
            name: function.name.clone(),
            arity: function.arity(),
            varargs: function.varargs,
            public: function.is_public(),
            synthetic: function.synthetic,
            body: FunctionBody::Bytecode(Arc::new(prototype)),
        },
    );
    Ok(index)
}

// ============================================================================
// Function compiler
// ============================================================================

/// Compiler for one function body.
struct FunctionCompiler<'a, 'b> {
    context: &'a GenContext<'a>,
    unit: &'b mut UnitBuilder,

    /// The chunk being built.
    chunk: Chunk,

    /// Function name, for error messages.
    name: String,

    /// Lexical scopes of the blocks being compiled.
    scopes: Vec<ScopeId>,

    /// Enclosing loops, innermost last.
    loops: Vec<LoopContext>,

    /// Enclosing `try` statements, innermost last.
    tries: Vec<TryContext>,

    /// Next free slot past the locals, for `finally` temporaries.
    next_temp: usize,

    /// Current source location for debug info.
    current_line: LineInfo,
}

impl<'a, 'b> FunctionCompiler<'a, 'b> {
    fn new(context: &'a GenContext<'a>, unit: &'b mut UnitBuilder, function: &Function) -> Self {
        Self {
            context,
            unit,
            chunk: Chunk::new(),
            name: function.name.clone(),
            scopes: Vec::new(),
            loops: Vec::new(),
            tries: Vec::new(),
            next_temp: function.local_count,
            current_line: LineInfo::default(),
        }
    }

    fn finish(self, function: &Function) -> Result<FunctionPrototype> {
        let local_count = u16::try_from(self.next_temp)
            .map_err(|_| CodegenError::TooManyLocals(self.name.clone()))?;
        let mut prototype = FunctionPrototype::new(&function.name, function.arity(), function.varargs);
        prototype.chunk = self.chunk;
        prototype.local_count = local_count;
        Ok(prototype)
    }

    fn mark(&mut self, node: NodeId) {
        if let Some(position) = self.context.module.position(node) {
            self.current_line = LineInfo::new(position.line as u32, position.column as u32);
        }
    }

    fn offset(&self) -> usize {
        self.chunk.current_offset()
    }

    fn add_call_site(&mut self, site: CallSite) -> Result<u16> {
        self.chunk
            .add_call_site(site)
            .ok_or_else(|| CodegenError::TooManyCallSites(self.name.clone()))
    }

    fn alloc_temp(&mut self) -> Result<u16> {
        let slot = u16::try_from(self.next_temp)
            .map_err(|_| CodegenError::TooManyLocals(self.name.clone()))?;
        self.next_temp += 1;
        Ok(slot)
    }

    /// Jump backwards to `target`.
    fn emit_loop(&mut self, target: usize) -> Result<()> {
        let distance = target as i64 - self.offset() as i64 - 1;
        let distance =
            i16::try_from(distance).map_err(|_| CodegenError::JumpTooFar(self.name.clone()))?;
        self.emit(OpCode::Jump(distance));
        Ok(())
    }

    fn slot_of(&self, reference: RefId) -> Result<u16> {
        let local = self.context.module.scopes.reference(reference);
        u16::try_from(local.index).map_err(|_| CodegenError::MissingSlot {
            name: local.name.clone(),
            function: self.name.clone(),
        })
    }

    fn static_slot(&self, name: &str) -> Result<u16> {
        self.context
            .statics
            .get(name)
            .copied()
            .ok_or_else(|| CodegenError::MissingSlot {
                name: name.to_string(),
                function: self.name.clone(),
            })
    }

    fn load_reference(&mut self, name: &str) -> Result<()> {
        let scopes = &self.context.module.scopes;
        let reference = self
            .scopes
            .last()
            .and_then(|scope| scopes.lookup(*scope, name))
            .ok_or_else(|| CodegenError::MissingSlot {
                name: name.to_string(),
                function: self.name.clone(),
            })?;
        if scopes.reference(reference).is_module_state() {
            let slot = self.static_slot(name)?;
            self.emit(OpCode::LoadStatic(slot));
        } else {
            let slot = self.slot_of(reference)?;
            self.emit(OpCode::LoadLocal(slot));
        }
        Ok(())
    }

    fn store_reference(&mut self, reference: RefId) -> Result<()> {
        let local = self.context.module.scopes.reference(reference);
        if local.is_module_state() {
            let slot = self.static_slot(&local.name.clone())?;
            self.emit(OpCode::StoreStatic(slot));
        } else {
            let slot = self.slot_of(reference)?;
            self.emit(OpCode::StoreLocal(slot));
        }
        Ok(())
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn compile_body(&mut self, function: &Function, own_index: usize) -> Result<()> {
        self.scopes.push(function.body.scope);
        self.mark(function.node);

        // A closure bound to a name it reads rebinds that name to itself.
        if let Some(self_name) = &function.synthetic_self_name
            && let Some(reference) = self
                .context
                .module
                .scopes
                .lookup(function.body.scope, self_name)
        {
            let own = u16::try_from(own_index)
                .map_err(|_| CodegenError::Internal("too many functions in unit".into()))?;
            self.emit(OpCode::MakeClosure(own));
            let captured = function.synthetic_parameters.len();
            for slot in 0..captured {
                self.emit(OpCode::LoadLocal(slot as u16));
            }
            if captured > 0 {
                self.emit(OpCode::BindLeading(captured as u8));
            }
            self.store_reference(reference)?;
        }

        for statement in &function.body.statements {
            self.compile_statement(statement)?;
        }
        if !function.body.returns() {
            self.emit(OpCode::Null);
            self.emit(OpCode::Return);
        }
        self.scopes.pop();
        Ok(())
    }

    fn compile_statement(&mut self, statement: &Stmt) -> Result<()> {
        match statement {
            Stmt::Assign(assignment) => self.compile_assignment(assignment),
            Stmt::Return { value, node } => {
                self.mark(*node);
                self.compile_expr(value)?;
                self.run_finallies(0)?;
                self.emit(OpCode::Return);
                Ok(())
            }
            Stmt::Throw { value, node } => {
                self.mark(*node);
                self.compile_expr(value)?;
                self.emit(OpCode::Throw);
                Ok(())
            }
            Stmt::If(conditional) => self.compile_conditional(conditional),
            Stmt::Loop(l) => self.compile_loop(l),
            Stmt::Flow { kind, node } => {
                self.mark(*node);
                self.compile_flow(*kind)
            }
            Stmt::Try(t) => self.compile_try(t),
            Stmt::Block(block) => self.compile_block(block),
            Stmt::Expr(expression) => {
                // The value of an expression statement is discarded.
                self.compile_expr(expression)?;
                self.emit(OpCode::Pop);
                Ok(())
            }
        }
    }

    fn compile_assignment(&mut self, assignment: &Assignment) -> Result<()> {
        self.mark(assignment.node);
        self.compile_expr(&assignment.value)?;
        self.store_reference(assignment.target)
    }

    fn compile_conditional(&mut self, conditional: &Conditional) -> Result<()> {
        self.mark(conditional.node);
        match &conditional.otherwise {
            Some(ElseBranch::Block(block)) => control::compile_if(
                self,
                &conditional.condition,
                &conditional.then,
                Some(&|e: &mut Self| e.compile_block(block)),
            ),
            Some(ElseBranch::If(nested)) => control::compile_if(
                self,
                &conditional.condition,
                &conditional.then,
                Some(&|e: &mut Self| e.compile_conditional(nested)),
            ),
            None => control::compile_if(self, &conditional.condition, &conditional.then, None),
        }
    }

    fn compile_loop(&mut self, l: &Loop) -> Result<()> {
        self.mark(l.node);
        if let Some(init) = &l.init {
            self.compile_assignment(init)?;
        }

        let start = self.offset();
        self.compile_expr(&l.condition)?;
        let exit_jump = self.emit_jump(OpCode::PopJumpIfFalse(0));

        self.loops.push(LoopContext {
            try_depth: self.tries.len(),
            ..LoopContext::default()
        });
        let body = self.compile_block(&l.body);
        let context = self
            .loops
            .pop()
            .ok_or_else(|| CodegenError::Internal("loop context lost".into()))?;
        body?;

        // `continue` runs the post statement before testing again.
        for jump in context.continues {
            self.patch_jump(jump)?;
        }
        if let Some(post) = &l.post {
            self.compile_statement(post)?;
        }
        self.emit_loop(start)?;

        self.patch_jump(exit_jump)?;
        for jump in context.breaks {
            self.patch_jump(jump)?;
        }
        Ok(())
    }

    fn compile_flow(&mut self, kind: FlowKind) -> Result<()> {
        let try_depth = self
            .loops
            .last()
            .map(|l| l.try_depth)
            .ok_or_else(|| CodegenError::Internal("break or continue outside a loop".into()))?;
        self.run_finallies(try_depth)?;
        let jump = self.emit_jump(OpCode::Jump(0));
        if let Some(context) = self.loops.last_mut() {
            match kind {
                FlowKind::Break => context.breaks.push(jump),
                FlowKind::Continue => context.continues.push(jump),
            }
        }
        Ok(())
    }

    /// Inline the `finally` blocks of every `try` from `from` outwards, for
    /// an early exit. Each block is compiled as if its own `try` were already
    /// left, and its copy is a gap in that `try` and every `try` inside it.
    fn run_finallies(&mut self, from: usize) -> Result<()> {
        let mut index = self.tries.len();
        while index > from {
            index -= 1;
            let Some(finally) = self.tries[index].finally.clone() else {
                continue;
            };
            let inner = self.tries.split_off(index);
            let copy_start = self.offset();
            let result = self.compile_block(&finally);
            let copy_end = self.offset();
            self.tries.extend(inner);
            result?;
            for context in &mut self.tries[index..] {
                context.gaps.push((copy_start, copy_end));
            }
        }
        Ok(())
    }

    /// Register `handler` for `start..end`, skipping the context's gaps.
    fn protect(&mut self, context: &TryContext, start: usize, end: usize, handler: usize) {
        for (start, end) in context.protected(start, end) {
            self.chunk.handlers.push(HandlerEntry {
                start,
                end,
                handler,
            });
        }
    }

    fn compile_try(&mut self, t: &TryCatchFinally) -> Result<()> {
        self.mark(t.node);
        let mut exits = Vec::new();

        let start = self.offset();
        self.tries.push(TryContext::new(t.finally.clone()));
        let body = self.compile_block(&t.body);
        let body_context = self
            .tries
            .pop()
            .ok_or_else(|| CodegenError::Internal("try context lost".into()))?;
        body?;
        let body_end = self.offset();
        if let Some(finally) = &t.finally {
            self.compile_block(finally)?;
        }
        exits.push(self.emit_jump(OpCode::Jump(0)));

        let mut catch_range = None;
        if let Some(catch) = &t.catch {
            let catch_start = self.offset();
            self.tries.push(TryContext::new(t.finally.clone()));
            let caught = self.compile_catch(&catch.name, &catch.body);
            let catch_context = self
                .tries
                .pop()
                .ok_or_else(|| CodegenError::Internal("try context lost".into()))?;
            caught?;
            let catch_end = self.offset();
            if let Some(finally) = &t.finally {
                self.compile_block(finally)?;
            }
            exits.push(self.emit_jump(OpCode::Jump(0)));
            catch_range = Some((catch_start, catch_end, catch_context));
        }

        let mut finally_handler = None;
        if let Some(finally) = &t.finally {
            let handler = self.offset();
            let temp = self.alloc_temp()?;
            self.emit(OpCode::StoreLocal(temp));
            self.compile_block(finally)?;
            self.emit(OpCode::LoadLocal(temp));
            self.emit(OpCode::Throw);
            finally_handler = Some(handler);
        }

        for jump in exits {
            self.patch_jump(jump)?;
        }

        // Inner handlers were registered while compiling the blocks, so these
        // land after them.
        if let Some((catch_start, _, _)) = &catch_range {
            self.protect(&body_context, start, body_end, *catch_start);
        }
        if let Some(handler) = finally_handler {
            self.protect(&body_context, start, body_end, handler);
            if let Some((catch_start, catch_end, catch_context)) = &catch_range {
                self.protect(catch_context, *catch_start, *catch_end, handler);
            }
        }
        Ok(())
    }

    /// The handler entry point: the exception is on the stack.
    fn compile_catch(&mut self, name: &str, body: &Block) -> Result<()> {
        match self.context.module.scopes.lookup(body.scope, name) {
            Some(reference) => self.store_reference(reference)?,
            None => self.emit(OpCode::Pop),
        }
        self.compile_block(body)
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn compile_constant(&mut self, constant: &Constant) -> Result<()> {
        match constant {
            Constant::Null => self.emit(OpCode::Null),
            Constant::Bool(true) => self.emit(OpCode::True),
            Constant::Bool(false) => self.emit(OpCode::False),
            Constant::Integer(n) => self.emit_constant(Value::Integer(*n))?,
            Constant::Long(n) => self.emit_constant(Value::Long(*n))?,
            Constant::Float(n) => self.emit_constant(Value::Float(*n))?,
            Constant::Double(n) => self.emit_constant(Value::Double(*n))?,
            Constant::BigInteger(n) => self.emit_constant(Value::big(n.clone()))?,
            Constant::String(s) => self.emit_constant(Value::string(s.as_str()))?,
            Constant::Char(c) => self.emit_constant(Value::Char(*c))?,
            Constant::Class(name) => {
                let key = resolve_class(self.context.module, name);
                self.emit_constant(Value::Class(key))?;
            }
            Constant::FunctionRef { module, name } => {
                let index = self
                    .chunk
                    .add_function_ref(FunctionRefConstant {
                        module: module.clone(),
                        name: name.clone(),
                    })
                    .ok_or_else(|| CodegenError::TooManyConstants(self.name.clone()))?;
                self.emit(OpCode::LoadFunctionRef(index));
            }
            Constant::Decimal(text) => {
                return Err(CodegenError::UnsupportedConstant(format!("decimal {}", text)));
            }
        }
        Ok(())
    }

    fn compile_arguments(&mut self, arguments: &[Expr]) -> Result<()> {
        for argument in arguments {
            self.compile_expr(argument)?;
        }
        Ok(())
    }

    fn compile_binary(&mut self, op: OperatorKind, left: &Expr, right: &Expr) -> Result<()> {
        match op {
            OperatorKind::And => control::compile_and(self, left, right),
            OperatorKind::Or => control::compile_or(self, left, right),
            OperatorKind::MethodCall | OperatorKind::ElvisMethodCall => {
                let Expr::MethodCall(call) = right else {
                    return Err(CodegenError::Internal(
                        "method call operator without a method invocation".into(),
                    ));
                };
                self.compile_expr(left)?;
                self.compile_arguments(&call.arguments)?;
                self.mark(call.node);
                let site = self.add_call_site(CallSite::method(
                    &call.name,
                    call.arguments.len() + 1,
                    call.null_safe || op == OperatorKind::ElvisMethodCall,
                ))?;
                self.emit(OpCode::InvokeMethod(site));
                Ok(())
            }
            OperatorKind::AnonCall => {
                let Expr::FunctionCall(call) = right else {
                    return Err(CodegenError::Internal(
                        "anonymous call without an invocation".into(),
                    ));
                };
                self.compile_expr(left)?;
                self.compile_arguments(&call.arguments)?;
                self.mark(call.node);
                let site = self.add_call_site(CallSite::closure(call.arguments.len()))?;
                self.emit(OpCode::InvokeClosure(site));
                Ok(())
            }
            _ => {
                self.compile_expr(left)?;
                self.compile_expr(right)?;
                let site = self.add_call_site(CallSite::operator(op, 2))?;
                self.emit(OpCode::InvokeOperator(site));
                Ok(())
            }
        }
    }

    fn compile_closure(&mut self, function: &Function) -> Result<()> {
        let index = compile_function(self.context, self.unit, function)?;
        let index = u16::try_from(index)
            .map_err(|_| CodegenError::Internal("too many functions in unit".into()))?;
        self.emit(OpCode::MakeClosure(index));
        for name in &function.synthetic_parameters {
            self.load_reference(name)?;
        }
        let captured = function.synthetic_parameters.len();
        if captured > 0 {
            let captured = u8::try_from(captured)
                .map_err(|_| CodegenError::Internal("too many captured references".into()))?;
            self.emit(OpCode::BindLeading(captured));
        }
        Ok(())
    }

    fn compile_collection(&mut self, kind: CollectionKind, items: &[Expr]) -> Result<()> {
        self.compile_arguments(items)?;
        let count = u16::try_from(items.len())
            .map_err(|_| CodegenError::Internal("collection literal too large".into()))?;
        self.emit(match kind {
            CollectionKind::Array => OpCode::BuildArray(count),
            CollectionKind::List => OpCode::BuildList(count),
            CollectionKind::Vector => OpCode::BuildVector(count),
            CollectionKind::Set => OpCode::BuildSet(count),
            CollectionKind::Map => OpCode::BuildMap(count),
            CollectionKind::Tuple => OpCode::BuildTuple(count),
        });
        Ok(())
    }
}

impl BytecodeEmitter for FunctionCompiler<'_, '_> {
    fn emit(&mut self, op: OpCode) {
        self.chunk.emit(op, self.current_line);
    }

    fn emit_constant(&mut self, value: Value) -> Result<()> {
        let idx = self
            .chunk
            .add_constant(value)
            .ok_or_else(|| CodegenError::TooManyConstants(self.name.clone()))?;
        self.emit(OpCode::Const(idx));
        Ok(())
    }

    fn emit_jump(&mut self, op: OpCode) -> usize {
        let offset = self.chunk.current_offset();
        self.emit(op);
        offset
    }

    fn patch_jump(&mut self, offset: usize) -> Result<()> {
        if self.chunk.current_offset() - offset - 1 > i16::MAX as usize {
            return Err(CodegenError::JumpTooFar(self.name.clone()));
        }
        self.chunk.patch_jump(offset);
        Ok(())
    }

    fn compile_expr(&mut self, expr: &Expr) -> Result<()> {
        self.mark(expr.node());
        match expr {
            Expr::Constant { value, .. } => self.compile_constant(value),
            Expr::Lookup { name, .. } => self.load_reference(name),
            Expr::Binary {
                op, left, right, ..
            } => self.compile_binary(*op, left, right),
            Expr::Unary { op, operand, .. } => {
                self.compile_expr(operand)?;
                let site = self.add_call_site(CallSite::operator(*op, 1))?;
                self.emit(OpCode::InvokeOperator(site));
                Ok(())
            }
            Expr::FunctionCall(call) => match call.mode {
                InvocationMode::Static => {
                    self.compile_arguments(&call.arguments)?;
                    self.mark(call.node);
                    let site = self.add_call_site(CallSite::function(
                        &call.name,
                        call.arguments.len(),
                        call.constant,
                    ))?;
                    self.emit(OpCode::InvokeFunction(site));
                    Ok(())
                }
                InvocationMode::OnReference | InvocationMode::OnModuleState => {
                    self.load_reference(&call.name)?;
                    self.compile_arguments(&call.arguments)?;
                    self.mark(call.node);
                    let site = self.add_call_site(CallSite::closure(call.arguments.len()))?;
                    self.emit(OpCode::InvokeClosure(site));
                    Ok(())
                }
                InvocationMode::Anonymous => Err(CodegenError::Internal(
                    "anonymous invocation outside an anonymous call".into(),
                )),
            },
            Expr::MethodCall(call) => Err(CodegenError::Internal(format!(
                "method invocation `{}` without a receiver",
                call.name
            ))),
            Expr::Closure(closure) => self.compile_closure(&closure.function),
            Expr::Collection { kind, items, .. } => self.compile_collection(*kind, items),
        }
    }

    fn compile_block(&mut self, block: &Block) -> Result<()> {
        self.scopes.push(block.scope);
        let result = block
            .statements
            .iter()
            .try_for_each(|statement| self.compile_statement(statement));
        self.scopes.pop();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompilerOptions, compile};

    fn compiled(source: &str) -> CompiledModule {
        compile(source, &CompilerOptions::default()).unwrap()
    }

    fn prototype<'u>(unit: &'u CodeUnit, name: &str) -> &'u FunctionPrototype {
        let index = unit.first_function(name).unwrap();
        match &unit.function(index).unwrap().body {
            FunctionBody::Bytecode(prototype) => prototype,
            FunctionBody::Native(_) => panic!("expected bytecode"),
        }
    }

    #[test]
    fn test_calls_go_through_call_sites() {
        let module = compiled("module m\nfunction main = -> add(1, 2)\nfunction add = |a, b| -> a + b\n");
        let unit = module.module_unit().unwrap();
        let main = prototype(unit, "main");
        assert!(main.chunk.code.contains(&OpCode::InvokeFunction(0)));
        let add = prototype(unit, "add");
        assert_eq!(
            &add.chunk.code[..4],
            &[
                OpCode::LoadLocal(0),
                OpCode::LoadLocal(1),
                OpCode::InvokeOperator(0),
                OpCode::Return
            ]
        );
    }

    #[test]
    fn test_closure_binds_captured_values() {
        let module = compiled("module m\nfunction adder = |n| -> |x| -> n + x\n");
        let unit = module.module_unit().unwrap();
        let adder = prototype(unit, "adder");
        let closure_index = unit.first_function("__$$_closure_0").unwrap() as u16;
        assert_eq!(
            &adder.chunk.code[..3],
            &[
                OpCode::MakeClosure(closure_index),
                OpCode::LoadLocal(0),
                OpCode::BindLeading(1)
            ]
        );
        assert_eq!(unit.function(closure_index as usize).unwrap().arity, 2);
    }

    #[test]
    fn test_discarded_invocation_is_popped() {
        let module = compiled("module m\nfunction f = {\n  println(1)\n}\n");
        let f = prototype(module.module_unit().unwrap(), "f");
        let call = f
            .chunk
            .code
            .iter()
            .position(|op| matches!(op, OpCode::InvokeFunction(_)))
            .unwrap();
        assert_eq!(f.chunk.code[call + 1], OpCode::Pop);
    }

    #[test]
    fn test_try_finally_installs_handlers() {
        let module = compiled(
            "module m\nfunction f = {\n  try {\n    println(1)\n  } catch (e) {\n    println(2)\n  } finally {\n    println(3)\n  }\n}\n",
        );
        let f = prototype(module.module_unit().unwrap(), "f");
        assert_eq!(f.chunk.handlers.len(), 3);
        // The catch entry comes before the catch-all entries.
        assert_eq!(f.chunk.handlers[0].start, f.chunk.handlers[1].start);
        assert!(f.chunk.handlers[0].handler < f.chunk.handlers[1].handler);
        // One temporary past the locals holds the in-flight exception.
        assert_eq!(f.local_count, 2);
    }

    #[test]
    fn test_early_exit_finally_copy_is_unprotected() {
        let module = compiled(
            "module m\nfunction f = {\n  try {\n    return 1\n  } catch (e) {\n    return 2\n  } finally {\n    println(3)\n  }\n}\n",
        );
        let f = prototype(module.module_unit().unwrap(), "f");
        let copies: Vec<usize> = f
            .chunk
            .code
            .iter()
            .enumerate()
            .filter(|(_, op)| matches!(op, OpCode::InvokeFunction(_)))
            .map(|(ip, _)| ip)
            .collect();
        // Before `return 1`, before `return 2`, then the handler's own copy.
        assert_eq!(copies.len(), 3);
        for ip in &copies[..2] {
            assert!(f.chunk.handlers.iter().all(|h| !h.covers(*ip)));
        }
        // The body's `return` still has both handlers.
        let body_return = f
            .chunk
            .code
            .iter()
            .position(|op| *op == OpCode::Return)
            .unwrap();
        assert_eq!(f.chunk.handlers.iter().filter(|h| h.covers(body_return)).count(), 2);
    }

    #[test]
    fn test_returning_branches_leave_no_dead_code() {
        let module = compiled(
            "module m\nfunction f = |x| {\n  if x {\n    return 1\n  } else {\n    return 2\n  }\n}\n",
        );
        let f = prototype(module.module_unit().unwrap(), "f");
        assert_eq!(
            f.chunk.code,
            vec![
                OpCode::LoadLocal(0),
                OpCode::PopJumpIfFalse(2),
                OpCode::Const(0),
                OpCode::Return,
                OpCode::Const(1),
                OpCode::Return,
            ]
        );
    }

    #[test]
    fn test_auxiliary_units() {
        let module = compiled(
            "module m\nstruct Point = { x, y }\nunion Shape = {\n  Circle = { r }\n  Empty\n}\naugment String {\n  function shout = |this| -> this + \"!\"\n}\n",
        );
        let names: Vec<&str> = module.units.iter().map(|u| u.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "m",
                "m$String",
                "m.types.Point",
                "m.types.Shape",
                "m.types.Shape.Circle",
                "m.types.Shape.Empty"
            ]
        );
        assert_eq!(
            module.units[0].augmentations,
            vec![TypeKey::String]
        );
    }

    #[test]
    fn test_module_state_uses_statics() {
        let module = compiled("module m\nvar counter = 0\nfunction bump = {\n  counter = counter + 1\n}\n");
        let unit = module.module_unit().unwrap();
        let bump = prototype(unit, "bump");
        assert_eq!(bump.chunk.code[0], OpCode::LoadStatic(0));
        assert!(bump.chunk.code.contains(&OpCode::StoreStatic(0)));
        assert!(unit.init.is_some());
        assert_eq!(unit.statics.read().len(), 1);
    }

    #[test]
    fn test_class_literals_resolve() {
        let mut module = Module::new("m");
        module.structs.push(super::super::ir::StructDef {
            name: "Point".into(),
            members: vec![],
            node: NodeId(0),
        });
        assert_eq!(resolve_class(&module, "String"), TypeKey::String);
        assert_eq!(
            resolve_class(&module, "Point"),
            TypeKey::Struct("m.types.Point".into())
        );
        assert_eq!(
            resolve_class(&module, "other.Thing"),
            TypeKey::Struct("other.Thing".into())
        );
    }
}
