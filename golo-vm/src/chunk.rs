// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode chunks, function prototypes and code units.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::OpCode;
use crate::dispatch::CallSite;
use crate::value::{StructType, TypeKey, UnionVariant, Value};
use crate::vm::{Result, VM};

/// Debug information for a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LineInfo {
    /// Source line number (1-indexed).
    pub line: u32,
    /// Source column number (1-indexed).
    pub column: u32,
}

impl LineInfo {
    /// Create a new LineInfo.
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }
}

/// A protected instruction range and the offset of its handler.
///
/// Entries are ordered innermost first, so the first entry covering a faulting
/// instruction wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerEntry {
    /// First protected instruction.
    pub start: usize,
    /// One past the last protected instruction.
    pub end: usize,
    /// Handler entry point. The exception is on top of the stack there.
    pub handler: usize,
}

impl HandlerEntry {
    pub fn covers(&self, ip: usize) -> bool {
        self.start <= ip && ip < self.end
    }
}

/// `^module::name` as written in the source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionRefConstant {
    pub module: Option<String>,
    pub name: String,
}

/// A chunk of bytecode with its constant pool, call sites and debug
/// information.
#[derive(Debug, Default)]
pub struct Chunk {
    /// The bytecode instructions.
    pub code: Vec<OpCode>,

    /// Constant pool: literals and class references.
    pub constants: Vec<Value>,

    /// Debug info: source location for each instruction.
    /// Same length as `code`.
    pub lines: Vec<LineInfo>,

    /// Dynamic call sites, addressed by the `Invoke*` instructions.
    pub call_sites: Vec<CallSite>,

    /// Exception handler table.
    pub handlers: Vec<HandlerEntry>,

    /// Function reference literals, addressed by `LoadFunctionRef`.
    pub function_refs: Vec<FunctionRefConstant>,
}

impl Chunk {
    /// Create a new empty chunk.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit an instruction with source location.
    pub fn emit(&mut self, op: OpCode, line_info: LineInfo) {
        self.code.push(op);
        self.lines.push(line_info);
    }

    /// Emit an instruction without source location (uses default).
    pub fn emit_op(&mut self, op: OpCode) {
        self.emit(op, LineInfo::default());
    }

    /// Add a constant to the pool and return its index.
    ///
    /// Returns `None` if the constant pool is full (> u16::MAX entries).
    pub fn add_constant(&mut self, value: Value) -> Option<u16> {
        if let Some(i) = self
            .constants
            .iter()
            .position(|existing| Self::constants_equal(existing, &value))
        {
            return Some(i as u16);
        }

        let idx = self.constants.len();
        if idx > u16::MAX as usize {
            return None;
        }
        self.constants.push(value);
        Some(idx as u16)
    }

    /// Constants are deduplicated only when they are also the same class, so
    /// `1` and `1_L` keep separate slots.
    fn constants_equal(a: &Value, b: &Value) -> bool {
        a.type_key() == b.type_key() && a == b
    }

    /// Register a call site and return its index.
    pub fn add_call_site(&mut self, site: CallSite) -> Option<u16> {
        let idx = self.call_sites.len();
        if idx > u16::MAX as usize {
            return None;
        }
        self.call_sites.push(site);
        Some(idx as u16)
    }

    pub fn add_function_ref(&mut self, constant: FunctionRefConstant) -> Option<u16> {
        if let Some(i) = self.function_refs.iter().position(|c| *c == constant) {
            return Some(i as u16);
        }
        let idx = self.function_refs.len();
        if idx > u16::MAX as usize {
            return None;
        }
        self.function_refs.push(constant);
        Some(idx as u16)
    }

    /// Get the current instruction offset (for jump patching).
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Patch a jump instruction at the given offset to jump to the current position.
    pub fn patch_jump(&mut self, offset: usize) {
        let jump_distance = self.code.len() as i16 - offset as i16 - 1;
        self.set_jump_target(offset, jump_distance);
    }

    /// Overwrite the distance of the jump at `offset`.
    pub fn set_jump_target(&mut self, offset: usize, distance: i16) {
        match &mut self.code[offset] {
            OpCode::Jump(target)
            | OpCode::JumpIfFalse(target)
            | OpCode::JumpIfTrue(target)
            | OpCode::PopJumpIfFalse(target)
            | OpCode::PopJumpIfTrue(target) => {
                *target = distance;
            }
            other => debug_assert!(false, "patch_jump called on non-jump: {:?}", other),
        }
    }

    /// Get the source location for an instruction at the given offset.
    pub fn get_line_info(&self, offset: usize) -> Option<LineInfo> {
        self.lines.get(offset).copied()
    }
}

/// A compiled function body.
#[derive(Debug)]
pub struct FunctionPrototype {
    /// Function name.
    pub name: String,

    /// Number of parameters, captured ones included.
    pub arity: usize,

    /// Whether the last parameter collects extra arguments into an array.
    pub varargs: bool,

    /// The compiled bytecode for this function's body.
    pub chunk: Chunk,

    /// Number of local slots needed (parameters, locals and temporaries).
    pub local_count: u16,
}

impl FunctionPrototype {
    /// Create a new function prototype.
    pub fn new(name: impl Into<String>, arity: usize, varargs: bool) -> Self {
        Self {
            name: name.into(),
            arity,
            varargs,
            chunk: Chunk::new(),
            local_count: 0,
        }
    }
}

/// A function implemented by the host.
pub type NativeFn = Arc<dyn Fn(&mut VM, &[Value]) -> Result<Value> + Send + Sync>;

#[derive(Clone)]
pub enum FunctionBody {
    Bytecode(Arc<FunctionPrototype>),
    Native(NativeFn),
}

/// A function as seen by the dispatch runtime.
#[derive(Clone)]
pub struct UnitFunction {
    pub name: String,
    pub arity: usize,
    pub varargs: bool,
    pub public: bool,
    /// Closure bodies and other generated functions.
    pub synthetic: bool,
    pub body: FunctionBody,
}

impl UnitFunction {
    pub fn native(
        name: impl Into<String>,
        arity: usize,
        varargs: bool,
        f: impl Fn(&mut VM, &[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Self {
        UnitFunction {
            name: name.into(),
            arity,
            varargs,
            public: true,
            synthetic: false,
            body: FunctionBody::Native(Arc::new(f)),
        }
    }

    /// Whether a call with `argc` arguments can bind to this function.
    pub fn accepts(&self, argc: usize) -> bool {
        if self.varargs {
            argc + 1 >= self.arity
        } else {
            argc == self.arity
        }
    }
}

impl fmt::Debug for UnitFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}{}",
            self.name,
            self.arity,
            if self.varargs { "..." } else { "" }
        )
    }
}

/// What produced a code unit.
#[derive(Debug, Clone)]
pub enum UnitKind {
    Module,
    /// Functions added to one target class.
    Augmentation(TypeKey),
    NamedAugmentation,
    Struct(Arc<StructType>),
    Union(Vec<Arc<UnionVariant>>),
    UnionVariant(Arc<UnionVariant>),
    /// Host functions, including the predefined module.
    Native,
}

/// A named, loadable unit of code: a module, one of its auxiliary units, or a
/// native module.
pub struct CodeUnit {
    /// Fully-qualified name.
    pub name: String,
    pub kind: UnitKind,
    /// Name of the module this unit was compiled from.
    pub module: String,
    /// Imports of that module.
    pub imports: Vec<String>,
    pub functions: Vec<Arc<UnitFunction>>,
    by_name: HashMap<String, Vec<usize>>,
    /// Augmented target classes, in declaration order.
    pub augmentations: Vec<TypeKey>,
    /// Named augmentations applied to each target class.
    pub applications: Vec<(TypeKey, Vec<String>)>,
    /// Module state, shared by every unit of one compilation.
    pub statics: Arc<RwLock<Vec<Value>>>,
    /// Index of the module-state initialiser.
    pub init: Option<usize>,
}

impl CodeUnit {
    pub fn new(name: impl Into<String>, kind: UnitKind, module: impl Into<String>) -> Self {
        CodeUnit {
            name: name.into(),
            kind,
            module: module.into(),
            imports: Vec::new(),
            functions: Vec::new(),
            by_name: HashMap::new(),
            augmentations: Vec::new(),
            applications: Vec::new(),
            statics: Arc::new(RwLock::new(Vec::new())),
            init: None,
        }
    }

    /// A unit holding only host functions.
    pub fn native(name: impl Into<String>) -> Self {
        let name = name.into();
        CodeUnit::new(name.clone(), UnitKind::Native, name)
    }

    pub fn add_function(&mut self, function: UnitFunction) -> usize {
        let index = self.functions.len();
        self.by_name
            .entry(function.name.clone())
            .or_default()
            .push(index);
        self.functions.push(Arc::new(function));
        index
    }

    /// Indices of all functions with this name, in declaration order.
    pub fn functions_named(&self, name: &str) -> &[usize] {
        self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// The function `name` callable with `argc` arguments. Exact arities win
    /// over variadic ones.
    pub fn find_function(&self, name: &str, argc: usize) -> Option<usize> {
        let candidates = self.functions_named(name);
        candidates
            .iter()
            .copied()
            .find(|&i| !self.functions[i].varargs && self.functions[i].arity == argc)
            .or_else(|| {
                candidates
                    .iter()
                    .copied()
                    .find(|&i| self.functions[i].accepts(argc))
            })
    }

    /// The first function called `name`, whatever its arity.
    pub fn first_function(&self, name: &str) -> Option<usize> {
        self.functions_named(name).first().copied()
    }

    pub fn function(&self, index: usize) -> Option<&Arc<UnitFunction>> {
        self.functions.get(index)
    }

    /// A copy of this unit with `function` added. Function indices of the
    /// copy match the original's.
    pub fn with_function(&self, function: UnitFunction) -> CodeUnit {
        let mut unit = CodeUnit {
            name: self.name.clone(),
            kind: self.kind.clone(),
            module: self.module.clone(),
            imports: self.imports.clone(),
            functions: self.functions.clone(),
            by_name: self.by_name.clone(),
            augmentations: self.augmentations.clone(),
            applications: self.applications.clone(),
            statics: Arc::clone(&self.statics),
            init: self.init,
        };
        unit.add_function(function);
        unit
    }
}

impl fmt::Debug for CodeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CodeUnit")
            .field("name", &self.name)
            .field("kind", &self.kind)
            .field("functions", &self.functions)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constants_are_deduplicated_per_class() {
        let mut chunk = Chunk::new();
        let a = chunk.add_constant(Value::Integer(1));
        let b = chunk.add_constant(Value::Integer(1));
        let c = chunk.add_constant(Value::Long(1));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_patch_jump_forward() {
        let mut chunk = Chunk::new();
        chunk.emit_op(OpCode::Jump(0));
        chunk.emit_op(OpCode::Null);
        chunk.emit_op(OpCode::Pop);
        chunk.patch_jump(0);
        assert_eq!(chunk.code[0], OpCode::Jump(2));
    }

    #[test]
    fn test_find_function_prefers_exact_arity() {
        let mut unit = CodeUnit::native("m");
        unit.add_function(UnitFunction::native("f", 2, true, |_, _| Ok(Value::Null)));
        unit.add_function(UnitFunction::native("f", 1, false, |_, _| Ok(Value::Null)));
        assert_eq!(unit.find_function("f", 1), Some(1));
        assert_eq!(unit.find_function("f", 3), Some(0));
        assert_eq!(unit.find_function("f", 0), None);
        assert_eq!(unit.find_function("g", 0), None);
    }

    #[test]
    fn test_with_function_keeps_original() {
        let mut unit = CodeUnit::native("m");
        unit.add_function(UnitFunction::native("f", 0, false, |_, _| Ok(Value::Null)));
        let extended = unit.with_function(UnitFunction::native("g", 1, false, |_, _| {
            Ok(Value::Null)
        }));
        assert_eq!(unit.functions.len(), 1);
        assert_eq!(extended.find_function("f", 0), Some(0));
        assert_eq!(extended.find_function("g", 1), Some(1));
        assert!(Arc::ptr_eq(&unit.statics, &extended.statics));
    }

    #[test]
    fn test_handler_range() {
        let entry = HandlerEntry {
            start: 2,
            end: 5,
            handler: 9,
        };
        assert!(entry.covers(2));
        assert!(entry.covers(4));
        assert!(!entry.covers(5));
    }
}
