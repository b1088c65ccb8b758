// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Intermediate representation.
//!
//! A [`Module`] owns its functions; functions own their body [`Block`]; each
//! block owns one reference table in the module's [`ScopeArena`]. Closures
//! are nested functions held by [`ClosureReference`] nodes. Source positions
//! are kept out of the nodes in a [`PositionTable`] keyed by [`NodeId`].

pub mod scope;

use golo_parser::{CollectionKind, Position};
use indexmap::{IndexMap, IndexSet};
use num_bigint::BigInt;

pub use scope::{LocalReference, RefId, ReferenceKind, Scope, ScopeArena, ScopeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

/// Side table of source positions.
#[derive(Debug, Clone, Default)]
pub struct PositionTable {
    positions: Vec<Option<Position>>,
}

impl PositionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a node id for something at `position`.
    pub fn node(&mut self, position: Option<Position>) -> NodeId {
        let id = NodeId(self.positions.len() as u32);
        self.positions.push(position);
        id
    }

    pub fn get(&self, node: NodeId) -> Option<Position> {
        self.positions.get(node.0 as usize).copied().flatten()
    }

    /// Forget every position; nodes then report none.
    pub fn clear(&mut self) {
        self.positions.iter_mut().for_each(|p| *p = None);
    }
}

// ============================================================================
// Module
// ============================================================================

#[derive(Debug, Clone)]
pub struct StructDef {
    pub name: String,
    pub members: Vec<String>,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub struct UnionDef {
    pub name: String,
    pub variants: Vec<(String, Vec<String>)>,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub struct Module {
    pub name: String,
    pub imports: IndexSet<String>,
    pub functions: IndexMap<String, Function>,
    /// Target type name to the functions augmenting it.
    pub augmentations: IndexMap<String, Vec<Function>>,
    pub named_augmentations: IndexMap<String, Vec<Function>>,
    /// Target type name to the named augmentations applied to it.
    pub augmentation_applications: IndexMap<String, Vec<String>>,
    pub structs: Vec<StructDef>,
    pub unions: Vec<UnionDef>,
    /// Initialises module state; absent when there is none.
    pub initializer: Option<Function>,
    pub scopes: ScopeArena,
    pub positions: PositionTable,
    /// Table of module-state references; parent of every function body.
    pub root: ScopeId,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        let mut scopes = ScopeArena::new();
        let root = scopes.new_root();
        Module {
            name: name.into(),
            imports: IndexSet::new(),
            functions: IndexMap::new(),
            augmentations: IndexMap::new(),
            named_augmentations: IndexMap::new(),
            augmentation_applications: IndexMap::new(),
            structs: Vec::new(),
            unions: Vec::new(),
            initializer: None,
            scopes,
            positions: PositionTable::new(),
            root,
        }
    }

    pub fn position(&self, node: NodeId) -> Option<Position> {
        self.positions.get(node)
    }

    /// Module-state references in declaration order.
    pub fn module_state(&self) -> Vec<RefId> {
        self.scopes
            .owned(self.root)
            .into_iter()
            .filter(|r| self.scopes.reference(*r).is_module_state())
            .collect()
    }

    pub fn has_struct(&self, name: &str) -> bool {
        self.structs.iter().any(|s| s.name == name)
    }

    pub fn has_union(&self, name: &str) -> bool {
        self.unions.iter().any(|u| u.name == name)
    }
}

// ============================================================================
// Functions and blocks
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Public,
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FunctionKind {
    Module,
    Augment,
    Closure,
    ModuleInit,
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub visibility: Visibility,
    pub kind: FunctionKind,
    pub parameters: Vec<String>,
    pub varargs: bool,
    pub synthetic: bool,
    /// Captured names, passed ahead of the declared parameters.
    pub synthetic_parameters: Vec<String>,
    /// Name the closure is bound to when it refers to itself.
    pub synthetic_self_name: Option<String>,
    pub body: Block,
    pub node: NodeId,
    /// Local slots used, set by slot assignment.
    pub local_count: usize,
}

impl Function {
    pub fn arity(&self) -> usize {
        self.synthetic_parameters.len() + self.parameters.len()
    }

    /// Captured parameters first, then declared ones.
    pub fn all_parameters(&self) -> Vec<String> {
        self.synthetic_parameters
            .iter()
            .chain(self.parameters.iter())
            .cloned()
            .collect()
    }

    pub fn is_module_init(&self) -> bool {
        self.kind == FunctionKind::ModuleInit
    }

    pub fn is_public(&self) -> bool {
        self.visibility == Visibility::Public
    }

    /// Add a captured parameter unless the name is already a parameter or
    /// the self name.
    pub fn add_synthetic_parameter(&mut self, name: &str) -> bool {
        if self.parameters.iter().any(|p| p == name)
            || self.synthetic_parameters.iter().any(|p| p == name)
            || self.synthetic_self_name.as_deref() == Some(name)
        {
            return false;
        }
        self.synthetic_parameters.push(name.to_string());
        true
    }

    /// Turn the captured parameter `name` into the self name.
    pub fn set_synthetic_self_name(&mut self, name: &str) {
        if let Some(i) = self.synthetic_parameters.iter().position(|p| p == name) {
            self.synthetic_parameters.remove(i);
            self.synthetic_self_name = Some(name.to_string());
        }
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub scope: ScopeId,
    pub statements: Vec<Stmt>,
    pub node: NodeId,
}

impl Block {
    pub fn new(scope: ScopeId, node: NodeId) -> Self {
        Block {
            scope,
            statements: Vec::new(),
            node,
        }
    }

    /// Whether every path through the block ends in `return` or `throw`.
    pub fn returns(&self) -> bool {
        self.statements.iter().any(Stmt::returns)
    }
}

// ============================================================================
// Statements
// ============================================================================

#[derive(Debug, Clone)]
pub struct Assignment {
    pub target: RefId,
    pub value: Expr,
    pub declaring: bool,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub struct Conditional {
    pub condition: Expr,
    pub then: Block,
    pub otherwise: Option<ElseBranch>,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub enum ElseBranch {
    Block(Block),
    If(Box<Conditional>),
}

impl Conditional {
    fn returns(&self) -> bool {
        self.then.returns()
            && match &self.otherwise {
                Some(ElseBranch::Block(block)) => block.returns(),
                Some(ElseBranch::If(nested)) => nested.returns(),
                None => false,
            }
    }
}

#[derive(Debug, Clone)]
pub struct Loop {
    pub init: Option<Box<Assignment>>,
    pub condition: Expr,
    pub body: Block,
    pub post: Option<Box<Stmt>>,
    pub node: NodeId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowKind {
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub struct CatchClause {
    pub name: String,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct TryCatchFinally {
    pub body: Block,
    pub catch: Option<CatchClause>,
    pub finally: Option<Block>,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Assign(Assignment),
    Return { value: Expr, node: NodeId },
    Throw { value: Expr, node: NodeId },
    If(Conditional),
    Loop(Loop),
    Flow { kind: FlowKind, node: NodeId },
    Try(TryCatchFinally),
    /// A nested block, used to scope a `for` loop's variable.
    Block(Block),
    Expr(Expr),
}

impl Stmt {
    pub fn returns(&self) -> bool {
        match self {
            Stmt::Return { .. } | Stmt::Throw { .. } => true,
            Stmt::If(conditional) => conditional.returns(),
            Stmt::Block(block) => block.returns(),
            Stmt::Try(t) => {
                t.finally.as_ref().is_some_and(Block::returns)
                    || (t.body.returns() && t.catch.as_ref().is_none_or(|c| c.body.returns()))
            }
            _ => false,
        }
    }
}

// ============================================================================
// Expressions
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    Null,
    Bool(bool),
    Integer(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    BigInteger(BigInt),
    String(String),
    Char(char),
    /// A class literal, by name as written.
    Class(String),
    FunctionRef {
        module: Option<String>,
        name: String,
    },
    /// Arbitrary-precision decimals have no runtime representation.
    Decimal(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperatorKind {
    Plus,
    Minus,
    Times,
    Divide,
    Modulo,
    Equals,
    NotEquals,
    Less,
    LessOrEquals,
    More,
    MoreOrEquals,
    And,
    Or,
    Is,
    Isnt,
    OfType,
    OrIfNull,
    Not,
    MethodCall,
    ElvisMethodCall,
    AnonCall,
}

impl OperatorKind {
    /// Runtime operator name.
    pub fn name(&self) -> &'static str {
        match self {
            OperatorKind::Plus => "plus",
            OperatorKind::Minus => "minus",
            OperatorKind::Times => "times",
            OperatorKind::Divide => "divide",
            OperatorKind::Modulo => "modulo",
            OperatorKind::Equals => "equals",
            OperatorKind::NotEquals => "notequals",
            OperatorKind::Less => "less",
            OperatorKind::LessOrEquals => "lessorequals",
            OperatorKind::More => "more",
            OperatorKind::MoreOrEquals => "moreorequals",
            OperatorKind::And => "and",
            OperatorKind::Or => "or",
            OperatorKind::Is => "is",
            OperatorKind::Isnt => "isnt",
            OperatorKind::OfType => "oftype",
            OperatorKind::OrIfNull => "orifnull",
            OperatorKind::Not => "not",
            OperatorKind::MethodCall => "methodcall",
            OperatorKind::ElvisMethodCall => "elvismethodcall",
            OperatorKind::AnonCall => "anoncall",
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            OperatorKind::Plus => "+",
            OperatorKind::Minus => "-",
            OperatorKind::Times => "*",
            OperatorKind::Divide => "/",
            OperatorKind::Modulo => "%",
            OperatorKind::Equals => "==",
            OperatorKind::NotEquals => "!=",
            OperatorKind::Less => "<",
            OperatorKind::LessOrEquals => "<=",
            OperatorKind::More => ">",
            OperatorKind::MoreOrEquals => ">=",
            OperatorKind::And => "and",
            OperatorKind::Or => "or",
            OperatorKind::Is => "is",
            OperatorKind::Isnt => "isnt",
            OperatorKind::OfType => "oftype",
            OperatorKind::OrIfNull => "orIfNull",
            OperatorKind::Not => "not",
            OperatorKind::MethodCall => ":",
            OperatorKind::ElvisMethodCall => "?:",
            OperatorKind::AnonCall => "()",
        }
    }

    pub fn from_binary(op: golo_parser::BinaryOp) -> Self {
        use golo_parser::BinaryOp as B;
        match op {
            B::OrIfNull => OperatorKind::OrIfNull,
            B::Or => OperatorKind::Or,
            B::And => OperatorKind::And,
            B::Equals => OperatorKind::Equals,
            B::NotEquals => OperatorKind::NotEquals,
            B::Less => OperatorKind::Less,
            B::LessOrEquals => OperatorKind::LessOrEquals,
            B::More => OperatorKind::More,
            B::MoreOrEquals => OperatorKind::MoreOrEquals,
            B::Is => OperatorKind::Is,
            B::Isnt => OperatorKind::Isnt,
            B::OfType => OperatorKind::OfType,
            B::Plus => OperatorKind::Plus,
            B::Minus => OperatorKind::Minus,
            B::Times => OperatorKind::Times,
            B::Divide => OperatorKind::Divide,
            B::Modulo => OperatorKind::Modulo,
        }
    }
}

/// How a named invocation reaches its callee.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationMode {
    /// Resolved by name through the function dispatch.
    Static,
    /// The name is a local reference holding a function.
    OnReference,
    /// The name is module state holding a function.
    OnModuleState,
    /// The callee is the value of the preceding expression.
    Anonymous,
}

#[derive(Debug, Clone)]
pub struct FunctionInvocation {
    pub name: String,
    pub arguments: Vec<Expr>,
    pub mode: InvocationMode,
    /// `name!(...)`: evaluated once per call site.
    pub constant: bool,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub struct MethodInvocation {
    pub name: String,
    pub arguments: Vec<Expr>,
    pub null_safe: bool,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub struct ClosureReference {
    pub function: Box<Function>,
    pub node: NodeId,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Constant {
        value: Constant,
        node: NodeId,
    },
    Lookup {
        name: String,
        node: NodeId,
    },
    Binary {
        op: OperatorKind,
        left: Box<Expr>,
        right: Box<Expr>,
        node: NodeId,
    },
    Unary {
        op: OperatorKind,
        operand: Box<Expr>,
        node: NodeId,
    },
    FunctionCall(FunctionInvocation),
    /// Only found on the right of a method-call operator.
    MethodCall(MethodInvocation),
    Closure(ClosureReference),
    Collection {
        kind: CollectionKind,
        items: Vec<Expr>,
        node: NodeId,
    },
}

impl Expr {
    pub fn node(&self) -> NodeId {
        match self {
            Expr::Constant { node, .. }
            | Expr::Lookup { node, .. }
            | Expr::Binary { node, .. }
            | Expr::Unary { node, .. }
            | Expr::Collection { node, .. } => *node,
            Expr::FunctionCall(call) => call.node,
            Expr::MethodCall(call) => call.node,
            Expr::Closure(closure) => closure.node,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block_of(statements: Vec<Stmt>) -> Block {
        Block {
            scope: ScopeId(0),
            statements,
            node: NodeId(0),
        }
    }

    fn null() -> Expr {
        Expr::Constant {
            value: Constant::Null,
            node: NodeId(0),
        }
    }

    #[test]
    fn test_block_returns() {
        let ret = || Stmt::Return {
            value: null(),
            node: NodeId(0),
        };
        assert!(block_of(vec![ret()]).returns());
        assert!(!block_of(vec![Stmt::Expr(null())]).returns());

        let half = Stmt::If(Conditional {
            condition: null(),
            then: block_of(vec![ret()]),
            otherwise: None,
            node: NodeId(0),
        });
        assert!(!block_of(vec![half]).returns());

        let full = Stmt::If(Conditional {
            condition: null(),
            then: block_of(vec![ret()]),
            otherwise: Some(ElseBranch::Block(block_of(vec![ret()]))),
            node: NodeId(0),
        });
        assert!(block_of(vec![full]).returns());
    }

    #[test]
    fn test_synthetic_parameters_are_idempotent() {
        let mut arena = ScopeArena::new();
        let root = arena.new_root();
        let mut f = Function {
            name: "f".to_string(),
            visibility: Visibility::Public,
            kind: FunctionKind::Closure,
            parameters: vec!["x".to_string()],
            varargs: false,
            synthetic: true,
            synthetic_parameters: Vec::new(),
            synthetic_self_name: None,
            body: Block::new(root, NodeId(0)),
            node: NodeId(0),
            local_count: 0,
        };
        assert!(f.add_synthetic_parameter("a"));
        assert!(!f.add_synthetic_parameter("a"));
        assert!(!f.add_synthetic_parameter("x"));
        assert_eq!(f.all_parameters(), vec!["a", "x"]);
        f.set_synthetic_self_name("a");
        assert_eq!(f.arity(), 1);
        assert!(!f.add_synthetic_parameter("a"));
    }

    #[test]
    fn test_positions_side_table() {
        let mut table = PositionTable::new();
        let a = table.node(Some(Position::new(3, 4)));
        let b = table.node(None);
        assert_eq!(table.get(a), Some(Position::new(3, 4)));
        assert_eq!(table.get(b), None);
        table.clear();
        assert_eq!(table.get(a), None);
    }
}
