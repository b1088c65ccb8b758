// golo-parser - Parse tree for Golo
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Parse tree produced by the [`Parser`](crate::Parser).
//!
//! The tree mirrors the surface syntax closely: operator chains are kept flat
//! (one operand list per precedence level) and postfix call chains are kept
//! as a target plus a list of suffixes. Turning these into nested operations
//! is the compiler's job.

use std::fmt;

use num_bigint::BigInt;

/// A source position. Lines and columns are 1-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Position { line, column }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A whole source file.
#[derive(Debug, Clone, PartialEq)]
pub struct CompilationUnit {
    pub module: ModuleDecl,
    pub imports: Vec<ImportDecl>,
    pub items: Vec<TopLevel>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ModuleDecl {
    pub name: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImportDecl {
    pub name: String,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TopLevel {
    Function(FunctionDecl),
    State(LetOrVar),
    Struct(StructDecl),
    Union(UnionDecl),
    Augment(AugmentDecl),
    Augmentation(AugmentationDecl),
}

/// `function name = ...` or `local function name = ...`.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: String,
    pub local: bool,
    pub function: FunctionLiteral,
    pub position: Position,
}

/// Parameters and body shared by declared functions and closures.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub parameters: Vec<String>,
    pub varargs: bool,
    pub body: FunctionBody,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FunctionBody {
    /// `-> expression`
    Compact(Box<Expression>),
    Block(BlockNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct BlockNode {
    pub statements: Vec<Statement>,
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclKind {
    Let,
    Var,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetOrVar {
    pub kind: DeclKind,
    pub name: String,
    pub value: Expression,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StructDecl {
    pub name: String,
    pub members: Vec<String>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionDecl {
    pub name: String,
    pub values: Vec<UnionValueDecl>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnionValueDecl {
    pub name: String,
    pub members: Vec<String>,
    pub position: Position,
}

/// `augment Target { ... }` or `augment Target with A, B`.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentDecl {
    pub target: String,
    pub functions: Vec<FunctionDecl>,
    pub with: Vec<String>,
    pub position: Position,
}

/// `augmentation Name = { ... }`.
#[derive(Debug, Clone, PartialEq)]
pub struct AugmentationDecl {
    pub name: String,
    pub functions: Vec<FunctionDecl>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Let(LetOrVar),
    Assign {
        name: String,
        value: Expression,
        position: Position,
    },
    If(IfNode),
    While {
        condition: Expression,
        body: BlockNode,
        position: Position,
    },
    For {
        init: LetOrVar,
        condition: Expression,
        post: Box<Statement>,
        body: BlockNode,
        position: Position,
    },
    Return {
        value: Option<Expression>,
        position: Position,
    },
    Throw {
        value: Expression,
        position: Position,
    },
    Break(Position),
    Continue(Position),
    Try(TryNode),
    Expression(Expression),
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    pub condition: Expression,
    pub then: BlockNode,
    pub otherwise: Option<ElseNode>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ElseNode {
    Block(BlockNode),
    If(Box<IfNode>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct TryNode {
    pub body: BlockNode,
    pub catch: Option<CatchNode>,
    pub finally: Option<BlockNode>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CatchNode {
    pub name: String,
    pub body: BlockNode,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Integer(i32),
    Long(i64),
    BigInteger(BigInt),
    Float(f32),
    Double(f64),
    Decimal(String),
    Char(char),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    OrIfNull,
    Or,
    And,
    Equals,
    NotEquals,
    Less,
    LessOrEquals,
    More,
    MoreOrEquals,
    Is,
    Isnt,
    OfType,
    Plus,
    Minus,
    Times,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::OrIfNull => "orIfNull",
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Equals => "==",
            BinaryOp::NotEquals => "!=",
            BinaryOp::Less => "<",
            BinaryOp::LessOrEquals => "<=",
            BinaryOp::More => ">",
            BinaryOp::MoreOrEquals => ">=",
            BinaryOp::Is => "is",
            BinaryOp::Isnt => "isnt",
            BinaryOp::OfType => "oftype",
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Times => "*",
            BinaryOp::Divide => "/",
            BinaryOp::Modulo => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CollectionKind {
    Array,
    List,
    Vector,
    Set,
    Map,
    Tuple,
}

impl CollectionKind {
    pub fn from_keyword(name: &str) -> Option<Self> {
        match name {
            "array" => Some(CollectionKind::Array),
            "list" => Some(CollectionKind::List),
            "vector" => Some(CollectionKind::Vector),
            "set" => Some(CollectionKind::Set),
            "map" => Some(CollectionKind::Map),
            "tuple" => Some(CollectionKind::Tuple),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal {
        value: Literal,
        position: Position,
    },
    Reference {
        name: String,
        position: Position,
    },
    /// `a.b.C.class`
    ClassLiteral {
        name: String,
        position: Position,
    },
    /// `^name` or `^a.b::name`
    FunctionRef {
        module: Option<String>,
        name: String,
        position: Position,
    },
    Closure(FunctionLiteral),
    Collection {
        kind: CollectionKind,
        items: Vec<Expression>,
        position: Position,
    },
    Not {
        operand: Box<Expression>,
        position: Position,
    },
    /// A flat chain of operands at one precedence level.
    Operators {
        operands: Vec<Expression>,
        operators: Vec<(BinaryOp, Position)>,
    },
    /// `name(args)`, where `name` may be qualified with dots. `name!(args)`
    /// is a constant invocation, evaluated once per call site.
    Invocation {
        name: String,
        arguments: Vec<Expression>,
        constant: bool,
        position: Position,
    },
    /// A target followed by method calls and anonymous calls.
    Postfix {
        target: Box<Expression>,
        suffixes: Vec<Suffix>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Suffix {
    /// `: name(args)` or `?: name(args)`
    MethodCall {
        name: String,
        arguments: Vec<Expression>,
        null_safe: bool,
        position: Position,
    },
    /// `(args)` applied to the value so far
    AnonymousCall {
        arguments: Vec<Expression>,
        position: Position,
    },
}

impl Expression {
    pub fn position(&self) -> Position {
        match self {
            Expression::Literal { position, .. }
            | Expression::Reference { position, .. }
            | Expression::ClassLiteral { position, .. }
            | Expression::FunctionRef { position, .. }
            | Expression::Collection { position, .. }
            | Expression::Not { position, .. }
            | Expression::Invocation { position, .. } => *position,
            Expression::Closure(function) => function.position,
            Expression::Operators { operands, .. } => operands
                .first()
                .map(Expression::position)
                .unwrap_or_default(),
            Expression::Postfix { target, .. } => target.position(),
        }
    }

    /// Whether this expression may stand alone as a statement.
    pub fn is_invocation(&self) -> bool {
        match self {
            Expression::Invocation { .. } => true,
            Expression::Postfix { suffixes, .. } => !suffixes.is_empty(),
            _ => false,
        }
    }
}

impl Statement {
    pub fn position(&self) -> Position {
        match self {
            Statement::Let(decl) => decl.position,
            Statement::Assign { position, .. }
            | Statement::While { position, .. }
            | Statement::For { position, .. }
            | Statement::Return { position, .. }
            | Statement::Throw { position, .. }
            | Statement::Break(position)
            | Statement::Continue(position) => *position,
            Statement::If(node) => node.position,
            Statement::Try(node) => node.position,
            Statement::Expression(expression) => expression.position(),
        }
    }
}
