// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Parse tree to IR lowering.
//!
//! One top-down walk builds the [`Module`]. A stack of reference tables tracks
//! the current lexical scope: every block forks a fresh table, `let`/`var`
//! declare into the current one, and plain assignments must resolve to an
//! existing reference. An unresolvable assignment stops lowering at once;
//! other problems are collected.

use golo_parser::{
    BlockNode, CompilationUnit, DeclKind, ElseNode, Expression, FunctionBody, FunctionDecl,
    FunctionLiteral, IfNode, LetOrVar, Literal, Position, Statement, Suffix, TopLevel,
};

use super::diagnostics::{Problem, ProblemCollector, ProblemKind};
use super::ir::{
    Assignment, Block, CatchClause, ClosureReference, Conditional, Constant, ElseBranch, Expr,
    FlowKind, Function, FunctionInvocation, FunctionKind, InvocationMode, Loop, MethodInvocation,
    Module, NodeId, OperatorKind, ReferenceKind, ScopeId, StructDef, Stmt, TryCatchFinally,
    UnionDef, Visibility,
};

/// Name of the module-state initialiser.
pub const MODULE_INIT: &str = "<clinit>";

type Result<T> = std::result::Result<T, Problem>;

/// Lower a parse tree. Collected problems go to `problems`; a fail-fast
/// problem is returned as the error.
pub fn lower(unit: &CompilationUnit, problems: &mut ProblemCollector) -> Result<Module> {
    let mut lowering = Lowering {
        module: Module::new(unit.module.name.clone()),
        problems,
        scopes: Vec::new(),
        closure_counter: 0,
    };
    lowering.lower_unit(unit)?;
    log::debug!(
        "lowered module {} ({} functions)",
        lowering.module.name,
        lowering.module.functions.len()
    );
    Ok(lowering.module)
}

struct Lowering<'a> {
    module: Module,
    problems: &'a mut ProblemCollector,
    /// Reference-table stack; the last entry is the current scope.
    scopes: Vec<ScopeId>,
    closure_counter: usize,
}

impl Lowering<'_> {
    fn node(&mut self, position: Position) -> NodeId {
        self.module.positions.node(Some(position))
    }

    fn top(&self) -> ScopeId {
        self.scopes.last().copied().unwrap_or(self.module.root)
    }

    fn lower_unit(&mut self, unit: &CompilationUnit) -> Result<()> {
        for import in &unit.imports {
            self.module.imports.insert(import.name.clone());
        }

        // Module state is visible from every function, wherever it is declared.
        let root = self.module.root;
        for item in &unit.items {
            if let TopLevel::State(decl) = item {
                let kind = match decl.kind {
                    DeclKind::Let => ReferenceKind::ModuleConstant,
                    DeclKind::Var => ReferenceKind::ModuleVariable,
                };
                self.module.scopes.declare(root, kind, &decl.name, false);
            }
        }

        let mut init: Option<Function> = None;
        for item in &unit.items {
            match item {
                TopLevel::Function(decl) => {
                    let function = self.lower_declared_function(decl, FunctionKind::Module)?;
                    if self.module.functions.contains_key(&function.name) {
                        self.problems.report(
                            ProblemKind::Parsing,
                            Some(decl.position),
                            format!("Function `{}` is already defined", function.name),
                        );
                    } else {
                        self.module.functions.insert(function.name.clone(), function);
                    }
                }
                TopLevel::State(decl) => {
                    let init = init.get_or_insert_with(|| self.new_initializer());
                    let statement = self.lower_module_state(init.body.scope, decl)?;
                    init.body.statements.push(statement);
                }
                TopLevel::Struct(decl) => {
                    let node = self.node(decl.position);
                    self.module.structs.push(StructDef {
                        name: decl.name.clone(),
                        members: decl.members.clone(),
                        node,
                    });
                }
                TopLevel::Union(decl) => {
                    let node = self.node(decl.position);
                    self.module.unions.push(UnionDef {
                        name: decl.name.clone(),
                        variants: decl
                            .values
                            .iter()
                            .map(|v| (v.name.clone(), v.members.clone()))
                            .collect(),
                        node,
                    });
                }
                TopLevel::Augment(decl) => {
                    let mut functions = Vec::with_capacity(decl.functions.len());
                    for f in &decl.functions {
                        functions.push(self.lower_augment_function(f)?);
                    }
                    if !functions.is_empty() {
                        self.module
                            .augmentations
                            .entry(decl.target.clone())
                            .or_default()
                            .extend(functions);
                    }
                    if !decl.with.is_empty() {
                        self.module
                            .augmentation_applications
                            .entry(decl.target.clone())
                            .or_default()
                            .extend(decl.with.iter().cloned());
                    }
                }
                TopLevel::Augmentation(decl) => {
                    let mut functions = Vec::with_capacity(decl.functions.len());
                    for f in &decl.functions {
                        functions.push(self.lower_augment_function(f)?);
                    }
                    self.module
                        .named_augmentations
                        .entry(decl.name.clone())
                        .or_default()
                        .extend(functions);
                }
            }
        }

        if let Some(mut init) = init {
            if !init.body.returns() {
                let node = self.module.positions.node(None);
                init.body.statements.push(Stmt::Return {
                    value: null_constant(node),
                    node,
                });
            }
            self.module.initializer = Some(init);
        }
        Ok(())
    }

    fn new_initializer(&mut self) -> Function {
        let scope = self.module.scopes.fork(self.module.root);
        let node = self.module.positions.node(None);
        Function {
            name: MODULE_INIT.to_string(),
            visibility: Visibility::Local,
            kind: FunctionKind::ModuleInit,
            parameters: Vec::new(),
            varargs: false,
            synthetic: false,
            synthetic_parameters: Vec::new(),
            synthetic_self_name: None,
            body: Block::new(scope, node),
            node,
            local_count: 0,
        }
    }

    fn lower_module_state(&mut self, init_scope: ScopeId, decl: &LetOrVar) -> Result<Stmt> {
        let target = self
            .module
            .scopes
            .lookup(self.module.root, &decl.name)
            .ok_or_else(|| undeclared(&decl.name, decl.position))?;
        self.scopes.push(init_scope);
        let value = self.lower_expression(&decl.value);
        self.scopes.pop();
        let node = self.node(decl.position);
        Ok(Stmt::Assign(Assignment {
            target,
            value: value?,
            declaring: true,
            node,
        }))
    }

    fn lower_declared_function(&mut self, decl: &FunctionDecl, kind: FunctionKind) -> Result<Function> {
        let visibility = if decl.local {
            Visibility::Local
        } else {
            Visibility::Public
        };
        self.lower_function(&decl.name, &decl.function, kind, visibility, false)
    }

    fn lower_augment_function(&mut self, decl: &FunctionDecl) -> Result<Function> {
        if decl.function.parameters.is_empty() {
            self.problems.report(
                ProblemKind::AugmentFunctionNoArgs,
                Some(decl.position),
                format!(
                    "Augmentation function `{}` must take at least the receiver as a parameter",
                    decl.name
                ),
            );
        }
        self.lower_declared_function(decl, FunctionKind::Augment)
    }

    /// Lower a declared function or a closure. The body table forks the
    /// current scope and holds the parameters.
    fn lower_function(
        &mut self,
        name: &str,
        literal: &FunctionLiteral,
        kind: FunctionKind,
        visibility: Visibility,
        synthetic: bool,
    ) -> Result<Function> {
        let scope = self.module.scopes.fork(self.top());
        for parameter in &literal.parameters {
            self.module
                .scopes
                .declare(scope, ReferenceKind::Constant, parameter, false);
        }
        let node = self.node(literal.position);
        let mut body = Block::new(scope, node);

        self.scopes.push(scope);
        let lowered = match &literal.body {
            FunctionBody::Compact(expression) => self.lower_expression(expression).map(|value| {
                let node = self.node(expression.position());
                vec![Stmt::Return { value, node }]
            }),
            FunctionBody::Block(block) => self.lower_statements(&block.statements),
        };
        self.scopes.pop();
        body.statements = lowered?;

        if !body.returns() {
            let node = self.module.positions.node(None);
            body.statements.push(Stmt::Return {
                value: null_constant(node),
                node,
            });
        }

        Ok(Function {
            name: name.to_string(),
            visibility,
            kind,
            parameters: literal.parameters.clone(),
            varargs: literal.varargs,
            synthetic,
            synthetic_parameters: Vec::new(),
            synthetic_self_name: None,
            body,
            node,
            local_count: 0,
        })
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn lower_block(&mut self, block: &BlockNode) -> Result<Block> {
        let scope = self.module.scopes.fork(self.top());
        let node = self.node(block.position);
        self.scopes.push(scope);
        let statements = self.lower_statements(&block.statements);
        self.scopes.pop();
        Ok(Block {
            scope,
            statements: statements?,
            node,
        })
    }

    fn lower_statements(&mut self, statements: &[Statement]) -> Result<Vec<Stmt>> {
        statements
            .iter()
            .map(|s| self.lower_statement(s))
            .collect()
    }

    fn lower_statement(&mut self, statement: &Statement) -> Result<Stmt> {
        match statement {
            Statement::Let(decl) => Ok(Stmt::Assign(self.lower_declaration(decl)?)),
            Statement::Assign {
                name,
                value,
                position,
            } => {
                let target = self
                    .module
                    .scopes
                    .lookup(self.top(), name)
                    .ok_or_else(|| undeclared(name, *position))?;
                let value = self.lower_expression(value)?;
                let node = self.node(*position);
                Ok(Stmt::Assign(Assignment {
                    target,
                    value,
                    declaring: false,
                    node,
                }))
            }
            Statement::If(node) => Ok(Stmt::If(self.lower_if(node)?)),
            Statement::While {
                condition,
                body,
                position,
            } => {
                let condition = self.lower_expression(condition)?;
                let body = self.lower_block(body)?;
                let node = self.node(*position);
                Ok(Stmt::Loop(Loop {
                    init: None,
                    condition,
                    body,
                    post: None,
                    node,
                }))
            }
            Statement::For {
                init,
                condition,
                post,
                body,
                position,
            } => {
                // The loop variable lives in a wrapping block of its own.
                let scope = self.module.scopes.fork(self.top());
                let wrapper_node = self.node(*position);
                self.scopes.push(scope);
                let lowered = self.lower_for(init, condition, post, body, *position);
                self.scopes.pop();
                Ok(Stmt::Block(Block {
                    scope,
                    statements: vec![Stmt::Loop(lowered?)],
                    node: wrapper_node,
                }))
            }
            Statement::Return { value, position } => {
                let node = self.node(*position);
                let value = match value {
                    Some(value) => self.lower_expression(value)?,
                    None => null_constant(node),
                };
                Ok(Stmt::Return { value, node })
            }
            Statement::Throw { value, position } => {
                let value = self.lower_expression(value)?;
                let node = self.node(*position);
                Ok(Stmt::Throw { value, node })
            }
            Statement::Break(position) => {
                let node = self.node(*position);
                Ok(Stmt::Flow {
                    kind: FlowKind::Break,
                    node,
                })
            }
            Statement::Continue(position) => {
                let node = self.node(*position);
                Ok(Stmt::Flow {
                    kind: FlowKind::Continue,
                    node,
                })
            }
            Statement::Try(node) => {
                let body = self.lower_block(&node.body)?;
                let catch = match &node.catch {
                    Some(catch) => {
                        let scope = self.module.scopes.fork(self.top());
                        self.module
                            .scopes
                            .declare(scope, ReferenceKind::Constant, &catch.name, false);
                        let block_node = self.node(catch.body.position);
                        self.scopes.push(scope);
                        let statements = self.lower_statements(&catch.body.statements);
                        self.scopes.pop();
                        Some(CatchClause {
                            name: catch.name.clone(),
                            body: Block {
                                scope,
                                statements: statements?,
                                node: block_node,
                            },
                        })
                    }
                    None => None,
                };
                let finally = match &node.finally {
                    Some(block) => Some(self.lower_block(block)?),
                    None => None,
                };
                let id = self.node(node.position);
                Ok(Stmt::Try(TryCatchFinally {
                    body,
                    catch,
                    finally,
                    node: id,
                }))
            }
            Statement::Expression(expression) => Ok(Stmt::Expr(self.lower_expression(expression)?)),
        }
    }

    fn lower_for(
        &mut self,
        init: &LetOrVar,
        condition: &Expression,
        post: &Statement,
        body: &BlockNode,
        position: Position,
    ) -> Result<Loop> {
        let init = self.lower_declaration(init)?;
        let condition = self.lower_expression(condition)?;
        let post = self.lower_statement(post)?;
        let body = self.lower_block(body)?;
        let node = self.node(position);
        Ok(Loop {
            init: Some(Box::new(init)),
            condition,
            body,
            post: Some(Box::new(post)),
            node,
        })
    }

    /// `let`/`var`: the reference is declared before its value is lowered, so
    /// a closure can refer to the name it is bound to.
    fn lower_declaration(&mut self, decl: &LetOrVar) -> Result<Assignment> {
        let kind = match decl.kind {
            DeclKind::Let => ReferenceKind::Constant,
            DeclKind::Var => ReferenceKind::Variable,
        };
        let target = self
            .module
            .scopes
            .declare(self.top(), kind, &decl.name, false);
        let value = self.lower_expression(&decl.value)?;
        let node = self.node(decl.position);
        Ok(Assignment {
            target,
            value,
            declaring: true,
            node,
        })
    }

    fn lower_if(&mut self, node: &IfNode) -> Result<Conditional> {
        let condition = self.lower_expression(&node.condition)?;
        let then = self.lower_block(&node.then)?;
        let otherwise = match &node.otherwise {
            Some(ElseNode::Block(block)) => Some(ElseBranch::Block(self.lower_block(block)?)),
            Some(ElseNode::If(nested)) => Some(ElseBranch::If(Box::new(self.lower_if(nested)?))),
            None => None,
        };
        let id = self.node(node.position);
        Ok(Conditional {
            condition,
            then,
            otherwise,
            node: id,
        })
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    fn lower_expressions(&mut self, expressions: &[Expression]) -> Result<Vec<Expr>> {
        expressions
            .iter()
            .map(|e| self.lower_expression(e))
            .collect()
    }

    fn lower_expression(&mut self, expression: &Expression) -> Result<Expr> {
        match expression {
            Expression::Literal { value, position } => {
                let node = self.node(*position);
                Ok(Expr::Constant {
                    value: lower_literal(value),
                    node,
                })
            }
            Expression::Reference { name, position } => {
                let node = self.node(*position);
                Ok(Expr::Lookup {
                    name: name.clone(),
                    node,
                })
            }
            Expression::ClassLiteral { name, position } => {
                let node = self.node(*position);
                Ok(Expr::Constant {
                    value: Constant::Class(name.clone()),
                    node,
                })
            }
            Expression::FunctionRef {
                module,
                name,
                position,
            } => {
                let node = self.node(*position);
                Ok(Expr::Constant {
                    value: Constant::FunctionRef {
                        module: module.clone(),
                        name: name.clone(),
                    },
                    node,
                })
            }
            Expression::Closure(literal) => {
                let name = format!("__$$_closure_{}", self.closure_counter);
                self.closure_counter += 1;
                let function = self.lower_function(
                    &name,
                    literal,
                    FunctionKind::Closure,
                    Visibility::Local,
                    true,
                )?;
                let node = self.node(literal.position);
                Ok(Expr::Closure(ClosureReference {
                    function: Box::new(function),
                    node,
                }))
            }
            Expression::Collection {
                kind,
                items,
                position,
            } => {
                let items = self.lower_expressions(items)?;
                let node = self.node(*position);
                Ok(Expr::Collection {
                    kind: *kind,
                    items,
                    node,
                })
            }
            Expression::Not { operand, position } => {
                let operand = self.lower_expression(operand)?;
                let node = self.node(*position);
                Ok(Expr::Unary {
                    op: OperatorKind::Not,
                    operand: Box::new(operand),
                    node,
                })
            }
            Expression::Operators {
                operands,
                operators,
            } => {
                let Some((first, rest)) = operands.split_first() else {
                    return Err(Problem {
                        kind: ProblemKind::Parsing,
                        description: "Empty operator chain".to_string(),
                        position: None,
                    });
                };
                let mut acc = self.lower_expression(first)?;
                for ((op, _), operand) in operators.iter().zip(rest) {
                    let right = self.lower_expression(operand)?;
                    let node = self.node(operand.position());
                    acc = Expr::Binary {
                        op: OperatorKind::from_binary(*op),
                        left: Box::new(acc),
                        right: Box::new(right),
                        node,
                    };
                }
                Ok(acc)
            }
            Expression::Invocation {
                name,
                arguments,
                constant,
                position,
            } => {
                let arguments = self.lower_expressions(arguments)?;
                let node = self.node(*position);
                Ok(Expr::FunctionCall(FunctionInvocation {
                    name: name.clone(),
                    arguments,
                    mode: InvocationMode::Static,
                    constant: *constant,
                    node,
                }))
            }
            Expression::Postfix { target, suffixes } => {
                let mut acc = self.lower_expression(target)?;
                for suffix in suffixes {
                    acc = self.lower_suffix(acc, suffix)?;
                }
                Ok(acc)
            }
        }
    }

    /// Fold one call suffix onto the expression built so far.
    fn lower_suffix(&mut self, receiver: Expr, suffix: &Suffix) -> Result<Expr> {
        match suffix {
            Suffix::MethodCall {
                name,
                arguments,
                null_safe,
                position,
            } => {
                let arguments = self.lower_expressions(arguments)?;
                let call_node = self.node(*position);
                let node = self.node(*position);
                let op = if *null_safe {
                    OperatorKind::ElvisMethodCall
                } else {
                    OperatorKind::MethodCall
                };
                Ok(Expr::Binary {
                    op,
                    left: Box::new(receiver),
                    right: Box::new(Expr::MethodCall(MethodInvocation {
                        name: name.clone(),
                        arguments,
                        null_safe: *null_safe,
                        node: call_node,
                    })),
                    node,
                })
            }
            Suffix::AnonymousCall {
                arguments,
                position,
            } => {
                let arguments = self.lower_expressions(arguments)?;
                let call_node = self.node(*position);
                let node = self.node(*position);
                Ok(Expr::Binary {
                    op: OperatorKind::AnonCall,
                    left: Box::new(receiver),
                    right: Box::new(Expr::FunctionCall(FunctionInvocation {
                        name: "anonymous".to_string(),
                        arguments,
                        mode: InvocationMode::Anonymous,
                        constant: false,
                        node: call_node,
                    })),
                    node,
                })
            }
        }
    }
}

fn null_constant(node: NodeId) -> Expr {
    Expr::Constant {
        value: Constant::Null,
        node,
    }
}

fn undeclared(name: &str, position: Position) -> Problem {
    Problem {
        kind: ProblemKind::UndeclaredReference,
        description: format!("Assigning to undeclared reference `{}`", name),
        position: Some(position),
    }
}

fn lower_literal(literal: &Literal) -> Constant {
    match literal {
        Literal::Null => Constant::Null,
        Literal::Bool(b) => Constant::Bool(*b),
        Literal::Integer(n) => Constant::Integer(*n),
        Literal::Long(n) => Constant::Long(*n),
        Literal::BigInteger(n) => Constant::BigInteger(n.clone()),
        Literal::Float(n) => Constant::Float(*n),
        Literal::Double(n) => Constant::Double(*n),
        Literal::Decimal(s) => Constant::Decimal(s.clone()),
        Literal::Char(c) => Constant::Char(*c),
        Literal::String(s) => Constant::String(s.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use golo_parser::Parser;

    fn lower_source(source: &str) -> std::result::Result<(Module, ProblemCollector), Problem> {
        let unit = Parser::parse_str(source).unwrap();
        let mut problems = ProblemCollector::new();
        let module = lower(&unit, &mut problems)?;
        Ok((module, problems))
    }

    #[test]
    fn test_missing_return_is_added() {
        let (module, _) = lower_source("module m\nfunction f = { println(1) }\n").unwrap();
        let f = &module.functions["f"];
        assert!(matches!(
            f.body.statements.last(),
            Some(Stmt::Return {
                value: Expr::Constant {
                    value: Constant::Null,
                    ..
                },
                ..
            })
        ));
    }

    #[test]
    fn test_operator_chain_is_left_associative() {
        let (module, _) = lower_source("module m\nfunction f = -> 1 - 2 - 3\n").unwrap();
        let Some(Stmt::Return { value, .. }) = module.functions["f"].body.statements.first() else {
            panic!("expected a return");
        };
        match value {
            Expr::Binary { left, right, .. } => {
                assert!(matches!(**left, Expr::Binary { .. }));
                assert!(matches!(
                    **right,
                    Expr::Constant {
                        value: Constant::Integer(3),
                        ..
                    }
                ));
            }
            other => panic!("expected a binary operation, got {:?}", other),
        }
    }

    #[test]
    fn test_undeclared_assignment_fails_fast() {
        let problem = lower_source("module m\nfunction f = {\n  x = 1\n}\n").unwrap_err();
        assert_eq!(problem.kind, ProblemKind::UndeclaredReference);
        assert_eq!(problem.position, Some(Position::new(3, 3)));
    }

    #[test]
    fn test_augment_without_receiver_is_collected() {
        let (module, problems) =
            lower_source("module m\naugment String {\n  function shout = -> 1\n}\n").unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(module.augmentations["String"].len(), 1);
    }

    #[test]
    fn test_module_state_goes_to_initializer() {
        let (module, _) =
            lower_source("module m\nlet a = 1\nvar b = 2\nfunction f = -> a + b\n").unwrap();
        assert_eq!(module.module_state().len(), 2);
        let init = module.initializer.as_ref().unwrap();
        assert!(init.is_module_init());
        // Two assignments and the final return.
        assert_eq!(init.body.statements.len(), 3);
    }

    #[test]
    fn test_for_loop_gets_wrapping_block() {
        let (module, _) = lower_source(
            "module m\nfunction f = {\n  for (var i = 0, i < 3, i = i + 1) {\n    println(i)\n  }\n}\n",
        )
        .unwrap();
        match &module.functions["f"].body.statements[0] {
            Stmt::Block(wrapper) => {
                assert!(module.scopes.owns(wrapper.scope, "i"));
                match &wrapper.statements[0] {
                    Stmt::Loop(l) => assert_ne!(l.body.scope, wrapper.scope),
                    other => panic!("expected a loop, got {:?}", other),
                }
            }
            other => panic!("expected a block, got {:?}", other),
        }
    }

    #[test]
    fn test_method_chain_is_folded() {
        let (module, _) = lower_source("module m\nfunction f = |s| -> s: trim()?: length()\n").unwrap();
        let Some(Stmt::Return { value, .. }) = module.functions["f"].body.statements.first() else {
            panic!("expected a return");
        };
        match value {
            Expr::Binary { op, left, .. } => {
                assert_eq!(*op, OperatorKind::ElvisMethodCall);
                assert!(matches!(
                    **left,
                    Expr::Binary {
                        op: OperatorKind::MethodCall,
                        ..
                    }
                ));
            }
            other => panic!("expected a method call, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_function_is_reported() {
        let (module, problems) =
            lower_source("module m\nfunction f = -> 1\nfunction f = -> 2\n").unwrap();
        assert_eq!(module.functions.len(), 1);
        assert_eq!(problems.len(), 1);
    }
}
