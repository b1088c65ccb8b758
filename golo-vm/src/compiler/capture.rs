// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Closure-capture analysis.
//!
//! For every synthetic function, the body table is replaced by a flat copy
//! of everything visible at the closure's definition, with inherited names
//! turned into constants. Walking the body then records which names are
//! read, which are declared locally and which block declares each one.
//! Names read but not declared become leading synthetic parameters; names
//! nobody reads are dropped from their table.
//!
//! The analysis is scope-based: statement order inside a block does not
//! matter. Running it twice adds nothing.

use std::collections::{HashMap, HashSet};

use indexmap::IndexSet;

use super::ir::{Assignment, Block, ElseBranch, Expr, Function, Module, ScopeArena, ScopeId, Stmt};

/// Run the analysis over every function of `module`.
pub fn run(module: &mut Module) {
    let Module {
        name,
        functions,
        augmentations,
        named_augmentations,
        initializer,
        scopes,
        root,
        ..
    } = module;

    let mut pass = CapturePass {
        scopes,
        root: *root,
        contexts: Vec::new(),
    };
    for function in functions.values_mut() {
        pass.visit_function(function);
    }
    for function in augmentations
        .values_mut()
        .chain(named_augmentations.values_mut())
        .flatten()
    {
        pass.visit_function(function);
    }
    if let Some(init) = initializer {
        pass.visit_function(init);
    }
    log::debug!("closure capture analysis done for module {}", name);
}

/// Bookkeeping for one synthetic function.
#[derive(Default)]
struct Context {
    parameters: HashSet<String>,
    all: IndexSet<String>,
    local: HashSet<String>,
    accessed: HashSet<String>,
    defining_scope: HashMap<String, ScopeId>,
    scope_stack: Vec<ScopeId>,
}

struct CapturePass<'a> {
    scopes: &'a mut ScopeArena,
    root: ScopeId,
    contexts: Vec<Context>,
}

impl CapturePass<'_> {
    fn context(&mut self) -> Option<&mut Context> {
        self.contexts.last_mut()
    }

    fn top_scope(&self) -> Option<ScopeId> {
        self.contexts
            .last()
            .and_then(|c| c.scope_stack.last().copied())
    }

    fn accessed(&mut self, name: &str) {
        if let Some(context) = self.context() {
            context.accessed.insert(name.to_string());
        }
    }

    fn locally_declared(&mut self, name: &str) {
        if let Some(context) = self.context() {
            context.local.insert(name.to_string());
        }
    }

    fn visit_function(&mut self, function: &mut Function) {
        if !function.synthetic {
            self.visit_block(&mut function.body);
            return;
        }

        let mut context = Context::default();
        context.parameters.extend(function.all_parameters());
        self.contexts.push(context);

        function.body.scope = self.scopes.flat_copy(function.body.scope, self.root);
        self.visit_block(&mut function.body);

        let Some(context) = self.contexts.pop() else {
            return;
        };
        let body_scope = function.body.scope;

        // Captured names, in the order they were declared.
        let captured: Vec<String> = self
            .scopes
            .owned(body_scope)
            .into_iter()
            .map(|r| self.scopes.reference(r))
            .filter(|r| !r.is_module_state())
            .map(|r| r.name.clone())
            .filter(|name| {
                context.accessed.contains(name)
                    && !context.local.contains(name)
                    && !context.parameters.contains(name)
            })
            .collect();
        for name in captured {
            function.add_synthetic_parameter(&name);
        }

        for name in context.all.iter() {
            if context.accessed.contains(name) || context.parameters.contains(name) {
                continue;
            }
            if let Some(scope) = context.defining_scope.get(name) {
                self.scopes.remove(*scope, name);
            }
        }
    }

    fn visit_block(&mut self, block: &mut Block) {
        let owned = self.scopes.owned(block.scope);
        let names: Vec<String> = owned
            .iter()
            .map(|r| self.scopes.reference(*r).name.clone())
            .collect();

        let top = self.top_scope();
        let pushed = match self.contexts.last_mut() {
            Some(context) => {
                if let Some(top) = top {
                    self.scopes.relink(block.scope, top);
                }
                context.scope_stack.push(block.scope);
                for name in names {
                    context.defining_scope.insert(name.clone(), block.scope);
                    context.all.insert(name);
                }
                true
            }
            None => false,
        };

        for statement in &mut block.statements {
            self.visit_statement(statement);
        }

        if pushed && let Some(context) = self.context() {
            context.scope_stack.pop();
        }
    }

    fn visit_statement(&mut self, statement: &mut Stmt) {
        match statement {
            Stmt::Assign(assignment) => self.visit_assignment(assignment),
            Stmt::Return { value, .. } | Stmt::Throw { value, .. } => {
                self.visit_expression(value);
            }
            Stmt::If(conditional) => {
                let mut current = Some(conditional);
                while let Some(c) = current {
                    self.visit_expression(&mut c.condition);
                    self.visit_block(&mut c.then);
                    current = match &mut c.otherwise {
                        Some(ElseBranch::Block(block)) => {
                            self.visit_block(block);
                            None
                        }
                        Some(ElseBranch::If(nested)) => Some(nested.as_mut()),
                        None => None,
                    };
                }
            }
            Stmt::Loop(l) => {
                if let Some(init) = &mut l.init {
                    self.visit_assignment(init);
                }
                self.visit_expression(&mut l.condition);
                self.visit_block(&mut l.body);
                if let Some(post) = &mut l.post {
                    self.visit_statement(post);
                }
            }
            Stmt::Flow { .. } => {}
            Stmt::Try(t) => {
                self.visit_block(&mut t.body);
                if let Some(catch) = &mut t.catch {
                    self.accessed(&catch.name);
                    self.locally_declared(&catch.name);
                    self.visit_block(&mut catch.body);
                }
                if let Some(finally) = &mut t.finally {
                    self.visit_block(finally);
                }
            }
            Stmt::Block(block) => self.visit_block(block),
            Stmt::Expr(expression) => self.visit_expression(expression),
        }
    }

    fn visit_assignment(&mut self, assignment: &mut Assignment) {
        let reference = self.scopes.reference(assignment.target).clone();
        if !reference.is_module_state() {
            if let Some(top) = self.top_scope()
                && let Some(rebound) = self.scopes.lookup(top, &reference.name)
            {
                assignment.target = rebound;
            }
            if assignment.declaring {
                self.locally_declared(&reference.name);
            }
        } else {
            self.locally_declared(&reference.name);
        }
        self.accessed(&reference.name);
        self.visit_expression(&mut assignment.value);
        if let Expr::Closure(closure) = &mut assignment.value {
            closure.function.set_synthetic_self_name(&reference.name);
        }
    }

    fn visit_expression(&mut self, expression: &mut Expr) {
        match expression {
            Expr::Constant { .. } => {}
            Expr::Lookup { name, .. } => {
                let name = name.clone();
                self.accessed(&name);
            }
            Expr::Binary { left, right, .. } => {
                self.visit_expression(left);
                self.visit_expression(right);
            }
            Expr::Unary { operand, .. } => self.visit_expression(operand),
            Expr::FunctionCall(call) => {
                let seen = self
                    .contexts
                    .last()
                    .is_some_and(|c| c.all.contains(&call.name));
                if seen {
                    let name = call.name.clone();
                    self.accessed(&name);
                }
                for argument in &mut call.arguments {
                    self.visit_expression(argument);
                }
            }
            Expr::MethodCall(call) => {
                for argument in &mut call.arguments {
                    self.visit_expression(argument);
                }
            }
            Expr::Closure(closure) => {
                if let Some(top) = self.top_scope() {
                    self.scopes.relink(closure.function.body.scope, top);
                }
                self.visit_function(&mut closure.function);
                if let Some(top) = self.top_scope() {
                    let needed: Vec<String> = closure
                        .function
                        .synthetic_parameters
                        .iter()
                        .filter(|name| self.scopes.has_reference_for(top, name))
                        .cloned()
                        .collect();
                    for name in needed {
                        self.accessed(&name);
                    }
                }
            }
            Expr::Collection { items, .. } => {
                for item in items {
                    self.visit_expression(item);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::diagnostics::ProblemCollector;
    use crate::compiler::ir::{ClosureReference, Stmt};
    use crate::compiler::lower::lower;
    use golo_parser::Parser;

    fn analysed(source: &str) -> Module {
        let unit = Parser::parse_str(source).unwrap();
        let mut problems = ProblemCollector::new();
        let mut module = lower(&unit, &mut problems).unwrap();
        run(&mut module);
        module
    }

    fn closure_of(module: &Module, function: &str) -> ClosureReference {
        fn find(statements: &[Stmt]) -> Option<ClosureReference> {
            for statement in statements {
                match statement {
                    Stmt::Return {
                        value: Expr::Closure(c),
                        ..
                    } => return Some(c.clone()),
                    Stmt::Assign(a) => {
                        if let Expr::Closure(c) = &a.value {
                            return Some(c.clone());
                        }
                    }
                    _ => {}
                }
            }
            None
        }
        find(&module.functions[function].body.statements).unwrap()
    }

    #[test]
    fn test_captures_free_names_in_declaration_order() {
        let module = analysed(
            "module m\nfunction f = |a, b| {\n  let c = 1\n  return |x| -> c + a + x\n}\n",
        );
        let closure = closure_of(&module, "f");
        assert_eq!(closure.function.synthetic_parameters, vec!["a", "c"]);
        assert_eq!(closure.function.parameters, vec!["x"]);
    }

    #[test]
    fn test_unread_names_are_pruned() {
        let module =
            analysed("module m\nfunction f = |a, b| {\n  return |x| -> a + x\n}\n");
        let closure = closure_of(&module, "f");
        let scope = closure.function.body.scope;
        assert!(module.scopes.owns(scope, "a"));
        assert!(module.scopes.owns(scope, "x"));
        assert!(!module.scopes.owns(scope, "b"));
    }

    #[test]
    fn test_module_state_is_not_captured() {
        let module = analysed("module m\nvar counter = 0\nfunction f = -> |x| -> counter + x\n");
        let closure = closure_of(&module, "f");
        assert!(closure.function.synthetic_parameters.is_empty());
    }

    #[test]
    fn test_self_reference_becomes_self_name() {
        let module = analysed(
            "module m\nfunction f = {\n  let fact = |n| -> fact(n)\n  return fact\n}\n",
        );
        let closure = closure_of(&module, "f");
        assert!(closure.function.synthetic_parameters.is_empty());
        assert_eq!(closure.function.synthetic_self_name.as_deref(), Some("fact"));
    }

    #[test]
    fn test_running_twice_adds_nothing() {
        let mut module = analysed(
            "module m\nfunction f = |a| {\n  return |x| -> a + x\n}\n",
        );
        run(&mut module);
        let closure = closure_of(&module, "f");
        assert_eq!(closure.function.synthetic_parameters, vec!["a"]);
    }

    #[test]
    fn test_nested_closures_capture_transitively() {
        let module = analysed(
            "module m\nfunction f = |a| {\n  return |x| -> |y| -> a + x + y\n}\n",
        );
        let outer = closure_of(&module, "f");
        assert_eq!(outer.function.synthetic_parameters, vec!["a"]);
        let Some(Stmt::Return {
            value: Expr::Closure(inner),
            ..
        }) = outer.function.body.statements.first()
        else {
            panic!("expected an inner closure");
        };
        assert_eq!(inner.function.synthetic_parameters, vec!["a", "x"]);
    }
}
