// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Local slot assignment and verification.
//!
//! Walks each function once, pre-order. Parameters take slots `0..arity`
//! (captured first), then every block numbers its own unassigned references
//! as it is entered. Module state never takes a local slot. Along the way the
//! walk checks that references are declared, constants are assigned once,
//! names are not declared twice in a block, and `break`/`continue` sit in a
//! loop. Problems are collected for the whole module.

use std::collections::HashSet;

use golo_parser::Position;

use super::diagnostics::{ProblemCollector, ProblemKind};
use super::ir::{
    Assignment, Block, ElseBranch, Expr, Function, FunctionKind, InvocationMode, Module, NodeId,
    PositionTable, RefId, ScopeArena, ScopeId, Stmt,
};

/// Assign slots in every function of `module`, reporting problems.
pub fn run(module: &mut Module, problems: &mut ProblemCollector) {
    let Module {
        name,
        functions,
        augmentations,
        named_augmentations,
        initializer,
        scopes,
        positions,
        ..
    } = module;

    let mut pass = SlotPass {
        scopes,
        positions,
        problems,
        state: FunctionState::default(),
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
    log::debug!("slots assigned for module {}", name);
}

/// Per-function walk state, swapped out around nested closures.
#[derive(Default)]
struct FunctionState {
    counter: i32,
    name: String,
    synthetic: bool,
    kind: Option<FunctionKind>,
    scope_stack: Vec<ScopeId>,
    /// References assigned so far, per block nesting.
    assigned: Vec<HashSet<RefId>>,
    /// Names declared in each block.
    declared: Vec<HashSet<String>>,
    loop_depth: usize,
}

struct SlotPass<'a> {
    scopes: &'a mut ScopeArena,
    positions: &'a PositionTable,
    problems: &'a mut ProblemCollector,
    state: FunctionState,
}

impl SlotPass<'_> {
    fn next_slot(&mut self) -> i32 {
        let slot = self.state.counter;
        self.state.counter += 1;
        slot
    }

    fn position(&self, node: NodeId) -> Option<Position> {
        self.positions.get(node)
    }

    fn top(&self) -> Option<ScopeId> {
        self.state.scope_stack.last().copied()
    }

    fn visit_function(&mut self, function: &mut Function) {
        let saved = std::mem::replace(
            &mut self.state,
            FunctionState {
                name: function.name.clone(),
                synthetic: function.synthetic,
                kind: Some(function.kind),
                ..FunctionState::default()
            },
        );

        let body_scope = function.body.scope;
        let mut parameter_refs = HashSet::new();
        let parameters = function.all_parameters();
        for parameter in &parameters {
            if let Some(r) = self.scopes.lookup(body_scope, parameter) {
                let slot = self.next_slot();
                self.scopes.reference_mut(r).index = slot;
                parameter_refs.insert(r);
            }
        }

        self.visit_block_with(
            &mut function.body,
            parameter_refs,
            parameters.into_iter().collect(),
        );
        function.local_count = self.state.counter as usize;

        self.state = saved;
    }

    fn visit_block(&mut self, block: &mut Block) {
        let assigned = self.state.assigned.last().cloned().unwrap_or_default();
        self.visit_block_with(block, assigned, HashSet::new());
    }

    fn visit_block_with(
        &mut self,
        block: &mut Block,
        assigned: HashSet<RefId>,
        declared: HashSet<String>,
    ) {
        for r in self.scopes.owned(block.scope) {
            let reference = self.scopes.reference(r);
            if reference.index < 0 && !reference.is_module_state() {
                let slot = self.next_slot();
                self.scopes.reference_mut(r).index = slot;
            }
        }

        self.state.scope_stack.push(block.scope);
        self.state.assigned.push(assigned);
        self.state.declared.push(declared);
        for statement in &mut block.statements {
            self.visit_statement(statement);
        }
        self.state.declared.pop();
        self.state.assigned.pop();
        self.state.scope_stack.pop();
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
                self.state.loop_depth += 1;
                if let Some(init) = &mut l.init {
                    self.visit_assignment(init);
                }
                self.visit_expression(&mut l.condition);
                self.visit_block(&mut l.body);
                if let Some(post) = &mut l.post {
                    self.visit_statement(post);
                }
                self.state.loop_depth -= 1;
            }
            Stmt::Flow { node, .. } => {
                if self.state.loop_depth == 0 {
                    let position = self.position(*node);
                    self.problems.report(
                        ProblemKind::BreakOrContinueOutsideLoop,
                        position,
                        "continue or break statement outside a loop",
                    );
                }
            }
            Stmt::Try(t) => {
                self.visit_block(&mut t.body);
                if let Some(catch) = &mut t.catch {
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
        let in_module_init = self.state.kind == Some(FunctionKind::ModuleInit);
        let already_assigned = self
            .state
            .assigned
            .last()
            .is_some_and(|a| a.contains(&assignment.target));
        let already_declared = self
            .state
            .declared
            .last()
            .is_some_and(|d| d.contains(&reference.name));
        let position = self.position(assignment.node);

        if reference.is_constant()
            && (already_assigned || (reference.is_module_state() && !in_module_init))
        {
            self.problems.report(
                ProblemKind::AssignConstant,
                position,
                format!("Assigning `{}` but it is a constant reference", reference.name),
            );
        } else if assignment.declaring && !reference.synthetic && already_declared {
            self.problems.report(
                ProblemKind::ReferenceAlreadyDeclaredInBlock,
                position,
                format!("Declaring a duplicate reference `{}`", reference.name),
            );
        }

        // A reference replaced by a later declaration of the same name shares
        // its slot.
        if reference.index < 0
            && !reference.is_module_state()
            && let Some(top) = self.top()
        {
            let slot = match self.scopes.lookup(top, &reference.name) {
                Some(other) if self.scopes.reference(other).index >= 0 => {
                    self.scopes.reference(other).index
                }
                _ => self.next_slot(),
            };
            self.scopes.reference_mut(assignment.target).index = slot;
        }

        if let Some(assigned) = self.state.assigned.last_mut() {
            assigned.insert(assignment.target);
        }
        if assignment.declaring
            && let Some(declared) = self.state.declared.last_mut()
        {
            declared.insert(reference.name.clone());
        }
        self.visit_expression(&mut assignment.value);
    }

    fn visit_expression(&mut self, expression: &mut Expr) {
        match expression {
            Expr::Constant { .. } => {}
            Expr::Lookup { name, node } => {
                let declared = self
                    .top()
                    .is_some_and(|top| self.scopes.has_reference_for(top, name));
                if !declared {
                    let position = self.position(*node);
                    let function = format!(
                        "{}function `{}`",
                        if self.state.synthetic { "synthetic " } else { "" },
                        self.state.name
                    );
                    self.problems.report(
                        ProblemKind::UndeclaredReference,
                        position,
                        format!("Undeclared reference `{}` in {}", name, function),
                    );
                }
            }
            Expr::Binary { left, right, .. } => {
                self.visit_expression(left);
                self.visit_expression(right);
            }
            Expr::Unary { operand, .. } => self.visit_expression(operand),
            Expr::FunctionCall(call) => {
                if call.mode == InvocationMode::Static
                    && let Some(top) = self.top()
                    && let Some(r) = self.scopes.lookup(top, &call.name)
                {
                    call.mode = if self.scopes.reference(r).is_module_state() {
                        InvocationMode::OnModuleState
                    } else {
                        InvocationMode::OnReference
                    };
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
            Expr::Closure(closure) => self.visit_function(&mut closure.function),
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
    use crate::compiler::capture;
    use crate::compiler::lower::lower;
    use golo_parser::Parser;
    use proptest::prelude::*;

    fn verified(source: &str) -> (Module, ProblemCollector) {
        let unit = Parser::parse_str(source).unwrap();
        let mut problems = ProblemCollector::new();
        let mut module = lower(&unit, &mut problems).unwrap();
        capture::run(&mut module);
        run(&mut module, &mut problems);
        (module, problems)
    }

    fn kinds(problems: ProblemCollector) -> Vec<ProblemKind> {
        match problems.finish("m") {
            Ok(()) => Vec::new(),
            Err(e) => e.problems.iter().map(|p| p.kind).collect(),
        }
    }

    #[test]
    fn test_parameters_take_first_slots() {
        let (module, problems) =
            verified("module m\nfunction f = |a, b| {\n  let c = a + b\n  return c\n}\n");
        assert!(problems.is_empty());
        let f = &module.functions["f"];
        let slot = |name: &str| {
            let r = module.scopes.lookup(f.body.scope, name).unwrap();
            module.scopes.reference(r).index
        };
        assert_eq!(slot("a"), 0);
        assert_eq!(slot("b"), 1);
        assert_eq!(slot("c"), 2);
        assert_eq!(f.local_count, 3);
    }

    #[test]
    fn test_three_undeclared_references_batch() {
        let (_, problems) = verified("module m\nfunction f = -> a + b + c\n");
        assert_eq!(
            kinds(problems),
            vec![ProblemKind::UndeclaredReference; 3]
        );
    }

    #[test]
    fn test_double_declaration_in_block() {
        let (_, problems) = verified("module m\nfunction f = {\n  let a = 1\n  let a = 2\n}\n");
        assert_eq!(
            kinds(problems),
            vec![ProblemKind::ReferenceAlreadyDeclaredInBlock]
        );
    }

    #[test]
    fn test_shadowing_in_nested_block_is_allowed() {
        let (_, problems) = verified(
            "module m\nfunction f = {\n  let a = 1\n  if true {\n    let a = 2\n  }\n}\n",
        );
        assert!(problems.is_empty());
    }

    #[test]
    fn test_assigning_constant() {
        let (_, problems) = verified("module m\nfunction f = {\n  let a = 1\n  a = 2\n}\n");
        assert_eq!(kinds(problems), vec![ProblemKind::AssignConstant]);
    }

    #[test]
    fn test_assigning_module_constant_outside_initializer() {
        let (_, problems) = verified("module m\nlet a = 1\nfunction f = {\n  a = 2\n}\n");
        assert_eq!(kinds(problems), vec![ProblemKind::AssignConstant]);
    }

    #[test]
    fn test_break_outside_loop() {
        let (_, problems) = verified("module m\nfunction f = {\n  break\n}\n");
        assert_eq!(
            kinds(problems),
            vec![ProblemKind::BreakOrContinueOutsideLoop]
        );
    }

    #[test]
    fn test_invocation_on_reference() {
        let (module, problems) =
            verified("module m\nfunction f = |g| -> g(1)\n");
        assert!(problems.is_empty());
        let Some(Stmt::Return {
            value: Expr::FunctionCall(call),
            ..
        }) = module.functions["f"].body.statements.first()
        else {
            panic!("expected a call");
        };
        assert_eq!(call.mode, InvocationMode::OnReference);
    }

    #[test]
    fn test_closure_slots_start_with_captures() {
        let (module, problems) =
            verified("module m\nfunction f = |a| {\n  return |x| -> a + x\n}\n");
        assert!(problems.is_empty());
        let Some(Stmt::Return {
            value: Expr::Closure(closure),
            ..
        }) = module.functions["f"].body.statements.first()
        else {
            panic!("expected a closure");
        };
        let scope = closure.function.body.scope;
        let slot = |name: &str| {
            let r = module.scopes.lookup(scope, name).unwrap();
            module.scopes.reference(r).index
        };
        assert_eq!(slot("a"), 0);
        assert_eq!(slot("x"), 1);
    }

    fn declared_slots(module: &Module) -> Vec<(String, i32)> {
        let f = &module.functions["f"];
        module
            .scopes
            .owned(f.body.scope)
            .into_iter()
            .map(|r| {
                let r = module.scopes.reference(r);
                (r.name.clone(), r.index)
            })
            .collect()
    }

    fn generated(params: usize, locals: usize) -> String {
        let params: Vec<String> = (0..params).map(|i| format!("p{}", i)).collect();
        let mut body = String::new();
        for i in 0..locals {
            body.push_str(&format!("  let l{} = {}\n", i, i));
        }
        body.push_str("  if true {\n    let inner = 1\n  }\n  return null\n");
        format!(
            "module m\nfunction f = |{}| {{\n{}}}\n",
            params.join(", "),
            body
        )
    }

    proptest! {
        #[test]
        fn prop_slot_assignment_is_deterministic(params in 1usize..5, locals in 0usize..6) {
            let source = generated(params, locals);
            let (first, problems) = verified(&source);
            prop_assert!(problems.is_empty());
            let (second, _) = verified(&source);
            let slots = declared_slots(&first);
            prop_assert_eq!(&slots, &declared_slots(&second));

            let f = &first.functions["f"];
            for i in 0..params {
                let r = first.scopes.lookup(f.body.scope, &format!("p{}", i)).unwrap();
                prop_assert_eq!(first.scopes.reference(r).index, i as i32);
            }
            let mut indices: Vec<i32> = slots.iter().map(|(_, index)| *index).collect();
            indices.sort_unstable();
            indices.dedup();
            prop_assert_eq!(indices.len(), slots.len());
            prop_assert!(indices.iter().all(|&i| i >= 0 && (i as usize) < f.local_count));
            prop_assert_eq!(f.local_count, params + locals + 1);
        }
    }
}
