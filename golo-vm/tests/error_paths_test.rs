// golo-vm - Error path tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Tests for error paths:
//! - Compilation problems
//! - Resolution failures
//! - Operator and arity errors
//! - Uncaught exceptions

use std::sync::Arc;

use golo_vm::compiler::ProblemKind;
use golo_vm::{CompileError, LoadError, Loader, Runtime, RuntimeError, VM};

fn compile_and_run(src: &str) -> Result<String, String> {
    let runtime = Arc::new(Runtime::new());
    Loader::new(Arc::clone(&runtime))
        .load_source("test.golo", src)
        .map_err(|e| e.to_string())?;
    let mut vm = VM::new(runtime);
    match vm.call_named("test", "main", vec![]) {
        Ok(val) => Ok(val.to_string()),
        Err(e) => Err(format!("{}", e)),
    }
}

fn expect_error(src: &str, expected_pattern: &str) {
    let result = compile_and_run(src);
    match result {
        Err(e) => {
            assert!(
                e.to_lowercase().contains(&expected_pattern.to_lowercase()),
                "Error '{}' should contain '{}' for source: {}",
                e,
                expected_pattern,
                src
            );
        }
        Ok(val) => {
            panic!(
                "Expected error containing '{}', but got success: {} for source: {}",
                expected_pattern, val, src
            );
        }
    }
}

fn problem_kinds(src: &str) -> Vec<ProblemKind> {
    let runtime = Arc::new(Runtime::new());
    match Loader::new(runtime).load_source("test.golo", src) {
        Err(LoadError::Compile(CompileError::Compilation(e))) => {
            e.problems.iter().map(|p| p.kind).collect()
        }
        other => panic!("expected compilation problems, got {:?}", other.map(|m| m.name.clone())),
    }
}

// ============================================================================
// Compilation problems
// ============================================================================

#[test]
fn test_undeclared_reference() {
    expect_error("module test\nfunction main = -> missing", "UNDECLARED_REFERENCE");
    expect_error("module test\nfunction main = -> missing", "In Golo module: test.golo");
}

#[test]
fn test_problems_are_batched() {
    let src = "module test\n\
               function main = {\n\
                 let a = 1\n\
                 a = 2\n\
                 let a = 3\n\
                 return b\n\
               }\n";
    let kinds = problem_kinds(src);
    assert!(kinds.contains(&ProblemKind::AssignConstant));
    assert!(kinds.contains(&ProblemKind::ReferenceAlreadyDeclaredInBlock));
    assert!(kinds.contains(&ProblemKind::UndeclaredReference));
}

#[test]
fn test_break_outside_loop() {
    assert_eq!(
        problem_kinds("module test\nfunction main = {\n  break\n}\n"),
        vec![ProblemKind::BreakOrContinueOutsideLoop]
    );
}

#[test]
fn test_augment_function_needs_receiver() {
    assert_eq!(
        problem_kinds("module test\naugment String {\n  function nothing = -> null\n}\n"),
        vec![ProblemKind::AugmentFunctionNoArgs]
    );
}

#[test]
fn test_parse_error() {
    expect_error("module test\nfunction main = {\n  1 + 2\n}\n", "PARSING");
    expect_error("function main = -> 1", "PARSING");
}

// ============================================================================
// Resolution failures
// ============================================================================

#[test]
fn test_no_such_function() {
    expect_error(
        "module test\nfunction main = -> nowhere(1)",
        "No function `nowhere` with 1 argument(s) is visible from module test",
    );
    expect_error(
        "module test\nfunction one = |a| -> a\nfunction main = -> one(1, 2)",
        "No function `one` with 2 argument(s)",
    );
}

#[test]
fn test_no_such_method() {
    expect_error(
        "module test\nfunction main = -> 1: frobnicate()",
        "No method `frobnicate` with 0 argument(s) on class Integer",
    );
}

#[test]
fn test_null_receiver() {
    expect_error(
        "module test\nfunction main = -> null: length()",
        "Cannot invoke `length` on null",
    );
}

// ============================================================================
// Operators, arity and indexing
// ============================================================================

#[test]
fn test_division_by_zero() {
    expect_error("module test\nfunction main = -> 1 / 0", "/ by zero");
    expect_error("module test\nfunction main = -> 1 % 0", "/ by zero");
}

#[test]
fn test_illegal_operands() {
    expect_error(
        "module test\nfunction main = -> \"a\" - 1",
        "Operator minus is not supported for types String and Integer",
    );
    expect_error(
        "module test\nfunction main = -> not 1",
        "Operator not is not supported for type Integer",
    );
}

#[test]
fn test_closure_arity() {
    expect_error(
        "module test\nfunction main = {\n  let f = |x| -> x\n  return f(1, 2)\n}\n",
        "Wrong number of arguments: expected 1, got 2",
    );
}

#[test]
fn test_not_callable() {
    expect_error(
        "module test\nfunction main = {\n  let f = 1\n  return f(2)\n}\n",
        "not callable",
    );
}

#[test]
fn test_index_out_of_bounds() {
    expect_error(
        "module test\nfunction main = -> list[1, 2]: get(5)",
        "Index 5 out of bounds for length 2",
    );
}

#[test]
fn test_frozen_struct() {
    expect_error(
        "module test\nstruct Point = { x, y }\nfunction main = {\n  let p = ImmutablePoint(1, 2)\n  p: x(3)\n  return p\n}\n",
        "frozen",
    );
}

// ============================================================================
// Uncaught exceptions
// ============================================================================

#[test]
fn test_uncaught_raise() {
    expect_error(
        "module test\nfunction main = -> raise(\"boom\")",
        "RuntimeException: boom",
    );
}

#[test]
fn test_uncaught_throw_keeps_value() {
    let runtime = Arc::new(Runtime::new());
    Loader::new(Arc::clone(&runtime))
        .load_source(
            "test.golo",
            "module test\nfunction main = {\n  throw 42\n}\n",
        )
        .unwrap();
    let err = VM::new(runtime)
        .call_named("test", "main", vec![])
        .unwrap_err();
    assert!(matches!(err, RuntimeError::Thrown(golo_vm::Value::Integer(42))));
    assert_eq!(err.kind(), "GoloThrowable");
}

#[test]
fn test_catch_sees_runtime_fault() {
    let src = "module test\n\
               function main = {\n\
                 try {\n\
                   return 1: nothing()\n\
                 } catch (e) {\n\
                   throw e\n\
                 }\n\
               }\n";
    expect_error(src, "No method `nothing`");
}

#[test]
fn test_vm_is_reusable_after_error() {
    let runtime = Arc::new(Runtime::new());
    Loader::new(Arc::clone(&runtime))
        .load_source(
            "test.golo",
            "module test\nfunction fail = -> 1 / 0\nfunction ok = -> 1\n",
        )
        .unwrap();
    let mut vm = VM::new(runtime);
    assert!(vm.call_named("test", "fail", vec![]).is_err());
    assert_eq!(vm.depth(), 0);
    assert_eq!(
        vm.call_named("test", "ok", vec![]).unwrap(),
        golo_vm::Value::Integer(1)
    );
}
