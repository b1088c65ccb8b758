// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Shared utility functions for the VM.

use crate::value::Value;
use crate::vm::{Result, RuntimeError};

/// Check function arity, returning an ArityError if mismatched.
///
/// For variadic functions the last parameter is the collected array, so
/// `argc` must be at least `arity - 1`. Otherwise `argc` must equal `arity`.
pub fn check_arity(argc: usize, arity: usize, varargs: bool) -> Result<()> {
    if varargs {
        if argc + 1 < arity {
            return Err(RuntimeError::ArityError {
                expected: arity - 1,
                got: argc,
            });
        }
    } else if argc != arity {
        return Err(RuntimeError::ArityError {
            expected: arity,
            got: argc,
        });
    }

    Ok(())
}

/// Fold trailing arguments of a variadic call into an array.
///
/// A single trailing argument that is already an array is passed through
/// unchanged, so callers can forward an argument array.
pub fn collect_varargs(mut args: Vec<Value>, arity: usize) -> Vec<Value> {
    let fixed = arity.saturating_sub(1);
    if args.len() == arity && matches!(args.last(), Some(Value::Array(_))) {
        return args;
    }
    let rest = if args.len() > fixed {
        args.split_off(fixed)
    } else {
        Vec::new()
    };
    args.push(Value::array(rest));
    args
}

/// Conditions must be booleans; there is no truthiness.
pub fn as_condition(value: &Value) -> Result<bool> {
    value.as_bool().ok_or_else(|| RuntimeError::TypeError {
        expected: "Boolean".to_string(),
        got: value.type_name(),
    })
}

/// Read an index argument as an i64.
pub fn as_index(value: &Value) -> Result<i64> {
    match value {
        Value::Integer(n) => Ok(*n as i64),
        Value::Long(n) => Ok(*n),
        other => Err(RuntimeError::TypeError {
            expected: "Integer".to_string(),
            got: other.type_name(),
        }),
    }
}

/// Check `index` against `length` and convert it to a `usize`.
pub fn checked_index(index: i64, length: usize) -> Result<usize> {
    if index < 0 || index as usize >= length {
        return Err(RuntimeError::IndexOutOfBounds { index, length });
    }
    Ok(index as usize)
}
