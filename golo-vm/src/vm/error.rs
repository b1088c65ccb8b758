// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Runtime errors for the VM.

use std::sync::Arc;

use thiserror::Error;

use crate::value::{ExceptionValue, Value};

/// Runtime error during VM execution.
#[derive(Debug, Clone, Error)]
pub enum RuntimeError {
    #[error("Stack underflow")]
    StackUnderflow,

    #[error("Type error: expected {expected}, got {got}")]
    TypeError { expected: String, got: String },

    #[error("/ by zero")]
    DivisionByZero,

    #[error("No function `{name}` with {arity} argument(s) is visible from module {module}")]
    NoSuchFunction {
        name: String,
        arity: usize,
        module: String,
    },

    #[error("No method `{name}` with {arity} argument(s) on class {class}")]
    NoSuchMethod {
        class: String,
        name: String,
        arity: usize,
    },

    #[error("Operator {operator} is not supported for types {left} and {right}")]
    IllegalOperand {
        operator: String,
        left: String,
        right: String,
    },

    #[error("Operator {operator} is not supported for type {operand}")]
    IllegalUnaryOperand { operator: String, operand: String },

    #[error("Value is not callable: {0}")]
    NotCallable(String),

    #[error("Wrong number of arguments: expected {expected}, got {got}")]
    ArityError { expected: usize, got: usize },

    #[error("Index {index} out of bounds for length {length}")]
    IndexOutOfBounds { index: i64, length: usize },

    #[error("The struct instance is frozen: {0}")]
    FrozenStruct(String),

    #[error("Cannot invoke `{0}` on null")]
    NullReceiver(String),

    #[error("Stack overflow: call depth exceeded {0}")]
    StackOverflow(usize),

    /// A value raised by `throw`.
    #[error("{0}")]
    Thrown(Value),

    #[error("{0}")]
    IllegalArgument(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl RuntimeError {
    /// Exception class name used when the error is caught by Golo code.
    pub fn kind(&self) -> &str {
        match self {
            RuntimeError::StackUnderflow
            | RuntimeError::Internal(_)
            | RuntimeError::FrozenStruct(_) => "IllegalStateException",
            RuntimeError::TypeError { .. } | RuntimeError::NotCallable(_) => "ClassCastException",
            RuntimeError::DivisionByZero => "ArithmeticException",
            RuntimeError::NoSuchFunction { .. } | RuntimeError::NoSuchMethod { .. } => {
                "NoSuchMethodError"
            }
            RuntimeError::IllegalOperand { .. }
            | RuntimeError::IllegalUnaryOperand { .. }
            | RuntimeError::IllegalArgument(_) => {
                "IllegalArgumentException"
            }
            RuntimeError::ArityError { .. } => "WrongMethodTypeException",
            RuntimeError::IndexOutOfBounds { .. } => "IndexOutOfBoundsException",
            RuntimeError::NullReceiver(_) => "NullPointerException",
            RuntimeError::StackOverflow(_) => "StackOverflowError",
            RuntimeError::Thrown(Value::Exception(e)) => &e.kind,
            RuntimeError::Thrown(_) => "GoloThrowable",
        }
    }

    /// The value a `catch` block receives for this error.
    pub fn into_value(self) -> Value {
        match self {
            RuntimeError::Thrown(value) => value,
            other => {
                let kind = other.kind().to_string();
                let message = other.to_string();
                Value::Exception(Arc::new(ExceptionValue {
                    kind,
                    message,
                    source: Some(Box::new(other)),
                }))
            }
        }
    }

    /// The error raised by throwing `value`. Exceptions created from runtime
    /// faults raise the original fault again.
    pub fn from_thrown(value: Value) -> RuntimeError {
        if let Value::Exception(e) = &value
            && let Some(source) = &e.source
        {
            return (**source).clone();
        }
        RuntimeError::Thrown(value)
    }
}

/// Result type for VM operations.
pub type Result<T> = std::result::Result<T, RuntimeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_round_trips_through_exception_value() {
        let err = RuntimeError::DivisionByZero;
        let value = err.into_value();
        assert_eq!(value.to_string(), "ArithmeticException: / by zero");
        assert!(matches!(
            RuntimeError::from_thrown(value),
            RuntimeError::DivisionByZero
        ));
    }

    #[test]
    fn test_thrown_value_is_kept() {
        let err = RuntimeError::from_thrown(Value::from("boom"));
        assert_eq!(err.kind(), "GoloThrowable");
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_illegal_operand_message() {
        let err = RuntimeError::IllegalOperand {
            operator: "-".to_string(),
            left: "String".to_string(),
            right: "Integer".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Operator - is not supported for types String and Integer"
        );
    }
}
