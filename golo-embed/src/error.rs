// golo-embed - Embedding API for Golo
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Errors surfaced to the host application.

use golo_vm::{LoadError, RuntimeError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The module could not be read, compiled, defined or initialised.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Golo code failed, or threw a value nobody caught.
    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    /// A value could not be converted to the requested Rust type.
    #[error("Type error: expected {expected}, got {got}")]
    Conversion { expected: String, got: String },

    #[error("{0}")]
    OutOfRange(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    pub fn type_error(expected: impl Into<String>, got: impl Into<String>) -> Self {
        Error::Conversion {
            expected: expected.into(),
            got: got.into(),
        }
    }

    /// The error a host function reports back into Golo code.
    pub(crate) fn into_runtime(self) -> RuntimeError {
        match self {
            Error::Runtime(e) => e,
            Error::Conversion { expected, got } => RuntimeError::TypeError { expected, got },
            other => RuntimeError::IllegalArgument(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
