// golo-embed - Embedding API for Golo
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # golo-embed
//!
//! A high-level embedding API for the Golo programming language.
//!
//! This crate wraps the compiler, the loader and the dispatch runtime of
//! `golo-vm` behind an [`Engine`] that loads modules and calls their
//! functions with plain Rust values.
//!
//! ## Quick Start
//!
//! ```rust
//! use golo_embed::Engine;
//!
//! let engine = Engine::new();
//! engine.load_str("module demo\nfunction answer = -> 6 * 7").unwrap();
//! let answer: i32 = engine.call("demo", "answer", ()).unwrap();
//! assert_eq!(answer, 42);
//! ```
//!
//! ## Registering Native Functions
//!
//! ```rust
//! use golo_embed::{Engine, Error, Result, Value};
//!
//! let engine = Engine::new();
//! engine
//!     .register_native("host", "shout", 1, |args: &[Value]| -> Result<Value> {
//!         match args.first() {
//!             Some(Value::String(s)) => Ok(Value::string(s.to_uppercase())),
//!             Some(other) => Err(Error::type_error("String", other.type_name())),
//!             None => Ok(Value::Null),
//!         }
//!     })
//!     .unwrap();
//! engine.load_str("module demo\nimport host\nfunction main = -> shout(\"hi\")").unwrap();
//! let result: String = engine.call("demo", "main", ()).unwrap();
//! assert_eq!(result, "HI");
//! ```

mod convert;
mod engine;
mod error;

pub use convert::{FromGoloValue, IntoGoloValue, from_golo, to_golo};
pub use engine::{Engine, IntoArgs};
pub use error::{Error, Result};

// Re-export core types for convenience
pub use golo_vm::{LoadError, RuntimeError, RuntimeOptions, Value};
