// golo-embed - Type conversion traits
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Type conversion between Rust and Golo values.
//!
//! This module provides the [`IntoGoloValue`] and [`FromGoloValue`] traits for
//! converting between Rust types and [`Value`].
//!
//! # Built-in Conversions
//!
//! | Rust Type | Golo Class |
//! |-----------|------------|
//! | `()` | `null` |
//! | `bool` | `Boolean` |
//! | `i32` | `Integer` |
//! | `i64` | `Long` |
//! | `f32` | `Float` |
//! | `f64` | `Double` |
//! | `BigInt` | `BigInteger` |
//! | `char` | `Character` |
//! | `String`, `&str` | `String` |
//! | `Vec<T>` | `List` |
//! | `HashMap<K, V>` | `Map` |
//! | `Option<T>` | `T` or `null` |
//!
//! Reading numbers widens: an `i64` accepts an `Integer`, an `f64` accepts
//! any number. `Vec<T>` reads any sequence: lists, vectors, arrays, tuples
//! and sets.
//!
//! # Custom Conversions
//!
//! ```rust
//! use golo_embed::{Error, FromGoloValue, IntoGoloValue, Result, Value};
//!
//! struct Point { x: i32, y: i32 }
//!
//! impl IntoGoloValue for Point {
//!     fn into_golo_value(self) -> Value {
//!         Value::tuple([Value::Integer(self.x), Value::Integer(self.y)])
//!     }
//! }
//!
//! impl FromGoloValue for Point {
//!     fn from_golo_value(val: &Value) -> Result<Self> {
//!         match val.elements().as_deref() {
//!             Some([x, y]) => Ok(Point {
//!                 x: i32::from_golo_value(x)?,
//!                 y: i32::from_golo_value(y)?,
//!             }),
//!             _ => Err(Error::type_error("tuple of 2 integers", val.type_name())),
//!         }
//!     }
//! }
//! ```

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;

use golo_vm::Value;
use num_bigint::BigInt;

use crate::error::{Error, Result};

/// Convert a Rust type into a Golo `Value`.
pub trait IntoGoloValue {
    fn into_golo_value(self) -> Value;
}

/// Convert a Golo `Value` into a Rust type.
pub trait FromGoloValue: Sized {
    fn from_golo_value(val: &Value) -> Result<Self>;
}

// ============================================================================
// IntoGoloValue implementations
// ============================================================================

impl IntoGoloValue for Value {
    fn into_golo_value(self) -> Value {
        self
    }
}

impl IntoGoloValue for () {
    fn into_golo_value(self) -> Value {
        Value::Null
    }
}

impl IntoGoloValue for bool {
    fn into_golo_value(self) -> Value {
        Value::Bool(self)
    }
}

impl IntoGoloValue for i32 {
    fn into_golo_value(self) -> Value {
        Value::Integer(self)
    }
}

impl IntoGoloValue for i64 {
    fn into_golo_value(self) -> Value {
        Value::Long(self)
    }
}

impl IntoGoloValue for f32 {
    fn into_golo_value(self) -> Value {
        Value::Float(self)
    }
}

impl IntoGoloValue for f64 {
    fn into_golo_value(self) -> Value {
        Value::Double(self)
    }
}

impl IntoGoloValue for BigInt {
    fn into_golo_value(self) -> Value {
        Value::big(self)
    }
}

impl IntoGoloValue for char {
    fn into_golo_value(self) -> Value {
        Value::Char(self)
    }
}

impl IntoGoloValue for String {
    fn into_golo_value(self) -> Value {
        Value::string(self)
    }
}

impl IntoGoloValue for &str {
    fn into_golo_value(self) -> Value {
        Value::string(self)
    }
}

impl IntoGoloValue for Arc<str> {
    fn into_golo_value(self) -> Value {
        Value::String(self)
    }
}

impl<T: IntoGoloValue> IntoGoloValue for Vec<T> {
    fn into_golo_value(self) -> Value {
        Value::list(self.into_iter().map(|x| x.into_golo_value()).collect())
    }
}

impl<T: IntoGoloValue> IntoGoloValue for Option<T> {
    fn into_golo_value(self) -> Value {
        match self {
            Some(v) => v.into_golo_value(),
            None => Value::Null,
        }
    }
}

impl<K: IntoGoloValue, V: IntoGoloValue> IntoGoloValue for HashMap<K, V> {
    fn into_golo_value(self) -> Value {
        Value::map(
            self.into_iter()
                .map(|(k, v)| (k.into_golo_value(), v.into_golo_value())),
        )
    }
}

// ============================================================================
// FromGoloValue implementations
// ============================================================================

impl FromGoloValue for Value {
    fn from_golo_value(val: &Value) -> Result<Self> {
        Ok(val.clone())
    }
}

impl FromGoloValue for () {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val {
            Value::Null => Ok(()),
            other => Err(Error::type_error("null", other.type_name())),
        }
    }
}

impl FromGoloValue for bool {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val {
            Value::Bool(b) => Ok(*b),
            other => Err(Error::type_error("Boolean", other.type_name())),
        }
    }
}

impl FromGoloValue for i32 {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val {
            Value::Integer(n) => Ok(*n),
            Value::Long(n) => i32::try_from(*n).map_err(|_| {
                Error::OutOfRange(format!(
                    "long {} out of range for i32 ({}..={})",
                    n,
                    i32::MIN,
                    i32::MAX
                ))
            }),
            other => Err(Error::type_error("Integer", other.type_name())),
        }
    }
}

impl FromGoloValue for i64 {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val {
            Value::Integer(n) => Ok(*n as i64),
            Value::Long(n) => Ok(*n),
            Value::BigInteger(n) => i64::try_from(n.as_ref())
                .map_err(|_| Error::OutOfRange(format!("{} out of range for i64", n))),
            other => Err(Error::type_error("Long", other.type_name())),
        }
    }
}

impl FromGoloValue for f64 {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val {
            Value::Double(n) => Ok(*n),
            Value::Float(n) => Ok(*n as f64),
            Value::Integer(n) => Ok(*n as f64),
            Value::Long(n) => Ok(*n as f64),
            other => Err(Error::type_error("Number", other.type_name())),
        }
    }
}

impl FromGoloValue for f32 {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val {
            Value::Float(n) => Ok(*n),
            Value::Double(n) => {
                let result = *n as f32;
                if result.is_infinite() && n.is_finite() {
                    Err(Error::OutOfRange(format!("double {} overflows f32", n)))
                } else {
                    Ok(result)
                }
            }
            Value::Integer(n) => Ok(*n as f32),
            Value::Long(n) => Ok(*n as f32),
            other => Err(Error::type_error("Number", other.type_name())),
        }
    }
}

impl FromGoloValue for BigInt {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val {
            Value::BigInteger(n) => Ok(n.as_ref().clone()),
            Value::Integer(n) => Ok(BigInt::from(*n)),
            Value::Long(n) => Ok(BigInt::from(*n)),
            other => Err(Error::type_error("BigInteger", other.type_name())),
        }
    }
}

impl FromGoloValue for char {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val {
            Value::Char(c) => Ok(*c),
            other => Err(Error::type_error("Character", other.type_name())),
        }
    }
}

impl FromGoloValue for String {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val {
            Value::String(s) => Ok(s.to_string()),
            other => Err(Error::type_error("String", other.type_name())),
        }
    }
}

impl<T: FromGoloValue> FromGoloValue for Vec<T> {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val.elements() {
            Some(items) => items.iter().map(T::from_golo_value).collect(),
            None => Err(Error::type_error("List", val.type_name())),
        }
    }
}

impl<T: FromGoloValue> FromGoloValue for Option<T> {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val {
            Value::Null => Ok(None),
            other => T::from_golo_value(other).map(Some),
        }
    }
}

impl<K: FromGoloValue + Eq + Hash, V: FromGoloValue> FromGoloValue for HashMap<K, V> {
    fn from_golo_value(val: &Value) -> Result<Self> {
        match val {
            Value::Map(m) => {
                let m = m.read();
                let mut result = HashMap::with_capacity(m.len());
                for (k, v) in m.iter() {
                    result.insert(K::from_golo_value(k)?, V::from_golo_value(v)?);
                }
                Ok(result)
            }
            other => Err(Error::type_error("Map", other.type_name())),
        }
    }
}

// ============================================================================
// Convenience functions
// ============================================================================

#[must_use]
pub fn to_golo<T: IntoGoloValue>(value: T) -> Value {
    value.into_golo_value()
}

pub fn from_golo<T: FromGoloValue>(val: &Value) -> Result<T> {
    T::from_golo_value(val)
}
