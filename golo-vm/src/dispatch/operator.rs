// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Operator call sites and the operator table.
//!
//! Numbers are promoted before arithmetic and comparison: characters count
//! as integers, then integer < long < big integer < float < double, except
//! that a big integer with a float gives a double. Integer arithmetic wraps.
//!
//! Sites guard on the exact classes of the operands. `is`, `isnt`,
//! `oftype` and `orIfNull` are resolved on every call and never cached.

use std::cmp::Ordering;
use std::sync::Arc;

use num_bigint::BigInt;
use num_traits::{ToPrimitive, Zero};

use crate::compiler::ir::OperatorKind;
use crate::runtime::Runtime;
use crate::value::{TypeKey, Value};
use crate::vm::{Result, RuntimeError};

use super::{CacheKey, CacheStats, Callee, InlineCache};

/// Implementation of one operator for the operand classes it was resolved
/// for.
pub type OperatorFn = fn(&[Value]) -> Result<Value>;

/// Exact operand classes.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OperandTypes(TypeKey, Option<TypeKey>);

impl OperandTypes {
    fn of(operands: &[Value]) -> Option<Self> {
        let first = operands.first()?.type_key();
        Some(OperandTypes(first, operands.get(1).map(Value::type_key)))
    }
}

impl CacheKey for OperandTypes {
    type Slot = OperandTypes;

    fn matches(&self, operands: &[Value]) -> bool {
        OperandTypes::of(operands).is_some_and(|types| types == *self)
    }

    fn slot(&self) -> Option<OperandTypes> {
        Some(self.clone())
    }

    fn slot_of(operands: &[Value]) -> Option<OperandTypes> {
        OperandTypes::of(operands)
    }
}

pub struct OperatorCallSite {
    pub op: OperatorKind,
    pub arity: usize,
    cache: InlineCache<OperandTypes, OperatorFn>,
}

impl OperatorCallSite {
    pub fn new(op: OperatorKind, arity: usize) -> Self {
        OperatorCallSite {
            op,
            arity,
            cache: InlineCache::new(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn link(&self, runtime: &Runtime, operands: &[Value]) -> Result<Callee> {
        if !is_guarded(self.op) {
            return resolve(self.op, operands).map(Callee::Operator);
        }
        if let Some(f) = self.cache.lookup(operands, |f| Some(*f)) {
            return Ok(Callee::Operator(f));
        }
        let f = resolve(self.op, operands)?;
        if let Some(types) = OperandTypes::of(operands) {
            log::debug!("linked operator {} for {:?}", self.op.name(), types);
            self.cache
                .relink(types, f, runtime.options().megamorphic_threshold);
        }
        Ok(Callee::Operator(f))
    }
}

fn is_guarded(op: OperatorKind) -> bool {
    !matches!(
        op,
        OperatorKind::Is | OperatorKind::Isnt | OperatorKind::OfType | OperatorKind::OrIfNull
    )
}

/// The implementation of `op` for the classes of `operands`.
pub fn resolve(op: OperatorKind, operands: &[Value]) -> Result<OperatorFn> {
    match operands {
        [operand] => unary(op, operand),
        [left, right] => binary(op, left, right),
        _ => Err(RuntimeError::Internal(format!(
            "operator {} with {} operands",
            op.name(),
            operands.len()
        ))),
    }
}

fn unary(op: OperatorKind, operand: &Value) -> Result<OperatorFn> {
    let f: Option<OperatorFn> = match op {
        OperatorKind::Not if matches!(operand, Value::Bool(_)) => Some(not),
        OperatorKind::Minus if is_numeric(operand) => Some(negate),
        _ => None,
    };
    f.ok_or_else(|| RuntimeError::IllegalUnaryOperand {
        operator: op.name().to_string(),
        operand: operand.type_name(),
    })
}

fn binary(op: OperatorKind, left: &Value, right: &Value) -> Result<OperatorFn> {
    let numeric = is_numeric(left) && is_numeric(right);
    let f: Option<OperatorFn> = match op {
        OperatorKind::Plus if numeric => Some(plus),
        OperatorKind::Plus if is_string(left) || is_string(right) => Some(concat),
        OperatorKind::Minus if numeric => Some(minus),
        OperatorKind::Times if numeric => Some(times),
        OperatorKind::Times => match (left, right) {
            (Value::Integer(_), Value::String(_)) | (Value::String(_), Value::Integer(_)) => {
                Some(repeat)
            }
            _ => None,
        },
        OperatorKind::Divide if numeric => Some(divide),
        OperatorKind::Modulo if numeric => Some(modulo),
        OperatorKind::Equals if numeric => Some(equals_numbers),
        OperatorKind::Equals => Some(equals_values),
        OperatorKind::NotEquals if numeric => Some(not_equals_numbers),
        OperatorKind::NotEquals => Some(not_equals_values),
        OperatorKind::Less if numeric || comparable(left, right) => Some(less),
        OperatorKind::LessOrEquals if numeric || comparable(left, right) => Some(less_or_equals),
        OperatorKind::More if numeric || comparable(left, right) => Some(more),
        OperatorKind::MoreOrEquals if numeric || comparable(left, right) => Some(more_or_equals),
        OperatorKind::Is => Some(is),
        OperatorKind::Isnt => Some(isnt),
        OperatorKind::OfType if matches!(right, Value::Class(_)) => Some(of_type),
        OperatorKind::OrIfNull => Some(or_if_null),
        _ => None,
    };
    f.ok_or_else(|| RuntimeError::IllegalOperand {
        operator: op.name().to_string(),
        left: left.type_name(),
        right: right.type_name(),
    })
}

fn is_numeric(value: &Value) -> bool {
    matches!(
        value,
        Value::Char(_)
            | Value::Integer(_)
            | Value::Long(_)
            | Value::Float(_)
            | Value::Double(_)
            | Value::BigInteger(_)
    )
}

fn is_string(value: &Value) -> bool {
    matches!(value, Value::String(_))
}

/// Same-class operands with a natural order, numbers aside.
fn comparable(left: &Value, right: &Value) -> bool {
    matches!(
        (left, right),
        (Value::String(_), Value::String(_)) | (Value::Bool(_), Value::Bool(_))
    )
}

fn pair(operands: &[Value]) -> Result<(&Value, &Value)> {
    match operands {
        [left, right] => Ok((left, right)),
        _ => Err(RuntimeError::Internal(format!(
            "binary operator with {} operands",
            operands.len()
        ))),
    }
}

fn single(operands: &[Value]) -> Result<&Value> {
    match operands {
        [operand] => Ok(operand),
        _ => Err(RuntimeError::Internal(format!(
            "unary operator with {} operands",
            operands.len()
        ))),
    }
}

// ============================================================================
// Numeric promotion
// ============================================================================

enum Promoted {
    Int(i32, i32),
    Long(i64, i64),
    Big(BigInt, BigInt),
    Float(f32, f32),
    Double(f64, f64),
}

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Rank {
    Int,
    Long,
    Big,
    Float,
    Double,
}

fn rank(value: &Value) -> Option<Rank> {
    match value {
        Value::Char(_) | Value::Integer(_) => Some(Rank::Int),
        Value::Long(_) => Some(Rank::Long),
        Value::BigInteger(_) => Some(Rank::Big),
        Value::Float(_) => Some(Rank::Float),
        Value::Double(_) => Some(Rank::Double),
        _ => None,
    }
}

fn as_i64(value: &Value) -> i64 {
    match value {
        Value::Char(c) => *c as i64,
        Value::Integer(n) => *n as i64,
        Value::Long(n) => *n,
        Value::BigInteger(n) => n.to_i64().unwrap_or_default(),
        Value::Float(n) => *n as i64,
        Value::Double(n) => *n as i64,
        _ => 0,
    }
}

fn as_f64(value: &Value) -> f64 {
    match value {
        Value::BigInteger(n) => n.to_f64().unwrap_or(f64::NAN),
        Value::Float(n) => *n as f64,
        Value::Double(n) => *n,
        other => as_i64(other) as f64,
    }
}

fn as_big(value: &Value) -> BigInt {
    match value {
        Value::BigInteger(n) => (**n).clone(),
        other => BigInt::from(as_i64(other)),
    }
}

fn promote(left: &Value, right: &Value) -> Result<Promoted> {
    let (Some(a), Some(b)) = (rank(left), rank(right)) else {
        return Err(RuntimeError::TypeError {
            expected: "Number".to_string(),
            got: format!("{} and {}", left.type_name(), right.type_name()),
        });
    };
    let big_with_float =
        (a == Rank::Big && b == Rank::Float) || (a == Rank::Float && b == Rank::Big);
    Ok(match a.max(b) {
        _ if big_with_float => Promoted::Double(as_f64(left), as_f64(right)),
        Rank::Int => Promoted::Int(as_i64(left) as i32, as_i64(right) as i32),
        Rank::Long => Promoted::Long(as_i64(left), as_i64(right)),
        Rank::Big => Promoted::Big(as_big(left), as_big(right)),
        Rank::Float => Promoted::Float(as_f64(left) as f32, as_f64(right) as f32),
        Rank::Double => Promoted::Double(as_f64(left), as_f64(right)),
    })
}

#[derive(Clone, Copy)]
enum Arithmetic {
    Plus,
    Minus,
    Times,
    Divide,
    Modulo,
}

fn arithmetic(operands: &[Value], op: Arithmetic) -> Result<Value> {
    let (left, right) = pair(operands)?;
    Ok(match promote(left, right)? {
        Promoted::Int(a, b) => Value::Integer(match op {
            Arithmetic::Plus => a.wrapping_add(b),
            Arithmetic::Minus => a.wrapping_sub(b),
            Arithmetic::Times => a.wrapping_mul(b),
            Arithmetic::Divide if b == 0 => return Err(RuntimeError::DivisionByZero),
            Arithmetic::Divide => a.wrapping_div(b),
            Arithmetic::Modulo if b == 0 => return Err(RuntimeError::DivisionByZero),
            Arithmetic::Modulo => a.wrapping_rem(b),
        }),
        Promoted::Long(a, b) => Value::Long(match op {
            Arithmetic::Plus => a.wrapping_add(b),
            Arithmetic::Minus => a.wrapping_sub(b),
            Arithmetic::Times => a.wrapping_mul(b),
            Arithmetic::Divide if b == 0 => return Err(RuntimeError::DivisionByZero),
            Arithmetic::Divide => a.wrapping_div(b),
            Arithmetic::Modulo if b == 0 => return Err(RuntimeError::DivisionByZero),
            Arithmetic::Modulo => a.wrapping_rem(b),
        }),
        Promoted::Big(a, b) => Value::big(match op {
            Arithmetic::Plus => a + b,
            Arithmetic::Minus => a - b,
            Arithmetic::Times => a * b,
            Arithmetic::Divide | Arithmetic::Modulo if b.is_zero() => {
                return Err(RuntimeError::DivisionByZero);
            }
            Arithmetic::Divide => a / b,
            Arithmetic::Modulo => a % b,
        }),
        Promoted::Float(a, b) => Value::Float(match op {
            Arithmetic::Plus => a + b,
            Arithmetic::Minus => a - b,
            Arithmetic::Times => a * b,
            Arithmetic::Divide => a / b,
            Arithmetic::Modulo => a % b,
        }),
        Promoted::Double(a, b) => Value::Double(match op {
            Arithmetic::Plus => a + b,
            Arithmetic::Minus => a - b,
            Arithmetic::Times => a * b,
            Arithmetic::Divide => a / b,
            Arithmetic::Modulo => a % b,
        }),
    })
}

fn compare_numbers(left: &Value, right: &Value) -> Result<Option<Ordering>> {
    Ok(match promote(left, right)? {
        Promoted::Int(a, b) => Some(a.cmp(&b)),
        Promoted::Long(a, b) => Some(a.cmp(&b)),
        Promoted::Big(a, b) => Some(a.cmp(&b)),
        Promoted::Float(a, b) => a.partial_cmp(&b),
        Promoted::Double(a, b) => a.partial_cmp(&b),
    })
}

fn compare(operands: &[Value]) -> Result<Option<Ordering>> {
    let (left, right) = pair(operands)?;
    match (left, right) {
        (Value::String(a), Value::String(b)) => Ok(Some(a.cmp(b))),
        (Value::Bool(a), Value::Bool(b)) => Ok(Some(a.cmp(b))),
        _ => compare_numbers(left, right),
    }
}

// ============================================================================
// Operators
// ============================================================================

fn plus(operands: &[Value]) -> Result<Value> {
    arithmetic(operands, Arithmetic::Plus)
}

fn minus(operands: &[Value]) -> Result<Value> {
    arithmetic(operands, Arithmetic::Minus)
}

fn times(operands: &[Value]) -> Result<Value> {
    arithmetic(operands, Arithmetic::Times)
}

fn divide(operands: &[Value]) -> Result<Value> {
    arithmetic(operands, Arithmetic::Divide)
}

fn modulo(operands: &[Value]) -> Result<Value> {
    arithmetic(operands, Arithmetic::Modulo)
}

fn concat(operands: &[Value]) -> Result<Value> {
    let (left, right) = pair(operands)?;
    Ok(Value::string(format!("{}{}", left, right)))
}

fn repeat(operands: &[Value]) -> Result<Value> {
    let (count, text) = match pair(operands)? {
        (Value::Integer(n), Value::String(s)) | (Value::String(s), Value::Integer(n)) => (*n, s),
        (left, right) => {
            return Err(RuntimeError::IllegalOperand {
                operator: "times".to_string(),
                left: left.type_name(),
                right: right.type_name(),
            });
        }
    };
    let count = usize::try_from(count)
        .map_err(|_| RuntimeError::IllegalArgument(format!("count is negative: {}", count)))?;
    Ok(Value::string(text.repeat(count)))
}

fn equals_numbers(operands: &[Value]) -> Result<Value> {
    let (left, right) = pair(operands)?;
    Ok(Value::Bool(
        compare_numbers(left, right)? == Some(Ordering::Equal),
    ))
}

fn not_equals_numbers(operands: &[Value]) -> Result<Value> {
    let (left, right) = pair(operands)?;
    Ok(Value::Bool(
        compare_numbers(left, right)? != Some(Ordering::Equal),
    ))
}

fn equals_values(operands: &[Value]) -> Result<Value> {
    let (left, right) = pair(operands)?;
    Ok(Value::Bool(left == right))
}

fn not_equals_values(operands: &[Value]) -> Result<Value> {
    let (left, right) = pair(operands)?;
    Ok(Value::Bool(left != right))
}

fn less(operands: &[Value]) -> Result<Value> {
    Ok(Value::Bool(compare(operands)? == Some(Ordering::Less)))
}

fn less_or_equals(operands: &[Value]) -> Result<Value> {
    Ok(Value::Bool(matches!(
        compare(operands)?,
        Some(Ordering::Less | Ordering::Equal)
    )))
}

fn more(operands: &[Value]) -> Result<Value> {
    Ok(Value::Bool(compare(operands)? == Some(Ordering::Greater)))
}

fn more_or_equals(operands: &[Value]) -> Result<Value> {
    Ok(Value::Bool(matches!(
        compare(operands)?,
        Some(Ordering::Greater | Ordering::Equal)
    )))
}

fn not(operands: &[Value]) -> Result<Value> {
    match single(operands)? {
        Value::Bool(b) => Ok(Value::Bool(!b)),
        other => Err(RuntimeError::IllegalUnaryOperand {
            operator: "not".to_string(),
            operand: other.type_name(),
        }),
    }
}

fn negate(operands: &[Value]) -> Result<Value> {
    Ok(match single(operands)? {
        Value::Char(c) => Value::Integer((*c as i32).wrapping_neg()),
        Value::Integer(n) => Value::Integer(n.wrapping_neg()),
        Value::Long(n) => Value::Long(n.wrapping_neg()),
        Value::BigInteger(n) => Value::big(-(**n).clone()),
        Value::Float(n) => Value::Float(-n),
        Value::Double(n) => Value::Double(-n),
        other => {
            return Err(RuntimeError::IllegalUnaryOperand {
                operator: "minus".to_string(),
                operand: other.type_name(),
            });
        }
    })
}

/// Reference identity; immediate values are identical when equal.
pub fn identical(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::String(a), Value::String(b)) => Arc::ptr_eq(a, b),
        (Value::BigInteger(a), Value::BigInteger(b)) => Arc::ptr_eq(a, b),
        (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
        (Value::Struct(a), Value::Struct(b)) => Arc::ptr_eq(a, b),
        (Value::Union(a), Value::Union(b)) => Arc::ptr_eq(a, b),
        (Value::Tuple(a), Value::Tuple(b)) => a.ptr_eq(b),
        (Value::Array(a), Value::Array(b))
        | (Value::List(a), Value::List(b))
        | (Value::Vector(a), Value::Vector(b)) => Arc::ptr_eq(a, b),
        (Value::Set(a), Value::Set(b)) => Arc::ptr_eq(a, b),
        (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
        (Value::Exception(a), Value::Exception(b)) => Arc::ptr_eq(a, b),
        (Value::Null, Value::Null)
        | (Value::Bool(_), Value::Bool(_))
        | (Value::Char(_), Value::Char(_))
        | (Value::Integer(_), Value::Integer(_))
        | (Value::Long(_), Value::Long(_))
        | (Value::Float(_), Value::Float(_))
        | (Value::Double(_), Value::Double(_))
        | (Value::Class(_), Value::Class(_)) => left == right,
        _ => false,
    }
}

fn is(operands: &[Value]) -> Result<Value> {
    let (left, right) = pair(operands)?;
    Ok(Value::Bool(identical(left, right)))
}

fn isnt(operands: &[Value]) -> Result<Value> {
    let (left, right) = pair(operands)?;
    Ok(Value::Bool(!identical(left, right)))
}

fn of_type(operands: &[Value]) -> Result<Value> {
    match pair(operands)? {
        (value, Value::Class(class)) => Ok(Value::Bool(
            !value.is_null() && value.type_key().is_assignable_to(class),
        )),
        (left, right) => Err(RuntimeError::IllegalOperand {
            operator: "oftype".to_string(),
            left: left.type_name(),
            right: right.type_name(),
        }),
    }
}

fn or_if_null(operands: &[Value]) -> Result<Value> {
    let (left, right) = pair(operands)?;
    Ok(if left.is_null() {
        right.clone()
    } else {
        left.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn apply(op: OperatorKind, operands: &[Value]) -> Result<Value> {
        resolve(op, operands)?(operands)
    }

    fn show(op: OperatorKind, left: Value, right: Value) -> String {
        apply(op, &[left, right]).unwrap().to_string()
    }

    #[test]
    fn test_plus() {
        assert_eq!(show(OperatorKind::Plus, 1.into(), 1.into()), "2");
        assert_eq!(show(OperatorKind::Plus, "a".into(), 1.into()), "a1");
        assert_eq!(show(OperatorKind::Plus, 1.into(), "a".into()), "1a");
        assert_eq!(show(OperatorKind::Plus, "a".into(), Value::Null), "anull");
        assert_eq!(show(OperatorKind::Plus, 1.into(), 2_i64.into()), "3");
        assert_eq!(show(OperatorKind::Plus, 1.into(), 0.5.into()), "1.5");
    }

    #[test]
    fn test_promotion_classes() {
        let sum = |a: Value, b: Value| apply(OperatorKind::Plus, &[a, b]).unwrap().type_key();
        assert_eq!(sum(Value::Char('a'), 1.into()), TypeKey::Integer);
        assert_eq!(sum(1.into(), 1_i64.into()), TypeKey::Long);
        assert_eq!(sum(1_i64.into(), Value::Float(1.0)), TypeKey::Float);
        assert_eq!(sum(Value::Float(1.0), 1.0.into()), TypeKey::Double);
        assert_eq!(sum(Value::big(1.into()), 1.into()), TypeKey::BigInteger);
        assert_eq!(sum(Value::big(1.into()), Value::Float(1.0)), TypeKey::Double);
    }

    #[test]
    fn test_times_repeats_strings() {
        assert_eq!(show(OperatorKind::Times, 2.into(), "x".into()), "xx");
        assert_eq!(show(OperatorKind::Times, "ab".into(), 3.into()), "ababab");
        assert!(matches!(
            apply(OperatorKind::Times, &["x".into(), "y".into()]),
            Err(RuntimeError::IllegalOperand { .. })
        ));
    }

    #[test]
    fn test_undefined_combination_names_both_types() {
        let err = apply(OperatorKind::Minus, &["a".into(), 1.into()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Operator minus is not supported for types String and Integer"
        );
        let err = apply(OperatorKind::Not, &[1.into()]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Operator not is not supported for type Integer"
        );
    }

    #[test]
    fn test_integer_division_by_zero() {
        assert!(matches!(
            apply(OperatorKind::Divide, &[1.into(), 0.into()]),
            Err(RuntimeError::DivisionByZero)
        ));
        assert_eq!(
            show(OperatorKind::Divide, 1.0.into(), 0.into()),
            "Infinity"
        );
    }

    #[test]
    fn test_comparisons() {
        assert_eq!(show(OperatorKind::Less, 1.into(), 2_i64.into()), "true");
        assert_eq!(show(OperatorKind::MoreOrEquals, "b".into(), "a".into()), "true");
        assert_eq!(show(OperatorKind::Equals, 1.into(), 1_i64.into()), "true");
        assert_eq!(show(OperatorKind::Equals, "a".into(), 1.into()), "false");
        assert!(apply(OperatorKind::Less, &["a".into(), 1.into()]).is_err());
    }

    #[test]
    fn test_identity_operators() {
        let list = Value::list(vec![]);
        assert_eq!(show(OperatorKind::Is, list.clone(), list.clone()), "true");
        assert_eq!(show(OperatorKind::Is, list, Value::list(vec![])), "false");
        assert_eq!(show(OperatorKind::Isnt, Value::Null, 1.into()), "true");
        assert_eq!(
            show(OperatorKind::OfType, 1.into(), Value::Class(TypeKey::Number)),
            "true"
        );
        assert_eq!(show(OperatorKind::OrIfNull, Value::Null, 2.into()), "2");
        assert_eq!(show(OperatorKind::OrIfNull, 1.into(), 2.into()), "1");
    }

    #[test]
    fn test_unguarded_operators_are_not_cached() {
        let runtime = Runtime::new();
        let site = OperatorCallSite::new(OperatorKind::OrIfNull, 2);
        for _ in 0..3 {
            site.link(&runtime, &[Value::Null, 1.into()]).unwrap();
        }
        assert_eq!(site.stats(), CacheStats::default());

        let site = OperatorCallSite::new(OperatorKind::Plus, 2);
        for _ in 0..3 {
            site.link(&runtime, &[1.into(), 1.into()]).unwrap();
        }
        let stats = site.stats();
        assert_eq!((stats.misses, stats.hits, stats.depth), (1, 2, 1));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn prop_integer_arithmetic_wraps(a in any::<i32>(), b in any::<i32>()) {
            let sum = apply(OperatorKind::Plus, &[a.into(), b.into()]).unwrap();
            prop_assert_eq!(sum, Value::Integer(a.wrapping_add(b)));
            let product = apply(OperatorKind::Times, &[a.into(), b.into()]).unwrap();
            prop_assert_eq!(product, Value::Integer(a.wrapping_mul(b)));
        }

        #[test]
        fn prop_ordering_agrees_with_i64(a in any::<i32>(), b in any::<i64>()) {
            let less = apply(OperatorKind::Less, &[a.into(), b.into()]).unwrap();
            prop_assert_eq!(less, Value::Bool((a as i64) < b));
        }
    }
}
