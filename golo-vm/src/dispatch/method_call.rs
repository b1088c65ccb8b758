// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Method call sites.
//!
//! A method is looked up on the receiver's class, in this order:
//! 1. built-in methods of the class and its supertypes, and `isX`
//!    predicates on union values
//! 2. a field of the same name: a getter with no argument, a setter with one
//! 3. augmentations visible from the calling module
//!
//! Sites guard on the receiver class. When several built-in methods share
//! the name and arity, the best one is picked by scoring the arguments and
//! the guard also covers the argument classes.

use std::sync::{Arc, Weak};

use crate::chunk::CodeUnit;
use crate::runtime::classes::{NativeMethod, ParamType, candidates};
use crate::runtime::{NativeMethodFn, Runtime};
use crate::value::{TypeKey, Value};
use crate::vm::{Result, RuntimeError};

use super::augmentation;
use super::{CacheKey, CacheStats, Callee, InlineCache};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodKey {
    receiver: TypeKey,
    /// Argument classes, for overloaded targets only.
    arguments: Option<Vec<TypeKey>>,
}

impl MethodKey {
    fn monomorphic(receiver: TypeKey) -> Self {
        MethodKey {
            receiver,
            arguments: None,
        }
    }

    fn overloaded(operands: &[Value]) -> Self {
        MethodKey {
            receiver: operands[0].type_key(),
            arguments: Some(operands[1..].iter().map(Value::type_key).collect()),
        }
    }
}

impl CacheKey for MethodKey {
    type Slot = TypeKey;

    fn matches(&self, operands: &[Value]) -> bool {
        let Some((receiver, arguments)) = operands.split_first() else {
            return false;
        };
        receiver.type_key() == self.receiver
            && self.arguments.as_ref().is_none_or(|expected| {
                expected.len() == arguments.len()
                    && expected.iter().zip(arguments).all(|(t, a)| *t == a.type_key())
            })
    }

    fn slot(&self) -> Option<TypeKey> {
        match self.arguments {
            None => Some(self.receiver.clone()),
            Some(_) => None,
        }
    }

    fn slot_of(operands: &[Value]) -> Option<TypeKey> {
        operands.first().map(Value::type_key)
    }
}

#[derive(Clone, Debug)]
pub enum MethodTarget {
    Native(NativeMethodFn),
    FieldGetter(usize),
    FieldSetter(usize),
    Function { unit: Weak<CodeUnit>, index: usize },
    /// `isX()` on a union value, holding the simple variant name `X`.
    UnionPredicate(Arc<str>),
}

impl MethodTarget {
    /// What to call for `operands`, or `None` when the target is gone.
    fn callee(&self, operands: &[Value]) -> Option<Result<Callee>> {
        let receiver = &operands[0];
        let callee = match self {
            MethodTarget::Native(f) => Ok(Callee::Native(*f)),
            MethodTarget::FieldGetter(index) => field(receiver, *index).map(Callee::Value),
            MethodTarget::FieldSetter(index) => match (receiver, operands.get(1)) {
                (Value::Struct(s), Some(value)) => s
                    .set(*index, value.clone())
                    .map(|()| Callee::Value(receiver.clone())),
                _ => Err(RuntimeError::Internal(format!(
                    "field setter on {}",
                    receiver.type_name()
                ))),
            },
            MethodTarget::Function { unit, index } => {
                let unit = unit.upgrade()?;
                Ok(Callee::Function {
                    unit,
                    index: *index,
                })
            }
            MethodTarget::UnionPredicate(variant) => match receiver {
                Value::Union(u) => Ok(Callee::Value(Value::Bool(
                    u.variant.simple_name == **variant,
                ))),
                other => Err(RuntimeError::Internal(format!(
                    "union predicate on {}",
                    other.type_name()
                ))),
            },
        };
        Some(callee)
    }
}

fn field(receiver: &Value, index: usize) -> Result<Value> {
    match receiver {
        Value::Struct(s) => Ok(s.get(index)),
        Value::Union(u) => Ok(u.fields.get(index).cloned().unwrap_or_default()),
        other => Err(RuntimeError::Internal(format!(
            "field getter on {}",
            other.type_name()
        ))),
    }
}

pub struct MethodCallSite {
    pub name: String,
    /// Operand count, receiver included.
    pub arity: usize,
    /// `?:` calls yield null on a null receiver.
    pub null_safe: bool,
    cache: InlineCache<MethodKey, MethodTarget>,
}

impl MethodCallSite {
    pub fn new(name: &str, arity: usize, null_safe: bool) -> Self {
        MethodCallSite {
            name: name.to_string(),
            arity,
            null_safe,
            cache: InlineCache::new(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// What to call for `operands`, the receiver first.
    pub fn link(
        &self,
        runtime: &Runtime,
        caller: &Arc<CodeUnit>,
        operands: &[Value],
    ) -> Result<Callee> {
        let receiver = operands
            .first()
            .ok_or_else(|| RuntimeError::Internal("method call without a receiver".into()))?;
        if receiver.is_null() {
            return if self.null_safe {
                Ok(Callee::Value(Value::Null))
            } else {
                Err(RuntimeError::NullReceiver(self.name.clone()))
            };
        }

        if let Some(callee) = self.cache.lookup(operands, |target| target.callee(operands)) {
            return callee;
        }

        let (key, target) = resolve(runtime, caller, &self.name, operands)?;
        log::debug!(
            "linked method {}/{} on {} ({})",
            self.name,
            self.arity,
            receiver.type_name(),
            if key.arguments.is_some() {
                "overloaded"
            } else {
                "monomorphic"
            }
        );
        let callee = target.callee(operands).ok_or_else(|| {
            RuntimeError::Internal(format!("target of {} vanished while linking", self.name))
        })?;
        self.cache
            .relink(key, target, runtime.options().megamorphic_threshold);
        callee
    }
}

/// Find the method `name` for `operands`, the receiver first.
pub fn resolve(
    runtime: &Runtime,
    caller: &CodeUnit,
    name: &str,
    operands: &[Value],
) -> Result<(MethodKey, MethodTarget)> {
    let (receiver, arguments) = operands
        .split_first()
        .ok_or(RuntimeError::ArityError {
            expected: 1,
            got: 0,
        })?;
    let class = receiver.type_key();

    let natives = candidates(&class, name, arguments.len());
    match natives.as_slice() {
        [] => {}
        [only] => {
            log::trace!("{}::{} is built in", class, name);
            return Ok((MethodKey::monomorphic(class), MethodTarget::Native(only.f)));
        }
        several => {
            let best = best_candidate(several, arguments);
            log::trace!(
                "{}::{} picked among {} overloads",
                class,
                name,
                several.len()
            );
            return Ok((MethodKey::overloaded(operands), MethodTarget::Native(best.f)));
        }
    }

    if let Value::Union(u) = receiver
        && arguments.is_empty()
        && let Some(variant) = name.strip_prefix("is")
        && u.variant.siblings.iter().any(|s| s == variant)
    {
        return Ok((
            MethodKey::monomorphic(class),
            MethodTarget::UnionPredicate(variant.into()),
        ));
    }

    let member = match receiver {
        Value::Struct(s) => s.ty.member_index(name),
        Value::Union(u) => u.variant.member_index(name),
        _ => None,
    };
    if let Some(index) = member {
        let target = match (receiver, arguments.len()) {
            (_, 0) => Some(MethodTarget::FieldGetter(index)),
            (Value::Struct(_), 1) => Some(MethodTarget::FieldSetter(index)),
            _ => None,
        };
        if let Some(target) = target {
            log::trace!("{}::{} is a field", class, name);
            return Ok((MethodKey::monomorphic(class), target));
        }
    }

    if let Some((unit, index)) = augmentation::find(runtime, caller, &class, name, operands.len())
    {
        log::trace!("{}::{} found in augmentation {}", class, name, unit.name);
        return Ok((
            MethodKey::monomorphic(class),
            MethodTarget::Function {
                unit: Arc::downgrade(&unit),
                index,
            },
        ));
    }

    Err(RuntimeError::NoSuchMethod {
        class: class.name().to_string(),
        name: name.to_string(),
        arity: arguments.len(),
    })
}

/// The highest scoring candidate; the first one on ties or when none fits.
fn best_candidate<'m>(candidates: &[&'m NativeMethod], arguments: &[Value]) -> &'m NativeMethod {
    let mut best = candidates[0];
    let mut best_score = None;
    for candidate in candidates {
        let score = score(candidate, arguments);
        if score > best_score {
            best = candidate;
            best_score = score;
        }
    }
    best
}

/// Argument compatibility of a built-in method, `None` when an argument
/// cannot be passed.
fn score(method: &NativeMethod, arguments: &[Value]) -> Option<u32> {
    let mut total = 0;
    for (i, argument) in arguments.iter().enumerate() {
        let param = method.params.get(i).copied().unwrap_or(ParamType::Object);
        total += parameter_score(param, argument)?;
    }
    if method.varargs {
        total += 1;
    }
    Some(total)
}

fn parameter_score(param: ParamType, argument: &Value) -> Option<u32> {
    if param == ParamType::Object || argument.is_null() {
        return Some(1);
    }
    let class = param.class();
    let actual = argument.type_key();
    if actual == class {
        Some(3)
    } else if actual.is_assignable_to(&class) {
        Some(2)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scoring_prefers_exact_types() {
        let list = Value::list(vec![Value::from("a"), Value::from("b")]);
        let overloads = candidates(&TypeKey::List, "remove", 1);
        assert_eq!(overloads.len(), 2);
        let by_index = best_candidate(&overloads, &[Value::Integer(0)]);
        assert_eq!(by_index.params, &[ParamType::Integer]);
        let by_value = best_candidate(&overloads, &[Value::from("b")]);
        assert_eq!(by_value.params, &[ParamType::Object]);

        let runtime = Runtime::new();
        let caller = Arc::new(CodeUnit::native("caller"));
        let (key, _) = resolve(&runtime, &caller, "remove", &[list, Value::Integer(0)]).unwrap();
        assert_eq!(
            key.arguments,
            Some(vec![TypeKey::Integer])
        );
    }

    #[test]
    fn test_score_rules() {
        const EXACT: NativeMethod = NativeMethod {
            name: "m",
            params: &[ParamType::Integer],
            varargs: false,
            f: |_, _| Ok(Value::Null),
        };
        const NUMBER: NativeMethod = NativeMethod {
            name: "m",
            params: &[ParamType::Number],
            varargs: false,
            f: |_, _| Ok(Value::Null),
        };
        const ANY: NativeMethod = NativeMethod {
            name: "m",
            params: &[],
            varargs: true,
            f: |_, _| Ok(Value::Null),
        };
        let one = [Value::Integer(1)];
        assert_eq!(score(&EXACT, &one), Some(3));
        assert_eq!(score(&NUMBER, &one), Some(2));
        assert_eq!(score(&ANY, &one), Some(2));
        assert_eq!(score(&EXACT, &[Value::from("x")]), None);
        assert_eq!(score(&EXACT, &[Value::Null]), Some(1));
    }

    #[test]
    fn test_null_receiver() {
        let runtime = Runtime::new();
        let caller = Arc::new(CodeUnit::native("caller"));
        let safe = MethodCallSite::new("size", 1, true);
        assert!(matches!(
            safe.link(&runtime, &caller, &[Value::Null]).unwrap(),
            Callee::Value(Value::Null)
        ));
        let unsafe_site = MethodCallSite::new("size", 1, false);
        assert!(matches!(
            unsafe_site.link(&runtime, &caller, &[Value::Null]),
            Err(RuntimeError::NullReceiver(_))
        ));
    }

    #[test]
    fn test_missing_method_names_the_class() {
        let runtime = Runtime::new();
        let caller = Arc::new(CodeUnit::native("caller"));
        let err = resolve(&runtime, &caller, "fly", &[Value::Integer(1)]).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No method `fly` with 0 argument(s) on class Integer"
        );
    }

    #[test]
    fn test_resolve_without_receiver() {
        let runtime = Runtime::new();
        let caller = Arc::new(CodeUnit::native("caller"));
        assert!(matches!(
            resolve(&runtime, &caller, "size", &[]),
            Err(RuntimeError::ArityError {
                expected: 1,
                got: 0
            })
        ));
    }

    #[test]
    fn test_receiver_classes_chain_guards() {
        let runtime = Runtime::new();
        let caller = Arc::new(CodeUnit::native("caller"));
        let site = MethodCallSite::new("toString", 1, false);
        for value in [Value::Integer(1), Value::from("s"), Value::Integer(2)] {
            site.link(&runtime, &caller, &[value]).unwrap();
        }
        let stats = site.stats();
        assert_eq!((stats.misses, stats.hits, stats.depth), (2, 1, 2));
    }
}
