// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Built-in methods of the runtime classes.
//!
//! Each class declares a static table of [`NativeMethod`]s. A method call on
//! a receiver searches the tables of its class and supertypes, most specific
//! first; an entry hides entries with the same parameters further up.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::utils::{as_index, checked_index};
use crate::value::{TypeKey, Value};
use crate::vm::{Result, RuntimeError, VM};

use super::structs;

/// A built-in method. The receiver is the first argument.
pub type NativeMethodFn = fn(&mut VM, &[Value]) -> Result<Value>;

/// Declared parameter class of a built-in method, used to pick among
/// overloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Object,
    Integer,
    Number,
    String,
    Boolean,
    Function,
}

impl ParamType {
    pub fn class(self) -> TypeKey {
        match self {
            ParamType::Object => TypeKey::Object,
            ParamType::Integer => TypeKey::Integer,
            ParamType::Number => TypeKey::Number,
            ParamType::String => TypeKey::String,
            ParamType::Boolean => TypeKey::Boolean,
            ParamType::Function => TypeKey::FunctionReference,
        }
    }
}

pub struct NativeMethod {
    pub name: &'static str,
    /// Fixed parameters, the receiver excluded.
    pub params: &'static [ParamType],
    /// Whether extra arguments are accepted after the fixed ones.
    pub varargs: bool,
    pub f: NativeMethodFn,
}

impl NativeMethod {
    /// Whether a call with `argc` arguments, the receiver excluded, fits.
    pub fn accepts(&self, argc: usize) -> bool {
        if self.varargs {
            argc >= self.params.len()
        } else {
            argc == self.params.len()
        }
    }
}

pub(crate) const fn method(
    name: &'static str,
    params: &'static [ParamType],
    f: NativeMethodFn,
) -> NativeMethod {
    NativeMethod {
        name,
        params,
        varargs: false,
        f,
    }
}

use ParamType::{Integer as Int, Object as Obj, String as Str};

static OBJECT_METHODS: &[NativeMethod] = &[
    method("toString", &[], object_to_string),
    method("equals", &[Obj], object_equals),
    method("hashCode", &[], object_hash_code),
    method("getClass", &[], object_get_class),
];

static STRING_METHODS: &[NativeMethod] = &[
    method("length", &[], string_length),
    method("isEmpty", &[], string_is_empty),
    method("toUpperCase", &[], string_to_upper_case),
    method("toLowerCase", &[], string_to_lower_case),
    method("trim", &[], string_trim),
    method("contains", &[Str], string_contains),
    method("startsWith", &[Str], string_starts_with),
    method("endsWith", &[Str], string_ends_with),
    method("indexOf", &[Str], string_index_of),
    method("charAt", &[Int], string_char_at),
    method("substring", &[Int], string_substring_from),
    method("substring", &[Int, Int], string_substring),
    method("split", &[Str], string_split),
    method("hashCode", &[], string_hash_code),
];

static LIST_METHODS: &[NativeMethod] = &[
    method("add", &[Obj], list_add),
    method("get", &[Int], sequence_get),
    method("set", &[Int, Obj], list_set),
    method("size", &[], sequence_size),
    method("isEmpty", &[], sequence_is_empty),
    method("contains", &[Obj], sequence_contains),
    method("remove", &[Int], list_remove_at),
    method("remove", &[Obj], list_remove),
    method("head", &[], sequence_head),
    method("tail", &[], sequence_tail),
];

static ARRAY_METHODS: &[NativeMethod] = &[
    method("get", &[Int], sequence_get),
    method("set", &[Int, Obj], array_set),
    method("length", &[], sequence_size),
    method("size", &[], sequence_size),
];

static TUPLE_METHODS: &[NativeMethod] = &[
    method("get", &[Int], sequence_get),
    method("size", &[], sequence_size),
    method("isEmpty", &[], sequence_is_empty),
    method("contains", &[Obj], sequence_contains),
    method("head", &[], sequence_head),
    method("tail", &[], sequence_tail),
];

static SET_METHODS: &[NativeMethod] = &[
    method("add", &[Obj], set_add),
    method("contains", &[Obj], sequence_contains),
    method("size", &[], sequence_size),
    method("isEmpty", &[], sequence_is_empty),
    method("remove", &[Obj], set_remove),
];

static MAP_METHODS: &[NativeMethod] = &[
    method("put", &[Obj, Obj], map_put),
    method("get", &[Obj], map_get),
    method("containsKey", &[Obj], map_contains_key),
    method("size", &[], map_size),
    method("isEmpty", &[], map_is_empty),
    method("remove", &[Obj], map_remove),
];

static EXCEPTION_METHODS: &[NativeMethod] = &[method("getMessage", &[], exception_get_message)];

static FUNCTION_METHODS: &[NativeMethod] = &[
    NativeMethod {
        name: "invoke",
        params: &[],
        varargs: true,
        f: function_invoke,
    },
    method("arity", &[], function_arity),
    method("bindTo", &[Obj], function_bind_to),
    method("isVarargs", &[], function_is_varargs),
];

/// Methods declared directly on `class`.
pub fn class_methods(class: &TypeKey) -> &'static [NativeMethod] {
    match class {
        TypeKey::Object => OBJECT_METHODS,
        TypeKey::String => STRING_METHODS,
        TypeKey::List => LIST_METHODS,
        TypeKey::Array => ARRAY_METHODS,
        TypeKey::Tuple => TUPLE_METHODS,
        TypeKey::Set => SET_METHODS,
        TypeKey::Map => MAP_METHODS,
        TypeKey::Exception => EXCEPTION_METHODS,
        TypeKey::FunctionReference => FUNCTION_METHODS,
        TypeKey::GoloStruct => structs::METHODS,
        _ => &[],
    }
}

/// Built-in methods `name` of `receiver` callable with `argc` arguments.
pub fn candidates(receiver: &TypeKey, name: &str, argc: usize) -> Vec<&'static NativeMethod> {
    let mut found: Vec<&'static NativeMethod> = Vec::new();
    for class in receiver.supertypes() {
        for candidate in class_methods(&class) {
            if candidate.name != name || !candidate.accepts(argc) {
                continue;
            }
            let hidden = found
                .iter()
                .any(|m| m.params == candidate.params && m.varargs == candidate.varargs);
            if !hidden {
                found.push(candidate);
            }
        }
    }
    found
}

// ============================================================================
// Argument access
// ============================================================================

pub(crate) fn argument(args: &[Value], index: usize) -> Result<&Value> {
    args.get(index).ok_or_else(|| {
        RuntimeError::Internal(format!(
            "built-in method expects argument #{}, got {} operands",
            index,
            args.len()
        ))
    })
}

fn type_error(expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::TypeError {
        expected: expected.to_string(),
        got: got.type_name(),
    }
}

fn string_at(args: &[Value], index: usize) -> Result<&Arc<str>> {
    match argument(args, index)? {
        Value::String(s) => Ok(s),
        other => Err(type_error("String", other)),
    }
}

fn index_at(args: &[Value], index: usize) -> Result<i64> {
    as_index(argument(args, index)?)
}

// ============================================================================
// Object
// ============================================================================

fn object_to_string(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::string(argument(args, 0)?.to_string()))
}

fn object_equals(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(argument(args, 0)? == argument(args, 1)?))
}

fn object_hash_code(_: &mut VM, args: &[Value]) -> Result<Value> {
    let mut hasher = DefaultHasher::new();
    argument(args, 0)?.hash(&mut hasher);
    Ok(Value::Integer(hasher.finish() as i32))
}

fn object_get_class(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Class(argument(args, 0)?.type_key()))
}

// ============================================================================
// String
// ============================================================================

fn string_length(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Integer(string_at(args, 0)?.chars().count() as i32))
}

fn string_is_empty(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(string_at(args, 0)?.is_empty()))
}

fn string_to_upper_case(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::string(string_at(args, 0)?.to_uppercase()))
}

fn string_to_lower_case(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::string(string_at(args, 0)?.to_lowercase()))
}

fn string_trim(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::string(string_at(args, 0)?.trim()))
}

fn string_contains(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(
        string_at(args, 0)?.contains(&**string_at(args, 1)?),
    ))
}

fn string_starts_with(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(
        string_at(args, 0)?.starts_with(&**string_at(args, 1)?),
    ))
}

fn string_ends_with(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(
        string_at(args, 0)?.ends_with(&**string_at(args, 1)?),
    ))
}

fn string_index_of(_: &mut VM, args: &[Value]) -> Result<Value> {
    let text = string_at(args, 0)?;
    let index = text
        .find(&**string_at(args, 1)?)
        .map(|byte| text[..byte].chars().count() as i32)
        .unwrap_or(-1);
    Ok(Value::Integer(index))
}

fn string_char_at(_: &mut VM, args: &[Value]) -> Result<Value> {
    let text = string_at(args, 0)?;
    let length = text.chars().count();
    let index = checked_index(index_at(args, 1)?, length)?;
    text.chars()
        .nth(index)
        .map(Value::Char)
        .ok_or(RuntimeError::IndexOutOfBounds {
            index: index as i64,
            length,
        })
}

fn substring(text: &str, begin: i64, end: i64) -> Result<Value> {
    let length = text.chars().count();
    if begin < 0 || end < begin || end as usize > length {
        return Err(RuntimeError::IndexOutOfBounds {
            index: if begin < 0 { begin } else { end },
            length,
        });
    }
    Ok(Value::string(
        text.chars()
            .skip(begin as usize)
            .take((end - begin) as usize)
            .collect::<String>(),
    ))
}

fn string_substring_from(_: &mut VM, args: &[Value]) -> Result<Value> {
    let text = string_at(args, 0)?;
    substring(text, index_at(args, 1)?, text.chars().count() as i64)
}

fn string_substring(_: &mut VM, args: &[Value]) -> Result<Value> {
    substring(string_at(args, 0)?, index_at(args, 1)?, index_at(args, 2)?)
}

/// Splits on a literal separator; trailing empty parts are dropped.
fn string_split(_: &mut VM, args: &[Value]) -> Result<Value> {
    let text = string_at(args, 0)?;
    let separator = string_at(args, 1)?;
    let mut parts: Vec<Value> = if separator.is_empty() {
        text.chars().map(|c| Value::string(c.to_string())).collect()
    } else {
        text.split(&**separator).map(Value::string).collect()
    };
    while parts
        .last()
        .is_some_and(|p| matches!(p, Value::String(s) if s.is_empty()))
    {
        parts.pop();
    }
    Ok(Value::array(parts))
}

fn string_hash_code(_: &mut VM, args: &[Value]) -> Result<Value> {
    let hash = string_at(args, 0)?
        .encode_utf16()
        .fold(0i32, |h, unit| h.wrapping_mul(31).wrapping_add(unit as i32));
    Ok(Value::Integer(hash))
}

// ============================================================================
// Sequences: lists, vectors, arrays, tuples and sets
// ============================================================================

fn elements(value: &Value) -> Result<Vec<Value>> {
    value
        .elements()
        .ok_or_else(|| type_error("a collection", value))
}

fn sequence_get(_: &mut VM, args: &[Value]) -> Result<Value> {
    let receiver = argument(args, 0)?;
    let index = index_at(args, 1)?;
    match receiver {
        Value::Tuple(items) => Ok(items[checked_index(index, items.len())?].clone()),
        Value::Array(items) | Value::List(items) | Value::Vector(items) => {
            let items = items.read();
            Ok(items[checked_index(index, items.len())?].clone())
        }
        other => Err(type_error("an indexed collection", other)),
    }
}

fn sequence_size(_: &mut VM, args: &[Value]) -> Result<Value> {
    let size = match argument(args, 0)? {
        Value::Tuple(items) => items.len(),
        Value::Array(items) | Value::List(items) | Value::Vector(items) => items.read().len(),
        Value::Set(items) => items.read().len(),
        other => return Err(type_error("a collection", other)),
    };
    Ok(Value::Integer(size as i32))
}

fn sequence_is_empty(vm: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(matches!(
        sequence_size(vm, args)?,
        Value::Integer(0)
    )))
}

fn sequence_contains(_: &mut VM, args: &[Value]) -> Result<Value> {
    let needle = argument(args, 1)?;
    let found = match argument(args, 0)? {
        Value::Set(items) => items.read().contains(needle),
        other => elements(other)?.contains(needle),
    };
    Ok(Value::Bool(found))
}

fn sequence_head(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(elements(argument(args, 0)?)?
        .into_iter()
        .next()
        .unwrap_or_default())
}

fn sequence_tail(_: &mut VM, args: &[Value]) -> Result<Value> {
    let receiver = argument(args, 0)?;
    let rest: Vec<Value> = elements(receiver)?.into_iter().skip(1).collect();
    Ok(match receiver {
        Value::Tuple(_) => Value::tuple(rest),
        Value::Vector(_) => Value::vector(rest),
        _ => Value::list(rest),
    })
}

fn list_items(value: &Value) -> Result<&Arc<parking_lot::RwLock<Vec<Value>>>> {
    match value {
        Value::List(items) | Value::Vector(items) => Ok(items),
        other => Err(type_error("List", other)),
    }
}

fn list_add(_: &mut VM, args: &[Value]) -> Result<Value> {
    list_items(argument(args, 0)?)?
        .write()
        .push(argument(args, 1)?.clone());
    Ok(Value::Bool(true))
}

fn list_set(_: &mut VM, args: &[Value]) -> Result<Value> {
    let mut items = list_items(argument(args, 0)?)?.write();
    let index = checked_index(index_at(args, 1)?, items.len())?;
    Ok(std::mem::replace(
        &mut items[index],
        argument(args, 2)?.clone(),
    ))
}

fn list_remove_at(_: &mut VM, args: &[Value]) -> Result<Value> {
    let mut items = list_items(argument(args, 0)?)?.write();
    let index = checked_index(index_at(args, 1)?, items.len())?;
    Ok(items.remove(index))
}

fn list_remove(_: &mut VM, args: &[Value]) -> Result<Value> {
    let mut items = list_items(argument(args, 0)?)?.write();
    let needle = argument(args, 1)?;
    let position = items.iter().position(|item| item == needle);
    if let Some(index) = position {
        items.remove(index);
    }
    Ok(Value::Bool(position.is_some()))
}

fn array_set(_: &mut VM, args: &[Value]) -> Result<Value> {
    match argument(args, 0)? {
        Value::Array(items) => {
            let mut items = items.write();
            let index = checked_index(index_at(args, 1)?, items.len())?;
            items[index] = argument(args, 2)?.clone();
            Ok(Value::Null)
        }
        other => Err(type_error("Array", other)),
    }
}

fn set_add(_: &mut VM, args: &[Value]) -> Result<Value> {
    match argument(args, 0)? {
        Value::Set(items) => Ok(Value::Bool(
            items.write().insert(argument(args, 1)?.clone()),
        )),
        other => Err(type_error("Set", other)),
    }
}

fn set_remove(_: &mut VM, args: &[Value]) -> Result<Value> {
    match argument(args, 0)? {
        Value::Set(items) => Ok(Value::Bool(
            items.write().shift_remove(argument(args, 1)?),
        )),
        other => Err(type_error("Set", other)),
    }
}

// ============================================================================
// Map
// ============================================================================

fn map_entries(
    value: &Value,
) -> Result<&Arc<parking_lot::RwLock<indexmap::IndexMap<Value, Value>>>> {
    match value {
        Value::Map(entries) => Ok(entries),
        other => Err(type_error("Map", other)),
    }
}

fn map_put(_: &mut VM, args: &[Value]) -> Result<Value> {
    let previous = map_entries(argument(args, 0)?)?
        .write()
        .insert(argument(args, 1)?.clone(), argument(args, 2)?.clone());
    Ok(previous.unwrap_or_default())
}

fn map_get(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(map_entries(argument(args, 0)?)?
        .read()
        .get(argument(args, 1)?)
        .cloned()
        .unwrap_or_default())
}

fn map_contains_key(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(
        map_entries(argument(args, 0)?)?
            .read()
            .contains_key(argument(args, 1)?),
    ))
}

fn map_size(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Integer(
        map_entries(argument(args, 0)?)?.read().len() as i32,
    ))
}

fn map_is_empty(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(
        map_entries(argument(args, 0)?)?.read().is_empty(),
    ))
}

fn map_remove(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(map_entries(argument(args, 0)?)?
        .write()
        .shift_remove(argument(args, 1)?)
        .unwrap_or_default())
}

// ============================================================================
// Exceptions and function references
// ============================================================================

fn exception_get_message(_: &mut VM, args: &[Value]) -> Result<Value> {
    match argument(args, 0)? {
        Value::Exception(e) => Ok(Value::string(e.message.as_str())),
        other => Err(type_error("Exception", other)),
    }
}

fn function_reference(value: &Value) -> Result<&Arc<crate::value::FunctionRef>> {
    match value {
        Value::Function(f) => Ok(f),
        other => Err(type_error("FunctionReference", other)),
    }
}

fn function_invoke(vm: &mut VM, args: &[Value]) -> Result<Value> {
    let callee = argument(args, 0)?;
    vm.call_value(callee, args[1..].to_vec())
}

fn function_arity(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Integer(
        function_reference(argument(args, 0)?)?.arity() as i32,
    ))
}

fn function_bind_to(_: &mut VM, args: &[Value]) -> Result<Value> {
    let f = function_reference(argument(args, 0)?)?;
    if f.arity() == 0 && !f.is_varargs() {
        return Err(RuntimeError::IllegalArgument(format!(
            "cannot bind an argument to {:?}",
            f
        )));
    }
    Ok(Value::Function(Arc::new(
        f.bind([argument(args, 1)?.clone()]),
    )))
}

fn function_is_varargs(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(
        function_reference(argument(args, 0)?)?.is_varargs(),
    ))
}
