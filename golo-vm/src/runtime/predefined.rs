// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! `gololang.Predefined`, the module every unit imports implicitly.

use std::sync::Arc;

use num_traits::ToPrimitive;

use crate::chunk::{CodeUnit, UnitFunction};
use crate::value::{FunctionRef, Value};
use crate::vm::{Result, RuntimeError, VM};

use super::PREDEFINED;

/// Build the predefined native unit.
pub fn unit() -> CodeUnit {
    let mut unit = CodeUnit::native(PREDEFINED);
    let natives: &[(&str, usize, fn(&mut VM, &[Value]) -> Result<Value>)] = &[
        ("println", 0, builtin_println),
        ("println", 1, builtin_println),
        ("print", 1, builtin_print),
        ("raise", 1, builtin_raise),
        ("require", 2, builtin_require),
        ("requireNotNull", 1, builtin_require_not_null),
        ("isClosure", 1, builtin_is_closure),
        ("fun", 2, builtin_fun),
        ("fun", 3, builtin_fun),
        ("intValue", 1, builtin_int_value),
        ("longValue", 1, builtin_long_value),
        ("doubleValue", 1, builtin_double_value),
        ("floatValue", 1, builtin_float_value),
        ("stringValue", 1, builtin_string_value),
        ("range", 2, builtin_range),
    ];
    for (name, arity, f) in natives {
        unit.add_function(UnitFunction::native(*name, *arity, false, *f));
    }
    unit
}

fn builtin_println(vm: &mut VM, args: &[Value]) -> Result<Value> {
    let line = match args.first() {
        Some(value) => format!("{}\n", value),
        None => "\n".to_string(),
    };
    vm.runtime().write_output(&line)?;
    Ok(Value::Null)
}

fn builtin_print(vm: &mut VM, args: &[Value]) -> Result<Value> {
    if let Some(value) = args.first() {
        vm.runtime().write_output(&value.to_string())?;
    }
    Ok(Value::Null)
}

fn builtin_raise(_: &mut VM, args: &[Value]) -> Result<Value> {
    let message = args.first().map(Value::to_string).unwrap_or_default();
    Err(RuntimeError::Thrown(Value::exception(
        "RuntimeException",
        message,
    )))
}

fn builtin_require(_: &mut VM, args: &[Value]) -> Result<Value> {
    match args {
        [Value::Bool(true), _] => Ok(Value::Null),
        [Value::Bool(false), message] => Err(RuntimeError::Thrown(Value::exception(
            "AssertionError",
            message.to_string(),
        ))),
        [other, _] => Err(RuntimeError::IllegalArgument(format!(
            "the condition must be a Boolean, got {}",
            other.type_name()
        ))),
        _ => Err(RuntimeError::ArityError {
            expected: 2,
            got: args.len(),
        }),
    }
}

fn builtin_require_not_null(_: &mut VM, args: &[Value]) -> Result<Value> {
    match args.first() {
        Some(Value::Null) | None => Err(RuntimeError::Thrown(Value::exception(
            "AssertionError",
            "null reference",
        ))),
        Some(value) => Ok(value.clone()),
    }
}

fn builtin_is_closure(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(matches!(args.first(), Some(Value::Function(_)))))
}

/// `fun(name, module)` or `fun(name, module, arity)`. The module is a name
/// or a class literal.
fn builtin_fun(vm: &mut VM, args: &[Value]) -> Result<Value> {
    let name = match args.first() {
        Some(Value::String(s)) => s.to_string(),
        Some(other) => return Err(argument_type("String", other)),
        None => return Err(RuntimeError::ArityError { expected: 2, got: 0 }),
    };
    let module = match args.get(1) {
        Some(Value::String(s)) => s.to_string(),
        Some(Value::Class(key)) => key.name().to_string(),
        Some(other) => return Err(argument_type("String", other)),
        None => return Err(RuntimeError::ArityError { expected: 2, got: 1 }),
    };
    let arity = match args.get(2) {
        Some(Value::Integer(n)) => Some(*n as usize),
        Some(other) => return Err(argument_type("Integer", other)),
        None => None,
    };

    let not_found = || RuntimeError::NoSuchFunction {
        name: name.clone(),
        arity: arity.unwrap_or(0),
        module: module.clone(),
    };
    let unit = vm.runtime().unit(&module).ok_or_else(not_found)?;
    let index = match arity {
        Some(arity) => unit
            .functions_named(&name)
            .iter()
            .copied()
            .find(|&i| unit.functions[i].arity == arity),
        None => unit.first_function(&name),
    }
    .ok_or_else(not_found)?;
    log::trace!("fun({}, {}) resolved to #{}", name, module, index);
    Ok(Value::Function(Arc::new(FunctionRef::new(unit, index))))
}

fn argument_type(expected: &str, got: &Value) -> RuntimeError {
    RuntimeError::TypeError {
        expected: expected.to_string(),
        got: got.type_name(),
    }
}

fn single(args: &[Value]) -> Result<&Value> {
    args.first().ok_or(RuntimeError::ArityError {
        expected: 1,
        got: 0,
    })
}

fn number_format(text: &str, class: &str) -> RuntimeError {
    RuntimeError::Thrown(Value::exception(
        "NumberFormatException",
        format!("For input string: \"{}\" ({})", text, class),
    ))
}

fn as_double(value: &Value) -> Result<f64> {
    match value {
        Value::Integer(n) => Ok(*n as f64),
        Value::Long(n) => Ok(*n as f64),
        Value::Float(n) => Ok(*n as f64),
        Value::Double(n) => Ok(*n),
        Value::Char(c) => Ok(*c as u32 as f64),
        Value::BigInteger(n) => Ok(n.to_f64().unwrap_or(f64::NAN)),
        Value::String(s) => s.trim().parse().map_err(|_| number_format(s, "Double")),
        other => Err(argument_type("Number", other)),
    }
}

fn as_long(value: &Value) -> Result<i64> {
    match value {
        Value::Integer(n) => Ok(*n as i64),
        Value::Long(n) => Ok(*n),
        Value::Float(n) => Ok(*n as i64),
        Value::Double(n) => Ok(*n as i64),
        Value::Char(c) => Ok(*c as i64),
        Value::BigInteger(n) => Ok(n.to_i64().unwrap_or_else(|| {
            // Keep the low 64 bits, as a narrowing conversion does.
            let (_, digits) = n.to_u64_digits();
            digits.first().copied().unwrap_or_default() as i64
        })),
        Value::String(s) => s.trim().parse().map_err(|_| number_format(s, "Long")),
        other => Err(argument_type("Number", other)),
    }
}

fn builtin_int_value(_: &mut VM, args: &[Value]) -> Result<Value> {
    match single(args)? {
        Value::String(s) => s
            .trim()
            .parse()
            .map(Value::Integer)
            .map_err(|_| number_format(s, "Integer")),
        other => Ok(Value::Integer(as_long(other)? as i32)),
    }
}

fn builtin_long_value(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Long(as_long(single(args)?)?))
}

fn builtin_double_value(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Double(as_double(single(args)?)?))
}

fn builtin_float_value(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Float(as_double(single(args)?)? as f32))
}

fn builtin_string_value(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::string(single(args)?.to_string()))
}

/// Values from `from` up to, not including, `to`.
fn builtin_range(_: &mut VM, args: &[Value]) -> Result<Value> {
    match args {
        [Value::Integer(from), Value::Integer(to)] => {
            Ok(Value::list((*from..*to).map(Value::Integer).collect()))
        }
        [from, to] if from.type_key().is_number() && to.type_key().is_number() => {
            let (from, to) = (as_long(from)?, as_long(to)?);
            Ok(Value::list((from..to).map(Value::Long).collect()))
        }
        [from, to] => Err(RuntimeError::IllegalArgument(format!(
            "range bounds must be integers, got {} and {}",
            from.type_name(),
            to.type_name()
        ))),
        _ => Err(RuntimeError::ArityError {
            expected: 2,
            got: args.len(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;

    fn vm() -> VM {
        VM::new(Arc::new(Runtime::new()))
    }

    #[test]
    fn test_conversions() {
        let mut vm = vm();
        assert_eq!(
            builtin_int_value(&mut vm, &[Value::Double(3.9)]).unwrap(),
            Value::Integer(3)
        );
        assert_eq!(
            builtin_int_value(&mut vm, &["42".into()]).unwrap(),
            Value::Integer(42)
        );
        assert_eq!(
            builtin_double_value(&mut vm, &[Value::Integer(2)]).unwrap(),
            Value::Double(2.0)
        );
        assert_eq!(
            builtin_string_value(&mut vm, &[Value::Long(7)]).unwrap(),
            Value::from("7")
        );
        let err = builtin_long_value(&mut vm, &["seven".into()]).unwrap_err();
        assert_eq!(err.kind(), "NumberFormatException");
    }

    #[test]
    fn test_require() {
        let mut vm = vm();
        assert!(builtin_require(&mut vm, &[true.into(), "ok".into()]).is_ok());
        let err = builtin_require(&mut vm, &[false.into(), "broken".into()]).unwrap_err();
        assert_eq!(err.kind(), "AssertionError");
        assert_eq!(err.to_string(), "AssertionError: broken");
        assert!(builtin_require_not_null(&mut vm, &[Value::Null]).is_err());
    }

    #[test]
    fn test_range() {
        let mut vm = vm();
        assert_eq!(
            builtin_range(&mut vm, &[1.into(), 4.into()]).unwrap().to_string(),
            "[1, 2, 3]"
        );
        assert_eq!(
            builtin_range(&mut vm, &[3.into(), 1.into()]).unwrap().to_string(),
            "[]"
        );
    }

    #[test]
    fn test_fun_finds_predefined_functions() {
        let mut vm = vm();
        let f = builtin_fun(&mut vm, &["range".into(), PREDEFINED.into(), 2.into()]).unwrap();
        let Value::Function(f) = f else {
            panic!("expected a function reference");
        };
        assert_eq!(f.name(), "range");
        assert!(builtin_fun(&mut vm, &["range".into(), PREDEFINED.into(), 5.into()]).is_err());
    }
}
