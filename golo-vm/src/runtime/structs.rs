// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Methods shared by every struct instance.

use std::sync::Arc;

use crate::value::{StructInstance, Value};
use crate::vm::{Result, RuntimeError, VM};

use super::classes::{NativeMethod, ParamType, argument, method};

pub(super) static METHODS: &[NativeMethod] = &[
    method("copy", &[], struct_copy),
    method("frozenCopy", &[], struct_frozen_copy),
    method("isFrozen", &[], struct_is_frozen),
    method("members", &[], struct_members),
    method("values", &[], struct_values),
    method("get", &[ParamType::String], struct_get),
    method("set", &[ParamType::String, ParamType::Object], struct_set),
];

fn instance(args: &[Value]) -> Result<&Arc<StructInstance>> {
    match argument(args, 0)? {
        Value::Struct(s) => Ok(s),
        other => Err(RuntimeError::TypeError {
            expected: "GoloStruct".to_string(),
            got: other.type_name(),
        }),
    }
}

fn member_index(s: &StructInstance, args: &[Value]) -> Result<usize> {
    let name = match argument(args, 1)? {
        Value::String(name) => name,
        other => {
            return Err(RuntimeError::TypeError {
                expected: "String".to_string(),
                got: other.type_name(),
            });
        }
    };
    s.ty.member_index(name).ok_or_else(|| {
        RuntimeError::IllegalArgument(format!(
            "{} is not a member of {}",
            name, s.ty.simple_name
        ))
    })
}

fn copy(s: &StructInstance, frozen: bool) -> Value {
    let fields = s.fields.read().clone();
    Value::Struct(Arc::new(StructInstance::new(Arc::clone(&s.ty), fields, frozen)))
}

fn struct_copy(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(copy(instance(args)?, false))
}

fn struct_frozen_copy(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(copy(instance(args)?, true))
}

fn struct_is_frozen(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::Bool(instance(args)?.frozen))
}

fn struct_members(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::tuple(
        instance(args)?
            .ty
            .members
            .iter()
            .map(|m| Value::string(m.as_str())),
    ))
}

fn struct_values(_: &mut VM, args: &[Value]) -> Result<Value> {
    Ok(Value::tuple(instance(args)?.fields.read().clone()))
}

fn struct_get(_: &mut VM, args: &[Value]) -> Result<Value> {
    let s = instance(args)?;
    Ok(s.get(member_index(s, args)?))
}

/// Returns the receiver.
fn struct_set(_: &mut VM, args: &[Value]) -> Result<Value> {
    let s = instance(args)?;
    s.set(member_index(s, args)?, argument(args, 2)?.clone())?;
    Ok(Value::Struct(Arc::clone(s)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::Runtime;
    use crate::value::StructType;

    fn point(frozen: bool) -> Value {
        let ty = Arc::new(StructType {
            name: "app.types.Point".into(),
            simple_name: "Point".to_string(),
            members: vec!["x".to_string(), "y".to_string()],
        });
        Value::Struct(Arc::new(StructInstance::new(
            ty,
            vec![1.into(), 2.into()],
            frozen,
        )))
    }

    fn vm() -> VM {
        VM::new(Arc::new(Runtime::new()))
    }

    #[test]
    fn test_get_set_by_name() {
        let mut vm = vm();
        let p = point(false);
        struct_set(&mut vm, &[p.clone(), "x".into(), 10.into()]).unwrap();
        assert_eq!(struct_get(&mut vm, &[p.clone(), "x".into()]).unwrap(), Value::Integer(10));
        assert!(matches!(
            struct_get(&mut vm, &[p, "z".into()]),
            Err(RuntimeError::IllegalArgument(_))
        ));
    }

    #[test]
    fn test_frozen_copy_rejects_updates() {
        let mut vm = vm();
        let frozen = struct_frozen_copy(&mut vm, &[point(false)]).unwrap();
        assert_eq!(struct_is_frozen(&mut vm, &[frozen.clone()]).unwrap(), Value::Bool(true));
        assert!(matches!(
            struct_set(&mut vm, &[frozen.clone(), "y".into(), 0.into()]),
            Err(RuntimeError::FrozenStruct(_))
        ));
        let thawed = struct_copy(&mut vm, &[frozen.clone()]).unwrap();
        assert_eq!(thawed, frozen);
        assert_eq!(struct_is_frozen(&mut vm, &[thawed]).unwrap(), Value::Bool(false));
    }

    #[test]
    fn test_members_and_values() {
        let mut vm = vm();
        let p = point(true);
        assert_eq!(struct_members(&mut vm, &[p.clone()]).unwrap().to_string(), "tuple[x, y]");
        assert_eq!(struct_values(&mut vm, &[p]).unwrap().to_string(), "tuple[1, 2]");
    }
}
