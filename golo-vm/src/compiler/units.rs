// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Auxiliary units for the structs and unions a module declares.
//!
//! A struct `P` of module `m` becomes unit `m.types.P` holding its
//! constructors. A union `U` becomes unit `m.types.U`, and each of its
//! variants `V` a unit `m.types.U.V` with a constructor named `V`. Equality,
//! hashing and `toString` come from the runtime value model; field access is
//! resolved by method dispatch.

use std::sync::Arc;

use crate::chunk::{CodeUnit, UnitFunction, UnitKind};
use crate::value::{StructInstance, StructType, UnionValue, UnionVariant, Value};

use super::ir::{Module, StructDef, UnionDef};

/// `<module>.types.<name>`.
pub fn qualified_type_name(module: &str, name: &str) -> String {
    format!("{}.types.{}", module, name)
}

/// Units for every struct and union of `module`, in declaration order.
pub fn type_units(module: &Module) -> Vec<CodeUnit> {
    let mut units = Vec::new();
    for def in &module.structs {
        units.push(struct_unit(&module.name, def));
    }
    for def in &module.unions {
        units.extend(union_units(&module.name, def));
    }
    units
}

fn struct_unit(module: &str, def: &StructDef) -> CodeUnit {
    let name = qualified_type_name(module, &def.name);
    let ty = Arc::new(StructType {
        name: name.as_str().into(),
        simple_name: def.name.clone(),
        members: def.members.clone(),
    });
    let mut unit = CodeUnit::new(&name, UnitKind::Struct(Arc::clone(&ty)), module);

    let arity = ty.members.len();
    let full = Arc::clone(&ty);
    unit.add_function(UnitFunction::native(&def.name, arity, false, move |_, args| {
        Ok(new_struct(&full, args.to_vec(), false))
    }));
    if arity > 0 {
        let empty = Arc::clone(&ty);
        unit.add_function(UnitFunction::native(&def.name, 0, false, move |_, _| {
            Ok(new_struct(&empty, vec![Value::Null; empty.members.len()], false))
        }));
    }
    let frozen = Arc::clone(&ty);
    unit.add_function(UnitFunction::native(
        format!("Immutable{}", def.name),
        arity,
        false,
        move |_, args| Ok(new_struct(&frozen, args.to_vec(), true)),
    ));
    unit
}

fn new_struct(ty: &Arc<StructType>, fields: Vec<Value>, frozen: bool) -> Value {
    Value::Struct(Arc::new(StructInstance::new(Arc::clone(ty), fields, frozen)))
}

fn union_units(module: &str, def: &UnionDef) -> Vec<CodeUnit> {
    let union_name = qualified_type_name(module, &def.name);
    let siblings: Arc<[String]> = def.variants.iter().map(|(v, _)| v.clone()).collect();
    let variants: Vec<Arc<UnionVariant>> = def
        .variants
        .iter()
        .map(|(simple_name, members)| {
            Arc::new(UnionVariant {
                name: format!("{}.{}", union_name, simple_name).into(),
                union_name: union_name.as_str().into(),
                simple_name: simple_name.clone(),
                members: members.clone(),
                siblings: Arc::clone(&siblings),
            })
        })
        .collect();

    let mut units = vec![CodeUnit::new(
        &union_name,
        UnitKind::Union(variants.clone()),
        module,
    )];
    for variant in variants {
        let mut unit = CodeUnit::new(
            variant.name.to_string(),
            UnitKind::UnionVariant(Arc::clone(&variant)),
            module,
        );
        let arity = variant.members.len();
        let simple_name = variant.simple_name.clone();
        if arity == 0 {
            // Member-less variants are singletons.
            let singleton = Value::Union(Arc::new(UnionValue {
                variant,
                fields: Vec::new(),
            }));
            unit.add_function(UnitFunction::native(simple_name, 0, false, move |_, _| {
                Ok(singleton.clone())
            }));
        } else {
            unit.add_function(UnitFunction::native(simple_name, arity, false, move |_, args| {
                Ok(Value::Union(Arc::new(UnionValue {
                    variant: Arc::clone(&variant),
                    fields: args.to_vec(),
                })))
            }));
        }
        units.push(unit);
    }
    units
}
