// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Augmentation lookup for method calls.
//!
//! The calling module is searched first, then each of its imports. Within a
//! module `D`, for a receiver assignable to an augmented class `T`:
//! 1. the unit `D$T` holding `augment T { ... }`
//! 2. each named augmentation `N` applied to `T` with `augment T with N`:
//!    `D$N`, then `a.b$N` when `N` is written `a.b.N`, then `I$N` for each
//!    import `I` of the caller
//!
//! The first function with the method's name and arity wins.

use std::sync::Arc;

use crate::chunk::CodeUnit;
use crate::runtime::Runtime;
use crate::value::TypeKey;

/// The augmentation function `name` taking `arity` operands, the receiver
/// included.
pub fn find(
    runtime: &Runtime,
    caller: &CodeUnit,
    receiver: &TypeKey,
    name: &str,
    arity: usize,
) -> Option<(Arc<CodeUnit>, usize)> {
    std::iter::once(caller.module.as_str())
        .chain(caller.imports.iter().map(String::as_str))
        .find_map(|module| in_module(runtime, caller, module, receiver, name, arity))
}

fn in_module(
    runtime: &Runtime,
    caller: &CodeUnit,
    module: &str,
    receiver: &TypeKey,
    name: &str,
    arity: usize,
) -> Option<(Arc<CodeUnit>, usize)> {
    let unit = runtime.unit(module)?;
    let function = |unit_name: &str| -> Option<(Arc<CodeUnit>, usize)> {
        let unit = runtime.unit(unit_name)?;
        let index = unit.find_function(name, arity)?;
        log::trace!("{}::{} matched in {}", receiver, name, unit_name);
        Some((unit, index))
    };

    let direct = unit
        .augmentations
        .iter()
        .filter(|target| receiver.is_assignable_to(target))
        .find_map(|target| function(&format!("{}${}", module, target.mangled_name())));
    if direct.is_some() {
        return direct;
    }

    for (target, names) in &unit.applications {
        if !receiver.is_assignable_to(target) {
            continue;
        }
        for augmentation in names {
            if let Some(found) = function(&format!("{}${}", module, augmentation)) {
                return Some(found);
            }
            if let Some((prefix, simple)) = augmentation.rsplit_once('.')
                && let Some(found) = function(&format!("{}${}", prefix, simple))
            {
                return Some(found);
            }
            for import in &caller.imports {
                if let Some(found) = function(&format!("{}${}", import, augmentation)) {
                    return Some(found);
                }
            }
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompilerOptions, compile};

    fn load(runtime: &Runtime, source: &str) -> Arc<CodeUnit> {
        let module = compile(source, &CompilerOptions::default()).unwrap();
        runtime.define(module.units).unwrap().remove(0)
    }

    fn found_in(runtime: &Runtime, caller: &CodeUnit, receiver: TypeKey, name: &str) -> Option<String> {
        find(runtime, caller, &receiver, name, 1).map(|(unit, _)| unit.name.clone())
    }

    #[test]
    fn test_plain_augmentation_applies_to_subtypes() {
        let runtime = Runtime::new();
        let app = load(
            &runtime,
            "module app\naugment Number {\n  function twice = |this| -> this * 2\n}\n",
        );
        assert_eq!(
            found_in(&runtime, &app, TypeKey::Integer, "twice").as_deref(),
            Some("app$Number")
        );
        assert_eq!(found_in(&runtime, &app, TypeKey::String, "twice"), None);
    }

    #[test]
    fn test_named_augmentation_from_import() {
        let runtime = Runtime::new();
        load(
            &runtime,
            "module lib\naugmentation Shouting = {\n  function shout = |this| -> this + \"!\"\n}\n",
        );
        let app = load(
            &runtime,
            "module app\nimport lib\naugment String with Shouting\n",
        );
        assert_eq!(
            found_in(&runtime, &app, TypeKey::String, "shout").as_deref(),
            Some("lib$Shouting")
        );
    }

    #[test]
    fn test_imported_module_augmentations() {
        let runtime = Runtime::new();
        load(
            &runtime,
            "module lib\naugment String {\n  function shout = |this| -> this + \"!\"\n}\n",
        );
        let app = load(&runtime, "module app\nimport lib\n");
        let other = load(&runtime, "module other\n");
        assert_eq!(
            found_in(&runtime, &app, TypeKey::String, "shout").as_deref(),
            Some("lib$String")
        );
        assert_eq!(found_in(&runtime, &other, TypeKey::String, "shout"), None);
    }
}
