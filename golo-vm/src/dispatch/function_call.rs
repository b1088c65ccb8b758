// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Function call sites.
//!
//! A function call is resolved by name and arity from the calling unit:
//! 1. the caller's own unit, then its module unit
//! 2. a qualified name `P.f`: unit `P`, then `I.P` for each import `I`
//! 3. each import, then the predefined module
//! 4. struct and union-variant constructors, `<module>.types.<name>`
//!
//! Local functions are only visible from units of the same module. The
//! result does not depend on the arguments, so a site links once.

use std::sync::{Arc, OnceLock, Weak};

use crate::chunk::CodeUnit;
use crate::compiler::units::qualified_type_name;
use crate::runtime::{PREDEFINED, Runtime};
use crate::value::Value;
use crate::vm::{Result, RuntimeError};

use super::{CacheKey, CacheStats, Callee, InlineCache};

/// Matches every argument list.
pub struct AnyArguments;

impl CacheKey for AnyArguments {
    type Slot = ();

    fn matches(&self, _: &[Value]) -> bool {
        true
    }

    fn slot(&self) -> Option<()> {
        Some(())
    }

    fn slot_of(_: &[Value]) -> Option<()> {
        Some(())
    }
}

#[derive(Clone)]
pub struct FunctionTarget {
    unit: Weak<CodeUnit>,
    index: usize,
}

pub struct FunctionCallSite {
    pub name: String,
    pub arity: usize,
    /// `name!(...)`: the first result is kept for every later call.
    pub constant: bool,
    cache: InlineCache<AnyArguments, FunctionTarget>,
    constant_value: OnceLock<Value>,
}

impl FunctionCallSite {
    pub fn new(name: &str, arity: usize, constant: bool) -> Self {
        FunctionCallSite {
            name: name.to_string(),
            arity,
            constant,
            cache: InlineCache::new(),
            constant_value: OnceLock::new(),
        }
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// The value computed by an earlier call of a constant site.
    pub fn constant_value(&self) -> Option<Value> {
        self.constant_value.get().cloned()
    }

    /// Keep the result of a constant site. Only the first value sticks.
    pub fn remember(&self, value: Value) {
        let _ = self.constant_value.set(value);
    }

    /// The function to call with `args` from `caller`.
    pub fn link(&self, runtime: &Runtime, caller: &Arc<CodeUnit>, args: &[Value]) -> Result<Callee> {
        if let Some(value) = self.constant_value() {
            return Ok(Callee::Value(value));
        }
        let cached = self.cache.lookup(args, |target| {
            target.unit.upgrade().map(|unit| Callee::Function {
                unit,
                index: target.index,
            })
        });
        if let Some(callee) = cached {
            return Ok(callee);
        }

        let (unit, index) = resolve(runtime, caller, &self.name, self.arity)?;
        log::debug!(
            "linked {}/{} in {} to {}#{}",
            self.name,
            self.arity,
            caller.name,
            unit.name,
            index
        );
        self.cache.relink(
            AnyArguments,
            FunctionTarget {
                unit: Arc::downgrade(&unit),
                index,
            },
            runtime.options().megamorphic_threshold,
        );
        Ok(Callee::Function { unit, index })
    }
}

/// Find the function `name` callable with `argc` arguments from `caller`.
pub fn resolve(
    runtime: &Runtime,
    caller: &Arc<CodeUnit>,
    name: &str,
    argc: usize,
) -> Result<(Arc<CodeUnit>, usize)> {
    let module = caller.module.as_str();
    let find = |unit_name: &str, function: &str| -> Option<(Arc<CodeUnit>, usize)> {
        let unit = runtime.unit(unit_name)?;
        let index = unit.find_function(function, argc)?;
        let visible = unit.functions[index].public || unit.module == module;
        log::trace!("{}::{} visible from {}: {}", unit_name, function, module, visible);
        visible.then_some((unit, index))
    };

    if let Some(index) = caller.find_function(name, argc) {
        return Ok((Arc::clone(caller), index));
    }
    if caller.name != module
        && let Some(found) = find(module, name)
    {
        return Ok(found);
    }

    if let Some((prefix, simple)) = name.rsplit_once('.') {
        if let Some(found) = find(prefix, simple) {
            return Ok(found);
        }
        for import in &caller.imports {
            if let Some(found) = find(&format!("{}.{}", import, prefix), simple) {
                return Ok(found);
            }
        }
    }

    for import in &caller.imports {
        if let Some(found) = find(import, name) {
            return Ok(found);
        }
    }
    if let Some(found) = find(PREDEFINED, name) {
        return Ok(found);
    }

    let simple = name.rsplit('.').next().unwrap_or(name);
    // `ImmutableP` lives in the unit of struct `P`.
    let type_name = match name.strip_prefix("Immutable") {
        Some(rest) if !rest.is_empty() => rest,
        _ => name,
    };
    for type_name in [name, type_name] {
        if let Some(found) = find(&qualified_type_name(module, type_name), simple) {
            return Ok(found);
        }
        for import in &caller.imports {
            if let Some(found) = find(&qualified_type_name(import, type_name), simple) {
                return Ok(found);
            }
        }
    }

    Err(RuntimeError::NoSuchFunction {
        name: name.to_string(),
        arity: argc,
        module: module.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompilerOptions, compile};

    fn load(runtime: &Runtime, source: &str) -> Arc<CodeUnit> {
        let module = compile(source, &CompilerOptions::default()).unwrap();
        runtime.define(module.units).unwrap().remove(0)
    }

    fn resolved_name(runtime: &Runtime, caller: &Arc<CodeUnit>, name: &str, argc: usize) -> String {
        let (unit, index) = resolve(runtime, caller, name, argc).unwrap();
        format!("{}::{}", unit.name, unit.functions[index].name)
    }

    #[test]
    fn test_resolution_order() {
        let runtime = Runtime::new();
        load(
            &runtime,
            "module lib\nfunction helper = -> 1\nlocal function secret = -> 2\nfunction println = |x| -> x\n",
        );
        let app = load(
            &runtime,
            "module app\nimport lib\nstruct Point = { x, y }\nfunction own = -> 0\n",
        );

        assert_eq!(resolved_name(&runtime, &app, "own", 0), "app::own");
        assert_eq!(resolved_name(&runtime, &app, "helper", 0), "lib::helper");
        assert_eq!(resolved_name(&runtime, &app, "lib.helper", 0), "lib::helper");
        // Imports come before the predefined module.
        assert_eq!(resolved_name(&runtime, &app, "println", 1), "lib::println");
        assert_eq!(
            resolved_name(&runtime, &app, "Point", 2),
            "app.types.Point::Point"
        );
        assert_eq!(
            resolved_name(&runtime, &app, "ImmutablePoint", 2),
            "app.types.Point::ImmutablePoint"
        );
    }

    #[test]
    fn test_local_functions_stay_private() {
        let runtime = Runtime::new();
        load(&runtime, "module lib\nlocal function secret = -> 2\n");
        let app = load(&runtime, "module app\nimport lib\n");
        let err = resolve(&runtime, &app, "secret", 0).unwrap_err();
        assert_eq!(
            err.to_string(),
            "No function `secret` with 0 argument(s) is visible from module app"
        );
    }

    #[test]
    fn test_site_links_once() {
        let runtime = Runtime::new();
        let app = load(&runtime, "module app\nfunction f = |a, b| -> a\n");
        let site = FunctionCallSite::new("f", 2, false);
        let args = [Value::Integer(1), Value::Integer(2)];
        for _ in 0..1000 {
            assert!(matches!(
                site.link(&runtime, &app, &args).unwrap(),
                Callee::Function { index: 0, .. }
            ));
        }
        let stats = site.stats();
        assert_eq!((stats.misses, stats.hits), (1, 999));
    }

    #[test]
    fn test_constant_site_keeps_value() {
        let runtime = Runtime::new();
        let app = load(&runtime, "module app\nfunction f = -> 1\n");
        let site = FunctionCallSite::new("f", 0, true);
        site.remember(Value::Integer(42));
        site.remember(Value::Integer(7));
        assert!(matches!(
            site.link(&runtime, &app, &[]).unwrap(),
            Callee::Value(Value::Integer(42))
        ));
    }
}
