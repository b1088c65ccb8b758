// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The shared dispatch runtime: the registry of defined code units, the
//! built-in classes and the predefined module.
//!
//! A [`Runtime`] is shared across threads behind an `Arc`. Each thread runs
//! code on its own [`VM`](crate::vm::VM).

pub mod classes;
pub mod predefined;
pub mod structs;

use std::io::Write;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::{Mutex, RwLock};
use thiserror::Error;

use crate::chunk::{CodeUnit, UnitFunction};
use crate::vm::{self, RuntimeError};

pub use classes::NativeMethodFn;

/// Name of the module every unit imports implicitly.
pub const PREDEFINED: &str = "gololang.Predefined";

/// Default guard-chain depth after which a call site goes megamorphic.
pub const MEGAMORPHIC_THRESHOLD: usize = 5;

/// Default maximum call depth.
pub const MAX_CALL_DEPTH: usize = 10_000;

/// Tuning knobs of a [`Runtime`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeOptions {
    pub megamorphic_threshold: usize,
    pub max_call_depth: usize,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        RuntimeOptions {
            megamorphic_threshold: MEGAMORPHIC_THRESHOLD,
            max_call_depth: MAX_CALL_DEPTH,
        }
    }
}

/// A unit with this name is already defined.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("A unit named {0} is already defined")]
pub struct DuplicateDefinition(pub String);

pub struct Runtime {
    options: RuntimeOptions,
    units: RwLock<IndexMap<String, Arc<CodeUnit>>>,
    output: Mutex<Box<dyn Write + Send>>,
}

impl Runtime {
    /// A runtime with the predefined module and default options.
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    pub fn with_options(options: RuntimeOptions) -> Self {
        let mut units = IndexMap::new();
        units.insert(PREDEFINED.to_string(), Arc::new(predefined::unit()));
        Runtime {
            options,
            units: RwLock::new(units),
            output: Mutex::new(Box::new(std::io::stdout())),
        }
    }

    pub fn options(&self) -> &RuntimeOptions {
        &self.options
    }

    /// The unit with this fully-qualified name.
    pub fn unit(&self, name: &str) -> Option<Arc<CodeUnit>> {
        self.units.read().get(name).cloned()
    }

    /// Names of every defined unit, in definition order.
    pub fn unit_names(&self) -> Vec<String> {
        self.units.read().keys().cloned().collect()
    }

    /// Define `units` all together. Nothing is defined when one of the names
    /// is taken.
    pub fn define(
        &self,
        units: Vec<CodeUnit>,
    ) -> std::result::Result<Vec<Arc<CodeUnit>>, DuplicateDefinition> {
        let mut registry = self.units.write();
        let mut seen = std::collections::HashSet::new();
        for unit in &units {
            if registry.contains_key(&unit.name) || !seen.insert(unit.name.as_str()) {
                log::warn!("refusing to redefine unit {}", unit.name);
                return Err(DuplicateDefinition(unit.name.clone()));
            }
        }
        let defined: Vec<Arc<CodeUnit>> = units.into_iter().map(Arc::new).collect();
        for unit in &defined {
            log::debug!(
                "defined unit {} ({} functions)",
                unit.name,
                unit.functions.len()
            );
            registry.insert(unit.name.clone(), Arc::clone(unit));
        }
        Ok(defined)
    }

    /// Add a host function to the native unit `module`, creating the unit
    /// when needed. Call sites linked to the previous version of the unit
    /// relink on their next call.
    pub fn define_native(
        &self,
        module: &str,
        function: UnitFunction,
    ) -> std::result::Result<Arc<CodeUnit>, DuplicateDefinition> {
        let mut registry = self.units.write();
        let unit = match registry.get(module) {
            Some(existing) => {
                if !matches!(existing.kind, crate::chunk::UnitKind::Native) {
                    log::warn!("refusing to add native {} to unit {}", function.name, module);
                    return Err(DuplicateDefinition(module.to_string()));
                }
                existing.with_function(function)
            }
            None => {
                let mut unit = CodeUnit::native(module);
                unit.add_function(function);
                unit
            }
        };
        let unit = Arc::new(unit);
        log::debug!("native unit {} now has {} functions", module, unit.functions.len());
        registry.insert(module.to_string(), Arc::clone(&unit));
        Ok(unit)
    }

    /// Send `println`/`print` output somewhere other than stdout.
    pub fn set_output(&self, output: Box<dyn Write + Send>) {
        *self.output.lock() = output;
    }

    pub fn write_output(&self, text: &str) -> vm::Result<()> {
        let mut output = self.output.lock();
        output
            .write_all(text.as_bytes())
            .and_then(|()| output.flush())
            .map_err(|e| RuntimeError::Internal(format!("cannot write output: {}", e)))
    }
}

impl Default for Runtime {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::UnitKind;
    use crate::value::Value;

    #[test]
    fn test_predefined_is_registered() {
        let runtime = Runtime::new();
        let unit = runtime.unit(PREDEFINED).unwrap();
        assert!(unit.find_function("println", 1).is_some());
        assert_eq!(runtime.options().megamorphic_threshold, 5);
    }

    #[test]
    fn test_define_is_all_or_nothing() {
        let runtime = Runtime::new();
        runtime
            .define(vec![CodeUnit::new("a", UnitKind::Module, "a")])
            .unwrap();
        let err = runtime
            .define(vec![
                CodeUnit::new("b", UnitKind::Module, "b"),
                CodeUnit::new("a", UnitKind::Module, "a"),
            ])
            .unwrap_err();
        assert_eq!(err, DuplicateDefinition("a".into()));
        assert!(runtime.unit("b").is_none());
    }

    #[test]
    fn test_define_native_replaces_unit() {
        let runtime = Runtime::new();
        let first = runtime
            .define_native("host", UnitFunction::native("f", 0, false, |_, _| Ok(Value::Null)))
            .unwrap();
        let second = runtime
            .define_native("host", UnitFunction::native("g", 0, false, |_, _| Ok(Value::Null)))
            .unwrap();
        assert_eq!(first.functions.len(), 1);
        assert_eq!(second.functions.len(), 2);
        assert!(Arc::ptr_eq(&runtime.unit("host").unwrap(), &second));

        runtime
            .define(vec![CodeUnit::new("app", UnitKind::Module, "app")])
            .unwrap();
        assert!(
            runtime
                .define_native("app", UnitFunction::native("h", 0, false, |_, _| Ok(Value::Null)))
                .is_err()
        );
    }
}
