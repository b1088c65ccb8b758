// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Loading Golo source into a runtime.
//!
//! Loading compiles the source, defines the module unit and its auxiliary
//! units together, then runs the module-state initialiser.

use std::io::Read;
use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::RwLock;
use thiserror::Error;

use crate::chunk::CodeUnit;
use crate::compiler::{CompileError, CompilerOptions, compile};
use crate::runtime::{DuplicateDefinition, Runtime};
use crate::vm::{RuntimeError, VM};

/// Why a module could not be loaded.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("cannot read {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    DuplicateDefinition(#[from] DuplicateDefinition),

    #[error("initialising module {module} failed: {source}")]
    Init {
        module: String,
        #[source]
        source: RuntimeError,
    },
}

pub type Result<T> = std::result::Result<T, LoadError>;

/// A module defined in the runtime.
#[derive(Debug)]
pub struct LoadedModule {
    /// Fully-qualified module name.
    pub name: String,
    pub unit: Arc<CodeUnit>,
    /// Augmentation, struct and union units compiled from the same source.
    pub auxiliary: Vec<Arc<CodeUnit>>,
}

pub struct Loader {
    runtime: Arc<Runtime>,
    modules: RwLock<IndexMap<String, Arc<LoadedModule>>>,
}

impl Loader {
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Loader {
            runtime,
            modules: RwLock::new(IndexMap::new()),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Compile and define the module read from `reader`. `name` identifies
    /// the source in diagnostics.
    pub fn load(&self, name: &str, mut reader: impl Read) -> Result<Arc<LoadedModule>> {
        let mut source = String::new();
        reader
            .read_to_string(&mut source)
            .map_err(|source| LoadError::Io {
                name: name.to_string(),
                source,
            })?;
        self.load_source(name, &source)
    }

    pub fn load_source(&self, name: &str, source: &str) -> Result<Arc<LoadedModule>> {
        let compiled = compile(source, &CompilerOptions::named(name))?;
        let module_name = compiled.name.clone();
        let mut units = self.runtime.define(compiled.units)?.into_iter();
        let unit = units.next().ok_or_else(|| LoadError::Init {
            module: module_name.clone(),
            source: RuntimeError::Internal("compilation produced no units".into()),
        })?;
        let loaded = Arc::new(LoadedModule {
            name: module_name.clone(),
            unit,
            auxiliary: units.collect(),
        });
        log::debug!(
            "loaded {} from {} with {} auxiliary units",
            loaded.name,
            name,
            loaded.auxiliary.len()
        );
        self.modules
            .write()
            .insert(module_name.clone(), Arc::clone(&loaded));

        if let Some(init) = loaded.unit.init {
            VM::new(Arc::clone(&self.runtime))
                .call_function(&loaded.unit, init, Vec::new())
                .map_err(|source| LoadError::Init {
                    module: module_name,
                    source,
                })?;
        }
        Ok(loaded)
    }

    /// A module loaded by this loader.
    pub fn module(&self, name: &str) -> Option<Arc<LoadedModule>> {
        self.modules.read().get(name).cloned()
    }
}
