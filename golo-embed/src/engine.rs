// golo-embed - Engine implementation
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! The Engine struct - main entry point for embedding Golo.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use golo_vm::{LoadedModule, Loader, Runtime, RuntimeOptions, UnitFunction, VM, Value};

use crate::convert::{FromGoloValue, IntoGoloValue};
use crate::error::{Error, Result};

/// The Golo scripting engine.
///
/// `Engine` loads Golo modules into a shared runtime and calls their
/// functions with Rust values.
///
/// # Thread Safety
///
/// `Engine` is `Send + Sync`. Every call runs on a fresh [`VM`], so several
/// threads may call into the same engine; call sites and module state are
/// shared between them.
///
/// # Example
///
/// ```rust
/// use golo_embed::Engine;
///
/// let engine = Engine::new();
/// engine.load_str("module demo\nfunction add = |a, b| -> a + b\n").unwrap();
/// let sum: i32 = engine.call("demo", "add", (1, 2)).unwrap();
/// assert_eq!(sum, 3);
/// ```
pub struct Engine {
    loader: Loader,
}

impl Engine {
    /// Create an engine with the predefined module and default options.
    pub fn new() -> Self {
        Self::with_options(RuntimeOptions::default())
    }

    /// Create an engine with a tuned runtime.
    ///
    /// ```rust
    /// use golo_embed::{Engine, RuntimeOptions};
    ///
    /// let engine = Engine::with_options(RuntimeOptions {
    ///     max_call_depth: 500,
    ///     ..RuntimeOptions::default()
    /// });
    /// assert_eq!(engine.runtime().options().max_call_depth, 500);
    /// ```
    pub fn with_options(options: RuntimeOptions) -> Self {
        Engine {
            loader: Loader::new(Arc::new(Runtime::with_options(options))),
        }
    }

    /// Compile and load a module from source. Returns the module name.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The source has syntax errors or compilation problems
    /// - A unit with one of the module's names is already loaded
    /// - The module-state initialiser fails
    pub fn load_str(&self, source: &str) -> Result<String> {
        self.load_named("<string>", source)
            .map(|module| module.name.clone())
    }

    /// Compile and load a module from a file. Returns the module name.
    pub fn load_file(&self, path: impl AsRef<Path>) -> Result<String> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|source| Error::Io {
            path: path.display().to_string(),
            source,
        })?;
        self.load_named(&path.display().to_string(), &source)
            .map(|module| module.name.clone())
    }

    fn load_named(&self, name: &str, source: &str) -> Result<Arc<LoadedModule>> {
        let module = self.loader.load_source(name, source)?;
        log::debug!("engine loaded {} from {}", module.name, name);
        Ok(module)
    }

    /// Call the public function `function` of `module`.
    ///
    /// Arguments are anything [`IntoArgs`]: a `Vec<Value>`, a slice of
    /// values, `()` or a tuple of convertible values.
    ///
    /// ```rust
    /// use golo_embed::{Engine, Value};
    ///
    /// let engine = Engine::new();
    /// engine.load_str("module demo\nfunction greet = |name| -> \"Hello, \" + name").unwrap();
    /// let greeting: String = engine.call("demo", "greet", ("Ada",)).unwrap();
    /// assert_eq!(greeting, "Hello, Ada");
    /// let raw: Value = engine.call("demo", "greet", vec![Value::from("Bob")]).unwrap();
    /// assert_eq!(raw.to_string(), "Hello, Bob");
    /// ```
    pub fn call<R: FromGoloValue>(
        &self,
        module: &str,
        function: &str,
        args: impl IntoArgs,
    ) -> Result<R> {
        let mut vm = VM::new(Arc::clone(self.loader.runtime()));
        let result = vm.call_named(module, function, args.into_args())?;
        R::from_golo_value(&result)
    }

    /// Call a function reference returned by Golo code.
    pub fn call_value<R: FromGoloValue>(&self, function: &Value, args: impl IntoArgs) -> Result<R> {
        let mut vm = VM::new(Arc::clone(self.loader.runtime()));
        let result = vm.call_value(function, args.into_args())?;
        R::from_golo_value(&result)
    }

    /// Register a host function `name` with `arity` parameters in the native
    /// module `module`. Golo code sees it after `import module`.
    ///
    /// ```rust
    /// use golo_embed::{Engine, Value};
    ///
    /// let engine = Engine::new();
    /// engine
    ///     .register_native("host", "double", 1, |args| match args {
    ///         [Value::Integer(n)] => Ok(Value::Integer(n * 2)),
    ///         _ => Err(golo_embed::Error::type_error("Integer", "other")),
    ///     })
    ///     .unwrap();
    /// engine.load_str("module demo\nimport host\nfunction main = -> double(21)").unwrap();
    /// let answer: i32 = engine.call("demo", "main", ()).unwrap();
    /// assert_eq!(answer, 42);
    /// ```
    pub fn register_native(
        &self,
        module: &str,
        name: &str,
        arity: usize,
        func: impl Fn(&[Value]) -> Result<Value> + Send + Sync + 'static,
    ) -> Result<()> {
        let function = UnitFunction::native(name, arity, false, move |_: &mut VM, args: &[Value]| {
            func(args).map_err(Error::into_runtime)
        });
        self.loader
            .runtime()
            .define_native(module, function)
            .map_err(|e| Error::Load(e.into()))?;
        log::debug!("registered native {}::{}/{}", module, name, arity);
        Ok(())
    }

    /// Send `println`/`print` output to `output` instead of stdout.
    pub fn set_output(&self, output: impl Write + Send + 'static) {
        self.loader.runtime().set_output(Box::new(output));
    }

    /// Get access to the underlying runtime.
    #[must_use]
    pub fn runtime(&self) -> &Arc<Runtime> {
        self.loader.runtime()
    }

    /// A module loaded through this engine.
    #[must_use]
    pub fn module(&self, name: &str) -> Option<Arc<LoadedModule>> {
        self.loader.module(name)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments of a call from the host.
pub trait IntoArgs {
    fn into_args(self) -> Vec<Value>;
}

impl IntoArgs for Vec<Value> {
    fn into_args(self) -> Vec<Value> {
        self
    }
}

impl IntoArgs for &[Value] {
    fn into_args(self) -> Vec<Value> {
        self.to_vec()
    }
}

impl IntoArgs for () {
    fn into_args(self) -> Vec<Value> {
        Vec::new()
    }
}

macro_rules! tuple_args {
    ($($name:ident),+) => {
        impl<$($name: IntoGoloValue),+> IntoArgs for ($($name,)+) {
            #[allow(non_snake_case)]
            fn into_args(self) -> Vec<Value> {
                let ($($name,)+) = self;
                vec![$($name.into_golo_value()),+]
            }
        }
    };
}

tuple_args!(A);
tuple_args!(A, B);
tuple_args!(A, B, C);
tuple_args!(A, B, C, D);
tuple_args!(A, B, C, D, E);
tuple_args!(A, B, C, D, E, F);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tuple_args_convert_each_element() {
        let args = (1, "two", 3.0).into_args();
        assert_eq!(
            args,
            vec![Value::Integer(1), Value::from("two"), Value::Double(3.0)]
        );
        assert!(().into_args().is_empty());
    }

    #[test]
    fn test_engine_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Engine>();
    }
}
