// golo-embed integration tests
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Tests for the golo-embed embedding API.

use std::collections::HashMap;
use std::sync::Arc;

use golo_embed::{Engine, Error, LoadError, Result, RuntimeError, RuntimeOptions, Value};
use capture::Captured;

/// A `Write` sink tests can read back.
mod capture {
    use std::sync::Arc;

    use parking_lot::Mutex;

    #[derive(Clone, Default)]
    pub struct Captured(pub Arc<Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        pub fn text(&self) -> String {
            String::from_utf8(self.0.lock().clone()).unwrap()
        }
    }
}

fn engine_with(source: &str) -> Engine {
    let engine = Engine::new();
    engine.load_str(source).unwrap();
    engine
}

// =============================================================================
// Type conversion through calls
// =============================================================================

mod type_conversion {
    use super::*;

    #[test]
    fn int_boundary_values() {
        let engine = engine_with("module demo\nfunction id = |x| -> x\nfunction inc = |x| -> x + 1\n");

        let max: i32 = engine.call("demo", "id", (i32::MAX,)).unwrap();
        assert_eq!(max, i32::MAX);

        // Integer arithmetic wraps.
        let wrapped: i32 = engine.call("demo", "inc", (i32::MAX,)).unwrap();
        assert_eq!(wrapped, i32::MIN);

        let long: i64 = engine.call("demo", "inc", (i64::from(i32::MAX),)).unwrap();
        assert_eq!(long, i64::from(i32::MAX) + 1);
    }

    #[test]
    fn float_division_by_zero_is_infinite() {
        let engine = engine_with("module demo\nfunction div = |a, b| -> a / b\n");
        let inf: f64 = engine.call("demo", "div", (1.0, 0)).unwrap();
        assert!(inf.is_infinite() && inf.is_sign_positive());
        let neg: f64 = engine.call("demo", "div", (-1.0, 0)).unwrap();
        assert!(neg.is_infinite() && neg.is_sign_negative());
    }

    #[test]
    fn f32_overflow_detection() {
        let result = golo_embed::from_golo::<f32>(&Value::Double(f64::MAX));
        assert!(result.is_err());
    }

    #[test]
    fn string_empty_and_unicode() {
        let engine = engine_with("module demo\nfunction echo = |s| -> s\nfunction size = |s| -> s: length()\n");
        let empty: String = engine.call("demo", "echo", ("",)).unwrap();
        assert_eq!(empty, "");
        let unicode: String = engine.call("demo", "echo", ("Hello, 世界! 🎉",)).unwrap();
        assert_eq!(unicode, "Hello, 世界! 🎉");
        let chars: i32 = engine.call("demo", "size", ("世界",)).unwrap();
        assert_eq!(chars, 2);
    }

    #[test]
    fn collections_round_trip() {
        let engine = engine_with(
            "module demo\n\
             function doubled = |xs| {\n\
               let out = list[]\n\
               for (var i = 0, i < xs: size(), i = i + 1) {\n\
                 out: add(xs: get(i) * 2)\n\
               }\n\
               return out\n\
             }\n\
             function scores = -> map[[\"ada\", 3], [\"bob\", 5]]\n",
        );
        let doubled: Vec<i32> = engine.call("demo", "doubled", (vec![1, 2, 3],)).unwrap();
        assert_eq!(doubled, vec![2, 4, 6]);

        let scores: HashMap<String, i32> = engine.call("demo", "scores", ()).unwrap();
        assert_eq!(scores.get("bob"), Some(&5));
    }

    #[test]
    fn conversion_errors_name_the_classes() {
        let engine = engine_with("module demo\nfunction text = -> \"nope\"\n");
        let err = engine.call::<i32>("demo", "text", ()).unwrap_err();
        assert!(matches!(err, Error::Conversion { .. }));
        assert_eq!(err.to_string(), "Type error: expected Integer, got String");
    }

    #[test]
    fn options_are_nullable() {
        let engine = engine_with("module demo\nfunction maybe = |x| -> x\n");
        let none: Option<String> = engine.call("demo", "maybe", (None::<String>,)).unwrap();
        assert_eq!(none, None);
        let some: Option<String> = engine.call("demo", "maybe", (Some("x"),)).unwrap();
        assert_eq!(some.as_deref(), Some("x"));
    }
}

// =============================================================================
// Loading modules
// =============================================================================

mod loading {
    use super::*;

    #[test]
    fn load_returns_module_name() {
        let engine = Engine::new();
        let name = engine.load_str("module acme.Tools\nfunction f = -> 1\n").unwrap();
        assert_eq!(name, "acme.Tools");
        assert!(engine.module("acme.Tools").is_some());
    }

    #[test]
    fn duplicate_module_is_rejected() {
        let engine = engine_with("module demo\n");
        let err = engine.load_str("module demo\n").unwrap_err();
        assert!(matches!(
            err,
            Error::Load(LoadError::DuplicateDefinition(_))
        ));
    }

    #[test]
    fn compile_errors_are_reported() {
        let err = Engine::new()
            .load_str("module demo\nfunction f = -> nothing\n")
            .unwrap_err();
        assert!(err.to_string().contains("UNDECLARED_REFERENCE"));
    }

    #[test]
    fn module_state_initialiser_runs_on_load() {
        let engine = engine_with(
            "module demo\nvar hits = 10\nfunction hit = {\n  hits = hits + 1\n  return hits\n}\n",
        );
        let first: i32 = engine.call("demo", "hit", ()).unwrap();
        let second: i32 = engine.call("demo", "hit", ()).unwrap();
        assert_eq!((first, second), (11, 12));
    }

    #[test]
    fn load_file_reads_source() {
        let dir = std::env::temp_dir().join(format!("golo-embed-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("greeter.golo");
        std::fs::write(&path, "module greeter\nfunction hello = -> \"hello\"\n").unwrap();

        let engine = Engine::new();
        assert_eq!(engine.load_file(&path).unwrap(), "greeter");
        let hello: String = engine.call("greeter", "hello", ()).unwrap();
        assert_eq!(hello, "hello");

        let missing = engine.load_file(dir.join("missing.golo")).unwrap_err();
        assert!(matches!(missing, Error::Io { .. }));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}

// =============================================================================
// Calling into Golo
// =============================================================================

mod calls {
    use super::*;

    #[test]
    fn missing_function_is_an_error() {
        let engine = engine_with("module demo\nlocal function hidden = -> 1\n");
        let err = engine.call::<Value>("demo", "hidden", ()).unwrap_err();
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::NoSuchFunction { .. })
        ));
        let err = engine.call::<Value>("nowhere", "f", ()).unwrap_err();
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::NoSuchFunction { .. })
        ));
    }

    #[test]
    fn returned_closures_can_be_called() {
        let engine = engine_with("module demo\nfunction adder = |n| -> |x| -> n + x\n");
        let add10: Value = engine.call("demo", "adder", (10,)).unwrap();
        let result: i32 = engine.call_value(&add10, (5,)).unwrap();
        assert_eq!(result, 15);
    }

    #[test]
    fn uncaught_exceptions_surface_as_runtime_errors() {
        let engine = engine_with("module demo\nfunction fail = -> raise(\"broken\")\n");
        match engine.call::<Value>("demo", "fail", ()) {
            Err(Error::Runtime(err)) => {
                assert_eq!(err.kind(), "RuntimeException");
                assert_eq!(err.to_string(), "RuntimeException: broken");
            }
            other => panic!("expected a runtime error, got {:?}", other),
        }
    }

    #[test]
    fn call_depth_follows_options() {
        let engine = Engine::with_options(RuntimeOptions {
            max_call_depth: 100,
            ..RuntimeOptions::default()
        });
        engine
            .load_str("module demo\nfunction down = |n| -> down(n + 1)\n")
            .unwrap();
        let err = engine.call::<Value>("demo", "down", (0,)).unwrap_err();
        assert!(matches!(
            err,
            Error::Runtime(RuntimeError::StackOverflow(100))
        ));
    }

    #[test]
    fn println_goes_to_configured_output() {
        let engine = engine_with("module demo\nfunction main = {\n  println(\"one\")\n  print(2)\n}\n");
        let out = Captured::default();
        engine.set_output(out.clone());
        engine.call::<()>("demo", "main", ()).unwrap();
        assert_eq!(out.text(), "one\n2");
    }

    #[test]
    fn engine_is_shared_across_threads() {
        let engine = Arc::new(engine_with("module demo\nfunction square = |x| -> x * x\n"));
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || {
                    (0..25)
                        .map(|i| engine.call::<i32>("demo", "square", (t * 25 + i,)).unwrap())
                        .sum::<i32>()
                })
            })
            .collect();
        let total: i32 = handles.into_iter().map(|h| h.join().unwrap()).sum();
        assert_eq!(total, (0..100).map(|x| x * x).sum::<i32>());
    }
}

// =============================================================================
// Native functions
// =============================================================================

mod natives {
    use super::*;

    fn double(args: &[Value]) -> Result<Value> {
        match args {
            [Value::Integer(n)] => Ok(Value::Integer(n * 2)),
            [other] => Err(Error::type_error("Integer", other.type_name())),
            _ => Ok(Value::Null),
        }
    }

    #[test]
    fn natives_are_visible_after_import() {
        let engine = Engine::new();
        engine.register_native("host", "double", 1, double).unwrap();
        engine
            .load_str("module demo\nimport host\nfunction main = |x| -> double(x) + 1\n")
            .unwrap();
        let result: i32 = engine.call("demo", "main", (20,)).unwrap();
        assert_eq!(result, 41);
    }

    #[test]
    fn native_errors_reach_golo_code() {
        let engine = Engine::new();
        engine.register_native("host", "double", 1, double).unwrap();
        engine
            .load_str(
                "module demo\nimport host\nfunction main = {\n  try {\n    return double(\"x\")\n  } catch (e) {\n    return e: getMessage()\n  }\n}\n",
            )
            .unwrap();
        let message: String = engine.call("demo", "main", ()).unwrap();
        assert_eq!(message, "Type error: expected Integer, got String");
    }

    #[test]
    fn natives_can_capture_host_state() {
        let seen = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let engine = Engine::new();
        engine
            .register_native("host", "tick", 0, move |_| {
                let n = counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
                Ok(Value::Integer(n as i32 + 1))
            })
            .unwrap();
        engine
            .load_str("module demo\nimport host\nfunction main = {\n  tick()\n  return tick()\n}\n")
            .unwrap();
        let last: i32 = engine.call("demo", "main", ()).unwrap();
        assert_eq!(last, 2);
        assert_eq!(seen.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[test]
    fn natives_cannot_extend_compiled_modules() {
        let engine = engine_with("module demo\n");
        let err = engine
            .register_native("demo", "extra", 0, |_| Ok(Value::Null))
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Load(LoadError::DuplicateDefinition(_))
        ));
    }

    #[test]
    fn natives_registered_later_are_linked() {
        let engine = Engine::new();
        engine
            .register_native("host", "one", 0, |_| Ok(Value::Integer(1)))
            .unwrap();
        engine
            .load_str("module demo\nimport host\nfunction main = -> one() + two()\n")
            .unwrap();
        assert!(engine.call::<i32>("demo", "main", ()).is_err());
        engine
            .register_native("host", "two", 0, |_| Ok(Value::Integer(2)))
            .unwrap();
        let sum: i32 = engine.call("demo", "main", ()).unwrap();
        assert_eq!(sum, 3);
    }
}

// =============================================================================
// Properties
// =============================================================================

mod properties {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(100))]

        #[test]
        fn strings_survive_the_boundary(s in ".*") {
            let engine = engine_with("module demo\nfunction echo = |s| -> s\n");
            let back: String = engine.call("demo", "echo", (s.clone(),)).unwrap();
            prop_assert_eq!(back, s);
        }

        #[test]
        fn integer_addition_wraps(a: i32, b: i32) {
            let engine = engine_with("module demo\nfunction add = |a, b| -> a + b\n");
            let sum: i32 = engine.call("demo", "add", (a, b)).unwrap();
            prop_assert_eq!(sum, a.wrapping_add(b));
        }
    }
}
