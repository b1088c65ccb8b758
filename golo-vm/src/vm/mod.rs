// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Stack-based virtual machine for executing Golo bytecode.
//!
//! A VM belongs to one thread; the [`Runtime`] it runs against is shared.
//! Bytecode calls push frames on the VM's own stack, native functions run
//! inline and may call back into the VM, which runs a nested loop until the
//! frame they entered returns.

pub mod error;
pub mod frame;
pub mod handlers;
pub mod stack;

use std::sync::Arc;

use crate::chunk::{CodeUnit, FunctionBody};
use crate::dispatch::Callee;
use crate::opcode::OpCode;
use crate::runtime::Runtime;
use crate::utils::{check_arity, collect_varargs};
use crate::value::Value;

pub use error::{Result, RuntimeError};
pub use frame::CallFrame;
pub use handlers::control::ControlFlow;
pub use stack::ValueStack;

/// Outcome of starting a call.
pub(crate) enum Invoked {
    /// The callee ran to completion.
    Done(Value),
    /// A bytecode frame was pushed; its result arrives on `Return`.
    Entered,
}

/// The Golo virtual machine.
pub struct VM {
    runtime: Arc<Runtime>,

    /// Value stack.
    stack: ValueStack,

    /// Call frame stack.
    frames: Vec<CallFrame>,
}

impl VM {
    /// Create a VM running against `runtime`.
    pub fn new(runtime: Arc<Runtime>) -> Self {
        Self {
            runtime,
            stack: ValueStack::new(),
            frames: Vec::new(),
        }
    }

    pub fn runtime(&self) -> &Arc<Runtime> {
        &self.runtime
    }

    /// Number of active call frames.
    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// Call function `index` of `unit`.
    pub fn call_function(
        &mut self,
        unit: &Arc<CodeUnit>,
        index: usize,
        args: Vec<Value>,
    ) -> Result<Value> {
        self.call(
            Callee::Function {
                unit: Arc::clone(unit),
                index,
            },
            args,
        )
    }

    /// Call the public function `name` of the unit `module` that accepts
    /// `args`.
    pub fn call_named(&mut self, module: &str, name: &str, args: Vec<Value>) -> Result<Value> {
        let not_found = || RuntimeError::NoSuchFunction {
            name: name.to_string(),
            arity: args.len(),
            module: module.to_string(),
        };
        let unit = self.runtime.unit(module).ok_or_else(not_found)?;
        let index = unit
            .find_function(name, args.len())
            .filter(|&i| unit.functions[i].public)
            .ok_or_else(not_found)?;
        self.call_function(&unit, index, args)
    }

    /// Call a function reference.
    pub fn call_value(&mut self, callee: &Value, args: Vec<Value>) -> Result<Value> {
        match callee {
            Value::Function(f) => self.call(Callee::Reference(Arc::clone(f)), args),
            other => Err(RuntimeError::NotCallable(other.type_name())),
        }
    }

    /// Run `callee` to completion.
    pub(crate) fn call(&mut self, callee: Callee, args: Vec<Value>) -> Result<Value> {
        let entry_depth = self.frames.len();
        match self.invoke(callee, args)? {
            Invoked::Done(value) => Ok(value),
            Invoked::Entered => self.run_loop(entry_depth),
        }
    }

    /// Start a call. Bytecode callees get a frame and run from the loop.
    pub(crate) fn invoke(&mut self, callee: Callee, args: Vec<Value>) -> Result<Invoked> {
        match callee {
            Callee::Value(value) => Ok(Invoked::Done(value)),
            Callee::Operator(f) => f(&args).map(Invoked::Done),
            Callee::Native(f) => f(self, &args).map(Invoked::Done),
            Callee::Function { unit, index } => self.enter(unit, index, args),
            Callee::Reference(reference) => {
                let mut all = reference.bound.clone();
                all.extend(args);
                self.enter(Arc::clone(&reference.unit), reference.index, all)
            }
        }
    }

    fn enter(&mut self, unit: Arc<CodeUnit>, index: usize, args: Vec<Value>) -> Result<Invoked> {
        let function = unit.function(index).cloned().ok_or_else(|| {
            RuntimeError::Internal(format!("no function #{} in unit {}", index, unit.name))
        })?;
        check_arity(args.len(), function.arity, function.varargs)?;
        let args = if function.varargs {
            collect_varargs(args, function.arity)
        } else {
            args
        };

        match &function.body {
            FunctionBody::Native(f) => f(self, &args).map(Invoked::Done),
            FunctionBody::Bytecode(prototype) => {
                let limit = self.runtime.options().max_call_depth;
                if self.frames.len() >= limit {
                    return Err(RuntimeError::StackOverflow(limit));
                }
                let base = self.stack.enter_frame(args, prototype.local_count as usize);
                self.frames
                    .push(CallFrame::new(base, unit, Arc::clone(prototype)));
                Ok(Invoked::Entered)
            }
        }
    }

    /// Execute until the frame entered above `entry_depth` returns.
    fn run_loop(&mut self, entry_depth: usize) -> Result<Value> {
        loop {
            match self.step(entry_depth) {
                Ok(ControlFlow::Continue) => {}
                Ok(ControlFlow::Return(result)) => return Ok(result),
                Err(err) => self.unwind(err, entry_depth)?,
            }
        }
    }

    fn step(&mut self, entry_depth: usize) -> Result<ControlFlow> {
        let op = self.read_op()?;

        match op {
            // Constants & Stack - handled inline (simple operations)
            OpCode::Const(idx) => {
                let val = self.get_constant(idx)?;
                self.stack.push(val);
            }
            OpCode::Null => self.stack.push(Value::Null),
            OpCode::True => self.stack.push(Value::Bool(true)),
            OpCode::False => self.stack.push(Value::Bool(false)),
            OpCode::Pop => {
                self.stack.pop()?;
            }
            OpCode::Dup => {
                let val = self.stack.peek(0)?;
                self.stack.push(val);
            }

            // Variables - delegated to handler
            OpCode::LoadLocal(_)
            | OpCode::StoreLocal(_)
            | OpCode::LoadStatic(_)
            | OpCode::StoreStatic(_) => {
                self.execute_variables(op)?;
            }

            // Control flow - delegated to handler
            OpCode::Jump(_)
            | OpCode::JumpIfFalse(_)
            | OpCode::JumpIfTrue(_)
            | OpCode::PopJumpIfFalse(_)
            | OpCode::PopJumpIfTrue(_)
            | OpCode::Return => return self.execute_control(op, entry_depth),

            OpCode::Throw => return Err(self.execute_throw()?),

            // Call sites and function references - delegated to handler
            OpCode::InvokeFunction(_)
            | OpCode::InvokeMethod(_)
            | OpCode::InvokeOperator(_)
            | OpCode::InvokeClosure(_) => {
                self.execute_invoke(op)?;
            }
            OpCode::MakeClosure(_) | OpCode::BindLeading(_) | OpCode::LoadFunctionRef(_) => {
                self.execute_function_refs(op)?;
            }

            // Collection literals - delegated to handler
            OpCode::BuildArray(_)
            | OpCode::BuildList(_)
            | OpCode::BuildVector(_)
            | OpCode::BuildSet(_)
            | OpCode::BuildMap(_)
            | OpCode::BuildTuple(_) => {
                self.execute_collections(op)?;
            }
        }
        Ok(ControlFlow::Continue)
    }

    fn read_op(&mut self) -> Result<OpCode> {
        let frame = self
            .frames
            .last_mut()
            .ok_or(RuntimeError::Internal("No active frame".into()))?;
        let op = frame
            .prototype
            .chunk
            .code
            .get(frame.ip)
            .copied()
            .ok_or(RuntimeError::Internal("IP out of bounds".into()))?;
        frame.ip += 1;
        Ok(op)
    }

    fn frame(&self) -> Result<&CallFrame> {
        self.frames
            .last()
            .ok_or(RuntimeError::Internal("No active frame".into()))
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame> {
        self.frames
            .last_mut()
            .ok_or(RuntimeError::Internal("No active frame".into()))
    }

    fn get_constant(&self, idx: u16) -> Result<Value> {
        self.frame()?
            .prototype
            .chunk
            .constants
            .get(idx as usize)
            .cloned()
            .ok_or(RuntimeError::Internal(
                "Constant index out of bounds".into(),
            ))
    }

    pub(crate) fn jump(&mut self, offset: i16) -> Result<()> {
        let frame = self.frame_mut()?;
        let new_ip = frame.ip as i64 + offset as i64;
        if new_ip < 0 {
            return Err(RuntimeError::Internal(
                "Jump instruction resulted in negative instruction pointer".into(),
            ));
        }
        frame.ip = new_ip as usize;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::UnitFunction;
    use crate::compiler::{CompilerOptions, compile};

    fn load(runtime: &Arc<Runtime>, source: &str) -> Arc<CodeUnit> {
        let module = compile(source, &CompilerOptions::default()).unwrap();
        runtime.define(module.units).unwrap().remove(0)
    }

    #[test]
    fn test_call_named() {
        let runtime = Arc::new(Runtime::new());
        load(&runtime, "module app\nfunction add = |a, b| -> a + b\n");
        let mut vm = VM::new(Arc::clone(&runtime));
        let result = vm
            .call_named("app", "add", vec![Value::Integer(1), Value::Integer(2)])
            .unwrap();
        assert_eq!(result, Value::Integer(3));
        assert_eq!(vm.depth(), 0);
        assert!(matches!(
            vm.call_named("app", "add", vec![]),
            Err(RuntimeError::NoSuchFunction { .. })
        ));
    }

    #[test]
    fn test_call_depth_is_bounded() {
        let runtime = Arc::new(Runtime::with_options(crate::runtime::RuntimeOptions {
            max_call_depth: 50,
            ..Default::default()
        }));
        load(&runtime, "module app\nfunction forever = |n| -> forever(n + 1)\n");
        let mut vm = VM::new(Arc::clone(&runtime));
        let err = vm.call_named("app", "forever", vec![Value::Integer(0)]).unwrap_err();
        assert!(matches!(err, RuntimeError::StackOverflow(50)));
        assert_eq!(vm.depth(), 0);
    }

    #[test]
    fn test_natives_call_back_into_the_vm() {
        let runtime = Arc::new(Runtime::new());
        runtime
            .define_native(
                "host",
                UnitFunction::native("twice", 1, false, |vm, args| {
                    let once = vm.call_value(&args[0], vec![Value::Integer(1)])?;
                    vm.call_value(&args[0], vec![once])
                }),
            )
            .unwrap();
        load(
            &runtime,
            "module app\nimport host\nfunction main = -> twice(|x| -> x + 10)\n",
        );
        let mut vm = VM::new(Arc::clone(&runtime));
        assert_eq!(vm.call_named("app", "main", vec![]).unwrap(), Value::Integer(21));
    }
}
