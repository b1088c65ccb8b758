// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Call-site and function-reference handlers: InvokeFunction, InvokeMethod,
//! InvokeOperator, InvokeClosure, MakeClosure, BindLeading, LoadFunctionRef.

use std::sync::Arc;

use crate::chunk::CodeUnit;
use crate::dispatch::{CallSite, Callee};
use crate::opcode::OpCode;
use crate::runtime::PREDEFINED;
use crate::value::{FunctionRef, Value};
use crate::vm::{Invoked, Result, RuntimeError, VM};

impl VM {
    /// Link the call site named by `op` and call its target.
    pub(crate) fn execute_invoke(&mut self, op: OpCode) -> Result<()> {
        let index = match op {
            OpCode::InvokeFunction(i)
            | OpCode::InvokeMethod(i)
            | OpCode::InvokeOperator(i)
            | OpCode::InvokeClosure(i) => i as usize,
            _ => {
                return Err(RuntimeError::Internal(format!(
                    "execute_invoke: unexpected opcode {:?}",
                    op
                )));
            }
        };
        let frame = self.frame()?;
        let unit = Arc::clone(&frame.unit);
        let prototype = Arc::clone(&frame.prototype);
        let site = prototype
            .chunk
            .call_sites
            .get(index)
            .ok_or_else(|| RuntimeError::Internal(format!("no call site #{}", index)))?;

        let mut operands = self.stack.pop_n(site.operand_count())?;
        let callee = match site {
            CallSite::Function(site) => site.link(&self.runtime, &unit, &operands)?,
            CallSite::Method(site) => site.link(&self.runtime, &unit, &operands)?,
            CallSite::Operator(site) => site.link(&self.runtime, &operands)?,
            CallSite::Closure(site) => {
                let callee = site.link(&self.runtime, &operands)?;
                operands.remove(0);
                callee
            }
        };

        if let CallSite::Function(site) = site
            && site.constant
            && !matches!(callee, Callee::Value(_))
        {
            let value = self.call(callee, operands)?;
            site.remember(value.clone());
            self.stack.push(value);
            return Ok(());
        }

        if let Invoked::Done(value) = self.invoke(callee, operands)? {
            self.stack.push(value);
        }
        Ok(())
    }

    /// Execute a function-reference opcode.
    pub(crate) fn execute_function_refs(&mut self, op: OpCode) -> Result<()> {
        match op {
            OpCode::MakeClosure(index) => {
                let unit = Arc::clone(&self.frame()?.unit);
                let reference = FunctionRef::new(unit, index as usize);
                self.stack.push(Value::Function(Arc::new(reference)));
            }
            OpCode::BindLeading(count) => {
                let values = self.stack.pop_n(count as usize)?;
                let bound = match self.stack.pop()? {
                    Value::Function(f) => f.bind(values),
                    other => return Err(RuntimeError::NotCallable(other.type_name())),
                };
                self.stack.push(Value::Function(Arc::new(bound)));
            }
            OpCode::LoadFunctionRef(index) => {
                let reference = self.resolve_function_ref(index)?;
                self.stack.push(Value::Function(Arc::new(reference)));
            }
            _ => {
                return Err(RuntimeError::Internal(format!(
                    "execute_function_refs: unexpected opcode {:?}",
                    op
                )));
            }
        }
        Ok(())
    }

    /// `^name` looks in the caller's module, its own unit, then the
    /// predefined module. `^m::name` looks in `m`, then in `I.m` for each
    /// import `I`.
    fn resolve_function_ref(&self, index: u16) -> Result<FunctionRef> {
        let frame = self.frame()?;
        let constant = frame
            .prototype
            .chunk
            .function_refs
            .get(index as usize)
            .ok_or_else(|| RuntimeError::Internal(format!("no function reference #{}", index)))?;
        let caller = &frame.unit;

        let first = |unit: Arc<CodeUnit>| {
            unit.first_function(&constant.name)
                .map(|index| FunctionRef::new(unit, index))
        };
        let found = match &constant.module {
            None => self
                .runtime
                .unit(&caller.module)
                .and_then(first)
                .or_else(|| first(Arc::clone(caller)))
                .or_else(|| self.runtime.unit(PREDEFINED).and_then(first)),
            Some(module) => self.runtime.unit(module).and_then(first).or_else(|| {
                caller.imports.iter().find_map(|import| {
                    self.runtime
                        .unit(&format!("{}.{}", import, module))
                        .and_then(first)
                })
            }),
        };
        log::trace!(
            "function reference {}::{} resolved: {}",
            constant.module.as_deref().unwrap_or(&caller.module),
            constant.name,
            found.is_some()
        );
        found.ok_or_else(|| RuntimeError::NoSuchFunction {
            name: constant.name.clone(),
            arity: 0,
            module: constant
                .module
                .clone()
                .unwrap_or_else(|| caller.module.clone()),
        })
    }
}
