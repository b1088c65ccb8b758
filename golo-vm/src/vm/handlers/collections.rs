// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Collection literal handlers: BuildArray, BuildList, BuildVector, BuildSet,
//! BuildMap, BuildTuple.

use crate::opcode::OpCode;
use crate::value::Value;
use crate::vm::{Result, RuntimeError, VM};

impl VM {
    /// Execute a collection opcode.
    pub(crate) fn execute_collections(&mut self, op: OpCode) -> Result<()> {
        let collection = match op {
            OpCode::BuildArray(n) => Value::array(self.stack.pop_n(n as usize)?),
            OpCode::BuildList(n) => Value::list(self.stack.pop_n(n as usize)?),
            OpCode::BuildVector(n) => Value::vector(self.stack.pop_n(n as usize)?),
            OpCode::BuildSet(n) => Value::set(self.stack.pop_n(n as usize)?),
            OpCode::BuildTuple(n) => Value::tuple(self.stack.pop_n(n as usize)?),
            OpCode::BuildMap(n) => Value::map(pairs(self.stack.pop_n(n as usize)?)?),
            _ => {
                return Err(RuntimeError::Internal(format!(
                    "execute_collections: unexpected opcode {:?}",
                    op
                )));
            }
        };
        self.stack.push(collection);
        Ok(())
    }
}

/// Group alternating keys and values.
fn pairs(items: Vec<Value>) -> Result<Vec<(Value, Value)>> {
    if items.len() % 2 != 0 {
        return Err(RuntimeError::Internal(format!(
            "map literal with {} keys and values",
            items.len()
        )));
    }
    let mut entries = Vec::with_capacity(items.len() / 2);
    let mut items = items.into_iter();
    while let (Some(key), Some(value)) = (items.next(), items.next()) {
        entries.push((key, value));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_map_items_alternate() {
        let entries = pairs(vec![Value::from("a"), Value::Integer(1), Value::from("b"), Value::Integer(2)])
            .unwrap();
        assert_eq!(entries[1], (Value::from("b"), Value::Integer(2)));
        assert!(pairs(vec![Value::Integer(1)]).is_err());
    }
}
