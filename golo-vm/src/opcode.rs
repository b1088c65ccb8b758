// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Bytecode instruction definitions.

/// Bytecode instructions for the Golo VM.
///
/// Instructions operate on a value stack. Jump offsets are relative to the
/// instruction following the jump and may be negative. Every call goes through
/// a call site from the chunk's call-site table, so the instruction itself only
/// carries the site index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpCode {
    // =========================================================================
    // Constants & Stack
    // =========================================================================
    /// Push constant from constant pool onto stack.
    Const(u16),

    /// Push null.
    Null,

    /// Push true.
    True,

    /// Push false.
    False,

    /// Pop top value from stack.
    Pop,

    /// Duplicate top value on stack.
    Dup,

    // =========================================================================
    // Variables
    // =========================================================================
    /// Load local variable: push stack[frame_base + n].
    LoadLocal(u16),

    /// Store to local variable: stack[frame_base + n] = pop().
    StoreLocal(u16),

    /// Load module state slot n.
    LoadStatic(u16),

    /// Store pop() into module state slot n.
    StoreStatic(u16),

    // =========================================================================
    // Control Flow
    // =========================================================================
    /// Unconditional relative jump.
    Jump(i16),

    /// Jump if top of stack is false. Does not pop.
    JumpIfFalse(i16),

    /// Jump if top of stack is true. Does not pop.
    JumpIfTrue(i16),

    /// Pop and jump if false.
    PopJumpIfFalse(i16),

    /// Pop and jump if true.
    PopJumpIfTrue(i16),

    /// Return from function: pop return value and restore caller's frame.
    Return,

    /// Pop a value and raise it as an exception.
    Throw,

    // =========================================================================
    // Dynamic call sites
    // =========================================================================
    /// Call a function by name through call site n.
    InvokeFunction(u16),

    /// Call a method through call site n. The receiver sits below the
    /// arguments.
    InvokeMethod(u16),

    /// Apply an operator through call site n.
    InvokeOperator(u16),

    /// Call a function reference through call site n. The callee sits below
    /// the arguments.
    InvokeClosure(u16),

    // =========================================================================
    // Function references
    // =========================================================================
    /// Push a reference to function n of the current unit.
    MakeClosure(u16),

    /// Pop n values and a function reference, push the reference with those
    /// values bound as leading arguments.
    BindLeading(u8),

    /// Resolve the function reference described by constant n (a
    /// `module::name` pair) and push it.
    LoadFunctionRef(u16),

    // =========================================================================
    // Collections
    // =========================================================================
    /// Pop n values, push an array.
    BuildArray(u16),

    /// Pop n values, push a list.
    BuildList(u16),

    /// Pop n values, push a vector.
    BuildVector(u16),

    /// Pop n values, push a set.
    BuildSet(u16),

    /// Pop n alternating keys and values, push a map.
    BuildMap(u16),

    /// Pop n values, push a tuple.
    BuildTuple(u16),
}

impl OpCode {
    /// Whether this instruction carries a relative jump offset.
    pub fn is_jump(&self) -> bool {
        matches!(
            self,
            OpCode::Jump(_)
                | OpCode::JumpIfFalse(_)
                | OpCode::JumpIfTrue(_)
                | OpCode::PopJumpIfFalse(_)
                | OpCode::PopJumpIfTrue(_)
        )
    }
}
