// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Shared types for the bytecode generator.

use thiserror::Error;

use super::ir::Block;

/// An internal invariant broken during code generation.
///
/// These are compiler bugs or unsupported constructs, never user mistakes;
/// user mistakes are reported as [`super::CompilationError`] problems.
#[derive(Debug, Clone, Error)]
pub enum CodegenError {
    #[error("Too many constants in function `{0}`")]
    TooManyConstants(String),

    #[error("Too many call sites in function `{0}`")]
    TooManyCallSites(String),

    #[error("Too many local slots in function `{0}`")]
    TooManyLocals(String),

    #[error("Jump too far in function `{0}`")]
    JumpTooFar(String),

    #[error("Unsupported constant: {0}")]
    UnsupportedConstant(String),

    #[error("Reference `{name}` has no slot in function `{function}`")]
    MissingSlot { name: String, function: String },

    #[error("Internal code generation error: {0}")]
    Internal(String),
}

/// Result type for code generation.
pub type Result<T> = std::result::Result<T, CodegenError>;

/// Jump bookkeeping for the innermost loop.
#[derive(Debug, Clone, Default)]
pub struct LoopContext {
    /// Offsets of `break` jumps, patched to the loop exit.
    pub breaks: Vec<usize>,
    /// Offsets of `continue` jumps, patched to the post statement (or the
    /// condition when there is none).
    pub continues: Vec<usize>,
    /// Number of enclosing `try` statements when the loop started.
    pub try_depth: usize,
}

/// An enclosing `try` whose `finally` block must run on early exits.
#[derive(Debug, Clone)]
pub struct TryContext {
    pub finally: Option<Block>,
    /// Instruction ranges of `finally` copies inlined for early exits. They
    /// are left out of this `try`'s protected ranges.
    pub gaps: Vec<(usize, usize)>,
}

impl TryContext {
    pub fn new(finally: Option<Block>) -> Self {
        TryContext {
            finally,
            gaps: Vec::new(),
        }
    }

    /// `start..end` minus the gaps, as non-empty ranges in order.
    pub fn protected(&self, start: usize, end: usize) -> Vec<(usize, usize)> {
        let mut gaps = self.gaps.clone();
        gaps.sort_unstable();
        let mut ranges = Vec::new();
        let mut from = start;
        for (gap_start, gap_end) in gaps {
            if gap_start > from {
                ranges.push((from, gap_start.min(end)));
            }
            from = from.max(gap_end);
        }
        if from < end {
            ranges.push((from, end));
        }
        ranges.retain(|(a, b)| a < b);
        ranges
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protected_ranges_skip_gaps() {
        let mut context = TryContext::new(None);
        assert_eq!(context.protected(2, 10), vec![(2, 10)]);
        context.gaps.push((7, 9));
        context.gaps.push((3, 5));
        assert_eq!(context.protected(2, 10), vec![(2, 3), (5, 7), (9, 10)]);
        context.gaps.push((9, 10));
        assert_eq!(context.protected(2, 10), vec![(2, 3), (5, 7)]);
    }
}
