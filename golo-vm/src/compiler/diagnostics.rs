// golo-vm - Bytecode compiler and virtual machine for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! User-facing compilation diagnostics.

use std::fmt;

use golo_parser::{ParseError, Position};
use thiserror::Error;

/// The category of a compilation problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProblemKind {
    Parsing,
    AugmentFunctionNoArgs,
    UndeclaredReference,
    AssignConstant,
    BreakOrContinueOutsideLoop,
    ReferenceAlreadyDeclaredInBlock,
}

impl ProblemKind {
    pub fn name(&self) -> &'static str {
        match self {
            ProblemKind::Parsing => "PARSING",
            ProblemKind::AugmentFunctionNoArgs => "AUGMENT_FUNCTION_NO_ARGS",
            ProblemKind::UndeclaredReference => "UNDECLARED_REFERENCE",
            ProblemKind::AssignConstant => "ASSIGN_CONSTANT",
            ProblemKind::BreakOrContinueOutsideLoop => "BREAK_OR_CONTINUE_OUTSIDE_LOOP",
            ProblemKind::ReferenceAlreadyDeclaredInBlock => "REFERENCE_ALREADY_DECLARED_IN_BLOCK",
        }
    }
}

impl fmt::Display for ProblemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One compilation problem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub kind: ProblemKind,
    pub description: String,
    pub position: Option<Position>,
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(position) => write!(f, "[{}] {} ({})", self.kind, self.description, position),
            None => write!(f, "[{}] {}", self.kind, self.description),
        }
    }
}

/// A failed compilation and every problem found before giving up.
#[derive(Debug, Clone, Error)]
#[error("{}", render(.source_name, .problems))]
pub struct CompilationError {
    pub source_name: String,
    pub problems: Vec<Problem>,
}

fn render(source_name: &str, problems: &[Problem]) -> String {
    let mut out = format!("In Golo module: {}", source_name);
    for problem in problems {
        out.push_str("\n  ");
        out.push_str(&problem.to_string());
    }
    out
}

impl CompilationError {
    pub fn problems(&self) -> &[Problem] {
        &self.problems
    }

    pub fn has(&self, kind: ProblemKind) -> bool {
        self.problems.iter().any(|p| p.kind == kind)
    }

    pub fn from_parse_error(source_name: &str, error: &ParseError) -> Self {
        CompilationError {
            source_name: source_name.to_string(),
            problems: vec![Problem {
                kind: ProblemKind::Parsing,
                description: error.message.clone(),
                position: Some(error.position()),
            }],
        }
    }
}

/// Accumulates problems across passes.
#[derive(Debug, Default)]
pub struct ProblemCollector {
    problems: Vec<Problem>,
}

impl ProblemCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(
        &mut self,
        kind: ProblemKind,
        position: Option<Position>,
        description: impl Into<String>,
    ) {
        let description = description.into();
        log::trace!("problem {}: {}", kind, description);
        self.problems.push(Problem {
            kind,
            description,
            position,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.problems.is_empty()
    }

    pub fn len(&self) -> usize {
        self.problems.len()
    }

    /// `Ok` when nothing was reported, otherwise every problem in report order.
    pub fn finish(self, source_name: &str) -> Result<(), CompilationError> {
        if self.problems.is_empty() {
            Ok(())
        } else {
            Err(CompilationError {
                source_name: source_name.to_string(),
                problems: self.problems,
            })
        }
    }
}
