// golo-parser - Lexer and parser for the Golo programming language
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! # golo-parser
//!
//! Lexer and parser for the Golo programming language.
//! Produces a [`CompilationUnit`] parse tree from source code strings.

pub mod ast;
pub mod lexer;
pub mod parser;

pub use ast::{
    AugmentDecl, AugmentationDecl, BinaryOp, BlockNode, CatchNode, CollectionKind,
    CompilationUnit, DeclKind, ElseNode, Expression, FunctionBody, FunctionDecl, FunctionLiteral,
    IfNode, ImportDecl, LetOrVar, Literal, ModuleDecl, Position, Statement, StructDecl, Suffix,
    TopLevel, TryNode, UnionDecl, UnionValueDecl,
};
pub use lexer::{Lexer, LexerError, Token};
pub use num_bigint::BigInt;
pub use parser::{ParseError, Parser};
