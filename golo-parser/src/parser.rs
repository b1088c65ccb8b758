// golo-parser - Parser for Golo
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Recursive descent parser for Golo source code.
//!
//! Converts tokens into a [`CompilationUnit`]. A parser may be reused for
//! several sources through [`Parser::reinit`]; it holds mutable lexer state
//! and must not be shared between threads while parsing.

use thiserror::Error;

use crate::ast::*;
use crate::lexer::{Lexer, LexerError, Token};

/// Parser error with position information.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Parse error at {line}:{column}: {message}")]
pub struct ParseError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl ParseError {
    pub fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }
}

impl From<LexerError> for ParseError {
    fn from(e: LexerError) -> Self {
        ParseError {
            message: e.message,
            line: e.line,
            column: e.column,
        }
    }
}

pub type Result<T> = std::result::Result<T, ParseError>;

/// The parser converts tokens into a parse tree.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    line: usize,
    column: usize,
    /// Line of the token consumed last.
    last_line: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser for the given source code.
    pub fn new(source: &'a str) -> Result<Self> {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token()?;
        Ok(Parser {
            line: lexer.token_line(),
            column: lexer.token_column(),
            last_line: 1,
            lexer,
            current,
        })
    }

    /// Point this parser at a new source, discarding all previous state.
    pub fn reinit(&mut self, source: &'a str) -> Result<()> {
        *self = Parser::new(source)?;
        Ok(())
    }

    /// Parse a string into a compilation unit (convenience function).
    pub fn parse_str(source: &str) -> Result<CompilationUnit> {
        Parser::new(source)?.parse_compilation_unit()
    }

    /// Parse a complete source file.
    pub fn parse_compilation_unit(&mut self) -> Result<CompilationUnit> {
        let module_position = self.position();
        self.expect(&Token::Module)?;
        let module = ModuleDecl {
            name: self.parse_qualified_name()?,
            position: module_position,
        };

        let mut imports = Vec::new();
        while self.current == Token::Import {
            let position = self.position();
            self.advance()?;
            imports.push(ImportDecl {
                name: self.parse_qualified_name()?,
                position,
            });
        }

        let mut items = Vec::new();
        while self.current != Token::Eof {
            items.push(self.parse_top_level()?);
        }

        Ok(CompilationUnit {
            module,
            imports,
            items,
        })
    }

    // ========================================================================
    // Internal parsing methods
    // ========================================================================

    fn advance(&mut self) -> Result<Token> {
        self.last_line = self.line;
        let prev = std::mem::replace(&mut self.current, self.lexer.next_token()?);
        self.line = self.lexer.token_line();
        self.column = self.lexer.token_column();
        Ok(prev)
    }

    fn position(&self) -> Position {
        Position::new(self.line, self.column)
    }

    fn error(&self, message: String) -> ParseError {
        ParseError {
            message,
            line: self.line,
            column: self.column,
        }
    }

    fn expect(&mut self, expected: &Token) -> Result<()> {
        if &self.current == expected {
            self.advance()?;
            Ok(())
        } else {
            Err(self.error(format!("Expected '{}', found '{}'", expected, self.current)))
        }
    }

    fn accept(&mut self, expected: &Token) -> Result<bool> {
        if &self.current == expected {
            self.advance()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match &self.current {
            Token::Ident(name) => {
                let name = name.clone();
                self.advance()?;
                Ok(name)
            }
            other => Err(self.error(format!("Expected an identifier, found '{}'", other))),
        }
    }

    fn parse_qualified_name(&mut self) -> Result<String> {
        let mut name = self.expect_ident()?;
        while self.current == Token::Dot {
            self.advance()?;
            name.push('.');
            name.push_str(&self.expect_ident()?);
        }
        Ok(name)
    }

    fn parse_top_level(&mut self) -> Result<TopLevel> {
        match &self.current {
            Token::Function | Token::Local => Ok(TopLevel::Function(self.parse_function_decl()?)),
            Token::Let | Token::Var => Ok(TopLevel::State(self.parse_let_or_var()?)),
            Token::Struct => self.parse_struct(),
            Token::Union => self.parse_union(),
            Token::Augment => self.parse_augment(),
            Token::Augmentation => self.parse_augmentation(),
            Token::Import => Err(self.error("Imports must precede declarations".to_string())),
            other => Err(self.error(format!("Unexpected '{}' at top level", other))),
        }
    }

    fn parse_function_decl(&mut self) -> Result<FunctionDecl> {
        let position = self.position();
        let local = self.accept(&Token::Local)?;
        self.expect(&Token::Function)?;
        let name = self.expect_ident()?;
        self.expect(&Token::Assign)?;
        let function = self.parse_function_literal(true)?;
        Ok(FunctionDecl {
            name,
            local,
            function,
            position,
        })
    }

    /// Parses `|params| body`, `-> expr` or (for declarations) a bare block.
    fn parse_function_literal(&mut self, allow_bare_block: bool) -> Result<FunctionLiteral> {
        let position = self.position();
        let mut parameters = Vec::new();
        let mut varargs = false;

        if self.accept(&Token::Pipe)? {
            if self.current != Token::Pipe {
                loop {
                    parameters.push(self.expect_ident()?);
                    if self.accept(&Token::Ellipsis)? {
                        varargs = true;
                        break;
                    }
                    if !self.accept(&Token::Comma)? {
                        break;
                    }
                }
            }
            self.expect(&Token::Pipe)?;
        } else if self.current == Token::LBrace && !allow_bare_block {
            return Err(self.error("Expected a closure".to_string()));
        }

        let body = match &self.current {
            Token::Arrow => {
                self.advance()?;
                FunctionBody::Compact(Box::new(self.parse_expression()?))
            }
            Token::LBrace => FunctionBody::Block(self.parse_block()?),
            other => {
                return Err(self.error(format!(
                    "Expected '->' or '{{' for a function body, found '{}'",
                    other
                )));
            }
        };

        Ok(FunctionLiteral {
            parameters,
            varargs,
            body,
            position,
        })
    }

    fn parse_let_or_var(&mut self) -> Result<LetOrVar> {
        let position = self.position();
        let kind = match self.advance()? {
            Token::Let => DeclKind::Let,
            _ => DeclKind::Var,
        };
        let name = self.expect_ident()?;
        self.expect(&Token::Assign)?;
        let value = self.parse_expression()?;
        Ok(LetOrVar {
            kind,
            name,
            value,
            position,
        })
    }

    fn parse_member_names(&mut self) -> Result<Vec<String>> {
        self.expect(&Token::LBrace)?;
        let mut members = Vec::new();
        while self.current != Token::RBrace {
            members.push(self.expect_ident()?);
            if !self.accept(&Token::Comma)? {
                break;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(members)
    }

    fn parse_struct(&mut self) -> Result<TopLevel> {
        let position = self.position();
        self.advance()?;
        let name = self.expect_ident()?;
        self.expect(&Token::Assign)?;
        let members = self.parse_member_names()?;
        Ok(TopLevel::Struct(StructDecl {
            name,
            members,
            position,
        }))
    }

    fn parse_union(&mut self) -> Result<TopLevel> {
        let position = self.position();
        self.advance()?;
        let name = self.expect_ident()?;
        self.expect(&Token::Assign)?;
        self.expect(&Token::LBrace)?;
        let mut values = Vec::new();
        while self.current != Token::RBrace {
            let value_position = self.position();
            let value_name = self.expect_ident()?;
            let members = if self.accept(&Token::Assign)? {
                self.parse_member_names()?
            } else {
                Vec::new()
            };
            values.push(UnionValueDecl {
                name: value_name,
                members,
                position: value_position,
            });
            self.accept(&Token::Comma)?;
        }
        self.expect(&Token::RBrace)?;
        Ok(TopLevel::Union(UnionDecl {
            name,
            values,
            position,
        }))
    }

    fn parse_function_decls(&mut self) -> Result<Vec<FunctionDecl>> {
        self.expect(&Token::LBrace)?;
        let mut functions = Vec::new();
        while self.current != Token::RBrace {
            functions.push(self.parse_function_decl()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(functions)
    }

    fn parse_augment(&mut self) -> Result<TopLevel> {
        let position = self.position();
        self.advance()?;
        let target = self.parse_qualified_name()?;
        let mut with = Vec::new();
        let mut functions = Vec::new();
        if self.accept(&Token::With)? {
            loop {
                with.push(self.parse_qualified_name()?);
                if !self.accept(&Token::Comma)? {
                    break;
                }
            }
        } else {
            functions = self.parse_function_decls()?;
        }
        Ok(TopLevel::Augment(AugmentDecl {
            target,
            functions,
            with,
            position,
        }))
    }

    fn parse_augmentation(&mut self) -> Result<TopLevel> {
        let position = self.position();
        self.advance()?;
        let name = self.expect_ident()?;
        self.expect(&Token::Assign)?;
        let functions = self.parse_function_decls()?;
        Ok(TopLevel::Augmentation(AugmentationDecl {
            name,
            functions,
            position,
        }))
    }

    // ========================================================================
    // Statements
    // ========================================================================

    fn parse_block(&mut self) -> Result<BlockNode> {
        let position = self.position();
        self.expect(&Token::LBrace)?;
        let mut statements = Vec::new();
        while self.current != Token::RBrace {
            if self.current == Token::Eof {
                return Err(self.error("Unexpected end of input in block".to_string()));
            }
            statements.push(self.parse_statement()?);
        }
        self.expect(&Token::RBrace)?;
        Ok(BlockNode {
            statements,
            position,
        })
    }

    fn parse_statement(&mut self) -> Result<Statement> {
        let position = self.position();
        match &self.current {
            Token::Let | Token::Var => Ok(Statement::Let(self.parse_let_or_var()?)),
            Token::If => Ok(Statement::If(self.parse_if()?)),
            Token::While => {
                self.advance()?;
                let condition = self.parse_expression()?;
                let body = self.parse_block()?;
                Ok(Statement::While {
                    condition,
                    body,
                    position,
                })
            }
            Token::For => self.parse_for(),
            Token::Return => {
                self.advance()?;
                let value = if self.current == Token::RBrace || self.line != self.last_line {
                    None
                } else {
                    Some(self.parse_expression()?)
                };
                Ok(Statement::Return { value, position })
            }
            Token::Throw => {
                self.advance()?;
                let value = self.parse_expression()?;
                Ok(Statement::Throw { value, position })
            }
            Token::Break => {
                self.advance()?;
                Ok(Statement::Break(position))
            }
            Token::Continue => {
                self.advance()?;
                Ok(Statement::Continue(position))
            }
            Token::Try => self.parse_try(),
            _ => self.parse_simple_statement(),
        }
    }

    /// An assignment or an invocation used as a statement.
    fn parse_simple_statement(&mut self) -> Result<Statement> {
        let position = self.position();
        let expression = self.parse_expression()?;
        if self.current == Token::Assign {
            return match expression {
                Expression::Reference { name, .. } => {
                    self.advance()?;
                    let value = self.parse_expression()?;
                    Ok(Statement::Assign {
                        name,
                        value,
                        position,
                    })
                }
                _ => Err(self.error("Invalid assignment target".to_string())),
            };
        }
        if expression.is_invocation() {
            Ok(Statement::Expression(expression))
        } else {
            Err(ParseError {
                message: "Only invocations may be used as statements".to_string(),
                line: position.line,
                column: position.column,
            })
        }
    }

    fn parse_if(&mut self) -> Result<IfNode> {
        let position = self.position();
        self.expect(&Token::If)?;
        let condition = self.parse_expression()?;
        let then = self.parse_block()?;
        let otherwise = if self.accept(&Token::Else)? {
            if self.current == Token::If {
                Some(ElseNode::If(Box::new(self.parse_if()?)))
            } else {
                Some(ElseNode::Block(self.parse_block()?))
            }
        } else {
            None
        };
        Ok(IfNode {
            condition,
            then,
            otherwise,
            position,
        })
    }

    fn parse_for(&mut self) -> Result<Statement> {
        let position = self.position();
        self.advance()?;
        self.expect(&Token::LParen)?;
        if !matches!(self.current, Token::Let | Token::Var) {
            return Err(self.error("A for loop must start with 'var' or 'let'".to_string()));
        }
        let init = self.parse_let_or_var()?;
        self.expect(&Token::Comma)?;
        let condition = self.parse_expression()?;
        self.expect(&Token::Comma)?;
        let post = Box::new(self.parse_simple_statement()?);
        self.expect(&Token::RParen)?;
        let body = self.parse_block()?;
        Ok(Statement::For {
            init,
            condition,
            post,
            body,
            position,
        })
    }

    fn parse_try(&mut self) -> Result<Statement> {
        let position = self.position();
        self.advance()?;
        let body = self.parse_block()?;
        let catch = if self.current == Token::Catch {
            let catch_position = self.position();
            self.advance()?;
            self.expect(&Token::LParen)?;
            let name = self.expect_ident()?;
            self.expect(&Token::RParen)?;
            Some(CatchNode {
                name,
                body: self.parse_block()?,
                position: catch_position,
            })
        } else {
            None
        };
        let finally = if self.accept(&Token::Finally)? {
            Some(self.parse_block()?)
        } else {
            None
        };
        if catch.is_none() && finally.is_none() {
            return Err(self.error("Expected 'catch' or 'finally' after try block".to_string()));
        }
        Ok(Statement::Try(TryNode {
            body,
            catch,
            finally,
            position,
        }))
    }

    // ========================================================================
    // Expressions
    // ========================================================================

    pub(crate) fn parse_expression(&mut self) -> Result<Expression> {
        self.parse_level(0)
    }

    /// Operator levels from loosest to tightest binding.
    fn level_operator(level: usize, token: &Token) -> Option<BinaryOp> {
        match (level, token) {
            (0, Token::OrIfNull) => Some(BinaryOp::OrIfNull),
            (1, Token::Or) => Some(BinaryOp::Or),
            (2, Token::And) => Some(BinaryOp::And),
            (3, Token::EqEq) => Some(BinaryOp::Equals),
            (3, Token::NotEq) => Some(BinaryOp::NotEquals),
            (3, Token::Less) => Some(BinaryOp::Less),
            (3, Token::LessEq) => Some(BinaryOp::LessOrEquals),
            (3, Token::More) => Some(BinaryOp::More),
            (3, Token::MoreEq) => Some(BinaryOp::MoreOrEquals),
            (3, Token::Is) => Some(BinaryOp::Is),
            (3, Token::Isnt) => Some(BinaryOp::Isnt),
            (3, Token::OfType) => Some(BinaryOp::OfType),
            (4, Token::Plus) => Some(BinaryOp::Plus),
            (4, Token::Minus) => Some(BinaryOp::Minus),
            (5, Token::Star) => Some(BinaryOp::Times),
            (5, Token::Slash) => Some(BinaryOp::Divide),
            (5, Token::Percent) => Some(BinaryOp::Modulo),
            _ => None,
        }
    }

    const LEVELS: usize = 6;

    fn parse_level(&mut self, level: usize) -> Result<Expression> {
        if level == Self::LEVELS {
            return self.parse_unary();
        }
        let first = self.parse_level(level + 1)?;
        let mut operands = vec![first];
        let mut operators = Vec::new();
        while let Some(op) = Self::level_operator(level, &self.current) {
            let position = self.position();
            self.advance()?;
            operators.push((op, position));
            operands.push(self.parse_level(level + 1)?);
        }
        if operators.is_empty() {
            Ok(operands.remove(0))
        } else {
            Ok(Expression::Operators {
                operands,
                operators,
            })
        }
    }

    fn parse_unary(&mut self) -> Result<Expression> {
        let position = self.position();
        match &self.current {
            Token::Not => {
                self.advance()?;
                let operand = self.parse_unary()?;
                Ok(Expression::Not {
                    operand: Box::new(operand),
                    position,
                })
            }
            Token::Minus => {
                self.advance()?;
                let value = match self.advance()? {
                    Token::Int(n) => int_literal(-n),
                    Token::Long(n) => Literal::Long(-n),
                    Token::BigInt(n) => Literal::BigInteger(-n),
                    Token::Float(n) => Literal::Float(-n),
                    Token::Double(n) => Literal::Double(-n),
                    Token::Decimal(s) => Literal::Decimal(format!("-{}", s)),
                    other => {
                        return Err(ParseError {
                            message: format!("Expected a number after '-', found '{}'", other),
                            line: position.line,
                            column: position.column,
                        });
                    }
                };
                self.parse_suffixes(Expression::Literal { value, position })
            }
            _ => {
                let primary = self.parse_primary()?;
                self.parse_suffixes(primary)
            }
        }
    }

    fn parse_suffixes(&mut self, target: Expression) -> Result<Expression> {
        let mut suffixes = Vec::new();
        loop {
            let position = self.position();
            match &self.current {
                Token::Colon | Token::ElvisColon => {
                    let null_safe = self.advance()? == Token::ElvisColon;
                    let name = self.expect_ident()?;
                    let arguments = self.parse_arguments()?;
                    suffixes.push(Suffix::MethodCall {
                        name,
                        arguments,
                        null_safe,
                        position,
                    });
                }
                Token::LParen if self.line == self.last_line => {
                    let arguments = self.parse_arguments()?;
                    suffixes.push(Suffix::AnonymousCall {
                        arguments,
                        position,
                    });
                }
                _ => break,
            }
        }
        if suffixes.is_empty() {
            Ok(target)
        } else {
            Ok(Expression::Postfix {
                target: Box::new(target),
                suffixes,
            })
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expression>> {
        self.expect(&Token::LParen)?;
        let mut arguments = Vec::new();
        while self.current != Token::RParen {
            arguments.push(self.parse_expression()?);
            if !self.accept(&Token::Comma)? {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        Ok(arguments)
    }

    fn parse_primary(&mut self) -> Result<Expression> {
        let position = self.position();
        let literal = |value| Ok(Expression::Literal { value, position });
        match self.current.clone() {
            Token::Null => {
                self.advance()?;
                literal(Literal::Null)
            }
            Token::True => {
                self.advance()?;
                literal(Literal::Bool(true))
            }
            Token::False => {
                self.advance()?;
                literal(Literal::Bool(false))
            }
            Token::Int(n) => {
                self.advance()?;
                literal(int_literal(n))
            }
            Token::Long(n) => {
                self.advance()?;
                literal(Literal::Long(n))
            }
            Token::BigInt(n) => {
                self.advance()?;
                literal(Literal::BigInteger(n))
            }
            Token::Float(n) => {
                self.advance()?;
                literal(Literal::Float(n))
            }
            Token::Double(n) => {
                self.advance()?;
                literal(Literal::Double(n))
            }
            Token::Decimal(s) => {
                self.advance()?;
                literal(Literal::Decimal(s))
            }
            Token::Char(c) => {
                self.advance()?;
                literal(Literal::Char(c))
            }
            Token::String(s) => {
                self.advance()?;
                literal(Literal::String(s))
            }
            Token::LParen => {
                self.advance()?;
                let inner = self.parse_expression()?;
                self.expect(&Token::RParen)?;
                Ok(inner)
            }
            Token::Pipe | Token::Arrow => Ok(Expression::Closure(self.parse_function_literal(false)?)),
            Token::Caret => {
                self.advance()?;
                let first = self.parse_qualified_name()?;
                if self.accept(&Token::DoubleColon)? {
                    let name = self.expect_ident()?;
                    Ok(Expression::FunctionRef {
                        module: Some(first),
                        name,
                        position,
                    })
                } else {
                    Ok(Expression::FunctionRef {
                        module: None,
                        name: first,
                        position,
                    })
                }
            }
            Token::LBracket => {
                let items = self.parse_collection_items(CollectionKind::Tuple)?;
                Ok(Expression::Collection {
                    kind: CollectionKind::Tuple,
                    items,
                    position,
                })
            }
            Token::Ident(name) => {
                self.advance()?;
                if let Some(kind) = CollectionKind::from_keyword(&name)
                    && self.current == Token::LBracket
                {
                    let items = self.parse_collection_items(kind)?;
                    return Ok(Expression::Collection {
                        kind,
                        items,
                        position,
                    });
                }
                self.parse_name_expression(name, position)
            }
            other => Err(self.error(format!("Unexpected '{}' in expression", other))),
        }
    }

    /// A name: reference, invocation (possibly qualified) or class literal.
    fn parse_name_expression(&mut self, first: String, position: Position) -> Result<Expression> {
        let mut segments = vec![first];
        while self.current == Token::Dot {
            self.advance()?;
            segments.push(self.expect_ident()?);
        }

        let constant = self.current == Token::Bang && self.line == self.last_line;
        if constant {
            self.advance()?;
            if self.current != Token::LParen {
                return Err(self.error("Expected '(' after '!'".to_string()));
            }
        }
        if self.current == Token::LParen && self.line == self.last_line {
            let arguments = self.parse_arguments()?;
            return Ok(Expression::Invocation {
                name: segments.join("."),
                arguments,
                constant,
                position,
            });
        }

        if segments.len() > 1 && segments.last().is_some_and(|s| s == "class") {
            segments.pop();
            return Ok(Expression::ClassLiteral {
                name: segments.join("."),
                position,
            });
        }

        if segments.len() == 1 {
            Ok(Expression::Reference {
                name: segments.remove(0),
                position,
            })
        } else {
            Err(ParseError {
                message: format!("Unexpected qualified name '{}'", segments.join(".")),
                line: position.line,
                column: position.column,
            })
        }
    }

    /// Parses `[a, b, ...]`. Map entries are `[key, value]` pairs and are
    /// flattened into alternating keys and values.
    fn parse_collection_items(&mut self, kind: CollectionKind) -> Result<Vec<Expression>> {
        self.expect(&Token::LBracket)?;
        let mut items = Vec::new();
        while self.current != Token::RBracket {
            if kind == CollectionKind::Map {
                self.expect(&Token::LBracket)?;
                items.push(self.parse_expression()?);
                self.expect(&Token::Comma)?;
                items.push(self.parse_expression()?);
                self.expect(&Token::RBracket)?;
            } else {
                items.push(self.parse_expression()?);
            }
            if !self.accept(&Token::Comma)? {
                break;
            }
        }
        self.expect(&Token::RBracket)?;
        Ok(items)
    }
}

fn int_literal(n: i64) -> Literal {
    match i32::try_from(n) {
        Ok(n) => Literal::Integer(n),
        Err(_) => Literal::Long(n),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn parse(s: &str) -> CompilationUnit {
        Parser::parse_str(s).unwrap()
    }

    fn parse_expr(s: &str) -> Expression {
        Parser::new(s).unwrap().parse_expression().unwrap()
    }

    fn function_body(unit: &CompilationUnit, index: usize) -> &FunctionLiteral {
        match &unit.items[index] {
            TopLevel::Function(decl) => &decl.function,
            other => panic!("expected a function, got {:?}", other),
        }
    }

    #[test]
    fn test_module_and_imports() {
        let unit = parse("module hello.World\nimport java.util\nimport gololang.Errors\n");
        assert_eq!(unit.module.name, "hello.World");
        let imports: Vec<_> = unit.imports.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(imports, vec!["java.util", "gololang.Errors"]);
        assert!(unit.items.is_empty());
    }

    #[test]
    fn test_function_forms() {
        let unit = parse(
            "module m\n\
             function add = |a, b| -> a + b\n\
             local function noop = { return }\n\
             function answer = -> 42\n\
             function all = |xs...| -> xs\n",
        );
        let add = function_body(&unit, 0);
        assert_eq!(add.parameters, vec!["a", "b"]);
        assert!(matches!(add.body, FunctionBody::Compact(_)));
        match &unit.items[1] {
            TopLevel::Function(decl) => {
                assert!(decl.local);
                assert!(decl.function.parameters.is_empty());
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(function_body(&unit, 2).parameters.is_empty());
        assert!(function_body(&unit, 3).varargs);
    }

    #[test]
    fn test_operator_chain_is_flat() {
        match parse_expr("1 + 2 - 3") {
            Expression::Operators {
                operands,
                operators,
            } => {
                assert_eq!(operands.len(), 3);
                let ops: Vec<_> = operators.iter().map(|(op, _)| *op).collect();
                assert_eq!(ops, vec![BinaryOp::Plus, BinaryOp::Minus]);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_precedence() {
        match parse_expr("a or b and c") {
            Expression::Operators {
                operands,
                operators,
            } => {
                assert_eq!(operators[0].0, BinaryOp::Or);
                assert!(matches!(operands[1], Expression::Operators { .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_method_chain_and_anonymous_call() {
        match parse_expr("adder(10)(5): toString()?: length()") {
            Expression::Postfix { target, suffixes } => {
                assert!(matches!(*target, Expression::Invocation { ref name, .. } if name == "adder"));
                assert_eq!(suffixes.len(), 3);
                assert!(matches!(suffixes[0], Suffix::AnonymousCall { .. }));
                assert!(matches!(
                    suffixes[1],
                    Suffix::MethodCall { null_safe: false, .. }
                ));
                assert!(matches!(
                    suffixes[2],
                    Suffix::MethodCall { null_safe: true, .. }
                ));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_paren_on_next_line_does_not_call() {
        let err = Parser::parse_str("module m\nfunction f = {\n  let a = b\n  (c)\n}\n").unwrap_err();
        // `b` is not called with `(c)`, which is then a bare reference.
        assert_eq!(err.line, 4);
        assert!(err.message.contains("invocations"));
    }

    #[test]
    fn test_literals() {
        assert!(matches!(
            parse_expr("-5"),
            Expression::Literal {
                value: Literal::Integer(-5),
                ..
            }
        ));
        assert!(matches!(
            parse_expr("3000000000"),
            Expression::Literal {
                value: Literal::Long(3_000_000_000),
                ..
            }
        ));
        assert!(matches!(
            parse_expr("String.class"),
            Expression::ClassLiteral { ref name, .. } if name == "String"
        ));
        assert!(matches!(
            parse_expr("^a.b::foo"),
            Expression::FunctionRef { module: Some(ref m), ref name, .. } if m == "a.b" && name == "foo"
        ));
    }

    #[test]
    fn test_collections() {
        match parse_expr("map[[1, 2], [3, 4]]") {
            Expression::Collection { kind, items, .. } => {
                assert_eq!(kind, CollectionKind::Map);
                assert_eq!(items.len(), 4);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            parse_expr("[1, 2]"),
            Expression::Collection {
                kind: CollectionKind::Tuple,
                ..
            }
        ));
        assert!(matches!(
            parse_expr("list[]"),
            Expression::Collection {
                kind: CollectionKind::List,
                ..
            }
        ));
    }

    #[test]
    fn test_statements() {
        let unit = parse(
            "module m\n\
             function f = |x| {\n\
               var total = 0\n\
               for (var i = 0, i < x, i = i + 1) {\n\
                 if i == 2 { continue } else if i == 5 { break } else { total = total + i }\n\
               }\n\
               while total > 100 { total = total - 1 }\n\
               try { raise(\"boom\") } catch (e) { println(e) } finally { println(\"done\") }\n\
               return total\n\
             }\n",
        );
        match &function_body(&unit, 0).body {
            FunctionBody::Block(block) => {
                assert_eq!(block.statements.len(), 5);
                assert!(matches!(block.statements[1], Statement::For { .. }));
                assert!(matches!(block.statements[3], Statement::Try(_)));
                assert!(matches!(block.statements[4], Statement::Return { value: Some(_), .. }));
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_struct_union_augment() {
        let unit = parse(
            "module m\n\
             struct Point = { x, y }\n\
             union Shape = {\n  Circle = { radius }\n  Square = { side }\n  Empty\n}\n\
             augment String { function shout = |this| -> this: toUpperCase() }\n\
             augmentation Loud = { function loud = |this| -> this }\n\
             augment Point with Loud\n",
        );
        assert!(matches!(&unit.items[0], TopLevel::Struct(s) if s.members == vec!["x", "y"]));
        assert!(matches!(&unit.items[1], TopLevel::Union(u) if u.values.len() == 3));
        assert!(matches!(&unit.items[2], TopLevel::Augment(a) if a.functions.len() == 1));
        assert!(matches!(&unit.items[3], TopLevel::Augmentation(a) if a.name == "Loud"));
        assert!(matches!(&unit.items[4], TopLevel::Augment(a) if a.with == vec!["Loud"]));
    }

    #[test]
    fn test_non_invocation_statement_is_rejected() {
        let err = Parser::parse_str("module m\nfunction f = {\n  1 + 2\n}\n").unwrap_err();
        assert_eq!(err.line, 3);
        assert!(err.message.contains("invocations"));
    }

    #[test]
    fn test_missing_module_is_an_error() {
        let err = Parser::parse_str("function f = -> 1").unwrap_err();
        assert_eq!((err.line, err.column), (1, 1));
    }

    #[test]
    fn test_reinit_reuses_parser() {
        let mut parser = Parser::new("module a").unwrap();
        assert_eq!(parser.parse_compilation_unit().unwrap().module.name, "a");
        parser.reinit("module b.c").unwrap();
        assert_eq!(parser.parse_compilation_unit().unwrap().module.name, "b.c");
    }

    #[test]
    fn test_constant_invocation() {
        match parse_expr("config!(1)") {
            Expression::Invocation {
                name, constant, ..
            } => {
                assert_eq!(name, "config");
                assert!(constant);
            }
            other => panic!("expected an invocation, got {:?}", other),
        }
        assert!(matches!(
            parse_expr("config(1)"),
            Expression::Invocation { constant: false, .. }
        ));
        assert!(Parser::new("a != b").unwrap().parse_expression().is_ok());
    }

    proptest! {
        #[test]
        fn prop_same_level_chain_stays_flat(
            terms in proptest::collection::vec((0u16..1000, any::<bool>()), 2..8)
        ) {
            let mut source = terms[0].0.to_string();
            for (value, plus) in &terms[1..] {
                source.push_str(if *plus { " + " } else { " - " });
                source.push_str(&value.to_string());
            }
            match parse_expr(&source) {
                Expression::Operators { operands, operators } => {
                    prop_assert_eq!(operands.len(), terms.len());
                    for ((op, _), (_, plus)) in operators.iter().zip(&terms[1..]) {
                        let expected = if *plus { BinaryOp::Plus } else { BinaryOp::Minus };
                        prop_assert_eq!(*op, expected);
                    }
                    for (operand, (value, _)) in operands.iter().zip(&terms) {
                        let is_value = matches!(
                            operand,
                            Expression::Literal { value: Literal::Integer(n), .. } if *n == i32::from(*value)
                        );
                        prop_assert!(is_value, "unexpected operand {:?}", operand);
                    }
                }
                other => prop_assert!(false, "unexpected {:?}", other),
            }
        }
    }
}
