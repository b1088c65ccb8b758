// golo-parser - Lexer for Golo
// Copyright (c) 2025 Tom Waddington. MIT licensed.

//! Lexer (tokeniser) for Golo source code.
//!
//! Converts a source string into a stream of tokens. Every token remembers
//! the line and column it started at, which the parser uses both for
//! positions and to decide whether a `(` continues the previous expression.

use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use num_bigint::BigInt;
use thiserror::Error;

/// A token produced by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    // Delimiters
    LParen,      // (
    RParen,      // )
    LBracket,    // [
    RBracket,    // ]
    LBrace,      // {
    RBrace,      // }
    Pipe,        // |
    Comma,       // ,
    Arrow,       // ->
    Colon,       // :
    ElvisColon,  // ?:
    Dot,         // .
    DoubleColon, // ::
    Caret,       // ^
    Ellipsis,    // ...
    Assign,      // =
    Bang,        // !

    // Operators
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    EqEq,
    NotEq,
    Less,
    LessEq,
    More,
    MoreEq,

    // Keywords
    Module,
    Import,
    Function,
    Local,
    Let,
    Var,
    Return,
    If,
    Else,
    While,
    For,
    Break,
    Continue,
    Throw,
    Try,
    Catch,
    Finally,
    Struct,
    Union,
    Augment,
    Augmentation,
    With,
    And,
    Or,
    Not,
    Is,
    Isnt,
    OfType,
    OrIfNull,

    // Literals
    Null,
    True,
    False,
    Int(i64),
    Long(i64),
    BigInt(BigInt),
    Float(f32),
    Double(f64),
    Decimal(String),
    Char(char),
    String(String),
    Ident(String),

    // Special
    Eof,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Pipe => write!(f, "|"),
            Token::Comma => write!(f, ","),
            Token::Arrow => write!(f, "->"),
            Token::Colon => write!(f, ":"),
            Token::ElvisColon => write!(f, "?:"),
            Token::Dot => write!(f, "."),
            Token::DoubleColon => write!(f, "::"),
            Token::Caret => write!(f, "^"),
            Token::Ellipsis => write!(f, "..."),
            Token::Assign => write!(f, "="),
            Token::Bang => write!(f, "!"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::Less => write!(f, "<"),
            Token::LessEq => write!(f, "<="),
            Token::More => write!(f, ">"),
            Token::MoreEq => write!(f, ">="),
            Token::Int(n) => write!(f, "{}", n),
            Token::Long(n) => write!(f, "{}_L", n),
            Token::BigInt(n) => write!(f, "{}_B", n),
            Token::Float(n) => write!(f, "{}_F", n),
            Token::Double(n) => write!(f, "{}", n),
            Token::Decimal(s) => write!(f, "{}_B", s),
            Token::Char(c) => write!(f, "'{}'", c),
            Token::String(s) => write!(f, "\"{}\"", s),
            Token::Ident(s) => write!(f, "{}", s),
            Token::Eof => write!(f, "EOF"),
            keyword => match keyword_text(keyword) {
                Some(text) => write!(f, "{}", text),
                None => write!(f, "{:?}", keyword),
            },
        }
    }
}

const KEYWORDS: &[(&str, Token)] = &[
    ("module", Token::Module),
    ("import", Token::Import),
    ("function", Token::Function),
    ("local", Token::Local),
    ("let", Token::Let),
    ("var", Token::Var),
    ("return", Token::Return),
    ("if", Token::If),
    ("else", Token::Else),
    ("while", Token::While),
    ("for", Token::For),
    ("break", Token::Break),
    ("continue", Token::Continue),
    ("throw", Token::Throw),
    ("try", Token::Try),
    ("catch", Token::Catch),
    ("finally", Token::Finally),
    ("struct", Token::Struct),
    ("union", Token::Union),
    ("augment", Token::Augment),
    ("augmentation", Token::Augmentation),
    ("with", Token::With),
    ("and", Token::And),
    ("or", Token::Or),
    ("not", Token::Not),
    ("is", Token::Is),
    ("isnt", Token::Isnt),
    ("oftype", Token::OfType),
    ("orIfNull", Token::OrIfNull),
    ("null", Token::Null),
    ("true", Token::True),
    ("false", Token::False),
];

fn keyword_text(token: &Token) -> Option<&'static str> {
    KEYWORDS
        .iter()
        .find(|(_, t)| t == token)
        .map(|(text, _)| *text)
}

/// Lexer error with position information.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Lexer error at {line}:{column}: {message}")]
pub struct LexerError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

/// The lexer converts source code into tokens.
pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    line: usize,
    column: usize,
    token_line: usize,
    token_column: usize,
}

impl<'a> Lexer<'a> {
    /// Create a new lexer for the given source code.
    pub fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
            token_line: 1,
            token_column: 1,
        }
    }

    /// Get the next token from the source.
    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace_and_comments();
        self.token_line = self.line;
        self.token_column = self.column;

        let c = match self.peek() {
            Some(c) => c,
            None => return Ok(Token::Eof),
        };

        match c {
            '(' => self.single(Token::LParen),
            ')' => self.single(Token::RParen),
            '[' => self.single(Token::LBracket),
            ']' => self.single(Token::RBracket),
            '{' => self.single(Token::LBrace),
            '}' => self.single(Token::RBrace),
            '|' => self.single(Token::Pipe),
            ',' => self.single(Token::Comma),
            '^' => self.single(Token::Caret),
            '+' => self.single(Token::Plus),
            '*' => self.single(Token::Star),
            '/' => self.single(Token::Slash),
            '%' => self.single(Token::Percent),
            '-' => {
                self.advance();
                if self.peek() == Some('>') {
                    self.advance();
                    Ok(Token::Arrow)
                } else {
                    Ok(Token::Minus)
                }
            }
            ':' => {
                self.advance();
                if self.peek() == Some(':') {
                    self.advance();
                    Ok(Token::DoubleColon)
                } else {
                    Ok(Token::Colon)
                }
            }
            '?' => {
                self.advance();
                if self.peek() == Some(':') {
                    self.advance();
                    Ok(Token::ElvisColon)
                } else {
                    Err(self.error("Expected ':' after '?'".to_string()))
                }
            }
            '.' => {
                self.advance();
                if self.peek() == Some('.') {
                    self.advance();
                    if self.peek() == Some('.') {
                        self.advance();
                        return Ok(Token::Ellipsis);
                    }
                    return Err(self.error("Unexpected '..'".to_string()));
                }
                Ok(Token::Dot)
            }
            '=' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::EqEq)
                } else {
                    Ok(Token::Assign)
                }
            }
            '!' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::NotEq)
                } else {
                    Ok(Token::Bang)
                }
            }
            '<' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::LessEq)
                } else {
                    Ok(Token::Less)
                }
            }
            '>' => {
                self.advance();
                if self.peek() == Some('=') {
                    self.advance();
                    Ok(Token::MoreEq)
                } else {
                    Ok(Token::More)
                }
            }

            '"' => self.read_string(),
            '\'' => self.read_char(),
            '0'..='9' => self.read_number(),
            _ if is_ident_start(c) => Ok(self.read_ident()),

            _ => Err(self.error(format!("Unexpected character: '{}'", c))),
        }
    }

    /// Collect all tokens into a vector.
    pub fn tokenize(&mut self) -> Result<Vec<Token>, LexerError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            if matches!(token, Token::Eof) {
                break;
            }
            tokens.push(token);
        }
        Ok(tokens)
    }

    /// Line of the most recently returned token (1-indexed).
    pub fn token_line(&self) -> usize {
        self.token_line
    }

    /// Column of the most recently returned token (1-indexed).
    pub fn token_column(&self) -> usize {
        self.token_column
    }

    // ========================================================================
    // Internal helpers
    // ========================================================================

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn peek_second(&self) -> Option<char> {
        let mut ahead = self.chars.clone();
        ahead.next();
        ahead.next()
    }

    fn advance(&mut self) -> Option<char> {
        let c = self.chars.next();
        if let Some(ch) = c {
            if ch == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
        c
    }

    fn single(&mut self, token: Token) -> Result<Token, LexerError> {
        self.advance();
        Ok(token)
    }

    fn error(&self, message: String) -> LexerError {
        LexerError {
            message,
            line: self.token_line,
            column: self.token_column,
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('#') => {
                    // Skip to end of line
                    while let Some(c) = self.peek() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                _ => break,
            }
        }
    }

    fn read_string(&mut self) -> Result<Token, LexerError> {
        self.advance(); // consume opening "
        if self.peek() == Some('"') && self.peek_second() == Some('"') {
            self.advance();
            self.advance();
            return self.read_text_block();
        }
        if self.peek() == Some('"') {
            self.advance();
            return Ok(Token::String(String::new()));
        }

        let mut s = String::new();
        loop {
            match self.advance() {
                Some('"') => break,
                Some('\\') => s.push(self.read_escape()?),
                Some('\n') | None => return Err(self.error("Unterminated string".to_string())),
                Some(c) => s.push(c),
            }
        }
        Ok(Token::String(s))
    }

    /// Triple-quoted strings are raw: no escapes, newlines kept.
    fn read_text_block(&mut self) -> Result<Token, LexerError> {
        let mut s = String::new();
        loop {
            match self.advance() {
                Some('"') if self.peek() == Some('"') && self.peek_second() == Some('"') => {
                    self.advance();
                    self.advance();
                    return Ok(Token::String(s));
                }
                Some(c) => s.push(c),
                None => return Err(self.error("Unterminated text block".to_string())),
            }
        }
    }

    fn read_escape(&mut self) -> Result<char, LexerError> {
        match self.advance() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('"') => Ok('"'),
            Some('\'') => Ok('\''),
            Some('u') => self.read_unicode_escape(),
            Some(c) => Err(self.error(format!("Unknown escape sequence: \\{}", c))),
            None => Err(self.error("Unterminated escape sequence".to_string())),
        }
    }

    fn read_unicode_escape(&mut self) -> Result<char, LexerError> {
        let mut hex = String::with_capacity(4);
        for _ in 0..4 {
            match self.advance() {
                Some(c) if c.is_ascii_hexdigit() => hex.push(c),
                _ => return Err(self.error("Invalid unicode escape".to_string())),
            }
        }
        u32::from_str_radix(&hex, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(format!("Invalid unicode escape: \\u{}", hex)))
    }

    fn read_char(&mut self) -> Result<Token, LexerError> {
        self.advance(); // consume opening '
        let c = match self.advance() {
            Some('\\') => self.read_escape()?,
            Some('\'') | None => return Err(self.error("Empty character literal".to_string())),
            Some(c) => c,
        };
        if self.advance() != Some('\'') {
            return Err(self.error("Unterminated character literal".to_string()));
        }
        Ok(Token::Char(c))
    }

    fn read_digits(&mut self, into: &mut String) {
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                into.push(c);
                self.advance();
            } else if c == '_' && self.peek_second().is_some_and(|n| n.is_ascii_digit()) {
                self.advance();
            } else {
                break;
            }
        }
    }

    fn read_number(&mut self) -> Result<Token, LexerError> {
        let mut text = String::new();
        self.read_digits(&mut text);

        let mut floating = false;
        if self.peek() == Some('.') && self.peek_second().is_some_and(|c| c.is_ascii_digit()) {
            floating = true;
            text.push('.');
            self.advance();
            self.read_digits(&mut text);
        }
        if matches!(self.peek(), Some('e') | Some('E')) {
            floating = true;
            text.push('e');
            self.advance();
            if let Some(sign @ ('+' | '-')) = self.peek() {
                text.push(sign);
                self.advance();
            }
            self.read_digits(&mut text);
        }

        let suffix = if self.peek() == Some('_')
            && matches!(self.peek_second(), Some('L') | Some('B') | Some('F'))
        {
            self.advance();
            self.advance()
        } else {
            None
        };

        match (floating, suffix) {
            (false, None) => text
                .parse::<i64>()
                .map(Token::Int)
                .or_else(|_| text.parse::<BigInt>().map(Token::BigInt))
                .map_err(|_| self.error(format!("Invalid number: {}", text))),
            (false, Some('L')) => text
                .parse::<i64>()
                .map(Token::Long)
                .map_err(|_| self.error(format!("Long literal out of range: {}", text))),
            (false, Some('B')) => text
                .parse::<BigInt>()
                .map(Token::BigInt)
                .map_err(|_| self.error(format!("Invalid big integer: {}", text))),
            (_, Some('F')) => text
                .parse::<f32>()
                .map(Token::Float)
                .map_err(|_| self.error(format!("Invalid float: {}", text))),
            (true, None) => text
                .parse::<f64>()
                .map(Token::Double)
                .map_err(|_| self.error(format!("Invalid double: {}", text))),
            (true, Some('B')) => Ok(Token::Decimal(text)),
            (_, Some(other)) => Err(self.error(format!("Unknown number suffix: _{}", other))),
        }
    }

    fn read_ident(&mut self) -> Token {
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if is_ident_char(c) {
                name.push(c);
                self.advance();
            } else {
                break;
            }
        }
        KEYWORDS
            .iter()
            .find(|(text, _)| *text == name)
            .map(|(_, token)| token.clone())
            .unwrap_or(Token::Ident(name))
    }
}

fn is_ident_start(c: char) -> bool {
    c.is_alphabetic() || c == '_' || c == '$'
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_' || c == '$'
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokenize(s: &str) -> Vec<Token> {
        Lexer::new(s).tokenize().unwrap()
    }

    #[test]
    fn test_delimiters_and_operators() {
        assert_eq!(
            tokenize("( ) [ ] { } | , -> : ?: . :: ^ ... ="),
            vec![
                Token::LParen,
                Token::RParen,
                Token::LBracket,
                Token::RBracket,
                Token::LBrace,
                Token::RBrace,
                Token::Pipe,
                Token::Comma,
                Token::Arrow,
                Token::Colon,
                Token::ElvisColon,
                Token::Dot,
                Token::DoubleColon,
                Token::Caret,
                Token::Ellipsis,
                Token::Assign,
            ]
        );
        assert_eq!(
            tokenize("+ - * / % == != < <= > >="),
            vec![
                Token::Plus,
                Token::Minus,
                Token::Star,
                Token::Slash,
                Token::Percent,
                Token::EqEq,
                Token::NotEq,
                Token::Less,
                Token::LessEq,
                Token::More,
                Token::MoreEq,
            ]
        );
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            tokenize("module let var orIfNull oftype foo $bar _baz"),
            vec![
                Token::Module,
                Token::Let,
                Token::Var,
                Token::OrIfNull,
                Token::OfType,
                Token::Ident("foo".to_string()),
                Token::Ident("$bar".to_string()),
                Token::Ident("_baz".to_string()),
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(tokenize("42"), vec![Token::Int(42)]);
        assert_eq!(tokenize("1_000_000"), vec![Token::Int(1_000_000)]);
        assert_eq!(tokenize("7_L"), vec![Token::Long(7)]);
        assert_eq!(tokenize("7_B"), vec![Token::BigInt(BigInt::from(7))]);
        assert_eq!(tokenize("1.5_F"), vec![Token::Float(1.5)]);
        assert_eq!(tokenize("2.25"), vec![Token::Double(2.25)]);
        assert_eq!(tokenize("1e3"), vec![Token::Double(1000.0)]);
        assert_eq!(tokenize("1.5_B"), vec![Token::Decimal("1.5".to_string())]);
    }

    #[test]
    fn test_huge_integer_becomes_big() {
        let tokens = tokenize("123456789012345678901234567890");
        assert!(matches!(tokens[0], Token::BigInt(_)));
    }

    #[test]
    fn test_strings_and_chars() {
        assert_eq!(
            tokenize(r#""hello\nworld""#),
            vec![Token::String("hello\nworld".to_string())]
        );
        assert_eq!(tokenize(r#""""#), vec![Token::String(String::new())]);
        assert_eq!(
            tokenize("\"\"\"raw\\n\nblock\"\"\""),
            vec![Token::String("raw\\n\nblock".to_string())]
        );
        assert_eq!(tokenize("'a'"), vec![Token::Char('a')]);
        assert_eq!(tokenize(r"'\n'"), vec![Token::Char('\n')]);
    }

    #[test]
    fn test_comments_are_skipped() {
        assert_eq!(
            tokenize("# a comment\nfoo # trailing\n"),
            vec![Token::Ident("foo".to_string())]
        );
    }

    #[test]
    fn test_token_positions() {
        let mut lexer = Lexer::new("let\n  x");
        lexer.next_token().unwrap();
        assert_eq!((lexer.token_line(), lexer.token_column()), (1, 1));
        lexer.next_token().unwrap();
        assert_eq!((lexer.token_line(), lexer.token_column()), (2, 3));
    }

    #[test]
    fn test_errors() {
        assert!(Lexer::new("\"unterminated").tokenize().is_err());
        assert!(Lexer::new("?").tokenize().is_err());
        let err = Lexer::new("  @").tokenize().unwrap_err();
        assert_eq!((err.line, err.column), (1, 3));
    }
}
