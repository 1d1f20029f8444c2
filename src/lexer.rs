//! Lexer for the expression specification language using logos
//!
//! Supports tokens like:
//! - Declarations: number, vector, matrix, const, expr, main
//! - Loops: for, in, sum, product
//! - Math functions: abs, sqrt, sin, cos, tan, cot, ln, norm, transpose
//! - Operators: + - * / ^ . # = '
//! - Punctuation: ( ) [ ] , :
//! - Identifiers, integers and floating point numbers
//!
//! Line comments (`// ...`) and block comments (`/* ... */`) are discarded,
//! but the newlines they contain still advance the line counter.

use logos::{FilterResult, Logos, Skip};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::warn;

use crate::error::{CompileError, CompileResult};

fn newline(lex: &mut logos::Lexer<Token>) -> Skip {
    lex.extras += 1;
    Skip
}

/// Consumes a block comment up to its closing `*/`. An unterminated comment
/// swallows the rest of the input and reports an error at its opening `/`.
fn block_comment(lex: &mut logos::Lexer<Token>) -> FilterResult<(), ()> {
    let rest = lex.remainder();
    match rest.find("*/") {
        Some(end) => {
            lex.extras += rest[..end].matches('\n').count();
            lex.bump(end + 2);
            FilterResult::Skip
        }
        None => {
            lex.bump(rest.len());
            FilterResult::Error(())
        }
    }
}

/// Token types for the expression specification language
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(extras = usize)]
#[logos(skip r"[ \t\r\f]+")]
pub enum Token {
    #[regex(r"\n", newline)]
    Newline,

    #[token("/*", block_comment)]
    BlockComment,

    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    // Type keywords
    #[token("number")]
    Number,

    #[token("vector")]
    Vector,

    #[token("matrix")]
    Matrix,

    #[token("const")]
    Const,

    #[token("expr")]
    Expr,

    #[token("main")]
    Main,

    // Usage modifiers
    #[token("nodiff")]
    NoDiff,

    #[token("equivalent")]
    Equivalent,

    // Loop keywords
    #[token("for")]
    For,

    #[token("in")]
    In,

    #[token("sum")]
    Sum,

    #[token("product")]
    Product,

    // Math functions
    #[token("abs")]
    Abs,

    #[token("sqrt")]
    Sqrt,

    #[token("sin")]
    Sin,

    #[token("cos")]
    Cos,

    #[token("tan")]
    Tan,

    #[token("cot")]
    Cot,

    #[token("ln")]
    Ln,

    #[token("norm")]
    Norm,

    #[token("transpose")]
    Transpose,

    // Operators
    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("^")]
    Caret,

    #[token(".")]
    Dot,

    #[token("#")]
    Hash,

    #[token("=")]
    Equals,

    #[token("'")]
    Apostrophe,

    // Punctuation
    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token(",")]
    Comma,

    #[token(":")]
    Colon,

    // Literals and identifiers
    #[regex(r"[0-9]+(\.[0-9]*([eE][+-]?[0-9]+)?|[eE][+-]?[0-9]+)", |lex| lex.slice().parse::<f64>().ok())]
    Double(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Integer(i64),

    #[regex(r"[A-Za-z_][A-Za-z_0-9]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Newline => write!(f, "\\n"),
            Token::BlockComment | Token::LineComment => write!(f, "comment"),
            Token::Number => write!(f, "number"),
            Token::Vector => write!(f, "vector"),
            Token::Matrix => write!(f, "matrix"),
            Token::Const => write!(f, "const"),
            Token::Expr => write!(f, "expr"),
            Token::Main => write!(f, "main"),
            Token::NoDiff => write!(f, "nodiff"),
            Token::Equivalent => write!(f, "equivalent"),
            Token::For => write!(f, "for"),
            Token::In => write!(f, "in"),
            Token::Sum => write!(f, "sum"),
            Token::Product => write!(f, "product"),
            Token::Abs => write!(f, "abs"),
            Token::Sqrt => write!(f, "sqrt"),
            Token::Sin => write!(f, "sin"),
            Token::Cos => write!(f, "cos"),
            Token::Tan => write!(f, "tan"),
            Token::Cot => write!(f, "cot"),
            Token::Ln => write!(f, "ln"),
            Token::Norm => write!(f, "norm"),
            Token::Transpose => write!(f, "transpose"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Caret => write!(f, "^"),
            Token::Dot => write!(f, "."),
            Token::Hash => write!(f, "#"),
            Token::Equals => write!(f, "="),
            Token::Apostrophe => write!(f, "'"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::Comma => write!(f, ","),
            Token::Colon => write!(f, ":"),
            Token::Double(n) => write!(f, "{}", n),
            Token::Integer(n) => write!(f, "{}", n),
            Token::Ident(s) => write!(f, "{}", s),
        }
    }
}

/// A token together with the source line (1-based) and byte span it came from
#[derive(Debug, Clone, PartialEq)]
pub struct SpannedToken {
    pub token: Token,
    pub line: usize,
    pub span: Range<usize>,
}

/// What to do when an illegal character is found
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LexErrorPolicy {
    /// Abort on the first illegal character
    #[default]
    Fatal,
    /// Report the character, skip it and keep lexing
    Skip,
}

/// Output of a lexing pass
#[derive(Debug, Default)]
pub struct Lexed {
    pub tokens: Vec<SpannedToken>,
    /// Lexical errors that were skipped under [`LexErrorPolicy::Skip`]
    pub diagnostics: Vec<CompileError>,
}

/// Lexer wrapper that provides a stream of located tokens
pub struct Lexer<'source> {
    source: &'source str,
    inner: logos::Lexer<'source, Token>,
}

impl<'source> Lexer<'source> {
    pub fn new(source: &'source str) -> Self {
        Self {
            source,
            inner: Token::lexer(source),
        }
    }

    /// Current 1-based line number
    pub fn line(&self) -> usize {
        self.inner.extras + 1
    }

    /// Get current position in source
    pub fn span(&self) -> Range<usize> {
        self.inner.span()
    }
}

impl<'source> Iterator for Lexer<'source> {
    type Item = CompileResult<SpannedToken>;

    fn next(&mut self) -> Option<Self::Item> {
        let result = self.inner.next()?;
        let span = self.inner.span();
        let line = self.line();
        Some(match result {
            Ok(token) => Ok(SpannedToken { token, line, span }),
            Err(()) => {
                let character = self.source[span.start..].chars().next().unwrap_or('\0');
                Err(CompileError::LexerError {
                    line,
                    position: span.start,
                    character,
                })
            }
        })
    }
}

/// Tokenize a whole source text, aborting on the first illegal character
pub fn tokenize(source: &str) -> CompileResult<Vec<SpannedToken>> {
    tokenize_with(source, LexErrorPolicy::Fatal).map(|lexed| lexed.tokens)
}

/// Tokenize a whole source text with an explicit error policy.
///
/// Every call starts from a fresh logos lexer, so the line counter always
/// restarts at 1.
pub fn tokenize_with(source: &str, policy: LexErrorPolicy) -> CompileResult<Lexed> {
    let mut lexed = Lexed::default();
    for item in Lexer::new(source) {
        match item {
            Ok(token) => lexed.tokens.push(token),
            Err(err) if policy == LexErrorPolicy::Skip => {
                warn!("{}", err);
                lexed.diagnostics.push(err);
            }
            Err(err) => return Err(err),
        }
    }
    Ok(lexed)
}
