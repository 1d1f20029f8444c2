//! Error types for the derivative code generator

use thiserror::Error;

/// Result type for compilation operations
pub type CompileResult<T> = Result<T, CompileError>;

/// Compilation errors
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Lexer error at line {line}, position {position}: illegal character '{character}'")]
    LexerError {
        line: usize,
        position: usize,
        character: char,
    },

    #[error("Syntax error at line {line} near '{token}': {message}")]
    SyntaxError {
        line: usize,
        token: String,
        message: String,
    },

    #[error("Undefined variable '{name}' at line {line}")]
    UndefinedVariable { name: String, line: usize },

    #[error("Type error at line {line}: {message}")]
    TypeError { line: usize, message: String },

    #[error("Shape mismatch at line {line}: expected {expected}, got {got}")]
    ShapeMismatch {
        line: usize,
        expected: String,
        got: String,
    },

    #[error("Symbolic error: {message}")]
    SymbolicError { message: String },

    #[error("Cannot generate code for operator: {operator}")]
    UnsupportedOperator { operator: String },

    #[error("Code generation error: {message}")]
    CodeGenError { message: String },

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("I/O error on '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl CompileError {
    pub fn syntax(line: usize, token: impl Into<String>, msg: impl Into<String>) -> Self {
        CompileError::SyntaxError {
            line,
            token: token.into(),
            message: msg.into(),
        }
    }

    pub fn undefined(name: impl Into<String>, line: usize) -> Self {
        CompileError::UndefinedVariable {
            name: name.into(),
            line,
        }
    }

    pub fn type_error(line: usize, msg: impl Into<String>) -> Self {
        CompileError::TypeError {
            line,
            message: msg.into(),
        }
    }

    pub fn symbolic(msg: impl Into<String>) -> Self {
        CompileError::SymbolicError {
            message: msg.into(),
        }
    }

    pub fn unsupported(operator: impl Into<String>) -> Self {
        CompileError::UnsupportedOperator {
            operator: operator.into(),
        }
    }

    pub fn codegen(msg: impl Into<String>) -> Self {
        CompileError::CodeGenError {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        CompileError::ConfigError {
            message: msg.into(),
        }
    }

    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        CompileError::Io {
            path: path.into(),
            source,
        }
    }

    /// Source line the error points at, when it carries one
    pub fn line(&self) -> Option<usize> {
        match self {
            CompileError::LexerError { line, .. }
            | CompileError::SyntaxError { line, .. }
            | CompileError::UndefinedVariable { line, .. }
            | CompileError::TypeError { line, .. }
            | CompileError::ShapeMismatch { line, .. } => Some(*line),
            _ => None,
        }
    }
}
