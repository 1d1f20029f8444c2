//! Derivative code generator
//!
//! This library compiles a small language describing a multivariate
//! expression into Java source that evaluates the expression, its gradient
//! (`jacobian`) and its matrix of second derivatives (`hessian`).
//!
//! # Example
//!
//! ```rust
//! use derivative_codegen::{compile, GeneratorConfig};
//!
//! let source = "vector x(2)\nexpr main = (1 - x[0])^2 + 100 * (x[1] - x[0]^2)^2";
//! let config = GeneratorConfig {
//!     class_name: "Rosenbrock".to_string(),
//!     ..GeneratorConfig::default()
//! };
//! let unit = compile(source, &config).unwrap();
//! assert_eq!(unit.file_name, "Rosenbrock.java");
//! assert!(unit.code.contains("public static double[][] hessian(double[] x)"));
//! ```

pub mod analyzer;
pub mod ast;
pub mod class;
pub mod codegen;
pub mod config;
pub mod derivative;
pub mod error;
pub mod jacobian;
pub mod lexer;
pub mod lowering;
pub mod parser;
pub mod symbolic;
pub mod target;
pub mod variable;
pub mod writer;

use std::path::PathBuf;

use tracing::info;

pub use ast::*;
pub use class::ClassAssembler;
pub use config::{Dispatch, FileConfig, GeneratorConfig, Language, Overrides};
pub use error::{CompileError, CompileResult};
pub use lexer::LexErrorPolicy;
pub use lowering::LoweredProgram;
pub use parser::Parser;
pub use writer::IndentStyle;

/// A rendered source file
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedUnit {
    pub file_name: String,
    pub code: String,
}

/// Parse and type-check a program, stopping at the first lexical error
pub fn parse(source: &str) -> CompileResult<Program> {
    parse_with(source, LexErrorPolicy::Fatal)
}

pub fn parse_with(source: &str, policy: LexErrorPolicy) -> CompileResult<Program> {
    Parser::new(source).with_lex_policy(policy).parse_program()
}

/// Reduce a parsed program to its simplified `main` expression
pub fn lower(program: &Program) -> CompileResult<LoweredProgram> {
    lowering::lower(program)
}

/// Main compilation function: source text in, one generated class out
pub fn compile(source: &str, config: &GeneratorConfig) -> CompileResult<GeneratedUnit> {
    let program = parse_with(source, config.lex_policy)?;
    info!(
        variables = program.variables.len(),
        expressions = program.expressions.len(),
        "parsed program"
    );

    let lowered = lower(&program)?;
    info!(main = %lowered.expr, "lowered main expression");

    let assembler = ClassAssembler::new(&lowered, config);
    Ok(GeneratedUnit {
        file_name: assembler.file_name(),
        code: assembler.render()?,
    })
}

/// Write a generated unit into the configured destination directory
pub fn write_unit(unit: &GeneratedUnit, config: &GeneratorConfig) -> CompileResult<PathBuf> {
    writer::persist(&config.dest, &unit.file_name, &unit.code)
}
