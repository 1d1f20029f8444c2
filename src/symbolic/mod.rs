//! Symbolic algebra used to lower specifications and differentiate them
//!
//! - [`expr`]: the expression tree
//! - [`parse`]: reader for the projected symbolic text
//! - [`matrix`]: matrix values produced while reading
//! - [`simplify`]: canonical simplification and loop expansion
//! - [`diff`]: differentiation

pub mod diff;
pub mod expr;
pub mod matrix;
pub mod parse;
pub mod simplify;

pub use expr::{Func, LoopOp, Sym};
pub use matrix::{SymMatrix, Value};
pub use parse::{Locals, SymbolicParser};
