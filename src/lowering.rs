//! Lowering of a parsed program into one symbolic expression
//!
//! Constants, named expressions and `main` are projected to symbolic text and
//! read back in declaration order, each seeing the values declared before it.

use std::collections::BTreeSet;

use tracing::debug;

use crate::ast::{Dim, Program, Symbol, TypeKind, Usage};
use crate::error::{CompileError, CompileResult};
use crate::symbolic::{Locals, Sym, SymMatrix, SymbolicParser, Value};

/// A program reduced to its parameters and the simplified `main` expression
#[derive(Debug, Clone, PartialEq)]
pub struct LoweredProgram {
    /// Function parameters in declaration order
    pub parameters: Vec<Symbol>,
    /// Parameters differentiated against, in declaration order
    pub diff_variables: Vec<Symbol>,
    pub expr: Sym,
}

impl LoweredProgram {
    /// Names that generated code must not reuse for loop counters
    pub fn reserved_names(&self) -> BTreeSet<String> {
        self.parameters.iter().map(|p| p.name.clone()).collect()
    }
}

fn dim_sym(dim: &Dim) -> Sym {
    match dim {
        Dim::Literal(n) => Sym::Num(*n as f64),
        Dim::Named(name) => Sym::symbol(name.clone()),
    }
}

fn parameter_value(symbol: &Symbol) -> Value {
    match symbol.ty.kind {
        TypeKind::Number => Value::Scalar(Sym::symbol(symbol.name.clone())),
        TypeKind::Vector | TypeKind::Matrix => Value::Matrix(SymMatrix::named(
            symbol.name.clone(),
            dim_sym(&symbol.ty.rows()),
            dim_sym(&symbol.ty.cols()),
        )),
    }
}

/// Parameters that get partial derivatives.
///
/// `nodiff` variables, variables with symbolic dimensions and number
/// variables used as a dimension are left out.
pub fn diff_variables(parameters: &[Symbol]) -> Vec<Symbol> {
    let dimension_names: BTreeSet<&str> = parameters
        .iter()
        .flat_map(|p| p.ty.dims.iter())
        .filter_map(|d| match d {
            Dim::Named(name) => Some(name.as_str()),
            Dim::Literal(_) => None,
        })
        .collect();

    parameters
        .iter()
        .filter(|p| p.usage != Usage::NoDiff && p.usage != Usage::UsedInLoop)
        .filter(|p| p.literal_shape().is_some())
        .filter(|p| !dimension_names.contains(p.name.as_str()))
        .cloned()
        .collect()
}

/// Lower a parsed program
pub fn lower(program: &Program) -> CompileResult<LoweredProgram> {
    let main = program
        .main()
        .ok_or_else(|| CompileError::symbolic("program has no main expression"))?;
    if !main.value.ty.is_number() {
        return Err(CompileError::type_error(
            main.line,
            format!("main must be a number, got {}", main.value.ty),
        ));
    }

    let parameters = program.parameters();
    let mut parser = SymbolicParser::new();
    let mut locals = Locals::new();

    for constant in &program.constants {
        let value = parser.parse(&constant.value.to_symbolic(), &locals)?.simplify();
        let free = value.free_symbols();
        if !free.is_empty() {
            return Err(CompileError::type_error(
                constant.line,
                format!("constant '{}' depends on {:?}", constant.name, free),
            ));
        }
        locals.insert(constant.name.clone(), value);
    }

    for param in &parameters {
        locals.insert(param.name.clone(), parameter_value(param));
    }

    let mut main_value = None;
    for named in program.evaluated_expressions() {
        let text = named.value.to_symbolic();
        debug!(name = %named.name, %text, "lowering expression");
        let value = parser.parse(&text, &locals)?;
        if named.name == main.name {
            main_value = Some(value.clone());
        }
        locals.insert(named.name.clone(), value);
    }

    let expr = main_value
        .ok_or_else(|| CompileError::symbolic("main was not evaluated"))?
        .into_scalar("main")?
        .simplify();

    let mut lowered = LoweredProgram {
        diff_variables: diff_variables(&parameters),
        parameters,
        expr,
    };
    lowered.expr = lowered.expr.distinguish_dummies(&lowered.reserved_names());
    Ok(lowered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use pretty_assertions::assert_eq;

    fn lowered(source: &str) -> LoweredProgram {
        let program = Parser::new(source).parse_program().unwrap();
        lower(&program).unwrap()
    }

    #[test]
    fn test_lower_scalar_expression() {
        let l = lowered("number x\nnumber y\nexpr main = x*y + sin(x)");
        assert_eq!(l.expr.to_string(), "x*y + sin(x)");
        assert_eq!(l.diff_variables.len(), 2);
    }

    #[test]
    fn test_constants_and_named_expressions() {
        let l = lowered("const c = 2\nnumber x\nexpr f = c * x\nexpr main = f + x");
        assert_eq!(l.expr.to_string(), "3*x");
    }

    #[test]
    fn test_loop_counter_is_renamed() {
        let l = lowered("vector x(5)\nexpr main = for i in [0, 4] sum(x[i])");
        assert_eq!(l.expr.to_string(), "Sum(x[i0, 0], (i0, 0, 4))");
        assert_eq!(l.parameters.len(), 1);
    }

    #[test]
    fn test_diff_variable_selection() {
        let l = lowered(
            "number n\nnumber a : nodiff\nnumber b : equivalent\nvector w(n)\nvector v(2)\nexpr main = a*b + v . v + for i in [0, n - 1] sum(w[i])",
        );
        let names: Vec<&str> = l.diff_variables.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["b", "v"]);
        assert_eq!(l.parameters.len(), 5);
    }

    #[test]
    fn test_constant_with_free_symbols_is_a_type_error() {
        let mut program = Parser::new("const c = 2\nnumber x\nexpr f = 3 * x\nexpr main = c + f")
            .parse_program()
            .unwrap();
        program.constants[0].value = program.expressions[0].value.clone();
        match lower(&program) {
            Err(CompileError::TypeError { line, message }) => {
                assert_eq!(line, 1);
                assert!(message.contains("'c'"));
            }
            other => panic!("Expected TypeError, got {:?}", other),
        }
    }

    #[test]
    fn test_main_must_be_a_number() {
        let program = Parser::new("vector v(2)\nexpr main = v").parse_program().unwrap();
        assert!(matches!(lower(&program), Err(CompileError::TypeError { .. })));
    }
}
