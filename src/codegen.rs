//! Expression code generator
//!
//! Lowers one symbolic expression into the body of a target-language function.
//! Composite nodes are emitted in post-order as numbered temporaries; numbers,
//! symbols and elements are inlined where they are used.

use tracing::debug;

use crate::ast::{Symbol, TypeKind};
use crate::error::{CompileError, CompileResult};
use crate::symbolic::Sym;
use crate::target::{Op, ReturnShape, Target};
use crate::writer::CodeWriter;

/// Preferred prefix of generated temporaries
pub const TEMP_PREFIX: &str = "__temp_";

/// [`TEMP_PREFIX`] with extra leading underscores until no parameter starts with it
fn temp_prefix(parameters: &[Symbol]) -> String {
    let mut prefix = TEMP_PREFIX.to_string();
    while parameters.iter().any(|p| p.name.starts_with(&prefix)) {
        prefix.insert(0, '_');
    }
    prefix
}

/// Generates a function evaluating a scalar expression
pub struct ExprCodeGenerator<'a> {
    target: &'a dyn Target,
    parameters: &'a [Symbol],
    expr: &'a Sym,
    func_name: String,
    modifiers: &'a [&'a str],
    temp_prefix: String,
    temp_counter: usize,
    /// Loop counters visible at the current point
    scope: Vec<String>,
}

impl<'a> ExprCodeGenerator<'a> {
    pub fn new(
        target: &'a dyn Target,
        parameters: &'a [Symbol],
        expr: &'a Sym,
        func_name: impl Into<String>,
        modifiers: &'a [&'a str],
    ) -> Self {
        Self {
            target,
            parameters,
            expr,
            func_name: func_name.into(),
            modifiers,
            temp_prefix: temp_prefix(parameters),
            temp_counter: 0,
            scope: Vec::new(),
        }
    }

    /// Emit the declaration, the body and the return statement
    pub fn generate(&mut self, w: &mut CodeWriter) -> CompileResult<()> {
        self.temp_counter = 0;
        self.scope.clear();
        debug!(function = %self.func_name, expr = %self.expr, "generating function");

        let decl = self.target.function_declaration(
            self.modifiers,
            ReturnShape::Scalar,
            &self.func_name,
            self.parameters,
            &[],
        );
        w.line(format!("{} {{", decl));
        w.indent();
        let expr = self.expr;
        let result = self.lower(expr, w)?;
        w.line(self.target.return_statement(&result));
        w.dedent();
        w.line(self.target.block_end());
        Ok(())
    }

    fn next_temp(&mut self) -> String {
        let name = format!("{}{}", self.temp_prefix, self.temp_counter);
        self.temp_counter += 1;
        name
    }

    fn assign(&mut self, value: String, w: &mut CodeWriter) -> String {
        let temp = self.next_temp();
        w.line(self.target.declare_scalar(&temp, &value));
        temp
    }

    fn parameter(&self, name: &str) -> Option<&Symbol> {
        self.parameters.iter().find(|p| p.name == name)
    }

    fn lower_all(&mut self, items: &[Sym], w: &mut CodeWriter) -> CompileResult<Vec<String>> {
        items.iter().map(|item| self.lower(item, w)).collect()
    }

    /// Lower `expr` and return the text that denotes its value
    fn lower(&mut self, expr: &Sym, w: &mut CodeWriter) -> CompileResult<String> {
        match expr {
            Sym::Num(v) => Ok(self.target.number(*v)),
            Sym::Symbol(name) => {
                if self.scope.iter().any(|s| s == name) {
                    return Ok(name.clone());
                }
                match self.parameter(name) {
                    Some(p) if p.ty.kind == TypeKind::Number => Ok(name.clone()),
                    Some(p) => Err(CompileError::codegen(format!(
                        "'{}' is a {} and cannot be used as a scalar",
                        name, p.ty
                    ))),
                    None => Err(CompileError::codegen(format!("unknown symbol '{}'", name))),
                }
            }
            Sym::Element { matrix, row, col } => self.lower_element(matrix, row, col, w),
            Sym::Add(items) => {
                let operands = self.lower_all(items, w)?;
                let value = self.target.apply(Op::Add, &operands)?;
                Ok(self.assign(value, w))
            }
            Sym::Mul(items) => {
                let operands = self.lower_all(items, w)?;
                let value = self.target.apply(Op::Mul, &operands)?;
                Ok(self.assign(value, w))
            }
            Sym::Pow(base, exp) => {
                let operands = vec![self.lower(base, w)?, self.lower(exp, w)?];
                let value = self.target.apply(Op::Pow, &operands)?;
                Ok(self.assign(value, w))
            }
            Sym::Func(func, arg) => {
                let operands = vec![self.lower(arg, w)?];
                let value = self.target.apply(Op::Func(*func), &operands)?;
                Ok(self.assign(value, w))
            }
            Sym::Delta(a, b) => {
                let operands = vec![self.lower(a, w)?, self.lower(b, w)?];
                let value = self.target.apply(Op::Delta, &operands)?;
                Ok(self.assign(value, w))
            }
            Sym::Loop {
                op,
                body,
                var,
                lower,
                upper,
            } => {
                if self.parameter(var).is_some() || self.scope.contains(var) {
                    return Err(CompileError::codegen(format!(
                        "loop counter '{}' shadows another name",
                        var
                    )));
                }
                let lower = self.lower_index(lower, w)?;
                let upper = self.lower_index(upper, w)?;
                let acc = self.next_temp();
                w.line(self.target.accumulator(&acc, *op));
                w.line(self.target.inclusive_loop(var, &lower, &upper));
                w.indent();
                self.scope.push(var.clone());
                let value = self.lower(body, w);
                self.scope.pop();
                let value = value?;
                w.line(self.target.accumulate(&acc, *op, &value));
                w.dedent();
                w.line(self.target.block_end());
                Ok(acc)
            }
        }
    }

    fn lower_element(
        &mut self,
        matrix: &str,
        row: &Sym,
        col: &Sym,
        w: &mut CodeWriter,
    ) -> CompileResult<String> {
        let kind = match self.parameter(matrix) {
            Some(p) => p.ty.kind,
            None => {
                return Err(CompileError::codegen(format!(
                    "unknown element {}[{}, {}]",
                    matrix, row, col
                )))
            }
        };
        let indices = match kind {
            TypeKind::Vector => vec![self.lower_index(row, w)?],
            TypeKind::Matrix => vec![self.lower_index(row, w)?, self.lower_index(col, w)?],
            TypeKind::Number => {
                return Err(CompileError::codegen(format!(
                    "'{}' is a number and cannot be indexed",
                    matrix
                )))
            }
        };
        Ok(self.target.element(matrix, &indices))
    }

    /// Numeric literals fold to their floor and loop counters are used as
    /// is; anything else is computed into a temporary and cast
    fn lower_index(&mut self, index: &Sym, w: &mut CodeWriter) -> CompileResult<String> {
        if let Sym::Num(v) = index {
            return Ok((v.floor() as i64).to_string());
        }
        if let Sym::Symbol(name) = index {
            if self.scope.contains(name) {
                return Ok(name.clone());
            }
        }
        let value = self.lower(index, w)?;
        Ok(self.target.integer_index(&value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Dim, ExprType, Usage};
    use crate::symbolic::{Func, LoopOp};
    use crate::target::Java;
    use crate::writer::IndentStyle;
    use pretty_assertions::assert_eq;

    fn param(name: &str, ty: ExprType) -> Symbol {
        Symbol {
            name: name.to_string(),
            ty,
            usage: Usage::Normal,
            line: 1,
        }
    }

    fn render(params: &[Symbol], expr: &Sym) -> CompileResult<String> {
        let mut w = CodeWriter::new(IndentStyle::default());
        ExprCodeGenerator::new(&Java, params, expr, "eval", &["public", "static"]).generate(&mut w)?;
        Ok(w.into_string())
    }

    #[test]
    fn test_identity_is_returned_directly() {
        let params = vec![param("x", ExprType::number())];
        let code = render(&params, &Sym::symbol("x")).unwrap();
        assert_eq!(code, "public static double eval(double x) {\n  return x;\n}\n");
    }

    #[test]
    fn test_post_order_temporaries() {
        let params = vec![param("x", ExprType::number()), param("y", ExprType::number())];
        let expr = Sym::Add(vec![
            Sym::Mul(vec![Sym::symbol("x"), Sym::symbol("y")]),
            Sym::func(Func::Sin, Sym::symbol("x")),
        ]);
        let code = render(&params, &expr).unwrap();
        assert_eq!(
            code,
            "public static double eval(double x, double y) {
  double __temp_0 = x * y;
  double __temp_1 = Math.sin(x);
  double __temp_2 = __temp_0 + __temp_1;
  return __temp_2;
}
"
        );
    }

    #[test]
    fn test_sum_over_literal_range() {
        let params = vec![param("x", ExprType::vector(Dim::Literal(5)))];
        let body = Sym::element("x", Sym::symbol("i0"), Sym::Num(0.0));
        let expr = Sym::aggregate(LoopOp::Sum, body, "i0", Sym::Num(0.0), Sym::Num(4.0));
        let code = render(&params, &expr).unwrap();
        assert_eq!(
            code,
            "public static double eval(double[] x) {
  double __temp_0 = 0.0;
  for (int i0 = 0; i0 <= 4; ++i0) {
    __temp_0 += x[i0];
  }
  return __temp_0;
}
"
        );
    }

    #[test]
    fn test_symbolic_bound_is_cast() {
        let params = vec![
            param("n", ExprType::number()),
            param("w", ExprType::vector(Dim::Named("n".to_string()))),
        ];
        let body = Sym::element("w", Sym::symbol("k0"), Sym::Num(0.0));
        let upper = Sym::Add(vec![Sym::Num(-1.0), Sym::symbol("n")]);
        let expr = Sym::aggregate(LoopOp::Product, body, "k0", Sym::Num(0.0), upper);
        let code = render(&params, &expr).unwrap();
        assert_eq!(
            code,
            "public static double eval(double n, double[] w) {
  double __temp_0 = -1.0 + n;
  double __temp_1 = 1.0;
  for (int k0 = 0; k0 <= (int) __temp_0; ++k0) {
    __temp_1 *= w[k0];
  }
  return __temp_1;
}
"
        );
    }

    #[test]
    fn test_matrix_element_and_power() {
        let params = vec![param("m", ExprType::matrix(Dim::Literal(2), Dim::Literal(2)))];
        let expr = Sym::pow(Sym::element("m", Sym::Num(1.0), Sym::Num(0.0)), Sym::Num(2.0));
        let code = render(&params, &expr).unwrap();
        assert!(code.contains("double __temp_0 = Math.pow(m[1][0], 2.0);"));
    }

    #[test]
    fn test_unknown_symbol() {
        let params = vec![param("x", ExprType::number())];
        let err = render(&params, &Sym::symbol("z")).unwrap_err();
        assert!(matches!(err, CompileError::CodeGenError { .. }));
    }

    #[test]
    fn test_float_bound_is_folded() {
        let params = vec![param("x", ExprType::vector(Dim::Literal(3)))];
        let body = Sym::element("x", Sym::symbol("i0"), Sym::Num(0.0));
        let expr = Sym::aggregate(LoopOp::Sum, body, "i0", Sym::Num(0.5), Sym::Num(2.5));
        let code = render(&params, &expr).unwrap();
        assert!(code.contains("  for (int i0 = 0; i0 <= 2; ++i0) {\n"));
        assert!(!code.contains("(int)"));
    }

    #[test]
    fn test_temporaries_avoid_parameter_names() {
        let params = vec![param("__temp_0", ExprType::number()), param("x", ExprType::number())];
        let expr = Sym::Add(vec![
            Sym::Mul(vec![Sym::Num(2.0), Sym::symbol("__temp_0")]),
            Sym::func(Func::Sin, Sym::symbol("x")),
        ]);
        let code = render(&params, &expr).unwrap();
        assert_eq!(
            code,
            "public static double eval(double __temp_0, double x) {
  double ___temp_0 = 2.0 * __temp_0;
  double ___temp_1 = Math.sin(x);
  double ___temp_2 = ___temp_0 + ___temp_1;
  return ___temp_2;
}
"
        );
    }
}
