//! Partial derivative methods
//!
//! One method per first-order partial and one per upper-triangle second-order
//! partial. Methods are named `<base>_<i>` and `<base>_<i>_<j>` after the
//! position of the atoms in the expanded differentiation list.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use crate::ast::Symbol;
use crate::codegen::ExprCodeGenerator;
use crate::error::{CompileError, CompileResult};
use crate::symbolic::Sym;
use crate::target::Target;
use crate::variable;
use crate::writer::CodeWriter;

pub const DEFAULT_BASE_NAME: &str = "partialDerivative";

pub struct DerivativeCodeGenerator<'a> {
    target: &'a dyn Target,
    parameters: &'a [Symbol],
    atoms: Vec<Sym>,
    expr: &'a Sym,
    base: String,
    modifiers: &'a [&'a str],
    reserved: BTreeSet<String>,
    first_order: Vec<Sym>,
    check_symmetry: bool,
}

impl<'a> DerivativeCodeGenerator<'a> {
    pub fn new(
        target: &'a dyn Target,
        parameters: &'a [Symbol],
        diff_variables: &[Symbol],
        expr: &'a Sym,
        base: impl Into<String>,
        modifiers: &'a [&'a str],
    ) -> CompileResult<Self> {
        let atoms = variable::expand(diff_variables)?;
        let reserved: BTreeSet<String> = parameters.iter().map(|p| p.name.clone()).collect();
        let first_order = atoms
            .iter()
            .map(|atom| Ok(expr.derivative(atom)?.distinguish_dummies(&reserved)))
            .collect::<CompileResult<Vec<_>>>()?;
        debug!(atoms = atoms.len(), "computed first-order partial derivatives");

        Ok(Self {
            target,
            parameters,
            atoms,
            expr,
            base: base.into(),
            modifiers,
            reserved,
            first_order,
            check_symmetry: false,
        })
    }

    /// Compare the two orders of every mixed partial while generating
    pub fn with_symmetry_check(mut self, enabled: bool) -> Self {
        self.check_symmetry = enabled;
        self
    }

    pub fn expr(&self) -> &Sym {
        self.expr
    }

    pub fn atoms(&self) -> &[Sym] {
        &self.atoms
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    pub fn base_name(&self) -> &str {
        &self.base
    }

    pub fn derivative_name(&self, i: usize, j: Option<usize>) -> String {
        match j {
            Some(j) => format!("{}_{}_{}", self.base, i, j),
            None => format!("{}_{}", self.base, i),
        }
    }

    fn check_index(&self, i: usize) -> CompileResult<()> {
        if i < self.atoms.len() {
            Ok(())
        } else {
            Err(CompileError::codegen(format!(
                "derivative index {} out of range for {} variables",
                i,
                self.atoms.len()
            )))
        }
    }

    /// ∂expr/∂x_i, simplified
    pub fn first_order(&self, i: usize) -> CompileResult<&Sym> {
        self.check_index(i)?;
        Ok(&self.first_order[i])
    }

    /// ∂/∂x_j (∂expr/∂x_i), simplified
    pub fn second_order(&self, i: usize, j: usize) -> CompileResult<Sym> {
        self.check_index(j)?;
        let first = self.first_order(i)?;
        Ok(first
            .derivative(&self.atoms[j])?
            .distinguish_dummies(&self.reserved))
    }

    /// Mixed partials whose two differentiation orders simplify differently
    pub fn symmetry_mismatches(&self) -> CompileResult<Vec<(usize, usize)>> {
        let mut mismatches = Vec::new();
        for i in 0..self.len() {
            for j in i + 1..self.len() {
                if self.second_order(i, j)? != self.second_order(j, i)? {
                    mismatches.push((i, j));
                }
            }
        }
        Ok(mismatches)
    }

    fn emit(&self, name: &str, expr: &Sym, w: &mut CodeWriter) -> CompileResult<()> {
        w.blank();
        ExprCodeGenerator::new(self.target, self.parameters, expr, name, self.modifiers).generate(w)
    }

    pub fn generate_first_order(&self, i: usize, w: &mut CodeWriter) -> CompileResult<()> {
        let expr = self.first_order(i)?;
        self.emit(&self.derivative_name(i, None), expr, w)
    }

    pub fn generate_second_order(&self, i: usize, j: usize, w: &mut CodeWriter) -> CompileResult<()> {
        let expr = self.second_order(i, j)?;
        self.emit(&self.derivative_name(i, Some(j)), &expr, w)
    }

    pub fn generate_all_first_order(&self, w: &mut CodeWriter) -> CompileResult<()> {
        for i in 0..self.len() {
            self.generate_first_order(i, w)?;
        }
        Ok(())
    }

    /// Upper triangle only; the Hessian mirrors the rest
    pub fn generate_all_second_order(&self, w: &mut CodeWriter) -> CompileResult<()> {
        if self.check_symmetry {
            for (i, j) in self.symmetry_mismatches()? {
                warn!(
                    first = %self.atoms[i],
                    second = %self.atoms[j],
                    "mixed partial derivatives simplify differently"
                );
            }
        }
        for i in 0..self.len() {
            for j in i..self.len() {
                self.generate_second_order(i, j, w)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Dim, ExprType, Usage};
    use crate::symbolic::Func;
    use crate::target::Java;
    use crate::writer::IndentStyle;
    use pretty_assertions::assert_eq;

    const MODIFIERS: &[&str] = &["public", "static"];

    fn param(name: &str, ty: ExprType) -> Symbol {
        Symbol {
            name: name.to_string(),
            ty,
            usage: Usage::Normal,
            line: 1,
        }
    }

    fn x() -> Sym {
        Sym::symbol("x")
    }

    #[test]
    fn test_square_derivative() {
        let params = vec![param("x", ExprType::number())];
        let expr = Sym::pow(x(), Sym::Num(2.0));
        let gen = DerivativeCodeGenerator::new(&Java, &params, &params, &expr, DEFAULT_BASE_NAME, MODIFIERS)
            .unwrap();
        assert_eq!(gen.first_order(0).unwrap().to_string(), "2*x");
        assert_eq!(gen.second_order(0, 0).unwrap().to_string(), "2");

        let mut w = CodeWriter::new(IndentStyle::default());
        gen.generate_first_order(0, &mut w).unwrap();
        assert_eq!(
            w.into_string(),
            "
public static double partialDerivative_0(double x) {
  double __temp_0 = 2.0 * x;
  return __temp_0;
}
"
        );
    }

    #[test]
    fn test_names_and_count() {
        let params = vec![
            param("x", ExprType::number()),
            param("v", ExprType::vector(Dim::Literal(2))),
        ];
        let expr = Sym::Mul(vec![x(), Sym::element("v", Sym::Num(1.0), Sym::Num(0.0))]);
        let gen = DerivativeCodeGenerator::new(&Java, &params, &params, &expr, "d", MODIFIERS).unwrap();
        assert_eq!(gen.len(), 3);
        assert_eq!(gen.derivative_name(2, None), "d_2");
        assert_eq!(gen.derivative_name(0, Some(2)), "d_0_2");
        assert_eq!(gen.first_order(1).unwrap(), &Sym::Num(0.0));

        let mut w = CodeWriter::new(IndentStyle::default());
        gen.generate_all_second_order(&mut w).unwrap();
        let code = w.into_string();
        assert_eq!(code.matches("public static double d_").count(), 6);
        assert!(code.contains("d_0_2(double x, double[] v)"));
        assert!(!code.contains("d_2_0"));
    }

    #[test]
    fn test_mixed_partials_agree() {
        let params = vec![param("x", ExprType::number()), param("y", ExprType::number())];
        let expr = Sym::func(Func::Sin, Sym::Mul(vec![x(), Sym::symbol("y")]));
        let gen = DerivativeCodeGenerator::new(&Java, &params, &params, &expr, DEFAULT_BASE_NAME, MODIFIERS)
            .unwrap()
            .with_symmetry_check(true);
        assert!(gen.symmetry_mismatches().unwrap().is_empty());
    }

    #[test]
    fn test_index_out_of_range() {
        let params = vec![param("x", ExprType::number())];
        let expr = x();
        let gen = DerivativeCodeGenerator::new(&Java, &params, &params, &expr, DEFAULT_BASE_NAME, MODIFIERS)
            .unwrap();
        assert!(gen.first_order(1).is_err());
    }
}
