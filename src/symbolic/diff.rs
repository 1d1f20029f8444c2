//! Symbolic differentiation with respect to a scalar symbol or a matrix element

use std::collections::BTreeSet;

use super::expr::{Func, LoopOp, Sym};
use crate::error::{CompileError, CompileResult};

impl Sym {
    /// Differentiate with respect to `atom`, which must be a [`Sym::Symbol`] or a
    /// [`Sym::Element`] with numeric indices.
    ///
    /// The result is not simplified. Loops stay loops: a sum is
    /// differentiated under the sum, a product by the product rule summed
    /// over the position of the differentiated factor.
    pub fn diff(&self, atom: &Sym) -> CompileResult<Sym> {
        if !matches!(atom, Sym::Symbol(_) | Sym::Element { .. }) {
            return Err(CompileError::symbolic(format!(
                "cannot differentiate with respect to '{}'",
                atom
            )));
        }
        if !self.depends_on(atom) {
            return Ok(Sym::Num(0.0));
        }

        let derivative = match self {
            Sym::Num(_) => Sym::Num(0.0),

            Sym::Symbol(name) => match atom {
                Sym::Symbol(a) if a == name => Sym::Num(1.0),
                _ => Sym::Num(0.0),
            },

            Sym::Element { matrix, row, col } => match atom {
                Sym::Element {
                    matrix: am,
                    row: ar,
                    col: ac,
                } if am == matrix => Sym::mul(vec![index_match(row, ar), index_match(col, ac)]),
                _ => Sym::Num(0.0),
            },

            Sym::Add(terms) => Sym::add(
                terms
                    .iter()
                    .map(|t| t.diff(atom))
                    .collect::<CompileResult<Vec<_>>>()?,
            ),

            Sym::Mul(factors) => {
                let mut terms = Vec::with_capacity(factors.len());
                for (i, factor) in factors.iter().enumerate() {
                    if !factor.depends_on(atom) {
                        continue;
                    }
                    let mut product = factors.clone();
                    product[i] = factor.diff(atom)?;
                    terms.push(Sym::Mul(product));
                }
                Sym::add(terms)
            }

            Sym::Pow(base, exp) => {
                let (b, e) = (base.as_ref().clone(), exp.as_ref().clone());
                if !exp.depends_on(atom) {
                    // e * b^(e-1) * b'
                    Sym::mul(vec![
                        e.clone(),
                        Sym::pow(b, Sym::sub(e, Sym::Num(1.0))),
                        base.diff(atom)?,
                    ])
                } else if !base.depends_on(atom) {
                    // b^e * ln(b) * e'
                    Sym::mul(vec![self.clone(), Sym::func(Func::Log, b), exp.diff(atom)?])
                } else {
                    Sym::mul(vec![
                        self.clone(),
                        Sym::add(vec![
                            Sym::mul(vec![exp.diff(atom)?, Sym::func(Func::Log, b.clone())]),
                            Sym::mul(vec![e, base.diff(atom)?, Sym::recip(b)]),
                        ]),
                    ])
                }
            }

            Sym::Func(func, arg) => {
                let a = arg.as_ref().clone();
                let outer = match func {
                    Func::Sin => Sym::func(Func::Cos, a),
                    Func::Cos => Sym::neg(Sym::func(Func::Sin, a)),
                    Func::Tan => Sym::pow(Sym::func(Func::Cos, a), Sym::Num(-2.0)),
                    Func::Cot => Sym::neg(Sym::pow(Sym::func(Func::Sin, a), Sym::Num(-2.0))),
                    Func::Log => Sym::recip(a),
                    Func::Abs => Sym::mul(vec![a.clone(), Sym::recip(Sym::func(Func::Abs, a))]),
                };
                Sym::mul(vec![outer, arg.diff(atom)?])
            }

            Sym::Delta(..) => Sym::Num(0.0),

            Sym::Loop {
                op,
                body,
                var,
                lower,
                upper,
            } => {
                if lower.depends_on(atom) || upper.depends_on(atom) {
                    return Err(CompileError::symbolic(format!(
                        "bounds of {} over '{}' depend on '{}'",
                        op.name(),
                        var,
                        atom
                    )));
                }

                let (lo, hi) = (lower.as_ref().clone(), upper.as_ref().clone());
                let body_diff = body.diff(atom)?;
                match op {
                    LoopOp::Sum => Sym::aggregate(LoopOp::Sum, body_diff, var.clone(), lo, hi),
                    // sum over m of prod(f, lo..m-1) * f'(m) * prod(f, m+1..hi)
                    LoopOp::Product => {
                        let mut names = self.all_names();
                        names.extend(body_diff.all_names());
                        let position = fresh_counter(var, &names);
                        let m = Sym::symbol(position.clone());
                        let before = Sym::aggregate(
                            LoopOp::Product,
                            body.as_ref().clone(),
                            var.clone(),
                            lo.clone(),
                            Sym::sub(m.clone(), Sym::Num(1.0)),
                        );
                        let after = Sym::aggregate(
                            LoopOp::Product,
                            body.as_ref().clone(),
                            var.clone(),
                            Sym::add(vec![m.clone(), Sym::Num(1.0)]),
                            hi.clone(),
                        );
                        Sym::aggregate(
                            LoopOp::Sum,
                            Sym::mul(vec![before, body_diff.substitute(var, &m), after]),
                            position,
                            lo,
                            hi,
                        )
                    }
                }
            }
        };

        Ok(derivative)
    }

    /// Simplified first derivative
    pub fn derivative(&self, atom: &Sym) -> CompileResult<Sym> {
        Ok(self.diff(atom)?.simplify())
    }
}

/// Counter name for the differentiated factor of a product, built like `var`
/// and absent from `names`
fn fresh_counter(var: &str, names: &BTreeSet<String>) -> String {
    let base = var.trim_end_matches(|c: char| c.is_ascii_digit());
    let base = if base.is_empty() { "k" } else { base };
    (0..)
        .map(|n| format!("{}{}", base, n))
        .find(|name| !names.contains(name))
        .unwrap_or_else(|| format!("{}_", var))
}

fn index_match(index: &Sym, target: &Sym) -> Sym {
    match (index.as_number(), target.as_number()) {
        (Some(a), Some(b)) => Sym::Num(if a == b { 1.0 } else { 0.0 }),
        _ => Sym::delta(index.clone(), target.clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn x() -> Sym {
        Sym::symbol("x")
    }

    fn y() -> Sym {
        Sym::symbol("y")
    }

    fn v(i: f64) -> Sym {
        Sym::element("v", Sym::Num(i), Sym::Num(0.0))
    }

    #[test]
    fn test_power_rule() {
        let e = Sym::pow(x(), Sym::Num(2.0));
        assert_eq!(e.derivative(&x()).unwrap().to_string(), "2*x");
    }

    #[test]
    fn test_product_and_trig() {
        // x*y + sin(x)
        let e = Sym::Add(vec![Sym::Mul(vec![x(), y()]), Sym::func(Func::Sin, x())]);
        let dx = e.derivative(&x()).unwrap();
        assert_eq!(dx.to_string(), "y + cos(x)");
        let dy = e.derivative(&y()).unwrap();
        assert_eq!(dy, x());
    }

    #[test]
    fn test_independent_is_zero() {
        let e = Sym::func(Func::Log, y());
        assert_eq!(e.derivative(&x()).unwrap(), Sym::Num(0.0));
    }

    #[test]
    fn test_chain_rule_log() {
        let e = Sym::func(Func::Log, Sym::pow(x(), Sym::Num(2.0)));
        assert_eq!(e.derivative(&x()).unwrap().to_string(), "2*x**(-1)");
    }

    #[test]
    fn test_exponent_depends_on_variable() {
        // 2^x
        let e = Sym::pow(Sym::Num(2.0), x());
        let expected = Sym::Mul(vec![Sym::pow(Sym::Num(2.0), x()), Sym::func(Func::Log, Sym::Num(2.0))])
            .simplify();
        assert_eq!(e.derivative(&x()).unwrap(), expected);
    }

    #[test]
    fn test_element_derivative() {
        let e = Sym::Mul(vec![v(0.0), v(1.0)]);
        assert_eq!(e.derivative(&v(1.0)).unwrap(), v(0.0));
        assert_eq!(e.derivative(&v(2.0)).unwrap(), Sym::Num(0.0));
    }

    #[test]
    fn test_literal_sum_folds_delta() {
        let body = Sym::pow(Sym::element("v", Sym::symbol("i"), Sym::Num(0.0)), Sym::Num(2.0));
        let sum = Sym::aggregate(LoopOp::Sum, body, "i", Sym::Num(0.0), Sym::Num(4.0));
        assert_eq!(sum.derivative(&v(3.0)).unwrap().to_string(), "2*v[3, 0]");
    }

    #[test]
    fn test_symbolic_sum_keeps_loop() {
        let body = Sym::Mul(vec![x(), Sym::element("w", Sym::symbol("i"), Sym::Num(0.0))]);
        let sum = Sym::aggregate(LoopOp::Sum, body, "i", Sym::Num(0.0), Sym::symbol("n"));
        assert_eq!(
            sum.derivative(&x()).unwrap().to_string(),
            "Sum(w[i, 0], (i, 0, n))"
        );
    }

    #[test]
    fn test_bounds_depending_on_variable_fail() {
        let sum = Sym::aggregate(LoopOp::Sum, Sym::symbol("i"), "i", Sym::Num(0.0), x());
        assert!(matches!(
            sum.diff(&x()),
            Err(CompileError::SymbolicError { .. })
        ));
    }

    #[test]
    fn test_second_order_is_symmetric() {
        let e = Sym::Mul(vec![Sym::pow(x(), Sym::Num(3.0)), Sym::func(Func::Sin, y())]);
        let dxy = e.derivative(&x()).unwrap().derivative(&y()).unwrap();
        let dyx = e.derivative(&y()).unwrap().derivative(&x()).unwrap();
        assert_eq!(dxy, dyx);
    }

    #[test]
    fn test_literal_sum_keeps_loop() {
        let body = Sym::func(Func::Sin, Sym::Mul(vec![x(), Sym::symbol("i")]));
        let sum = Sym::aggregate(LoopOp::Sum, body, "i", Sym::Num(0.0), Sym::Num(9999.0));
        match sum.derivative(&x()).unwrap() {
            Sym::Loop { op, upper, .. } => {
                assert_eq!(op, LoopOp::Sum);
                assert_eq!(*upper, Sym::Num(9999.0));
            }
            other => panic!("Expected a loop, got {}", other),
        }
    }

    #[test]
    fn test_product_with_zero_factor() {
        // y*(y - 1)*(y - 2) has derivative 2 at y = 0
        let body = Sym::sub(y(), Sym::symbol("k"));
        let product = Sym::aggregate(LoopOp::Product, body, "k", Sym::Num(0.0), Sym::Num(2.0));
        let dy = product.derivative(&y()).unwrap();

        let mut divides = false;
        dy.visit(&mut |node| {
            if let Sym::Pow(_, exp) = node {
                divides |= exp.as_number().map_or(true, |e| e < 0.0);
            }
        });
        assert!(!divides, "{}", dy);

        let at_zero = dy.expand_loops().substitute("y", &Sym::Num(0.0)).simplify();
        assert_eq!(at_zero, Sym::Num(2.0));
        let at_three = dy.expand_loops().substitute("y", &Sym::Num(3.0)).simplify();
        assert_eq!(at_three, Sym::Num(11.0));
    }

    #[test]
    fn test_symbolic_product_counter_is_fresh() {
        let body = Sym::Add(vec![y(), Sym::element("w", Sym::symbol("k0"), Sym::Num(0.0))]);
        let product = Sym::aggregate(LoopOp::Product, body, "k0", Sym::Num(0.0), Sym::symbol("n"));
        match product.diff(&y()).unwrap() {
            Sym::Loop { op, var, .. } => {
                assert_eq!(op, LoopOp::Sum);
                assert_eq!(var, "k1");
            }
            other => panic!("Expected a sum, got {}", other),
        }
    }
}
