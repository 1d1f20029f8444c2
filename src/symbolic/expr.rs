//! Symbolic expression tree
//!
//! Subtraction, division, negation and square roots are expressed through
//! `Add`, `Mul` and `Pow`, so `a - b` is `a + (-1)*b` and `sqrt(a)` is
//! `a**0.5`. Sums and products over a counter stay as explicit loop nodes
//! until their bounds are known.

use std::collections::BTreeSet;
use std::fmt;

/// Elementary functions of one argument
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Func {
    Sin,
    Cos,
    Tan,
    Cot,
    /// Natural logarithm
    Log,
    Abs,
}

impl Func {
    pub fn name(&self) -> &'static str {
        match self {
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Tan => "tan",
            Func::Cot => "cot",
            Func::Log => "log",
            Func::Abs => "Abs",
        }
    }
}

/// Aggregation of a loop node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoopOp {
    Sum,
    Product,
}

impl LoopOp {
    pub fn name(&self) -> &'static str {
        match self {
            LoopOp::Sum => "Sum",
            LoopOp::Product => "Product",
        }
    }
}

/// Symbolic expression
#[derive(Debug, Clone, PartialEq)]
pub enum Sym {
    Num(f64),
    Symbol(String),
    /// `matrix[row, col]`; vectors are single-column matrices
    Element {
        matrix: String,
        row: Box<Sym>,
        col: Box<Sym>,
    },
    Add(Vec<Sym>),
    Mul(Vec<Sym>),
    Pow(Box<Sym>, Box<Sym>),
    Func(Func, Box<Sym>),
    /// 1 when both sides are equal, 0 otherwise
    Delta(Box<Sym>, Box<Sym>),
    /// Sum or product of `body` for `var` from `lower` to `upper` inclusive
    Loop {
        op: LoopOp,
        body: Box<Sym>,
        var: String,
        lower: Box<Sym>,
        upper: Box<Sym>,
    },
}

impl Sym {
    pub fn symbol(name: impl Into<String>) -> Sym {
        Sym::Symbol(name.into())
    }

    pub fn element(matrix: impl Into<String>, row: Sym, col: Sym) -> Sym {
        Sym::Element {
            matrix: matrix.into(),
            row: Box::new(row),
            col: Box::new(col),
        }
    }

    pub fn add(mut terms: Vec<Sym>) -> Sym {
        match terms.len() {
            0 => Sym::Num(0.0),
            1 => terms.remove(0),
            _ => Sym::Add(terms),
        }
    }

    pub fn mul(mut factors: Vec<Sym>) -> Sym {
        match factors.len() {
            0 => Sym::Num(1.0),
            1 => factors.remove(0),
            _ => Sym::Mul(factors),
        }
    }

    pub fn pow(base: Sym, exp: Sym) -> Sym {
        Sym::Pow(Box::new(base), Box::new(exp))
    }

    pub fn neg(value: Sym) -> Sym {
        Sym::mul(vec![Sym::Num(-1.0), value])
    }

    pub fn sub(lhs: Sym, rhs: Sym) -> Sym {
        Sym::add(vec![lhs, Sym::neg(rhs)])
    }

    pub fn div(lhs: Sym, rhs: Sym) -> Sym {
        Sym::mul(vec![lhs, Sym::pow(rhs, Sym::Num(-1.0))])
    }

    pub fn recip(value: Sym) -> Sym {
        Sym::pow(value, Sym::Num(-1.0))
    }

    pub fn sqrt(value: Sym) -> Sym {
        Sym::pow(value, Sym::Num(0.5))
    }

    pub fn func(func: Func, arg: Sym) -> Sym {
        Sym::Func(func, Box::new(arg))
    }

    pub fn delta(lhs: Sym, rhs: Sym) -> Sym {
        Sym::Delta(Box::new(lhs), Box::new(rhs))
    }

    pub fn aggregate(op: LoopOp, body: Sym, var: impl Into<String>, lower: Sym, upper: Sym) -> Sym {
        Sym::Loop {
            op,
            body: Box::new(body),
            var: var.into(),
            lower: Box::new(lower),
            upper: Box::new(upper),
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Sym::Num(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Sym::Num(v) if v.fract() == 0.0 && v.abs() < 1e15 => Some(*v as i64),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_number() == Some(0.0)
    }

    pub fn is_one(&self) -> bool {
        self.as_number() == Some(1.0)
    }

    /// Names of free scalar symbols and of every matrix an element is taken from
    pub fn free_symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_free(&mut Vec::new(), &mut out);
        out
    }

    fn collect_free(&self, bound: &mut Vec<String>, out: &mut BTreeSet<String>) {
        match self {
            Sym::Num(_) => {}
            Sym::Symbol(name) => {
                if !bound.contains(name) {
                    out.insert(name.clone());
                }
            }
            Sym::Element { matrix, row, col } => {
                out.insert(matrix.clone());
                row.collect_free(bound, out);
                col.collect_free(bound, out);
            }
            Sym::Add(items) | Sym::Mul(items) => {
                for item in items {
                    item.collect_free(bound, out);
                }
            }
            Sym::Pow(a, b) | Sym::Delta(a, b) => {
                a.collect_free(bound, out);
                b.collect_free(bound, out);
            }
            Sym::Func(_, a) => a.collect_free(bound, out),
            Sym::Loop {
                body,
                var,
                lower,
                upper,
                ..
            } => {
                lower.collect_free(bound, out);
                upper.collect_free(bound, out);
                bound.push(var.clone());
                body.collect_free(bound, out);
                bound.pop();
            }
        }
    }

    /// Every name appearing in the tree, bound or free
    pub fn all_names(&self) -> BTreeSet<String> {
        let mut out = self.free_symbols();
        self.collect_bound(&mut out);
        out
    }

    fn collect_bound(&self, out: &mut BTreeSet<String>) {
        self.visit(&mut |node| {
            if let Sym::Loop { var, .. } = node {
                out.insert(var.clone());
            }
        });
    }

    /// Pre-order walk over every node
    pub fn visit(&self, f: &mut dyn FnMut(&Sym)) {
        f(self);
        match self {
            Sym::Num(_) | Sym::Symbol(_) => {}
            Sym::Element { row, col, .. } => {
                row.visit(f);
                col.visit(f);
            }
            Sym::Add(items) | Sym::Mul(items) => {
                for item in items {
                    item.visit(f);
                }
            }
            Sym::Pow(a, b) | Sym::Delta(a, b) => {
                a.visit(f);
                b.visit(f);
            }
            Sym::Func(_, a) => a.visit(f),
            Sym::Loop {
                body, lower, upper, ..
            } => {
                lower.visit(f);
                upper.visit(f);
                body.visit(f);
            }
        }
    }

    pub fn is_constant(&self) -> bool {
        self.free_symbols().is_empty()
    }

    /// Whether the expression may change with `atom` (a symbol or an element)
    pub fn depends_on(&self, atom: &Sym) -> bool {
        self.depends_on_bound(atom, &mut Vec::new())
    }

    fn depends_on_bound(&self, atom: &Sym, bound: &mut Vec<String>) -> bool {
        match self {
            Sym::Num(_) => false,
            Sym::Symbol(name) => {
                !bound.contains(name) && matches!(atom, Sym::Symbol(a) if a == name)
            }
            Sym::Element { matrix, row, col } => {
                let this = match atom {
                    Sym::Element {
                        matrix: am,
                        row: ar,
                        col: ac,
                    } => am == matrix && may_equal(row, ar) && may_equal(col, ac),
                    _ => false,
                };
                this || row.depends_on_bound(atom, bound) || col.depends_on_bound(atom, bound)
            }
            Sym::Add(items) | Sym::Mul(items) => {
                items.iter().any(|i| i.depends_on_bound(atom, bound))
            }
            Sym::Pow(a, b) | Sym::Delta(a, b) => {
                a.depends_on_bound(atom, bound) || b.depends_on_bound(atom, bound)
            }
            Sym::Func(_, a) => a.depends_on_bound(atom, bound),
            Sym::Loop {
                body,
                var,
                lower,
                upper,
                ..
            } => {
                if lower.depends_on_bound(atom, bound) || upper.depends_on_bound(atom, bound) {
                    return true;
                }
                bound.push(var.clone());
                let result = body.depends_on_bound(atom, bound);
                bound.pop();
                result
            }
        }
    }

    /// Replace free occurrences of the scalar symbol `var`
    pub fn substitute(&self, var: &str, value: &Sym) -> Sym {
        match self {
            Sym::Num(_) => self.clone(),
            Sym::Symbol(name) if name == var => value.clone(),
            Sym::Symbol(_) => self.clone(),
            Sym::Element { matrix, row, col } => Sym::element(
                matrix.clone(),
                row.substitute(var, value),
                col.substitute(var, value),
            ),
            Sym::Add(items) => Sym::Add(items.iter().map(|i| i.substitute(var, value)).collect()),
            Sym::Mul(items) => Sym::Mul(items.iter().map(|i| i.substitute(var, value)).collect()),
            Sym::Pow(a, b) => Sym::pow(a.substitute(var, value), b.substitute(var, value)),
            Sym::Delta(a, b) => Sym::delta(a.substitute(var, value), b.substitute(var, value)),
            Sym::Func(f, a) => Sym::func(*f, a.substitute(var, value)),
            Sym::Loop {
                op,
                body,
                var: counter,
                lower,
                upper,
            } => {
                let body = if counter == var {
                    body.as_ref().clone()
                } else {
                    body.substitute(var, value)
                };
                Sym::aggregate(
                    *op,
                    body,
                    counter.clone(),
                    lower.substitute(var, value),
                    upper.substitute(var, value),
                )
            }
        }
    }

    /// Give every loop counter a distinct name.
    ///
    /// Counters are visited in pre-order and renamed to their base name
    /// (without leading underscores or trailing digits) followed by a running
    /// number, skipping anything in `reserved` or
    /// already used in the tree.
    pub fn distinguish_dummies(&self, reserved: &BTreeSet<String>) -> Sym {
        let mut taken: BTreeSet<String> = reserved.clone();
        taken.extend(self.free_symbols());
        let mut counter = 0;
        self.rename_dummies(&mut taken, &mut counter)
    }

    fn rename_dummies(&self, taken: &mut BTreeSet<String>, counter: &mut usize) -> Sym {
        match self {
            Sym::Num(_) | Sym::Symbol(_) => self.clone(),
            Sym::Element { matrix, row, col } => Sym::element(
                matrix.clone(),
                row.rename_dummies(taken, counter),
                col.rename_dummies(taken, counter),
            ),
            Sym::Add(items) => Sym::Add(
                items
                    .iter()
                    .map(|i| i.rename_dummies(taken, counter))
                    .collect(),
            ),
            Sym::Mul(items) => Sym::Mul(
                items
                    .iter()
                    .map(|i| i.rename_dummies(taken, counter))
                    .collect(),
            ),
            Sym::Pow(a, b) => Sym::pow(
                a.rename_dummies(taken, counter),
                b.rename_dummies(taken, counter),
            ),
            Sym::Delta(a, b) => Sym::delta(
                a.rename_dummies(taken, counter),
                b.rename_dummies(taken, counter),
            ),
            Sym::Func(f, a) => Sym::func(*f, a.rename_dummies(taken, counter)),
            Sym::Loop {
                op,
                body,
                var,
                lower,
                upper,
            } => {
                let base = var
                    .trim_start_matches('_')
                    .trim_end_matches(|c: char| c.is_ascii_digit());
                let base = if base.is_empty() { "k" } else { base };
                let fresh = loop {
                    let candidate = format!("{}{}", base, counter);
                    *counter += 1;
                    if !taken.contains(&candidate) {
                        break candidate;
                    }
                };
                taken.insert(fresh.clone());

                let lower = lower.rename_dummies(taken, counter);
                let upper = upper.rename_dummies(taken, counter);
                let body = body
                    .substitute(var, &Sym::Symbol(fresh.clone()))
                    .rename_dummies(taken, counter);
                Sym::aggregate(*op, body, fresh, lower, upper)
            }
        }
    }

    /// Ordering key that keeps sums and products in a canonical order
    pub(crate) fn sort_key(&self) -> (u8, String) {
        let rank = match self {
            Sym::Num(_) => 0,
            Sym::Symbol(_) => 1,
            Sym::Element { .. } => 2,
            Sym::Pow(..) => 3,
            Sym::Mul(_) => 4,
            Sym::Func(..) => 5,
            Sym::Delta(..) => 6,
            Sym::Loop { .. } => 7,
            Sym::Add(_) => 8,
        };
        (rank, self.to_string())
    }
}

/// Two indices may denote the same position unless both are distinct numbers
fn may_equal(a: &Sym, b: &Sym) -> bool {
    match (a.as_number(), b.as_number()) {
        (Some(x), Some(y)) => x == y,
        _ => true,
    }
}

pub(crate) fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

impl fmt::Display for Sym {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sym::Num(v) => write!(f, "{}", format_number(*v)),
            Sym::Symbol(name) => write!(f, "{}", name),
            Sym::Element { matrix, row, col } => write!(f, "{}[{}, {}]", matrix, row, col),
            Sym::Add(terms) => {
                let parts: Vec<String> = terms.iter().map(|t| t.to_string()).collect();
                write!(f, "{}", parts.join(" + "))
            }
            Sym::Mul(factors) => {
                let parts: Vec<String> = factors
                    .iter()
                    .map(|factor| match factor {
                        Sym::Add(_) => format!("({})", factor),
                        Sym::Num(v) if *v < 0.0 => format!("({})", factor),
                        _ => factor.to_string(),
                    })
                    .collect();
                write!(f, "{}", parts.join("*"))
            }
            Sym::Pow(base, exp) => {
                let base = match base.as_ref() {
                    Sym::Add(_) | Sym::Mul(_) | Sym::Pow(..) => format!("({})", base),
                    Sym::Num(v) if *v < 0.0 => format!("({})", base),
                    _ => base.to_string(),
                };
                let exp = match exp.as_ref() {
                    Sym::Num(v) if *v >= 0.0 => exp.to_string(),
                    Sym::Symbol(_) | Sym::Element { .. } | Sym::Func(..) => exp.to_string(),
                    _ => format!("({})", exp),
                };
                write!(f, "{}**{}", base, exp)
            }
            Sym::Func(func, arg) => write!(f, "{}({})", func.name(), arg),
            Sym::Delta(a, b) => write!(f, "KroneckerDelta({}, {})", a, b),
            Sym::Loop {
                op,
                body,
                var,
                lower,
                upper,
            } => write!(f, "{}({}, ({}, {}, {}))", op.name(), body, var, lower, upper),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn x() -> Sym {
        Sym::symbol("x")
    }

    #[test]
    fn test_display() {
        let e = Sym::Add(vec![
            Sym::Mul(vec![Sym::Num(2.0), x()]),
            Sym::pow(x(), Sym::Num(-1.0)),
            Sym::func(Func::Sin, Sym::element("v", Sym::Num(1.0), Sym::Num(0.0))),
        ]);
        assert_eq!(e.to_string(), "2*x + x**(-1) + sin(v[1, 0])");
    }

    #[test]
    fn test_free_symbols_skip_bound_counters() {
        let body = Sym::Mul(vec![
            Sym::symbol("i"),
            Sym::element("v", Sym::symbol("i"), Sym::Num(0.0)),
        ]);
        let sum = Sym::aggregate(LoopOp::Sum, body, "i", Sym::Num(0.0), Sym::symbol("n"));
        let free: Vec<String> = sum.free_symbols().into_iter().collect();
        assert_eq!(free, vec!["n".to_string(), "v".to_string()]);
    }

    #[test]
    fn test_depends_on_elements() {
        let e = Sym::element("v", Sym::Num(1.0), Sym::Num(0.0));
        assert!(e.depends_on(&Sym::element("v", Sym::Num(1.0), Sym::Num(0.0))));
        assert!(!e.depends_on(&Sym::element("v", Sym::Num(2.0), Sym::Num(0.0))));
        assert!(!e.depends_on(&x()));

        let symbolic = Sym::element("v", Sym::symbol("i"), Sym::Num(0.0));
        assert!(symbolic.depends_on(&Sym::element("v", Sym::Num(2.0), Sym::Num(0.0))));
    }

    #[test]
    fn test_substitute_respects_shadowing() {
        let inner = Sym::aggregate(LoopOp::Sum, Sym::symbol("i"), "i", Sym::Num(0.0), Sym::Num(3.0));
        let e = Sym::Add(vec![Sym::symbol("i"), inner.clone()]);
        let replaced = e.substitute("i", &Sym::Num(7.0));
        assert_eq!(replaced, Sym::Add(vec![Sym::Num(7.0), inner]));
    }

    #[test]
    fn test_distinguish_dummies() {
        let body = |name: &str| Sym::element("v", Sym::symbol(name), Sym::Num(0.0));
        let e = Sym::Add(vec![
            Sym::aggregate(LoopOp::Sum, body("i"), "i", Sym::Num(0.0), Sym::Num(2.0)),
            Sym::aggregate(LoopOp::Sum, body("i"), "i", Sym::Num(0.0), Sym::Num(2.0)),
        ]);
        let reserved: BTreeSet<String> = ["i0".to_string()].into_iter().collect();
        let renamed = e.distinguish_dummies(&reserved);
        assert_eq!(
            renamed.to_string(),
            "Sum(v[i1, 0], (i1, 0, 2)) + Sum(v[i2, 0], (i2, 0, 2))"
        );
    }
}
