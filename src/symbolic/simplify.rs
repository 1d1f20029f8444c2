//! Algebraic simplification and loop expansion

use super::expr::{Func, LoopOp, Sym};

impl Sym {
    /// Bring the expression to a canonical, simplified form.
    ///
    /// Sums and products are flattened, numbers folded, like terms and like
    /// bases collected and the children sorted. The result is idempotent:
    /// simplifying it again gives the same tree.
    pub fn simplify(&self) -> Sym {
        match self {
            Sym::Num(_) | Sym::Symbol(_) => self.clone(),
            Sym::Element { matrix, row, col } => {
                Sym::element(matrix.clone(), row.simplify(), col.simplify())
            }
            Sym::Add(terms) => simplify_add(terms.iter().map(Sym::simplify).collect()),
            Sym::Mul(factors) => simplify_mul(factors.iter().map(Sym::simplify).collect()),
            Sym::Pow(base, exp) => simplify_pow(base.simplify(), exp.simplify()),
            Sym::Func(func, arg) => simplify_func(*func, arg.simplify()),
            Sym::Delta(a, b) => simplify_delta(a.simplify(), b.simplify()),
            Sym::Loop {
                op,
                body,
                var,
                lower,
                upper,
            } => simplify_loop(*op, body.simplify(), var, lower.simplify(), upper.simplify()),
        }
    }

    /// Replace every loop with integer bounds by the explicit sum or product
    pub fn expand_loops(&self) -> Sym {
        match self {
            Sym::Num(_) | Sym::Symbol(_) => self.clone(),
            Sym::Element { matrix, row, col } => {
                Sym::element(matrix.clone(), row.expand_loops(), col.expand_loops())
            }
            Sym::Add(items) => Sym::Add(items.iter().map(Sym::expand_loops).collect()),
            Sym::Mul(items) => Sym::Mul(items.iter().map(Sym::expand_loops).collect()),
            Sym::Pow(a, b) => Sym::pow(a.expand_loops(), b.expand_loops()),
            Sym::Delta(a, b) => Sym::delta(a.expand_loops(), b.expand_loops()),
            Sym::Func(f, a) => Sym::func(*f, a.expand_loops()),
            Sym::Loop {
                op,
                body,
                var,
                lower,
                upper,
            } => {
                let lower = lower.expand_loops().simplify();
                let upper = upper.expand_loops().simplify();
                match (lower.as_integer(), upper.as_integer()) {
                    (Some(lo), Some(hi)) => {
                        let items: Vec<Sym> = (lo..=hi)
                            .map(|k| body.substitute(var, &Sym::Num(k as f64)).expand_loops())
                            .collect();
                        let expanded = match op {
                            LoopOp::Sum => Sym::add(items),
                            LoopOp::Product => Sym::mul(items),
                        };
                        expanded.simplify()
                    }
                    _ => Sym::aggregate(*op, body.expand_loops(), var.clone(), lower, upper),
                }
            }
        }
    }
}

fn sort_canonical(items: &mut [Sym]) {
    items.sort_by_cached_key(Sym::sort_key);
}

/// Split `c*rest` into its numeric coefficient and the remaining factors
fn split_coefficient(term: Sym) -> (f64, Sym) {
    match term {
        Sym::Mul(mut factors) => match factors.first() {
            Some(Sym::Num(c)) => {
                let c = *c;
                factors.remove(0);
                (c, Sym::mul(factors))
            }
            _ => (1.0, Sym::Mul(factors)),
        },
        other => (1.0, other),
    }
}

fn with_coefficient(coeff: f64, rest: Sym) -> Sym {
    if coeff == 1.0 {
        return rest;
    }
    match rest {
        Sym::Mul(mut factors) => {
            factors.insert(0, Sym::Num(coeff));
            Sym::Mul(factors)
        }
        other => Sym::Mul(vec![Sym::Num(coeff), other]),
    }
}

fn simplify_add(terms: Vec<Sym>) -> Sym {
    let mut constant = 0.0;
    let mut collected: Vec<(Sym, f64)> = Vec::new();

    let mut flat = Vec::with_capacity(terms.len());
    for term in terms {
        match term {
            Sym::Add(inner) => flat.extend(inner),
            other => flat.push(other),
        }
    }

    for term in flat {
        match term {
            Sym::Num(v) => constant += v,
            other => {
                let (coeff, rest) = split_coefficient(other);
                match collected.iter_mut().find(|(r, _)| *r == rest) {
                    Some(entry) => entry.1 += coeff,
                    None => collected.push((rest, coeff)),
                }
            }
        }
    }

    let mut out: Vec<Sym> = collected
        .into_iter()
        .filter(|(_, c)| *c != 0.0)
        .map(|(rest, c)| with_coefficient(c, rest))
        .collect();
    if constant != 0.0 {
        out.push(Sym::Num(constant));
    }

    match out.len() {
        0 => Sym::Num(0.0),
        1 => out.remove(0),
        _ => {
            sort_canonical(&mut out);
            Sym::Add(out)
        }
    }
}

fn simplify_mul(factors: Vec<Sym>) -> Sym {
    let mut coeff = 1.0;
    let mut bases: Vec<(Sym, Vec<Sym>)> = Vec::new();

    let mut pending = factors;
    while let Some(factor) = pending.pop() {
        match factor {
            Sym::Num(v) => coeff *= v,
            Sym::Mul(inner) => pending.extend(inner),
            Sym::Pow(base, exp) => push_base(&mut bases, *base, *exp),
            other => push_base(&mut bases, other, Sym::Num(1.0)),
        }
    }

    if coeff == 0.0 {
        return Sym::Num(0.0);
    }

    let mut out = Vec::new();
    for (base, exps) in bases {
        let exp = simplify_add(exps);
        match simplify_pow(base, exp) {
            Sym::Num(v) => coeff *= v,
            Sym::Mul(inner) => {
                for f in inner {
                    match f {
                        Sym::Num(v) => coeff *= v,
                        other => out.push(other),
                    }
                }
            }
            other => out.push(other),
        }
    }

    if coeff == 0.0 {
        return Sym::Num(0.0);
    }
    if out.is_empty() {
        return Sym::Num(coeff);
    }

    sort_canonical(&mut out);

    if coeff != 1.0 {
        if let [Sym::Add(terms)] = out.as_slice() {
            let distributed = terms
                .iter()
                .map(|t| simplify_mul(vec![Sym::Num(coeff), t.clone()]))
                .collect();
            return simplify_add(distributed);
        }
        out.insert(0, Sym::Num(coeff));
    }

    Sym::mul(out)
}

fn push_base(bases: &mut Vec<(Sym, Vec<Sym>)>, base: Sym, exp: Sym) {
    match bases.iter_mut().find(|(b, _)| *b == base) {
        Some(entry) => entry.1.push(exp),
        None => bases.push((base, vec![exp])),
    }
}

fn simplify_pow(base: Sym, exp: Sym) -> Sym {
    if exp.is_zero() || base.is_one() {
        return Sym::Num(1.0);
    }
    if exp.is_one() {
        return base;
    }
    if let (Some(b), Some(e)) = (base.as_number(), exp.as_number()) {
        let value = b.powf(e);
        if value.is_finite() && !(b < 0.0 && e.fract() != 0.0) {
            return Sym::Num(value);
        }
    }
    if base.is_zero() && exp.as_number().map_or(false, |e| e > 0.0) {
        return Sym::Num(0.0);
    }

    if exp.as_integer().is_some() {
        match base {
            Sym::Pow(inner, inner_exp) => {
                let combined = simplify_mul(vec![*inner_exp, exp]);
                return simplify_pow(*inner, combined);
            }
            Sym::Mul(factors) => {
                let powered = factors
                    .into_iter()
                    .map(|f| simplify_pow(f, exp.clone()))
                    .collect();
                return simplify_mul(powered);
            }
            other => return Sym::pow(other, exp),
        }
    }

    Sym::pow(base, exp)
}

fn simplify_func(func: Func, arg: Sym) -> Sym {
    match (func, arg.as_number()) {
        (Func::Sin, Some(v)) | (Func::Tan, Some(v)) if v == 0.0 => Sym::Num(0.0),
        (Func::Cos, Some(v)) if v == 0.0 => Sym::Num(1.0),
        (Func::Log, Some(v)) if v == 1.0 => Sym::Num(0.0),
        (Func::Abs, Some(v)) => Sym::Num(v.abs()),
        (Func::Abs, None) if matches!(arg, Sym::Func(Func::Abs, _)) => arg,
        _ => Sym::func(func, arg),
    }
}

fn simplify_delta(a: Sym, b: Sym) -> Sym {
    if let (Some(x), Some(y)) = (a.as_number(), b.as_number()) {
        return Sym::Num(if x == y { 1.0 } else { 0.0 });
    }
    if a == b {
        return Sym::Num(1.0);
    }
    if a.sort_key() <= b.sort_key() {
        Sym::delta(a, b)
    } else {
        Sym::delta(b, a)
    }
}

fn simplify_loop(op: LoopOp, body: Sym, var: &str, lower: Sym, upper: Sym) -> Sym {
    if let (Some(lo), Some(hi)) = (lower.as_integer(), upper.as_integer()) {
        if hi < lo {
            return match op {
                LoopOp::Sum => Sym::Num(0.0),
                LoopOp::Product => Sym::Num(1.0),
            };
        }
    }

    if !body.free_symbols().contains(var) {
        let count = simplify_add(vec![
            upper.clone(),
            Sym::Num(1.0),
            simplify_mul(vec![Sym::Num(-1.0), lower.clone()]),
        ]);
        return match op {
            LoopOp::Sum => simplify_mul(vec![count, body]),
            LoopOp::Product => simplify_pow(body, count),
        };
    }

    if op == LoopOp::Sum {
        // linearity: split sums of terms, pull out factors free of the counter
        match &body {
            Sym::Add(terms) => {
                return simplify_add(
                    terms
                        .iter()
                        .map(|t| simplify_loop(op, t.clone(), var, lower.clone(), upper.clone()))
                        .collect(),
                );
            }
            Sym::Mul(factors) => {
                let (mut outside, inside): (Vec<Sym>, Vec<Sym>) = factors
                    .iter()
                    .cloned()
                    .partition(|f| !f.free_symbols().contains(var));
                if !outside.is_empty() {
                    outside.push(simplify_loop(op, simplify_mul(inside), var, lower, upper));
                    return simplify_mul(outside);
                }
            }
            _ => {}
        }
        if let Some(reduced) = reduce_delta_sum(&body, var, &lower, &upper) {
            return reduced;
        }
    }

    Sym::aggregate(op, body, var, lower, upper)
}

/// `Sum(f(k)*KroneckerDelta(k, c), (k, lo, hi))` with integer `c`, `lo`, `hi`
fn reduce_delta_sum(body: &Sym, var: &str, lower: &Sym, upper: &Sym) -> Option<Sym> {
    let factors: Vec<Sym> = match body {
        Sym::Mul(factors) => factors.clone(),
        other => vec![other.clone()],
    };
    let counter = Sym::symbol(var);

    let (position, target) = factors.iter().enumerate().find_map(|(i, f)| match f {
        Sym::Delta(a, b) if **a == counter && b.as_integer().is_some() => Some((i, b.as_ref().clone())),
        Sym::Delta(a, b) if **b == counter && a.as_integer().is_some() => Some((i, a.as_ref().clone())),
        _ => None,
    })?;

    let (lo, hi, c) = (lower.as_integer()?, upper.as_integer()?, target.as_integer()?);
    if c < lo || c > hi {
        return Some(Sym::Num(0.0));
    }

    let rest: Vec<Sym> = factors
        .into_iter()
        .enumerate()
        .filter(|(i, _)| *i != position)
        .map(|(_, f)| f)
        .collect();
    Some(Sym::mul(rest).substitute(var, &target).simplify())
}
