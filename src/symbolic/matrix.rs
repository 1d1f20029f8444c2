//! Matrix values for the symbolic evaluator
//!
//! A matrix is either an explicit grid of expressions or a reference to a
//! declared vector/matrix variable. References keep their (possibly symbolic)
//! dimensions and hand out [`Sym::Element`] nodes for any index, which is what
//! lets `Sum(v[i, 0], (i, 0, n - 1))` be expressed for `vector v(n)`.

use super::expr::{LoopOp, Sym};
use crate::error::{CompileError, CompileResult};

/// Result of evaluating a symbolic text
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Scalar(Sym),
    Matrix(SymMatrix),
}

impl Value {
    pub fn into_scalar(self, what: &str) -> CompileResult<Sym> {
        match self {
            Value::Scalar(s) => Ok(s),
            Value::Matrix(m) => m.as_scalar().ok_or_else(|| {
                CompileError::symbolic(format!(
                    "{} must be a scalar, got a {}x{} matrix",
                    what, m.rows, m.cols
                ))
            }),
        }
    }

    pub fn simplify(&self) -> Value {
        match self {
            Value::Scalar(s) => Value::Scalar(s.simplify()),
            Value::Matrix(m) => Value::Matrix(m.map(&|e| e.simplify())),
        }
    }

    /// Free symbols of the value
    pub fn free_symbols(&self) -> std::collections::BTreeSet<String> {
        match self {
            Value::Scalar(s) => s.free_symbols(),
            Value::Matrix(m) => match &m.data {
                MatrixData::Explicit(items) => items.iter().flat_map(Sym::free_symbols).collect(),
                MatrixData::Named { name, .. } => std::iter::once(name.clone()).collect(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum MatrixData {
    /// Row-major elements
    Explicit(Vec<Sym>),
    Named { name: String, transposed: bool },
}

/// Matrix of symbolic expressions
#[derive(Debug, Clone, PartialEq)]
pub struct SymMatrix {
    rows: Sym,
    cols: Sym,
    data: MatrixData,
}

/// Source of fresh summation counters
#[derive(Debug, Default)]
pub struct DummyNames {
    next: usize,
}

impl DummyNames {
    pub fn fresh(&mut self) -> String {
        let name = format!("_k{}", self.next);
        self.next += 1;
        name
    }
}

impl SymMatrix {
    /// Reference to a declared variable
    pub fn named(name: impl Into<String>, rows: Sym, cols: Sym) -> Self {
        Self {
            rows,
            cols,
            data: MatrixData::Named {
                name: name.into(),
                transposed: false,
            },
        }
    }

    /// Column vector
    pub fn column(items: Vec<Sym>) -> Self {
        Self {
            rows: Sym::Num(items.len() as f64),
            cols: Sym::Num(1.0),
            data: MatrixData::Explicit(items),
        }
    }

    pub fn from_rows(rows: Vec<Vec<Sym>>) -> CompileResult<Self> {
        let cols = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|r| r.len() != cols) {
            return Err(CompileError::symbolic("matrix rows have different lengths"));
        }
        Ok(Self::explicit(rows.len(), cols, rows.into_iter().flatten().collect()))
    }

    fn explicit(rows: usize, cols: usize, items: Vec<Sym>) -> Self {
        Self {
            rows: Sym::Num(rows as f64),
            cols: Sym::Num(cols as f64),
            data: MatrixData::Explicit(items),
        }
    }

    pub fn rows(&self) -> &Sym {
        &self.rows
    }

    pub fn cols(&self) -> &Sym {
        &self.cols
    }

    pub fn literal_shape(&self) -> Option<(usize, usize)> {
        let rows = self.rows.as_integer().filter(|r| *r >= 0)?;
        let cols = self.cols.as_integer().filter(|c| *c >= 0)?;
        Some((rows as usize, cols as usize))
    }

    fn require_shape(&self, operation: &str) -> CompileResult<(usize, usize)> {
        self.literal_shape().ok_or_else(|| {
            CompileError::symbolic(format!(
                "{} needs literal dimensions, got {}x{}",
                operation, self.rows, self.cols
            ))
        })
    }

    /// The single element of a 1x1 matrix
    pub fn as_scalar(&self) -> Option<Sym> {
        if self.literal_shape()? != (1, 1) {
            return None;
        }
        self.element(&Sym::Num(0.0), &Sym::Num(0.0)).ok()
    }

    pub fn element(&self, row: &Sym, col: &Sym) -> CompileResult<Sym> {
        if let (Some(i), Some(j), Some((r, c))) = (row.as_integer(), col.as_integer(), self.literal_shape()) {
            if i < 0 || j < 0 || i as usize >= r || j as usize >= c {
                return Err(CompileError::symbolic(format!(
                    "index [{}, {}] is out of range for a {}x{} matrix",
                    i, j, r, c
                )));
            }
        }

        match &self.data {
            MatrixData::Named { name, transposed } => Ok(if *transposed {
                Sym::element(name.clone(), col.clone(), row.clone())
            } else {
                Sym::element(name.clone(), row.clone(), col.clone())
            }),
            MatrixData::Explicit(items) => {
                let (_, cols) = self.require_shape("element access")?;
                match (row.as_integer(), col.as_integer()) {
                    (Some(i), Some(j)) => Ok(items[i as usize * cols + j as usize].clone()),
                    _ => Err(CompileError::symbolic(format!(
                        "symbolic index [{}, {}] into a computed matrix",
                        row, col
                    ))),
                }
            }
        }
    }

    /// Row-major list of all elements
    pub fn elements(&self) -> CompileResult<Vec<Sym>> {
        let (rows, cols) = self.require_shape("element listing")?;
        let mut out = Vec::with_capacity(rows * cols);
        for i in 0..rows {
            for j in 0..cols {
                out.push(self.element(&Sym::Num(i as f64), &Sym::Num(j as f64))?);
            }
        }
        Ok(out)
    }

    pub fn transpose(&self) -> SymMatrix {
        let data = match &self.data {
            MatrixData::Named { name, transposed } => MatrixData::Named {
                name: name.clone(),
                transposed: !transposed,
            },
            MatrixData::Explicit(items) => {
                // explicit matrices always have literal dimensions
                let (rows, cols) = self.literal_shape().unwrap_or((0, 0));
                let mut out = Vec::with_capacity(items.len());
                for j in 0..cols {
                    for i in 0..rows {
                        out.push(items[i * cols + j].clone());
                    }
                }
                MatrixData::Explicit(out)
            }
        };
        SymMatrix {
            rows: self.cols.clone(),
            cols: self.rows.clone(),
            data,
        }
    }

    pub fn map(&self, f: &dyn Fn(&Sym) -> Sym) -> SymMatrix {
        match &self.data {
            MatrixData::Explicit(items) => SymMatrix {
                rows: self.rows.clone(),
                cols: self.cols.clone(),
                data: MatrixData::Explicit(items.iter().map(f).collect()),
            },
            MatrixData::Named { .. } => self.clone(),
        }
    }

    /// Apply `f` to every element, materializing a reference first
    pub fn map_elements(&self, f: &dyn Fn(&Sym) -> Sym) -> CompileResult<SymMatrix> {
        let (rows, cols) = self.require_shape("elementwise operation")?;
        Ok(Self::explicit(rows, cols, self.elements()?.iter().map(f).collect()))
    }

    fn same_shape(&self, other: &SymMatrix, operation: &str) -> CompileResult<()> {
        if self.rows.simplify() != other.rows.simplify() || self.cols.simplify() != other.cols.simplify() {
            return Err(CompileError::symbolic(format!(
                "{} of a {}x{} and a {}x{} matrix",
                operation, self.rows, self.cols, other.rows, other.cols
            )));
        }
        Ok(())
    }

    pub fn add(&self, other: &SymMatrix) -> CompileResult<SymMatrix> {
        self.same_shape(other, "addition")?;
        let (rows, cols) = self.require_shape("matrix addition")?;
        let items = self
            .elements()?
            .into_iter()
            .zip(other.elements()?)
            .map(|(a, b)| Sym::add(vec![a, b]))
            .collect();
        Ok(Self::explicit(rows, cols, items))
    }

    pub fn sub(&self, other: &SymMatrix) -> CompileResult<SymMatrix> {
        self.add(&other.scale(&Sym::Num(-1.0))?)
    }

    pub fn scale(&self, factor: &Sym) -> CompileResult<SymMatrix> {
        self.map_elements(&|e| Sym::mul(vec![factor.clone(), e.clone()]))
    }

    /// Matrix product; a symbolic inner dimension becomes a sum over `dummies`
    pub fn matmul(&self, other: &SymMatrix, dummies: &mut DummyNames) -> CompileResult<SymMatrix> {
        self.same_inner(other)?;
        let rows = literal_dim(&self.rows, "matrix product")?;
        let cols = literal_dim(&other.cols, "matrix product")?;

        let mut items = Vec::with_capacity(rows * cols);
        match self.cols.as_integer() {
            Some(inner) => {
                for i in 0..rows {
                    for j in 0..cols {
                        let (i, j) = (Sym::Num(i as f64), Sym::Num(j as f64));
                        let mut terms = Vec::with_capacity(inner as usize);
                        for k in 0..inner {
                            let k = Sym::Num(k as f64);
                            terms.push(Sym::mul(vec![self.element(&i, &k)?, other.element(&k, &j)?]));
                        }
                        items.push(Sym::add(terms));
                    }
                }
            }
            None => {
                let dummy = dummies.fresh();
                let k = Sym::symbol(dummy.clone());
                let upper = Sym::sub(self.cols.clone(), Sym::Num(1.0));
                for i in 0..rows {
                    for j in 0..cols {
                        let (i, j) = (Sym::Num(i as f64), Sym::Num(j as f64));
                        let body = Sym::mul(vec![self.element(&i, &k)?, other.element(&k, &j)?]);
                        items.push(Sym::aggregate(
                            LoopOp::Sum,
                            body,
                            dummy.clone(),
                            Sym::Num(0.0),
                            upper.clone(),
                        ));
                    }
                }
            }
        }
        Ok(Self::explicit(rows, cols, items))
    }

    fn same_inner(&self, other: &SymMatrix) -> CompileResult<()> {
        if self.cols.simplify() != other.rows.simplify() {
            return Err(CompileError::symbolic(format!(
                "cannot multiply a {}x{} by a {}x{} matrix",
                self.rows, self.cols, other.rows, other.cols
            )));
        }
        Ok(())
    }

    /// Cross product of two 3-element vectors
    pub fn cross(&self, other: &SymMatrix) -> CompileResult<SymMatrix> {
        let a = three_vector(self)?;
        let b = three_vector(other)?;
        let component = |i: usize, j: usize| {
            Sym::sub(
                Sym::mul(vec![a[i].clone(), b[j].clone()]),
                Sym::mul(vec![a[j].clone(), b[i].clone()]),
            )
        };
        Ok(Self::column(vec![component(1, 2), component(2, 0), component(0, 1)]))
    }

    /// Euclidean norm (Frobenius for matrices)
    pub fn norm(&self, dummies: &mut DummyNames) -> CompileResult<Sym> {
        let squared = |e: Sym| Sym::pow(e, Sym::Num(2.0));
        let sum = match self.literal_shape() {
            Some(_) => Sym::add(self.elements()?.into_iter().map(squared).collect()),
            None => {
                let row = dummies.fresh();
                let last_row = Sym::sub(self.rows.clone(), Sym::Num(1.0));
                if self.cols.is_one() {
                    let body = squared(self.element(&Sym::symbol(row.clone()), &Sym::Num(0.0))?);
                    Sym::aggregate(LoopOp::Sum, body, row, Sym::Num(0.0), last_row)
                } else {
                    let col = dummies.fresh();
                    let last_col = Sym::sub(self.cols.clone(), Sym::Num(1.0));
                    let body = squared(self.element(&Sym::symbol(row.clone()), &Sym::symbol(col.clone()))?);
                    let inner = Sym::aggregate(LoopOp::Sum, body, col, Sym::Num(0.0), last_col);
                    Sym::aggregate(LoopOp::Sum, inner, row, Sym::Num(0.0), last_row)
                }
            }
        };
        Ok(Sym::sqrt(sum))
    }
}

fn literal_dim(dim: &Sym, operation: &str) -> CompileResult<usize> {
    dim.as_integer()
        .filter(|d| *d >= 0)
        .map(|d| d as usize)
        .ok_or_else(|| CompileError::symbolic(format!("{} needs literal outer dimensions, got {}", operation, dim)))
}

fn three_vector(m: &SymMatrix) -> CompileResult<Vec<Sym>> {
    match m.literal_shape() {
        Some((3, 1)) | Some((1, 3)) => m.elements(),
        _ => Err(CompileError::symbolic(format!(
            "cross product needs 3-element vectors, got {}x{}",
            m.rows, m.cols
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vector(name: &str, n: usize) -> SymMatrix {
        SymMatrix::named(name, Sym::Num(n as f64), Sym::Num(1.0))
    }

    #[test]
    fn test_named_element_and_transpose() {
        let v = vector("v", 3);
        assert_eq!(
            v.element(&Sym::Num(2.0), &Sym::Num(0.0)).unwrap(),
            Sym::element("v", Sym::Num(2.0), Sym::Num(0.0))
        );
        let vt = v.transpose();
        assert_eq!(vt.literal_shape(), Some((1, 3)));
        assert_eq!(
            vt.element(&Sym::Num(0.0), &Sym::Num(2.0)).unwrap(),
            Sym::element("v", Sym::Num(2.0), Sym::Num(0.0))
        );
        assert!(v.element(&Sym::Num(3.0), &Sym::Num(0.0)).is_err());
    }

    #[test]
    fn test_dot_product_through_matmul() {
        let v = vector("v", 2);
        let product = v.transpose().matmul(&v, &mut DummyNames::default()).unwrap();
        let dot = product.as_scalar().unwrap().simplify();
        assert_eq!(dot.to_string(), "v[0, 0]**2 + v[1, 0]**2");
    }

    #[test]
    fn test_symbolic_inner_dimension_becomes_sum() {
        let n = Sym::symbol("n");
        let v = SymMatrix::named("v", n.clone(), Sym::Num(1.0));
        let w = SymMatrix::named("w", n, Sym::Num(1.0));
        let product = v.transpose().matmul(&w, &mut DummyNames::default()).unwrap();
        assert_eq!(
            product.as_scalar().unwrap().simplify().to_string(),
            "Sum(v[_k0, 0]*w[_k0, 0], (_k0, 0, -1 + n))"
        );
    }

    #[test]
    fn test_cross() {
        let a = SymMatrix::column(vec![Sym::Num(1.0), Sym::Num(0.0), Sym::Num(0.0)]);
        let b = SymMatrix::column(vec![Sym::Num(0.0), Sym::Num(1.0), Sym::Num(0.0)]);
        let c = a.cross(&b).unwrap();
        let items: Vec<Sym> = c.elements().unwrap().iter().map(Sym::simplify).collect();
        assert_eq!(items, vec![Sym::Num(0.0), Sym::Num(0.0), Sym::Num(1.0)]);
    }

    #[test]
    fn test_add_shape_mismatch() {
        let a = vector("a", 2);
        let b = vector("b", 3);
        assert!(a.add(&b).is_err());
    }
}
