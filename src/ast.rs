//! Abstract Syntax Tree definitions for expression specifications
//!
//! Every [`AstExpr`] carries the type inferred for it when it was built by the
//! [`Analyzer`](crate::analyzer::Analyzer). The tree also knows how to project
//! itself into the textual form read by the symbolic engine.

use serde::Serialize;

/// A complete specification: constants, declared variables and named expressions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Program {
    pub constants: Vec<Constant>,
    /// Declared variables followed by the loop counters found while parsing
    pub variables: Vec<Symbol>,
    /// Named expressions in source order, including `main`
    pub expressions: Vec<NamedExpr>,
}

impl Program {
    /// The `main` expression
    pub fn main(&self) -> Option<&NamedExpr> {
        self.expressions.iter().find(|e| e.name == MAIN_EXPRESSION)
    }

    /// Named expressions up to and including `main`
    pub fn evaluated_expressions(&self) -> &[NamedExpr] {
        match self.expressions.iter().position(|e| e.name == MAIN_EXPRESSION) {
            Some(idx) => &self.expressions[..=idx],
            None => &self.expressions,
        }
    }

    /// Variables that become function parameters (everything but loop counters)
    pub fn parameters(&self) -> Vec<Symbol> {
        self.variables
            .iter()
            .filter(|s| s.usage != Usage::UsedInLoop)
            .cloned()
            .collect()
    }

    /// Synthetic loop counters
    pub fn loop_counters(&self) -> impl Iterator<Item = &Symbol> {
        self.variables.iter().filter(|s| s.usage == Usage::UsedInLoop)
    }
}

/// Name of the expression that code is generated for
pub const MAIN_EXPRESSION: &str = "main";

/// A `const NAME = expr` declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Constant {
    pub name: String,
    pub value: AstExpr,
    pub line: usize,
}

/// An `expr NAME = expr` declaration
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NamedExpr {
    pub name: String,
    pub value: AstExpr,
    pub line: usize,
}

/// A declared variable (or a synthetic loop counter)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Symbol {
    pub name: String,
    pub ty: ExprType,
    pub usage: Usage,
    pub line: usize,
}

impl Symbol {
    /// Literal `(rows, cols)` of the symbol; vectors are columns
    pub fn literal_shape(&self) -> Option<(usize, usize)> {
        self.ty.literal_shape()
    }
}

/// How a variable takes part in differentiation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Usage {
    Normal,
    /// Excluded from the differentiation variables
    NoDiff,
    /// Accepted and recorded; differentiated like a normal variable
    Equivalent,
    /// Synthetic counter introduced by a `for` loop
    UsedInLoop,
}

/// One dimension of a vector or matrix type
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Dim {
    Literal(usize),
    /// Name of a previously declared `number` variable
    Named(String),
}

impl Dim {
    pub fn literal(&self) -> Option<usize> {
        match self {
            Dim::Literal(n) => Some(*n),
            Dim::Named(_) => None,
        }
    }

    /// Projection into symbolic text
    pub fn to_symbolic(&self) -> String {
        self.to_string()
    }
}

impl std::fmt::Display for Dim {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Dim::Literal(n) => write!(f, "{}", n),
            Dim::Named(name) => write!(f, "{}", name),
        }
    }
}

/// Kind of value an expression produces
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TypeKind {
    Number,
    Vector,
    Matrix,
}

/// Type of an expression with its dimensions
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExprType {
    pub kind: TypeKind,
    pub dims: Vec<Dim>,
}

impl ExprType {
    pub fn number() -> Self {
        Self {
            kind: TypeKind::Number,
            dims: Vec::new(),
        }
    }

    pub fn vector(size: Dim) -> Self {
        Self {
            kind: TypeKind::Vector,
            dims: vec![size],
        }
    }

    pub fn matrix(rows: Dim, cols: Dim) -> Self {
        Self {
            kind: TypeKind::Matrix,
            dims: vec![rows, cols],
        }
    }

    pub fn is_number(&self) -> bool {
        self.kind == TypeKind::Number
    }

    /// Row dimension; vectors are column vectors and numbers are 1x1
    pub fn rows(&self) -> Dim {
        match self.kind {
            TypeKind::Number => Dim::Literal(1),
            TypeKind::Vector | TypeKind::Matrix => self.dims[0].clone(),
        }
    }

    /// Column dimension
    pub fn cols(&self) -> Dim {
        match self.kind {
            TypeKind::Number | TypeKind::Vector => Dim::Literal(1),
            TypeKind::Matrix => self.dims[1].clone(),
        }
    }

    pub fn literal_shape(&self) -> Option<(usize, usize)> {
        Some((self.rows().literal()?, self.cols().literal()?))
    }

    /// A vector of length 1 or a 1x1 matrix
    pub fn is_size_one_container(&self) -> bool {
        !self.is_number() && self.literal_shape() == Some((1, 1))
    }

    /// Collapse single-element containers to NUMBER.
    ///
    /// Returns the normalized type and whether a collapse happened.
    pub fn normalize(self) -> (ExprType, bool) {
        if self.is_size_one_container() {
            (ExprType::number(), true)
        } else {
            (self, false)
        }
    }
}

impl std::fmt::Display for ExprType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.kind {
            TypeKind::Number => write!(f, "number"),
            TypeKind::Vector => write!(f, "vector({})", self.dims[0]),
            TypeKind::Matrix => write!(f, "matrix({}, {})", self.dims[0], self.dims[1]),
        }
    }
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    /// `a . b`
    Dot,
    /// `a # b`
    Cross,
}

impl std::fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
            BinaryOp::Dot => ".",
            BinaryOp::Cross => "#",
        };
        write!(f, "{}", op)
    }
}

/// Built-in functions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MathFunc {
    Abs,
    Sqrt,
    Sin,
    Cos,
    Tan,
    Cot,
    Ln,
    Norm,
    Transpose,
}

impl MathFunc {
    pub fn name(&self) -> &'static str {
        match self {
            MathFunc::Abs => "abs",
            MathFunc::Sqrt => "sqrt",
            MathFunc::Sin => "sin",
            MathFunc::Cos => "cos",
            MathFunc::Tan => "tan",
            MathFunc::Cot => "cot",
            MathFunc::Ln => "ln",
            MathFunc::Norm => "norm",
            MathFunc::Transpose => "transpose",
        }
    }
}

/// Aggregation performed by a loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum LoopKind {
    Sum,
    Product,
}

/// `for counter in [lower, upper]`, both bounds inclusive
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LoopRange {
    pub counter: String,
    pub lower: AstExpr,
    pub upper: AstExpr,
}

impl LoopRange {
    pub fn to_symbolic(&self) -> String {
        format!(
            "({},{},{})",
            self.counter,
            self.lower.to_symbolic(),
            self.upper.to_symbolic()
        )
    }
}

/// Expression node kinds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum ExprNode {
    /// Reference to a constant, variable, loop counter or named expression
    Symbol(String),

    /// Numeric literal
    Literal(f64),

    /// Vector literal: `[a, b, c]`
    VectorLiteral(Vec<AstExpr>),

    /// Matrix literal: `[[a, b], [c, d]]`
    MatrixLiteral(Vec<Vec<AstExpr>>),

    Binary(BinaryOp, Box<AstExpr>, Box<AstExpr>),

    /// Unary minus
    Neg(Box<AstExpr>),

    /// Function call: `sin(x)`, `norm(v)`, `transpose(m)`
    Call(MathFunc, Box<AstExpr>),

    /// Postfix transpose: `m'`
    PostfixTranspose(Box<AstExpr>),

    /// Element access: `v[i]` or `m[i][j]`
    Index {
        target: String,
        target_ty: ExprType,
        indices: Vec<AstExpr>,
    },

    /// `for i in [a, b] ... sum(body)` / `product(body)`
    Loop {
        kind: LoopKind,
        ranges: Vec<LoopRange>,
        body: Box<AstExpr>,
    },
}

/// Typed expression
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AstExpr {
    pub node: ExprNode,
    pub ty: ExprType,
    /// The true shape is a single-element container that was re-typed as NUMBER
    pub collapsed: bool,
    pub line: usize,
}

impl AstExpr {
    /// Wrap a node with its inferred type, collapsing single-element containers
    pub fn new(node: ExprNode, ty: ExprType, line: usize) -> Self {
        let (ty, collapsed) = ty.normalize();
        Self {
            node,
            ty,
            collapsed,
            line,
        }
    }

    /// Literal numeric value, looking through unary minus
    pub fn literal_value(&self) -> Option<f64> {
        match &self.node {
            ExprNode::Literal(v) => Some(*v),
            ExprNode::Neg(inner) => inner.literal_value().map(|v| -v),
            _ => None,
        }
    }

    /// Project the expression into the text read by the symbolic engine
    pub fn to_symbolic(&self) -> String {
        let text = match &self.node {
            ExprNode::Symbol(name) => name.clone(),
            ExprNode::Literal(v) => format_literal(*v),
            ExprNode::VectorLiteral(items) => format!("Matrix([{}])", join_symbolic(items)),
            ExprNode::MatrixLiteral(rows) => {
                let rows: Vec<String> = rows
                    .iter()
                    .map(|row| format!("[{}]", join_symbolic(row)))
                    .collect();
                format!("Matrix([{}])", rows.join(","))
            }
            ExprNode::Binary(op, lhs, rhs) => {
                let (l, r) = (lhs.to_symbolic(), rhs.to_symbolic());
                match op {
                    BinaryOp::Add => format!("({})+({})", l, r),
                    BinaryOp::Sub => format!("({})-({})", l, r),
                    BinaryOp::Mul => format!("({})*({})", l, r),
                    BinaryOp::Div => format!("({})/({})", l, r),
                    BinaryOp::Pow => format!("({})**({})", l, r),
                    BinaryOp::Dot => format!("(({}).T*({}))[0,0]", l, r),
                    BinaryOp::Cross => format!("({}).cross({})", l, r),
                }
            }
            ExprNode::Neg(inner) => format!("-({})", inner.to_symbolic()),
            ExprNode::Call(func, arg) => {
                let a = arg.to_symbolic();
                match func {
                    MathFunc::Abs => format!("Abs({})", a),
                    MathFunc::Sqrt => format!("sqrt({})", a),
                    MathFunc::Sin => format!("sin({})", a),
                    MathFunc::Cos => format!("cos({})", a),
                    MathFunc::Tan => format!("tan({})", a),
                    MathFunc::Cot => format!("cot({})", a),
                    MathFunc::Ln => format!("log({})", a),
                    MathFunc::Norm => format!("({}).norm()", a),
                    MathFunc::Transpose => format!("Transpose({})", a),
                }
            }
            ExprNode::PostfixTranspose(inner) => format!("({}).T", inner.to_symbolic()),
            ExprNode::Index {
                target,
                target_ty,
                indices,
            } => {
                let mut parts: Vec<String> = indices.iter().map(|i| i.to_symbolic()).collect();
                if target_ty.kind == TypeKind::Vector {
                    parts.push("0".to_string());
                }
                format!("({})[{}]", target, parts.join(","))
            }
            ExprNode::Loop { kind, ranges, body } => {
                let func = match kind {
                    LoopKind::Sum => "Sum",
                    LoopKind::Product => "Product",
                };
                let ranges: Vec<String> = ranges.iter().map(LoopRange::to_symbolic).collect();
                format!("{}({},{})", func, body.to_symbolic(), ranges.join(","))
            }
        };

        if self.collapsed {
            format!("({})[0,0]", text)
        } else {
            text
        }
    }
}

fn join_symbolic(items: &[AstExpr]) -> String {
    items
        .iter()
        .map(AstExpr::to_symbolic)
        .collect::<Vec<_>>()
        .join(",")
}

/// Literal text understood by the symbolic parser
fn format_literal(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{:e}", v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn num(v: f64) -> AstExpr {
        AstExpr::new(ExprNode::Literal(v), ExprType::number(), 1)
    }

    fn sym(name: &str, ty: ExprType) -> AstExpr {
        AstExpr::new(ExprNode::Symbol(name.to_string()), ty, 1)
    }

    #[test]
    fn test_collapse_single_element_containers() {
        let v = sym("v", ExprType::vector(Dim::Literal(1)));
        assert!(v.collapsed);
        assert!(v.ty.is_number());
        assert_eq!(v.to_symbolic(), "(v)[0,0]");

        let m = sym("m", ExprType::matrix(Dim::Literal(2), Dim::Literal(1)));
        assert!(!m.collapsed);
        assert_eq!(m.ty.kind, TypeKind::Matrix);
    }

    #[test]
    fn test_symbolic_dimension_never_collapses() {
        let v = sym("v", ExprType::vector(Dim::Named("n".to_string())));
        assert!(!v.collapsed);
        assert_eq!(v.ty.literal_shape(), None);
    }

    #[test]
    fn test_binary_projection() {
        let x = sym("x", ExprType::number());
        let e = AstExpr::new(
            ExprNode::Binary(BinaryOp::Pow, Box::new(x), Box::new(num(2.0))),
            ExprType::number(),
            1,
        );
        assert_eq!(e.to_symbolic(), "(x)**(2)");
    }

    #[test]
    fn test_dot_and_index_projection() {
        let v = sym("v", ExprType::vector(Dim::Literal(3)));
        let w = sym("w", ExprType::vector(Dim::Literal(3)));
        let dot = AstExpr::new(
            ExprNode::Binary(BinaryOp::Dot, Box::new(v), Box::new(w)),
            ExprType::number(),
            1,
        );
        assert_eq!(dot.to_symbolic(), "((v).T*(w))[0,0]");

        let idx = AstExpr::new(
            ExprNode::Index {
                target: "v".to_string(),
                target_ty: ExprType::vector(Dim::Literal(3)),
                indices: vec![num(1.0)],
            },
            ExprType::number(),
            1,
        );
        assert_eq!(idx.to_symbolic(), "(v)[1,0]");
    }

    #[test]
    fn test_literal_format() {
        assert_eq!(format_literal(3.0), "3");
        assert_eq!(format_literal(0.25), "2.5e-1");
    }
}
