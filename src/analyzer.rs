//! Type analyzer for specification expressions
//!
//! The analyzer owns the type environment of one compilation. The parser asks
//! it to declare names and to build every expression node, so each node is
//! typed (and single-element containers collapsed) as soon as it exists.

use std::collections::HashMap;

use crate::ast::*;
use crate::error::{CompileError, CompileResult};
use crate::target::is_reserved_word;

/// What a name in the environment refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindingKind {
    Constant,
    Variable,
    LoopCounter,
    Expression,
}

/// Type environment entry
#[derive(Debug, Clone, PartialEq)]
pub struct Binding {
    pub ty: ExprType,
    pub kind: BindingKind,
    /// Literal value of a constant, when it is one
    pub value: Option<f64>,
}

/// Analyzer for type checking and shape inference
pub struct Analyzer {
    bindings: HashMap<String, Binding>,
    /// Declared variables in declaration order
    variables: Vec<Symbol>,
    /// Loop counters in order of first appearance
    loop_counters: Vec<Symbol>,
}

impl Analyzer {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            variables: Vec::new(),
            loop_counters: Vec::new(),
        }
    }

    /// Look up a name visible at this point
    pub fn lookup(&self, name: &str, line: usize) -> CompileResult<&Binding> {
        self.bindings
            .get(name)
            .ok_or_else(|| CompileError::undefined(name, line))
    }

    fn declare(&mut self, name: &str, binding: Binding, line: usize) -> CompileResult<()> {
        if self.bindings.contains_key(name) {
            return Err(CompileError::type_error(
                line,
                format!("'{}' is already declared", name),
            ));
        }
        self.bindings.insert(name.to_string(), binding);
        Ok(())
    }

    pub fn declare_constant(&mut self, name: &str, value: &AstExpr, line: usize) -> CompileResult<()> {
        let binding = Binding {
            ty: value.ty.clone(),
            kind: BindingKind::Constant,
            value: value.literal_value(),
        };
        self.declare(name, binding, line)
    }

    pub fn declare_variable(
        &mut self,
        name: &str,
        ty: ExprType,
        usage: Usage,
        line: usize,
    ) -> CompileResult<()> {
        if is_reserved_word(name) {
            return Err(CompileError::type_error(
                line,
                format!("'{}' is reserved in generated code and cannot name a variable", name),
            ));
        }
        let binding = Binding {
            ty: ty.clone(),
            kind: BindingKind::Variable,
            value: None,
        };
        self.declare(name, binding, line)?;
        self.variables.push(Symbol {
            name: name.to_string(),
            ty,
            usage,
            line,
        });
        Ok(())
    }

    pub fn declare_expression(&mut self, name: &str, ty: ExprType, line: usize) -> CompileResult<()> {
        let binding = Binding {
            ty,
            kind: BindingKind::Expression,
            value: None,
        };
        self.declare(name, binding, line)
    }

    /// Dimension given as a literal size
    pub fn literal_dim(&self, size: i64, line: usize) -> CompileResult<Dim> {
        if size < 1 {
            return Err(CompileError::type_error(
                line,
                format!("dimension must be a positive integer, got {}", size),
            ));
        }
        Ok(Dim::Literal(size as usize))
    }

    /// Dimension given by name: an integer constant folds to a literal, a
    /// declared `number` variable stays symbolic.
    pub fn resolve_dim(&self, name: &str, line: usize) -> CompileResult<Dim> {
        let binding = self.lookup(name, line)?;
        match binding.kind {
            BindingKind::Constant => match binding.value {
                Some(v) if v.fract() == 0.0 && v >= 1.0 => Ok(Dim::Literal(v as usize)),
                _ => Err(CompileError::type_error(
                    line,
                    format!("constant '{}' is not a positive integer literal", name),
                )),
            },
            BindingKind::Variable if binding.ty.is_number() => Ok(Dim::Named(name.to_string())),
            _ => Err(CompileError::type_error(
                line,
                format!("'{}' cannot be used as a dimension", name),
            )),
        }
    }

    /// Bring a loop counter into scope.
    ///
    /// Returns the binding it shadows so that [`Analyzer::exit_loop`] can
    /// restore it. Counters may be reused by later or nested loops but never
    /// shadow a constant, variable or named expression.
    pub fn enter_loop(&mut self, counter: &str, line: usize) -> CompileResult<Option<Binding>> {
        let previous = match self.bindings.get(counter) {
            Some(b) if b.kind == BindingKind::LoopCounter => Some(b.clone()),
            Some(_) => {
                return Err(CompileError::type_error(
                    line,
                    format!("loop counter '{}' shadows a declared name", counter),
                ))
            }
            None => None,
        };

        self.bindings.insert(
            counter.to_string(),
            Binding {
                ty: ExprType::number(),
                kind: BindingKind::LoopCounter,
                value: None,
            },
        );

        if !self.loop_counters.iter().any(|s| s.name == counter) {
            self.loop_counters.push(Symbol {
                name: counter.to_string(),
                ty: ExprType::number(),
                usage: Usage::UsedInLoop,
                line,
            });
        }

        Ok(previous)
    }

    pub fn exit_loop(&mut self, counter: &str, previous: Option<Binding>) {
        match previous {
            Some(binding) => {
                self.bindings.insert(counter.to_string(), binding);
            }
            None => {
                self.bindings.remove(counter);
            }
        }
    }

    /// Type a freshly parsed node
    pub fn build(&self, node: ExprNode, line: usize) -> CompileResult<AstExpr> {
        let ty = self.infer(&node, line)?;
        Ok(AstExpr::new(node, ty, line))
    }

    /// All symbols seen: declared variables first, then loop counters
    pub fn finish(self) -> Vec<Symbol> {
        let mut symbols = self.variables;
        symbols.extend(self.loop_counters);
        symbols
    }

    fn infer(&self, node: &ExprNode, line: usize) -> CompileResult<ExprType> {
        match node {
            ExprNode::Symbol(name) => Ok(self.lookup(name, line)?.ty.clone()),

            ExprNode::Literal(_) => Ok(ExprType::number()),

            ExprNode::VectorLiteral(items) => {
                if items.is_empty() {
                    return Err(CompileError::type_error(line, "empty vector literal"));
                }
                require_numbers(items, line)?;
                Ok(ExprType::vector(Dim::Literal(items.len())))
            }

            ExprNode::MatrixLiteral(rows) => {
                if rows.is_empty() || rows[0].is_empty() {
                    return Err(CompileError::type_error(line, "empty matrix literal"));
                }
                let expected_len = rows[0].len();
                for (i, row) in rows.iter().enumerate() {
                    if row.len() != expected_len {
                        return Err(CompileError::type_error(
                            line,
                            format!("Row {} has {} elements, expected {}", i, row.len(), expected_len),
                        ));
                    }
                    require_numbers(row, line)?;
                }
                Ok(ExprType::matrix(
                    Dim::Literal(rows.len()),
                    Dim::Literal(expected_len),
                ))
            }

            ExprNode::Binary(op, lhs, rhs) => self.infer_binary(*op, &lhs.ty, &rhs.ty, line),

            ExprNode::Neg(inner) => Ok(inner.ty.clone()),

            ExprNode::Call(func, arg) => match func {
                MathFunc::Norm => Ok(ExprType::number()),
                MathFunc::Transpose => Ok(transpose_type(&arg.ty)),
                _ => {
                    if !arg.ty.is_number() {
                        return Err(CompileError::type_error(
                            line,
                            format!("{} expects a number, got {}", func.name(), arg.ty),
                        ));
                    }
                    Ok(ExprType::number())
                }
            },

            ExprNode::PostfixTranspose(inner) => Ok(transpose_type(&inner.ty)),

            ExprNode::Index {
                target,
                target_ty,
                indices,
            } => {
                let expected = match target_ty.kind {
                    TypeKind::Vector => 1,
                    TypeKind::Matrix => 2,
                    TypeKind::Number => {
                        return Err(CompileError::type_error(
                            line,
                            format!("'{}' is a number and cannot be indexed", target),
                        ))
                    }
                };
                if indices.len() != expected {
                    return Err(CompileError::type_error(
                        line,
                        format!(
                            "'{}' is a {} and takes {} index(es), got {}",
                            target,
                            target_ty,
                            expected,
                            indices.len()
                        ),
                    ));
                }
                require_numbers(indices, line)?;

                let bounds = [target_ty.rows(), target_ty.cols()];
                for (index, bound) in indices.iter().zip(bounds.iter()) {
                    if let (Some(i), Some(n)) = (index.literal_value(), bound.literal()) {
                        if i < 0.0 || i.fract() != 0.0 || i as usize >= n {
                            return Err(CompileError::type_error(
                                line,
                                format!("index {} is out of range for '{}' ({})", i, target, target_ty),
                            ));
                        }
                    }
                }
                Ok(ExprType::number())
            }

            ExprNode::Loop { ranges, body, .. } => {
                for range in ranges {
                    if !range.lower.ty.is_number() || !range.upper.ty.is_number() {
                        return Err(CompileError::type_error(
                            line,
                            format!("bounds of loop over '{}' must be numbers", range.counter),
                        ));
                    }
                }
                Ok(body.ty.clone())
            }
        }
    }

    fn infer_binary(
        &self,
        op: BinaryOp,
        left: &ExprType,
        right: &ExprType,
        line: usize,
    ) -> CompileResult<ExprType> {
        match op {
            BinaryOp::Add | BinaryOp::Sub => match (left.is_number(), right.is_number()) {
                (true, true) => Ok(ExprType::number()),
                (false, false) if left.rows() == right.rows() && left.cols() == right.cols() => {
                    Ok(left.clone())
                }
                _ => Err(shape_mismatch(line, left, right)),
            },

            BinaryOp::Mul => {
                if left.is_number() {
                    return Ok(right.clone());
                }
                if right.is_number() {
                    return Ok(left.clone());
                }
                if left.cols() != right.rows() {
                    return Err(CompileError::ShapeMismatch {
                        line,
                        expected: format!("{} rows on the right operand", left.cols()),
                        got: format!("{} * {}", left, right),
                    });
                }
                Ok(ExprType::matrix(left.rows(), right.cols()))
            }

            BinaryOp::Div => {
                if !right.is_number() {
                    return Err(CompileError::type_error(
                        line,
                        format!("cannot divide by a {}", right),
                    ));
                }
                Ok(left.clone())
            }

            BinaryOp::Pow => {
                if !left.is_number() || !right.is_number() {
                    return Err(CompileError::type_error(
                        line,
                        format!("'^' expects numbers, got {} and {}", left, right),
                    ));
                }
                Ok(ExprType::number())
            }

            BinaryOp::Dot => match (left.kind, right.kind) {
                (TypeKind::Number, TypeKind::Number) => Ok(ExprType::number()),
                (TypeKind::Vector, TypeKind::Vector) if left.dims == right.dims => {
                    Ok(ExprType::number())
                }
                (TypeKind::Vector, TypeKind::Vector) => Err(shape_mismatch(line, left, right)),
                _ => Err(CompileError::type_error(
                    line,
                    format!("'.' expects two vectors, got {} and {}", left, right),
                )),
            },

            BinaryOp::Cross => {
                let three = ExprType::vector(Dim::Literal(3));
                if *left != three || *right != three {
                    return Err(CompileError::type_error(
                        line,
                        format!("'#' expects two vector(3) operands, got {} and {}", left, right),
                    ));
                }
                Ok(three)
            }
        }
    }
}

impl Default for Analyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn require_numbers(items: &[AstExpr], line: usize) -> CompileResult<()> {
    match items.iter().find(|e| !e.ty.is_number()) {
        Some(item) => Err(CompileError::type_error(
            line,
            format!("expected a number, got {}", item.ty),
        )),
        None => Ok(()),
    }
}

fn transpose_type(ty: &ExprType) -> ExprType {
    match ty.kind {
        TypeKind::Number => ExprType::number(),
        TypeKind::Vector | TypeKind::Matrix => ExprType::matrix(ty.cols(), ty.rows()),
    }
}

fn shape_mismatch(line: usize, expected: &ExprType, got: &ExprType) -> CompileError {
    CompileError::ShapeMismatch {
        line,
        expected: expected.to_string(),
        got: got.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(analyzer: &Analyzer, node: ExprNode) -> AstExpr {
        analyzer.build(node, 1).unwrap()
    }

    fn symbol(analyzer: &Analyzer, name: &str) -> AstExpr {
        typed(analyzer, ExprNode::Symbol(name.to_string()))
    }

    fn setup() -> Analyzer {
        let mut analyzer = Analyzer::new();
        analyzer
            .declare_variable("x", ExprType::number(), Usage::Normal, 1)
            .unwrap();
        analyzer
            .declare_variable("n", ExprType::number(), Usage::NoDiff, 2)
            .unwrap();
        analyzer
            .declare_variable("v", ExprType::vector(Dim::Literal(3)), Usage::Normal, 3)
            .unwrap();
        analyzer
            .declare_variable(
                "A",
                ExprType::matrix(Dim::Literal(2), Dim::Literal(3)),
                Usage::Normal,
                4,
            )
            .unwrap();
        analyzer
    }

    #[test]
    fn test_matrix_vector_product() {
        let analyzer = setup();
        let a = symbol(&analyzer, "A");
        let v = symbol(&analyzer, "v");
        let product = typed(&analyzer, ExprNode::Binary(BinaryOp::Mul, Box::new(a), Box::new(v)));
        assert_eq!(
            product.ty,
            ExprType::matrix(Dim::Literal(2), Dim::Literal(1))
        );
    }

    #[test]
    fn test_inner_dimension_mismatch() {
        let analyzer = setup();
        let v = symbol(&analyzer, "v");
        let a = symbol(&analyzer, "A");
        let err = analyzer
            .build(ExprNode::Binary(BinaryOp::Mul, Box::new(v), Box::new(a)), 7)
            .unwrap_err();
        assert!(matches!(err, CompileError::ShapeMismatch { line: 7, .. }));
    }

    #[test]
    fn test_add_number_to_vector_is_shape_mismatch() {
        let analyzer = setup();
        let x = symbol(&analyzer, "x");
        let v = symbol(&analyzer, "v");
        let err = analyzer
            .build(ExprNode::Binary(BinaryOp::Add, Box::new(x), Box::new(v)), 1)
            .unwrap_err();
        assert!(matches!(err, CompileError::ShapeMismatch { .. }));
    }

    #[test]
    fn test_row_times_column_collapses() {
        let analyzer = setup();
        let v = symbol(&analyzer, "v");
        let vt = typed(&analyzer, ExprNode::PostfixTranspose(Box::new(v.clone())));
        let product = typed(&analyzer, ExprNode::Binary(BinaryOp::Mul, Box::new(vt), Box::new(v)));
        assert!(product.ty.is_number());
        assert!(product.collapsed);
        assert_eq!(product.to_symbolic(), "(((v).T)*(v))[0,0]");
    }

    #[test]
    fn test_dimensions() {
        let mut analyzer = setup();
        let three = typed(&analyzer, ExprNode::Literal(3.0));
        analyzer.declare_constant("N", &three, 5).unwrap();

        assert_eq!(analyzer.resolve_dim("N", 6).unwrap(), Dim::Literal(3));
        assert_eq!(
            analyzer.resolve_dim("n", 6).unwrap(),
            Dim::Named("n".to_string())
        );
        assert!(matches!(
            analyzer.resolve_dim("v", 6),
            Err(CompileError::TypeError { .. })
        ));
        assert!(matches!(
            analyzer.resolve_dim("missing", 6),
            Err(CompileError::UndefinedVariable { .. })
        ));
        assert!(analyzer.literal_dim(0, 6).is_err());
    }

    #[test]
    fn test_redeclaration_is_rejected() {
        let mut analyzer = setup();
        let err = analyzer
            .declare_variable("x", ExprType::number(), Usage::Normal, 9)
            .unwrap_err();
        assert!(matches!(err, CompileError::TypeError { line: 9, .. }));
    }

    #[test]
    fn test_reserved_word_cannot_name_a_variable() {
        let mut analyzer = Analyzer::new();
        let err = analyzer
            .declare_variable("int", ExprType::number(), Usage::Normal, 4)
            .unwrap_err();
        assert!(matches!(err, CompileError::TypeError { line: 4, .. }));
        assert!(analyzer
            .declare_variable("Math", ExprType::vector(Dim::Literal(2)), Usage::Normal, 5)
            .is_err());
        assert!(analyzer
            .declare_variable("integer", ExprType::number(), Usage::Normal, 6)
            .is_ok());
    }

    #[test]
    fn test_loop_counter_scope() {
        let mut analyzer = setup();
        let previous = analyzer.enter_loop("i", 3).unwrap();
        assert!(analyzer.lookup("i", 3).is_ok());
        analyzer.exit_loop("i", previous);
        assert!(analyzer.lookup("i", 4).is_err());

        // reuse is fine, shadowing a variable is not
        let previous = analyzer.enter_loop("i", 5).unwrap();
        analyzer.exit_loop("i", previous);
        assert!(analyzer.enter_loop("x", 6).is_err());

        let symbols = analyzer.finish();
        let counters: Vec<_> = symbols
            .iter()
            .filter(|s| s.usage == Usage::UsedInLoop)
            .collect();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0].name, "i");
    }

    #[test]
    fn test_index_bounds() {
        let analyzer = setup();
        let ok = analyzer.build(
            ExprNode::Index {
                target: "v".to_string(),
                target_ty: ExprType::vector(Dim::Literal(3)),
                indices: vec![typed(&analyzer, ExprNode::Literal(2.0))],
            },
            1,
        );
        assert!(ok.is_ok());

        let out_of_range = analyzer.build(
            ExprNode::Index {
                target: "v".to_string(),
                target_ty: ExprType::vector(Dim::Literal(3)),
                indices: vec![typed(&analyzer, ExprNode::Literal(3.0))],
            },
            1,
        );
        assert!(matches!(out_of_range, Err(CompileError::TypeError { .. })));
    }

    #[test]
    fn test_cross_requires_three_vectors() {
        let analyzer = setup();
        let v = symbol(&analyzer, "v");
        let cross = typed(
            &analyzer,
            ExprNode::Binary(BinaryOp::Cross, Box::new(v.clone()), Box::new(v)),
        );
        assert_eq!(cross.ty, ExprType::vector(Dim::Literal(3)));

        let x = symbol(&analyzer, "x");
        assert!(analyzer
            .build(ExprNode::Binary(BinaryOp::Cross, Box::new(x.clone()), Box::new(x)), 1)
            .is_err());
    }
}
