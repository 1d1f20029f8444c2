//! Scalarized view of the differentiation variables
//!
//! Every vector or matrix variable with a literal shape is expanded into its
//! elements, row by row. The resulting order names the partial derivative
//! methods and indexes the Jacobian and the Hessian.

use crate::ast::{Symbol, TypeKind, Usage};
use crate::error::{CompileError, CompileResult};
use crate::symbolic::Sym;

/// A differentiation variable with a known shape
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    pub name: String,
    pub kind: TypeKind,
    /// `(rows, cols)`; numbers are 1×1 and vectors are columns
    pub shape: (usize, usize),
    pub usage: Usage,
}

impl Variable {
    pub fn from_symbol(symbol: &Symbol) -> CompileResult<Self> {
        let shape = symbol.literal_shape().ok_or_else(|| {
            CompileError::codegen(format!(
                "cannot differentiate '{}' with symbolic dimensions {}",
                symbol.name, symbol.ty
            ))
        })?;
        Ok(Self {
            name: symbol.name.clone(),
            kind: symbol.ty.kind,
            shape,
            usage: symbol.usage,
        })
    }

    pub fn size(&self) -> usize {
        self.shape.0 * self.shape.1
    }

    /// Scalar atoms of this variable in row-major order
    pub fn atoms(&self) -> Vec<Sym> {
        match self.kind {
            TypeKind::Number => vec![Sym::symbol(self.name.clone())],
            TypeKind::Vector | TypeKind::Matrix => {
                let (rows, cols) = self.shape;
                (0..rows)
                    .flat_map(|r| {
                        (0..cols).map(move |c| {
                            Sym::element(self.name.clone(), Sym::Num(r as f64), Sym::Num(c as f64))
                        })
                    })
                    .collect()
            }
        }
    }
}

/// Expand differentiation variables into scalar atoms, in declaration order
pub fn expand(diff_variables: &[Symbol]) -> CompileResult<Vec<Sym>> {
    let mut atoms = Vec::new();
    for symbol in diff_variables {
        atoms.extend(Variable::from_symbol(symbol)?.atoms());
    }
    Ok(atoms)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{Dim, ExprType};

    fn symbol(name: &str, ty: ExprType) -> Symbol {
        Symbol {
            name: name.to_string(),
            ty,
            usage: Usage::Normal,
            line: 1,
        }
    }

    #[test]
    fn test_expand_order() {
        let vars = vec![
            symbol("x", ExprType::number()),
            symbol("m", ExprType::matrix(Dim::Literal(2), Dim::Literal(2))),
            symbol("v", ExprType::vector(Dim::Literal(2))),
        ];
        let atoms: Vec<String> = expand(&vars).unwrap().iter().map(|a| a.to_string()).collect();
        assert_eq!(
            atoms,
            vec!["x", "m[0, 0]", "m[0, 1]", "m[1, 0]", "m[1, 1]", "v[0, 0]", "v[1, 0]"]
        );
    }

    #[test]
    fn test_symbolic_shape_is_rejected() {
        let vars = vec![symbol("w", ExprType::vector(Dim::Named("n".to_string())))];
        assert!(matches!(expand(&vars), Err(CompileError::CodeGenError { .. })));
    }
}
