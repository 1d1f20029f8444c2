//! Class assembler
//!
//! Lays out one compilation unit: provenance header, optional package, the
//! class with a no-arg constructor, `eval`, the first-order partials and
//! `jacobian`, then the second-order partials and `hessian`.

use tracing::info;

use crate::codegen::ExprCodeGenerator;
use crate::config::GeneratorConfig;
use crate::derivative::{DerivativeCodeGenerator, DEFAULT_BASE_NAME};
use crate::error::CompileResult;
use crate::jacobian::{DispatchContext, HessianCodeGenerator, JacobianCodeGenerator};
use crate::lowering::LoweredProgram;
use crate::target::Target;
use crate::writer::CodeWriter;

/// Modifiers of every generated method
pub const METHOD_MODIFIERS: &[&str] = &["public", "static"];

pub const EVAL_NAME: &str = "eval";

pub struct ClassAssembler<'a> {
    target: &'a dyn Target,
    lowered: &'a LoweredProgram,
    config: &'a GeneratorConfig,
}

impl<'a> ClassAssembler<'a> {
    pub fn new(lowered: &'a LoweredProgram, config: &'a GeneratorConfig) -> Self {
        Self {
            target: config.language.target(),
            lowered,
            config,
        }
    }

    pub fn file_name(&self) -> String {
        self.target.file_name(&self.config.class_name)
    }

    /// Render the whole unit into a string
    pub fn render(&self) -> CompileResult<String> {
        let mut w = CodeWriter::new(self.config.indent);
        self.generate(&mut w)?;
        Ok(w.into_string())
    }

    pub fn generate(&self, w: &mut CodeWriter) -> CompileResult<()> {
        let target = self.target;
        let class_name = self.config.class_name.as_str();
        let parameters = self.lowered.parameters.as_slice();

        for line in target.header_comment(env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")) {
            w.line(line);
        }
        w.blank();
        if let Some(package) = &self.config.package {
            w.line(target.package_declaration(package));
            w.blank();
        }

        w.line(target.class_open(class_name));
        w.indent();

        w.blank();
        w.line(target.constructor_open(class_name));
        w.line(target.block_end());

        w.blank();
        ExprCodeGenerator::new(target, parameters, &self.lowered.expr, EVAL_NAME, METHOD_MODIFIERS)
            .generate(w)?;

        let derivatives = DerivativeCodeGenerator::new(
            target,
            parameters,
            &self.lowered.diff_variables,
            &self.lowered.expr,
            DEFAULT_BASE_NAME,
            METHOD_MODIFIERS,
        )?
        .with_symmetry_check(self.config.check_symmetry);

        let context = DispatchContext {
            target,
            parameters,
            modifiers: METHOD_MODIFIERS,
            dispatch: self.config.dispatch,
            class_name,
            base: derivatives.base_name(),
            size: derivatives.len(),
        };

        derivatives.generate_all_first_order(w)?;
        JacobianCodeGenerator::new(context).generate(w)?;

        if !self.config.no_hessian {
            derivatives.generate_all_second_order(w)?;
            HessianCodeGenerator::new(context).generate(w)?;
        }

        w.dedent();
        w.line(target.block_end());

        info!(
            class = class_name,
            variables = derivatives.len(),
            hessian = !self.config.no_hessian,
            "assembled class"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Dispatch;
    use crate::lowering::lower;
    use crate::parser::Parser;
    use crate::writer::IndentStyle;
    use pretty_assertions::assert_eq;

    fn render(source: &str, config: &GeneratorConfig) -> String {
        let program = Parser::new(source).parse_program().unwrap();
        let lowered = lower(&program).unwrap();
        ClassAssembler::new(&lowered, config).render().unwrap()
    }

    #[test]
    fn test_identity_class() {
        let config = GeneratorConfig {
            class_name: "Identity".to_string(),
            ..GeneratorConfig::default()
        };
        let code = render("number x\nexpr main = x", &config);
        let body = code.split_once("public class").unwrap().1;
        assert_eq!(
            body,
            " Identity {

  public Identity() {
  }

  public static double eval(double x) {
    return x;
  }

  public static double partialDerivative_0(double x) {
    return 1.0;
  }

  public static double[] jacobian(double x) {
    double[] __temp = new double[1];
    __temp[0] = partialDerivative_0(x);
    return __temp;
  }

  public static double partialDerivative_0_0(double x) {
    return 0.0;
  }

  public static double[][] hessian(double x) {
    double[][] __temp = new double[1][1];
    __temp[0][0] = partialDerivative_0_0(x);
    return __temp;
  }
}
"
        );
    }

    #[test]
    fn test_header_and_package() {
        let config = GeneratorConfig {
            package: Some("org.example".to_string()),
            indent: IndentStyle::Tab,
            ..GeneratorConfig::default()
        };
        let code = render("number x\nexpr main = x", &config);
        assert!(code.starts_with("/*****"));
        assert!(code.contains("DO NOT EDIT UNLESS YOU ARE SURE THAT YOU KNOW WHAT YOU ARE DOING"));
        assert!(code.contains("\npackage org.example;\n\npublic class MathExpression {\n"));
        assert!(code.contains("\n\tpublic static double eval(double x) {\n\t\treturn x;\n"));
    }

    #[test]
    fn test_no_hessian() {
        let config = GeneratorConfig {
            no_hessian: true,
            ..GeneratorConfig::default()
        };
        let code = render("number x\nnumber y\nexpr main = x * y", &config);
        assert!(code.contains("jacobian("));
        assert!(!code.contains("hessian("));
        assert!(!code.contains("partialDerivative_0_1"));
    }

    #[test]
    fn test_reflective_declarations_throw() {
        let config = GeneratorConfig {
            class_name: "Energy".to_string(),
            dispatch: Dispatch::Reflective,
            ..GeneratorConfig::default()
        };
        let code = render("vector v(2)\nexpr main = v . v", &config);
        assert!(code.contains(
            "public static double[][] hessian(double[] v) throws NoSuchMethodException"
        ));
        assert!(code.contains("Class<?> energyClass = Energy.class;"));
        assert!(code.contains("public static double partialDerivative_1_1(double[] v)"));
    }

    #[test]
    fn test_file_name() {
        let program = Parser::new("number x\nexpr main = x").parse_program().unwrap();
        let lowered = lower(&program).unwrap();
        let config = GeneratorConfig::default();
        assert_eq!(ClassAssembler::new(&lowered, &config).file_name(), "MathExpression.java");
    }
}
