use std::path::Path;

use derivative_codegen::{
    compile, lower, parse, parse_with, write_unit, CompileError, Dispatch, FileConfig,
    GeneratorConfig, LexErrorPolicy, Overrides,
};
use derivative_codegen::symbolic::Sym;
use pretty_assertions::assert_eq;

fn config(class_name: &str) -> GeneratorConfig {
    GeneratorConfig {
        class_name: class_name.to_string(),
        ..GeneratorConfig::default()
    }
}

fn class_body(code: &str) -> &str {
    code.split_once("public class").unwrap().1
}

#[test]
fn test_product_class() {
    let unit = compile("number x\nnumber y\nexpr main = x * y", &config("Product")).unwrap();
    assert_eq!(unit.file_name, "Product.java");
    assert_eq!(
        class_body(&unit.code),
        " Product {

  public Product() {
  }

  public static double eval(double x, double y) {
    double __temp_0 = x * y;
    return __temp_0;
  }

  public static double partialDerivative_0(double x, double y) {
    return y;
  }

  public static double partialDerivative_1(double x, double y) {
    return x;
  }

  public static double[] jacobian(double x, double y) {
    double[] __temp = new double[2];
    __temp[0] = partialDerivative_0(x, y);
    __temp[1] = partialDerivative_1(x, y);
    return __temp;
  }

  public static double partialDerivative_0_0(double x, double y) {
    return 0.0;
  }

  public static double partialDerivative_0_1(double x, double y) {
    return 1.0;
  }

  public static double partialDerivative_1_1(double x, double y) {
    return 0.0;
  }

  public static double[][] hessian(double x, double y) {
    double[][] __temp = new double[2][2];
    __temp[0][0] = partialDerivative_0_0(x, y);
    __temp[0][1] = partialDerivative_0_1(x, y);
    __temp[1][0] = __temp[0][1];
    __temp[1][1] = partialDerivative_1_1(x, y);
    return __temp;
  }
}
"
    );
}

#[test]
fn test_provenance_header() {
    let unit = compile("number x\nexpr main = x", &config("Identity")).unwrap();
    let lines: Vec<&str> = unit.code.lines().take(6).collect();
    let stars = "*".repeat(78);
    let expected_title = format!(
        " * Autogenerated by {} ({})",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    );
    let expected_close = format!(" {}/", stars);
    assert_eq!(lines[0], format!("/{}", stars));
    assert_eq!(lines[1], expected_title);
    assert_eq!(lines[3], " * DO NOT EDIT UNLESS YOU ARE SURE THAT YOU KNOW WHAT YOU ARE DOING");
    assert_eq!(lines[4], expected_close);
    assert_eq!(lines[5], "");
}

#[test]
fn test_identity() {
    let unit = compile("number x\nexpr main = x", &config("Identity")).unwrap();
    assert!(unit.code.contains("  public static double eval(double x) {\n    return x;\n  }\n"));
    assert!(unit
        .code
        .contains("  public static double partialDerivative_0(double x) {\n    return 1.0;\n  }\n"));
}

#[test]
fn test_sum() {
    let unit = compile("number x\nnumber y\nexpr main = x + y", &config("Sum")).unwrap();
    assert!(unit.code.contains("    double __temp_0 = x + y;\n"));
    assert_eq!(unit.code.matches("    return 1.0;\n").count(), 2);
    assert_eq!(unit.code.matches("    return 0.0;\n").count(), 3);
}

#[test]
fn test_square_differentiates_to_linear() {
    let program = parse("number x\nexpr main = x^2").unwrap();
    let lowered = lower(&program).unwrap();
    let atom = Sym::symbol("x");
    assert_eq!(lowered.expr.derivative(&atom).unwrap().to_string(), "2*x");

    let unit = compile("number x\nexpr main = x^2", &config("Square")).unwrap();
    assert!(unit.code.contains(
        "  public static double partialDerivative_0(double x) {\n    double __temp_0 = 2.0 * x;\n    return __temp_0;\n  }\n"
    ));
    assert!(unit.code.contains("    double __temp_0 = Math.pow(x, 2.0);\n"));
}

#[test]
fn test_generation_is_deterministic() {
    let source = "vector v(3)\nnumber s\nexpr main = s * (v . v) + sin(v[0] * v[2])";
    let first = compile(source, &config("Twice")).unwrap();
    let second = compile(source, &config("Twice")).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_hessian_only_generates_upper_triangle() {
    let unit = compile("vector v(3)\nexpr main = v . v", &config("Norm2")).unwrap();
    assert_eq!(unit.code.matches("public static double partialDerivative_").count(), 3 + 6);
    assert!(unit.code.contains("    __temp[2][1] = __temp[1][2];\n"));
    assert!(!unit.code.contains("partialDerivative_2_1("));
}

#[test]
fn test_undefined_variable_scenario() {
    let err = compile("number x\nnumber y\nexpr main = x + z", &config("Broken")).unwrap_err();
    match err {
        CompileError::UndefinedVariable { name, line } => {
            assert_eq!(name, "z");
            assert_eq!(line, 3);
        }
        other => panic!("Expected UndefinedVariable, got {:?}", other),
    }
}

#[test]
fn test_loop_scenario() {
    let unit = compile("vector x(5)\nexpr main = for i in [0, 4] sum(x[i])", &config("Total")).unwrap();
    assert!(unit.code.contains(
        "    double __temp_0 = 0.0;\n    for (int i0 = 0; i0 <= 4; ++i0) {\n      __temp_0 += x[i0];\n    }\n    return __temp_0;\n"
    ));
    assert!(unit.code.contains("    double[] __temp = new double[5];\n"));
    assert!(unit.code.contains("    __temp[4] = partialDerivative_4(x);\n"));
    assert_eq!(unit.code.matches("    return 1.0;\n").count(), 5);
}

#[test]
fn test_reflective_without_hessian() {
    let config = GeneratorConfig {
        class_name: "Energy".to_string(),
        package: Some("org.example".to_string()),
        dispatch: Dispatch::Reflective,
        no_hessian: true,
        ..GeneratorConfig::default()
    };
    let unit = compile("number x\nnumber y\nexpr main = x * y", &config).unwrap();
    assert!(unit.code.contains("package org.example;\n"));
    assert!(unit.code.contains(
        "  public static double[] jacobian(double x, double y) throws NoSuchMethodException, IllegalAccessException, java.lang.reflect.InvocationTargetException {\n"
    ));
    assert!(unit.code.contains("      __temp[i] = (Double) method.invoke(null, x, y);\n"));
    assert!(!unit.code.contains("hessian"));
    assert!(!unit.code.contains("partialDerivative_0_0"));
}

#[test]
fn test_nodiff_variables_are_parameters_only() {
    let unit = compile("number x\nnumber k : nodiff\nexpr main = k * x", &config("Scaled")).unwrap();
    assert!(unit.code.contains("jacobian(double x, double k)"));
    assert!(unit.code.contains("new double[1];"));
    assert!(unit.code.contains("  public static double partialDerivative_0(double x, double k) {\n    return k;\n"));
}

#[test]
fn test_skipping_lexical_errors() {
    let source = "number x\nexpr main = x ? * 2";
    assert!(matches!(parse(source), Err(CompileError::LexerError { line: 2, .. })));
    let program = parse_with(source, LexErrorPolicy::Skip).unwrap();
    assert_eq!(program.main().unwrap().value.to_symbolic(), "(x)*(2)");
}

#[test]
fn test_program_serializes_to_json() {
    let program = parse("number x\nexpr main = x + 1").unwrap();
    let json = serde_json::to_string(&program).unwrap();
    assert!(json.contains("\"main\""));
    assert!(json.contains("\"Number\""));
}

#[test]
fn test_config_file_to_written_unit() {
    let dir = tempfile::tempdir().unwrap();
    let settings = format!(
        r#"{{"ClassName": "FromFile", "Dest": {:?}, "NoHessian": true}}"#,
        dir.path().display().to_string()
    );
    let file = FileConfig::from_json(&settings).unwrap();
    let config = GeneratorConfig::resolve(Path::new("model.expr"), file, Overrides::default()).unwrap();

    let unit = compile("number x\nexpr main = x", &config).unwrap();
    let path = write_unit(&unit, &config).unwrap();
    assert_eq!(path, dir.path().join("FromFile.java"));
    assert_eq!(std::fs::read_to_string(path).unwrap(), unit.code);
}

#[test]
fn test_scalar_scenario() {
    let source = "number x\nnumber y\nexpr main = x*y + sin(x)";
    let lowered = lower(&parse(source).unwrap()).unwrap();
    let dx = lowered.expr.derivative(&Sym::symbol("x")).unwrap();
    let dy = lowered.expr.derivative(&Sym::symbol("y")).unwrap();
    assert_eq!(dx.to_string(), "y + cos(x)");
    assert_eq!(dy.to_string(), "x");

    let unit = compile(source, &config("Scenario")).unwrap();
    assert!(unit.code.contains(
        "  public static double eval(double x, double y) {
    double __temp_0 = x * y;
    double __temp_1 = Math.sin(x);
    double __temp_2 = __temp_0 + __temp_1;
    return __temp_2;
  }
"
    ));
    assert!(unit.code.contains(
        "  public static double partialDerivative_0(double x, double y) {
    double __temp_0 = Math.cos(x);
    double __temp_1 = y + __temp_0;
    return __temp_1;
  }
"
    ));
    assert!(unit
        .code
        .contains("  public static double partialDerivative_1(double x, double y) {\n    return x;\n"));
}

#[test]
fn test_norm_scenario() {
    let unit = compile("vector v(3)\nexpr main = norm(v)", &config("Length")).unwrap();
    let eval = unit.code.split("public static double eval").nth(1).unwrap();
    let eval = eval.split("\n  }\n").next().unwrap();
    for i in 0..3 {
        assert!(eval.contains(&format!("Math.pow(v[{}], 2.0)", i)));
    }
    assert!(eval.contains(", 0.5);"));
}

#[test]
fn test_symbolic_dimension_scenario() {
    let unit = compile("number n\nvector v(n)\nexpr main = v . v", &config("Dynamic")).unwrap();
    assert!(unit.code.contains("eval(double n, double[] v)"));
    assert!(unit.code.contains("    double __temp_0 = -1.0 + n;\n"));
    assert!(unit.code.contains("    for (int k0 = 0; k0 <= (int) __temp_0; ++k0) {\n"));
    assert!(unit.code.contains("Math.pow(v[k0], 2.0)"));
    assert!(unit.code.contains("    double[] __temp = new double[0];\n"));
}

fn method<'a>(code: &'a str, signature: &str) -> &'a str {
    let body = code.split(signature).nth(1).unwrap();
    body.split("\n  }\n").next().unwrap()
}

#[test]
fn test_reflective_counters_avoid_parameters() {
    let config = GeneratorConfig {
        class_name: "Indices".to_string(),
        dispatch: Dispatch::Reflective,
        ..GeneratorConfig::default()
    };
    let unit = compile("number i\nnumber j\nexpr main = i * j", &config).unwrap();
    let jacobian = method(&unit.code, "double[] jacobian(double i, double j)");
    assert!(jacobian.contains("    for (int i0 = 0; i0 < 2; ++i0) {\n"));
    assert!(jacobian.contains("      __temp[i0] = (Double) method.invoke(null, i, j);\n"));
    let hessian = method(&unit.code, "double[][] hessian(double i, double j)");
    assert!(hessian.contains("      for (int j0 = i0; j0 < 2; ++j0) {\n"));
    assert!(!unit.code.contains("int i ="));
    assert!(!unit.code.contains("int j ="));
}

#[test]
fn test_temporaries_avoid_parameters() {
    let unit = compile("number __temp_0\nexpr main = 2 * __temp_0", &config("Shifted")).unwrap();
    let eval = method(&unit.code, "double eval(double __temp_0)");
    assert!(eval.contains("    double ___temp_0 = 2.0 * __temp_0;\n    return ___temp_0;"));
}

#[test]
fn test_result_array_avoids_parameters() {
    let unit = compile("number __temp\nexpr main = __temp^2", &config("Named")).unwrap();
    assert!(unit.code.contains("    double[] __temp0 = new double[1];\n"));
    assert!(unit.code.contains("    __temp0[0] = partialDerivative_0(__temp);\n"));
    assert!(unit.code.contains("    double[][] __temp0 = new double[1][1];\n"));
    assert!(unit.code.contains("    return __temp0;\n"));
}

#[test]
fn test_java_keyword_is_rejected() {
    let err = compile("number x\nnumber int\nexpr main = x", &config("Keyword")).unwrap_err();
    assert!(matches!(err, CompileError::TypeError { line: 2, .. }));
}

#[test]
fn test_block_comments() {
    let source = "/* model */ number x\n/* a\n   b */\nexpr main = x * x";
    let unit = compile(source, &config("Commented")).unwrap();
    assert!(unit.code.contains("eval(double x)"));

    let err = compile("number x\nexpr main = x /* open", &config("Open")).unwrap_err();
    assert!(matches!(err, CompileError::LexerError { line: 2, .. }));
}

#[test]
fn test_product_derivative_has_no_division() {
    let source = "number n\nvector w(n)\nnumber y\nexpr main = for k in [0, n - 1] product(y + w[k])";
    let unit = compile(source, &config("Factors")).unwrap();
    let partial = method(&unit.code, "double partialDerivative_0(double n, double[] w, double y)");
    assert!(!partial.contains("Math.pow"), "{}", partial);
    assert_eq!(partial.matches(" *= ").count(), 2);
    assert_eq!(partial.matches(" += ").count(), 1);
}
