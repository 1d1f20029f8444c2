//! Example: Rosenbrock function
//!
//! Compiles the two-dimensional Rosenbrock function and prints the generated
//! class, first with direct dispatch and then with reflective dispatch.
//!
//! Run with: cargo run --example rosenbrock

use derivative_codegen::{compile, lower, parse, Dispatch, GeneratorConfig};

const SOURCE: &str = "\
const a = 1
const b = 100
vector x(2)
expr main = (a - x[0])^2 + b * (x[1] - x[0]^2)^2
";

fn main() {
    println!("=== Rosenbrock Example ===\n");
    println!("Specification:\n{}", SOURCE);

    let program = parse(SOURCE).unwrap();
    let lowered = lower(&program).unwrap();
    println!("Simplified main: {}\n", lowered.expr);

    // Example 1: direct calls from jacobian/hessian
    let config = GeneratorConfig {
        class_name: "Rosenbrock".to_string(),
        ..GeneratorConfig::default()
    };
    let unit = compile(SOURCE, &config).unwrap();
    println!("--- {} (direct) ---", unit.file_name);
    println!("{}", unit.code);

    // Example 2: reflective lookup, no Hessian
    let config = GeneratorConfig {
        class_name: "Rosenbrock".to_string(),
        dispatch: Dispatch::Reflective,
        no_hessian: true,
        ..GeneratorConfig::default()
    };
    let unit = compile(SOURCE, &config).unwrap();
    println!("--- {} (reflective, no hessian) ---", unit.file_name);
    println!("{}", unit.code);
}
