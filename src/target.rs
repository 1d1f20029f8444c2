//! Target language syntax
//!
//! The generators decide *what* statements to emit; a [`Target`] decides how
//! each statement is spelled. Java is the only target.

use std::collections::BTreeSet;

use crate::ast::{Symbol, TypeKind};
use crate::config::Language;
use crate::error::{CompileError, CompileResult};
use crate::symbolic::{Func, LoopOp};

/// Shape of a generated function's result
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnShape {
    Scalar,
    Vector,
    Matrix,
}

/// Operators with a lowering rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Mul,
    Pow,
    Func(Func),
    Delta,
}

/// Syntax of a target language
pub trait Target {
    fn language(&self) -> Language;

    fn file_name(&self, class_name: &str) -> String;

    fn parameter_type(&self, symbol: &Symbol) -> String;

    fn return_type(&self, shape: ReturnShape) -> &'static str;

    /// Full signature line without the opening brace
    fn function_declaration(
        &self,
        modifiers: &[&str],
        shape: ReturnShape,
        name: &str,
        params: &[Symbol],
        throws: &[&str],
    ) -> String;

    fn number(&self, value: f64) -> String;

    /// Expression text for one operator node
    fn apply(&self, op: Op, operands: &[String]) -> CompileResult<String>;

    fn declare_scalar(&self, name: &str, value: &str) -> String;

    fn element(&self, array: &str, indices: &[String]) -> String;

    /// Convert a floating point value to an array index
    fn integer_index(&self, value: &str) -> String;

    /// Inclusive counting loop header, including the opening brace
    fn inclusive_loop(&self, counter: &str, lower: &str, upper: &str) -> String;

    fn accumulator(&self, name: &str, op: LoopOp) -> String;

    fn accumulate(&self, name: &str, op: LoopOp, value: &str) -> String;

    fn block_end(&self) -> &'static str;

    fn return_statement(&self, value: &str) -> String;

    fn call(&self, function: &str, args: &[String]) -> String;

    fn allocate(&self, name: &str, shape: ReturnShape, size: usize) -> String;

    fn store(&self, array: &str, indices: &[String], value: &str) -> String;

    fn header_comment(&self, generator: &str, version: &str) -> Vec<String>;

    fn package_declaration(&self, package: &str) -> String;

    fn class_open(&self, name: &str) -> String;

    fn constructor_open(&self, class_name: &str) -> String;

    /// Exceptions a reflective dispatcher may raise
    fn reflection_exceptions(&self) -> &'static [&'static str];

    /// Statements that prepare method lookup by name
    fn reflection_setup(&self, names: &ReflectionNames, params: &[Symbol]) -> Vec<String>;

    /// Zero-based loop with an exclusive upper bound, including the opening brace
    fn counted_loop(&self, counter: &str, start: &str, end: usize) -> String;

    fn if_not_equal(&self, a: &str, b: &str) -> String;

    /// Statements that look up `base_counters...` by name and store its result
    fn reflective_invoke(
        &self,
        names: &ReflectionNames,
        base: &str,
        counters: &[&str],
        slot: &str,
        params: &[Symbol],
        is_static: bool,
    ) -> Vec<String>;
}

/// Words that cannot name a parameter of a generated method: Java keywords and
/// literals, plus the classes generated expressions call into.
const RESERVED_WORDS: &[&str] = &[
    "abstract", "assert", "boolean", "break", "byte", "case", "catch", "char", "class", "const",
    "continue", "default", "do", "double", "else", "enum", "extends", "false", "final", "finally",
    "float", "for", "goto", "if", "implements", "import", "instanceof", "int", "interface", "long",
    "native", "new", "null", "package", "private", "protected", "public", "record", "return",
    "short", "static", "strictfp", "super", "switch", "synchronized", "this", "throw", "throws",
    "transient", "true", "try", "var", "void", "volatile", "while", "yield", "_", "Math",
    "Integer",
];

pub fn is_reserved_word(name: &str) -> bool {
    RESERVED_WORDS.contains(&name)
}

/// Local names of one generated method, kept apart from its parameters
#[derive(Debug, Clone)]
pub struct LocalNames {
    taken: BTreeSet<String>,
}

impl LocalNames {
    pub fn new(params: &[Symbol]) -> Self {
        Self {
            taken: params.iter().map(|p| p.name.clone()).collect(),
        }
    }

    /// `base` itself when free, otherwise `base` with the first free numeric
    /// suffix. The returned name is taken from then on.
    pub fn fresh(&mut self, base: &str) -> String {
        let mut name = base.to_string();
        let mut n = 0;
        while self.taken.contains(&name) {
            name = format!("{}{}", base, n);
            n += 1;
        }
        self.taken.insert(name.clone());
        name
    }
}

/// Locals and class of a reflective dispatcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReflectionNames {
    pub class_name: String,
    pub class_variable: String,
    pub arg_classes: String,
    pub method_name: String,
    pub method: String,
}

impl ReflectionNames {
    pub fn new(class_name: &str, locals: &mut LocalNames) -> Self {
        Self {
            class_name: class_name.to_string(),
            class_variable: locals.fresh(&class_variable(class_name)),
            arg_classes: locals.fresh("argClasses"),
            method_name: locals.fresh("methodName"),
            method: locals.fresh("method"),
        }
    }
}

impl Language {
    pub fn target(&self) -> &'static dyn Target {
        match self {
            Language::Java => &Java,
        }
    }
}

/// Java source
#[derive(Debug, Clone, Copy, Default)]
pub struct Java;

fn class_variable(class_name: &str) -> String {
    let mut chars = class_name.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect::<String>() + "Class",
        None => "exprClass".to_string(),
    }
}

/// Arguments for `Method.invoke`; arrays are passed as single objects
fn invoke_arguments(params: &[Symbol]) -> Vec<String> {
    params
        .iter()
        .map(|p| match p.ty.kind {
            TypeKind::Number => p.name.clone(),
            TypeKind::Vector | TypeKind::Matrix => format!("(Object) {}", p.name),
        })
        .collect()
}

impl Target for Java {
    fn language(&self) -> Language {
        Language::Java
    }

    fn file_name(&self, class_name: &str) -> String {
        format!("{}.java", class_name)
    }

    fn parameter_type(&self, symbol: &Symbol) -> String {
        match symbol.ty.kind {
            TypeKind::Number => "double".to_string(),
            TypeKind::Vector => "double[]".to_string(),
            TypeKind::Matrix => "double[][]".to_string(),
        }
    }

    fn return_type(&self, shape: ReturnShape) -> &'static str {
        match shape {
            ReturnShape::Scalar => "double",
            ReturnShape::Vector => "double[]",
            ReturnShape::Matrix => "double[][]",
        }
    }

    fn function_declaration(
        &self,
        modifiers: &[&str],
        shape: ReturnShape,
        name: &str,
        params: &[Symbol],
        throws: &[&str],
    ) -> String {
        let params: Vec<String> = params
            .iter()
            .map(|p| format!("{} {}", self.parameter_type(p), p.name))
            .collect();
        let mut decl = String::new();
        for modifier in modifiers {
            decl.push_str(modifier);
            decl.push(' ');
        }
        decl.push_str(&format!(
            "{} {}({})",
            self.return_type(shape),
            name,
            params.join(", ")
        ));
        if !throws.is_empty() {
            decl.push_str(" throws ");
            decl.push_str(&throws.join(", "));
        }
        decl
    }

    fn number(&self, value: f64) -> String {
        if value.fract() == 0.0 && value.abs() < 1e15 {
            format!("{:.1}", value)
        } else {
            format!("{:?}", value)
        }
    }

    fn apply(&self, op: Op, operands: &[String]) -> CompileResult<String> {
        let text = match (op, operands) {
            (Op::Add, [_, _, ..]) => operands.join(" + "),
            (Op::Mul, [_, _, ..]) => operands.join(" * "),
            (Op::Pow, [base, exp]) => format!("Math.pow({}, {})", base, exp),
            (Op::Func(func), [a]) => match func {
                Func::Sin => format!("Math.sin({})", a),
                Func::Cos => format!("Math.cos({})", a),
                Func::Tan => format!("Math.tan({})", a),
                Func::Cot => format!("Math.cos({0}) / Math.sin({0})", a),
                Func::Log => format!("Math.log({})", a),
                Func::Abs => format!("Math.abs({})", a),
            },
            (Op::Delta, [a, b]) => format!("({} == {}) ? 1.0 : 0.0", a, b),
            _ => {
                return Err(CompileError::codegen(format!(
                    "{:?} cannot take {} operand(s)",
                    op,
                    operands.len()
                )))
            }
        };
        Ok(text)
    }

    fn declare_scalar(&self, name: &str, value: &str) -> String {
        format!("double {} = {};", name, value)
    }

    fn element(&self, array: &str, indices: &[String]) -> String {
        let mut text = array.to_string();
        for index in indices {
            text.push_str(&format!("[{}]", index));
        }
        text
    }

    fn integer_index(&self, value: &str) -> String {
        format!("(int) {}", value)
    }

    fn inclusive_loop(&self, counter: &str, lower: &str, upper: &str) -> String {
        format!("for (int {0} = {1}; {0} <= {2}; ++{0}) {{", counter, lower, upper)
    }

    fn accumulator(&self, name: &str, op: LoopOp) -> String {
        let init = match op {
            LoopOp::Sum => "0.0",
            LoopOp::Product => "1.0",
        };
        format!("double {} = {};", name, init)
    }

    fn accumulate(&self, name: &str, op: LoopOp, value: &str) -> String {
        let assign = match op {
            LoopOp::Sum => "+=",
            LoopOp::Product => "*=",
        };
        format!("{} {} {};", name, assign, value)
    }

    fn block_end(&self) -> &'static str {
        "}"
    }

    fn return_statement(&self, value: &str) -> String {
        format!("return {};", value)
    }

    fn call(&self, function: &str, args: &[String]) -> String {
        format!("{}({})", function, args.join(", "))
    }

    fn allocate(&self, name: &str, shape: ReturnShape, size: usize) -> String {
        let dims = match shape {
            ReturnShape::Scalar => String::new(),
            ReturnShape::Vector => format!("[{}]", size),
            ReturnShape::Matrix => format!("[{0}][{0}]", size),
        };
        format!("{} {} = new double{};", self.return_type(shape), name, dims)
    }

    fn store(&self, array: &str, indices: &[String], value: &str) -> String {
        format!("{} = {};", self.element(array, indices), value)
    }

    fn header_comment(&self, generator: &str, version: &str) -> Vec<String> {
        let stars = "*".repeat(78);
        vec![
            format!("/{}", stars),
            format!(" * Autogenerated by {} ({})", generator, version),
            " *".to_string(),
            " * DO NOT EDIT UNLESS YOU ARE SURE THAT YOU KNOW WHAT YOU ARE DOING".to_string(),
            format!(" {}/", stars),
        ]
    }

    fn package_declaration(&self, package: &str) -> String {
        format!("package {};", package)
    }

    fn class_open(&self, name: &str) -> String {
        format!("public class {} {{", name)
    }

    fn constructor_open(&self, class_name: &str) -> String {
        format!("public {}() {{", class_name)
    }

    fn reflection_exceptions(&self) -> &'static [&'static str] {
        &[
            "NoSuchMethodException",
            "IllegalAccessException",
            "java.lang.reflect.InvocationTargetException",
        ]
    }

    fn reflection_setup(&self, names: &ReflectionNames, params: &[Symbol]) -> Vec<String> {
        let mut lines = vec![
            format!("Class<?> {} = {}.class;", names.class_variable, names.class_name),
            format!("Class<?>[] {} = new Class<?>[{}];", names.arg_classes, params.len()),
        ];
        for (i, param) in params.iter().enumerate() {
            lines.push(format!(
                "{}[{}] = {}.class;",
                names.arg_classes,
                i,
                self.parameter_type(param)
            ));
        }
        lines
    }

    fn counted_loop(&self, counter: &str, start: &str, end: usize) -> String {
        format!("for (int {0} = {1}; {0} < {2}; ++{0}) {{", counter, start, end)
    }

    fn if_not_equal(&self, a: &str, b: &str) -> String {
        format!("if ({} != {}) {{", a, b)
    }

    fn reflective_invoke(
        &self,
        names: &ReflectionNames,
        base: &str,
        counters: &[&str],
        slot: &str,
        params: &[Symbol],
        is_static: bool,
    ) -> Vec<String> {
        let mut name_expr = format!("\"{}\"", base);
        for counter in counters {
            name_expr.push_str(&format!(" + \"_\" + Integer.toString({})", counter));
        }
        let receiver = if is_static { "null" } else { "this" };
        let mut invoke_args = vec![receiver.to_string()];
        invoke_args.extend(invoke_arguments(params));
        let invoke_args = invoke_args.join(", ");
        vec![
            format!("String {} = {};", names.method_name, name_expr),
            format!(
                "java.lang.reflect.Method {} = {}.getDeclaredMethod({}, {});",
                names.method, names.class_variable, names.method_name, names.arg_classes
            ),
            format!("{} = (Double) {}.invoke({});", slot, names.method, invoke_args),
        ]
    }
}
