//! Derivative code generator CLI
//!
//! Usage:
//!   derivgen model.expr
//!   derivgen model.expr -n Energy -p org.example -d out/ --reflective
//!   derivgen model.expr -c settings.json --stdout
//!   derivgen model.expr --dump-ast

use std::fs;
use std::path::PathBuf;

use clap::Parser as ClapParser;
use colored::Colorize;
use tracing::Level;

use derivative_codegen::{
    compile, parse_with, write_unit, CompileError, FileConfig, GeneratorConfig, IndentStyle,
    Overrides,
};

#[derive(ClapParser, Debug)]
#[command(name = "derivgen")]
#[command(version)]
#[command(about = "Generates Java code for an expression, its Jacobian and its Hessian")]
struct Args {
    /// Expression specification file
    #[arg(value_name = "EXPRFILE")]
    input: PathBuf,

    /// JSON configuration file
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Name of the generated class (defaults to the capitalized file name)
    #[arg(short = 'n', long = "cname")]
    class_name: Option<String>,

    /// Destination directory
    #[arg(short = 'd', long = "dest")]
    dest: Option<PathBuf>,

    /// Output language
    #[arg(short = 'l', long = "lang")]
    lang: Option<String>,

    /// Package of the generated class
    #[arg(short = 'p', long = "package")]
    package: Option<String>,

    /// Skip the Hessian and the second-order partial derivatives
    #[arg(long = "nohessian")]
    no_hessian: bool,

    /// Reach partial derivatives through reflection
    #[arg(long = "reflective")]
    reflective: bool,

    /// Warn when mixed partial derivatives simplify differently
    #[arg(long = "check-symmetry")]
    check_symmetry: bool,

    /// Drop illegal characters instead of failing
    #[arg(long = "skip-lex-errors")]
    skip_lex_errors: bool,

    /// Indent generated code with tabs
    #[arg(long = "tab", conflicts_with = "indent")]
    tab: bool,

    /// Indent generated code with N spaces
    #[arg(long = "indent", value_name = "N")]
    indent: Option<usize>,

    /// Print the generated code instead of writing a file
    #[arg(long = "stdout")]
    stdout: bool,

    /// Print the parsed program as JSON and exit
    #[arg(long = "dump-ast")]
    dump_ast: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        let indent = if self.tab {
            Some(IndentStyle::Tab)
        } else {
            self.indent.map(IndentStyle::Spaces)
        };
        Overrides {
            lang: self.lang.clone(),
            class_name: self.class_name.clone(),
            package: self.package.clone(),
            dest: self.dest.clone(),
            no_hessian: self.no_hessian,
            reflective: self.reflective,
            indent,
            check_symmetry: self.check_symmetry,
            skip_lex_errors: self.skip_lex_errors,
        }
    }
}

fn fail(label: &str, error: &CompileError) -> ! {
    eprintln!("{}: {}", label.red(), error);
    std::process::exit(1);
}

fn label(error: &CompileError) -> &'static str {
    match error {
        CompileError::LexerError { .. } | CompileError::SyntaxError { .. } => "Parse error",
        CompileError::UndefinedVariable { .. }
        | CompileError::TypeError { .. }
        | CompileError::ShapeMismatch { .. } => "Type error",
        CompileError::SymbolicError { .. } => "Symbolic error",
        CompileError::UnsupportedOperator { .. } | CompileError::CodeGenError { .. } => {
            "Code generation error"
        }
        CompileError::ConfigError { .. } => "Configuration error",
        CompileError::Io { .. } => "Error",
    }
}

fn main() {
    let args = Args::parse();

    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .try_init();

    let file_config = match &args.config {
        Some(path) => FileConfig::load(path).unwrap_or_else(|e| fail(label(&e), &e)),
        None => FileConfig::default(),
    };
    let config = GeneratorConfig::resolve(&args.input, file_config, args.overrides())
        .unwrap_or_else(|e| fail(label(&e), &e));

    let source = fs::read_to_string(&args.input).unwrap_or_else(|e| {
        eprintln!(
            "{}: Failed to read file '{}': {}",
            "Error".red(),
            args.input.display(),
            e
        );
        std::process::exit(1);
    });

    if args.verbose {
        eprintln!("{}", "Derivative Code Generator".bold().blue());
        eprintln!("{}", "=".repeat(35));
        eprintln!("{}: {}", "Input".green(), args.input.display());
        eprintln!("{}: {}", "Class".green(), config.class_name);
        eprintln!("{}: {:?}", "Dispatch".green(), config.dispatch);
        eprintln!();
    }

    if args.dump_ast {
        let program = parse_with(&source, config.lex_policy).unwrap_or_else(|e| fail(label(&e), &e));
        match serde_json::to_string_pretty(&program) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("{}: Failed to serialize to JSON: {}", "Error".red(), e);
                std::process::exit(1);
            }
        }
        return;
    }

    let unit = compile(&source, &config).unwrap_or_else(|e| match e.line() {
        Some(line) => {
            eprintln!("{} {}", "In line".yellow(), line);
            fail(label(&e), &e)
        }
        None => fail(label(&e), &e),
    });

    if args.stdout {
        print!("{}", unit.code);
        return;
    }

    match write_unit(&unit, &config) {
        Ok(path) => println!("{} {}", "Generated".green().bold(), path.display()),
        Err(e) => fail(label(&e), &e),
    }
}
