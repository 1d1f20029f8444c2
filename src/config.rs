//! Generator configuration
//!
//! Settings come from three places, later ones winning: built-in defaults,
//! an optional JSON file and command-line overrides. JSON keys are matched
//! case-insensitively.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{CompileError, CompileResult};
use crate::lexer::LexErrorPolicy;
use crate::writer::IndentStyle;

/// Output language
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    Java,
}

impl FromStr for Language {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "java" => Ok(Language::Java),
            _ => Err(CompileError::config(format!(
                "The specified language: {} is not supported",
                s
            ))),
        }
    }
}

/// How the Jacobian and Hessian reach the partial derivative methods
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Dispatch {
    /// One explicit call per entry
    #[default]
    Direct,
    /// Method lookup by name through reflection
    Reflective,
}

impl FromStr for Dispatch {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "direct" => Ok(Dispatch::Direct),
            "reflective" | "reflection" => Ok(Dispatch::Reflective),
            _ => Err(CompileError::config(format!("unknown dispatch strategy: {}", s))),
        }
    }
}

/// Resolved settings for one code generation run
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorConfig {
    pub language: Language,
    pub class_name: String,
    pub package: Option<String>,
    pub dest: PathBuf,
    pub no_hessian: bool,
    pub dispatch: Dispatch,
    pub indent: IndentStyle,
    pub check_symmetry: bool,
    pub lex_policy: LexErrorPolicy,
}

impl GeneratorConfig {
    pub const DEFAULT_CLASS_NAME: &'static str = "MathExpression";
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            language: Language::Java,
            class_name: Self::DEFAULT_CLASS_NAME.to_string(),
            package: None,
            dest: PathBuf::from("."),
            no_hessian: false,
            dispatch: Dispatch::Direct,
            indent: IndentStyle::default(),
            check_symmetry: false,
            lex_policy: LexErrorPolicy::Fatal,
        }
    }
}

/// Indentation as written in a config file: a width or `"tab"`
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum IndentSetting {
    Width(usize),
    Name(String),
}

impl IndentSetting {
    fn resolve(&self) -> CompileResult<IndentStyle> {
        match self {
            IndentSetting::Width(n) => Ok(IndentStyle::Spaces(*n)),
            IndentSetting::Name(name) if name.eq_ignore_ascii_case("tab") => Ok(IndentStyle::Tab),
            IndentSetting::Name(name) => Err(CompileError::config(format!(
                "indent must be a number or \"tab\", got \"{}\"",
                name
            ))),
        }
    }
}

/// Contents of a JSON config file
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct FileConfig {
    pub lang: Option<String>,
    pub classname: Option<String>,
    pub package: Option<String>,
    pub dest: Option<PathBuf>,
    pub nohessian: Option<bool>,
    pub dispatch: Option<String>,
    pub indent: Option<IndentSetting>,
    pub checksymmetry: Option<bool>,
}

impl FileConfig {
    /// Read a JSON config file
    pub fn load(path: &Path) -> CompileResult<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| CompileError::io(path.display().to_string(), e))?;
        Self::from_json(&text)
    }

    /// Parse JSON config text; keys are lowercased before matching
    pub fn from_json(text: &str) -> CompileResult<Self> {
        let value: Value = serde_json::from_str(text)
            .map_err(|e| CompileError::config(format!("invalid JSON: {}", e)))?;
        let object = match value {
            Value::Object(object) => object,
            _ => return Err(CompileError::config("the config file must hold a JSON object")),
        };

        let lowered: Map<String, Value> = object
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        serde_json::from_value(Value::Object(lowered))
            .map_err(|e| CompileError::config(format!("invalid config: {}", e)))
    }
}

/// Settings given on the command line
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Overrides {
    pub lang: Option<String>,
    pub class_name: Option<String>,
    pub package: Option<String>,
    pub dest: Option<PathBuf>,
    pub no_hessian: bool,
    pub reflective: bool,
    pub indent: Option<IndentStyle>,
    pub check_symmetry: bool,
    pub skip_lex_errors: bool,
}

impl GeneratorConfig {
    /// Merge defaults, the config file and command-line overrides.
    ///
    /// Without an explicit class name, the capitalized stem of `input` is used.
    pub fn resolve(input: &Path, file: FileConfig, overrides: Overrides) -> CompileResult<Self> {
        let mut config = GeneratorConfig::default();

        if let Some(name) = default_class_name(input) {
            config.class_name = name;
        }

        if let Some(lang) = overrides.lang.as_deref().or(file.lang.as_deref()) {
            config.language = lang.parse()?;
        }
        if let Some(name) = overrides.class_name.or(file.classname) {
            config.class_name = name;
        }
        config.package = overrides.package.or(file.package).filter(|p| !p.is_empty());
        if let Some(dest) = overrides.dest.or(file.dest) {
            config.dest = dest;
        }
        config.no_hessian = overrides.no_hessian || file.nohessian.unwrap_or(false);

        config.dispatch = match file.dispatch.as_deref() {
            Some(d) => d.parse()?,
            None => Dispatch::Direct,
        };
        if overrides.reflective {
            config.dispatch = Dispatch::Reflective;
        }

        if let Some(indent) = &file.indent {
            config.indent = indent.resolve()?;
        }
        if let Some(indent) = overrides.indent {
            config.indent = indent;
        }

        config.check_symmetry = overrides.check_symmetry || file.checksymmetry.unwrap_or(false);
        if overrides.skip_lex_errors {
            config.lex_policy = LexErrorPolicy::Skip;
        }

        validate_identifier(&config.class_name)?;
        if let Some(package) = &config.package {
            for part in package.split('.') {
                validate_identifier(part)?;
            }
        }

        debug!(?config, "resolved generator configuration");
        Ok(config)
    }
}

/// Capitalized file stem: `rosenbrock.expr` becomes `Rosenbrock`.
///
/// Characters that cannot appear in an identifier become `_`, and a stem
/// starting with a digit gets a leading `_`: `my-model.expr` gives `My_model`.
pub fn default_class_name(input: &Path) -> Option<String> {
    let stem = input.file_stem()?.to_str()?;
    let mut chars = stem.chars().map(|c| {
        if c.is_ascii_alphanumeric() || c == '_' || c == '$' {
            c
        } else {
            '_'
        }
    });
    let first = chars.next()?;
    let mut name = String::with_capacity(stem.len() + 1);
    if first.is_ascii_digit() {
        name.push('_');
    }
    name.push(first.to_ascii_uppercase());
    name.extend(chars);
    Some(name)
}

fn validate_identifier(name: &str) -> CompileResult<()> {
    let mut chars = name.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(CompileError::config(format!("'{}' is not a valid identifier", name)))
    }
}
