//! Indentation-aware code sink and atomic output files

use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::info;

use crate::error::{CompileError, CompileResult};

/// Indentation used by generated code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndentStyle {
    Spaces(usize),
    Tab,
}

impl IndentStyle {
    pub const DEFAULT_WIDTH: usize = 2;

    fn unit(&self) -> String {
        match self {
            IndentStyle::Spaces(n) => " ".repeat(*n),
            IndentStyle::Tab => "\t".to_string(),
        }
    }
}

impl Default for IndentStyle {
    fn default() -> Self {
        IndentStyle::Spaces(Self::DEFAULT_WIDTH)
    }
}

/// Buffers generated code line by line with the current indentation
#[derive(Debug)]
pub struct CodeWriter {
    buffer: String,
    unit: String,
    level: usize,
    prefix: String,
}

impl CodeWriter {
    pub fn new(style: IndentStyle) -> Self {
        Self {
            buffer: String::new(),
            unit: style.unit(),
            level: 0,
            prefix: String::new(),
        }
    }

    /// Increase indentation by one level
    pub fn indent(&mut self) {
        self.level += 1;
        self.prefix = self.unit.repeat(self.level);
    }

    /// Decrease indentation by one level; never goes below the margin
    pub fn dedent(&mut self) {
        self.level = self.level.saturating_sub(1);
        self.prefix = self.unit.repeat(self.level);
    }

    pub fn level(&self) -> usize {
        self.level
    }

    /// Write one line, prefixed with the current indentation
    pub fn line(&mut self, content: impl AsRef<str>) {
        self.buffer.push_str(&self.prefix);
        self.buffer.push_str(content.as_ref());
        self.buffer.push('\n');
    }

    /// Write an empty line without trailing whitespace
    pub fn blank(&mut self) {
        self.buffer.push('\n');
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn into_string(self) -> String {
        self.buffer
    }
}

/// Write `contents` to `dest/file_name` atomically.
///
/// The text goes to a temporary file in the destination directory first and
/// is renamed over the target, so a failed run never leaves a partial file.
pub fn persist(dest: &Path, file_name: &str, contents: &str) -> CompileResult<PathBuf> {
    let target = dest.join(file_name);
    let mut tmp = NamedTempFile::new_in(dest)
        .map_err(|e| CompileError::io(dest.display().to_string(), e))?;
    tmp.write_all(contents.as_bytes())
        .and_then(|_| tmp.flush())
        .map_err(|e| CompileError::io(tmp.path().display().to_string(), e))?;
    tmp.persist(&target)
        .map_err(|e| CompileError::io(target.display().to_string(), e.error))?;
    info!(path = %target.display(), bytes = contents.len(), "wrote generated code");
    Ok(target)
}
