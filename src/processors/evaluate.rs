//! Evaluate Processor
//!
//! Runs code blocks marked with a compile flag while the view is compiled, so
//! their output becomes static text in the compiled artifact. Unflagged blocks
//! come through untouched.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::context::{CompileContext, CompileUnit};
use crate::error::{StorageError, ViewError};
use crate::evaluator::Evaluator;
use crate::files::{FileMode, Files};
use crate::hashing::sha256_hex;
use crate::isolator::{self, ExtractedBlock, Isolator, Segment};

use super::Processor;

pub struct EvaluateProcessor {
    flags: Vec<String>,
    files: Arc<dyn Files>,
    evaluator: Arc<dyn Evaluator>,
}

impl EvaluateProcessor {
    pub fn new(files: Arc<dyn Files>, evaluator: Arc<dyn Evaluator>, flags: Vec<String>) -> Self {
        Self {
            flags,
            files,
            evaluator,
        }
    }

    pub fn flags(&self) -> &[String] {
        &self.flags
    }

    pub fn is_flagged(&self, block: &str) -> bool {
        self.flags.iter().any(|flag| block.contains(flag.as_str()))
    }

    /// Temporary program path for one compile.
    /// Unique per compiler instance and per compiled file.
    pub fn temp_filename(unit: &CompileUnit) -> PathBuf {
        let target = sha256_hex(unit.compiled_filename.to_string_lossy().as_bytes());
        unit.cache_directory
            .join(format!("{}-{}.eval", unit.compiler_id.simple(), &target[..16]))
    }

    /// Execute a written program: markup is echoed, code blocks go to the evaluator.
    fn execute(&self, path: &Path, ctx: &mut CompileContext) -> Result<String, ViewError> {
        let program = self.files.read(path)?;
        let mut output = String::with_capacity(program.len());

        for segment in isolator::split(&program)? {
            match segment {
                Segment::Text(text) => output.push_str(text),
                Segment::Code(code) => output.push_str(&self.evaluator.evaluate(code, ctx)?),
            }
        }

        Ok(output)
    }
}

impl Processor for EvaluateProcessor {
    fn name(&self) -> &'static str {
        "evaluate"
    }

    fn descriptor(&self) -> Value {
        json!({
            "processor": self.name(),
            "evaluator": self.evaluator.name(),
            "flags": self.flags,
        })
    }

    fn process(&self, source: &str, ctx: &mut CompileContext) -> Result<String, ViewError> {
        let mut isolator = Isolator::new();
        let isolated = isolator.isolate(source)?;

        let (flagged, passthrough): (Vec<ExtractedBlock>, Vec<ExtractedBlock>) = isolator
            .take_blocks()
            .into_iter()
            .partition(|block| self.is_flagged(&block.code));

        if flagged.is_empty() {
            debug!(view = %ctx.unit.view, "no compile-time blocks");
            return Ok(source.to_string());
        }

        debug!(
            view = %ctx.unit.view,
            flagged = flagged.len(),
            passthrough = passthrough.len(),
            "evaluating compile-time blocks"
        );

        // Flagged blocks become live code again, the rest stay tokens.
        let program = isolator.set_blocks(flagged).repair(&isolated);
        isolator.set_blocks(passthrough);

        let artifact = TempArtifact::create(
            self.files.as_ref(),
            Self::temp_filename(&ctx.unit),
            &program,
        )?;

        let output = match self.execute(artifact.path(), ctx) {
            Ok(output) => {
                artifact.release()?;
                output
            }
            Err(err) => {
                drop(artifact);
                return Err(err);
            }
        };

        Ok(isolator.repair(&output))
    }
}

/// A written temporary program. Deleted on [`release`](Self::release), or on drop
/// when the caller bails out early.
struct TempArtifact<'a> {
    files: &'a dyn Files,
    path: PathBuf,
    armed: bool,
}

impl<'a> TempArtifact<'a> {
    fn create(files: &'a dyn Files, path: PathBuf, content: &str) -> Result<Self, StorageError> {
        files.write(&path, content, FileMode::Runtime, true)?;
        debug!(path = %path.display(), "temporary program written");
        Ok(Self {
            files,
            path,
            armed: true,
        })
    }

    fn path(&self) -> &Path {
        &self.path
    }

    /// A program already gone (a concurrent cache reset) counts as removed.
    fn release(mut self) -> Result<(), StorageError> {
        self.armed = false;
        remove(self.files, &self.path)
    }
}

impl Drop for TempArtifact<'_> {
    fn drop(&mut self) {
        if self.armed {
            if let Err(err) = remove(self.files, &self.path) {
                warn!(path = %self.path.display(), error = %err, "failed to remove temporary program");
            }
        }
    }
}

fn remove(files: &dyn Files, path: &Path) -> Result<(), StorageError> {
    match files.delete(path) {
        Err(StorageError::NotFound(_)) => {
            debug!(path = %path.display(), "temporary program already removed");
            Ok(())
        }
        other => other,
    }
}

/// Reduce a code block to the bare expression it echoes.
///
/// Text that is not a code block comes back as a single-quoted literal.
pub fn fetch_code(block: &str) -> String {
    if !block.starts_with("<?") {
        return quote_literal(block);
    }

    let trimmed = block.trim();
    let mut code = trimmed
        .get(2..trimmed.len().saturating_sub(2).max(2))
        .unwrap_or("");

    if code.get(..3).is_some_and(|kw| kw.eq_ignore_ascii_case("php")) {
        code = code[3..].trim();
    }
    if let Some(rest) = code.strip_prefix('=') {
        code = rest;
    }
    if let Some(rest) = code.trim_start().strip_prefix("echo") {
        code = rest;
    }

    code.trim_matches(|c| c == ';' || c == ' ').to_string()
}

fn quote_literal(text: &str) -> String {
    format!("'{}'", text.replace('\\', "\\\\").replace('\'', "\\'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_code_strips_wrappers() {
        assert_eq!(fetch_code("<?php echo $title; ?>"), "$title");
        assert_eq!(fetch_code("<?= $user->name ?>"), "$user->name");
        assert_eq!(fetch_code("<?php   strtoupper($a);?>"), "strtoupper($a)");
        assert_eq!(fetch_code("<? echo 1 + 1 ?>"), "1 + 1");
    }

    #[test]
    fn test_fetch_code_plain_text_is_literal() {
        assert_eq!(fetch_code("Don't \\ panic"), r"'Don\'t \\ panic'");
    }

    #[test]
    fn test_temp_filename_unique_per_compiler() {
        let unit = |id| CompileUnit {
            compiler_id: id,
            namespace: "default".into(),
            view: "home".into(),
            compiled_filename: PathBuf::from("cache/home.compiled"),
            cache_directory: PathBuf::from("cache"),
        };
        let a = EvaluateProcessor::temp_filename(&unit(uuid::Uuid::new_v4()));
        let b = EvaluateProcessor::temp_filename(&unit(uuid::Uuid::new_v4()));
        assert_ne!(a, b);
        assert!(a.starts_with("cache"));
    }
}
