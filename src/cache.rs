//! Compiled View Cache
//!
//! Each compiled artifact is stored next to a JSON sidecar describing what it was
//! compiled from. The sidecar is written last, so an artifact without one is
//! never trusted.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::compiler::{compiled_filename, CompiledArtifact, Compiler};
use crate::config::ViewsConfig;
use crate::context::Services;
use crate::error::ViewError;
use crate::evaluator::{Evaluator, ExprEvaluator, Value};
use crate::files::{FileMode, Files};
use crate::processors::{EvaluateProcessor, Processor, ProcessorChain, WhitespaceProcessor};
use crate::templates::{TemplateLoader, TemplateSource};
use crate::ENGINE_VERSION;

const SIDECAR_SUFFIX: &str = ".meta.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheEntry {
    pub view: String,
    pub namespace: String,
    pub source_hash: String,
    pub chain_hash: String,
    pub engine_version: String,
    pub compiled_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn sidecar_path(compiled: &Path) -> PathBuf {
        let mut path = compiled.as_os_str().to_owned();
        path.push(SIDECAR_SUFFIX);
        PathBuf::from(path)
    }

    /// Fresh when source and chain are unchanged and the engine that wrote the
    /// entry is compatible with this one.
    pub fn is_fresh_for(&self, source_hash: &str, chain_hash: &str) -> bool {
        self.source_hash == source_hash
            && self.chain_hash == chain_hash
            && engine_compatible(&self.engine_version)
    }
}

/// Same major version, and not written by a newer engine.
fn engine_compatible(written_by: &str) -> bool {
    let (Ok(current), Ok(cached)) = (
        semver::Version::parse(ENGINE_VERSION),
        semver::Version::parse(written_by),
    ) else {
        return false;
    };
    cached.major == current.major && cached <= current
}

#[derive(Debug, Clone, Serialize)]
pub struct ResetFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct ResetReport {
    /// The cache directory did not exist; nothing was attempted.
    pub missing: bool,
    pub deleted: Vec<String>,
    pub failed: Vec<ResetFailure>,
}

impl ResetReport {
    pub fn attempted(&self) -> usize {
        self.deleted.len() + self.failed.len()
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Delete every file in the cache directory.
///
/// A file that cannot be deleted is recorded and skipped; only failing to
/// enumerate the directory is fatal.
pub fn reset_cache(files: &dyn Files, cache_directory: &Path) -> Result<ResetReport, ViewError> {
    if !files.exists(cache_directory) {
        info!(directory = %cache_directory.display(), "cache directory is missing, nothing to clean");
        return Ok(ResetReport {
            missing: true,
            ..ResetReport::default()
        });
    }

    let mut report = ResetReport::default();
    for path in files.list_files(cache_directory)? {
        let relative = files.relative_path(&path, cache_directory);
        match files.delete(&path) {
            Ok(()) => {
                debug!(file = %relative, "deleted");
                report.deleted.push(relative);
            }
            Err(err) => {
                warn!(file = %relative, error = %err, "failed to delete cached view");
                report.failed.push(ResetFailure {
                    path: relative,
                    error: err.to_string(),
                });
            }
        }
    }

    info!(
        deleted = report.deleted.len(),
        failed = report.failed.len(),
        "view cache reset"
    );
    Ok(report)
}

/// Loads, compiles and caches views.
pub struct ViewManager {
    config: ViewsConfig,
    files: Arc<dyn Files>,
    services: Arc<Services>,
    globals: HashMap<String, Value>,
    processors: ProcessorChain,
    loader: TemplateLoader,
}

impl ViewManager {
    pub fn new(config: ViewsConfig, files: Arc<dyn Files>) -> Self {
        Self::with_evaluator(config, files, Arc::new(ExprEvaluator::new()))
    }

    /// Registers the evaluate processor, then the whitespace processor when enabled.
    pub fn with_evaluator(config: ViewsConfig, files: Arc<dyn Files>, evaluator: Arc<dyn Evaluator>) -> Self {
        let mut processors: ProcessorChain = vec![Arc::new(EvaluateProcessor::new(
            files.clone(),
            evaluator,
            config.evaluate.flags.clone(),
        ))];
        if config.whitespace.enabled {
            processors.push(Arc::new(WhitespaceProcessor::new()));
        }

        let loader = TemplateLoader::new(&config.directory, &config.extension, files.clone());
        Self {
            config,
            files,
            services: Arc::new(Services::new()),
            globals: HashMap::new(),
            processors,
            loader,
        }
    }

    pub fn with_services(mut self, services: Services) -> Self {
        self.services = Arc::new(services);
        self
    }

    /// Variables visible to compile-time blocks of every view.
    pub fn with_globals(mut self, globals: HashMap<String, Value>) -> Self {
        self.globals = globals;
        self
    }

    /// Append a processor to the end of the chain.
    pub fn with_processor(mut self, processor: Arc<dyn Processor>) -> Self {
        self.processors.push(processor);
        self
    }

    pub fn with_processors(mut self, processors: ProcessorChain) -> Self {
        self.processors = processors;
        self
    }

    pub fn config(&self) -> &ViewsConfig {
        &self.config
    }

    pub fn cache_directory(&self) -> &Path {
        self.config.cache_directory()
    }

    pub fn loader(&self) -> &TemplateLoader {
        &self.loader
    }

    pub fn compiler(&self, source: TemplateSource) -> Compiler {
        Compiler::new(source, self.processors.clone())
            .with_namespace(&self.config.namespace)
            .with_cache_directory(self.cache_directory())
            .with_extension(&self.config.cache.extension)
    }

    pub fn compiled_filename(&self, view: &str) -> PathBuf {
        compiled_filename(
            self.cache_directory(),
            &self.config.namespace,
            view,
            &self.config.cache.extension,
        )
    }

    /// Compiled view, from cache when the cached copy is still fresh.
    pub fn get(&self, view: &str) -> Result<CompiledArtifact, ViewError> {
        let compiler = self.compiler(self.loader.load(view)?);

        if self.config.cache.enabled {
            if let Some(artifact) = self.cached(&compiler)? {
                info!(view, "cache hit");
                return Ok(artifact);
            }
            info!(view, "cache miss");
        }

        self.compile_with(&compiler)
    }

    /// Compile a view regardless of cache state.
    pub fn compile(&self, view: &str) -> Result<CompiledArtifact, ViewError> {
        let compiler = self.compiler(self.loader.load(view)?);
        self.compile_with(&compiler)
    }

    /// Compile a template that does not live in the views directory.
    pub fn compile_source(&self, source: TemplateSource) -> Result<CompiledArtifact, ViewError> {
        let compiler = self.compiler(source);
        self.compile_with(&compiler)
    }

    pub fn is_fresh(&self, view: &str) -> Result<bool, ViewError> {
        let compiler = self.compiler(self.loader.load(view)?);
        Ok(self.fresh_entry(&compiler)?.is_some())
    }

    /// Drop one view from the cache. Returns whether anything was removed.
    pub fn invalidate(&self, view: &str) -> Result<bool, ViewError> {
        let compiled = self.compiled_filename(view);
        let mut removed = false;
        for path in [CacheEntry::sidecar_path(&compiled), compiled] {
            if self.files.exists(&path) {
                self.files.delete(&path)?;
                removed = true;
            }
        }
        Ok(removed)
    }

    pub fn reset(&self) -> Result<ResetReport, ViewError> {
        reset_cache(self.files.as_ref(), self.cache_directory())
    }

    fn fresh_entry(&self, compiler: &Compiler) -> Result<Option<CacheEntry>, ViewError> {
        let compiled = compiler.compiled_filename();
        let sidecar = CacheEntry::sidecar_path(&compiled);
        if !self.files.exists(&sidecar) || !self.files.exists(&compiled) {
            return Ok(None);
        }

        let entry: CacheEntry = match serde_json::from_str(&self.files.read(&sidecar)?) {
            Ok(entry) => entry,
            Err(err) => {
                debug!(sidecar = %sidecar.display(), error = %err, "unreadable cache entry");
                return Ok(None);
            }
        };

        let fresh = entry.is_fresh_for(&compiler.source().fingerprint(), &compiler.chain_hash()?);
        Ok(fresh.then_some(entry))
    }

    fn cached(&self, compiler: &Compiler) -> Result<Option<CompiledArtifact>, ViewError> {
        let Some(entry) = self.fresh_entry(compiler)? else {
            return Ok(None);
        };

        let filename = compiler.compiled_filename();
        Ok(Some(CompiledArtifact {
            view: entry.view,
            source: self.files.read(&filename)?,
            filename,
            source_hash: entry.source_hash,
            chain_hash: entry.chain_hash,
        }))
    }

    fn compile_with(&self, compiler: &Compiler) -> Result<CompiledArtifact, ViewError> {
        let mut ctx = compiler
            .context(self.services.clone())
            .with_variables(self.globals.clone());
        let artifact = compiler.compile(&mut ctx)?;

        debug!(
            view = %artifact.view,
            elapsed = ?ctx.benchmarks().total(),
            "compiled"
        );

        if self.config.cache.enabled {
            self.store(&artifact)?;
        }
        Ok(artifact)
    }

    fn store(&self, artifact: &CompiledArtifact) -> Result<(), ViewError> {
        let entry = CacheEntry {
            view: artifact.view.clone(),
            namespace: self.config.namespace.clone(),
            source_hash: artifact.source_hash.clone(),
            chain_hash: artifact.chain_hash.clone(),
            engine_version: ENGINE_VERSION.to_string(),
            compiled_at: Utc::now(),
        };

        self.files
            .write(&artifact.filename, &artifact.source, FileMode::Runtime, true)?;
        self.files.write(
            &CacheEntry::sidecar_path(&artifact.filename),
            &serde_json::to_string_pretty(&entry)?,
            FileMode::Runtime,
            true,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(engine_version: &str) -> CacheEntry {
        CacheEntry {
            view: "home".into(),
            namespace: "default".into(),
            source_hash: "s".into(),
            chain_hash: "c".into(),
            engine_version: engine_version.into(),
            compiled_at: Utc::now(),
        }
    }

    #[test]
    fn test_sidecar_path() {
        let path = CacheEntry::sidecar_path(Path::new("cache/home-abc.compiled"));
        assert_eq!(path, PathBuf::from("cache/home-abc.compiled.meta.json"));
    }

    #[test]
    fn test_freshness() {
        let current = entry(ENGINE_VERSION);
        assert!(current.is_fresh_for("s", "c"));
        assert!(!current.is_fresh_for("other", "c"));
        assert!(!current.is_fresh_for("s", "other"));
    }

    #[test]
    fn test_engine_compatibility() {
        assert!(!entry("99.0.0").is_fresh_for("s", "c"));
        assert!(!entry("0.1.0").is_fresh_for("s", "c"));
        assert!(!entry("garbage").is_fresh_for("s", "c"));
    }
}
