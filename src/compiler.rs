//! Compiler - runs the processor chain over one template
//!
//! A failing processor aborts the whole compile and its error reaches the
//! caller as-is. Nothing is written here; persisting is the cache layer's job.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info_span};
use uuid::Uuid;

use crate::context::{CompileContext, CompileUnit, Services};
use crate::error::ViewError;
use crate::hashing::{compute_chain_hash, compute_view_hash};
use crate::processors::ProcessorChain;
use crate::templates::TemplateSource;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledArtifact {
    pub view: String,
    pub filename: PathBuf,
    pub source: String,
    pub source_hash: String,
    pub chain_hash: String,
}

/// `<cache dir>/<view with separators flattened>-<16 hex of view hash>.<ext>`
pub fn compiled_filename(cache_directory: &Path, namespace: &str, view: &str, extension: &str) -> PathBuf {
    let readable: String = view
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
        .collect();
    let hash = compute_view_hash(namespace, view);
    cache_directory.join(format!("{}-{}.{}", readable, &hash[..16], extension))
}

pub struct Compiler {
    id: Uuid,
    namespace: String,
    source: TemplateSource,
    cache_directory: PathBuf,
    extension: String,
    processors: ProcessorChain,
}

impl Compiler {
    pub fn new(source: TemplateSource, processors: ProcessorChain) -> Self {
        Self {
            id: Uuid::new_v4(),
            namespace: "default".to_string(),
            source,
            cache_directory: PathBuf::from("cache/views"),
            extension: "compiled".to_string(),
            processors,
        }
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_cache_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.cache_directory = directory.into();
        self
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    /// Identity of this compiler instance.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn source(&self) -> &TemplateSource {
        &self.source
    }

    pub fn compiled_filename(&self) -> PathBuf {
        compiled_filename(&self.cache_directory, &self.namespace, &self.source.name, &self.extension)
    }

    pub fn chain_hash(&self) -> Result<String, ViewError> {
        let descriptors: Vec<_> = self.processors.iter().map(|p| p.descriptor()).collect();
        Ok(compute_chain_hash(&descriptors)?)
    }

    /// Fresh context for one compile of this unit.
    pub fn context(&self, services: Arc<Services>) -> CompileContext {
        CompileContext::new(
            CompileUnit {
                compiler_id: self.id,
                namespace: self.namespace.clone(),
                view: self.source.name.clone(),
                compiled_filename: self.compiled_filename(),
                cache_directory: self.cache_directory.clone(),
            },
            services,
        )
    }

    pub fn compile(&self, ctx: &mut CompileContext) -> Result<CompiledArtifact, ViewError> {
        let span = info_span!("compile", view = %self.source.name, compiler = %self.id);
        let _enter = span.enter();

        let mut source = self.source.content.clone();
        for processor in &self.processors {
            let mark = format!("{}:{}", self.source.name, processor.name());
            ctx.benchmarks_mut().begin(mark.clone());
            let result = processor.process(&source, ctx);
            let elapsed = ctx.benchmarks_mut().end(&mark);
            debug!(processor = processor.name(), ?elapsed, ok = result.is_ok(), "processor finished");
            source = result?;
        }

        Ok(CompiledArtifact {
            view: self.source.name.clone(),
            filename: self.compiled_filename(),
            source,
            source_hash: self.source.fingerprint(),
            chain_hash: self.chain_hash()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processors::{Processor, WhitespaceProcessor};

    struct Upper;

    impl Processor for Upper {
        fn name(&self) -> &'static str {
            "upper"
        }

        fn process(&self, source: &str, _ctx: &mut CompileContext) -> Result<String, ViewError> {
            Ok(source.to_uppercase())
        }
    }

    struct Failing;

    impl Processor for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn process(&self, _source: &str, _ctx: &mut CompileContext) -> Result<String, ViewError> {
            Err(ViewError::malformed(7, "boom"))
        }
    }

    fn chain(processors: Vec<Arc<dyn Processor>>) -> ProcessorChain {
        processors
    }

    fn compile(source: &str, chain: ProcessorChain) -> Result<CompiledArtifact, ViewError> {
        let compiler = Compiler::new(TemplateSource::from_string("home", source), chain);
        let mut ctx = compiler.context(Arc::new(Services::new()));
        compiler.compile(&mut ctx)
    }

    #[test]
    fn test_chain_runs_in_order() {
        let out = compile("<p>  a  </p>", chain(vec![Arc::new(WhitespaceProcessor), Arc::new(Upper)])).unwrap();
        assert_eq!(out.source, "<P> A </P>");
    }

    #[test]
    fn test_failure_keeps_original_error() {
        let err = compile("x", chain(vec![Arc::new(Upper), Arc::new(Failing)])).unwrap_err();
        assert!(matches!(err, ViewError::MalformedSource { offset: 7, .. }));
    }

    #[test]
    fn test_compiled_filename_is_deterministic() {
        let a = compiled_filename(Path::new("cache"), "default", "admin/users", "compiled");
        let b = compiled_filename(Path::new("cache"), "default", "admin/users", "compiled");
        assert_eq!(a, b);
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("admin-users-"));
        assert!(name.ends_with(".compiled"));
        assert_ne!(a, compiled_filename(Path::new("cache"), "default", "admin-users", "compiled"));
    }

    #[test]
    fn test_benchmarks_recorded_per_processor() {
        let compiler = Compiler::new(
            TemplateSource::from_string("home", "x"),
            chain(vec![Arc::new(Upper), Arc::new(WhitespaceProcessor)]),
        );
        let mut ctx = compiler.context(Arc::new(Services::new()));
        compiler.compile(&mut ctx).unwrap();
        let names: Vec<_> = ctx.benchmarks().records().iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["home:upper", "home:whitespace"]);
    }
}
