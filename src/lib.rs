//! ViewForge Core - View Template Compiler
//!
//! Templates mix markup with PHP-style code blocks (`<?php ?>`, `<?= ?>`, `<? ?>`).
//! A [`Compiler`] runs an ordered chain of [`Processor`]s over the template text;
//! the [`Isolator`] lets a processor rewrite markup without ever touching code.
//! Blocks carrying a compile flag are evaluated once, at compile time, and their
//! output is inlined. [`ViewManager`] ties loading, compiling and caching together.

pub mod benchmark;
pub mod cache;
pub mod compiler;
pub mod config;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod files;
pub mod hashing;
pub mod isolator;
pub mod processors;
pub mod templates;

pub use benchmark::{BenchmarkRecord, Benchmarks};
pub use cache::{reset_cache, CacheEntry, ResetFailure, ResetReport, ViewManager};
pub use compiler::{compiled_filename, CompiledArtifact, Compiler};
pub use config::ViewsConfig;
pub use context::{CompileContext, CompileUnit, Services};
pub use error::{EvaluationError, StorageError, ViewError};
pub use evaluator::{Evaluator, ExprEvaluator, Value};
pub use files::{FileMode, Files, LocalFiles};
pub use hashing::{canonical_json, compute_chain_hash, compute_view_hash, sha256_hex};
pub use isolator::{ExtractedBlock, Isolator};
pub use processors::{EvaluateProcessor, Processor, ProcessorChain, WhitespaceProcessor};
pub use templates::{TemplateLoader, TemplateSource};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
