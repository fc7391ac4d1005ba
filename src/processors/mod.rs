//! Processors - ordered source-to-source transformations
//!
//! A [`Compiler`](crate::compiler::Compiler) runs its processors in registration
//! order, each one receiving the previous one's output.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::context::CompileContext;
use crate::error::ViewError;

pub mod evaluate;
pub mod whitespace;

pub use evaluate::{fetch_code, EvaluateProcessor};
pub use whitespace::WhitespaceProcessor;

pub trait Processor: Send + Sync {
    fn name(&self) -> &'static str;

    /// Configuration that influences output. Feeds the chain hash, so two
    /// processors with equal descriptors must produce equal output.
    fn descriptor(&self) -> Value {
        json!({ "processor": self.name() })
    }

    fn process(&self, source: &str, ctx: &mut CompileContext) -> Result<String, ViewError>;
}

pub type ProcessorChain = Vec<Arc<dyn Processor>>;
