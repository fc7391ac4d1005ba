//! Error taxonomy for the view compilation pipeline

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ViewError {
    #[error("Malformed source at byte {offset}: {message}")]
    MalformedSource { offset: usize, message: String },

    #[error("View not found: {0}")]
    ViewNotFound(String),

    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvaluationError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ViewError {
    pub(crate) fn malformed(offset: usize, message: impl Into<String>) -> Self {
        ViewError::MalformedSource {
            offset,
            message: message.into(),
        }
    }
}

/// Failures reported by a [`Files`](crate::files::Files) implementation.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {0}")]
    NotFound(PathBuf),
}

impl StorageError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        if source.kind() == std::io::ErrorKind::NotFound {
            StorageError::NotFound(path)
        } else {
            StorageError::Io { path, source }
        }
    }
}

/// Failures raised while running compile-time code blocks.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EvaluationError {
    #[error("Parse error near `{near}`: {message}")]
    Parse { near: String, message: String },

    #[error("Undefined variable ${0}")]
    UndefinedVariable(String),

    #[error("Call to undefined function {0}()")]
    UndefinedFunction(String),

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Type error: {0}")]
    Type(String),

    #[error("Service {name} failed: {message}")]
    Service { name: String, message: String },
}
