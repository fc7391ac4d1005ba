//! Compile Context - everything one compile invocation may touch
//!
//! Compile-time code blocks reach application services only through
//! [`Services`]. Variables assigned by one block are visible to later blocks of
//! the same compile and to nothing else.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use uuid::Uuid;

use crate::benchmark::Benchmarks;
use crate::evaluator::Value;

pub type ServiceFn = dyn Fn(&[Value]) -> Result<Value, String> + Send + Sync;

/// Named functions callable from compile-time code blocks.
#[derive(Clone, Default)]
pub struct Services {
    functions: HashMap<String, Arc<ServiceFn>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn with<F>(mut self, name: impl Into<String>, function: F) -> Self
    where
        F: Fn(&[Value]) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.register(name, function);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<ServiceFn>> {
        self.functions.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<_> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl fmt::Debug for Services {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Services").field("functions", &self.names()).finish()
    }
}

/// Identity of the unit being compiled.
#[derive(Debug, Clone)]
pub struct CompileUnit {
    pub compiler_id: Uuid,
    pub namespace: String,
    pub view: String,
    pub compiled_filename: PathBuf,
    pub cache_directory: PathBuf,
}

#[derive(Debug)]
pub struct CompileContext {
    pub unit: CompileUnit,
    services: Arc<Services>,
    variables: HashMap<String, Value>,
    benchmarks: Benchmarks,
}

impl CompileContext {
    pub fn new(unit: CompileUnit, services: Arc<Services>) -> Self {
        Self {
            unit,
            services,
            variables: HashMap::new(),
            benchmarks: Benchmarks::new(),
        }
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn variable(&self, name: &str) -> Option<&Value> {
        self.variables.get(name)
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: Value) {
        self.variables.insert(name.into(), value);
    }

    pub fn with_variables(mut self, variables: HashMap<String, Value>) -> Self {
        self.variables.extend(variables);
        self
    }

    pub fn benchmarks(&self) -> &Benchmarks {
        &self.benchmarks
    }

    pub fn benchmarks_mut(&mut self) -> &mut Benchmarks {
        &mut self.benchmarks
    }
}
