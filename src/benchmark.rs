//! Benchmarks - explicit timing registry
//!
//! One registry lives in each [`CompileContext`](crate::context::CompileContext);
//! there is no process-wide state.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct BenchmarkRecord {
    pub name: String,
    pub started_at: DateTime<Utc>,
    #[serde(serialize_with = "as_millis")]
    pub elapsed: Duration,
}

fn as_millis<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(d.as_secs_f64() * 1000.0)
}

#[derive(Debug, Default)]
pub struct Benchmarks {
    running: HashMap<String, (Instant, DateTime<Utc>)>,
    records: Vec<BenchmarkRecord>,
}

impl Benchmarks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start timing `name`. Restarting a running benchmark resets its clock.
    pub fn begin(&mut self, name: impl Into<String>) {
        self.running.insert(name.into(), (Instant::now(), Utc::now()));
    }

    /// Stop timing `name`; `None` if it was never started.
    pub fn end(&mut self, name: &str) -> Option<Duration> {
        let (instant, started_at) = self.running.remove(name)?;
        let elapsed = instant.elapsed();
        self.records.push(BenchmarkRecord {
            name: name.to_string(),
            started_at,
            elapsed,
        });
        Some(elapsed)
    }

    pub fn records(&self) -> &[BenchmarkRecord] {
        &self.records
    }

    pub fn total(&self) -> Duration {
        self.records.iter().map(|r| r.elapsed).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_begin_end_records() {
        let mut benchmarks = Benchmarks::new();
        benchmarks.begin("home:evaluate");
        assert!(benchmarks.end("home:evaluate").is_some());
        assert_eq!(benchmarks.records().len(), 1);
        assert_eq!(benchmarks.records()[0].name, "home:evaluate");
    }

    #[test]
    fn test_unbalanced_end() {
        let mut benchmarks = Benchmarks::new();
        assert!(benchmarks.end("never-started").is_none());
        assert!(benchmarks.records().is_empty());
    }
}
