//! The report collector: an append-only record of task outcomes and the
//! summary/JSON export built from it (§4.9).

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Success,
    Failed,
    Skipped,
    CacheHit,
}

#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    pub name: String,
    pub status: TaskStatus,
    pub duration_ms: u64,
    pub cache_hit: bool,
    pub error: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

#[derive(Debug, Default, Serialize)]
pub struct Report {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cache_hits: usize,
    pub wall_time_ms: u64,
    pub tasks: Vec<TaskResult>,
}

/// Thread-safe append-only sink for task results, written to from parallel
/// executor branches and read back once execution finishes.
#[derive(Default)]
pub struct Collector {
    results: Mutex<Vec<TaskResult>>,
}

impl Collector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, result: TaskResult) {
        self.results.lock().expect("collector mutex poisoned").push(result);
    }

    /// Summarizes every recorded result; `wall_time` is the caller-measured
    /// end-to-end duration of the whole run (not the sum of task durations,
    /// which would overcount parallel branches).
    pub fn generate(&self, wall_time: Duration) -> Report {
        let results = self.results.lock().expect("collector mutex poisoned");
        let mut report = Report {
            total: results.len(),
            wall_time_ms: wall_time.as_millis() as u64,
            tasks: results.clone(),
            ..Report::default()
        };
        for r in results.iter() {
            match r.status {
                TaskStatus::Success => report.succeeded += 1,
                TaskStatus::Failed => report.failed += 1,
                TaskStatus::Skipped => report.skipped += 1,
                TaskStatus::CacheHit => {
                    report.cache_hits += 1;
                    report.succeeded += 1;
                }
            }
        }
        report
    }

    pub fn write_json(&self, wall_time: Duration, path: &std::path::Path) -> std::io::Result<()> {
        let report = self.generate(wall_time);
        let data = serde_json::to_vec_pretty(&report)?;
        std::fs::write(path, data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(name: &str, status: TaskStatus) -> TaskResult {
        let now = Utc::now();
        TaskResult {
            name: name.to_string(),
            status,
            duration_ms: 10,
            cache_hit: matches!(status, TaskStatus::CacheHit),
            error: None,
            start: now,
            end: now,
        }
    }

    #[test]
    fn counts_by_status() {
        let c = Collector::new();
        c.record(sample("a", TaskStatus::Success));
        c.record(sample("b", TaskStatus::Failed));
        c.record(sample("c", TaskStatus::Skipped));
        c.record(sample("d", TaskStatus::CacheHit));

        let report = c.generate(Duration::from_millis(100));
        assert_eq!(report.total, 4);
        assert_eq!(report.succeeded, 2);
        assert_eq!(report.failed, 1);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.cache_hits, 1);
        assert_eq!(report.wall_time_ms, 100);
    }

    #[test]
    fn write_json_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let c = Collector::new();
        c.record(sample("a", TaskStatus::Success));
        let path = dir.path().join("report.json");
        c.write_json(Duration::from_millis(5), &path).unwrap();
        let data = std::fs::read_to_string(&path).unwrap();
        assert!(data.contains("\"total\""));
    }
}
