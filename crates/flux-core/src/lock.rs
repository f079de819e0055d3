//! The lock file: a verifiable snapshot of config/command/file digests
//! across all declared tasks (§4.6).

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ast::{FluxFile, Task};
use crate::error::LockError;
use crate::hash::{expand_globs, hash_file, hex_sha256};

pub const LOCK_VERSION: &str = "2.0";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileInfo {
    pub hash: String,
    pub size: u64,
    pub mod_time: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Metadata {
    pub path: String,
    pub host: String,
    pub user: String,
    pub flux_version: String,
    pub os: String,
    pub arch: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskLock {
    pub config_hash: String,
    pub command_hash: String,
    pub inputs: BTreeMap<String, FileInfo>,
    pub outputs: BTreeMap<String, FileInfo>,
    pub hash: String,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LockFile {
    pub version: String,
    pub generated: DateTime<Utc>,
    pub fluxfile_hash: String,
    pub metadata: Metadata,
    pub tasks: BTreeMap<String, TaskLock>,
}

impl LockFile {
    pub fn load(path: &Path) -> Result<Self, LockError> {
        let data = std::fs::read(path)?;
        Ok(serde_json::from_slice(&data)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), LockError> {
        let data = serde_json::to_vec_pretty(self)?;
        std::fs::write(path, data)?;
        Ok(())
    }

    /// Removes lock entries for task names not present in `file`; returns
    /// the number removed (§4.6 Clean).
    pub fn clean(&mut self, file: &FluxFile) -> usize {
        let known: std::collections::HashSet<&str> =
            file.tasks.iter().map(|t| t.name.as_str()).collect();
        let before = self.tasks.len();
        self.tasks.retain(|name, _| known.contains(name.as_str()));
        before - self.tasks.len()
    }
}

fn file_info(path: &Path) -> Option<(String, FileInfo)> {
    let meta = std::fs::metadata(path).ok()?;
    let hash = hash_file(path).ok()?;
    let mod_time = meta
        .modified()
        .map(|t| format!("{t:?}"))
        .unwrap_or_default();
    Some((
        path.to_string_lossy().to_string(),
        FileInfo {
            hash,
            size: meta.len(),
            mod_time,
        },
    ))
}

fn collect_file_infos(patterns: &[String]) -> BTreeMap<String, FileInfo> {
    let mut map = BTreeMap::new();
    for path in expand_globs(patterns) {
        if let Some((key, info)) = file_info(&path) {
            map.insert(key, info);
        }
    }
    map
}

/// SHA-256 over a deterministic `key=value` concatenation of the fields
/// listed in §4.6 ("config_hash").
pub fn config_hash(task: &Task) -> String {
    let mut s = String::new();
    s.push_str("deps=");
    s.push_str(&task.deps.join(","));
    s.push(';');
    s.push_str("env=");
    for (k, v) in &task.env {
        s.push_str(k);
        s.push('=');
        s.push_str(v);
        s.push(',');
    }
    s.push(';');
    s.push_str(&format!("parallel={}", task.parallel));
    s.push_str(&format!(";cache={}", task.cache));
    s.push_str(&format!(";docker={}", task.docker));
    s.push_str(&format!(";if={}", task.condition.as_deref().unwrap_or("")));
    s.push_str(&format!(";remote={}", task.remote.as_deref().unwrap_or("")));
    s.push_str(&format!(";timeout={}", task.timeout.as_deref().unwrap_or("")));
    hex_sha256(s.as_bytes())
}

/// SHA-256 over the `run` commands joined by newline (§4.6).
pub fn command_hash(task: &Task) -> String {
    hex_sha256(task.run.join("\n").as_bytes())
}

/// Generates a lock entry for every task whose `inputs` or `outputs` are
/// non-empty (§4.6 Generation).
pub fn generate(file: &FluxFile, fluxfile_path: &Path) -> Result<LockFile, LockError> {
    let fluxfile_bytes = std::fs::read(fluxfile_path).unwrap_or_default();
    let fluxfile_hash = hex_sha256(&fluxfile_bytes);

    let mut tasks = BTreeMap::new();
    for task in &file.tasks {
        if task.inputs.is_empty() && task.outputs.is_empty() {
            continue;
        }
        let inputs = collect_file_infos(&task.inputs);
        let outputs = collect_file_infos(&task.outputs);
        let inputs_json = serde_json::to_vec(&inputs).unwrap_or_default();
        let hash = hex_sha256(&inputs_json);
        tasks.insert(
            task.name.clone(),
            TaskLock {
                config_hash: config_hash(task),
                command_hash: command_hash(task),
                inputs,
                outputs,
                hash,
                last_updated: Utc::now(),
            },
        );
    }

    Ok(LockFile {
        version: LOCK_VERSION.to_string(),
        generated: Utc::now(),
        fluxfile_hash,
        metadata: Metadata {
            path: fluxfile_path.to_string_lossy().to_string(),
            host: hostname(),
            user: username(),
            flux_version: env!("CARGO_PKG_VERSION").to_string(),
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        },
        tasks,
    })
}

fn hostname() -> String {
    std::env::var("HOSTNAME")
        .or_else(|_| std::env::var("COMPUTERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

fn username() -> String {
    std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "unknown".to_string())
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ChangeType {
    Modified,
    SizeChanged,
    Missing,
    New,
}

#[derive(Debug, Clone, Serialize)]
pub struct FileChange {
    pub path: String,
    pub change_type: ChangeType,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiffResult {
    pub task: String,
    pub config_changed: bool,
    pub command_changed: bool,
    pub input_changes: Vec<FileChange>,
    pub output_changes: Vec<FileChange>,
}

/// Recomputes every `FileInfo` digest from disk; a task with zero change
/// records is unchanged (§4.6 Verify).
pub fn verify(lock: &LockFile) -> Vec<DiffResult> {
    let mut results = Vec::new();
    for (name, task_lock) in &lock.tasks {
        let input_changes = diff_files(&task_lock.inputs);
        let output_changes = diff_files(&task_lock.outputs);
        if !input_changes.is_empty() || !output_changes.is_empty() {
            results.push(DiffResult {
                task: name.clone(),
                config_changed: false,
                command_changed: false,
                input_changes,
                output_changes,
            });
        }
    }
    results
}

fn diff_files(recorded: &BTreeMap<String, FileInfo>) -> Vec<FileChange> {
    let mut changes = Vec::new();
    for (path, info) in recorded {
        let p = Path::new(path);
        if !p.exists() {
            changes.push(FileChange {
                path: path.clone(),
                change_type: ChangeType::Missing,
            });
            continue;
        }
        let Ok(meta) = std::fs::metadata(p) else {
            changes.push(FileChange {
                path: path.clone(),
                change_type: ChangeType::Missing,
            });
            continue;
        };
        let Ok(actual_hash) = hash_file(p) else {
            changes.push(FileChange {
                path: path.clone(),
                change_type: ChangeType::Missing,
            });
            continue;
        };
        if actual_hash != info.hash {
            if meta.len() != info.size {
                changes.push(FileChange {
                    path: path.clone(),
                    change_type: ChangeType::SizeChanged,
                });
            } else {
                changes.push(FileChange {
                    path: path.clone(),
                    change_type: ChangeType::Modified,
                });
            }
        }
    }
    changes
}

/// Per-task `{config_changed, command_changed, input_changes[], output_changes[]}`;
/// only tasks with at least one change appear (§4.6 Diff).
pub fn diff(lock: &LockFile, file: &FluxFile) -> Vec<DiffResult> {
    let mut results = Vec::new();
    for (name, task_lock) in &lock.tasks {
        let Some(task) = file.task(name) else { continue };

        let config_changed = config_hash(task) != task_lock.config_hash;
        let command_changed = command_hash(task) != task_lock.command_hash;

        let mut input_changes = diff_files(&task_lock.inputs);
        input_changes.extend(new_files(&task.inputs, &task_lock.inputs));
        let mut output_changes = diff_files(&task_lock.outputs);
        output_changes.extend(new_files(&task.outputs, &task_lock.outputs));

        if config_changed || command_changed || !input_changes.is_empty() || !output_changes.is_empty() {
            results.push(DiffResult {
                task: name.clone(),
                config_changed,
                command_changed,
                input_changes,
                output_changes,
            });
        }
    }
    results
}

fn new_files(patterns: &[String], recorded: &BTreeMap<String, FileInfo>) -> Vec<FileChange> {
    expand_globs(patterns)
        .into_iter()
        .filter_map(|p| {
            let key = p.to_string_lossy().to_string();
            if recorded.contains_key(&key) {
                None
            } else {
                Some(FileChange {
                    path: key,
                    change_type: ChangeType::New,
                })
            }
        })
        .collect()
}

/// Replaces a single task's lock entry (§4.6 UpdateTask).
pub fn update_task(lock: &mut LockFile, file: &FluxFile, task_name: &str) -> Option<()> {
    let task = file.task(task_name)?;
    let inputs = collect_file_infos(&task.inputs);
    let outputs = collect_file_infos(&task.outputs);
    let inputs_json = serde_json::to_vec(&inputs).unwrap_or_default();
    let hash = hex_sha256(&inputs_json);
    lock.tasks.insert(
        task_name.to_string(),
        TaskLock {
            config_hash: config_hash(task),
            command_hash: command_hash(task),
            inputs,
            outputs,
            hash,
            last_updated: Utc::now(),
        },
    );
    Some(())
}

pub fn default_lock_path(cwd: &Path) -> PathBuf {
    cwd.join("FluxFile.lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Task;

    fn file_with_task(name: &str, inputs: &[&str], outputs: &[&str], run: &[&str]) -> FluxFile {
        let mut f = FluxFile::new();
        let mut t = Task::new(name);
        t.inputs = inputs.iter().map(|s| s.to_string()).collect();
        t.outputs = outputs.iter().map(|s| s.to_string()).collect();
        t.run = run.iter().map(|s| s.to_string()).collect();
        f.tasks.push(t);
        f
    }

    #[test]
    fn config_hash_ignores_env_key_order() {
        let mut t1 = Task::new("a");
        t1.env.insert("A".into(), "1".into());
        t1.env.insert("B".into(), "2".into());
        let mut t2 = Task::new("a");
        t2.env.insert("B".into(), "2".into());
        t2.env.insert("A".into(), "1".into());
        assert_eq!(config_hash(&t1), config_hash(&t2));
    }

    #[test]
    fn config_hash_unaffected_by_sibling_task() {
        let mut t = Task::new("a");
        t.env.insert("A".into(), "1".into());
        let h1 = config_hash(&t);
        // Adding an unrelated field on another task doesn't exist here —
        // config_hash is a pure function of the one task, so this is a
        // sanity check that re-hashing the same task is stable.
        let h2 = config_hash(&t);
        assert_eq!(h1, h2);
    }

    #[test]
    fn command_hash_equal_for_identical_run_sequences() {
        let mut t1 = Task::new("a");
        t1.run = vec!["echo hi".into()];
        let mut t2 = Task::new("b");
        t2.run = vec!["echo hi".into()];
        assert_eq!(command_hash(&t1), command_hash(&t2));
    }

    #[test]
    fn diff_detects_command_and_input_change() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.go");
        std::fs::write(&src, b"v1").unwrap();
        let pattern = src.to_string_lossy().to_string();

        let file = file_with_task("build", &[&pattern], &[], &["echo build"]);
        let lock_path = dir.path().join("FluxFile");
        std::fs::write(&lock_path, "x").unwrap();
        let lock = generate(&file, &lock_path).unwrap();

        std::fs::write(&src, b"v2-changed-content").unwrap();
        let mut file2 = file_with_task("build", &[&pattern], &[], &["echo build2"]);
        file2.tasks[0].inputs = vec![pattern];

        let diffs = diff(&lock, &file2);
        assert_eq!(diffs.len(), 1);
        assert!(diffs[0].command_changed);
        assert!(!diffs[0].input_changes.is_empty());
    }

    #[test]
    fn verify_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("gone.txt");
        std::fs::write(&src, b"data").unwrap();
        let pattern = src.to_string_lossy().to_string();
        let file = file_with_task("t", &[&pattern], &[], &[]);
        let lock_path = dir.path().join("FluxFile");
        std::fs::write(&lock_path, "x").unwrap();
        let lock = generate(&file, &lock_path).unwrap();

        std::fs::remove_file(&src).unwrap();
        let results = verify(&lock);
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].input_changes[0].change_type,
            ChangeType::Missing
        ));
    }

    #[test]
    fn clean_removes_stale_task_entries() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"1").unwrap();
        let pattern = src.to_string_lossy().to_string();
        let file = file_with_task("keep", &[&pattern], &[], &[]);
        let lock_path = dir.path().join("FluxFile");
        std::fs::write(&lock_path, "x").unwrap();
        let mut lock = generate(&file, &lock_path).unwrap();
        lock.tasks.insert(
            "ghost".to_string(),
            lock.tasks.get("keep").unwrap().clone(),
        );
        let removed = lock.clean(&file);
        assert_eq!(removed, 1);
        assert!(!lock.tasks.contains_key("ghost"));
    }
}
