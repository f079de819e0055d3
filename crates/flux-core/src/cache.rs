//! Content-addressed per-task cache (§4.5).

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ast::Task;
use crate::error::CacheError;
use crate::hash::{expand_globs, hash_inputs};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CacheEntry {
    pub task_name: String,
    pub input_hash: String,
    pub output_hash: Option<String>,
    pub success: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,
}

pub struct Cache {
    dir: PathBuf,
}

impl Cache {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CacheError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Cache { dir })
    }

    fn entry_path(&self, task_name: &str) -> PathBuf {
        self.dir.join(format!("{task_name}.json"))
    }

    /// Returns the stored entry iff its recorded `input_hash` equals the
    /// probe hash; otherwise a miss (§4.5 Store).
    pub fn get(&self, task_name: &str, input_hash: &str) -> Option<CacheEntry> {
        let data = std::fs::read(self.entry_path(task_name)).ok()?;
        let entry: CacheEntry = serde_json::from_slice(&data).ok()?;
        if entry.input_hash == input_hash {
            Some(entry)
        } else {
            None
        }
    }

    /// Overwrites unconditionally (§4.5 Store).
    pub fn set(&self, entry: &CacheEntry) -> Result<(), CacheError> {
        let data = serde_json::to_vec_pretty(entry)
            .map_err(|e| CacheError::Malformed(entry.task_name.clone(), e))?;
        std::fs::write(self.entry_path(&entry.task_name), data)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), CacheError> {
        if self.dir.exists() {
            std::fs::remove_dir_all(&self.dir)?;
        }
        Ok(())
    }
}

/// The key used for a task's cache lookup: the declared `inputs` hash,
/// falling back to the legacy `watch`-derived key when `inputs` is empty
/// (§4.5 Skip policy).
pub fn cache_key(task: &Task) -> Option<String> {
    if !task.inputs.is_empty() {
        Some(hash_inputs(&task.inputs))
    } else if !task.watch.is_empty() {
        Some(hash_inputs(&task.watch))
    } else {
        None
    }
}

/// Whether outputs-existence should gate a cache hit: only for the
/// `inputs`-based key, not the legacy `watch`-based one (§4.5).
pub fn checks_outputs(task: &Task) -> bool {
    !task.inputs.is_empty()
}

/// A task is cacheable when `cache == true` and it has a usable key
/// (§4.5 Skip policy).
pub fn is_cacheable(task: &Task) -> bool {
    task.cache && (!task.inputs.is_empty() || !task.watch.is_empty())
}

/// Whether every declared output path currently exists on disk (a literal
/// path or a glob pattern matching at least one file).
pub fn outputs_exist(task: &Task) -> bool {
    task.outputs.iter().all(|p| path_exists_for_pattern(p))
}

fn path_exists_for_pattern(pattern: &str) -> bool {
    if Path::new(pattern).exists() {
        return true;
    }
    !expand_globs(std::slice::from_ref(&pattern.to_string())).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_task() -> Task {
        let mut t = Task::new("build");
        t.cache = true;
        t
    }

    #[test]
    fn miss_on_wrong_input_hash() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        cache
            .set(&CacheEntry {
                task_name: "build".into(),
                input_hash: "aaa".into(),
                output_hash: None,
                success: true,
                duration_ms: 0,
                timestamp: Utc::now(),
            })
            .unwrap();
        assert!(cache.get("build", "bbb").is_none());
        assert!(cache.get("build", "aaa").is_some());
    }

    #[test]
    fn set_overwrites_unconditionally() {
        let dir = tempfile::tempdir().unwrap();
        let cache = Cache::new(dir.path()).unwrap();
        cache
            .set(&CacheEntry {
                task_name: "build".into(),
                input_hash: "aaa".into(),
                output_hash: None,
                success: true,
                duration_ms: 5,
                timestamp: Utc::now(),
            })
            .unwrap();
        cache
            .set(&CacheEntry {
                task_name: "build".into(),
                input_hash: "zzz".into(),
                output_hash: None,
                success: true,
                duration_ms: 9,
                timestamp: Utc::now(),
            })
            .unwrap();
        let e = cache.get("build", "zzz").unwrap();
        assert_eq!(e.duration_ms, 9);
    }

    #[test]
    fn clear_removes_directory() {
        let dir = tempfile::tempdir().unwrap();
        let cache_dir = dir.path().join(".flux/cache");
        let cache = Cache::new(&cache_dir).unwrap();
        cache
            .set(&CacheEntry {
                task_name: "build".into(),
                input_hash: "aaa".into(),
                output_hash: None,
                success: true,
                duration_ms: 0,
                timestamp: Utc::now(),
            })
            .unwrap();
        cache.clear().unwrap();
        assert!(!cache_dir.exists());
    }

    #[test]
    fn cacheable_requires_cache_flag_and_declared_inputs() {
        let mut t = base_task();
        assert!(!is_cacheable(&t));
        t.inputs = vec!["*.rs".into()];
        assert!(is_cacheable(&t));
    }

    #[test]
    fn legacy_watch_key_used_when_no_inputs() {
        let mut t = base_task();
        t.watch = vec!["*.rs".into()];
        assert!(is_cacheable(&t));
        assert!(!checks_outputs(&t));
    }
}
