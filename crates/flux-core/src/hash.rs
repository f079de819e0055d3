//! Shared hashing and glob-expansion primitives for the cache (§4.5) and
//! lock file (§4.6) subsystems.

use std::path::PathBuf;

use sha2::{Digest, Sha256};

/// Expands a set of glob patterns to a sorted, de-duplicated list of
/// matching file paths (directories are skipped). Patterns with no
/// matches, or that are themselves malformed, contribute nothing —
/// matching the original implementation's best-effort behavior.
pub fn expand_globs(patterns: &[String]) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    for pattern in patterns {
        let Ok(matches) = glob::glob(pattern) else {
            continue;
        };
        for entry in matches.flatten() {
            if entry.is_file() {
                paths.push(entry);
            }
        }
    }
    paths.sort();
    paths.dedup();
    paths
}

pub fn hex_sha256(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// The file-change-detector digest described in §4.5: SHA-256 over the
/// ordered concatenation of, for each matched path, the full file bytes,
/// the path string, and the mod-time string.
pub fn hash_inputs(patterns: &[String]) -> String {
    let paths = expand_globs(patterns);
    let mut hasher = Sha256::new();
    for path in &paths {
        if let Ok(bytes) = std::fs::read(path) {
            hasher.update(&bytes);
        }
        hasher.update(path.to_string_lossy().as_bytes());
        if let Ok(meta) = std::fs::metadata(path) {
            if let Ok(modified) = meta.modified() {
                hasher.update(format!("{modified:?}").as_bytes());
            }
        }
    }
    hex::encode(hasher.finalize())
}

/// SHA-256 of a single file's contents.
pub fn hash_file(path: &std::path::Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    Ok(hex_sha256(&bytes))
}
