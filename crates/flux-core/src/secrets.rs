//! Secret resolution and `.env` parsing (§4.7 step c, §9 Open Question).

use std::collections::BTreeMap;
use std::path::Path;

use crate::error::ExecError;

/// Parses a `.env` file body: `KEY=value` lines, `#` comments, and
/// optional surrounding quotes. Escape sequences are not processed — this
/// mirrors the original implementation's (intentionally simple) behavior.
pub fn parse_dotenv(contents: &str) -> BTreeMap<String, String> {
    let mut map = BTreeMap::new();
    for line in contents.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim().to_string();
        let mut value = value.trim().to_string();
        if (value.starts_with('"') && value.ends_with('"') && value.len() >= 2)
            || (value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2)
        {
            value = value[1..value.len() - 1].to_string();
        }
        map.insert(key, value);
    }
    map
}

/// Resolves a list of secret names against the process environment, then a
/// `.env` file in `workdir`. Any unresolved secret is a fatal error
/// (§4.7 step c).
pub fn resolve_secrets(
    task_name: &str,
    names: &[String],
    workdir: &Path,
) -> Result<BTreeMap<String, String>, ExecError> {
    let dotenv_path = workdir.join(".env");
    let dotenv = std::fs::read_to_string(&dotenv_path)
        .map(|s| parse_dotenv(&s))
        .unwrap_or_default();

    let mut resolved = BTreeMap::new();
    for name in names {
        if let Ok(v) = std::env::var(name) {
            resolved.insert(name.clone(), v);
            continue;
        }
        if let Some(v) = dotenv.get(name) {
            resolved.insert(name.clone(), v.clone());
            continue;
        }
        return Err(ExecError::MissingSecret(name.clone(), task_name.to_string()));
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dotenv_with_comments_and_quotes() {
        let src = "# comment\nFOO=bar\nBAZ=\"quoted value\"\nEMPTY=\nSINGLE='abc'\n";
        let map = parse_dotenv(src);
        assert_eq!(map.get("FOO"), Some(&"bar".to_string()));
        assert_eq!(map.get("BAZ"), Some(&"quoted value".to_string()));
        assert_eq!(map.get("SINGLE"), Some(&"abc".to_string()));
        assert_eq!(map.get("EMPTY"), Some(&"".to_string()));
    }

    #[test]
    fn missing_secret_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = resolve_secrets("t", &["DEFINITELY_NOT_SET_XYZ".to_string()], dir.path());
        assert!(err.is_err());
    }
}
