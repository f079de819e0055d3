//! Precondition checks: `file`, `command`, `env` guards (§4.7 step e).

use std::collections::BTreeMap;
use std::path::Path;

use crate::ast::{Precondition, PreconditionKind};
use crate::error::ExecError;

/// Evaluates every precondition for `task_name`; the first failure aborts
/// with a descriptive error (§4.7 step e).
pub fn check_all(
    task_name: &str,
    preconditions: &[Precondition],
    vars: &BTreeMap<String, String>,
) -> Result<(), ExecError> {
    for pre in preconditions {
        check_one(task_name, pre, vars)?;
    }
    Ok(())
}

fn check_one(
    task_name: &str,
    pre: &Precondition,
    vars: &BTreeMap<String, String>,
) -> Result<(), ExecError> {
    let ok = match pre.kind {
        PreconditionKind::File => Path::new(&pre.value).exists(),
        PreconditionKind::Command => which::which(&pre.value).is_ok(),
        PreconditionKind::Env => vars
            .get(&pre.value)
            .cloned()
            .or_else(|| std::env::var(&pre.value).ok())
            .is_some_and(|v| !v.is_empty()),
        PreconditionKind::Unknown => false,
    };
    if ok {
        Ok(())
    } else {
        Err(ExecError::Precondition {
            task: task_name.to_string(),
            reason: describe(pre),
        })
    }
}

fn describe(pre: &Precondition) -> String {
    match pre.kind {
        PreconditionKind::File => format!("file '{}' does not exist", pre.value),
        PreconditionKind::Command => format!("command '{}' not found on PATH", pre.value),
        PreconditionKind::Env => format!("environment variable '{}' is unset or empty", pre.value),
        PreconditionKind::Unknown => format!("unknown precondition kind for '{}'", pre.value),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_precondition_checks_existence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("marker");
        std::fs::write(&path, b"x").unwrap();
        let pre = Precondition {
            kind: PreconditionKind::File,
            value: path.to_string_lossy().to_string(),
        };
        assert!(check_all("t", std::slice::from_ref(&pre), &BTreeMap::new()).is_ok());
    }

    #[test]
    fn missing_file_fails() {
        let pre = Precondition {
            kind: PreconditionKind::File,
            value: "/no/such/path/ever".into(),
        };
        assert!(check_all("t", std::slice::from_ref(&pre), &BTreeMap::new()).is_err());
    }

    #[test]
    fn env_precondition_checks_nonempty() {
        let mut vars = BTreeMap::new();
        vars.insert("FOO".to_string(), "bar".to_string());
        let pre = Precondition {
            kind: PreconditionKind::Env,
            value: "FOO".into(),
        };
        assert!(check_all("t", std::slice::from_ref(&pre), &vars).is_ok());
    }

    #[test]
    fn unknown_kind_always_fails() {
        let pre = Precondition {
            kind: PreconditionKind::Unknown,
            value: "whatever".into(),
        };
        assert!(check_all("t", std::slice::from_ref(&pre), &BTreeMap::new()).is_err());
    }
}
