//! The variable engine: `${NAME}`, bare `$NAME`, and `$(shell "cmd")`
//! expansion, bulk fixed-point resolution, and profile overlay (§4.3).

use std::collections::BTreeMap;
use std::process::Command;

use crate::ast::Profile;
use crate::error::VarError;

const MAX_RESOLVE_ITERATIONS: usize = 100;

/// Expands a single string's shell substitutions, then its `${NAME}`
/// references (recursively), against `vars` and falling back to the
/// process environment (§4.3).
pub fn expand(value: &str, vars: &BTreeMap<String, String>) -> String {
    let after_shell = expand_shell(value);
    expand_var_refs(&after_shell, vars, 0)
}

fn expand_shell(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let bytes = value.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if let Some(rest) = value[i..].strip_prefix("$(shell \"") {
            if let Some(end) = rest.find("\")") {
                let cmd = &rest[..end];
                out.push_str(&run_shell(cmd));
                i += "$(shell \"".len() + end + "\")".len();
                continue;
            }
        }
        // Advance by one char (not byte) to stay UTF-8 safe.
        let ch = value[i..].chars().next().unwrap();
        out.push(ch);
        i += ch.len_utf8();
    }
    out
}

fn run_shell(cmd: &str) -> String {
    let output = if cfg!(target_os = "windows") {
        Command::new("powershell").args(["-Command", cmd]).output()
    } else {
        Command::new("sh").args(["-c", cmd]).output()
    };
    match output {
        Ok(out) if out.status.success() => String::from_utf8_lossy(&out.stdout).trim().to_string(),
        _ => String::new(),
    }
}

/// Recursively rewrites `${NAME}` and bare `$NAME` references. Recursion
/// depth is bounded to guard against pathological inputs; genuine cycles
/// are caught by [`resolve_all`] during bulk resolution.
fn expand_var_refs(value: &str, vars: &BTreeMap<String, String>, depth: usize) -> String {
    if depth > 64 {
        return value.to_string();
    }
    let mut out = String::with_capacity(value.len());
    let chars: Vec<char> = value.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            if let Some(close) = chars[i + 2..].iter().position(|c| *c == '}') {
                let name: String = chars[i + 2..i + 2 + close].iter().collect();
                if is_valid_name(&name) {
                    out.push_str(&resolve_name(&name, vars, depth, true));
                    i += 2 + close + 1;
                    continue;
                }
            }
        }
        if chars[i] == '$' && chars.get(i + 1).is_some_and(|c| c.is_ascii_alphabetic() || *c == '_') {
            let start = i + 1;
            let mut end = start;
            while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_' || chars[end] == '-') {
                end += 1;
            }
            let name: String = chars[start..end].iter().collect();
            out.push_str(&resolve_name(&name, vars, depth, false));
            i = end;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Looks `name` up in `vars`, falling back to the process environment, and
/// falling back again to the reference's original literal text (`${NAME}`
/// or `$NAME`) when neither has it.
fn resolve_name(name: &str, vars: &BTreeMap<String, String>, depth: usize, braced: bool) -> String {
    if let Some(v) = vars.get(name) {
        expand_var_refs(v, vars, depth + 1)
    } else if let Ok(v) = std::env::var(name) {
        v
    } else if braced {
        format!("${{{name}}}")
    } else {
        format!("${name}")
    }
}

fn is_valid_name(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Bulk-resolves a variable table to a fixed point (§4.3). Runs shell
/// substitutions at most once per value per pass (each pass re-expands the
/// whole table, but a value containing no more `${...}` references stops
/// changing and so stops re-running its shell commands).
pub fn resolve_all(vars: &mut BTreeMap<String, String>) -> Result<(), VarError> {
    for _ in 0..MAX_RESOLVE_ITERATIONS {
        let mut changed = false;
        let snapshot = vars.clone();
        for (k, v) in vars.iter_mut() {
            let expanded = expand(&snapshot[k], &snapshot);
            if &expanded != v {
                *v = expanded;
                changed = true;
            }
        }
        if !changed {
            return Ok(());
        }
    }
    Err(VarError::Cycle)
}

/// Merges a profile's `env` over `vars`, overlay winning (§4.3). Additive
/// only — there is no un-apply.
pub fn apply_profile(vars: &mut BTreeMap<String, String>, profile: &Profile) {
    for (k, v) in &profile.env {
        vars.insert(k.clone(), v.clone());
    }
}

/// `base ⊕ overlay`, overlay winning per key.
pub fn merge(base: &BTreeMap<String, String>, overlay: &BTreeMap<String, String>) -> BTreeMap<String, String> {
    let mut out = base.clone();
    for (k, v) in overlay {
        out.insert(k.clone(), v.clone());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vmap(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn expands_known_and_unknown_vars() {
        let vars = vmap(&[("NAME", "flux"), ("VER", "1.0")]);
        assert_eq!(expand("${NAME}-${VER}", &vars), "flux-1.0");
        assert_eq!(expand("$UNKNOWN", &vars), "$UNKNOWN");
        assert_eq!(expand("${UNKNOWN}", &vars), "${UNKNOWN}");
    }

    #[test]
    fn expands_bare_dollar_name_form() {
        let vars = vmap(&[("NAME", "flux")]);
        assert_eq!(expand("$NAME", &vars), "flux");
        assert_eq!(expand("hello $NAME!", &vars), "hello flux!");
    }

    #[test]
    fn falls_back_to_process_env() {
        std::env::set_var("FLUX_TEST_VAR_XYZ", "envval");
        let vars = vmap(&[]);
        assert_eq!(expand("${FLUX_TEST_VAR_XYZ}", &vars), "envval");
        std::env::remove_var("FLUX_TEST_VAR_XYZ");
    }

    #[test]
    fn resolves_chained_vars_to_fixed_point() {
        let mut vars = vmap(&[("A", "${B}"), ("B", "value")]);
        resolve_all(&mut vars).unwrap();
        assert_eq!(vars["A"], "value");
        assert_eq!(vars["B"], "value");
    }

    #[test]
    fn detects_circular_variable_dependency() {
        let mut vars = vmap(&[("A", "${B}"), ("B", "${A}")]);
        assert!(resolve_all(&mut vars).is_err());
    }

    #[test]
    fn shell_substitution_runs_and_trims() {
        let vars = vmap(&[]);
        let result = expand("$(shell \"echo hello\")", &vars);
        assert_eq!(result, "hello");
    }

    #[test]
    fn shell_substitution_failure_yields_empty_string() {
        let vars = vmap(&[]);
        let result = expand("$(shell \"exit 7\")", &vars);
        assert_eq!(result, "");
    }

    #[test]
    fn profile_overlay_wins() {
        let mut vars = vmap(&[("STAGE", "dev")]);
        let profile = Profile {
            name: "prod".into(),
            env: vmap(&[("STAGE", "prod")]),
        };
        apply_profile(&mut vars, &profile);
        assert_eq!(vars["STAGE"], "prod");
    }
}
