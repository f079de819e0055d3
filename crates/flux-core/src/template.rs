//! Template expansion: applying a named `extends` template's fields onto a
//! task wherever the task left that field at its zero value (§4.8).
//!
//! Mirrors the merge rules of `original_source/internal/executor/template.go`:
//! scalars and sequences alike apply only when the task left the field at
//! its zero value (an empty sequence inherits the template's whole-sale, a
//! non-empty one is left untouched), maps merge key-by-key with the task
//! winning ties, and booleans follow an explicit-or rule since Rust's `bool`
//! has no "unset" state distinguishable from `false`.

use crate::ast::{FluxFile, Task, Template};
use crate::error::ExecError;

/// Applies `task.extends`'s template (if any) onto a clone of `task`, then
/// returns it. Templates do not chain (`extends` on a `Template` is not a
/// thing in this model; only tasks extend).
pub fn expand_task(file: &FluxFile, task: &Task) -> Result<Task, ExecError> {
    let Some(template_name) = &task.extends else {
        return Ok(task.clone());
    };
    let template = file
        .template(template_name)
        .ok_or_else(|| ExecError::UnresolvedTemplate(template_name.clone(), task.name.clone()))?;
    Ok(apply_template(task, template))
}

fn apply_template(task: &Task, template: &Template) -> Task {
    let mut merged = task.clone();

    if merged.desc.is_none() {
        merged.desc = template.desc.clone();
    }
    if merged.condition.is_none() {
        merged.condition = template.condition.clone();
    }
    if merged.retry_delay.is_none() {
        merged.retry_delay = template.retry_delay.clone();
    }
    if merged.timeout.is_none() {
        merged.timeout = template.timeout.clone();
    }
    if merged.profile.is_none() {
        merged.profile = template.profile.clone();
    }
    if merged.remote.is_none() {
        merged.remote = template.remote.clone();
    }
    if merged.retries == 0 {
        merged.retries = template.retries;
    }

    if merged.run.is_empty() {
        merged.run = template.run.clone();
    }
    if merged.before.is_empty() {
        merged.before = template.before.clone();
    }
    if merged.after.is_empty() {
        merged.after = template.after.clone();
    }

    // deps/inputs/outputs/secrets/pre inherit only when the task left the
    // sequence empty; a task with its own entries keeps them untouched.
    if merged.deps.is_empty() {
        merged.deps = template.deps.clone();
    }
    if merged.inputs.is_empty() {
        merged.inputs = template.inputs.clone();
    }
    if merged.outputs.is_empty() {
        merged.outputs = template.outputs.clone();
    }
    if merged.secrets.is_empty() {
        merged.secrets = template.secrets.clone();
    }
    if merged.pre.is_empty() {
        merged.pre = template.pre.clone();
    }

    for (k, v) in &template.env {
        merged.env.entry(k.clone()).or_insert_with(|| v.clone());
    }

    // Booleans: the template's `true` only takes effect if the task itself
    // never set the field — since the task's zero value is `false`, a task
    // that wants to opt out of a template's `cache: true` has no way to do
    // so here. That asymmetry mirrors the original's flag semantics and
    // matches §4.8's "fields left at default are filled in".
    if !merged.parallel {
        merged.parallel = template.parallel;
    }
    if !merged.cache {
        merged.cache = template.cache;
    }
    if !merged.docker {
        merged.docker = template.docker;
    }

    merged
}
