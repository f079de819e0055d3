//! Matrix expansion: turning one task's `matrix` block into one derived,
//! matrix-free task per combination of dimension values (§4.7, §9).
//!
//! Dimension iteration order is sorted by key name — the spec leaves this an
//! Open Question; sorting makes derived task names and execution order
//! deterministic across runs, which the graph and report collector both
//! depend on.

use crate::ast::Task;

/// Expands `task.matrix` into concrete derived tasks, one per point in the
/// Cartesian product of its dimensions. Returns `vec![task.clone()]`
/// unchanged if there is no matrix.
pub fn expand(task: &Task) -> Vec<Task> {
    let Some(matrix) = &task.matrix else {
        return vec![task.clone()];
    };
    if matrix.dimensions.is_empty() {
        return vec![task.clone()];
    }

    let keys: Vec<&String> = matrix.dimensions.keys().collect();
    let mut points: Vec<Vec<(String, String)>> = vec![Vec::new()];
    for key in &keys {
        let values = &matrix.dimensions[*key];
        let mut next = Vec::with_capacity(points.len() * values.len());
        for point in &points {
            for value in values {
                let mut p = point.clone();
                p.push(((*key).clone(), value.clone()));
                next.push(p);
            }
        }
        points = next;
    }

    points
        .into_iter()
        .map(|point| derive_task(task, &point))
        .collect()
}

fn derive_task(task: &Task, point: &[(String, String)]) -> Task {
    let mut derived = task.clone();
    derived.matrix = None;

    let suffix: String = point
        .iter()
        .map(|(k, v)| format!("-{k}={v}"))
        .collect::<Vec<_>>()
        .join("");
    derived.name = format!("{}{}", task.name, suffix);

    for (k, v) in point {
        derived.env.insert(k.clone(), v.clone());
    }
    derived
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Matrix;
    use std::collections::BTreeMap;

    fn matrix_task(dims: &[(&str, &[&str])]) -> Task {
        let mut dimensions = BTreeMap::new();
        for (k, vs) in dims {
            dimensions.insert(k.to_string(), vs.iter().map(|s| s.to_string()).collect());
        }
        let mut t = Task::new("test");
        t.matrix = Some(Matrix { dimensions });
        t
    }

    #[test]
    fn single_dimension_expands_one_task_per_value() {
        let t = matrix_task(&[("os", &["linux", "darwin"])]);
        let expanded = expand(&t);
        assert_eq!(expanded.len(), 2);
        assert_eq!(expanded[0].name, "test-os=linux");
        assert_eq!(expanded[1].name, "test-os=darwin");
        assert!(expanded[0].matrix.is_none());
        assert_eq!(expanded[0].env["os"], "linux");
    }

    #[test]
    fn two_dimensions_expand_to_cartesian_product() {
        let t = matrix_task(&[("os", &["linux", "darwin"]), ("arch", &["amd64", "arm64"])]);
        let expanded = expand(&t);
        assert_eq!(expanded.len(), 4);
        let names: Vec<&str> = expanded.iter().map(|t| t.name.as_str()).collect();
        assert!(names.contains(&"test-arch=amd64-os=linux"));
        assert!(names.contains(&"test-arch=arm64-os=darwin"));
    }

    #[test]
    fn no_matrix_returns_single_unchanged_task() {
        let t = Task::new("plain");
        let expanded = expand(&t);
        assert_eq!(expanded.len(), 1);
        assert_eq!(expanded[0], t);
    }

    #[test]
    fn derived_task_inherits_base_run_commands() {
        let mut t = matrix_task(&[("os", &["linux"])]);
        t.run = vec!["go build".into()];
        let expanded = expand(&t);
        assert_eq!(expanded[0].run, vec!["go build".to_string()]);
    }
}
