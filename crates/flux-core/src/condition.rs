//! `if` condition evaluation (§4.7).
//!
//! Conditions are small strings of the form `<left> <op> <right>`. Because
//! the lexer has no dedicated comparison-operator tokens (§4.1's token set
//! has none), multi-character operators arrive from the parser as
//! single-character tokens joined by spaces (`" = = "`, `" ! = "`, ...); the
//! first step here collapses those back into `==`, `!=`, `>=`, `<=` before
//! scanning for an operator, mirroring the original implementation's
//! normalization pass.

use std::collections::BTreeMap;

use crate::error::ExecError;

pub fn evaluate(task: &str, condition: &str, vars: &BTreeMap<String, String>) -> Result<bool, ExecError> {
    let condition = condition.trim();
    if condition.is_empty() {
        return Ok(true);
    }

    let normalized = condition
        .replace(" = = ", "==")
        .replace(" ! = ", "!=")
        .replace(" > = ", ">=")
        .replace(" < = ", "<=");

    const OPERATORS: [&str; 6] = ["==", "!=", ">=", "<=", ">", "<"];
    let mut found: Option<(&str, &str, &str)> = None;
    for op in OPERATORS {
        if let Some(idx) = normalized.find(op) {
            let left = normalized[..idx].trim();
            let right = normalized[idx + op.len()..].trim();
            found = Some((left, op, right));
            break;
        }
    }

    let (left, op, right) = found.ok_or_else(|| ExecError::Condition {
        task: task.to_string(),
        reason: format!("no valid operator found in condition: {condition}"),
    })?;

    let left_val = vars.get(left).cloned().unwrap_or_else(|| left.to_string());
    let right_val = right.trim_matches(|c| c == '"' || c == '\'').to_string();

    let numeric = |s: &str| -> Result<i64, ExecError> {
        s.parse::<i64>().map_err(|_| ExecError::Condition {
            task: task.to_string(),
            reason: format!("invalid numeric comparison in condition: {condition}"),
        })
    };

    Ok(match op {
        "==" => left_val == right_val,
        "!=" => left_val != right_val,
        ">" => numeric(&left_val)? > numeric(&right_val)?,
        "<" => numeric(&left_val)? < numeric(&right_val)?,
        ">=" => numeric(&left_val)? >= numeric(&right_val)?,
        "<=" => numeric(&left_val)? <= numeric(&right_val)?,
        _ => unreachable!(),
    })
}
