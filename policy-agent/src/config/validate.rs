//! Structural validation of policy documents.
//!
//! Runs on the raw YAML tree before deserialization so that every problem is
//! reported with its dotted path, e.g. `policies.p1.config.schedule`.

use cron_scheduler::CronSchedule;
use serde::Serialize;
use serde_yaml::{Mapping, Value};

use crate::policy::sanitize_name;

/// One validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub error: String,
}

impl FieldError {
    pub fn new(field: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            error: error.into(),
        }
    }
}

/// Validate a policy document. `policies` must be present when
/// `require_policies` is set.
pub fn validate_document(root: &Value, require_policies: bool) -> Vec<FieldError> {
    let mut errors = Vec::new();

    let Some(root) = root.as_mapping() else {
        errors.push(FieldError::new("document", "must be a mapping"));
        return errors;
    };

    match root.get("policies") {
        None | Some(Value::Null) if require_policies => {
            errors.push(FieldError::new("policies", "field required"));
        }
        None | Some(Value::Null) => {}
        Some(Value::Mapping(policies)) => {
            for (name, policy) in policies {
                let Some(name) = name.as_str() else {
                    errors.push(FieldError::new(
                        format!("policies.{}", describe_key(name)),
                        "policy name must be a string",
                    ));
                    continue;
                };
                if sanitize_name(name).is_empty() {
                    errors.push(FieldError::new("policies", "policy name must not be empty"));
                    continue;
                }
                validate_policy(&format!("policies.{name}"), policy, &mut errors);
            }
        }
        Some(_) => errors.push(FieldError::new(
            "policies",
            "must be a mapping of policy name to policy",
        )),
    }

    errors
}

fn validate_policy(path: &str, policy: &Value, errors: &mut Vec<FieldError>) {
    let Some(policy) = policy.as_mapping() else {
        errors.push(FieldError::new(path, "must be a mapping"));
        return;
    };

    match policy.get("config") {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(format!("{path}.config"), "field required"))
        }
        Some(Value::Mapping(config)) => validate_config(&format!("{path}.config"), config, errors),
        Some(_) => errors.push(FieldError::new(format!("{path}.config"), "must be a mapping")),
    }

    if policy.get("scope").is_none() {
        errors.push(FieldError::new(format!("{path}.scope"), "field required"));
    }
}

fn validate_config(path: &str, config: &Mapping, errors: &mut Vec<FieldError>) {
    match config.get("backend") {
        None | Some(Value::Null) => {
            errors.push(FieldError::new(format!("{path}.backend"), "field required"))
        }
        Some(Value::String(backend)) if backend.trim().is_empty() => {
            errors.push(FieldError::new(format!("{path}.backend"), "must not be empty"))
        }
        Some(Value::String(_)) => {}
        Some(_) => errors.push(FieldError::new(format!("{path}.backend"), "must be a string")),
    }

    match config.get("schedule") {
        None | Some(Value::Null) => {}
        Some(Value::String(schedule)) => {
            if let Err(err) = CronSchedule::parse(schedule) {
                errors.push(FieldError::new(format!("{path}.schedule"), err.to_string()));
            }
        }
        Some(_) => errors.push(FieldError::new(format!("{path}.schedule"), "must be a string")),
    }

    match config.get("timeout") {
        None | Some(Value::Null) => {}
        Some(Value::Number(n)) if n.as_u64().is_some_and(|secs| secs > 0) => {}
        Some(_) => errors.push(FieldError::new(
            format!("{path}.timeout"),
            "must be a positive integer number of seconds",
        )),
    }
}

fn describe_key(key: &Value) -> String {
    match key {
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        _ => "<key>".to_string(),
    }
}
