//! Policy documents and agent configuration.
//!
//! Documents are YAML. Parsing runs in three passes: `${NAME}` placeholders
//! are resolved from the environment, the tree is validated field by field,
//! and only then deserialized into the typed models.

mod env;
mod models;
mod validate;

use std::path::Path;

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

pub use env::{resolve_env_placeholder, resolve_env_vars};
pub use models::{AgentConfig, Policy, PolicyConfig, PolicyRequest, Scope, SinkConfig};
pub use validate::{FieldError, validate_document};

/// Parse a policy submission body.
pub fn parse_policy_request(body: &[u8]) -> Result<PolicyRequest> {
    parse_document(body, true)
}

/// Parse a startup configuration document.
pub fn parse_agent_config(body: &[u8]) -> Result<AgentConfig> {
    parse_document(body, false)
}

/// Read and parse a startup configuration file.
pub fn load_agent_config(path: impl AsRef<Path>) -> Result<AgentConfig> {
    let path = path.as_ref();
    let body = std::fs::read(path)?;
    parse_agent_config(&body).map_err(|e| match e {
        Error::Configuration { message, errors } => Error::Configuration {
            message: format!("{}: {message}", path.display()),
            errors,
        },
        other => other,
    })
}

fn parse_document<T: DeserializeOwned>(body: &[u8], require_policies: bool) -> Result<T> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(Error::config("empty document"));
    }

    let value: serde_yaml::Value = serde_yaml::from_slice(body)?;
    let value = resolve_env_vars(value);

    let errors = validate_document(&value, require_policies);
    if !errors.is_empty() {
        return Err(Error::invalid_fields(errors));
    }

    serde_yaml::from_value(value).map_err(|e| Error::config(e.to_string()))
}
