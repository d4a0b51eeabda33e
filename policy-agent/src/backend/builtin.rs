//! Backends shipped with the agent.

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{Backend, Entity, Metadata};
use crate::config::{PolicyConfig, Scope};
use crate::error::{Error, Result};

/// Emits the policy scope itself as records.
///
/// A list scope yields one record per element, any other non-null scope one
/// record. The optional `defaults` setting fills keys missing from object
/// records.
#[derive(Debug, Clone, Default)]
pub struct StaticBackend;

impl StaticBackend {
    pub const IDENTIFIER: &'static str = "static";

    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Backend for StaticBackend {
    fn setup(&self) -> Result<Metadata> {
        Ok(Metadata::new(
            Self::IDENTIFIER,
            "static-backend",
            env!("CARGO_PKG_VERSION"),
        ))
    }

    async fn run(&self, config: &PolicyConfig, scope: &Scope) -> Result<Vec<Entity>> {
        let defaults = match config.setting("defaults") {
            None | Some(Value::Null) => None,
            Some(Value::Object(defaults)) => Some(defaults),
            Some(_) => return Err(Error::backend("'defaults' must be a mapping")),
        };

        let records = match scope {
            Value::Null => Vec::new(),
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };

        Ok(records
            .into_iter()
            .map(|record| Entity(apply_defaults(record, defaults)))
            .collect())
    }
}

fn apply_defaults(record: Value, defaults: Option<&Map<String, Value>>) -> Value {
    match (record, defaults) {
        (Value::Object(mut fields), Some(defaults)) => {
            for (key, value) in defaults {
                fields.entry(key.clone()).or_insert_with(|| value.clone());
            }
            Value::Object(fields)
        }
        (record, _) => record,
    }
}
