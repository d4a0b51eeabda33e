//! Collection backends.
//!
//! A backend turns a policy's scope into records for the ingestion sink.
//! Backends are looked up by identifier in a [`BackendRegistry`] populated at
//! process start.

mod builtin;
mod registry;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{PolicyConfig, Scope};
use crate::error::Result;

pub use builtin::StaticBackend;
pub use registry::{BackendConstructor, BackendRegistry};

/// Identity a backend reports at setup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    pub name: String,
    pub app_name: String,
    pub app_version: String,
}

impl Metadata {
    pub fn new(
        name: impl Into<String>,
        app_name: impl Into<String>,
        app_version: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            app_name: app_name.into(),
            app_version: app_version.into(),
        }
    }
}

/// One ingestion record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Entity(pub Value);

impl From<Value> for Entity {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Data-collection logic for one kind of target.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Called once when a policy is registered.
    fn setup(&self) -> Result<Metadata>;

    /// Collect records for `scope`.
    ///
    /// Returning [`Error::Unrecoverable`](crate::Error::Unrecoverable) stops
    /// the policy. Any other error only fails this execution.
    async fn run(&self, config: &PolicyConfig, scope: &Scope) -> Result<Vec<Entity>>;
}
