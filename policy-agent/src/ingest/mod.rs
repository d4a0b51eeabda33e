//! Ingestion sink clients.

mod http;

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::backend::{Entity, Metadata};
use crate::config::SinkConfig;
use crate::error::Result;

pub use http::{HttpIngestClient, HttpIngestClientFactory};

/// Producer identity a client reports to the sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientIdentity {
    pub app_name: String,
    pub app_version: String,
}

impl ClientIdentity {
    /// Derive the identity of a backend, prefixed with the sink's `prefix`.
    pub fn new(sink: &SinkConfig, metadata: &Metadata) -> Self {
        let app_name = match sink.prefix.as_deref() {
            Some(prefix) if !prefix.is_empty() => format!("{prefix}/{}", metadata.app_name),
            _ => metadata.app_name.clone(),
        };
        Self {
            app_name,
            app_version: metadata.app_version.clone(),
        }
    }
}

/// Outcome of one ingestion call. `errors` lists per-record problems.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IngestResponse {
    #[serde(default)]
    pub errors: Vec<String>,
}

impl IngestResponse {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Sends records to the ingestion sink.
///
/// `Err` is reserved for transport failures.
#[async_trait]
pub trait IngestClient: Send + Sync {
    async fn ingest(&self, entities: Vec<Entity>) -> Result<IngestResponse>;
}

/// Creates one client per policy runner.
pub trait IngestClientFactory: Send + Sync {
    fn create(&self, sink: &SinkConfig, identity: ClientIdentity) -> Result<Arc<dyn IngestClient>>;
}
