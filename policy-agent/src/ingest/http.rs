//! HTTP/JSON ingestion client.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;
use url::Url;

use super::{ClientIdentity, IngestClient, IngestClientFactory, IngestResponse};
use crate::backend::Entity;
use crate::config::SinkConfig;
use crate::error::{Error, Result};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Longest sink response body quoted in an error entry.
const MAX_ERROR_BODY: usize = 512;

#[derive(Serialize)]
struct IngestRequest<'a> {
    producer_app_name: &'a str,
    producer_app_version: &'a str,
    entities: &'a [Entity],
}

/// POSTs records as JSON to the sink target.
#[derive(Debug, Clone)]
pub struct HttpIngestClient {
    http: reqwest::Client,
    target: Url,
    api_key: Option<String>,
    identity: ClientIdentity,
}

impl HttpIngestClient {
    pub fn new(http: reqwest::Client, sink: &SinkConfig, identity: ClientIdentity) -> Result<Self> {
        Ok(Self {
            http,
            target: parse_target(&sink.target)?,
            api_key: sink.api_key.clone().filter(|key| !key.is_empty()),
            identity,
        })
    }
}

#[async_trait]
impl IngestClient for HttpIngestClient {
    async fn ingest(&self, entities: Vec<Entity>) -> Result<IngestResponse> {
        let body = IngestRequest {
            producer_app_name: &self.identity.app_name,
            producer_app_version: &self.identity.app_version,
            entities: &entities,
        };

        let mut request = self.http.post(self.target.clone()).json(&body);
        if let Some(api_key) = &self.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let text = truncate(text.trim(), MAX_ERROR_BODY);
            let error = if text.is_empty() {
                format!("sink returned {status}")
            } else {
                format!("sink returned {status}: {text}")
            };
            return Ok(IngestResponse {
                errors: vec![error],
            });
        }

        let bytes = response.bytes().await?;
        debug!(
            target = %self.target,
            entities = entities.len(),
            "entities sent to sink"
        );
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(IngestResponse::default());
        }
        Ok(serde_json::from_slice(&bytes)?)
    }
}

/// Builds [`HttpIngestClient`]s sharing one connection pool.
#[derive(Debug, Clone)]
pub struct HttpIngestClientFactory {
    http: reqwest::Client,
}

impl HttpIngestClientFactory {
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("policy-agent/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http })
    }
}

impl IngestClientFactory for HttpIngestClientFactory {
    fn create(&self, sink: &SinkConfig, identity: ClientIdentity) -> Result<Arc<dyn IngestClient>> {
        let client = HttpIngestClient::new(self.http.clone(), sink, identity)?;
        Ok(Arc::new(client))
    }
}

fn parse_target(target: &str) -> Result<Url> {
    let url = Url::parse(target)
        .map_err(|e| Error::config(format!("invalid sink target '{target}': {e}")))?;
    match url.scheme() {
        "http" | "https" => Ok(url),
        scheme => Err(Error::config(format!(
            "invalid sink target '{target}': unsupported scheme '{scheme}'"
        ))),
    }
}

fn truncate(text: &str, max: usize) -> &str {
    if text.len() <= max {
        return text;
    }
    let mut end = max;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
