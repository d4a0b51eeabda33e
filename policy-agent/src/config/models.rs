//! Policy and sink configuration models.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backend-specific target description, opaque to the agent.
pub type Scope = Value;

/// Per-policy execution settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Cron expression. Without one the policy runs once.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<String>,
    /// Identifier of the backend that collects data for this policy.
    pub backend: String,
    /// Execution deadline in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
    /// Backend-specific settings.
    #[serde(flatten)]
    pub settings: Map<String, Value>,
}

impl PolicyConfig {
    pub fn new(backend: impl Into<String>) -> Self {
        Self {
            schedule: None,
            backend: backend.into(),
            timeout: None,
            settings: Map::new(),
        }
    }

    pub fn with_schedule(mut self, schedule: impl Into<String>) -> Self {
        self.schedule = Some(schedule.into());
        self
    }

    pub fn with_timeout(mut self, seconds: u64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    pub fn with_setting(mut self, key: impl Into<String>, value: Value) -> Self {
        self.settings.insert(key.into(), value);
        self
    }

    /// Look up a backend-specific setting.
    pub fn setting(&self, key: &str) -> Option<&Value> {
        self.settings.get(key)
    }
}

/// A named data-collection task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Policy {
    pub config: PolicyConfig,
    pub scope: Scope,
}

impl Policy {
    pub fn new(config: PolicyConfig, scope: Scope) -> Self {
        Self { config, scope }
    }
}

/// Body of a policy submission.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyRequest {
    pub policies: BTreeMap<String, Policy>,
}

impl PolicyRequest {
    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

/// Connection settings of the ingestion sink.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Sink endpoint URL.
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Prepended to every producer app name as `prefix/app_name`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<String>,
}

impl SinkConfig {
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            api_key: None,
            prefix: None,
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = Some(prefix.into());
        self
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("target", &self.target)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("prefix", &self.prefix)
            .finish()
    }
}

/// Startup configuration file.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct AgentConfig {
    #[serde(default)]
    pub sink: Option<SinkConfig>,
    #[serde(default)]
    pub policies: BTreeMap<String, Policy>,
}

impl AgentConfig {
    /// The policies of the file as a submission.
    pub fn policy_request(&self) -> PolicyRequest {
        PolicyRequest {
            policies: self.policies.clone(),
        }
    }
}
