//! API request and response models.

use serde::{Deserialize, Serialize};

/// Plain acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DetailResponse {
    pub detail: String,
}

impl DetailResponse {
    pub fn new(detail: impl Into<String>) -> Self {
        Self {
            detail: detail.into(),
        }
    }

    /// Acknowledge started policies.
    pub fn started(names: &[String]) -> Self {
        match names {
            [single] => Self::new(format!("policy '{single}' was started")),
            _ => Self::new(format!("policies [{}] were started", names.join(", "))),
        }
    }

    pub fn deleted(name: &str) -> Self {
        Self::new(format!("policy '{name}' was deleted"))
    }
}

/// Agent status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub version: String,
    pub up_time_seconds: u64,
}

/// Backends available to policies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilitiesResponse {
    pub loaded_modules: Vec<String>,
}
