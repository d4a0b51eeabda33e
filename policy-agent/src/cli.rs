//! Command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use crate::api::ApiServerConfig;
use crate::api::server::DEFAULT_PORT;
use crate::config::{SinkConfig, resolve_env_placeholder};
use crate::error::{Error, Result};
use crate::logging::LogFormat;

/// Policy-driven collection agent.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address the control API binds to
    #[arg(long, env = "AGENT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port the control API listens on
    #[arg(long, env = "AGENT_PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Allow cross-origin requests to the control API
    #[arg(long, env = "AGENT_ENABLE_CORS")]
    pub enable_cors: bool,

    /// Ingestion sink endpoint URL
    #[arg(long, env = "SINK_TARGET")]
    pub sink_target: Option<String>,

    /// Ingestion sink API key; `${VAR}` reads it from the environment
    #[arg(long, env = "SINK_API_KEY", hide_env_values = true)]
    pub sink_api_key: Option<String>,

    /// Prefix for producer app names reported to the sink
    #[arg(long, env = "SINK_PREFIX")]
    pub sink_prefix: Option<String>,

    /// Startup configuration file with `sink` and `policies` sections
    #[arg(short, long, env = "AGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level for the agent's own modules
    #[arg(long, env = "LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Console log format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,

    /// Also write daily-rolling log files into this directory
    #[arg(long, env = "LOG_DIR")]
    pub log_dir: Option<PathBuf>,
}

impl Args {
    /// Merge the sink flags over the file's `sink` section. Flags win.
    pub fn sink_config(&self, file: Option<SinkConfig>) -> Result<SinkConfig> {
        let mut sink = file.unwrap_or_default();
        if let Some(target) = &self.sink_target {
            sink.target = target.clone();
        }
        if let Some(api_key) = &self.sink_api_key {
            sink.api_key = Some(resolve_env_placeholder(api_key));
        }
        if let Some(prefix) = &self.sink_prefix {
            sink.prefix = Some(prefix.clone());
        }

        if sink.target.trim().is_empty() {
            return Err(Error::config(
                "no sink target configured; pass --sink-target or set `sink.target` in the config file",
            ));
        }
        Ok(sink)
    }

    pub fn server_config(&self) -> ApiServerConfig {
        ApiServerConfig {
            bind_address: self.host.clone(),
            port: self.port,
            enable_cors: self.enable_cors,
            ..ApiServerConfig::default()
        }
    }
}
