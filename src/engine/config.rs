//! TOML configuration for the enforcement engine

use serde::{Deserialize, Serialize};

/// Engine configuration, loaded from `tabwarden.toml`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Remote rules polling interval in seconds
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Settling delay before evaluating a freshly created tab, milliseconds
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Remote rules endpoint; overrides the persisted policy field when set
    #[serde(default)]
    pub remote_rules_endpoint: Option<String>,

    /// Redirect target applied when the policy has none of its own
    #[serde(default)]
    pub default_redirect_target: Option<String>,

    /// Capacity of the engine event channel
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    /// Log filter directive, e.g. `tabwarden=debug`
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
}

impl EngineConfig {
    /// Load configuration from a TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(toml_str)
    }

    /// Save configuration to a TOML string
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.poll_interval_secs == 0 {
            return Err("poll_interval_secs must be at least 1".to_string());
        }
        if self.event_buffer == 0 {
            return Err("event_buffer must be at least 1".to_string());
        }
        if let Some(ref endpoint) = self.remote_rules_endpoint {
            url::Url::parse(endpoint)
                .map_err(|e| format!("remote_rules_endpoint is not a URL: {}", e))?;
        }
        if let Some(ref target) = self.default_redirect_target {
            url::Url::parse(target)
                .map_err(|e| format!("default_redirect_target is not a URL: {}", e))?;
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            settle_delay_ms: default_settle_delay_ms(),
            remote_rules_endpoint: None,
            default_redirect_target: None,
            event_buffer: default_event_buffer(),
            log_filter: default_log_filter(),
        }
    }
}

// Default value functions for serde

fn default_poll_interval_secs() -> u64 {
    60
}

fn default_settle_delay_ms() -> u64 {
    500
}

fn default_event_buffer() -> usize {
    64
}

fn default_log_filter() -> String {
    "info".to_string()
}
