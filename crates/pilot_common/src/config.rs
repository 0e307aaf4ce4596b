//! System configuration for the pilot daemon.
//!
//! Static operator settings live in /etc/pilot/config.toml; everything the
//! pilot can change about itself at runtime (goals, criteria, autonomy) lives
//! in the persistent store instead. API keys are read from the environment so
//! they never land in a config file or a state document.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// System configuration directory
pub const SYSTEM_CONFIG_DIR: &str = "/etc/pilot";
const CONFIG_FILE: &str = "config.toml";

/// Pilot data directory (state documents, lead store, mailer store)
pub const DATA_DIR: &str = "/var/lib/pilot";

/// Runtime directory (control socket)
pub const RUN_DIR: &str = "/run/pilot";

/// Environment override for the data directory
pub const DATA_DIR_ENV: &str = "PILOT_DATA_DIR";

/// Daemon configuration loaded from config.toml
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    /// Where state documents are written (overridable via PILOT_DATA_DIR)
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Where the control socket is created
    #[serde(default = "default_run_dir")]
    pub run_dir: String,

    /// Reasoning service settings
    #[serde(default)]
    pub reasoning: ReasoningSettings,

    /// Operator notification webhook (None = log only)
    #[serde(default)]
    pub notify_webhook: Option<String>,

    /// Daily budget of reasoning/collaborator API calls before the
    /// diagnostic checker starts warning
    #[serde(default = "default_daily_api_budget")]
    pub daily_api_budget: u64,
}

/// Reasoning service endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasoningSettings {
    #[serde(default = "default_reasoning_endpoint")]
    pub endpoint: String,

    /// Model used for routine brain cycles and chat
    #[serde(default = "default_reasoning_model")]
    pub model: String,

    /// Higher-tier model used for the weekly analysis
    #[serde(default = "default_analysis_model")]
    pub analysis_model: String,

    #[serde(default = "default_reasoning_timeout")]
    pub timeout_secs: u64,
}

fn default_data_dir() -> String {
    DATA_DIR.to_string()
}

fn default_run_dir() -> String {
    RUN_DIR.to_string()
}

fn default_daily_api_budget() -> u64 {
    500
}

fn default_reasoning_endpoint() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_reasoning_model() -> String {
    "claude-sonnet-4-20250514".to_string()
}

fn default_analysis_model() -> String {
    "claude-opus-4-20250514".to_string()
}

fn default_reasoning_timeout() -> u64 {
    120
}

impl Default for ReasoningSettings {
    fn default() -> Self {
        Self {
            endpoint: default_reasoning_endpoint(),
            model: default_reasoning_model(),
            analysis_model: default_analysis_model(),
            timeout_secs: default_reasoning_timeout(),
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            run_dir: default_run_dir(),
            reasoning: ReasoningSettings::default(),
            notify_webhook: None,
            daily_api_budget: default_daily_api_budget(),
        }
    }
}

impl SystemConfig {
    pub fn config_path() -> PathBuf {
        PathBuf::from(SYSTEM_CONFIG_DIR).join(CONFIG_FILE)
    }

    /// Load from /etc/pilot/config.toml, falling back to defaults when the
    /// file is missing or unreadable. A malformed file is an operator error
    /// worth failing loudly on.
    pub fn load() -> anyhow::Result<Self> {
        let path = Self::config_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(&path)?;
        let config: SystemConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Effective data directory, honoring the PILOT_DATA_DIR override.
    pub fn effective_data_dir(&self) -> PathBuf {
        match std::env::var(DATA_DIR_ENV) {
            Ok(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => PathBuf::from(&self.data_dir),
        }
    }

    /// Control socket path.
    pub fn socket_path(&self) -> PathBuf {
        PathBuf::from(&self.run_dir).join("pilotd.sock")
    }
}

/// Names of the API keys the pilot reads from the environment.
pub mod api_keys {
    /// Reasoning service (required)
    pub const REASONING: &str = "ANTHROPIC_API_KEY";
    /// Lead search (Apollo)
    pub const LEAD_SEARCH: &str = "APOLLO_API_KEY";
    /// CRM (HubSpot)
    pub const CRM: &str = "HUBSPOT_API_KEY";
    /// Email sending (Resend)
    pub const EMAIL: &str = "RESEND_API_KEY";
    /// Sending domain, verified on the email provider's side
    pub const EMAIL_DOMAIN: &str = "RESEND_DOMAIN";
    /// Contact enrichment (FullEnrich)
    pub const ENRICHMENT: &str = "FULLENRICH_API_KEY";

    /// Returns the key value, treating an empty string as absent.
    pub fn get(name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SystemConfig::default();
        assert_eq!(config.data_dir, DATA_DIR);
        assert_eq!(config.daily_api_budget, 500);
        assert!(config.notify_webhook.is_none());
        assert!(config.reasoning.endpoint.contains("anthropic"));
    }

    #[test]
    fn test_partial_toml_gets_defaults() {
        let config: SystemConfig = toml::from_str("data_dir = \"/tmp/pilot\"").unwrap();
        assert_eq!(config.data_dir, "/tmp/pilot");
        assert_eq!(config.run_dir, RUN_DIR);
        assert_eq!(config.reasoning.timeout_secs, 120);
    }

    #[test]
    fn test_socket_path() {
        let config = SystemConfig::default();
        assert_eq!(config.socket_path(), PathBuf::from("/run/pilot/pilotd.sock"));
    }
}
