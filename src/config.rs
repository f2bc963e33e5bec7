use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const TOKEN_ENV: &str = "NETPULSE_BOT_TOKEN";

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BotConfig {
    pub bot_name: String,
    #[serde(default)]
    pub bot_token: String,
    pub target_host: String,
    #[serde(default = "default_check_interval")]
    pub check_interval_secs: u64,
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,
    #[serde(default)]
    pub recipient_mode: RecipientMode,
    #[serde(default = "default_use_icmp")]
    pub use_icmp: bool,
    #[serde(default = "default_fallback_ports")]
    pub fallback_ports: Vec<u16>,
    #[serde(default)]
    pub api_port: Option<u16>,
}

/// Addressing of transition broadcasts.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RecipientMode {
    /// Last sender wins.
    Single,
    /// Everyone who ever sent a command.
    #[default]
    Multi,
}

fn default_check_interval() -> u64 { 5 }
fn default_probe_timeout() -> u64 { 5000 }
fn default_use_icmp() -> bool { true }
fn default_fallback_ports() -> Vec<u16> { vec![3389] }

impl BotConfig {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path))?;
        let config = Self::from_json(&content, std::env::var(TOKEN_ENV).ok())
            .with_context(|| format!("Invalid config in {}", path))?;
        Ok(config)
    }

    pub fn from_json(content: &str, token_override: Option<String>) -> Result<Self> {
        let mut config: BotConfig = serde_json::from_str(content)
            .context("Failed to parse config")?;
        if let Some(token) = token_override.filter(|t| !t.trim().is_empty()) {
            config.bot_token = token;
        }
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.bot_token.trim().is_empty() {
            bail!("bot_token is empty (set it in the config or via {})", TOKEN_ENV);
        }
        if self.target_host.trim().is_empty() {
            bail!("target_host is empty");
        }
        if self.check_interval_secs == 0 {
            bail!("check_interval_secs must be positive");
        }
        if self.probe_timeout_ms == 0 {
            bail!("probe_timeout_ms must be positive");
        }
        Ok(())
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}
