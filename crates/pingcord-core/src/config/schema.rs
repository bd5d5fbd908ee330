//! Configuration schema.
//!
//! Hierarchy: `Config` → `DiscordConfig`, `DeliveryConfig`, `templates`.
//!
//! JSON on disk uses **camelCase** keys; Rust uses snake_case.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::recipient::Recipient;
use crate::template::{FormatError, MessageTemplate};

/// Discord's documented per-message content limit, in characters.
pub const DISCORD_MAX_MESSAGE_LEN: usize = 2000;

// ─────────────────────────────────────────────
// Root Config
// ─────────────────────────────────────────────

/// Root configuration — loaded from `~/.pingcord/config.json` + env vars.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Config {
    pub discord: DiscordConfig,
    pub delivery: DeliveryConfig,
    /// Message templates keyed by the producer-facing template id.
    pub templates: HashMap<String, TemplateConfig>,
}

// ─────────────────────────────────────────────
// Discord
// ─────────────────────────────────────────────

/// Connection settings for the Discord REST API.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DiscordConfig {
    /// Bot token from the Discord Developer Portal.
    pub token: String,
    /// API root without version (e.g. `"https://discord.com/api"`).
    pub api_base: String,
    /// API version segment appended to `api_base`.
    pub api_version: String,
    /// User-Agent header sent with every call.
    pub user_agent: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Longest message content the platform accepts.
    pub max_message_len: usize,
}

impl Default for DiscordConfig {
    fn default() -> Self {
        Self {
            token: String::new(),
            api_base: "https://discord.com/api".to_string(),
            api_version: "v10".to_string(),
            user_agent: concat!("DiscordBot (pingcord, ", env!("CARGO_PKG_VERSION"), ")")
                .to_string(),
            timeout_secs: 30,
            max_message_len: DISCORD_MAX_MESSAGE_LEN,
        }
    }
}

impl DiscordConfig {
    /// Config with just a token set, everything else default.
    pub fn with_token(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            ..Self::default()
        }
    }

    pub fn is_configured(&self) -> bool {
        !self.token.is_empty()
    }

    /// Versioned API root, e.g. `https://discord.com/api/v10`.
    pub fn api_url(&self) -> String {
        let base = self.api_base.trim_end_matches('/');
        if self.api_version.is_empty() {
            base.to_string()
        } else {
            format!("{}/{}", base, self.api_version)
        }
    }
}

// Keep the token out of logs.
impl fmt::Debug for DiscordConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiscordConfig")
            .field("token", &if self.token.is_empty() { "" } else { "***" })
            .field("api_base", &self.api_base)
            .field("api_version", &self.api_version)
            .field("user_agent", &self.user_agent)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_message_len", &self.max_message_len)
            .finish()
    }
}

// ─────────────────────────────────────────────
// Delivery
// ─────────────────────────────────────────────

/// Which sender strategy the embedding application should build.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryMode {
    /// Post every message as soon as it is added.
    #[default]
    Direct,
    /// Aggregate per recipient and post once at flush.
    Buffered,
}

impl FromStr for DeliveryMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Ok(DeliveryMode::Direct),
            "buffered" => Ok(DeliveryMode::Buffered),
            other => Err(format!("unknown delivery mode '{other}'")),
        }
    }
}

impl fmt::Display for DeliveryMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryMode::Direct => f.write_str("direct"),
            DeliveryMode::Buffered => f.write_str("buffered"),
        }
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DeliveryConfig {
    pub mode: DeliveryMode,
}

// ─────────────────────────────────────────────
// Templates
// ─────────────────────────────────────────────

/// A message template as written in the config file.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TemplateConfig {
    /// Format string, e.g. `"New item: {title} ({price:.2f})"`.
    pub template: String,
    pub recipients: Vec<Recipient>,
}

impl TemplateConfig {
    /// Validate the format string and build the runtime template.
    pub fn to_template(&self) -> Result<MessageTemplate, FormatError> {
        MessageTemplate::parse(self.template.clone(), self.recipients.clone())
    }
}
