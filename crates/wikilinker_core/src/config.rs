use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_USER_AGENT: &str = "wikilinker/0.1";
pub const DEFAULT_CONFIG_FILENAME: &str = "wikilinker.toml";

const DEFAULT_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RETRIES: usize = 2;
const DEFAULT_RETRY_DELAY_MS: u64 = 500;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct LinkerConfig {
    pub user_agent: Option<String>,
    #[serde(default)]
    pub default_wikis: Vec<String>,
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub wikis: Vec<WikiEntry>,
    #[serde(default)]
    pub channels: BTreeMap<String, ChannelSection>,
}

/// One configured MediaWiki installation and the prefixes that select it.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct WikiEntry {
    pub prefixes: Vec<String>,
    pub endpoint: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub timeout_ms: Option<u64>,
    pub retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct ChannelSection {
    #[serde(default)]
    pub default_wikis: Vec<String>,
}

impl LinkerConfig {
    /// Resolve user agent: env WIKI_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        if let Some(value) = env_override("WIKI_USER_AGENT") {
            return value;
        }
        self.user_agent
            .clone()
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        env_override("WIKI_HTTP_TIMEOUT_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.http.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn retries(&self) -> usize {
        env_override("WIKI_HTTP_RETRIES")
            .and_then(|value| value.parse::<usize>().ok())
            .or(self.http.retries)
            .unwrap_or(DEFAULT_RETRIES)
    }

    pub fn retry_delay_ms(&self) -> u64 {
        env_override("WIKI_HTTP_RETRY_DELAY_MS")
            .and_then(|value| value.parse::<u64>().ok())
            .or(self.http.retry_delay_ms)
            .unwrap_or(DEFAULT_RETRY_DELAY_MS)
    }

    /// Default-wiki prefixes for one invocation. A channel with its own list
    /// replaces the global one; otherwise the global list applies.
    pub fn default_wikis_for(&self, channel: Option<&str>) -> Vec<String> {
        if let Some(section) = channel.and_then(|channel| self.channels.get(channel)) {
            return section.default_wikis.clone();
        }
        self.default_wikis.clone()
    }
}

/// Load and parse a LinkerConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<LinkerConfig> {
    if !config_path.exists() {
        return Ok(LinkerConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: LinkerConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_override(key: &str) -> Option<String> {
    let value = env::var(key).ok()?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
