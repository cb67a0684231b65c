use crate::store::StoreConfig;
use anyhow::Result;
use clap::Parser;
use serde::{Deserialize, Serialize};

#[derive(Parser, Debug)]
#[command(version)]
pub struct Cli {
    #[clap(long, default_value = "dialcast.toml")]
    pub conf: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_http_addr")]
    pub http_addr: String,
    pub log_level: Option<String>,
    pub log_file: Option<String>,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub gateway: GatewayConfig,
    pub llm: Option<LlmConfig>,
    #[serde(default)]
    pub campaign: CampaignConfig,
    #[serde(default)]
    pub sync: SyncConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
            log_level: None,
            log_file: None,
            store: StoreConfig::default(),
            gateway: GatewayConfig::default(),
            llm: None,
            campaign: CampaignConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

/// Outbound call provider settings. `webhook_secret` enables HMAC-SHA256
/// verification of inbound webhook payloads; verification is skipped when
/// unset.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    #[serde(default = "default_gateway_url")]
    pub base_url: String,
    pub api_key: Option<String>,
    pub webhook_secret: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: default_gateway_url(),
            api_key: None,
            webhook_secret: None,
        }
    }
}

fn default_gateway_url() -> String {
    "http://127.0.0.1:9090".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default = "default_llm_model")]
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: default_llm_model(),
            api_key: None,
            base_url: None,
            temperature: None,
            max_tokens: None,
        }
    }
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CampaignConfig {
    /// Pacing delay between contacts, used when a campaign does not set one.
    #[serde(default = "default_call_delay")]
    pub default_call_delay_secs: u64,
    #[serde(default = "default_max_retries")]
    pub default_max_retries: u32,
    /// Country digit prefixed to bare 10-digit numbers.
    #[serde(default = "default_country_code")]
    pub country_code: String,
    /// Substituted for template placeholders with no matching contact field.
    #[serde(default)]
    pub missing_field_default: String,
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            default_call_delay_secs: default_call_delay(),
            default_max_retries: default_max_retries(),
            country_code: default_country_code(),
            missing_field_default: String::new(),
        }
    }
}

fn default_call_delay() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    2
}

fn default_country_code() -> String {
    "1".to_string()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SyncConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default = "default_inter_call_delay")]
    pub inter_call_delay_ms: u64,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_backoff_base")]
    pub backoff_base_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            inter_call_delay_ms: default_inter_call_delay(),
            retry_attempts: default_retry_attempts(),
            backoff_base_ms: default_backoff_base(),
        }
    }
}

fn default_batch_size() -> usize {
    10
}

fn default_inter_call_delay() -> u64 {
    1000
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_backoff_base() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_config() {
        let content = r#"
http_addr = "127.0.0.1:3000"
log_level = "debug"

[store]
type = "local"
root = "/tmp/dialcast"

[gateway]
base_url = "https://provider.example.com"
api_key = "key_123"
webhook_secret = "whsec_456"

[campaign]
default_call_delay_secs = 10
country_code = "44"

[sync]
batch_size = 5
retry_attempts = 2
"#;
        let config: Config = toml::from_str(content).expect("parse config");
        assert_eq!(config.http_addr, "127.0.0.1:3000");
        assert_eq!(config.gateway.webhook_secret.as_deref(), Some("whsec_456"));
        assert_eq!(config.campaign.default_call_delay_secs, 10);
        assert_eq!(config.campaign.country_code, "44");
        assert_eq!(config.sync.batch_size, 5);
        assert_eq!(config.sync.retry_attempts, 2);
        // untouched sections keep defaults
        assert_eq!(config.sync.inter_call_delay_ms, 1000);
        assert_eq!(config.campaign.default_max_retries, 2);
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.http_addr, "0.0.0.0:8080");
        assert_eq!(config.campaign.default_call_delay_secs, 30);
        assert!(config.gateway.webhook_secret.is_none());
    }
}
