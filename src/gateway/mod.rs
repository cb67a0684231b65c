use crate::models::ChannelType;
use crate::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod http;

pub use http::HttpGateway;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DialRequest {
    pub phone_number: String,
    pub channel: ChannelType,
    /// Personalization variables passed through to the provider agent.
    pub variables: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    /// Correlation data echoed back in webhooks (session id, owner id).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DialAck {
    pub provider_call_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderTranscriptEntry {
    pub role: String,
    pub content: String,
}

/// Authoritative call analytics as reported by the provider.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallAnalytics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub transcript: Vec<ProviderTranscriptEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_sentiment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_successful: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub e2e_latency_p50_ms: Option<u64>,
}

/// Outbound call provider boundary. Latency and availability are
/// provider-controlled; callers treat every error as local to the item
/// being processed.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CallGateway: Send + Sync {
    async fn initiate(&self, request: DialRequest) -> Result<DialAck>;

    /// `None` means the provider has no analytics for this call (yet).
    async fn get_analytics(&self, provider_call_id: &str) -> Result<Option<CallAnalytics>>;
}
