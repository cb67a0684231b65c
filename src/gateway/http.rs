use super::{CallAnalytics, CallGateway, DialAck, DialRequest};
use crate::config::GatewayConfig;
use crate::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::json;
use std::time::Instant;
use tracing::{info, warn};

#[derive(Debug, Deserialize)]
struct CreateCallResponse {
    call_id: String,
}

/// JSON-over-HTTPS provider client. `POST {base}/v1/calls` to dispatch a
/// call, `GET {base}/v1/calls/{id}/analytics` for post-call data.
pub struct HttpGateway {
    client: Client,
    config: GatewayConfig,
}

impl HttpGateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.config.api_key {
            Some(key) => request.bearer_auth(key),
            None => request,
        }
    }
}

#[async_trait]
impl CallGateway for HttpGateway {
    async fn initiate(&self, request: DialRequest) -> Result<DialAck> {
        let url = format!("{}/v1/calls", self.config.base_url.trim_end_matches('/'));
        let payload = json!({
            "to_number": request.phone_number,
            "channel": request.channel,
            "dynamic_variables": request.variables,
            "voice_id": request.voice_id,
            "metadata": request.metadata,
        });
        let start_time = Instant::now();
        let response = self
            .authorize(self.client.post(&url))
            .json(&payload)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("dispatch call: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(url, %status, "call dispatch rejected: {}", body);
            return Err(Error::Provider(format!(
                "dispatch call: provider returned {}",
                status
            )));
        }

        let ack: CreateCallResponse = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("decode dispatch response: {}", e)))?;
        info!(
            to_number = request.phone_number,
            call_id = ack.call_id,
            elapsed = start_time.elapsed().as_millis() as u64,
            "call dispatched"
        );
        Ok(DialAck {
            provider_call_id: ack.call_id,
        })
    }

    async fn get_analytics(&self, provider_call_id: &str) -> Result<Option<CallAnalytics>> {
        let url = format!(
            "{}/v1/calls/{}/analytics",
            self.config.base_url.trim_end_matches('/'),
            provider_call_id
        );
        let response = self
            .authorize(self.client.get(&url))
            .send()
            .await
            .map_err(|e| Error::Provider(format!("fetch analytics: {}", e)))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let status = response.status();
        if !status.is_success() {
            return Err(Error::Provider(format!(
                "fetch analytics: provider returned {}",
                status
            )));
        }
        let analytics: CallAnalytics = response
            .json()
            .await
            .map_err(|e| Error::Provider(format!("decode analytics: {}", e)))?;
        Ok(Some(analytics))
    }
}
