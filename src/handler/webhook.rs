use crate::app::AppState;
use crate::event::SessionEvent;
use crate::gateway::ProviderTranscriptEntry;
use crate::models::{SessionStatus, TranscriptEntry};
use crate::Result;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::Sha256;
use tracing::{info, warn};

pub const SIGNATURE_HEADER: &str = "x-provider-signature";

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook", post(receive))
}

/// Provider lifecycle notifications. Event names and payloads follow the
/// provider's webhook contract; anything unrecognized is acknowledged and
/// dropped so the provider does not retry it forever.
#[derive(Debug, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WebhookEvent {
    CallStarted {
        call_id: String,
    },
    CallTranscript {
        call_id: String,
        #[serde(default)]
        transcript: Vec<ProviderTranscriptEntry>,
    },
    CallEnded {
        call_id: String,
        #[serde(default)]
        transcript: Vec<ProviderTranscriptEntry>,
    },
    CallFailed {
        call_id: String,
    },
}

fn to_entry(entry: &ProviderTranscriptEntry) -> TranscriptEntry {
    if entry.role == "agent" {
        TranscriptEntry::agent(&entry.content)
    } else {
        TranscriptEntry::user(&entry.content)
    }
}

/// HMAC-SHA256 over the raw body, hex encoded in `x-provider-signature`.
fn verify_signature(secret: &str, body: &[u8], headers: &HeaderMap) -> bool {
    let Some(signature) = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let Ok(mut mac) = Hmac::<Sha256>::new_from_slice(secret.as_bytes()) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&expected).is_ok()
}

async fn receive(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    if let Some(secret) = &state.config.gateway.webhook_secret {
        if !verify_signature(secret, &body, &headers) {
            warn!("webhook rejected: signature verification failed");
            return (
                StatusCode::UNAUTHORIZED,
                Json(json!({ "error": "invalid webhook signature" })),
            )
                .into_response();
        }
    } else {
        warn!("webhook signature verification skipped: no secret configured");
    }

    let event = match serde_json::from_slice::<WebhookEvent>(&body) {
        Ok(event) => event,
        Err(e) => {
            // Unknown event types are acknowledged, not retried.
            info!("ignoring unrecognized webhook payload: {}", e);
            return Json(json!({ "success": true })).into_response();
        }
    };

    match dispatch(&state, event).await {
        Ok(()) => Json(json!({ "success": true })).into_response(),
        Err(e) => e.into_response(),
    }
}

async fn dispatch(state: &AppState, event: WebhookEvent) -> Result<()> {
    match event {
        WebhookEvent::CallStarted { call_id } => {
            match state
                .sessions
                .apply_transition(&call_id, SessionStatus::InProgress)
                .await?
            {
                Some(session) => {
                    info!(session_id = session.id, call_id, "call started");
                    let _ = state.event_sender.send(SessionEvent::CallStarted {
                        session_id: session.id,
                        provider_call_id: call_id,
                    });
                }
                None => warn!(call_id, "call_started for unknown call"),
            }
        }
        WebhookEvent::CallTranscript {
            call_id,
            transcript,
        } => {
            // Each notification carries the full transcript so far; only
            // the newest turn is appended.
            let Some(latest) = transcript.last().map(to_entry) else {
                return Ok(());
            };
            match state
                .sessions
                .append_remote_turn(&call_id, latest.clone())
                .await?
            {
                Some(session) => {
                    let _ = state.event_sender.send(SessionEvent::CallTranscript {
                        session_id: session.id,
                        entry: latest,
                    });
                }
                None => warn!(call_id, "call_transcript for unknown call"),
            }
        }
        WebhookEvent::CallEnded {
            call_id,
            transcript,
        } => {
            let final_transcript: Vec<TranscriptEntry> =
                transcript.iter().map(to_entry).collect();
            match state
                .sessions
                .complete_call(&call_id, final_transcript)
                .await?
            {
                Some((session, summary)) => {
                    let _ = state.event_sender.send(SessionEvent::CallEnded {
                        session_id: session.id,
                        summary,
                    });
                }
                None => warn!(call_id, "call_ended for unknown call"),
            }
        }
        WebhookEvent::CallFailed { call_id } => {
            match state
                .sessions
                .apply_transition(&call_id, SessionStatus::Failed)
                .await?
            {
                Some(session) => {
                    warn!(session_id = session.id, call_id, "call failed");
                    let _ = state.event_sender.send(SessionEvent::CallFailed {
                        session_id: session.id,
                    });
                }
                None => warn!(call_id, "call_failed for unknown call"),
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::{AppState, AppStateBuilder};
    use crate::config::Config;
    use crate::gateway::{DialAck, MockCallGateway};
    use crate::llm::MockLlmClient;
    use crate::models::ChannelType;
    use crate::store::MemoryStore;
    use std::collections::HashMap;
    use std::sync::Arc;

    fn state_with(
        gateway: MockCallGateway,
        llm: MockLlmClient,
        webhook_secret: Option<&str>,
    ) -> AppState {
        let mut config = Config::default();
        config.gateway.webhook_secret = webhook_secret.map(String::from);
        AppStateBuilder::new()
            .with_config(config)
            .with_store(Arc::new(MemoryStore::new()))
            .with_gateway(Arc::new(gateway))
            .with_llm(Arc::new(llm))
            .build()
            .unwrap()
    }

    async fn seed_call(state: &AppState) -> String {
        let result = state
            .sessions
            .initiate_call(
                "user_1",
                "+15551234567",
                ChannelType::Voicemail,
                HashMap::new(),
                None,
            )
            .await
            .unwrap();
        result.call_id.unwrap()
    }

    fn sign(secret: &str, body: &[u8]) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(body);
        hex::encode(mac.finalize().into_bytes())
    }

    async fn post(state: &AppState, body: &[u8], signature: Option<&str>) -> Response {
        let mut headers = HeaderMap::new();
        if let Some(signature) = signature {
            headers.insert(SIGNATURE_HEADER, signature.parse().unwrap());
        }
        receive(
            axum::extract::State(state.clone()),
            headers,
            Bytes::copy_from_slice(body),
        )
        .await
    }

    #[tokio::test]
    async fn test_signature_required_when_secret_configured() {
        let state = state_with(MockCallGateway::new(), MockLlmClient::new(), Some("whsec"));
        let body = br#"{"event":"call_started","call_id":"call_x"}"#;

        let response = post(&state, body, None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = post(&state, body, Some("deadbeef")).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let signature = sign("whsec", body);
        let response = post(&state, body, Some(&signature)).await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_unrecognized_event_is_acknowledged() {
        let state = state_with(MockCallGateway::new(), MockLlmClient::new(), None);
        let response = post(
            &state,
            br#"{"event":"call_digit_pressed","call_id":"call_x","digit":"4"}"#,
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_call_started_moves_session_in_progress() {
        let mut gateway = MockCallGateway::new();
        gateway.expect_initiate().returning(|_| {
            Ok(DialAck {
                provider_call_id: "call_hook".into(),
            })
        });
        let state = state_with(gateway, MockLlmClient::new(), None);
        let session_id = seed_call(&state).await;

        let response = post(
            &state,
            br#"{"event":"call_started","call_id":"call_hook"}"#,
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let session = state.sessions.get(&session_id).await.unwrap().unwrap();
        assert_eq!(session.status, SessionStatus::InProgress);
    }

    #[tokio::test]
    async fn test_call_ended_is_idempotent_on_redelivery() {
        let mut gateway = MockCallGateway::new();
        gateway.expect_initiate().returning(|_| {
            Ok(DialAck {
                provider_call_id: "call_hook".into(),
            })
        });
        let mut llm = MockLlmClient::new();
        llm.expect_generate()
            .returning(|_| Ok("Recipient asked for a follow-up email.".to_string()));
        let state = state_with(gateway, llm, None);
        let session_id = seed_call(&state).await;

        let body = br#"{
            "event": "call_ended",
            "call_id": "call_hook",
            "transcript": [
                {"role": "agent", "content": "Hi Jane, this is Alex."},
                {"role": "user", "content": "Please email me the details."}
            ]
        }"#;
        let first = post(&state, body, None).await;
        assert_eq!(first.status(), StatusCode::OK);
        let ended = state.sessions.get(&session_id).await.unwrap().unwrap();
        assert_eq!(ended.status, SessionStatus::Completed);
        assert_eq!(ended.transcript.len(), 2);
        let end_time = ended.end_time;

        // Providers redeliver terminal webhooks; the session must not move.
        let second = post(&state, body, None).await;
        assert_eq!(second.status(), StatusCode::OK);
        let again = state.sessions.get(&session_id).await.unwrap().unwrap();
        assert_eq!(again.end_time, end_time);
        assert_eq!(again.transcript.len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_call_id_is_acknowledged() {
        let state = state_with(MockCallGateway::new(), MockLlmClient::new(), None);
        let response = post(
            &state,
            br#"{"event":"call_failed","call_id":"call_never_seen"}"#,
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_transcript_appends_latest_turn() {
        let mut gateway = MockCallGateway::new();
        gateway.expect_initiate().returning(|_| {
            Ok(DialAck {
                provider_call_id: "call_hook".into(),
            })
        });
        let state = state_with(gateway, MockLlmClient::new(), None);
        let session_id = seed_call(&state).await;

        let response = post(
            &state,
            br#"{
                "event": "call_transcript",
                "call_id": "call_hook",
                "transcript": [
                    {"role": "agent", "content": "Hi Jane."},
                    {"role": "user", "content": "Hello?"}
                ]
            }"#,
            None,
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);

        let session = state.sessions.get(&session_id).await.unwrap().unwrap();
        assert_eq!(session.transcript.len(), 1);
        assert_eq!(session.transcript[0].content, "Hello?");
    }
}
