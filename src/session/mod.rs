use crate::event::{EventSender, SessionEvent};
use crate::gateway::{CallGateway, DialRequest};
use crate::llm::{reply_prompt, summary_prompt, LlmClient, REPLY_FALLBACK, SUMMARY_FALLBACK};
use crate::models::{CallSession, ChannelType, SessionStatus, TranscriptEntry};
use crate::store::Store;
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};


#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Entries older than this are dropped from the active index. No call
/// runs for hours; an entry this old never got its terminal webhook and
/// is served from the store fallback instead.
const ACTIVE_TTL_HOURS: i64 = 2;

fn prune_stale(active: &mut HashMap<String, CallSession>) {
    let cutoff = Utc::now() - chrono::Duration::hours(ACTIVE_TTL_HOURS);
    active.retain(|_, session| session.start_time >= cutoff);
}

/// Owns call session lifecycle: creates sessions, dispatches the provider
/// call, applies webhook-driven transitions and serves reads. Keeps an
/// index of non-terminal sessions so webhook lookups avoid a store query
/// in the common path.
pub struct SessionManager {
    store: Arc<dyn Store>,
    gateway: Arc<dyn CallGateway>,
    llm: Arc<dyn LlmClient>,
    active: Mutex<HashMap<String, CallSession>>,
    event_sender: EventSender,
}

impl SessionManager {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn CallGateway>,
        llm: Arc<dyn LlmClient>,
        event_sender: EventSender,
    ) -> Self {
        Self {
            store,
            gateway,
            llm,
            active: Mutex::new(HashMap::new()),
            event_sender,
        }
    }

    /// Create a session and fire the provider call. Gateway failure marks
    /// the session failed and is reported in the result, never raised.
    pub async fn initiate_call(
        &self,
        owner_id: &str,
        phone_number: &str,
        channel: ChannelType,
        variables: HashMap<String, String>,
        voice_id: Option<String>,
    ) -> Result<CallResult> {
        let mut session =
            CallSession::new(owner_id, phone_number, channel, variables, voice_id);
        info!(
            session_id = session.id,
            phone_number, "initiating call"
        );
        self.store.put_session(&session).await?;

        let request = DialRequest {
            phone_number: phone_number.to_string(),
            channel,
            variables: session.variables.clone(),
            voice_id: session.voice_id.clone(),
            metadata: HashMap::from([
                ("session_id".to_string(), session.id.clone()),
                ("owner_id".to_string(), owner_id.to_string()),
            ]),
        };
        match self.gateway.initiate(request).await {
            Ok(ack) => {
                session.provider_call_id = Some(ack.provider_call_id.clone());
                session.advance(SessionStatus::Connecting);
                self.store.put_session(&session).await?;
                let session_id = session.id.clone();
                let mut active = self.active.lock().await;
                prune_stale(&mut active);
                active.insert(session_id.clone(), session);
                drop(active);
                info!(
                    session_id,
                    provider_call_id = ack.provider_call_id,
                    "call dispatched to provider"
                );
                Ok(CallResult {
                    success: true,
                    call_id: Some(session_id),
                    error: None,
                })
            }
            Err(e) => {
                session.advance(SessionStatus::Failed);
                self.store.put_session(&session).await?;
                warn!(session_id = session.id, "call dispatch failed: {}", e);
                Ok(CallResult {
                    success: false,
                    call_id: Some(session.id),
                    error: Some(e.to_string()),
                })
            }
        }
    }

    pub async fn get(&self, session_id: &str) -> Result<Option<CallSession>> {
        if let Some(session) = self.active.lock().await.get(session_id) {
            return Ok(Some(session.clone()));
        }
        Ok(self.store.get_session(session_id).await?)
    }

    pub async fn list(&self, owner_id: &str, limit: usize) -> Result<Vec<CallSession>> {
        Ok(self.store.list_sessions(owner_id, limit).await?)
    }

    /// Active-index lookup with store fallback; webhooks may race session
    /// creation, in which case this returns `None`.
    pub async fn find_by_provider_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallSession>> {
        if let Some(session) = self
            .active
            .lock()
            .await
            .values()
            .find(|s| s.provider_call_id.as_deref() == Some(provider_call_id))
        {
            return Ok(Some(session.clone()));
        }
        Ok(self.store.session_by_provider_id(provider_call_id).await?)
    }

    /// Apply a provider-driven transition. Returns the session after the
    /// attempt, or `None` when the call id is unknown. Duplicate terminal
    /// events are absorbed by the monotonic state machine.
    pub async fn apply_transition(
        &self,
        provider_call_id: &str,
        to: SessionStatus,
    ) -> Result<Option<CallSession>> {
        let Some(mut session) = self.find_by_provider_id(provider_call_id).await? else {
            return Ok(None);
        };
        let changed = session.advance(to);
        if changed {
            self.store.put_session(&session).await?;
        }
        let mut active = self.active.lock().await;
        if session.status.is_terminal() {
            active.remove(&session.id);
        } else if active.contains_key(&session.id) {
            active.insert(session.id.clone(), session.clone());
        }
        Ok(Some(session))
    }

    /// Append a transcript turn delivered by the provider.
    pub async fn append_remote_turn(
        &self,
        provider_call_id: &str,
        entry: TranscriptEntry,
    ) -> Result<Option<CallSession>> {
        let Some(mut session) = self.find_by_provider_id(provider_call_id).await? else {
            return Ok(None);
        };
        session.append_transcript(entry);
        self.store.put_session(&session).await?;
        let mut active = self.active.lock().await;
        if active.contains_key(&session.id) {
            active.insert(session.id.clone(), session.clone());
        }
        Ok(Some(session))
    }

    /// Terminal transition for a provider `call_ended` notification. Takes
    /// the provider's final transcript when it is more complete than ours,
    /// then produces a short summary of the call. Summary generation is
    /// best-effort; model failure degrades to a fixed line. Authoritative
    /// analytics still arrive later through reconciliation.
    pub async fn complete_call(
        &self,
        provider_call_id: &str,
        final_transcript: Vec<TranscriptEntry>,
    ) -> Result<Option<(CallSession, Option<String>)>> {
        let Some(mut session) = self.find_by_provider_id(provider_call_id).await? else {
            return Ok(None);
        };
        if session.transcript.len() < final_transcript.len() {
            session.transcript = final_transcript;
        }
        session.advance(SessionStatus::Completed);
        self.store.put_session(&session).await?;
        self.active.lock().await.remove(&session.id);

        let summary = if session.transcript.is_empty() {
            None
        } else {
            let prompt = summary_prompt(&session.transcript);
            match self.llm.generate(&prompt).await {
                Ok(text) => Some(text),
                Err(e) => {
                    warn!(session_id = session.id, "summary generation failed: {}", e);
                    Some(SUMMARY_FALLBACK.to_string())
                }
            }
        };
        info!(session_id = session.id, provider_call_id, "call completed");
        Ok(Some((session, summary)))
    }

    /// Generate the agent's next line for a live call and record both
    /// turns. Model failure degrades to a fixed apology line.
    pub async fn generate_reply(&self, session_id: &str, user_message: &str) -> Result<String> {
        let Some(mut session) = self.get(session_id).await? else {
            return Err(Error::NotFound(format!("call session {}", session_id)));
        };
        if session.channel != ChannelType::Live {
            return Err(Error::InvalidState(
                "conversational replies are only available on live calls".to_string(),
            ));
        }
        let instructions = session.variables.get("custom_instructions").cloned();
        let prompt = reply_prompt(instructions.as_deref(), &session.transcript, user_message);
        let reply = match self.llm.generate(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(session_id, "reply generation failed: {}", e);
                REPLY_FALLBACK.to_string()
            }
        };

        session.append_transcript(TranscriptEntry::user(user_message));
        let agent_entry = TranscriptEntry::agent(reply.clone());
        session.append_transcript(agent_entry.clone());
        self.store.put_session(&session).await?;
        let mut active = self.active.lock().await;
        if active.contains_key(&session.id) {
            active.insert(session.id.clone(), session.clone());
        }
        drop(active);

        let _ = self.event_sender.send(SessionEvent::CallTranscript {
            session_id: session.id.clone(),
            entry: agent_entry,
        });
        Ok(reply)
    }
}
