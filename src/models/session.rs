use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelType {
    Live,
    Voicemail,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Initiated,
    Connecting,
    InProgress,
    Completed,
    Failed,
}

impl SessionStatus {
    fn rank(&self) -> u8 {
        match self {
            SessionStatus::Initiated => 0,
            SessionStatus::Connecting => 1,
            SessionStatus::InProgress => 2,
            SessionStatus::Completed | SessionStatus::Failed => 3,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Speaker {
    Agent,
    User,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub speaker: Speaker,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl TranscriptEntry {
    pub fn agent(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::Agent,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            speaker: Speaker::User,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Authoritative provider-side data merged in by the reconciliation job.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CallEnrichment {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sentiment: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub successful: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recording_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
}

/// The record of one provider-mediated voice interaction. Status moves
/// forward only; the transcript is append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallSession {
    pub id: String,
    pub owner_id: String,
    pub phone_number: String,
    pub channel: ChannelType,
    pub status: SessionStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(default)]
    pub transcript: Vec<TranscriptEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider_call_id: Option<String>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<CallEnrichment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_synced_at: Option<DateTime<Utc>>,
}

impl CallSession {
    pub fn new(
        owner_id: impl Into<String>,
        phone_number: impl Into<String>,
        channel: ChannelType,
        variables: HashMap<String, String>,
        voice_id: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            phone_number: phone_number.into(),
            channel,
            status: SessionStatus::Initiated,
            start_time: Utc::now(),
            end_time: None,
            duration_ms: None,
            transcript: Vec::new(),
            provider_call_id: None,
            variables,
            voice_id,
            enrichment: None,
            last_synced_at: None,
        }
    }

    /// Monotonic transition. Duplicate or backward transitions are no-ops,
    /// so replayed terminal webhooks leave the session unchanged. Returns
    /// whether the status actually changed.
    pub fn advance(&mut self, to: SessionStatus) -> bool {
        if self.status.is_terminal() || to.rank() <= self.status.rank() {
            return false;
        }
        self.status = to;
        if to.is_terminal() {
            let end = Utc::now();
            self.end_time = Some(end);
            if self.duration_ms.is_none() {
                let elapsed = end.signed_duration_since(self.start_time);
                self.duration_ms = Some(elapsed.num_milliseconds().max(0) as u64);
            }
        }
        true
    }

    pub fn append_transcript(&mut self, entry: TranscriptEntry) {
        self.transcript.push(entry);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> CallSession {
        CallSession::new(
            "user_1",
            "+15551234567",
            ChannelType::Live,
            HashMap::new(),
            None,
        )
    }

    #[test]
    fn test_forward_transitions() {
        let mut s = session();
        assert!(s.advance(SessionStatus::Connecting));
        assert!(s.advance(SessionStatus::InProgress));
        assert!(s.advance(SessionStatus::Completed));
        assert_eq!(s.status, SessionStatus::Completed);
        assert!(s.end_time.is_some());
        assert!(s.duration_ms.is_some());
    }

    #[test]
    fn test_skipping_states_is_allowed() {
        // A provider can report "ended" before we ever saw "started".
        let mut s = session();
        assert!(s.advance(SessionStatus::Completed));
        assert_eq!(s.status, SessionStatus::Completed);
    }

    #[test]
    fn test_duplicate_terminal_is_idempotent() {
        let mut s = session();
        assert!(s.advance(SessionStatus::Completed));
        let end_time = s.end_time;
        let duration = s.duration_ms;
        assert!(!s.advance(SessionStatus::Completed));
        assert!(!s.advance(SessionStatus::Failed));
        assert_eq!(s.end_time, end_time);
        assert_eq!(s.duration_ms, duration);
    }

    #[test]
    fn test_never_reverts() {
        let mut s = session();
        s.advance(SessionStatus::InProgress);
        assert!(!s.advance(SessionStatus::Connecting));
        assert!(!s.advance(SessionStatus::Initiated));
        assert_eq!(s.status, SessionStatus::InProgress);
    }

    #[test]
    fn test_transcript_append_only() {
        let mut s = session();
        s.append_transcript(TranscriptEntry::agent("Hello, this is Alex."));
        s.append_transcript(TranscriptEntry::user("Hi, who is this?"));
        assert_eq!(s.transcript.len(), 2);
        assert_eq!(s.transcript[0].speaker, Speaker::Agent);
        assert_eq!(s.transcript[1].speaker, Speaker::User);
    }

    #[test]
    fn test_serde_round_trip() {
        let mut s = session();
        s.provider_call_id = Some("call_abc".into());
        s.advance(SessionStatus::Connecting);
        s.append_transcript(TranscriptEntry::agent("Hello"));
        let json = serde_json::to_string(&s).unwrap();
        assert!(json.contains("\"status\":\"connecting\""));
        let back: CallSession = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, SessionStatus::Connecting);
        assert_eq!(back.provider_call_id.as_deref(), Some("call_abc"));
        assert_eq!(back.transcript.len(), 1);
    }
}
