use crate::models::session::TranscriptEntry;
use serde::{Deserialize, Serialize};

/// SessionEvent is the payload pushed to real-time subscribers: call state
/// changes, transcript deltas and background progress. The bus is
/// fire-and-forget and never a correctness dependency.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    CallStarted {
        session_id: String,
        provider_call_id: String,
    },
    CallTranscript {
        session_id: String,
        entry: TranscriptEntry,
    },
    CallEnded {
        session_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
    },
    CallFailed {
        session_id: String,
    },
    CampaignProgress {
        campaign_id: String,
        completed: u32,
        failed: u32,
        total: u32,
    },
    SyncProgress {
        job_id: String,
        processed: u32,
        enriched: u32,
        failed: u32,
        total: u32,
    },
}

/// Type alias for the event sender
pub type EventSender = tokio::sync::broadcast::Sender<SessionEvent>;

/// Type alias for the event receiver
pub type EventReceiver = tokio::sync::broadcast::Receiver<SessionEvent>;

pub fn create_event_sender() -> EventSender {
    tokio::sync::broadcast::channel(256).0
}
