pub mod campaign;
pub mod session;
pub mod sync_job;

pub use campaign::{
    Campaign, CampaignSettings, CampaignStats, CampaignStatus, Contact, ContactStatus,
};
pub use session::{
    CallEnrichment, CallSession, ChannelType, SessionStatus, Speaker, TranscriptEntry,
};
pub use sync_job::{BatchSettings, SyncJob, SyncJobStatus, SyncStats};
