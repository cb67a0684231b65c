use crate::models::{Campaign, CampaignStatus, CallSession, SyncJob};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod local;
pub mod memory;
#[cfg(test)]
mod tests;

pub use local::LocalStore;
pub use memory::MemoryStore;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StoreConfig {
    Memory,
    Local { root: String },
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig::Memory
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DateRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Document store boundary: CRUD plus the handful of equality/range
/// queries the services need. No transactions beyond single-document
/// writes.
#[async_trait]
pub trait Store: Send + Sync {
    async fn put_campaign(&self, campaign: &Campaign) -> Result<()>;
    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>>;
    async fn delete_campaign(&self, id: &str) -> Result<()>;
    async fn list_campaigns(&self, owner_id: &str, limit: usize) -> Result<Vec<Campaign>>;
    async fn campaigns_with_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>>;

    async fn put_session(&self, session: &CallSession) -> Result<()>;
    async fn get_session(&self, id: &str) -> Result<Option<CallSession>>;
    async fn session_by_provider_id(&self, provider_call_id: &str)
        -> Result<Option<CallSession>>;
    async fn list_sessions(&self, owner_id: &str, limit: usize) -> Result<Vec<CallSession>>;
    /// Sessions with a provider call id but no enrichment block yet.
    async fn sessions_needing_enrichment(
        &self,
        owner_id: Option<&str>,
        range: Option<DateRange>,
    ) -> Result<Vec<CallSession>>;

    async fn put_sync_job(&self, job: &SyncJob) -> Result<()>;
    async fn get_sync_job(&self, id: &str) -> Result<Option<SyncJob>>;
    async fn list_sync_jobs(&self, owner_id: Option<&str>, limit: usize) -> Result<Vec<SyncJob>>;
}

pub fn build(config: &StoreConfig) -> Result<Arc<dyn Store>> {
    match config {
        StoreConfig::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreConfig::Local { root } => Ok(Arc::new(LocalStore::new(root)?)),
    }
}
