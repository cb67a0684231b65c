use super::{DateRange, Store};
use crate::models::{Campaign, CampaignStatus, CallSession, SyncJob};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// In-process store used by default and throughout the test suite.
#[derive(Default)]
pub struct MemoryStore {
    campaigns: RwLock<HashMap<String, Campaign>>,
    sessions: RwLock<HashMap<String, CallSession>>,
    sync_jobs: RwLock<HashMap<String, SyncJob>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn put_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.campaigns
            .write()
            .await
            .insert(campaign.id.clone(), campaign.clone());
        Ok(())
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        Ok(self.campaigns.read().await.get(id).cloned())
    }

    async fn delete_campaign(&self, id: &str) -> Result<()> {
        self.campaigns.write().await.remove(id);
        Ok(())
    }

    async fn list_campaigns(&self, owner_id: &str, limit: usize) -> Result<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> = self
            .campaigns
            .read()
            .await
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        campaigns.truncate(limit);
        Ok(campaigns)
    }

    async fn campaigns_with_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        Ok(self
            .campaigns
            .read()
            .await
            .values()
            .filter(|c| c.status == status)
            .cloned()
            .collect())
    }

    async fn put_session(&self, session: &CallSession) -> Result<()> {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        Ok(())
    }

    async fn get_session(&self, id: &str) -> Result<Option<CallSession>> {
        Ok(self.sessions.read().await.get(id).cloned())
    }

    async fn session_by_provider_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallSession>> {
        Ok(self
            .sessions
            .read()
            .await
            .values()
            .find(|s| s.provider_call_id.as_deref() == Some(provider_call_id))
            .cloned())
    }

    async fn list_sessions(&self, owner_id: &str, limit: usize) -> Result<Vec<CallSession>> {
        let mut sessions: Vec<CallSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.owner_id == owner_id)
            .cloned()
            .collect();
        sessions.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        sessions.truncate(limit);
        Ok(sessions)
    }

    async fn sessions_needing_enrichment(
        &self,
        owner_id: Option<&str>,
        range: Option<DateRange>,
    ) -> Result<Vec<CallSession>> {
        let mut sessions: Vec<CallSession> = self
            .sessions
            .read()
            .await
            .values()
            .filter(|s| s.provider_call_id.is_some() && s.enrichment.is_none())
            .filter(|s| owner_id.is_none_or(|owner| s.owner_id == owner))
            .filter(|s| {
                range.is_none_or(|r| s.start_time >= r.start && s.start_time <= r.end)
            })
            .cloned()
            .collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(sessions)
    }

    async fn put_sync_job(&self, job: &SyncJob) -> Result<()> {
        self.sync_jobs
            .write()
            .await
            .insert(job.id.clone(), job.clone());
        Ok(())
    }

    async fn get_sync_job(&self, id: &str) -> Result<Option<SyncJob>> {
        Ok(self.sync_jobs.read().await.get(id).cloned())
    }

    async fn list_sync_jobs(&self, owner_id: Option<&str>, limit: usize) -> Result<Vec<SyncJob>> {
        let mut jobs: Vec<SyncJob> = self
            .sync_jobs
            .read()
            .await
            .values()
            .filter(|j| owner_id.is_none_or(|owner| j.owner_id.as_deref() == Some(owner)))
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        jobs.truncate(limit);
        Ok(jobs)
    }
}
