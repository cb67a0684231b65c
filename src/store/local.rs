use super::{DateRange, Store};
use crate::models::{Campaign, CampaignStatus, CallSession, SyncJob};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

const CAMPAIGNS_DIR: &str = "campaigns";
const SESSIONS_DIR: &str = "sessions";
const SYNC_JOBS_DIR: &str = "sync_jobs";

/// One JSON file per document under `{root}/{collection}/{id}.json`.
/// Queries scan the collection directory; adequate for the single-process
/// deployments this targets.
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        for dir in [CAMPAIGNS_DIR, SESSIONS_DIR, SYNC_JOBS_DIR] {
            let path = root.join(dir);
            std::fs::create_dir_all(&path)
                .with_context(|| format!("create store directory {}", path.display()))?;
        }
        Ok(Self { root })
    }

    fn doc_path(&self, collection: &str, id: &str) -> PathBuf {
        self.root.join(collection).join(format!("{}.json", id))
    }

    async fn put<T: Serialize>(&self, collection: &str, id: &str, doc: &T) -> Result<()> {
        let path = self.doc_path(collection, id);
        let content = serde_json::to_vec_pretty(doc)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("write {}", path.display()))?;
        Ok(())
    }

    async fn get<T: DeserializeOwned>(&self, collection: &str, id: &str) -> Result<Option<T>> {
        let path = self.doc_path(collection, id);
        match tokio::fs::read(&path).await {
            Ok(content) => Ok(Some(serde_json::from_slice(&content).with_context(
                || format!("parse {}", path.display()),
            )?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).with_context(|| format!("read {}", path.display())),
        }
    }

    async fn scan<T: DeserializeOwned>(&self, collection: &str) -> Result<Vec<T>> {
        let dir = self.root.join(collection);
        let mut docs = Vec::new();
        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .with_context(|| format!("read {}", dir.display()))?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let content = tokio::fs::read(&path).await?;
            match serde_json::from_slice::<T>(&content) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!("skipping unreadable document {}: {}", path.display(), e),
            }
        }
        Ok(docs)
    }
}

#[async_trait]
impl Store for LocalStore {
    async fn put_campaign(&self, campaign: &Campaign) -> Result<()> {
        self.put(CAMPAIGNS_DIR, &campaign.id, campaign).await
    }

    async fn get_campaign(&self, id: &str) -> Result<Option<Campaign>> {
        self.get(CAMPAIGNS_DIR, id).await
    }

    async fn delete_campaign(&self, id: &str) -> Result<()> {
        let path = self.doc_path(CAMPAIGNS_DIR, id);
        match tokio::fs::remove_file(&path).await {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("remove {}", path.display())),
        }
    }

    async fn list_campaigns(&self, owner_id: &str, limit: usize) -> Result<Vec<Campaign>> {
        let mut campaigns: Vec<Campaign> = self
            .scan::<Campaign>(CAMPAIGNS_DIR)
            .await?
            .into_iter()
            .filter(|c| c.owner_id == owner_id)
            .collect();
        campaigns.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        campaigns.truncate(limit);
        Ok(campaigns)
    }

    async fn campaigns_with_status(&self, status: CampaignStatus) -> Result<Vec<Campaign>> {
        Ok(self
            .scan::<Campaign>(CAMPAIGNS_DIR)
            .await?
            .into_iter()
            .filter(|c| c.status == status)
            .collect())
    }

    async fn put_session(&self, session: &CallSession) -> Result<()> {
        self.put(SESSIONS_DIR, &session.id, session).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<CallSession>> {
        self.get(SESSIONS_DIR, id).await
    }

    async fn session_by_provider_id(
        &self,
        provider_call_id: &str,
    ) -> Result<Option<CallSession>> {
        Ok(self
            .scan::<CallSession>(SESSIONS_DIR)
            .await?
            .into_iter()
            .find(|s| s.provider_call_id.as_deref() == Some(provider_call_id)))
    }

    async fn list_sessions(&self, owner_id: &str, limit: usize) -> Result<Vec<CallSession>> {
        let mut sessions: Vec<CallSession> = self
            .scan::<CallSession>(SESSIONS_DIR)
            .await?
            .into_iter()
            .filter(|s| s.owner_id == owner_id)
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
            .scan::<CallSession>(SESSIONS_DIR)
            .await?
            .into_iter()
            .filter(|s| s.provider_call_id.is_some() && s.enrichment.is_none())
            .filter(|s| owner_id.is_none_or(|owner| s.owner_id == owner))
            .filter(|s| range.is_none_or(|r| s.start_time >= r.start && s.start_time <= r.end))
            .collect();
        sessions.sort_by(|a, b| a.start_time.cmp(&b.start_time));
        Ok(sessions)
    }

    async fn put_sync_job(&self, job: &SyncJob) -> Result<()> {
        self.put(SYNC_JOBS_DIR, &job.id, job).await
    }

    async fn get_sync_job(&self, id: &str) -> Result<Option<SyncJob>> {
        self.get(SYNC_JOBS_DIR, id).await
    }

    async fn list_sync_jobs(&self, owner_id: Option<&str>, limit: usize) -> Result<Vec<SyncJob>> {
        let mut jobs: Vec<SyncJob> = self
            .scan::<SyncJob>(SYNC_JOBS_DIR)
            .await?
            .into_iter()
            .filter(|j| owner_id.is_none_or(|owner| j.owner_id.as_deref() == Some(owner)))
            .collect();
        jobs.sort_by(|a, b| b.start_time.cmp(&a.start_time));
        jobs.truncate(limit);
        Ok(jobs)
    }
}
