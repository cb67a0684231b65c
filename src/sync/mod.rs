use crate::config::SyncConfig;
use crate::event::{EventSender, SessionEvent};
use crate::gateway::{CallAnalytics, CallGateway};
use crate::models::{
    BatchSettings, CallSession, SessionStatus, Speaker, SyncJob, SyncJobStatus, SyncStats,
    TranscriptEntry,
};
use crate::store::{DateRange, Store};
use crate::{Error, Result};
use anyhow::Context;
use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[cfg(test)]
mod tests;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SyncOptions {
    #[serde(default)]
    pub owner_id: Option<String>,
    #[serde(default)]
    pub batch_size: Option<usize>,
    #[serde(default)]
    pub inter_call_delay_ms: Option<u64>,
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    #[serde(default)]
    pub date_range: Option<DateRange>,
}

struct RunningJob {
    id: String,
    token: CancellationToken,
}

/// Backfills provider analytics into call sessions. One job per process;
/// items are fetched sequentially with a configurable delay to respect
/// provider rate limits. Cancellation is cooperative, checked between
/// items.
pub struct SyncService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn CallGateway>,
    event_sender: EventSender,
    config: SyncConfig,
    current: Mutex<Option<RunningJob>>,
    shutdown: CancellationToken,
}

impl SyncService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn CallGateway>,
        event_sender: EventSender,
        config: SyncConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            gateway,
            event_sender,
            config,
            current: Mutex::new(None),
            shutdown,
        }
    }

    /// Create the job record and spawn the run; returns the job id
    /// immediately.
    pub async fn start(self: &Arc<Self>, options: SyncOptions) -> Result<String> {
        let mut current = self.current.lock().await;
        if let Some(running) = current.as_ref() {
            return Err(Error::Conflict(format!(
                "sync job {} is already running",
                running.id
            )));
        }

        let settings = BatchSettings {
            batch_size: options.batch_size.unwrap_or(self.config.batch_size).max(1),
            inter_call_delay_ms: options
                .inter_call_delay_ms
                .unwrap_or(self.config.inter_call_delay_ms),
            retry_attempts: options
                .retry_attempts
                .unwrap_or(self.config.retry_attempts)
                .max(1),
        };
        let job = SyncJob::new(options.owner_id.clone(), settings);
        self.store.put_sync_job(&job).await?;

        let token = self.shutdown.child_token();
        *current = Some(RunningJob {
            id: job.id.clone(),
            token: token.clone(),
        });
        drop(current);

        info!(job_id = job.id, "sync job started");
        let service = self.clone();
        let job_id = job.id.clone();
        let finished_id = job_id.clone();
        tokio::spawn(async move {
            service.run(job, options.date_range, token).await;
            let mut current = service.current.lock().await;
            if current.as_ref().is_some_and(|r| r.id == finished_id) {
                *current = None;
            }
        });
        Ok(job_id)
    }

    /// Cooperative cancel: the in-flight item finishes, later items do
    /// not start. Returns whether the id matched the running job.
    pub async fn cancel(&self, job_id: &str) -> bool {
        let current = self.current.lock().await;
        match current.as_ref() {
            Some(running) if running.id == job_id => {
                running.token.cancel();
                info!(job_id, "sync job cancellation requested");
                true
            }
            _ => false,
        }
    }

    pub async fn status(&self, job_id: &str) -> Result<Option<SyncJob>> {
        Ok(self.store.get_sync_job(job_id).await?)
    }

    pub async fn list(&self, owner_id: Option<&str>, limit: usize) -> Result<Vec<SyncJob>> {
        Ok(self.store.list_sync_jobs(owner_id, limit).await?)
    }

    pub async fn stats(&self) -> Result<SyncStats> {
        let jobs = self.store.list_sync_jobs(None, usize::MAX).await?;
        let mut stats = SyncStats {
            total_jobs: jobs.len() as u32,
            ..Default::default()
        };
        for job in &jobs {
            match job.status {
                SyncJobStatus::Running => stats.running_jobs += 1,
                SyncJobStatus::Completed => stats.completed_jobs += 1,
                SyncJobStatus::Failed => stats.failed_jobs += 1,
                SyncJobStatus::Pending => {}
            }
            stats.total_calls_processed += job.processed_calls;
            stats.total_calls_enriched += job.enriched_calls;
        }
        Ok(stats)
    }

    async fn run(&self, mut job: SyncJob, range: Option<DateRange>, token: CancellationToken) {
        match self.run_inner(&mut job, range, &token).await {
            Ok(false) => {
                job.finish(SyncJobStatus::Completed);
                info!(
                    job_id = job.id,
                    processed = job.processed_calls,
                    enriched = job.enriched_calls,
                    failed = job.failed_calls,
                    "sync job completed"
                );
            }
            Ok(true) => {
                job.errors.push("job cancelled by user".to_string());
                job.finish(SyncJobStatus::Failed);
                info!(job_id = job.id, "sync job cancelled");
            }
            Err(e) => {
                job.errors.push(e.to_string());
                job.finish(SyncJobStatus::Failed);
                error!(job_id = job.id, "sync job failed: {:#}", e);
            }
        }
        if let Err(e) = self.store.put_sync_job(&job).await {
            error!(job_id = job.id, "failed to persist job status: {:#}", e);
        }
    }

    /// Returns Ok(true) when the loop stopped due to cancellation.
    async fn run_inner(
        &self,
        job: &mut SyncJob,
        range: Option<DateRange>,
        token: &CancellationToken,
    ) -> anyhow::Result<bool> {
        job.status = SyncJobStatus::Running;
        self.store.put_sync_job(job).await?;

        let pending = self
            .store
            .sessions_needing_enrichment(job.owner_id.as_deref(), range)
            .await?;
        job.total_calls = pending.len() as u32;
        self.store.put_sync_job(job).await?;
        info!(job_id = job.id, total = job.total_calls, "sessions to enrich");

        for batch in pending.chunks(job.settings.batch_size) {
            if token.is_cancelled() {
                return Ok(true);
            }
            for session in batch {
                if token.is_cancelled() {
                    return Ok(true);
                }
                match self.enrich_one(session, job.settings.retry_attempts).await {
                    Ok(true) => job.enriched_calls += 1,
                    Ok(false) => {
                        job.failed_calls += 1;
                        job.errors
                            .push(format!("no analytics available for session {}", session.id));
                    }
                    Err(e) => {
                        job.failed_calls += 1;
                        job.errors
                            .push(format!("session {}: {}", session.id, e));
                        warn!(job_id = job.id, session_id = session.id, "enrichment failed: {:#}", e);
                    }
                }
                job.processed_calls += 1;
                // Persist after every item so progress is observable.
                self.store.put_sync_job(job).await?;
                let _ = self.event_sender.send(SessionEvent::SyncProgress {
                    job_id: job.id.clone(),
                    processed: job.processed_calls,
                    enriched: job.enriched_calls,
                    failed: job.failed_calls,
                    total: job.total_calls,
                });

                if job.settings.inter_call_delay_ms > 0 {
                    sleep(Duration::from_millis(job.settings.inter_call_delay_ms)).await;
                }
            }
        }
        Ok(false)
    }

    /// Fetch analytics with exponential backoff and merge on success.
    /// Ok(false) means the provider has nothing for this call; errors mean
    /// every attempt failed.
    async fn enrich_one(&self, session: &CallSession, attempts: u32) -> anyhow::Result<bool> {
        let provider_call_id = session
            .provider_call_id
            .as_deref()
            .context("session has no provider call id")?;
        let mut last_error = None;
        for attempt in 1..=attempts {
            match self.gateway.get_analytics(provider_call_id).await {
                Ok(Some(analytics)) => {
                    self.merge(&session.id, analytics).await?;
                    return Ok(true);
                }
                Ok(None) => {
                    warn!(
                        session_id = session.id,
                        provider_call_id, "provider has no analytics for call"
                    );
                    return Ok(false);
                }
                Err(e) => {
                    warn!(
                        session_id = session.id,
                        attempt, "analytics fetch failed: {}", e
                    );
                    last_error = Some(e);
                    if attempt < attempts {
                        let backoff = self.config.backoff_base_ms * 2u64.pow(attempt - 1);
                        sleep(Duration::from_millis(backoff)).await;
                    }
                }
            }
        }
        Err(anyhow::anyhow!(
            "analytics fetch failed after {} attempts: {}",
            attempts,
            last_error.map(|e| e.to_string()).unwrap_or_default()
        ))
    }

    async fn merge(&self, session_id: &str, analytics: CallAnalytics) -> anyhow::Result<()> {
        let mut session = self
            .store
            .get_session(session_id)
            .await?
            .with_context(|| format!("session {} removed during sync", session_id))?;

        if session.duration_ms.is_none() {
            if let Some(duration) = analytics.duration_ms.filter(|d| *d > 0) {
                session.duration_ms = Some(duration);
            }
        }

        // Mapped through the monotonic state machine: reconciliation can
        // only advance a session, never revert it.
        if let Some(status) = analytics.call_status.as_deref().and_then(map_status) {
            session.advance(status);
        }

        // Provider transcript wins only when it knows more than we do.
        if !analytics.transcript.is_empty()
            && session.transcript.len() < analytics.transcript.len()
        {
            session.transcript = analytics
                .transcript
                .iter()
                .map(|entry| TranscriptEntry {
                    speaker: if entry.role == "agent" {
                        Speaker::Agent
                    } else {
                        Speaker::User
                    },
                    content: entry.content.clone(),
                    timestamp: session.start_time,
                })
                .collect();
        }

        session.enrichment = Some(crate::models::CallEnrichment {
            sentiment: analytics.user_sentiment,
            summary: analytics.call_summary,
            successful: analytics.call_successful,
            recording_url: analytics.recording_url,
            latency_ms: analytics.e2e_latency_p50_ms,
        });
        session.last_synced_at = Some(Utc::now());
        self.store.put_session(&session).await?;
        Ok(())
    }
}

fn map_status(provider_status: &str) -> Option<SessionStatus> {
    match provider_status {
        "ended" => Some(SessionStatus::Completed),
        "error" | "failed" => Some(SessionStatus::Failed),
        "ongoing" => Some(SessionStatus::InProgress),
        "registered" => Some(SessionStatus::Connecting),
        _ => None,
    }
}
