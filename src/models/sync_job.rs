use chrono::{DateTime, Utc};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncJobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BatchSettings {
    pub batch_size: usize,
    pub inter_call_delay_ms: u64,
    pub retry_attempts: u32,
}

/// A background reconciliation run that backfills authoritative provider
/// analytics into call sessions. Counters are updated after every item so
/// progress is observable mid-run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncJob {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<String>,
    pub status: SyncJobStatus,
    pub start_time: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
    pub total_calls: u32,
    pub processed_calls: u32,
    pub enriched_calls: u32,
    pub failed_calls: u32,
    #[serde(default)]
    pub errors: Vec<String>,
    pub settings: BatchSettings,
}

impl SyncJob {
    pub fn new(owner_id: Option<String>, settings: BatchSettings) -> Self {
        let suffix: String = rand::rng()
            .sample_iter(&Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();
        Self {
            id: format!("sync_{}_{}", Utc::now().timestamp_millis(), suffix),
            owner_id,
            status: SyncJobStatus::Pending,
            start_time: Utc::now(),
            end_time: None,
            total_calls: 0,
            processed_calls: 0,
            enriched_calls: 0,
            failed_calls: 0,
            errors: Vec::new(),
            settings,
        }
    }

    pub fn finish(&mut self, status: SyncJobStatus) {
        self.status = status;
        self.end_time = Some(Utc::now());
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncStats {
    pub total_jobs: u32,
    pub running_jobs: u32,
    pub completed_jobs: u32,
    pub failed_jobs: u32,
    pub total_calls_processed: u32,
    pub total_calls_enriched: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_job_counters() {
        let job = SyncJob::new(
            Some("user_1".into()),
            BatchSettings {
                batch_size: 10,
                inter_call_delay_ms: 1000,
                retry_attempts: 3,
            },
        );
        assert!(job.id.starts_with("sync_"));
        assert_eq!(job.status, SyncJobStatus::Pending);
        assert_eq!(job.processed_calls, 0);
        assert!(job.end_time.is_none());
        assert!(job.processed_calls <= job.total_calls);
    }

    #[test]
    fn test_finish_sets_end_time() {
        let mut job = SyncJob::new(
            None,
            BatchSettings {
                batch_size: 1,
                inter_call_delay_ms: 0,
                retry_attempts: 1,
            },
        );
        job.finish(SyncJobStatus::Completed);
        assert_eq!(job.status, SyncJobStatus::Completed);
        assert!(job.end_time.is_some());
    }

    #[test]
    fn test_serde_round_trip() {
        let mut job = SyncJob::new(
            Some("user_1".into()),
            BatchSettings {
                batch_size: 5,
                inter_call_delay_ms: 250,
                retry_attempts: 2,
            },
        );
        job.total_calls = 3;
        job.processed_calls = 3;
        job.enriched_calls = 2;
        job.failed_calls = 1;
        job.errors.push("analytics fetch failed for call_x".into());
        let json = serde_json::to_string(&job).unwrap();
        let back: SyncJob = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, job.id);
        assert_eq!(back.enriched_calls, 2);
        assert_eq!(back.errors.len(), 1);
        assert_eq!(back.settings.batch_size, 5);
        assert!(back.enriched_calls + back.failed_calls <= back.processed_calls);
    }
}
