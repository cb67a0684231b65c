use super::*;
use crate::event::create_event_sender;
use crate::gateway::{MockCallGateway, ProviderTranscriptEntry};
use crate::models::ChannelType;
use crate::store::MemoryStore;
use std::collections::HashMap;

fn fast_config() -> SyncConfig {
    SyncConfig {
        batch_size: 2,
        inter_call_delay_ms: 0,
        retry_attempts: 2,
        backoff_base_ms: 1,
    }
}

fn service_with(
    gateway: MockCallGateway,
    config: SyncConfig,
) -> (Arc<SyncService>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(SyncService::new(
        store.clone(),
        Arc::new(gateway),
        create_event_sender(),
        config,
        CancellationToken::new(),
    ));
    (service, store)
}

async fn seed_session(store: &MemoryStore, provider_call_id: &str) -> CallSession {
    let mut session = CallSession::new(
        "user_1",
        "+15551234567",
        ChannelType::Voicemail,
        HashMap::new(),
        None,
    );
    session.provider_call_id = Some(provider_call_id.to_string());
    store.put_session(&session).await.unwrap();
    session
}

async fn wait_for_job<F>(store: &MemoryStore, job_id: &str, pred: F) -> SyncJob
where
    F: Fn(&SyncJob) -> bool,
{
    for _ in 0..500 {
        if let Some(job) = store.get_sync_job(job_id).await.unwrap() {
            if pred(&job) {
                return job;
            }
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!("sync job never reached expected state");
}

#[tokio::test]
async fn test_job_counts_enriched_and_failed_items() {
    let mut gateway = MockCallGateway::new();
    // call_2 errors on both of its two attempts; the others succeed on
    // the first.
    gateway.expect_get_analytics().returning(|id| {
        if id == "call_2" {
            Err(Error::Provider("analytics endpoint timed out".into()))
        } else {
            Ok(Some(CallAnalytics {
                call_status: Some("ended".into()),
                duration_ms: Some(42_000),
                call_summary: Some("Left a voicemail.".into()),
                ..Default::default()
            }))
        }
    });
    let (service, store) = service_with(gateway, fast_config());

    let good = seed_session(&store, "call_1").await;
    seed_session(&store, "call_2").await;
    seed_session(&store, "call_3").await;

    let job_id = service.start(SyncOptions::default()).await.unwrap();
    let job = wait_for_job(&store, &job_id, |j| {
        j.status == SyncJobStatus::Completed || j.status == SyncJobStatus::Failed
    })
    .await;

    assert_eq!(job.status, SyncJobStatus::Completed);
    assert_eq!(job.total_calls, 3);
    assert_eq!(job.processed_calls, 3);
    assert_eq!(job.enriched_calls, 2);
    assert_eq!(job.failed_calls, 1);
    assert_eq!(job.errors.len(), 1);
    assert!(job.errors[0].contains("timed out"));
    assert!(job.end_time.is_some());

    let enriched = store.get_session(&good.id).await.unwrap().unwrap();
    assert_eq!(enriched.status, SessionStatus::Completed);
    assert_eq!(enriched.duration_ms, Some(42_000));
    assert!(enriched.enrichment.is_some());
    assert!(enriched.last_synced_at.is_some());
}

#[tokio::test]
async fn test_missing_analytics_fails_item_without_retrying() {
    let mut gateway = MockCallGateway::new();
    // A definitive "not found" is never retried.
    gateway
        .expect_get_analytics()
        .times(1)
        .returning(|_| Ok(None));
    let (service, store) = service_with(gateway, fast_config());
    seed_session(&store, "call_gone").await;

    let job_id = service.start(SyncOptions::default()).await.unwrap();
    let job = wait_for_job(&store, &job_id, |j| j.status == SyncJobStatus::Completed).await;
    assert_eq!(job.processed_calls, 1);
    assert_eq!(job.enriched_calls, 0);
    assert_eq!(job.failed_calls, 1);
    assert!(job.errors[0].contains("no analytics"));
}

#[tokio::test]
async fn test_second_start_is_rejected_while_running() {
    let mut gateway = MockCallGateway::new();
    gateway
        .expect_get_analytics()
        .returning(|_| Ok(Some(CallAnalytics::default())));
    let (service, store) = service_with(gateway, fast_config());
    for i in 0..3 {
        seed_session(&store, &format!("call_{}", i)).await;
    }

    let job_id = service
        .start(SyncOptions {
            inter_call_delay_ms: Some(500),
            ..Default::default()
        })
        .await
        .unwrap();

    let err = service.start(SyncOptions::default()).await.unwrap_err();
    assert!(matches!(err, Error::Conflict(_)));

    assert!(service.cancel(&job_id).await);
    wait_for_job(&store, &job_id, |j| j.status == SyncJobStatus::Failed).await;
}

#[tokio::test]
async fn test_cancel_marks_job_failed_with_note() {
    let mut gateway = MockCallGateway::new();
    gateway
        .expect_get_analytics()
        .returning(|_| Ok(Some(CallAnalytics::default())));
    let (service, store) = service_with(gateway, fast_config());
    for i in 0..5 {
        seed_session(&store, &format!("call_{}", i)).await;
    }

    let job_id = service
        .start(SyncOptions {
            inter_call_delay_ms: Some(200),
            ..Default::default()
        })
        .await
        .unwrap();
    wait_for_job(&store, &job_id, |j| j.processed_calls >= 1).await;

    assert!(service.cancel(&job_id).await);
    let job = wait_for_job(&store, &job_id, |j| j.status == SyncJobStatus::Failed).await;
    assert!(job.processed_calls < job.total_calls);
    assert!(job.errors.iter().any(|e| e.contains("cancelled")));

    // Unknown ids and finished jobs do not cancel.
    assert!(!service.cancel("sync_bogus").await);
}

#[tokio::test]
async fn test_merge_never_reverts_local_state() {
    let mut gateway = MockCallGateway::new();
    gateway.expect_get_analytics().returning(|_| {
        Ok(Some(CallAnalytics {
            call_status: Some("ongoing".into()),
            duration_ms: Some(999),
            transcript: vec![ProviderTranscriptEntry {
                role: "agent".into(),
                content: "Hello".into(),
            }],
            ..Default::default()
        }))
    });
    let (service, store) = service_with(gateway, fast_config());

    let mut session = seed_session(&store, "call_done").await;
    session.advance(SessionStatus::Completed);
    session.duration_ms = Some(12_000);
    session.append_transcript(TranscriptEntry::agent("Hi Jane, this is Alex."));
    session.append_transcript(TranscriptEntry::user("Hi."));
    store.put_session(&session).await.unwrap();

    let job_id = service.start(SyncOptions::default()).await.unwrap();
    wait_for_job(&store, &job_id, |j| j.status == SyncJobStatus::Completed).await;

    let merged = store.get_session(&session.id).await.unwrap().unwrap();
    // Terminal status and local duration survive; the shorter provider
    // transcript is ignored.
    assert_eq!(merged.status, SessionStatus::Completed);
    assert_eq!(merged.duration_ms, Some(12_000));
    assert_eq!(merged.transcript.len(), 2);
    assert!(merged.enrichment.is_some());
}

#[tokio::test]
async fn test_stats_aggregates_across_jobs() {
    let mut gateway = MockCallGateway::new();
    gateway
        .expect_get_analytics()
        .returning(|_| Ok(Some(CallAnalytics::default())));
    let (service, store) = service_with(gateway, fast_config());
    seed_session(&store, "call_a").await;

    let first = service.start(SyncOptions::default()).await.unwrap();
    wait_for_job(&store, &first, |j| j.status == SyncJobStatus::Completed).await;

    // The first run enriched everything, so the second has nothing to do.
    let second = service.start(SyncOptions::default()).await.unwrap();
    wait_for_job(&store, &second, |j| j.status == SyncJobStatus::Completed).await;

    let stats = service.stats().await.unwrap();
    assert_eq!(stats.total_jobs, 2);
    assert_eq!(stats.completed_jobs, 2);
    assert_eq!(stats.total_calls_processed, 1);
    assert_eq!(stats.total_calls_enriched, 1);
}
