use super::*;
use crate::models::{
    BatchSettings, CampaignSettings, ChannelType, Contact, SessionStatus, Speaker,
    TranscriptEntry,
};
use chrono::Duration;
use std::collections::HashMap;
use tempfile::TempDir;

fn sample_campaign(owner: &str) -> Campaign {
    Campaign::new(
        owner,
        "Spring outreach",
        "Hi {{contact_name}} from {{company_name}}",
        vec![
            Contact::new("Jane Doe", "+15551230001"),
            Contact::new("John Roe", "+15551230002"),
        ],
        CampaignSettings {
            deal_type: Some("acquisition".into()),
            ..Default::default()
        },
        Some("voice_abc".into()),
        15,
        2,
    )
}

fn sample_session(owner: &str, provider_id: Option<&str>) -> CallSession {
    let mut session = CallSession::new(
        owner,
        "+15551234567",
        ChannelType::Voicemail,
        HashMap::from([("contact_name".to_string(), "Jane".to_string())]),
        None,
    );
    session.provider_call_id = provider_id.map(|s| s.to_string());
    session
}

async fn campaign_round_trip(store: &dyn Store) {
    let campaign = sample_campaign("user_1");
    store.put_campaign(&campaign).await.unwrap();

    let loaded = store.get_campaign(&campaign.id).await.unwrap().unwrap();
    assert_eq!(loaded.name, campaign.name);
    assert_eq!(loaded.status, campaign.status);
    assert_eq!(loaded.contacts.len(), 2);
    assert_eq!(loaded.contacts[0].phone_number, "+15551230001");
    assert_eq!(loaded.settings.deal_type.as_deref(), Some("acquisition"));
    assert_eq!(loaded.call_delay_secs, 15);

    store.delete_campaign(&campaign.id).await.unwrap();
    assert!(store.get_campaign(&campaign.id).await.unwrap().is_none());
}

async fn session_queries(store: &dyn Store) {
    let mut with_provider = sample_session("user_1", Some("call_123"));
    with_provider.advance(SessionStatus::Connecting);
    with_provider.append_transcript(TranscriptEntry::agent("Hello Jane"));
    let without_provider = sample_session("user_1", None);
    let mut enriched = sample_session("user_2", Some("call_456"));
    enriched.enrichment = Some(Default::default());

    store.put_session(&with_provider).await.unwrap();
    store.put_session(&without_provider).await.unwrap();
    store.put_session(&enriched).await.unwrap();

    let found = store
        .session_by_provider_id("call_123")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(found.id, with_provider.id);
    assert_eq!(found.transcript.len(), 1);
    assert_eq!(found.transcript[0].speaker, Speaker::Agent);

    // Only the session with a provider id and no enrichment qualifies.
    let pending = store.sessions_needing_enrichment(None, None).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].id, with_provider.id);

    let scoped = store
        .sessions_needing_enrichment(Some("user_2"), None)
        .await
        .unwrap();
    assert!(scoped.is_empty());

    let range = DateRange {
        start: with_provider.start_time - Duration::minutes(1),
        end: with_provider.start_time + Duration::minutes(1),
    };
    let in_range = store
        .sessions_needing_enrichment(None, Some(range))
        .await
        .unwrap();
    assert_eq!(in_range.len(), 1);

    let stale = DateRange {
        start: with_provider.start_time - Duration::hours(2),
        end: with_provider.start_time - Duration::hours(1),
    };
    let out_of_range = store
        .sessions_needing_enrichment(None, Some(stale))
        .await
        .unwrap();
    assert!(out_of_range.is_empty());
}

async fn sync_job_round_trip(store: &dyn Store) {
    let mut job = SyncJob::new(
        Some("user_1".into()),
        BatchSettings {
            batch_size: 10,
            inter_call_delay_ms: 1000,
            retry_attempts: 3,
        },
    );
    job.total_calls = 5;
    job.processed_calls = 2;
    store.put_sync_job(&job).await.unwrap();

    let loaded = store.get_sync_job(&job.id).await.unwrap().unwrap();
    assert_eq!(loaded.total_calls, 5);
    assert_eq!(loaded.processed_calls, 2);

    let listed = store.list_sync_jobs(Some("user_1"), 10).await.unwrap();
    assert_eq!(listed.len(), 1);
    let other = store.list_sync_jobs(Some("user_2"), 10).await.unwrap();
    assert!(other.is_empty());
}

#[tokio::test]
async fn test_memory_store_round_trips() {
    let store = MemoryStore::new();
    campaign_round_trip(&store).await;
    session_queries(&store).await;
    sync_job_round_trip(&store).await;
}

#[tokio::test]
async fn test_local_store_round_trips() {
    let dir = TempDir::new().unwrap();
    let store = LocalStore::new(dir.path()).unwrap();
    campaign_round_trip(&store).await;
    session_queries(&store).await;
    sync_job_round_trip(&store).await;
}

#[tokio::test]
async fn test_list_campaigns_is_owner_scoped_and_ordered() {
    let store = MemoryStore::new();
    let first = sample_campaign("user_1");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = sample_campaign("user_1");
    let other = sample_campaign("user_2");
    store.put_campaign(&first).await.unwrap();
    store.put_campaign(&second).await.unwrap();
    store.put_campaign(&other).await.unwrap();

    let listed = store.list_campaigns("user_1", 10).await.unwrap();
    assert_eq!(listed.len(), 2);
    // newest first
    assert_eq!(listed[0].id, second.id);
    assert_eq!(listed[1].id, first.id);

    let limited = store.list_campaigns("user_1", 1).await.unwrap();
    assert_eq!(limited.len(), 1);
}
