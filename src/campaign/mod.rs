use crate::config::CampaignConfig;
use crate::event::{EventSender, SessionEvent};
use crate::models::{
    Campaign, CampaignSettings, CampaignStats, CampaignStatus, ChannelType, Contact,
    ContactStatus,
};
use crate::session::{CallResult, SessionManager};
use crate::store::Store;
use crate::{Error, Result};
use anyhow::{anyhow, Context};
use chrono::Utc;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::select;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub mod personalize;

#[derive(Debug, Clone, Deserialize)]
pub struct ContactInput {
    pub name: String,
    pub phone_number: String,
    #[serde(default)]
    pub company_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub custom_fields: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
pub struct NewCampaign {
    pub owner_id: String,
    pub name: String,
    pub message_template: String,
    pub contacts: Vec<ContactInput>,
    #[serde(default)]
    pub settings: CampaignSettings,
    #[serde(default)]
    pub voice_id: Option<String>,
    #[serde(default)]
    pub call_delay_secs: Option<u64>,
}

struct Runner {
    token: CancellationToken,
    finished: CancellationToken,
}

/// Drives campaign execution: one runner task per running campaign,
/// registered by id. All writes to a campaign document go through its
/// runner task while one exists; pause cancels the runner and waits for
/// it to exit before touching the document, so a step already past its
/// gateway call still records its result.
pub struct CampaignEngine {
    store: Arc<dyn Store>,
    sessions: Arc<SessionManager>,
    event_sender: EventSender,
    config: CampaignConfig,
    running: Mutex<HashMap<String, Runner>>,
    shutdown: CancellationToken,
}

impl CampaignEngine {
    pub fn new(
        store: Arc<dyn Store>,
        sessions: Arc<SessionManager>,
        event_sender: EventSender,
        config: CampaignConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            sessions,
            event_sender,
            config,
            running: Mutex::new(HashMap::new()),
            shutdown,
        }
    }

    /// Contacts with unusable phone numbers are dropped at the door; an
    /// empty list after normalization rejects the whole request.
    pub async fn create(&self, req: NewCampaign) -> Result<Campaign> {
        let mut contacts = Vec::new();
        for input in req.contacts {
            let Some(phone) =
                personalize::normalize_phone(&input.phone_number, &self.config.country_code)
            else {
                warn!(
                    name = input.name,
                    phone = input.phone_number,
                    "skipping contact with invalid phone number"
                );
                continue;
            };
            let mut contact = Contact::new(input.name.trim(), phone);
            contact.company_name = input.company_name.map(|c| c.trim().to_string());
            contact.email = input.email.map(|e| e.trim().to_string());
            contact.custom_fields = input.custom_fields;
            contacts.push(contact);
        }
        if contacts.is_empty() {
            return Err(Error::Validation(
                "campaign has no valid contacts after phone normalization".to_string(),
            ));
        }

        let campaign = Campaign::new(
            req.owner_id,
            req.name.trim(),
            req.message_template.trim(),
            contacts,
            req.settings,
            req.voice_id,
            req.call_delay_secs
                .unwrap_or(self.config.default_call_delay_secs),
            self.config.default_max_retries,
        );
        self.store.put_campaign(&campaign).await?;
        info!(
            campaign_id = campaign.id,
            contacts = campaign.total_contacts,
            "campaign created"
        );
        Ok(campaign)
    }

    pub async fn get(&self, campaign_id: &str) -> Result<Option<Campaign>> {
        Ok(self.store.get_campaign(campaign_id).await?)
    }

    pub async fn list(&self, owner_id: &str, limit: usize) -> Result<Vec<Campaign>> {
        Ok(self.store.list_campaigns(owner_id, limit).await?)
    }

    pub async fn stats(&self, campaign_id: &str) -> Result<CampaignStats> {
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;
        Ok(campaign.stats())
    }

    pub async fn start(self: &Arc<Self>, campaign_id: &str) -> Result<()> {
        let mut campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;
        match campaign.status {
            CampaignStatus::Running => {
                return Err(Error::InvalidState("campaign is already running".into()))
            }
            CampaignStatus::Completed => {
                return Err(Error::InvalidState("campaign is already completed".into()))
            }
            CampaignStatus::Failed => {
                return Err(Error::InvalidState("campaign has failed".into()))
            }
            CampaignStatus::Draft | CampaignStatus::Paused => {}
        }

        // The registry slot is checked and claimed under one lock
        // acquisition; a concurrent start cannot also pass this gate.
        let mut running = self.running.lock().await;
        if running.contains_key(campaign_id) {
            return Err(Error::InvalidState("campaign is already running".into()));
        }

        campaign.status = CampaignStatus::Running;
        if campaign.started_at.is_none() {
            campaign.started_at = Some(Utc::now());
        }
        self.store.put_campaign(&campaign).await?;
        let runner = self.spawn_runner(campaign.id.clone());
        running.insert(campaign.id.clone(), runner);
        drop(running);
        info!(campaign_id, "campaign started");
        Ok(())
    }

    pub async fn pause(&self, campaign_id: &str) -> Result<()> {
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;
        if campaign.status != CampaignStatus::Running {
            return Err(Error::InvalidState("campaign is not running".into()));
        }

        // Stop the runner and wait for it to exit. An in-flight step
        // finishes and records its outcome first, so the re-read below
        // cannot overwrite a contact update with a stale document.
        let runner = self.running.lock().await.remove(campaign_id);
        if let Some(runner) = runner {
            runner.token.cancel();
            runner.finished.cancelled().await;
        }

        let mut campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;
        // The runner may have finished the list while we waited; a
        // terminal status stays terminal.
        if campaign.status == CampaignStatus::Running {
            campaign.status = CampaignStatus::Paused;
            self.store.put_campaign(&campaign).await?;
        }
        info!(campaign_id, "campaign paused");
        Ok(())
    }

    pub async fn delete(&self, campaign_id: &str) -> Result<()> {
        let campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("campaign {}", campaign_id)))?;
        if campaign.status == CampaignStatus::Running {
            self.pause(campaign_id).await?;
        }
        self.store.delete_campaign(campaign_id).await?;
        info!(campaign_id, "campaign deleted");
        Ok(())
    }

    /// Re-spawn runners for campaigns persisted as running. The next
    /// pending contact is re-derived from the stored contact list, so a
    /// restart never re-dials anyone already attempted. A contact left
    /// in `calling` by the previous process lost its outcome with that
    /// process and is settled as failed before processing resumes.
    pub async fn resume_running(self: &Arc<Self>) -> anyhow::Result<usize> {
        let campaigns = self
            .store
            .campaigns_with_status(CampaignStatus::Running)
            .await?;
        let count = campaigns.len();
        for mut campaign in campaigns {
            let mut stranded = 0u32;
            for contact in campaign.contacts.iter_mut() {
                if contact.status == ContactStatus::Calling {
                    contact.mark_failed("call interrupted by restart");
                    stranded += 1;
                }
            }
            if stranded > 0 {
                campaign.failed_contacts += stranded;
                self.store.put_campaign(&campaign).await?;
                warn!(
                    campaign_id = campaign.id,
                    stranded, "settled contacts stranded mid-call"
                );
            }

            info!(campaign_id = campaign.id, "resuming running campaign");
            let mut running = self.running.lock().await;
            if running.contains_key(&campaign.id) {
                continue;
            }
            let runner = self.spawn_runner(campaign.id.clone());
            running.insert(campaign.id.clone(), runner);
        }
        Ok(count)
    }

    /// Callers insert the returned entry into `running` themselves,
    /// under the same lock acquisition as their occupancy check.
    fn spawn_runner(self: &Arc<Self>, campaign_id: String) -> Runner {
        let token = self.shutdown.child_token();
        let finished = CancellationToken::new();
        let engine = self.clone();
        let run_token = token.clone();
        let done = finished.clone();
        tokio::spawn(async move {
            engine.run(&campaign_id, run_token).await;
            engine.running.lock().await.remove(&campaign_id);
            done.cancel();
        });
        Runner { token, finished }
    }

    async fn run(&self, campaign_id: &str, token: CancellationToken) {
        info!(campaign_id, "campaign runner started");
        loop {
            if token.is_cancelled() {
                break;
            }
            let campaign = match self.store.get_campaign(campaign_id).await {
                Ok(Some(campaign)) => campaign,
                Ok(None) => {
                    info!(campaign_id, "campaign removed, stopping runner");
                    break;
                }
                Err(e) => {
                    error!(campaign_id, "failed to load campaign: {:#}", e);
                    self.mark_failed(campaign_id).await;
                    break;
                }
            };
            if campaign.status != CampaignStatus::Running {
                break;
            }
            let Some(idx) = campaign.next_pending() else {
                if let Err(e) = self.complete(campaign_id).await {
                    error!(campaign_id, "failed to complete campaign: {:#}", e);
                }
                break;
            };

            if let Err(e) = self.step(&campaign, idx).await {
                error!(campaign_id, "campaign step failed: {:#}", e);
                self.mark_failed(campaign_id).await;
                break;
            }

            // Pacing against provider rate limits, not a retry backoff.
            select! {
                _ = token.cancelled() => break,
                _ = sleep(Duration::from_secs(campaign.call_delay_secs)) => {}
            }
        }
        info!(campaign_id, "campaign runner stopped");
    }

    /// Process one contact. Gateway failure is recorded on the contact and
    /// never aborts the campaign; only store failures propagate.
    async fn step(&self, campaign: &Campaign, idx: usize) -> anyhow::Result<()> {
        let contact = campaign
            .contacts
            .get(idx)
            .ok_or_else(|| anyhow!("contact index {} out of range", idx))?;

        self.write_contact(&campaign.id, idx, |c| c.mark_calling())
            .await?;

        let rendered = personalize::render_template(
            &campaign.message_template,
            contact,
            &self.config.missing_field_default,
        );
        let variables = HashMap::from([
            ("contact_name".to_string(), contact.name.clone()),
            (
                "company_name".to_string(),
                contact.company_name.clone().unwrap_or_default(),
            ),
            (
                "deal_type".to_string(),
                campaign.settings.deal_type.clone().unwrap_or_default(),
            ),
            (
                "investment_range".to_string(),
                campaign
                    .settings
                    .investment_range
                    .clone()
                    .unwrap_or_default(),
            ),
            (
                "industry_focus".to_string(),
                campaign.settings.industry_focus.clone().unwrap_or_default(),
            ),
            ("custom_instructions".to_string(), rendered),
        ]);

        let result = self
            .sessions
            .initiate_call(
                &campaign.owner_id,
                &contact.phone_number,
                ChannelType::Voicemail,
                variables,
                campaign.voice_id.clone(),
            )
            .await?;

        self.record_outcome(&campaign.id, idx, &result).await?;
        Ok(())
    }

    /// Re-read the campaign document, mutate one contact and write back.
    /// All writes for a campaign go through its single runner task, so
    /// this read-modify-write cannot interleave with another writer.
    async fn write_contact(
        &self,
        campaign_id: &str,
        idx: usize,
        f: impl FnOnce(&mut Contact),
    ) -> anyhow::Result<()> {
        let mut campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .with_context(|| format!("campaign {} removed mid-step", campaign_id))?;
        let contact = campaign
            .contacts
            .get_mut(idx)
            .ok_or_else(|| anyhow!("contact index {} out of range", idx))?;
        f(contact);
        self.store.put_campaign(&campaign).await?;
        Ok(())
    }

    async fn record_outcome(
        &self,
        campaign_id: &str,
        idx: usize,
        result: &CallResult,
    ) -> anyhow::Result<()> {
        let mut campaign = self
            .store
            .get_campaign(campaign_id)
            .await?
            .with_context(|| format!("campaign {} removed mid-step", campaign_id))?;
        let contact = campaign
            .contacts
            .get_mut(idx)
            .ok_or_else(|| anyhow!("contact index {} out of range", idx))?;
        if result.success {
            contact.mark_completed(result.call_id.clone());
            campaign.completed_contacts += 1;
            info!(
                campaign_id,
                contact = contact.name,
                call_id = result.call_id.as_deref().unwrap_or(""),
                "campaign call dispatched"
            );
        } else {
            let reason = result
                .error
                .clone()
                .unwrap_or_else(|| "call failed".to_string());
            warn!(campaign_id, contact = contact.name, "campaign call failed: {}", reason);
            contact.mark_failed(reason);
            campaign.failed_contacts += 1;
        }
        self.store.put_campaign(&campaign).await?;

        let _ = self.event_sender.send(SessionEvent::CampaignProgress {
            campaign_id: campaign.id.clone(),
            completed: campaign.completed_contacts,
            failed: campaign.failed_contacts,
            total: campaign.total_contacts,
        });
        Ok(())
    }

    async fn complete(&self, campaign_id: &str) -> anyhow::Result<()> {
        let Some(mut campaign) = self.store.get_campaign(campaign_id).await? else {
            return Ok(());
        };
        campaign.status = CampaignStatus::Completed;
        campaign.completed_at = Some(Utc::now());
        self.store.put_campaign(&campaign).await?;
        info!(
            campaign_id,
            completed = campaign.completed_contacts,
            failed = campaign.failed_contacts,
            "campaign completed"
        );
        Ok(())
    }

    async fn mark_failed(&self, campaign_id: &str) {
        match self.store.get_campaign(campaign_id).await {
            Ok(Some(mut campaign)) => {
                campaign.status = CampaignStatus::Failed;
                campaign.completed_at = Some(Utc::now());
                if let Err(e) = self.store.put_campaign(&campaign).await {
                    error!(campaign_id, "failed to persist failed status: {:#}", e);
                }
            }
            Ok(None) => {}
            Err(e) => error!(campaign_id, "failed to load campaign: {:#}", e),
        }
    }
}
