use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CampaignStatus {
    Draft,
    Running,
    Paused,
    Completed,
    Failed,
}

impl CampaignStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, CampaignStatus::Completed | CampaignStatus::Failed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContactStatus {
    Pending,
    Calling,
    Completed,
    Failed,
}

/// One recipient within a campaign. Status only advances
/// pending -> calling -> completed|failed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Contact {
    pub name: String,
    pub phone_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_fields: HashMap<String, String>,
    pub status: ContactStatus,
    /// Weak reference to the call session created for this contact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attempted_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Contact {
    pub fn new(name: impl Into<String>, phone_number: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            phone_number: phone_number.into(),
            company_name: None,
            email: None,
            custom_fields: HashMap::new(),
            status: ContactStatus::Pending,
            call_id: None,
            error_message: None,
            attempted_at: None,
            completed_at: None,
        }
    }

    pub fn mark_calling(&mut self) {
        self.status = ContactStatus::Calling;
        self.attempted_at = Some(Utc::now());
    }

    pub fn mark_completed(&mut self, call_id: Option<String>) {
        self.status = ContactStatus::Completed;
        self.completed_at = Some(Utc::now());
        if call_id.is_some() {
            self.call_id = call_id;
        }
    }

    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = ContactStatus::Failed;
        self.error_message = Some(error.into());
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CampaignSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deal_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub investment_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub industry_focus: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom_instructions: Option<String>,
}

/// A named batch job pairing a contact list with a message template and
/// pacing settings. Contacts are embedded and processed in list order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Campaign {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub message_template: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_id: Option<String>,
    pub status: CampaignStatus,
    pub total_contacts: u32,
    pub completed_contacts: u32,
    pub failed_contacts: u32,
    /// Pacing delay between contacts, not a retry backoff.
    pub call_delay_secs: u64,
    /// Surfaced to clients; the execution loop performs a single attempt
    /// per contact and does not consult this.
    pub max_retries: u32,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub settings: CampaignSettings,
}

impl Campaign {
    pub fn new(
        owner_id: impl Into<String>,
        name: impl Into<String>,
        message_template: impl Into<String>,
        contacts: Vec<Contact>,
        settings: CampaignSettings,
        voice_id: Option<String>,
        call_delay_secs: u64,
        max_retries: u32,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            name: name.into(),
            message_template: message_template.into(),
            voice_id,
            status: CampaignStatus::Draft,
            total_contacts: contacts.len() as u32,
            completed_contacts: 0,
            failed_contacts: 0,
            call_delay_secs,
            max_retries,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            contacts,
            settings,
        }
    }

    /// Index of the first contact still pending, in stable list order.
    pub fn next_pending(&self) -> Option<usize> {
        self.contacts
            .iter()
            .position(|c| c.status == ContactStatus::Pending)
    }

    pub fn stats(&self) -> CampaignStats {
        let pending = self
            .contacts
            .iter()
            .filter(|c| c.status == ContactStatus::Pending)
            .count() as u32;
        let calling = self
            .contacts
            .iter()
            .filter(|c| c.status == ContactStatus::Calling)
            .count() as u32;
        let completed = self
            .contacts
            .iter()
            .filter(|c| c.status == ContactStatus::Completed)
            .count() as u32;
        let failed = self
            .contacts
            .iter()
            .filter(|c| c.status == ContactStatus::Failed)
            .count() as u32;
        let total = self.contacts.len() as u32;
        let success_rate = if total > 0 {
            (completed as f64 / total as f64 * 10000.0).round() / 100.0
        } else {
            0.0
        };
        CampaignStats {
            total,
            pending,
            calling,
            completed,
            failed,
            success_rate,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CampaignStats {
    pub total: u32,
    pub pending: u32,
    pub calling: u32,
    pub completed: u32,
    pub failed: u32,
    pub success_rate: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_campaign() -> Campaign {
        let contacts = vec![
            Contact::new("Jane Doe", "+15551230001"),
            Contact::new("John Roe", "+15551230002"),
            Contact::new("Ann Poe", "+15551230003"),
        ];
        Campaign::new(
            "user_1",
            "Q3 outreach",
            "Hi {{contact_name}}",
            contacts,
            CampaignSettings::default(),
            None,
            30,
            2,
        )
    }

    #[test]
    fn test_next_pending_is_list_order() {
        let mut campaign = sample_campaign();
        assert_eq!(campaign.next_pending(), Some(0));

        campaign.contacts[0].mark_calling();
        campaign.contacts[0].mark_completed(Some("call_1".into()));
        assert_eq!(campaign.next_pending(), Some(1));

        campaign.contacts[1].mark_calling();
        campaign.contacts[1].mark_failed("no answer");
        assert_eq!(campaign.next_pending(), Some(2));

        campaign.contacts[2].mark_calling();
        campaign.contacts[2].mark_completed(None);
        assert_eq!(campaign.next_pending(), None);
    }

    #[test]
    fn test_counter_invariant() {
        let mut campaign = sample_campaign();
        campaign.contacts[0].mark_completed(None);
        campaign.completed_contacts += 1;
        campaign.contacts[1].mark_failed("busy");
        campaign.failed_contacts += 1;
        assert!(campaign.completed_contacts + campaign.failed_contacts <= campaign.total_contacts);
    }

    #[test]
    fn test_stats_success_rate() {
        let mut campaign = sample_campaign();
        campaign.contacts[0].mark_completed(None);
        let stats = campaign.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.completed, 1);
        assert_eq!(stats.pending, 2);
        assert_eq!(stats.success_rate, 33.33);
    }

    #[test]
    fn test_status_serde_round_trip() {
        let campaign = sample_campaign();
        let json = serde_json::to_string(&campaign).unwrap();
        assert!(json.contains("\"status\":\"draft\""));
        let back: Campaign = serde_json::from_str(&json).unwrap();
        assert_eq!(back.status, CampaignStatus::Draft);
        assert_eq!(back.contacts.len(), 3);
        assert_eq!(back.contacts[0].status, ContactStatus::Pending);
        assert_eq!(back.call_delay_secs, 30);
    }
}
