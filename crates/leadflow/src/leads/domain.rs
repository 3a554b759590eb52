use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::scoring::ScoreTier;
use super::status::LeadStatus;

/// Identifier wrapper for captured leads.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LeadId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AgentId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallCenterId(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FormId(pub String);

impl LeadId {
    pub fn generate() -> Self {
        Self(format!("lead-{}", uuid::Uuid::new_v4().simple()))
    }
}

impl std::fmt::Display for LeadId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for AgentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for CallCenterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::fmt::Display for FormId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// How a call center hands confirmed leads to its agents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionMethod {
    #[default]
    RoundRobin,
    Weighted,
    Manual,
}

impl DistributionMethod {
    pub const fn label(self) -> &'static str {
        match self {
            DistributionMethod::RoundRobin => "round_robin",
            DistributionMethod::Weighted => "weighted",
            DistributionMethod::Manual => "manual",
        }
    }

    pub const fn is_automatic(self) -> bool {
        !matches!(self, DistributionMethod::Manual)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallCenter {
    pub id: CallCenterId,
    pub name: String,
    pub distribution_method: DistributionMethod,
}

/// Public capture form; its call center is the fallback owner of leads it produces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadForm {
    pub id: FormId,
    pub name: String,
    pub call_center_id: Option<CallCenterId>,
    pub is_active: bool,
}

/// User holding the agent role inside one call center.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub call_center_id: CallCenterId,
    pub is_active: bool,
    pub supervisor_id: Option<AgentId>,
    /// Relative capacity used by weighted distribution.
    pub weight: u32,
    pub last_assigned_at: Option<DateTime<Utc>>,
    pub assignment_count: u64,
}

impl Agent {
    pub fn new(id: &str, name: &str, call_center_id: &CallCenterId) -> Self {
        Self {
            id: AgentId(id.to_string()),
            name: name.to_string(),
            call_center_id: call_center_id.clone(),
            is_active: true,
            supervisor_id: None,
            weight: 1,
            last_assigned_at: None,
            assignment_count: 0,
        }
    }

    pub fn is_eligible_for(&self, call_center_id: &CallCenterId) -> bool {
        self.is_active && &self.call_center_id == call_center_id
    }

    pub(crate) fn record_assignment(&mut self, at: DateTime<Utc>) {
        self.last_assigned_at = Some(at);
        self.assignment_count += 1;
    }
}

/// Payload accepted from a public capture form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadSubmission {
    pub form_id: FormId,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Lead {
    pub id: LeadId,
    pub form_id: Option<FormId>,
    pub call_center_id: Option<CallCenterId>,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub phone: Option<String>,
    pub status: LeadStatus,
    pub assigned_to: Option<AgentId>,
    pub assigned_at: Option<DateTime<Utc>>,
    pub score: u8,
    pub score_tier: ScoreTier,
    pub scored_at: Option<DateTime<Utc>>,
    pub confirmation_token: Option<String>,
    pub token_expires_at: Option<DateTime<Utc>>,
    pub email_confirmed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Lead {
    /// Confirmed and waiting for an agent.
    pub fn is_distributable(&self) -> bool {
        self.status == LeadStatus::EmailConfirmed && self.assigned_to.is_none()
    }

    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }

    pub fn token_expired(&self, now: DateTime<Utc>) -> bool {
        self.token_expires_at
            .map(|expires| expires <= now)
            .unwrap_or(false)
    }

    pub(crate) fn assign(&mut self, agent: &AgentId, at: DateTime<Utc>) {
        self.assigned_to = Some(agent.clone());
        self.assigned_at = Some(at);
        if self.status == LeadStatus::EmailConfirmed {
            self.status = LeadStatus::PendingCall;
        }
    }

    pub(crate) fn unassign(&mut self) {
        self.assigned_to = None;
        self.assigned_at = None;
        if self.status == LeadStatus::PendingCall {
            self.status = LeadStatus::EmailConfirmed;
        }
    }

    pub fn status_view(&self) -> LeadStatusView {
        LeadStatusView {
            lead_id: self.id.clone(),
            status: self.status.label(),
            assigned_to: self.assigned_to.clone(),
            call_center_id: self.call_center_id.clone(),
            score: self.score,
            score_tier: self.score_tier.label(),
        }
    }
}

/// Sanitized representation of a lead exposed over HTTP.
#[derive(Debug, Clone, Serialize)]
pub struct LeadStatusView {
    pub lead_id: LeadId,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<AgentId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub call_center_id: Option<CallCenterId>,
    pub score: u8,
    pub score_tier: &'static str,
}
