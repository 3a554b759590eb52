use super::domain::{Agent, AgentId, CallCenter, CallCenterId, FormId, Lead, LeadForm, LeadId};
use super::notifier::WebhookSubscription;
use super::status::LeadStatus;

/// Lead storage so the service module can be exercised in isolation.
pub trait LeadRepository: Send + Sync {
    fn insert(&self, lead: Lead) -> Result<Lead, RepositoryError>;
    fn update(&self, lead: Lead) -> Result<(), RepositoryError>;
    fn fetch(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError>;
    fn find_by_token(&self, token: &str) -> Result<Option<Lead>, RepositoryError>;
    /// Leads held by `agent` whose status is one of `statuses`.
    fn assigned_to(
        &self,
        agent: &AgentId,
        statuses: &[LeadStatus],
    ) -> Result<Vec<Lead>, RepositoryError>;
    /// Oldest confirmed leads still waiting for an agent.
    fn unassigned_confirmed(&self, limit: usize) -> Result<Vec<Lead>, RepositoryError>;
    fn for_call_center(&self, call_center: &CallCenterId) -> Result<Vec<Lead>, RepositoryError>;
}

/// Call centers, capture forms and agents.
pub trait DirectoryRepository: Send + Sync {
    fn call_center(&self, id: &CallCenterId) -> Result<Option<CallCenter>, RepositoryError>;
    fn form(&self, id: &FormId) -> Result<Option<LeadForm>, RepositoryError>;
    fn agent(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError>;
    fn agents_in(&self, call_center: &CallCenterId) -> Result<Vec<Agent>, RepositoryError>;
    fn update_agent(&self, agent: Agent) -> Result<(), RepositoryError>;
}

/// Webhook subscriptions configured by owners and admins.
pub trait WebhookRepository: Send + Sync {
    fn subscriptions(&self) -> Result<Vec<WebhookSubscription>, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
