use async_trait::async_trait;
use chrono::{Duration, Utc};
use leadflow::config::LeadEngineConfig;
use leadflow::leads::{
    Agent, AgentId, CallCenter, CallCenterId, ChannelQueue, DirectoryRepository,
    DistributionMethod, FormId, Lead, LeadForm, LeadId, LeadRepository, LeadService, LeadStatus,
    RepositoryError, ScoreTier, TransportError, WebhookDelivery, WebhookNotifier,
    WebhookRepository, WebhookSubscription, WebhookTransport, EVENT_HEADER, SIGNATURE_HEADER,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

pub(crate) type ApiNotifier = WebhookNotifier<InMemoryStore, ChannelQueue>;
pub(crate) type ApiService = LeadService<InMemoryStore, InMemoryStore, ApiNotifier>;

/// Wires the lead service over one store, publishing webhooks into `queue`.
pub(crate) fn lead_service(
    store: Arc<InMemoryStore>,
    queue: ChannelQueue,
    config: LeadEngineConfig,
) -> ApiService {
    let notifier = Arc::new(WebhookNotifier::new(store.clone(), Arc::new(queue)));
    LeadService::new(store.clone(), store, notifier, config)
}

/// Serializable picture of everything the in-memory store holds.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct StoreSnapshot {
    #[serde(default)]
    pub(crate) call_centers: Vec<CallCenter>,
    #[serde(default)]
    pub(crate) forms: Vec<LeadForm>,
    #[serde(default)]
    pub(crate) agents: Vec<Agent>,
    #[serde(default)]
    pub(crate) leads: Vec<Lead>,
    #[serde(default)]
    pub(crate) webhooks: Vec<WebhookSubscription>,
}

impl StoreSnapshot {
    pub(crate) fn read(path: &Path) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(std::io::Error::other)
    }

    pub(crate) fn write(&self, path: &Path) -> std::io::Result<()> {
        let raw = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(path, raw)
    }
}

#[derive(Default)]
struct StoreState {
    call_centers: HashMap<CallCenterId, CallCenter>,
    forms: HashMap<FormId, LeadForm>,
    agents: HashMap<AgentId, Agent>,
    leads: HashMap<LeadId, Lead>,
    webhooks: Vec<WebhookSubscription>,
}

/// Process-local store backing every repository trait the lead service needs.
#[derive(Default, Clone)]
pub(crate) struct InMemoryStore {
    state: Arc<Mutex<StoreState>>,
}

impl InMemoryStore {
    pub(crate) fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        let state = StoreState {
            call_centers: snapshot
                .call_centers
                .into_iter()
                .map(|center| (center.id.clone(), center))
                .collect(),
            forms: snapshot
                .forms
                .into_iter()
                .map(|form| (form.id.clone(), form))
                .collect(),
            agents: snapshot
                .agents
                .into_iter()
                .map(|agent| (agent.id.clone(), agent))
                .collect(),
            leads: snapshot
                .leads
                .into_iter()
                .map(|lead| (lead.id.clone(), lead))
                .collect(),
            webhooks: snapshot.webhooks,
        };
        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    pub(crate) fn snapshot(&self) -> Result<StoreSnapshot, RepositoryError> {
        let state = self.lock()?;
        let mut snapshot = StoreSnapshot {
            call_centers: state.call_centers.values().cloned().collect(),
            forms: state.forms.values().cloned().collect(),
            agents: state.agents.values().cloned().collect(),
            leads: state.leads.values().cloned().collect(),
            webhooks: state.webhooks.clone(),
        };
        snapshot.call_centers.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.forms.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.agents.sort_by(|a, b| a.id.cmp(&b.id));
        snapshot.leads.sort_by(|a, b| {
            a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id))
        });
        Ok(snapshot)
    }

    pub(crate) fn add_webhook(&self, subscription: WebhookSubscription) -> Result<(), RepositoryError> {
        self.lock()?.webhooks.push(subscription);
        Ok(())
    }

    pub(crate) fn agents(&self) -> Result<Vec<Agent>, RepositoryError> {
        let mut agents: Vec<Agent> = self.lock()?.agents.values().cloned().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    fn lock(&self) -> Result<MutexGuard<'_, StoreState>, RepositoryError> {
        self.state
            .lock()
            .map_err(|_| RepositoryError::Unavailable("store mutex poisoned".to_string()))
    }

    fn sorted_leads<F>(&self, keep: F) -> Result<Vec<Lead>, RepositoryError>
    where
        F: Fn(&Lead) -> bool,
    {
        let state = self.lock()?;
        let mut leads: Vec<Lead> = state.leads.values().filter(|lead| keep(*lead)).cloned().collect();
        leads.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(leads)
    }
}

impl LeadRepository for InMemoryStore {
    fn insert(&self, lead: Lead) -> Result<Lead, RepositoryError> {
        let mut state = self.lock()?;
        if state.leads.contains_key(&lead.id) {
            return Err(RepositoryError::Conflict);
        }
        state.leads.insert(lead.id.clone(), lead.clone());
        Ok(lead)
    }

    fn update(&self, lead: Lead) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state.leads.contains_key(&lead.id) {
            state.leads.insert(lead.id.clone(), lead);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }

    fn fetch(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        Ok(self.lock()?.leads.get(id).cloned())
    }

    fn find_by_token(&self, token: &str) -> Result<Option<Lead>, RepositoryError> {
        Ok(self
            .lock()?
            .leads
            .values()
            .find(|lead| lead.confirmation_token.as_deref() == Some(token))
            .cloned())
    }

    fn assigned_to(
        &self,
        agent: &AgentId,
        statuses: &[LeadStatus],
    ) -> Result<Vec<Lead>, RepositoryError> {
        self.sorted_leads(|lead| {
            lead.assigned_to.as_ref() == Some(agent) && statuses.contains(&lead.status)
        })
    }

    fn unassigned_confirmed(&self, limit: usize) -> Result<Vec<Lead>, RepositoryError> {
        let mut leads = self.sorted_leads(Lead::is_distributable)?;
        leads.truncate(limit);
        Ok(leads)
    }

    fn for_call_center(&self, call_center: &CallCenterId) -> Result<Vec<Lead>, RepositoryError> {
        self.sorted_leads(|lead| lead.call_center_id.as_ref() == Some(call_center))
    }
}

impl DirectoryRepository for InMemoryStore {
    fn call_center(&self, id: &CallCenterId) -> Result<Option<CallCenter>, RepositoryError> {
        Ok(self.lock()?.call_centers.get(id).cloned())
    }

    fn form(&self, id: &FormId) -> Result<Option<LeadForm>, RepositoryError> {
        Ok(self.lock()?.forms.get(id).cloned())
    }

    fn agent(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        Ok(self.lock()?.agents.get(id).cloned())
    }

    fn agents_in(&self, call_center: &CallCenterId) -> Result<Vec<Agent>, RepositoryError> {
        let mut agents: Vec<Agent> = self
            .lock()?
            .agents
            .values()
            .filter(|agent| &agent.call_center_id == call_center)
            .cloned()
            .collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(agents)
    }

    fn update_agent(&self, agent: Agent) -> Result<(), RepositoryError> {
        let mut state = self.lock()?;
        if state.agents.contains_key(&agent.id) {
            state.agents.insert(agent.id.clone(), agent);
            Ok(())
        } else {
            Err(RepositoryError::NotFound)
        }
    }
}

impl WebhookRepository for InMemoryStore {
    fn subscriptions(&self) -> Result<Vec<WebhookSubscription>, RepositoryError> {
        Ok(self.lock()?.webhooks.clone())
    }
}

/// Posts signed webhook bodies to subscriber URLs.
#[derive(Clone, Default)]
pub(crate) struct ReqwestTransport {
    client: reqwest::Client,
}

#[async_trait]
impl WebhookTransport for ReqwestTransport {
    async fn deliver(&self, delivery: &WebhookDelivery) -> Result<(), TransportError> {
        let response = self
            .client
            .post(&delivery.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(SIGNATURE_HEADER, &delivery.signature)
            .header(EVENT_HEADER, &delivery.event)
            .body(delivery.body.clone())
            .timeout(std::time::Duration::from_secs(10))
            .send()
            .await
            .map_err(|err| TransportError::Network(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}

/// Prints deliveries instead of sending them; used by the demo.
#[derive(Clone, Default)]
pub(crate) struct ConsoleTransport;

#[async_trait]
impl WebhookTransport for ConsoleTransport {
    async fn deliver(&self, delivery: &WebhookDelivery) -> Result<(), TransportError> {
        debug!(subscription_id = %delivery.subscription_id, "console webhook delivery");
        println!(
            "  webhook -> {} [{}] {}",
            delivery.url, delivery.event, delivery.signature
        );
        Ok(())
    }
}

pub(crate) const DEMO_CALL_CENTER: &str = "cc-paris";
pub(crate) const DEMO_FORM: &str = "form-solar-quote";

/// One round-robin call center with two agents and a capture form.
pub(crate) fn demo_snapshot() -> StoreSnapshot {
    let center = CallCenter {
        id: CallCenterId(DEMO_CALL_CENTER.to_string()),
        name: "Paris inbound".to_string(),
        distribution_method: DistributionMethod::RoundRobin,
    };
    let form = LeadForm {
        id: FormId(DEMO_FORM.to_string()),
        name: "Solar panel quote".to_string(),
        call_center_id: Some(center.id.clone()),
        is_active: true,
    };
    let agents = vec![
        Agent::new("agent-camille", "Camille Durand", &center.id),
        Agent::new("agent-yanis", "Yanis Benali", &center.id),
    ];

    StoreSnapshot {
        call_centers: vec![center],
        forms: vec![form],
        agents,
        leads: Vec::new(),
        webhooks: Vec::new(),
    }
}

/// Confirmed lead that was captured before any agent could take it.
pub(crate) fn waiting_lead(index: usize) -> Lead {
    let created_at = Utc::now() - Duration::minutes(30 - index as i64);
    Lead {
        id: LeadId::generate(),
        form_id: Some(FormId(DEMO_FORM.to_string())),
        call_center_id: Some(CallCenterId(DEMO_CALL_CENTER.to_string())),
        email: format!("backlog{index}@example.com"),
        first_name: "Backlog".to_string(),
        last_name: format!("Lead {index}"),
        phone: None,
        status: LeadStatus::EmailConfirmed,
        assigned_to: None,
        assigned_at: None,
        score: 0,
        score_tier: ScoreTier::Cold,
        scored_at: None,
        confirmation_token: None,
        token_expires_at: None,
        email_confirmed_at: Some(created_at),
        created_at,
        updated_at: created_at,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_restores_store_contents() {
        let mut snapshot = demo_snapshot();
        snapshot.leads.push(waiting_lead(1));
        let store = InMemoryStore::from_snapshot(snapshot.clone());

        let restored = store.snapshot().expect("snapshot");

        assert_eq!(restored.agents.len(), 2);
        assert_eq!(restored.leads, snapshot.leads);
        assert_eq!(
            store
                .unassigned_confirmed(10)
                .expect("backlog")
                .len(),
            1
        );
    }

    #[test]
    fn update_requires_existing_lead() {
        let store = InMemoryStore::default();
        let result = store.update(waiting_lead(0));
        assert!(matches!(result, Err(RepositoryError::NotFound)));
    }
}
