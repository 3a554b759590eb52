use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::response::Response;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde_json::Value;

use crate::config::LeadEngineConfig;
use crate::leads::domain::{
    Agent, AgentId, CallCenter, CallCenterId, DistributionMethod, FormId, Lead, LeadForm, LeadId,
    LeadSubmission,
};
use crate::leads::notifier::{
    LeadEvent, LeadEventSink, NotifyError, TransportError, WebhookDelivery, WebhookQueue,
    WebhookSubscription, WebhookTransport,
};
use crate::leads::repository::{
    DirectoryRepository, LeadRepository, RepositoryError, WebhookRepository,
};
use crate::leads::scoring::ScoreTier;
use crate::leads::service::LeadService;
use crate::leads::status::LeadStatus;

pub(super) const CENTER: &str = "cc-north";
pub(super) const FORM: &str = "form-north";

pub(super) fn fixed_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 14, 9, 30, 0)
        .single()
        .expect("valid timestamp")
}

pub(super) fn center_id() -> CallCenterId {
    CallCenterId(CENTER.to_string())
}

pub(super) fn agent_id(id: &str) -> AgentId {
    AgentId(id.to_string())
}

pub(super) fn call_center(id: &str, method: DistributionMethod) -> CallCenter {
    CallCenter {
        id: CallCenterId(id.to_string()),
        name: format!("Call center {id}"),
        distribution_method: method,
    }
}

pub(super) fn form(id: &str, call_center: Option<&str>) -> LeadForm {
    LeadForm {
        id: FormId(id.to_string()),
        name: format!("Form {id}"),
        call_center_id: call_center.map(|center| CallCenterId(center.to_string())),
        is_active: true,
    }
}

pub(super) fn agent(id: &str, call_center: &str) -> Agent {
    Agent::new(id, &format!("Agent {id}"), &CallCenterId(call_center.to_string()))
}

pub(super) fn submission(email: &str) -> LeadSubmission {
    LeadSubmission {
        form_id: FormId(FORM.to_string()),
        email: email.to_string(),
        first_name: "Ada".to_string(),
        last_name: "Moreau".to_string(),
        phone: Some("+33 6 12 34 56 78".to_string()),
    }
}

/// Lead stored directly in the repository, bypassing submission.
pub(super) fn stored_lead(id: &str, status: LeadStatus, created_at: DateTime<Utc>) -> Lead {
    Lead {
        id: LeadId(id.to_string()),
        form_id: Some(FormId(FORM.to_string())),
        call_center_id: Some(center_id()),
        email: format!("{id}@example.com"),
        first_name: "Lina".to_string(),
        last_name: "Okafor".to_string(),
        phone: None,
        status,
        assigned_to: None,
        assigned_at: None,
        score: 0,
        score_tier: ScoreTier::Cold,
        scored_at: None,
        confirmation_token: Some(format!("token-{id}")),
        token_expires_at: None,
        email_confirmed_at: Some(created_at),
        created_at,
        updated_at: created_at,
    }
}

pub(super) type TestService = LeadService<MemoryLeads, MemoryDirectory, RecordingEvents>;

pub(super) struct Harness {
    pub(super) service: TestService,
    pub(super) leads: Arc<MemoryLeads>,
    pub(super) directory: Arc<MemoryDirectory>,
    pub(super) events: Arc<RecordingEvents>,
}

impl Harness {
    /// Submit and confirm a lead, returning the saved result of the confirmation.
    pub(super) fn confirmed_lead(&self, email: &str) -> Lead {
        let lead = self.service.submit(submission(email)).expect("submission");
        let token = lead.confirmation_token.clone().expect("token issued");
        self.service.confirm_email(&token).expect("confirmation")
    }

    pub(super) fn stored(&self, id: &LeadId) -> Lead {
        self.leads
            .fetch(id)
            .expect("fetch")
            .expect("lead stored")
    }

    pub(super) fn agent(&self, id: &str) -> Agent {
        self.directory
            .agent(&agent_id(id))
            .expect("fetch")
            .expect("agent stored")
    }
}

pub(super) fn harness(method: DistributionMethod, agents: &[&str]) -> Harness {
    harness_with_config(method, agents, LeadEngineConfig::default())
}

pub(super) fn harness_with_config(
    method: DistributionMethod,
    agents: &[&str],
    config: LeadEngineConfig,
) -> Harness {
    let directory = MemoryDirectory::default();
    directory.put_call_center(call_center(CENTER, method));
    directory.put_form(form(FORM, Some(CENTER)));
    for id in agents {
        directory.put_agent(agent(id, CENTER));
    }
    build_harness(MemoryLeads::default(), directory, config)
}

pub(super) fn build_harness(
    leads: MemoryLeads,
    directory: MemoryDirectory,
    config: LeadEngineConfig,
) -> Harness {
    let leads = Arc::new(leads);
    let directory = Arc::new(directory);
    let events = Arc::new(RecordingEvents::default());
    let service = LeadService::new(leads.clone(), directory.clone(), events.clone(), config);
    Harness {
        service,
        leads,
        directory,
        events,
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryLeads {
    records: Arc<Mutex<HashMap<LeadId, Lead>>>,
    update_script: Arc<Mutex<HashMap<LeadId, VecDeque<bool>>>>,
}

impl MemoryLeads {
    /// Scripts the next updates of `id`: `true` makes that write fail as if the database
    /// went away. Writes past the end of the script succeed.
    pub(super) fn script_updates(&self, id: &LeadId, failures: &[bool]) {
        self.update_script
            .lock()
            .expect("script mutex poisoned")
            .insert(id.clone(), failures.iter().copied().collect());
    }

    pub(super) fn seed(&self, lead: Lead) {
        self.records
            .lock()
            .expect("repository mutex poisoned")
            .insert(lead.id.clone(), lead);
    }

    pub(super) fn all(&self) -> Vec<Lead> {
        let mut leads: Vec<Lead> = self
            .records
            .lock()
            .expect("repository mutex poisoned")
            .values()
            .cloned()
            .collect();
        leads.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.id.cmp(&right.id))
        });
        leads
    }

    fn take_failure(&self, id: &LeadId) -> bool {
        let mut guard = self.update_script.lock().expect("script mutex poisoned");
        guard
            .get_mut(id)
            .and_then(VecDeque::pop_front)
            .unwrap_or(false)
    }
}

impl LeadRepository for MemoryLeads {
    fn insert(&self, lead: Lead) -> Result<Lead, RepositoryError> {
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        if guard.contains_key(&lead.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(lead.id.clone(), lead.clone());
        Ok(lead)
    }

    fn update(&self, lead: Lead) -> Result<(), RepositoryError> {
        if self.take_failure(&lead.id) {
            return Err(RepositoryError::Unavailable("write timed out".to_string()));
        }
        let mut guard = self.records.lock().expect("repository mutex poisoned");
        guard.insert(lead.id.clone(), lead);
        Ok(())
    }

    fn fetch(&self, id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_token(&self, token: &str) -> Result<Option<Lead>, RepositoryError> {
        let guard = self.records.lock().expect("repository mutex poisoned");
        Ok(guard
            .values()
            .find(|lead| lead.confirmation_token.as_deref() == Some(token))
            .cloned())
    }

    fn assigned_to(
        &self,
        agent: &AgentId,
        statuses: &[LeadStatus],
    ) -> Result<Vec<Lead>, RepositoryError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|lead| lead.assigned_to.as_ref() == Some(agent))
            .filter(|lead| statuses.contains(&lead.status))
            .collect())
    }

    fn unassigned_confirmed(&self, limit: usize) -> Result<Vec<Lead>, RepositoryError> {
        Ok(self
            .all()
            .into_iter()
            .filter(Lead::is_distributable)
            .take(limit)
            .collect())
    }

    fn for_call_center(&self, call_center: &CallCenterId) -> Result<Vec<Lead>, RepositoryError> {
        Ok(self
            .all()
            .into_iter()
            .filter(|lead| lead.call_center_id.as_ref() == Some(call_center))
            .collect())
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryDirectory {
    call_centers: Arc<Mutex<HashMap<CallCenterId, CallCenter>>>,
    forms: Arc<Mutex<HashMap<FormId, LeadForm>>>,
    agents: Arc<Mutex<HashMap<AgentId, Agent>>>,
}

impl MemoryDirectory {
    pub(super) fn put_call_center(&self, call_center: CallCenter) {
        self.call_centers
            .lock()
            .expect("directory mutex poisoned")
            .insert(call_center.id.clone(), call_center);
    }

    pub(super) fn put_form(&self, form: LeadForm) {
        self.forms
            .lock()
            .expect("directory mutex poisoned")
            .insert(form.id.clone(), form);
    }

    pub(super) fn put_agent(&self, agent: Agent) {
        self.agents
            .lock()
            .expect("directory mutex poisoned")
            .insert(agent.id.clone(), agent);
    }
}

impl DirectoryRepository for MemoryDirectory {
    fn call_center(&self, id: &CallCenterId) -> Result<Option<CallCenter>, RepositoryError> {
        let guard = self.call_centers.lock().expect("directory mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn form(&self, id: &FormId) -> Result<Option<LeadForm>, RepositoryError> {
        let guard = self.forms.lock().expect("directory mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn agent(&self, id: &AgentId) -> Result<Option<Agent>, RepositoryError> {
        let guard = self.agents.lock().expect("directory mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn agents_in(&self, call_center: &CallCenterId) -> Result<Vec<Agent>, RepositoryError> {
        let guard = self.agents.lock().expect("directory mutex poisoned");
        let mut agents: Vec<Agent> = guard
            .values()
            .filter(|agent| &agent.call_center_id == call_center)
            .cloned()
            .collect();
        agents.sort_by(|left, right| left.id.cmp(&right.id));
        Ok(agents)
    }

    fn update_agent(&self, agent: Agent) -> Result<(), RepositoryError> {
        let mut guard = self.agents.lock().expect("directory mutex poisoned");
        if !guard.contains_key(&agent.id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(agent.id.clone(), agent);
        Ok(())
    }
}

/// Repository whose storage is permanently offline.
pub(super) struct UnavailableLeads;

impl LeadRepository for UnavailableLeads {
    fn insert(&self, _lead: Lead) -> Result<Lead, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn update(&self, _lead: Lead) -> Result<(), RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn fetch(&self, _id: &LeadId) -> Result<Option<Lead>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn find_by_token(&self, _token: &str) -> Result<Option<Lead>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn assigned_to(
        &self,
        _agent: &AgentId,
        _statuses: &[LeadStatus],
    ) -> Result<Vec<Lead>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn unassigned_confirmed(&self, _limit: usize) -> Result<Vec<Lead>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }

    fn for_call_center(&self, _call_center: &CallCenterId) -> Result<Vec<Lead>, RepositoryError> {
        Err(RepositoryError::Unavailable("database offline".to_string()))
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingEvents {
    events: Arc<Mutex<Vec<(LeadId, LeadEvent)>>>,
}

impl RecordingEvents {
    pub(super) fn for_lead(&self, id: &LeadId) -> Vec<LeadEvent> {
        self.events
            .lock()
            .expect("event mutex poisoned")
            .iter()
            .filter(|(lead_id, _)| lead_id == id)
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub(super) fn names_for(&self, id: &LeadId) -> Vec<&'static str> {
        self.for_lead(id)
            .iter()
            .map(LeadEvent::webhook_name)
            .collect()
    }
}

impl LeadEventSink for RecordingEvents {
    fn publish(&self, event: &LeadEvent, lead: &Lead) -> Result<(), NotifyError> {
        self.events
            .lock()
            .expect("event mutex poisoned")
            .push((lead.id.clone(), event.clone()));
        Ok(())
    }
}

/// Sink that always fails, to prove notification errors never fail a save.
pub(super) struct BrokenEvents;

impl LeadEventSink for BrokenEvents {
    fn publish(&self, _event: &LeadEvent, _lead: &Lead) -> Result<(), NotifyError> {
        Err(NotifyError::QueueClosed)
    }
}

#[derive(Default, Clone)]
pub(super) struct MemoryWebhooks {
    subscriptions: Arc<Mutex<Vec<WebhookSubscription>>>,
}

impl MemoryWebhooks {
    pub(super) fn with(subscriptions: Vec<WebhookSubscription>) -> Self {
        Self {
            subscriptions: Arc::new(Mutex::new(subscriptions)),
        }
    }
}

impl WebhookRepository for MemoryWebhooks {
    fn subscriptions(&self) -> Result<Vec<WebhookSubscription>, RepositoryError> {
        Ok(self
            .subscriptions
            .lock()
            .expect("webhook mutex poisoned")
            .clone())
    }
}

pub(super) fn subscription(id: &str, events: &[&str]) -> WebhookSubscription {
    WebhookSubscription {
        id: id.to_string(),
        url: format!("https://hooks.example.com/{id}"),
        events: events.iter().map(|event| event.to_string()).collect(),
        secret: format!("secret-{id}"),
        is_active: true,
        form_id: None,
        call_center_id: None,
    }
}

#[derive(Default, Clone)]
pub(super) struct RecordingQueue {
    deliveries: Arc<Mutex<Vec<WebhookDelivery>>>,
}

impl RecordingQueue {
    pub(super) fn deliveries(&self) -> Vec<WebhookDelivery> {
        self.deliveries
            .lock()
            .expect("queue mutex poisoned")
            .clone()
    }
}

impl WebhookQueue for RecordingQueue {
    fn enqueue(&self, delivery: WebhookDelivery) -> Result<(), NotifyError> {
        self.deliveries
            .lock()
            .expect("queue mutex poisoned")
            .push(delivery);
        Ok(())
    }
}

/// Transport replaying a fixed script of responses; succeeds once the script runs out.
#[derive(Default)]
pub(super) struct ScriptedTransport {
    responses: Mutex<VecDeque<Result<(), TransportError>>>,
    calls: AtomicU32,
    attempted: Mutex<Vec<String>>,
}

impl ScriptedTransport {
    pub(super) fn new(responses: Vec<Result<(), TransportError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: AtomicU32::new(0),
            attempted: Mutex::new(Vec::new()),
        }
    }

    /// Event names in the order the transport saw them, retries included.
    pub(super) fn attempted(&self) -> Vec<String> {
        self.attempted
            .lock()
            .expect("transport mutex poisoned")
            .clone()
    }

    pub(super) fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebhookTransport for ScriptedTransport {
    async fn deliver(&self, delivery: &WebhookDelivery) -> Result<(), TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.attempted
            .lock()
            .expect("transport mutex poisoned")
            .push(delivery.event.clone());
        self.responses
            .lock()
            .expect("transport mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(()))
    }
}

pub(super) fn hours(count: i64) -> Duration {
    Duration::hours(count)
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
