use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use super::distribution::{Claim, DistributionError, DistributionOutcome, Distributor, Pick};
use super::domain::{AgentId, CallCenterId, FormId, Lead, LeadId, LeadSubmission};
use super::notifier::{LeadEvent, LeadEventSink};
use super::repository::{DirectoryRepository, LeadRepository, RepositoryError};
use super::scoring::{ScoreTier, ScoreTrigger, ScoringEngine};
use super::status::LeadStatus;
use crate::config::LeadEngineConfig;

/// Service owning every lead mutation. Each operation funnels through [`Self::commit`], which
/// rescoring, event emission and automatic distribution hang off.
pub struct LeadService<R, D, E> {
    pub(super) leads: Arc<R>,
    pub(super) directory: Arc<D>,
    events: Arc<E>,
    pub(super) distributor: Distributor<R, D>,
    scoring: ScoringEngine,
    pub(super) config: LeadEngineConfig,
}

impl<R, D, E> LeadService<R, D, E>
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    pub fn new(leads: Arc<R>, directory: Arc<D>, events: Arc<E>, config: LeadEngineConfig) -> Self {
        let distributor = Distributor::new(leads.clone(), directory.clone());
        let scoring = ScoringEngine::new(config.scoring.clone());
        Self {
            leads,
            directory,
            events,
            distributor,
            scoring,
            config,
        }
    }

    pub fn config(&self) -> &LeadEngineConfig {
        &self.config
    }

    /// Capture a lead from a public form; it waits for double opt-in.
    pub fn submit(&self, submission: LeadSubmission) -> Result<Lead, LeadServiceError> {
        let email = submission.email.trim().to_ascii_lowercase();
        if !looks_like_email(&email) {
            return Err(LeadServiceError::Validation(format!(
                "'{}' is not a valid email address",
                submission.email
            )));
        }

        let form = self
            .directory
            .form(&submission.form_id)?
            .ok_or_else(|| LeadServiceError::UnknownForm(submission.form_id.clone()))?;
        if !form.is_active {
            return Err(LeadServiceError::InactiveForm(form.id));
        }

        let now = Utc::now();
        let ttl_hours = self.config.confirmation_ttl_hours;
        let token_expires_at = Duration::try_hours(i64::from(ttl_hours))
            .and_then(|ttl| now.checked_add_signed(ttl))
            .ok_or(LeadServiceError::ConfirmationWindow(ttl_hours))?;
        let lead = Lead {
            id: LeadId::generate(),
            form_id: Some(form.id),
            call_center_id: form.call_center_id,
            email,
            first_name: submission.first_name.trim().to_string(),
            last_name: submission.last_name.trim().to_string(),
            phone: submission
                .phone
                .map(|phone| phone.trim().to_string())
                .filter(|phone| !phone.is_empty()),
            status: LeadStatus::PendingEmail,
            assigned_to: None,
            assigned_at: None,
            score: 0,
            score_tier: ScoreTier::Cold,
            scored_at: None,
            confirmation_token: Some(uuid::Uuid::new_v4().simple().to_string()),
            token_expires_at: Some(token_expires_at),
            email_confirmed_at: None,
            created_at: now,
            updated_at: now,
        };

        self.commit(None, lead, now)
    }

    pub fn confirm_email(&self, token: &str) -> Result<Lead, LeadServiceError> {
        self.confirm_email_at(token, Utc::now())
    }

    /// Double opt-in. Confirming twice returns the lead unchanged.
    pub fn confirm_email_at(
        &self,
        token: &str,
        now: DateTime<Utc>,
    ) -> Result<Lead, LeadServiceError> {
        let mut lead = self
            .leads
            .find_by_token(token)?
            .ok_or(LeadServiceError::UnknownToken)?;

        if lead.email_confirmed_at.is_some() {
            debug!(lead_id = %lead.id, "email already confirmed");
            return Ok(lead);
        }

        if lead.token_expired(now) {
            return Err(LeadServiceError::TokenExpired(lead.id));
        }

        let previous = lead.clone();
        lead.email_confirmed_at = Some(now);
        lead.token_expires_at = None;
        if lead.status == LeadStatus::PendingEmail {
            lead.status = LeadStatus::EmailConfirmed;
        }

        self.commit(Some(previous), lead, now)
    }

    /// Record what happened on the phone. `agent` must be the current assignee when given.
    pub fn record_call_outcome(
        &self,
        lead_id: &LeadId,
        outcome: LeadStatus,
        agent: Option<&AgentId>,
    ) -> Result<Lead, LeadServiceError> {
        let mut lead = self.get(lead_id)?;

        let reopening_final = lead.status.is_final()
            && !(lead.status == LeadStatus::Confirmed && outcome == LeadStatus::Converted);
        if !outcome.can_follow_call() || reopening_final {
            return Err(LeadServiceError::InvalidTransition {
                from: lead.status,
                to: outcome,
            });
        }

        let Some(assignee) = lead.assigned_to.clone() else {
            return Err(LeadServiceError::NotAssigned(lead.id));
        };
        if let Some(agent) = agent {
            if agent != &assignee {
                return Err(LeadServiceError::NotAssignee {
                    lead_id: lead.id,
                    agent_id: agent.clone(),
                });
            }
        }

        let previous = lead.clone();
        lead.status = outcome;
        self.commit(Some(previous), lead, Utc::now())
    }

    /// Administrative save of an edited lead.
    pub fn update(&self, lead: Lead) -> Result<Lead, LeadServiceError> {
        let previous = self.get(&lead.id)?;
        self.commit(Some(previous), lead, Utc::now())
    }

    /// Explicit assignment by an owner or admin; the only path for manual call centers.
    pub fn assign_manually(
        &self,
        lead_id: &LeadId,
        agent_id: &AgentId,
    ) -> Result<Lead, LeadServiceError> {
        let mut lead = self.get(lead_id)?;
        let agent = self
            .directory
            .agent(agent_id)?
            .ok_or_else(|| LeadServiceError::UnknownAgent(agent_id.clone()))?;
        if !agent.is_active {
            return Err(LeadServiceError::AgentInactive(agent.id));
        }

        if lead.email_confirmed_at.is_none() {
            return Err(LeadServiceError::EmailNotConfirmed(lead.id));
        }
        if lead.status.is_final() {
            return Err(LeadServiceError::InvalidTransition {
                from: lead.status,
                to: LeadStatus::PendingCall,
            });
        }

        let previous = lead.clone();
        self.distributor.backfill_call_center(&mut lead)?;
        if lead.call_center_id.as_ref() != Some(&agent.call_center_id) {
            return Err(LeadServiceError::AgentOutsideCallCenter {
                agent_id: agent.id,
                call_center_id: lead.call_center_id,
            });
        }
        if lead.assigned_to.as_ref() == Some(&agent.id) {
            return Ok(previous);
        }

        let call_center = self
            .directory
            .call_center(&agent.call_center_id)?
            .ok_or_else(|| DistributionError::UnknownCallCenter(agent.call_center_id.clone()))?;
        let now = Utc::now();
        let claim = self.distributor.claim(
            &lead.id,
            previous.assigned_to.as_ref(),
            &call_center,
            Pick::Agent(&agent.id),
            now,
            |current, assigned| self.persist(Some(current), assigned, now),
        )?;

        match claim {
            Claim::Assigned { lead, .. } => {
                info!(lead_id = %lead.id, agent_id = %agent.id, "lead assigned manually");
                Ok(lead)
            }
            Claim::NoEligibleAgent(_) => Err(LeadServiceError::AgentInactive(agent.id)),
            Claim::Superseded(_) => Err(RepositoryError::Conflict.into()),
        }
    }

    pub fn get(&self, lead_id: &LeadId) -> Result<Lead, LeadServiceError> {
        self.leads
            .fetch(lead_id)?
            .ok_or_else(|| LeadServiceError::NotFound(lead_id.clone()))
    }

    /// Sweep confirmed leads nobody holds yet; the periodic job and CLI entry point.
    pub fn distribute_unassigned(&self, limit: usize) -> Result<BatchReport, LeadServiceError> {
        let backlog = self.distributor.backlog(limit)?;
        let mut report = BatchReport::default();

        for lead in backlog {
            report.examined += 1;
            let lead_id = lead.id.clone();
            match self.auto_distribute(lead, Utc::now()) {
                Ok(saved) if saved.assigned_to.is_some() => report.assigned += 1,
                Ok(_) => report.left_unassigned += 1,
                Err(err) => {
                    warn!(lead_id = %lead_id, error = %err, "batch distribution failed for lead");
                    report.failed += 1;
                }
            }
        }

        info!(
            examined = report.examined,
            assigned = report.assigned,
            left_unassigned = report.left_unassigned,
            failed = report.failed,
            "batch distribution finished"
        );
        Ok(report)
    }

    /// Persist `lead`, then hand it to the distributor when it is confirmed and unassigned.
    ///
    /// Distribution failures are logged and leave the saved lead as it was; they never fail
    /// the save that triggered them.
    pub(super) fn commit(
        &self,
        previous: Option<Lead>,
        lead: Lead,
        now: DateTime<Utc>,
    ) -> Result<Lead, LeadServiceError> {
        let saved = self.persist(previous.as_ref(), lead, now)?;
        if !saved.is_distributable() {
            return Ok(saved);
        }

        self.auto_distribute(saved, now)
    }

    /// Hand a stored, confirmed and unassigned lead to the distributor.
    ///
    /// Distribution failures are logged and return the lead as stored.
    fn auto_distribute(&self, stored: Lead, now: DateTime<Utc>) -> Result<Lead, LeadServiceError> {
        let outcome = self.distributor.distribute(&stored, now, |current, assigned| {
            self.persist(Some(current), assigned, now)
        });
        match outcome {
            Ok(DistributionOutcome::Assigned { lead, .. }) => Ok(lead),
            Ok(DistributionOutcome::Superseded { current: Some(current) }) => Ok(current),
            Ok(_) => Ok(stored),
            Err(LeadServiceError::Repository(err)) => {
                error!(lead_id = %stored.id, error = %err, "failed to save assignment");
                Ok(stored)
            }
            Err(err) => {
                warn!(lead_id = %stored.id, error = %err, "distribution failed; lead left unassigned");
                Ok(stored)
            }
        }
    }

    /// Rescore when something other than the score changed, save, and emit events.
    pub(super) fn persist(
        &self,
        previous: Option<&Lead>,
        mut lead: Lead,
        now: DateTime<Utc>,
    ) -> Result<Lead, LeadServiceError> {
        if lead.call_center_id.is_none() {
            if let Err(err) = self.distributor.backfill_call_center(&mut lead) {
                warn!(lead_id = %lead.id, error = %err, "call center backfill failed");
            }
        }

        if let Some(trigger) = ScoreTrigger::detect(previous, &lead) {
            let score = self.scoring.apply(&mut lead, now);
            debug!(lead_id = %lead.id, ?trigger, score = score.total, tier = score.tier.label(), "lead rescored");
        }
        lead.updated_at = now;

        match previous {
            None => {
                self.leads.insert(lead.clone())?;
            }
            Some(_) => self.leads.update(lead.clone())?,
        }

        for event in self.transition_events(previous, &lead) {
            self.publish(&event, &lead);
        }

        Ok(lead)
    }

    fn transition_events(&self, previous: Option<&Lead>, lead: &Lead) -> Vec<LeadEvent> {
        let Some(previous) = previous else {
            return vec![LeadEvent::Created];
        };

        let mut events = Vec::new();
        if previous.email_confirmed_at.is_none() && lead.email_confirmed_at.is_some() {
            events.push(LeadEvent::EmailConfirmed);
        }

        if previous.assigned_to != lead.assigned_to {
            match (&lead.assigned_to, &previous.assigned_to) {
                (Some(agent_id), _) => {
                    let agent_name = self
                        .directory
                        .agent(agent_id)
                        .ok()
                        .flatten()
                        .map(|agent| agent.name)
                        .unwrap_or_else(|| agent_id.0.clone());
                    events.push(LeadEvent::Assigned {
                        agent_id: agent_id.clone(),
                        agent_name,
                        previous_agent: previous.assigned_to.clone(),
                    });
                }
                (None, Some(previous_agent)) => events.push(LeadEvent::Unassigned {
                    previous_agent: previous_agent.clone(),
                }),
                (None, None) => {}
            }
        }

        if previous.status != lead.status {
            events.push(LeadEvent::StatusUpdated {
                from: previous.status,
                to: lead.status,
            });
            if lead.status == LeadStatus::Converted {
                events.push(LeadEvent::Converted);
            }
        }

        events
    }

    pub(super) fn publish(&self, event: &LeadEvent, lead: &Lead) {
        if let Err(err) = self.events.publish(event, lead) {
            warn!(
                lead_id = %lead.id,
                event = event.webhook_name(),
                error = %err,
                "failed to publish lead event"
            );
        }
    }
}

fn looks_like_email(candidate: &str) -> bool {
    let Some((local, domain)) = candidate.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !candidate.chars().any(char::is_whitespace)
}

/// Counts from one batch distribution sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub examined: usize,
    pub assigned: usize,
    pub left_unassigned: usize,
    pub failed: usize,
}

/// Error raised by the lead service.
#[derive(Debug, thiserror::Error)]
pub enum LeadServiceError {
    #[error("invalid submission: {0}")]
    Validation(String),
    #[error("form {0} does not exist")]
    UnknownForm(FormId),
    #[error("form {0} no longer accepts leads")]
    InactiveForm(FormId),
    #[error("confirmation token is not recognized")]
    UnknownToken,
    #[error("confirmation link for lead {0} has expired")]
    TokenExpired(LeadId),
    #[error("lead {0} not found")]
    NotFound(LeadId),
    #[error("agent {0} not found")]
    UnknownAgent(AgentId),
    #[error("agent {0} is inactive")]
    AgentInactive(AgentId),
    #[error("agent {agent_id} does not belong to call center {call_center_id:?}")]
    AgentOutsideCallCenter {
        agent_id: AgentId,
        call_center_id: Option<CallCenterId>,
    },
    #[error("lead {0} has not confirmed its email address")]
    EmailNotConfirmed(LeadId),
    #[error("confirmation window of {0} hours is out of range")]
    ConfirmationWindow(u32),
    #[error("lead {0} has no assigned agent")]
    NotAssigned(LeadId),
    #[error("agent {agent_id} is not assigned to lead {lead_id}")]
    NotAssignee { lead_id: LeadId, agent_id: AgentId },
    #[error("cannot move lead from {from} to {to}")]
    InvalidTransition { from: LeadStatus, to: LeadStatus },
    #[error(transparent)]
    Distribution(#[from] DistributionError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
