use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info, warn};

use super::distribution::{Claim, Pick};
use super::domain::{Agent, AgentId, CallCenter, Lead};
use super::notifier::{LeadEvent, LeadEventSink};
use super::repository::{DirectoryRepository, LeadRepository};
use super::service::{LeadService, LeadServiceError};

/// Why a deactivation did or did not move any leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ReassignmentStatus {
    Completed,
    AgentAlreadyInactive,
    Disabled,
}

/// Counts emitted after moving a deactivated agent's untreated leads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReassignmentReport {
    pub agent_id: AgentId,
    pub status: ReassignmentStatus,
    pub examined: usize,
    pub reassigned: usize,
    pub unassigned: usize,
    pub failed: usize,
}

impl ReassignmentReport {
    fn empty(agent_id: AgentId, status: ReassignmentStatus) -> Self {
        Self {
            agent_id,
            status,
            examined: 0,
            reassigned: 0,
            unassigned: 0,
            failed: 0,
        }
    }
}

enum LeadResolution {
    Reassigned,
    Unassigned,
    /// Someone else moved the lead while the batch was running.
    AlreadyMoved,
}

impl<R, D, E> LeadService<R, D, E>
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    /// Flip `is_active` off and move the agent's untreated leads.
    pub fn deactivate_agent(
        &self,
        agent_id: &AgentId,
    ) -> Result<ReassignmentReport, LeadServiceError> {
        let mut agent = self
            .directory
            .agent(agent_id)?
            .ok_or_else(|| LeadServiceError::UnknownAgent(agent_id.clone()))?;

        if !agent.is_active {
            info!(agent_id = %agent.id, "agent already inactive; nothing to reassign");
            return Ok(ReassignmentReport::empty(
                agent.id,
                ReassignmentStatus::AgentAlreadyInactive,
            ));
        }

        agent.is_active = false;
        self.directory.update_agent(agent.clone())?;
        info!(agent_id = %agent.id, call_center_id = %agent.call_center_id, "agent deactivated");

        if !self.config.distribution.auto_reassign_on_deactivation {
            info!(agent_id = %agent.id, "reassignment on deactivation disabled");
            return Ok(ReassignmentReport::empty(agent.id, ReassignmentStatus::Disabled));
        }

        self.reassign_untreated(&agent)
    }

    pub fn activate_agent(&self, agent_id: &AgentId) -> Result<Agent, LeadServiceError> {
        let mut agent = self
            .directory
            .agent(agent_id)?
            .ok_or_else(|| LeadServiceError::UnknownAgent(agent_id.clone()))?;
        if !agent.is_active {
            agent.is_active = true;
            self.directory.update_agent(agent.clone())?;
            info!(agent_id = %agent.id, "agent activated");
        }
        Ok(agent)
    }

    /// Moves every untreated lead held by `agent`. One lead failing never stops the batch;
    /// the failed lead is unassigned instead.
    pub fn reassign_untreated(&self, agent: &Agent) -> Result<ReassignmentReport, LeadServiceError> {
        let untreated = &self.config.distribution.untreated_statuses;
        let leads = self.leads.assigned_to(&agent.id, untreated)?;
        let call_center = match self.directory.call_center(&agent.call_center_id) {
            Ok(call_center) => call_center,
            Err(err) => {
                warn!(agent_id = %agent.id, error = %err, "call center lookup failed; unassigning leads");
                None
            }
        };

        let mut report = ReassignmentReport::empty(agent.id.clone(), ReassignmentStatus::Completed);
        let now = Utc::now();

        for lead in leads {
            report.examined += 1;
            let lead_id = lead.id.clone();
            match self.reassign_lead(lead.clone(), agent, call_center.as_ref(), now) {
                Ok(LeadResolution::Reassigned) => report.reassigned += 1,
                Ok(LeadResolution::Unassigned) => report.unassigned += 1,
                Ok(LeadResolution::AlreadyMoved) => {}
                Err(err) => {
                    error!(
                        lead_id = %lead_id,
                        agent_id = %agent.id,
                        error = %err,
                        "reassignment failed; unassigning lead"
                    );
                    report.failed += 1;
                    self.fallback_unassign(lead, now);
                }
            }
        }

        info!(
            agent_id = %agent.id,
            examined = report.examined,
            reassigned = report.reassigned,
            unassigned = report.unassigned,
            failed = report.failed,
            "untreated leads processed"
        );
        Ok(report)
    }

    fn reassign_lead(
        &self,
        lead: Lead,
        from: &Agent,
        call_center: Option<&CallCenter>,
        now: DateTime<Utc>,
    ) -> Result<LeadResolution, LeadServiceError> {
        let automatic = call_center.filter(|center| center.distribution_method.is_automatic());
        let Some(center) = automatic else {
            self.unassign(lead, now)?;
            return Ok(LeadResolution::Unassigned);
        };

        let claim = self.distributor.claim(
            &lead.id,
            Some(&from.id),
            center,
            Pick::Strategy {
                exclude: Some(&from.id),
            },
            now,
            |current, assigned| self.persist(Some(current), assigned, now),
        )?;

        match claim {
            Claim::Assigned { .. } => Ok(LeadResolution::Reassigned),
            Claim::NoEligibleAgent(current) => {
                self.unassign(current, now)?;
                Ok(LeadResolution::Unassigned)
            }
            Claim::Superseded(_) => Ok(LeadResolution::AlreadyMoved),
        }
    }

    fn unassign(&self, mut lead: Lead, now: DateTime<Utc>) -> Result<(), LeadServiceError> {
        let previous = lead.clone();
        lead.unassign();
        self.persist(Some(&previous), lead, now)?;
        Ok(())
    }

    /// Last resort after an error: point the lead at nobody rather than an inactive agent.
    fn fallback_unassign(&self, mut lead: Lead, now: DateTime<Utc>) {
        let lead_id = lead.id.clone();
        let previous_agent = lead.assigned_to.clone();
        lead.unassign();
        lead.updated_at = now;

        match self.leads.update(lead.clone()) {
            Ok(()) => {
                if let Some(previous_agent) = previous_agent {
                    self.publish(&LeadEvent::Unassigned { previous_agent }, &lead);
                }
            }
            Err(err) => {
                error!(lead_id = %lead_id, error = %err, "fallback unassignment failed");
            }
        }
    }
}
