mod locks;
mod strategy;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};

use super::domain::{Agent, AgentId, CallCenter, CallCenterId, Lead, LeadId};
use super::repository::{DirectoryRepository, LeadRepository, RepositoryError};
use locks::CallCenterLocks;

/// Result of one distribution attempt. Only `Assigned` mutates the lead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionOutcome {
    Assigned { agent: Agent, lead: Lead },
    NoEligibleAgent { call_center_id: CallCenterId },
    ManualOnly { call_center_id: CallCenterId },
    MissingCallCenter,
    NotDistributable,
    /// Another caller assigned the lead first; `current` is what storage holds now.
    Superseded { current: Option<Lead> },
}

impl DistributionOutcome {
    pub fn assigned_agent(&self) -> Option<&Agent> {
        match self {
            DistributionOutcome::Assigned { agent, .. } => Some(agent),
            _ => None,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DistributionError {
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("call center {0} is not known")]
    UnknownCallCenter(CallCenterId),
    #[error("distribution lock for call center {0} is poisoned")]
    LockPoisoned(CallCenterId),
}

/// How [`Distributor::claim`] chooses the agent.
pub(crate) enum Pick<'a> {
    Strategy { exclude: Option<&'a AgentId> },
    Agent(&'a AgentId),
}

pub(crate) enum Claim {
    Assigned { agent: Agent, lead: Lead },
    NoEligibleAgent(Lead),
    Superseded(Option<Lead>),
}

/// Selects agents for confirmed leads and keeps the rotation bookkeeping on agents.
///
/// The lead itself is saved through the caller's `save` callback so the surrounding commit
/// step can rescore it and emit events.
pub struct Distributor<R, D> {
    leads: Arc<R>,
    directory: Arc<D>,
    locks: CallCenterLocks,
}

impl<R, D> Distributor<R, D>
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
{
    pub fn new(leads: Arc<R>, directory: Arc<D>) -> Self {
        Self {
            leads,
            directory,
            locks: CallCenterLocks::default(),
        }
    }

    /// Copies the form's call center onto a lead that has none.
    pub fn backfill_call_center(&self, lead: &mut Lead) -> Result<(), RepositoryError> {
        if lead.call_center_id.is_some() {
            return Ok(());
        }
        let Some(form_id) = &lead.form_id else {
            return Ok(());
        };

        let form_center = self
            .directory
            .form(form_id)?
            .and_then(|form| form.call_center_id);
        if let Some(call_center_id) = form_center {
            debug!(lead_id = %lead.id, %call_center_id, "backfilled call center from form");
            lead.call_center_id = Some(call_center_id);
        }
        Ok(())
    }

    /// Backfills the call center when needed, then loads it.
    pub fn resolve_call_center(
        &self,
        lead: &mut Lead,
    ) -> Result<Option<CallCenter>, DistributionError> {
        self.backfill_call_center(lead)?;

        let Some(call_center_id) = lead.call_center_id.clone() else {
            return Ok(None);
        };

        self.directory
            .call_center(&call_center_id)?
            .map(Some)
            .ok_or(DistributionError::UnknownCallCenter(call_center_id))
    }

    /// Automatic distribution for a confirmed, unassigned lead.
    ///
    /// The lead is re-read under the call-center lock; `save` persists the assignment before
    /// the lock is released and before the agent's rotation bookkeeping is written.
    pub fn distribute<E, F>(
        &self,
        lead: &Lead,
        now: DateTime<Utc>,
        save: F,
    ) -> Result<DistributionOutcome, E>
    where
        E: From<DistributionError>,
        F: FnOnce(&Lead, Lead) -> Result<Lead, E>,
    {
        if !lead.is_distributable() {
            return Ok(DistributionOutcome::NotDistributable);
        }

        let mut resolved = lead.clone();
        let Some(call_center) = self.resolve_call_center(&mut resolved)? else {
            info!(lead_id = %lead.id, "lead has no call center; leaving unassigned");
            return Ok(DistributionOutcome::MissingCallCenter);
        };

        if !call_center.distribution_method.is_automatic() {
            debug!(lead_id = %lead.id, call_center_id = %call_center.id, "manual distribution; skipping");
            return Ok(DistributionOutcome::ManualOnly {
                call_center_id: call_center.id,
            });
        }

        let claim = self.claim(
            &lead.id,
            None,
            &call_center,
            Pick::Strategy { exclude: None },
            now,
            save,
        )?;
        match claim {
            Claim::Assigned { agent, lead } => Ok(DistributionOutcome::Assigned { agent, lead }),
            Claim::NoEligibleAgent(_) => {
                info!(
                    lead_id = %lead.id,
                    call_center_id = %call_center.id,
                    "no active agent available; lead stays unassigned"
                );
                Ok(DistributionOutcome::NoEligibleAgent {
                    call_center_id: call_center.id,
                })
            }
            Claim::Superseded(current) => Ok(DistributionOutcome::Superseded { current }),
        }
    }

    /// Active agents of `call_center`, minus `exclude`.
    pub fn eligible_agents(
        &self,
        call_center: &CallCenterId,
        exclude: Option<&AgentId>,
    ) -> Result<Vec<Agent>, RepositoryError> {
        Ok(self
            .directory
            .agents_in(call_center)?
            .into_iter()
            .filter(|agent| agent.is_eligible_for(call_center))
            .filter(|agent| Some(&agent.id) != exclude)
            .collect())
    }

    /// Assigns the stored lead `lead_id` while holding the call center's lock.
    ///
    /// The lead must still be held by `holder` (`None` for an unassigned lead); otherwise it is
    /// left alone and reported as superseded. The agent's rotation bookkeeping is only written
    /// once `save` succeeded.
    pub(crate) fn claim<E, F>(
        &self,
        lead_id: &LeadId,
        holder: Option<&AgentId>,
        call_center: &CallCenter,
        pick: Pick<'_>,
        now: DateTime<Utc>,
        save: F,
    ) -> Result<Claim, E>
    where
        E: From<DistributionError>,
        F: FnOnce(&Lead, Lead) -> Result<Lead, E>,
    {
        let handle = self.locks.handle(&call_center.id);
        let _guard = handle
            .lock()
            .map_err(|_| DistributionError::LockPoisoned(call_center.id.clone()))?;

        let Some(current) = self.leads.fetch(lead_id).map_err(DistributionError::from)? else {
            return Ok(Claim::Superseded(None));
        };
        if current.assigned_to.as_ref() != holder {
            debug!(
                lead_id = %current.id,
                holder = ?current.assigned_to,
                "lead changed hands before the lock was taken"
            );
            return Ok(Claim::Superseded(Some(current)));
        }

        let (exclude, wanted) = match pick {
            Pick::Strategy { exclude } => (exclude, None),
            Pick::Agent(agent_id) => (None, Some(agent_id)),
        };
        let candidates = self
            .eligible_agents(&call_center.id, exclude)
            .map_err(DistributionError::from)?;
        let selected = match wanted {
            Some(agent_id) => candidates.iter().find(|agent| &agent.id == agent_id),
            None => strategy::select_agent(call_center.distribution_method, &candidates),
        };
        let Some(selected) = selected else {
            return Ok(Claim::NoEligibleAgent(current));
        };

        let mut agent = selected.clone();
        agent.record_assignment(rotation_stamp(&candidates, now));
        let mut assigned = current.clone();
        if assigned.call_center_id.is_none() {
            assigned.call_center_id = Some(call_center.id.clone());
        }
        assigned.assign(&agent.id, now);

        let saved = save(&current, assigned)?;
        if let Err(err) = self.directory.update_agent(agent.clone()) {
            warn!(agent_id = %agent.id, error = %err, "rotation bookkeeping not saved");
        }

        info!(
            lead_id = %saved.id,
            agent_id = %agent.id,
            previous_agent = ?holder,
            call_center_id = %call_center.id,
            method = call_center.distribution_method.label(),
            "lead assigned"
        );
        Ok(Claim::Assigned { agent, lead: saved })
    }

    /// Confirmed leads waiting for an agent, oldest first.
    pub(crate) fn backlog(&self, limit: usize) -> Result<Vec<Lead>, RepositoryError> {
        self.leads.unassigned_confirmed(limit)
    }
}

/// Rotation stamps never move backwards within a call center, even when a caller computed
/// `now` before another thread took the lock.
fn rotation_stamp(candidates: &[Agent], now: DateTime<Utc>) -> DateTime<Utc> {
    match candidates.iter().filter_map(|agent| agent.last_assigned_at).max() {
        Some(latest) if latest >= now => latest + Duration::nanoseconds(1),
        _ => now,
    }
}
