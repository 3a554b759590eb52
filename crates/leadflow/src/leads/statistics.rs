use std::collections::BTreeMap;

use serde::Serialize;

use super::domain::CallCenterId;
use super::notifier::LeadEventSink;
use super::repository::{DirectoryRepository, LeadRepository};
use super::service::{LeadService, LeadServiceError};
use super::status::LeadStatus;

/// Dashboard counters for one call center.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LeadStatistics {
    pub call_center_id: CallCenterId,
    pub total: usize,
    pub by_status: BTreeMap<&'static str, usize>,
    pub assigned: usize,
    pub unassigned: usize,
    pub converted: usize,
    pub conversion_rate: f64,
}

impl<R, D, E> LeadService<R, D, E>
where
    R: LeadRepository + 'static,
    D: DirectoryRepository + 'static,
    E: LeadEventSink + 'static,
{
    pub fn statistics(
        &self,
        call_center_id: &CallCenterId,
    ) -> Result<LeadStatistics, LeadServiceError> {
        let leads = self.leads.for_call_center(call_center_id)?;

        let mut by_status: BTreeMap<&'static str, usize> = BTreeMap::new();
        let mut assigned = 0;
        for lead in &leads {
            *by_status.entry(lead.status.label()).or_default() += 1;
            if lead.assigned_to.is_some() {
                assigned += 1;
            }
        }

        let total = leads.len();
        let converted = by_status
            .get(LeadStatus::Converted.label())
            .copied()
            .unwrap_or(0);
        let conversion_rate = if total == 0 {
            0.0
        } else {
            converted as f64 / total as f64
        };

        Ok(LeadStatistics {
            call_center_id: call_center_id.clone(),
            total,
            by_status,
            assigned,
            unassigned: total - assigned,
            converted,
            conversion_rate,
        })
    }
}
