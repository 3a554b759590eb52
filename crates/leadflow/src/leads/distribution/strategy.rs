use std::cmp::Ordering;

use super::super::domain::{Agent, DistributionMethod};

/// Picks the next agent among already-filtered eligible candidates.
pub(crate) fn select_agent(method: DistributionMethod, candidates: &[Agent]) -> Option<&Agent> {
    match method {
        DistributionMethod::RoundRobin | DistributionMethod::Manual => round_robin(candidates),
        DistributionMethod::Weighted => weighted(candidates),
    }
}

/// Least-recently-assigned first; never-assigned agents lead the rotation.
fn round_robin(candidates: &[Agent]) -> Option<&Agent> {
    candidates.iter().min_by(|left, right| rotation_order(left, right))
}

/// Smooth deterministic weighting: the agent with the lowest `(assignments + 1) / weight`
/// wins, so over time each agent's share tracks its weight.
fn weighted(candidates: &[Agent]) -> Option<&Agent> {
    candidates
        .iter()
        .filter(|agent| agent.weight > 0)
        .min_by(|left, right| {
            let left_load = u128::from(left.assignment_count + 1) * u128::from(right.weight);
            let right_load = u128::from(right.assignment_count + 1) * u128::from(left.weight);
            left_load
                .cmp(&right_load)
                .then_with(|| rotation_order(left, right))
        })
}

fn rotation_order(left: &Agent, right: &Agent) -> Ordering {
    left.last_assigned_at
        .cmp(&right.last_assigned_at)
        .then_with(|| left.assignment_count.cmp(&right.assignment_count))
        .then_with(|| left.id.cmp(&right.id))
}
