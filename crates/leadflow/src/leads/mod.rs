//! Lead capture, distribution to call-center agents, and the status lifecycle around them.
//!
//! Every mutation goes through [`LeadService`], which rescores the lead, emits lifecycle
//! events, and hands confirmed unassigned leads to the distributor in the same call.

pub mod distribution;
pub mod domain;
pub mod notifier;
mod reassignment;
pub mod repository;
pub mod router;
pub mod scoring;
pub mod service;
mod statistics;
pub mod status;

#[cfg(test)]
mod tests;

pub use distribution::{DistributionError, DistributionOutcome, Distributor};
pub use domain::{
    Agent, AgentId, CallCenter, CallCenterId, DistributionMethod, FormId, Lead, LeadForm, LeadId,
    LeadStatusView, LeadSubmission,
};
pub use notifier::{
    sign_payload, ChannelQueue, DeliveryStats, DeliveryWorker, LeadEvent, LeadEventSink,
    NotifyError, TransportError, WebhookDelivery, WebhookNotifier, WebhookQueue,
    WebhookSubscription, WebhookTransport, EVENT_HEADER, FALLBACK_EVENT, SIGNATURE_HEADER,
};
pub use reassignment::{ReassignmentReport, ReassignmentStatus};
pub use repository::{DirectoryRepository, LeadRepository, RepositoryError, WebhookRepository};
pub use router::lead_router;
pub use scoring::{LeadScore, ScoreComponent, ScoreFactor, ScoreTier, ScoringConfig, ScoringEngine};
pub use service::{BatchReport, LeadService, LeadServiceError};
pub use statistics::LeadStatistics;
pub use status::LeadStatus;
