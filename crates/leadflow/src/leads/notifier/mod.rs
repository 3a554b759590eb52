//! Lifecycle events and their outbound webhook representation.

mod delivery;
mod webhook;

pub use delivery::{
    ChannelQueue, DeliveryStats, DeliveryWorker, TransportError, WebhookDelivery, WebhookQueue,
    WebhookTransport, EVENT_HEADER, SIGNATURE_HEADER,
};
pub use webhook::{sign_payload, WebhookNotifier, WebhookSubscription};

use chrono::{DateTime, Utc};
use serde_json::{json, Value};

use super::domain::{AgentId, Lead};
use super::status::LeadStatus;

/// Event name used when a lifecycle event has no dedicated webhook event.
pub const FALLBACK_EVENT: &str = "lead.updated";

/// Something that happened to a lead and may interest subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeadEvent {
    Created,
    EmailConfirmed,
    Assigned {
        agent_id: AgentId,
        agent_name: String,
        previous_agent: Option<AgentId>,
    },
    Unassigned {
        previous_agent: AgentId,
    },
    StatusUpdated {
        from: LeadStatus,
        to: LeadStatus,
    },
    Converted,
    Custom(String),
}

impl LeadEvent {
    pub fn webhook_name(&self) -> &'static str {
        match self {
            LeadEvent::Created => "lead.created",
            LeadEvent::EmailConfirmed => "lead.email_confirmed",
            LeadEvent::Assigned { .. } => "lead.assigned",
            LeadEvent::StatusUpdated { .. } => "lead.status_updated",
            LeadEvent::Converted => "lead.converted",
            LeadEvent::Unassigned { .. } | LeadEvent::Custom(_) => FALLBACK_EVENT,
        }
    }

    /// JSON body delivered to subscribers.
    pub fn payload(&self, lead: &Lead, at: DateTime<Utc>) -> Value {
        let mut data = json!({
            "lead_id": lead.id,
            "email": lead.email,
            "name": lead.full_name(),
            "status": lead.status.label(),
            "form_id": lead.form_id,
            "call_center_id": lead.call_center_id,
            "assigned_to": lead.assigned_to,
            "score": lead.score,
        });

        if let Value::Object(fields) = &mut data {
            match self {
                LeadEvent::Assigned {
                    agent_id,
                    agent_name,
                    previous_agent,
                } => {
                    fields.insert("agent_id".to_string(), json!(agent_id));
                    fields.insert("agent_name".to_string(), json!(agent_name));
                    fields.insert("previous_agent_id".to_string(), json!(previous_agent));
                }
                LeadEvent::Unassigned { previous_agent } => {
                    fields.insert("previous_agent_id".to_string(), json!(previous_agent));
                }
                LeadEvent::StatusUpdated { from, to } => {
                    fields.insert("old_status".to_string(), json!(from.label()));
                    fields.insert("new_status".to_string(), json!(to.label()));
                }
                LeadEvent::Custom(kind) => {
                    fields.insert("kind".to_string(), json!(kind));
                }
                LeadEvent::Created | LeadEvent::EmailConfirmed | LeadEvent::Converted => {}
            }
        }

        json!({
            "event": self.webhook_name(),
            "timestamp": at.to_rfc3339(),
            "data": data,
        })
    }
}

/// Receives lifecycle events from the lead service.
pub trait LeadEventSink: Send + Sync {
    fn publish(&self, event: &LeadEvent, lead: &Lead) -> Result<(), NotifyError>;
}

#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("webhook subscriptions unavailable: {0}")]
    Subscriptions(String),
    #[error("unable to sign webhook payload: {0}")]
    Signing(String),
    #[error("unable to serialize webhook payload: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("webhook queue closed")]
    QueueClosed,
}
