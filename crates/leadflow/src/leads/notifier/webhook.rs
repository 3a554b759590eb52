use std::sync::Arc;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use tracing::{debug, warn};

use super::super::domain::{CallCenterId, FormId, Lead};
use super::super::repository::WebhookRepository;
use super::delivery::{WebhookDelivery, WebhookQueue};
use super::{LeadEvent, LeadEventSink, NotifyError};

type HmacSha256 = Hmac<Sha256>;

/// Outbound subscription scoped to a form, a call center, or (neither set) every lead.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookSubscription {
    pub id: String,
    pub url: String,
    pub events: Vec<String>,
    pub secret: String,
    pub is_active: bool,
    #[serde(default)]
    pub form_id: Option<FormId>,
    #[serde(default)]
    pub call_center_id: Option<CallCenterId>,
}

impl WebhookSubscription {
    pub fn subscribes_to(&self, event_name: &str) -> bool {
        self.events
            .iter()
            .any(|name| name == "*" || name == event_name)
    }

    pub fn covers(&self, lead: &Lead) -> bool {
        match (&self.form_id, &self.call_center_id) {
            (None, None) => true,
            (form, call_center) => {
                let form_match = form.is_some() && form.as_ref() == lead.form_id.as_ref();
                let center_match =
                    call_center.is_some() && call_center.as_ref() == lead.call_center_id.as_ref();
                form_match || center_match
            }
        }
    }
}

/// `sha256=<hex>` HMAC of the raw body, keyed by the subscription secret.
pub fn sign_payload(secret: &str, body: &[u8]) -> Result<String, NotifyError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| NotifyError::Signing(err.to_string()))?;
    mac.update(body);
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Fans lifecycle events out to matching subscriptions through the delivery queue.
pub struct WebhookNotifier<W, Q> {
    subscriptions: Arc<W>,
    queue: Arc<Q>,
}

impl<W, Q> WebhookNotifier<W, Q>
where
    W: WebhookRepository + 'static,
    Q: WebhookQueue + 'static,
{
    pub fn new(subscriptions: Arc<W>, queue: Arc<Q>) -> Self {
        Self {
            subscriptions,
            queue,
        }
    }
}

impl<W, Q> LeadEventSink for WebhookNotifier<W, Q>
where
    W: WebhookRepository + 'static,
    Q: WebhookQueue + 'static,
{
    fn publish(&self, event: &LeadEvent, lead: &Lead) -> Result<(), NotifyError> {
        let event_name = event.webhook_name();
        let subscriptions = self
            .subscriptions
            .subscriptions()
            .map_err(|err| NotifyError::Subscriptions(err.to_string()))?;

        let matching: Vec<_> = subscriptions
            .into_iter()
            .filter(|subscription| subscription.is_active)
            .filter(|subscription| subscription.subscribes_to(event_name))
            .filter(|subscription| subscription.covers(lead))
            .collect();

        if matching.is_empty() {
            return Ok(());
        }

        let body = serde_json::to_string(&event.payload(lead, Utc::now()))?;
        let mut failure = None;

        for subscription in matching {
            let delivery = WebhookDelivery {
                subscription_id: subscription.id.clone(),
                url: subscription.url.clone(),
                event: event_name.to_string(),
                signature: sign_payload(&subscription.secret, body.as_bytes())?,
                body: body.clone(),
                attempt: 0,
            };

            match self.queue.enqueue(delivery) {
                Ok(()) => debug!(
                    lead_id = %lead.id,
                    subscription_id = %subscription.id,
                    event = event_name,
                    "webhook queued"
                ),
                Err(err) => {
                    warn!(
                        lead_id = %lead.id,
                        subscription_id = %subscription.id,
                        event = event_name,
                        error = %err,
                        "failed to queue webhook"
                    );
                    failure = Some(err);
                }
            }
        }

        match failure {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
