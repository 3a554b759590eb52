use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Notify;

use super::common::*;
use crate::config::WebhookConfig;
use crate::leads::domain::{CallCenterId, FormId};
use crate::leads::notifier::{
    sign_payload, ChannelQueue, DeliveryWorker, LeadEvent, LeadEventSink, NotifyError,
    TransportError, WebhookDelivery, WebhookNotifier, WebhookQueue, WebhookTransport,
    FALLBACK_EVENT,
};
use crate::leads::status::LeadStatus;

fn notifier(
    subscriptions: Vec<crate::leads::notifier::WebhookSubscription>,
) -> (WebhookNotifier<MemoryWebhooks, RecordingQueue>, Arc<RecordingQueue>) {
    let queue = Arc::new(RecordingQueue::default());
    let notifier = WebhookNotifier::new(Arc::new(MemoryWebhooks::with(subscriptions)), queue.clone());
    (notifier, queue)
}

fn quick_policy(max_attempts: u32) -> WebhookConfig {
    WebhookConfig {
        max_attempts,
        backoff_base_ms: 1,
    }
}

fn delivery() -> WebhookDelivery {
    WebhookDelivery {
        subscription_id: "hook-1".to_string(),
        url: "https://hooks.example.com/hook-1".to_string(),
        event: "lead.created".to_string(),
        body: "{}".to_string(),
        signature: "sha256=00".to_string(),
        attempt: 0,
    }
}

#[test]
fn signature_matches_reference_hmac() {
    let signature = sign_payload("key", b"The quick brown fox jumps over the lazy dog")
        .expect("signing succeeds");

    assert_eq!(
        signature,
        "sha256=f7bc83f430538424b13298e6aa6fb143ef4d59a14946175997479dbc2d1a3cd8"
    );
}

#[test]
fn events_map_to_webhook_names() {
    assert_eq!(LeadEvent::Created.webhook_name(), "lead.created");
    assert_eq!(LeadEvent::EmailConfirmed.webhook_name(), "lead.email_confirmed");
    assert_eq!(LeadEvent::Converted.webhook_name(), "lead.converted");
    assert_eq!(
        LeadEvent::StatusUpdated {
            from: LeadStatus::PendingCall,
            to: LeadStatus::NoAnswer,
        }
        .webhook_name(),
        "lead.status_updated"
    );
    assert_eq!(
        LeadEvent::Custom("lead.archived".to_string()).webhook_name(),
        FALLBACK_EVENT
    );
    assert_eq!(
        LeadEvent::Unassigned {
            previous_agent: agent_id("a1"),
        }
        .webhook_name(),
        FALLBACK_EVENT
    );
}

#[test]
fn assigned_payload_carries_agent_details() {
    let mut lead = stored_lead("lead-1", LeadStatus::PendingCall, fixed_now());
    lead.assigned_to = Some(agent_id("a2"));
    let event = LeadEvent::Assigned {
        agent_id: agent_id("a2"),
        agent_name: "Agent a2".to_string(),
        previous_agent: Some(agent_id("a1")),
    };

    let payload = event.payload(&lead, fixed_now());

    assert_eq!(payload["event"], "lead.assigned");
    assert_eq!(payload["data"]["lead_id"], "lead-1");
    assert_eq!(payload["data"]["status"], "pending_call");
    assert_eq!(payload["data"]["agent_id"], "a2");
    assert_eq!(payload["data"]["agent_name"], "Agent a2");
    assert_eq!(payload["data"]["previous_agent_id"], "a1");
    assert_eq!(payload["timestamp"], fixed_now().to_rfc3339());
}

#[test]
fn status_payload_carries_old_and_new_status() {
    let lead = stored_lead("lead-1", LeadStatus::NoAnswer, fixed_now());
    let event = LeadEvent::StatusUpdated {
        from: LeadStatus::PendingCall,
        to: LeadStatus::NoAnswer,
    };

    let payload = event.payload(&lead, fixed_now());

    assert_eq!(payload["data"]["old_status"], "pending_call");
    assert_eq!(payload["data"]["new_status"], "no_answer");
}

#[test]
fn only_matching_active_subscriptions_are_queued() {
    let mut inactive = subscription("inactive", &["lead.created"]);
    inactive.is_active = false;
    let mut other_form = subscription("other-form", &["*"]);
    other_form.form_id = Some(FormId("form-south".to_string()));
    let mut same_center = subscription("same-center", &["lead.created"]);
    same_center.call_center_id = Some(CallCenterId(CENTER.to_string()));

    let (notifier, queue) = notifier(vec![
        subscription("global", &["*"]),
        subscription("converted-only", &["lead.converted"]),
        inactive,
        other_form,
        same_center,
    ]);
    let lead = stored_lead("lead-1", LeadStatus::PendingEmail, fixed_now());

    notifier
        .publish(&LeadEvent::Created, &lead)
        .expect("publish succeeds");

    let queued: Vec<_> = queue
        .deliveries()
        .into_iter()
        .map(|delivery| delivery.subscription_id)
        .collect();
    assert_eq!(queued, vec!["global".to_string(), "same-center".to_string()]);
}

#[test]
fn queued_delivery_is_signed_with_subscription_secret() {
    let (notifier, queue) = notifier(vec![subscription("global", &["lead.created"])]);
    let lead = stored_lead("lead-1", LeadStatus::PendingEmail, fixed_now());

    notifier
        .publish(&LeadEvent::Created, &lead)
        .expect("publish succeeds");

    let delivery = queue.deliveries().pop().expect("one delivery");
    assert_eq!(delivery.event, "lead.created");
    assert_eq!(delivery.attempt, 0);
    assert_eq!(
        delivery.signature,
        sign_payload("secret-global", delivery.body.as_bytes()).expect("sign")
    );
    let body: serde_json::Value = serde_json::from_str(&delivery.body).expect("json body");
    assert_eq!(body["data"]["email"], "lead-1@example.com");
}

#[test]
fn closed_queue_surfaces_error() {
    let (queue, receiver) = ChannelQueue::new();
    drop(receiver);
    let notifier = WebhookNotifier::new(
        Arc::new(MemoryWebhooks::with(vec![subscription("global", &["*"])])),
        Arc::new(queue),
    );
    let lead = stored_lead("lead-1", LeadStatus::PendingEmail, fixed_now());

    let result = notifier.publish(&LeadEvent::Created, &lead);

    assert!(matches!(result, Err(NotifyError::QueueClosed)));
}

#[tokio::test]
async fn worker_retries_until_delivery_succeeds() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Err(TransportError::Status(503)),
        Err(TransportError::Network("connection reset".to_string())),
    ]));
    let worker = DeliveryWorker::new(transport.clone(), quick_policy(3));

    let delivered = worker.deliver_with_retry(delivery()).await;

    assert!(delivered);
    assert_eq!(transport.calls(), 3);
}

#[tokio::test]
async fn worker_abandons_after_max_attempts() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Err(TransportError::Status(500)),
        Err(TransportError::Status(500)),
        Err(TransportError::Status(500)),
    ]));
    let worker = DeliveryWorker::new(transport.clone(), quick_policy(2));

    let delivered = worker.deliver_with_retry(delivery()).await;

    assert!(!delivered);
    assert_eq!(transport.calls(), 2);
}

#[tokio::test]
async fn worker_drains_queue_and_reports() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Ok(()),
        Err(TransportError::Status(410)),
    ]));
    let (queue, receiver) = ChannelQueue::new();
    let handle = DeliveryWorker::new(transport.clone(), quick_policy(1)).spawn(receiver);

    let notifier = WebhookNotifier::new(
        Arc::new(MemoryWebhooks::with(vec![subscription("global", &["*"])])),
        Arc::new(queue),
    );
    let lead = stored_lead("lead-1", LeadStatus::PendingEmail, fixed_now());
    notifier.publish(&LeadEvent::Created, &lead).expect("queued");
    notifier
        .publish(&LeadEvent::EmailConfirmed, &lead)
        .expect("queued");
    drop(notifier);

    let stats = handle.await.expect("worker joins");
    assert_eq!(stats.delivered, 1);
    assert_eq!(stats.abandoned, 1);
}

/// Subscriber "down" always answers 503; every other subscriber accepts.
#[derive(Default)]
struct OneSubscriberDown {
    accepted: Mutex<Vec<String>>,
    arrived: Notify,
}

#[async_trait]
impl WebhookTransport for OneSubscriberDown {
    async fn deliver(&self, delivery: &WebhookDelivery) -> Result<(), TransportError> {
        if delivery.subscription_id == "down" {
            return Err(TransportError::Status(503));
        }
        self.accepted
            .lock()
            .expect("accepted mutex poisoned")
            .push(delivery.subscription_id.clone());
        self.arrived.notify_one();
        Ok(())
    }
}

#[tokio::test]
async fn failing_subscriber_does_not_hold_back_others() {
    let transport = Arc::new(OneSubscriberDown::default());
    let (queue, receiver) = ChannelQueue::new();
    let _worker = DeliveryWorker::new(
        transport.clone(),
        WebhookConfig {
            max_attempts: 3,
            backoff_base_ms: 60_000,
        },
    )
    .spawn(receiver);

    let mut down = delivery();
    down.subscription_id = "down".to_string();
    let mut up = delivery();
    up.subscription_id = "up".to_string();
    queue.enqueue(down).expect("queued");
    queue.enqueue(up).expect("queued");

    tokio::time::timeout(Duration::from_secs(5), transport.arrived.notified())
        .await
        .expect("healthy subscriber served while the other backs off");
    assert_eq!(
        *transport.accepted.lock().expect("accepted mutex poisoned"),
        vec!["up".to_string()]
    );
}

#[tokio::test]
async fn deliveries_to_one_subscriber_keep_their_order() {
    let transport = Arc::new(ScriptedTransport::new(vec![
        Err(TransportError::Status(500)),
        Ok(()),
        Ok(()),
    ]));
    let (queue, receiver) = ChannelQueue::new();
    let handle = DeliveryWorker::new(transport.clone(), quick_policy(2)).spawn(receiver);

    let mut first = delivery();
    first.event = "lead.created".to_string();
    let mut second = delivery();
    second.event = "lead.email_confirmed".to_string();
    queue.enqueue(first).expect("queued");
    queue.enqueue(second).expect("queued");
    drop(queue);

    let stats = handle.await.expect("worker joins");
    assert_eq!(stats.delivered, 2);
    assert_eq!(stats.abandoned, 0);
    assert_eq!(
        transport.attempted(),
        vec!["lead.created", "lead.created", "lead.email_confirmed"]
    );
}
