use crate::infra::{
    demo_snapshot, lead_service, ConsoleTransport, InMemoryStore, DEMO_CALL_CENTER, DEMO_FORM,
};
use clap::Args;
use leadflow::config::{AppConfig, WebhookConfig};
use leadflow::error::AppError;
use leadflow::leads::{
    CallCenterId, ChannelQueue, DeliveryWorker, FormId, Lead, LeadRepository,
    LeadServiceError, LeadStatus, LeadSubmission, WebhookSubscription,
};
use std::sync::Arc;

#[derive(Args, Debug)]
pub(crate) struct DemoArgs {
    /// Confirmed leads left waiting before the batch sweep runs
    #[arg(long, default_value_t = 4)]
    pub(crate) backlog: usize,
    /// Print every webhook delivery as it would be sent
    #[arg(long)]
    pub(crate) show_webhooks: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;

    let mut snapshot = demo_snapshot();
    if args.show_webhooks {
        snapshot.webhooks.push(WebhookSubscription {
            id: "demo-console".to_string(),
            url: "https://crm.example.com/hooks/leads".to_string(),
            events: vec!["*".to_string()],
            secret: "demo-secret".to_string(),
            is_active: true,
            form_id: None,
            call_center_id: None,
        });
    }
    let store = Arc::new(InMemoryStore::from_snapshot(snapshot));

    let (queue, receiver) = ChannelQueue::new();
    let worker = DeliveryWorker::new(
        Arc::new(ConsoleTransport),
        WebhookConfig {
            max_attempts: 1,
            ..config.webhooks.clone()
        },
    )
    .spawn(receiver);
    let service = lead_service(store.clone(), queue, config.leads.clone());

    println!("== Capture ==");
    let lead = service.submit(LeadSubmission {
        form_id: FormId(DEMO_FORM.to_string()),
        email: "  Lea.Martin@Example.com ".to_string(),
        first_name: "Léa".to_string(),
        last_name: "Martin".to_string(),
        phone: Some("+33 6 45 12 98 30".to_string()),
    })?;
    print_lead(&lead);

    println!("\n== Email confirmation ==");
    let token = lead
        .confirmation_token
        .clone()
        .ok_or(LeadServiceError::UnknownToken)?;
    let lead = service.confirm_email(&token)?;
    print_lead(&lead);

    let holder = lead
        .assigned_to
        .clone()
        .ok_or_else(|| LeadServiceError::NotAssigned(lead.id.clone()))?;

    println!("\n== Agent {holder} goes off shift ==");
    let report = service.deactivate_agent(&holder)?;
    println!(
        "Reassignment {:?}: {} examined, {} moved, {} unassigned, {} failed",
        report.status, report.examined, report.reassigned, report.unassigned, report.failed
    );
    let lead = service.get(&lead.id)?;
    print_lead(&lead);

    println!("\n== Call outcome ==");
    let current = lead
        .assigned_to
        .clone()
        .ok_or_else(|| LeadServiceError::NotAssigned(lead.id.clone()))?;
    let lead = service.record_call_outcome(&lead.id, LeadStatus::CallbackPending, Some(&current))?;
    print_lead(&lead);

    println!("\n== Back on shift, batch sweep over {} waiting lead(s) ==", args.backlog);
    service.activate_agent(&holder)?;
    for index in 0..args.backlog {
        store
            .insert(crate::infra::waiting_lead(index))
            .map_err(LeadServiceError::from)?;
    }
    let batch = service.distribute_unassigned(args.backlog.max(1))?;
    println!(
        "Batch: {} examined, {} assigned, {} left waiting, {} failed",
        batch.examined, batch.assigned, batch.left_unassigned, batch.failed
    );
    for agent in store.agents().map_err(LeadServiceError::from)? {
        print_agent_load(&agent.id.0, &agent.name, agent.assignment_count, agent.is_active);
    }

    println!("\n== Call center statistics ==");
    let statistics = service.statistics(&CallCenterId(DEMO_CALL_CENTER.to_string()))?;
    println!(
        "{} lead(s), {} assigned, {} unassigned, conversion {:.1}%",
        statistics.total,
        statistics.assigned,
        statistics.unassigned,
        statistics.conversion_rate * 100.0
    );
    for (status, count) in &statistics.by_status {
        println!("  {status:<18} {count}");
    }

    drop(service);
    let stats = worker
        .await
        .map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    if args.show_webhooks {
        println!("\n{} webhook delivery(ies) printed.", stats.delivered);
    }

    Ok(())
}

fn print_lead(lead: &Lead) {
    let assignee = lead
        .assigned_to
        .as_ref()
        .map(|agent| agent.to_string())
        .unwrap_or_else(|| "-".to_string());
    println!(
        "Lead {} <{}>: status={} score={} ({}) agent={}",
        lead.id,
        lead.email,
        lead.status.label(),
        lead.score,
        lead.score_tier.label(),
        assignee
    );
}

fn print_agent_load(id: &str, name: &str, assignments: u64, active: bool) {
    let marker = if active { "" } else { " (inactive)" };
    println!("  {name:<16} {id:<14} {assignments} assignment(s){marker}");
}
