use crate::cli::{DistributeArgs, ServeArgs};
use crate::infra::{
    demo_snapshot, lead_service, AppState, InMemoryStore, ReqwestTransport, StoreSnapshot,
};
use crate::routes::with_lead_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use leadflow::config::AppConfig;
use leadflow::error::AppError;
use leadflow::leads::{
    ChannelQueue, DeliveryWorker, LeadServiceError, RepositoryError, WebhookSubscription,
};
use leadflow::telemetry;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const SWEEP_BATCH: usize = 100;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry, config.environment)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let snapshot = match args.state.as_deref() {
        Some(path) => StoreSnapshot::read(path)?,
        None => demo_snapshot(),
    };
    let store = Arc::new(InMemoryStore::from_snapshot(snapshot));
    if let (Some(url), Some(secret)) = (args.webhook_url.take(), args.webhook_secret.take()) {
        store
            .add_webhook(WebhookSubscription {
                id: "cli".to_string(),
                url,
                events: vec!["*".to_string()],
                secret,
                is_active: true,
                form_id: None,
                call_center_id: None,
            })
            .map_err(repository_error)?;
    }

    let (queue, receiver) = ChannelQueue::new();
    DeliveryWorker::new(Arc::new(ReqwestTransport::default()), config.webhooks.clone())
        .spawn(receiver);
    let service = Arc::new(lead_service(store, queue, config.leads.clone()));

    if let Some(seconds) = args.sweep_interval_secs.filter(|seconds| *seconds > 0) {
        let sweeper = service.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_secs(seconds));
            loop {
                ticker.tick().await;
                match sweeper.distribute_unassigned(SWEEP_BATCH) {
                    Ok(report) if report.examined > 0 => {
                        info!(?report, "distribution sweep finished")
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %err, "distribution sweep failed"),
                }
            }
        });
    }

    let app = with_lead_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "lead distribution service ready");

    axum::serve(listener, app).await?;
    Ok(())
}

/// One batch sweep over a snapshot file, written back once webhooks are flushed.
pub(crate) async fn distribute(args: DistributeArgs) -> Result<(), AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment)?;

    let store = Arc::new(InMemoryStore::from_snapshot(StoreSnapshot::read(&args.state)?));
    let (queue, receiver) = ChannelQueue::new();
    let worker = DeliveryWorker::new(Arc::new(ReqwestTransport::default()), config.webhooks.clone())
        .spawn(receiver);

    let service = lead_service(store.clone(), queue, config.leads.clone());
    let report = service.distribute_unassigned(args.limit)?;
    drop(service);

    let stats = worker.await.map_err(|err| AppError::Io(std::io::Error::other(err)))?;
    store
        .snapshot()
        .map_err(repository_error)?
        .write(&args.state)?;

    info!(
        examined = report.examined,
        assigned = report.assigned,
        left_unassigned = report.left_unassigned,
        failed = report.failed,
        webhooks_delivered = stats.delivered,
        webhooks_abandoned = stats.abandoned,
        "distribution run complete"
    );
    println!(
        "Examined {} lead(s): {} assigned, {} still waiting, {} failed.",
        report.examined, report.assigned, report.left_unassigned, report.failed
    );
    Ok(())
}

fn repository_error(err: RepositoryError) -> AppError {
    AppError::Leads(LeadServiceError::Repository(err))
}
