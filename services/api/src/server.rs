use crate::cli::ServeArgs;
use crate::infra::{seed_store, AppState, LoggingNotificationDispatcher};
use crate::routes::with_workflow_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use dj_desk::config::AppConfig;
use dj_desk::error::AppError;
use dj_desk::telemetry;
use dj_desk::workflows::{DesignJobService, InMemoryWorkflowStore, WorkflowError};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::info;

pub(crate) async fn run(mut args: ServeArgs) -> Result<(), AppError> {
    let mut config = AppConfig::load()?;

    if let Some(host) = args.host.take() {
        config.server.host = host;
    }
    if let Some(port) = args.port.take() {
        config.server.port = port;
    }

    telemetry::init(&config.telemetry)?;

    let (prometheus_layer, prometheus_handle) = PrometheusMetricLayer::pair();
    let readiness_flag = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let app_state = AppState {
        readiness: readiness_flag.clone(),
        metrics: Arc::new(prometheus_handle),
    };

    let store = Arc::new(InMemoryWorkflowStore::default());
    seed_store(&store, &args.admins, &args.holidays).map_err(WorkflowError::from)?;
    let service = Arc::new(DesignJobService::new(
        store,
        Arc::new(LoggingNotificationDispatcher),
        config.scheduling,
    ));

    let app = with_workflow_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(
        ?config.environment,
        %addr,
        urgent_shift_days = config.scheduling.urgent_shift_days,
        default_sla_days = config.scheduling.default_sla_days,
        "design job desk ready"
    );

    axum::serve(listener, app).await?;
    Ok(())
}
