use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryEventStore, InMemoryPaymentStore, InMemoryRequestRepository,
    QueueNotificationDispatcher, TracingTransport,
};
use crate::routes::with_shortlist_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use shortlist::config::AppConfig;
use shortlist::engagements::shortlist::ShortlistService;
use shortlist::error::AppError;
use shortlist::telemetry;
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

    let requests = Arc::new(InMemoryRequestRepository::default());
    let payments = Arc::new(InMemoryPaymentStore::default());
    let events = Arc::new(InMemoryEventStore::default());
    let dispatcher = Arc::new(QueueNotificationDispatcher::spawn(
        &config.notifications,
        Arc::new(TracingTransport),
    ));
    let service = Arc::new(ShortlistService::new(requests, payments, events, dispatcher));

    let app = with_shortlist_routes(service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "shortlist broker ready");

    axum::serve(listener, app).await?;
    Ok(())
}
