use crate::cli::ServeArgs;
use crate::infra::{
    AppState, InMemoryOnboardingStore, LogNotifier, SandboxIdentityProvider, SandboxPaymentGateway,
};
use crate::routes::with_onboarding_routes;
use axum::Extension;
use axum_prometheus::PrometheusMetricLayer;
use carmelmart::config::AppConfig;
use carmelmart::error::AppError;
use carmelmart::telemetry;
use carmelmart::workflows::onboarding::{OnboardingConfig, OnboardingService};
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

    let mut onboarding_config = OnboardingConfig::new(config.payments.webhook_secret.clone());
    onboarding_config.currency = config.payments.currency.clone();
    let onboarding_service = Arc::new(OnboardingService::new(
        Arc::new(InMemoryOnboardingStore::default()),
        Arc::new(SandboxIdentityProvider::default()),
        Arc::new(SandboxPaymentGateway::default()),
        Arc::new(LogNotifier),
        onboarding_config,
    ));

    let app = with_onboarding_routes(onboarding_service)
        .layer(Extension(app_state))
        .layer(prometheus_layer);

    let addr = config.server.socket_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    readiness_flag.store(true, Ordering::Release);

    info!(?config.environment, %addr, "vendor onboarding service ready");

    axum::serve(listener, app).await?;
    Ok(())
}
