//! HTTP API server with observability for the marketplace booking core.
//!
//! Provides REST endpoints for offer acceptance, payment settlement and
//! booking lookup, with structured logging (tracing) and Prometheus metrics.
//! A background task sweeps bookings whose payment deadline has passed.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use metrics_exporter_prometheus::PrometheusHandle;
use saga::{
    AcceptanceSaga, ExpirySweeper, FailureCompensator, GatewayError, GatewayFactory, Notifier,
    PaymentConfirmation, PaymentRetry, SagaSettings,
};
use store::Store;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state.
pub struct AppState<S: Store> {
    pub store: S,
    pub acceptance: AcceptanceSaga<S>,
    pub confirmation: PaymentConfirmation<S>,
    pub retry: PaymentRetry<S>,
    pub sweeper: Arc<ExpirySweeper<S>>,
    pub webhook_secret: Vec<u8>,
}

impl<S: Store + Clone> AppState<S> {
    /// Wires every workflow to one store and one compensator.
    pub fn new(
        store: S,
        gateways: GatewayFactory,
        notifier: Arc<dyn Notifier>,
        settings: SagaSettings,
        webhook_secret: impl Into<Vec<u8>>,
    ) -> Self {
        let compensator = Arc::new(FailureCompensator::new(store.clone(), notifier.clone()));

        Self {
            acceptance: AcceptanceSaga::new(
                store.clone(),
                gateways.clone(),
                notifier.clone(),
                settings.clone(),
            ),
            confirmation: PaymentConfirmation::with_compensator(
                store.clone(),
                gateways.clone(),
                compensator.clone(),
                notifier,
                settings.clone(),
            ),
            retry: PaymentRetry::new(store.clone(), gateways, settings.clone()),
            sweeper: Arc::new(ExpirySweeper::with_compensator(
                store.clone(),
                compensator,
                &settings,
            )),
            store,
            webhook_secret: webhook_secret.into(),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check::<S>))
        .route("/offers/{id}/accept", post(routes::offers::accept::<S>))
        .route("/bookings/{id}", get(routes::bookings::get::<S>))
        .route(
            "/bookings/{id}/retry-payment",
            post(routes::bookings::retry_payment::<S>),
        )
        .route("/payments/webhook", post(routes::payments::webhook::<S>))
        .route(
            "/payments/{transaction_id}/verify",
            post(routes::payments::verify::<S>),
        )
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates the application state with the standard payment gateways.
pub fn create_default_state<S: Store + Clone + 'static>(
    store: S,
    config: &Config,
    notifier: Arc<dyn Notifier>,
) -> Result<Arc<AppState<S>>, GatewayError> {
    let gateways = GatewayFactory::standard(config.gateway_config())?;
    tracing::info!(methods = ?gateways.methods(), "payment gateways registered");

    Ok(Arc::new(AppState::new(
        store,
        gateways,
        notifier,
        config.saga_settings(),
        config.webhook_secret.clone(),
    )))
}

/// Runs the expiry sweeper every `interval` until the task is aborted.
pub fn spawn_sweeper<S: Store + Clone + 'static>(
    sweeper: Arc<ExpirySweeper<S>>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            ticker.tick().await;
            match sweeper.run_once().await {
                Ok(report) => {
                    if report.scanned > 0 || report.requests_expired > 0 {
                        tracing::info!(
                            scanned = report.scanned,
                            compensated = report.compensated,
                            skipped = report.skipped,
                            failed = report.failed,
                            requests_expired = report.requests_expired,
                            "expiry sweep finished"
                        );
                    }
                }
                Err(e) => tracing::error!(error = %e, "expiry sweep failed"),
            }
        }
    })
}
