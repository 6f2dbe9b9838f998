//! Application startup and lifecycle management.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{get, post, put},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::config::InstallmentConfig;
use crate::handlers::{installments, outstanding};
use crate::services::{
    get_metrics, init_metrics, AccountLocks, Database, LedgerService, LedgerStore,
    OutstandingAggregator, RecoveryCoordinator,
};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: InstallmentConfig,
    pub store: Arc<dyn LedgerStore>,
    pub ledger: Arc<LedgerService>,
    pub aggregator: Arc<OutstandingAggregator>,
    pub coordinator: Arc<RecoveryCoordinator>,
}

impl AppState {
    /// Keep the outstanding view consistent after a single ledger mutation.
    /// Best-effort: the posting is already durable, a failed refresh only
    /// delays the snapshot until the next batch run.
    pub async fn refresh_after_mutation(&self, account_id: uuid::Uuid) {
        if let Err(e) = self.aggregator.refresh_one(account_id).await {
            warn!(account_id = %account_id, error = %e, "Post-mutation snapshot refresh failed");
        }
    }
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "installment-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - store unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "installment-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.ping().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application against Postgres, running migrations.
    pub async fn build(config: InstallmentConfig) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        db.run_migrations().await.map_err(|e| {
            tracing::error!(error = %e, "Failed to run migrations");
            e
        })?;

        Self::build_with_store(config, Arc::new(db)).await
    }

    /// Build the application against an already-constructed store. Used by
    /// the test suites with `MemoryStore`.
    pub async fn build_with_store(
        config: InstallmentConfig,
        store: Arc<dyn LedgerStore>,
    ) -> Result<Self, AppError> {
        init_metrics();

        let locks = Arc::new(AccountLocks::new());
        let ledger = Arc::new(LedgerService::new(
            store.clone(),
            config.fine_policy,
            locks.clone(),
        ));
        let aggregator = Arc::new(OutstandingAggregator::new(
            store.clone(),
            locks.clone(),
            config.aggregator.refresh_concurrency,
        ));
        let coordinator = Arc::new(RecoveryCoordinator::new(store.clone(), locks));

        let state = AppState {
            config: config.clone(),
            store,
            ledger,
            aggregator,
            coordinator,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "Installment service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a handle to the shared state (ledger, aggregator, coordinator).
    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = Router::new()
            .route("/health", get(health_check))
            .route("/ready", get(readiness_check))
            .route("/metrics", get(metrics_handler))
            .route(
                "/accounts/:account_id/installments",
                post(installments::post_installment).get(installments::get_chain),
            )
            .route(
                "/installments/:id",
                put(installments::update_installment).delete(installments::delete_installment),
            )
            .route(
                "/accounts/:account_id/outstanding",
                get(outstanding::get_outstanding),
            )
            .route(
                "/accounts/:account_id/outstanding/refresh",
                post(outstanding::refresh_one),
            )
            .route(
                "/accounts/:account_id/outstanding/clear",
                post(outstanding::clear_outstanding),
            )
            .route("/outstanding/refresh", post(outstanding::refresh_all))
            .route("/outstanding/assign", post(outstanding::assign_officer))
            .layer(TraceLayer::new_for_http())
            .layer(middleware::from_fn(metrics_middleware))
            .layer(middleware::from_fn(request_id_middleware))
            .with_state(self.state);

        tracing::info!(
            service = "installment-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
