//! HTTP trigger and observability surface for the saga system.
//!
//! Exposes the trigger boundary (`POST /sagas`), read-only status and step
//! log queries, and an abort endpoint, with structured logging (tracing)
//! and Prometheus metrics — plus the wiring that assembles the channel,
//! store, registry, coordinator loop, and purchase worker pools into one
//! runtime with an explicit init/shutdown lifecycle.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use domain::DefinitionRegistry;
use metrics_exporter_prometheus::PrometheusHandle;
use purchase::PurchaseServices;
use result_store::{InMemoryResultStore, ResultStore};
use saga::{CoordinatorConfig, SagaCoordinator};
use task_channel::{ChannelConfig, InMemoryTaskChannel, TaskChannel};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use worker::{WorkerConfig, WorkerSet, WorkerSetHandle};

use config::Config;
use routes::sagas::AppState;

/// The default wiring: in-memory channel and store.
pub type DefaultAppState = AppState<InMemoryResultStore, InMemoryTaskChannel>;

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S, C>(state: Arc<AppState<S, C>>, metrics_handle: PrometheusHandle) -> Router
where
    S: ResultStore + 'static,
    C: TaskChannel + 'static,
{
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/sagas", post(routes::sagas::start::<S, C>))
        .route("/sagas/{id}", get(routes::sagas::get::<S, C>))
        .route("/sagas/{id}/steps", get(routes::sagas::steps::<S, C>))
        .route("/sagas/{id}/abort", post(routes::sagas::abort::<S, C>))
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

/// A started saga runtime: coordinator loop plus worker pools.
///
/// Everything the process needs is owned here explicitly — no ambient
/// singletons — and [`shutdown`](SagaRuntime::shutdown) tears it down in
/// order: workers first, then the coordinator loop.
pub struct SagaRuntime {
    pub services: PurchaseServices,
    shutdown: watch::Sender<bool>,
    workers: WorkerSetHandle,
    coordinator_task: JoinHandle<()>,
}

impl SagaRuntime {
    /// Stops the worker pools and the coordinator loop gracefully.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        self.workers.shutdown().await;
        let _ = self.coordinator_task.await;
        tracing::info!("saga runtime stopped");
    }
}

/// Assembles the default in-memory runtime: channel, store, the purchase
/// definition, seeded service datastores, worker pools, and the
/// coordinator's run loop.
pub async fn start_default_runtime(config: &Config) -> (Arc<DefaultAppState>, SagaRuntime) {
    let channel = InMemoryTaskChannel::new(ChannelConfig {
        lease: Duration::from_millis(config.lease_ms),
        max_deliveries: config.max_deliveries,
    });
    let store = InMemoryResultStore::new();

    let mut registry = DefinitionRegistry::new();
    registry.register(purchase::definition());

    let coordinator = Arc::new(SagaCoordinator::new(
        store,
        channel.clone(),
        Arc::new(registry),
        CoordinatorConfig {
            max_compensation_attempts: config.max_compensation_attempts,
            lease: Duration::from_millis(config.lease_ms),
            ..CoordinatorConfig::default()
        },
    ));

    // Replay anything a previous incarnation left unacknowledged.
    match coordinator.recover().await {
        Ok(0) => {}
        Ok(count) => tracing::info!(count, "recovered unacknowledged tasks"),
        Err(error) => tracing::error!(%error, "recovery failed"),
    }

    let services = PurchaseServices::new();
    purchase::seed_demo_data(&services);

    let worker_config = WorkerConfig {
        poll_interval: Duration::from_millis(config.poll_interval_ms),
        concurrency: config.worker_concurrency,
        ..WorkerConfig::default()
    };
    let mut set = WorkerSet::new();
    purchase::register_workers(&mut set, &services, worker_config);
    let workers = set.start(channel.clone());

    let (shutdown, shutdown_rx) = watch::channel(false);
    let loop_coordinator = Arc::clone(&coordinator);
    let coordinator_task = tokio::spawn(async move { loop_coordinator.run(shutdown_rx).await });

    let state = Arc::new(AppState { coordinator });
    let runtime = SagaRuntime {
        services,
        shutdown,
        workers,
        coordinator_task,
    };
    (state, runtime)
}
