use axum::{
    extract::FromRef,
    routing::{delete, get, patch, post},
    Router,
};
use std::{net::SocketAddr, sync::Arc};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use cachet_server::{
    clients::{IpfsClient, IpfsConfig, HttpIndex, IndexConfig, LedgerConfig, LedgerGateway},
    db::{self, DbPool},
    handlers, health,
    jobs::{self, AnchorQueue, AnchorWorkerConfig, SweepConfig},
    metrics,
    pipeline::AnchorPipeline,
    realtime::{self, EventBus, SharedEventBus},
    store::PgStore,
    SharedBlobStore, SharedIndex, SharedLedger, SharedStore,
};

#[derive(Clone, FromRef)]
struct AppState {
    db_pool: DbPool,
    store: SharedStore,
    blobs: SharedBlobStore,
    ledger: SharedLedger,
    index: SharedIndex,
    event_bus: SharedEventBus,
    anchor_queue: AnchorQueue,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cachet_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    tracing::info!("Starting Cachet server");

    let metrics_recorder = metrics::MetricsRecorder::new();
    let metrics_handle = metrics_recorder.handle().clone();

    let db_pool = db::init_db_default().await?;
    tracing::info!("Database initialized");

    // External store clients; each a trait object so the pipeline and jobs
    // stay decoupled from the transports.
    let store: SharedStore = Arc::new(PgStore::new(db_pool.clone()));
    let blobs: SharedBlobStore = Arc::new(IpfsClient::new(IpfsConfig::default())?);
    let ledger: SharedLedger = Arc::new(LedgerGateway::new(LedgerConfig::default())?);
    let index: SharedIndex = Arc::new(HttpIndex::new(IndexConfig::default())?);

    let event_buffer = std::env::var("EVENT_BUFFER_SIZE")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(1024);
    let event_bus: SharedEventBus = Arc::new(EventBus::new(event_buffer));

    let queue_capacity = std::env::var("ANCHOR_QUEUE_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(4096);
    let (anchor_queue, anchor_rx) = AnchorQueue::new(queue_capacity);

    let pipeline = Arc::new(AnchorPipeline::new(
        store.clone(),
        blobs.clone(),
        ledger.clone(),
        index.clone(),
        event_bus.clone(),
    ));

    tokio::spawn(jobs::run_anchor_worker(
        pipeline,
        anchor_rx,
        AnchorWorkerConfig::default(),
    ));
    tracing::info!("Anchor worker started");

    tokio::spawn(jobs::run_expiry_sweep_worker(
        store.clone(),
        blobs.clone(),
        ledger.clone(),
        index.clone(),
        SweepConfig::default(),
    ));
    tracing::info!("Expiry sweep worker started");

    let app_state = AppState {
        db_pool,
        store,
        blobs,
        ledger,
        index,
        event_bus,
        anchor_queue,
    };

    let metrics_router = Router::new()
        .route("/metrics", get(metrics::metrics_handler))
        .with_state(metrics_handle);

    let app = Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/api/v1/messages", post(handlers::create_message))
        .route("/api/v1/messages", get(handlers::list_messages))
        .route("/api/v1/messages/unread", get(handlers::unread_messages))
        .route("/api/v1/messages/{id}", get(handlers::get_message))
        .route("/api/v1/messages/{id}", patch(handlers::update_message))
        .route("/api/v1/messages/{id}", delete(handlers::destroy_message))
        .route(
            "/api/v1/messages/{id}/content",
            get(handlers::get_message_content),
        )
        .route("/api/v1/messages/{id}/read", post(handlers::mark_read))
        .route(
            "/api/v1/messages/{id}/revoke",
            post(handlers::revoke_message),
        )
        .route("/api/v1/events", get(realtime::subscribe_events))
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let port = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(8080);
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
