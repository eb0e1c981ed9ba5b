use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use realtime_api::config::Config;
use realtime_api::notify::webhook::WebhookNotifier;
use realtime_api::notify::{LogNotifier, NotificationDispatcher};
use realtime_api::store::memory::MemoryStore;
use realtime_api::store::postgres::PgStore;
use realtime_api::store::Stores;
use realtime_api::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine; variables may come from the environment.
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;

    if config.jwt_secret.is_none() {
        tracing::error!("JWT_SECRET is not set; every socket handshake will be rejected");
    }

    let stores = match config.database_url.as_deref() {
        Some(url) => Stores::postgres(PgStore::new(realtime_api::db::pool::connect(url)?)),
        None => {
            tracing::warn!("DATABASE_URL is not set; using the in-memory store");
            Stores::memory(Arc::new(MemoryStore::new()))
        }
    };

    let notifier: Arc<dyn NotificationDispatcher> = match config.notify_webhook_url.as_deref() {
        Some(url) => Arc::new(WebhookNotifier::new(url)),
        None => Arc::new(LogNotifier),
    };

    tracing::info!(
        history_limit = config.history_limit,
        outbound_buffer = config.outbound_buffer,
        "realtime-api configured"
    );

    let state = AppState::new(config, stores, notifier);

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(realtime_api::routes::router())
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "realtime-api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(?e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
