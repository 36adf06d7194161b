// paygate API server entry point: HTTP surface + in-process chain watcher

mod config;
mod error;
mod handlers;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post, Router};
use http::{header, Method};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use paygate::infrastructure::persistence::DbPool;
use paygate::{AppConfig, NoopEvents, PaymentService};
use paygate_migration::{Migrator, MigratorTrait};

use config::ServerConfig;
use handlers::{
    create_intent, get_intent, health_check, intent_status, issue_magic_link, redeem_magic_link,
    scan_intent, AppState,
};

fn load_env() {
    dotenv::dotenv().ok();
}

#[tokio::main]
async fn main() {
    load_env();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env();
    let server_config = ServerConfig::from_env();
    tracing::info!("Configuration loaded");

    let db_pool = DbPool::new(&config)
        .await
        .expect("Failed to connect to database");
    Migrator::up(db_pool.get_connection(), None)
        .await
        .expect("Failed to run migrations");
    tracing::info!("Database ready");

    let base_path = config.pay.base_path.clone();
    let service = Arc::new(
        PaymentService::new(config, &db_pool, Arc::new(NoopEvents))
            .await
            .expect("Failed to initialize payment gateway"),
    );

    service
        .start_watcher()
        .await
        .expect("Failed to start chain watcher");
    tracing::info!("Chain watcher started");

    let app_state = AppState {
        service: service.clone(),
    };

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT, header::ORIGIN])
        .max_age(Duration::from_secs(3600));

    let pay_routes = Router::new()
        .route("/intents", post(create_intent))
        .route("/intents/{id}", get(get_intent))
        .route("/intents/{id}/magic-link", post(issue_magic_link))
        .route("/pay/{token}", get(redeem_magic_link))
        .route("/status", get(intent_status))
        .route("/scan/{intent_id}", post(scan_intent))
        .route("/health", get(health_check));

    let app = Router::new()
        .nest(&base_path, pay_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(app_state);

    let addr: SocketAddr = server_config
        .server_addr()
        .parse()
        .expect("Invalid address");

    tracing::info!("Starting server on {} (base path {})", addr, base_path);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("Failed to bind to address");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Shutting down watcher...");
    service.stop_watcher().await;
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");
}
