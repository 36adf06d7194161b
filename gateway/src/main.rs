//! paygate-watcher: headless watcher daemon.
//!
//! Runs the chain watcher (ZMQ push path + scheduled pull path) against
//! the configured database without the HTTP surface; pair it with the
//! paygate-api binary, or embed the library instead.

use std::sync::Arc;

use paygate::infrastructure::persistence::DbPool;
use paygate::utils::logging;
use paygate::{AppConfig, NoopEvents, PaymentService};
use paygate_migration::{Migrator, MigratorTrait};

#[tokio::main]
async fn main() {
    logging::init_logger();

    let config = AppConfig::from_env();

    let db_pool = match DbPool::new(&config).await {
        Ok(pool) => pool,
        Err(e) => {
            logging::log_error(&format!("Failed to connect to database: {}", e));
            return;
        }
    };

    if let Err(e) = Migrator::up(db_pool.get_connection(), None).await {
        logging::log_error(&format!("Migration failed: {}", e));
        return;
    }

    let service = match PaymentService::new(config, &db_pool, Arc::new(NoopEvents)).await {
        Ok(service) => service,
        Err(e) => {
            logging::log_error(&format!("Failed to initialize gateway: {}", e));
            return;
        }
    };

    if let Err(e) = service.start_watcher().await {
        logging::log_error(&format!("Failed to start watcher: {}", e));
        return;
    }
    logging::log_info("paygate watcher running; Ctrl+C to stop");

    tokio::signal::ctrl_c()
        .await
        .expect("Failed to listen for Ctrl+C");

    logging::log_info("Shutting down...");
    service.stop_watcher().await;
}
