use log::{error, info};
use std::sync::Arc;
use tokio::sync::RwLock;

mod core;
mod instances;
mod storage;
mod web;

use crate::core::component::ServiceComponent;
use crate::core::config::AppConfig;
use crate::instances::{DengueInstance, FacialAuthInstance};
use crate::storage::UserStore;
use crate::web::server::start_web_server;

#[tokio::main]
async fn main() {
    // Initialize logging
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));
    info!("Starting facial login and dengue prediction service...");

    let config = AppConfig::from_env();

    // Prepare the user database and the default admin record
    let store = UserStore::new(&config.database_path);
    if let Err(e) = store.init() {
        error!("Failed to initialize the user database: {}", e);
        return;
    }
    info!("User database ready at {}", config.database_path);

    // Initialize the service instances
    let facial = Arc::new(RwLock::new(FacialAuthInstance::new(
        store.clone(),
        config.match_threshold,
    )));
    let dengue = Arc::new(RwLock::new(DengueInstance::new(&config.dataset_path)));

    // Best-effort startup training: an empty user table or a missing
    // dataset only affects the requests that need the model, so failures
    // here are logged and the server still comes up.
    if let Err(e) = facial.write().await.initialize().await {
        error!("Facial authentication startup training failed: {}", e);
    }
    if let Err(e) = dengue.write().await.initialize().await {
        error!("Dengue startup training failed: {}", e);
    }

    // Start the web interface
    let bind_address = config.bind_address.clone();
    info!("Starting web interface on http://{}", bind_address);
    let web_server_handle = tokio::spawn(start_web_server(
        config,
        store,
        facial.clone(),
        dengue.clone(),
    ));

    // Run the service
    info!("Service is now running. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await.expect("Failed to listen for Ctrl+C");

    info!("Shutting down...");
    web_server_handle.abort();
    info!("Shutdown complete");
}
