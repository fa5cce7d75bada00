use std::sync::Arc;

use actix_cors::Cors;
use actix_web::{middleware, web, App, HttpServer};
use log::info;
use tokio::sync::RwLock;

use crate::core::component::ServiceComponent;
use crate::core::config::AppConfig;
use crate::instances::{DengueInstance, FacialAuthInstance};
use crate::storage::UserStore;
use crate::web::handlers;

/// Start the web server for both services
pub async fn start_web_server(
    config: AppConfig,
    store: UserStore,
    facial: Arc<RwLock<FacialAuthInstance>>,
    dengue: Arc<RwLock<DengueInstance>>,
) -> std::io::Result<()> {
    info!("Starting web server on http://{}", config.bind_address);

    // The status endpoint walks the instances through the component trait
    let facial_component: Arc<RwLock<dyn ServiceComponent>> = facial.clone();
    let dengue_component: Arc<RwLock<dyn ServiceComponent>> = dengue.clone();

    // Create shared application state
    let app_state = web::Data::new(AppState {
        store,
        facial,
        dengue,
        components: vec![facial_component, dengue_component],
    });

    let allowed_origin = config.allowed_origin.clone();
    let server = HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&allowed_origin)
            .allowed_methods(vec!["GET", "POST"])
            .allow_any_header()
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(middleware::Logger::default())
            .wrap(cors)
            .app_data(app_state.clone())
            // Facial login APIs
            .route("/setup-admin", web::post().to(handlers::auth::setup_admin))
            .route("/login", web::post().to(handlers::auth::login))
            .route("/register", web::post().to(handlers::auth::register))
            .route("/check-admin", web::get().to(handlers::auth::check_admin))
            .route("/metrics", web::get().to(handlers::auth::get_metrics))
            // Dengue prediction API
            .route("/dengue/predict", web::post().to(handlers::dengue::predict))
            // System APIs
            .route("/", web::get().to(handlers::system::index))
            .route("/status", web::get().to(handlers::system::get_status))
    })
    .bind(&config.bind_address)?
    .run();

    server.await
}

/// Shared application state for web handlers
pub struct AppState {
    pub store: UserStore,
    pub facial: Arc<RwLock<FacialAuthInstance>>,
    pub dengue: Arc<RwLock<DengueInstance>>,
    pub components: Vec<Arc<RwLock<dyn ServiceComponent>>>,
}
