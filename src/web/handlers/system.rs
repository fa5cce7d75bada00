//! Root and status handlers

use actix_web::{web, HttpResponse, Responder};
use serde_json::json;

use crate::core::component::ServiceComponent;
use crate::web::server::AppState;

/// Service banner
pub async fn index() -> impl Responder {
    HttpResponse::Ok().json(json!({
        "message": "Facial authentication and dengue prediction service"
    }))
}

/// Report the status of every registered service component
pub async fn get_status(app_state: web::Data<AppState>) -> impl Responder {
    let mut components = Vec::new();
    for component in &app_state.components {
        let instance = component.read().await;
        components.push(json!({
            "id": instance.id(),
            "component_type": instance.component_type(),
            "status": format!("{}", instance.status()),
            "info": instance.get_info(),
        }));
    }

    HttpResponse::Ok().json(json!({
        "success": true,
        "components": components,
    }))
}
