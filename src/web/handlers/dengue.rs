//! Web handler for the dengue prediction service

use actix_web::{web, HttpResponse, Responder};
use log::error;
use serde_json::json;

use crate::core::component::ServiceError;
use crate::web::models::PredictionRequest;
use crate::web::server::AppState;

/// Answer a prediction request, training the heads first if needed
pub async fn predict(
    app_state: web::Data<AppState>,
    req: web::Json<PredictionRequest>,
) -> impl Responder {
    let mut dengue = app_state.dengue.write().await;

    if let Err(e) = dengue.ensure_trained() {
        error!("Dengue models could not be trained: {}", e);
        return HttpResponse::InternalServerError().json(json!({
            "success": false,
            "error": "prediction models could not be loaded, check the server log",
        }));
    }

    match dengue.predict(&req.prediction_type, &req.input_data) {
        Ok(prediction) => HttpResponse::Ok().json(json!({ "prediction": prediction })),
        Err(ServiceError::ValidationError(detail)) => {
            HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": detail,
            }))
        }
        Err(ServiceError::PredictionError(detail)) => {
            HttpResponse::BadRequest().json(json!({
                "success": false,
                "error": detail,
            }))
        }
        Err(e) => {
            error!("Prediction failed: {}", e);
            HttpResponse::InternalServerError().json(json!({
                "success": false,
                "error": format!("{}", e),
            }))
        }
    }
}
