use serde::{Deserialize, Serialize};

use crate::instances::embedding::EMBEDDING_DIM;

/// Largest absolute value a raw embedding component may carry
const COMPONENT_RANGE: f32 = 100.0;

/// Longest accepted user name
const MAX_NAME_LENGTH: usize = 100;

/// Registration request
#[derive(Deserialize)]
pub struct RegisterRequest {
    #[serde(rename = "nombre")]
    pub name: String,
    pub embedding: Vec<f32>,
}

/// First-time admin setup request
#[derive(Deserialize)]
pub struct AdminSetupRequest {
    pub embedding: Vec<f32>,
}

/// Login request
#[derive(Deserialize)]
pub struct LoginRequest {
    pub embedding: Vec<f32>,
}

/// Login response: a fresh session token and the matched user
#[derive(Serialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(rename = "nombre")]
    pub name: String,
}

/// Registrations on one calendar day
#[derive(Serialize)]
pub struct UserMetrics {
    pub date: String,
    pub count: i64,
}

/// Metrics response for the dashboard
#[derive(Serialize)]
pub struct MetricsResponse {
    pub accuracy: f32,
    pub users_by_day: Vec<UserMetrics>,
}

/// Dengue prediction request
#[derive(Deserialize)]
pub struct PredictionRequest {
    pub prediction_type: String,
    pub input_data: serde_json::Map<String, serde_json::Value>,
}

/// Generic response
#[derive(Serialize)]
pub struct GenericResponse {
    pub success: bool,
    pub message: String,
}

/// Validate a raw request embedding: exactly [`EMBEDDING_DIM`] elements,
/// all finite and inside the accepted component range.
pub fn validate_embedding(values: &[f32]) -> Result<(), String> {
    if values.len() != EMBEDDING_DIM {
        return Err(format!(
            "embedding must have exactly {} elements, got {}",
            EMBEDDING_DIM,
            values.len()
        ));
    }

    for (i, value) in values.iter().enumerate() {
        if !value.is_finite() {
            return Err(format!("embedding element {} is not a finite number", i));
        }
        if value.abs() > COMPONENT_RANGE {
            return Err(format!("embedding element {} is outside the valid range", i));
        }
    }
    Ok(())
}

/// Validate a user name: non-empty, at most [`MAX_NAME_LENGTH`] characters
pub fn validate_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("name must not be empty".to_string());
    }
    if name.chars().count() > MAX_NAME_LENGTH {
        return Err(format!("name must be at most {} characters", MAX_NAME_LENGTH));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test embedding validation catches length, range and NaN issues
    #[test]
    fn test_validate_embedding() {
        assert!(validate_embedding(&[0.5; EMBEDDING_DIM]).is_ok());
        assert!(validate_embedding(&[0.5; 64]).is_err());

        let mut out_of_range = [0.5; EMBEDDING_DIM];
        out_of_range[9] = 250.0;
        assert!(validate_embedding(&out_of_range).is_err());

        let mut with_nan = [0.5; EMBEDDING_DIM];
        with_nan[0] = f32::NAN;
        assert!(validate_embedding(&with_nan).is_err());
    }

    // Test name validation bounds
    #[test]
    fn test_validate_name() {
        assert!(validate_name("ana").is_ok());
        assert!(validate_name("").is_err());
        assert!(validate_name(&"x".repeat(101)).is_err());
    }
}
