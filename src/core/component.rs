use std::error::Error;
use std::fmt::{Debug, Display};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Represents the current status of a service component
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum ServiceStatus {
    /// Component is constructed but has no usable model yet
    Initialized,
    /// Component has a trained model and can answer requests
    Ready,
    /// Component has encountered an error
    Error(String),
}

impl Display for ServiceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceStatus::Initialized => write!(f, "Initialized"),
            ServiceStatus::Ready => write!(f, "Ready"),
            ServiceStatus::Error(err) => write!(f, "Error: {}", err),
        }
    }
}

/// Error type for service operations
#[derive(Debug)]
pub enum ServiceError {
    /// Request payload failed validation
    ValidationError(String),
    /// Error reading from or writing to the user store
    StorageError(String),
    /// Error while fitting a model
    TrainingError(String),
    /// Error while answering a prediction request
    PredictionError(String),
    /// Component has no trained model to answer with
    NotInitialized(String),
}

impl Display for ServiceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ServiceError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            ServiceError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            ServiceError::TrainingError(msg) => write!(f, "Training error: {}", msg),
            ServiceError::PredictionError(msg) => write!(f, "Prediction error: {}", msg),
            ServiceError::NotInitialized(msg) => write!(f, "Not initialized: {}", msg),
        }
    }
}

impl Error for ServiceError {}

impl From<rusqlite::Error> for ServiceError {
    fn from(err: rusqlite::Error) -> Self {
        ServiceError::StorageError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::StorageError(err.to_string())
    }
}

/// Core trait for the model-owning service components
#[async_trait]
pub trait ServiceComponent: Send + Sync + Debug {
    /// Returns the component identifier
    fn id(&self) -> &str;

    /// Returns the component type name
    fn component_type(&self) -> &str;

    /// Returns the current status of the component
    fn status(&self) -> ServiceStatus;

    /// Load data and train the component's model at startup.
    ///
    /// A component that has nothing to train yet (no enrolled users, no
    /// dataset on disk) reports the reason and stays in `Initialized`.
    async fn initialize(&mut self) -> Result<(), ServiceError>;

    /// Get component-specific information
    fn get_info(&self) -> serde_json::Value;
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test status display formatting
    #[test]
    fn test_status_display() {
        assert_eq!(format!("{}", ServiceStatus::Ready), "Ready");
        assert_eq!(
            format!("{}", ServiceStatus::Error("boom".to_string())),
            "Error: boom"
        );
    }

    // Test error display formatting
    #[test]
    fn test_error_display() {
        let err = ServiceError::ValidationError("bad embedding".to_string());
        assert_eq!(format!("{}", err), "Validation error: bad embedding");
    }
}
