//! Service instances for the login and prediction backends
//!
//! This module contains the model-owning instances: the facial
//! authentication matcher and the dengue prediction heads.

pub mod classifier;
pub mod dengue;
pub mod embedding;
pub mod facial_auth;

// Re-export instances for convenience
pub use dengue::DengueInstance;
pub use facial_auth::FacialAuthInstance;
