use std::env;
use std::fmt::Display;
use std::str::FromStr;

use log::{info, warn};

/// Runtime configuration for the service, loaded from the environment
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Address the HTTP server binds to
    pub bind_address: String,
    /// Path of the SQLite database holding the user table
    pub database_path: String,
    /// Path of the semicolon-separated dengue case dataset
    pub dataset_path: String,
    /// Origin allowed to call the API from a browser
    pub allowed_origin: String,
    /// Minimum similarity/probability for a facial match to be accepted
    pub match_threshold: f32,
}

impl AppConfig {
    /// Load the configuration, falling back to defaults for unset variables
    pub fn from_env() -> Self {
        Self {
            bind_address: load_or_default("BIND_ADDRESS", "127.0.0.1:8000"),
            database_path: load_or_default("DATABASE_PATH", "./facial_auth.db"),
            dataset_path: load_or_default("DENGUE_DATASET", "./data/dengue_data.csv"),
            allowed_origin: load_or_default("ALLOWED_ORIGIN", "http://localhost:3000"),
            match_threshold: load_or_default("MATCH_THRESHOLD", "0.6"),
        }
    }
}

fn load_or_default<T: FromStr>(key: &str, default: &str) -> T
where
    T::Err: Display,
{
    let raw = match env::var(key) {
        Ok(value) => value,
        Err(_) => {
            info!("{} not set, using default: {}", key, default);
            default.to_string()
        }
    };

    match raw.parse() {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("Invalid {} value {:?}: {}. Using default.", key, raw, e);
            default
                .parse()
                .unwrap_or_else(|e| panic!("Default for {} is invalid: {}", key, e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test that defaults are applied when the environment is empty
    #[test]
    fn test_defaults() {
        env::remove_var("BIND_ADDRESS");

        let config = AppConfig::from_env();
        assert_eq!(config.bind_address, "127.0.0.1:8000");
    }

    // Test that an unparsable value falls back to the default
    #[test]
    fn test_invalid_value_falls_back() {
        env::set_var("MATCH_THRESHOLD", "not-a-number");
        let config = AppConfig::from_env();
        assert!((config.match_threshold - 0.6).abs() < f32::EPSILON);
        env::remove_var("MATCH_THRESHOLD");
    }
}
