//! Facial authentication instance
//!
//! Owns the in-memory copy of the enrolled embeddings and the matching
//! pipeline. The model is rebuilt from the user store on every
//! registration, login, and admin-setup request rather than maintained
//! incrementally.

use async_trait::async_trait;
use log::{debug, info, warn};
use ndarray::{Array2, ArrayView1};
use serde_json::json;

use crate::core::component::{ServiceComponent, ServiceError, ServiceStatus};
use crate::instances::classifier::{SoftmaxClassifier, StandardScaler};
use crate::instances::embedding::{self, EMBEDDING_DIM};
use crate::storage::UserStore;

/// Default acceptance threshold for similarity and class probability
pub const DEFAULT_MATCH_THRESHOLD: f32 = 0.6;

#[derive(Debug)]
pub struct FacialAuthInstance {
    id: String,
    store: UserStore,
    labels: Vec<String>,
    embeddings: Vec<Vec<f32>>,
    pipeline: Option<(StandardScaler, SoftmaxClassifier)>,
    threshold: f32,
    last_accuracy: Option<f32>,
    status: ServiceStatus,
}

impl FacialAuthInstance {
    pub fn new(store: UserStore, threshold: f32) -> Self {
        Self {
            id: "facial_auth".to_string(),
            store,
            labels: Vec::new(),
            embeddings: Vec::new(),
            pipeline: None,
            threshold,
            last_accuracy: None,
            status: ServiceStatus::Initialized,
        }
    }

    /// Pull all users from the store and keep the usable embeddings.
    ///
    /// Skipped rows: short or malformed embeddings, non-finite components,
    /// and the all-zero admin-bootstrap sentinel.
    pub fn load_data(&mut self) -> Result<(), ServiceError> {
        let users = self.store.all_users()?;

        self.labels.clear();
        self.embeddings.clear();

        for user in users {
            if user.embedding.len() < EMBEDDING_DIM {
                debug!(
                    "Skipping user {}: embedding has {} of {} components",
                    user.name,
                    user.embedding.len(),
                    EMBEDDING_DIM
                );
                continue;
            }

            let head = &user.embedding[..EMBEDDING_DIM];
            if head.iter().any(|v| !v.is_finite()) {
                warn!("Skipping user {}: embedding contains NaN or Inf", user.name);
                continue;
            }
            if embedding::is_all_zero(head) {
                debug!("Skipping user {}: unconfigured sentinel embedding", user.name);
                continue;
            }

            self.embeddings.push(head.to_vec());
            self.labels.push(user.name);
        }

        info!("Loaded {} enrolled embeddings", self.embeddings.len());
        Ok(())
    }

    /// Fit the matching pipeline over the loaded embeddings.
    ///
    /// Returns `false` when there is nothing to fit (no users) or the fit
    /// was skipped/failed; a single enrolled user switches the matcher to
    /// direct-comparison mode without fitting anything.
    pub fn train(&mut self) -> Result<bool, ServiceError> {
        if self.embeddings.is_empty() {
            debug!("No embeddings to train with");
            self.pipeline = None;
            self.status = ServiceStatus::Initialized;
            return Ok(false);
        }

        if self.embeddings.len() == 1 {
            info!("Single enrolled user, using direct comparison mode");
            self.pipeline = None;
            self.status = ServiceStatus::Ready;
            return Ok(true);
        }

        let mut distinct = self.labels.clone();
        distinct.sort();
        distinct.dedup();
        if distinct.len() < 2 {
            warn!("Need at least 2 distinct users to fit the classifier");
            return Ok(false);
        }

        let n = self.embeddings.len();
        let mut x = Array2::<f32>::zeros((n, EMBEDDING_DIM));
        for (row, emb) in self.embeddings.iter().enumerate() {
            for (col, value) in emb.iter().enumerate() {
                x[[row, col]] = *value;
            }
        }

        let scaler = StandardScaler::fit(&x)?;
        let scaled = scaler.transform(&x);

        let mut classifier = SoftmaxClassifier::new();
        match classifier.fit(&scaled, &self.labels) {
            Ok(accuracy) => {
                info!(
                    "Facial classifier trained with {} samples and {} classes (accuracy {:.3})",
                    n,
                    distinct.len(),
                    accuracy
                );
                self.last_accuracy = Some(accuracy);
                self.pipeline = Some((scaler, classifier));
                self.status = ServiceStatus::Ready;
                Ok(true)
            }
            Err(e) => {
                warn!("Classifier fit failed: {}", e);
                self.pipeline = None;
                Ok(false)
            }
        }
    }

    /// Match an embedding against the enrolled users.
    ///
    /// `None` means rejection: no data, an unusable input, or a best match
    /// below the acceptance threshold. A single enrolled user is compared
    /// by cosine similarity; multiple users go through the classifier.
    pub fn predict(&self, input: &[f32]) -> Option<(String, f32)> {
        if self.embeddings.is_empty() {
            debug!("No enrolled embeddings available");
            return None;
        }
        if input.len() < EMBEDDING_DIM {
            debug!("Input embedding too short: {}", input.len());
            return None;
        }

        let head = &input[..EMBEDDING_DIM];
        if head.iter().any(|v| !v.is_finite()) {
            debug!("Input embedding contains NaN or Inf");
            return None;
        }

        if self.embeddings.len() == 1 {
            let similarity = embedding::cosine_similarity(head, &self.embeddings[0]);
            debug!("Direct comparison similarity: {:.3}", similarity);
            if similarity >= self.threshold {
                return Some((self.labels[0].clone(), similarity));
            }
            debug!("Similarity below threshold: {:.3} < {:.3}", similarity, self.threshold);
            return None;
        }

        let (scaler, classifier) = match &self.pipeline {
            Some(pipeline) => pipeline,
            None => {
                debug!("Classifier not trained");
                return None;
            }
        };

        let scaled = scaler.transform_row(&ArrayView1::from(head));
        let (label, probability) = classifier.predict(&scaled.view())?;
        debug!("Classifier probability for {}: {:.3}", label, probability);

        if probability < self.threshold {
            debug!(
                "Probability below threshold: {:.3} < {:.3}",
                probability, self.threshold
            );
            return None;
        }
        Some((label, probability))
    }

    /// Reload from the store and retrain in one step
    pub fn refresh(&mut self) -> Result<bool, ServiceError> {
        self.load_data()?;
        self.train()
    }

    pub fn has_training_data(&self) -> bool {
        !self.embeddings.is_empty()
    }

    pub fn enrolled(&self) -> usize {
        self.embeddings.len()
    }

    pub fn last_accuracy(&self) -> Option<f32> {
        self.last_accuracy
    }
}

#[async_trait]
impl ServiceComponent for FacialAuthInstance {
    fn id(&self) -> &str {
        &self.id
    }

    fn component_type(&self) -> &str {
        "FacialAuthInstance"
    }

    fn status(&self) -> ServiceStatus {
        self.status.clone()
    }

    async fn initialize(&mut self) -> Result<(), ServiceError> {
        self.refresh()?;
        Ok(())
    }

    fn get_info(&self) -> serde_json::Value {
        let mode = if self.embeddings.is_empty() {
            "untrained"
        } else if self.embeddings.len() == 1 {
            "direct_comparison"
        } else if self.pipeline.is_some() {
            "classifier"
        } else {
            "untrained"
        };

        json!({
            "enrolled_users": self.embeddings.len(),
            "mode": mode,
            "threshold": self.threshold,
            "last_training_accuracy": self.last_accuracy,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn axis_embedding(axis: usize) -> Vec<f32> {
        let mut v = vec![0.0; EMBEDDING_DIM];
        v[axis] = 1.0;
        v
    }

    fn instance_with_users(users: &[(&str, Vec<f32>)]) -> (TempDir, FacialAuthInstance) {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("users.db");
        let store = UserStore::new(path.to_str().expect("utf-8 path"));
        store.init().expect("init schema");

        for (name, emb) in users {
            store.save_user(name, emb).expect("save user");
        }

        let mut instance = FacialAuthInstance::new(store, DEFAULT_MATCH_THRESHOLD);
        instance.refresh().expect("refresh");
        (dir, instance)
    }

    // Test the admin sentinel is excluded from training data
    #[test]
    fn test_sentinel_excluded() {
        let (_dir, instance) = instance_with_users(&[]);
        assert!(!instance.has_training_data());
        assert_eq!(instance.status(), ServiceStatus::Initialized);
    }

    // Test single-user direct comparison accepts and rejects by threshold
    #[test]
    fn test_single_user_direct_comparison() {
        let (_dir, instance) = instance_with_users(&[("ana", axis_embedding(0))]);
        assert_eq!(instance.enrolled(), 1);

        let (name, similarity) = instance.predict(&axis_embedding(0)).expect("match");
        assert_eq!(name, "ana");
        assert!(similarity > 0.99);

        // Orthogonal query falls below the threshold
        assert!(instance.predict(&axis_embedding(5)).is_none());
    }

    // Test multi-user classification picks the right user
    #[test]
    fn test_multi_user_classification() {
        let (_dir, instance) = instance_with_users(&[
            ("ana", axis_embedding(0)),
            ("beto", axis_embedding(1)),
        ]);

        let (name, probability) = instance.predict(&axis_embedding(0)).expect("match");
        assert_eq!(name, "ana");
        assert!(probability >= DEFAULT_MATCH_THRESHOLD);

        let (name, _) = instance.predict(&axis_embedding(1)).expect("match");
        assert_eq!(name, "beto");
    }

    // Test startup initialization loads and trains from the store
    #[tokio::test]
    async fn test_initialize() {
        let dir = TempDir::new().expect("temp dir");
        let path = dir.path().join("users.db");
        let store = UserStore::new(path.to_str().expect("utf-8 path"));
        store.init().expect("init schema");
        store.save_user("ana", &axis_embedding(0)).expect("save user");

        let mut instance = FacialAuthInstance::new(store, DEFAULT_MATCH_THRESHOLD);
        instance.initialize().await.expect("initialize");
        assert_eq!(instance.status(), ServiceStatus::Ready);
    }

    // Test unusable inputs are rejected without error
    #[test]
    fn test_unusable_inputs() {
        let (_dir, instance) = instance_with_users(&[("ana", axis_embedding(0))]);

        assert!(instance.predict(&[1.0; 10]).is_none());

        let mut with_nan = axis_embedding(0);
        with_nan[3] = f32::NAN;
        assert!(instance.predict(&with_nan).is_none());
    }
}
