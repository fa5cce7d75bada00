//! Scaler + softmax classifier used for multi-user facial matching.
//!
//! The matcher standardizes the stored embeddings and fits a multinomial
//! logistic model by full-batch gradient descent. With the handful of
//! enrolled users this service sees, a few hundred epochs converge in
//! well under a millisecond.

use std::collections::HashMap;

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

use crate::core::component::ServiceError;

/// Per-column standardization fitted on the training matrix
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StandardScaler {
    mean: Array1<f32>,
    std: Array1<f32>,
}

impl StandardScaler {
    /// Fit column means and standard deviations
    pub fn fit(x: &Array2<f32>) -> Result<Self, ServiceError> {
        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| ServiceError::TrainingError("empty training matrix".to_string()))?;

        let centered = x - &mean;
        let variance = centered
            .mapv(|v| v * v)
            .mean_axis(Axis(0))
            .ok_or_else(|| ServiceError::TrainingError("empty training matrix".to_string()))?;

        // A constant column would otherwise divide by zero
        let std = variance.mapv(|v| if v.sqrt() > 0.0 { v.sqrt() } else { 1.0 });

        Ok(Self { mean, std })
    }

    /// Standardize a full matrix
    pub fn transform(&self, x: &Array2<f32>) -> Array2<f32> {
        (x - &self.mean) / &self.std
    }

    /// Standardize a single sample
    pub fn transform_row(&self, v: &ArrayView1<f32>) -> Array1<f32> {
        (v - &self.mean) / &self.std
    }
}

/// Multinomial logistic classifier over standardized embeddings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SoftmaxClassifier {
    weights: Array2<f32>,
    bias: Array1<f32>,
    classes: Vec<String>,
    learning_rate: f32,
    epochs: usize,
}

impl SoftmaxClassifier {
    pub fn new() -> Self {
        Self {
            weights: Array2::zeros((0, 0)),
            bias: Array1::zeros(0),
            classes: Vec::new(),
            learning_rate: 0.1,
            epochs: 300,
        }
    }

    /// Fit the classifier; returns the training accuracy.
    ///
    /// Requires at least two distinct labels. Class order is the sorted
    /// order of the distinct labels and stays stable across refits.
    pub fn fit(&mut self, x: &Array2<f32>, labels: &[String]) -> Result<f32, ServiceError> {
        if x.nrows() != labels.len() {
            return Err(ServiceError::TrainingError(format!(
                "sample/label count mismatch: {} vs {}",
                x.nrows(),
                labels.len()
            )));
        }

        let mut classes: Vec<String> = labels.to_vec();
        classes.sort();
        classes.dedup();
        if classes.len() < 2 {
            return Err(ServiceError::TrainingError(
                "need at least 2 distinct labels to fit the classifier".to_string(),
            ));
        }

        let n_samples = x.nrows();
        let n_features = x.ncols();
        let n_classes = classes.len();

        let class_index: HashMap<&str, usize> = classes
            .iter()
            .enumerate()
            .map(|(i, c)| (c.as_str(), i))
            .collect();
        let targets: Vec<usize> = labels
            .iter()
            .filter_map(|label| class_index.get(label.as_str()).copied())
            .collect();

        let mut one_hot = Array2::<f32>::zeros((n_samples, n_classes));
        for (row, class_idx) in targets.iter().enumerate() {
            one_hot[[row, *class_idx]] = 1.0;
        }

        let mut weights = Array2::<f32>::zeros((n_features, n_classes));
        let mut bias = Array1::<f32>::zeros(n_classes);
        let scale = 1.0 / n_samples as f32;

        let mut probs = Array2::<f32>::zeros((n_samples, n_classes));
        for _ in 0..self.epochs {
            let logits = x.dot(&weights) + &bias;
            probs = softmax_rows(&logits);

            let grad = &probs - &one_hot;
            let grad_w = x.t().dot(&grad) * scale;
            let grad_b = grad.sum_axis(Axis(0)) * scale;

            weights = weights - grad_w * self.learning_rate;
            bias = bias - grad_b * self.learning_rate;
        }

        let correct = probs
            .axis_iter(Axis(0))
            .zip(targets.iter())
            .filter(|(row, target)| argmax(row) == **target)
            .count();
        let accuracy = correct as f32 / n_samples as f32;

        debug!(
            "Fitted softmax classifier: {} samples, {} classes, training accuracy {:.3}",
            n_samples, n_classes, accuracy
        );

        self.weights = weights;
        self.bias = bias;
        self.classes = classes;
        Ok(accuracy)
    }

    /// Class probabilities for a single standardized sample
    pub fn predict_proba(&self, v: &ArrayView1<f32>) -> Array1<f32> {
        let logits = v.dot(&self.weights) + &self.bias;
        softmax_vec(&logits)
    }

    /// Most probable class and its probability
    pub fn predict(&self, v: &ArrayView1<f32>) -> Option<(String, f32)> {
        if self.classes.is_empty() {
            return None;
        }
        let probs = self.predict_proba(v);
        let best = argmax(&probs.view());
        Some((self.classes[best].clone(), probs[best]))
    }

    pub fn classes(&self) -> &[String] {
        &self.classes
    }
}

impl Default for SoftmaxClassifier {
    fn default() -> Self {
        Self::new()
    }
}

/// Row-wise softmax with max-subtraction for numerical stability
fn softmax_rows(logits: &Array2<f32>) -> Array2<f32> {
    let mut out = logits.clone();
    for mut row in out.axis_iter_mut(Axis(0)) {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum: f32 = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    out
}

fn softmax_vec(logits: &Array1<f32>) -> Array1<f32> {
    let max = logits.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp = logits.mapv(|v| (v - max).exp());
    let sum: f32 = exp.sum();
    exp / sum
}

fn argmax(v: &ArrayView1<f32>) -> usize {
    let mut best = 0;
    for (i, value) in v.iter().enumerate() {
        if *value > v[best] {
            best = i;
        }
    }
    best
}
