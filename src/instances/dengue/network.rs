//! Small fully connected networks for the dengue prediction heads.
//!
//! Three head kinds cover the three prediction types: a softmax multiclass
//! classifier, a sigmoid binary classifier, and a ReLU-output regressor.
//! Training is plain mini-batch gradient descent over `ndarray` matrices;
//! the datasets involved are small enough that nothing fancier is needed.

use log::debug;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::core::component::ServiceError;

const LOSS_EPSILON: f32 = 1e-7;

/// Output head of a network, which also fixes the training loss:
/// softmax + categorical cross-entropy, sigmoid + binary cross-entropy,
/// ReLU + mean squared error.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum HeadKind {
    Multiclass,
    Binary,
    Regression,
}

/// One fully connected layer
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DenseLayer {
    weights: Array2<f32>,
    bias: Array1<f32>,
}

/// A stack of dense layers with ReLU hidden activations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DenseNetwork {
    layers: Vec<DenseLayer>,
    head: HeadKind,
}

/// Training hyperparameters
#[derive(Debug, Clone)]
pub struct TrainConfig {
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub validation_split: f32,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            epochs: 10,
            batch_size: 32,
            learning_rate: 0.01,
            validation_split: 0.2,
            seed: 42,
        }
    }
}

/// Summary of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainReport {
    pub samples: usize,
    pub validation_samples: usize,
    pub final_loss: f32,
    pub validation_loss: Option<f32>,
    pub validation_accuracy: Option<f32>,
}

impl DenseNetwork {
    /// Build a network from consecutive layer sizes, e.g. `[12, 128, 64, 5]`.
    ///
    /// Weights use Xavier-style uniform init; biases start at a small
    /// positive value so every ReLU unit is initially active.
    pub fn new(layer_sizes: &[usize], head: HeadKind, rng: &mut StdRng) -> Self {
        let mut layers = Vec::with_capacity(layer_sizes.len().saturating_sub(1));
        for pair in layer_sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
            let weights =
                Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-limit..limit));
            let bias = Array1::from_elem(fan_out, 0.01);
            layers.push(DenseLayer { weights, bias });
        }
        Self { layers, head }
    }

    /// Forward pass for a single sample
    pub fn forward(&self, input: &ArrayView1<f32>) -> Array1<f32> {
        let mut activation = input.to_owned();
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            let z = activation.dot(&layer.weights) + &layer.bias;
            activation = if i == last {
                self.output_activation_vec(&z)
            } else {
                z.mapv(relu)
            };
        }
        activation
    }

    /// Mini-batch gradient descent training with a shuffled
    /// train/validation split.
    pub fn train(
        &mut self,
        x: &Array2<f32>,
        y: &Array2<f32>,
        config: &TrainConfig,
    ) -> Result<TrainReport, ServiceError> {
        let n = x.nrows();
        if n == 0 {
            return Err(ServiceError::TrainingError("no training samples".to_string()));
        }
        if y.nrows() != n {
            return Err(ServiceError::TrainingError(format!(
                "sample/target count mismatch: {} vs {}",
                n,
                y.nrows()
            )));
        }

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut indices: Vec<usize> = (0..n).collect();
        indices.shuffle(&mut rng);

        let validation_count = (n as f32 * config.validation_split) as usize;
        let (validation_idx, train_idx) = indices.split_at(validation_count);
        let mut train_idx = train_idx.to_vec();
        if train_idx.is_empty() {
            return Err(ServiceError::TrainingError(
                "not enough samples left to train after the validation split".to_string(),
            ));
        }

        for epoch in 0..config.epochs {
            train_idx.shuffle(&mut rng);
            for batch in train_idx.chunks(config.batch_size) {
                let xb = x.select(Axis(0), batch);
                let yb = y.select(Axis(0), batch);
                self.train_batch(&xb, &yb, config.learning_rate);
            }
            debug!("Epoch {}/{} complete", epoch + 1, config.epochs);
        }

        let train_x = x.select(Axis(0), &train_idx);
        let train_y = y.select(Axis(0), &train_idx);
        let final_loss = self.loss(&train_x, &train_y);

        let (validation_loss, validation_accuracy) = if validation_idx.is_empty() {
            (None, None)
        } else {
            let val_x = x.select(Axis(0), validation_idx);
            let val_y = y.select(Axis(0), validation_idx);
            (
                Some(self.loss(&val_x, &val_y)),
                self.accuracy(&val_x, &val_y),
            )
        };

        Ok(TrainReport {
            samples: train_idx.len(),
            validation_samples: validation_idx.len(),
            final_loss,
            validation_loss,
            validation_accuracy,
        })
    }

    /// One gradient step on a batch
    fn train_batch(&mut self, xb: &Array2<f32>, yb: &Array2<f32>, learning_rate: f32) {
        let batch_size = xb.nrows() as f32;

        // Forward pass, keeping pre-activations and activations per layer
        let mut zs: Vec<Array2<f32>> = Vec::with_capacity(self.layers.len());
        let mut activations: Vec<Array2<f32>> = vec![xb.to_owned()];
        let last = self.layers.len() - 1;
        for (i, layer) in self.layers.iter().enumerate() {
            let z = activations[i].dot(&layer.weights) + &layer.bias;
            let a = if i == last {
                self.output_activation_batch(&z)
            } else {
                z.mapv(relu)
            };
            zs.push(z);
            activations.push(a);
        }

        // For softmax + cross-entropy and sigmoid + BCE the output delta
        // reduces to (prediction - target); the ReLU regressor additionally
        // gates the MSE delta by the activation derivative.
        let output = &activations[self.layers.len()];
        let mut delta = match self.head {
            HeadKind::Multiclass | HeadKind::Binary => output - yb,
            HeadKind::Regression => (output - yb) * &zs[last].mapv(relu_grad),
        };

        for i in (0..self.layers.len()).rev() {
            let grad_w = activations[i].t().dot(&delta) / batch_size;
            let grad_b = delta.sum_axis(Axis(0)) / batch_size;

            if i > 0 {
                delta = delta.dot(&self.layers[i].weights.t()) * &zs[i - 1].mapv(relu_grad);
            }

            self.layers[i].weights = &self.layers[i].weights - &(grad_w * learning_rate);
            self.layers[i].bias = &self.layers[i].bias - &(grad_b * learning_rate);
        }
    }

    /// Mean loss over a set of samples
    pub fn loss(&self, x: &Array2<f32>, y: &Array2<f32>) -> f32 {
        let n = x.nrows();
        if n == 0 {
            return 0.0;
        }

        let mut total = 0.0;
        for (row, target) in x.axis_iter(Axis(0)).zip(y.axis_iter(Axis(0))) {
            let prediction = self.forward(&row);
            total += match self.head {
                HeadKind::Multiclass => -target
                    .iter()
                    .zip(prediction.iter())
                    .map(|(t, p)| t * (p + LOSS_EPSILON).ln())
                    .sum::<f32>(),
                HeadKind::Binary => {
                    let p = prediction[0];
                    let t = target[0];
                    -(t * (p + LOSS_EPSILON).ln() + (1.0 - t) * (1.0 - p + LOSS_EPSILON).ln())
                }
                HeadKind::Regression => {
                    let diff = prediction[0] - target[0];
                    diff * diff
                }
            };
        }
        total / n as f32
    }

    /// Classification accuracy; `None` for the regression head
    pub fn accuracy(&self, x: &Array2<f32>, y: &Array2<f32>) -> Option<f32> {
        let n = x.nrows();
        if n == 0 || self.head == HeadKind::Regression {
            return None;
        }

        let mut correct = 0;
        for (row, target) in x.axis_iter(Axis(0)).zip(y.axis_iter(Axis(0))) {
            let prediction = self.forward(&row);
            let hit = match self.head {
                HeadKind::Multiclass => argmax(&prediction.view()) == argmax(&target),
                HeadKind::Binary => (prediction[0] > 0.5) == (target[0] > 0.5),
                HeadKind::Regression => false,
            };
            if hit {
                correct += 1;
            }
        }
        Some(correct as f32 / n as f32)
    }

    fn output_activation_vec(&self, z: &Array1<f32>) -> Array1<f32> {
        match self.head {
            HeadKind::Multiclass => softmax(z),
            HeadKind::Binary => z.mapv(sigmoid),
            HeadKind::Regression => z.mapv(relu),
        }
    }

    fn output_activation_batch(&self, z: &Array2<f32>) -> Array2<f32> {
        match self.head {
            HeadKind::Multiclass => {
                let mut out = z.clone();
                for mut row in out.axis_iter_mut(Axis(0)) {
                    let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
                    row.mapv_inplace(|v| (v - max).exp());
                    let sum: f32 = row.sum();
                    row.mapv_inplace(|v| v / sum);
                }
                out
            }
            HeadKind::Binary => z.mapv(sigmoid),
            HeadKind::Regression => z.mapv(relu),
        }
    }
}

fn relu(v: f32) -> f32 {
    if v > 0.0 {
        v
    } else {
        0.0
    }
}

fn relu_grad(v: f32) -> f32 {
    if v > 0.0 {
        1.0
    } else {
        0.0
    }
}

fn sigmoid(v: f32) -> f32 {
    1.0 / (1.0 + (-v).exp())
}

fn softmax(z: &Array1<f32>) -> Array1<f32> {
    let max = z.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exp = z.mapv(|v| (v - max).exp());
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
