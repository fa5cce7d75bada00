//! Dengue outbreak prediction instance
//!
//! Owns the loaded dataset, the fitted encoders, and the three trained
//! heads. Training happens lazily on the first prediction request, with a
//! best-effort attempt at startup so a missing dataset only costs a log
//! line until someone actually asks for a prediction.

pub mod dataset;
pub mod encoder;
pub mod network;

use std::path::PathBuf;

use async_trait::async_trait;
use log::info;
use ndarray::array;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::{json, Map, Value};

use crate::core::component::{ServiceComponent, ServiceError, ServiceStatus};
use crate::instances::dengue::dataset::DengueDataset;
use crate::instances::dengue::network::{DenseNetwork, HeadKind, TrainConfig};

/// The three trained heads plus the dataset they were fitted on
#[derive(Debug)]
struct DengueModels {
    dataset: DengueDataset,
    severity: DenseNetwork,
    outbreak: DenseNetwork,
    trend: DenseNetwork,
}

#[derive(Debug)]
pub struct DengueInstance {
    id: String,
    dataset_path: PathBuf,
    models: Option<DengueModels>,
    status: ServiceStatus,
}

impl DengueInstance {
    pub fn new(dataset_path: &str) -> Self {
        Self {
            id: "dengue_prediction".to_string(),
            dataset_path: PathBuf::from(dataset_path),
            models: None,
            status: ServiceStatus::Initialized,
        }
    }

    pub fn is_trained(&self) -> bool {
        self.models.is_some()
    }

    /// Train all heads if they are not trained yet
    pub fn ensure_trained(&mut self) -> Result<(), ServiceError> {
        if self.models.is_some() {
            return Ok(());
        }
        self.train()
    }

    fn train(&mut self) -> Result<(), ServiceError> {
        info!("Loading dengue dataset from {}", self.dataset_path.display());
        let dataset = match DengueDataset::load(&self.dataset_path) {
            Ok(dataset) => dataset,
            Err(e) => {
                self.status = ServiceStatus::Error(e.to_string());
                return Err(e);
            }
        };

        let mut rng = StdRng::seed_from_u64(42);
        let config = TrainConfig::default();

        let mut severity = DenseNetwork::new(
            &[dataset.n_features(), 128, 64, dataset.n_classes()],
            HeadKind::Multiclass,
            &mut rng,
        );
        let report = severity.train(&dataset.features, &dataset.one_hot_diagnostic(), &config)?;
        info!(
            "Severity head trained on {} cases (validation accuracy: {:?})",
            report.samples, report.validation_accuracy
        );

        let mut outbreak = DenseNetwork::new(
            &[dataset.n_features(), 64, 32, 1],
            HeadKind::Binary,
            &mut rng,
        );
        let report = outbreak.train(&dataset.features, &dataset.binary_outbreak(), &config)?;
        info!(
            "Outbreak head trained on {} cases (validation accuracy: {:?})",
            report.samples, report.validation_accuracy
        );

        let (trend_x, trend_y) = dataset.trend_training()?;
        let mut trend = DenseNetwork::new(&[2, 64, 32, 1], HeadKind::Regression, &mut rng);
        let report = trend.train(&trend_x, &trend_y, &config)?;
        info!(
            "Trend head trained on {} district-week groups (validation loss: {:?})",
            report.samples, report.validation_loss
        );

        self.models = Some(DengueModels {
            dataset,
            severity,
            outbreak,
            trend,
        });
        self.status = ServiceStatus::Ready;
        Ok(())
    }

    /// Answer a prediction request, selecting the head by prediction type
    pub fn predict(
        &self,
        prediction_type: &str,
        input: &Map<String, Value>,
    ) -> Result<String, ServiceError> {
        let models = self.models.as_ref().ok_or_else(|| {
            ServiceError::NotInitialized("dengue models are not trained".to_string())
        })?;

        match prediction_type {
            "severity" => Self::predict_severity(models, input),
            "outbreak" => Self::predict_outbreak(models, input),
            "trend" => Self::predict_trend(models, input),
            other => Err(ServiceError::ValidationError(format!(
                "invalid prediction type: {}",
                other
            ))),
        }
    }

    fn predict_severity(
        models: &DengueModels,
        input: &Map<String, Value>,
    ) -> Result<String, ServiceError> {
        let vector = models.dataset.encode_input(input)?;
        let probabilities = models.severity.forward(&vector.view());

        let mut best = 0;
        for (i, p) in probabilities.iter().enumerate() {
            if *p > probabilities[best] {
                best = i;
            }
        }
        let class = models.dataset.diagnostic_encoder.label(best).ok_or_else(|| {
            ServiceError::PredictionError(format!("no label for class index {}", best))
        })?;

        Ok(format!(
            "Predicted class: {} (probability {:.2}%)",
            class,
            probabilities[best] * 100.0
        ))
    }

    fn predict_outbreak(
        models: &DengueModels,
        input: &Map<String, Value>,
    ) -> Result<String, ServiceError> {
        let vector = models.dataset.encode_input(input)?;
        let probability = models.outbreak.forward(&vector.view())[0];

        let verdict = if probability > 0.5 { "Positive" } else { "Negative" };
        Ok(format!(
            "Prediction result: {} (probability: {:.2}%)",
            verdict,
            probability * 100.0
        ))
    }

    fn predict_trend(
        models: &DengueModels,
        input: &Map<String, Value>,
    ) -> Result<String, ServiceError> {
        let district = input
            .get("distrito")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                ServiceError::ValidationError("missing required field: distrito".to_string())
            })?;
        let week = input
            .get("semana")
            .and_then(|v| v.as_f64())
            .ok_or_else(|| {
                ServiceError::ValidationError("missing required field: semana".to_string())
            })?;

        let district_encoder = models.dataset.encoders.get("distrito").ok_or_else(|| {
            ServiceError::PredictionError("district encoder missing".to_string())
        })?;
        let code = district_encoder.transform(district)?;

        let vector = array![code as f32, week as f32];
        let predicted = models.trend.forward(&vector.view())[0];
        let cases = predicted.round().max(0.0) as i64;

        Ok(format!(
            "Expected {} cases in district '{}' for week {}.",
            cases, district, week
        ))
    }
}

#[async_trait]
impl ServiceComponent for DengueInstance {
    fn id(&self) -> &str {
        &self.id
    }

    fn component_type(&self) -> &str {
        "DengueInstance"
    }

    fn status(&self) -> ServiceStatus {
        self.status.clone()
    }

    async fn initialize(&mut self) -> Result<(), ServiceError> {
        self.ensure_trained()
    }

    fn get_info(&self) -> serde_json::Value {
        match &self.models {
            Some(models) => json!({
                "trained": true,
                "dataset_path": self.dataset_path.display().to_string(),
                "cases": models.dataset.record_count(),
                "diagnostic_classes": models.dataset.diagnostic_encoder.classes(),
                "heads": ["severity", "outbreak", "trend"],
            }),
            None => json!({
                "trained": false,
                "dataset_path": self.dataset_path.display().to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write_sample_csv(dir: &TempDir) -> PathBuf {
        let path = dir.path().join("dengue_data.csv");
        let mut file = std::fs::File::create(&path).expect("create csv");
        writeln!(
            file,
            "departamento;provincia;distrito;enfermedad;ano;semana;diagnostic;tipo_dx;diresa;ubigeo;edad;tipo_edad;sexo"
        )
        .expect("write header");

        let districts = ["ATE", "COMAS", "SURCO"];
        for i in 0..30 {
            writeln!(
                file,
                "LIMA;LIMA;{};DENGUE SIN SIGNOS DE ALARMA;2023;{};{};CASO CONFIRMADO;LIMA;150103;{};AÑOS;{}",
                districts[i % 3],
                30 + (i % 4),
                i % 3,
                20 + i,
                if i % 2 == 0 { "FEMENINO" } else { "MASCULINO" },
            )
            .expect("write row");
        }
        path
    }

    fn severity_input() -> Map<String, Value> {
        let mut input = Map::new();
        input.insert("departamento".to_string(), Value::from("LIMA"));
        input.insert("provincia".to_string(), Value::from("LIMA"));
        input.insert("distrito".to_string(), Value::from("ATE"));
        input.insert(
            "enfermedad".to_string(),
            Value::from("DENGUE SIN SIGNOS DE ALARMA"),
        );
        input.insert("ano".to_string(), Value::from(2023));
        input.insert("semana".to_string(), Value::from(31));
        input.insert("tipo_dx".to_string(), Value::from("CASO CONFIRMADO"));
        input.insert("diresa".to_string(), Value::from("LIMA"));
        input.insert("ubigeo".to_string(), Value::from(150103));
        input.insert("edad".to_string(), Value::from(28));
        input.insert("tipo_edad".to_string(), Value::from("AÑOS"));
        input.insert("sexo".to_string(), Value::from("FEMENINO"));
        input
    }

    fn trained_instance(dir: &TempDir) -> DengueInstance {
        let path = write_sample_csv(dir);
        let mut instance = DengueInstance::new(path.to_str().expect("utf-8 path"));
        instance.ensure_trained().expect("train");
        instance
    }

    // Test predictions before training are rejected
    #[test]
    fn test_untrained_rejected() {
        let instance = DengueInstance::new("/nonexistent/dengue.csv");
        let err = instance.predict("severity", &Map::new()).unwrap_err();
        assert!(matches!(err, ServiceError::NotInitialized(_)));
    }

    // Test a missing dataset surfaces as a load error
    #[test]
    fn test_missing_dataset() {
        let mut instance = DengueInstance::new("/nonexistent/dengue.csv");
        assert!(instance.ensure_trained().is_err());
        assert!(matches!(instance.status(), ServiceStatus::Error(_)));
    }

    // Test all three heads answer with well-formed messages
    #[test]
    fn test_prediction_heads() {
        let dir = TempDir::new().expect("temp dir");
        let instance = trained_instance(&dir);
        assert!(instance.is_trained());

        let severity = instance.predict("severity", &severity_input()).unwrap();
        assert!(severity.starts_with("Predicted class:"));

        let outbreak = instance.predict("outbreak", &severity_input()).unwrap();
        assert!(outbreak.starts_with("Prediction result:"));

        let mut trend_input = Map::new();
        trend_input.insert("distrito".to_string(), Value::from("ATE"));
        trend_input.insert("semana".to_string(), Value::from(33));
        let trend = instance.predict("trend", &trend_input).unwrap();
        assert!(trend.contains("cases in district 'ATE' for week 33"));
    }

    // Test head selection rejects unknown types and bad inputs
    #[test]
    fn test_invalid_requests() {
        let dir = TempDir::new().expect("temp dir");
        let instance = trained_instance(&dir);

        let err = instance.predict("forecast", &Map::new()).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));

        // Trend without its required fields
        let err = instance.predict("trend", &Map::new()).unwrap_err();
        assert!(matches!(err, ServiceError::ValidationError(_)));

        // Unseen district
        let mut unseen = Map::new();
        unseen.insert("distrito".to_string(), Value::from("CALLAO"));
        unseen.insert("semana".to_string(), Value::from(33));
        let err = instance.predict("trend", &unseen).unwrap_err();
        assert!(matches!(err, ServiceError::PredictionError(_)));
    }
}
