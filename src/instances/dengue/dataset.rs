//! Dengue case dataset: CSV loading, categorical encoding, and the
//! training-column alignment applied to inference inputs.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use log::info;
use ndarray::{Array1, Array2};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::core::component::ServiceError;
use crate::instances::dengue::encoder::LabelEncoder;

/// Columns that are label-encoded before training
pub const CATEGORICAL_COLUMNS: [&str; 8] = [
    "departamento",
    "provincia",
    "distrito",
    "enfermedad",
    "tipo_dx",
    "diresa",
    "tipo_edad",
    "sexo",
];

/// Feature columns of the design matrix, in training order.
/// The `diagnostic` column is the label and is never a feature.
pub const FEATURE_COLUMNS: [&str; 12] = [
    "departamento",
    "provincia",
    "distrito",
    "enfermedad",
    "ano",
    "semana",
    "tipo_dx",
    "diresa",
    "ubigeo",
    "edad",
    "tipo_edad",
    "sexo",
];

/// One row of the semicolon-separated case dataset
#[derive(Debug, Clone, Deserialize)]
pub struct CaseRecord {
    pub departamento: String,
    pub provincia: String,
    pub distrito: String,
    pub enfermedad: String,
    pub ano: i32,
    pub semana: i32,
    pub diagnostic: i32,
    pub tipo_dx: String,
    pub diresa: String,
    pub ubigeo: i64,
    pub edad: f32,
    pub tipo_edad: String,
    pub sexo: String,
}

impl CaseRecord {
    fn categorical_value(&self, column: &str) -> &str {
        match column {
            "departamento" => &self.departamento,
            "provincia" => &self.provincia,
            "distrito" => &self.distrito,
            "enfermedad" => &self.enfermedad,
            "tipo_dx" => &self.tipo_dx,
            "diresa" => &self.diresa,
            "tipo_edad" => &self.tipo_edad,
            "sexo" => &self.sexo,
            other => panic!("not a categorical column: {}", other),
        }
    }

    fn numeric_value(&self, column: &str) -> f32 {
        match column {
            "ano" => self.ano as f32,
            "semana" => self.semana as f32,
            "ubigeo" => self.ubigeo as f32,
            "edad" => self.edad,
            other => panic!("not a numeric column: {}", other),
        }
    }
}

/// The loaded dataset with fitted encoders and encoded design matrix
#[derive(Debug, Clone)]
pub struct DengueDataset {
    records: Vec<CaseRecord>,
    /// One encoder per categorical feature column
    pub encoders: HashMap<String, LabelEncoder>,
    /// Encoder for the diagnostic label
    pub diagnostic_encoder: LabelEncoder,
    /// Feature column order shared by training and inference
    pub feature_columns: Vec<String>,
    /// Encoded design matrix, one row per case
    pub features: Array2<f32>,
    /// Encoded diagnostic label per row
    pub diagnostic_codes: Vec<usize>,
}

impl DengueDataset {
    /// Parse the `;`-delimited CSV and fit all encoders.
    pub fn load(path: &Path) -> Result<Self, ServiceError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b';')
            .has_headers(true)
            .from_path(path)
            .map_err(|e| {
                ServiceError::StorageError(format!(
                    "could not open dataset {}: {}",
                    path.display(),
                    e
                ))
            })?;

        let mut records: Vec<CaseRecord> = Vec::new();
        for row in reader.deserialize() {
            let record: CaseRecord = row.map_err(|e| {
                ServiceError::StorageError(format!("malformed dataset row: {}", e))
            })?;
            records.push(record);
        }
        if records.is_empty() {
            return Err(ServiceError::TrainingError("dataset is empty".to_string()));
        }

        let mut encoders = HashMap::new();
        for column in CATEGORICAL_COLUMNS {
            let encoder = LabelEncoder::fit(
                records
                    .iter()
                    .map(|r| r.categorical_value(column).to_string()),
            );
            encoders.insert(column.to_string(), encoder);
        }

        let diagnostic_encoder =
            LabelEncoder::fit(records.iter().map(|r| r.diagnostic.to_string()));

        let feature_columns: Vec<String> =
            FEATURE_COLUMNS.iter().map(|c| c.to_string()).collect();

        let mut features = Array2::<f32>::zeros((records.len(), feature_columns.len()));
        let mut diagnostic_codes = Vec::with_capacity(records.len());
        for (row, record) in records.iter().enumerate() {
            for (col, column) in feature_columns.iter().enumerate() {
                features[[row, col]] = if let Some(encoder) = encoders.get(column) {
                    encoder.transform(record.categorical_value(column))? as f32
                } else {
                    record.numeric_value(column)
                };
            }
            diagnostic_codes.push(diagnostic_encoder.transform(&record.diagnostic.to_string())?);
        }

        info!(
            "Loaded dengue dataset: {} cases, {} features, {} diagnostic classes",
            records.len(),
            feature_columns.len(),
            diagnostic_encoder.len()
        );

        Ok(Self {
            records,
            encoders,
            diagnostic_encoder,
            feature_columns,
            features,
            diagnostic_codes,
        })
    }

    pub fn record_count(&self) -> usize {
        self.records.len()
    }

    pub fn n_features(&self) -> usize {
        self.feature_columns.len()
    }

    pub fn n_classes(&self) -> usize {
        self.diagnostic_encoder.len()
    }

    /// One-hot diagnostic targets for the severity head
    pub fn one_hot_diagnostic(&self) -> Array2<f32> {
        let mut y = Array2::<f32>::zeros((self.records.len(), self.n_classes()));
        for (row, code) in self.diagnostic_codes.iter().enumerate() {
            y[[row, *code]] = 1.0;
        }
        y
    }

    /// Binary targets for the outbreak head: positive iff `diagnostic > 0`
    pub fn binary_outbreak(&self) -> Array2<f32> {
        let mut y = Array2::<f32>::zeros((self.records.len(), 1));
        for (row, record) in self.records.iter().enumerate() {
            if record.diagnostic > 0 {
                y[[row, 0]] = 1.0;
            }
        }
        y
    }

    /// Per-(district, week) case counts for the trend head.
    ///
    /// Returns `(x, y)` where each `x` row is `[district_code, week]` and
    /// `y` is the number of cases recorded for that pair.
    pub fn trend_training(&self) -> Result<(Array2<f32>, Array2<f32>), ServiceError> {
        let district_encoder = self
            .encoders
            .get("distrito")
            .ok_or_else(|| ServiceError::TrainingError("district encoder missing".to_string()))?;

        let mut counts: BTreeMap<(String, i32), usize> = BTreeMap::new();
        for record in &self.records {
            *counts
                .entry((record.distrito.clone(), record.semana))
                .or_insert(0) += 1;
        }

        let mut x = Array2::<f32>::zeros((counts.len(), 2));
        let mut y = Array2::<f32>::zeros((counts.len(), 1));
        for (row, ((district, week), count)) in counts.iter().enumerate() {
            x[[row, 0]] = district_encoder.transform(district)? as f32;
            x[[row, 1]] = *week as f32;
            y[[row, 0]] = *count as f32;
        }
        Ok((x, y))
    }

    /// Encode a request payload into a feature vector aligned to the
    /// training columns: categorical fields go through their fitted
    /// encoders, missing columns become `0.0`, unknown keys are ignored.
    pub fn encode_input(&self, input: &Map<String, Value>) -> Result<Array1<f32>, ServiceError> {
        let mut vector = Array1::<f32>::zeros(self.feature_columns.len());
        for (col, column) in self.feature_columns.iter().enumerate() {
            let value = match input.get(column) {
                Some(value) => value,
                None => continue,
            };

            vector[col] = if let Some(encoder) = self.encoders.get(column) {
                let raw = value.as_str().ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "field {} must be a string",
                        column
                    ))
                })?;
                encoder.transform(raw)? as f32
            } else {
                value.as_f64().ok_or_else(|| {
                    ServiceError::ValidationError(format!(
                        "field {} must be numeric",
                        column
                    ))
                })? as f32
            };
        }
        Ok(vector)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    const SAMPLE_HEADER: &str =
        "departamento;provincia;distrito;enfermedad;ano;semana;diagnostic;tipo_dx;diresa;ubigeo;edad;tipo_edad;sexo";

    fn sample_rows() -> Vec<String> {
        let districts = ["ATE", "COMAS", "SURCO"];
        let mut rows = Vec::new();
        for i in 0..30 {
            let district = districts[i % 3];
            let diagnostic = (i % 3) as i32;
            rows.push(format!(
                "LIMA;LIMA;{};DENGUE SIN SIGNOS DE ALARMA;2023;{};{};CASO CONFIRMADO;LIMA;150103;{};AÑOS;{}",
                district,
                30 + (i % 4) as i32,
                diagnostic,
                20 + i,
                if i % 2 == 0 { "FEMENINO" } else { "MASCULINO" },
            ));
        }
        rows
    }

    fn write_sample_csv(dir: &TempDir) -> std::path::PathBuf {
        let path = dir.path().join("dengue_data.csv");
        let mut file = std::fs::File::create(&path).expect("create csv");
        writeln!(file, "{}", SAMPLE_HEADER).expect("write header");
        for row in sample_rows() {
            writeln!(file, "{}", row).expect("write row");
        }
        path
    }

    // Test loading fits encoders and builds an aligned design matrix
    #[test]
    fn test_load() {
        let dir = TempDir::new().expect("temp dir");
        let path = write_sample_csv(&dir);

        let dataset = DengueDataset::load(&path).unwrap();
        assert_eq!(dataset.record_count(), 30);
        assert_eq!(dataset.n_features(), FEATURE_COLUMNS.len());
        assert_eq!(dataset.n_classes(), 3);
        assert_eq!(dataset.features.nrows(), 30);

        // District codes follow sorted order: ATE < COMAS < SURCO
        let district = dataset.encoders.get("distrito").unwrap();
        assert_eq!(district.transform("ATE").unwrap(), 0);
        assert_eq!(district.transform("SURCO").unwrap(), 2);
    }

    // Test a missing file is a storage error
    #[test]
    fn test_missing_file() {
        let err = DengueDataset::load(Path::new("/nonexistent/dengue.csv")).unwrap_err();
        assert!(format!("{}", err).contains("could not open dataset"));
    }

    // Test inference inputs are aligned to the training columns
    #[test]
    fn test_encode_input_alignment() {
        let dir = TempDir::new().expect("temp dir");
        let dataset = DengueDataset::load(&write_sample_csv(&dir)).unwrap();

        let mut input = Map::new();
        input.insert("distrito".to_string(), Value::from("COMAS"));
        input.insert("semana".to_string(), Value::from(33));
        input.insert("ignored_key".to_string(), Value::from("whatever"));

        let vector = dataset.encode_input(&input).unwrap();
        assert_eq!(vector.len(), FEATURE_COLUMNS.len());
        // distrito is column 2, semana column 5; everything absent is 0
        assert_eq!(vector[2], 1.0);
        assert_eq!(vector[5], 33.0);
        assert_eq!(vector[0], 0.0);
    }

    // Test unseen categories and wrong types are rejected
    #[test]
    fn test_encode_input_errors() {
        let dir = TempDir::new().expect("temp dir");
        let dataset = DengueDataset::load(&write_sample_csv(&dir)).unwrap();

        let mut unseen = Map::new();
        unseen.insert("distrito".to_string(), Value::from("CALLAO"));
        assert!(dataset.encode_input(&unseen).is_err());

        let mut wrong_type = Map::new();
        wrong_type.insert("semana".to_string(), Value::from("thirty"));
        assert!(dataset.encode_input(&wrong_type).is_err());
    }

    // Test trend aggregation counts cases per district and week
    #[test]
    fn test_trend_training() {
        let dir = TempDir::new().expect("temp dir");
        let dataset = DengueDataset::load(&write_sample_csv(&dir)).unwrap();

        let (x, y) = dataset.trend_training().unwrap();
        assert_eq!(x.nrows(), y.nrows());
        assert!(x.nrows() <= 12); // 3 districts x 4 weeks
        let total: f32 = y.column(0).sum();
        assert_eq!(total as usize, dataset.record_count());
    }
}
