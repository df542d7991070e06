//! Dataset loading and normalization
//!
//! Samples come from two places: named datasets resolved against a local
//! data directory, and uploaded CSV/JSON objects from the dataset store.
//! Known dataset names carry an explicit column mapping; for anything
//! else the prompt and label columns are inferred from common names and
//! label values are normalized by substring.

use semantic_firewall_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Ground-truth label of a benchmark sample
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpectedLabel {
    Jailbreak,
    Benign,
}

impl ExpectedLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExpectedLabel::Jailbreak => "jailbreak",
            ExpectedLabel::Benign => "benign",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "jailbreak" => Some(ExpectedLabel::Jailbreak),
            "benign" => Some(ExpectedLabel::Benign),
            _ => None,
        }
    }

    /// Normalize a raw label value by substring
    pub fn infer(raw: &str) -> Self {
        let lower = raw.to_lowercase();
        if lower.contains("jailbreak") || lower.contains("attack") || lower.contains("malicious") {
            ExpectedLabel::Jailbreak
        } else {
            ExpectedLabel::Benign
        }
    }
}

/// One normalized benchmark sample
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetSample {
    pub prompt: String,
    pub expected_label: ExpectedLabel,
    pub index: usize,
}

/// Column and label mapping for a dataset format
#[derive(Debug, Clone)]
pub struct DatasetMapping {
    pub prompt_column: String,
    pub label_column: String,
    /// Raw value -> normalized label; empty means infer by substring
    pub label_mapping: HashMap<String, ExpectedLabel>,
}

impl DatasetMapping {
    fn identity(prompt_column: &str, label_column: &str) -> Self {
        Self {
            prompt_column: prompt_column.to_string(),
            label_column: label_column.to_string(),
            label_mapping: HashMap::from([
                ("jailbreak".to_string(), ExpectedLabel::Jailbreak),
                ("benign".to_string(), ExpectedLabel::Benign),
            ]),
        }
    }

    fn normalize(&self, raw: &str) -> ExpectedLabel {
        self.label_mapping
            .get(raw)
            .copied()
            .unwrap_or_else(|| ExpectedLabel::infer(raw))
    }
}

/// Explicit mappings for known dataset names
pub fn known_mapping(dataset_name: &str) -> Option<DatasetMapping> {
    match dataset_name {
        "jackhhao/jailbreak-classification" | "jackhhao/jailbreak_llms" => {
            Some(DatasetMapping::identity("prompt", "type"))
        }
        _ => None,
    }
}

const PROMPT_COLUMNS: [&str; 5] = ["prompt", "text", "input", "question", "query"];
const LABEL_COLUMNS: [&str; 5] = ["label", "type", "category", "class", "target"];

/// Infer a mapping from the available column names
fn infer_mapping(columns: &[String]) -> Result<DatasetMapping> {
    let prompt_column = columns
        .iter()
        .find(|c| PROMPT_COLUMNS.contains(&c.to_lowercase().as_str()))
        .cloned();
    let label_column = columns
        .iter()
        .find(|c| LABEL_COLUMNS.contains(&c.to_lowercase().as_str()))
        .cloned();

    match (prompt_column, label_column) {
        (Some(prompt_column), Some(label_column)) => Ok(DatasetMapping {
            prompt_column,
            label_column,
            label_mapping: HashMap::new(),
        }),
        _ => Err(Error::invalid_input(format!(
            "Could not infer dataset structure. Available columns: {:?}",
            columns
        ))),
    }
}

/// Loads and normalizes datasets
pub struct DatasetLoader {
    data_dir: PathBuf,
}

impl DatasetLoader {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    /// Load a named dataset from the data directory
    ///
    /// Resolution order: `{name}__{split}.csv`, `{name}__{split}.json`,
    /// `{name}.csv`, `{name}.json` (with `/` in the name flattened).
    pub fn load_named(
        &self,
        dataset_name: &str,
        split: &str,
        max_samples: Option<usize>,
    ) -> Result<Vec<DatasetSample>> {
        let base = dataset_name.replace('/', "__");
        let candidates = [
            format!("{}__{}.csv", base, split),
            format!("{}__{}.json", base, split),
            format!("{}.csv", base),
            format!("{}.json", base),
        ];

        for candidate in &candidates {
            let path = self.data_dir.join(candidate);
            if path.exists() {
                tracing::info!(dataset = dataset_name, file = %path.display(), "Loading dataset");
                let bytes = std::fs::read(&path)?;
                let file_type = if candidate.ends_with(".csv") {
                    "text/csv"
                } else {
                    "application/json"
                };
                return load_bytes(&bytes, file_type, known_mapping(dataset_name), max_samples);
            }
        }

        Err(Error::not_found(format!(
            "Dataset not found: {} (split {})",
            dataset_name, split
        )))
    }
}

/// Parse an uploaded dataset object
pub fn load_bytes(
    bytes: &[u8],
    file_type: &str,
    mapping: Option<DatasetMapping>,
    max_samples: Option<usize>,
) -> Result<Vec<DatasetSample>> {
    let rows = match file_type {
        "text/csv" => parse_csv(bytes)?,
        "application/json" => parse_json(bytes)?,
        other => {
            return Err(Error::invalid_input(format!(
                "Unsupported dataset file type: {}",
                other
            )))
        }
    };

    if rows.is_empty() {
        return Err(Error::invalid_input("Dataset is empty"));
    }

    let columns: Vec<String> = rows[0].keys().cloned().collect();
    let mapping = match mapping {
        Some(mapping) => mapping,
        None => {
            let inferred = infer_mapping(&columns)?;
            tracing::info!(
                prompt = %inferred.prompt_column,
                label = %inferred.label_column,
                "Inferred dataset mapping"
            );
            inferred
        }
    };

    let limit = max_samples.unwrap_or(usize::MAX);
    let mut samples = Vec::new();

    for row in rows {
        if samples.len() >= limit {
            break;
        }

        let Some(prompt) = row.get(&mapping.prompt_column) else {
            tracing::warn!("Row missing prompt column, skipping");
            continue;
        };
        let Some(raw_label) = row.get(&mapping.label_column) else {
            tracing::warn!("Row missing label column, skipping");
            continue;
        };

        let prompt = prompt.trim();
        if prompt.is_empty() {
            continue;
        }

        samples.push(DatasetSample {
            prompt: prompt.to_string(),
            expected_label: mapping.normalize(raw_label),
            index: samples.len(),
        });
    }

    if samples.is_empty() {
        return Err(Error::invalid_input("No samples loaded from dataset"));
    }

    tracing::info!(count = samples.len(), "Dataset loaded");
    Ok(samples)
}

/// Count the data rows of an uploaded dataset without normalizing labels
pub fn count_samples(bytes: &[u8], file_type: &str) -> Result<usize> {
    match file_type {
        "text/csv" => Ok(parse_csv(bytes)?.len()),
        "application/json" => Ok(parse_json(bytes)?.len()),
        other => Err(Error::invalid_input(format!(
            "Unsupported dataset file type: {}",
            other
        ))),
    }
}

fn parse_csv(bytes: &[u8]) -> Result<Vec<HashMap<String, String>>> {
    let mut reader = csv::Reader::from_reader(bytes);
    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| Error::invalid_input(format!("Invalid CSV header: {}", e)))?
        .iter()
        .map(str::to_string)
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| Error::invalid_input(format!("Invalid CSV row: {}", e)))?;
        let row: HashMap<String, String> = headers
            .iter()
            .zip(record.iter())
            .map(|(h, v)| (h.clone(), v.to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

fn parse_json(bytes: &[u8]) -> Result<Vec<HashMap<String, String>>> {
    let value: serde_json::Value = serde_json::from_slice(bytes)
        .map_err(|e| Error::invalid_input(format!("Invalid JSON dataset: {}", e)))?;

    let serde_json::Value::Array(items) = value else {
        return Err(Error::invalid_input("JSON dataset must be an array of objects"));
    };

    let mut rows = Vec::new();
    for item in items {
        let serde_json::Value::Object(map) = item else {
            return Err(Error::invalid_input("JSON dataset rows must be objects"));
        };
        let row: HashMap<String, String> = map
            .into_iter()
            .map(|(k, v)| {
                let text = match v {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                };
                (k, text)
            })
            .collect();
        rows.push(row);
    }
    Ok(rows)
}
