//! ONNX text-classifier detectors
//!
//! A shared [`TextClassifier`] (tokenizer + ONNX session + softmax) backs
//! the transformer-based variants:
//!
//! - prompt injection: `deberta`, `llama_guard_86m`, `llama_guard_22m`
//! - toxicity: `detoxify`, `onnx`
//! - pii: `onnx`
//!
//! Label mapping for injection models: `LABEL_0`/`BENIGN`/`SAFE` scores
//! `1 - confidence`; `LABEL_1`/`INJECTION` and `LABEL_2`/`JAILBREAK` score
//! `0.7 + 0.3 * confidence`; anything unexpected scores the raw confidence.
//!
//! Models load lazily on first use. A variant whose model directory is
//! missing enters fallback mode (keyword or pattern scoring) instead of
//! failing; the incident is logged once.

use crate::adapters::pattern_pii::pattern_pii_score;
use crate::fallback::{keyword_score, INJECTION_KEYWORDS_EXTENDED, TOXICITY_KEYWORDS};
use crate::ports::{PiiDetector, PromptInjectionDetector, ToxicityDetector};
use ndarray::Array2;
use ort::session::Session;
use semantic_firewall_core::{Error, RequestContext, Result};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokenizers::Tokenizer;

/// Classification output: winning label index and softmax probabilities
#[derive(Debug, Clone)]
pub struct Classification {
    pub label: String,
    pub confidence: f32,
    pub probabilities: Vec<f32>,
}

/// Tokenizer + ONNX session pair for sequence classification
pub struct TextClassifier {
    // ort 2.0 sessions take &mut self to run
    session: Mutex<Session>,
    tokenizer: Tokenizer,
    max_length: usize,
}

impl TextClassifier {
    /// Load `model.onnx` and `tokenizer.json` from a model directory
    pub fn load(model_dir: &Path, max_length: usize) -> Result<Self> {
        let model_path = model_dir.join("model.onnx");
        let tokenizer_path = model_dir.join("tokenizer.json");

        let session = Session::builder()
            .map_err(|e| Error::model(format!("Failed to create session builder: {}", e)))?
            .commit_from_file(&model_path)
            .map_err(|e| {
                Error::model(format!(
                    "Failed to load model from '{}': {}",
                    model_path.display(),
                    e
                ))
            })?;

        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| {
            Error::model(format!(
                "Failed to load tokenizer from '{}': {}",
                tokenizer_path.display(),
                e
            ))
        })?;

        Ok(Self {
            session: Mutex::new(session),
            tokenizer,
            max_length,
        })
    }

    /// Classify a text and return the winning label with probabilities
    pub fn classify(&self, text: &str) -> Result<Classification> {
        let encoding = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| Error::model(format!("Tokenization failed: {}", e)))?;

        let mut ids: Vec<i64> = encoding.get_ids().iter().map(|&x| x as i64).collect();
        let mut mask: Vec<i64> = encoding
            .get_attention_mask()
            .iter()
            .map(|&x| x as i64)
            .collect();
        ids.truncate(self.max_length);
        mask.truncate(self.max_length);

        let seq_len = ids.len();
        let input_ids = Array2::from_shape_vec((1, seq_len), ids)
            .map_err(|e| Error::model(format!("Failed to create input array: {}", e)))?;
        let attention_mask = Array2::from_shape_vec((1, seq_len), mask)
            .map_err(|e| Error::model(format!("Failed to create attention mask array: {}", e)))?;

        let mut session = self
            .session
            .lock()
            .map_err(|_| Error::internal("Classifier session lock poisoned"))?;

        let input_ids_tensor = ort::value::TensorRef::from_array_view(input_ids.view())
            .map_err(|e| Error::model(format!("Failed to create inputs: {}", e)))?;
        let attention_mask_tensor = ort::value::TensorRef::from_array_view(attention_mask.view())
            .map_err(|e| Error::model(format!("Failed to create inputs: {}", e)))?;

        let outputs = session
            .run(ort::inputs![
                "input_ids" => input_ids_tensor,
                "attention_mask" => attention_mask_tensor,
            ])
            .map_err(|e| Error::model(format!("Inference failed: {}", e)))?;

        let logits = outputs["logits"]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::model(format!("Failed to extract logits: {}", e)))?;

        let row: Vec<f32> = logits.1.iter().copied().collect();
        if row.is_empty() {
            return Err(Error::model("Classifier produced empty logits"));
        }

        let probabilities = softmax(&row);
        let (predicted, confidence) = probabilities
            .iter()
            .copied()
            .enumerate()
            .max_by(|(_, a), (_, b)| a.total_cmp(b))
            .unwrap();

        Ok(Classification {
            label: format!("LABEL_{}", predicted),
            confidence,
            probabilities,
        })
    }
}

/// Numerically stable softmax
pub fn softmax(logits: &[f32]) -> Vec<f32> {
    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp: Vec<f32> = logits.iter().map(|&x| (x - max_logit).exp()).collect();
    let sum: f32 = exp.iter().sum();
    exp.iter().map(|&x| x / sum).collect()
}

/// Map an injection classifier label to a score
pub fn map_injection_label_to_score(label: &str, confidence: f32) -> f32 {
    let upper = label.to_uppercase();

    let is_benign = matches!(upper.as_str(), "LABEL_0" | "BENIGN" | "SAFE");
    let is_injection = matches!(upper.as_str(), "LABEL_1" | "INJECTION");
    let is_jailbreak = matches!(upper.as_str(), "LABEL_2" | "JAILBREAK");

    if is_benign {
        (1.0 - confidence).max(0.0)
    } else if is_injection || is_jailbreak {
        0.7 + confidence * 0.3
    } else {
        confidence
    }
}

/// Lazily loaded classifier shared by the adapter variants
enum LoadState {
    NotLoaded,
    Loaded(Arc<TextClassifier>),
    Failed,
}

struct LazyClassifier {
    model_dir: PathBuf,
    max_length: usize,
    state: Mutex<LoadState>,
}

impl LazyClassifier {
    fn new(model_dir: PathBuf, max_length: usize) -> Self {
        Self {
            model_dir,
            max_length,
            state: Mutex::new(LoadState::NotLoaded),
        }
    }

    /// Load on first call; after a failure stay in fallback mode
    fn get(&self, detector: &str) -> Option<Arc<TextClassifier>> {
        let mut state = self.state.lock().ok()?;
        match &*state {
            LoadState::Loaded(classifier) => Some(Arc::clone(classifier)),
            LoadState::Failed => None,
            LoadState::NotLoaded => match TextClassifier::load(&self.model_dir, self.max_length) {
                Ok(classifier) => {
                    tracing::info!(
                        detector,
                        model_dir = %self.model_dir.display(),
                        "Loaded ONNX classifier"
                    );
                    let classifier = Arc::new(classifier);
                    *state = LoadState::Loaded(Arc::clone(&classifier));
                    Some(classifier)
                }
                Err(e) => {
                    tracing::warn!(
                        detector,
                        model_dir = %self.model_dir.display(),
                        error = %e,
                        "Failed to load classifier, entering fallback mode"
                    );
                    *state = LoadState::Failed;
                    None
                }
            },
        }
    }
}

/// Transformer prompt-injection detector (`deberta`, `llama_guard_*`)
pub struct ClassifierInjectionDetector {
    name: String,
    classifier: LazyClassifier,
}

impl ClassifierInjectionDetector {
    pub fn new<S: Into<String>>(name: S, model_dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            classifier: LazyClassifier::new(model_dir, 512),
        }
    }
}

impl PromptInjectionDetector for ClassifierInjectionDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, text: &str, _context: Option<&RequestContext>) -> Result<f32> {
        if let Some(classifier) = self.classifier.get(&self.name) {
            match classifier.classify(text) {
                Ok(result) => {
                    return Ok(map_injection_label_to_score(&result.label, result.confidence))
                }
                Err(e) => {
                    tracing::warn!(detector = %self.name, error = %e, "Inference failed, using fallback");
                }
            }
        }

        Ok(keyword_score(text, INJECTION_KEYWORDS_EXTENDED))
    }
}

/// ONNX toxicity detector (`detoxify`, `onnx`)
///
/// Multi-class heads score the summed probability of every non-benign
/// class; binary heads score the probability of class 1.
pub struct OnnxToxicityDetector {
    name: String,
    classifier: LazyClassifier,
}

impl OnnxToxicityDetector {
    pub fn new<S: Into<String>>(name: S, model_dir: PathBuf) -> Self {
        Self {
            name: name.into(),
            classifier: LazyClassifier::new(model_dir, 512),
        }
    }
}

impl ToxicityDetector for OnnxToxicityDetector {
    fn name(&self) -> &str {
        &self.name
    }

    fn detect(&self, text: &str) -> Result<f32> {
        if let Some(classifier) = self.classifier.get(&self.name) {
            match classifier.classify(text) {
                Ok(result) => {
                    let score = if result.probabilities.len() > 1 {
                        result.probabilities[1..].iter().sum::<f32>()
                    } else {
                        result.probabilities[0]
                    };
                    return Ok(score.clamp(0.0, 1.0));
                }
                Err(e) => {
                    tracing::warn!(detector = %self.name, error = %e, "Inference failed, using fallback");
                }
            }
        }

        Ok(keyword_score(text, TOXICITY_KEYWORDS))
    }
}

/// ONNX PII detector (`onnx`)
///
/// Scores the probability of the PII class; falls back to the weighted
/// pattern score when the model is unavailable.
pub struct OnnxPiiDetector {
    classifier: LazyClassifier,
}

impl OnnxPiiDetector {
    pub fn new(model_dir: PathBuf) -> Self {
        Self {
            classifier: LazyClassifier::new(model_dir, 512),
        }
    }
}

impl PiiDetector for OnnxPiiDetector {
    fn name(&self) -> &str {
        "onnx"
    }

    fn detect(&self, text: &str) -> Result<f32> {
        if let Some(classifier) = self.classifier.get("onnx_pii") {
            match classifier.classify(text) {
                Ok(result) => {
                    let score = if result.probabilities.len() > 1 {
                        result.probabilities[1]
                    } else {
                        result.probabilities[0]
                    };
                    return Ok(score.clamp(0.0, 1.0));
                }
                Err(e) => {
                    tracing::warn!(detector = "onnx_pii", error = %e, "Inference failed, using fallback");
                }
            }
        }

        Ok(pattern_pii_score(text))
    }
}
