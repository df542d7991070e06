//! Embedding-head prompt-injection detector (variant id `custom_onnx`)
//!
//! Pipeline:
//!
//! 1. format the text with request-context metadata
//! 2. fetch an embedding from the HTTP embedding service
//! 3. run the two-class ONNX head on the embedding
//! 4. softmax and return the probability of the malign class (index 1)
//!
//! Embedding lookups use a 30 s timeout and up to 3 retries with
//! exponential backoff on 5xx responses. Any failure along the pipeline
//! drops to the deterministic keyword fallback.

use crate::adapters::classifier::softmax;
use crate::fallback::{keyword_score, INJECTION_KEYWORDS};
use crate::ports::PromptInjectionDetector;
use ndarray::Array2;
use ort::session::Session;
use semantic_firewall_core::{Error, RequestContext, Result};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Mutex, OnceLock};
use std::time::Duration;

/// Configuration for the embedding-head detector
#[derive(Debug, Clone)]
pub struct EmbeddingDetectorConfig {
    /// Path to the two-class ONNX head
    pub model_path: PathBuf,
    /// Base URL of the embedding service
    pub embedding_url: String,
    /// Embedding model name sent to the service
    pub embedding_model: String,
    /// Per-request timeout
    pub timeout: Duration,
    /// Retries on 5xx responses
    pub max_retries: u32,
}

impl Default for EmbeddingDetectorConfig {
    fn default() -> Self {
        Self {
            model_path: PathBuf::from("models/sf_injection_v1.onnx"),
            embedding_url: "http://ollama:11434".to_string(),
            embedding_model: "nomic-embed-text:v1.5".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
        }
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

enum HeadState {
    NotLoaded,
    Loaded,
    Failed,
}

/// Embedding + ONNX head detector
pub struct EmbeddingInjectionDetector {
    config: EmbeddingDetectorConfig,
    http: OnceLock<reqwest::blocking::Client>,
    session: Mutex<Option<Session>>,
    state: Mutex<HeadState>,
}

impl EmbeddingInjectionDetector {
    pub fn new(config: EmbeddingDetectorConfig) -> Self {
        Self {
            config,
            http: OnceLock::new(),
            session: Mutex::new(None),
            state: Mutex::new(HeadState::NotLoaded),
        }
    }

    fn client(&self) -> &reqwest::blocking::Client {
        self.http.get_or_init(|| {
            reqwest::blocking::Client::builder()
                .timeout(self.config.timeout)
                .build()
                .unwrap_or_default()
        })
    }

    /// Lazy-load the ONNX head; stay in fallback mode after one failure
    fn ensure_loaded(&self) -> bool {
        let mut state = match self.state.lock() {
            Ok(state) => state,
            Err(_) => return false,
        };

        match &*state {
            HeadState::Loaded => true,
            HeadState::Failed => false,
            HeadState::NotLoaded => {
                match Session::builder()
                    .map_err(|e| Error::model(format!("Failed to create session builder: {}", e)))
                    .and_then(|b| {
                        b.commit_from_file(&self.config.model_path).map_err(|e| {
                            Error::model(format!(
                                "Failed to load model from '{}': {}",
                                self.config.model_path.display(),
                                e
                            ))
                        })
                    }) {
                    Ok(session) => {
                        tracing::info!(
                            model = %self.config.model_path.display(),
                            "Loaded prompt-injection head"
                        );
                        *self.session.lock().unwrap() = Some(session);
                        *state = HeadState::Loaded;
                        true
                    }
                    Err(e) => {
                        tracing::warn!(
                            model = %self.config.model_path.display(),
                            error = %e,
                            "Failed to load prompt-injection head, entering fallback mode"
                        );
                        *state = HeadState::Failed;
                        false
                    }
                }
            }
        }
    }

    /// Format the text with request metadata for embedding conditioning
    fn format_with_context(&self, text: &str, context: Option<&RequestContext>) -> String {
        match context {
            Some(ctx) => format!(
                "text: {} || UserID: {} || Temperature: {} || Tokens: {} || Turn_Count: {} || Rate_Limit: {} || Device: {} || Endpoint: {}",
                text,
                ctx.user_id_or_default(),
                ctx.temperature_or_default(),
                ctx.max_tokens_or_default(),
                ctx.turn_count_or_default(),
                ctx.rate_limit_or_default(),
                ctx.device_or_default(),
                ctx.endpoint_or_default(),
            ),
            None => format!(
                "text: {} || UserID: runtime_user || Temperature: 0.5 || Tokens: 20 || Turn_Count: 1 || Rate_Limit: 0 || Device: Unknown || Endpoint: /threat/query",
                text
            ),
        }
    }

    /// Fetch an embedding, retrying 5xx responses with exponential backoff
    fn fetch_embedding(&self, text: &str) -> Result<Vec<f32>> {
        let url = format!(
            "{}/api/embeddings",
            self.config.embedding_url.trim_end_matches('/')
        );
        let body = serde_json::json!({
            "model": self.config.embedding_model,
            "prompt": text,
        });

        let mut attempt = 0;
        loop {
            let response = self
                .client()
                .post(&url)
                .json(&body)
                .send()
                .map_err(|e| Error::detector("custom_onnx", format!("Embedding request failed: {}", e)))?;

            let status = response.status();
            if status.is_server_error() && attempt < self.config.max_retries {
                attempt += 1;
                let backoff = Duration::from_millis(250 * (1 << attempt));
                tracing::warn!(%status, attempt, "Embedding service 5xx, backing off");
                std::thread::sleep(backoff);
                continue;
            }

            if !status.is_success() {
                return Err(Error::detector(
                    "custom_onnx",
                    format!("Embedding service returned {}", status),
                ));
            }

            let parsed: EmbeddingResponse = response
                .json()
                .map_err(|e| Error::detector("custom_onnx", format!("Invalid embedding response: {}", e)))?;

            if parsed.embedding.is_empty() {
                return Err(Error::detector("custom_onnx", "Empty embedding from service"));
            }

            return Ok(parsed.embedding);
        }
    }

    /// Run the two-class head on an embedding and return the malign
    /// probability
    fn infer(&self, embedding: &[f32]) -> Result<f32> {
        let mut guard = self
            .session
            .lock()
            .map_err(|_| Error::internal("Injection head lock poisoned"))?;
        let session = guard
            .as_mut()
            .ok_or_else(|| Error::model("Injection head not loaded"))?;

        let input = Array2::from_shape_vec((1, embedding.len()), embedding.to_vec())
            .map_err(|e| Error::model(format!("Failed to create input array: {}", e)))?;

        let input_tensor = ort::value::TensorRef::from_array_view(input.view())
            .map_err(|e| Error::model(format!("Failed to create inputs: {}", e)))?;

        let outputs = session
            .run(ort::inputs!["input" => input_tensor])
            .map_err(|e| Error::model(format!("Inference failed: {}", e)))?;

        let logits = outputs["logits"]
            .try_extract_tensor::<f32>()
            .map_err(|e| Error::model(format!("Failed to extract logits: {}", e)))?;

        let row: Vec<f32> = logits.1.iter().copied().collect();
        if row.is_empty() {
            return Err(Error::model("Injection head produced empty logits"));
        }

        let probs = softmax(&row);
        let score = if probs.len() >= 2 { probs[1] } else { probs[0] };
        Ok(score.clamp(0.0, 1.0))
    }
}

impl PromptInjectionDetector for EmbeddingInjectionDetector {
    fn name(&self) -> &str {
        "custom_onnx"
    }

    fn detect(&self, text: &str, context: Option<&RequestContext>) -> Result<f32> {
        if self.ensure_loaded() {
            let formatted = self.format_with_context(text, context);
            match self
                .fetch_embedding(&formatted)
                .and_then(|embedding| self.infer(&embedding))
            {
                Ok(score) => return Ok(score),
                Err(e) => {
                    tracing::warn!(error = %e, "Embedding pipeline failed, using keyword fallback");
                }
            }
        }

        Ok(keyword_score(text, INJECTION_KEYWORDS))
    }
}
