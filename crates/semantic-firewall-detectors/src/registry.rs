//! Detector registry
//!
//! Process-wide factory keyed by `(kind, model name)`. Each key resolves to
//! one shared, immutable detector instance:
//!
//! - the cache map is guarded by a mutex held only for slot lookup/insert
//! - each slot is a `OnceLock`, so concurrent first calls for the same key
//!   load the model exactly once while different keys proceed in parallel
//! - construction never fails for a known model name; a backend that cannot
//!   load runs in fallback mode instead
//! - the cache is inspectable and clearable; callers holding an `Arc` keep
//!   working after a clear

use crate::adapters::{
    ClassifierInjectionDetector, EmbeddingInjectionDetector, MockPiiDetector, OnnxPiiDetector,
    OnnxToxicityDetector, PatternPiiDetector, RegexHeuristicDetector,
};
use crate::adapters::embedding::EmbeddingDetectorConfig;
use crate::ports::{HeuristicDetector, PiiDetector, PromptInjectionDetector, ToxicityDetector};
use semantic_firewall_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, OnceLock};

/// Default prompt-injection variant
pub const DEFAULT_PROMPT_INJECTION: &str = "custom_onnx";
/// Default PII variant
pub const DEFAULT_PII: &str = "presidio";
/// Default toxicity variant
pub const DEFAULT_TOXICITY: &str = "onnx";

/// Known prompt-injection variants
pub const PROMPT_INJECTION_MODELS: &[&str] =
    &["custom_onnx", "deberta", "llama_guard_86m", "llama_guard_22m"];
/// Known PII variants
pub const PII_MODELS: &[&str] = &["presidio", "onnx", "mock"];
/// Known toxicity variants
pub const TOXICITY_MODELS: &[&str] = &["detoxify", "onnx"];

/// Detector kinds addressable through the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectorKind {
    PromptInjection,
    Pii,
    Toxicity,
    Heuristic,
}

impl DetectorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectorKind::PromptInjection => "prompt_injection",
            DetectorKind::Pii => "pii",
            DetectorKind::Toxicity => "toxicity",
            DetectorKind::Heuristic => "heuristic",
        }
    }
}

impl fmt::Display for DetectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-request detector selection, as carried in the `detector_config`
/// request field
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DetectorSelection {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_injection: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pii: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub toxicity: Option<String>,
}

impl DetectorSelection {
    pub fn prompt_injection_or_default(&self) -> &str {
        self.prompt_injection
            .as_deref()
            .unwrap_or(DEFAULT_PROMPT_INJECTION)
    }

    pub fn pii_or_default(&self) -> &str {
        self.pii.as_deref().unwrap_or(DEFAULT_PII)
    }

    pub fn toxicity_or_default(&self) -> &str {
        self.toxicity.as_deref().unwrap_or(DEFAULT_TOXICITY)
    }

    /// Wire representation for events and config snapshots
    pub fn as_map(&self) -> HashMap<String, String> {
        let mut map = HashMap::new();
        if let Some(v) = &self.prompt_injection {
            map.insert("prompt_injection".to_string(), v.clone());
        }
        if let Some(v) = &self.pii {
            map.insert("pii".to_string(), v.clone());
        }
        if let Some(v) = &self.toxicity {
            map.insert("toxicity".to_string(), v.clone());
        }
        map
    }

    pub fn is_empty(&self) -> bool {
        self.prompt_injection.is_none() && self.pii.is_none() && self.toxicity.is_none()
    }
}

/// Filesystem and service locations detectors are built from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorSettings {
    /// Directory holding per-variant model subdirectories plus the
    /// embedding-head file `sf_injection_v1.onnx`
    pub models_dir: PathBuf,

    /// Heuristic rules YAML
    pub rules_path: PathBuf,

    /// Base URL of the embedding service
    pub embedding_url: String,

    /// Embedding model name
    pub embedding_model: String,

    /// Score returned by the `mock` PII variant
    pub mock_pii_score: f32,
}

impl Default for DetectorSettings {
    fn default() -> Self {
        Self {
            models_dir: PathBuf::from("models"),
            rules_path: PathBuf::from("rules/prompt_injection_rules.yaml"),
            embedding_url: "http://ollama:11434".to_string(),
            embedding_model: "nomic-embed-text:v1.5".to_string(),
            mock_pii_score: 0.0,
        }
    }
}

/// A cached detector of any kind
#[derive(Clone)]
enum AnyDetector {
    Injection(Arc<dyn PromptInjectionDetector>),
    Pii(Arc<dyn PiiDetector>),
    Toxicity(Arc<dyn ToxicityDetector>),
    Heuristic(Arc<dyn HeuristicDetector>),
}

type CacheKey = (DetectorKind, String);
type Slot = Arc<OnceLock<AnyDetector>>;

/// Process-wide detector factory and cache
pub struct DetectorRegistry {
    settings: DetectorSettings,
    cache: Mutex<HashMap<CacheKey, Slot>>,
}

impl DetectorRegistry {
    pub fn new(settings: DetectorSettings) -> Self {
        Self {
            settings,
            cache: Mutex::new(HashMap::new()),
        }
    }

    pub fn settings(&self) -> &DetectorSettings {
        &self.settings
    }

    /// Fetch-or-create the slot for a key; the map lock is released before
    /// any model loading happens
    fn slot(&self, kind: DetectorKind, model: &str) -> Slot {
        let mut cache = self.cache.lock().unwrap();
        cache
            .entry((kind, model.to_string()))
            .or_insert_with(|| Arc::new(OnceLock::new()))
            .clone()
    }

    /// Get or build the prompt-injection detector for a variant
    pub fn prompt_injection(&self, model: Option<&str>) -> Result<Arc<dyn PromptInjectionDetector>> {
        let model = model.unwrap_or(DEFAULT_PROMPT_INJECTION);
        if !PROMPT_INJECTION_MODELS.contains(&model) {
            return Err(Error::invalid_input(format!(
                "Unknown prompt injection model: {}. Available: {:?}",
                model, PROMPT_INJECTION_MODELS
            )));
        }

        let slot = self.slot(DetectorKind::PromptInjection, model);
        let detector = slot.get_or_init(|| {
            tracing::info!(kind = "prompt_injection", model, "Building detector");
            AnyDetector::Injection(self.build_injection(model))
        });

        match detector {
            AnyDetector::Injection(d) => Ok(Arc::clone(d)),
            _ => Err(Error::internal("Detector cache kind mismatch")),
        }
    }

    /// Get or build the PII detector for a variant
    pub fn pii(&self, model: Option<&str>) -> Result<Arc<dyn PiiDetector>> {
        let model = model.unwrap_or(DEFAULT_PII);
        if !PII_MODELS.contains(&model) {
            return Err(Error::invalid_input(format!(
                "Unknown PII model: {}. Available: {:?}",
                model, PII_MODELS
            )));
        }

        let slot = self.slot(DetectorKind::Pii, model);
        let detector = slot.get_or_init(|| {
            tracing::info!(kind = "pii", model, "Building detector");
            AnyDetector::Pii(self.build_pii(model))
        });

        match detector {
            AnyDetector::Pii(d) => Ok(Arc::clone(d)),
            _ => Err(Error::internal("Detector cache kind mismatch")),
        }
    }

    /// Get or build the toxicity detector for a variant
    pub fn toxicity(&self, model: Option<&str>) -> Result<Arc<dyn ToxicityDetector>> {
        let model = model.unwrap_or(DEFAULT_TOXICITY);
        if !TOXICITY_MODELS.contains(&model) {
            return Err(Error::invalid_input(format!(
                "Unknown toxicity model: {}. Available: {:?}",
                model, TOXICITY_MODELS
            )));
        }

        let slot = self.slot(DetectorKind::Toxicity, model);
        let detector = slot.get_or_init(|| {
            tracing::info!(kind = "toxicity", model, "Building detector");
            AnyDetector::Toxicity(self.build_toxicity(model))
        });

        match detector {
            AnyDetector::Toxicity(d) => Ok(Arc::clone(d)),
            _ => Err(Error::internal("Detector cache kind mismatch")),
        }
    }

    /// Get or build the heuristic detector
    ///
    /// An unreadable rules file degrades to an empty rule set rather than
    /// failing; the incident is logged.
    pub fn heuristic(&self) -> Arc<dyn HeuristicDetector> {
        let slot = self.slot(DetectorKind::Heuristic, "regex");
        let detector = slot.get_or_init(|| {
            let built = match RegexHeuristicDetector::from_file(&self.settings.rules_path) {
                Ok(detector) => {
                    tracing::info!(
                        rules = %self.settings.rules_path.display(),
                        count = detector.rule_count(),
                        "Loaded heuristic rules"
                    );
                    detector
                }
                Err(e) => {
                    tracing::warn!(
                        rules = %self.settings.rules_path.display(),
                        error = %e,
                        "Failed to load heuristic rules, running with empty rule set"
                    );
                    RegexHeuristicDetector::empty()
                }
            };
            AnyDetector::Heuristic(Arc::new(built))
        });

        match detector {
            AnyDetector::Heuristic(d) => Arc::clone(d),
            // Slot keys are kind-scoped; this arm is unreachable
            _ => Arc::new(RegexHeuristicDetector::empty()),
        }
    }

    fn build_injection(&self, model: &str) -> Arc<dyn PromptInjectionDetector> {
        match model {
            "custom_onnx" => Arc::new(EmbeddingInjectionDetector::new(EmbeddingDetectorConfig {
                model_path: self.settings.models_dir.join("sf_injection_v1.onnx"),
                embedding_url: self.settings.embedding_url.clone(),
                embedding_model: self.settings.embedding_model.clone(),
                ..Default::default()
            })),
            other => Arc::new(ClassifierInjectionDetector::new(
                other,
                self.settings.models_dir.join(other),
            )),
        }
    }

    fn build_pii(&self, model: &str) -> Arc<dyn PiiDetector> {
        match model {
            "onnx" => Arc::new(OnnxPiiDetector::new(self.settings.models_dir.join("pii"))),
            "mock" => Arc::new(MockPiiDetector::new(self.settings.mock_pii_score)),
            _ => Arc::new(PatternPiiDetector::new()),
        }
    }

    fn build_toxicity(&self, model: &str) -> Arc<dyn ToxicityDetector> {
        let dir = match model {
            "detoxify" => self.settings.models_dir.join("detoxify"),
            _ => self.settings.models_dir.join("toxicity"),
        };
        Arc::new(OnnxToxicityDetector::new(model, dir))
    }

    /// Available variants per kind
    pub fn available_models() -> HashMap<String, Vec<String>> {
        HashMap::from([
            (
                "prompt_injection".to_string(),
                PROMPT_INJECTION_MODELS.iter().map(|s| s.to_string()).collect(),
            ),
            (
                "pii".to_string(),
                PII_MODELS.iter().map(|s| s.to_string()).collect(),
            ),
            (
                "toxicity".to_string(),
                TOXICITY_MODELS.iter().map(|s| s.to_string()).collect(),
            ),
        ])
    }

    /// Default variant per kind
    pub fn default_models() -> HashMap<String, String> {
        HashMap::from([
            (
                "prompt_injection".to_string(),
                DEFAULT_PROMPT_INJECTION.to_string(),
            ),
            ("pii".to_string(), DEFAULT_PII.to_string()),
            ("toxicity".to_string(), DEFAULT_TOXICITY.to_string()),
        ])
    }

    /// Keys of detectors that finished construction, sorted
    pub fn cached_keys(&self) -> Vec<String> {
        let cache = self.cache.lock().unwrap();
        let mut keys: Vec<String> = cache
            .iter()
            .filter(|(_, slot)| slot.get().is_some())
            .map(|((kind, model), _)| format!("{}/{}", kind, model))
            .collect();
        keys.sort();
        keys
    }

    /// Number of constructed detectors in the cache
    pub fn cache_size(&self) -> usize {
        let cache = self.cache.lock().unwrap();
        cache.values().filter(|slot| slot.get().is_some()).count()
    }

    /// Drop all cached references; outstanding users keep their instances
    ///
    /// Returns the number of constructed detectors removed.
    pub fn clear_cache(&self) -> usize {
        let mut cache = self.cache.lock().unwrap();
        let count = cache.values().filter(|slot| slot.get().is_some()).count();
        cache.clear();
        tracing::info!(removed = count, "Detector cache cleared");
        count
    }

    /// Construct and invoke the default detectors once, then pre-warm the
    /// alternate variants best-effort
    pub fn warm_up(&self) {
        const WARMUP_TEXT: &str = "This is a warmup text to load all ML models.";

        tracing::info!("Warming up default detectors");
        if let Ok(detector) = self.pii(None) {
            let _ = detector.detect(WARMUP_TEXT);
        }
        if let Ok(detector) = self.toxicity(None) {
            let _ = detector.detect(WARMUP_TEXT);
        }
        if let Ok(detector) = self.prompt_injection(None) {
            let _ = detector.detect(WARMUP_TEXT, None);
        }
        let _ = self.heuristic().detect(WARMUP_TEXT);

        tracing::info!("Pre-warming alternate detector variants");
        for model in PROMPT_INJECTION_MODELS {
            if let Err(e) = self
                .prompt_injection(Some(model))
                .and_then(|d| d.detect(WARMUP_TEXT, None))
            {
                tracing::warn!(model, error = %e, "Prompt-injection warm-up failed");
            }
        }
        for model in PII_MODELS {
            if let Err(e) = self.pii(Some(model)).and_then(|d| d.detect(WARMUP_TEXT)) {
                tracing::warn!(model, error = %e, "PII warm-up failed");
            }
        }
        for model in TOXICITY_MODELS {
            if let Err(e) = self.toxicity(Some(model)).and_then(|d| d.detect(WARMUP_TEXT)) {
                tracing::warn!(model, error = %e, "Toxicity warm-up failed");
            }
        }

        tracing::info!(cached = self.cache_size(), "Warm-up completed");
    }
}

impl Default for DetectorRegistry {
    fn default() -> Self {
        Self::new(DetectorSettings::default())
    }
}
