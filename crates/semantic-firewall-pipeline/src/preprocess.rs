//! Preprocessor
//!
//! Normalizes raw text and extracts the lightweight features the policy
//! engine conditions on. Vectorization is decoupled from the synchronous
//! path: live requests skip it, and the optional stores only see data when
//! the caller asks for persistence.

use regex::Regex;
use semantic_firewall_core::{PreprocessedText, TextFeatures};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use unicode_normalization::UnicodeNormalization;
use uuid::Uuid;

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static DIGITS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d").unwrap());
static SPECIAL_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[!@#$%^&*(),.?":{}|<>]"#).unwrap());
static URLS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://\S+").unwrap());
static EMAILS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap());

/// NFKC-fold, lowercase, collapse whitespace, trim
///
/// Unicode normalization runs first so homoglyph tricks (fullwidth
/// letters, compatibility forms) cannot slip past the downstream
/// detectors.
pub fn normalize(text: &str) -> String {
    if text.is_empty() {
        return String::new();
    }
    let folded: String = text.nfkc().collect();
    let lowered = folded.to_lowercase();
    let collapsed = WHITESPACE.replace_all(&lowered, " ");
    collapsed.trim().to_string()
}

/// Extract features from normalized text; empty input yields all zeros
pub fn extract_features(text: &str) -> TextFeatures {
    if text.is_empty() {
        return TextFeatures::default();
    }

    TextFeatures {
        length: text.len(),
        word_count: text.split_whitespace().count(),
        char_count: text.len(),
        has_numbers: DIGITS.is_match(text),
        has_special_chars: SPECIAL_CHARS.is_match(text),
        url_count: URLS.find_iter(text).count(),
        email_count: EMAILS.find_iter(text).count(),
    }
}

/// Optional embedding backend
pub trait Vectorizer: Send + Sync {
    fn vectorize(&self, text: &str) -> Vec<f32>;
}

/// Optional vector persistence
pub trait VectorStore: Send + Sync {
    fn store(&self, vector_id: &str, embedding: &[f32], metadata: serde_json::Value);
}

/// Optional feature persistence
pub trait FeatureStore: Send + Sync {
    fn store(&self, vector_id: &str, features: &TextFeatures);
}

/// In-memory feature store
#[derive(Default)]
pub struct MemoryFeatureStore {
    entries: Mutex<HashMap<String, TextFeatures>>,
}

impl MemoryFeatureStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, vector_id: &str) -> Option<TextFeatures> {
        self.entries.lock().unwrap().get(vector_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FeatureStore for MemoryFeatureStore {
    fn store(&self, vector_id: &str, features: &TextFeatures) {
        self.entries
            .lock()
            .unwrap()
            .insert(vector_id.to_string(), features.clone());
    }
}

/// Preprocessing service
#[derive(Default)]
pub struct Preprocessor {
    vectorizer: Option<Arc<dyn Vectorizer>>,
    vector_store: Option<Arc<dyn VectorStore>>,
    feature_store: Option<Arc<dyn FeatureStore>>,
}

impl Preprocessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_vectorizer(mut self, vectorizer: Arc<dyn Vectorizer>) -> Self {
        self.vectorizer = Some(vectorizer);
        self
    }

    pub fn with_vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn with_feature_store(mut self, store: Arc<dyn FeatureStore>) -> Self {
        self.feature_store = Some(store);
        self
    }

    /// Normalize, extract features and optionally persist
    ///
    /// The embedding is only computed when persistence is requested and a
    /// vectorizer is wired; the live request path keeps `store = false`.
    pub fn preprocess(&self, text: &str, store: bool) -> PreprocessedText {
        let vector_id = Uuid::new_v4().to_string();
        let normalized = normalize(text);
        let features = extract_features(&normalized);

        let embedding = if store {
            self.vectorizer
                .as_ref()
                .map(|v| v.vectorize(&normalized))
                .unwrap_or_default()
        } else {
            Vec::new()
        };

        if store {
            if let Some(vector_store) = &self.vector_store {
                let metadata = serde_json::json!({
                    "original_length": text.len(),
                    "normalized_length": normalized.len(),
                    "word_count": features.word_count,
                });
                vector_store.store(&vector_id, &embedding, metadata);
            }
            if let Some(feature_store) = &self.feature_store {
                feature_store.store(&vector_id, &features);
            }
        }

        PreprocessedText {
            original: text.to_string(),
            normalized,
            features,
            embedding,
            vector_id,
        }
    }
}
