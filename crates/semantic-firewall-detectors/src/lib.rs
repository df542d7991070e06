//! Detectors for the Semantic Firewall
//!
//! One small port per detector kind, a set of adapters behind them, and a
//! process-wide registry that caches one live instance per
//! `(kind, model name)`:
//!
//! - [`ports`] - the four detector traits
//! - [`adapters`] - concrete backends (pattern, ONNX classifier, embedding
//!   head, heuristic rules, mock)
//! - [`DetectorRegistry`] - lazy, thread-safe factory with a shared cache
//! - [`MlFilterService`] - the parallel four-way fan-out
//!
//! Every adapter recovers from a missing or broken model by falling back
//! to deterministic keyword or pattern scoring; a detector call never
//! takes the pipeline down.

pub mod adapters;
pub mod fallback;
pub mod ports;
pub mod registry;
pub mod service;

pub use ports::{
    HeuristicDetector, HeuristicVerdict, PiiDetector, PromptInjectionDetector, ToxicityDetector,
};
pub use registry::{
    DetectorKind, DetectorRegistry, DetectorSelection, DetectorSettings, DEFAULT_PII,
    DEFAULT_PROMPT_INJECTION, DEFAULT_TOXICITY, PII_MODELS, PROMPT_INJECTION_MODELS,
    TOXICITY_MODELS,
};
pub use service::MlFilterService;
