//! Concrete detector backends
//!
//! Each adapter implements exactly one port from [`crate::ports`] and is
//! selected by its variant id through the registry:
//!
//! | kind | variant ids | adapter |
//! |------|-------------|---------|
//! | prompt injection | `custom_onnx` | [`EmbeddingInjectionDetector`] |
//! | prompt injection | `deberta`, `llama_guard_86m`, `llama_guard_22m` | [`ClassifierInjectionDetector`] |
//! | pii | `presidio` | [`PatternPiiDetector`] |
//! | pii | `onnx` | [`OnnxPiiDetector`] |
//! | pii | `mock` | [`MockPiiDetector`] |
//! | toxicity | `detoxify`, `onnx` | [`OnnxToxicityDetector`] |
//! | heuristic | `regex` | [`RegexHeuristicDetector`] |

pub mod classifier;
pub mod embedding;
pub mod heuristic;
pub mod mock_pii;
pub mod pattern_pii;

pub use classifier::{ClassifierInjectionDetector, OnnxPiiDetector, OnnxToxicityDetector};
pub use embedding::EmbeddingInjectionDetector;
pub use heuristic::RegexHeuristicDetector;
pub use mock_pii::MockPiiDetector;
pub use pattern_pii::PatternPiiDetector;
