//! Core types for the Semantic Firewall
//!
//! This crate defines the data model shared by every stage of the analysis
//! pipeline and by the transports that surface its results:
//!
//! - [`Error`] / [`Result`] - the firewall error taxonomy
//! - [`RequestContext`] - per-request metadata threaded through the pipeline
//! - [`PreprocessedText`], [`MlSignals`], [`PolicyDecision`] - stage outputs
//! - [`ContentDecision`] - the tagged allow/block signal
//! - [`FirewallEvent`] - the standardized event consumed by the metrics
//!   store and the dashboard fan-out
//! - risk classification helpers ([`risk`])
//!
//! The crate is intentionally free of I/O and runtime dependencies; all
//! types are plain data with serde support.

pub mod analysis;
pub mod context;
pub mod error;
pub mod event;
pub mod risk;

pub use analysis::{
    AnalysisDirection, AnalysisResult, BlockedAnalysis, ContentDecision, DetectorScore,
    HeuristicSignal, MlSignals, PolicyDecision, PreprocessedText, StageLatencies, TextFeatures,
};
pub use context::RequestContext;
pub use error::{Error, Result};
pub use event::{
    EventAction, EventLatency, EventPolicy, EventScores, FirewallEvent, PreprocessingInfo,
};
pub use risk::{risk_category, risk_level, RiskCategory, RiskLabel, RiskLevel};
