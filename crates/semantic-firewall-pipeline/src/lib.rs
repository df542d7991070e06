//! Analysis pipeline for the Semantic Firewall
//!
//! The stages between the gateway and the detectors:
//!
//! - [`preprocess`] - normalization, feature extraction, optional
//!   vector/feature persistence
//! - [`policy`] - rule-table and external policy evaluation
//! - [`actions`] - idempotent decision logging and alerting
//! - [`Analyzer`] - the preprocessor -> ML filter -> policy chain, and the
//!   single constructor of the [`ContentDecision::Blocked`] signal
//!
//! [`ContentDecision::Blocked`]: semantic_firewall_core::ContentDecision

pub mod actions;
pub mod analyzer;
pub mod policy;
pub mod preprocess;

pub use actions::{ActionContext, ActionOrchestrator, Alerter, IdempotencyStore, NullAlerter};
pub use analyzer::Analyzer;
pub use policy::{PolicyService, RuleTableEvaluator, YamlPolicyLoader};
pub use preprocess::Preprocessor;
