//! Request context threaded through the analysis pipeline
//!
//! A [`RequestContext`] is created once per inbound request from HTTP
//! headers (or synthesized by the benchmark runner) and passed immutably
//! down the pipeline. The embedding-based prompt-injection detector
//! conditions on several of its fields.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Per-request metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestContext {
    /// Unique request id (uuid)
    pub request_id: String,

    /// Creation time
    pub timestamp: DateTime<Utc>,

    /// User identity, if the client supplied one
    pub user_id: Option<String>,

    /// Session identity, if the client supplied one
    pub session_id: Option<String>,

    /// Tenant the request is evaluated under
    pub tenant_id: String,

    /// Endpoint the request arrived on
    pub endpoint: Option<String>,

    /// Client device / user agent
    pub device: Option<String>,

    /// Remaining rate-limit budget reported by the edge
    pub rate_limit_remaining: Option<i64>,

    /// LLM sampling temperature requested by the client
    pub temperature: Option<f64>,

    /// LLM max-tokens requested by the client
    pub max_tokens: Option<u32>,

    /// Conversation turn counter
    pub turn_count: Option<u32>,

    /// Free-form metadata (benchmark run ids, sample indices, ...)
    #[serde(default)]
    pub custom: HashMap<String, serde_json::Value>,
}

impl RequestContext {
    /// Create a context with the given request id and all metadata unset
    pub fn new<S: Into<String>>(request_id: S) -> Self {
        Self {
            request_id: request_id.into(),
            timestamp: Utc::now(),
            user_id: None,
            session_id: None,
            tenant_id: "default".to_string(),
            endpoint: None,
            device: None,
            rate_limit_remaining: None,
            temperature: None,
            max_tokens: None,
            turn_count: None,
            custom: HashMap::new(),
        }
    }

    /// User id with the documented fallback
    pub fn user_id_or_default(&self) -> &str {
        self.user_id.as_deref().unwrap_or("unknown")
    }

    /// Device with the documented fallback
    pub fn device_or_default(&self) -> &str {
        self.device.as_deref().unwrap_or("Unknown")
    }

    /// Endpoint with the documented fallback
    pub fn endpoint_or_default(&self) -> &str {
        self.endpoint.as_deref().unwrap_or("/threat/query")
    }

    /// Sampling temperature with the documented fallback
    pub fn temperature_or_default(&self) -> f64 {
        self.temperature.unwrap_or(0.5)
    }

    /// Max tokens with the documented fallback
    pub fn max_tokens_or_default(&self) -> u32 {
        self.max_tokens.unwrap_or(20)
    }

    /// Turn count with the documented fallback
    pub fn turn_count_or_default(&self) -> u32 {
        self.turn_count.unwrap_or(1)
    }

    /// Rate-limit budget with the documented fallback
    pub fn rate_limit_or_default(&self) -> i64 {
        self.rate_limit_remaining.unwrap_or(0)
    }
}
