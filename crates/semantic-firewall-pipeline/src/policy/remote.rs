//! External policy evaluator
//!
//! Ships the policy document to an external decision service and
//! evaluates per request:
//!
//! - `PUT {base}/v1/policies/{name}` uploads the document, gated on its
//!   SHA-256 so unchanged text is never re-sent
//! - `POST {base}/v1/data/{name}/decision` evaluates
//!   `{ "input": { ml_signals, features, tenant_context } }`
//!
//! On any transport or evaluator error the decision falls back per the
//! `fail_open` toggle: open allows with confidence 0.0, closed blocks
//! with `"Policy evaluation unavailable"`. Fail-open is the default and
//! a deliberate, security-relevant choice; deployments that prefer
//! availability of the block path set `fail_open = false`.

use super::{PolicyDocument, PolicyEvaluator, PolicyInput};
use async_trait::async_trait;
use semantic_firewall_core::{Error, PolicyDecision, Result};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::time::Duration;
use tokio::sync::Mutex;

/// HTTP policy evaluator with hash-gated uploads
pub struct RemotePolicyEvaluator {
    base_url: String,
    policy_name: String,
    fail_open: bool,
    client: reqwest::Client,
    uploaded_hash: Mutex<Option<String>>,
}

impl RemotePolicyEvaluator {
    pub fn new(base_url: &str, policy_name: &str, fail_open: bool) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            policy_name: policy_name.to_string(),
            fail_open,
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(5))
                .build()
                .unwrap_or_default(),
            uploaded_hash: Mutex::new(None),
        }
    }

    /// SHA-256 hex of the policy text
    pub fn policy_hash(raw: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(raw.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// Upload the document unless its hash matches the last upload
    async fn ensure_uploaded(&self, document: &PolicyDocument) -> Result<()> {
        let hash = Self::policy_hash(&document.raw);

        let mut uploaded = self.uploaded_hash.lock().await;
        if uploaded.as_deref() == Some(hash.as_str()) {
            tracing::debug!("Policy unchanged, skipping upload");
            return Ok(());
        }

        let url = format!(
            "{}/v1/policies/{}",
            self.base_url,
            self.policy_name.replace('/', ".")
        );

        let response = self
            .client
            .put(&url)
            .header("Content-Type", "text/plain")
            .body(document.raw.clone())
            .send()
            .await
            .map_err(|e| Error::policy(format!("Policy upload failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::policy(format!(
                "Policy upload rejected: {}",
                response.status()
            )));
        }

        tracing::info!(policy = %self.policy_name, "Policy uploaded to external evaluator");
        *uploaded = Some(hash);
        Ok(())
    }

    async fn evaluate_remote(&self, input: &PolicyInput) -> Result<PolicyDecision> {
        let url = format!(
            "{}/v1/data/{}/decision",
            self.base_url, self.policy_name
        );

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({ "input": input }))
            .send()
            .await
            .map_err(|e| Error::policy(format!("Policy evaluation request failed: {}", e)))?;

        if !response.status().is_success() {
            return Err(Error::policy(format!(
                "Policy evaluation rejected: {}",
                response.status()
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::policy(format!("Invalid evaluator response: {}", e)))?;

        Ok(parse_decision(body.get("result")))
    }

    /// The decision used when the external evaluator cannot answer
    fn fallback_decision(&self, error: &Error) -> PolicyDecision {
        if self.fail_open {
            tracing::error!(error = %error, "External policy evaluator failed, failing open");
            PolicyDecision {
                blocked: false,
                reason: None,
                confidence: 0.0,
                matched_rule: None,
            }
        } else {
            tracing::error!(error = %error, "External policy evaluator failed, failing closed");
            PolicyDecision::block("Policy evaluation unavailable", 0.0, None)
        }
    }
}

/// Parse the evaluator's `result` object; a missing or empty result
/// defaults to allow
fn parse_decision(result: Option<&Value>) -> PolicyDecision {
    let Some(result) = result.filter(|v| !v.is_null()) else {
        tracing::warn!("Evaluator returned no result, defaulting to allow");
        return PolicyDecision::allow(0.5);
    };

    PolicyDecision {
        blocked: result
            .get("blocked")
            .and_then(Value::as_bool)
            .unwrap_or(false),
        reason: result
            .get("reason")
            .and_then(Value::as_str)
            .map(str::to_string),
        confidence: result
            .get("confidence")
            .and_then(Value::as_f64)
            .unwrap_or(0.5) as f32,
        matched_rule: result
            .get("matched_rule")
            .and_then(Value::as_str)
            .map(str::to_string),
    }
}

#[async_trait]
impl PolicyEvaluator for RemotePolicyEvaluator {
    async fn evaluate(
        &self,
        document: &PolicyDocument,
        input: &PolicyInput,
    ) -> Result<PolicyDecision> {
        let outcome = async {
            self.ensure_uploaded(document).await?;
            self.evaluate_remote(input).await
        }
        .await;

        match outcome {
            Ok(decision) => Ok(decision),
            Err(e) => Ok(self.fallback_decision(&e)),
        }
    }
}
