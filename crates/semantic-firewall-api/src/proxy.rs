//! Backend proxy
//!
//! Forwards allowed messages to the upstream LLM backend
//! (`POST {base}/api/chat`) with a hard timeout. Any transport or status
//! failure surfaces as [`Error::Backend`], which the HTTP layer maps to
//! 502.

use semantic_firewall_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Serialize)]
struct ChatPayload<'a> {
    message: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatReply {
    #[serde(default)]
    reply: String,
}

/// HTTP client for the upstream backend
pub struct BackendProxy {
    base_url: String,
    client: reqwest::Client,
}

impl BackendProxy {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client: reqwest::Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
        }
    }

    /// Send a chat message and return the backend reply text
    pub async fn send_chat_message(&self, message: &str) -> Result<String> {
        let url = format!("{}/api/chat", self.base_url);
        tracing::debug!(%url, "Proxying message to backend");

        let response = self
            .client
            .post(&url)
            .json(&ChatPayload { message })
            .send()
            .await
            .map_err(|e| Error::backend(format!("Error communicating with the backend: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::backend(format!(
                "Backend returned status {}",
                status
            )));
        }

        let reply: ChatReply = response
            .json()
            .await
            .map_err(|e| Error::backend(format!("Invalid backend response: {}", e)))?;

        Ok(reply.reply)
    }
}
