//! Application configuration
//!
//! Typed config populated from the environment with `FIREWALL__*`
//! overrides (e.g. `FIREWALL__SERVER__PORT=9000`), plus the plain
//! variables `BACKEND_URL`, `TENANT_ID` and `BENCHMARK_DB_PATH` kept for
//! deployment compatibility. Validated once at startup.

use semantic_firewall_detectors::DetectorSettings;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(String),

    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Server bind configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Upstream backend configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub url: String,
    pub timeout_secs: u64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://backend:8000".to_string(),
            timeout_secs: 30,
        }
    }
}

/// External policy evaluator endpoint
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalPolicyConfig {
    pub url: String,
    #[serde(default = "default_policy_name")]
    pub policy_name: String,
}

fn default_policy_name() -> String {
    "firewall/policy".to_string()
}

/// Policy engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyConfig {
    /// Rule-table YAML; the built-in baseline is used when unset
    pub policies_path: Option<PathBuf>,

    /// When set, policies are evaluated by the external decision service
    pub external: Option<ExternalPolicyConfig>,

    /// Behavior on external-evaluator failure
    pub fail_open: bool,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            policies_path: None,
            external: None,
            fail_open: true,
        }
    }
}

/// Rolling metrics store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub capacity: usize,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self { capacity: 500 }
    }
}

/// Benchmark subsystem configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchmarkConfig {
    pub db_path: PathBuf,
    /// Directory named datasets are resolved against
    pub data_dir: PathBuf,
    /// Root of the uploaded-dataset object store
    pub storage_dir: PathBuf,
    pub max_concurrent_samples: usize,
    pub batch_size: usize,
}

impl Default for BenchmarkConfig {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("benchmarks.db"),
            data_dir: PathBuf::from("data"),
            storage_dir: PathBuf::from("storage"),
            max_concurrent_samples: 10,
            batch_size: 50,
        }
    }
}

/// Top-level application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub backend: BackendConfig,
    pub tenant_id: String,
    /// Whether backend replies get a second analysis pass
    pub analyze_egress: bool,
    pub policy: PolicyConfig,
    pub metrics: MetricsConfig,
    pub detectors: DetectorSettings,
    pub benchmark: BenchmarkConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            backend: BackendConfig::default(),
            tenant_id: "default".to_string(),
            analyze_egress: false,
            policy: PolicyConfig::default(),
            metrics: MetricsConfig::default(),
            detectors: DetectorSettings::default(),
            benchmark: BenchmarkConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "Server port cannot be 0".to_string(),
            ));
        }
        if self.backend.timeout_secs == 0 {
            return Err(ConfigError::ValidationError(
                "Backend timeout must be greater than 0".to_string(),
            ));
        }
        if self.metrics.capacity == 0 {
            return Err(ConfigError::ValidationError(
                "Metrics capacity must be greater than 0".to_string(),
            ));
        }
        if self.benchmark.max_concurrent_samples == 0 || self.benchmark.batch_size == 0 {
            return Err(ConfigError::ValidationError(
                "Benchmark concurrency settings must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load configuration from the environment
pub fn load_config() -> Result<AppConfig> {
    let builder = config::Config::builder().add_source(
        config::Environment::with_prefix("FIREWALL")
            .separator("__")
            .try_parsing(true),
    );

    let mut app_config: AppConfig = builder
        .build()
        .map_err(|e| ConfigError::LoadError(e.to_string()))?
        .try_deserialize()
        .map_err(|e| ConfigError::LoadError(e.to_string()))?;

    // Plain-env compatibility overrides
    if let Ok(url) = std::env::var("BACKEND_URL") {
        app_config.backend.url = url;
    }
    if let Ok(tenant) = std::env::var("TENANT_ID") {
        app_config.tenant_id = tenant;
    }
    if let Ok(db_path) = std::env::var("BENCHMARK_DB_PATH") {
        app_config.benchmark.db_path = PathBuf::from(db_path);
    }

    app_config.validate()?;
    Ok(app_config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.server.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.backend.url, "http://backend:8000");
        assert_eq!(config.backend.timeout_secs, 30);
        assert_eq!(config.tenant_id, "default");
        assert!(!config.analyze_egress);
        assert!(config.policy.fail_open);
        assert_eq!(config.metrics.capacity, 500);
        assert_eq!(config.benchmark.db_path, PathBuf::from("benchmarks.db"));
        assert_eq!(config.benchmark.max_concurrent_samples, 10);
        assert_eq!(config.benchmark.batch_size, 50);
        config.validate().unwrap();
    }

    #[test]
    fn test_validation_rejects_zero_port() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validation_rejects_zero_capacity() {
        let mut config = AppConfig::default();
        config.metrics.capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_from_empty_map() {
        // All fields default, so an empty source must deserialize cleanly
        let config: AppConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.server.port, 8080);
    }
}
