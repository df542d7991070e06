//! Shared test fixtures

use semantic_firewall_api::config::{AppConfig, BenchmarkConfig};
use semantic_firewall_api::state::AppState;
use semantic_firewall_core::FirewallEvent;
use tempfile::TempDir;
use tokio::sync::mpsc;

/// Build a fully wired state rooted in a temp directory, with a heuristic
/// rules file containing the `denytoken` denylist entry and an
/// unreachable backend.
pub async fn test_state() -> (
    TempDir,
    AppState,
    mpsc::UnboundedReceiver<FirewallEvent>,
) {
    let dir = tempfile::tempdir().unwrap();

    let rules_path = dir.path().join("rules.yaml");
    std::fs::write(
        &rules_path,
        "patterns:\n  - \"do anything now\"\ndenylist:\n  - denytoken\n",
    )
    .unwrap();

    let mut config = AppConfig::default();
    config.detectors.rules_path = rules_path;
    config.detectors.models_dir = dir.path().join("models");
    config.backend.url = "http://127.0.0.1:1".to_string();
    config.backend.timeout_secs = 1;
    config.benchmark = BenchmarkConfig {
        db_path: dir.path().join("benchmarks.db"),
        data_dir: dir.path().join("data"),
        storage_dir: dir.path().join("storage"),
        max_concurrent_samples: 4,
        batch_size: 10,
    };

    let (state, event_rx) = AppState::build(config).await;
    (dir, state, event_rx)
}
