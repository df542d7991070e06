//! Shared application state
//!
//! All singletons are constructed once at startup and shared by
//! reference; nothing is re-initialized at runtime.

use crate::benchmarks::BenchmarkService;
use crate::config::AppConfig;
use crate::gateway::Gateway;
use crate::metrics::RollingMetricsStore;
use crate::proxy::BackendProxy;
use crate::realtime::{EventBus, WsConnectionManager};
use semantic_firewall_core::FirewallEvent;
use semantic_firewall_detectors::{DetectorRegistry, DetectorSelection, MlFilterService};
use semantic_firewall_pipeline::policy::{
    MemoryTenantContext, PolicyService, RemotePolicyEvaluator, RuleTableEvaluator,
    YamlPolicyLoader,
};
use semantic_firewall_pipeline::{
    actions::MemoryIdempotencyStore, ActionOrchestrator, Analyzer, Preprocessor,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Shared application state; clone is cheap
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: Arc<DetectorRegistry>,
    pub gateway: Arc<Gateway>,
    pub metrics: Arc<RollingMetricsStore>,
    pub ws: Arc<WsConnectionManager>,
    pub benchmarks: Option<Arc<BenchmarkService>>,
}

impl AppState {
    /// Wire every singleton; returns the state plus the event-queue
    /// receiver for the dispatcher loop
    pub async fn build(
        config: AppConfig,
    ) -> (Self, mpsc::UnboundedReceiver<FirewallEvent>) {
        let config = Arc::new(config);

        let registry = Arc::new(DetectorRegistry::new(config.detectors.clone()));
        let preprocessor = Arc::new(Preprocessor::new());

        let loader = match &config.policy.policies_path {
            Some(path) => YamlPolicyLoader::new(path.clone()),
            None => YamlPolicyLoader::baseline(),
        };
        let policy = Arc::new(match &config.policy.external {
            Some(external) => PolicyService::new(
                Box::new(loader),
                Box::new(RemotePolicyEvaluator::new(
                    &external.url,
                    &external.policy_name,
                    config.policy.fail_open,
                )),
                Box::new(MemoryTenantContext::new()),
            ),
            None => PolicyService::new(
                Box::new(loader),
                Box::new(RuleTableEvaluator::new()),
                Box::new(MemoryTenantContext::new()),
            ),
        });

        let actions = Arc::new(
            ActionOrchestrator::new()
                .with_idempotency_store(Arc::new(MemoryIdempotencyStore::new())),
        );

        let default_filter = MlFilterService::from_registry(&registry, &DetectorSelection::default())
            .expect("default detector selection is always valid");
        let default_analyzer = Arc::new(Analyzer::new(
            Arc::clone(&preprocessor),
            Arc::new(default_filter),
            Arc::clone(&policy),
            &config.tenant_id,
        ));

        let proxy = Arc::new(BackendProxy::new(
            &config.backend.url,
            Duration::from_secs(config.backend.timeout_secs),
        ));
        let metrics = Arc::new(RollingMetricsStore::new(config.metrics.capacity));
        let ws = Arc::new(WsConnectionManager::new());
        let (events, event_rx) = EventBus::new();

        let gateway = Arc::new(Gateway::new(
            Arc::clone(&config),
            Arc::clone(&registry),
            preprocessor,
            policy,
            actions,
            proxy,
            Arc::clone(&metrics),
            events,
            default_analyzer,
        ));

        // Benchmark init failure degrades to 503 on the benchmark surface
        let benchmarks = match BenchmarkService::initialize(&config.benchmark).await {
            Ok(service) => Some(Arc::new(service)),
            Err(e) => {
                tracing::error!(error = %e, "Failed to initialize benchmark service");
                None
            }
        };

        (
            Self {
                config,
                registry,
                gateway,
                metrics,
                ws,
                benchmarks,
            },
            event_rx,
        )
    }

    /// The benchmark service, or a 503-mapped error
    pub fn benchmarks(
        &self,
    ) -> std::result::Result<&Arc<BenchmarkService>, semantic_firewall_core::Error> {
        self.benchmarks.as_ref().ok_or_else(|| {
            semantic_firewall_core::Error::unavailable("Benchmark system not initialized")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BenchmarkConfig;

    #[tokio::test]
    async fn test_build_state() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = AppConfig::default();
        config.benchmark = BenchmarkConfig {
            db_path: dir.path().join("benchmarks.db"),
            data_dir: dir.path().join("data"),
            storage_dir: dir.path().join("storage"),
            ..Default::default()
        };

        let (state, _rx) = AppState::build(config).await;
        assert!(state.benchmarks.is_some());
        assert_eq!(state.metrics.len(), 0);
        // Default detectors and the heuristic were cached while wiring
        assert!(state.registry.cache_size() >= 4);
    }

    #[tokio::test]
    async fn test_benchmark_init_failure_degrades() {
        let mut config = AppConfig::default();
        // A directory path that cannot be created as a database file
        config.benchmark.db_path = std::path::PathBuf::from("/dev/null/impossible/benchmarks.db");

        let (state, _rx) = AppState::build(config).await;
        assert!(state.benchmarks.is_none());
        assert!(state.benchmarks().is_err());
    }
}
