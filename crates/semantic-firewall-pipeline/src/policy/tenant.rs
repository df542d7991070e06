//! Tenant context provider

use serde_json::Value;
use std::collections::HashMap;

/// Supplies per-tenant evaluation context
pub trait TenantContextProvider: Send + Sync {
    fn context(&self, tenant_id: &str) -> HashMap<String, Value>;
}

/// In-memory tenant contexts with a default tenant
pub struct MemoryTenantContext {
    contexts: HashMap<String, HashMap<String, Value>>,
}

impl MemoryTenantContext {
    pub fn new() -> Self {
        let default = HashMap::from([
            ("allow_pii".to_string(), Value::Bool(false)),
            ("toxicity_threshold".to_string(), Value::from(0.7)),
            ("pii_threshold".to_string(), Value::from(0.8)),
            ("max_length".to_string(), Value::from(4000)),
        ]);

        Self {
            contexts: HashMap::from([("default".to_string(), default)]),
        }
    }

    /// Register or replace a tenant context
    pub fn insert(&mut self, tenant_id: &str, context: HashMap<String, Value>) {
        self.contexts.insert(tenant_id.to_string(), context);
    }
}

impl Default for MemoryTenantContext {
    fn default() -> Self {
        Self::new()
    }
}

impl TenantContextProvider for MemoryTenantContext {
    /// Unknown tenants resolve to the default context
    fn context(&self, tenant_id: &str) -> HashMap<String, Value> {
        self.contexts
            .get(tenant_id)
            .or_else(|| self.contexts.get("default"))
            .cloned()
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_tenant() {
        let provider = MemoryTenantContext::new();
        let ctx = provider.context("default");
        assert_eq!(ctx["allow_pii"], Value::Bool(false));
        assert_eq!(ctx["max_length"], Value::from(4000));
    }

    #[test]
    fn test_unknown_tenant_falls_back_to_default() {
        let provider = MemoryTenantContext::new();
        let ctx = provider.context("acme");
        assert_eq!(ctx["pii_threshold"], Value::from(0.8));
    }

    #[test]
    fn test_registered_tenant() {
        let mut provider = MemoryTenantContext::new();
        provider.insert(
            "acme",
            HashMap::from([("allow_pii".to_string(), Value::Bool(true))]),
        );
        assert_eq!(provider.context("acme")["allow_pii"], Value::Bool(true));
    }
}
