//! Service facade: context propagation, error classification, and the
//! multiplexed health probe.
//!
//! Adapters (HTTP handlers, the CLI) own wire formats; this layer owns the
//! mapping from core errors to adapter-shaped outcomes and the liveness
//! view across the store and every known event provider.

use std::sync::Arc;

use crate::errors::{ProviderError, StoreError};
use crate::provider::EventProviderManager;
use crate::store::TriggerStore;
use crate::types::CallContext;

/// Adapter-shaped classification of a core error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// The caller sent something malformed (wildcard key, bad template
    /// values, unknown pipeline id).
    InvalidRequest,
    /// Absence, including cross-tenant invisibility.
    NotFound,
    /// The operation conflicts with current state (delete while bound).
    Conflict,
    /// An upstream dependency failed; retriable by the caller.
    Upstream,
    Internal,
}

/// Classify a store error into an adapter-shaped outcome.
pub fn classify(error: &StoreError) -> ErrorClass {
    match error {
        StoreError::NotSingleKey { .. } => ErrorClass::InvalidRequest,
        StoreError::EventNotFound { .. }
        | StoreError::TriggerNotFound { .. }
        | StoreError::PipelineNotFound { .. } => ErrorClass::NotFound,
        StoreError::EventDeleteWithTriggers { .. } => ErrorClass::Conflict,
        StoreError::PipelineCheck { .. } => ErrorClass::InvalidRequest,
        StoreError::Engine(_) => ErrorClass::Internal,
        StoreError::Provider(provider) => match provider {
            ProviderError::TypeNotFound { .. } => ErrorClass::NotFound,
            ProviderError::ValueValidation { .. } | ProviderError::Client { .. } => {
                ErrorClass::InvalidRequest
            }
            ProviderError::Transport { .. } => ErrorClass::Upstream,
            ProviderError::NotImplemented | ProviderError::Protocol { .. } => ErrorClass::Internal,
        },
    }
}

/// Health of one component in the [`HealthReport`].
#[derive(Debug, Clone)]
pub struct ComponentHealth {
    pub name: String,
    pub healthy: bool,
    pub detail: String,
}

/// Combined liveness view of the store and all known providers.
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub store: ComponentHealth,
    pub providers: Vec<ComponentHealth>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.store.healthy && self.providers.iter().all(|p| p.healthy)
    }
}

/// Facade over the binding store and the event-provider manager.
pub struct TriggerService {
    store: Arc<TriggerStore>,
    manager: Arc<EventProviderManager>,
}

impl TriggerService {
    pub fn new(store: Arc<TriggerStore>, manager: Arc<EventProviderManager>) -> Self {
        Self { store, manager }
    }

    pub fn store(&self) -> &TriggerStore {
        &self.store
    }

    pub fn manager(&self) -> &EventProviderManager {
        &self.manager
    }

    /// Ping the store and every provider service URL from the catalog.
    pub async fn health(&self, ctx: &CallContext) -> HealthReport {
        let store = match self.store.ping().await {
            Ok(reply) => ComponentHealth {
                name: "store".to_string(),
                healthy: true,
                detail: reply,
            },
            Err(e) => ComponentHealth {
                name: "store".to_string(),
                healthy: false,
                detail: e.to_string(),
            },
        };

        let mut providers = Vec::new();
        for url in self.manager.service_urls() {
            let health = match self.manager.client_for(&url).ping(ctx).await {
                Ok(()) => ComponentHealth {
                    name: url,
                    healthy: true,
                    detail: "ok".to_string(),
                },
                Err(e) => ComponentHealth {
                    name: url,
                    healthy: false,
                    detail: e.to_string(),
                },
            };
            providers.push(health);
        }

        HealthReport { store, providers }
    }

    /// Tear down background work (the manager's config watcher).
    pub async fn close(&self) {
        self.manager.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MemoryEngine;
    use crate::errors::EngineError;
    use crate::traits::{NoopCredentialsResolver, NoopPipelineGateway};

    #[test]
    fn test_classification_table() {
        let cases = [
            (
                StoreError::NotSingleKey { key: "*".into() },
                ErrorClass::InvalidRequest,
            ),
            (
                StoreError::EventNotFound { uri: "e".into() },
                ErrorClass::NotFound,
            ),
            (
                StoreError::TriggerNotFound { message: "t".into() },
                ErrorClass::NotFound,
            ),
            (
                StoreError::PipelineNotFound { message: "p".into() },
                ErrorClass::NotFound,
            ),
            (
                StoreError::EventDeleteWithTriggers { uri: "e".into() },
                ErrorClass::Conflict,
            ),
            (
                StoreError::PipelineCheck {
                    pipeline: "p".into(),
                    message: "m".into(),
                },
                ErrorClass::InvalidRequest,
            ),
            (
                StoreError::Engine(EngineError::Connection { message: "m".into() }),
                ErrorClass::Internal,
            ),
            (
                StoreError::Provider(ProviderError::Transport { message: "m".into() }),
                ErrorClass::Upstream,
            ),
            (
                StoreError::Provider(ProviderError::ValueValidation {
                    field: "f".into(),
                    message: "m".into(),
                }),
                ErrorClass::InvalidRequest,
            ),
            (
                StoreError::Provider(ProviderError::TypeNotFound { message: "m".into() }),
                ErrorClass::NotFound,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(classify(&error), expected, "for {error:?}");
        }
    }

    #[tokio::test]
    async fn test_health_with_empty_catalog() {
        let manager = EventProviderManager::new("missing-catalog.json", false);
        let store = Arc::new(TriggerStore::new(
            Arc::new(MemoryEngine::new()),
            Arc::clone(&manager),
            Arc::new(NoopPipelineGateway),
            Arc::new(NoopCredentialsResolver),
        ));
        let service = TriggerService::new(store, manager);

        let report = service.health(&CallContext::new("acct")).await;
        assert!(report.healthy());
        assert!(report.store.healthy);
        assert!(report.providers.is_empty());
        service.close().await;
    }
}
