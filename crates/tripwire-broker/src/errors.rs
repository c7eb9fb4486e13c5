//! Error types for all trigger-broker operations.

use thiserror::Error;

/// Errors from the shared key-value engine
/// ([`KvEngine`](crate::traits::KvEngine)).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("engine connection error: {message}")]
    Connection { message: String },
    #[error("engine command error: {message}")]
    Command { message: String },
    #[error("connection pool error: {message}")]
    Pool { message: String },
}

/// Errors from the external build-service gateway
/// ([`PipelineGateway`](crate::traits::PipelineGateway)).
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("pipeline service error: {message}")]
    Service { message: String },
}

/// Errors from the event-provider layer (client and manager).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("event type not found: {message}")]
    TypeNotFound { message: String },
    #[error("value validation failed for field {field}: {message}")]
    ValueValidation { field: String, message: String },
    /// Subscription is not applicable for this kind; callers fall back to
    /// describe-only. The one provider error the core recovers from.
    #[error("not implemented by event provider")]
    NotImplemented,
    #[error("event provider rejected request (HTTP {status}): {message}")]
    Client { status: u16, message: String },
    #[error("event provider transport error: {message}")]
    Transport { message: String },
    #[error("event provider protocol error: {message}")]
    Protocol { message: String },
}

/// Errors from the binding store
/// ([`TriggerStore`](crate::store::TriggerStore)).
#[derive(Debug, Error)]
pub enum StoreError {
    /// A precise key was required but an empty or glob key was given.
    #[error("not a single key: {key:?}")]
    NotSingleKey { key: String },
    /// Absence — or cross-tenant invisibility disguised as absence.
    #[error("trigger event not found: {uri}")]
    EventNotFound { uri: String },
    #[error("trigger not found: {message}")]
    TriggerNotFound { message: String },
    #[error("pipeline not found: {message}")]
    PipelineNotFound { message: String },
    #[error("trigger event {uri} still has linked pipelines")]
    EventDeleteWithTriggers { uri: String },
    /// The remote build service rejected a pipeline id.
    #[error("pipeline check failed for {pipeline}: {message}")]
    PipelineCheck { pipeline: String, message: String },
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Provider(#[from] ProviderError),
}
