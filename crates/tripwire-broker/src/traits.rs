//! Trait seams for pluggable components.
//!
//! The binding store is written against these interfaces rather than a
//! concrete engine or build service: [`KvEngine`] abstracts the shared
//! key-value engine (Redis in production, [`MemoryEngine`](crate::engine::MemoryEngine)
//! in tests), [`PipelineGateway`] the remote build service's
//! pipeline-existence check, and [`CredentialsResolver`] the reserved hook
//! for provider credentials.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::{EngineError, GatewayError};
use crate::types::CallContext;

// ---------------------------------------------------------------------------
// KvEngine
// ---------------------------------------------------------------------------

/// The shared key-value engine: hash records, sorted sets (score 0), glob
/// key enumeration, and optimistic transactions.
#[async_trait]
pub trait KvEngine: Send + Sync {
    /// Read one field of a hash record. `None` when the key or field is
    /// absent.
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, EngineError>;

    /// Read all fields of a hash record. Empty map when the key is absent.
    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, EngineError>;

    /// Read the full member range of a sorted set, in member order.
    async fn zrange(&self, key: &str) -> Result<Vec<String>, EngineError>;

    /// Enumerate keys matching a glob pattern.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, EngineError>;

    async fn exists(&self, key: &str) -> Result<bool, EngineError>;

    /// Round-trip liveness probe.
    async fn ping(&self) -> Result<String, EngineError>;

    /// Begin an optimistic transaction. Queued mutations apply atomically on
    /// [`commit`](KvTransaction::commit); no reader observes a half-update.
    async fn begin(&self) -> Result<Box<dyn KvTransaction>, EngineError>;
}

/// An open engine transaction. Mutations are queued until `commit`.
///
/// Dropping an uncommitted transaction discards it: implementations must
/// not let queued mutations leak into the keyspace.
#[async_trait]
pub trait KvTransaction: Send {
    /// Queue a set-if-absent on one hash field (write-once semantics).
    async fn hsetnx(&mut self, key: &str, field: &str, value: &str) -> Result<(), EngineError>;

    /// Queue adding members to a sorted set at score 0.
    async fn zadd(&mut self, key: &str, members: &[String]) -> Result<(), EngineError>;

    /// Queue removing members from a sorted set.
    async fn zrem(&mut self, key: &str, members: &[String]) -> Result<(), EngineError>;

    /// Queue deleting a key.
    async fn del(&mut self, key: &str) -> Result<(), EngineError>;

    /// Apply all queued mutations atomically.
    async fn commit(self: Box<Self>) -> Result<(), EngineError>;

    /// Explicitly abort, dropping all queued mutations.
    async fn discard(self: Box<Self>) -> Result<(), EngineError>;
}

// ---------------------------------------------------------------------------
// PipelineGateway
// ---------------------------------------------------------------------------

/// Opaque capability of the remote build service: does this pipeline id
/// exist? Consulted before any binding is created.
#[async_trait]
pub trait PipelineGateway: Send + Sync {
    async fn check_pipeline_exists(&self, pipeline: &str) -> Result<bool, GatewayError>;
}

/// Gateway used when no build service is wired in: accepts every id.
pub struct NoopPipelineGateway;

#[async_trait]
impl PipelineGateway for NoopPipelineGateway {
    async fn check_pipeline_exists(&self, pipeline: &str) -> Result<bool, GatewayError> {
        tracing::debug!(pipeline = %pipeline, "no pipeline gateway configured, accepting");
        Ok(true)
    }
}

// ---------------------------------------------------------------------------
// CredentialsResolver
// ---------------------------------------------------------------------------

/// Context-resolved source of provider credentials.
///
/// Reserved hook: where subscribe/unsubscribe credentials come from is an
/// integration concern, so the store only asks this trait.
#[async_trait]
pub trait CredentialsResolver: Send + Sync {
    async fn resolve(&self, ctx: &CallContext) -> Option<HashMap<String, String>>;
}

/// Resolver used when no credentials source is wired in.
pub struct NoopCredentialsResolver;

#[async_trait]
impl CredentialsResolver for NoopCredentialsResolver {
    async fn resolve(&self, _ctx: &CallContext) -> Option<HashMap<String, String>> {
        None
    }
}
