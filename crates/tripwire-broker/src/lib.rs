//! Tripwire — a trigger broker.
//!
//! Maintains a many-to-many relation between normalized *trigger events*
//! (container-image pushes, SCM hooks, cron firings, …) and *pipelines* in
//! an external build service. Event definitions are subscribed through
//! pluggable event providers, bindings are stored durably in a shared
//! key-value engine, and account-level multi-tenancy partitions the
//! namespace with a distinguished public account for shared events.
//!
//! The crate is designed to be embedded behind thin adapters (an HTTP API,
//! the `tripwire` CLI) and has no opinion about wire formats: adapters talk
//! to [`TriggerStore`], [`EventProviderManager`], and [`TriggerService`].

pub mod account;
pub mod engine;
pub mod errors;
pub mod keys;
pub mod provider;
pub mod service;
pub mod store;
pub mod traits;
pub mod types;

// Re-export public types at the crate level.

// account
pub use account::{account_hash, PUBLIC_ACCOUNT, PUBLIC_ACCOUNT_HASH};

// engine
pub use engine::{MemoryEngine, RedisConfig, RedisEngine};

// errors
pub use errors::{EngineError, GatewayError, ProviderError, StoreError};

// provider
pub use provider::{EventProviderManager, ProviderClient};

// service
pub use service::{classify, ComponentHealth, ErrorClass, HealthReport, TriggerService};

// store
pub use store::TriggerStore;

// traits
pub use traits::{
    CredentialsResolver, KvEngine, KvTransaction, NoopCredentialsResolver, NoopPipelineGateway,
    PipelineGateway,
};

// types
pub use types::{
    CallContext, ConfigField, EventInfo, EventType, EventTypes, Trigger, TriggerEvent,
    GENERATE_KEYWORD,
};
