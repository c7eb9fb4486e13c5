//! Key-value engine backends.
//!
//! [`RedisEngine`] is the production backend; [`MemoryEngine`] implements
//! the same surface in process for tests and local runs.

mod memory;
mod redis;

pub use self::memory::MemoryEngine;
pub use self::redis::{RedisConfig, RedisEngine};
