//! Account hashing and the public-account sentinel.
//!
//! Event keys are partitioned by tenant through a short deterministic hash
//! of the account id, appended as the last colon-separated segment of every
//! event URI. Two tenants defining the "same" event therefore never collide,
//! and cross-tenant collisions are prevented by construction rather than by
//! locking.

use sha2::{Digest, Sha256};

/// Sentinel account whose events are visible to every tenant.
pub const PUBLIC_ACCOUNT: &str = "public";

/// Precomputed [`account_hash`] of [`PUBLIC_ACCOUNT`].
pub const PUBLIC_ACCOUNT_HASH: &str = "efa1f375d761";

/// Length of an account-hash key segment, in hex characters.
pub const ACCOUNT_HASH_LEN: usize = 12;

/// Compute the short account hash: the first 12 hex chars of
/// SHA-256(account).
pub fn account_hash(account: &str) -> String {
    let digest = Sha256::digest(account.as_bytes());
    let hex = format!("{digest:x}");
    hex[..ACCOUNT_HASH_LEN].to_string()
}

/// Returns `true` when `segment` looks like an account-hash suffix:
/// exactly 12 lowercase hex characters.
pub fn is_account_hash(segment: &str) -> bool {
    segment.len() == ACCOUNT_HASH_LEN
        && segment
            .chars()
            .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c))
}
