//! Key composition for the shared key-value engine.
//!
//! Layout:
//! ```text
//! event:{uri}      — hash record {type,kind,account,secret,endpoint,description,help,status}
//! trigger:{uri}    — sorted set of pipeline ids (score 0)
//! pipeline:{id}    — sorted set of event URIs (score 0)
//! ```
//!
//! Event URIs end with a 12-hex account-hash segment, so `event:` and
//! `trigger:` keys are tenant-partitioned while `pipeline:` keys are not —
//! a pipeline may be bound to events from several accounts at once.

use crate::account::is_account_hash;
use crate::errors::StoreError;

pub const EVENT_PREFIX: &str = "event";
pub const TRIGGER_PREFIX: &str = "trigger";
pub const PIPELINE_PREFIX: &str = "pipeline";

/// Characters that make a key a glob pattern rather than a single key.
const WILDCARD_CHARS: &[char] = &['?', '*', '[', ']', '^'];

/// Reject empty keys and glob patterns where a precise key is required.
pub fn check_single_key(key: &str) -> Result<(), StoreError> {
    if key.is_empty() || key.contains(WILDCARD_CHARS) {
        return Err(StoreError::NotSingleKey {
            key: key.to_string(),
        });
    }
    Ok(())
}

/// Compose `{prefix}:{id}`. An empty `id` becomes `*` to support glob
/// queries; an `id` that already starts with `{prefix}:` is pre-formed and
/// passed through unchanged.
pub fn prefixed(prefix: &str, id: &str) -> String {
    let id = if id.is_empty() { "*" } else { id };
    if id.starts_with(&format!("{prefix}:")) {
        return id.to_string();
    }
    format!("{prefix}:{id}")
}

/// Returns `true` when the last colon-separated segment of `id` is an
/// account-hash suffix.
pub fn has_account_suffix(id: &str) -> bool {
    id.rsplit(':').next().is_some_and(is_account_hash)
}

/// Strip the trailing `:{account-hash}` segment, if present.
pub fn strip_account_suffix(id: &str) -> &str {
    match id.rfind(':') {
        Some(pos) if is_account_hash(&id[pos + 1..]) => &id[..pos],
        _ => id,
    }
}

/// Compose an account-scoped key: `{prefix}:{id}:{account-hash}`.
///
/// A trailing hash already present on `id` is preserved, as is a trailing
/// glob (`…*`), so fully-formed URIs and glob patterns pass through.
pub fn with_account(prefix: &str, id: &str, account_hash: &str) -> String {
    let key = prefixed(prefix, id);
    if has_account_suffix(&key) || key.ends_with('*') {
        return key;
    }
    format!("{key}:{account_hash}")
}

pub fn event_key(uri: &str, account_hash: &str) -> String {
    with_account(EVENT_PREFIX, uri, account_hash)
}

pub fn trigger_key(uri: &str, account_hash: &str) -> String {
    with_account(TRIGGER_PREFIX, uri, account_hash)
}

/// Pipeline keys omit the account suffix entirely.
pub fn pipeline_key(id: &str) -> String {
    prefixed(PIPELINE_PREFIX, id)
}

/// Strip a `{prefix}:` from a key, returning the embedded id.
pub fn strip_prefix<'a>(prefix: &str, key: &'a str) -> &'a str {
    key.strip_prefix(&format!("{prefix}:")).unwrap_or(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefixed_composes_and_globs() {
        assert_eq!(prefixed("event", "a:b"), "event:a:b");
        assert_eq!(prefixed("event", ""), "event:*");
        assert_eq!(prefixed("trigger", "trigger:a:b"), "trigger:a:b");
    }

    #[test]
    fn test_with_account_appends_hash_once() {
        let key = with_account("event", "registry:dockerhub:n:i:push", "efa1f375d761");
        assert_eq!(key, "event:registry:dockerhub:n:i:push:efa1f375d761");
        // A second pass preserves the existing suffix.
        let again = with_account("event", &strip_prefix("event", &key).to_string(), "aaaaaaaaaaaa");
        assert_eq!(again, key);
    }

    #[test]
    fn test_with_account_leaves_glob_patterns_open() {
        assert_eq!(with_account("trigger", "*", "efa1f375d761"), "trigger:*");
    }

    #[test]
    fn test_pipeline_key_has_no_account_suffix() {
        assert_eq!(pipeline_key("p1"), "pipeline:p1");
        assert_eq!(pipeline_key(""), "pipeline:*");
    }

    #[test]
    fn test_check_single_key_rejects_wildcards() {
        assert!(check_single_key("registry:dockerhub:n:i:push:efa1f375d761").is_ok());
        for bad in ["", "a*b", "a?b", "a[b", "a]b", "a^b"] {
            assert!(
                matches!(check_single_key(bad), Err(StoreError::NotSingleKey { .. })),
                "expected NotSingleKey for {bad:?}"
            );
        }
    }

    #[test]
    fn test_account_suffix_round_trip() {
        let uri = "registry:dockerhub:n:i:push:efa1f375d761";
        assert!(has_account_suffix(uri));
        assert_eq!(strip_account_suffix(uri), "registry:dockerhub:n:i:push");
        assert!(!has_account_suffix("registry:dockerhub:n:i:push"));
        assert_eq!(
            strip_account_suffix("registry:dockerhub:n:i:push"),
            "registry:dockerhub:n:i:push"
        );
    }
}
