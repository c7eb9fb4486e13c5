//! In-memory key-value engine.
//!
//! Implements the same hash/sorted-set/transaction surface as the Redis
//! backend over a single mutex-guarded map. Used by tests and local runs;
//! supports injecting a failure into the Nth queued transaction command to
//! exercise abort paths.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::errors::EngineError;
use crate::traits::{KvEngine, KvTransaction};

/// One keyspace entry: either a hash record or a sorted set (score 0, so
/// member order is lexicographic — matching ZRANGE over equal scores).
#[derive(Debug, Clone)]
enum Entry {
    Hash(BTreeMap<String, String>),
    Set(BTreeSet<String>),
}

#[derive(Debug, Default)]
struct State {
    entries: BTreeMap<String, Entry>,
    /// Countdown for failure injection: `Some(0)` fails the next queued
    /// transaction command.
    fail_in: Option<usize>,
}

/// Shared in-memory engine. Cheap to clone; clones share the keyspace.
#[derive(Clone, Default)]
pub struct MemoryEngine {
    state: Arc<Mutex<State>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the `n`th subsequently queued transaction command fail
    /// (0 = the very next one).
    pub fn fail_command_in(&self, n: usize) {
        self.state.lock().fail_in = Some(n);
    }

    /// Direct keyspace inspection for assertions.
    pub fn dump_keys(&self) -> Vec<String> {
        self.state.lock().entries.keys().cloned().collect()
    }
}

/// Minimal glob matcher for KEYS patterns: `*`, `?`, and `[…]` classes.
fn glob_match(pattern: &str, text: &str) -> bool {
    fn inner(p: &[char], t: &[char]) -> bool {
        match p.first() {
            None => t.is_empty(),
            Some('*') => {
                (0..=t.len()).any(|skip| inner(&p[1..], &t[skip..]))
            }
            Some('?') => !t.is_empty() && inner(&p[1..], &t[1..]),
            Some('[') => {
                let Some(end) = p.iter().position(|&c| c == ']') else {
                    return !t.is_empty() && t[0] == '[' && inner(&p[1..], &t[1..]);
                };
                let Some(&c) = t.first() else { return false };
                let class = &p[1..end];
                let (negate, class) = match class.first() {
                    Some('^') => (true, &class[1..]),
                    _ => (false, class),
                };
                if class.contains(&c) == negate {
                    return false;
                }
                inner(&p[end + 1..], &t[1..])
            }
            Some(&c) => !t.is_empty() && t[0] == c && inner(&p[1..], &t[1..]),
        }
    }
    let p: Vec<char> = pattern.chars().collect();
    let t: Vec<char> = text.chars().collect();
    inner(&p, &t)
}

#[async_trait]
impl KvEngine for MemoryEngine {
    async fn hget(&self, key: &str, field: &str) -> Result<Option<String>, EngineError> {
        let state = self.state.lock();
        match state.entries.get(key) {
            Some(Entry::Hash(fields)) => Ok(fields.get(field).cloned()),
            Some(Entry::Set(_)) => Err(wrong_type(key)),
            None => Ok(None),
        }
    }

    async fn hgetall(&self, key: &str) -> Result<HashMap<String, String>, EngineError> {
        let state = self.state.lock();
        match state.entries.get(key) {
            Some(Entry::Hash(fields)) => {
                Ok(fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            }
            Some(Entry::Set(_)) => Err(wrong_type(key)),
            None => Ok(HashMap::new()),
        }
    }

    async fn zrange(&self, key: &str) -> Result<Vec<String>, EngineError> {
        let state = self.state.lock();
        match state.entries.get(key) {
            Some(Entry::Set(members)) => Ok(members.iter().cloned().collect()),
            Some(Entry::Hash(_)) => Err(wrong_type(key)),
            None => Ok(Vec::new()),
        }
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, EngineError> {
        let state = self.state.lock();
        Ok(state
            .entries
            .keys()
            .filter(|k| glob_match(pattern, k))
            .cloned()
            .collect())
    }

    async fn exists(&self, key: &str) -> Result<bool, EngineError> {
        Ok(self.state.lock().entries.contains_key(key))
    }

    async fn ping(&self) -> Result<String, EngineError> {
        Ok("PONG".to_string())
    }

    async fn begin(&self) -> Result<Box<dyn KvTransaction>, EngineError> {
        Ok(Box::new(MemoryTransaction {
            state: Arc::clone(&self.state),
            queued: Vec::new(),
        }))
    }
}

/// A queued mutation, applied on commit.
#[derive(Debug, Clone)]
enum Op {
    HSetNx {
        key: String,
        field: String,
        value: String,
    },
    ZAdd {
        key: String,
        members: Vec<String>,
    },
    ZRem {
        key: String,
        members: Vec<String>,
    },
    Del {
        key: String,
    },
}

struct MemoryTransaction {
    state: Arc<Mutex<State>>,
    queued: Vec<Op>,
}

impl MemoryTransaction {
    /// Queue one op, honoring failure injection.
    fn queue(&mut self, op: Op) -> Result<(), EngineError> {
        let mut state = self.state.lock();
        match state.fail_in {
            Some(0) => {
                state.fail_in = None;
                Err(EngineError::Command {
                    message: "injected command failure".to_string(),
                })
            }
            Some(n) => {
                state.fail_in = Some(n - 1);
                self.queued.push(op);
                Ok(())
            }
            None => {
                self.queued.push(op);
                Ok(())
            }
        }
    }
}

#[async_trait]
impl KvTransaction for MemoryTransaction {
    async fn hsetnx(&mut self, key: &str, field: &str, value: &str) -> Result<(), EngineError> {
        self.queue(Op::HSetNx {
            key: key.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        })
    }

    async fn zadd(&mut self, key: &str, members: &[String]) -> Result<(), EngineError> {
        self.queue(Op::ZAdd {
            key: key.to_string(),
            members: members.to_vec(),
        })
    }

    async fn zrem(&mut self, key: &str, members: &[String]) -> Result<(), EngineError> {
        self.queue(Op::ZRem {
            key: key.to_string(),
            members: members.to_vec(),
        })
    }

    async fn del(&mut self, key: &str) -> Result<(), EngineError> {
        self.queue(Op::Del {
            key: key.to_string(),
        })
    }

    async fn commit(self: Box<Self>) -> Result<(), EngineError> {
        // All queued ops apply under one lock: readers never observe a
        // half-applied transaction.
        let mut state = self.state.lock();
        for op in &self.queued {
            match op {
                Op::HSetNx { key, field, value } => {
                    let entry = state
                        .entries
                        .entry(key.clone())
                        .or_insert_with(|| Entry::Hash(BTreeMap::new()));
                    if let Entry::Hash(fields) = entry {
                        fields.entry(field.clone()).or_insert_with(|| value.clone());
                    }
                }
                Op::ZAdd { key, members } => {
                    if members.is_empty() {
                        continue;
                    }
                    let entry = state
                        .entries
                        .entry(key.clone())
                        .or_insert_with(|| Entry::Set(BTreeSet::new()));
                    if let Entry::Set(set) = entry {
                        set.extend(members.iter().cloned());
                    }
                }
                Op::ZRem { key, members } => {
                    let mut emptied = false;
                    if let Some(Entry::Set(set)) = state.entries.get_mut(key) {
                        for m in members {
                            set.remove(m);
                        }
                        emptied = set.is_empty();
                    }
                    if emptied {
                        state.entries.remove(key);
                    }
                }
                Op::Del { key } => {
                    state.entries.remove(key);
                }
            }
        }
        Ok(())
    }

    async fn discard(self: Box<Self>) -> Result<(), EngineError> {
        Ok(())
    }
}

fn wrong_type(key: &str) -> EngineError {
    EngineError::Command {
        message: format!("wrong entry type at key {key}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_hash_write_once_semantics() {
        let engine = MemoryEngine::new();

        let mut txn = engine.begin().await.unwrap();
        txn.hsetnx("event:a", "secret", "first").await.unwrap();
        txn.commit().await.unwrap();

        let mut txn = engine.begin().await.unwrap();
        txn.hsetnx("event:a", "secret", "second").await.unwrap();
        txn.hsetnx("event:a", "status", "active").await.unwrap();
        txn.commit().await.unwrap();

        assert_eq!(
            engine.hget("event:a", "secret").await.unwrap(),
            Some("first".to_string())
        );
        assert_eq!(
            engine.hget("event:a", "status").await.unwrap(),
            Some("active".to_string())
        );
    }

    #[tokio::test]
    async fn test_sorted_set_membership_and_order() {
        let engine = MemoryEngine::new();

        let mut txn = engine.begin().await.unwrap();
        txn.zadd("trigger:e", &["p2".into(), "p1".into()]).await.unwrap();
        txn.commit().await.unwrap();

        assert_eq!(engine.zrange("trigger:e").await.unwrap(), vec!["p1", "p2"]);

        let mut txn = engine.begin().await.unwrap();
        txn.zrem("trigger:e", &["p1".into()]).await.unwrap();
        txn.commit().await.unwrap();
        assert_eq!(engine.zrange("trigger:e").await.unwrap(), vec!["p2"]);

        // Removing the last member drops the key entirely.
        let mut txn = engine.begin().await.unwrap();
        txn.zrem("trigger:e", &["p2".into()]).await.unwrap();
        txn.commit().await.unwrap();
        assert!(!engine.exists("trigger:e").await.unwrap());
    }

    #[tokio::test]
    async fn test_keys_glob_patterns() {
        let engine = MemoryEngine::new();
        let mut txn = engine.begin().await.unwrap();
        txn.zadd("trigger:a:h1", &["p".into()]).await.unwrap();
        txn.zadd("trigger:b:h2", &["p".into()]).await.unwrap();
        txn.zadd("pipeline:p", &["e".into()]).await.unwrap();
        txn.commit().await.unwrap();

        let mut hits = engine.keys("trigger:*").await.unwrap();
        hits.sort();
        assert_eq!(hits, vec!["trigger:a:h1", "trigger:b:h2"]);
        assert_eq!(engine.keys("trigger:*:h1").await.unwrap(), vec!["trigger:a:h1"]);
        assert_eq!(engine.keys("pipeline:?").await.unwrap(), vec!["pipeline:p"]);
        assert!(engine.keys("nothing:*").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_discarded_transaction_leaves_no_trace() {
        let engine = MemoryEngine::new();
        let mut txn = engine.begin().await.unwrap();
        txn.zadd("trigger:e", &["p1".into()]).await.unwrap();
        txn.hsetnx("event:e", "type", "registry").await.unwrap();
        txn.discard().await.unwrap();

        assert!(engine.dump_keys().is_empty());
    }

    #[tokio::test]
    async fn test_injected_failure_hits_the_nth_command() {
        let engine = MemoryEngine::new();
        engine.fail_command_in(1);

        let mut txn = engine.begin().await.unwrap();
        txn.zadd("a", &["x".into()]).await.unwrap();
        let err = txn.zadd("b", &["y".into()]).await.unwrap_err();
        assert!(matches!(err, EngineError::Command { .. }));
        txn.discard().await.unwrap();

        assert!(engine.dump_keys().is_empty());
    }

    #[test]
    fn test_glob_match_corners() {
        assert!(glob_match("*", "anything"));
        assert!(glob_match("a:*:c", "a:b:c"));
        assert!(glob_match("a:*:c", "a:x:y:c"));
        assert!(!glob_match("a:*:c", "a:b:d"));
        assert!(glob_match("tri??er:*", "trigger:x"));
        assert!(glob_match("[abc]x", "bx"));
        assert!(!glob_match("[^abc]x", "bx"));
        assert!(!glob_match("", "x"));
        assert!(glob_match("", ""));
    }
}
