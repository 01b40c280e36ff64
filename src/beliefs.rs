//! Belief Store (C1): namespaced, persistent key→(value, confidence, source,
//! ts) map, shared multi-reader/single-writer per namespace.
//!
//! One `RwLock`-guarded `HashMap<String, Belief>` per namespace, persisted
//! through the atomic `Store` (C4) as one JSON document per namespace under
//! `data/state/beliefs/<namespace>.json`. `query(prefix)` is a linear scan
//! filtered by `key.starts_with(prefix)` — namespaces are expected to stay
//! small (hundreds, not millions, of beliefs).

use crate::errors::Result;
use crate::store::Store;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Belief {
    pub key: String,
    pub value: serde_json::Value,
    pub confidence: f64,
    pub source: String,
    pub updated_ts: i64,
    #[serde(default = "default_schema_version")]
    pub schema_version: u32,
}

fn default_schema_version() -> u32 {
    crate::store::CURRENT_SCHEMA_VERSION
}

#[derive(Default, Serialize, Deserialize)]
struct Namespace {
    beliefs: HashMap<String, Belief>,
}

/// Process-wide, namespaced belief store. Each namespace is guarded by its
/// own `RwLock` so a reader in one namespace never blocks a writer in
/// another.
pub struct BeliefStore {
    store: Store,
    namespaces: RwLock<HashMap<String, Arc<RwLock<Namespace>>>>,
}

impl BeliefStore {
    pub fn new(data_root: impl Into<std::path::PathBuf>) -> Self {
        Self {
            store: Store::new(data_root.into().join("state").join("beliefs"), 10),
            namespaces: RwLock::new(HashMap::new()),
        }
    }

    fn namespace_handle(&self, namespace: &str) -> Arc<RwLock<Namespace>> {
        if let Some(ns) = self.namespaces.read().get(namespace) {
            return ns.clone();
        }
        let mut write = self.namespaces.write();
        write
            .entry(namespace.to_string())
            .or_insert_with(|| {
                let loaded: Namespace = self
                    .store
                    .read(&format!("{namespace}.json"))
                    .ok()
                    .flatten()
                    .unwrap_or_default();
                Arc::new(RwLock::new(loaded))
            })
            .clone()
    }

    /// Last-write-wins unless `confidence_required` is `true`, in which
    /// case the update is rejected when the stored confidence exceeds the
    /// provided one.
    pub fn add(
        &self,
        namespace: &str,
        key: &str,
        value: serde_json::Value,
        confidence: f64,
        source: &str,
        confidence_required: bool,
    ) -> Result<bool> {
        let ns = self.namespace_handle(namespace);
        let mut guard = ns.write();
        if confidence_required {
            if let Some(existing) = guard.beliefs.get(key) {
                if existing.confidence > confidence {
                    return Ok(false);
                }
            }
        }
        guard.beliefs.insert(
            key.to_string(),
            Belief {
                key: key.to_string(),
                value,
                confidence,
                source: source.to_string(),
                updated_ts: now_ts(),
                schema_version: crate::store::CURRENT_SCHEMA_VERSION,
            },
        );
        Ok(true)
    }

    pub fn get(&self, namespace: &str, key: &str) -> Option<Belief> {
        self.namespace_handle(namespace).read().beliefs.get(key).cloned()
    }

    pub fn query(&self, namespace: &str, prefix: &str) -> Vec<Belief> {
        self.namespace_handle(namespace)
            .read()
            .beliefs
            .values()
            .filter(|b| b.key.starts_with(prefix))
            .cloned()
            .collect()
    }

    pub fn remove(&self, namespace: &str, key: &str) -> bool {
        self.namespace_handle(namespace)
            .write()
            .beliefs
            .remove(key)
            .is_some()
    }

    pub fn flush(&self, namespace: &str) -> Result<()> {
        let ns = self.namespace_handle(namespace);
        let guard = ns.read();
        self.store.write(&format!("{namespace}.json"), &*guard)
    }

    pub fn flush_all(&self) -> Result<()> {
        let namespaces: Vec<String> = self.namespaces.read().keys().cloned().collect();
        for namespace in namespaces {
            self.flush(&namespace)?;
        }
        Ok(())
    }
}

fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = BeliefStore::new(dir.path());
        store
            .add("environment", "cpu.idle", serde_json::json!(true), 0.9, "probe", false)
            .unwrap();
        let belief = store.get("environment", "cpu.idle").unwrap();
        assert_eq!(belief.confidence, 0.9);
    }

    #[test]
    fn confidence_required_rejects_lower_confidence() {
        let dir = tempfile::tempdir().unwrap();
        let store = BeliefStore::new(dir.path());
        store
            .add("env", "k", serde_json::json!(1), 0.8, "a", true)
            .unwrap();
        let accepted = store
            .add("env", "k", serde_json::json!(2), 0.3, "b", true)
            .unwrap();
        assert!(!accepted);
        assert_eq!(store.get("env", "k").unwrap().value, serde_json::json!(1));
    }

    #[test]
    fn query_filters_by_prefix() {
        let dir = tempfile::tempdir().unwrap();
        let store = BeliefStore::new(dir.path());
        store.add("env", "cpu.idle", serde_json::json!(1), 0.5, "a", false).unwrap();
        store.add("env", "disk.free", serde_json::json!(1), 0.5, "a", false).unwrap();
        let results = store.query("env", "cpu.");
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key, "cpu.idle");
    }

    #[test]
    fn flush_then_reload_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = BeliefStore::new(dir.path());
            store.add("env", "k", serde_json::json!("v"), 0.5, "a", false).unwrap();
            store.flush("env").unwrap();
        }
        let store = BeliefStore::new(dir.path());
        let belief = store.get("env", "k").unwrap();
        assert_eq!(belief.value, serde_json::json!("v"));
    }
}
