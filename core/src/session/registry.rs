//! Process-wide session registry
//!
//! Maps pair identifiers to sessions. The map itself is guarded by an
//! `RwLock`; each session sits behind its own mutex so concurrent pairs
//! proceed in parallel while mutations of any one session serialize.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use super::Session;

pub type SharedSession = Arc<Mutex<Session>>;

#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SharedSession>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a freshly minted session, returning its shared handle.
    pub async fn insert(&self, session: Session) -> SharedSession {
        let pair_id = session.pair_id.clone();
        let shared = Arc::new(Mutex::new(session));
        self.sessions
            .write()
            .await
            .insert(pair_id, shared.clone());
        shared
    }

    pub async fn get(&self, pair_id: &str) -> Option<SharedSession> {
        self.sessions.read().await.get(pair_id).cloned()
    }

    pub async fn contains(&self, pair_id: &str) -> bool {
        self.sessions.read().await.contains_key(pair_id)
    }

    pub async fn remove(&self, pair_id: &str) -> Option<SharedSession> {
        self.sessions.write().await.remove(pair_id)
    }

    /// Snapshot of all live sessions, for the reaper sweeps.
    pub async fn snapshot(&self) -> Vec<(String, SharedSession)> {
        self.sessions
            .read()
            .await
            .iter()
            .map(|(id, s)| (id.clone(), s.clone()))
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_lookup_remove() {
        let registry = SessionRegistry::new();
        assert!(registry.is_empty().await);

        registry
            .insert(Session::new("a1b2c3".to_string(), "t".repeat(32)))
            .await;
        assert!(registry.contains("a1b2c3").await);
        assert_eq!(registry.len().await, 1);

        let session = registry.get("a1b2c3").await.expect("present");
        assert_eq!(session.lock().await.pair_id, "a1b2c3");

        assert!(registry.remove("a1b2c3").await.is_some());
        assert!(registry.get("a1b2c3").await.is_none());
    }

    #[tokio::test]
    async fn test_snapshot_lists_all_pairs() {
        let registry = SessionRegistry::new();
        for id in ["aaaaaa", "bbbbbb", "cccccc"] {
            registry
                .insert(Session::new(id.to_string(), "t".repeat(32)))
                .await;
        }
        let mut ids: Vec<String> = registry
            .snapshot()
            .await
            .into_iter()
            .map(|(id, _)| id)
            .collect();
        ids.sort();
        assert_eq!(ids, vec!["aaaaaa", "bbbbbb", "cccccc"]);
    }
}
