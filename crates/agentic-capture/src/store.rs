//! In-memory artifact store with change notifications.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

use crate::types::ArtifactRecord;

/// Emitted after every write to the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Added { name: String },
}

/// Named artifacts shared between the engine and the resource layer.
///
/// Cloning yields another handle to the same store. A second `put` under an
/// existing name replaces the first.
#[derive(Clone)]
pub struct ArtifactStore {
    entries: Arc<DashMap<String, ArtifactRecord>>,
    events: broadcast::Sender<StoreEvent>,
}

impl ArtifactStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(64);
        Self {
            entries: Arc::new(DashMap::new()),
            events,
        }
    }

    pub fn put(&self, name: &str, bytes: Vec<u8>, mime_type: &str) -> ArtifactRecord {
        let record = ArtifactRecord {
            name: name.to_string(),
            size: bytes.len(),
            bytes,
            mime_type: mime_type.to_string(),
            created_at: chrono::Utc::now(),
        };
        self.entries.insert(name.to_string(), record.clone());
        tracing::debug!(name, mime_type, size = record.size, "Stored artifact");
        // No receivers is fine.
        let _ = self.events.send(StoreEvent::Added {
            name: name.to_string(),
        });
        record
    }

    pub fn get(&self, name: &str) -> Option<ArtifactRecord> {
        self.entries.get(name).map(|e| e.value().clone())
    }

    /// All records sorted by name, without their bytes.
    pub fn list(&self) -> Vec<ArtifactRecord> {
        let mut records: Vec<ArtifactRecord> = self
            .entries
            .iter()
            .map(|e| ArtifactRecord {
                bytes: Vec::new(),
                ..e.value().clone()
            })
            .collect();
        records.sort_by(|a, b| a.name.cmp(&b.name));
        records
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

impl Default for ArtifactStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_put_get() {
        let store = ArtifactStore::new();
        store.put("a", b"%PDF-1.4".to_vec(), "application/pdf");
        let got = store.get("a").unwrap();
        assert_eq!(got.bytes, b"%PDF-1.4");
        assert_eq!(got.mime_type, "application/pdf");
        assert_eq!(got.size, 8);
        assert!(store.get("missing").is_none());
    }

    #[test]
    fn test_last_write_wins() {
        let store = ArtifactStore::new();
        store.put("doc", vec![1], "application/pdf");
        store.put("doc", vec![2, 3], "image/png");
        assert_eq!(store.len(), 1);
        let got = store.get("doc").unwrap();
        assert_eq!(got.bytes, vec![2, 3]);
        assert_eq!(got.mime_type, "image/png");
    }

    #[test]
    fn test_list_sorted_without_bytes() {
        let store = ArtifactStore::new();
        store.put("b", vec![1, 2], "text/plain");
        store.put("a", vec![3], "text/plain");
        let names: Vec<_> = store.list().into_iter().map(|r| (r.name, r.bytes.len(), r.size)).collect();
        assert_eq!(names, vec![("a".to_string(), 0, 1), ("b".to_string(), 0, 2)]);
    }

    #[tokio::test]
    async fn test_every_write_notifies() {
        let store = ArtifactStore::new();
        let mut rx = store.subscribe();
        store.put("x", vec![], "text/plain");
        store.put("x", vec![1], "text/plain");
        assert_eq!(rx.recv().await.unwrap(), StoreEvent::Added { name: "x".into() });
        assert_eq!(rx.recv().await.unwrap(), StoreEvent::Added { name: "x".into() });
    }

    #[test]
    fn test_clones_share_entries() {
        let store = ArtifactStore::new();
        let other = store.clone();
        other.put("shared", vec![9], "text/plain");
        assert!(store.contains("shared"));
    }
}
