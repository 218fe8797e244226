use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::{broadcast, Mutex};

use super::{
    CollectionPath, CollectionSnapshot, CollectionSubscription, DocumentPath, DocumentSnapshot,
    DocumentStore, FieldValue, StoreError, WriteFields,
};

const CHANNEL_CAPACITY: usize = 64;

/// In-process document store. Collections are created lazily on first write
/// or subscribe, and every mutation fans out a fresh snapshot to listeners.
#[derive(Clone, Default)]
pub struct MemoryStore {
    inner: Arc<Mutex<StoreState>>,
}

#[derive(Default)]
struct StoreState {
    collections: HashMap<String, CollectionState>,
}

struct CollectionState {
    docs: BTreeMap<String, Value>,
    sender: broadcast::Sender<CollectionSnapshot>,
}

impl CollectionState {
    fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            docs: BTreeMap::new(),
            sender,
        }
    }

    fn snapshot(&self) -> CollectionSnapshot {
        CollectionSnapshot {
            docs: self
                .docs
                .iter()
                .map(|(id, fields)| DocumentSnapshot {
                    id: id.clone(),
                    fields: fields.clone(),
                })
                .collect(),
        }
    }

    fn publish(&self) {
        // No listeners is fine; the send result only reports that.
        let _ = self.sender.send(self.snapshot());
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn write(&self, path: &DocumentPath, fields: WriteFields) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        let collection = state
            .collections
            .entry(path.collection.as_str().to_string())
            .or_insert_with(CollectionState::new);
        collection
            .docs
            .insert(path.id.clone(), resolve_fields(&fields, now_ms()));
        collection.publish();
        Ok(())
    }

    async fn delete(&self, path: &DocumentPath) -> Result<(), StoreError> {
        let mut state = self.inner.lock().await;
        if let Some(collection) = state.collections.get_mut(path.collection.as_str()) {
            // Deleting an absent document is a quiet no-op upstream too.
            if collection.docs.remove(&path.id).is_some() {
                collection.publish();
            }
        }
        Ok(())
    }

    async fn subscribe(
        &self,
        collection: &CollectionPath,
    ) -> Result<CollectionSubscription, StoreError> {
        let mut state = self.inner.lock().await;
        let collection = state
            .collections
            .entry(collection.as_str().to_string())
            .or_insert_with(CollectionState::new);
        Ok(CollectionSubscription::new(
            collection.snapshot(),
            collection.sender.subscribe(),
        ))
    }
}

fn resolve_fields(fields: &WriteFields, timestamp: u64) -> Value {
    let mut object = Map::new();
    for (name, value) in fields.entries() {
        let resolved = match value {
            FieldValue::Json(json) => json.clone(),
            FieldValue::ServerTimestamp => Value::from(timestamp),
        };
        object.insert(name.clone(), resolved);
    }
    Value::Object(object)
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or(0)
}
