//! Document store seam: path helpers, write batches and live collection
//! subscriptions backed by broadcast channels.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::model::Ticker;

pub const PRICES_SEGMENT: &str = "public/data/stock_prices";
pub const SUBSCRIPTIONS_SEGMENT: &str = "subscriptions";

/// Builds every document path the dashboard reads or writes, scoped by the
/// application id from [`crate::config::AppConfig`].
#[derive(Debug, Clone)]
pub struct StorePaths {
    app_id: String,
}

impl StorePaths {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            app_id: app_id.into(),
        }
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// `artifacts/{app_id}/public/data/stock_prices`
    pub fn prices_collection(&self) -> CollectionPath {
        CollectionPath::new(format!("artifacts/{}/{}", self.app_id, PRICES_SEGMENT))
    }

    pub fn price_document(&self, ticker: Ticker) -> DocumentPath {
        self.prices_collection().document(ticker.symbol())
    }

    /// `artifacts/{app_id}/users/{uid}/subscriptions`
    pub fn subscriptions_collection(&self, uid: &str) -> CollectionPath {
        CollectionPath::new(format!(
            "artifacts/{}/users/{}/{}",
            self.app_id, uid, SUBSCRIPTIONS_SEGMENT
        ))
    }

    pub fn subscription_document(&self, uid: &str, ticker: Ticker) -> DocumentPath {
        self.subscriptions_collection(uid).document(ticker.symbol())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CollectionPath(String);

impl CollectionPath {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn document(&self, id: impl Into<String>) -> DocumentPath {
        DocumentPath {
            collection: self.clone(),
            id: id.into(),
        }
    }
}

impl fmt::Display for CollectionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocumentPath {
    pub collection: CollectionPath,
    pub id: String,
}

impl fmt::Display for DocumentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// A single field in a pending write. Server timestamps are sentinels the
/// backend resolves at commit time, so the writer never supplies a clock.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Json(Value),
    ServerTimestamp,
}

/// Ordered field set for one document write. Writes replace the whole
/// document, matching upstream set semantics.
#[derive(Debug, Clone, Default)]
pub struct WriteFields {
    entries: Vec<(String, FieldValue)>,
}

impl WriteFields {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.entries.push((name.into(), FieldValue::Json(value.into())));
        self
    }

    pub fn server_timestamp(mut self, name: impl Into<String>) -> Self {
        self.entries.push((name.into(), FieldValue::ServerTimestamp));
        self
    }

    pub fn entries(&self) -> &[(String, FieldValue)] {
        &self.entries
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DocumentSnapshot {
    pub id: String,
    /// Always a JSON object; resolved server timestamps appear as integers.
    pub fields: Value,
}

/// Point-in-time view of one collection, documents sorted by id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct CollectionSnapshot {
    pub docs: Vec<DocumentSnapshot>,
}

impl CollectionSnapshot {
    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&DocumentSnapshot> {
        self.docs.iter().find(|doc| doc.id == id)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
}

/// Why a live subscription stopped yielding snapshots.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubscriptionLapse {
    #[error("listener lagged and skipped {0} snapshots")]
    Lagged(u64),
    #[error("collection stream closed")]
    Closed,
}

/// Live feed of collection snapshots. The current state is delivered first,
/// then one snapshot per change. Dropping the value detaches the listener.
pub struct CollectionSubscription {
    initial: Option<CollectionSnapshot>,
    receiver: broadcast::Receiver<CollectionSnapshot>,
}

impl CollectionSubscription {
    pub fn new(
        initial: CollectionSnapshot,
        receiver: broadcast::Receiver<CollectionSnapshot>,
    ) -> Self {
        Self {
            initial: Some(initial),
            receiver,
        }
    }

    pub async fn recv(&mut self) -> Result<CollectionSnapshot, SubscriptionLapse> {
        if let Some(snapshot) = self.initial.take() {
            return Ok(snapshot);
        }
        match self.receiver.recv().await {
            Ok(snapshot) => Ok(snapshot),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                Err(SubscriptionLapse::Lagged(skipped))
            }
            Err(broadcast::error::RecvError::Closed) => Err(SubscriptionLapse::Closed),
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Replaces the document at `path` with `fields`.
    async fn write(&self, path: &DocumentPath, fields: WriteFields) -> Result<(), StoreError>;

    async fn delete(&self, path: &DocumentPath) -> Result<(), StoreError>;

    /// Opens a live snapshot feed over every document in `collection`.
    async fn subscribe(
        &self,
        collection: &CollectionPath,
    ) -> Result<CollectionSubscription, StoreError>;
}

pub mod testkit {
    //! Store wrappers for exercising accounting and failure paths in tests.

    use std::sync::Mutex;

    use super::*;

    /// Forwards every call to the wrapped store and records the paths of
    /// writes and deletes it passed through.
    pub struct RecordingStore<S> {
        inner: S,
        writes: Mutex<Vec<DocumentPath>>,
        deletes: Mutex<Vec<DocumentPath>>,
    }

    impl<S: DocumentStore> RecordingStore<S> {
        pub fn new(inner: S) -> Self {
            Self {
                inner,
                writes: Mutex::new(Vec::new()),
                deletes: Mutex::new(Vec::new()),
            }
        }

        pub fn writes(&self) -> Vec<DocumentPath> {
            self.writes.lock().unwrap().clone()
        }

        pub fn deletes(&self) -> Vec<DocumentPath> {
            self.deletes.lock().unwrap().clone()
        }

        pub fn write_count(&self) -> usize {
            self.writes.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl<S: DocumentStore> DocumentStore for RecordingStore<S> {
        async fn write(&self, path: &DocumentPath, fields: WriteFields) -> Result<(), StoreError> {
            self.writes.lock().unwrap().push(path.clone());
            self.inner.write(path, fields).await
        }

        async fn delete(&self, path: &DocumentPath) -> Result<(), StoreError> {
            self.deletes.lock().unwrap().push(path.clone());
            self.inner.delete(path).await
        }

        async fn subscribe(
            &self,
            collection: &CollectionPath,
        ) -> Result<CollectionSubscription, StoreError> {
            self.inner.subscribe(collection).await
        }
    }

    /// Rejects every call with [`StoreError::Unavailable`].
    pub struct FailingStore;

    #[async_trait]
    impl DocumentStore for FailingStore {
        async fn write(&self, _: &DocumentPath, _: WriteFields) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("injected write failure".to_string()))
        }

        async fn delete(&self, _: &DocumentPath) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("injected delete failure".to_string()))
        }

        async fn subscribe(
            &self,
            _: &CollectionPath,
        ) -> Result<CollectionSubscription, StoreError> {
            Err(StoreError::Unavailable("injected subscribe failure".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn paths_follow_the_artifacts_layout() {
        let paths = StorePaths::new("default-app-id");
        assert_eq!(
            paths.prices_collection().as_str(),
            "artifacts/default-app-id/public/data/stock_prices"
        );
        assert_eq!(
            paths.price_document(Ticker::Goog).to_string(),
            "artifacts/default-app-id/public/data/stock_prices/GOOG"
        );
        assert_eq!(
            paths.subscriptions_collection("user-1").as_str(),
            "artifacts/default-app-id/users/user-1/subscriptions"
        );
        assert_eq!(
            paths.subscription_document("user-1", Ticker::Tsla).to_string(),
            "artifacts/default-app-id/users/user-1/subscriptions/TSLA"
        );
    }

    #[test]
    fn write_fields_preserve_declaration_order() {
        let fields = WriteFields::new()
            .field("ticker", "TSLA")
            .field("price", 101.25)
            .server_timestamp("lastUpdate");

        let entries = fields.entries();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].0, "ticker");
        assert_eq!(entries[0].1, FieldValue::Json(json!("TSLA")));
        assert_eq!(entries[2].1, FieldValue::ServerTimestamp);
    }

    #[test]
    fn optional_values_serialize_as_null() {
        let fields = WriteFields::new().field("previousPrice", None::<f64>);
        assert_eq!(fields.entries()[0].1, FieldValue::Json(Value::Null));
    }
}
