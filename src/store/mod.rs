use std::sync::Arc;

use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub mod in_memory;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Collection {
    Balances,
    Statements,
    Transactions,
    Actors,
    AccessRequests,
    BulkInquiries,
    BulkTransfers,
}

/// A record persisted as one document in a [`Collection`].
pub trait Document: Serialize + DeserializeOwned + Send + Sync {
    const COLLECTION: Collection;

    fn id(&self) -> Uuid;
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Write conflict, document was modified by a concurrent transaction")]
    WriteConflict,
    #[error("Transient network error: {0}")]
    TransientNetwork(String),
    #[error("Commit result unknown: {0}")]
    CommitUnknown(String),
    #[error("Session could not be started: {0}")]
    SessionUnavailable(String),
    #[error("Document {id} already exists in {collection:?}")]
    DuplicateKey { collection: Collection, id: Uuid },
    #[error("Document {id} not found in {collection:?}")]
    DocumentNotFound { collection: Collection, id: Uuid },
    #[error("Transaction is already committed or aborted")]
    TransactionFinished,
    #[error("Document serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    /// Errors after which the whole unit of work can be replayed from the start.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::WriteConflict | StoreError::TransientNetwork(_))
    }

    /// The commit may or may not have been applied; only the commit is retried.
    pub fn is_commit_unknown(&self) -> bool {
        matches!(self, StoreError::CommitUnknown(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadConcern {
    Local,
    Majority,
    Snapshot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteConcern {
    Acknowledged,
    Majority,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransactionOptions {
    pub read_concern: ReadConcern,
    pub write_concern: WriteConcern,
}

impl Default for TransactionOptions {
    fn default() -> Self {
        Self {
            read_concern: ReadConcern::Snapshot,
            write_concern: WriteConcern::Majority,
        }
    }
}

/// One open multi-document transaction. Nothing is visible to other readers until
/// [`StoreSession::commit`] succeeds.
#[async_trait]
pub trait StoreSession: Send + Sync {
    async fn find_one(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, StoreError>;

    async fn insert(&self, collection: Collection, id: Uuid, document: Value)
    -> Result<(), StoreError>;

    async fn replace(
        &self,
        collection: Collection,
        id: Uuid,
        document: Value,
    ) -> Result<(), StoreError>;

    async fn commit(&self) -> Result<(), StoreError>;

    async fn abort(&self);
}

/// Document store with session-scoped transactions plus single-document autocommit
/// operations for reads and records that are not part of a balance mutation.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn start_session(
        &self,
        options: TransactionOptions,
    ) -> Result<Arc<dyn StoreSession>, StoreError>;

    async fn find_one(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, StoreError>;

    /// All documents of a collection, in insertion order.
    async fn find_all(&self, collection: Collection) -> Result<Vec<Value>, StoreError>;

    async fn insert(&self, collection: Collection, id: Uuid, document: Value)
    -> Result<(), StoreError>;

    async fn replace(
        &self,
        collection: Collection,
        id: Uuid,
        document: Value,
    ) -> Result<(), StoreError>;
}

/// Typed handle over a [`DocumentStore`], shared by every component.
#[derive(Clone)]
pub struct Store {
    inner: Arc<dyn DocumentStore>,
}

impl Store {
    pub fn new(inner: Arc<dyn DocumentStore>) -> Self {
        Self { inner }
    }

    pub async fn start_session(&self, options: TransactionOptions) -> Result<Session, StoreError> {
        let inner = self.inner.start_session(options).await?;
        Ok(Session { inner })
    }

    pub async fn get<D: Document>(&self, id: Uuid) -> Result<Option<D>, StoreError> {
        match self.inner.find_one(D::COLLECTION, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn find<D: Document>(
        &self,
        predicate: impl Fn(&D) -> bool + Send,
    ) -> Result<Vec<D>, StoreError> {
        let mut documents = Vec::new();
        for value in self.inner.find_all(D::COLLECTION).await? {
            let document: D = serde_json::from_value(value)?;
            if predicate(&document) {
                documents.push(document);
            }
        }
        Ok(documents)
    }

    pub async fn insert<D: Document>(&self, document: &D) -> Result<(), StoreError> {
        let value = serde_json::to_value(document)?;
        self.inner.insert(D::COLLECTION, document.id(), value).await
    }

    pub async fn save<D: Document>(&self, document: &D) -> Result<(), StoreError> {
        let value = serde_json::to_value(document)?;
        self.inner.replace(D::COLLECTION, document.id(), value).await
    }
}

/// Typed handle over an open [`StoreSession`]. Cloning shares the same transaction.
#[derive(Clone)]
pub struct Session {
    inner: Arc<dyn StoreSession>,
}

impl Session {
    pub async fn get<D: Document>(&self, id: Uuid) -> Result<Option<D>, StoreError> {
        match self.inner.find_one(D::COLLECTION, id).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    pub async fn insert<D: Document>(&self, document: &D) -> Result<(), StoreError> {
        let value = serde_json::to_value(document)?;
        self.inner.insert(D::COLLECTION, document.id(), value).await
    }

    pub async fn save<D: Document>(&self, document: &D) -> Result<(), StoreError> {
        let value = serde_json::to_value(document)?;
        self.inner.replace(D::COLLECTION, document.id(), value).await
    }

    pub async fn commit(&self) -> Result<(), StoreError> {
        self.inner.commit().await
    }

    pub async fn abort(&self) {
        self.inner.abort().await
    }
}
