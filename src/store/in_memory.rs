use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use serde_json::Value;
use tracing::trace;
use uuid::Uuid;

use super::{Collection, DocumentStore, StoreError, StoreSession, TransactionOptions};

type Key = (Collection, Uuid);
type Documents = HashMap<Key, Entry>;

#[derive(Debug, Clone)]
struct Entry {
    version: u64,
    sequence: u64,
    document: Value,
}

/// Failure injected into the next commit(s), for exercising retry paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitFault {
    WriteConflict,
    TransientNetwork,
    UnknownResult,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub started: u64,
    pub committed: u64,
    pub aborted: u64,
    pub conflicts: u64,
}

#[derive(Default)]
struct Inner {
    documents: Arc<Documents>,
    next_sequence: u64,
    start_faults: u32,
    commit_faults: VecDeque<CommitFault>,
    stats: StoreStats,
}

impl Inner {
    fn write(&mut self, key: Key, document: Value) {
        let sequence = self.next_sequence;
        let documents = Arc::make_mut(&mut self.documents);
        match documents.get_mut(&key) {
            Some(entry) => {
                entry.version += 1;
                entry.document = document;
            }
            None => {
                documents.insert(
                    key,
                    Entry {
                        version: 1,
                        sequence,
                        document,
                    },
                );
                self.next_sequence += 1;
            }
        }
    }
}

/// Process-local document store with snapshot isolation.
///
/// Each session reads from the snapshot taken when it started and buffers its writes.
/// Commit is first-committer-wins: if any document the session wrote has changed since
/// the snapshot, the commit fails with [`StoreError::WriteConflict`].
#[derive(Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<Mutex<Inner>>,
}

impl InMemoryStore {
    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn fail_next_starts(&self, count: u32) {
        self.lock().start_faults += count;
    }

    pub fn fail_next_commits(&self, count: u32, fault: CommitFault) {
        let mut inner = self.lock();
        for _ in 0..count {
            inner.commit_faults.push_back(fault);
        }
    }

    pub fn stats(&self) -> StoreStats {
        self.lock().stats
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn start_session(
        &self,
        options: TransactionOptions,
    ) -> Result<Arc<dyn StoreSession>, StoreError> {
        let mut inner = self.lock();
        if inner.start_faults > 0 {
            inner.start_faults -= 1;
            return Err(StoreError::SessionUnavailable(
                "connection pool exhausted".to_string(),
            ));
        }
        inner.stats.started += 1;
        trace!(?options, "Starting in-memory transaction");
        Ok(Arc::new(InMemorySession {
            store: self.clone(),
            snapshot: Arc::clone(&inner.documents),
            state: Mutex::new(SessionState::default()),
        }))
    }

    async fn find_one(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, StoreError> {
        Ok(self
            .lock()
            .documents
            .get(&(collection, id))
            .map(|entry| entry.document.clone()))
    }

    async fn find_all(&self, collection: Collection) -> Result<Vec<Value>, StoreError> {
        let inner = self.lock();
        let mut entries: Vec<&Entry> = inner
            .documents
            .iter()
            .filter(|((c, _), _)| *c == collection)
            .map(|(_, entry)| entry)
            .collect();
        entries.sort_by_key(|entry| entry.sequence);
        Ok(entries
            .into_iter()
            .map(|entry| entry.document.clone())
            .collect())
    }

    async fn insert(
        &self,
        collection: Collection,
        id: Uuid,
        document: Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if inner.documents.contains_key(&(collection, id)) {
            return Err(StoreError::DuplicateKey { collection, id });
        }
        inner.write((collection, id), document);
        Ok(())
    }

    async fn replace(
        &self,
        collection: Collection,
        id: Uuid,
        document: Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock();
        if !inner.documents.contains_key(&(collection, id)) {
            return Err(StoreError::DocumentNotFound { collection, id });
        }
        inner.write((collection, id), document);
        Ok(())
    }
}

#[derive(Default)]
struct SessionState {
    // kept in write order so new documents get sequences in the order they were inserted
    writes: Vec<(Key, Value)>,
    finished: bool,
}

impl SessionState {
    fn pending(&self, key: &Key) -> Option<&Value> {
        self.writes
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, value)| value)
    }

    fn stage(&mut self, key: Key, document: Value) {
        match self.writes.iter_mut().find(|(k, _)| *k == key) {
            Some((_, value)) => *value = document,
            None => self.writes.push((key, document)),
        }
    }
}

struct InMemorySession {
    store: InMemoryStore,
    snapshot: Arc<Documents>,
    state: Mutex<SessionState>,
}

impl InMemorySession {
    fn state(&self) -> Result<MutexGuard<'_, SessionState>, StoreError> {
        let state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.finished {
            return Err(StoreError::TransactionFinished);
        }
        Ok(state)
    }

    fn exists(&self, state: &SessionState, key: &Key) -> bool {
        state.pending(key).is_some() || self.snapshot.contains_key(key)
    }
}

#[async_trait]
impl StoreSession for InMemorySession {
    async fn find_one(&self, collection: Collection, id: Uuid) -> Result<Option<Value>, StoreError> {
        let key = (collection, id);
        let state = self.state()?;
        if let Some(value) = state.pending(&key) {
            return Ok(Some(value.clone()));
        }
        Ok(self.snapshot.get(&key).map(|entry| entry.document.clone()))
    }

    async fn insert(
        &self,
        collection: Collection,
        id: Uuid,
        document: Value,
    ) -> Result<(), StoreError> {
        let key = (collection, id);
        let mut state = self.state()?;
        if self.exists(&state, &key) {
            return Err(StoreError::DuplicateKey { collection, id });
        }
        state.stage(key, document);
        Ok(())
    }

    async fn replace(
        &self,
        collection: Collection,
        id: Uuid,
        document: Value,
    ) -> Result<(), StoreError> {
        let key = (collection, id);
        let mut state = self.state()?;
        if !self.exists(&state, &key) {
            return Err(StoreError::DocumentNotFound { collection, id });
        }
        state.stage(key, document);
        Ok(())
    }

    async fn commit(&self) -> Result<(), StoreError> {
        let mut state = self.state()?;
        let mut inner = self.store.lock();

        if let Some(fault) = inner.commit_faults.pop_front() {
            match fault {
                // the session stays open so the commit itself can be retried
                CommitFault::UnknownResult => {
                    return Err(StoreError::CommitUnknown(
                        "primary stepped down before acknowledging".to_string(),
                    ));
                }
                CommitFault::WriteConflict => {
                    state.finished = true;
                    inner.stats.conflicts += 1;
                    return Err(StoreError::WriteConflict);
                }
                CommitFault::TransientNetwork => {
                    state.finished = true;
                    inner.stats.aborted += 1;
                    return Err(StoreError::TransientNetwork(
                        "connection reset during commit".to_string(),
                    ));
                }
            }
        }

        let conflicting = state.writes.iter().any(|(key, _)| {
            let seen = self.snapshot.get(key).map(|entry| entry.version);
            let current = inner.documents.get(key).map(|entry| entry.version);
            seen != current
        });
        state.finished = true;
        if conflicting {
            inner.stats.conflicts += 1;
            return Err(StoreError::WriteConflict);
        }

        for (key, document) in state.writes.drain(..) {
            inner.write(key, document);
        }
        inner.stats.committed += 1;
        Ok(())
    }

    async fn abort(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.finished {
            state.finished = true;
            state.writes.clear();
            self.store.lock().stats.aborted += 1;
        }
    }
}
