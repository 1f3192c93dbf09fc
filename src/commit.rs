use std::future::Future;

use tracing::{error, warn};

use crate::{
    config::RetryConfig,
    error::LedgerError,
    store::{Session, Store, StoreError, TransactionOptions},
};

/// Runs units of work atomically against the [`Store`].
///
/// A unit of work receives a fresh [`Session`] on every attempt and must keep all of its
/// persistent effects inside that session: after a transient conflict it is replayed
/// from the start.
#[derive(Clone)]
pub struct CommitProtocol {
    store: Store,
    retry: RetryConfig,
    options: TransactionOptions,
}

impl CommitProtocol {
    pub fn new(store: Store, retry: RetryConfig) -> Self {
        Self {
            store,
            retry,
            options: TransactionOptions::default(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub async fn run_atomic<T, F, Fut>(&self, mut unit_of_work: F) -> Result<T, LedgerError>
    where
        F: FnMut(Session) -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            let session = self
                .store
                .start_session(self.options)
                .await
                .map_err(LedgerError::TransactionStart)?;

            let outcome = match unit_of_work(session.clone()).await {
                Ok(value) => self.commit_with_retry(&session).await.map(|()| value),
                Err(err) => {
                    session.abort().await;
                    Err(err)
                }
            };

            match outcome {
                Ok(value) => return Ok(value),
                Err(LedgerError::Store(source)) if source.is_transient() => {
                    if attempt >= max_attempts {
                        error!(attempt, error = %source, "Transaction retries exhausted");
                        return Err(LedgerError::TransactionFailed {
                            attempts: attempt,
                            source,
                        });
                    }
                    let backoff = self.retry.backoff_for_attempt(attempt - 1);
                    warn!(attempt, ?backoff, error = %source, "Replaying unit of work");
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn commit_with_retry(&self, session: &Session) -> Result<(), LedgerError> {
        let max_attempts = self.retry.commit_attempts.max(1);
        let mut attempt = 1;
        loop {
            match session.commit().await {
                Ok(()) => return Ok(()),
                Err(err @ StoreError::CommitUnknown(_)) => {
                    if attempt >= max_attempts {
                        error!(attempt, error = %err, "Commit outcome still unknown");
                        return Err(LedgerError::TransactionFailed {
                            attempts: attempt,
                            source: err,
                        });
                    }
                    warn!(attempt, error = %err, "Retrying commit");
                    attempt += 1;
                }
                Err(err) => return Err(err.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicU32, Ordering},
    };

    use serde::{Deserialize, Serialize};
    use uuid::Uuid;

    use crate::store::{
        Collection, Document,
        in_memory::{CommitFault, InMemoryStore},
    };

    use super::*;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Counter {
        id: Uuid,
        value: u64,
    }

    impl Document for Counter {
        const COLLECTION: Collection = Collection::Balances;

        fn id(&self) -> Uuid {
            self.id
        }
    }

    fn setup() -> (CommitProtocol, InMemoryStore) {
        let backend = InMemoryStore::default();
        let retry = RetryConfig {
            max_attempts: 3,
            initial_backoff_ms: 1,
            max_backoff_ms: 2,
            commit_attempts: 2,
        };
        (
            CommitProtocol::new(Store::new(Arc::new(backend.clone())), retry),
            backend,
        )
    }

    async fn increment(commit: &CommitProtocol, id: Uuid, calls: &AtomicU32) -> Result<u64, LedgerError> {
        commit
            .run_atomic(|session| async move {
                calls.fetch_add(1, Ordering::SeqCst);
                let mut counter: Counter = session.get(id).await?.unwrap();
                counter.value += 1;
                session.save(&counter).await?;
                Ok(counter.value)
            })
            .await
    }

    #[tokio::test]
    async fn commits_unit_of_work() {
        let (commit, _) = setup();
        let id = Uuid::new_v4();
        commit.store().insert(&Counter { id, value: 0 }).await.unwrap();

        let calls = AtomicU32::new(0);
        assert_eq!(increment(&commit, id, &calls).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let stored: Counter = commit.store().get(id).await.unwrap().unwrap();
        assert_eq!(stored.value, 1);
    }

    #[tokio::test]
    async fn replays_whole_unit_on_transient_error() {
        let (commit, backend) = setup();
        let id = Uuid::new_v4();
        commit.store().insert(&Counter { id, value: 0 }).await.unwrap();
        backend.fail_next_commits(1, CommitFault::WriteConflict);
        backend.fail_next_commits(1, CommitFault::TransientNetwork);

        let calls = AtomicU32::new(0);
        assert_eq!(increment(&commit, id, &calls).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let stored: Counter = commit.store().get(id).await.unwrap().unwrap();
        assert_eq!(stored.value, 1);
    }

    #[tokio::test]
    async fn exhausted_retries_leave_no_state() {
        let (commit, backend) = setup();
        let id = Uuid::new_v4();
        commit.store().insert(&Counter { id, value: 0 }).await.unwrap();
        backend.fail_next_commits(3, CommitFault::WriteConflict);

        let calls = AtomicU32::new(0);
        let err = increment(&commit, id, &calls).await.unwrap_err();
        assert!(matches!(
            err,
            LedgerError::TransactionFailed {
                attempts: 3,
                source: StoreError::WriteConflict
            }
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let stored: Counter = commit.store().get(id).await.unwrap().unwrap();
        assert_eq!(stored.value, 0);
    }

    #[tokio::test]
    async fn unknown_commit_result_retries_commit_only() {
        let (commit, backend) = setup();
        let id = Uuid::new_v4();
        commit.store().insert(&Counter { id, value: 0 }).await.unwrap();
        backend.fail_next_commits(1, CommitFault::UnknownResult);

        let calls = AtomicU32::new(0);
        assert_eq!(increment(&commit, id, &calls).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn domain_error_aborts_without_retry() {
        let (commit, backend) = setup();
        let calls = AtomicU32::new(0);
        let err = commit
            .run_atomic(|session| {
                let calls = &calls;
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    session
                        .insert(&Counter {
                            id: Uuid::new_v4(),
                            value: 1,
                        })
                        .await?;
                    Err::<(), _>(LedgerError::InsufficientBalance)
                }
            })
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::InsufficientBalance));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(backend.stats().aborted, 1);
        assert!(commit.store().find::<Counter>(|_| true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_failure_is_not_retried() {
        let (commit, backend) = setup();
        backend.fail_next_starts(1);
        let calls = AtomicU32::new(0);
        let err = increment(&commit, Uuid::new_v4(), &calls).await.unwrap_err();
        assert!(matches!(err, LedgerError::TransactionStart(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_increments_do_not_lose_updates() {
        let backend = InMemoryStore::default();
        let retry = RetryConfig {
            max_attempts: 50,
            initial_backoff_ms: 1,
            max_backoff_ms: 5,
            commit_attempts: 1,
        };
        let commit = CommitProtocol::new(Store::new(Arc::new(backend.clone())), retry);
        let id = Uuid::new_v4();
        commit.store().insert(&Counter { id, value: 0 }).await.unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let mut tasks = Vec::new();
        for _ in 0..8 {
            let commit = commit.clone();
            let calls = calls.clone();
            tasks.push(tokio::spawn(async move {
                increment(&commit, id, &calls).await.unwrap();
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let stored: Counter = commit.store().get(id).await.unwrap().unwrap();
        assert_eq!(stored.value, 8);
    }
}
