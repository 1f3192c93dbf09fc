use std::{future::Future, sync::Arc};

use futures::{StreamExt, stream};
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    commit::CommitProtocol,
    config::BulkConfig,
    domain::{
        Actor, ActorRef, Balance, BalanceId, BankAccount, BulkInquiry, BulkItemRef, BulkStatus,
        BulkTransfer, Corporate, InquiryItem, Transaction, TransferRequest,
    },
    error::LedgerError,
    gateway::{self, BulkNotification, CallbackNotifier},
    transfer::{BankTransfer, BankTransferRequest},
};

const INTERNAL_ERROR_REASON: &str = "Internal server error";
const INTERRUPTED_REASON: &str = "Interrupted before completion";

/// Reason stored on a failed item. Infrastructure errors are not exposed verbatim.
fn failure_reason(err: &LedgerError) -> String {
    match err {
        LedgerError::InvalidBankAccount { reason } => reason.clone(),
        err if err.is_domain() => err.to_string(),
        _ => INTERNAL_ERROR_REASON.to_string(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BulkKind {
    Inquiry,
    Transfer,
}

/// Resolves once a launched job reached a terminal status.
#[derive(Debug)]
pub struct BulkHandle {
    id: Uuid,
    receiver: oneshot::Receiver<BulkStatus>,
}

impl BulkHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Terminal status of the job. A supervisor that went away counts as FAILED.
    pub async fn finished(self) -> BulkStatus {
        self.receiver.await.unwrap_or(BulkStatus::Failed)
    }
}

/// A job as it was when its background execution was launched.
#[derive(Debug)]
pub struct BulkLaunch<J> {
    pub job: J,
    pub handle: BulkHandle,
}

#[derive(Clone)]
pub struct BulkEngine {
    commit: CommitProtocol,
    transfer: BankTransfer,
    notifier: Arc<dyn CallbackNotifier>,
    config: BulkConfig,
}

impl BulkEngine {
    pub fn new(
        commit: CommitProtocol,
        transfer: BankTransfer,
        notifier: Arc<dyn CallbackNotifier>,
        config: BulkConfig,
    ) -> Self {
        Self {
            commit,
            transfer,
            notifier,
            config,
        }
    }

    /// Stores the job and starts checking the accounts right away.
    pub async fn create_bulk_inquiry(
        &self,
        corporate: &Corporate,
        owner: ActorRef,
        reference: &str,
        accounts: Vec<BankAccount>,
    ) -> Result<BulkLaunch<BulkInquiry>, LedgerError> {
        if accounts.is_empty() {
            return Err(LedgerError::BulkListEmpty);
        }
        let mut job = BulkInquiry::new(corporate.id, reference, owner, accounts);
        job.status = BulkStatus::InProgress;
        self.commit.store().insert(&job).await?;
        info!(bulk_id = %job.id, total = job.total, "Bulk inquiry created");

        let engine = self.clone();
        let task_job = job.clone();
        let handle = self.launch(
            BulkKind::Inquiry,
            job.id,
            corporate.clone(),
            owner,
            async move { engine.run_inquiry(task_job).await },
        );
        Ok(BulkLaunch { job, handle })
    }

    pub async fn create_bulk_transfer(
        &self,
        corporate: &Corporate,
        owner: ActorRef,
        reference: &str,
        balance_id: BalanceId,
        transfers: Vec<TransferRequest>,
    ) -> Result<BulkTransfer, LedgerError> {
        if transfers.is_empty() {
            return Err(LedgerError::BulkListEmpty);
        }
        let balance = self
            .commit
            .store()
            .get::<Balance>(balance_id)
            .await?
            .ok_or(LedgerError::BalanceNotFound(balance_id))?;
        if balance.corporate_id != corporate.id {
            return Err(LedgerError::InvalidBalanceScope);
        }

        let job = BulkTransfer::new(corporate.id, reference, owner, balance.id, transfers);
        self.commit.store().insert(&job).await?;
        info!(bulk_id = %job.id, total = job.total, %balance_id, "Bulk transfer created");
        Ok(job)
    }

    /// Validates the caller, moves the job to IN_PROGRESS and processes the items in the
    /// background. Returns without waiting for any transfer.
    pub async fn execute_bulk_transfer(
        &self,
        corporate: &Corporate,
        actor: ActorRef,
        bulk_id: Uuid,
        pin: &str,
    ) -> Result<BulkLaunch<BulkTransfer>, LedgerError> {
        let job = self.view_bulk_transfer(corporate, bulk_id).await?;
        if job.status != BulkStatus::Unexecuted {
            return Err(LedgerError::BulkAlreadyExecuted(bulk_id));
        }
        gateway::validate_pin(self.transfer.credentials(), &actor, pin).await?;

        let account = self
            .commit
            .store()
            .get::<Actor>(actor.id)
            .await?
            .ok_or(LedgerError::ActorNotFound(actor.id))?;
        if !account
            .access(job.balance_id)
            .is_some_and(|access| access.can_operate())
        {
            return Err(LedgerError::InvalidBalanceAccess);
        }
        if !account.verified {
            return Err(LedgerError::ActorNotVerified);
        }

        let job = self
            .commit
            .run_atomic(|session| async move {
                let mut job = session
                    .get::<BulkTransfer>(bulk_id)
                    .await?
                    .ok_or(LedgerError::BulkNotFound(bulk_id))?;
                if job.status != BulkStatus::Unexecuted {
                    return Err(LedgerError::BulkAlreadyExecuted(bulk_id));
                }
                job.status = BulkStatus::InProgress;
                session.save(&job).await?;
                Ok(job)
            })
            .await?;
        info!(%bulk_id, actor = %actor.id, "Bulk transfer started");

        let engine = self.clone();
        let task_corporate = corporate.clone();
        let task_job = job.clone();
        let handle = self.launch(
            BulkKind::Transfer,
            job.id,
            corporate.clone(),
            job.owner,
            async move { engine.run_transfer(task_corporate, actor, task_job).await },
        );
        Ok(BulkLaunch { job, handle })
    }

    pub async fn view_bulk_inquiry(
        &self,
        corporate: &Corporate,
        bulk_id: Uuid,
    ) -> Result<BulkInquiry, LedgerError> {
        self.commit
            .store()
            .get::<BulkInquiry>(bulk_id)
            .await?
            .filter(|job| job.corporate_id == corporate.id)
            .ok_or(LedgerError::BulkNotFound(bulk_id))
    }

    pub async fn view_bulk_transfer(
        &self,
        corporate: &Corporate,
        bulk_id: Uuid,
    ) -> Result<BulkTransfer, LedgerError> {
        self.commit
            .store()
            .get::<BulkTransfer>(bulk_id)
            .await?
            .filter(|job| job.corporate_id == corporate.id)
            .ok_or(LedgerError::BulkNotFound(bulk_id))
    }

    /// Marks jobs left IN_PROGRESS by a previous process as FAILED. Must run before any
    /// job is launched by this process.
    pub async fn recover_interrupted(&self) -> Result<Vec<Uuid>, LedgerError> {
        let store = self.commit.store();
        let mut recovered = Vec::new();

        let inquiries = store
            .find::<BulkInquiry>(|job| job.status == BulkStatus::InProgress)
            .await?;
        for mut job in inquiries {
            job.fail(INTERRUPTED_REASON);
            store.save(&job).await?;
            recovered.push(job.id);
        }

        let transfers = store
            .find::<BulkTransfer>(|job| job.status == BulkStatus::InProgress)
            .await?;
        for job in transfers {
            self.fail_transfer(job.id, INTERRUPTED_REASON).await?;
            recovered.push(job.id);
        }

        if !recovered.is_empty() {
            warn!(count = recovered.len(), "Interrupted bulk jobs marked as failed");
        }
        Ok(recovered)
    }

    fn launch<F>(
        &self,
        kind: BulkKind,
        bulk_id: Uuid,
        corporate: Corporate,
        owner: ActorRef,
        task: F,
    ) -> BulkHandle
    where
        F: Future<Output = Result<BulkStatus, LedgerError>> + Send + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let engine = self.clone();
        tokio::spawn(async move {
            let status = match tokio::spawn(task).await {
                Ok(Ok(status)) => status,
                Ok(Err(err)) => {
                    error!(%bulk_id, ?kind, error = %err, "Bulk job failed");
                    engine.mark_failed(kind, bulk_id, &failure_reason(&err)).await
                }
                Err(err) => {
                    error!(%bulk_id, ?kind, error = %err, "Bulk job crashed");
                    engine.mark_failed(kind, bulk_id, INTERNAL_ERROR_REASON).await
                }
            };
            info!(%bulk_id, ?kind, ?status, "Bulk job finished");
            engine.notify(kind, &corporate, owner, bulk_id, status);
            // the caller may have dropped the handle
            let _ = sender.send(status);
        });
        BulkHandle {
            id: bulk_id,
            receiver,
        }
    }

    async fn mark_failed(&self, kind: BulkKind, bulk_id: Uuid, reason: &str) -> BulkStatus {
        let saved = match kind {
            BulkKind::Inquiry => {
                self.commit
                    .run_atomic(|session| async move {
                        if let Some(mut job) = session.get::<BulkInquiry>(bulk_id).await? {
                            job.fail(reason);
                            session.save(&job).await?;
                        }
                        Ok::<(), LedgerError>(())
                    })
                    .await
            }
            BulkKind::Transfer => self.fail_transfer(bulk_id, reason).await,
        };
        if let Err(err) = saved {
            error!(%bulk_id, error = %err, "Could not mark bulk job as failed");
        }
        BulkStatus::Failed
    }

    /// Closes a transfer job as FAILED. Items whose transfer was committed are recorded
    /// from their transactions first, so the job never reports a debited item as failed.
    async fn fail_transfer(&self, bulk_id: Uuid, reason: &str) -> Result<(), LedgerError> {
        let transactions = self
            .commit
            .store()
            .find::<Transaction>(|transaction| {
                transaction
                    .bulk_item
                    .is_some_and(|item| item.bulk_id == bulk_id)
            })
            .await?;
        let transactions = &transactions;
        self.commit
            .run_atomic(|session| async move {
                if let Some(mut job) = session.get::<BulkTransfer>(bulk_id).await? {
                    job.reconcile(transactions);
                    job.fail(reason);
                    session.save(&job).await?;
                }
                Ok::<(), LedgerError>(())
            })
            .await
    }

    async fn checkpoint(&self, job: &BulkTransfer) -> Result<(), LedgerError> {
        self.commit
            .run_atomic(|session| async move { session.save(job).await.map_err(LedgerError::from) })
            .await
    }

    fn notify(
        &self,
        kind: BulkKind,
        corporate: &Corporate,
        actor: ActorRef,
        bulk_id: Uuid,
        status: BulkStatus,
    ) {
        let url = match kind {
            BulkKind::Inquiry => &corporate.bulk_inquiry_callback_url,
            BulkKind::Transfer => &corporate.bulk_transfer_callback_url,
        };
        let Some(callback_url) = url.clone() else {
            return;
        };
        let notification = BulkNotification {
            corporate_id: corporate.id,
            actor,
            bulk_id,
            status,
            callback_url,
        };
        let notifier = self.notifier.clone();
        tokio::spawn(async move { notifier.notify_bulk_result(&notification).await });
    }

    async fn run_inquiry(&self, mut job: BulkInquiry) -> Result<BulkStatus, LedgerError> {
        let items: Vec<InquiryItem> = stream::iter(job.items.clone())
            .map(|item| self.inquire(item))
            .buffered(self.config.inquiry_concurrency.max(1))
            .collect()
            .await;
        job.complete(items);
        self.commit.store().save(&job).await?;
        Ok(job.status)
    }

    async fn inquire(&self, item: InquiryItem) -> InquiryItem {
        match self.transfer.check_destination(&item.account).await {
            Ok(account) => InquiryItem {
                account,
                valid: true,
                reason: None,
                ..item
            },
            Err(err) => InquiryItem {
                valid: false,
                reason: Some(failure_reason(&err)),
                ..item
            },
        }
    }

    /// Items run one after another against the single source balance. The job record
    /// is saved after each item. A checkpoint that cannot be saved does not stop the
    /// batch: the next one carries the missed results.
    async fn run_transfer(
        &self,
        corporate: Corporate,
        actor: ActorRef,
        mut job: BulkTransfer,
    ) -> Result<BulkStatus, LedgerError> {
        for index in 0..job.items.len() {
            let item = &job.items[index];
            if item.is_processed() {
                continue;
            }
            let number = item.number;
            let request = BankTransferRequest {
                balance_id: job.balance_id,
                destination: item.destination.clone(),
                amount: item.amount,
                external_id: item.external_id.clone(),
                bulk_item: Some(BulkItemRef {
                    bulk_id: job.id,
                    number,
                }),
            };
            match self
                .transfer
                .execute_authorized(&corporate, actor, &request)
                .await
            {
                Ok(transaction) => job.record_success(index, transaction.code),
                Err(err) => {
                    warn!(bulk_id = %job.id, number, error = %err, "Bulk item failed");
                    job.record_failure(index, failure_reason(&err));
                }
            }
            if let Err(err) = self.checkpoint(&job).await {
                error!(bulk_id = %job.id, number, error = %err, "Bulk checkpoint failed");
            }
        }
        job.status = BulkStatus::Completed;
        self.checkpoint(&job).await?;
        Ok(job.status)
    }
}
