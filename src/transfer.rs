use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::{
    domain::{
        Actor, ActorRef, Balance, BalanceId, BankAccount, BulkItemRef, Corporate, Statement,
        Transaction,
    },
    error::LedgerError,
    gateway::{self, BankDirectory, CredentialVerifier, Disbursement, GatewayError},
    transaction::TransactionBase,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankTransferRequest {
    pub balance_id: BalanceId,
    pub destination: BankAccount,
    pub amount: u64,
    pub external_id: String,
    /// Set when the transfer runs as an item of a bulk job.
    #[serde(default)]
    pub bulk_item: Option<BulkItemRef>,
}

/// Moves money from a ledger balance to an account at an external bank.
#[derive(Clone)]
pub struct BankTransfer {
    base: TransactionBase,
    directory: Arc<dyn BankDirectory>,
    disbursement: Arc<dyn Disbursement>,
    credentials: Arc<dyn CredentialVerifier>,
}

impl BankTransfer {
    pub fn new(
        base: TransactionBase,
        directory: Arc<dyn BankDirectory>,
        disbursement: Arc<dyn Disbursement>,
        credentials: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            base,
            directory,
            disbursement,
            credentials,
        }
    }

    pub fn credentials(&self) -> &dyn CredentialVerifier {
        self.credentials.as_ref()
    }

    pub async fn execute(
        &self,
        corporate: &Corporate,
        actor: ActorRef,
        request: &BankTransferRequest,
        pin: &str,
    ) -> Result<Transaction, LedgerError> {
        if request.amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        gateway::validate_pin(self.credentials.as_ref(), &actor, pin).await?;
        self.execute_authorized(corporate, actor, request).await
    }

    /// Same as [`BankTransfer::execute`] for callers that already checked the actor's PIN.
    pub async fn execute_authorized(
        &self,
        corporate: &Corporate,
        actor: ActorRef,
        request: &BankTransferRequest,
    ) -> Result<Transaction, LedgerError> {
        if request.amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let store = self.base.commit_protocol().store();

        let account = store
            .get::<Actor>(actor.id)
            .await?
            .ok_or(LedgerError::ActorNotFound(actor.id))?;
        if !account.verified {
            return Err(LedgerError::ActorNotVerified);
        }
        if !account
            .access(request.balance_id)
            .is_some_and(|access| access.can_operate())
        {
            return Err(LedgerError::InvalidBalanceAccess);
        }

        let balance = store
            .get::<Balance>(request.balance_id)
            .await?
            .ok_or(LedgerError::BalanceNotFound(request.balance_id))?;
        if balance.corporate_id != corporate.id {
            return Err(LedgerError::InvalidBalanceScope);
        }

        let destination = self.check_destination(&request.destination).await?;
        let transaction = Transaction {
            bulk_item: request.bulk_item,
            ..Transaction::bank_transfer(
                &balance,
                actor,
                destination,
                request.amount,
                request.external_id.as_str(),
            )
        };

        let transfer = Statement::withdraw(balance.id, request.amount, &transaction.code);
        let fees = TransactionBase::create_fee_statements(corporate, &balance, &transaction)?;
        let mut statements = Vec::with_capacity(fees.len() + 1);
        statements.push(transfer.clone());
        statements.extend(fees.iter().cloned());
        self.base.commit(&statements, &transaction).await?;

        match self.disbursement.disburse(&transaction).await {
            Ok(payout) => {
                info!(code = %transaction.code, %payout, amount = transaction.amount, "Bank transfer sent");
                Ok(transaction)
            }
            Err(err) => {
                warn!(code = %transaction.code, error = %err, "Disbursement failed, reversing");
                let mut reverse = vec![transfer.inverse()];
                reverse.extend(TransactionBase::rollback_fee_statements(&fees));
                if let Err(rollback) = self.base.commit_rollback(&reverse, Some(&transaction)).await {
                    error!(code = %transaction.code, error = %rollback, "Reversal failed");
                    return Err(rollback);
                }
                Err(LedgerError::DisbursementFailed(err.to_string()))
            }
        }
    }

    /// Checks the format, then asks the bank directory. Returns the account with the
    /// holder name the bank reports.
    pub async fn check_destination(&self, account: &BankAccount) -> Result<BankAccount, LedgerError> {
        account.validate_format()?;
        match self
            .directory
            .inquiry(&account.bank_code, &account.account_number)
            .await
        {
            Ok(holder) => Ok(BankAccount {
                account_name: holder.name,
                ..account.clone()
            }),
            Err(GatewayError::Rejected(reason)) => Err(LedgerError::InvalidBankAccount { reason }),
            Err(GatewayError::Unavailable(reason)) => {
                Err(LedgerError::AccountInquiryUnavailable(reason))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::{
        commit::CommitProtocol,
        config::RetryConfig,
        domain::{AccessGrant, AccessLevel, ActorKind, TransactionKind, TransactionStatus},
        error::ErrorKind,
        fee::FeeRule,
        gateway::in_memory::{InstantDisbursement, PinDirectory, StaticBankDirectory},
        store::{Store, in_memory::InMemoryStore},
    };

    use super::*;

    const PIN: &str = "123456";

    struct Fixture {
        transfer: BankTransfer,
        store: Store,
        disbursement: Arc<InstantDisbursement>,
        corporate: Corporate,
        owner: Actor,
        balance: Balance,
    }

    async fn setup(disbursement: InstantDisbursement) -> Fixture {
        let store = Store::new(Arc::new(InMemoryStore::default()));
        let mut corporate = Corporate::new("Acme", "IDR");
        let revenue = Balance::new(Uuid::new_v4(), corporate.actor_ref(), corporate.id, "Revenue", "IDR");
        corporate.revenue_balance = Some(revenue.id);
        corporate.fee_schedule = vec![FeeRule {
            transaction_kind: TransactionKind::BankTransfer,
            owner_kind: ActorKind::User,
            flat: 50,
            rate: dec!(0),
        }];

        let mut owner = Actor::user(corporate.id, "alice");
        owner.verified = true;
        let balance = Balance {
            amount: 1000,
            ..Balance::new(Uuid::new_v4(), owner.reference, corporate.id, "Main", "IDR")
        };
        owner
            .grant(AccessGrant {
                balance_id: balance.id,
                access: AccessLevel::Owner,
            })
            .unwrap();
        store.insert(&revenue).await.unwrap();
        store.insert(&balance).await.unwrap();
        store.insert(&owner).await.unwrap();

        let disbursement = Arc::new(disbursement);
        let transfer = BankTransfer::new(
            TransactionBase::new(CommitProtocol::new(store.clone(), RetryConfig::default())),
            Arc::new(
                StaticBankDirectory::default()
                    .with_account("BNI", "111", "Bob")
                    .with_account("BNI", "999", "Mallory")
                    .unavailable_for("BRI"),
            ),
            disbursement.clone(),
            Arc::new(PinDirectory::default().with_pin(&owner.reference, PIN)),
        );
        Fixture {
            transfer,
            store,
            disbursement,
            corporate,
            owner,
            balance,
        }
    }

    fn request(balance_id: BalanceId, account_number: &str, amount: u64) -> BankTransferRequest {
        BankTransferRequest {
            balance_id,
            destination: BankAccount::new("BNI", account_number, ""),
            amount,
            external_id: "ext-1".to_string(),
            bulk_item: None,
        }
    }

    async fn amount(store: &Store, id: BalanceId) -> u64 {
        store.get::<Balance>(id).await.unwrap().unwrap().amount
    }

    #[tokio::test]
    async fn transfer_withdraws_amount_and_fee() {
        let f = setup(InstantDisbursement::default()).await;
        let transaction = f
            .transfer
            .execute(&f.corporate, f.owner.reference, &request(f.balance.id, "111", 300), PIN)
            .await
            .unwrap();

        assert_eq!(transaction.status, TransactionStatus::Success);
        assert_eq!(transaction.destination.account_name, "Bob");
        assert!(transaction.code.starts_with("TRX-"));
        assert_eq!(amount(&f.store, f.balance.id).await, 650);
        assert_eq!(amount(&f.store, f.corporate.revenue_balance.unwrap()).await, 50);
        assert_eq!(f.disbursement.completed(), 1);
    }

    #[tokio::test]
    async fn failed_disbursement_is_reversed() {
        let f = setup(InstantDisbursement::default().rejecting("999")).await;
        let err = f
            .transfer
            .execute(&f.corporate, f.owner.reference, &request(f.balance.id, "999", 300), PIN)
            .await
            .unwrap_err();

        assert!(matches!(err, LedgerError::DisbursementFailed(_)));
        assert_eq!(amount(&f.store, f.balance.id).await, 1000);
        assert_eq!(amount(&f.store, f.corporate.revenue_balance.unwrap()).await, 0);

        let transactions = f.store.find::<Transaction>(|_| true).await.unwrap();
        assert_eq!(transactions.len(), 1);
        assert_eq!(transactions[0].status, TransactionStatus::Reversed);

        let statements = f
            .store
            .find::<Statement>(|s| s.balance_id == f.balance.id)
            .await
            .unwrap();
        assert_eq!(statements.len(), 4);
        assert_eq!(statements.last().unwrap().balance, 1000);
    }

    #[tokio::test]
    async fn rejects_before_touching_balance() {
        let f = setup(InstantDisbursement::default()).await;
        let actor = f.owner.reference;

        let err = f
            .transfer
            .execute(&f.corporate, actor, &request(f.balance.id, "111", 300), "000000")
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidPin));

        let err = f
            .transfer
            .execute(&f.corporate, actor, &request(f.balance.id, "222", 300), PIN)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidBankAccount { .. }));

        let err = f
            .transfer
            .execute(&f.corporate, actor, &request(f.balance.id, "111", 0), PIN)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount));

        let err = f
            .transfer
            .execute(&f.corporate, actor, &request(f.balance.id, "111", 960), PIN)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance));

        assert_eq!(amount(&f.store, f.balance.id).await, 1000);
        assert!(f.store.find::<Transaction>(|_| true).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn directory_outage_is_not_a_payout_failure() {
        let f = setup(InstantDisbursement::default()).await;
        let err = f
            .transfer
            .check_destination(&BankAccount::new("BRI", "555", ""))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountInquiryUnavailable(_)));
        assert_eq!(err.kind(), ErrorKind::ExternalDependency);
        assert_eq!(err.to_string(), "Account inquiry unavailable: BRI is offline");

        let request = BankTransferRequest {
            destination: BankAccount::new("BRI", "555", ""),
            ..request(f.balance.id, "555", 300)
        };
        let err = f
            .transfer
            .execute(&f.corporate, f.owner.reference, &request, PIN)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::AccountInquiryUnavailable(_)));
        assert_eq!(amount(&f.store, f.balance.id).await, 1000);
        assert_eq!(f.disbursement.completed(), 0);
    }

    #[tokio::test]
    async fn view_only_access_cannot_transfer() {
        let f = setup(InstantDisbursement::default()).await;
        let mut viewer = Actor::user(f.corporate.id, "bob");
        viewer.verified = true;
        viewer
            .grant(AccessGrant {
                balance_id: f.balance.id,
                access: AccessLevel::ViewOnly,
            })
            .unwrap();
        f.store.insert(&viewer).await.unwrap();

        let err = f
            .transfer
            .execute_authorized(&f.corporate, viewer.reference, &request(f.balance.id, "111", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidBalanceAccess));
    }

    #[tokio::test]
    async fn unverified_actor_is_rejected() {
        let f = setup(InstantDisbursement::default()).await;
        let mut owner = f.owner.clone();
        owner.verified = false;
        f.store.save(&owner).await.unwrap();

        let err = f
            .transfer
            .execute_authorized(&f.corporate, owner.reference, &request(f.balance.id, "111", 100))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerError::ActorNotVerified));
    }
}
