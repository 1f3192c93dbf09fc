use tracing::info;

use crate::{
    commit::CommitProtocol,
    domain::{Balance, Corporate, Statement, Transaction, TransactionStatus},
    error::LedgerError,
    fee::FeeCalculator,
    ledger,
};

/// Shared plumbing for use cases that post a [`Transaction`] together with its statements.
#[derive(Clone)]
pub struct TransactionBase {
    commit: CommitProtocol,
}

impl TransactionBase {
    pub fn new(commit: CommitProtocol) -> Self {
        Self { commit }
    }

    pub fn commit_protocol(&self) -> &CommitProtocol {
        &self.commit
    }

    pub fn create_fee_statements(
        corporate: &Corporate,
        balance: &Balance,
        transaction: &Transaction,
    ) -> Result<Vec<Statement>, LedgerError> {
        FeeCalculator::initialize(corporate, balance, transaction).calculate_by_owner_and_transaction()
    }

    pub fn rollback_fee_statements(statements: &[Statement]) -> Vec<Statement> {
        FeeCalculator::rollback_fee_statements(statements)
    }

    /// Applies the statements and records the transaction in one atomic unit.
    pub async fn commit(
        &self,
        statements: &[Statement],
        transaction: &Transaction,
    ) -> Result<Vec<Statement>, LedgerError> {
        let applied = self
            .commit
            .run_atomic(|session| async move {
                let applied = ledger::apply_statements(&session, statements).await?;
                session.insert(transaction).await?;
                Ok(applied)
            })
            .await?;
        info!(code = %transaction.code, statements = applied.len(), "Transaction committed");
        Ok(applied)
    }

    /// Applies reversing statements. When `reversed` is given it is saved as REVERSED in
    /// the same unit.
    pub async fn commit_rollback(
        &self,
        statements: &[Statement],
        reversed: Option<&Transaction>,
    ) -> Result<Vec<Statement>, LedgerError> {
        let reversed = reversed.map(|transaction| Transaction {
            status: TransactionStatus::Reversed,
            ..transaction.clone()
        });
        let reversed = reversed.as_ref();
        let applied = self
            .commit
            .run_atomic(|session| async move {
                let applied = ledger::apply_statements(&session, statements).await?;
                if let Some(transaction) = reversed {
                    session.save(transaction).await?;
                }
                Ok(applied)
            })
            .await?;
        if let Some(transaction) = reversed {
            info!(code = %transaction.code, "Transaction reversed");
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::{
        config::RetryConfig,
        domain::{ActorKind, ActorRef, BankAccount, TransactionKind},
        fee::FeeRule,
        store::{Store, in_memory::InMemoryStore},
    };

    use super::*;

    async fn setup() -> (TransactionBase, Corporate, Balance) {
        let store = Store::new(Arc::new(InMemoryStore::default()));
        let mut corporate = Corporate::new("Acme", "IDR");
        let owner = ActorRef {
            id: Uuid::new_v4(),
            kind: ActorKind::User,
        };
        let revenue = Balance::new(Uuid::new_v4(), corporate.actor_ref(), corporate.id, "Revenue", "IDR");
        let balance = Balance {
            amount: 10_000,
            ..Balance::new(Uuid::new_v4(), owner, corporate.id, "Main", "IDR")
        };
        corporate.revenue_balance = Some(revenue.id);
        corporate.fee_schedule = vec![FeeRule {
            transaction_kind: TransactionKind::BankTransfer,
            owner_kind: ActorKind::User,
            flat: 100,
            rate: dec!(0.01),
        }];
        store.insert(&revenue).await.unwrap();
        store.insert(&balance).await.unwrap();
        (
            TransactionBase::new(CommitProtocol::new(store, RetryConfig::default())),
            corporate,
            balance,
        )
    }

    async fn amount(base: &TransactionBase, balance: &Balance) -> u64 {
        base.commit_protocol()
            .store()
            .get::<Balance>(balance.id)
            .await
            .unwrap()
            .unwrap()
            .amount
    }

    #[tokio::test]
    async fn commit_and_rollback_net_to_zero() {
        let (base, corporate, balance) = setup().await;
        let transaction = Transaction::bank_transfer(
            &balance,
            balance.owner,
            BankAccount::new("BNI", "123", "Bob"),
            5000,
            "ext-1",
        );
        let mut statements = vec![Statement::withdraw(balance.id, 5000, &transaction.code)];
        let fees = TransactionBase::create_fee_statements(&corporate, &balance, &transaction).unwrap();
        assert_eq!(fees.len(), 2);
        statements.extend(fees);

        base.commit(&statements, &transaction).await.unwrap();
        assert_eq!(amount(&base, &balance).await, 10_000 - 5000 - 150);

        let mut reverse = vec![statements[0].inverse()];
        reverse.extend(TransactionBase::rollback_fee_statements(&statements[1..]));
        base.commit_rollback(&reverse, Some(&transaction)).await.unwrap();

        assert_eq!(amount(&base, &balance).await, 10_000);
        let revenue = corporate.revenue_balance.unwrap();
        let revenue_amount = base
            .commit_protocol()
            .store()
            .get::<Balance>(revenue)
            .await
            .unwrap()
            .unwrap()
            .amount;
        assert_eq!(revenue_amount, 0);

        let stored: Transaction = base
            .commit_protocol()
            .store()
            .get(transaction.id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransactionStatus::Reversed);
    }

    #[tokio::test]
    async fn failed_commit_records_nothing() {
        let (base, _, balance) = setup().await;
        let transaction = Transaction::bank_transfer(
            &balance,
            balance.owner,
            BankAccount::new("BNI", "123", "Bob"),
            20_000,
            "ext-1",
        );
        let statements = vec![Statement::withdraw(balance.id, 20_000, &transaction.code)];

        let err = base.commit(&statements, &transaction).await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance));
        assert_eq!(amount(&base, &balance).await, 10_000);
        assert!(
            base.commit_protocol()
                .store()
                .get::<Transaction>(transaction.id)
                .await
                .unwrap()
                .is_none()
        );
    }
}
