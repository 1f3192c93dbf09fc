use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::LedgerError,
    store::{Collection, Document},
};

use super::BalanceId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Movement {
    Deposit(u64),
    Withdraw(u64),
    /// Nothing to apply.
    Empty,
}

/// One immutable ledger entry. A correction is posted as a new inverse statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub id: Uuid,
    pub balance_id: BalanceId,
    pub deposit: u64,
    pub withdraw: u64,
    /// Balance amount right after this statement was applied.
    pub balance: u64,
    /// Correlation with the transaction that produced the statement.
    pub reference: String,
    pub created_at: DateTime<Utc>,
}

impl Statement {
    fn new(balance_id: BalanceId, deposit: u64, withdraw: u64, reference: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            balance_id,
            deposit,
            withdraw,
            balance: 0,
            reference: reference.to_string(),
            created_at: Utc::now(),
        }
    }

    pub fn deposit(balance_id: BalanceId, amount: u64, reference: &str) -> Self {
        Self::new(balance_id, amount, 0, reference)
    }

    pub fn withdraw(balance_id: BalanceId, amount: u64, reference: &str) -> Self {
        Self::new(balance_id, 0, amount, reference)
    }

    /// Same balance and reference, deposit and withdraw swapped.
    pub fn inverse(&self) -> Self {
        Self::new(self.balance_id, self.withdraw, self.deposit, &self.reference)
    }

    pub fn movement(&self) -> Result<Movement, LedgerError> {
        match (self.deposit, self.withdraw) {
            (0, 0) => Ok(Movement::Empty),
            (deposit, 0) => Ok(Movement::Deposit(deposit)),
            (0, withdraw) => Ok(Movement::Withdraw(withdraw)),
            _ => Err(LedgerError::InvalidStatement),
        }
    }
}

impl Document for Statement {
    const COLLECTION: Collection = Collection::Statements;

    fn id(&self) -> Uuid {
        self.id
    }
}
