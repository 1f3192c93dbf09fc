use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::LedgerError,
    store::{Collection, Document},
};

use super::{ActorRef, Balance, BalanceId};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BankAccount {
    pub bank_code: String,
    pub account_number: String,
    pub account_name: String,
}

impl BankAccount {
    pub fn new(
        bank_code: impl Into<String>,
        account_number: impl Into<String>,
        account_name: impl Into<String>,
    ) -> Self {
        Self {
            bank_code: bank_code.into(),
            account_number: account_number.into(),
            account_name: account_name.into(),
        }
    }

    /// Format check only; reachability is decided by the bank directory.
    pub fn validate_format(&self) -> Result<(), LedgerError> {
        if self.bank_code.trim().is_empty() || self.account_number.is_empty() {
            return Err(LedgerError::InvalidBankAccount {
                reason: "Invalid bank code or account number empty".to_string(),
            });
        }
        if !self.account_number.chars().all(|c| c.is_ascii_digit()) {
            return Err(LedgerError::InvalidBankAccount {
                reason: "Account number must contain digits only".to_string(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionKind {
    BankTransfer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    Success,
    /// Statements were posted and then fully reversed.
    Reversed,
}

/// Item of a bulk transfer job that a transaction was executed for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BulkItemRef {
    pub bulk_id: Uuid,
    pub number: u32,
}

/// Business record of an event that produced one or more statements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub code: String,
    pub kind: TransactionKind,
    pub balance_id: BalanceId,
    pub actor: ActorRef,
    pub amount: u64,
    pub destination: BankAccount,
    pub external_id: String,
    pub status: TransactionStatus,
    #[serde(default)]
    pub bulk_item: Option<BulkItemRef>,
    pub created_at: DateTime<Utc>,
}

impl Transaction {
    pub fn bank_transfer(
        balance: &Balance,
        actor: ActorRef,
        destination: BankAccount,
        amount: u64,
        external_id: impl Into<String>,
    ) -> Self {
        let id = Uuid::new_v4();
        let code = format!("TRX-{}", &id.simple().to_string()[..12].to_uppercase());
        Self {
            id,
            code,
            kind: TransactionKind::BankTransfer,
            balance_id: balance.id,
            actor,
            amount,
            destination,
            external_id: external_id.into(),
            status: TransactionStatus::Success,
            bulk_item: None,
            created_at: Utc::now(),
        }
    }
}

impl Document for Transaction {
    const COLLECTION: Collection = Collection::Transactions;

    fn id(&self) -> Uuid {
        self.id
    }
}
