use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::LedgerError,
    store::{Collection, Document},
};

use super::{ActorId, ActorRef};

pub type BalanceId = Uuid;

/// Account number reserved at a bank so the balance can be topped up by transfer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VirtualAccount {
    pub bank_code: String,
    pub account_number: String,
}

/// Amount is kept in minor units and never goes below zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Balance {
    pub id: BalanceId,
    pub owner: ActorRef,
    pub corporate_id: ActorId,
    pub name: String,
    pub currency: String,
    pub amount: u64,
    pub provisioned_accounts: Vec<VirtualAccount>,
    pub created_at: DateTime<Utc>,
}

impl Balance {
    pub fn new(
        id: BalanceId,
        owner: ActorRef,
        corporate_id: ActorId,
        name: impl Into<String>,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            id,
            owner,
            corporate_id,
            name: name.into(),
            currency: currency.into(),
            amount: 0,
            provisioned_accounts: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Returns the amount left after the withdrawal.
    pub fn withdraw(&mut self, amount: u64) -> Result<u64, LedgerError> {
        if self.amount < amount {
            return Err(LedgerError::InsufficientBalance);
        }
        self.amount -= amount;
        Ok(self.amount)
    }

    /// Returns the amount after the deposit.
    pub fn deposit(&mut self, amount: u64) -> Result<u64, LedgerError> {
        self.amount = self
            .amount
            .checked_add(amount)
            .ok_or(LedgerError::AmountOverflow)?;
        Ok(self.amount)
    }
}

impl Document for Balance {
    const COLLECTION: Collection = Collection::Balances;

    fn id(&self) -> Uuid {
        self.id
    }
}

/// Names are limited to ASCII letters, digits and spaces.
pub fn validate_balance_name(name: &str) -> Result<(), LedgerError> {
    let valid = !name.trim().is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == ' ');
    if valid {
        Ok(())
    } else {
        Err(LedgerError::InvalidNameFormat)
    }
}
