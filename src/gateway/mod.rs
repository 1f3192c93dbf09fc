//! Boundaries to systems outside the ledger: account provisioning, bank directory,
//! disbursement, credential checks and callback delivery.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    domain::{ActorId, ActorRef, BulkStatus, Transaction},
    error::LedgerError,
};

pub mod in_memory;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),
    #[error("Rejected by gateway: {0}")]
    Rejected(String),
}

/// Reserves a virtual account number at a bank. Calls may be repeated with the same
/// correlation id and must then return the same number.
#[async_trait]
pub trait AccountProvisioner: Send + Sync {
    async fn provision_account(
        &self,
        correlation_id: Uuid,
        label: &str,
        bank_code: &str,
    ) -> Result<String, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccountHolder {
    pub name: String,
}

#[async_trait]
pub trait BankDirectory: Send + Sync {
    async fn inquiry(&self, bank_code: &str, account_number: &str)
    -> Result<AccountHolder, GatewayError>;
}

/// Sends money out of the ledger. Returns the gateway's reference for the payout.
#[async_trait]
pub trait Disbursement: Send + Sync {
    async fn disburse(&self, transaction: &Transaction) -> Result<String, GatewayError>;
}

#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify_pin(&self, actor: &ActorRef, pin: &str) -> Result<bool, GatewayError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkNotification {
    pub corporate_id: ActorId,
    pub actor: ActorRef,
    pub bulk_id: Uuid,
    pub status: BulkStatus,
    pub callback_url: String,
}

/// At-most-once delivery; the ledger never waits for or retries a notification.
#[async_trait]
pub trait CallbackNotifier: Send + Sync {
    async fn notify_bulk_result(&self, notification: &BulkNotification);
}

pub async fn validate_pin(
    verifier: &dyn CredentialVerifier,
    actor: &ActorRef,
    pin: &str,
) -> Result<(), LedgerError> {
    match verifier.verify_pin(actor, pin).await {
        Ok(true) => Ok(()),
        Ok(false) => Err(LedgerError::InvalidPin),
        Err(err) => Err(LedgerError::CredentialUnavailable(err.to_string())),
    }
}
