use std::{
    collections::{HashMap, HashSet},
    sync::{
        Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
};

use async_trait::async_trait;
use tracing::info;
use uuid::Uuid;

use crate::domain::{ActorRef, Transaction};

use super::{
    AccountHolder, AccountProvisioner, BankDirectory, BulkNotification, CallbackNotifier,
    CredentialVerifier, Disbursement, GatewayError,
};

/// Hands out increasing account numbers per bank, remembering earlier answers.
#[derive(Debug, Default)]
pub struct SequentialProvisioner {
    next: AtomicU64,
    issued: Mutex<HashMap<(Uuid, String), String>>,
    unavailable: HashSet<String>,
}

impl SequentialProvisioner {
    /// Every call for `bank_code` fails as if the bank were down.
    pub fn unavailable_for(mut self, bank_code: &str) -> Self {
        self.unavailable.insert(bank_code.to_string());
        self
    }

    pub fn issued_count(&self) -> usize {
        self.issued.lock().map(|issued| issued.len()).unwrap_or(0)
    }
}

#[async_trait]
impl AccountProvisioner for SequentialProvisioner {
    async fn provision_account(
        &self,
        correlation_id: Uuid,
        _label: &str,
        bank_code: &str,
    ) -> Result<String, GatewayError> {
        if self.unavailable.contains(bank_code) {
            return Err(GatewayError::Unavailable(format!("{bank_code} is offline")));
        }
        let mut issued = self
            .issued
            .lock()
            .map_err(|_| GatewayError::Unavailable("provisioner state poisoned".to_string()))?;
        let number = issued
            .entry((correlation_id, bank_code.to_string()))
            .or_insert_with(|| {
                let sequence = self.next.fetch_add(1, Ordering::SeqCst) + 1;
                format!("8808{sequence:08}")
            });
        Ok(number.clone())
    }
}

/// Directory answering only for registered accounts.
#[derive(Debug, Default)]
pub struct StaticBankDirectory {
    accounts: HashMap<(String, String), AccountHolder>,
    offline: HashSet<String>,
}

impl StaticBankDirectory {
    /// Lookups at `bank_code` fail as if its directory were down.
    pub fn unavailable_for(mut self, bank_code: &str) -> Self {
        self.offline.insert(bank_code.to_string());
        self
    }

    pub fn with_account(mut self, bank_code: &str, account_number: &str, name: &str) -> Self {
        self.accounts.insert(
            (bank_code.to_string(), account_number.to_string()),
            AccountHolder {
                name: name.to_string(),
            },
        );
        self
    }
}

#[async_trait]
impl BankDirectory for StaticBankDirectory {
    async fn inquiry(
        &self,
        bank_code: &str,
        account_number: &str,
    ) -> Result<AccountHolder, GatewayError> {
        if self.offline.contains(bank_code) {
            return Err(GatewayError::Unavailable(format!("{bank_code} is offline")));
        }
        self.accounts
            .get(&(bank_code.to_string(), account_number.to_string()))
            .cloned()
            .ok_or_else(|| GatewayError::Rejected("Account not found".to_string()))
    }
}

#[derive(Debug, Default)]
pub struct PinDirectory {
    pins: HashMap<Uuid, String>,
}

impl PinDirectory {
    pub fn with_pin(mut self, actor: &ActorRef, pin: &str) -> Self {
        self.pins.insert(actor.id, pin.to_string());
        self
    }
}

#[async_trait]
impl CredentialVerifier for PinDirectory {
    async fn verify_pin(&self, actor: &ActorRef, pin: &str) -> Result<bool, GatewayError> {
        Ok(self.pins.get(&actor.id).is_some_and(|expected| expected == pin))
    }
}

/// Completes every payout at once, except to account numbers marked as rejecting.
#[derive(Debug, Default)]
pub struct InstantDisbursement {
    rejected_accounts: HashSet<String>,
    completed: AtomicUsize,
}

impl InstantDisbursement {
    pub fn rejecting(mut self, account_number: &str) -> Self {
        self.rejected_accounts.insert(account_number.to_string());
        self
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Disbursement for InstantDisbursement {
    async fn disburse(&self, transaction: &Transaction) -> Result<String, GatewayError> {
        if self
            .rejected_accounts
            .contains(&transaction.destination.account_number)
        {
            return Err(GatewayError::Rejected(format!(
                "Payout to {} declined",
                transaction.destination.account_number
            )));
        }
        self.completed.fetch_add(1, Ordering::SeqCst);
        Ok(format!("PAYOUT-{}", transaction.code))
    }
}

/// Logs every notification and keeps it for inspection.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<BulkNotification>>,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<BulkNotification> {
        self.sent
            .lock()
            .map(|sent| sent.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl CallbackNotifier for RecordingNotifier {
    async fn notify_bulk_result(&self, notification: &BulkNotification) {
        info!(
            bulk_id = %notification.bulk_id,
            status = ?notification.status,
            url = %notification.callback_url,
            "Bulk result notification"
        );
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
    }
}
