use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::{Collection, Document};

use super::{ActorId, ActorRef, BalanceId, BankAccount, Transaction, TransactionStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BulkStatus {
    Unexecuted,
    InProgress,
    Completed,
    /// Execution stopped before every item was processed.
    Failed,
}

impl BulkStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, BulkStatus::Completed | BulkStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InquiryItem {
    pub number: u32,
    pub account: BankAccount,
    pub valid: bool,
    pub reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub destination: BankAccount,
    pub amount: u64,
    pub external_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferItem {
    pub number: u32,
    pub destination: BankAccount,
    pub amount: u64,
    pub external_id: String,
    pub transaction_code: Option<String>,
    pub reason: Option<String>,
}

impl TransferItem {
    pub fn is_processed(&self) -> bool {
        self.transaction_code.is_some() || self.reason.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkInquiry {
    pub id: Uuid,
    pub corporate_id: ActorId,
    pub reference: String,
    pub owner: ActorRef,
    pub total: usize,
    pub items: Vec<InquiryItem>,
    pub status: BulkStatus,
    pub failed_numbers: Vec<u32>,
    pub created_at: DateTime<Utc>,
}

impl BulkInquiry {
    pub fn new(
        corporate_id: ActorId,
        reference: impl Into<String>,
        owner: ActorRef,
        accounts: Vec<BankAccount>,
    ) -> Self {
        let items: Vec<InquiryItem> = (1..)
            .zip(accounts)
            .map(|(number, account)| InquiryItem {
                number,
                account,
                valid: false,
                reason: None,
            })
            .collect();
        Self {
            id: Uuid::new_v4(),
            corporate_id,
            reference: reference.into(),
            owner,
            total: items.len(),
            items,
            status: BulkStatus::Unexecuted,
            failed_numbers: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Stores checked items (in input order) and closes the job.
    pub fn complete(&mut self, items: Vec<InquiryItem>) {
        self.failed_numbers = items
            .iter()
            .filter(|item| !item.valid)
            .map(|item| item.number)
            .collect();
        self.items = items;
        self.status = BulkStatus::Completed;
    }

    pub fn fail(&mut self, reason: &str) {
        for item in self.items.iter_mut().filter(|item| item.reason.is_none() && !item.valid) {
            item.reason = Some(reason.to_string());
            if !self.failed_numbers.contains(&item.number) {
                self.failed_numbers.push(item.number);
            }
        }
        self.status = BulkStatus::Failed;
    }
}

impl Document for BulkInquiry {
    const COLLECTION: Collection = Collection::BulkInquiries;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkTransfer {
    pub id: Uuid,
    pub corporate_id: ActorId,
    pub reference: String,
    pub owner: ActorRef,
    pub balance_id: BalanceId,
    pub total: usize,
    pub items: Vec<TransferItem>,
    pub status: BulkStatus,
    pub failed_numbers: Vec<u32>,
    pub created_at: DateTime<Utc>,
}

impl BulkTransfer {
    pub fn new(
        corporate_id: ActorId,
        reference: impl Into<String>,
        owner: ActorRef,
        balance_id: BalanceId,
        transfers: Vec<TransferRequest>,
    ) -> Self {
        let items: Vec<TransferItem> = (1..)
            .zip(transfers)
            .map(|(number, transfer)| TransferItem {
                number,
                destination: transfer.destination,
                amount: transfer.amount,
                external_id: transfer.external_id,
                transaction_code: None,
                reason: None,
            })
            .collect();
        Self {
            id: Uuid::new_v4(),
            corporate_id,
            reference: reference.into(),
            owner,
            balance_id,
            total: items.len(),
            items,
            status: BulkStatus::Unexecuted,
            failed_numbers: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn record_success(&mut self, index: usize, transaction_code: String) {
        self.items[index].transaction_code = Some(transaction_code);
    }

    pub fn record_failure(&mut self, index: usize, reason: String) {
        let item = &mut self.items[index];
        item.reason = Some(reason);
        self.failed_numbers.push(item.number);
    }

    /// Records items whose transfer was committed but whose result never reached the
    /// stored job. Transactions of other jobs, and reversed ones, are ignored.
    pub fn reconcile(&mut self, transactions: &[Transaction]) {
        for transaction in transactions {
            let Some(origin) = transaction.bulk_item.filter(|origin| origin.bulk_id == self.id) else {
                continue;
            };
            if transaction.status != TransactionStatus::Success {
                continue;
            }
            if let Some(index) = self
                .items
                .iter()
                .position(|item| item.number == origin.number && !item.is_processed())
            {
                self.record_success(index, transaction.code.clone());
            }
        }
    }

    /// Marks every item not yet processed as failed and closes the job as FAILED.
    pub fn fail(&mut self, reason: &str) {
        for index in 0..self.items.len() {
            if !self.items[index].is_processed() {
                self.record_failure(index, reason.to_string());
            }
        }
        self.status = BulkStatus::Failed;
    }
}

impl Document for BulkTransfer {
    const COLLECTION: Collection = Collection::BulkTransfers;

    fn id(&self) -> Uuid {
        self.id
    }
}

#[cfg(test)]
mod tests {
    use crate::domain::{ActorKind, Balance, BulkItemRef};

    use super::*;

    fn owner() -> ActorRef {
        ActorRef {
            id: Uuid::new_v4(),
            kind: ActorKind::Corporate,
        }
    }

    fn transfer(amount: u64) -> TransferRequest {
        TransferRequest {
            destination: BankAccount::new("BNI", "123", "Bob"),
            amount,
            external_id: format!("ext-{amount}"),
        }
    }

    #[test]
    fn items_are_numbered_in_order() {
        let owner = owner();
        let bulk = BulkTransfer::new(
            owner.id,
            "payroll",
            owner,
            Uuid::new_v4(),
            vec![transfer(10), transfer(20), transfer(30)],
        );
        assert_eq!(bulk.total, 3);
        assert_eq!(bulk.status, BulkStatus::Unexecuted);
        let numbers: Vec<u32> = bulk.items.iter().map(|i| i.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn failing_keeps_processed_items() {
        let owner = owner();
        let mut bulk = BulkTransfer::new(
            owner.id,
            "payroll",
            owner,
            Uuid::new_v4(),
            vec![transfer(10), transfer(20), transfer(30)],
        );
        bulk.record_success(0, "TRX-1".to_string());
        bulk.record_failure(1, "Insufficient balance".to_string());
        bulk.fail("interrupted");

        assert_eq!(bulk.status, BulkStatus::Failed);
        assert_eq!(bulk.items[0].transaction_code.as_deref(), Some("TRX-1"));
        assert!(bulk.items[0].reason.is_none());
        assert_eq!(bulk.items[2].reason.as_deref(), Some("interrupted"));
        assert_eq!(bulk.failed_numbers, vec![2, 3]);
    }

    #[test]
    fn inquiry_completion_collects_failures() {
        let owner = owner();
        let mut bulk = BulkInquiry::new(
            owner.id,
            "check",
            owner,
            vec![
                BankAccount::new("BNI", "1", "A"),
                BankAccount::new("BNI", "2", "B"),
            ],
        );
        let mut items = bulk.items.clone();
        items[0].valid = true;
        items[1].reason = Some("unknown account".to_string());
        bulk.complete(items);

        assert_eq!(bulk.status, BulkStatus::Completed);
        assert_eq!(bulk.failed_numbers, vec![2]);
        assert!(BulkStatus::Completed.is_terminal());
        assert!(!BulkStatus::InProgress.is_terminal());
    }

    #[test]
    fn reconcile_recovers_committed_items() {
        let owner = owner();
        let mut bulk = BulkTransfer::new(
            owner.id,
            "payroll",
            owner,
            Uuid::new_v4(),
            vec![transfer(10), transfer(20), transfer(30)],
        );
        let balance = Balance::new(bulk.balance_id, owner, owner.id, "Payroll", "IDR");
        let executed = |number: u32, bulk_id: Uuid, status: TransactionStatus| Transaction {
            bulk_item: Some(BulkItemRef { bulk_id, number }),
            status,
            ..Transaction::bank_transfer(&balance, owner, transfer(10).destination, 10, "ext")
        };
        let committed = executed(1, bulk.id, TransactionStatus::Success);
        let transactions = vec![
            committed.clone(),
            executed(2, bulk.id, TransactionStatus::Reversed),
            executed(3, Uuid::new_v4(), TransactionStatus::Success),
        ];

        bulk.reconcile(&transactions);
        bulk.fail("interrupted");

        assert_eq!(bulk.items[0].transaction_code, Some(committed.code));
        assert_eq!(bulk.items[1].reason.as_deref(), Some("interrupted"));
        assert_eq!(bulk.items[2].reason.as_deref(), Some("interrupted"));
        assert_eq!(bulk.failed_numbers, vec![2, 3]);
    }
}
