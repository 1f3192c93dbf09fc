//! Records persisted by the ledger. Each one is a [`Document`](crate::store::Document)
//! so it can be loaded and saved through a [`Store`](crate::store::Store) or an open
//! [`Session`](crate::store::Session).

pub mod access_request;
pub mod actor;
pub mod balance;
pub mod bulk;
pub mod statement;
pub mod transaction;

pub use access_request::{AccessRequest, RequestStatus};
pub use actor::{AccessGrant, AccessLevel, Actor, ActorId, ActorKind, ActorRef, Corporate};
pub use balance::{Balance, BalanceId, VirtualAccount};
pub use bulk::{BulkInquiry, BulkStatus, BulkTransfer, InquiryItem, TransferItem, TransferRequest};
pub use statement::Statement;
pub use transaction::{BankAccount, BulkItemRef, Transaction, TransactionKind, TransactionStatus};
