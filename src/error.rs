use thiserror::Error;
use uuid::Uuid;

use crate::store::StoreError;

/// Coarse classification used by callers to decide how to surface an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    NotFound,
    InsufficientFunds,
    ExternalDependency,
    Internal,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("Balance name may only contain letters, digits and spaces")]
    InvalidNameFormat,
    #[error("Amount must be greater than zero")]
    InvalidAmount,
    #[error("Statement must carry exactly one of deposit or withdraw")]
    InvalidStatement,
    #[error("Invalid pagination: page starts at 1 and limit must be between 1 and {max_limit}")]
    InvalidPagination { max_limit: u32 },
    #[error("Bulk list empty")]
    BulkListEmpty,
    #[error("Bulk {0} is not in an executable state")]
    BulkAlreadyExecuted(Uuid),
    #[error("Invalid request access type")]
    InvalidAccessLevel,
    #[error("Invalid balance scope")]
    InvalidBalanceScope,
    #[error("Access balance already have")]
    AccessBalanceAlreadyHave,
    #[error("Actor has no access to balance {0}")]
    AccessBalanceNotFound(Uuid),
    #[error("Owner access cannot be revoked")]
    OwnerAccessNotRevocable,
    #[error("Request already processed")]
    RequestAlreadyResolved,
    #[error("Request can only be resolved as approved or rejected")]
    InvalidRequestDecision,
    #[error("Invalid balance owner")]
    InvalidBalanceOwner,
    #[error("Invalid balance access")]
    InvalidBalanceAccess,
    #[error("Invalid PIN")]
    InvalidPin,
    #[error("Account is not verified")]
    ActorNotVerified,
    #[error("Invalid bank account: {reason}")]
    InvalidBankAccount { reason: String },
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Balance amount overflow")]
    AmountOverflow,

    #[error("Balance {0} not found")]
    BalanceNotFound(Uuid),
    #[error("Actor {0} not found")]
    ActorNotFound(Uuid),
    #[error("Access request {0} not found")]
    AccessRequestNotFound(Uuid),
    #[error("Bulk {0} not found")]
    BulkNotFound(Uuid),

    #[error("Disbursement failed: {0}")]
    DisbursementFailed(String),
    #[error("Credential service unavailable: {0}")]
    CredentialUnavailable(String),
    #[error("Account inquiry unavailable: {0}")]
    AccountInquiryUnavailable(String),

    #[error("Transaction could not be started: {0}")]
    TransactionStart(#[source] StoreError),
    #[error("Transaction failed after {attempts} attempts: {source}")]
    TransactionFailed {
        attempts: u32,
        #[source]
        source: StoreError,
    },
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::BalanceNotFound(_)
            | LedgerError::ActorNotFound(_)
            | LedgerError::AccessRequestNotFound(_)
            | LedgerError::BulkNotFound(_) => ErrorKind::NotFound,
            LedgerError::InsufficientBalance => ErrorKind::InsufficientFunds,
            LedgerError::DisbursementFailed(_)
            | LedgerError::CredentialUnavailable(_)
            | LedgerError::AccountInquiryUnavailable(_) => ErrorKind::ExternalDependency,
            LedgerError::TransactionStart(_)
            | LedgerError::TransactionFailed { .. }
            | LedgerError::Store(_) => ErrorKind::Internal,
            _ => ErrorKind::Validation,
        }
    }

    /// Domain errors are part of the business outcome; everything else is infrastructure.
    pub fn is_domain(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }

    /// Whether the whole unit of work may be replayed.
    pub fn is_transient(&self) -> bool {
        matches!(self, LedgerError::Store(err) if err.is_transient())
    }
}
