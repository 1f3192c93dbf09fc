/// Error types shared by every use case, with a coarse [`error::ErrorKind`] for callers.
pub mod error;

/// Retry, provisioning and bulk settings, loaded from TOML.
pub mod config;

/// Document store interface with session-scoped transactions, plus "in memory"
/// implementation.
///
/// NOTE: every balance mutation goes through a session, so replacing the in-memory
/// store only requires another [`store::DocumentStore`] implementation.
pub mod store;

/// Persisted records: balances, statements, actors, access requests and bulk jobs.
pub mod domain;

/// Fee statements for a transaction and their exact reversal.
pub mod fee;

/// Runs a unit of work atomically, replaying it on transient conflicts.
pub mod commit;

/// Applies statements to balances inside a caller-supplied session.
pub mod ledger;

/// Balance creation, deposits, withdrawals and statement history.
pub mod balance;

/// Posting transactions together with their statements.
pub mod transaction;

/// Single transfer from a balance to an external bank account.
pub mod transfer;

/// Sharing balances between actors and the access request workflow.
pub mod access;

/// Bulk inquiry and bulk transfer jobs, executed in the background.
pub mod bulk;

/// External systems: provisioning, bank directory, disbursement, PIN checks and callbacks.
pub mod gateway;

/// CSV replay service behind the binary. Lives in the library so integration tests can
/// drive it too.
pub mod bin_utils;
