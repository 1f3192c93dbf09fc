//! Statement application. These functions run inside a session supplied by the caller
//! and never open or commit a transaction themselves.

use tracing::debug;

use crate::{
    domain::{Balance, BalanceId, Statement, statement::Movement},
    error::LedgerError,
    store::Session,
};

async fn load_balance(session: &Session, balance_id: BalanceId) -> Result<Balance, LedgerError> {
    session
        .get::<Balance>(balance_id)
        .await?
        .ok_or(LedgerError::BalanceNotFound(balance_id))
}

/// Returns the persisted statement, stamped with the resulting balance.
pub async fn apply_withdraw(
    session: &Session,
    statement: &Statement,
) -> Result<Statement, LedgerError> {
    let mut balance = load_balance(session, statement.balance_id).await?;
    let remaining = balance.withdraw(statement.withdraw)?;
    session.save(&balance).await?;

    let statement = Statement {
        balance: remaining,
        ..statement.clone()
    };
    session.insert(&statement).await?;
    debug!(balance_id = %balance.id, withdraw = statement.withdraw, remaining, "Withdrawn");
    Ok(statement)
}

pub async fn apply_deposit(
    session: &Session,
    statement: &Statement,
) -> Result<Statement, LedgerError> {
    let mut balance = load_balance(session, statement.balance_id).await?;
    let total = balance.deposit(statement.deposit)?;
    session.save(&balance).await?;

    let statement = Statement {
        balance: total,
        ..statement.clone()
    };
    session.insert(&statement).await?;
    debug!(balance_id = %balance.id, deposit = statement.deposit, total, "Deposited");
    Ok(statement)
}

/// Applies statements in order. The first failure stops the batch; the caller's
/// transaction is then aborted as a whole.
pub async fn apply_statements(
    session: &Session,
    statements: &[Statement],
) -> Result<Vec<Statement>, LedgerError> {
    let mut applied = Vec::with_capacity(statements.len());
    for statement in statements {
        match statement.movement()? {
            Movement::Deposit(_) => applied.push(apply_deposit(session, statement).await?),
            Movement::Withdraw(_) => applied.push(apply_withdraw(session, statement).await?),
            Movement::Empty => {}
        }
    }
    Ok(applied)
}
