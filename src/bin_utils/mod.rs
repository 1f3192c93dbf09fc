//! Bootstraps the ledger for the command line binary: replays a CSV of deposits and
//! withdrawals against an in-memory store and prints the resulting balances.

use std::{
    collections::BTreeMap,
    io::{Read, Write},
    sync::Arc,
};

use anyhow::Result;
use rust_decimal::{Decimal, prelude::ToPrimitive};
use thiserror::Error;
use tracing::info;

use crate::{
    balance::BalanceService,
    commit::CommitProtocol,
    config::LedgerConfig,
    domain::{Actor, BalanceId, Corporate},
    error::LedgerError,
    gateway::in_memory::SequentialProvisioner,
    store::{Store, in_memory::InMemoryStore},
};
use csv_parser::{CsvOperationParser, Operation, OperationKind};
use csv_printer::{BalanceRow, print_balances};
pub mod csv_parser;
pub mod csv_printer;

const MINOR_UNITS: u32 = 2;

#[derive(Debug, Error)]
pub enum OperationError {
    #[error("Malformed row: {0}")]
    Malformed(#[from] csv::Error),
    #[error("Amount {0} is negative or has more than two decimal places")]
    InvalidAmount(Decimal),
    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

fn to_minor_units(amount: Decimal) -> Result<u64, OperationError> {
    let scaled = amount
        .checked_mul(Decimal::from(10u64.pow(MINOR_UNITS)))
        .ok_or(OperationError::InvalidAmount(amount))?;
    if !scaled.fract().is_zero() {
        return Err(OperationError::InvalidAmount(amount));
    }
    scaled.to_u64().ok_or(OperationError::InvalidAmount(amount))
}

fn to_major_units(amount: u64) -> Decimal {
    Decimal::from_i128_with_scale(i128::from(amount), MINOR_UNITS).normalize()
}

struct Ledger {
    balances: BalanceService,
    corporate: Corporate,
    owner: Actor,
    labels: BTreeMap<String, (BalanceId, usize)>,
}

impl Ledger {
    async fn apply(&mut self, line: u64, operation: Operation) -> Result<(), OperationError> {
        let amount = to_minor_units(operation.amount)?;
        let balance_id = match self.labels.get(&operation.balance) {
            Some((balance_id, _)) => *balance_id,
            None => {
                let balance = if self.labels.is_empty() {
                    self.balances
                        .initialize_main_balance(&self.corporate, self.owner.reference, &operation.balance)
                        .await?
                } else {
                    self.balances
                        .create_balance(&self.corporate, self.owner.reference, &operation.balance)
                        .await?
                };
                self.labels.insert(operation.balance.clone(), (balance.id, 0));
                balance.id
            }
        };

        let reference = format!("CSV-{line}");
        match operation.kind {
            OperationKind::Deposit => self.balances.deposit(balance_id, amount, &reference).await?,
            OperationKind::Withdraw => self.balances.withdraw(balance_id, amount, &reference).await?,
        };
        if let Some((_, statements)) = self.labels.get_mut(&operation.balance) {
            *statements += 1;
        }
        Ok(())
    }
}

pub struct Service<'w, R, W: 'w> {
    pub input: R,
    pub output: &'w mut W,
    pub config: LedgerConfig,
    pub error_printer: Box<dyn FnMut(u64, OperationError)>,
}

impl<'w, R, W> Service<'w, R, W>
where
    R: Read,
    W: Write + 'w,
{
    pub async fn run(mut self) -> Result<()> {
        let parser = CsvOperationParser::new(self.input);

        let store = Store::new(Arc::new(InMemoryStore::default()));
        let corporate = Corporate::new("Local", "IDR");
        let owner = Actor::for_corporate(&corporate);
        store.insert(&owner).await?;

        let mut ledger = Ledger {
            balances: BalanceService::new(
                CommitProtocol::new(store.clone(), self.config.retry.clone()),
                Arc::new(SequentialProvisioner::default()),
                self.config.provisioning.clone(),
            ),
            corporate,
            owner,
            labels: BTreeMap::new(),
        };

        let mut processed = 0usize;
        for (line, row) in parser {
            let outcome = match row {
                Ok(operation) => ledger.apply(line, operation).await,
                Err(err) => Err(err.into()),
            };
            match outcome {
                Ok(()) => processed += 1,
                Err(err) => (self.error_printer)(line, err),
            }
        }
        info!(processed, balances = ledger.labels.len(), "Operations replayed");

        let main_balance = store
            .get::<Actor>(ledger.owner.reference.id)
            .await?
            .and_then(|owner| owner.main_balance);
        let mut rows = Vec::with_capacity(ledger.labels.len());
        for (label, (balance_id, statements)) in &ledger.labels {
            let balance = ledger.balances.get_balance(*balance_id).await?;
            let main = main_balance == Some(balance.id);
            rows.push(BalanceRow::new(label, &balance, main, *statements));
        }
        print_balances(self.output, &rows)
    }
}
