use std::fs::File;

use anyhow::{Context, Result};
use balance_ledger::{
    bin_utils::{OperationError, Service},
    config::LedgerConfig,
    error::ErrorKind,
};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let filename = std::env::args()
        .nth(1)
        .context("Expected a file name as the first argument")?;
    let file = File::open(&filename).with_context(|| format!("Failed to open `{filename}`"))?;
    let config = match std::env::args().nth(2) {
        Some(path) => LedgerConfig::load(path)?,
        None => LedgerConfig::default(),
    };

    let service = Service {
        input: file,
        output: &mut std::io::stdout(),
        config,
        error_printer: Box::new(|line, err| match err {
            OperationError::Ledger(err) if err.kind() == ErrorKind::InsufficientFunds => {
                // these are not technical errors, so we don't need to print them
            }
            err => eprintln!("Error at line {line}: {err}"),
        }),
    };
    service.run().await
}
