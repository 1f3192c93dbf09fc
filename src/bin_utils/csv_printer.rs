use std::io::Write;

use anyhow::Context;
use csv::Writer;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::domain::Balance;

use super::to_major_units;

/// One line of the balance report. The amount is in major units.
#[derive(Debug, Serialize)]
pub struct BalanceRow {
    pub balance: String,
    pub currency: String,
    pub main: bool,
    pub amount: Decimal,
    pub statements: usize,
    pub virtual_accounts: usize,
}

impl BalanceRow {
    pub fn new(label: &str, balance: &Balance, main: bool, statements: usize) -> Self {
        Self {
            balance: label.to_string(),
            currency: balance.currency.clone(),
            main,
            amount: to_major_units(balance.amount),
            statements,
            virtual_accounts: balance.provisioned_accounts.len(),
        }
    }
}

pub fn print_balances<W: Write>(output: &mut W, rows: &[BalanceRow]) -> anyhow::Result<()> {
    let mut writer = Writer::from_writer(output);
    for row in rows {
        writer
            .serialize(row)
            .with_context(|| format!("Failed to write balance `{}`", row.balance))?;
    }
    writer.flush().context("Failed to flush balance report")
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use crate::domain::{ActorKind, ActorRef, VirtualAccount};

    use super::*;

    #[test]
    fn report_lists_currency_and_main_flag() {
        let owner = ActorRef {
            id: Uuid::new_v4(),
            kind: ActorKind::Corporate,
        };
        let mut main = Balance::new(Uuid::new_v4(), owner, owner.id, "Main", "IDR");
        main.amount = 123_450;
        main.provisioned_accounts.push(VirtualAccount {
            bank_code: "BNI".to_string(),
            account_number: "880800000001".to_string(),
        });
        let savings = Balance::new(Uuid::new_v4(), owner, owner.id, "Savings", "USD");

        let mut output = Vec::new();
        print_balances(
            &mut output,
            &[
                BalanceRow::new("Main", &main, true, 3),
                BalanceRow::new("Savings", &savings, false, 0),
            ],
        )
        .unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "balance,currency,main,amount,statements,virtual_accounts\n\
             Main,IDR,true,1234.5,3,1\n\
             Savings,USD,false,0,0,0\n"
        );
    }
}
