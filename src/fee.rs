use rust_decimal::{Decimal, RoundingStrategy, prelude::ToPrimitive};
use serde::{Deserialize, Serialize};

use crate::{
    domain::{ActorKind, Balance, BalanceId, Corporate, Statement, Transaction, TransactionKind},
    error::LedgerError,
};

/// Fee charged on a transaction kind when the paying balance belongs to `owner_kind`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeeRule {
    pub transaction_kind: TransactionKind,
    pub owner_kind: ActorKind,
    /// Fixed part, in minor units.
    pub flat: u64,
    /// Proportional part, e.g. `0.005` for half a percent.
    pub rate: Decimal,
}

impl FeeRule {
    pub fn amount_for(&self, transaction_amount: u64) -> Result<u64, LedgerError> {
        let proportional = Decimal::from(transaction_amount)
            .checked_mul(self.rate)
            .ok_or(LedgerError::AmountOverflow)?
            .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
            .to_u64()
            .ok_or(LedgerError::AmountOverflow)?;
        self.flat
            .checked_add(proportional)
            .ok_or(LedgerError::AmountOverflow)
    }
}

/// Computes fee statements for one transaction. Holds no I/O, so computing twice
/// yields the same movements.
#[derive(Debug, Clone)]
pub struct FeeCalculator {
    rules: Vec<FeeRule>,
    payer: BalanceId,
    owner_kind: ActorKind,
    revenue_balance: Option<BalanceId>,
    transaction_kind: TransactionKind,
    amount: u64,
    reference: String,
}

impl FeeCalculator {
    pub fn initialize(corporate: &Corporate, balance: &Balance, transaction: &Transaction) -> Self {
        Self {
            rules: corporate.fee_schedule.clone(),
            payer: balance.id,
            owner_kind: balance.owner.kind,
            revenue_balance: corporate.revenue_balance,
            transaction_kind: transaction.kind,
            amount: transaction.amount,
            reference: transaction.code.clone(),
        }
    }

    /// Every matching rule withdraws its fee from the paying balance and deposits the same
    /// fee into the corporate's revenue balance. Without a revenue balance distinct from
    /// the payer no fee is charged, so fees always net to zero across balances.
    pub fn calculate_by_owner_and_transaction(&self) -> Result<Vec<Statement>, LedgerError> {
        let mut statements = Vec::new();
        let Some(revenue) = self.revenue_balance.filter(|id| *id != self.payer) else {
            return Ok(statements);
        };
        let matching = self.rules.iter().filter(|rule| {
            rule.transaction_kind == self.transaction_kind && rule.owner_kind == self.owner_kind
        });
        for rule in matching {
            let fee = rule.amount_for(self.amount)?;
            if fee == 0 {
                continue;
            }
            statements.push(Statement::withdraw(self.payer, fee, &self.reference));
            statements.push(Statement::deposit(revenue, fee, &self.reference));
        }
        Ok(statements)
    }

    pub fn rollback_fee_statements(statements: &[Statement]) -> Vec<Statement> {
        statements.iter().map(Statement::inverse).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use rust_decimal_macros::dec;
    use uuid::Uuid;

    use crate::domain::{ActorRef, BankAccount, statement::Movement};

    use super::*;

    fn rule(owner_kind: ActorKind, flat: u64, rate: Decimal) -> FeeRule {
        FeeRule {
            transaction_kind: TransactionKind::BankTransfer,
            owner_kind,
            flat,
            rate,
        }
    }

    fn setup(rules: Vec<FeeRule>, owner_kind: ActorKind, amount: u64) -> (FeeCalculator, Corporate) {
        let mut corporate = Corporate::new("Acme", "IDR");
        corporate.fee_schedule = rules;
        corporate.revenue_balance = Some(Uuid::new_v4());
        let owner = ActorRef {
            id: Uuid::new_v4(),
            kind: owner_kind,
        };
        let balance = Balance::new(Uuid::new_v4(), owner, corporate.id, "Ops", "IDR");
        let transaction = Transaction::bank_transfer(
            &balance,
            owner,
            BankAccount::new("BNI", "1234", "Bob"),
            amount,
            "ext-1",
        );
        (
            FeeCalculator::initialize(&corporate, &balance, &transaction),
            corporate,
        )
    }

    fn net_change(statements: &[Statement]) -> HashMap<BalanceId, i128> {
        let mut net = HashMap::new();
        for statement in statements {
            let delta = match statement.movement().unwrap() {
                Movement::Deposit(amount) => amount as i128,
                Movement::Withdraw(amount) => -(amount as i128),
                Movement::Empty => 0,
            };
            *net.entry(statement.balance_id).or_insert(0) += delta;
        }
        net
    }

    #[test]
    fn fee_amounts() {
        assert_eq!(rule(ActorKind::User, 2500, dec!(0)).amount_for(10_000).unwrap(), 2500);
        assert_eq!(rule(ActorKind::User, 0, dec!(0.005)).amount_for(10_100).unwrap(), 51);
        assert_eq!(rule(ActorKind::User, 0, dec!(0.005)).amount_for(10_099).unwrap(), 50);
        assert_eq!(rule(ActorKind::User, 100, dec!(0.01)).amount_for(1_000).unwrap(), 110);
        assert!(matches!(
            rule(ActorKind::User, u64::MAX, dec!(0.01)).amount_for(1_000).unwrap_err(),
            LedgerError::AmountOverflow
        ));
    }

    #[test]
    fn rules_match_owner_kind() {
        let (calculator, corporate) = setup(
            vec![
                rule(ActorKind::User, 1000, dec!(0)),
                rule(ActorKind::Corporate, 5000, dec!(0)),
            ],
            ActorKind::User,
            50_000,
        );
        let statements = calculator.calculate_by_owner_and_transaction().unwrap();
        assert_eq!(statements.len(), 2);
        assert_eq!(statements[0].movement().unwrap(), Movement::Withdraw(1000));
        assert_eq!(statements[0].balance_id, calculator.payer);
        assert_eq!(statements[1].movement().unwrap(), Movement::Deposit(1000));
        assert_eq!(Some(statements[1].balance_id), corporate.revenue_balance);
        assert!(statements.iter().all(|s| s.reference == calculator.reference));
    }

    #[test]
    fn no_rules_no_statements() {
        let (calculator, _) = setup(vec![], ActorKind::Corporate, 50_000);
        assert!(calculator.calculate_by_owner_and_transaction().unwrap().is_empty());

        let (calculator, _) = setup(vec![rule(ActorKind::Corporate, 0, dec!(0))], ActorKind::Corporate, 50_000);
        assert!(calculator.calculate_by_owner_and_transaction().unwrap().is_empty());
    }

    #[test]
    fn no_fee_without_separate_revenue_balance() {
        let rules = vec![rule(ActorKind::User, 1000, dec!(0.01))];
        let (mut calculator, _) = setup(rules, ActorKind::User, 50_000);

        calculator.revenue_balance = None;
        assert!(calculator.calculate_by_owner_and_transaction().unwrap().is_empty());

        calculator.revenue_balance = Some(calculator.payer);
        assert!(calculator.calculate_by_owner_and_transaction().unwrap().is_empty());
    }

    #[test]
    fn rollback_nets_to_zero() {
        let (calculator, _) = setup(
            vec![
                rule(ActorKind::Corporate, 1500, dec!(0.002)),
                rule(ActorKind::Corporate, 0, dec!(0.01)),
            ],
            ActorKind::Corporate,
            123_457,
        );
        let forward = calculator.calculate_by_owner_and_transaction().unwrap();
        let again = calculator.calculate_by_owner_and_transaction().unwrap();
        assert_eq!(net_change(&forward), net_change(&again));

        let rollback = FeeCalculator::rollback_fee_statements(&forward);
        assert_eq!(rollback.len(), forward.len());
        for (original, inverse) in forward.iter().zip(&rollback) {
            assert_eq!(original.balance_id, inverse.balance_id);
            assert_eq!(original.reference, inverse.reference);
            assert_eq!(original.deposit, inverse.withdraw);
            assert_eq!(original.withdraw, inverse.deposit);
        }

        let mut all = forward.clone();
        all.extend(rollback);
        assert!(net_change(&all).values().all(|delta| *delta == 0));
    }
}
