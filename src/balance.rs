use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use crate::{
    commit::CommitProtocol,
    config::ProvisioningConfig,
    domain::{
        AccessGrant, AccessLevel, Actor, ActorRef, Balance, BalanceId, Corporate, Statement,
        VirtualAccount, balance::validate_balance_name,
    },
    error::LedgerError,
    gateway::AccountProvisioner,
    ledger,
};

pub const MAX_PAGE_LIMIT: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// Starts at 1.
    pub page: u32,
    pub limit: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 1, limit: 20 }
    }
}

impl Pagination {
    fn validate(&self) -> Result<(), LedgerError> {
        if self.page == 0 || self.limit == 0 || self.limit > MAX_PAGE_LIMIT {
            return Err(LedgerError::InvalidPagination {
                max_limit: MAX_PAGE_LIMIT,
            });
        }
        Ok(())
    }

    fn offset(&self) -> usize {
        (self.page as usize - 1).saturating_mul(self.limit as usize)
    }
}

/// Balance lifecycle and direct money movements.
pub struct BalanceService {
    commit: CommitProtocol,
    provisioner: Arc<dyn AccountProvisioner>,
    provisioning: ProvisioningConfig,
}

impl BalanceService {
    pub fn new(
        commit: CommitProtocol,
        provisioner: Arc<dyn AccountProvisioner>,
        provisioning: ProvisioningConfig,
    ) -> Self {
        Self {
            commit,
            provisioner,
            provisioning,
        }
    }

    /// Creates an additional balance owned by `owner`.
    pub async fn create_balance(
        &self,
        corporate: &Corporate,
        owner: ActorRef,
        name: &str,
    ) -> Result<Balance, LedgerError> {
        self.create(corporate, owner, name, false).await
    }

    /// Creates the balance and makes it the actor's main balance.
    pub async fn initialize_main_balance(
        &self,
        corporate: &Corporate,
        owner: ActorRef,
        name: &str,
    ) -> Result<Balance, LedgerError> {
        self.create(corporate, owner, name, true).await
    }

    async fn create(
        &self,
        corporate: &Corporate,
        owner: ActorRef,
        name: &str,
        main: bool,
    ) -> Result<Balance, LedgerError> {
        validate_balance_name(name)?;
        // Fixed across replays, so provisioning sees the same correlation id.
        let balance_id = Uuid::new_v4();

        let balance = self
            .commit
            .run_atomic(|session| async move {
                let mut balance =
                    Balance::new(balance_id, owner, corporate.id, name, &corporate.currency);
                session.insert(&balance).await?;

                let mut actor = session
                    .get::<Actor>(owner.id)
                    .await?
                    .ok_or(LedgerError::ActorNotFound(owner.id))?;
                actor.grant(AccessGrant {
                    balance_id,
                    access: AccessLevel::Owner,
                })?;
                if main {
                    actor.main_balance = Some(balance_id);
                }
                session.save(&actor).await?;

                balance.provisioned_accounts = self.provision(balance_id, name).await;
                session.save(&balance).await?;
                Ok(balance)
            })
            .await?;

        info!(balance_id = %balance.id, owner = %owner.id, main, "Balance created");
        Ok(balance)
    }

    async fn provision(&self, balance_id: BalanceId, label: &str) -> Vec<VirtualAccount> {
        let mut accounts = Vec::with_capacity(self.provisioning.bank_codes.len());
        for bank_code in &self.provisioning.bank_codes {
            let account_number = match self
                .provisioner
                .provision_account(balance_id, label, bank_code)
                .await
            {
                Ok(number) => number,
                Err(err) => {
                    warn!(%balance_id, bank_code, error = %err, "Account provisioning failed");
                    self.provisioning.placeholder.clone()
                }
            };
            accounts.push(VirtualAccount {
                bank_code: bank_code.clone(),
                account_number,
            });
        }
        accounts
    }

    pub async fn deposit(
        &self,
        balance_id: BalanceId,
        amount: u64,
        reference: &str,
    ) -> Result<Statement, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let statement = Statement::deposit(balance_id, amount, reference);
        self.commit
            .run_atomic(|session| {
                let statement = &statement;
                async move { ledger::apply_deposit(&session, statement).await }
            })
            .await
    }

    pub async fn withdraw(
        &self,
        balance_id: BalanceId,
        amount: u64,
        reference: &str,
    ) -> Result<Statement, LedgerError> {
        if amount == 0 {
            return Err(LedgerError::InvalidAmount);
        }
        let statement = Statement::withdraw(balance_id, amount, reference);
        self.commit
            .run_atomic(|session| {
                let statement = &statement;
                async move { ledger::apply_withdraw(&session, statement).await }
            })
            .await
    }

    /// Newest statements first.
    pub async fn statements_by_balance(
        &self,
        balance_id: BalanceId,
        pagination: Pagination,
    ) -> Result<Vec<Statement>, LedgerError> {
        pagination.validate()?;
        let store = self.commit.store();
        if store.get::<Balance>(balance_id).await?.is_none() {
            return Err(LedgerError::BalanceNotFound(balance_id));
        }
        let mut statements = store
            .find::<Statement>(|statement| statement.balance_id == balance_id)
            .await?;
        statements.reverse();
        Ok(statements
            .into_iter()
            .skip(pagination.offset())
            .take(pagination.limit as usize)
            .collect())
    }

    pub async fn get_balance(&self, balance_id: BalanceId) -> Result<Balance, LedgerError> {
        self.commit
            .store()
            .get::<Balance>(balance_id)
            .await?
            .ok_or(LedgerError::BalanceNotFound(balance_id))
    }
}
