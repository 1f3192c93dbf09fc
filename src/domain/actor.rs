use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::LedgerError,
    fee::FeeRule,
    store::{Collection, Document},
};

use super::BalanceId;

pub type ActorId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActorKind {
    User,
    Corporate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorRef {
    pub id: ActorId,
    pub kind: ActorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccessLevel {
    Owner,
    Shared,
    ViewOnly,
}

impl AccessLevel {
    /// Levels that can be handed out by sharing or by an access request.
    pub fn is_grantable(self) -> bool {
        matches!(self, AccessLevel::Shared | AccessLevel::ViewOnly)
    }

    /// Levels allowed to move money out of the balance.
    pub fn can_operate(self) -> bool {
        matches!(self, AccessLevel::Owner | AccessLevel::Shared)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessGrant {
    pub balance_id: BalanceId,
    pub access: AccessLevel,
}

/// A user or a corporate, together with the balances it can see.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Actor {
    pub reference: ActorRef,
    pub corporate_id: ActorId,
    pub name: String,
    pub main_balance: Option<BalanceId>,
    pub balances: Vec<AccessGrant>,
    pub verified: bool,
}

impl Actor {
    pub fn user(corporate_id: ActorId, name: impl Into<String>) -> Self {
        Self {
            reference: ActorRef {
                id: Uuid::new_v4(),
                kind: ActorKind::User,
            },
            corporate_id,
            name: name.into(),
            main_balance: None,
            balances: Vec::new(),
            verified: false,
        }
    }

    pub fn for_corporate(corporate: &Corporate) -> Self {
        Self {
            reference: corporate.actor_ref(),
            corporate_id: corporate.id,
            name: corporate.name.clone(),
            main_balance: None,
            balances: Vec::new(),
            verified: true,
        }
    }

    pub fn access(&self, balance_id: BalanceId) -> Option<AccessLevel> {
        self.balances
            .iter()
            .find(|grant| grant.balance_id == balance_id)
            .map(|grant| grant.access)
    }

    pub fn is_owner(&self, balance_id: BalanceId) -> bool {
        self.access(balance_id) == Some(AccessLevel::Owner)
    }

    /// Adds a grant, keeping at most one grant per balance.
    pub fn grant(&mut self, grant: AccessGrant) -> Result<(), LedgerError> {
        if self.access(grant.balance_id).is_some() {
            return Err(LedgerError::AccessBalanceAlreadyHave);
        }
        self.balances.push(grant);
        Ok(())
    }

    pub fn revoke(&mut self, balance_id: BalanceId) -> Result<AccessGrant, LedgerError> {
        let position = self
            .balances
            .iter()
            .position(|grant| grant.balance_id == balance_id)
            .ok_or(LedgerError::AccessBalanceNotFound(balance_id))?;
        if self.balances[position].access == AccessLevel::Owner {
            return Err(LedgerError::OwnerAccessNotRevocable);
        }
        Ok(self.balances.remove(position))
    }
}

impl Document for Actor {
    const COLLECTION: Collection = Collection::Actors;

    fn id(&self) -> Uuid {
        self.reference.id
    }
}

/// Tenant configuration. A corporate is also an [`Actor`] with the same id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Corporate {
    pub id: ActorId,
    pub name: String,
    pub currency: String,
    pub fee_schedule: Vec<FeeRule>,
    /// Balance credited with collected fees.
    pub revenue_balance: Option<BalanceId>,
    pub bulk_inquiry_callback_url: Option<String>,
    pub bulk_transfer_callback_url: Option<String>,
}

impl Corporate {
    pub fn new(name: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            currency: currency.into(),
            fee_schedule: Vec::new(),
            revenue_balance: None,
            bulk_inquiry_callback_url: None,
            bulk_transfer_callback_url: None,
        }
    }

    pub fn actor_ref(&self) -> ActorRef {
        ActorRef {
            id: self.id,
            kind: ActorKind::Corporate,
        }
    }
}
