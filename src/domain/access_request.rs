use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    error::LedgerError,
    store::{Collection, Document},
};

use super::{AccessLevel, ActorId, ActorRef, Balance, BalanceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

/// Request from a non-owner for access to a balance, resolved once by the owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessRequest {
    pub id: Uuid,
    pub corporate_id: ActorId,
    pub balance_id: BalanceId,
    pub requester: ActorRef,
    pub owner: ActorRef,
    pub access: AccessLevel,
    pub status: RequestStatus,
    pub created_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
}

impl AccessRequest {
    pub fn new(
        corporate_id: ActorId,
        balance: &Balance,
        requester: ActorRef,
        access: AccessLevel,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            corporate_id,
            balance_id: balance.id,
            requester,
            owner: balance.owner,
            access,
            status: RequestStatus::Pending,
            created_at: Utc::now(),
            resolved_at: None,
        }
    }

    /// Moves the request out of PENDING. Terminal statuses never change again.
    pub fn resolve(&mut self, decision: RequestStatus) -> Result<(), LedgerError> {
        if self.status != RequestStatus::Pending {
            return Err(LedgerError::RequestAlreadyResolved);
        }
        if decision == RequestStatus::Pending {
            return Err(LedgerError::InvalidRequestDecision);
        }
        self.status = decision;
        self.resolved_at = Some(Utc::now());
        Ok(())
    }
}

impl Document for AccessRequest {
    const COLLECTION: Collection = Collection::AccessRequests;

    fn id(&self) -> Uuid {
        self.id
    }
}
