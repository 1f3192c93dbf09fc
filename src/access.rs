use std::sync::Arc;

use tracing::info;
use uuid::Uuid;

use crate::{
    commit::CommitProtocol,
    domain::{
        AccessGrant, AccessLevel, AccessRequest, Actor, ActorId, ActorRef, Balance, BalanceId,
        Corporate, RequestStatus,
    },
    error::LedgerError,
    gateway::{self, CredentialVerifier},
    store::Session,
};

/// Sharing balances between actors of one corporate, directly or through requests.
pub struct AccessWorkflow {
    commit: CommitProtocol,
    credentials: Arc<dyn CredentialVerifier>,
}

async fn load_balance(session: &Session, balance_id: BalanceId) -> Result<Balance, LedgerError> {
    session
        .get::<Balance>(balance_id)
        .await?
        .ok_or(LedgerError::BalanceNotFound(balance_id))
}

async fn load_actor(session: &Session, actor_id: ActorId) -> Result<Actor, LedgerError> {
    session
        .get::<Actor>(actor_id)
        .await?
        .ok_or(LedgerError::ActorNotFound(actor_id))
}

impl AccessWorkflow {
    pub fn new(commit: CommitProtocol, credentials: Arc<dyn CredentialVerifier>) -> Self {
        Self {
            commit,
            credentials,
        }
    }

    /// Grants `access` on a balance of `corporate` to `target`, authorized with the
    /// corporate's PIN.
    pub async fn share(
        &self,
        corporate: &Corporate,
        balance_id: BalanceId,
        access: AccessLevel,
        target: ActorId,
        pin: &str,
    ) -> Result<AccessGrant, LedgerError> {
        gateway::validate_pin(self.credentials.as_ref(), &corporate.actor_ref(), pin).await?;
        if !access.is_grantable() {
            return Err(LedgerError::InvalidAccessLevel);
        }

        let grant = self
            .commit
            .run_atomic(|session| async move {
                let balance = load_balance(&session, balance_id).await?;
                let mut actor = load_actor(&session, target).await?;
                if balance.corporate_id != corporate.id {
                    return Err(LedgerError::InvalidBalanceScope);
                }
                let grant = AccessGrant { balance_id, access };
                actor.grant(grant)?;
                session.save(&actor).await?;
                Ok(grant)
            })
            .await?;

        info!(%balance_id, %target, ?access, "Balance shared");
        Ok(grant)
    }

    pub async fn revoke(
        &self,
        corporate: &Corporate,
        balance_id: BalanceId,
        target: ActorId,
        pin: &str,
    ) -> Result<AccessGrant, LedgerError> {
        gateway::validate_pin(self.credentials.as_ref(), &corporate.actor_ref(), pin).await?;

        let revoked = self
            .commit
            .run_atomic(|session| async move {
                let balance = load_balance(&session, balance_id).await?;
                let mut actor = load_actor(&session, target).await?;
                if balance.corporate_id != corporate.id {
                    return Err(LedgerError::InvalidBalanceScope);
                }
                let revoked = actor.revoke(balance_id)?;
                session.save(&actor).await?;
                Ok(revoked)
            })
            .await?;

        info!(%balance_id, %target, "Balance access revoked");
        Ok(revoked)
    }

    /// Files a PENDING request addressed to the balance's current owner.
    pub async fn request_access(
        &self,
        corporate: &Corporate,
        requester: ActorRef,
        balance_id: BalanceId,
        access: AccessLevel,
    ) -> Result<AccessRequest, LedgerError> {
        let store = self.commit.store();
        let balance = store
            .get::<Balance>(balance_id)
            .await?
            .ok_or(LedgerError::BalanceNotFound(balance_id))?;
        if !access.is_grantable() {
            return Err(LedgerError::InvalidAccessLevel);
        }
        let actor = store
            .get::<Actor>(requester.id)
            .await?
            .ok_or(LedgerError::ActorNotFound(requester.id))?;
        if actor.access(balance_id).is_some() {
            return Err(LedgerError::AccessBalanceAlreadyHave);
        }

        let request = AccessRequest::new(corporate.id, &balance, requester, access);
        store.insert(&request).await?;
        info!(request_id = %request.id, %balance_id, requester = %requester.id, "Access requested");
        Ok(request)
    }

    pub async fn list_requests_by_requester(
        &self,
        requester: ActorRef,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AccessRequest>, LedgerError> {
        Ok(self
            .commit
            .store()
            .find::<AccessRequest>(|request| {
                request.requester.id == requester.id
                    && status.is_none_or(|status| request.status == status)
            })
            .await?)
    }

    pub async fn list_requests_by_owner(
        &self,
        owner: ActorRef,
        status: Option<RequestStatus>,
    ) -> Result<Vec<AccessRequest>, LedgerError> {
        Ok(self
            .commit
            .store()
            .find::<AccessRequest>(|request| {
                request.owner.id == owner.id && status.is_none_or(|status| request.status == status)
            })
            .await?)
    }

    /// Approves or rejects a request. The grant is written only after every check passed
    /// and the request status is persisted last.
    pub async fn resolve_request(
        &self,
        request_id: Uuid,
        decision: RequestStatus,
        owner: ActorRef,
        pin: &str,
    ) -> Result<AccessRequest, LedgerError> {
        let credentials = self.credentials.as_ref();
        let request = self
            .commit
            .run_atomic(|session| async move {
                let mut request = session
                    .get::<AccessRequest>(request_id)
                    .await?
                    .ok_or(LedgerError::AccessRequestNotFound(request_id))?;
                let mut requester = load_actor(&session, request.requester.id).await?;
                if request.status != RequestStatus::Pending {
                    return Err(LedgerError::RequestAlreadyResolved);
                }
                if requester.access(request.balance_id).is_some() {
                    return Err(LedgerError::AccessBalanceAlreadyHave);
                }
                let resolver = load_actor(&session, owner.id).await?;
                if !resolver.is_owner(request.balance_id) {
                    return Err(LedgerError::InvalidBalanceOwner);
                }
                gateway::validate_pin(credentials, &owner, pin).await?;

                request.resolve(decision)?;
                if decision == RequestStatus::Approved {
                    requester.grant(AccessGrant {
                        balance_id: request.balance_id,
                        access: request.access,
                    })?;
                    session.save(&requester).await?;
                }
                session.save(&request).await?;
                Ok(request)
            })
            .await?;

        info!(request_id = %request.id, status = ?request.status, "Access request resolved");
        Ok(request)
    }
}
