//! Consent records and the consent lifecycle
//!
//! A consent record captures a human's grant of specific scopes to a specific
//! delegatee agent for a stated purpose. Records transition only forward:
//! active to expired by time, active to revoked by explicit call, and are
//! never reactivated. Consent is the only object that can be revoked
//! mid-flight; credentials bound to it simply expire.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::audit::{AuditEvent, AuditSink};
use crate::auth::scope::{self, ScopeSet};
use crate::auth::token::{AccessCredential, TokenService};
use crate::error::{AppError, Result};
use crate::models::Principal;
use crate::store::Store;

/// Default consent lifetime when the request does not specify one
pub const DEFAULT_CONSENT_TTL_SECS: i64 = 3600;

/// Lifecycle state of a consent record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentStatus {
    Active,
    Expired,
    Revoked,
}

impl ConsentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConsentStatus::Active => "active",
            ConsentStatus::Expired => "expired",
            ConsentStatus::Revoked => "revoked",
        }
    }
}

impl std::str::FromStr for ConsentStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "active" => Ok(ConsentStatus::Active),
            "expired" => Ok(ConsentStatus::Expired),
            "revoked" => Ok(ConsentStatus::Revoked),
            _ => Err(format!("Invalid consent status: {}", s)),
        }
    }
}

/// A human's recorded grant of scopes to a delegatee agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentRecord {
    pub id: Uuid,
    pub user_id: String,
    pub delegator: String,
    pub delegatee_agent: String,
    pub scopes: ScopeSet,
    pub purpose: String,
    pub granted_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub status: ConsentStatus,
}

impl ConsentRecord {
    /// Active and not past expiry at `now`
    pub fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.status == ConsentStatus::Active && now < self.expires_at
    }
}

/// Per-deployment allow-list of scopes a human may delegate to agents
#[derive(Debug, Clone)]
pub struct ConsentPolicy {
    delegable: ScopeSet,
}

impl ConsentPolicy {
    pub fn new(delegable: ScopeSet) -> Self {
        Self { delegable }
    }

    /// Scopes from `requested` that the policy permits
    pub fn grantable(&self, requested: &ScopeSet) -> ScopeSet {
        requested.intersect(&self.delegable)
    }
}

impl Default for ConsentPolicy {
    fn default() -> Self {
        Self {
            delegable: [scope::CALENDAR_WRITE, scope::NOTIFY_SEND].into_iter().collect(),
        }
    }
}

/// Parameters for a consent request
#[derive(Debug, Clone)]
pub struct ConsentParams {
    pub user_id: String,
    pub delegator: Principal,
    pub delegatee: Principal,
    pub requested_scopes: ScopeSet,
    pub purpose: String,
    pub ttl_secs: Option<i64>,
}

/// A granted consent plus the delegated credential bound to it.
///
/// The credential is absent when the policy granted no scopes; a consent
/// record still exists and callers must check scope emptiness rather than
/// record presence.
#[derive(Debug, Clone)]
pub struct ConsentGrant {
    pub record: ConsentRecord,
    pub credential: Option<AccessCredential>,
}

/// Records and evaluates consent; mints consent-bound credentials
#[derive(Clone)]
pub struct ConsentManager {
    store: Store,
    tokens: TokenService,
    audit: AuditSink,
    policy: Arc<ConsentPolicy>,
}

impl ConsentManager {
    pub fn new(store: Store, tokens: TokenService, audit: AuditSink, policy: ConsentPolicy) -> Self {
        Self {
            store,
            tokens,
            audit,
            policy: Arc::new(policy),
        }
    }

    /// Record consent and mint a delegated credential bound to it.
    ///
    /// Granted scopes are the intersection of the request with the policy
    /// allow-list. An empty intersection still produces an active record.
    pub async fn request_consent(&self, params: ConsentParams) -> Result<ConsentGrant> {
        let ttl = params.ttl_secs.unwrap_or(DEFAULT_CONSENT_TTL_SECS);
        if ttl <= 0 {
            return Err(AppError::Validation("consent ttl must be positive".to_string()));
        }

        let granted = self.policy.grantable(&params.requested_scopes);
        let now = Utc::now();
        let record = ConsentRecord {
            id: Uuid::new_v4(),
            user_id: params.user_id.clone(),
            delegator: params.delegator.id.clone(),
            delegatee_agent: params.delegatee.id.clone(),
            scopes: granted.clone(),
            purpose: params.purpose.clone(),
            granted_at: now,
            expires_at: now + Duration::seconds(ttl),
            status: ConsentStatus::Active,
        };
        self.store.insert_consent(&record).await?;

        let credential = if granted.is_empty() {
            tracing::info!(
                consent_id = %record.id,
                user = %record.user_id,
                "consent granted with empty scope set; no credential minted"
            );
            None
        } else {
            Some(self.tokens.issue_delegated(
                &params.delegator,
                &params.delegatee,
                &params.user_id,
                &granted,
                record.id,
                None,
            )?)
        };

        self.audit
            .record(
                AuditEvent::success(&params.user_id, "consent.granted", &format!("consent:{}", record.id))
                    .with_details(serde_json::json!({
                        "delegatee": record.delegatee_agent,
                        "scopes": granted.to_vec(),
                        "purpose": record.purpose,
                    })),
            )
            .await;

        Ok(ConsentGrant { record, credential })
    }

    /// Revoke a consent record.
    ///
    /// Idempotent: revoking an already-revoked or unknown id succeeds and is
    /// logged as a no-op. The underlying UPDATE is conditional on the record
    /// still being active, so concurrent revokes race harmlessly.
    pub async fn revoke(&self, consent_id: Uuid, requester_id: &str) -> Result<bool> {
        let changed = self.store.revoke_consent(consent_id).await?;
        if !changed {
            tracing::info!(%consent_id, requester = requester_id, "revoke was a no-op");
        }
        self.audit
            .record(
                AuditEvent::success(requester_id, "consent.revoked", &format!("consent:{}", consent_id))
                    .with_details(serde_json::json!({ "no_op": !changed })),
            )
            .await;
        Ok(true)
    }

    /// Whether the consent is active and unexpired right now.
    ///
    /// Unknown ids are simply inactive. A record observed past its expiry is
    /// lazily marked expired.
    pub async fn is_active(&self, consent_id: Uuid) -> Result<bool> {
        let record = match self.store.get_consent(consent_id).await? {
            Some(r) => r,
            None => return Ok(false),
        };
        let now = Utc::now();
        if record.status == ConsentStatus::Active && now >= record.expires_at {
            self.store.expire_consent(consent_id).await?;
            return Ok(false);
        }
        Ok(record.is_live(now))
    }

    /// Fetch a consent record
    pub async fn get(&self, consent_id: Uuid) -> Result<ConsentRecord> {
        self.store
            .get_consent(consent_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Consent {} not found", consent_id)))
    }
}
