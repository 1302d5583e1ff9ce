//! Delegation chain reconstruction
//!
//! Rebuilds the delegation chain carried by a credential's claims. This
//! answers "is this credential well-formed and who does its authority come
//! from" — whether the underlying consent is still live is a separate check
//! made by the orchestrator at point of use.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::scope::ScopeSet;
use crate::auth::token::{Claims, TokenService};
use crate::error::Result;

/// One resolved hop in a delegation chain
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationHop {
    pub from: String,
    pub to: String,
    pub scopes: ScopeSet,
    pub consent_id: Uuid,
    pub granted_at: DateTime<Utc>,
}

/// The authority chain behind a credential.
///
/// A direct credential has no hops and is rooted at its subject. A delegated
/// credential has exactly one hop (single-hop delegation) and records the
/// human the authority originates from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DelegationChain {
    pub subject: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_user: Option<String>,
    pub hops: Vec<DelegationHop>,
}

impl DelegationChain {
    pub fn is_delegated(&self) -> bool {
        !self.hops.is_empty()
    }

    /// The consent backing the single hop, if any
    pub fn consent_id(&self) -> Option<Uuid> {
        self.hops.first().map(|h| h.consent_id)
    }
}

/// A credential that passed structural validation, with its chain
#[derive(Debug, Clone)]
pub struct ValidatedCredential {
    pub claims: Claims,
    pub chain: DelegationChain,
}

/// Validates credentials and reconstructs their delegation chains
#[derive(Clone)]
pub struct DelegationValidator {
    tokens: TokenService,
}

impl DelegationValidator {
    pub fn new(tokens: TokenService) -> Self {
        Self { tokens }
    }

    /// Validate a raw credential and reconstruct its chain.
    ///
    /// Fails with `AuthenticationError` on malformed, unsigned, or expired
    /// credentials. Does not consult consent liveness.
    pub fn validate_chain(&self, raw: &str) -> Result<ValidatedCredential> {
        let claims = self.tokens.validate(raw)?;
        let chain = match &claims.delegation {
            None => DelegationChain {
                subject: claims.sub.clone(),
                original_user: None,
                hops: Vec::new(),
            },
            Some(delegation) => DelegationChain {
                subject: claims.sub.clone(),
                original_user: claims.user_id.clone(),
                hops: vec![DelegationHop {
                    from: delegation.delegator.clone(),
                    to: delegation.delegatee.clone(),
                    scopes: claims.scopes(),
                    consent_id: delegation.consent_id,
                    granted_at: delegation.granted_at,
                }],
            },
        };
        Ok(ValidatedCredential { claims, chain })
    }
}
