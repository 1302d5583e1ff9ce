//! Credential minting and validation
//!
//! Credentials are three dot-joined base64url segments: header, claims
//! payload, signature. Signing and verification are delegated to the
//! injected [`IdentityClient`]. Credentials are never stored or revoked;
//! expiry is the only cancellation mechanism.

use std::sync::Arc;

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::identity::IdentityClient;
use crate::auth::scope::ScopeSet;
use crate::error::{AppError, Result};
use crate::models::{AgentType, Principal};

/// Ceiling for directly issued credentials
pub const DIRECT_TTL_CEILING_SECS: i64 = 3600;
/// Lifetime of delegated credentials
pub const DELEGATED_TTL_SECS: i64 = 1800;

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Single delegation hop embedded in a credential
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DelegationClaim {
    pub delegator: String,
    pub delegatee: String,
    pub consent_id: Uuid,
    pub granted_at: DateTime<Utc>,
}

/// Credential claims payload
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub iss: String,
    pub aud: String,
    /// Space-separated scope list
    pub scope: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegation: Option<DelegationClaim>,
}

impl Claims {
    pub fn scopes(&self) -> ScopeSet {
        ScopeSet::from_scope_string(&self.scope)
    }

    pub fn issued_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.iat, 0).single().unwrap_or_default()
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        Utc.timestamp_opt(self.exp, 0).single().unwrap_or_default()
    }

    pub fn is_delegated(&self) -> bool {
        self.delegation.is_some()
    }
}

/// A freshly minted credential: raw wire form plus its claims
#[derive(Debug, Clone)]
pub struct AccessCredential {
    pub token: String,
    pub claims: Claims,
}

impl AccessCredential {
    /// Truncated jti for audit correlation; the full token is never persisted
    pub fn reference(&self) -> String {
        credential_reference(&self.claims.jti)
    }
}

/// Truncated credential reference used in audit records
pub fn credential_reference(jti: &str) -> String {
    jti.chars().take(8).collect()
}

/// Mints and validates bearer credentials
#[derive(Clone)]
pub struct TokenService {
    identity: Arc<IdentityClient>,
}

impl TokenService {
    pub fn new(identity: Arc<IdentityClient>) -> Self {
        Self { identity }
    }

    pub fn issuer(&self) -> &str {
        self.identity.issuer()
    }

    /// Issue a direct credential for `subject` addressed to `audience`.
    ///
    /// TTLs above the 60-minute ceiling are clamped. Fails only on invalid
    /// input: empty scopes or a non-positive TTL.
    pub fn issue(
        &self,
        subject: &Principal,
        audience: &str,
        scopes: &ScopeSet,
        ttl_secs: i64,
    ) -> Result<AccessCredential> {
        let ttl = check_ttl(ttl_secs, DIRECT_TTL_CEILING_SECS)?;
        check_scopes(scopes)?;

        let now = Utc::now();
        let claims = Claims {
            sub: subject.id.clone(),
            iss: self.identity.issuer().to_string(),
            aud: audience.to_string(),
            scope: scopes.to_scope_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + ttl,
            jti: Uuid::new_v4().to_string(),
            agent_id: subject.is_agent().then(|| subject.id.clone()),
            agent_type: subject.agent_type,
            user_id: None,
            delegation: None,
        };
        self.mint(claims)
    }

    /// Issue a delegated credential: `delegatee` acts on behalf of `user_id`
    /// under the consent identified by `consent_id`.
    pub fn issue_delegated(
        &self,
        delegator: &Principal,
        delegatee: &Principal,
        user_id: &str,
        scopes: &ScopeSet,
        consent_id: Uuid,
        ttl_secs: Option<i64>,
    ) -> Result<AccessCredential> {
        let ttl = check_ttl(ttl_secs.unwrap_or(DELEGATED_TTL_SECS), DELEGATED_TTL_SECS)?;
        check_scopes(scopes)?;

        let now = Utc::now();
        let claims = Claims {
            sub: delegatee.id.clone(),
            iss: self.identity.issuer().to_string(),
            aud: delegatee.id.clone(),
            scope: scopes.to_scope_string(),
            iat: now.timestamp(),
            exp: now.timestamp() + ttl,
            jti: Uuid::new_v4().to_string(),
            agent_id: delegatee.is_agent().then(|| delegatee.id.clone()),
            agent_type: delegatee.agent_type,
            user_id: Some(user_id.to_string()),
            delegation: Some(DelegationClaim {
                delegator: delegator.id.clone(),
                delegatee: delegatee.id.clone(),
                consent_id,
                granted_at: now,
            }),
        };
        self.mint(claims)
    }

    /// Parse and verify a raw credential, returning its claims.
    ///
    /// Rejects malformed tokens, bad signatures, and anything at or past
    /// expiry. Makes no statement about consent liveness.
    pub fn validate(&self, raw: &str) -> Result<Claims> {
        let mut segments = raw.split('.');
        let (header_b64, payload_b64, signature) =
            match (segments.next(), segments.next(), segments.next(), segments.next()) {
                (Some(h), Some(p), Some(s), None) => (h, p, s),
                _ => {
                    return Err(AppError::Authentication(
                        "credential must have three segments".to_string(),
                    ))
                }
            };

        let signed_portion = format!("{}.{}", header_b64, payload_b64);
        if !self.identity.verify(signed_portion.as_bytes(), signature) {
            return Err(AppError::Authentication("credential signature invalid".to_string()));
        }

        let header_bytes = URL_SAFE_NO_PAD
            .decode(header_b64)
            .map_err(|_| AppError::Authentication("credential header not base64".to_string()))?;
        let _header: Header = serde_json::from_slice(&header_bytes)
            .map_err(|_| AppError::Authentication("credential header malformed".to_string()))?;

        let payload_bytes = URL_SAFE_NO_PAD
            .decode(payload_b64)
            .map_err(|_| AppError::Authentication("credential payload not base64".to_string()))?;
        let claims: Claims = serde_json::from_slice(&payload_bytes)
            .map_err(|_| AppError::Authentication("credential payload malformed".to_string()))?;

        if Utc::now().timestamp() >= claims.exp {
            return Err(AppError::Authentication("credential expired".to_string()));
        }

        Ok(claims)
    }

    /// True iff every required scope is granted, or the wildcard is granted.
    /// Pure; no side effects.
    pub fn verify_scopes(required: &ScopeSet, granted: &ScopeSet) -> bool {
        granted.satisfies(required)
    }

    fn mint(&self, claims: Claims) -> Result<AccessCredential> {
        let header = Header {
            alg: if self.identity.is_signed() { "HS256" } else { "none" }.to_string(),
            typ: "JWT".to_string(),
        };
        let header_json = serde_json::to_vec(&header)
            .map_err(|e| AppError::Internal(format!("header encoding failed: {}", e)))?;
        let payload_json = serde_json::to_vec(&claims)
            .map_err(|e| AppError::Internal(format!("claims encoding failed: {}", e)))?;

        let signed_portion = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header_json),
            URL_SAFE_NO_PAD.encode(payload_json)
        );
        let signature = self.identity.sign(signed_portion.as_bytes());

        Ok(AccessCredential {
            token: format!("{}.{}", signed_portion, signature),
            claims,
        })
    }
}

fn check_ttl(ttl_secs: i64, ceiling: i64) -> Result<i64> {
    if ttl_secs <= 0 {
        return Err(AppError::Validation("credential ttl must be positive".to_string()));
    }
    Ok(ttl_secs.min(ceiling))
}

fn check_scopes(scopes: &ScopeSet) -> Result<()> {
    if scopes.is_empty() {
        return Err(AppError::Validation(
            "credential must carry at least one scope".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::scope;

    fn service() -> TokenService {
        let identity = IdentityClient::new("dispatch-test", b"unit-test-key".to_vec()).unwrap();
        TokenService::new(Arc::new(identity))
    }

    fn detection_agent() -> Principal {
        Principal::agent("agent:detection", AgentType::Detection)
    }

    fn scheduling_agent() -> Principal {
        Principal::agent("agent:scheduling", AgentType::Scheduling)
    }

    fn coordinator() -> Principal {
        Principal::agent("agent:coordinator", AgentType::Coordinator)
    }

    #[test]
    fn test_issue_validate_round_trip() {
        let svc = service();
        let scopes: ScopeSet = ["a", "b"].into_iter().collect();
        let cred = svc.issue(&detection_agent(), "incident-analysis", &scopes, 3600).unwrap();

        let claims = svc.validate(&cred.token).unwrap();
        assert_eq!(claims.sub, "agent:detection");
        assert_eq!(claims.scope, "a b");
        assert_eq!(claims.aud, "incident-analysis");
        assert_eq!(claims.iss, "dispatch-test");
        assert_eq!(claims.agent_type, Some(AgentType::Detection));
        assert!(claims.delegation.is_none());
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_issue_rejects_empty_scopes() {
        let svc = service();
        let err = svc
            .issue(&detection_agent(), "aud", &ScopeSet::new(), 600)
            .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn test_issue_rejects_non_positive_ttl() {
        let svc = service();
        let scopes: ScopeSet = ["a"].into_iter().collect();
        assert!(svc.issue(&detection_agent(), "aud", &scopes, 0).is_err());
        assert!(svc.issue(&detection_agent(), "aud", &scopes, -5).is_err());
    }

    #[test]
    fn test_issue_clamps_ttl_to_ceiling() {
        let svc = service();
        let scopes: ScopeSet = ["a"].into_iter().collect();
        let cred = svc.issue(&detection_agent(), "aud", &scopes, 86_400).unwrap();
        assert!(cred.claims.exp - cred.claims.iat <= DIRECT_TTL_CEILING_SECS);
    }

    #[test]
    fn test_jti_unique_per_issuance() {
        let svc = service();
        let scopes: ScopeSet = ["a"].into_iter().collect();
        let one = svc.issue(&detection_agent(), "aud", &scopes, 600).unwrap();
        let two = svc.issue(&detection_agent(), "aud", &scopes, 600).unwrap();
        assert_ne!(one.claims.jti, two.claims.jti);
    }

    #[test]
    fn test_issue_delegated_embeds_delegation() {
        let svc = service();
        let scopes: ScopeSet = [scope::CALENDAR_WRITE].into_iter().collect();
        let consent_id = Uuid::new_v4();
        let cred = svc
            .issue_delegated(&coordinator(), &scheduling_agent(), "user-1", &scopes, consent_id, None)
            .unwrap();

        let claims = svc.validate(&cred.token).unwrap();
        assert_eq!(claims.sub, "agent:scheduling");
        assert_eq!(claims.user_id.as_deref(), Some("user-1"));
        let delegation = claims.delegation.expect("delegation claim");
        assert_eq!(delegation.delegator, "agent:coordinator");
        assert_eq!(delegation.delegatee, "agent:scheduling");
        assert_eq!(delegation.consent_id, consent_id);
        assert!(claims.exp - claims.iat <= DELEGATED_TTL_SECS);
    }

    #[test]
    fn test_validate_rejects_wrong_segment_count() {
        let svc = service();
        assert!(svc.validate("onlyonesegment").is_err());
        assert!(svc.validate("two.segments").is_err());
        assert!(svc.validate("a.b.c.d").is_err());
    }

    #[test]
    fn test_validate_rejects_tampered_payload() {
        let svc = service();
        let scopes: ScopeSet = ["a"].into_iter().collect();
        let cred = svc.issue(&detection_agent(), "aud", &scopes, 600).unwrap();

        let mut parts: Vec<&str> = cred.token.split('.').collect();
        let forged = URL_SAFE_NO_PAD.encode(r#"{"sub":"agent:rogue"}"#);
        parts[1] = &forged;
        let tampered = parts.join(".");

        let err = svc.validate(&tampered).unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
    }

    #[test]
    fn test_validate_rejects_foreign_signature() {
        let svc = service();
        let other = TokenService::new(Arc::new(
            IdentityClient::new("dispatch-test", b"other-key".to_vec()).unwrap(),
        ));
        let scopes: ScopeSet = ["a"].into_iter().collect();
        let cred = other.issue(&detection_agent(), "aud", &scopes, 600).unwrap();
        assert!(svc.validate(&cred.token).is_err());
    }

    #[test]
    fn test_validate_rejects_expired() {
        let svc = service();
        let now = Utc::now();
        let claims = Claims {
            sub: "agent:detection".to_string(),
            iss: "dispatch-test".to_string(),
            aud: "aud".to_string(),
            scope: "a".to_string(),
            iat: now.timestamp() - 120,
            exp: now.timestamp() - 60,
            jti: Uuid::new_v4().to_string(),
            agent_id: None,
            agent_type: None,
            user_id: None,
            delegation: None,
        };
        let cred = svc.mint(claims).unwrap();
        let err = svc.validate(&cred.token).unwrap_err();
        assert!(matches!(err, AppError::Authentication(_)));
        assert!(format!("{}", err).contains("expired"));
    }

    #[test]
    fn test_validate_rejects_exactly_at_expiry() {
        let svc = service();
        let now = Utc::now();
        let claims = Claims {
            sub: "s".to_string(),
            iss: "dispatch-test".to_string(),
            aud: "aud".to_string(),
            scope: "a".to_string(),
            iat: now.timestamp() - 60,
            exp: now.timestamp(),
            jti: Uuid::new_v4().to_string(),
            agent_id: None,
            agent_type: None,
            user_id: None,
            delegation: None,
        };
        let cred = svc.mint(claims).unwrap();
        assert!(svc.validate(&cred.token).is_err());
    }

    #[test]
    fn test_verify_scopes_monotonicity() {
        let granted: ScopeSet = ["a", "b", "c"].into_iter().collect();
        assert!(TokenService::verify_scopes(&ScopeSet::new(), &granted));
        assert!(TokenService::verify_scopes(&["a"].into_iter().collect(), &granted));
        assert!(TokenService::verify_scopes(&["a", "c"].into_iter().collect(), &granted));
        assert!(TokenService::verify_scopes(&["a", "b", "c"].into_iter().collect(), &granted));
        assert!(!TokenService::verify_scopes(&["a", "d"].into_iter().collect(), &granted));
        assert!(!TokenService::verify_scopes(&["d"].into_iter().collect(), &granted));
    }

    #[test]
    fn test_verify_scopes_wildcard() {
        let granted: ScopeSet = ["*"].into_iter().collect();
        let required: ScopeSet = ["anything.at.all"].into_iter().collect();
        assert!(TokenService::verify_scopes(&required, &granted));
    }

    #[test]
    fn test_insecure_identity_still_checks_expiry() {
        let svc = TokenService::new(Arc::new(IdentityClient::insecure("demo")));
        let now = Utc::now();
        let claims = Claims {
            sub: "s".to_string(),
            iss: "demo".to_string(),
            aud: "aud".to_string(),
            scope: "a".to_string(),
            iat: now.timestamp() - 120,
            exp: now.timestamp() - 1,
            jti: Uuid::new_v4().to_string(),
            agent_id: None,
            agent_type: None,
            user_id: None,
            delegation: None,
        };
        let cred = svc.mint(claims).unwrap();
        assert!(svc.validate(&cred.token).is_err());
    }

    #[test]
    fn test_credential_reference_truncates() {
        assert_eq!(credential_reference("0123456789abcdef"), "01234567");
        assert_eq!(credential_reference("abc"), "abc");
    }
}
