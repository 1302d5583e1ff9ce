//! Append-only audit trail
//!
//! Every credential use, consent decision, and step transition lands here.
//! Recording never fails the calling operation: storage errors are demoted
//! to tracing output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::store::Store;

/// Outcome tag of an audited action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditOutcome::Success => "success",
            AuditOutcome::Failure => "failure",
        }
    }
}

impl std::str::FromStr for AuditOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(AuditOutcome::Success),
            "failure" => Ok(AuditOutcome::Failure),
            _ => Err(format!("Invalid audit outcome: {}", s)),
        }
    }
}

/// One structured audit event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub actor: String,
    pub action: String,
    pub resource: String,
    pub result: AuditOutcome,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

impl AuditEvent {
    fn new(actor: &str, action: &str, resource: &str, result: AuditOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            actor: actor.to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            result,
            details: Value::Object(serde_json::Map::new()),
            timestamp: Utc::now(),
        }
    }

    pub fn success(actor: &str, action: &str, resource: &str) -> Self {
        Self::new(actor, action, resource, AuditOutcome::Success)
    }

    pub fn failure(actor: &str, action: &str, resource: &str) -> Self {
        Self::new(actor, action, resource, AuditOutcome::Failure)
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }
}

/// Append-only sink backed by the store
#[derive(Clone)]
pub struct AuditSink {
    store: Store,
}

impl AuditSink {
    pub fn new(store: Store) -> Self {
        Self { store }
    }

    /// Append one event. Never propagates failure; a sink error must not
    /// fail the operation being audited.
    pub async fn record(&self, event: AuditEvent) {
        if let Err(e) = self.store.insert_audit_event(&event).await {
            tracing::warn!(
                action = %event.action,
                resource = %event.resource,
                "audit event dropped: {}",
                e
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audit_outcome_round_trip() {
        assert_eq!("success".parse::<AuditOutcome>().unwrap(), AuditOutcome::Success);
        assert_eq!("failure".parse::<AuditOutcome>().unwrap(), AuditOutcome::Failure);
        assert!("maybe".parse::<AuditOutcome>().is_err());
        assert_eq!(AuditOutcome::Success.as_str(), "success");
    }

    #[test]
    fn test_event_builders() {
        let event = AuditEvent::success("agent:coordinator", "credential.issued", "step:detect");
        assert_eq!(event.result, AuditOutcome::Success);
        assert_eq!(event.actor, "agent:coordinator");
        assert!(event.details.as_object().unwrap().is_empty());

        let event = AuditEvent::failure("agent:coordinator", "step.failed", "step:verify")
            .with_details(serde_json::json!({"error": "timeout"}));
        assert_eq!(event.result, AuditOutcome::Failure);
        assert_eq!(event.details["error"], "timeout");
    }

    #[test]
    fn test_event_serialization() {
        let event = AuditEvent::success("u1", "consent.granted", "consent:abc");
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"success\""));
        assert!(json.contains("consent.granted"));
    }
}
