//! Wire types shared with the Dispatch server

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Incident submitted with a workflow run
#[derive(Debug, Clone, Serialize)]
pub struct Incident {
    pub id: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Workflow submission body
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowRequest {
    pub user_id: String,
    pub target_incident: Incident,
    pub consent_granted: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub requested_actions: Vec<String>,
}

/// Per-step communication record in a workflow result
#[derive(Debug, Clone, Deserialize)]
pub struct AgentCommunication {
    pub from: String,
    pub to: String,
    pub action: String,
    pub data_digest: String,
    pub credential_ref: String,
    pub timestamp: DateTime<Utc>,
}

/// Consent decision recorded during a run
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentCheck {
    pub step: String,
    pub required: bool,
    pub granted: bool,
    pub consent_id: Option<Uuid>,
}

/// Workflow result returned by the server
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowResult {
    pub workflow_id: Uuid,
    pub status: String,
    pub agent_results: serde_json::Map<String, Value>,
    pub communications: Vec<AgentCommunication>,
    pub consent_validations: Vec<ConsentCheck>,
    pub execution_time_ms: i64,
}

/// Consent request body
#[derive(Debug, Clone, Serialize)]
pub struct ConsentRequest {
    pub user_id: String,
    pub delegatee_agent: String,
    pub requested_scopes: Vec<String>,
    pub purpose: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_in_secs: Option<i64>,
}

/// Consent grant returned by the server
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentGrant {
    pub consent_id: Uuid,
    pub granted: bool,
    pub granted_scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    pub delegated_credential: Option<String>,
}

/// Revocation request body
#[derive(Debug, Clone, Serialize)]
pub struct RevokeRequest {
    pub requester_id: String,
}

/// Revocation result
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeResult {
    pub revoked: bool,
}

/// Step transition streamed over the event socket
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowEvent {
    WorkflowStarted {
        workflow_id: Uuid,
        user_id: String,
    },
    StepStarted {
        workflow_id: Uuid,
        step: String,
    },
    StepCompleted {
        workflow_id: Uuid,
        step: String,
    },
    StepFailed {
        workflow_id: Uuid,
        step: String,
        error: String,
    },
    StepSkipped {
        workflow_id: Uuid,
        step: String,
        reason: String,
    },
    WorkflowFinished {
        workflow_id: Uuid,
        status: String,
    },
}

impl WorkflowEvent {
    /// One-line rendering for the watch command
    pub fn describe(&self) -> String {
        match self {
            WorkflowEvent::WorkflowStarted { workflow_id, user_id } => {
                format!("{} started for {}", workflow_id, user_id)
            }
            WorkflowEvent::StepStarted { workflow_id, step } => {
                format!("{} {} running", workflow_id, step)
            }
            WorkflowEvent::StepCompleted { workflow_id, step } => {
                format!("{} {} completed", workflow_id, step)
            }
            WorkflowEvent::StepFailed { workflow_id, step, error } => {
                format!("{} {} failed: {}", workflow_id, step, error)
            }
            WorkflowEvent::StepSkipped { workflow_id, step, reason } => {
                format!("{} {} skipped: {}", workflow_id, step, reason)
            }
            WorkflowEvent::WorkflowFinished { workflow_id, status } => {
                format!("{} finished: {}", workflow_id, status)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workflow_request_serialization() {
        let req = WorkflowRequest {
            user_id: "user-1".to_string(),
            target_incident: Incident {
                id: "inc-1".to_string(),
                summary: "gas leak".to_string(),
                location: None,
            },
            consent_granted: true,
            requested_actions: Vec::new(),
        };
        let json = serde_json::to_string(&req).unwrap();
        assert!(json.contains("inc-1"));
        assert!(!json.contains("requested_actions"));
        assert!(!json.contains("location"));
    }

    #[test]
    fn test_workflow_result_deserialization() {
        let json = r#"{
            "workflow_id": "8d7e4e3a-0001-4c5b-9a64-25a9e80012ab",
            "status": "partial",
            "agent_results": {"detect": {"ok": true}},
            "communications": [],
            "consent_validations": [],
            "execution_time_ms": 42
        }"#;
        let result: WorkflowResult = serde_json::from_str(json).unwrap();
        assert_eq!(result.status, "partial");
        assert_eq!(result.execution_time_ms, 42);
        assert!(result.agent_results.contains_key("detect"));
    }

    #[test]
    fn test_event_deserialization_and_describe() {
        let json = r#"{"type": "step_failed", "workflow_id": "8d7e4e3a-0001-4c5b-9a64-25a9e80012ab", "step": "verify", "error": "timeout"}"#;
        let event: WorkflowEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(event, WorkflowEvent::StepFailed { .. }));
        assert!(event.describe().contains("verify failed: timeout"));
    }

    #[test]
    fn test_consent_grant_deserialization() {
        let json = r#"{
            "consent_id": "8d7e4e3a-0001-4c5b-9a64-25a9e80012ab",
            "granted": true,
            "granted_scopes": ["calendar.write"],
            "expires_at": "2026-01-10T00:00:00Z",
            "delegated_credential": "a.b.c"
        }"#;
        let grant: ConsentGrant = serde_json::from_str(json).unwrap();
        assert!(grant.granted);
        assert_eq!(grant.delegated_credential.as_deref(), Some("a.b.c"));
    }
}
