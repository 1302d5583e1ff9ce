//! Workflow execution state and status aggregation

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::step::{StepResult, StepStatus, WorkflowStatus};

/// Record of one consent decision made during a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentCheck {
    pub step: String,
    pub required: bool,
    pub granted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub consent_id: Option<Uuid>,
}

/// Audit trace of one agent interaction.
///
/// The full credential is never persisted; `credential_ref` is a truncated
/// jti and `data_digest` a truncated SHA-256 of the request payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCommunication {
    pub from: String,
    pub to: String,
    pub action: String,
    pub data_digest: String,
    pub credential_ref: String,
    pub timestamp: DateTime<Utc>,
}

impl AgentCommunication {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        action: impl Into<String>,
        payload: &Value,
        credential_ref: impl Into<String>,
    ) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            action: action.into(),
            data_digest: payload_digest(payload),
            credential_ref: credential_ref.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Truncated hex SHA-256 of a JSON payload
pub fn payload_digest(payload: &Value) -> String {
    let bytes = serde_json::to_vec(payload).unwrap_or_default();
    let digest = Sha256::digest(&bytes);
    let hex: String = digest.iter().map(|b| format!("{:02x}", b)).collect();
    hex.chars().take(16).collect()
}

/// One end-to-end run of the response pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowExecution {
    pub id: Uuid,
    pub user_id: String,
    pub status: WorkflowStatus,
    pub steps: Vec<StepResult>,
    pub communications: Vec<AgentCommunication>,
    pub consent_validations: Vec<ConsentCheck>,
    pub started_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub execution_time_ms: Option<i64>,
}

impl WorkflowExecution {
    pub fn new(id: Uuid, user_id: impl Into<String>) -> Self {
        Self {
            id,
            user_id: user_id.into(),
            status: WorkflowStatus::Pending,
            steps: Vec::new(),
            communications: Vec::new(),
            consent_validations: Vec::new(),
            started_at: Utc::now(),
            execution_time_ms: None,
        }
    }

    /// Aggregate step outcomes into the terminal status and stamp the
    /// execution time.
    pub fn finish(&mut self) -> WorkflowStatus {
        let outcomes: Vec<StepStatus> = self.steps.iter().map(|s| s.status).collect();
        self.status = aggregate_status(&outcomes);
        self.execution_time_ms =
            Some((Utc::now() - self.started_at).num_milliseconds().max(0));
        self.status
    }

    /// Per-step outputs keyed by step name
    pub fn agent_results(&self) -> serde_json::Map<String, Value> {
        self.steps
            .iter()
            .filter_map(|s| s.output.clone().map(|o| (s.step_name.clone(), o)))
            .collect()
    }
}

/// Fold step outcomes into a workflow status.
///
/// Skipped steps never demote a run that did real work: a run is `completed`
/// when every non-skipped step completed, `failed` when every non-skipped
/// step failed, and `partial` otherwise — including the all-skipped run,
/// which performed no work but did not abort.
pub fn aggregate_status(outcomes: &[StepStatus]) -> WorkflowStatus {
    let non_skipped: Vec<StepStatus> = outcomes
        .iter()
        .copied()
        .filter(|s| *s != StepStatus::Skipped)
        .collect();

    if non_skipped.is_empty() {
        return WorkflowStatus::Partial;
    }
    if non_skipped.iter().all(|s| *s == StepStatus::Completed) {
        return WorkflowStatus::Completed;
    }
    if non_skipped.iter().all(|s| *s == StepStatus::Failed) {
        return WorkflowStatus::Failed;
    }
    WorkflowStatus::Partial
}

/// Workflow result returned at the API boundary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResponse {
    pub workflow_id: Uuid,
    pub status: WorkflowStatus,
    pub agent_results: serde_json::Map<String, Value>,
    pub communications: Vec<AgentCommunication>,
    pub consent_validations: Vec<ConsentCheck>,
    pub execution_time_ms: i64,
}

impl From<&WorkflowExecution> for WorkflowResponse {
    fn from(exec: &WorkflowExecution) -> Self {
        Self {
            workflow_id: exec.id,
            status: exec.status,
            agent_results: exec.agent_results(),
            communications: exec.communications.clone(),
            consent_validations: exec.consent_validations.clone(),
            execution_time_ms: exec.execution_time_ms.unwrap_or(0),
        }
    }
}
