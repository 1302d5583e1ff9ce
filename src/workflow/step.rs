//! Pipeline steps and their state machines
//!
//! The response pipeline is a fixed sequence: detect, verify, schedule,
//! notify. Schedule and notify act on the user's behalf and are gated on
//! consent; detect and verify run under the agents' own authority.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::auth::scope::{self, ScopeSet};
use crate::models::{AgentType, Principal};

/// One step of the fixed response pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Detect,
    Verify,
    Schedule,
    Notify,
}

impl StepKind {
    /// Fixed execution order
    pub fn pipeline() -> [StepKind; 4] {
        [StepKind::Detect, StepKind::Verify, StepKind::Schedule, StepKind::Notify]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Detect => "detect",
            StepKind::Verify => "verify",
            StepKind::Schedule => "schedule",
            StepKind::Notify => "notify",
        }
    }

    /// Identifier of the agent that executes this step
    pub fn agent_id(&self) -> &'static str {
        match self {
            StepKind::Detect => "agent:detection",
            StepKind::Verify => "agent:verification",
            StepKind::Schedule => "agent:scheduling",
            StepKind::Notify => "agent:notification",
        }
    }

    pub fn agent_type(&self) -> AgentType {
        match self {
            StepKind::Detect => AgentType::Detection,
            StepKind::Verify => AgentType::Verification,
            StepKind::Schedule => AgentType::Scheduling,
            StepKind::Notify => AgentType::Notification,
        }
    }

    pub fn principal(&self) -> Principal {
        Principal::agent(self.agent_id(), self.agent_type())
    }

    /// Audience the step credential is addressed to
    pub fn audience(&self) -> &'static str {
        match self {
            StepKind::Detect => "incident-analysis",
            StepKind::Verify => "content-verification",
            StepKind::Schedule => "calendar",
            StepKind::Notify => "notifications",
        }
    }

    /// Action name recorded in communications and audit events
    pub fn action(&self) -> &'static str {
        match self {
            StepKind::Detect => "analyze_incident",
            StepKind::Verify => "verify_content",
            StepKind::Schedule => "schedule_event",
            StepKind::Notify => "send_notification",
        }
    }

    pub fn required_scopes(&self) -> ScopeSet {
        match self {
            StepKind::Detect => [scope::INCIDENT_ANALYZE].into_iter().collect(),
            StepKind::Verify => [scope::CONTENT_VERIFY].into_iter().collect(),
            StepKind::Schedule => [scope::CALENDAR_WRITE].into_iter().collect(),
            StepKind::Notify => [scope::NOTIFY_SEND].into_iter().collect(),
        }
    }

    /// Whether this step acts on the user's behalf and requires consent
    pub fn consent_gated(&self) -> bool {
        matches!(self, StepKind::Schedule | StepKind::Notify)
    }
}

impl std::str::FromStr for StepKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detect" => Ok(StepKind::Detect),
            "verify" => Ok(StepKind::Verify),
            "schedule" => Ok(StepKind::Schedule),
            "notify" => Ok(StepKind::Notify),
            _ => Err(format!("Invalid step: {}", s)),
        }
    }
}

/// Status of one pipeline step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepStatus::Pending => "pending",
            StepStatus::Running => "running",
            StepStatus::Completed => "completed",
            StepStatus::Failed => "failed",
            StepStatus::Skipped => "skipped",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StepStatus::Completed | StepStatus::Failed | StepStatus::Skipped)
    }
}

impl std::str::FromStr for StepStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(StepStatus::Pending),
            "running" => Ok(StepStatus::Running),
            "completed" => Ok(StepStatus::Completed),
            "failed" => Ok(StepStatus::Failed),
            "skipped" => Ok(StepStatus::Skipped),
            _ => Err(format!("Invalid step status: {}", s)),
        }
    }
}

/// Overall status of a workflow run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Partial,
}

impl WorkflowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkflowStatus::Pending => "pending",
            WorkflowStatus::Running => "running",
            WorkflowStatus::Completed => "completed",
            WorkflowStatus::Failed => "failed",
            WorkflowStatus::Partial => "partial",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Partial
        )
    }
}

impl std::str::FromStr for WorkflowStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(WorkflowStatus::Pending),
            "running" => Ok(WorkflowStatus::Running),
            "completed" => Ok(WorkflowStatus::Completed),
            "failed" => Ok(WorkflowStatus::Failed),
            "partial" => Ok(WorkflowStatus::Partial),
            _ => Err(format!("Invalid workflow status: {}", s)),
        }
    }
}

/// Outcome of one pipeline step within a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub step_name: String,
    pub agent: String,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepResult {
    pub fn new(kind: StepKind) -> Self {
        Self {
            step_name: kind.as_str().to_string(),
            agent: kind.agent_id().to_string(),
            status: StepStatus::Pending,
            output: None,
            error: None,
        }
    }

    /// Move to running
    pub fn start(&mut self) -> Result<(), String> {
        if self.status != StepStatus::Pending {
            return Err(format!("Cannot start step with status: {}", self.status.as_str()));
        }
        self.status = StepStatus::Running;
        Ok(())
    }

    /// Terminal success with the agent's output
    pub fn complete(&mut self, output: Value) -> Result<(), String> {
        if self.status != StepStatus::Running {
            return Err(format!("Cannot complete step with status: {}", self.status.as_str()));
        }
        self.status = StepStatus::Completed;
        self.output = Some(output);
        Ok(())
    }

    /// Terminal failure
    pub fn fail(&mut self, error: impl Into<String>) -> Result<(), String> {
        if self.status != StepStatus::Running {
            return Err(format!("Cannot fail step with status: {}", self.status.as_str()));
        }
        self.status = StepStatus::Failed;
        self.error = Some(error.into());
        Ok(())
    }

    /// Skipped without running; the reason lands in `error`
    pub fn skip(&mut self, reason: impl Into<String>) -> Result<(), String> {
        if self.status != StepStatus::Pending {
            return Err(format!("Cannot skip step with status: {}", self.status.as_str()));
        }
        self.status = StepStatus::Skipped;
        self.error = Some(reason.into());
        Ok(())
    }
}
