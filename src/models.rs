//! Principals, incidents, and API request/response types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Whether a principal is a person or an automated worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrincipalKind {
    Human,
    Agent,
}

impl PrincipalKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrincipalKind::Human => "human",
            PrincipalKind::Agent => "agent",
        }
    }
}

impl std::str::FromStr for PrincipalKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "human" => Ok(PrincipalKind::Human),
            "agent" => Ok(PrincipalKind::Agent),
            _ => Err(format!("Invalid principal kind: {}", s)),
        }
    }
}

/// Closed set of agent roles in the response pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentType {
    Detection,
    Verification,
    Scheduling,
    Notification,
    Coordinator,
}

impl AgentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentType::Detection => "detection",
            AgentType::Verification => "verification",
            AgentType::Scheduling => "scheduling",
            AgentType::Notification => "notification",
            AgentType::Coordinator => "coordinator",
        }
    }
}

impl std::str::FromStr for AgentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "detection" => Ok(AgentType::Detection),
            "verification" => Ok(AgentType::Verification),
            "scheduling" => Ok(AgentType::Scheduling),
            "notification" => Ok(AgentType::Notification),
            "coordinator" => Ok(AgentType::Coordinator),
            _ => Err(format!("Invalid agent type: {}", s)),
        }
    }
}

/// An identity that credentials can be issued to or on behalf of
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Principal {
    pub id: String,
    pub kind: PrincipalKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,
}

impl Principal {
    pub fn human(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: PrincipalKind::Human,
            agent_type: None,
        }
    }

    pub fn agent(id: impl Into<String>, agent_type: AgentType) -> Self {
        Self {
            id: id.into(),
            kind: PrincipalKind::Agent,
            agent_type: Some(agent_type),
        }
    }

    /// Agent principal from a bare id, inferring the type from the
    /// `agent:<type>` naming convention when it matches
    pub fn agent_named(id: impl Into<String>) -> Self {
        let id = id.into();
        let agent_type = id.strip_prefix("agent:").and_then(|t| t.parse().ok());
        Self {
            id,
            kind: PrincipalKind::Agent,
            agent_type,
        }
    }

    pub fn is_agent(&self) -> bool {
        self.kind == PrincipalKind::Agent
    }
}

/// The incident a workflow run responds to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Incident {
    pub id: String,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reported_at: Option<DateTime<Utc>>,
}

/// Request to run the response pipeline for one incident
#[derive(Debug, Clone, Deserialize)]
pub struct WorkflowRequest {
    pub workflow_id: Option<Uuid>,
    pub user_id: String,
    pub target_incident: Option<Incident>,
    #[serde(default)]
    pub consent_granted: bool,
    #[serde(default)]
    pub requested_actions: Vec<String>,
}

/// Request to grant consent for a delegatee agent
#[derive(Debug, Clone, Deserialize)]
pub struct ConsentRequestBody {
    pub user_id: String,
    pub delegator_agent: Option<String>,
    pub delegatee_agent: String,
    pub requested_scopes: Vec<String>,
    pub purpose: String,
    pub expires_in_secs: Option<i64>,
}

/// Response to a consent request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConsentResponse {
    pub consent_id: Uuid,
    pub granted: bool,
    pub granted_scopes: Vec<String>,
    pub expires_at: DateTime<Utc>,
    /// Absent when the policy granted no scopes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delegated_credential: Option<String>,
}

/// Request body for consent revocation
#[derive(Debug, Clone, Deserialize)]
pub struct RevokeRequestBody {
    pub requester_id: String,
}

/// Response to a consent revocation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokeResponse {
    pub revoked: bool,
}
