//! External collaborator agents
//!
//! The orchestrator talks to each specialist agent through the narrow
//! `AgentGateway` interface; agent domain logic lives elsewhere. The HTTP
//! implementation posts JSON to per-action endpoints with the step credential
//! as a bearer token, bounded by a per-call timeout.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{AppError, Result};
use crate::models::Incident;

/// Default bound on one agent call
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// Content verification request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifyRequest {
    pub content: String,
    pub rules: Vec<String>,
}

/// Calendar event to schedule
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub title: String,
    pub duration_minutes: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

/// Notification to deliver
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationRequest {
    pub channel: String,
    pub recipients: Vec<String>,
    pub message: String,
}

/// Narrow interface to the specialist agents.
///
/// Responses are opaque JSON; the orchestrator records them as step output
/// without interpreting agent domain logic.
#[async_trait]
pub trait AgentGateway: Send + Sync {
    async fn analyze_incident(&self, incident: &Incident, credential: &str) -> Result<Value>;
    async fn verify_content(&self, request: &VerifyRequest, credential: &str) -> Result<Value>;
    async fn schedule_event(&self, spec: &ScheduleSpec, credential: &str) -> Result<Value>;
    async fn send_notification(&self, request: &NotificationRequest, credential: &str)
        -> Result<Value>;
}

/// HTTP gateway to agent services
pub struct HttpAgentGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpAgentGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_timeout(base_url, DEFAULT_CALL_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            timeout,
        }
    }

    async fn post_json(&self, path: &str, payload: &Value, credential: &str) -> Result<Value> {
        let request = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(credential)
            .json(payload)
            .send();

        let response = tokio::time::timeout(self.timeout, request)
            .await
            .map_err(|_| AppError::ExternalService(format!("{} timed out", path)))?
            .map_err(|e| AppError::ExternalService(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(AppError::ExternalService(format!(
                "{} returned {} - {}",
                path, status, text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AppError::ExternalService(e.to_string()))
    }
}

#[async_trait]
impl AgentGateway for HttpAgentGateway {
    async fn analyze_incident(&self, incident: &Incident, credential: &str) -> Result<Value> {
        let payload = serde_json::json!({ "incident": incident });
        self.post_json("/analyze", &payload, credential).await
    }

    async fn verify_content(&self, request: &VerifyRequest, credential: &str) -> Result<Value> {
        let payload = serde_json::to_value(request)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        self.post_json("/verify", &payload, credential).await
    }

    async fn schedule_event(&self, spec: &ScheduleSpec, credential: &str) -> Result<Value> {
        let payload =
            serde_json::to_value(spec).map_err(|e| AppError::Internal(e.to_string()))?;
        self.post_json("/schedule", &payload, credential).await
    }

    async fn send_notification(
        &self,
        request: &NotificationRequest,
        credential: &str,
    ) -> Result<Value> {
        let payload = serde_json::to_value(request)
            .map_err(|e| AppError::Internal(e.to_string()))?;
        self.post_json("/notify", &payload, credential).await
    }
}
