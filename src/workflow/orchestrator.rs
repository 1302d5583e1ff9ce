//! Workflow orchestration
//!
//! Runs the fixed detect/verify/schedule/notify pipeline for one incident.
//! Each step gets its own scoped credential — direct for the analysis steps,
//! consent-backed delegation for the user-facing ones — which is validated
//! and scope-checked before the agent is invoked. Steps are best effort: a
//! failure never aborts the remaining steps.
//!
//! Step transitions are published on a broadcast bus; external streaming is
//! an optional subscriber and the orchestrator works with zero receivers.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::{broadcast, RwLock};
use uuid::Uuid;

use crate::agents::{AgentGateway, NotificationRequest, ScheduleSpec, VerifyRequest};
use crate::audit::{AuditEvent, AuditSink};
use crate::auth::consent::{ConsentManager, ConsentParams};
use crate::auth::delegation::DelegationValidator;
use crate::auth::token::{self, AccessCredential, TokenService};
use crate::error::{AppError, Result};
use crate::models::{AgentType, Incident, Principal, WorkflowRequest};
use crate::store::Store;
use crate::workflow::execution::{
    AgentCommunication, ConsentCheck, WorkflowExecution, WorkflowResponse,
};
use crate::workflow::step::{StepKind, StepResult, WorkflowStatus};

/// Principal id of the orchestrator itself
pub const COORDINATOR_ID: &str = "agent:coordinator";

/// Content rules applied by the verification agent
const VERIFY_RULES: [&str; 2] = ["no_personal_data", "approved_terminology"];

/// Step transitions published on the internal event bus
#[derive(Debug, Clone, Serialize)]
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
        status: WorkflowStatus,
    },
}

/// Outputs carried forward between steps within one run
struct StepContext {
    incident: Incident,
    analysis: Option<Value>,
    verification: Option<Value>,
}

impl StepContext {
    fn new(incident: Incident) -> Self {
        Self {
            incident,
            analysis: None,
            verification: None,
        }
    }

    fn absorb(&mut self, kind: StepKind, output: &Value) {
        match kind {
            StepKind::Detect => self.analysis = Some(output.clone()),
            StepKind::Verify => self.verification = Some(output.clone()),
            StepKind::Schedule | StepKind::Notify => {}
        }
    }

    fn verify_request(&self) -> VerifyRequest {
        let content = match &self.analysis {
            Some(analysis) => format!("{}: {}", self.incident.summary, analysis),
            None => self.incident.summary.clone(),
        };
        VerifyRequest {
            content,
            rules: VERIFY_RULES.iter().map(|r| r.to_string()).collect(),
        }
    }

    fn schedule_spec(&self) -> ScheduleSpec {
        ScheduleSpec {
            title: format!("Incident response: {}", self.incident.summary),
            duration_minutes: 30,
            location: self.incident.location.clone(),
        }
    }

    fn notification(&self, user_id: &str) -> NotificationRequest {
        let message = match &self.verification {
            Some(v) => format!("Verified update on {}: {}", self.incident.id, v),
            None => format!("Update on {}: {}", self.incident.id, self.incident.summary),
        };
        NotificationRequest {
            channel: "sms".to_string(),
            recipients: vec![user_id.to_string()],
            message,
        }
    }
}

/// Sequences per-agent steps under scoped, consent-gated credentials
pub struct WorkflowOrchestrator {
    tokens: TokenService,
    consent: ConsentManager,
    delegation: DelegationValidator,
    audit: AuditSink,
    gateway: Arc<dyn AgentGateway>,
    store: Store,
    /// Live runs, snapshotted after every step transition
    running: RwLock<HashMap<Uuid, WorkflowExecution>>,
    event_tx: broadcast::Sender<WorkflowEvent>,
}

impl WorkflowOrchestrator {
    pub fn new(
        tokens: TokenService,
        consent: ConsentManager,
        delegation: DelegationValidator,
        audit: AuditSink,
        gateway: Arc<dyn AgentGateway>,
        store: Store,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(256);
        Self {
            tokens,
            consent,
            delegation,
            audit,
            gateway,
            store,
            running: RwLock::new(HashMap::new()),
            event_tx,
        }
    }

    /// Subscribe to step transition events
    pub fn subscribe(&self) -> broadcast::Receiver<WorkflowEvent> {
        self.event_tx.subscribe()
    }

    /// Execute the pipeline for one workflow request.
    ///
    /// Only a malformed request (missing target incident) aborts before any
    /// step runs; per-step errors degrade the overall status instead.
    pub async fn run(&self, request: WorkflowRequest) -> Result<WorkflowResponse> {
        let incident = request.target_incident.clone().ok_or_else(|| {
            AppError::Validation("workflow request is missing a target incident".to_string())
        })?;
        let workflow_id = request.workflow_id.unwrap_or_else(Uuid::new_v4);
        let steps = selected_steps(&request.requested_actions);

        let mut exec = WorkflowExecution::new(workflow_id, &request.user_id);
        exec.status = WorkflowStatus::Running;
        self.store.insert_execution(&exec).await?;
        self.running.write().await.insert(workflow_id, exec.clone());

        self.audit
            .record(
                AuditEvent::success(COORDINATOR_ID, "workflow.started", &workflow_resource(workflow_id))
                    .with_details(serde_json::json!({
                        "user_id": request.user_id,
                        "incident": incident.id,
                        "steps": steps.iter().map(|k| k.as_str()).collect::<Vec<_>>(),
                    })),
            )
            .await;
        self.publish(WorkflowEvent::WorkflowStarted {
            workflow_id,
            user_id: request.user_id.clone(),
        });

        let mut context = StepContext::new(incident);
        for kind in steps {
            self.run_step(kind, &request, &mut context, &mut exec).await;
            self.running.write().await.insert(workflow_id, exec.clone());
        }

        let status = exec.finish();
        self.store.insert_execution(&exec).await?;
        self.running.write().await.remove(&workflow_id);

        self.audit
            .record(
                AuditEvent::success(COORDINATOR_ID, "workflow.finished", &workflow_resource(workflow_id))
                    .with_details(serde_json::json!({ "status": status.as_str() })),
            )
            .await;
        self.publish(WorkflowEvent::WorkflowFinished { workflow_id, status });

        Ok(WorkflowResponse::from(&exec))
    }

    /// Fetch a live or stored execution
    pub async fn get_execution(&self, id: Uuid) -> Result<WorkflowExecution> {
        if let Some(exec) = self.running.read().await.get(&id) {
            return Ok(exec.clone());
        }
        self.store
            .get_execution(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Workflow {} not found", id)))
    }

    async fn run_step(
        &self,
        kind: StepKind,
        request: &WorkflowRequest,
        context: &mut StepContext,
        exec: &mut WorkflowExecution,
    ) {
        let workflow_id = exec.id;
        let mut step = StepResult::new(kind);

        if kind.consent_gated() && !request.consent_granted {
            exec.consent_validations.push(ConsentCheck {
                step: kind.as_str().to_string(),
                required: true,
                granted: false,
                consent_id: None,
            });
            let _ = step.skip("consent not granted");
            exec.communications.push(AgentCommunication::new(
                COORDINATOR_ID,
                kind.agent_id(),
                kind.action(),
                &Value::Null,
                "-",
            ));
            self.audit
                .record(
                    AuditEvent::failure(COORDINATOR_ID, "step.skipped", &step_resource(workflow_id, kind))
                        .with_details(serde_json::json!({ "reason": "consent not granted" })),
                )
                .await;
            self.publish(WorkflowEvent::StepSkipped {
                workflow_id,
                step: kind.as_str().to_string(),
                reason: "consent not granted".to_string(),
            });
            exec.steps.push(step);
            return;
        }

        let _ = step.start();
        self.publish(WorkflowEvent::StepStarted {
            workflow_id,
            step: kind.as_str().to_string(),
        });

        let comms_before = exec.communications.len();
        match self.execute_step(kind, request, context, exec).await {
            Ok(output) => {
                context.absorb(kind, &output);
                let _ = step.complete(output);
                self.audit
                    .record(AuditEvent::success(
                        kind.agent_id(),
                        "step.completed",
                        &step_resource(workflow_id, kind),
                    ))
                    .await;
                self.publish(WorkflowEvent::StepCompleted {
                    workflow_id,
                    step: kind.as_str().to_string(),
                });
            }
            Err(e) => {
                tracing::warn!(workflow = %workflow_id, step = kind.as_str(), "step failed: {}", e);
                let _ = step.fail(e.to_string());
                self.audit
                    .record(
                        AuditEvent::failure(kind.agent_id(), "step.failed", &step_resource(workflow_id, kind))
                            .with_details(serde_json::json!({
                                "error": e.to_string(),
                                "kind": e.kind(),
                            })),
                    )
                    .await;
                self.publish(WorkflowEvent::StepFailed {
                    workflow_id,
                    step: kind.as_str().to_string(),
                    error: e.to_string(),
                });
            }
        }

        // Every step records exactly one communication, even when it failed
        // before the agent was reached.
        if exec.communications.len() == comms_before {
            exec.communications.push(AgentCommunication::new(
                COORDINATOR_ID,
                kind.agent_id(),
                kind.action(),
                &Value::Null,
                "-",
            ));
        }

        exec.steps.push(step);
    }

    /// Mint, validate, scope-check, and invoke. Any error here marks the
    /// step failed without touching the rest of the pipeline.
    async fn execute_step(
        &self,
        kind: StepKind,
        request: &WorkflowRequest,
        context: &StepContext,
        exec: &mut WorkflowExecution,
    ) -> Result<Value> {
        let credential = self.mint_step_credential(kind, request, exec).await?;

        let validated = self.delegation.validate_chain(&credential.token)?;

        // Well-formedness above; liveness here. A consent revoked after the
        // credential was minted must stop the step even though the
        // credential itself still parses.
        if let Some(consent_id) = validated.chain.consent_id() {
            if !self.consent.is_active(consent_id).await? {
                return Err(AppError::Authorization(format!(
                    "consent {} is no longer active",
                    consent_id
                )));
            }
        }

        if !TokenService::verify_scopes(&kind.required_scopes(), &validated.claims.scopes()) {
            return Err(AppError::Authorization(format!(
                "credential lacks required scopes for {}",
                kind.as_str()
            )));
        }

        let payload = self.step_payload(kind, request, context)?;
        exec.communications.push(AgentCommunication::new(
            COORDINATOR_ID,
            kind.agent_id(),
            kind.action(),
            &payload,
            credential.reference(),
        ));

        match kind {
            StepKind::Detect => {
                self.gateway
                    .analyze_incident(&context.incident, &credential.token)
                    .await
            }
            StepKind::Verify => {
                self.gateway
                    .verify_content(&context.verify_request(), &credential.token)
                    .await
            }
            StepKind::Schedule => {
                self.gateway
                    .schedule_event(&context.schedule_spec(), &credential.token)
                    .await
            }
            StepKind::Notify => {
                self.gateway
                    .send_notification(&context.notification(&request.user_id), &credential.token)
                    .await
            }
        }
    }

    async fn mint_step_credential(
        &self,
        kind: StepKind,
        request: &WorkflowRequest,
        exec: &mut WorkflowExecution,
    ) -> Result<AccessCredential> {
        if kind.consent_gated() {
            let grant = self
                .consent
                .request_consent(ConsentParams {
                    user_id: request.user_id.clone(),
                    delegator: Principal::agent(COORDINATOR_ID, AgentType::Coordinator),
                    delegatee: kind.principal(),
                    requested_scopes: kind.required_scopes(),
                    purpose: format!("{} for incident {}", kind.action(), incident_id(request)),
                    ttl_secs: None,
                })
                .await?;
            exec.consent_validations.push(ConsentCheck {
                step: kind.as_str().to_string(),
                required: true,
                granted: true,
                consent_id: Some(grant.record.id),
            });
            let credential = grant.credential.ok_or_else(|| {
                AppError::Authorization(format!(
                    "consent {} granted no scopes for {}",
                    grant.record.id,
                    kind.as_str()
                ))
            })?;
            self.audit
                .record(
                    AuditEvent::success(COORDINATOR_ID, "credential.issued", &step_resource(exec.id, kind))
                        .with_details(serde_json::json!({
                            "delegated": true,
                            "consent_id": grant.record.id,
                            "jti": credential.reference(),
                        })),
                )
                .await;
            Ok(credential)
        } else {
            let credential = self.tokens.issue(
                &kind.principal(),
                kind.audience(),
                &kind.required_scopes(),
                token::DIRECT_TTL_CEILING_SECS,
            )?;
            self.audit
                .record(
                    AuditEvent::success(COORDINATOR_ID, "credential.issued", &step_resource(exec.id, kind))
                        .with_details(serde_json::json!({
                            "delegated": false,
                            "jti": credential.reference(),
                        })),
                )
                .await;
            Ok(credential)
        }
    }

    fn step_payload(
        &self,
        kind: StepKind,
        request: &WorkflowRequest,
        context: &StepContext,
    ) -> Result<Value> {
        let payload = match kind {
            StepKind::Detect => serde_json::json!({ "incident": context.incident }),
            StepKind::Verify => serde_json::to_value(context.verify_request())
                .map_err(|e| AppError::Internal(e.to_string()))?,
            StepKind::Schedule => serde_json::to_value(context.schedule_spec())
                .map_err(|e| AppError::Internal(e.to_string()))?,
            StepKind::Notify => serde_json::to_value(context.notification(&request.user_id))
                .map_err(|e| AppError::Internal(e.to_string()))?,
        };
        Ok(payload)
    }

    fn publish(&self, event: WorkflowEvent) {
        // No receivers is fine; streaming is optional
        let _ = self.event_tx.send(event);
    }
}

/// The pipeline subset matching the requested actions; the full pipeline
/// when none are named. Unknown action names are ignored.
fn selected_steps(requested: &[String]) -> Vec<StepKind> {
    if requested.is_empty() {
        return StepKind::pipeline().to_vec();
    }
    StepKind::pipeline()
        .into_iter()
        .filter(|kind| {
            requested
                .iter()
                .any(|a| a == kind.as_str() || a == kind.action())
        })
        .collect()
}

fn workflow_resource(id: Uuid) -> String {
    format!("workflow:{}", id)
}

fn step_resource(id: Uuid, kind: StepKind) -> String {
    format!("workflow:{}/{}", id, kind.as_str())
}

fn incident_id(request: &WorkflowRequest) -> String {
    request
        .target_incident
        .as_ref()
        .map(|i| i.id.clone())
        .unwrap_or_default()
}
