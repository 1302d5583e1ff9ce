//! HTTP API for workflows and consent
//!
//! Workflow runs that execute return 200 with the outcome in `status`;
//! only request-shape and rate-limit problems surface as 4xx.

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use std::sync::Arc;
use uuid::Uuid;

use crate::auth::consent::ConsentParams;
use crate::error::{AppError, Result};
use crate::models::{
    AgentType, ConsentRequestBody, ConsentResponse, Principal, RevokeRequestBody, RevokeResponse,
    WorkflowRequest,
};
use crate::workflow::execution::{WorkflowExecution, WorkflowResponse};
use crate::workflow::orchestrator::COORDINATOR_ID;
use crate::AppState;

/// Build the application router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/workflows", post(run_workflow))
        .route("/workflows/:id", get(get_workflow))
        .route("/consents", post(request_consent))
        .route("/consents/:id/revoke", post(revoke_consent))
        .route("/ws", get(crate::ws::handler))
        .with_state(state)
}

async fn health() -> &'static str {
    "ok"
}

async fn run_workflow(
    State(state): State<Arc<AppState>>,
    Json(request): Json<WorkflowRequest>,
) -> Result<Json<WorkflowResponse>> {
    if !state.limiter.check(&request.user_id) {
        return Err(AppError::RateLimited(request.user_id));
    }
    let response = state.orchestrator.run(request).await?;
    Ok(Json(response))
}

async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<WorkflowExecution>> {
    let execution = state.orchestrator.get_execution(id).await?;
    Ok(Json(execution))
}

async fn request_consent(
    State(state): State<Arc<AppState>>,
    Json(body): Json<ConsentRequestBody>,
) -> Result<Json<ConsentResponse>> {
    if !state.limiter.check(&body.user_id) {
        return Err(AppError::RateLimited(body.user_id));
    }

    let delegator = body
        .delegator_agent
        .map(Principal::agent_named)
        .unwrap_or_else(|| Principal::agent(COORDINATOR_ID, AgentType::Coordinator));

    let grant = state
        .consent
        .request_consent(ConsentParams {
            user_id: body.user_id,
            delegator,
            delegatee: Principal::agent_named(&body.delegatee_agent),
            requested_scopes: body.requested_scopes.into(),
            purpose: body.purpose,
            ttl_secs: body.expires_in_secs,
        })
        .await?;

    Ok(Json(ConsentResponse {
        consent_id: grant.record.id,
        granted: true,
        granted_scopes: grant.record.scopes.to_vec(),
        expires_at: grant.record.expires_at,
        delegated_credential: grant.credential.map(|c| c.token),
    }))
}

async fn revoke_consent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(body): Json<RevokeRequestBody>,
) -> Result<Json<RevokeResponse>> {
    let revoked = state.consent.revoke(id, &body.requester_id).await?;
    Ok(Json(RevokeResponse { revoked }))
}
