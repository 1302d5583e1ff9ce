//! Database store for consents, workflow executions, and audit events

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::audit::AuditEvent;
use crate::auth::consent::{ConsentRecord, ConsentStatus};
use crate::auth::scope::ScopeSet;
use crate::error::{AppError, Result};
use crate::workflow::execution::WorkflowExecution;

/// Database store
#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
}

impl Store {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // Consent operations

    pub async fn insert_consent(&self, record: &ConsentRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO consent_records
                (id, user_id, delegator, delegatee_agent, scopes, purpose, granted_at, expires_at, status)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(&record.user_id)
        .bind(&record.delegator)
        .bind(&record.delegatee_agent)
        .bind(record.scopes.to_scope_string())
        .bind(&record.purpose)
        .bind(record.granted_at)
        .bind(record.expires_at)
        .bind(record.status.as_str())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_consent(&self, id: Uuid) -> Result<Option<ConsentRecord>> {
        let row = sqlx::query_as::<_, ConsentRow>(
            r#"
            SELECT id, user_id, delegator, delegatee_agent, scopes, purpose, granted_at, expires_at, status
            FROM consent_records
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    /// Conditionally move an active consent to revoked.
    ///
    /// Returns whether a row actually changed; the condition on `status`
    /// makes concurrent revokes race harmlessly and keeps transitions
    /// forward-only.
    pub async fn revoke_consent(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE consent_records SET status = 'revoked'
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Mark an active consent expired (lazy write-back on read)
    pub async fn expire_consent(&self, id: Uuid) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE consent_records SET status = 'expired'
            WHERE id = ? AND status = 'active'
            "#,
        )
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    // Workflow execution operations

    pub async fn insert_execution(&self, exec: &WorkflowExecution) -> Result<()> {
        let document = serde_json::to_string(exec)
            .map_err(|e| AppError::Internal(format!("Execution encoding failed: {}", e)))?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO workflow_executions
                (id, user_id, status, started_at, execution_time_ms, document)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(exec.id.to_string())
        .bind(&exec.user_id)
        .bind(exec.status.as_str())
        .bind(exec.started_at)
        .bind(exec.execution_time_ms)
        .bind(document)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn get_execution(&self, id: Uuid) -> Result<Option<WorkflowExecution>> {
        let row = sqlx::query_as::<_, ExecutionRow>(
            r#"
            SELECT document FROM workflow_executions WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            serde_json::from_str(&r.document)
                .map_err(|e| AppError::Internal(format!("Execution decoding failed: {}", e)))
        })
        .transpose()
    }

    // Audit operations

    pub async fn insert_audit_event(&self, event: &AuditEvent) -> Result<()> {
        let details = serde_json::to_string(&event.details)
            .map_err(|e| AppError::Internal(format!("Audit details encoding failed: {}", e)))?;

        sqlx::query(
            r#"
            INSERT INTO audit_events (id, actor, action, resource, result, details, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(event.id.to_string())
        .bind(&event.actor)
        .bind(&event.action)
        .bind(&event.resource)
        .bind(event.result.as_str())
        .bind(details)
        .bind(event.timestamp)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    /// Most recent audit events, newest first
    pub async fn recent_audit_events(&self, limit: i64) -> Result<Vec<AuditEvent>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, actor, action, resource, result, details, created_at
            FROM audit_events
            ORDER BY created_at DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }
}

// Internal row types for sqlx

#[derive(sqlx::FromRow)]
struct ConsentRow {
    id: String,
    user_id: String,
    delegator: String,
    delegatee_agent: String,
    scopes: String,
    purpose: String,
    granted_at: chrono::DateTime<Utc>,
    expires_at: chrono::DateTime<Utc>,
    status: String,
}

impl TryFrom<ConsentRow> for ConsentRecord {
    type Error = AppError;

    fn try_from(row: ConsentRow) -> Result<Self> {
        Ok(ConsentRecord {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            user_id: row.user_id,
            delegator: row.delegator,
            delegatee_agent: row.delegatee_agent,
            scopes: ScopeSet::from_scope_string(&row.scopes),
            purpose: row.purpose,
            granted_at: row.granted_at,
            expires_at: row.expires_at,
            status: row
                .status
                .parse::<ConsentStatus>()
                .map_err(|e| AppError::Internal(format!("Invalid consent status: {}", e)))?,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ExecutionRow {
    document: String,
}

#[derive(sqlx::FromRow)]
struct AuditRow {
    id: String,
    actor: String,
    action: String,
    resource: String,
    result: String,
    details: String,
    created_at: chrono::DateTime<Utc>,
}

impl TryFrom<AuditRow> for AuditEvent {
    type Error = AppError;

    fn try_from(row: AuditRow) -> Result<Self> {
        Ok(AuditEvent {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| AppError::Internal(format!("Invalid UUID: {}", e)))?,
            actor: row.actor,
            action: row.action,
            resource: row.resource,
            result: row
                .result
                .parse()
                .map_err(|e| AppError::Internal(format!("Invalid audit outcome: {}", e)))?,
            details: serde_json::from_str(&row.details)
                .map_err(|e| AppError::Internal(format!("Invalid audit details: {}", e)))?,
            timestamp: row.created_at,
        })
    }
}
