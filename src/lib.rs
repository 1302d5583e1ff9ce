//! Dispatch server - delegated-authority coordination for emergency response agents

pub mod agents;
pub mod api;
pub mod audit;
pub mod auth;
pub mod error;
pub mod models;
pub mod rate_limit;
pub mod store;
pub mod workflow;
pub mod ws;

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::agents::AgentGateway;
use crate::audit::AuditSink;
use crate::auth::consent::{ConsentManager, ConsentPolicy};
use crate::auth::delegation::DelegationValidator;
use crate::auth::identity::IdentityClient;
use crate::auth::token::TokenService;
use crate::rate_limit::RateLimiter;
use crate::store::Store;
use crate::workflow::orchestrator::WorkflowOrchestrator;

/// Embedded migrations, shared by the server binary and tests
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub consent: ConsentManager,
    pub orchestrator: WorkflowOrchestrator,
    pub limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        pool: SqlitePool,
        identity: Arc<IdentityClient>,
        gateway: Arc<dyn AgentGateway>,
    ) -> Arc<Self> {
        let store = Store::new(pool);
        let tokens = TokenService::new(identity);
        let audit = AuditSink::new(store.clone());
        let consent = ConsentManager::new(
            store.clone(),
            tokens.clone(),
            audit.clone(),
            ConsentPolicy::default(),
        );
        let delegation = DelegationValidator::new(tokens.clone());
        let orchestrator = WorkflowOrchestrator::new(
            tokens,
            consent.clone(),
            delegation,
            audit,
            gateway,
            store.clone(),
        );
        Arc::new(Self {
            store,
            consent,
            orchestrator,
            limiter: RateLimiter::default(),
        })
    }
}
