//! Dispatch server - delegated-authority coordination for emergency response agents

mod agents;
mod api;
mod audit;
mod auth;
mod error;
mod models;
mod rate_limit;
mod store;
mod workflow;
mod ws;

use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::agents::{AgentGateway, HttpAgentGateway};
use crate::audit::AuditSink;
use crate::auth::consent::{ConsentManager, ConsentPolicy};
use crate::auth::delegation::DelegationValidator;
use crate::auth::identity::IdentityClient;
use crate::auth::token::TokenService;
use crate::rate_limit::RateLimiter;
use crate::store::Store;
use crate::workflow::orchestrator::WorkflowOrchestrator;

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// Application state shared across handlers
pub struct AppState {
    pub store: Store,
    pub consent: ConsentManager,
    pub orchestrator: WorkflowOrchestrator,
    pub limiter: RateLimiter,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dispatch=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Database connection
    let database_url =
        std::env::var("DATABASE_URL").unwrap_or_else(|_| "sqlite:dispatch.db".into());

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect(&database_url)
        .await?;

    // Run migrations
    MIGRATOR.run(&pool).await?;

    // Signing identity, injected into the token service. Unsigned demo mode
    // requires an explicit opt-in and is never the default.
    let issuer = std::env::var("DISPATCH_ISSUER").unwrap_or_else(|_| "dispatch".into());
    let identity = match std::env::var("DISPATCH_SIGNING_KEY") {
        Ok(key) if !key.is_empty() => IdentityClient::new(issuer, key.into_bytes())?,
        _ if std::env::var("DISPATCH_INSECURE_TOKENS").as_deref() == Ok("1") => {
            IdentityClient::insecure(issuer)
        }
        _ => anyhow::bail!(
            "DISPATCH_SIGNING_KEY must be set (or DISPATCH_INSECURE_TOKENS=1 for demo mode)"
        ),
    };

    let gateway_url =
        std::env::var("AGENT_GATEWAY_URL").unwrap_or_else(|_| "http://localhost:8080".into());
    let gateway: Arc<dyn AgentGateway> = Arc::new(HttpAgentGateway::new(gateway_url));

    let identity = Arc::new(identity);
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
    let state = Arc::new(AppState {
        store,
        consent,
        orchestrator,
        limiter: RateLimiter::default(),
    });

    // Build router
    let app = api::router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    // Start server
    let addr = std::env::var("DISPATCH_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".into());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;

    Ok(())
}
