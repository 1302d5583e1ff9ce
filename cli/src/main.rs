//! Dispatch CLI client - submit workflows, manage consent, watch events

mod client;
mod messages;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use uuid::Uuid;

use crate::client::DispatchClient;
use crate::messages::{ConsentRequest, Incident, WorkflowRequest};

#[derive(Parser)]
#[command(name = "dispatch")]
#[command(about = "CLI client for the Dispatch coordination server")]
#[command(version)]
struct Cli {
    /// Server URL
    #[arg(short, long, default_value = "http://localhost:3000")]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the response pipeline for an incident
    Run {
        /// Incident identifier
        #[arg(long)]
        incident: String,

        /// One-line incident summary
        #[arg(long)]
        summary: String,

        /// Incident location
        #[arg(long)]
        location: Option<String>,

        /// User the workflow acts on behalf of
        #[arg(short, long)]
        user: String,

        /// Grant consent for the user-facing steps (schedule, notify)
        #[arg(long)]
        consent: bool,

        /// Restrict the run to these steps (default: full pipeline)
        #[arg(long)]
        action: Vec<String>,
    },

    /// Fetch a stored workflow execution
    Status {
        /// Workflow id
        id: Uuid,
    },

    /// Grant consent for a delegatee agent
    Consent {
        /// User granting consent
        #[arg(short, long)]
        user: String,

        /// Delegatee agent id (e.g. agent:scheduling)
        #[arg(short, long)]
        delegatee: String,

        /// Scopes to grant
        #[arg(long)]
        scope: Vec<String>,

        /// Purpose shown in the consent record
        #[arg(short, long)]
        purpose: String,

        /// Consent lifetime in seconds
        #[arg(long)]
        ttl: Option<i64>,
    },

    /// Revoke a consent record
    Revoke {
        /// Consent id
        id: Uuid,

        /// Principal requesting the revocation
        #[arg(short, long)]
        requester: String,
    },

    /// Stream workflow events from the server
    Watch,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "dispatch_cli=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let client = DispatchClient::new(cli.server);

    match cli.command {
        Commands::Run {
            incident,
            summary,
            location,
            user,
            consent,
            action,
        } => {
            let result = client
                .run_workflow(&WorkflowRequest {
                    user_id: user,
                    target_incident: Incident {
                        id: incident,
                        summary,
                        location,
                    },
                    consent_granted: consent,
                    requested_actions: action,
                })
                .await?;

            println!("workflow {} -> {}", result.workflow_id, result.status);
            for (step, output) in &result.agent_results {
                println!("  {}: {}", step, output);
            }
            for check in &result.consent_validations {
                println!(
                    "  consent [{}]: required={} granted={}",
                    check.step, check.required, check.granted
                );
            }
            println!("  took {}ms", result.execution_time_ms);
        }

        Commands::Status { id } => {
            let execution = client.get_workflow(id).await?;
            println!("{}", serde_json::to_string_pretty(&execution)?);
        }

        Commands::Consent {
            user,
            delegatee,
            scope,
            purpose,
            ttl,
        } => {
            let grant = client
                .grant_consent(&ConsentRequest {
                    user_id: user,
                    delegatee_agent: delegatee,
                    requested_scopes: scope,
                    purpose,
                    expires_in_secs: ttl,
                })
                .await?;

            println!("consent {} granted", grant.consent_id);
            println!("  scopes: {}", grant.granted_scopes.join(" "));
            println!("  expires: {}", grant.expires_at);
            match grant.delegated_credential {
                Some(credential) => println!("  credential: {}", credential),
                None => println!("  credential: none (no scopes granted)"),
            }
        }

        Commands::Revoke { id, requester } => {
            let result = client.revoke_consent(id, &requester).await?;
            println!("revoked: {}", result.revoked);
        }

        Commands::Watch => {
            let mut events = client.watch_events().await?;
            println!("watching for workflow events (ctrl-c to stop)");
            while let Some(event) = events.recv().await {
                println!("{}", event.describe());
            }
        }
    }

    Ok(())
}
