use clap::{Parser, Subcommand};
use tracing::{error, info};

use search_reindex::{init_tracing, Dependencies, ReindexAppError, Settings};
use search_reindex_pipeline::service::PublishHandle;
use search_reindex_pipeline::ReindexError;

#[derive(Parser)]
#[command(name = "search-reindex")]
#[command(about = "Full reindex pipeline for the multi-tenant search index", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Consume the range-index and records topics until Ctrl-C.
    Consume,
    /// Start a full reindex of a tenant and its consortium members.
    FullReindex {
        #[arg(long)]
        tenant: String,
    },
    /// Re-sync one consortium member into its central tenant.
    Resync {
        /// Central tenant of the consortium.
        #[arg(long)]
        tenant: String,
        #[arg(long)]
        member: String,
    },
    /// Publish every failed merge range of a tenant again.
    RetryFailed {
        #[arg(long)]
        tenant: String,
    },
    /// Run a failed staging migration again and start the upload phase.
    RetryMigration {
        #[arg(long)]
        tenant: String,
    },
    /// Print the reindex status of a tenant as JSON.
    Status {
        #[arg(long)]
        tenant: String,
    },
}

#[tokio::main]
async fn main() -> Result<(), ReindexAppError> {
    let cli = Cli::parse();
    let settings = Settings::from_env()?;

    init_tracing();

    let deps = Dependencies::new(settings).await?;

    match cli.command {
        Command::Consume => {
            let runner = deps.runner()?;
            runner.run().await?;
        }
        Command::FullReindex { tenant } => {
            let handle = deps.controller.init_full_reindex(&tenant).await?;
            let published = await_publish(handle).await?;
            info!(tenant_id = %tenant, published = published, "Full reindex dispatched");
        }
        Command::Resync { tenant, member } => {
            let handle = deps.controller.init_tenant_resync(&tenant, &member).await?;
            let published = await_publish(handle).await?;
            info!(tenant_id = %tenant, member_tenant_id = %member, published = published, "Tenant re-sync dispatched");
        }
        Command::RetryFailed { tenant } => {
            let republished = deps.controller.retry_failed_merge_ranges(&tenant).await?;
            info!(tenant_id = %tenant, republished = republished, "Failed merge ranges republished");
        }
        Command::RetryMigration { tenant } => {
            deps.controller.retry_migration(&tenant).await?;
            info!(tenant_id = %tenant, "Staging migration retried, upload ranges sent");
        }
        Command::Status { tenant } => {
            let statuses = deps.controller.status(&tenant).await?;
            let json = serde_json::to_string_pretty(&statuses)
                .map_err(|e| ReindexAppError::config(format!("Failed to encode status: {}", e)))?;
            println!("{}", json);
        }
    }

    Ok(())
}

/// Wait for the background publishing of merge ranges.
async fn await_publish(handle: PublishHandle) -> Result<usize, ReindexAppError> {
    match handle.await {
        Ok(result) => Ok(result?),
        Err(e) => {
            error!(error = %e, "Publish task panicked or was cancelled");
            Err(ReindexError::channel(format!("Publish task failed: {}", e)).into())
        }
    }
}
