//! Command-line runner for Strata actions.
//!
//! Wires the environment configuration, the Postgres run store, the
//! directory action source, and the filesystem output writer, then executes
//! one command:
//!
//! - `run`: read an event as JSON from stdin and execute matching actions
//! - `link-commit`: attach a commit id to a recorded run
//! - `get-run` / `get-task`: print one recorded outcome
//! - `list-runs` / `list-tasks`: print recorded outcomes, one JSON per line

use std::io::Read;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use strata_actions::config::ActionsConfig;
use strata_actions::output::FsOutputWriter;
use strata_actions::source::DirectorySource;
use strata_actions::{ActionsError, ActionsService, Deps};
use strata_core::event::Event;
use strata_db::PgRunStore;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "strata-runner", about = "Execute and inspect Strata action runs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Execute the actions matching an event read from stdin.
    Run,
    /// Attach the resulting commit to a run.
    LinkCommit {
        repository_id: String,
        run_id: String,
        commit_id: String,
    },
    /// Print a run result.
    GetRun { repository_id: String, run_id: String },
    /// Print a single hook result.
    GetTask {
        repository_id: String,
        run_id: String,
        hook_run_id: String,
    },
    /// List run results, optionally for one branch.
    ListRuns {
        repository_id: String,
        #[arg(long)]
        branch: Option<String>,
        /// Resume after this run id.
        #[arg(long, default_value = "")]
        after: String,
    },
    /// List the hook results of a run.
    ListTasks {
        repository_id: String,
        run_id: String,
        #[arg(long, default_value = "")]
        after: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "strata_runner=debug,strata_actions=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    // --- Configuration ---
    let config = ActionsConfig::from_env().context("Failed to load configuration")?;
    tracing::info!(
        actions_dir = %config.actions_dir.display(),
        output_dir = %config.output_dir.display(),
        "Loaded actions configuration"
    );

    // --- Database ---
    let pool = strata_db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    strata_db::health_check(&pool)
        .await
        .context("Database health check failed")?;
    strata_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database ready");

    let store = PgRunStore::new(pool).with_operation_timeout(config.db_timeout);
    let service = ActionsService::new(Arc::new(store)).with_fetch_size(config.fetch_size);

    // --- Cancellation ---
    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_signal(cancel.clone()));

    match cli.command {
        Command::Run => {
            let mut input = String::new();
            std::io::stdin()
                .read_to_string(&mut input)
                .context("Failed to read event from stdin")?;
            let event: Event = serde_json::from_str(&input).context("Invalid event JSON")?;

            let deps = Deps {
                source: Some(Arc::new(DirectorySource::new(&config.actions_dir))),
                output: Arc::new(FsOutputWriter::new(&config.output_dir)),
            };
            let (run_id, result) = service.run(&event, &deps, &cancel).await;
            println!("{run_id}");
            result.with_context(|| format!("Run {run_id} failed"))?;
        }
        Command::LinkCommit {
            repository_id,
            run_id,
            commit_id,
        } => {
            service
                .update_commit_id(&repository_id, &run_id, &commit_id, &cancel)
                .await
                .map_err(|e| not_found_context(e, &run_id))?;
        }
        Command::GetRun {
            repository_id,
            run_id,
        } => {
            let run = service
                .get_run_result(&repository_id, &run_id, &cancel)
                .await
                .map_err(|e| not_found_context(e, &run_id))?;
            println!("{}", serde_json::to_string_pretty(&run)?);
        }
        Command::GetTask {
            repository_id,
            run_id,
            hook_run_id,
        } => {
            let task = service
                .get_task_result(&repository_id, &run_id, &hook_run_id, &cancel)
                .await
                .map_err(|e| not_found_context(e, &hook_run_id))?;
            println!("{}", serde_json::to_string_pretty(&task)?);
        }
        Command::ListRuns {
            repository_id,
            branch,
            after,
        } => {
            let mut runs = service.list_runs(&repository_id, branch.as_deref(), &after, &cancel);
            while runs.next().await {
                if let Some(run) = runs.value() {
                    println!("{}", serde_json::to_string(run)?);
                }
            }
            let failed = runs.err().map(|e| e.to_string());
            runs.close();
            if let Some(e) = failed {
                anyhow::bail!("Failed to list runs: {e}");
            }
        }
        Command::ListTasks {
            repository_id,
            run_id,
            after,
        } => {
            let mut tasks = service.list_run_tasks(&repository_id, &run_id, &after, &cancel);
            while tasks.next().await {
                if let Some(task) = tasks.value() {
                    println!("{}", serde_json::to_string(task)?);
                }
            }
            let failed = tasks.err().map(|e| e.to_string());
            tasks.close();
            if let Some(e) = failed {
                anyhow::bail!("Failed to list tasks: {e}");
            }
        }
    }

    Ok(())
}

fn not_found_context(err: ActionsError, id: &str) -> anyhow::Error {
    if err.is_not_found() {
        anyhow::anyhow!("'{id}' not found")
    } else {
        anyhow::Error::new(err)
    }
}

/// Cancel in-flight work on SIGINT or SIGTERM.
async fn cancel_on_signal(cancel: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => tracing::info!("Received SIGINT (Ctrl-C), cancelling"),
        () = terminate => tracing::info!("Received SIGTERM, cancelling"),
    }
    cancel.cancel();
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_list_runs_flags() {
        let cli = Cli::try_parse_from([
            "strata-runner",
            "list-runs",
            "repo",
            "--branch",
            "main",
            "--after",
            "r1",
        ])
        .unwrap();
        match cli.command {
            Command::ListRuns {
                repository_id,
                branch,
                after,
            } => {
                assert_eq!(repository_id, "repo");
                assert_eq!(branch.as_deref(), Some("main"));
                assert_eq!(after, "r1");
            }
            other => panic!("unexpected command {other:?}"),
        }
    }
}
