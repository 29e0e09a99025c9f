mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "candor-cli")]
#[command(about = "Candor CLI - Run test suites, score integrity and generate verdicts", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a submission against its test cases and print the report
    Run {
        /// Submission JSON (id optional)
        #[arg(short, long)]
        submission: PathBuf,

        /// Test case array JSON
        #[arg(short, long)]
        tests: PathBuf,

        /// Per-test timeout in milliseconds (clamped to MAX_TIMEOUT_MS)
        #[arg(long)]
        timeout_ms: Option<u64>,

        /// Skip Docker and run with the local interpreter
        #[arg(long)]
        mock: bool,
    },

    /// Queue a submission for a worker
    Submit {
        #[arg(short, long)]
        submission: PathBuf,

        #[arg(short, long)]
        tests: PathBuf,

        #[arg(long)]
        timeout_ms: Option<u64>,
    },

    /// Request cancellation of a queued or running suite
    Cancel {
        #[arg(long)]
        id: Uuid,
    },

    /// Print the stored report for a submission
    Report {
        #[arg(long)]
        id: Uuid,
    },

    /// Score an integrity event log
    Integrity {
        /// Event array JSON
        #[arg(short, long)]
        events: PathBuf,
    },

    /// Generate a verdict for one candidate
    Verdict {
        /// Assessment input JSON
        #[arg(short, long)]
        facts: PathBuf,

        /// Add stored submission records and use the shared rationale cache
        #[arg(long)]
        stored: bool,
    },

    /// Show which sandbox backend would be used
    SandboxStatus {
        /// Report the local backend without contacting Docker
        #[arg(long)]
        local: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            submission,
            tests,
            timeout_ms,
            mock,
        } => {
            commands::run_suite(&submission, &tests, timeout_ms, mock).await?;
        }
        Commands::Submit {
            submission,
            tests,
            timeout_ms,
        } => {
            commands::submit(&submission, &tests, timeout_ms).await?;
        }
        Commands::Cancel { id } => {
            commands::cancel(id).await?;
        }
        Commands::Report { id } => {
            commands::show_report(id).await?;
        }
        Commands::Integrity { events } => {
            commands::integrity(&events)?;
        }
        Commands::Verdict { facts, stored } => {
            commands::verdict(&facts, stored).await?;
        }
        Commands::SandboxStatus { local } => {
            commands::show_sandbox_status(local).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sandbox_status_resolves_docker_by_default() {
        let cli = Cli::try_parse_from(["candor-cli", "sandbox-status"]).unwrap();
        assert!(matches!(cli.command, Commands::SandboxStatus { local: false }));

        let cli = Cli::try_parse_from(["candor-cli", "sandbox-status", "--local"]).unwrap();
        assert!(matches!(cli.command, Commands::SandboxStatus { local: true }));
    }
}
