//! Commands module
//!
//! Defines all CLI commands and their handlers.

mod task;

pub use task::SubmitArgs;

use anyhow::Result;
use clap::Subcommand;
use vacal_client::OrchestratorClient;

use crate::config::Config;

/// Top-level CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Submit a calibration task
    Submit {
        #[command(flatten)]
        args: SubmitArgs,

        /// Wait for the task to finish, streaming its log
        #[arg(long)]
        wait: bool,
    },
    /// Show task status
    Status {
        /// Task ID or unambiguous prefix
        id: String,
    },
    /// Poll a task until it finishes
    Wait {
        /// Task ID or unambiguous prefix
        id: String,

        /// Seconds between status checks
        #[arg(long, default_value_t = 3)]
        interval: u64,
    },
    /// List all tasks
    List,
    /// Show task log
    Logs {
        /// Task ID or unambiguous prefix
        id: String,

        /// Keep streaming until the task finishes
        #[arg(short, long)]
        follow: bool,
    },
}

/// Handle a CLI command
///
/// Routes the command to the appropriate handler.
pub async fn handle_command(command: Commands, config: &Config) -> Result<()> {
    let client = OrchestratorClient::new(&config.orchestrator_url);

    match command {
        Commands::Submit { args, wait } => task::submit(&client, args, wait).await,
        Commands::Status { id } => task::status(&client, &id).await,
        Commands::Wait { id, interval } => task::wait(&client, &id, interval).await,
        Commands::List => task::list(&client).await,
        Commands::Logs { id, follow } => task::logs(&client, &id, follow).await,
    }
}
