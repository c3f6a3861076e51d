//! VA Calibration CLI
//!
//! Command-line interface for submitting calibration tasks to the
//! orchestrator and watching them run.

mod commands;
mod config;
mod id_resolver;
mod types;

use anyhow::Result;
use clap::Parser;
use commands::{Commands, handle_command};
use config::Config;

#[derive(Parser)]
#[command(name = "vacal")]
#[command(about = "VA calibration task CLI", long_about = None)]
struct Cli {
    /// Orchestrator URL
    #[arg(
        long,
        env = "VACAL_ORCHESTRATOR_URL",
        default_value = "http://localhost:8000"
    )]
    orchestrator_url: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config {
        orchestrator_url: cli.orchestrator_url,
    };

    handle_command(cli.command, &config).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use vacal_core::domain::params::CalibrationMode;

    #[test]
    fn test_submit_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "vacal",
            "submit",
            "--mode",
            "ensemble",
            "--eava",
            "eava.csv",
            "--age-group",
            "child",
            "--n-mcmc",
            "100",
            "--path-correction",
            "false",
            "--wait",
        ])
        .unwrap();

        let Commands::Submit { args, wait } = cli.command else {
            panic!("expected submit");
        };
        assert!(wait);

        let params = args.into_params();
        assert_eq!(params.mode, CalibrationMode::Ensemble);
        assert_eq!(params.eava_path.as_deref(), Some("eava.csv"));
        assert_eq!(params.age_group, "child");
        assert_eq!(params.n_mcmc, 100);
        assert!(!params.path_correction);
        // Untouched fields keep their defaults
        assert_eq!(params.country, "Mozambique");
        assert_eq!(params.nsim, 1000);
    }

    #[test]
    fn test_unknown_mode_rejected() {
        assert!(Cli::try_parse_from(["vacal", "submit", "--mode", "bogus"]).is_err());
    }

    #[test]
    fn test_wait_interval_default() {
        let cli = Cli::try_parse_from(["vacal", "wait", "abc123"]).unwrap();
        let Commands::Wait { id, interval } = cli.command else {
            panic!("expected wait");
        };
        assert_eq!(id, "abc123");
        assert_eq!(interval, 3);
    }
}
