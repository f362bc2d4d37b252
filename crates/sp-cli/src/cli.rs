//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::commands::import::ImportArgs;
use crate::commands::metrics::MetricsArgs;
use crate::commands::recommend::RecommendArgs;
use crate::commands::suggest::SuggestArgs;
use crate::commands::workload::WorkloadArgs;

/// Staffing and planning engine.
///
/// Computes utilization snapshots from logged and planned time, classifies
/// workload, recommends rebalancing and suggests task assignments.
#[derive(Debug, Parser)]
#[command(name = "sp", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Load JSON-lines input records (contributors, terms, time, plans, tasks).
    Import(ImportArgs),

    /// Compute and store staffing metric snapshots.
    Metrics(MetricsArgs),

    /// Classify contributors into workload buckets.
    Workload(WorkloadArgs),

    /// Recommend workload rebalancing.
    Recommend(RecommendArgs),

    /// Suggest assignments for a project's open tasks.
    Suggest(SuggestArgs),

    /// Show database location and row counts.
    Status,
}

#[cfg(test)]
mod tests {
    use super::*;

    use clap::CommandFactory;
    use sp_core::Granularity;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn metrics_accepts_period_and_flags() {
        let cli = Cli::try_parse_from([
            "sp",
            "--verbose",
            "metrics",
            "2025-03",
            "--granularity",
            "monthly",
            "--force",
        ])
        .unwrap();
        assert!(cli.verbose);
        let Some(Commands::Metrics(args)) = cli.command else {
            panic!("expected metrics command");
        };
        assert_eq!(args.period.as_deref(), Some("2025-03"));
        assert_eq!(args.granularity, Granularity::Monthly);
        assert!(args.force);
    }

    #[test]
    fn unknown_granularity_is_rejected() {
        assert!(Cli::try_parse_from(["sp", "metrics", "--granularity", "daily"]).is_err());
    }

    #[test]
    fn suggest_requires_project() {
        assert!(Cli::try_parse_from(["sp", "suggest"]).is_err());
        let cli = Cli::try_parse_from(["sp", "suggest", "--project", "p1", "--start", "2025-02-03"])
            .unwrap();
        assert!(matches!(cli.command, Some(Commands::Suggest(ref args)) if args.project == "p1"));
    }
}
