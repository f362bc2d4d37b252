use std::fs::File;
use std::io::{self, BufReader, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use sp_cli::commands::{import, metrics, recommend, status, suggest, util, workload};
use sp_cli::{Cli, Commands, Config};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(sp_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = sp_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .try_init();

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let today = util::today();

    match &cli.command {
        Some(Commands::Import(args)) => {
            let (mut db, _config) = open_database(cli.config.as_deref())?;
            match &args.file {
                Some(path) => {
                    let file = File::open(path)
                        .with_context(|| format!("failed to open {}", path.display()))?;
                    import::run(BufReader::new(file), &mut out, &mut db)?;
                }
                None => {
                    import::run(io::stdin().lock(), &mut out, &mut db)?;
                }
            }
        }
        Some(Commands::Metrics(args)) => {
            let (mut db, config) = open_database(cli.config.as_deref())?;
            metrics::run(&mut out, &mut db, &config, args, today)?;
        }
        Some(Commands::Workload(args)) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            workload::run(&mut out, &db, &config, args, today)?;
        }
        Some(Commands::Recommend(args)) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            recommend::run(&mut out, &db, &config, args, today)?;
        }
        Some(Commands::Suggest(args)) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            suggest::run(&mut out, &db, &config, args, today)?;
        }
        Some(Commands::Status) => {
            let (db, config) = open_database(cli.config.as_deref())?;
            status::run(&mut out, &db, &config.database_path)?;
        }
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            writeln!(out)?;
        }
    }

    Ok(())
}
