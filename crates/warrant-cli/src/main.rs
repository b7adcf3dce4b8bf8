//! Warrant CLI - Command-line interface for governed agent decisions.

use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;
use warrant_cli::commands;
use warrant_cli::{Cli, Command, Config, Formatter};
use warrant_decisions::DecisionRepository;
use warrant_policy::PolicyEvaluator;
use warrant_simulator::PolicySimulator;
use warrant_store::SqliteStore;

fn main() {
    // Initialize tracing (log to stderr, RUST_LOG overrides)
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .init();

    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> warrant_cli::Result<()> {
    // Parse CLI arguments
    let cli = Cli::parse();

    // Load config; write the defaults on first run
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => {
            let cfg = Config::load()?;
            if !Config::path()?.exists() {
                cfg.save().ok();
            }
            cfg
        }
    };

    // Determine output format
    let format = cli
        .format
        .map(Into::into)
        .unwrap_or(config.settings.format);

    // Determine color setting
    let color_enabled = !cli.no_color && config.settings.color;

    // Create formatter
    let formatter = Formatter::new(format, color_enabled);

    match cli.command {
        Command::Policy(args) => {
            // Works on files only; no database needed
            let simulator = PolicySimulator::new(PolicyEvaluator::default_config(), config.simulator.clone())?;
            commands::execute_policy(args, &simulator, &formatter)?;
        }
        Command::Verify => {
            let store = open_store(cli.database, &config)?;
            commands::execute_verify(&store, &formatter)?;
        }
        Command::Decisions(args) => {
            let store = open_store(cli.database, &config)?;
            let mut repo = DecisionRepository::with_config(store, config.auto_approval.clone())?;
            commands::execute_decisions(args, &mut repo, &formatter)?;
        }
    }

    Ok(())
}

/// Open the database named on the command line, or the configured one.
fn open_store(database: Option<PathBuf>, config: &Config) -> warrant_cli::Result<SqliteStore> {
    let path = match database {
        Some(path) => path,
        None => config.database_path()?,
    };
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(SqliteStore::new(&path)?)
}
