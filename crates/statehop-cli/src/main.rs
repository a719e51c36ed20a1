//! statehop CLI
//!
//! Operator tooling for the snapshot database

use clap::{Parser, Subcommand};
use statehop_core::logging_facility::{init, Profile};
use std::path::PathBuf;

mod commands;

#[derive(Debug, Parser)]
#[command(name = "statehop")]
#[command(about = "statehop - inspect and manage user state snapshots", long_about = None)]
struct Cli {
    /// Settings file (TOML)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Database file, overriding the settings
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Log to stderr with this profile (development, production)
    #[arg(long, global = true)]
    log: Option<Profile>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Snapshot history of one user
    Snapshot(commands::snapshot::SnapshotArgs),
    /// Known users
    User(commands::user::UserArgs),
    /// Database maintenance
    Db(commands::db::DbArgs),
    /// Settings file helpers
    Config(commands::config::ConfigArgs),
}

fn main() {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    if let Some(profile) = cli.log {
        init(profile);
    }

    let globals = commands::Globals {
        config: cli.config,
        db: cli.db,
    };
    let result = match cli.command {
        Commands::Snapshot(args) => commands::snapshot::execute(args, &globals),
        Commands::User(args) => commands::user::execute(args, &globals),
        Commands::Db(args) => commands::db::execute(args, &globals),
        Commands::Config(args) => commands::config::execute(args),
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}
