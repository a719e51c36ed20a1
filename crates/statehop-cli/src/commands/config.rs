//! Settings file helpers

use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use statehop_core::config::Settings;
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Write a settings file with every default filled in
    Init(InitArgs),
}

#[derive(Debug, Args)]
pub struct InitArgs {
    #[arg(long, default_value = "statehop.toml")]
    pub path: PathBuf,

    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn execute(args: ConfigArgs) -> anyhow::Result<()> {
    match args.command {
        ConfigCommand::Init(init) => execute_init(init),
    }
}

fn execute_init(args: InitArgs) -> anyhow::Result<()> {
    if args.path.exists() && !args.force {
        bail!("{} already exists (use --force to overwrite)", args.path.display());
    }
    let text = Settings::default_toml()?;
    std::fs::write(&args.path, text)
        .with_context(|| format!("writing {}", args.path.display()))?;
    println!("Wrote default settings to {}", args.path.display());
    Ok(())
}
