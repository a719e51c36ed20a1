//! Database maintenance

use super::Globals;
use anyhow::bail;
use clap::{Args, Subcommand};

#[derive(Debug, Args)]
pub struct DbArgs {
    #[command(subcommand)]
    pub command: DbCommand,
}

#[derive(Debug, Subcommand)]
pub enum DbCommand {
    /// Delete every user and snapshot
    Wipe(WipeArgs),
}

#[derive(Debug, Args)]
pub struct WipeArgs {
    /// Confirm the wipe
    #[arg(long)]
    pub yes: bool,
}

pub fn execute(args: DbArgs, globals: &Globals) -> anyhow::Result<()> {
    match args.command {
        DbCommand::Wipe(wipe) => execute_wipe(wipe, globals),
    }
}

fn execute_wipe(args: WipeArgs, globals: &Globals) -> anyhow::Result<()> {
    if !args.yes {
        bail!("refusing to wipe without --yes");
    }
    let workspace = globals.open()?;
    let users = workspace.ledger.users()?.len();
    workspace.ledger.wipe()?;
    println!("Wiped {} user(s) and their snapshots", users);
    Ok(())
}
