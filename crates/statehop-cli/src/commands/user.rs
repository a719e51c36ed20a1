//! User listing

use super::Globals;
use clap::{Args, Subcommand};

#[derive(Debug, Args)]
pub struct UserArgs {
    #[command(subcommand)]
    pub command: UserCommand,
}

#[derive(Debug, Subcommand)]
pub enum UserCommand {
    /// List every user with their snapshot count
    List,
}

pub fn execute(args: UserArgs, globals: &Globals) -> anyhow::Result<()> {
    match args.command {
        UserCommand::List => execute_list(globals),
    }
}

fn execute_list(globals: &Globals) -> anyhow::Result<()> {
    let workspace = globals.open()?;
    let users = workspace.ledger.users()?;
    if users.is_empty() {
        println!("No users");
        return Ok(());
    }
    for user in users {
        let count = workspace.ledger.rows(user.id)?.len();
        println!("{}  {:<16} {} snapshot(s)", user.id, user.username, count);
    }
    Ok(())
}
