//! Snapshot history commands

use super::Globals;
use anyhow::{bail, Context};
use clap::{Args, Subcommand};
use statehop_core::render::{render_json_pretty, render_overview};
use std::path::PathBuf;

#[derive(Debug, Args)]
pub struct SnapshotArgs {
    #[command(subcommand)]
    pub command: SnapshotCommand,
}

#[derive(Debug, Subcommand)]
pub enum SnapshotCommand {
    /// List a user's snapshots, newest first
    List(UserRef),
    /// Show a snapshot's metadata and features
    View(SnapshotRef),
    /// Export a snapshot as JSON
    Dump(DumpArgs),
    /// Exempt a snapshot from rotation
    Pin(SnapshotRef),
    /// Make a snapshot eligible for rotation again
    Unpin(SnapshotRef),
    /// Delete a snapshot
    Delete(SnapshotRef),
    /// Re-save an old snapshot as the user's newest one
    Restore(SnapshotRef),
}

#[derive(Debug, Args)]
pub struct UserRef {
    /// Username or UUID
    pub user: String,
}

#[derive(Debug, Args)]
pub struct SnapshotRef {
    /// Username or UUID
    pub user: String,
    /// Snapshot id or short id prefix
    pub snapshot: String,
}

#[derive(Debug, Args)]
pub struct DumpArgs {
    #[command(flatten)]
    pub target: SnapshotRef,

    /// Write to this file instead of stdout
    #[arg(long)]
    pub out: Option<PathBuf>,
}

pub fn execute(args: SnapshotArgs, globals: &Globals) -> anyhow::Result<()> {
    match args.command {
        SnapshotCommand::List(target) => execute_list(target, globals),
        SnapshotCommand::View(target) => execute_view(target, globals),
        SnapshotCommand::Dump(dump) => execute_dump(dump, globals),
        SnapshotCommand::Pin(target) => execute_pin(target, globals, true),
        SnapshotCommand::Unpin(target) => execute_pin(target, globals, false),
        SnapshotCommand::Delete(target) => execute_delete(target, globals),
        SnapshotCommand::Restore(target) => execute_restore(target, globals),
    }
}

fn execute_list(target: UserRef, globals: &Globals) -> anyhow::Result<()> {
    let workspace = globals.open()?;
    let user = workspace.user(&target.user)?;
    let rows = workspace.ledger.rows(user.id)?;

    println!("Snapshots for {} ({}):", user.username, user.id);
    if rows.is_empty() {
        println!("  (none)");
    }
    for (i, row) in rows.iter().enumerate() {
        println!(
            "  {:>2}. {}  {}  {:<20} {:<6} {} bytes",
            i + 1,
            row.short_id(),
            row.timestamp.format("%Y-%m-%d %H:%M:%S"),
            row.save_cause.display_name(),
            if row.pinned { "pinned" } else { "" },
            row.payload.len()
        );
    }
    Ok(())
}

fn execute_view(target: SnapshotRef, globals: &Globals) -> anyhow::Result<()> {
    let workspace = globals.open()?;
    let user = workspace.user(&target.user)?;
    let row = workspace.snapshot(&user, &target.snapshot)?;
    let snapshot = workspace.ledger.decode(&row)?;
    print!("{}", render_overview(&snapshot, &workspace.registry));
    Ok(())
}

fn execute_dump(args: DumpArgs, globals: &Globals) -> anyhow::Result<()> {
    let workspace = globals.open()?;
    let user = workspace.user(&args.target.user)?;
    let row = workspace.snapshot(&user, &args.target.snapshot)?;
    let snapshot = workspace.ledger.decode(&row)?;
    let json = render_json_pretty(&snapshot, &workspace.registry)?;

    match args.out {
        Some(path) => {
            std::fs::write(&path, json)
                .with_context(|| format!("writing {}", path.display()))?;
            println!("Snapshot {} written to {}", row.short_id(), path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

fn execute_pin(target: SnapshotRef, globals: &Globals, pinned: bool) -> anyhow::Result<()> {
    let workspace = globals.open()?;
    let user = workspace.user(&target.user)?;
    let row = workspace.snapshot(&user, &target.snapshot)?;
    if row.pinned == pinned {
        println!(
            "Snapshot {} is already {}",
            row.short_id(),
            if pinned { "pinned" } else { "unpinned" }
        );
        return Ok(());
    }

    if pinned {
        workspace.ledger.pin(user.id, row.id)?;
        println!("Pinned snapshot {}", row.short_id());
    } else {
        workspace.ledger.unpin(user.id, row.id)?;
        println!("Unpinned snapshot {}", row.short_id());
    }
    Ok(())
}

fn execute_delete(target: SnapshotRef, globals: &Globals) -> anyhow::Result<()> {
    let workspace = globals.open()?;
    let user = workspace.user(&target.user)?;
    let row = workspace.snapshot(&user, &target.snapshot)?;
    if !workspace.ledger.delete(user.id, row.id)? {
        bail!("snapshot {} disappeared before it could be deleted", row.short_id());
    }
    println!("Deleted snapshot {}", row.short_id());
    Ok(())
}

fn execute_restore(target: SnapshotRef, globals: &Globals) -> anyhow::Result<()> {
    let workspace = globals.open()?;
    let user = workspace.user(&target.user)?;
    let row = workspace.snapshot(&user, &target.snapshot)?;
    let restored = workspace.ledger.restore(user.id, row.id)?;
    println!("Restored snapshot {} as {}", row.short_id(), restored.short_id());
    Ok(())
}
