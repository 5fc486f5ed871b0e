//! `relay platform list|add|broadcast`

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use relay_core::{Catalog, MemoryStore, SchemaRegistry, SyncSettings};
use relay_sync::{DeliveryStatus, Preparer, SyncContext, TransformerRegistry, UreqTransport};

#[derive(Subcommand, Debug)]
pub enum PlatformCommand {
    /// List registered platforms.
    List(ListArgs),

    /// Register a platform with the next free id.
    Add(AddArgs),

    /// Push every platform record to the targets of this host's `Platform`
    /// sync rows.
    Broadcast,
}

#[derive(Args, Debug)]
pub struct ListArgs {
    /// Emit JSON instead of a table. Tokens are never printed.
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Display name (e.g. "shop").
    pub name: String,

    /// Network host of the platform (e.g. "shop.example.com").
    #[arg(long)]
    pub domain: String,

    /// API token that authenticates the platform.
    #[arg(long)]
    pub token: String,
}

#[derive(Serialize, Tabled)]
struct PlatformRow {
    #[tabled(rename = "id")]
    id: u64,
    #[tabled(rename = "name")]
    name: String,
    #[tabled(rename = "domain")]
    domain: String,
    #[tabled(rename = "current")]
    current: bool,
}

pub fn run(cmd: PlatformCommand) -> Result<()> {
    match cmd {
        PlatformCommand::List(args) => list(args),
        PlatformCommand::Add(args) => add(args),
        PlatformCommand::Broadcast => broadcast(),
    }
}

fn list(args: ListArgs) -> Result<()> {
    let catalog = Catalog::load().context("failed to load catalog")?;
    let host = SyncSettings::load().ok().map(|s| s.host);

    let rows: Vec<PlatformRow> = catalog
        .platforms
        .iter()
        .map(|p| PlatformRow {
            id: p.id.0,
            name: p.name.clone(),
            domain: p.domain.clone(),
            current: host
                .as_deref()
                .is_some_and(|h| catalog.platform_by_domain(h).map(|c| c.id) == Some(p.id)),
        })
        .collect();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("failed to serialize platforms")?
        );
        return Ok(());
    }

    if rows.is_empty() {
        println!("No platforms registered.");
        println!("Run: relay platform add <name> --domain <domain> --token <token>");
        return Ok(());
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn add(args: AddArgs) -> Result<()> {
    let mut catalog = Catalog::load().context("failed to load catalog")?;
    let platform = catalog
        .add_platform(args.name, args.domain, args.token)
        .context("failed to add platform")?
        .clone();
    catalog.save().context("failed to save catalog")?;
    println!(
        "✓ Added platform #{} '{}' ({})",
        platform.id, platform.name, platform.domain
    );
    Ok(())
}

fn broadcast() -> Result<()> {
    let settings = SyncSettings::load().context("failed to load config; run `relay init` first")?;
    let catalog = Catalog::load().context("failed to load catalog")?;
    let schema = SchemaRegistry::load().context("failed to load schema")?;
    let ctx = SyncContext::new(settings, catalog, schema, TransformerRegistry::new());
    if ctx.current_platform.is_none() {
        anyhow::bail!(
            "host '{}' is not a registered platform domain",
            ctx.settings.host
        );
    }

    let store = MemoryStore::new();
    let transport = UreqTransport::default();
    let report = Preparer::new(&ctx, &store, &transport).broadcast_platforms();

    if report.outcomes.is_empty() {
        println!("No `Platform` sync rows from this host; nothing sent.");
        return Ok(());
    }
    for outcome in &report.outcomes {
        let url = outcome.url.as_deref().unwrap_or("-");
        match &outcome.status {
            DeliveryStatus::Delivered(code) => {
                println!("{} {} {url} ({code})", "■".green().bold(), outcome.target)
            }
            DeliveryStatus::Failed(reason) => {
                println!("{} {} {url}: {reason}", "■".red().bold(), outcome.target)
            }
        }
    }
    println!(
        "{} delivered, {} failed",
        report.delivered(),
        report.failed()
    );
    Ok(())
}
