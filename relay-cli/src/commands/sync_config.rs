//! `relay sync-config list|add`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use relay_core::{Catalog, EntityType, PlatformId, SchemaRegistry};
use relay_sync::prepare::PLATFORM_ENTITY_TYPE;

#[derive(Subcommand, Debug)]
pub enum SyncConfigCommand {
    /// List sync configuration rows.
    List(ListArgs),

    /// Propagate one entity type from a source platform to a target.
    Add(AddArgs),
}

#[derive(Args, Debug)]
pub struct ListArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Source platform id.
    #[arg(long)]
    pub source: u64,

    /// Entity type tag (must be in schema.yaml, or "Platform").
    #[arg(long)]
    pub entity: String,

    /// Target platform id.
    #[arg(long)]
    pub target: u64,
}

#[derive(Serialize, Tabled)]
struct SyncRow {
    #[tabled(rename = "id")]
    id: u64,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "entity type")]
    entity_type: String,
    #[tabled(rename = "target")]
    target: String,
}

pub fn run(cmd: SyncConfigCommand) -> Result<()> {
    match cmd {
        SyncConfigCommand::List(args) => list(args),
        SyncConfigCommand::Add(args) => add(args),
    }
}

fn platform_label(catalog: &Catalog, id: PlatformId) -> String {
    match catalog.platform(id) {
        Some(platform) => format!("#{id} {}", platform.name),
        None => format!("#{id} (missing)"),
    }
}

fn list(args: ListArgs) -> Result<()> {
    let catalog = Catalog::load().context("failed to load catalog")?;
    let rows: Vec<SyncRow> = catalog
        .syncs
        .iter()
        .map(|s| SyncRow {
            id: s.id.0,
            source: platform_label(&catalog, s.source_platform_id),
            entity_type: s.source_entity_type.to_string(),
            target: platform_label(&catalog, s.target_platform_id),
        })
        .collect();

    if args.json {
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("failed to serialize sync rows")?
        );
        return Ok(());
    }
    if rows.is_empty() {
        println!("No sync configurations.");
        return Ok(());
    }
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn add(args: AddArgs) -> Result<()> {
    let entity_type = EntityType::from(args.entity);
    if entity_type.as_str() != PLATFORM_ENTITY_TYPE {
        let schema = SchemaRegistry::load().context("failed to load schema")?;
        if !schema.contains(&entity_type) {
            bail!("entity type '{entity_type}' is not defined in schema.yaml");
        }
    }

    let mut catalog = Catalog::load().context("failed to load catalog")?;
    let sync = catalog
        .add_sync(PlatformId(args.source), entity_type, PlatformId(args.target))
        .context("failed to add sync configuration")?
        .clone();
    catalog.save().context("failed to save catalog")?;
    println!(
        "✓ Added sync #{}: {} {} → {}",
        sync.id,
        platform_label(&catalog, sync.source_platform_id),
        sync.source_entity_type,
        platform_label(&catalog, sync.target_platform_id)
    );
    Ok(())
}
