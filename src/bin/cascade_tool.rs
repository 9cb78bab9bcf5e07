use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use softcascade::{
    CascadeAction, CascadeResolver, MetadataCatalog, MetadataSource, RelationshipMap,
    SoftDeleteRegistry,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "cascade-tool")]
#[command(about = "Inspect soft-delete cascade rules derived from entity metadata")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the relationship map
    Map {
        #[arg(long)]
        metadata: PathBuf,
        /// Soft-delete configuration; marks dependent types that can be soft-deleted
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        json: bool,
    },
    /// Show what deleting an instance of one entity type would touch
    Explain {
        #[arg(long)]
        metadata: PathBuf,
        #[arg(long)]
        config: PathBuf,
        #[arg(long)]
        entity: String,
    },
    /// List cascade relationships, their join columns, and associations excluded from the map
    Check {
        #[arg(long)]
        metadata: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Map {
            metadata,
            config,
            json,
        } => print_map(&metadata, config.as_deref(), json),
        Command::Explain {
            metadata,
            config,
            entity,
        } => explain(&metadata, &config, &entity),
        Command::Check { metadata } => check(&metadata),
    }
}

fn load_catalog(path: &Path) -> Result<MetadataCatalog> {
    MetadataCatalog::from_path(path)
        .with_context(|| format!("Failed to load entity metadata from '{}'", path.display()))
}

fn load_registry(path: &Path) -> Result<SoftDeleteRegistry> {
    SoftDeleteRegistry::from_path(path)
        .with_context(|| format!("Failed to load soft-delete configuration from '{}'", path.display()))
}

fn print_map(metadata: &Path, config: Option<&Path>, json: bool) -> Result<()> {
    let catalog = load_catalog(metadata)?;
    let map = RelationshipMap::build(&catalog).context("Failed to build relationship map")?;

    if json {
        let rendered = serde_json::to_string_pretty(&map).context("Failed to render relationship map")?;
        println!("{}", rendered);
        return Ok(());
    }

    let registry = match config {
        Some(path) => {
            let metadata = catalog.all_metadata().context("Failed to read entity metadata")?;
            Some(load_registry(path)?.with_hierarchy(&metadata))
        }
        None => None,
    };

    if map.is_empty() {
        println!("No cascade relationships.");
        return Ok(());
    }

    for (referenced, configuration) in map.iter() {
        println!("{}", referenced);
        for (dependent, actions) in configuration.iter() {
            let marker = match &registry {
                Some(registry) if registry.is_soft_deletable(dependent) => " (soft-deletable)",
                _ => "",
            };
            for (action, fields) in actions.iter() {
                println!("  {} {}.{}{}", action, dependent, fields.join("|"), marker);
            }
        }
    }
    Ok(())
}

fn explain(metadata: &Path, config: &Path, entity: &str) -> Result<()> {
    let catalog = load_catalog(metadata)?;
    if !catalog.contains(entity) {
        return Err(anyhow!("Entity '{}' is not declared in '{}'", entity, metadata.display()));
    }

    let registry = load_registry(config)?;
    let resolver = CascadeResolver::from_source(&catalog, Arc::new(registry))
        .context("Failed to build relationship map")?;

    match resolver.registry().deletion_marker_field(entity) {
        Some(field) => println!("Deleting {} sets {}.{} to the current time.", entity, entity, field),
        None => {
            println!("{} is not soft-deletable; deleting it is a hard delete.", entity);
            return Ok(());
        }
    }

    let configuration = resolver.configuration_for_type(entity);
    let effective = resolver.effective_configuration(&configuration);

    for (dependent, actions) in configuration.iter() {
        for field in actions.fields(CascadeAction::SetNull) {
            println!("  {}.{} is set to NULL", dependent, field);
        }
        for field in actions.fields(CascadeAction::Delete) {
            let kept = effective
                .get(dependent)
                .is_some_and(|fields| fields.fields(CascadeAction::Delete).contains(field));
            if kept {
                println!("  {} rows referencing it through '{}' are soft-deleted", dependent, field);
            } else {
                println!(
                    "  {}.{} declares CASCADE but {} is not soft-deletable; ignored",
                    dependent, field, dependent
                );
            }
        }
    }

    if configuration.is_empty() {
        println!("  Nothing depends on {}.", entity);
    }
    Ok(())
}

fn check(metadata: &Path) -> Result<()> {
    let catalog = load_catalog(metadata)?;
    let (map, report) =
        RelationshipMap::build_with_report(&catalog).context("Failed to build relationship map")?;

    println!(
        "{} cascade relationships over {} referenced types.",
        report.descriptors.len(),
        map.len()
    );
    for d in &report.descriptors {
        println!(
            "  {} {}.{} via {} -> {}.{}",
            d.action, d.source_type, d.relation_field, d.join_column, d.target_type, d.referenced_column
        );
    }

    if !report.non_identifier_references.is_empty() {
        println!("Join columns not referencing the target identifier (dependents will not be found):");
        for d in &report.non_identifier_references {
            println!(
                "  {}.{} -> {}.{}",
                d.source_type, d.join_column, d.target_type, d.referenced_column
            );
        }
    }

    if report.skipped.is_empty() {
        println!("No associations excluded.");
        return Ok(());
    }

    println!("Excluded associations:");
    for skipped in &report.skipped {
        println!("  {}.{}: {}", skipped.source_type, skipped.relation_field, skipped.reason);
    }
    Ok(())
}
