// ABOUTME: Run command implementation - Full migration in one go
// ABOUTME: Summary, identities, then every selected table, with confirmation and progress reporting

use super::table::print_table_result;
use super::{build_migrator, DestinationNeeds, SourceSelection};
use crate::migration::{IdentityMapping, TableImportResult};
use anyhow::{bail, Context, Result};
use dialoguer::{theme::ColorfulTheme, Confirm};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};

/// Options for a full migration run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub dry_run: bool,
    /// Skip the confirmation prompt
    pub yes: bool,
    /// Import only these tables, in this order; all manifest tables otherwise
    pub tables: Vec<String>,
    /// Reuse a saved mapping instead of running the identities phase
    pub mapping_in: Option<PathBuf>,
    /// Where to save the identity mapping
    pub mapping_out: Option<PathBuf>,
}

/// Tables to import: the requested ones, or every table in the manifest
fn select_tables(requested: &[String], available: &[String]) -> Vec<String> {
    if requested.is_empty() {
        return available.to_vec();
    }
    for table in requested {
        if !available.contains(table) {
            tracing::warn!("Table {} is not listed in the source manifest", table);
        }
    }
    requested.to_vec()
}

/// Run every phase against the source and destination
///
/// Table-level row failures are reported but do not fail the run. An aborted
/// phase (source unreachable, destination credentials refused) stops the run
/// with an error; completed tables stay imported and can be re-run safely.
pub async fn run(selection: &SourceSelection, options: &RunOptions) -> Result<()> {
    let migrator = build_migrator(selection, DestinationNeeds::ALL, options.dry_run).await?;

    tracing::info!("Phase 1/3: fetching source summary...");
    let manifest = migrator
        .summary()
        .await
        .context("Failed to fetch source summary")?;
    let available: Vec<String> = manifest.tables.iter().map(|t| t.name.clone()).collect();
    let tables = select_tables(&options.tables, &available);

    println!("Tables to import: {}", tables.len());
    for table in &tables {
        let rows = manifest
            .tables
            .iter()
            .find(|t| &t.name == table)
            .map(|t| t.row_count.to_string())
            .unwrap_or_else(|| "?".to_string());
        println!("  {:<40} {:>8} row(s)", table, rows);
    }
    if let Some(count) = manifest.identity_count {
        println!("Identities: {}", count);
    }
    if !manifest.cleared_tables.is_empty() {
        println!(
            "⚠ Deletes are not replayed for: {}",
            manifest.cleared_tables.join(", ")
        );
    }

    if !options.yes && !options.dry_run {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt("Import into the destination?")
            .default(false)
            .interact()
            .context("Failed to get confirmation")?;
        if !confirmed {
            tracing::warn!("⚠ Migration cancelled by user");
            bail!("Migration cancelled by user");
        }
    }

    let mapping = match &options.mapping_in {
        Some(path) => {
            tracing::info!("Phase 2/3: using saved identity mapping {}", path.display());
            IdentityMapping::load(path)
                .with_context(|| format!("Failed to read identity mapping {}", path.display()))?
        }
        None => {
            tracing::info!("Phase 2/3: importing identities...");
            let result = migrator
                .import_identities(options.dry_run)
                .await
                .context("Identity import aborted")?;
            println!(
                "Identities: {} created, {} already present, {} failed",
                result.created, result.skipped, result.failed
            );
            result.mapping
        }
    };

    if let Some(path) = &options.mapping_out {
        save_mapping(&mapping, path)?;
    }

    tracing::info!("Phase 3/3: importing {} table(s)...", tables.len());
    let progress = ProgressBar::new(tables.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .context("Invalid progress bar template")?
            .progress_chars("##-"),
    );

    let mut results: Vec<TableImportResult> = Vec::with_capacity(tables.len());
    for table in &tables {
        progress.set_message(format!("Importing {}", table));
        let result = migrator
            .import_table(table, &mapping, options.dry_run)
            .await;
        match result {
            Ok(result) => results.push(result),
            Err(e) => {
                progress.abandon_with_message(format!("Aborted at {}", table));
                return Err(e).with_context(|| format!("Import of table {} aborted", table));
            }
        }
        progress.inc(1);
    }
    progress.finish_with_message("Import complete");

    println!();
    for result in &results {
        print_table_result(result);
    }

    let failed_tables = results.iter().filter(|r| !r.success).count();
    if failed_tables > 0 {
        tracing::warn!(
            "⚠ {} table(s) had rows that could not be imported; see samples above",
            failed_tables
        );
    } else {
        tracing::info!("✓ All {} table(s) imported", results.len());
    }
    Ok(())
}

fn save_mapping(mapping: &IdentityMapping, path: &Path) -> Result<()> {
    mapping
        .save(path)
        .with_context(|| format!("Failed to write identity mapping to {}", path.display()))
}
