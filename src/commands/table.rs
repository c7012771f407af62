// ABOUTME: Table command implementation - Import one table's rows
// ABOUTME: Remaps identity references using a saved mapping and upserts rows idempotently

use super::{build_migrator, DestinationNeeds, SourceSelection};
use crate::migration::{IdentityMapping, TableImportResult};
use anyhow::{Context, Result};
use std::path::Path;

/// Print a table result the same way for every command
pub(crate) fn print_table_result(result: &TableImportResult) {
    let marker = if result.success { "✓" } else { "✗" };
    println!(
        "{} {}: {} imported, {} already present, {} failed, {} identity value(s) remapped",
        marker,
        result.table,
        result.imported_count,
        result.skipped_count,
        result.failed_count,
        result.remapped_values
    );
    for sample in &result.error_samples {
        println!("    {}", sample);
    }
}

/// Run the table phase for `table`
///
/// A table with failed rows is reported but does not fail the command; only
/// an aborted phase does.
pub async fn table(
    selection: &SourceSelection,
    table: &str,
    mapping_path: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let mapping = match mapping_path {
        Some(path) => IdentityMapping::load(path)
            .with_context(|| format!("Failed to read identity mapping {}", path.display()))?,
        None => IdentityMapping::new(),
    };

    let needs = DestinationNeeds {
        rows: true,
        identities: false,
    };
    let migrator = build_migrator(selection, needs, dry_run).await?;

    let result = migrator
        .import_table(table, &mapping, dry_run)
        .await
        .with_context(|| format!("Import of table {} aborted", table))?;

    print_table_result(&result);
    Ok(())
}
