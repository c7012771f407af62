// ABOUTME: Identities command implementation - Provision destination accounts
// ABOUTME: Saves the resulting source-to-destination identity mapping for later table imports

use super::{build_migrator, DestinationNeeds, SourceSelection};
use anyhow::{Context, Result};
use std::path::Path;

/// Run the identities phase and write the mapping to `mapping_out`
///
/// In dry-run mode the mapping holds random placeholder ids and the
/// destination is never contacted.
///
/// # Examples
///
/// ```no_run
/// # use anyhow::Result;
/// # use std::path::Path;
/// # use dump_migrator::commands::{identities, SourceSelection};
/// # async fn example() -> Result<()> {
/// let selection = SourceSelection {
///     config_path: Some("migration.toml".into()),
///     dump_path: None,
/// };
/// identities(&selection, Path::new("mapping.json"), false).await?;
/// # Ok(())
/// # }
/// ```
pub async fn identities(
    selection: &SourceSelection,
    mapping_out: &Path,
    dry_run: bool,
) -> Result<()> {
    let needs = DestinationNeeds {
        rows: false,
        identities: true,
    };
    let migrator = build_migrator(selection, needs, dry_run).await?;

    tracing::info!(
        "Importing identities{}...",
        if dry_run { " (dry run)" } else { "" }
    );
    let result = migrator
        .import_identities(dry_run)
        .await
        .context("Identity import aborted")?;

    result.mapping.save(mapping_out).with_context(|| {
        format!("Failed to write identity mapping to {}", mapping_out.display())
    })?;

    println!("Identities created:         {}", result.created);
    println!("Identities already present: {}", result.skipped);
    println!("Identities failed:          {}", result.failed);
    println!(
        "Mapping with {} entries written to {}",
        result.mapping.len(),
        mapping_out.display()
    );
    Ok(())
}
