// ABOUTME: Summary command implementation - Show the source manifest
// ABOUTME: Read-only; lists tables with row counts and the identity count when known

use super::{build_migrator, DestinationNeeds, SourceSelection};
use anyhow::{Context, Result};

/// Print the manifest of tables and row counts at the source
pub async fn summary(selection: &SourceSelection, json: bool) -> Result<()> {
    let migrator = build_migrator(selection, DestinationNeeds::NONE, true).await?;
    let manifest = migrator
        .summary()
        .await
        .context("Failed to fetch source summary")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&manifest)?);
        return Ok(());
    }

    println!("Source tables:");
    for table in &manifest.tables {
        println!("  {:<40} {:>8} row(s)", table.name, table.row_count);
    }
    let total: u64 = manifest.tables.iter().map(|t| t.row_count).sum();
    println!("  {} table(s), {} row(s) total", manifest.tables.len(), total);

    if let Some(count) = manifest.identity_count {
        println!("Identities: {}", count);
    }
    Ok(())
}
