// ABOUTME: Parse command implementation - Inspect a SQL dump offline
// ABOUTME: Reports statement counts, tables, identities and cleared tables without contacting anything

use crate::dump::parse_dump;
use anyhow::{Context, Result};
use serde_json::json;
use std::path::Path;

/// Parse a dump file and print what a migration would see
///
/// With `json` the report is a single JSON object on stdout; with
/// `operations` every decoded operation is printed as one JSON line instead.
pub fn parse(dump_path: &Path, json: bool, operations: bool) -> Result<()> {
    let text = std::fs::read_to_string(dump_path)
        .with_context(|| format!("Failed to read dump {}", dump_path.display()))?;
    let parsed = parse_dump(&text);

    if operations {
        for operation in &parsed.operations {
            println!("{}", serde_json::to_string(operation)?);
        }
        return Ok(());
    }

    let tables = parsed.table_row_counts();
    let cleared = parsed.cleared_tables();

    if json {
        let report = json!({
            "stats": parsed.stats,
            "tables": tables
                .iter()
                .map(|(name, rows)| json!({"name": name, "rowCount": rows}))
                .collect::<Vec<_>>(),
            "identityCount": parsed.identities.len(),
            "clearedTables": cleared,
            "mergedTables": parsed.merged_tables,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    let stats = &parsed.stats;
    println!("Dump: {}", dump_path.display());
    println!("  Statements:          {}", stats.statements);
    println!("  Inserts:             {}", stats.inserts);
    println!("  Delete-all:          {}", stats.delete_alls);
    println!("  Identities:          {}", stats.identities);
    println!("  Rejected identities: {}", stats.rejected_identities);
    println!("  Skipped:             {}", stats.skipped);
    println!("  Unparsed:            {}", stats.unparsed);
    println!();

    if tables.is_empty() {
        println!("No table rows found.");
    } else {
        println!("Tables:");
        for (name, rows) in &tables {
            println!("  {:<40} {:>8} row(s)", name, rows);
        }
    }

    if !cleared.is_empty() {
        println!();
        println!(
            "⚠ The dump clears these tables with DELETE; deletes are not replayed: {}",
            cleared.join(", ")
        );
    }

    if !parsed.merged_tables.is_empty() {
        println!();
        println!(
            "⚠ These tables receive rows under more than one schema and are imported as one: {}",
            parsed.merged_tables.join(", ")
        );
    }

    Ok(())
}
