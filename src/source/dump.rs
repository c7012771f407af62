// ABOUTME: In-memory source backed by a parsed SQL dump
// ABOUTME: Serves the same manifest and pages as the HTTP export so dumps replay through the same phases

use super::{Manifest, Source, TableSummary};
use crate::dump::{parse_dump, IdentityRecord, ParsedDump, Record};
use crate::error::Result;
use std::path::Path;

/// Source reading from a dump parsed up front
#[derive(Debug)]
pub struct DumpSource {
    parsed: ParsedDump,
}

impl DumpSource {
    pub fn new(parsed: ParsedDump) -> Self {
        Self { parsed }
    }

    pub fn from_text(text: &str) -> Self {
        Self::new(parse_dump(text))
    }

    /// Read and parse a dump file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Reading dump from {}", path.display());
        let text = std::fs::read_to_string(path)?;
        Ok(Self::from_text(&text))
    }

    pub fn parsed(&self) -> &ParsedDump {
        &self.parsed
    }
}

/// The `page`-th window of `limit` items, empty past the end
fn page_window<T>(items: impl Iterator<Item = T>, page: usize, limit: usize) -> Vec<T> {
    let limit = limit.max(1);
    items
        .skip(page.saturating_mul(limit))
        .take(limit)
        .collect()
}

impl Source for DumpSource {
    async fn summary(&self) -> Result<Manifest> {
        let cleared_tables = self.parsed.cleared_tables();
        if !cleared_tables.is_empty() {
            tracing::warn!(
                "Dump clears {} table(s) with DELETE; deletes are not replayed: {}",
                cleared_tables.len(),
                cleared_tables.join(", ")
            );
        }

        Ok(Manifest {
            tables: self
                .parsed
                .table_row_counts()
                .into_iter()
                .map(|(name, row_count)| TableSummary { name, row_count })
                .collect(),
            identity_count: Some(self.parsed.identities.len() as u64),
            cleared_tables,
        })
    }

    async fn identities_page(&self, page: usize, limit: usize) -> Result<Vec<IdentityRecord>> {
        Ok(page_window(
            self.parsed.identities.iter().cloned(),
            page,
            limit,
        ))
    }

    async fn export_page(&self, table: &str, page: usize, limit: usize) -> Result<Vec<Record>> {
        Ok(page_window(
            self.parsed.rows_for(table).cloned(),
            page,
            limit,
        ))
    }
}
