// ABOUTME: Read-only migration sources: a live HTTP export API or a parsed SQL dump
// ABOUTME: Both serve a manifest, paginated identities and paginated table rows

pub mod dump;
pub mod http;

pub use dump::DumpSource;
pub use http::HttpSource;

use crate::dump::{IdentityRecord, Record};
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::future::Future;

/// Tables available at the source and how many rows each holds
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    #[serde(default)]
    pub tables: Vec<TableSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity_count: Option<u64>,
    /// Tables a dump clears with an unconditional delete
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cleared_tables: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub name: String,
    #[serde(default, alias = "count", alias = "row_count")]
    pub row_count: u64,
}

/// A paginated, read-only view of the system being migrated away from
///
/// Pages are numbered from 0. An empty page marks the end of the export.
pub trait Source {
    /// Manifest of tables and row counts
    fn summary(&self) -> impl Future<Output = Result<Manifest>> + Send;

    /// One page of identity-namespace accounts
    fn identities_page(
        &self,
        page: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<IdentityRecord>>> + Send;

    /// One page of rows from `table`
    fn export_page(
        &self,
        table: &str,
        page: usize,
        limit: usize,
    ) -> impl Future<Output = Result<Vec<Record>>> + Send;
}

/// Either kind of source, chosen at runtime by the CLI
#[derive(Debug)]
pub enum AnySource {
    Http(HttpSource),
    Dump(DumpSource),
}

impl Source for AnySource {
    async fn summary(&self) -> Result<Manifest> {
        match self {
            AnySource::Http(source) => source.summary().await,
            AnySource::Dump(source) => source.summary().await,
        }
    }

    async fn identities_page(&self, page: usize, limit: usize) -> Result<Vec<IdentityRecord>> {
        match self {
            AnySource::Http(source) => source.identities_page(page, limit).await,
            AnySource::Dump(source) => source.identities_page(page, limit).await,
        }
    }

    async fn export_page(&self, table: &str, page: usize, limit: usize) -> Result<Vec<Record>> {
        match self {
            AnySource::Http(source) => source.export_page(table, page, limit).await,
            AnySource::Dump(source) => source.export_page(table, page, limit).await,
        }
    }
}
