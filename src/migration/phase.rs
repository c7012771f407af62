// ABOUTME: Caller-facing phase requests, per-phase results and the response envelope
// ABOUTME: All wire shapes are camelCase JSON so a remote caller can drive phases one at a time

use super::mapping::IdentityMapping;
use crate::error::MigrateError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Most row errors kept verbatim per table
pub const MAX_ERROR_SAMPLES: usize = 5;

/// One independently invocable step of a migration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportPhase {
    Summary,
    Identities,
    Table,
}

impl fmt::Display for ImportPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImportPhase::Summary => "summary",
            ImportPhase::Identities => "identities",
            ImportPhase::Table => "table",
        };
        f.write_str(name)
    }
}

/// A request to run one phase
///
/// ```
/// # use dump_migrator::migration::PhaseRequest;
/// let request: PhaseRequest = serde_json::from_str(
///     r#"{"phase":"table","tableName":"members","identityMapping":{"u1":"d1"}}"#,
/// ).unwrap();
/// assert!(matches!(request, PhaseRequest::Table { dry_run: false, .. }));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum PhaseRequest {
    Summary,
    #[serde(rename_all = "camelCase")]
    Identities {
        #[serde(default)]
        dry_run: bool,
    },
    #[serde(rename_all = "camelCase")]
    Table {
        table_name: String,
        #[serde(default)]
        identity_mapping: IdentityMapping,
        #[serde(default)]
        dry_run: bool,
    },
}

impl PhaseRequest {
    pub fn phase(&self) -> ImportPhase {
        match self {
            PhaseRequest::Summary => ImportPhase::Summary,
            PhaseRequest::Identities { .. } => ImportPhase::Identities,
            PhaseRequest::Table { .. } => ImportPhase::Table,
        }
    }
}

/// Outcome of the identities phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityImportResult {
    /// New destination accounts (every identity in dry-run)
    pub created: usize,
    /// Identities whose email already had a destination account
    pub skipped: usize,
    /// Identities the destination refused; absent from the mapping
    pub failed: usize,
    pub mapping: IdentityMapping,
}

/// Outcome of one table phase
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableImportResult {
    pub table: String,
    /// True when no row failed
    pub success: bool,
    pub imported_count: usize,
    /// Rows already present at the destination
    pub skipped_count: usize,
    pub failed_count: usize,
    pub error_samples: Vec<String>,
    pub remapped_values: usize,
}

impl TableImportResult {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            success: true,
            ..Self::default()
        }
    }

    /// Count a failed row, keeping its message if the sample is not full
    pub fn record_failure(&mut self, message: String) {
        self.failed_count += 1;
        self.success = false;
        if self.error_samples.len() < MAX_ERROR_SAMPLES {
            self.error_samples.push(message);
        }
    }
}

/// Structured error reported in a failed envelope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseError {
    pub kind: String,
    pub message: String,
}

impl From<&MigrateError> for PhaseError {
    fn from(error: &MigrateError) -> Self {
        Self {
            kind: error.kind().to_string(),
            message: error.to_string(),
        }
    }
}

/// Response to every phase call
///
/// `ok` says whether the phase invocation itself worked. A table phase can be
/// `ok` while its data reports `success: false` for bad rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseEnvelope {
    pub phase: ImportPhase,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<PhaseError>,
}

impl PhaseEnvelope {
    pub fn success(phase: ImportPhase, data: Value) -> Self {
        Self {
            phase,
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn failure(phase: ImportPhase, error: &MigrateError) -> Self {
        Self {
            phase,
            ok: false,
            data: None,
            error: Some(PhaseError::from(error)),
        }
    }
}
