// ABOUTME: Phased migration driver: summary, identity provisioning, and per-table row import
// ABOUTME: Stateless between calls; the identity mapping is supplied by the caller on each table phase

use super::mapping::IdentityMapping;
use super::phase::{IdentityImportResult, PhaseEnvelope, PhaseRequest, TableImportResult};
use super::remap::remap_row;
use crate::config::{clamp_page_size, MigrationConfig, DEFAULT_PAGE_SIZE};
use crate::destination::{IdentityProvider, NewIdentity, RowStore, UpsertOutcome};
use crate::dump::{IdentityRecord, Record};
use crate::error::{MigrateError, Result};
use crate::source::{Manifest, Source};
use serde::Serialize;
use serde_json::Value;

enum Provisioned {
    Created(String),
    Existing(String),
}

/// Drives migration phases from a source to a destination
///
/// Pages are fetched and processed strictly in order. Nothing is remembered
/// between calls, so any table phase can be re-run from page zero; the
/// destination's conflict handling makes the second run a no-op.
pub struct Migrator<S, R, I> {
    source: S,
    rows: R,
    identities: I,
    config: MigrationConfig,
    page_size: usize,
}

impl<S, R, I> Migrator<S, R, I>
where
    S: Source + Sync,
    R: RowStore + Sync,
    I: IdentityProvider + Sync,
{
    pub fn new(source: S, rows: R, identities: I, config: MigrationConfig) -> Self {
        let page_size = config
            .source
            .as_ref()
            .map(|source| source.page_size())
            .unwrap_or(DEFAULT_PAGE_SIZE);

        Self {
            source,
            rows,
            identities,
            config,
            page_size,
        }
    }

    /// Override the page size, clamped to the allowed range
    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = clamp_page_size(Some(page_size));
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn rows(&self) -> &R {
        &self.rows
    }

    pub fn identities(&self) -> &I {
        &self.identities
    }

    /// Summary phase: the source manifest, read-only
    pub async fn summary(&self) -> Result<Manifest> {
        self.source.summary().await
    }

    /// Identities phase: map every source identity to a destination account
    ///
    /// Accounts are matched by email first and created only when missing.
    /// A refused identity is logged and left out of the mapping; losing the
    /// source or the destination credentials aborts the phase.
    pub async fn import_identities(&self, dry_run: bool) -> Result<IdentityImportResult> {
        let mut result = IdentityImportResult::default();
        let mut page = 0;

        loop {
            let batch = self.source.identities_page(page, self.page_size).await?;
            if batch.is_empty() {
                break;
            }
            tracing::debug!("Identity page {} holds {} account(s)", page, batch.len());

            for identity in batch {
                if identity.source_id.trim().is_empty() || identity.email.trim().is_empty() {
                    tracing::warn!(
                        "Skipping source identity without id or email ({})",
                        crate::utils::sanitize_for_display(&identity.source_id)
                    );
                    continue;
                }

                if dry_run {
                    let placeholder = uuid::Uuid::new_v4().to_string();
                    if result.mapping.record(&identity.source_id, &placeholder) {
                        result.created += 1;
                    }
                    continue;
                }

                let provisioned = match self.provision(&identity).await {
                    Ok(provisioned) => provisioned,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        tracing::warn!("Identity {} not migrated: {}", identity.source_id, e);
                        result.failed += 1;
                        continue;
                    }
                };

                let (destination_id, created) = match provisioned {
                    Provisioned::Created(id) => (id, true),
                    Provisioned::Existing(id) => (id, false),
                };
                if !result.mapping.record(&identity.source_id, &destination_id) {
                    result.failed += 1;
                } else if created {
                    result.created += 1;
                } else {
                    result.skipped += 1;
                }
            }

            page += 1;
        }

        tracing::info!(
            "Identities: {} created, {} already present, {} failed{}",
            result.created,
            result.skipped,
            result.failed,
            if dry_run { " (dry run)" } else { "" }
        );
        Ok(result)
    }

    async fn provision(&self, identity: &IdentityRecord) -> Result<Provisioned> {
        if let Some(existing) = self.identities.find_by_email(&identity.email).await? {
            tracing::debug!("{} already has destination account {}", identity.email, existing);
            return Ok(Provisioned::Existing(existing));
        }

        let created = self
            .identities
            .create(&NewIdentity {
                email: identity.email.clone(),
                password: self.config.initial_password(),
                metadata: identity.metadata.clone(),
            })
            .await?;
        Ok(Provisioned::Created(created))
    }

    /// Table phase: copy every row of `table`, remapping identity references
    ///
    /// Conflicts count as skipped. Other row failures are counted, the first
    /// few are kept as samples, and the import moves on to the next row.
    pub async fn import_table(
        &self,
        table: &str,
        mapping: &IdentityMapping,
        dry_run: bool,
    ) -> Result<TableImportResult> {
        if table.trim().is_empty() {
            return Err(MigrateError::Config("table name is empty".to_string()));
        }

        let scope = self.config.remap_scope(table);
        let primary_key = self.config.primary_key(table);
        let mut result = TableImportResult::new(table);
        let mut page = 0;

        if scope.is_some() && mapping.is_empty() {
            tracing::warn!(
                "Table {} remaps identities but the identity mapping is empty",
                table
            );
        }

        loop {
            let rows = self.source.export_page(table, page, self.page_size).await?;
            if rows.is_empty() {
                break;
            }
            tracing::debug!("Table {} page {} holds {} row(s)", table, page, rows.len());

            for mut row in rows {
                if let Some(scope) = &scope {
                    result.remapped_values += remap_row(&mut row, mapping, scope);
                }

                if dry_run {
                    result.imported_count += 1;
                    continue;
                }

                match self.rows.upsert(table, primary_key, &row).await {
                    Ok(UpsertOutcome::Inserted) => result.imported_count += 1,
                    Ok(UpsertOutcome::AlreadyPresent) => result.skipped_count += 1,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        let message = format!("row {}: {}", row_label(&row, primary_key), e);
                        tracing::debug!("Table {}: {}", table, message);
                        result.record_failure(message);
                    }
                }
            }

            page += 1;
        }

        tracing::info!(
            "Table {}: {} imported, {} already present, {} failed{}",
            table,
            result.imported_count,
            result.skipped_count,
            result.failed_count,
            if dry_run { " (dry run)" } else { "" }
        );
        Ok(result)
    }

    /// Run one phase and wrap its outcome; never fails
    pub async fn run_phase(&self, request: PhaseRequest) -> PhaseEnvelope {
        let phase = request.phase();
        let outcome = match request {
            PhaseRequest::Summary => to_data(self.summary().await),
            PhaseRequest::Identities { dry_run } => to_data(self.import_identities(dry_run).await),
            PhaseRequest::Table {
                table_name,
                identity_mapping,
                dry_run,
            } => to_data(
                self.import_table(&table_name, &identity_mapping, dry_run)
                    .await,
            ),
        };

        match outcome {
            Ok(data) => PhaseEnvelope::success(phase, data),
            Err(e) => {
                tracing::error!("Phase {} failed: {}", phase, e);
                PhaseEnvelope::failure(phase, &e)
            }
        }
    }
}

fn to_data<T: Serialize>(result: Result<T>) -> Result<Value> {
    Ok(serde_json::to_value(result?)?)
}

/// Short description of a row for error samples
fn row_label(row: &Record, primary_key: &str) -> String {
    match row.get(primary_key) {
        Some(Value::String(key)) => crate::utils::sanitize_for_display(key),
        Some(Value::Null) | None => "without key".to_string(),
        Some(other) => crate::utils::sanitize_for_display(&other.to_string()),
    }
}
