// ABOUTME: PostgreSQL row store for the destination database
// ABOUTME: Upserts JSON rows through json_populate_record with ON CONFLICT DO NOTHING

use super::{RowStore, UpsertOutcome};
use crate::dump::Record;
use crate::error::{MigrateError, Result};
use crate::utils::quote_ident;
use serde_json::Value;
use tokio_postgres::error::SqlState;
use tokio_postgres::Client;

/// Build the upsert statement for the given columns
///
/// Values travel as a single JSON parameter and are converted to the table's
/// column types by `json_populate_record`, so no per-column type mapping is
/// needed here. Columns absent from the row keep their defaults.
pub fn build_upsert_sql(
    schema: &str,
    table: &str,
    columns: &[&str],
    conflict_key: Option<&str>,
) -> String {
    let qualified = format!("{}.{}", quote_ident(schema), quote_ident(table));
    let column_list = columns
        .iter()
        .map(|column| quote_ident(column))
        .collect::<Vec<_>>()
        .join(", ");
    let conflict = match conflict_key {
        Some(key) => format!("ON CONFLICT ({}) DO NOTHING", quote_ident(key)),
        None => "ON CONFLICT DO NOTHING".to_string(),
    };

    format!(
        "INSERT INTO {qualified} ({columns}) SELECT {columns} FROM json_populate_record(NULL::{qualified}, $1::json) {conflict}",
        qualified = qualified,
        columns = column_list,
        conflict = conflict
    )
}

/// Destination rows in a PostgreSQL schema
pub struct PgRowStore {
    client: Client,
    schema: String,
}

impl PgRowStore {
    pub fn new(client: Client, schema: impl Into<String>) -> Self {
        Self {
            client,
            schema: schema.into(),
        }
    }

    /// Connect with TLS and retries, see [`crate::postgres::connect_with_retry`]
    pub async fn connect(connection_string: &str, schema: &str) -> Result<Self> {
        crate::utils::validate_connection_string(connection_string)
            .map_err(|e| MigrateError::Config(e.to_string()))?;

        let client = crate::postgres::connect_with_retry(connection_string)
            .await
            .map_err(|e| MigrateError::DestinationUnavailable(format!("{:#}", e)))?;

        tracing::info!("Connected to destination database (schema '{}')", schema);
        Ok(Self::new(client, schema))
    }
}

impl RowStore for PgRowStore {
    async fn upsert(&self, table: &str, primary_key: &str, row: &Record) -> Result<UpsertOutcome> {
        if row.is_empty() {
            return Err(MigrateError::DestinationRejected(
                "row has no columns".to_string(),
            ));
        }
        if self.client.is_closed() {
            return Err(MigrateError::DestinationUnavailable(
                "database connection closed".to_string(),
            ));
        }

        let columns: Vec<&str> = row.keys().map(String::as_str).collect();
        // Without the key column there is no conflict target to name
        let conflict_key = row.contains_key(primary_key).then_some(primary_key);
        let sql = build_upsert_sql(&self.schema, table, &columns, conflict_key);
        let payload = Value::Object(row.clone());

        match self.client.execute(sql.as_str(), &[&payload]).await {
            Ok(0) => Ok(UpsertOutcome::AlreadyPresent),
            Ok(_) => Ok(UpsertOutcome::Inserted),
            Err(e) if e.code() == Some(&SqlState::UNIQUE_VIOLATION) => {
                // Conflict on a unique constraint other than the key
                Ok(UpsertOutcome::AlreadyPresent)
            }
            Err(e) => match e.as_db_error() {
                Some(db_error) => Err(MigrateError::DestinationRejected(format!(
                    "{} ({})",
                    db_error.message(),
                    db_error.code().code()
                ))),
                None if self.client.is_closed() => {
                    Err(MigrateError::DestinationUnavailable(e.to_string()))
                }
                None => Err(MigrateError::DestinationRejected(e.to_string())),
            },
        }
    }
}
