// ABOUTME: Destination capabilities consumed by the orchestrator: row upsert and identity provisioning
// ABOUTME: Implemented by PostgreSQL, an account-management admin API, and an offline stand-in

pub mod admin;
pub mod postgres;

pub use admin::AdminIdentityProvider;
pub use postgres::PgRowStore;

use crate::dump::Record;
use crate::error::{MigrateError, Result};
use serde_json::Value;
use std::future::Future;

/// What happened to one upserted row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    /// A row with the same key already exists; nothing was written
    AlreadyPresent,
}

/// Account to provision at the destination, already email-verified
#[derive(Debug, Clone, PartialEq)]
pub struct NewIdentity {
    pub email: String,
    pub password: Option<String>,
    pub metadata: Option<Value>,
}

/// Row persistence at the destination
pub trait RowStore {
    /// Insert `row` into `table`, ignoring a conflict on `primary_key`
    fn upsert(
        &self,
        table: &str,
        primary_key: &str,
        row: &Record,
    ) -> impl Future<Output = Result<UpsertOutcome>> + Send;
}

/// Account management at the destination
pub trait IdentityProvider {
    /// Destination id of the account whose email matches case-insensitively
    fn find_by_email(&self, email: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Provision a pre-verified account and return its destination id
    fn create(&self, identity: &NewIdentity) -> impl Future<Output = Result<String>> + Send;
}

/// Stand-in destination used for dry runs; every call fails
///
/// The orchestrator never calls the destination in dry-run mode, so reaching
/// this is a bug in the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct Offline;

impl Offline {
    fn unavailable() -> MigrateError {
        MigrateError::DestinationUnavailable("destination is offline for this run".to_string())
    }
}

impl RowStore for Offline {
    async fn upsert(&self, _table: &str, _primary_key: &str, _row: &Record) -> Result<UpsertOutcome> {
        Err(Self::unavailable())
    }
}

impl IdentityProvider for Offline {
    async fn find_by_email(&self, _email: &str) -> Result<Option<String>> {
        Err(Self::unavailable())
    }

    async fn create(&self, _identity: &NewIdentity) -> Result<String> {
        Err(Self::unavailable())
    }
}

/// Row store chosen at runtime by the CLI
pub enum AnyRowStore {
    Postgres(PgRowStore),
    Offline(Offline),
}

impl RowStore for AnyRowStore {
    async fn upsert(&self, table: &str, primary_key: &str, row: &Record) -> Result<UpsertOutcome> {
        match self {
            AnyRowStore::Postgres(store) => store.upsert(table, primary_key, row).await,
            AnyRowStore::Offline(store) => store.upsert(table, primary_key, row).await,
        }
    }
}

/// Identity provider chosen at runtime by the CLI
pub enum AnyIdentityProvider {
    Admin(AdminIdentityProvider),
    Offline(Offline),
}

impl IdentityProvider for AnyIdentityProvider {
    async fn find_by_email(&self, email: &str) -> Result<Option<String>> {
        match self {
            AnyIdentityProvider::Admin(provider) => provider.find_by_email(email).await,
            AnyIdentityProvider::Offline(provider) => provider.find_by_email(email).await,
        }
    }

    async fn create(&self, identity: &NewIdentity) -> Result<String> {
        match self {
            AnyIdentityProvider::Admin(provider) => provider.create(identity).await,
            AnyIdentityProvider::Offline(provider) => provider.create(identity).await,
        }
    }
}

/// Case-insensitive email comparison ignoring surrounding whitespace
pub fn emails_match(a: &str, b: &str) -> bool {
    a.trim().to_lowercase() == b.trim().to_lowercase()
}
