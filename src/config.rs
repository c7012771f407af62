// ABOUTME: TOML configuration for source, destination, identities and per-table rules
// ABOUTME: Resolves secrets from environment variables and validates required settings

use crate::error::{MigrateError, Result};
use crate::migration::remap::RemapScope;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Default number of rows or identities requested per source page
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Upper bound on the page size sent to the source
pub const MAX_PAGE_SIZE: usize = 1000;

/// Primary key column used when a table does not declare one
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// Top-level migration configuration
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MigrationConfig {
    #[serde(default)]
    pub source: Option<SourceConfig>,
    #[serde(default)]
    pub destination: DestinationConfig,
    #[serde(default)]
    pub identities: IdentityConfig,
    #[serde(default)]
    pub tables: BTreeMap<String, TableConfig>,
}

/// Live source export endpoint
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourceConfig {
    pub url: String,
    #[serde(default)]
    pub secret: Option<String>,
    #[serde(default)]
    pub secret_env: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
}

/// Destination database and account-management API
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DestinationConfig {
    #[serde(default)]
    pub database_url: Option<String>,
    #[serde(default)]
    pub database_url_env: Option<String>,
    #[serde(default)]
    pub schema: Option<String>,
    #[serde(default)]
    pub admin_url: Option<String>,
    #[serde(default)]
    pub service_key: Option<String>,
    #[serde(default)]
    pub service_key_env: Option<String>,
}

/// Settings for provisioning destination accounts
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct IdentityConfig {
    #[serde(default)]
    pub initial_password: Option<String>,
    #[serde(default)]
    pub initial_password_env: Option<String>,
}

/// Per-table import rules
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableConfig {
    /// Rewrite source identity ids found in this table's rows
    #[serde(default)]
    pub remap_identities: bool,
    /// Restrict the rewrite to these columns; all string columns when absent
    #[serde(default)]
    pub identity_columns: Option<Vec<String>>,
    #[serde(default)]
    pub primary_key: Option<String>,
}

/// Pick the inline value, else read the named environment variable
fn resolve_secret(inline: &Option<String>, env_name: &Option<String>) -> Option<String> {
    if let Some(value) = inline {
        return Some(value.clone());
    }
    env_name
        .as_ref()
        .and_then(|name| std::env::var(name).ok())
        .filter(|value| !value.trim().is_empty())
}

/// Clamp a requested page size into `1..=MAX_PAGE_SIZE`
pub fn clamp_page_size(requested: Option<usize>) -> usize {
    requested
        .unwrap_or(DEFAULT_PAGE_SIZE)
        .clamp(1, MAX_PAGE_SIZE)
}

impl MigrationConfig {
    /// Load and parse a TOML configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&content)
            .map_err(|e| MigrateError::Config(format!("{}: {}", path.display(), e)))?;
        tracing::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| MigrateError::Config(e.to_string()))
    }

    pub fn source(&self) -> Result<&SourceConfig> {
        self.source
            .as_ref()
            .ok_or_else(|| MigrateError::Config("missing [source] section".to_string()))
    }

    /// Remap scope for a table, or `None` if the table carries no identity references
    pub fn remap_scope(&self, table: &str) -> Option<RemapScope> {
        let rules = self.tables.get(table)?;
        if !rules.remap_identities {
            return None;
        }
        Some(match &rules.identity_columns {
            Some(columns) => RemapScope::Columns(columns.clone()),
            None => RemapScope::AllColumns,
        })
    }

    /// Primary key column used as the upsert conflict target
    pub fn primary_key(&self, table: &str) -> &str {
        self.tables
            .get(table)
            .and_then(|rules| rules.primary_key.as_deref())
            .unwrap_or(DEFAULT_PRIMARY_KEY)
    }

    pub fn initial_password(&self) -> Option<String> {
        resolve_secret(
            &self.identities.initial_password,
            &self.identities.initial_password_env,
        )
    }
}

impl SourceConfig {
    pub fn secret(&self) -> Result<String> {
        resolve_secret(&self.secret, &self.secret_env).ok_or_else(|| {
            MigrateError::Config("source secret is not set (secret or secret_env)".to_string())
        })
    }

    pub fn page_size(&self) -> usize {
        clamp_page_size(self.page_size)
    }
}

impl DestinationConfig {
    pub fn database_url(&self) -> Result<String> {
        resolve_secret(&self.database_url, &self.database_url_env).ok_or_else(|| {
            MigrateError::Config(
                "destination database URL is not set (database_url or database_url_env)"
                    .to_string(),
            )
        })
    }

    pub fn schema(&self) -> &str {
        self.schema.as_deref().unwrap_or("public")
    }

    pub fn admin_url(&self) -> Result<&str> {
        self.admin_url
            .as_deref()
            .ok_or_else(|| MigrateError::Config("destination admin_url is not set".to_string()))
    }

    pub fn service_key(&self) -> Result<String> {
        resolve_secret(&self.service_key, &self.service_key_env).ok_or_else(|| {
            MigrateError::Config(
                "destination service key is not set (service_key or service_key_env)".to_string(),
            )
        })
    }
}
