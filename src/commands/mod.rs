// ABOUTME: Command implementations for each migration phase
// ABOUTME: Exports parse, summary, identities, table, run and phase commands plus shared setup

pub mod identities;
pub mod parse;
pub mod phase;
pub mod run;
pub mod summary;
pub mod table;

pub use identities::identities;
pub use parse::parse;
pub use phase::phase;
pub use run::{run, RunOptions};
pub use summary::summary;
pub use table::table;

use crate::config::MigrationConfig;
use crate::destination::{
    AdminIdentityProvider, AnyIdentityProvider, AnyRowStore, Offline, PgRowStore,
};
use crate::migration::Migrator;
use crate::source::{AnySource, DumpSource, HttpSource};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Migrator over runtime-selected source and destination
pub type CliMigrator = Migrator<AnySource, AnyRowStore, AnyIdentityProvider>;

/// Where rows and identities are read from, as given on the command line
#[derive(Debug, Clone, Default)]
pub struct SourceSelection {
    pub config_path: Option<PathBuf>,
    /// Read a SQL dump instead of calling the source export API
    pub dump_path: Option<PathBuf>,
}

/// Which destination capabilities a command needs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DestinationNeeds {
    pub rows: bool,
    pub identities: bool,
}

impl DestinationNeeds {
    pub const NONE: Self = Self {
        rows: false,
        identities: false,
    };
    pub const ALL: Self = Self {
        rows: true,
        identities: true,
    };
}

/// Load the config file, or defaults when none was given
pub fn load_config(path: Option<&Path>) -> Result<MigrationConfig> {
    match path {
        Some(path) => MigrationConfig::load(path)
            .with_context(|| format!("Failed to load configuration from {}", path.display())),
        None => Ok(MigrationConfig::default()),
    }
}

/// Open the dump file if given, otherwise the configured export API
pub fn open_source(config: &MigrationConfig, dump_path: Option<&Path>) -> Result<AnySource> {
    if let Some(path) = dump_path {
        let source = DumpSource::from_file(path)
            .with_context(|| format!("Failed to read dump {}", path.display()))?;
        return Ok(AnySource::Dump(source));
    }

    let source_config = config
        .source()
        .context("No --dump given and the configuration has no [source] section")?;
    let source = HttpSource::from_config(source_config).context("Invalid source settings")?;
    tracing::info!("Using source export API at {}", source_config.url);
    Ok(AnySource::Http(source))
}

/// Connect the destination capabilities a command needs
///
/// Dry runs and unneeded capabilities get the offline stand-in, so no
/// destination credentials are required for them.
pub async fn open_destination(
    config: &MigrationConfig,
    needs: DestinationNeeds,
    dry_run: bool,
) -> Result<(AnyRowStore, AnyIdentityProvider)> {
    let rows = if needs.rows && !dry_run {
        let url = config.destination.database_url()?;
        let store = PgRowStore::connect(&url, config.destination.schema())
            .await
            .context("Failed to connect to destination database")?;
        AnyRowStore::Postgres(store)
    } else {
        AnyRowStore::Offline(Offline)
    };

    let identities = if needs.identities && !dry_run {
        let provider = AdminIdentityProvider::new(
            config.destination.admin_url()?,
            config.destination.service_key()?,
        )?;
        AnyIdentityProvider::Admin(provider)
    } else {
        AnyIdentityProvider::Offline(Offline)
    };

    Ok((rows, identities))
}

/// Build a migrator for the given selection
pub async fn build_migrator(
    selection: &SourceSelection,
    needs: DestinationNeeds,
    dry_run: bool,
) -> Result<CliMigrator> {
    let config = load_config(selection.config_path.as_deref())?;
    let source = open_source(&config, selection.dump_path.as_deref())?;
    let (rows, identities) = open_destination(&config, needs, dry_run).await?;
    Ok(Migrator::new(source, rows, identities, config))
}
