// ABOUTME: CLI entry point for dump-migrator
// ABOUTME: Parses commands and routes to appropriate handlers

use clap::{Args, Parser, Subcommand};
use dump_migrator::commands::{self, RunOptions, SourceSelection};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "dump-migrator")]
#[command(
    about = "Migrate a SQL dump or a live export API into PostgreSQL, remapping account identities",
    long_about = None
)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Default)]
struct SourceArgs {
    /// Path to migration.toml with source, destination and table rules
    #[arg(long = "config")]
    config_path: Option<PathBuf>,
    /// Read rows and identities from this SQL dump instead of the export API
    #[arg(long = "dump")]
    dump_path: Option<PathBuf>,
}

impl From<SourceArgs> for SourceSelection {
    fn from(args: SourceArgs) -> Self {
        SourceSelection {
            config_path: args.config_path,
            dump_path: args.dump_path,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a SQL dump offline and report what it contains
    Parse {
        /// Dump file to parse
        dump: PathBuf,
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
        /// Print every decoded operation as a JSON line
        #[arg(long, conflicts_with = "json")]
        operations: bool,
    },
    /// Show tables, row counts and identity count at the source
    Summary {
        #[command(flatten)]
        source: SourceArgs,
        #[arg(long)]
        json: bool,
    },
    /// Provision destination accounts and save the identity mapping
    Identities {
        #[command(flatten)]
        source: SourceArgs,
        /// Where to write the identity mapping (JSON)
        #[arg(long, default_value = "identity-mapping.json")]
        mapping_out: PathBuf,
        /// Fabricate placeholder ids without contacting the destination
        #[arg(long)]
        dry_run: bool,
    },
    /// Import the rows of one table
    Table {
        #[command(flatten)]
        source: SourceArgs,
        /// Table to import
        #[arg(long)]
        table: String,
        /// Identity mapping written by the identities command
        #[arg(long)]
        mapping: Option<PathBuf>,
        /// Count rows without writing to the destination
        #[arg(long)]
        dry_run: bool,
    },
    /// Run every phase: summary, identities, then all tables
    Run {
        #[command(flatten)]
        source: SourceArgs,
        /// Import only these tables, in this order (comma-separated)
        #[arg(long, value_delimiter = ',')]
        tables: Vec<String>,
        /// Reuse a saved identity mapping instead of importing identities
        #[arg(long)]
        mapping: Option<PathBuf>,
        /// Where to write the identity mapping (JSON)
        #[arg(long)]
        mapping_out: Option<PathBuf>,
        /// Rehearse the migration without contacting the destination
        #[arg(long)]
        dry_run: bool,
        /// Skip confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Run one JSON phase request and print the JSON envelope
    Phase {
        #[command(flatten)]
        source: SourceArgs,
        /// Request such as {"phase":"summary"}, or - to read it from stdin
        request: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging - default to INFO level if RUST_LOG not set
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Parse {
            dump,
            json,
            operations,
        } => commands::parse(&dump, json, operations),
        Commands::Summary { source, json } => commands::summary(&source.into(), json).await,
        Commands::Identities {
            source,
            mapping_out,
            dry_run,
        } => commands::identities(&source.into(), &mapping_out, dry_run).await,
        Commands::Table {
            source,
            table,
            mapping,
            dry_run,
        } => commands::table(&source.into(), &table, mapping.as_deref(), dry_run).await,
        Commands::Run {
            source,
            tables,
            mapping,
            mapping_out,
            dry_run,
            yes,
        } => {
            let options = RunOptions {
                dry_run,
                yes,
                tables,
                mapping_in: mapping,
                mapping_out,
            };
            commands::run(&source.into(), &options).await
        }
        Commands::Phase { source, request } => commands::phase(&source.into(), &request).await,
    }
}
