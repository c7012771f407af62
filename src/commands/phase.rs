// ABOUTME: Phase command implementation - Run one JSON phase request
// ABOUTME: Prints the JSON envelope so a remote caller can drive a migration step by step

use super::{build_migrator, DestinationNeeds, SourceSelection};
use crate::migration::PhaseRequest;
use anyhow::{bail, Context, Result};
use std::io::Read;

/// Decode a phase request given inline or, for `-`, from stdin
fn read_request(request: &str) -> Result<PhaseRequest> {
    let text = if request == "-" {
        let mut buffer = String::new();
        std::io::stdin()
            .read_to_string(&mut buffer)
            .context("Failed to read phase request from stdin")?;
        buffer
    } else {
        request.to_string()
    };

    serde_json::from_str(&text).context("Invalid phase request")
}

fn needs_for(request: &PhaseRequest) -> (DestinationNeeds, bool) {
    match request {
        PhaseRequest::Summary => (DestinationNeeds::NONE, true),
        PhaseRequest::Identities { dry_run } => (
            DestinationNeeds {
                rows: false,
                identities: true,
            },
            *dry_run,
        ),
        PhaseRequest::Table { dry_run, .. } => (
            DestinationNeeds {
                rows: true,
                identities: false,
            },
            *dry_run,
        ),
    }
}

/// Run a phase request and print the envelope as JSON
///
/// Fails after printing when the envelope reports an aborted phase, so the
/// exit status mirrors `ok`.
pub async fn phase(selection: &SourceSelection, request: &str) -> Result<()> {
    let request = read_request(request)?;
    let (needs, dry_run) = needs_for(&request);
    let migrator = build_migrator(selection, needs, dry_run).await?;

    let envelope = migrator.run_phase(request).await;
    println!("{}", serde_json::to_string_pretty(&envelope)?);

    if !envelope.ok {
        bail!("Phase {} failed", envelope.phase);
    }
    Ok(())
}
