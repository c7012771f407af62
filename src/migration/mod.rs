// ABOUTME: Migration engine module
// ABOUTME: Identity mapping, row remapping, phase types and the phased orchestrator

pub mod mapping;
pub mod orchestrator;
pub mod phase;
pub mod remap;

pub use mapping::IdentityMapping;
pub use orchestrator::Migrator;
pub use phase::{
    IdentityImportResult, ImportPhase, PhaseEnvelope, PhaseError, PhaseRequest,
    TableImportResult, MAX_ERROR_SAMPLES,
};
pub use remap::{remap_row, RemapScope};
