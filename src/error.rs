// ABOUTME: Error taxonomy for source, destination and configuration failures
// ABOUTME: Classifies which failures abort a phase and which are captured per item

use thiserror::Error;

/// Result type used across the migration engine
pub type Result<T> = std::result::Result<T, MigrateError>;

/// Errors raised while talking to the source, the destination, or loading config
///
/// Malformed dump statements are never errors: the decoders return `None` for
/// anything outside the simple insert/delete shapes they understand.
#[derive(Debug, Error)]
pub enum MigrateError {
    /// The source endpoint could not be reached
    #[error("Source transport error: {0}")]
    SourceTransport(String),

    /// The source rejected the shared secret
    #[error("Source rejected credentials (HTTP {0})")]
    SourceUnauthorized(u16),

    /// The source answered with a non-success status
    #[error("Source returned HTTP {status}: {body}")]
    SourceStatus { status: u16, body: String },

    /// The source answered with a body we could not decode
    #[error("Source response could not be decoded: {0}")]
    SourceDecode(String),

    /// The destination rejected the administrative credentials
    #[error("Destination rejected credentials (HTTP {0})")]
    DestinationUnauthorized(u16),

    /// The destination connection is gone; no further calls can succeed
    #[error("Destination unavailable: {0}")]
    DestinationUnavailable(String),

    /// The destination refused one row or one identity
    #[error("Destination rejected request: {0}")]
    DestinationRejected(String),

    /// Configuration loading or validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error while reading a dump, config or mapping file
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A mapping file or phase payload is not valid JSON
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MigrateError {
    /// Stable machine-readable name for the error, used in phase envelopes
    pub fn kind(&self) -> &'static str {
        match self {
            MigrateError::SourceTransport(_) => "source_transport",
            MigrateError::SourceUnauthorized(_) => "source_unauthorized",
            MigrateError::SourceStatus { .. } => "source_status",
            MigrateError::SourceDecode(_) => "source_decode",
            MigrateError::DestinationUnauthorized(_) => "destination_unauthorized",
            MigrateError::DestinationUnavailable(_) => "destination_unavailable",
            MigrateError::DestinationRejected(_) => "destination_rejected",
            MigrateError::Config(_) => "config",
            MigrateError::Io(_) => "io",
            MigrateError::Json(_) => "json",
        }
    }

    /// Whether this error must abort the current phase invocation
    ///
    /// Per-row and per-identity rejections are captured and the phase keeps
    /// going. Everything coming from the source is fatal, as is losing the
    /// destination or its credentials.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, MigrateError::DestinationRejected(_))
    }
}
