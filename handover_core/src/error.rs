//! Error types for the handover_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for handover_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Rejected user input
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// No record matches the given identifier
    #[error("Not found: {0}")]
    NotFound(String),

    /// An identifier prefix matches more than one record
    #[error("Ambiguous identifier: {0}")]
    Ambiguous(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// User-input guard failures.
///
/// These are surfaced to the responder as a prompt; the rejected action
/// leaves every log and counter untouched.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please select a rhythm")]
    MissingRhythm,

    #[error("Please enter a valid shock energy (joules)")]
    InvalidShockEnergy,

    #[error("Please select a medication")]
    MissingMedication,

    #[error("Please select an intervention")]
    MissingIntervention,

    #[error("Note text cannot be empty")]
    EmptyNote,

    #[error("Compression rate must be a positive number of beats per minute")]
    InvalidRate,

    #[error("Invalid vital signs: {0}")]
    InvalidVitals(String),

    #[error("Invalid GCS assessment: {0}")]
    InvalidGcs(String),

    #[error("Patient name cannot be empty")]
    MissingName,
}
