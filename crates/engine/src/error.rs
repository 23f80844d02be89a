//! Engine error types.
//!
//! Most mid-run problems are soft and handled in place (logged, slot or
//! iteration skipped); only the errors here cross an API boundary.

use thiserror::Error;

/// A submission was refused because the running-job ceiling is reached.
/// Jobs are rejected, not queued.
#[derive(Debug, Error)]
#[error("{running} job(s) running, limit is {max}")]
pub struct AdmissionError {
    pub running: usize,
    pub max: usize,
}

/// The requested output shape is not one the target app offers.
/// Raised before any UI mutation happens.
#[derive(Debug, Error)]
#[error("unsupported aspect ratio {0:?}")]
pub struct UnsupportedShape(pub String);
