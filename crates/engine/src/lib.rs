//! Job orchestration engine: drives prompt submission, generation waits,
//! and artifact collection over an [`easel_browser::Surface`], with a
//! bounded pool of concurrent jobs reporting through one event channel.

pub mod download;
pub mod error;
pub mod events;
pub mod generation;
pub mod matcher;
pub mod pacing;
pub mod scheduler;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use download::DownloadCoordinator;
pub use error::{AdmissionError, UnsupportedShape};
pub use events::{EventKind, JobEvent, LogLevel, Reporter};
pub use generation::{GenerationController, WaitOutcome};
pub use matcher::{LabelMatcher, default_matchers};
pub use scheduler::JobScheduler;
pub use types::{
    ArtifactRecord, AspectRatio, JobId, JobSpec, JobStatus, Selectors, SequenceCounter,
};
