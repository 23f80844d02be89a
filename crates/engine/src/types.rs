//! Core job and artifact types.

use std::{
    fmt,
    path::PathBuf,
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use chrono::{DateTime, Local};

use crate::error::UnsupportedShape;

/// Identifier assigned to a job on admission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct JobId(pub u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Output shapes the target app offers. Anything else is rejected by
/// [`AspectRatio::parse`] before a job is built, so no UI mutation can
/// happen for an unsupported shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AspectRatio {
    #[default]
    Square,
    Landscape,
    Portrait,
    Widescreen,
    Vertical,
}

impl AspectRatio {
    pub const ALL: [AspectRatio; 5] = [
        AspectRatio::Square,
        AspectRatio::Landscape,
        AspectRatio::Portrait,
        AspectRatio::Widescreen,
        AspectRatio::Vertical,
    ];

    /// The label the app uses for this shape.
    pub fn label(self) -> &'static str {
        match self {
            AspectRatio::Square => "1:1",
            AspectRatio::Landscape => "4:3",
            AspectRatio::Portrait => "3:4",
            AspectRatio::Widescreen => "16:9",
            AspectRatio::Vertical => "9:16",
        }
    }

    pub fn parse(s: &str) -> Result<Self, UnsupportedShape> {
        let wanted = s.trim();
        Self::ALL
            .into_iter()
            .find(|r| r.label() == wanted)
            .ok_or_else(|| UnsupportedShape(wanted.to_string()))
    }
}

impl fmt::Display for AspectRatio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Lifecycle of one job. Terminal once `Completed`, `Failed` or `Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Connecting,
    Running,
    Completed,
    Failed,
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Stopped)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Connecting => "connecting",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

/// Everything needed to run one job.
#[derive(Debug, Clone)]
pub struct JobSpec {
    /// Browser profile to attach to.
    pub identity: String,
    /// Short human name, used for the per-job subfolder.
    pub name: Option<String>,
    pub prompt: String,
    pub ratio: AspectRatio,
    /// Generation cycles to run.
    pub iterations: u32,
    pub output_dir: PathBuf,
    pub file_prefix: String,
    pub per_job_subfolder: bool,
    /// Capture the rendered element when a native export fails.
    pub enhanced_capture: bool,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub generation_timeout: Duration,
}

/// One artifact persisted to disk.
#[derive(Debug, Clone)]
pub struct ArtifactRecord {
    pub sequence: u64,
    pub slot: String,
    pub file_name: String,
    pub created_at: DateTime<Local>,
}

/// Per-job source of artifact sequence numbers. The counter itself is
/// never readable; `next()` is the only operation, so there is no way to
/// observe or race a stale value.
#[derive(Debug, Default)]
pub struct SequenceCounter(AtomicU64);

impl SequenceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the next sequence number, starting at 1.
    pub fn next(&self) -> u64 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Deterministic label for the n-th artifact of an iteration, counted
/// left to right.
pub fn slot_label(index: usize) -> String {
    match index {
        0 => "left".into(),
        1 => "right".into(),
        n => format!("slot{}", n + 1),
    }
}

/// Reduce a job name to something safe in a directory name.
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .take(40)
        .collect();
    if cleaned.is_empty() { "job".into() } else { cleaned }
}

/// Directory a job writes into: the configured base, plus an optional
/// per-job subfolder named after the job and its start time.
pub fn job_output_dir(spec: &JobSpec, started: DateTime<Local>) -> PathBuf {
    if !spec.per_job_subfolder {
        return spec.output_dir.clone();
    }
    let name = spec.name.as_deref().unwrap_or(&spec.identity);
    spec.output_dir
        .join(format!("{}_{}", sanitize_name(name), started.format("%H%M%S")))
}

/// CSS entry points, converted from the config schema.
#[derive(Debug, Clone)]
pub struct Selectors {
    pub prompt_input: String,
    pub settings_toggle: String,
    pub ratio_option: String,
    pub result_image: String,
    pub export_control: String,
}

impl From<&easel_config::SelectorSection> for Selectors {
    fn from(s: &easel_config::SelectorSection) -> Self {
        Self {
            prompt_input: s.prompt_input.clone(),
            settings_toggle: s.settings_toggle.clone(),
            ratio_option: s.ratio_option.clone(),
            result_image: s.result_image.clone(),
            export_control: s.export_control.clone(),
        }
    }
}

impl Default for Selectors {
    fn default() -> Self {
        Self::from(&easel_config::SelectorSection::default())
    }
}
