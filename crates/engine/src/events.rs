//! Job events.
//!
//! Workers push events into one unbounded channel; a single consumer loop
//! drains it. Per-job ordering is whatever the worker emitted, since each
//! job has exactly one producer task.

use tokio::sync::mpsc;

use crate::types::{JobId, JobStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Info,
    Warn,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    Log { level: LogLevel, message: String },
    /// Iteration progress, 1-based.
    Progress { current: u32, total: u32 },
    Status(JobStatus),
    Error(String),
    /// Terminal event; always the last one a job emits.
    Done { artifacts: u64 },
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobEvent {
    pub job: JobId,
    pub kind: EventKind,
}

/// Per-job handle for emitting events. Sends never fail the worker: if the
/// consumer is gone the event is simply dropped.
#[derive(Debug, Clone)]
pub struct Reporter {
    job: JobId,
    tx: mpsc::UnboundedSender<JobEvent>,
}

impl Reporter {
    pub fn new(job: JobId, tx: mpsc::UnboundedSender<JobEvent>) -> Self {
        Self { job, tx }
    }

    pub fn job(&self) -> JobId {
        self.job
    }

    fn emit(&self, kind: EventKind) {
        let _ = self.tx.send(JobEvent { job: self.job, kind });
    }

    pub fn info(&self, message: impl Into<String>) {
        self.emit(EventKind::Log { level: LogLevel::Info, message: message.into() });
    }

    pub fn warn(&self, message: impl Into<String>) {
        self.emit(EventKind::Log { level: LogLevel::Warn, message: message.into() });
    }

    pub fn progress(&self, current: u32, total: u32) {
        self.emit(EventKind::Progress { current, total });
    }

    pub fn status(&self, status: JobStatus) {
        self.emit(EventKind::Status(status));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(EventKind::Error(message.into()));
    }

    pub fn done(&self, artifacts: u64) {
        self.emit(EventKind::Done { artifacts });
    }
}
