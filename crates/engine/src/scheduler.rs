//! Bounded-concurrency job scheduling.
//!
//! Each admitted job runs as its own task: connect, N generation cycles
//! with collection, cleanup. Admission is a hard ceiling; jobs over the
//! limit are rejected, never queued. All cross-job communication happens
//! through the event channel.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use {
    chrono::Local,
    easel_browser::{Connect, Surface},
    tokio::sync::{Mutex, mpsc},
    tokio_util::sync::CancellationToken,
    tracing::{info, warn},
};

use crate::{
    download::DownloadCoordinator,
    error::AdmissionError,
    events::{JobEvent, Reporter},
    generation::{GenerationController, WaitOutcome},
    matcher::default_matchers,
    pacing::{pause, random_delay},
    types::{JobId, JobSpec, JobStatus, Selectors, SequenceCounter, job_output_dir},
};

struct JobHandle {
    status: Arc<Mutex<JobStatus>>,
    cancel: CancellationToken,
}

struct Inner<C: Connect> {
    connector: C,
    selectors: Selectors,
    max_concurrent: usize,
    events: mpsc::UnboundedSender<JobEvent>,
    jobs: Mutex<HashMap<JobId, JobHandle>>,
    next_id: AtomicU64,
}

/// Owns the running jobs. Cheap to clone; clones share the same pool.
pub struct JobScheduler<C: Connect> {
    inner: Arc<Inner<C>>,
}

impl<C: Connect> Clone for JobScheduler<C> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<C: Connect> JobScheduler<C> {
    /// Build a scheduler and the single event receiver its jobs report to.
    pub fn new(
        connector: C,
        selectors: Selectors,
        max_concurrent: usize,
    ) -> (Self, mpsc::UnboundedReceiver<JobEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let scheduler = Self {
            inner: Arc::new(Inner {
                connector,
                selectors,
                max_concurrent: max_concurrent.max(1),
                events,
                jobs: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(0),
            }),
        };
        (scheduler, rx)
    }

    /// Admit and start a job, or reject it if the running ceiling is
    /// already reached.
    pub async fn submit(&self, spec: JobSpec) -> Result<JobId, AdmissionError> {
        let mut jobs = self.inner.jobs.lock().await;

        let mut running = 0;
        for handle in jobs.values() {
            if !handle.status.lock().await.is_terminal() {
                running += 1;
            }
        }
        if running >= self.inner.max_concurrent {
            return Err(AdmissionError { running, max: self.inner.max_concurrent });
        }

        let id = JobId(self.inner.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let status = Arc::new(Mutex::new(JobStatus::Pending));
        let cancel = CancellationToken::new();
        let reporter = Reporter::new(id, self.inner.events.clone());

        info!(job = %id, identity = spec.identity, iterations = spec.iterations, "job admitted");
        jobs.insert(id, JobHandle { status: status.clone(), cancel: cancel.clone() });
        drop(jobs);

        tokio::spawn(run_job(self.inner.clone(), spec, cancel, status, reporter));
        Ok(id)
    }

    /// Request a cooperative stop. The job unblocks at its next suspension
    /// point, runs cleanup, and finishes as `Stopped`. Returns `false` for
    /// an unknown id.
    pub async fn stop(&self, id: JobId) -> bool {
        let jobs = self.inner.jobs.lock().await;
        match jobs.get(&id) {
            Some(handle) => {
                info!(job = %id, "stop requested");
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Stop every job.
    pub async fn stop_all(&self) {
        let jobs = self.inner.jobs.lock().await;
        for (id, handle) in jobs.iter() {
            info!(job = %id, "stop requested");
            handle.cancel.cancel();
        }
    }

    pub async fn status(&self, id: JobId) -> Option<JobStatus> {
        let jobs = self.inner.jobs.lock().await;
        match jobs.get(&id) {
            Some(handle) => Some(*handle.status.lock().await),
            None => None,
        }
    }

    /// Drop the handles of finished jobs, returning how many were removed.
    ///
    /// Handles are otherwise retained so `status` stays answerable after a
    /// job ends; a long-lived embedder submitting many jobs should prune
    /// once it has read the terminal status it cares about.
    pub async fn prune_finished(&self) -> usize {
        let mut jobs = self.inner.jobs.lock().await;
        let mut finished = Vec::new();
        for (id, handle) in jobs.iter() {
            if handle.status.lock().await.is_terminal() {
                finished.push(*id);
            }
        }
        for id in &finished {
            jobs.remove(id);
        }
        finished.len()
    }
}

async fn set_status(status: &Arc<Mutex<JobStatus>>, reporter: &Reporter, new: JobStatus) {
    *status.lock().await = new;
    reporter.status(new);
}

/// How the iteration loop ended.
enum RunEnd {
    Completed,
    Stopped,
    Failed(String),
}

async fn run_job<C: Connect>(
    inner: Arc<Inner<C>>,
    spec: JobSpec,
    cancel: CancellationToken,
    status: Arc<Mutex<JobStatus>>,
    reporter: Reporter,
) {
    set_status(&status, &reporter, JobStatus::Connecting).await;
    reporter.info(format!("connecting to browser profile {}", spec.identity));

    let surface = match inner.connector.connect(&spec.identity).await {
        Ok(surface) => surface,
        Err(e) => {
            warn!(job = %reporter.job(), error = %e, "connection failed");
            reporter.error(format!("connection failed: {e}"));
            set_status(&status, &reporter, JobStatus::Failed).await;
            reporter.done(0);
            return;
        }
    };

    set_status(&status, &reporter, JobStatus::Running).await;
    let (artifacts, end) = run_iterations(&inner, &spec, &surface, &cancel, &reporter).await;

    // Cleanup runs on every exit path before the terminal status goes out.
    surface.close().await;

    match end {
        RunEnd::Completed => {
            info!(job = %reporter.job(), artifacts, "job completed");
            set_status(&status, &reporter, JobStatus::Completed).await;
        }
        RunEnd::Stopped => {
            info!(job = %reporter.job(), artifacts, "job stopped");
            set_status(&status, &reporter, JobStatus::Stopped).await;
        }
        RunEnd::Failed(message) => {
            warn!(job = %reporter.job(), artifacts, message, "job failed");
            reporter.error(message);
            set_status(&status, &reporter, JobStatus::Failed).await;
        }
    }
    reporter.done(artifacts);
}

async fn run_iterations<C: Connect>(
    inner: &Inner<C>,
    spec: &JobSpec,
    surface: &C::Surface,
    cancel: &CancellationToken,
    reporter: &Reporter,
) -> (u64, RunEnd) {
    let dir = job_output_dir(spec, Local::now());
    if let Err(e) = tokio::fs::create_dir_all(&dir).await {
        return (0, RunEnd::Failed(format!("cannot create {}: {e}", dir.display())));
    }

    let counter = SequenceCounter::new();
    let controller =
        GenerationController::new(surface, &inner.selectors, default_matchers(), reporter, cancel);
    let coordinator =
        DownloadCoordinator::new(surface, &inner.selectors, &counter, reporter, cancel);

    let total = spec.iterations;
    let mut artifacts: u64 = 0;

    for i in 0..total {
        if cancel.is_cancelled() {
            return (artifacts, RunEnd::Stopped);
        }
        reporter.progress(i + 1, total);

        // The shape sticks for the whole session, so only the first
        // iteration configures it.
        if i == 0 && !controller.configure_ratio(spec.ratio).await {
            if cancel.is_cancelled() {
                return (artifacts, RunEnd::Stopped);
            }
            reporter.warn("continuing with the app's current shape");
        }

        if !controller.submit_prompt(&spec.prompt).await {
            reporter.warn(format!("iteration {}: prompt not entered, skipping", i + 1));
        } else {
            let baseline = controller.result_baseline().await;
            if !controller.trigger().await {
                if cancel.is_cancelled() {
                    return (artifacts, RunEnd::Stopped);
                }
                reporter.warn(format!("iteration {}: trigger failed, skipping", i + 1));
            } else {
                match controller.await_completion(spec.generation_timeout, baseline).await {
                    WaitOutcome::Ready => {
                        let records = coordinator
                            .collect(&dir, &spec.file_prefix, spec.enhanced_capture)
                            .await;
                        artifacts += records.len() as u64;
                        reporter.info(format!(
                            "iteration {}: persisted {} artifact(s)",
                            i + 1,
                            records.len()
                        ));
                    }
                    WaitOutcome::TimedOut => {
                        reporter.warn(format!("iteration {}: generation timed out, skipping", i + 1));
                    }
                    WaitOutcome::Cancelled => return (artifacts, RunEnd::Stopped),
                }
            }
        }

        if i + 1 < total {
            let delay = random_delay(spec.min_delay, spec.max_delay);
            if !pause(delay, cancel).await {
                return (artifacts, RunEnd::Stopped);
            }
        }
    }

    (artifacts, RunEnd::Completed)
}
