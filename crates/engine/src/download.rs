//! Artifact collection for one generation cycle.
//!
//! Export affordances are processed left to right so slot labels are
//! stable across renders, whatever order the DOM enumerates them in. A
//! failed native export falls back to capturing the rendered element at
//! the same ordinal position; a failed capture skips that slot. Partial
//! collection is normal, not an error.

use std::path::Path;

use {
    chrono::{DateTime, Local},
    easel_browser::{Query, Surface},
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use crate::{
    events::Reporter,
    generation::visible_results,
    pacing::{self, pause},
    types::{ArtifactRecord, Selectors, SequenceCounter, slot_label},
};

/// Extension used when a native export carries none.
const DEFAULT_EXPORT_EXT: &str = "jpg";

/// Extension for fallback captures.
const CAPTURE_EXT: &str = "png";

fn artifact_name(prefix: &str, at: DateTime<Local>, sequence: u64, slot: &str, ext: &str) -> String {
    format!("{prefix}_{}_{sequence:03}_{slot}.{ext}", at.format("%Y%m%d_%H%M%S"))
}

/// Collects the artifacts of one finished generation cycle.
pub struct DownloadCoordinator<'a, S: Surface> {
    surface: &'a S,
    selectors: &'a Selectors,
    counter: &'a SequenceCounter,
    reporter: &'a Reporter,
    cancel: &'a CancellationToken,
}

impl<'a, S: Surface> DownloadCoordinator<'a, S> {
    pub fn new(
        surface: &'a S,
        selectors: &'a Selectors,
        counter: &'a SequenceCounter,
        reporter: &'a Reporter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self { surface, selectors, counter, reporter, cancel }
    }

    /// Persist every collectable artifact into `dir` and return the
    /// records, in slot order. Sequence numbers are claimed only once a
    /// file is assured, so the persisted set is dense: no gaps even when
    /// some slots fail over to capture or are skipped.
    pub async fn collect(
        &self,
        dir: &Path,
        file_prefix: &str,
        enhanced_capture: bool,
    ) -> Vec<ArtifactRecord> {
        let mut records = Vec::new();

        if !self.surface.prepare_exports(dir).await {
            self.reporter.warn("could not route transfers to the output directory");
        }

        let mut affordances = self
            .surface
            .find_all_visible(&Query::css(self.selectors.export_control.clone()))
            .await;
        if affordances.is_empty() {
            self.reporter.info("no export affordances visible, nothing to collect");
            return records;
        }
        affordances.sort_by(|a, b| a.bounds.x.total_cmp(&b.bounds.x));

        for (index, affordance) in affordances.iter().enumerate() {
            if index > 0 && !pause(pacing::INTER_ITEM_DELAY, self.cancel).await {
                break;
            }
            if self.cancel.is_cancelled() {
                break;
            }

            let slot = slot_label(index);
            match self.surface.export(affordance, pacing::EXPORT_WAIT).await {
                Ok(transferred) => {
                    let ext = transferred
                        .extension()
                        .and_then(|e| e.to_str())
                        .unwrap_or(DEFAULT_EXPORT_EXT)
                        .to_string();
                    let created_at = Local::now();
                    let sequence = self.counter.next();
                    let file_name = artifact_name(file_prefix, created_at, sequence, &slot, &ext);

                    match tokio::fs::rename(&transferred, dir.join(&file_name)).await {
                        Ok(()) => {
                            debug!(sequence, slot, file_name, "artifact exported");
                            self.reporter.info(format!("saved {file_name}"));
                            records.push(ArtifactRecord { sequence, slot, file_name, created_at });
                        }
                        Err(e) => {
                            self.reporter.warn(format!("could not place {slot} artifact: {e}"));
                        }
                    }
                }
                Err(e) => {
                    self.reporter.warn(format!("export for {slot} slot failed: {e}"));
                    if !enhanced_capture {
                        continue;
                    }
                    if let Some(record) = self.capture_slot(dir, file_prefix, index, &slot).await {
                        records.push(record);
                    }
                }
            }
        }

        records
    }

    /// Capture fallback: grab the rendered visual at the same left-to-right
    /// ordinal as the failed affordance.
    async fn capture_slot(
        &self,
        dir: &Path,
        file_prefix: &str,
        index: usize,
        slot: &str,
    ) -> Option<ArtifactRecord> {
        let candidates = visible_results(self.surface, self.selectors).await;
        let Some(candidate) = candidates.get(index) else {
            self.reporter
                .warn(format!("no visual candidate at position {index}, skipping {slot} slot"));
            return None;
        };

        let bytes = match self.surface.capture(candidate).await {
            Ok(bytes) => bytes,
            Err(e) => {
                self.reporter.warn(format!("capture for {slot} slot failed: {e}"));
                return None;
            }
        };

        let created_at = Local::now();
        let sequence = self.counter.next();
        let file_name = artifact_name(file_prefix, created_at, sequence, slot, CAPTURE_EXT);

        if let Err(e) = tokio::fs::write(dir.join(&file_name), &bytes).await {
            self.reporter.warn(format!("could not write {slot} capture: {e}"));
            return None;
        }

        debug!(sequence, slot, file_name, "artifact captured");
        self.reporter.info(format!("captured {file_name}"));
        Some(ArtifactRecord { sequence, slot: slot.to_string(), file_name, created_at })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::{
        events::{JobEvent, Reporter},
        testing::{IterationScript, MockExport, MockSurface},
        types::JobId,
    };

    fn reporter() -> (Reporter, mpsc::UnboundedReceiver<JobEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Reporter::new(JobId(1), tx), rx)
    }

    async fn collect_with(
        surface: &MockSurface,
        enhanced_capture: bool,
    ) -> (Vec<ArtifactRecord>, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let selectors = Selectors::default();
        let counter = SequenceCounter::new();
        let (reporter, _rx) = reporter();
        let cancel = CancellationToken::new();

        surface.press_enter().await;
        let coordinator =
            DownloadCoordinator::new(surface, &selectors, &counter, &reporter, &cancel);
        let records = coordinator.collect(dir.path(), "easel", enhanced_capture).await;
        (records, dir)
    }

    #[tokio::test(start_paused = true)]
    async fn slots_are_ordered_by_screen_position() {
        // DOM order deliberately scrambled relative to screen order.
        let surface = MockSurface::scripted(vec![IterationScript {
            generates: true,
            exports: vec![MockExport::ok(300.0), MockExport::ok(100.0), MockExport::ok(200.0)],
        }]);

        let (records, dir) = collect_with(&surface, true).await;

        let slots: Vec<_> = records.iter().map(|r| r.slot.as_str()).collect();
        assert_eq!(slots, ["left", "right", "slot3"]);
        let sequences: Vec<_> = records.iter().map(|r| r.sequence).collect();
        assert_eq!(sequences, [1, 2, 3]);
        for record in &records {
            assert!(dir.path().join(&record.file_name).exists());
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failed_export_falls_back_to_capture() {
        let surface = MockSurface::scripted(vec![IterationScript {
            generates: true,
            exports: vec![MockExport::capture_only(100.0), MockExport::ok(300.0)],
        }]);

        let (records, dir) = collect_with(&surface, true).await;

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].slot, "left");
        assert!(records[0].file_name.ends_with(".png"));
        assert_eq!(records[1].slot, "right");
        assert!(records[1].file_name.ends_with(".jpg"));
        // Dense sequence despite the fallback path.
        assert_eq!(records[0].sequence, 1);
        assert_eq!(records[1].sequence, 2);
        assert!(dir.path().join(&records[0].file_name).exists());
    }

    #[tokio::test(start_paused = true)]
    async fn dead_slot_is_skipped_without_a_gap() {
        let surface = MockSurface::scripted(vec![IterationScript {
            generates: true,
            exports: vec![MockExport::dead(100.0), MockExport::ok(300.0)],
        }]);

        let (records, _dir) = collect_with(&surface, true).await;

        assert_eq!(records.len(), 1);
        assert_eq!(records[0].slot, "right");
        assert_eq!(records[0].sequence, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn fallback_disabled_skips_failed_slots() {
        let surface = MockSurface::scripted(vec![IterationScript {
            generates: true,
            exports: vec![MockExport::capture_only(100.0), MockExport::ok(300.0)],
        }]);

        let (records, _dir) = collect_with(&surface, false).await;

        assert_eq!(records.len(), 1);
        assert!(records[0].file_name.ends_with(".jpg"));
    }

    #[tokio::test(start_paused = true)]
    async fn nothing_visible_collects_nothing() {
        let surface = MockSurface::scripted(vec![IterationScript {
            generates: false,
            exports: vec![],
        }]);

        let (records, _dir) = collect_with(&surface, true).await;
        assert!(records.is_empty());
    }

    #[test]
    fn artifact_names_carry_all_components() {
        let at = Local::now();
        let name = artifact_name("easel", at, 7, "left", "jpg");
        assert!(name.starts_with("easel_"));
        assert!(name.ends_with("_007_left.jpg"));
    }
}
