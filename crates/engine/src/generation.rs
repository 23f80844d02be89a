//! One generation cycle: configure the output shape, submit the prompt,
//! trigger, and wait for completion.

use std::time::Duration;

use {
    easel_browser::{Action, Query, Surface, UiElement},
    tokio_util::sync::CancellationToken,
    tracing::debug,
};

use crate::{
    events::Reporter,
    matcher::{LabelMatcher, select_match},
    pacing::{self, pause},
    types::{AspectRatio, Selectors},
};

/// Result elements smaller than this on either edge are thumbnails or
/// icons, not generated output.
const MIN_RESULT_EDGE: f64 = 100.0;

/// How a completion wait ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// A completion signal fired and the settle delay ran.
    Ready,
    /// Neither signal fired before the deadline. Soft: the iteration is
    /// skipped, the job continues.
    TimedOut,
    Cancelled,
}

/// All visible generated-result elements, filtered to plausible output
/// size and sorted left to right.
pub(crate) async fn visible_results<S: Surface>(surface: &S, selectors: &Selectors) -> Vec<UiElement> {
    let mut results: Vec<UiElement> = surface
        .find_all_visible(&Query::css(selectors.result_image.clone()))
        .await
        .into_iter()
        .filter(|el| el.bounds.width >= MIN_RESULT_EDGE && el.bounds.height >= MIN_RESULT_EDGE)
        .collect();
    results.sort_by(|a, b| a.bounds.x.total_cmp(&b.bounds.x));
    results
}

/// Drives the page through one generation cycle. Every step is fail-soft:
/// a `false` return means the step could not be carried out, and the
/// caller decides whether that sinks the iteration.
pub struct GenerationController<'a, S: Surface> {
    surface: &'a S,
    selectors: &'a Selectors,
    matchers: Vec<Box<dyn LabelMatcher>>,
    reporter: &'a Reporter,
    cancel: &'a CancellationToken,
}

impl<'a, S: Surface> GenerationController<'a, S> {
    pub fn new(
        surface: &'a S,
        selectors: &'a Selectors,
        matchers: Vec<Box<dyn LabelMatcher>>,
        reporter: &'a Reporter,
        cancel: &'a CancellationToken,
    ) -> Self {
        Self { surface, selectors, matchers, reporter, cancel }
    }

    /// Select the output shape. No-op when `ratio` is the app default.
    ///
    /// Preferred path: open the settings panel and pick the option whose
    /// label matches. When the panel control is absent entirely, fall back
    /// to a plain `<select>` if the page has one.
    pub async fn configure_ratio(&self, ratio: AspectRatio) -> bool {
        if ratio == AspectRatio::default() {
            debug!(ratio = %ratio, "default shape, skipping configuration");
            return true;
        }

        let toggle = self
            .surface
            .find_visible(&Query::css(self.selectors.settings_toggle.clone()))
            .await;

        let Some(toggle) = toggle else {
            return self.configure_ratio_fallback(ratio).await;
        };

        if !self.surface.act(&toggle, Action::Click).await {
            self.reporter.warn("settings control did not accept the click");
            return false;
        }
        if !pause(pacing::PANEL_SETTLE, self.cancel).await {
            return false;
        }

        let candidates = self
            .surface
            .find_all_visible(&Query::css(self.selectors.ratio_option.clone()))
            .await;

        let Some((strategy, option)) = select_match(&self.matchers, ratio.label(), &candidates)
        else {
            self.reporter.warn(format!(
                "no option matched shape {ratio} among {} candidates",
                candidates.len()
            ));
            return false;
        };

        debug!(ratio = %ratio, strategy, "shape option matched");
        if !self.surface.act(option, Action::Click).await {
            self.reporter.warn(format!("shape option {ratio} did not accept the click"));
            return false;
        }
        pause(pacing::PANEL_SETTLE, self.cancel).await
    }

    async fn configure_ratio_fallback(&self, ratio: AspectRatio) -> bool {
        let Some(dropdown) = self.surface.find_visible(&Query::css("select")).await else {
            self.reporter.warn(format!("no control found to set shape {ratio}"));
            return false;
        };
        if !self
            .surface
            .act(&dropdown, Action::SelectValue(ratio.label().to_string()))
            .await
        {
            self.reporter.warn(format!("dropdown rejected shape {ratio}"));
            return false;
        }
        true
    }

    /// Clear the prompt input and type `text`. A verification mismatch is
    /// reported but non-fatal: generation proceeds best-effort.
    pub async fn submit_prompt(&self, text: &str) -> bool {
        let Some(input) = self
            .surface
            .find_visible(&Query::css(self.selectors.prompt_input.clone()))
            .await
        else {
            self.reporter.warn("prompt input not found");
            return false;
        };

        if !self
            .surface
            .act(&input, Action::ClearAndType(text.to_string()))
            .await
        {
            self.reporter.warn("prompt input rejected typing");
            return false;
        }

        let entered = self.surface.input_value(&input).await.unwrap_or_default();
        if !entered.contains(text) {
            self.reporter
                .warn("prompt verification mismatch, continuing anyway");
        }
        true
    }

    /// Number of result elements currently visible. Sampled just before
    /// triggering so the completion wait compares against this iteration's
    /// own baseline, not leftovers from earlier cycles.
    pub async fn result_baseline(&self) -> usize {
        visible_results(self.surface, self.selectors).await.len()
    }

    /// Submit the entered prompt and give the app a beat to react.
    pub async fn trigger(&self) -> bool {
        if !self.surface.press_enter().await {
            self.reporter.warn("submit keystroke failed");
            return false;
        }
        pause(pacing::TRIGGER_SETTLE, self.cancel).await
    }

    /// Poll until generation finishes or `timeout` elapses.
    ///
    /// Two independent signals are checked each poll: the visible result
    /// count exceeding `baseline`, and export affordances appearing.
    /// Either one is followed by a settle delay so late tiles finish
    /// rendering before collection starts.
    pub async fn await_completion(&self, timeout: Duration, baseline: usize) -> WaitOutcome {
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            if self.cancel.is_cancelled() {
                return WaitOutcome::Cancelled;
            }

            let results = visible_results(self.surface, self.selectors).await.len();
            if results > baseline {
                debug!(results, baseline, "new results appeared");
                return if pause(pacing::RESULT_SETTLE, self.cancel).await {
                    WaitOutcome::Ready
                } else {
                    WaitOutcome::Cancelled
                };
            }

            let affordances = self
                .surface
                .find_all_visible(&Query::css(self.selectors.export_control.clone()))
                .await
                .len();
            if affordances > 0 {
                debug!(affordances, "export affordances appeared");
                return if pause(pacing::EXPORT_SETTLE, self.cancel).await {
                    WaitOutcome::Ready
                } else {
                    WaitOutcome::Cancelled
                };
            }

            if tokio::time::Instant::now() + pacing::POLL_INTERVAL > deadline {
                return WaitOutcome::TimedOut;
            }
            if !pause(pacing::POLL_INTERVAL, self.cancel).await {
                return WaitOutcome::Cancelled;
            }
        }
    }
}
