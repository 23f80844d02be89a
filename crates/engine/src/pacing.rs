//! Timing constants and cancellable pauses.
//!
//! The target UI is timing-sensitive: elements render late and exports
//! settle asynchronously. These delays were tuned against the live app.

use std::time::Duration;

use {rand::Rng, tokio_util::sync::CancellationToken};

/// Completion poll interval.
pub const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Settle after new result elements appear, letting late tiles render.
pub const RESULT_SETTLE: Duration = Duration::from_secs(7);

/// Settle after export affordances appear.
pub const EXPORT_SETTLE: Duration = Duration::from_secs(5);

/// Settle after the submit keystroke.
pub const TRIGGER_SETTLE: Duration = Duration::from_secs(1);

/// Settle after opening the settings panel.
pub const PANEL_SETTLE: Duration = Duration::from_secs(2);

/// Bounded wait for one native export transfer.
pub const EXPORT_WAIT: Duration = Duration::from_secs(30);

/// Gap between successive export attempts so in-flight transfers are not
/// misattributed.
pub const INTER_ITEM_DELAY: Duration = Duration::from_secs(1);

/// Sleep for `duration`, or less if cancelled. Returns `false` when the
/// token fired first.
pub async fn pause(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(duration) => true,
    }
}

/// Uniform random delay in `[min, max]`, used between iterations.
pub fn random_delay(min: Duration, max: Duration) -> Duration {
    if max <= min {
        return min;
    }
    let range = (max - min).as_millis() as u64;
    min + Duration::from_millis(rand::rng().random_range(0..=range))
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn random_delay_stays_in_range() {
        let min = Duration::from_secs(5);
        let max = Duration::from_secs(8);
        for _ in 0..100 {
            let d = random_delay(min, max);
            assert!(d >= min && d <= max);
        }
    }

    #[test]
    fn degenerate_range_returns_min() {
        let d = Duration::from_secs(5);
        assert_eq!(random_delay(d, d), d);
        assert_eq!(random_delay(d, Duration::from_secs(2)), d);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_completes_when_not_cancelled() {
        let token = CancellationToken::new();
        assert!(pause(Duration::from_secs(30), &token).await);
    }

    #[tokio::test(start_paused = true)]
    async fn pause_unblocks_on_cancellation() {
        let token = CancellationToken::new();
        let waiter = tokio::spawn({
            let token = token.clone();
            async move { pause(Duration::from_secs(3600), &token).await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        assert!(!waiter.await.unwrap());
    }
}
