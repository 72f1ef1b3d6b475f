use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use super::service::DownloadErrorReason;

/// Placeholder shown before the first progress event names a real file
const PENDING_FILE: &str = "…";

/// Lifecycle of one model download
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DownloadStatus {
    /// No download active or recorded
    #[default]
    Idle,
    /// Transfer in progress
    Downloading,
    /// All files fetched
    Complete,
    /// Cancelled by the user; auto-clears back to Idle
    Cancelled,
    /// Failed; terminal until a new download or delete request
    Error,
}

/// Observable download state for one model key
#[derive(Debug, Clone, Default)]
pub struct ModelDownloadState {
    /// Current lifecycle state
    pub status: DownloadStatus,
    /// Progress in `[0, 100]`, monotonically non-decreasing while downloading
    pub percent: f32,
    /// Bytes fetched so far
    pub downloaded: u64,
    /// Total bytes expected (0 when unknown)
    pub total: u64,
    /// File currently transferring
    pub file: Option<String>,
    /// Error message for display when `status == Error`
    pub message: Option<String>,
}

#[derive(Debug)]
struct Entry {
    state: ModelDownloadState,
    // Set only while Cancelled; any transition clears it
    clear_after: Option<Instant>,
}

impl Entry {
    fn new() -> Self {
        Self {
            state: ModelDownloadState::default(),
            clear_after: None,
        }
    }
}

/// Per-model-key download state machines.
///
/// Each key's machine is independent; concurrent downloads of distinct keys
/// never interact. Entries are created lazily on the first event for a key.
#[derive(Debug)]
pub struct ModelDownloadTracker {
    entries: HashMap<String, Entry>,
    auto_clear: Duration,
}

impl ModelDownloadTracker {
    /// Delay before a `Cancelled` entry falls back to `Idle`
    pub const DEFAULT_AUTO_CLEAR: Duration = Duration::from_secs(3);

    /// Create a tracker with the default cancel auto-clear delay
    #[must_use]
    pub fn new() -> Self {
        Self::with_auto_clear(Self::DEFAULT_AUTO_CLEAR)
    }

    /// Create a tracker with an explicit auto-clear delay
    #[must_use]
    pub fn with_auto_clear(auto_clear: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            auto_clear,
        }
    }

    fn entry(&mut self, model: &str) -> &mut Entry {
        self.entries
            .entry(model.to_owned())
            .or_insert_with(Entry::new)
    }

    /// Snapshot the state for one model key (`Idle` if never seen)
    #[must_use]
    pub fn state(&self, model: &str) -> ModelDownloadState {
        self.entries
            .get(model)
            .map_or_else(ModelDownloadState::default, |e| e.state.clone())
    }

    /// Explicit download request: move to `Downloading` with zeroed progress.
    ///
    /// Allowed from any state except `Downloading` itself (a duplicate
    /// request while transferring is ignored).
    pub fn begin(&mut self, model: &str) {
        let entry = self.entry(model);
        if entry.state.status == DownloadStatus::Downloading {
            debug!(model = model, "download already in progress, ignoring request");
            return;
        }
        entry.state = ModelDownloadState {
            status: DownloadStatus::Downloading,
            percent: 0.0,
            downloaded: 0,
            total: 0,
            file: Some(PENDING_FILE.to_owned()),
            message: None,
        };
        entry.clear_after = None;
        info!(model = model, "download started");
    }

    /// Progress event while `Downloading`.
    ///
    /// Percent is clamped to `[0, 100]`; an update that would decrease the
    /// recorded percent is dropped so stale or reordered events cannot make
    /// the progress bar move backwards.
    pub fn progress(&mut self, model: &str, file: &str, downloaded: u64, total: u64, percent: f32) {
        let entry = self.entry(model);
        if entry.state.status != DownloadStatus::Downloading {
            debug!(
                model = model,
                status = ?entry.state.status,
                "progress event for non-downloading model, dropping"
            );
            return;
        }

        let percent = percent.clamp(0.0, 100.0);
        if percent < entry.state.percent {
            debug!(
                model = model,
                stale = percent,
                current = entry.state.percent,
                "dropping percent regression"
            );
            return;
        }

        entry.state.percent = percent;
        entry.state.downloaded = downloaded;
        entry.state.total = total;
        entry.state.file = Some(file.to_owned());
    }

    /// Completion event: `Downloading` → `Complete`, percent forced to 100
    pub fn complete(&mut self, model: &str) {
        let entry = self.entry(model);
        if entry.state.status != DownloadStatus::Downloading {
            debug!(
                model = model,
                status = ?entry.state.status,
                "complete event for non-downloading model, dropping"
            );
            return;
        }
        entry.state.status = DownloadStatus::Complete;
        entry.state.percent = 100.0;
        entry.clear_after = None;
        info!(model = model, "download complete");
    }

    /// Error event from the download service.
    ///
    /// A `Cancelled` reason is ignored: the local cancel transition already
    /// moved the machine and the service's follow-up error is just the task
    /// winding down. Any other reason moves `Downloading` → `Error` with the
    /// message retained for display.
    pub fn error(&mut self, model: &str, reason: DownloadErrorReason, message: &str) {
        if reason == DownloadErrorReason::Cancelled {
            debug!(model = model, "suppressing cancellation error event");
            return;
        }

        let entry = self.entry(model);
        if entry.state.status != DownloadStatus::Downloading {
            debug!(
                model = model,
                status = ?entry.state.status,
                "error event for non-downloading model, dropping"
            );
            return;
        }
        entry.state.status = DownloadStatus::Error;
        entry.state.message = Some(message.to_owned());
        entry.clear_after = None;
        warn!(model = model, reason = ?reason, message = message, "download failed");
    }

    /// Explicit cancel: `Downloading` → `Cancelled`, scheduling the auto-clear
    pub fn cancel(&mut self, model: &str, now: Instant) {
        let auto_clear = self.auto_clear;
        let entry = self.entry(model);
        if entry.state.status != DownloadStatus::Downloading {
            debug!(
                model = model,
                status = ?entry.state.status,
                "cancel for non-downloading model, ignoring"
            );
            return;
        }
        entry.state.status = DownloadStatus::Cancelled;
        entry.clear_after = Some(now + auto_clear);
        info!(model = model, "download cancelled");
    }

    /// Explicit delete request: any terminal state → `Idle`
    pub fn delete(&mut self, model: &str) {
        let entry = self.entry(model);
        match entry.state.status {
            DownloadStatus::Complete | DownloadStatus::Error | DownloadStatus::Cancelled => {
                entry.state = ModelDownloadState::default();
                entry.clear_after = None;
                info!(model = model, "model deleted, state reset");
            }
            DownloadStatus::Idle | DownloadStatus::Downloading => {
                debug!(
                    model = model,
                    status = ?entry.state.status,
                    "delete for non-terminal model, ignoring"
                );
            }
        }
    }

    /// Move `Cancelled` entries whose auto-clear deadline passed back to
    /// `Idle`. Returns how many entries were cleared. Driven by the event
    /// loop's interval timer.
    pub fn sweep_cancelled(&mut self, now: Instant) -> usize {
        let mut cleared = 0;
        for (model, entry) in &mut self.entries {
            if entry.state.status == DownloadStatus::Cancelled
                && entry.clear_after.is_some_and(|deadline| now >= deadline)
            {
                entry.state = ModelDownloadState::default();
                entry.clear_after = None;
                cleared += 1;
                debug!(model = %model, "cancelled download auto-cleared");
            }
        }
        cleared
    }
}

impl Default for ModelDownloadTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn downloading_tracker(model: &str) -> ModelDownloadTracker {
        let mut tracker = ModelDownloadTracker::new();
        tracker.begin(model);
        tracker
    }

    #[test]
    fn test_initial_state_is_idle() {
        let tracker = ModelDownloadTracker::new();
        assert_eq!(tracker.state("m1").status, DownloadStatus::Idle);
    }

    #[test]
    fn test_begin_resets_progress() {
        let mut tracker = downloading_tracker("m1");
        tracker.progress("m1", "model.bin", 500, 1000, 50.0);
        tracker.error("m1", DownloadErrorReason::Network, "connection reset");

        tracker.begin("m1");
        let state = tracker.state("m1");
        assert_eq!(state.status, DownloadStatus::Downloading);
        assert_eq!(state.percent, 0.0);
        assert_eq!(state.downloaded, 0);
        assert_eq!(state.total, 0);
        assert!(state.message.is_none());
    }

    #[test]
    fn test_begin_while_downloading_ignored() {
        let mut tracker = downloading_tracker("m1");
        tracker.progress("m1", "model.bin", 500, 1000, 50.0);

        tracker.begin("m1");
        assert_eq!(tracker.state("m1").percent, 50.0);
    }

    #[test]
    fn test_progress_then_complete() {
        let mut tracker = downloading_tracker("m1");
        for percent in [10.0, 50.0, 90.0] {
            tracker.progress("m1", "model.bin", 0, 0, percent);
        }
        tracker.complete("m1");

        let state = tracker.state("m1");
        assert_eq!(state.status, DownloadStatus::Complete);
        assert_eq!(state.percent, 100.0);
    }

    #[test]
    fn test_percent_regression_dropped() {
        let mut tracker = downloading_tracker("m1");
        tracker.progress("m1", "model.bin", 900, 1000, 90.0);
        tracker.progress("m1", "model.bin", 500, 1000, 50.0);

        let state = tracker.state("m1");
        assert_eq!(state.percent, 90.0);
        // stale byte counts are dropped along with the stale percent
        assert_eq!(state.downloaded, 900);
    }

    #[test]
    fn test_percent_clamped() {
        let mut tracker = downloading_tracker("m1");
        tracker.progress("m1", "model.bin", 0, 0, 150.0);
        assert_eq!(tracker.state("m1").percent, 100.0);

        let mut tracker = downloading_tracker("m2");
        tracker.progress("m2", "model.bin", 0, 0, -5.0);
        assert_eq!(tracker.state("m2").percent, 0.0);
    }

    #[test]
    fn test_progress_ignored_when_not_downloading() {
        let mut tracker = ModelDownloadTracker::new();
        tracker.progress("m1", "model.bin", 10, 100, 10.0);
        assert_eq!(tracker.state("m1").status, DownloadStatus::Idle);
        assert_eq!(tracker.state("m1").percent, 0.0);
    }

    #[test]
    fn test_error_retains_message() {
        let mut tracker = downloading_tracker("m1");
        tracker.error("m1", DownloadErrorReason::Integrity, "checksum mismatch");

        let state = tracker.state("m1");
        assert_eq!(state.status, DownloadStatus::Error);
        assert_eq!(state.message.as_deref(), Some("checksum mismatch"));
    }

    #[test]
    fn test_cancellation_error_suppressed() {
        let mut tracker = downloading_tracker("m1");
        tracker.cancel("m1", Instant::now());
        tracker.error("m1", DownloadErrorReason::Cancelled, "request cancelled");

        assert_eq!(tracker.state("m1").status, DownloadStatus::Cancelled);
    }

    #[test]
    fn test_cancel_then_auto_clear() {
        let mut tracker = ModelDownloadTracker::with_auto_clear(Duration::from_secs(3));
        tracker.begin("m1");

        let t0 = Instant::now();
        tracker.cancel("m1", t0);
        assert_eq!(tracker.state("m1").status, DownloadStatus::Cancelled);

        // Before the deadline nothing happens
        assert_eq!(tracker.sweep_cancelled(t0 + Duration::from_secs(1)), 0);
        assert_eq!(tracker.state("m1").status, DownloadStatus::Cancelled);

        // At the deadline the entry falls back to Idle
        assert_eq!(tracker.sweep_cancelled(t0 + Duration::from_secs(3)), 1);
        assert_eq!(tracker.state("m1").status, DownloadStatus::Idle);
    }

    #[test]
    fn test_new_download_beats_auto_clear() {
        let mut tracker = ModelDownloadTracker::with_auto_clear(Duration::from_secs(3));
        tracker.begin("m1");

        let t0 = Instant::now();
        tracker.cancel("m1", t0);
        tracker.begin("m1");

        assert_eq!(tracker.sweep_cancelled(t0 + Duration::from_secs(10)), 0);
        assert_eq!(tracker.state("m1").status, DownloadStatus::Downloading);
    }

    #[test]
    fn test_delete_resets_terminal_states() {
        let mut tracker = downloading_tracker("m1");
        tracker.error("m1", DownloadErrorReason::Network, "boom");
        tracker.delete("m1");
        assert_eq!(tracker.state("m1").status, DownloadStatus::Idle);

        let mut tracker = downloading_tracker("m2");
        tracker.complete("m2");
        tracker.delete("m2");
        assert_eq!(tracker.state("m2").status, DownloadStatus::Idle);
    }

    #[test]
    fn test_delete_while_downloading_ignored() {
        let mut tracker = downloading_tracker("m1");
        tracker.delete("m1");
        assert_eq!(tracker.state("m1").status, DownloadStatus::Downloading);
    }

    #[test]
    fn test_model_keys_are_independent() {
        let mut tracker = ModelDownloadTracker::new();
        tracker.begin("m1");
        tracker.begin("m2");

        tracker.progress("m1", "a.bin", 0, 0, 40.0);
        tracker.error("m2", DownloadErrorReason::Other, "disk full");

        assert_eq!(tracker.state("m1").status, DownloadStatus::Downloading);
        assert_eq!(tracker.state("m1").percent, 40.0);
        assert_eq!(tracker.state("m2").status, DownloadStatus::Error);
    }

    #[test]
    fn test_monotonic_percent_property() {
        let mut tracker = downloading_tracker("m1");
        let deliveries = [5.0, 20.0, 15.0, 60.0, 55.0, 99.0, 80.0];

        let mut last = 0.0_f32;
        for percent in deliveries {
            tracker.progress("m1", "model.bin", 0, 0, percent);
            let current = tracker.state("m1").percent;
            assert!(current >= last, "percent regressed: {last} -> {current}");
            last = current;
        }
        assert_eq!(last, 99.0);
    }
}
