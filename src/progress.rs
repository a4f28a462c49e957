//! Progress reporting.
//!
//! The drain stage is the only place that knows a frame is truly finished,
//! so it drives a [`ProgressTracker`] which forwards snapshots to a
//! user-supplied [`ProgressCallback`].
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use graybalance::{PipelineOptions, ProgressCallback, ProgressInfo};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, info: &ProgressInfo) {
//!         if let Some(pct) = info.percentage {
//!             println!("{pct:.1}% ({} frames)", info.current);
//!         }
//!     }
//! }
//!
//! let options = PipelineOptions::new()
//!     .with_threads(4)
//!     .with_progress(Arc::new(PrintProgress))
//!     .with_progress_interval(25);
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

/// A snapshot of pipeline progress.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Frames written to the sink so far.
    pub current: u64,
    /// Total frames expected, if the source reports a frame count.
    pub total: Option<u64>,
    /// Completion percentage (0.0 – 100.0), if `total` is known.
    pub percentage: Option<f32>,
    /// Wall-clock time since the run started.
    pub elapsed: Duration,
    /// Estimated time remaining, based on current throughput.
    pub estimated_remaining: Option<Duration>,
    /// Index of the frame just written, if any.
    pub current_frame: Option<u64>,
}

/// Receives progress updates during a pipeline run.
///
/// Callbacks only observe; they cannot stop the run.
pub trait ProgressCallback: Send + Sync {
    /// Called every few frames and once at the end of the run.
    fn on_progress(&self, info: &ProgressInfo);
}

/// Discards all progress notifications. The default callback.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _info: &ProgressInfo) {}
}

/// Tracks progress timing and emits callbacks every `interval` frames.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    total: Option<u64>,
    current: u64,
    interval: u64,
    start_time: Instant,
    since_last_report: u64,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, total: Option<u64>, interval: u64) -> Self {
        Self {
            callback,
            total,
            current: 0,
            interval: interval.max(1),
            start_time: Instant::now(),
            since_last_report: 0,
        }
    }

    /// Record one written frame.
    pub(crate) fn advance(&mut self, frame_index: u64) {
        self.current += 1;
        self.since_last_report += 1;

        if self.since_last_report >= self.interval {
            self.report(Some(frame_index));
            self.since_last_report = 0;
        }
    }

    /// Unconditionally emit a final report.
    pub(crate) fn finish(&mut self) {
        self.report(None);
    }

    fn report(&self, frame_index: Option<u64>) {
        let elapsed = self.start_time.elapsed();

        let percentage = self
            .total
            .filter(|&total| total > 0)
            .map(|total| (self.current as f32 / total as f32 * 100.0).min(100.0));

        let estimated_remaining = (self.current > 0)
            .then(|| {
                self.total.map(|total| {
                    let remaining = total.saturating_sub(self.current);
                    elapsed.mul_f64(remaining as f64 / self.current as f64)
                })
            })
            .flatten();

        self.callback.on_progress(&ProgressInfo {
            current: self.current,
            total: self.total,
            percentage,
            elapsed,
            estimated_remaining,
            current_frame: frame_index,
        });
    }
}
