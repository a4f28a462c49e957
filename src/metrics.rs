//! Run timing and counters.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::ops::AddAssign;
use std::time::Duration;

/// Time spent in each phase by one thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PhaseTimes {
    /// Opening, seeking, and decoding.
    pub decode: Duration,
    /// Running the frame transform.
    pub compute: Duration,
    /// Handing frames to the sink.
    pub encode: Duration,
}

impl AddAssign for PhaseTimes {
    fn add_assign(&mut self, other: Self) {
        self.decode += other.decode;
        self.compute += other.compute;
        self.encode += other.encode;
    }
}

/// Totals for a whole pipeline run.
///
/// Phase durations are summed across threads, so with several workers they
/// can exceed the wall-clock `total`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PipelineMetrics {
    /// Wall-clock time of the run.
    pub total: Duration,
    /// Cumulative decode time.
    pub decode: Duration,
    /// Cumulative transform time.
    pub compute: Duration,
    /// Cumulative encode time, including the final flush.
    pub encode: Duration,
    /// Frames written to the sink.
    pub frames: u64,
    /// Batches executed.
    pub batches: u64,
    /// Most frame buffers resident in the window at once.
    pub peak_resident: usize,
}

impl PipelineMetrics {
    /// Fold one batch's per-rank timings in. `per_rank[r]` belongs to worker `r`.
    pub(crate) fn record_workers(&mut self, per_rank: &[PhaseTimes]) {
        for times in per_rank {
            self.record(*times);
        }
    }

    pub(crate) fn record(&mut self, times: PhaseTimes) {
        self.decode += times.decode;
        self.compute += times.compute;
        self.encode += times.encode;
    }
}

impl Display for PipelineMetrics {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "    Total: {:.3}s (include time count)", self.total.as_secs_f64())?;
        writeln!(f, "    Input: {:.3}s", self.decode.as_secs_f64())?;
        writeln!(f, "   Output: {:.3}s", self.encode.as_secs_f64())?;
        write!(f, "Calculate: {:.3}s", self.compute.as_secs_f64())
    }
}
