//! Ordered drain stage.
//!
//! Scans the slots of a batch in ascending order and hands each finished
//! frame to the sink. The scan stalls on whichever slot is not yet
//! published, so frames reach the sink in stream order no matter which
//! worker finishes first, and no reorder buffer beyond the window is needed.

use std::time::Instant;

use crate::error::BalanceError;
use crate::media::FrameSink;
use crate::pipeline::BatchDescriptor;
use crate::progress::ProgressTracker;
use crate::window::FrameWindow;

/// What one drain pass produced.
#[derive(Debug, Default)]
pub(crate) struct DrainReport {
    /// Frames handed to the sink.
    pub(crate) delivered: usize,
    /// Slots that were abandoned instead of published.
    pub(crate) abandoned: usize,
    /// Time spent inside the sink.
    pub(crate) encode: std::time::Duration,
}

/// Drain one slot and forward its frame, if any.
pub(crate) fn drain_slot<K: FrameSink>(
    window: &FrameWindow,
    batch: BatchDescriptor,
    position: usize,
    sink: &mut K,
    tracker: &mut ProgressTracker,
    report: &mut DrainReport,
) -> Result<(), BalanceError> {
    let Some(frame) = window.drain(position)? else {
        report.abandoned += 1;
        return Ok(());
    };
    debug_assert_eq!(frame.index, batch.start + position as u64);

    let started = Instant::now();
    sink.write_frame(&frame)?;
    report.encode += started.elapsed();
    report.delivered += 1;
    tracker.advance(frame.index);
    Ok(())
}

/// Drain positions `0..batch.count` in order.
///
/// Stops at the first sink error; anything left in the window is released
/// when the controller resets it.
pub(crate) fn drain_batch<K: FrameSink>(
    window: &FrameWindow,
    batch: BatchDescriptor,
    sink: &mut K,
    tracker: &mut ProgressTracker,
) -> Result<DrainReport, BalanceError> {
    let mut report = DrainReport::default();
    for position in 0..batch.count {
        drain_slot(window, batch, position, sink, tracker, &mut report)?;
    }
    if report.abandoned > 0 {
        log::debug!(
            "Batch at {}: {} slot(s) abandoned after end of stream",
            batch.start,
            report.abandoned
        );
    }
    Ok(report)
}
