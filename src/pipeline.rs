//! Batched concurrent frame pipeline.
//!
//! [`Pipeline`] drives the whole run. Each batch goes through
//!
//! ```text
//! FetchingBatch ─► Dispatching ─► Draining ─► Advancing ─┐
//!       ▲                                                 │
//!       └─────────────────────────────────────────────────┘
//!                                   (end of stream) ─► Done
//! ```
//!
//! Within a batch, T scoped worker threads decode and correct frames into a
//! [`FrameWindow`] while the controller thread drains it in order. All
//! workers are joined before the next batch starts, so at most
//! `window_size` frames are ever resident.
//!
//! # Example
//!
//! ```no_run
//! use graybalance::{
//!     FrameSource, PartitionStrategy, Pipeline, PipelineOptions, VideoInput, VideoWriter,
//!     VideoWriterOptions,
//! };
//!
//! let input = VideoInput::open("input.mp4")?;
//! let writer = VideoWriter::create("output.avi", VideoWriterOptions::from_stream(input.info()))?;
//!
//! let pipeline = Pipeline::new(
//!     PipelineOptions::new()
//!         .with_threads(4)
//!         .with_strategy(PartitionStrategy::Block),
//! )?;
//! let metrics = pipeline.run(&input, writer)?;
//! println!("{metrics}");
//! # Ok::<(), graybalance::BalanceError>(())
//! ```

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, ScopedJoinHandle};
use std::time::Instant;

use rayon::{ThreadPool, ThreadPoolBuilder};

use crate::configuration::PipelineOptions;
use crate::drain::{DrainReport, drain_batch, drain_slot};
use crate::error::BalanceError;
use crate::frame::Frame;
use crate::media::{FrameReader, FrameSink, FrameSource};
use crate::metrics::{PhaseTimes, PipelineMetrics};
use crate::partition::{PartitionStrategy, distribute};
use crate::progress::ProgressTracker;
use crate::transform::{FrameTransform, GrayWorld};
use crate::window::{FrameWindow, SlotReservation};

/// The slice of the stream currently resident in the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchDescriptor {
    /// Absolute index of the frame in slot 0.
    pub start: u64,
    /// Number of slots in use, at most the window capacity.
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchState {
    FetchingBatch,
    Dispatching,
    Draining,
    Advancing,
    Done,
}

fn enter(batch_number: u64, state: BatchState) {
    log::trace!("batch {batch_number}: {state:?}");
}

/// What one batch produced.
struct BatchOutcome {
    delivered: usize,
    /// The source ran out of frames during this batch.
    exhausted: bool,
    /// Worker timings, indexed by rank.
    per_rank: Vec<PhaseTimes>,
    /// Timings of work done on the controller thread.
    controller: PhaseTimes,
}

impl BatchOutcome {
    fn exhausted() -> Self {
        Self {
            delivered: 0,
            exhausted: true,
            per_rank: Vec::new(),
            controller: PhaseTimes::default(),
        }
    }
}

/// Applies a [`FrameTransform`] to every frame of a source, in parallel,
/// and writes the results to a sink in stream order.
#[derive(Debug, Clone)]
pub struct Pipeline<T = GrayWorld> {
    options: PipelineOptions,
    transform: T,
}

impl Pipeline<GrayWorld> {
    /// Create a gray-world pipeline.
    ///
    /// # Errors
    ///
    /// Returns the error from [`PipelineOptions::validate`].
    pub fn new(options: PipelineOptions) -> Result<Self, BalanceError> {
        let transform = GrayWorld::with_policy(options.black_channel);
        Self::with_transform(options, transform)
    }
}

impl<T: FrameTransform> Pipeline<T> {
    /// Create a pipeline around a custom transform.
    ///
    /// # Errors
    ///
    /// Returns the error from [`PipelineOptions::validate`].
    pub fn with_transform(options: PipelineOptions, transform: T) -> Result<Self, BalanceError> {
        options.validate()?;
        Ok(Self { options, transform })
    }

    /// The options this pipeline was built with.
    pub fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// The transform applied to each frame.
    pub fn transform(&self) -> &T {
        &self.transform
    }

    /// Process every frame of `source` and write the results to `sink`.
    ///
    /// Pass `&mut sink` to keep ownership of the sink, or
    /// [`DiscardSink`](crate::DiscardSink) to disable output.
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::EmptyStream`] if the source has no frames,
    /// the first worker error of a failing batch, or any sink error. A
    /// panicking transform is reported as [`BalanceError::WorkerPanicked`];
    /// under [`RowSplit`](PartitionStrategy::RowSplit) the rank is 0.
    pub fn run<S, K>(&self, source: &S, mut sink: K) -> Result<PipelineMetrics, BalanceError>
    where
        S: FrameSource,
        K: FrameSink,
    {
        let run_started = Instant::now();
        let info = source.info();
        let strategy = self.options.strategy;

        log::info!(
            "Balancing {}x{} stream with {} thread(s), window {}, strategy {strategy}",
            info.width,
            info.height,
            self.options.threads,
            self.options.window_size,
        );

        let mut window = FrameWindow::new(self.options.window_size)?;
        let mut tracker = ProgressTracker::new(
            Arc::clone(&self.options.progress),
            info.frame_count,
            self.options.progress_interval,
        );
        let mut metrics = PipelineMetrics::default();

        // Stride and RowSplit decode sequentially from one reader that lives
        // across batches; Block workers open their own.
        let mut sequential_reader = match strategy {
            PartitionStrategy::Block => None,
            PartitionStrategy::Stride | PartitionStrategy::RowSplit => {
                let started = Instant::now();
                let reader = source.open_reader()?;
                metrics.decode += started.elapsed();
                Some(reader)
            }
        };
        let row_pool = match strategy {
            PartitionStrategy::RowSplit => Some(self.build_row_pool()?),
            _ => None,
        };

        let mut start = 0u64;
        let mut batch_number = 0u64;
        loop {
            enter(batch_number, BatchState::FetchingBatch);
            let outcome = match (strategy, sequential_reader.as_mut(), row_pool.as_ref()) {
                (PartitionStrategy::Stride, Some(reader), _) => {
                    self.run_stride_batch(reader, &window, start, batch_number, &mut sink, &mut tracker)?
                }
                (PartitionStrategy::RowSplit, Some(reader), Some(pool)) => {
                    self.run_row_split_batch(reader, pool, &window, start, &mut sink, &mut tracker)?
                }
                _ => {
                    let remaining = info.frame_count.map(|total| total.saturating_sub(start));
                    self.run_block_batch(source, &window, start, remaining, batch_number, &mut sink, &mut tracker)?
                }
            };

            enter(batch_number, BatchState::Advancing);
            metrics.record_workers(&outcome.per_rank);
            metrics.record(outcome.controller);
            window.reset();

            if outcome.delivered == 0 {
                if start == 0 {
                    return Err(BalanceError::EmptyStream);
                }
                break;
            }

            log::debug!(
                "Batch {batch_number}: frames {}..{}",
                start,
                start + outcome.delivered as u64
            );
            metrics.frames += outcome.delivered as u64;
            metrics.batches += 1;
            start += outcome.delivered as u64;
            batch_number += 1;

            if outcome.exhausted {
                break;
            }
        }
        enter(batch_number, BatchState::Done);

        let started = Instant::now();
        sink.finish()?;
        metrics.encode += started.elapsed();
        tracker.finish();

        metrics.total = run_started.elapsed();
        metrics.peak_resident = window.peak_resident();
        log::info!(
            "Balanced {} frame(s) in {} batch(es), {:.3}s",
            metrics.frames,
            metrics.batches,
            metrics.total.as_secs_f64()
        );
        Ok(metrics)
    }

    fn build_row_pool(&self) -> Result<ThreadPool, BalanceError> {
        ThreadPoolBuilder::new()
            .num_threads(self.options.threads)
            .thread_name(|index| format!("graybalance-rows-{index}"))
            .build()
            .map_err(|error| BalanceError::ThreadPool(error.to_string()))
    }

    /// Workers each decode a contiguous run with their own reader.
    #[allow(clippy::too_many_arguments)]
    fn run_block_batch<S, K>(
        &self,
        source: &S,
        window: &FrameWindow,
        start: u64,
        remaining: Option<u64>,
        batch_number: u64,
        sink: &mut K,
        tracker: &mut ProgressTracker,
    ) -> Result<BatchOutcome, BalanceError>
    where
        S: FrameSource,
        K: FrameSink,
    {
        // The frame-count hint only sizes the batch. Containers may under-report,
        // so once it runs out the next batch asks for a full window and the run
        // ends on the first short batch.
        let capacity = window.capacity();
        let count = match remaining {
            Some(left) if left > 0 => left.min(capacity as u64) as usize,
            _ => capacity,
        };
        let batch = BatchDescriptor { start, count };

        // Every slot is reserved up front so the drain can start waiting on
        // slot 0 while later slots are still being decoded.
        let reservations = (0..count)
            .map(|position| window.reserve(position))
            .collect::<Result<Vec<_>, _>>()?;
        let assignments = PartitionStrategy::Block.assign(count, self.options.threads);
        let groups = distribute(reservations, &assignments);

        enter(batch_number, BatchState::Dispatching);
        let transform = &self.transform;
        let (drained, workers) = thread::scope(|scope| {
            let handles: Vec<_> = groups
                .into_iter()
                .map(|group| scope.spawn(move || decode_and_balance(source, transform, start, group)))
                .collect();

            enter(batch_number, BatchState::Draining);
            let drained = drain_batch(window, batch, sink, tracker);
            (drained, join_workers(handles))
        });

        let per_rank = workers?;
        let drained = drained?;
        Ok(BatchOutcome {
            exhausted: drained.delivered < count,
            delivered: drained.delivered,
            per_rank,
            controller: PhaseTimes {
                encode: drained.encode,
                ..PhaseTimes::default()
            },
        })
    }

    /// The controller fills the window sequentially, then workers correct
    /// strided positions while the controller drains.
    fn run_stride_batch<R, K>(
        &self,
        reader: &mut R,
        window: &FrameWindow,
        start: u64,
        batch_number: u64,
        sink: &mut K,
        tracker: &mut ProgressTracker,
    ) -> Result<BatchOutcome, BalanceError>
    where
        R: FrameReader,
        K: FrameSink,
    {
        let mut controller = PhaseTimes::default();
        let mut reservations = Vec::with_capacity(window.capacity());
        let mut exhausted = false;

        let started = Instant::now();
        for position in 0..window.capacity() {
            let Some(image) = reader.read_frame()? else {
                exhausted = true;
                break;
            };
            let mut slot = window.reserve(position)?;
            slot.fill(Frame::new(start + position as u64, image));
            reservations.push(slot);
        }
        controller.decode += started.elapsed();

        let count = reservations.len();
        if count == 0 {
            return Ok(BatchOutcome::exhausted());
        }
        let batch = BatchDescriptor { start, count };
        let assignments = PartitionStrategy::Stride.assign(count, self.options.threads);
        let groups = distribute(reservations, &assignments);

        enter(batch_number, BatchState::Dispatching);
        let transform = &self.transform;
        let (drained, workers) = thread::scope(|scope| {
            let handles: Vec<_> = groups
                .into_iter()
                .map(|group| scope.spawn(move || balance_group(transform, group)))
                .collect();

            enter(batch_number, BatchState::Draining);
            let drained = drain_batch(window, batch, sink, tracker);
            (drained, join_workers(handles))
        });

        let per_rank = workers?;
        let drained = drained?;
        controller.encode += drained.encode;
        Ok(BatchOutcome {
            delivered: drained.delivered,
            exhausted,
            per_rank,
            controller,
        })
    }

    /// One frame at a time: decode, correct with rows split across the pool,
    /// drain. Nothing overlaps.
    fn run_row_split_batch<R, K>(
        &self,
        reader: &mut R,
        pool: &ThreadPool,
        window: &FrameWindow,
        start: u64,
        sink: &mut K,
        tracker: &mut ProgressTracker,
    ) -> Result<BatchOutcome, BalanceError>
    where
        R: FrameReader,
        K: FrameSink,
    {
        let batch = BatchDescriptor {
            start,
            count: window.capacity(),
        };
        let mut times = PhaseTimes::default();
        let mut report = DrainReport::default();
        let mut exhausted = false;

        for position in 0..window.capacity() {
            let started = Instant::now();
            let Some(image) = reader.read_frame()? else {
                exhausted = true;
                break;
            };
            times.decode += started.elapsed();

            let mut slot = window.reserve(position)?;
            slot.fill(Frame::new(start + position as u64, image));

            let started = Instant::now();
            if let Some(frame) = slot.frame_mut() {
                let transform = &self.transform;
                panic::catch_unwind(AssertUnwindSafe(|| transform.apply_split(frame, pool)))
                    .map_err(|payload| BalanceError::WorkerPanicked {
                        rank: 0,
                        message: panic_message(payload.as_ref()),
                    })??;
            }
            times.compute += started.elapsed();
            slot.publish()?;

            drain_slot(window, batch, position, sink, tracker, &mut report)?;
        }
        times.encode += report.encode;

        Ok(BatchOutcome {
            delivered: report.delivered,
            exhausted,
            per_rank: Vec::new(),
            controller: times,
        })
    }
}

/// Block worker: open a reader at the group's first frame and decode,
/// correct, and publish each slot in turn.
///
/// At end-of-stream the remaining reservations are dropped, which abandons
/// their slots.
fn decode_and_balance<S, T>(
    source: &S,
    transform: &T,
    batch_start: u64,
    group: Vec<SlotReservation<'_>>,
) -> Result<PhaseTimes, BalanceError>
where
    S: FrameSource,
    T: FrameTransform,
{
    let mut times = PhaseTimes::default();
    let Some(first) = group.first().map(SlotReservation::position) else {
        return Ok(times);
    };

    let started = Instant::now();
    let mut reader = source.open_reader()?;
    reader.seek_frame(batch_start + first as u64)?;
    times.decode += started.elapsed();

    for mut slot in group {
        let started = Instant::now();
        let Some(image) = reader.read_frame()? else {
            break;
        };
        times.decode += started.elapsed();

        slot.fill(Frame::new(batch_start + slot.position() as u64, image));
        balance_and_publish(transform, slot, &mut times)?;
    }
    Ok(times)
}

/// Stride worker: correct and publish frames already decoded into the window.
fn balance_group<T: FrameTransform>(
    transform: &T,
    group: Vec<SlotReservation<'_>>,
) -> Result<PhaseTimes, BalanceError> {
    let mut times = PhaseTimes::default();
    for slot in group {
        balance_and_publish(transform, slot, &mut times)?;
    }
    Ok(times)
}

fn balance_and_publish<T: FrameTransform>(
    transform: &T,
    mut slot: SlotReservation<'_>,
    times: &mut PhaseTimes,
) -> Result<(), BalanceError> {
    let started = Instant::now();
    if let Some(frame) = slot.frame_mut() {
        transform.apply(frame)?;
    }
    times.compute += started.elapsed();
    slot.publish()
}

/// Join every worker, keeping per-rank timings. The first failure wins.
fn join_workers(
    handles: Vec<ScopedJoinHandle<'_, Result<PhaseTimes, BalanceError>>>,
) -> Result<Vec<PhaseTimes>, BalanceError> {
    let mut per_rank = vec![PhaseTimes::default(); handles.len()];
    let mut first_error = None;

    for (rank, handle) in handles.into_iter().enumerate() {
        match handle.join() {
            Ok(Ok(times)) => per_rank[rank] = times,
            Ok(Err(error)) => {
                log::debug!("Worker {rank} failed: {error}");
                first_error.get_or_insert(error);
            }
            Err(payload) => {
                first_error.get_or_insert(BalanceError::WorkerPanicked {
                    rank,
                    message: panic_message(payload.as_ref()),
                });
            }
        }
    }

    match first_error {
        Some(error) => Err(error),
        None => Ok(per_rank),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|message| (*message).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string())
}
