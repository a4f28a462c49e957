//! Pipeline configuration.
//!
//! [`PipelineOptions`] is a builder that carries the thread count, window
//! size, partition strategy, black-channel policy, and progress reporting
//! into [`Pipeline::new`](crate::Pipeline::new).
//!
//! # Example
//!
//! ```
//! use graybalance::{BlackChannelPolicy, PartitionStrategy, PipelineOptions};
//!
//! let options = PipelineOptions::new()
//!     .with_threads(8)
//!     .with_window_size(120)
//!     .with_strategy(PartitionStrategy::Stride)
//!     .with_black_channel_policy(BlackChannelPolicy::PassThrough);
//! assert_eq!(options.threads(), 8);
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::sync::Arc;

use crate::error::BalanceError;
use crate::partition::PartitionStrategy;
use crate::progress::{NoOpProgress, ProgressCallback};
use crate::transform::BlackChannelPolicy;
use crate::window::DEFAULT_WINDOW_SIZE;

/// Settings for a pipeline run.
///
/// A default-constructed value runs one worker over a
/// [`DEFAULT_WINDOW_SIZE`]-slot window with the
/// [`Block`](PartitionStrategy::Block) strategy.
#[derive(Clone)]
pub struct PipelineOptions {
    pub(crate) threads: usize,
    pub(crate) window_size: usize,
    pub(crate) strategy: PartitionStrategy,
    pub(crate) black_channel: BlackChannelPolicy,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    /// Fire the progress callback every N written frames.
    pub(crate) progress_interval: u64,
}

impl Debug for PipelineOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("PipelineOptions")
            .field("threads", &self.threads)
            .field("window_size", &self.window_size)
            .field("strategy", &self.strategy)
            .field("black_channel", &self.black_channel)
            .field("progress_interval", &self.progress_interval)
            .finish_non_exhaustive()
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl PipelineOptions {
    /// Create options with default settings.
    pub fn new() -> Self {
        Self {
            threads: 1,
            window_size: DEFAULT_WINDOW_SIZE,
            strategy: PartitionStrategy::default(),
            black_channel: BlackChannelPolicy::default(),
            progress: Arc::new(NoOpProgress),
            progress_interval: 1,
        }
    }

    /// Set the number of worker threads per batch.
    #[must_use]
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Set the number of frames held in flight at once.
    #[must_use]
    pub fn with_window_size(mut self, window_size: usize) -> Self {
        self.window_size = window_size;
        self
    }

    /// Set how work is divided among the threads.
    #[must_use]
    pub fn with_strategy(mut self, strategy: PartitionStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Set what happens to frames with a zero channel mean.
    #[must_use]
    pub fn with_black_channel_policy(mut self, policy: BlackChannelPolicy) -> Self {
        self.black_channel = policy;
        self
    }

    /// Attach a progress callback.
    #[must_use]
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Set how often the progress callback fires. Clamped to at least 1.
    #[must_use]
    pub fn with_progress_interval(mut self, frames: u64) -> Self {
        self.progress_interval = frames.max(1);
        self
    }

    /// Worker threads per batch.
    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Frame window capacity.
    pub fn window_size(&self) -> usize {
        self.window_size
    }

    /// Partition strategy.
    pub fn strategy(&self) -> PartitionStrategy {
        self.strategy
    }

    /// Black-channel policy.
    pub fn black_channel_policy(&self) -> BlackChannelPolicy {
        self.black_channel
    }

    /// Check that the options describe a runnable pipeline.
    ///
    /// # Errors
    ///
    /// [`BalanceError::InvalidThreadCount`] for zero threads,
    /// [`BalanceError::InvalidWindowSize`] for a zero window.
    pub fn validate(&self) -> Result<(), BalanceError> {
        if self.threads == 0 {
            return Err(BalanceError::InvalidThreadCount(self.threads));
        }
        if self.window_size == 0 {
            return Err(BalanceError::InvalidWindowSize);
        }
        Ok(())
    }
}
