//! Error types for the `graybalance` crate.
//!
//! This module defines [`BalanceError`], the unified error type returned by
//! every fallible operation in the crate, from opening the input file through
//! the batched pipeline to finalising the output container.

use std::{io::Error as IoError, path::PathBuf};

use ffmpeg_next::Error as FfmpegError;
use thiserror::Error;

use crate::frame::Channel;

/// The unified error type for all `graybalance` operations.
///
/// Every failure is terminal for a pipeline run: there are no retries and no
/// partial-success mode.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum BalanceError {
    /// The input media file could not be opened.
    #[error("Failed to open media file at {path}: {reason}")]
    FileOpen {
        /// Path that was passed to [`crate::VideoInput::open`].
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The input file does not contain a video stream.
    #[error("No video stream found in file")]
    NoVideoStream,

    /// A video frame could not be decoded.
    #[error("Failed to decode video frame: {0}")]
    VideoDecodeError(String),

    /// The encoder could not be found, configured, or fed.
    #[error("Video encoding error: {0}")]
    VideoEncodeError(String),

    /// The output container could not be written.
    #[error("Video write error: {0}")]
    VideoWriteError(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    FfmpegError(String),

    /// An I/O error occurred while reading or writing files.
    #[error("I/O error: {0}")]
    IoError(#[from] IoError),

    /// A channel of the frame averages to zero, so no gray-world scale
    /// factor exists for it.
    #[error("Frame {frame} has a zero mean on the {channel} channel")]
    ZeroChannelMean {
        /// Absolute index of the offending frame.
        frame: u64,
        /// The channel whose mean is zero.
        channel: Channel,
    },

    /// A frame with no pixels reached the transform.
    #[error("Frame {0} has no pixels")]
    EmptyFrame(u64),

    /// The input produced no frames at all.
    #[error("Input stream contains no frames")]
    EmptyStream,

    /// The worker thread count must be at least one.
    #[error("Thread count must be greater than zero (got {0})")]
    InvalidThreadCount(usize),

    /// The frame window must hold at least one slot.
    #[error("Window size must be greater than zero")]
    InvalidWindowSize,

    /// A slot position outside the window was requested.
    #[error("Slot {position} is outside the frame window (capacity {capacity})")]
    SlotOutOfRange {
        /// Requested slot position.
        position: usize,
        /// Number of slots in the window.
        capacity: usize,
    },

    /// A reservation was published before any frame was stored in it.
    #[error("Slot {0} was published without a frame")]
    SlotNotFilled(usize),

    /// A frame did not match the dimensions the sink was opened with.
    #[error("Frame {index} is {actual_width}x{actual_height}, expected {expected_width}x{expected_height}")]
    FrameSizeMismatch {
        /// Absolute index of the frame.
        index: u64,
        /// Width the sink expects.
        expected_width: u32,
        /// Height the sink expects.
        expected_height: u32,
        /// Width of the frame.
        actual_width: u32,
        /// Height of the frame.
        actual_height: u32,
    },

    /// The row-split thread pool could not be built.
    #[error("Thread pool error: {0}")]
    ThreadPool(String),

    /// A worker thread panicked while processing a batch.
    #[error("Worker {rank} panicked: {message}")]
    WorkerPanicked {
        /// Rank of the worker within its batch.
        rank: usize,
        /// Panic payload, when it was a string.
        message: String,
    },
}

impl From<FfmpegError> for BalanceError {
    fn from(error: FfmpegError) -> Self {
        BalanceError::FfmpegError(error.to_string())
    }
}
