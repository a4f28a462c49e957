//! # graybalance
//!
//! Gray-world color balance for video files, driven by a bounded,
//! order-preserving multi-threaded frame pipeline.
//!
//! Every frame is corrected independently: the per-channel means are
//! computed, each channel is scaled so that its mean matches the green
//! mean, and the result is written to the output in stream order.
//!
//! ## Quick Start
//!
//! ```no_run
//! use graybalance::{
//!     FrameSource, Pipeline, PipelineOptions, VideoInput, VideoWriter, VideoWriterOptions,
//! };
//!
//! let input = VideoInput::open("input.mp4")?;
//! let writer = VideoWriter::create("output.avi", VideoWriterOptions::from_stream(input.info()))?;
//!
//! let pipeline = Pipeline::new(PipelineOptions::new().with_threads(8))?;
//! let metrics = pipeline.run(&input, writer)?;
//! println!("{metrics}");
//! # Ok::<(), graybalance::BalanceError>(())
//! ```
//!
//! ### In-memory frames
//!
//! ```
//! use graybalance::{MemorySink, MemorySource, PartitionStrategy, Pipeline, PipelineOptions};
//! use image::{Rgb, RgbImage};
//!
//! let frames = vec![RgbImage::from_pixel(4, 4, Rgb([120, 150, 100])); 10];
//! let source = MemorySource::new(frames, 25.0);
//! let mut sink = MemorySink::new();
//!
//! let options = PipelineOptions::new()
//!     .with_threads(3)
//!     .with_window_size(4)
//!     .with_strategy(PartitionStrategy::Stride);
//! Pipeline::new(options)?.run(&source, &mut sink)?;
//!
//! assert_eq!(sink.frames().len(), 10);
//! assert_eq!(sink.frames()[0].image.get_pixel(0, 0), &Rgb([150, 150, 150]));
//! # Ok::<(), graybalance::BalanceError>(())
//! ```
//!
//! ## Pipeline
//!
//! - **Bounded memory**: a [`FrameWindow`] of `window_size` slots holds every
//!   frame in flight
//! - **Ordered output**: a single drain consumes slots in ascending order, so
//!   the sink sees frames in stream order regardless of worker timing
//! - **Partition strategies**: contiguous blocks with per-worker decoders,
//!   round-robin stride over a sequentially decoded batch, or row-split
//!   parallelism inside each frame
//! - **Phase timings**: [`PipelineMetrics`] reports total, decode, encode,
//!   and compute time
//!
//! ## Requirements
//!
//! FFmpeg development libraries must be installed on your system.

pub mod configuration;
pub mod decode;
mod drain;
pub mod encode;
pub mod error;
pub mod ffmpeg;
pub mod frame;
pub mod media;
pub mod memory;
pub mod metrics;
pub mod partition;
pub mod pipeline;
pub mod progress;
pub mod transform;
mod utilities;
pub mod window;

pub use configuration::PipelineOptions;
pub use decode::{VideoInput, VideoReader};
pub use encode::{VideoCodec, VideoWriter, VideoWriterOptions};
pub use error::BalanceError;
pub use ffmpeg::{FfmpegLogLevel, set_ffmpeg_log_level};
pub use frame::{Channel, Frame};
pub use media::{DiscardSink, FrameReader, FrameSink, FrameSource, StreamInfo};
pub use memory::{MemoryReader, MemorySink, MemorySource};
pub use metrics::{PhaseTimes, PipelineMetrics};
pub use partition::{PartitionStrategy, WorkAssignment};
pub use pipeline::{BatchDescriptor, Pipeline};
pub use progress::{ProgressCallback, ProgressInfo};
pub use transform::{
    BlackChannelPolicy, ChannelMeans, FrameTransform, GrayWorld, LookupTables, channel_means,
};
pub use window::{DEFAULT_WINDOW_SIZE, FrameWindow, SlotReservation};
