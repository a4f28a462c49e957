//! Decode and encode collaborator contracts.
//!
//! The pipeline never talks to FFmpeg directly. It reads frames through a
//! [`FrameSource`] / [`FrameReader`] pair and writes them to a
//! [`FrameSink`]. [`VideoInput`](crate::VideoInput) and
//! [`VideoWriter`](crate::VideoWriter) are the FFmpeg implementations;
//! [`MemorySource`](crate::MemorySource) and
//! [`MemorySink`](crate::MemorySink) keep everything in memory.

use image::RgbImage;

use crate::error::BalanceError;
use crate::frame::Frame;

/// Properties of the video stream a source produces.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Average frame rate.
    pub frames_per_second: f64,
    /// Number of frames, when the container reports it.
    pub frame_count: Option<u64>,
    /// Codec name of the source stream.
    pub codec: String,
}

/// Something that can hand out independent sequential readers.
///
/// The source is shared by every worker of a batch, so it must be
/// [`Sync`]. Readers are opened on the thread that uses them and need not be
/// [`Send`].
pub trait FrameSource: Sync {
    /// Reader type produced by [`open_reader`](FrameSource::open_reader).
    type Reader: FrameReader;

    /// Stream properties.
    fn info(&self) -> &StreamInfo;

    /// Open a new reader positioned at the first frame.
    fn open_reader(&self) -> Result<Self::Reader, BalanceError>;
}

/// A sequential, seekable stream of decoded frames.
pub trait FrameReader {
    /// Decode the next frame, or `None` at end-of-stream.
    fn read_frame(&mut self) -> Result<Option<RgbImage>, BalanceError>;

    /// Position the reader so the next [`read_frame`](FrameReader::read_frame)
    /// returns frame `index`.
    fn seek_frame(&mut self, index: u64) -> Result<(), BalanceError>;
}

/// Ordered consumer of corrected frames.
pub trait FrameSink {
    /// Append one frame. Frames arrive in stream order.
    fn write_frame(&mut self, frame: &Frame) -> Result<(), BalanceError>;

    /// Flush buffered output. Called once after the last frame.
    fn finish(&mut self) -> Result<(), BalanceError>;
}

impl<K: FrameSink + ?Sized> FrameSink for &mut K {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), BalanceError> {
        (**self).write_frame(frame)
    }

    fn finish(&mut self) -> Result<(), BalanceError> {
        (**self).finish()
    }
}

/// A sink that drops every frame. Used when output is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct DiscardSink;

impl FrameSink for DiscardSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<(), BalanceError> {
        Ok(())
    }

    fn finish(&mut self) -> Result<(), BalanceError> {
        Ok(())
    }
}
