//! In-memory sources and sinks.
//!
//! Useful when frames are already decoded, and for exercising the pipeline
//! without touching the filesystem.

use std::sync::Arc;

use image::RgbImage;

use crate::error::BalanceError;
use crate::frame::Frame;
use crate::media::{FrameReader, FrameSink, FrameSource, StreamInfo};

/// A [`FrameSource`] over a fixed list of images.
///
/// Readers share the image list, so opening one per worker is cheap.
#[derive(Debug, Clone)]
pub struct MemorySource {
    info: StreamInfo,
    images: Arc<[RgbImage]>,
}

impl MemorySource {
    /// Build a source from `images` at `frames_per_second`.
    ///
    /// Dimensions are taken from the first image (0×0 when empty).
    pub fn new(images: Vec<RgbImage>, frames_per_second: f64) -> Self {
        let (width, height) = images
            .first()
            .map(|image| image.dimensions())
            .unwrap_or((0, 0));
        let info = StreamInfo {
            width,
            height,
            frames_per_second,
            frame_count: Some(images.len() as u64),
            codec: "rawvideo".to_string(),
        };
        Self {
            info,
            images: images.into(),
        }
    }

    /// Hide the frame count, as containers without an index do.
    #[must_use]
    pub fn without_frame_count(mut self) -> Self {
        self.info.frame_count = None;
        self
    }

    /// Report `frames` as the frame count regardless of how many images
    /// are held, as containers with a stale or estimated index do.
    #[must_use]
    pub fn with_frame_count_hint(mut self, frames: u64) -> Self {
        self.info.frame_count = Some(frames);
        self
    }

    /// Number of images held.
    pub fn len(&self) -> usize {
        self.images.len()
    }

    /// Whether the source holds no images.
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }
}

impl FrameSource for MemorySource {
    type Reader = MemoryReader;

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn open_reader(&self) -> Result<MemoryReader, BalanceError> {
        Ok(MemoryReader {
            images: Arc::clone(&self.images),
            position: 0,
        })
    }
}

/// Sequential reader over a [`MemorySource`].
#[derive(Debug)]
pub struct MemoryReader {
    images: Arc<[RgbImage]>,
    position: usize,
}

impl FrameReader for MemoryReader {
    fn read_frame(&mut self) -> Result<Option<RgbImage>, BalanceError> {
        let image = self.images.get(self.position).cloned();
        if image.is_some() {
            self.position += 1;
        }
        Ok(image)
    }

    fn seek_frame(&mut self, index: u64) -> Result<(), BalanceError> {
        self.position = usize::try_from(index).unwrap_or(usize::MAX);
        Ok(())
    }
}

/// A [`FrameSink`] that keeps every frame it receives.
#[derive(Debug, Default)]
pub struct MemorySink {
    frames: Vec<Frame>,
    finished: bool,
}

impl MemorySink {
    /// Create an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames received so far, in arrival order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Whether [`FrameSink::finish`] has been called.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Consume the sink and return its frames.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }
}

impl FrameSink for MemorySink {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), BalanceError> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn finish(&mut self) -> Result<(), BalanceError> {
        self.finished = true;
        Ok(())
    }
}
