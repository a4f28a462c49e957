//! Frame and channel types shared by every pipeline stage.

use std::fmt::{Display, Formatter, Result as FmtResult};

use image::RgbImage;

/// One colour channel of a packed 3×8-bit pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
    /// Red, byte offset 0.
    Red,
    /// Green, byte offset 1. The gray-world baseline.
    Green,
    /// Blue, byte offset 2.
    Blue,
}

impl Channel {
    /// All channels in pixel byte order.
    pub const ALL: [Channel; 3] = [Channel::Red, Channel::Green, Channel::Blue];

    /// Byte offset of this channel inside an RGB24 pixel.
    pub fn offset(self) -> usize {
        match self {
            Channel::Red => 0,
            Channel::Green => 1,
            Channel::Blue => 2,
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        let name = match self {
            Channel::Red => "red",
            Channel::Green => "green",
            Channel::Blue => "blue",
        };
        f.write_str(name)
    }
}

/// A decoded video frame tagged with its absolute position in the stream.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    /// Zero-based position of the frame in the source stream.
    pub index: u64,
    /// Packed RGB24 pixel data.
    pub image: RgbImage,
}

impl Frame {
    /// Wrap a decoded image.
    pub fn new(index: u64, image: RgbImage) -> Self {
        Self { index, image }
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Number of pixels in the frame.
    pub fn pixel_count(&self) -> u64 {
        u64::from(self.image.width()) * u64::from(self.image.height())
    }
}
