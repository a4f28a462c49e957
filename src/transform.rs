//! Per-frame colour correction.
//!
//! [`FrameTransform`] is the contract every pipeline stage relies on: take
//! one frame, correct it in place. [`GrayWorld`] is the gray-world
//! implementation. It assumes a well-balanced picture has equal channel
//! means and rescales red and blue toward the green mean through three
//! 256-entry lookup tables.
//!
//! # Example
//!
//! ```
//! use graybalance::{Frame, FrameTransform, GrayWorld};
//! use image::{Rgb, RgbImage};
//!
//! let image = RgbImage::from_pixel(4, 4, Rgb([120, 150, 100]));
//! let mut frame = Frame::new(0, image);
//! GrayWorld::new().apply(&mut frame)?;
//! assert_eq!(frame.image.get_pixel(0, 0), &Rgb([150, 150, 150]));
//! # Ok::<(), graybalance::BalanceError>(())
//! ```

use image::RgbImage;
use rayon::ThreadPool;
use rayon::prelude::*;

use crate::error::BalanceError;
use crate::frame::{Channel, Frame};

/// A colour correction applied to one frame at a time.
///
/// Implementations are shared by every worker of a batch, so they must be
/// [`Send`] and [`Sync`] and keep no per-call state.
pub trait FrameTransform: Send + Sync {
    /// Correct `frame` in place.
    fn apply(&self, frame: &mut Frame) -> Result<(), BalanceError>;

    /// Correct `frame` in place, splitting the pixel work across `pool`.
    ///
    /// Must produce exactly the output of [`apply`](FrameTransform::apply).
    /// The default implementation ignores the pool.
    fn apply_split(&self, frame: &mut Frame, pool: &ThreadPool) -> Result<(), BalanceError> {
        let _ = pool;
        self.apply(frame)
    }
}

/// What [`GrayWorld`] does with a frame whose channel mean is zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BlackChannelPolicy {
    /// Stop the run with [`BalanceError::ZeroChannelMean`]. This is the default.
    #[default]
    Fail,
    /// Leave the frame uncorrected and log a warning.
    PassThrough,
}

/// Arithmetic mean of each channel over every pixel of a frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChannelMeans {
    /// Mean of the red channel.
    pub red: f64,
    /// Mean of the green channel.
    pub green: f64,
    /// Mean of the blue channel.
    pub blue: f64,
}

impl ChannelMeans {
    fn from_sums(sums: [u64; 3], pixels: u64) -> Self {
        let pixels = pixels.max(1) as f64;
        Self {
            red: sums[0] as f64 / pixels,
            green: sums[1] as f64 / pixels,
            blue: sums[2] as f64 / pixels,
        }
    }

    /// Mean of a single channel.
    pub fn get(&self, channel: Channel) -> f64 {
        match channel {
            Channel::Red => self.red,
            Channel::Green => self.green,
            Channel::Blue => self.blue,
        }
    }
}

/// Compute the per-channel means of `image` on the calling thread.
pub fn channel_means(image: &RgbImage) -> ChannelMeans {
    let pixels = u64::from(image.width()) * u64::from(image.height());
    ChannelMeans::from_sums(channel_sums(image.as_raw()), pixels)
}

fn channel_sums(data: &[u8]) -> [u64; 3] {
    data.chunks_exact(3).fold([0u64; 3], |mut sums, pixel| {
        sums[0] += u64::from(pixel[0]);
        sums[1] += u64::from(pixel[1]);
        sums[2] += u64::from(pixel[2]);
        sums
    })
}

fn add_sums(a: [u64; 3], b: [u64; 3]) -> [u64; 3] {
    [a[0] + b[0], a[1] + b[1], a[2] + b[2]]
}

/// Per-channel 256-entry remapping tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTables {
    tables: [[u8; 256]; 3],
}

impl LookupTables {
    /// Build the gray-world tables for the given means.
    ///
    /// `table[c][v] = min(255, round(green_mean * v / mean[c]))`.
    ///
    /// # Errors
    ///
    /// Returns the first channel whose mean is zero, since it has no scale
    /// factor.
    pub fn from_means(means: &ChannelMeans) -> Result<Self, Channel> {
        if let Some(channel) = Channel::ALL.into_iter().find(|&c| means.get(c) <= 0.0) {
            return Err(channel);
        }

        let base = means.green;
        let mut tables = [[0u8; 256]; 3];
        for channel in Channel::ALL {
            let average = means.get(channel);
            let table = &mut tables[channel.offset()];
            for (value, entry) in table.iter_mut().enumerate() {
                let scaled = (base * value as f64 / average).round();
                *entry = scaled.min(255.0) as u8;
            }
        }

        Ok(Self { tables })
    }

    /// Look up the corrected value of `value` on `channel`.
    pub fn map(&self, channel: Channel, value: u8) -> u8 {
        self.tables[channel.offset()][usize::from(value)]
    }

    /// Remap a run of packed RGB24 pixels in place.
    pub fn apply_to(&self, pixels: &mut [u8]) {
        let [red, green, blue] = &self.tables;
        for pixel in pixels.chunks_exact_mut(3) {
            pixel[0] = red[usize::from(pixel[0])];
            pixel[1] = green[usize::from(pixel[1])];
            pixel[2] = blue[usize::from(pixel[2])];
        }
    }
}

/// Gray-world white balance.
#[derive(Debug, Clone, Copy, Default)]
pub struct GrayWorld {
    policy: BlackChannelPolicy,
}

impl GrayWorld {
    /// Create a transform that fails on black channels.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a transform with an explicit black-channel policy.
    pub fn with_policy(policy: BlackChannelPolicy) -> Self {
        Self { policy }
    }

    /// The configured black-channel policy.
    pub fn policy(&self) -> BlackChannelPolicy {
        self.policy
    }

    /// Resolve the tables for a frame, or `None` if it should pass through.
    fn tables_for(&self, index: u64, means: &ChannelMeans) -> Result<Option<LookupTables>, BalanceError> {
        match LookupTables::from_means(means) {
            Ok(tables) => Ok(Some(tables)),
            Err(channel) => match self.policy {
                BlackChannelPolicy::Fail => Err(BalanceError::ZeroChannelMean {
                    frame: index,
                    channel,
                }),
                BlackChannelPolicy::PassThrough => {
                    log::warn!("Frame {index}: {channel} channel mean is zero, leaving frame uncorrected");
                    Ok(None)
                }
            },
        }
    }
}

impl FrameTransform for GrayWorld {
    fn apply(&self, frame: &mut Frame) -> Result<(), BalanceError> {
        if frame.pixel_count() == 0 {
            return Err(BalanceError::EmptyFrame(frame.index));
        }

        let means = channel_means(&frame.image);
        if let Some(tables) = self.tables_for(frame.index, &means)? {
            tables.apply_to(&mut frame.image);
        }
        Ok(())
    }

    fn apply_split(&self, frame: &mut Frame, pool: &ThreadPool) -> Result<(), BalanceError> {
        if frame.pixel_count() == 0 {
            return Err(BalanceError::EmptyFrame(frame.index));
        }

        let row_len = frame.width() as usize * 3;
        let pixels = frame.pixel_count();

        let sums = pool.install(|| {
            frame
                .image
                .as_raw()
                .par_chunks(row_len)
                .map(channel_sums)
                .reduce(|| [0u64; 3], add_sums)
        });
        let means = ChannelMeans::from_sums(sums, pixels);

        if let Some(tables) = self.tables_for(frame.index, &means)? {
            let data: &mut [u8] = &mut frame.image;
            pool.install(|| {
                data.par_chunks_mut(row_len)
                    .for_each(|row| tables.apply_to(row));
            });
        }
        Ok(())
    }
}
