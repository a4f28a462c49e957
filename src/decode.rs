//! FFmpeg decode source.
//!
//! [`VideoInput`] opens a media file once and caches its [`StreamInfo`].
//! Each call to [`FrameSource::open_reader`] opens a fresh demuxer and
//! decoder, so every worker of a batch can decode its own range
//! independently.
//!
//! # Example
//!
//! ```no_run
//! use graybalance::{FrameReader, FrameSource, VideoInput};
//!
//! let input = VideoInput::open("input.mp4")?;
//! println!("{}x{} @ {:.2} fps", input.info().width, input.info().height,
//!     input.info().frames_per_second);
//!
//! let mut reader = input.open_reader()?;
//! reader.seek_frame(100)?;
//! if let Some(image) = reader.read_frame()? {
//!     image.save("frame_100.png")?;
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    Error as FfmpegError, Packet, Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::{Pixel, context::Input},
    frame::Video as VideoFrame,
    media::Type,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::RgbImage;

use crate::error::BalanceError;
use crate::media::{FrameReader, FrameSource, StreamInfo};

/// Consecutive non-EOF demuxer failures tolerated before giving up.
const MAX_READ_FAILURES: u32 = 32;

/// An opened video file.
#[derive(Debug, Clone)]
pub struct VideoInput {
    path: PathBuf,
    info: StreamInfo,
}

impl VideoInput {
    /// Open a media file and read the properties of its best video stream.
    ///
    /// Initialises FFmpeg (idempotent).
    ///
    /// # Errors
    ///
    /// Returns [`BalanceError::FileOpen`] if the file cannot be opened or its
    /// video codec is unsupported, and [`BalanceError::NoVideoStream`] if it
    /// has no video stream.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, BalanceError> {
        let path = path.as_ref().to_path_buf();
        log::debug!("Opening media file: {}", path.display());

        ffmpeg_next::init().map_err(|error| BalanceError::FileOpen {
            path: path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input_context = open_input(&path)?;
        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or(BalanceError::NoVideoStream)?;

        let decoder = open_decoder(&stream).map_err(|error| BalanceError::FileOpen {
            path: path.clone(),
            reason: format!("Failed to create video decoder: {error}"),
        })?;

        let frames_per_second = rational_to_f64(stream.avg_frame_rate())
            .or_else(|| rational_to_f64(stream.rate()))
            .unwrap_or(0.0);

        let frame_count = match stream.frames() {
            frames if frames > 0 => Some(frames as u64),
            _ => {
                let duration_microseconds = input_context.duration();
                (duration_microseconds > 0 && frames_per_second > 0.0).then(|| {
                    (duration_microseconds as f64 / 1_000_000.0 * frames_per_second).round() as u64
                })
            }
        };

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let info = StreamInfo {
            width: decoder.width(),
            height: decoder.height(),
            frames_per_second,
            frame_count,
            codec,
        };
        log::debug!("Video stream: {info:?}");

        Ok(Self { path, info })
    }

    /// Path the input was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl FrameSource for VideoInput {
    type Reader = VideoReader;

    fn info(&self) -> &StreamInfo {
        &self.info
    }

    fn open_reader(&self) -> Result<VideoReader, BalanceError> {
        VideoReader::new(&self.path, &self.info)
    }
}

fn open_input(path: &Path) -> Result<Input, BalanceError> {
    ffmpeg_next::format::input(path).map_err(|error| BalanceError::FileOpen {
        path: path.to_path_buf(),
        reason: error.to_string(),
    })
}

fn open_decoder(stream: &ffmpeg_next::format::stream::Stream<'_>) -> Result<VideoDecoder, FfmpegError> {
    CodecContext::from_parameters(stream.parameters())?
        .decoder()
        .video()
}

fn rational_to_f64(rate: Rational) -> Option<f64> {
    (rate.numerator() > 0 && rate.denominator() > 0)
        .then(|| f64::from(rate.numerator()) / f64::from(rate.denominator()))
}

/// Sequential RGB24 frame reader over one FFmpeg demuxer.
///
/// Created through [`VideoInput`]'s [`FrameSource::open_reader`].
pub struct VideoReader {
    input_context: Input,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    video_stream_index: usize,
    time_base: Rational,
    start_time: i64,
    frames_per_second: f64,
    /// Container frame-count hint, used only to recognise seeks past the end.
    frame_count: Option<u64>,
    width: u32,
    height: u32,
    decoded_frame: VideoFrame,
    rgb_frame: VideoFrame,
    /// After a seek, decoded frames before this index are discarded.
    skip_before: Option<u64>,
    eof_sent: bool,
    started: bool,
}

impl VideoReader {
    fn new(path: &Path, info: &StreamInfo) -> Result<Self, BalanceError> {
        let input_context = open_input(path)?;

        let (video_stream_index, time_base, start_time, decoder) = {
            let stream = input_context
                .streams()
                .best(Type::Video)
                .ok_or(BalanceError::NoVideoStream)?;
            (
                stream.index(),
                stream.time_base(),
                // AV_NOPTS_VALUE is i64::MIN.
                stream.start_time().max(0),
                open_decoder(&stream)?,
            )
        };

        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGB24,
            info.width,
            info.height,
            ScalingFlags::BILINEAR,
        )?;

        Ok(Self {
            input_context,
            decoder,
            scaler,
            video_stream_index,
            time_base,
            start_time,
            frames_per_second: info.frames_per_second,
            frame_count: info.frame_count,
            width: info.width,
            height: info.height,
            decoded_frame: VideoFrame::empty(),
            rgb_frame: VideoFrame::empty(),
            skip_before: None,
            eof_sent: false,
            started: false,
        })
    }

    /// Whether the frame in `decoded_frame` precedes the seek target.
    fn before_seek_target(&self) -> bool {
        let Some(target) = self.skip_before else {
            return false;
        };
        let Some(timestamp) = self.decoded_frame.timestamp().or(self.decoded_frame.pts()) else {
            return false;
        };
        let frame_number = crate::utilities::timestamp_to_frame_number(
            timestamp,
            self.start_time,
            self.time_base,
            self.frames_per_second,
        );
        frame_number < target
    }

    fn convert_current_frame(&mut self) -> Result<RgbImage, BalanceError> {
        self.scaler.run(&self.decoded_frame, &mut self.rgb_frame)?;
        let buffer =
            crate::utilities::frame_to_rgb_buffer(&self.rgb_frame, self.width, self.height);
        RgbImage::from_raw(self.width, self.height, buffer).ok_or_else(|| {
            BalanceError::VideoDecodeError(
                "Failed to construct RGB image from decoded frame data".to_string(),
            )
        })
    }
}

impl FrameReader for VideoReader {
    fn read_frame(&mut self) -> Result<Option<RgbImage>, BalanceError> {
        self.started = true;
        let mut read_failures = 0;

        loop {
            if self.decoder.receive_frame(&mut self.decoded_frame).is_ok() {
                if self.before_seek_target() {
                    continue;
                }
                self.skip_before = None;
                return self.convert_current_frame().map(Some);
            }

            if self.eof_sent {
                return Ok(None);
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input_context) {
                Ok(()) => {
                    read_failures = 0;
                    if packet.stream() == self.video_stream_index {
                        self.decoder.send_packet(&packet)?;
                    }
                }
                Err(FfmpegError::Eof) => {
                    self.decoder.send_eof()?;
                    self.eof_sent = true;
                }
                Err(error) => {
                    read_failures += 1;
                    if read_failures >= MAX_READ_FAILURES {
                        return Err(BalanceError::VideoDecodeError(format!(
                            "demuxer kept failing: {error}"
                        )));
                    }
                }
            }
        }
    }

    fn seek_frame(&mut self, index: u64) -> Result<(), BalanceError> {
        if index == 0 && !self.started {
            return Ok(());
        }

        let timestamp =
            crate::utilities::frame_number_to_seek_timestamp(index, self.frames_per_second);
        if let Err(error) = self.input_context.seek(timestamp, ..timestamp) {
            // Demuxers may refuse a target beyond the last frame; that is
            // end-of-stream, not a failure.
            if self.frame_count.is_some_and(|count| index >= count) {
                log::debug!("Seek to frame {index} failed past the end of stream: {error}");
                self.decoder.flush();
                self.eof_sent = true;
                self.skip_before = None;
                return Ok(());
            }
            return Err(error.into());
        }
        self.decoder.flush();
        self.eof_sent = false;
        self.skip_before = Some(index);
        Ok(())
    }
}
