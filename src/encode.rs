//! FFmpeg encode sink.
//!
//! [`VideoWriter`] opens an output container, accepts frames one at a time
//! in presentation order, and finalises the file in
//! [`finish`](FrameSink::finish).
//!
//! # Example
//!
//! ```no_run
//! use graybalance::{
//!     BalanceError, FrameSource, VideoCodec, VideoInput, VideoWriter, VideoWriterOptions,
//! };
//!
//! let input = VideoInput::open("input.mp4")?;
//! let options = VideoWriterOptions::from_stream(input.info()).codec(VideoCodec::Huffyuv);
//! let writer = VideoWriter::create("output.avi", options)?;
//! # Ok::<(), BalanceError>(())
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::Path;

use ffmpeg_next::codec::Id;
use ffmpeg_next::codec::context::Context as CodecContext;
use ffmpeg_next::encoder::video::Encoder as VideoEncoder;
use ffmpeg_next::format::context::Output;
use ffmpeg_next::format::{Flags as FormatFlags, Pixel};
use ffmpeg_next::frame::Video as VideoFrame;
use ffmpeg_next::software::scaling::{Context as ScalingContext, Flags as ScalingFlags};
use ffmpeg_next::{Packet, Rational};

use crate::error::BalanceError;
use crate::frame::Frame;
use crate::media::{FrameSink, StreamInfo};

/// Frame rate used when the source does not report one.
const FALLBACK_FRAMES_PER_SECOND: f64 = 25.0;

/// Supported output video codecs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VideoCodec {
    /// Lossless HuffYUV, stored in AVI. This is the default.
    #[default]
    Huffyuv,
    /// MPEG-4 Part 2.
    Mpeg4,
    /// H.264 / AVC.
    H264,
}

impl VideoCodec {
    fn to_codec_id(self) -> Id {
        match self {
            VideoCodec::Huffyuv => Id::HUFFYUV,
            VideoCodec::Mpeg4 => Id::MPEG4,
            VideoCodec::H264 => Id::H264,
        }
    }

    fn input_pixel_format(self) -> Pixel {
        match self {
            VideoCodec::Huffyuv => Pixel::YUV422P,
            VideoCodec::Mpeg4 | VideoCodec::H264 => Pixel::YUV420P,
        }
    }
}

/// Options for [`VideoWriter`].
#[derive(Debug, Clone, PartialEq)]
pub struct VideoWriterOptions {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Output frame rate.
    pub frames_per_second: f64,
    /// Codec to encode with.
    pub codec: VideoCodec,
    /// Target bitrate in bits per second, for lossy codecs.
    pub bitrate: Option<usize>,
}

impl VideoWriterOptions {
    /// Options for a `width`×`height` stream at `frames_per_second`.
    pub fn new(width: u32, height: u32, frames_per_second: f64) -> Self {
        Self {
            width,
            height,
            frames_per_second,
            codec: VideoCodec::default(),
            bitrate: None,
        }
    }

    /// Inherit frame size and rate from a source stream.
    pub fn from_stream(info: &StreamInfo) -> Self {
        Self::new(info.width, info.height, info.frames_per_second)
    }

    /// Set the codec.
    #[must_use]
    pub fn codec(mut self, codec: VideoCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Set the target bitrate in bits per second.
    #[must_use]
    pub fn bitrate(mut self, bitrate: usize) -> Self {
        self.bitrate = Some(bitrate);
        self
    }
}

/// Streaming video encoder.
///
/// The container format is inferred from the output file extension.
pub struct VideoWriter {
    output: Output,
    encoder: VideoEncoder,
    scaler: ScalingContext,
    stream_index: usize,
    encoder_time_base: Rational,
    stream_time_base: Rational,
    options: VideoWriterOptions,
    next_pts: i64,
    finished: bool,
}

impl Debug for VideoWriter {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("VideoWriter")
            .field("options", &self.options)
            .field("frames_written", &self.next_pts)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}

impl VideoWriter {
    /// Open `path` for writing and write the container header.
    ///
    /// # Errors
    ///
    /// - [`BalanceError::VideoWriteError`] if the output cannot be created.
    /// - [`BalanceError::VideoEncodeError`] if the codec is unavailable or
    ///   cannot be opened with these options.
    pub fn create<P: AsRef<Path>>(path: P, options: VideoWriterOptions) -> Result<Self, BalanceError> {
        let path = path.as_ref();
        log::info!(
            "Writing {}x{} video to {:?} (codec={:?}, fps={:.3})",
            options.width, options.height, path, options.codec, options.frames_per_second,
        );

        ffmpeg_next::init()
            .map_err(|e| BalanceError::VideoWriteError(format!("FFmpeg initialisation failed: {e}")))?;

        let codec_id = options.codec.to_codec_id();
        let target_pixel = options.codec.input_pixel_format();
        let frames_per_second = if options.frames_per_second > 0.0 {
            options.frames_per_second
        } else {
            FALLBACK_FRAMES_PER_SECOND
        };
        let frame_rate = Rational::from(frames_per_second);
        let encoder_time_base = frame_rate.invert();

        let mut output = ffmpeg_next::format::output(path)
            .map_err(|e| BalanceError::VideoWriteError(format!("cannot open output: {e}")))?;

        let needs_global_header = output.format().flags().contains(FormatFlags::GLOBAL_HEADER);

        let encoder_codec = ffmpeg_next::encoder::find(codec_id).ok_or_else(|| {
            BalanceError::VideoEncodeError(format!("codec {codec_id:?} not available"))
        })?;

        let mut stream = output
            .add_stream(encoder_codec)
            .map_err(|e| BalanceError::VideoWriteError(format!("cannot add stream: {e}")))?;
        let stream_index = stream.index();

        let mut encoder = CodecContext::from_parameters(stream.parameters())
            .map_err(|e| BalanceError::VideoEncodeError(format!("cannot create codec context: {e}")))?
            .encoder()
            .video()
            .map_err(|e| BalanceError::VideoEncodeError(format!("cannot open video encoder: {e}")))?;

        encoder.set_width(options.width);
        encoder.set_height(options.height);
        encoder.set_format(target_pixel);
        encoder.set_time_base(encoder_time_base);
        encoder.set_frame_rate(Some(frame_rate));
        if let Some(bitrate) = options.bitrate {
            encoder.set_bit_rate(bitrate);
        }

        if needs_global_header {
            // SAFETY: the context is owned by `encoder` and not yet opened.
            unsafe {
                (*encoder.as_mut_ptr()).flags |= ffmpeg_sys_next::AV_CODEC_FLAG_GLOBAL_HEADER as i32;
            }
        }

        let opened_encoder = encoder
            .open_as(encoder_codec)
            .map_err(|e| BalanceError::VideoEncodeError(format!("cannot open encoder: {e}")))?;
        stream.set_parameters(&opened_encoder);
        stream.set_time_base(encoder_time_base);

        output
            .write_header()
            .map_err(|e| BalanceError::VideoWriteError(format!("cannot write header: {e}")))?;

        // The muxer may pick its own time base while writing the header.
        let stream_time_base = output
            .stream(stream_index)
            .map(|stream| stream.time_base())
            .ok_or_else(|| BalanceError::VideoWriteError("output stream disappeared".to_string()))?;

        let scaler = ScalingContext::get(
            Pixel::RGB24,
            options.width,
            options.height,
            target_pixel,
            options.width,
            options.height,
            ScalingFlags::BILINEAR,
        )
        .map_err(|e| BalanceError::VideoWriteError(format!("cannot create scaler: {e}")))?;

        Ok(Self {
            output,
            encoder: opened_encoder,
            scaler,
            stream_index,
            encoder_time_base,
            stream_time_base,
            options,
            next_pts: 0,
            finished: false,
        })
    }

    /// Number of frames accepted so far.
    pub fn frames_written(&self) -> u64 {
        self.next_pts as u64
    }

    /// Move every packet the encoder has ready into the container.
    fn write_pending_packets(&mut self) -> Result<(), BalanceError> {
        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.stream_index);
            packet.rescale_ts(self.encoder_time_base, self.stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(|e| BalanceError::VideoWriteError(format!("write packet failed: {e}")))?;
        }
        Ok(())
    }
}

impl FrameSink for VideoWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<(), BalanceError> {
        if frame.width() != self.options.width || frame.height() != self.options.height {
            return Err(BalanceError::FrameSizeMismatch {
                index: frame.index,
                expected_width: self.options.width,
                expected_height: self.options.height,
                actual_width: frame.width(),
                actual_height: frame.height(),
            });
        }

        let source_frame = crate::utilities::rgb_image_to_frame(&frame.image);
        let mut encoded_frame = VideoFrame::empty();
        self.scaler
            .run(&source_frame, &mut encoded_frame)
            .map_err(|e| BalanceError::VideoWriteError(format!("scaling failed: {e}")))?;

        encoded_frame.set_pts(Some(self.next_pts));
        self.next_pts += 1;

        self.encoder
            .send_frame(&encoded_frame)
            .map_err(|e| BalanceError::VideoEncodeError(format!("send_frame failed: {e}")))?;
        self.write_pending_packets()
    }

    fn finish(&mut self) -> Result<(), BalanceError> {
        if self.finished {
            return Ok(());
        }
        self.finished = true;

        self.encoder
            .send_eof()
            .map_err(|e| BalanceError::VideoEncodeError(format!("send_eof failed: {e}")))?;
        self.write_pending_packets()?;

        self.output
            .write_trailer()
            .map_err(|e| BalanceError::VideoWriteError(format!("cannot write trailer: {e}")))?;
        log::info!("Finished writing {} frame(s)", self.next_pts);
        Ok(())
    }
}
