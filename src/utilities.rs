//! Internal helpers shared by the FFmpeg reader and writer.

use ffmpeg_next::{Rational, format::Pixel, frame::Video as VideoFrame};
use image::RgbImage;

/// Copy an RGB24 FFmpeg frame into a tightly packed buffer.
///
/// FFmpeg frames frequently carry per-row padding (stride > width × 3).
pub(crate) fn frame_to_rgb_buffer(video_frame: &VideoFrame, width: u32, height: u32) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let row_len = (width as usize) * 3;
    let data = video_frame.data(0);

    if stride == row_len {
        data[..row_len * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(row_len * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + row_len]);
        }
        buffer
    }
}

/// Copy a packed RGB image into a freshly allocated RGB24 FFmpeg frame,
/// honouring the frame's row stride.
pub(crate) fn rgb_image_to_frame(image: &RgbImage) -> VideoFrame {
    let (width, height) = image.dimensions();
    let mut frame = VideoFrame::new(Pixel::RGB24, width, height);
    let stride = frame.stride(0);
    let row_len = (width as usize) * 3;
    let source = image.as_raw();
    let target = frame.data_mut(0);

    for (row, pixels) in source.chunks_exact(row_len).enumerate() {
        let start = row * stride;
        target[start..start + row_len].copy_from_slice(pixels);
    }
    frame
}

/// Timestamp in `AV_TIME_BASE` units (microseconds) for a container-level
/// seek to `frame_number`.
pub(crate) fn frame_number_to_seek_timestamp(frame_number: u64, frames_per_second: f64) -> i64 {
    if frames_per_second <= 0.0 {
        return 0;
    }
    (frame_number as f64 / frames_per_second * 1_000_000.0) as i64
}

/// Rescale a stream timestamp to a frame number.
pub(crate) fn timestamp_to_frame_number(
    timestamp: i64,
    start_time: i64,
    time_base: Rational,
    frames_per_second: f64,
) -> u64 {
    let ticks = (timestamp - start_time).max(0) as f64;
    let seconds = ticks * f64::from(time_base.numerator()) / f64::from(time_base.denominator());
    (seconds * frames_per_second).round() as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_timestamp_is_in_microseconds() {
        assert_eq!(frame_number_to_seek_timestamp(25, 25.0), 1_000_000);
        assert_eq!(frame_number_to_seek_timestamp(10, 0.0), 0);
    }

    #[test]
    fn timestamps_round_to_nearest_frame() {
        let time_base = Rational::new(1, 90_000);
        assert_eq!(timestamp_to_frame_number(3_003, 0, time_base, 29.97), 1);
        assert_eq!(timestamp_to_frame_number(9_000, 3_000, time_base, 30.0), 2);
        assert_eq!(timestamp_to_frame_number(0, 3_000, time_base, 30.0), 0);
    }
}
