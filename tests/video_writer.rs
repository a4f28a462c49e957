//! FFmpeg writer and reader integration tests.
//!
//! These write small AVI files into a temporary directory. Tests skip when
//! the FFmpeg build lacks the required encoder.

use graybalance::{
    BalanceError, Frame, FrameReader, FrameSink, FrameSource, PartitionStrategy, Pipeline,
    PipelineOptions, VideoCodec, VideoInput, VideoWriter, VideoWriterOptions,
};
use image::{Rgb, RgbImage};

const WIDTH: u32 = 64;
const HEIGHT: u32 = 48;

fn encoder_unavailable(error: &BalanceError) -> bool {
    if let BalanceError::VideoEncodeError(message) = error {
        eprintln!("Skipping: encoder not available ({message})");
        return true;
    }
    false
}

/// A tinted gradient so every channel has a non-zero mean.
fn tinted_frame(index: u64) -> Frame {
    let image = RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        Rgb([
            (60 + x + index as u32) as u8,
            (90 + y) as u8,
            (30 + (x + y) / 2) as u8,
        ])
    });
    Frame::new(index, image)
}

/// Write `count` frames to `path`, or `None` if the encoder is missing.
fn write_fixture(path: &std::path::Path, count: u64) -> Option<()> {
    let options = VideoWriterOptions::new(WIDTH, HEIGHT, 25.0).codec(VideoCodec::Huffyuv);
    let mut writer = match VideoWriter::create(path, options) {
        Ok(writer) => writer,
        Err(error) if encoder_unavailable(&error) => return None,
        Err(error) => panic!("create writer: {error}"),
    };
    for index in 0..count {
        writer.write_frame(&tinted_frame(index)).expect("write frame");
    }
    writer.finish().expect("finish");
    assert_eq!(writer.frames_written(), count);
    Some(())
}

fn count_frames(input: &VideoInput) -> u64 {
    let mut reader = input.open_reader().expect("open reader");
    let mut frames = 0;
    while let Some(image) = reader.read_frame().expect("read frame") {
        assert_eq!(image.dimensions(), (WIDTH, HEIGHT));
        frames += 1;
    }
    frames
}

#[test]
fn writer_output_can_be_read_back() {
    let directory = tempfile::tempdir().expect("temp dir");
    let path = directory.path().join("fixture.avi");
    if write_fixture(&path, 6).is_none() {
        return;
    }

    let input = VideoInput::open(&path).expect("open fixture");
    let info = input.info();
    assert_eq!((info.width, info.height), (WIDTH, HEIGHT));
    assert!((info.frames_per_second - 25.0).abs() < 0.01);
    assert_eq!(count_frames(&input), 6);
}

#[test]
fn balance_video_file_with_each_strategy() {
    let directory = tempfile::tempdir().expect("temp dir");
    let input_path = directory.path().join("input.avi");
    if write_fixture(&input_path, 7).is_none() {
        return;
    }
    let input = VideoInput::open(&input_path).expect("open input");

    for strategy in [
        PartitionStrategy::Block,
        PartitionStrategy::Stride,
        PartitionStrategy::RowSplit,
    ] {
        let output_path = directory.path().join(format!("output-{strategy}.avi"));
        let writer = VideoWriter::create(&output_path, VideoWriterOptions::from_stream(input.info()))
            .expect("create writer");

        let options = PipelineOptions::new()
            .with_threads(3)
            .with_window_size(4)
            .with_strategy(strategy);
        let metrics = Pipeline::new(options)
            .unwrap()
            .run(&input, writer)
            .expect("run pipeline");
        assert_eq!(metrics.frames, 7, "{strategy}");

        let output = VideoInput::open(&output_path).expect("open output");
        assert_eq!(count_frames(&output), 7, "{strategy}");
    }
}

#[test]
fn seek_lands_on_requested_frame() {
    let directory = tempfile::tempdir().expect("temp dir");
    let path = directory.path().join("seek.avi");
    if write_fixture(&path, 10).is_none() {
        return;
    }
    let input = VideoInput::open(&path).expect("open fixture");

    let mut sequential = input.open_reader().expect("open reader");
    let mut expected = None;
    for _ in 0..=6 {
        expected = sequential.read_frame().expect("read frame");
    }

    let mut reader = input.open_reader().expect("open reader");
    reader.seek_frame(6).expect("seek");
    let sought = reader.read_frame().expect("read frame");
    assert!(sought.is_some());
    assert_eq!(sought, expected);
}

#[test]
fn seek_past_the_end_reads_nothing() {
    let directory = tempfile::tempdir().expect("temp dir");
    let path = directory.path().join("short.avi");
    if write_fixture(&path, 4).is_none() {
        return;
    }
    let input = VideoInput::open(&path).expect("open fixture");

    let mut reader = input.open_reader().expect("open reader");
    reader.seek_frame(20).expect("seek");
    assert_eq!(reader.read_frame().expect("read frame"), None);
}

#[test]
fn lossy_codec_honours_bitrate() {
    let directory = tempfile::tempdir().expect("temp dir");
    let path = directory.path().join("lossy.avi");
    let options = VideoWriterOptions::new(WIDTH, HEIGHT, 25.0)
        .codec(VideoCodec::Mpeg4)
        .bitrate(400_000);
    assert_eq!(options.bitrate, Some(400_000));

    let mut writer = match VideoWriter::create(&path, options) {
        Ok(writer) => writer,
        Err(error) if encoder_unavailable(&error) => return,
        Err(error) => panic!("create writer: {error}"),
    };
    for index in 0..5 {
        writer.write_frame(&tinted_frame(index)).expect("write frame");
    }
    writer.finish().expect("finish");
    assert_eq!(writer.frames_written(), 5);

    let input = VideoInput::open(&path).expect("open output");
    assert_eq!(count_frames(&input), 5);
}

#[test]
fn mismatched_frame_size_is_rejected() {
    let directory = tempfile::tempdir().expect("temp dir");
    let path = directory.path().join("mismatch.avi");
    let options = VideoWriterOptions::new(WIDTH, HEIGHT, 25.0);
    let mut writer = match VideoWriter::create(&path, options) {
        Ok(writer) => writer,
        Err(error) if encoder_unavailable(&error) => return,
        Err(error) => panic!("create writer: {error}"),
    };

    let frame = Frame::new(0, RgbImage::new(WIDTH / 2, HEIGHT));
    let error = writer.write_frame(&frame).unwrap_err();
    assert!(matches!(
        error,
        BalanceError::FrameSizeMismatch {
            index: 0,
            actual_width: 32,
            ..
        }
    ));
}

#[test]
fn open_missing_file_fails() {
    let error = VideoInput::open("tests/fixtures/does_not_exist.mp4").unwrap_err();
    assert!(
        error.to_string().contains("Failed to open media file"),
        "{error}"
    );
}
