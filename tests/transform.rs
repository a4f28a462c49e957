//! Gray-world transform correctness.

use graybalance::{
    BalanceError, BlackChannelPolicy, Channel, Frame, FrameTransform, GrayWorld, LookupTables,
    channel_means,
};
use image::{Rgb, RgbImage};
use rayon::ThreadPoolBuilder;

/// A frame with a horizontal gradient so rows and columns differ.
fn gradient_frame(index: u64, width: u32, height: u32) -> Frame {
    let image = RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (40 + (x * 7 + y) % 200) as u8,
            (60 + (x * 3 + y * 5) % 180) as u8,
            (30 + (x + y * 11) % 210) as u8,
        ])
    });
    Frame::new(index, image)
}

#[test]
fn uniform_frame_becomes_neutral() {
    // Stored as R, G, B = 120, 150, 100.
    let image = RgbImage::from_pixel(8, 6, Rgb([120, 150, 100]));
    let means = channel_means(&image);
    assert_eq!(means.red, 120.0);
    assert_eq!(means.green, 150.0);
    assert_eq!(means.blue, 100.0);

    let tables = LookupTables::from_means(&means).unwrap();
    assert_eq!(tables.map(Channel::Blue, 100), 150);
    assert_eq!(tables.map(Channel::Red, 120), 150);
    assert_eq!(tables.map(Channel::Green, 150), 150);

    let mut frame = Frame::new(0, image);
    GrayWorld::new().apply(&mut frame).unwrap();
    assert!(frame.image.pixels().all(|pixel| *pixel == Rgb([150, 150, 150])));
}

#[test]
fn green_table_is_identity() {
    let frame = gradient_frame(0, 17, 9);
    let tables = LookupTables::from_means(&channel_means(&frame.image)).unwrap();
    for value in 0..=255u8 {
        assert_eq!(tables.map(Channel::Green, value), value);
    }
}

#[test]
fn zero_maps_to_zero_and_large_values_clip() {
    // Red mean is a quarter of the green mean, so red is scaled by 4.
    let image = RgbImage::from_fn(2, 1, |x, _| {
        if x == 0 { Rgb([0, 100, 50]) } else { Rgb([50, 100, 50]) }
    });
    let means = channel_means(&image);
    assert_eq!(means.red, 25.0);
    let tables = LookupTables::from_means(&means).unwrap();

    for channel in Channel::ALL {
        assert_eq!(tables.map(channel, 0), 0);
    }
    assert_eq!(tables.map(Channel::Red, 10), 40);
    assert_eq!(tables.map(Channel::Red, 100), 255);
    assert_eq!(tables.map(Channel::Red, 255), 255);
    assert_eq!(tables.map(Channel::Blue, 50), 100);
}

#[test]
fn green_channel_of_frame_is_unchanged() {
    let mut frame = gradient_frame(3, 32, 16);
    let before: Vec<u8> = frame.image.pixels().map(|pixel| pixel[1]).collect();

    GrayWorld::new().apply(&mut frame).unwrap();

    let after: Vec<u8> = frame.image.pixels().map(|pixel| pixel[1]).collect();
    assert_eq!(before, after);
}

#[test]
fn zero_channel_mean_fails_by_default() {
    let mut frame = Frame::new(42, RgbImage::from_pixel(4, 4, Rgb([10, 20, 0])));
    let error = GrayWorld::new().apply(&mut frame).unwrap_err();
    assert!(matches!(
        error,
        BalanceError::ZeroChannelMean {
            frame: 42,
            channel: Channel::Blue
        }
    ));
}

#[test]
fn zero_channel_mean_passes_through_when_allowed() {
    let image = RgbImage::from_pixel(4, 4, Rgb([0, 20, 30]));
    let mut frame = Frame::new(0, image.clone());

    GrayWorld::with_policy(BlackChannelPolicy::PassThrough)
        .apply(&mut frame)
        .unwrap();
    assert_eq!(frame.image, image);
}

#[test]
fn empty_image_is_rejected() {
    let mut frame = Frame::new(7, RgbImage::new(0, 0));
    let error = GrayWorld::new().apply(&mut frame).unwrap_err();
    assert!(matches!(error, BalanceError::EmptyFrame(7)));
}

#[test]
fn row_split_matches_sequential() {
    let pool = ThreadPoolBuilder::new().num_threads(4).build().unwrap();
    let transform = GrayWorld::new();

    for (width, height) in [(1, 1), (3, 7), (64, 33), (127, 5)] {
        let mut sequential = gradient_frame(0, width, height);
        let mut split = sequential.clone();

        transform.apply(&mut sequential).unwrap();
        transform.apply_split(&mut split, &pool).unwrap();
        assert_eq!(sequential, split, "{width}x{height}");
    }
}

#[test]
fn row_split_reports_zero_mean() {
    let pool = ThreadPoolBuilder::new().num_threads(2).build().unwrap();
    let mut frame = Frame::new(5, RgbImage::from_pixel(4, 4, Rgb([0, 20, 30])));
    let error = GrayWorld::new().apply_split(&mut frame, &pool).unwrap_err();
    assert!(matches!(
        error,
        BalanceError::ZeroChannelMean {
            frame: 5,
            channel: Channel::Red
        }
    ));
}
