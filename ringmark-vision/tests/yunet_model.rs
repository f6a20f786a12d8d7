use anyhow::Result;
use image::{DynamicImage, Rgb, RgbImage};
use ringmark_vision::{Detector, FaceLocator, YuNetDetector, YuNetOptions};
use std::path::Path;

const MODEL: &str = "models/face_detection_yunet_2023mar.onnx";

/// Runs only when the model has been downloaded next to the crate.
#[test]
fn test_yunet_on_flat_image_finds_nothing() -> Result<()> {
    env_logger::try_init().ok();
    if !Path::new(MODEL).exists() {
        eprintln!("Skipping: {} not found", MODEL);
        return Ok(());
    }

    let mut detector = YuNetDetector::load(Path::new(MODEL), YuNetOptions::default())?;
    assert_eq!(detector.options(), &YuNetOptions::default());
    let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(320, 480, Rgb([128, 128, 128])));
    let found = detector.detect(&img)?;
    println!("flat image: {} candidate(s)", found.len());
    assert!(found.iter().all(|c| c.score >= 0.6));

    let mut locator = FaceLocator::new(vec![Box::new(detector)]);
    let located = locator.locate(&img);
    assert!(located.anchor.x <= 320 && located.anchor.y <= 480);
    Ok(())
}

#[test]
fn test_missing_model_fails_to_load() {
    let err = YuNetDetector::load(Path::new("models/does-not-exist.onnx"), YuNetOptions::default());
    assert!(err.is_err());
}

#[test]
fn test_rejects_unaligned_input_size() {
    let opts = YuNetOptions {
        input_size: 300,
        ..YuNetOptions::default()
    };
    assert!(YuNetDetector::load(Path::new(MODEL), opts).is_err());
}
