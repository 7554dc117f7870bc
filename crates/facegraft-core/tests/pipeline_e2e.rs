//! End-to-end swaps over synthetic photos using the cascade locator.

use facegraft_core::annotator::Annotator;
use facegraft_core::compositor::composite;
use facegraft_core::{
    CascadeLocator, Face, FaceNormalizer, Mask, NormalizerKind, Region, Role, SwapConfig, SwapError, SwapFailure,
    SwapPipeline, SwapState,
};
use image::{Rgb, RgbImage};
use std::sync::Arc;

const BACKGROUND: Rgb<u8> = Rgb([40, 40, 60]);

fn blank(width: u32, height: u32) -> RgbImage {
    RgbImage::from_pixel(width, height, BACKGROUND)
}

fn rect(img: &mut RgbImage, x0: u32, y0: u32, x1: u32, y1: u32, color: Rgb<u8>) {
    for y in y0..y1 {
        for x in x0..x1 {
            img.put_pixel(x, y, color);
        }
    }
}

/// A skin-coloured square with two dark eyes and a dark mouth.
fn with_face(mut img: RgbImage, x: u32, y: u32, side: u32) -> RgbImage {
    let at = |f: f32| (f * side as f32).round() as u32;
    rect(&mut img, x, y, x + side, y + side, Rgb([210, 170, 150]));
    rect(&mut img, x + at(0.15), y + at(0.22), x + at(0.40), y + at(0.46), Rgb([30, 30, 30]));
    rect(&mut img, x + at(0.60), y + at(0.22), x + at(0.85), y + at(0.46), Rgb([30, 30, 30]));
    rect(&mut img, x + at(0.34), y + at(0.68), x + at(0.66), y + at(0.86), Rgb([120, 40, 50]));
    img
}

fn pipeline(config: &SwapConfig) -> SwapPipeline {
    let locator = Arc::new(CascadeLocator::new(config.locator.clone()));
    SwapPipeline::new(locator, config).unwrap()
}

#[test]
fn test_two_faces_of_different_sizes_succeed() {
    let config = SwapConfig::default();
    let recipient = with_face(blank(240, 180), 120, 60, 72);
    let donor = with_face(blank(200, 200), 50, 40, 100);

    let out = pipeline(&config).run(&recipient, &donor).unwrap();
    assert_eq!(out.image.dimensions(), recipient.dimensions());

    let region = out.recipient_face.region;
    assert!(region.fits_within(240, 180));
    assert_ne!(region.dimensions(), out.donor_face.region.dimensions());

    let caption = Annotator::new(&config.annotation).bounds().unwrap();
    let mut replaced = 0;
    for (x, y, px) in out.image.enumerate_pixels() {
        if region.contains_point(x, y) {
            if px != recipient.get_pixel(x, y) {
                replaced += 1;
            }
        } else if !caption.contains_point(x, y) {
            assert_eq!(px, recipient.get_pixel(x, y), "pixel ({x},{y}) outside the face changed");
        }
    }
    assert!(replaced > 0, "no donor pixels were blended in");
}

#[test]
fn test_recipient_without_face() {
    let recipient = blank(240, 180);
    let donor = with_face(blank(200, 200), 50, 40, 100);
    let err = pipeline(&SwapConfig::default()).run(&recipient, &donor).unwrap_err();
    assert_eq!(err, SwapFailure::NoFaceDetected { missing: Role::Recipient });
    assert_eq!(err.state(), SwapState::NoFaceDetected);
}

#[test]
fn test_donor_without_face() {
    let recipient = with_face(blank(240, 180), 120, 60, 72);
    let donor = blank(200, 200);
    let err = pipeline(&SwapConfig::default()).run(&recipient, &donor).unwrap_err();
    assert_eq!(err, SwapFailure::NoFaceDetected { missing: Role::Donor });
}

/// Skips resizing and hands the raw donor crop to the compositor.
struct CropOnly;

impl FaceNormalizer for CropOnly {
    fn normalize(&self, donor: &RgbImage, donor_face: &Face, _recipient_face: &Face) -> Result<RgbImage, SwapError> {
        let r = donor_face.region;
        Ok(image::imageops::crop_imm(donor, r.x, r.y, r.width, r.height).to_image())
    }

    fn name(&self) -> &'static str {
        "crop-only"
    }
}

#[test]
fn test_bypassing_the_normalizer_is_a_dimension_error() {
    let recipient = with_face(blank(240, 180), 120, 60, 72);
    let donor = with_face(blank(200, 200), 50, 40, 100);
    let err = pipeline(&SwapConfig::default())
        .with_normalizer(Box::new(CropOnly))
        .run(&recipient, &donor)
        .unwrap_err();
    assert_eq!(err.state(), SwapState::DimensionError);
    assert!(!err.is_user_correctable());
}

#[test]
fn test_compositor_rejects_mask_of_donor_size() {
    let recipient = blank(100, 100);
    let region = Region::new(10, 10, 40, 30);
    let donor = RgbImage::new(40, 30);
    let err = composite(&recipient, region, &donor, &Mask::filled(50, 50, 1.0)).unwrap_err();
    assert!(matches!(err, SwapError::DimensionMismatch { what: "mask", .. }));
}

#[test]
fn test_landmark_normalizer_without_landmarks_matches_rect() {
    let config = SwapConfig::default();
    let recipient = with_face(blank(240, 180), 120, 60, 72);
    let donor = with_face(blank(200, 200), 50, 40, 100);

    let resized = pipeline(&config).run(&recipient, &donor).unwrap();
    let warped = pipeline(&config)
        .with_normalizer(NormalizerKind::Landmark.build())
        .run(&recipient, &donor)
        .unwrap();
    assert_eq!(resized.image, warped.image);
}

#[test]
fn test_concurrent_runs_are_independent() {
    let config = SwapConfig::default();
    let shared = Arc::new(pipeline(&config));
    let recipient = Arc::new(with_face(blank(240, 180), 120, 60, 72));
    let donor = Arc::new(with_face(blank(200, 200), 50, 40, 100));

    let expected = shared.run(&recipient, &donor).unwrap().image;
    let handles: Vec<_> = (0..4)
        .map(|_| {
            let (p, r, d) = (shared.clone(), recipient.clone(), donor.clone());
            std::thread::spawn(move || p.run(&r, &d).map(|out| out.image))
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap().unwrap(), expected);
    }
}
