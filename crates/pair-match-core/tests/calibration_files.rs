use std::fs;

use pair_match_core::{
    AuxFormat, AuxImage, CalibrationError, CalibrationKind, CalibrationResolver, CameraModel,
    ColorImage, DepthImage, GrayImage, ObservationBuilder, StereoCameraModel,
};
use tempfile::tempdir;

fn camera() -> CameraModel {
    CameraModel::new(525.0, 525.0, 319.5, 239.5).with_image_size(640, 480)
}

fn color(w: usize, h: usize) -> ColorImage {
    ColorImage {
        width: w,
        height: h,
        data: vec![90; w * h * 3],
    }
}

#[test]
fn gray8_right_images_resolve_to_stereo_observations() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("stereo.json");
    let stereo = StereoCameraModel {
        left: camera(),
        right: camera(),
        baseline: 0.075,
    };
    fs::write(&path, serde_json::to_string_pretty(&stereo).unwrap()).unwrap();

    let right = AuxImage::Right(GrayImage::new(640, 480));
    let resolved = CalibrationResolver::default()
        .resolve(
            Some(&path),
            Some(right.format()),
            Some(right.format()),
            (640, 480),
        )
        .expect("stereo calibration");
    assert_eq!(resolved.kind, CalibrationKind::Stereo);

    let builder = ObservationBuilder::new(resolved.calibration);
    let (from, to) = builder.build_pair(
        (color(640, 480), Some(right.clone())),
        (color(640, 480), Some(right)),
    );
    assert!(from.is_stereo());
    assert!(to.is_stereo());
}

#[test]
fn sixteen_bit_depth_resolves_to_mono() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mono.json");
    fs::write(&path, serde_json::to_string(&camera()).unwrap()).unwrap();

    let depth = AuxImage::Depth(DepthImage::from_millimeters(640, 480, &vec![1000; 640 * 480]));
    assert_eq!(depth.format(), AuxFormat::Depth);
    let resolved = CalibrationResolver::default()
        .resolve(Some(&path), Some(depth.format()), None, (640, 480))
        .expect("mono calibration");
    assert_eq!(resolved.kind, CalibrationKind::Mono);
    assert_eq!(*resolved.calibration.camera(), camera());
}

#[test]
fn unreadable_calibration_reports_path() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    let err = CalibrationResolver::default()
        .resolve(Some(&path), None, None, (640, 480))
        .unwrap_err();
    assert!(matches!(err, CalibrationError::Load { .. }));
    assert!(!err.is_configuration());
    assert!(err.to_string().contains("broken.json"));
}

#[test]
fn mono_file_is_rejected_for_stereo_input() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("mono.json");
    fs::write(&path, serde_json::to_string(&camera()).unwrap()).unwrap();

    let err = CalibrationResolver::default()
        .resolve(Some(&path), Some(AuxFormat::Gray8), None, (640, 480))
        .unwrap_err();
    assert!(matches!(err, CalibrationError::Load { .. }));
}
