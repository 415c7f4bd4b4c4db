use std::sync::Arc;

use nalgebra::Isometry3;
use pair_match_core::{
    AuxImage, Calibration, CameraModel, ColorImage, DepthImage, Observation, ObservationBuilder,
};
use pair_match_registration::{
    Described, DescriptorMatcher, DetectorKind, EstimationMode, FeatureRegistration, Match,
    MatchingStrategy, Registration, RegistrationDriver, RegistrationError, RegistrationParams,
};

const W: usize = 160;
const H: usize = 120;

/// Random 6x6 blocks of gray, shifted right by `shift` pixels.
fn blocks(shift: usize) -> ColorImage {
    let mut data = Vec::with_capacity(W * H * 3);
    for y in 0..H {
        for x in 0..W {
            let (bx, by) = (((x + shift) / 6) as u32, (y / 6) as u32);
            let mut n = bx.wrapping_mul(0x9e37_79b1) ^ by.wrapping_mul(0x85eb_ca6b);
            n ^= n >> 15;
            n = n.wrapping_mul(0x2c1b_3c6d);
            n ^= n >> 12;
            let v = (n & 0xff) as u8;
            data.extend_from_slice(&[v, v, v]);
        }
    }
    ColorImage {
        width: W,
        height: H,
        data,
    }
}

/// Stepped depth so the back-projected points are far from coplanar.
fn stepped_depth() -> AuxImage {
    let mm: Vec<u16> = (0..H)
        .flat_map(|y| (0..W).map(move |x| 1000 + 400 * (((x / 20 + y / 15) % 3) as u16)))
        .collect();
    AuxImage::Depth(DepthImage::from_millimeters(W, H, &mm))
}

fn camera() -> CameraModel {
    CameraModel::new(120.0, 120.0, 80.0, 60.0).with_image_size(W as u32, H as u32)
}

fn same_view_pair(with_depth: bool) -> (Observation, Observation) {
    let builder = ObservationBuilder::new(Calibration::Mono(camera()));
    let aux = || with_depth.then(stepped_depth);
    builder.build_pair((blocks(0), aux()), (blocks(0), aux()))
}

fn params(estimation: EstimationMode, matching: MatchingStrategy) -> RegistrationParams {
    RegistrationParams {
        estimation,
        matching,
        min_inliers: 10,
        ..RegistrationParams::default()
    }
}

fn assert_near_identity(t: &Isometry3<f64>) {
    assert!(t.translation.vector.norm() < 1e-3, "translation {:?}", t.translation);
    assert!(t.rotation.angle() < 1e-3, "rotation {}", t.rotation.angle());
}

#[test]
fn identical_rgbd_views_register_to_identity() {
    let (from, to) = same_view_pair(true);
    for mode in [EstimationMode::ThreeDToThreeD, EstimationMode::ThreeDToTwoD] {
        let reg = FeatureRegistration::new(params(mode, MatchingStrategy::BruteForce));
        let out = reg
            .compute_transform(&from, &to, &Isometry3::identity())
            .unwrap();
        let t = out.transform.as_ref().unwrap_or_else(|| panic!("{mode}: {:?}", out.info.rejected));
        assert_near_identity(t);
        assert!(out.info.inliers >= 10);
        assert_eq!(out.info.inlier_ids.len(), out.info.inliers);
    }
}

#[test]
fn matched_features_share_sequential_ids() {
    let (from, to) = same_view_pair(true);
    let reg = FeatureRegistration::new(params(EstimationMode::ThreeDToTwoD, MatchingStrategy::KdTree));
    let out = reg
        .compute_transform(&from, &to, &Isometry3::identity())
        .unwrap();
    let n = out.info.matches as i32;
    assert!(n > 0);
    for id in 1..=n {
        assert_eq!(out.features_from.count(id), 1);
        assert_eq!(out.features_to.count(id), 1);
        let a = out.features_from.unique(id).unwrap();
        let b = out.features_to.unique(id).unwrap();
        assert_eq!(a.position, b.position);
    }
    assert!(out.features_from.ids().all(|id| id == -1 || (1..=n).contains(&id)));
    assert_eq!(out.info.nn_ratio, Some(0.8));
}

#[test]
fn kdtree_and_brute_force_find_same_matches() {
    let (from, to) = same_view_pair(true);
    let run = |m| {
        FeatureRegistration::new(params(EstimationMode::ThreeDToTwoD, m))
            .compute_transform(&from, &to, &Isometry3::identity())
            .unwrap()
    };
    let bf = run(MatchingStrategy::BruteForce);
    let kd = run(MatchingStrategy::KdTree);
    assert_eq!(bf.info.matches, kd.info.matches);
    assert_eq!(bf.features_from, kd.features_from);
}

#[test]
fn mono_pair_falls_back_to_two_d_to_two_d() {
    let builder = ObservationBuilder::new(Calibration::Mono(camera()));
    let (from, to) = builder.build_pair((blocks(0), None), (blocks(4), None));
    let driver = RegistrationDriver::new(params(EstimationMode::ThreeDToTwoD, MatchingStrategy::CrossCheck));
    let estimate = driver
        .estimate_features(&from, &to, &Isometry3::identity())
        .unwrap();
    assert_eq!(estimate.params.estimation, EstimationMode::TwoDToTwoD);
    assert_eq!(estimate.output.info.estimation, EstimationMode::TwoDToTwoD);
    assert!(estimate.output.info.matches >= 10);
    assert!(estimate.output.info.nn_ratio.is_none());
}

#[test]
fn identical_mono_views_register_without_parallax() {
    let builder = ObservationBuilder::new(Calibration::Mono(camera()));
    let (from, to) = builder.build_pair((blocks(0), None), (blocks(0), None));
    let estimate = RegistrationDriver::new(params(EstimationMode::ThreeDToThreeD, MatchingStrategy::KdTree))
        .estimate_features(&from, &to, &Isometry3::identity())
        .unwrap();
    let info = &estimate.output.info;
    assert_eq!(info.estimation, EstimationMode::TwoDToTwoD);
    assert_near_identity(estimate.transform().expect("registered"));
    assert_eq!(info.inliers, info.matches);
}

#[test]
fn chess_detector_registers_identical_views() {
    let (from, to) = same_view_pair(true);
    let reg = FeatureRegistration::new(RegistrationParams {
        detector: DetectorKind::Chess,
        ..params(EstimationMode::ThreeDToTwoD, MatchingStrategy::BruteForce)
    });
    let out = reg
        .compute_transform(&from, &to, &Isometry3::identity())
        .unwrap();
    assert_eq!(out.info.detector, DetectorKind::Chess);
    assert!(!out.features_from.is_empty());
    assert!(out.info.matches >= 10, "{} matches", out.info.matches);
    assert_near_identity(out.transform.as_ref().expect("registered"));
}

#[test]
fn learned_matching_needs_a_matcher() {
    let (from, to) = same_view_pair(true);
    let reg = FeatureRegistration::new(params(EstimationMode::ThreeDToTwoD, MatchingStrategy::Learned));
    let err = reg
        .compute_transform(&from, &to, &Isometry3::identity())
        .unwrap_err();
    assert!(matches!(err, RegistrationError::MatcherUnavailable(MatchingStrategy::Learned)));
}

struct SamePosition;

impl DescriptorMatcher for SamePosition {
    fn name(&self) -> &str {
        "SamePosition"
    }

    fn match_descriptors(&self, from: &[Described], to: &[Described]) -> Vec<Match> {
        from.iter()
            .enumerate()
            .filter_map(|(i, a)| {
                to.iter()
                    .position(|b| b.keypoint.position == a.keypoint.position)
                    .map(|j| Match {
                        from_idx: i,
                        to_idx: j,
                        distance: 0.0,
                    })
            })
            .collect()
    }
}

#[test]
fn learned_matcher_plugs_in() {
    let (from, to) = same_view_pair(true);
    let reg = FeatureRegistration::new(params(EstimationMode::ThreeDToTwoD, MatchingStrategy::Learned))
        .with_matcher(Arc::new(SamePosition));
    let out = reg
        .compute_transform(&from, &to, &Isometry3::identity())
        .unwrap();
    assert_eq!(out.info.matcher_name, "SamePosition");
    assert_near_identity(out.transform.as_ref().expect("registered"));
}

#[test]
fn too_few_inliers_yield_no_transform() {
    let (from, to) = same_view_pair(true);
    let mut p = params(EstimationMode::ThreeDToTwoD, MatchingStrategy::BruteForce);
    p.min_inliers = 100_000;
    let out = FeatureRegistration::new(p)
        .compute_transform(&from, &to, &Isometry3::translation(0.0, 0.0, 0.0))
        .unwrap();
    assert!(out.transform.is_none());
    assert!(out.info.inliers > 0);
    assert!(out.info.rejected.as_deref().unwrap_or("").contains("not enough inliers"));
}

#[test]
fn empty_image_is_an_error() {
    let builder = ObservationBuilder::new(Calibration::Mono(camera()));
    let empty = ColorImage {
        width: 0,
        height: 0,
        data: Vec::new(),
    };
    let (from, to) = builder.build_pair((empty, None), (blocks(0), None));
    let err = FeatureRegistration::new(RegistrationParams::default())
        .compute_transform(&from, &to, &Isometry3::identity())
        .unwrap_err();
    assert!(matches!(err, RegistrationError::EmptyImage { id: 1 }));
}
