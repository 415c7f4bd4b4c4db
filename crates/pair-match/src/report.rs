//! Text and JSON summaries of a registration run.
//!
//! Everything here is pure formatting.

use std::path::{Path, PathBuf};
use std::time::Duration;

use nalgebra::Isometry3;
use pair_match_core::{CalibrationKind, FeatureMap, ResolvedCalibration};
use pair_match_registration::params::{
    KEY_EPIPOLAR_GEOMETRY_VAR, KEY_ESTIMATION_TYPE, KEY_FEATURE_TYPE, KEY_MIN_INLIERS,
    KEY_NN_RATIO, KEY_NN_TYPE, KEY_PNP_REPROJ_ERROR,
};
use pair_match_registration::RegistrationInfo;
use serde::{Deserialize, Serialize};

fn quoted(path: Option<&Path>) -> String {
    format!("\"{}\"", path.map(|p| p.display().to_string()).unwrap_or_default())
}

/// Echo of the input options, printed before anything is loaded.
pub fn options_echo(calibration: Option<&Path>, from_depth: Option<&Path>, to_depth: Option<&Path>) -> String {
    format!(
        "Options\n  --calibration = {}\n  --from-depth  = {}\n  --to-depth    = {}\n",
        quoted(calibration),
        quoted(from_depth),
        quoted(to_depth)
    )
}

/// Which calibration model is active.
pub fn calibration_message(resolved: &ResolvedCalibration) -> String {
    match resolved.kind {
        CalibrationKind::Mono => "Mono calibration model detected.".to_string(),
        CalibrationKind::Stereo => "Stereo calibration model detected.".to_string(),
        CalibrationKind::Fake => {
            let cam = resolved.calibration.camera();
            let (w, h) = cam.image_size.unwrap_or_default();
            format!(
                "Using fake calibration model (image size={w}x{h}): fx={} fy={} cx={} cy={}",
                cam.fx, cam.fy, cam.cx, cam.cy
            )
        }
    }
}

/// Notice printed when the "from" view has no depth.
pub fn two_d_fallback_message() -> String {
    format!(
        "Calibration not set, setting {KEY_EPIPOLAR_GEOMETRY_VAR}=1 and {KEY_ESTIMATION_TYPE}=2 by default (2D->2D estimation)"
    )
}

pub fn timing_line(elapsed: Duration) -> String {
    format!("Time matching and motion estimation: {:.6}s", elapsed.as_secs_f64())
}

/// Folds `-0.0` into `0.0` so printed values never read "-0.000000".
fn unsigned_zero(v: f64) -> f64 {
    v + 0.0
}

/// `xyz=x,y,z rpy=roll,pitch,yaw`, or `null` without a transform.
pub fn pretty_transform(transform: Option<&Isometry3<f64>>) -> String {
    match transform {
        None => "null".to_string(),
        Some(t) => {
            let v = t.translation.vector;
            let (roll, pitch, yaw) = t.rotation.euler_angles();
            let [x, y, z, roll, pitch, yaw] = [v.x, v.y, v.z, roll, pitch, yaw].map(unsigned_zero);
            format!("xyz={x:.6},{y:.6},{z:.6} rpy={roll:.6},{pitch:.6},{yaw:.6}")
        }
    }
}

/// One-line summary of counts, timing and the options that produced them.
pub fn window_title(info: &RegistrationInfo, elapsed: Duration) -> String {
    let ratio = info
        .nn_ratio
        .map(|r| format!(" {KEY_NN_RATIO}={r}"))
        .unwrap_or_default();
    format!(
        "Matches ({}/{}) {:.4} sec [{KEY_FEATURE_TYPE}={} ({}) {KEY_NN_TYPE}={} ({}){ratio} {KEY_ESTIMATION_TYPE}={} ({}) {KEY_PNP_REPROJ_ERROR}={}]",
        info.inliers,
        info.matches,
        elapsed.as_secs_f64(),
        info.detector.id(),
        info.detector.name(),
        info.matching.id(),
        info.matcher_name,
        info.estimation.id(),
        info.estimation.name(),
        info.pnp_reproj_error,
    )
}

/// Transform, feature, match and inlier lines.
pub fn console_report(
    transform: Option<&Isometry3<f64>>,
    features_from: &FeatureMap,
    features_to: &FeatureMap,
    info: &RegistrationInfo,
) -> String {
    format!(
        "Transform: {}\nFeatures: from={} to={}\nMatches: {}\nInliers: {} ({KEY_MIN_INLIERS}={})\n",
        pretty_transform(transform),
        features_from.len(),
        features_to.len(),
        info.matches,
        info.inliers,
        info.min_inliers
    )
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TransformReport {
    pub xyz: [f64; 3],
    pub rpy: [f64; 3],
    /// Row-major 4x4 homogeneous matrix.
    pub matrix: [[f64; 4]; 4],
}

impl From<&Isometry3<f64>> for TransformReport {
    fn from(t: &Isometry3<f64>) -> Self {
        let v = t.translation.vector;
        let (roll, pitch, yaw) = t.rotation.euler_angles();
        let m = t.to_homogeneous();
        Self {
            xyz: [v.x, v.y, v.z],
            rpy: [roll, pitch, yaw],
            matrix: std::array::from_fn(|r| std::array::from_fn(|c| m[(r, c)])),
        }
    }
}

/// Machine-readable report of a run.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchReport {
    pub from: PathBuf,
    pub to: PathBuf,
    pub calibration: String,
    pub title: String,
    pub elapsed_secs: f64,
    pub transform: Option<TransformReport>,
    pub features_from: usize,
    pub features_to: usize,
    pub info: RegistrationInfo,
    /// Files written by the run.
    pub outputs: Vec<PathBuf>,
}
