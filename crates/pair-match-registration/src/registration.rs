//! The registration capability and its feature-based implementation.

use std::sync::Arc;

use nalgebra::{Isometry3, Point2, Translation3, UnitQuaternion};
use pair_match_core::{Feature, FeatureMap, Observation};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::descriptor::{BriefExtractor, Described};
use crate::epipolar::{recover_pose, EssentialEstimator, PointMatch, RotationEstimator};
use crate::error::RegistrationError;
use crate::features::detect_keypoints;
use crate::info::{RegistrationInfo, RegistrationOutput};
use crate::matcher::{match_with, DescriptorMatcher, Match};
use crate::params::{EstimationMode, MatchingStrategy, RegistrationParams};
use crate::pnp::{PnpEstimator, PointPixel};
use crate::ransac::{ransac, RansacOptions};
use crate::rigid::{PointPair, RigidEstimator};

/// Estimates the pose of `to` expressed in the frame of `from`.
///
/// A failed registration is a successful call with `transform == None`;
/// errors are reserved for unusable inputs or configuration.
pub trait Registration {
    fn compute_transform(
        &self,
        from: &Observation,
        to: &Observation,
        guess: &Isometry3<f64>,
    ) -> Result<RegistrationOutput, RegistrationError>;
}

const RANSAC_SEED: u64 = 0x00c0_ffee;

/// Detect, describe, match, then estimate with RANSAC.
#[derive(Clone)]
pub struct FeatureRegistration {
    params: RegistrationParams,
    matcher: Option<Arc<dyn DescriptorMatcher>>,
}

impl std::fmt::Debug for FeatureRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureRegistration")
            .field("params", &self.params)
            .field("matcher", &self.matcher.as_ref().map(|m| m.name().to_string()))
            .finish()
    }
}

impl FeatureRegistration {
    pub fn new(params: RegistrationParams) -> Self {
        Self {
            params,
            matcher: None,
        }
    }

    /// Supply the matcher used by [`MatchingStrategy::Learned`].
    pub fn with_matcher(mut self, matcher: Arc<dyn DescriptorMatcher>) -> Self {
        self.matcher = Some(matcher);
        self
    }

    pub fn params(&self) -> &RegistrationParams {
        &self.params
    }

    fn correspondences(&self, from: &[Described], to: &[Described]) -> Result<Vec<Match>, RegistrationError> {
        let strategy = self.params.matching;
        if let Some(matches) = match_with(strategy, from, to, self.params.nn_ratio) {
            return Ok(matches);
        }
        let matcher = self
            .matcher
            .as_ref()
            .ok_or(RegistrationError::MatcherUnavailable(strategy))?;
        let matches = matcher.match_descriptors(from, to);
        if let Some(bad) = matches
            .iter()
            .find(|m| m.from_idx >= from.len() || m.to_idx >= to.len())
        {
            return Err(RegistrationError::Backend(format!(
                "{} returned out-of-range correspondence {} -> {}",
                matcher.name(),
                bad.from_idx,
                bad.to_idx
            )));
        }
        Ok(matches)
    }

    fn ransac_options(&self, thresh: f64) -> RansacOptions {
        RansacOptions {
            max_iters: self.params.iterations,
            thresh,
            min_inliers: 0,
            seed: RANSAC_SEED,
            ..RansacOptions::default()
        }
    }

    /// Returns the transform (pose of `to` in `from`) and the indices of the
    /// inlier matches, or the reason nothing could be estimated.
    fn estimate(
        &self,
        from: &Observation,
        to: &Observation,
        from_kp: &[Described],
        to_kp: &[Described],
        matches: &[Match],
        guess: &Isometry3<f64>,
    ) -> Result<(Isometry3<f64>, Vec<usize>), String> {
        let pixel = |d: &Described| d.keypoint.position;
        match self.params.estimation {
            EstimationMode::ThreeDToThreeD => {
                if !from.has_aux() || !to.has_aux() {
                    return Err("3D->3D estimation requires depth in both views".into());
                }
                let (idx, data): (Vec<usize>, Vec<PointPair>) = matches
                    .iter()
                    .enumerate()
                    .filter_map(|(k, m)| {
                        let a = from.point3(pixel(&from_kp[m.from_idx]))?;
                        let b = to.point3(pixel(&to_kp[m.to_idx]))?;
                        Some((k, PointPair { from: a, to: b }))
                    })
                    .unzip();
                let result = ransac(&RigidEstimator, &data, &self.ransac_options(self.params.inlier_distance));
                let model = result
                    .model
                    .ok_or_else(|| format!("no 3D->3D consensus among {} correspondences", data.len()))?;
                Ok((model, result.inliers.iter().map(|&i| idx[i]).collect()))
            }
            EstimationMode::ThreeDToTwoD => {
                if !from.has_aux() {
                    return Err("3D->2D estimation requires depth in the \"from\" view".into());
                }
                let (idx, data): (Vec<usize>, Vec<PointPixel>) = matches
                    .iter()
                    .enumerate()
                    .filter_map(|(k, m)| {
                        let point = from.point3(pixel(&from_kp[m.from_idx]))?;
                        let p = pixel(&to_kp[m.to_idx]);
                        Some((k, PointPixel { point, pixel: Point2::new(p.x as f64, p.y as f64) }))
                    })
                    .unzip();
                let estimator = PnpEstimator {
                    camera: *to.calibration().camera(),
                };
                let result = ransac(&estimator, &data, &self.ransac_options(self.params.pnp_reproj_error));
                let t_to_from = result
                    .model
                    .ok_or_else(|| format!("no 3D->2D consensus among {} correspondences", data.len()))?;
                Ok((t_to_from.inverse(), result.inliers.iter().map(|&i| idx[i]).collect()))
            }
            EstimationMode::TwoDToTwoD => {
                let cam_from = from.calibration().camera();
                let cam_to = to.calibration().camera();
                let data: Vec<PointMatch> = matches
                    .iter()
                    .map(|m| {
                        let a = pixel(&from_kp[m.from_idx]);
                        let b = pixel(&to_kp[m.to_idx]);
                        PointMatch {
                            from: cam_from.normalize(&Point2::new(a.x as f64, a.y as f64)),
                            to: cam_to.normalize(&Point2::new(b.x as f64, b.y as f64)),
                        }
                    })
                    .collect();
                let focal = 0.5 * (cam_from.fx + cam_from.fy);
                let opts = self.ransac_options(self.params.pnp_reproj_error);
                let rotation = ransac(&RotationEstimator { focal }, &data, &opts);
                let essential = ransac(&EssentialEstimator { focal }, &data, &opts);

                if let Some(r) = rotation.model.filter(|_| rotation.inliers.len() >= essential.inliers.len()) {
                    log::debug!(
                        "no parallax: rotation explains {} of {} matches (essential {})",
                        rotation.inliers.len(),
                        data.len(),
                        essential.inliers.len()
                    );
                    let t_to_from = Isometry3::from_parts(
                        Translation3::identity(),
                        UnitQuaternion::from_rotation_matrix(&r),
                    );
                    return Ok((t_to_from.inverse(), rotation.inliers));
                }

                let e = essential
                    .model
                    .ok_or_else(|| format!("no 2D->2D consensus among {} correspondences", data.len()))?;
                let inlier_matches: Vec<PointMatch> = essential.inliers.iter().map(|&i| data[i]).collect();
                let (mut t_to_from, _) = recover_pose(&e, &inlier_matches)
                    .ok_or_else(|| "essential matrix has no pose with points in front".to_string())?;
                let scale = guess.translation.vector.norm();
                if scale > f64::EPSILON {
                    t_to_from.translation.vector *= scale;
                }
                Ok((t_to_from.inverse(), essential.inliers))
            }
        }
    }
}

fn feature_from(id: i32, d: &Described) -> Feature {
    let mut f = Feature::new(id, d.keypoint.position, d.keypoint.size);
    f.response = d.keypoint.response;
    f
}

/// Matched pairs share ids `1..=N` in match order; the rest get `-1`.
fn feature_maps(from: &[Described], to: &[Described], matches: &[Match]) -> (FeatureMap, FeatureMap, Vec<i32>) {
    let mut from_ids = vec![-1; from.len()];
    let mut to_ids = vec![-1; to.len()];
    let mut ids = Vec::with_capacity(matches.len());
    for (k, m) in matches.iter().enumerate() {
        let id = k as i32 + 1;
        from_ids[m.from_idx] = id;
        to_ids[m.to_idx] = id;
        ids.push(id);
    }
    let build = |kps: &[Described], ids: &[i32]| -> FeatureMap {
        kps.iter().zip(ids).map(|(d, &id)| feature_from(id, d)).collect()
    };
    (build(from, &from_ids), build(to, &to_ids), ids)
}

impl Registration for FeatureRegistration {
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(from = from.id(), to = to.id()))
    )]
    fn compute_transform(
        &self,
        from: &Observation,
        to: &Observation,
        guess: &Isometry3<f64>,
    ) -> Result<RegistrationOutput, RegistrationError> {
        for obs in [from, to] {
            if obs.gray().is_empty() {
                return Err(RegistrationError::EmptyImage { id: obs.id() });
            }
        }
        if self.params.matching == MatchingStrategy::Learned && self.matcher.is_none() {
            return Err(RegistrationError::MatcherUnavailable(MatchingStrategy::Learned));
        }

        let brief = BriefExtractor::default();
        let describe = |obs: &Observation| {
            let kps = detect_keypoints(obs.gray(), self.params.detector, self.params.max_features);
            brief.describe(obs.gray(), &kps)
        };
        let from_kp = describe(from);
        let to_kp = describe(to);
        let matches = self.correspondences(&from_kp, &to_kp)?;
        log::debug!(
            "features from={} to={}, {} matches ({})",
            from_kp.len(),
            to_kp.len(),
            matches.len(),
            self.params.matching
        );

        let (features_from, features_to, ids) = feature_maps(&from_kp, &to_kp, &matches);
        let mut info = RegistrationInfo::for_params(&self.params);
        if let Some(m) = &self.matcher {
            if self.params.matching == MatchingStrategy::Learned {
                info.matcher_name = m.name().to_string();
            }
        }
        info.matches = matches.len();

        let mut transform = None;
        match self.estimate(from, to, &from_kp, &to_kp, &matches, guess) {
            Ok((t, inliers)) => {
                info.inliers = inliers.len();
                info.inlier_ids = inliers.iter().map(|&k| ids[k]).collect();
                if inliers.len() < self.params.min_inliers {
                    info.rejected = Some(format!(
                        "not enough inliers {}/{} (matches={}) between {} and {}",
                        inliers.len(),
                        self.params.min_inliers,
                        matches.len(),
                        from.id(),
                        to.id()
                    ));
                } else {
                    transform = Some(t);
                }
            }
            Err(reason) => info.rejected = Some(reason),
        }
        if let Some(reason) = &info.rejected {
            log::info!("registration {} -> {} rejected: {reason}", from.id(), to.id());
        }

        Ok(RegistrationOutput {
            transform,
            info,
            features_from,
            features_to,
        })
    }
}
