//! What a registration run reports back.

use std::collections::BTreeSet;

use nalgebra::Isometry3;
use pair_match_core::FeatureMap;
use serde::{Deserialize, Serialize};

use crate::params::{DetectorKind, EstimationMode, MatchingStrategy, RegistrationParams};

/// Statistics and echoed options of one registration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RegistrationInfo {
    /// Number of putative correspondences.
    pub matches: usize,
    /// Number of correspondences consistent with the transform.
    pub inliers: usize,
    /// Feature ids of the inlier correspondences.
    pub inlier_ids: BTreeSet<i32>,
    pub detector: DetectorKind,
    pub matching: MatchingStrategy,
    /// Display name of the matcher actually used.
    pub matcher_name: String,
    /// Ratio applied by ratio-based strategies.
    pub nn_ratio: Option<f32>,
    pub estimation: EstimationMode,
    /// Reprojection threshold in pixels.
    pub pnp_reproj_error: f64,
    pub min_inliers: usize,
    /// Why no transform was produced.
    pub rejected: Option<String>,
}

impl RegistrationInfo {
    /// Info with the options of `params` echoed and no counts yet.
    pub fn for_params(params: &RegistrationParams) -> Self {
        Self {
            detector: params.detector,
            matching: params.matching,
            matcher_name: params.matching.name().to_string(),
            nn_ratio: params.matching.is_ratio_based().then_some(params.nn_ratio),
            estimation: params.estimation,
            pnp_reproj_error: params.pnp_reproj_error,
            min_inliers: params.min_inliers,
            ..Self::default()
        }
    }
}

/// Result of [`crate::Registration::compute_transform`].
#[derive(Clone, Debug, Default)]
pub struct RegistrationOutput {
    /// Pose of "to" in the "from" frame; `None` when registration failed.
    pub transform: Option<Isometry3<f64>>,
    pub info: RegistrationInfo,
    pub features_from: FeatureMap,
    pub features_to: FeatureMap,
}

impl RegistrationOutput {
    pub fn is_registered(&self) -> bool {
        self.transform.is_some()
    }
}
