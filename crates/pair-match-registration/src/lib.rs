//! Two-view registration on top of `pair-match-core` observations.
//!
//! [`Registration`] is the capability seam: given two observations and an
//! initial guess it returns the pose of the second view in the frame of the
//! first, the features it extracted and statistics about the correspondences.
//! [`FeatureRegistration`] is the built-in implementation (FAST or ChESS
//! keypoints, BRIEF descriptors, RANSAC pose estimation) and
//! [`RegistrationDriver`] runs a capability the way the command-line tool
//! reports it.

mod descriptor;
mod driver;
mod epipolar;
mod error;
mod features;
mod info;
mod matcher;
pub mod params;
mod pnp;
mod ransac;
mod registration;
mod rigid;

pub use descriptor::{BriefExtractor, Described, Descriptor, DESCRIPTOR_BITS};
pub use driver::{Estimate, RegistrationDriver, UNKNOWN_SCALE_VARIANCE};
pub use epipolar::{
    align_bearings, essential_8point, recover_pose, sampson_distance, PointMatch,
};
pub use error::RegistrationError;
pub use features::{detect_keypoints, Detector, FastDetector, Keypoint};
pub use info::{RegistrationInfo, RegistrationOutput};
pub use matcher::{brute_force_ratio, cross_check, kdtree_ratio, DescriptorMatcher, Match};
pub use params::{
    DetectorKind, EstimationMode, MatchingStrategy, ParamsError, RegistrationParams, KNOWN_KEYS,
};
pub use pnp::{dlt, refine_pose, PointPixel};
pub use ransac::{ransac, Estimator, RansacOptions, RansacResult};
pub use registration::{FeatureRegistration, Registration};
pub use rigid::{align_points, PointPair};

#[cfg(feature = "chess")]
pub use features::ChessDetector;
