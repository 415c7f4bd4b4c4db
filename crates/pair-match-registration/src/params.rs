//! Registration options.
//!
//! Options arrive as a flat map of recognised key names to string values
//! (the same shape the command line and JSON files use). Enumerated options
//! accept either their numeric id or their name.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const KEY_FEATURE_TYPE: &str = "Vis/FeatureType";
pub const KEY_MAX_FEATURES: &str = "Vis/MaxFeatures";
pub const KEY_NN_TYPE: &str = "Vis/CorNNType";
pub const KEY_NN_RATIO: &str = "Vis/CorNNDR";
pub const KEY_ESTIMATION_TYPE: &str = "Vis/EstimationType";
pub const KEY_PNP_REPROJ_ERROR: &str = "Vis/PnPReprojError";
pub const KEY_EPIPOLAR_GEOMETRY_VAR: &str = "Vis/EpipolarGeometryVar";
pub const KEY_MIN_INLIERS: &str = "Vis/MinInliers";
pub const KEY_INLIER_DISTANCE: &str = "Vis/InlierDistance";
pub const KEY_ITERATIONS: &str = "Vis/Iterations";

/// Every recognised key, in display order.
pub const KNOWN_KEYS: [&str; 10] = [
    KEY_FEATURE_TYPE,
    KEY_MAX_FEATURES,
    KEY_NN_TYPE,
    KEY_NN_RATIO,
    KEY_ESTIMATION_TYPE,
    KEY_PNP_REPROJ_ERROR,
    KEY_EPIPOLAR_GEOMETRY_VAR,
    KEY_MIN_INLIERS,
    KEY_INLIER_DISTANCE,
    KEY_ITERATIONS,
];

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ParamsError {
    #[error("unknown parameter \"{0}\"")]
    UnknownKey(String),
    #[error("invalid value \"{value}\" for {key}: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
}

/// Keypoint detector selected by `Vis/FeatureType`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DetectorKind {
    #[default]
    Fast,
    Chess,
}

/// Correspondence strategy selected by `Vis/CorNNType`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MatchingStrategy {
    /// Exhaustive Hamming search with the distance-ratio test.
    BruteForce,
    /// Kd-tree nearest neighbours with the distance-ratio test.
    #[default]
    KdTree,
    /// Mutual nearest neighbours, no ratio test.
    CrossCheck,
    /// A caller-supplied learned matcher.
    Learned,
}

/// Degrees of freedom used for pose recovery, selected by `Vis/EstimationType`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EstimationMode {
    ThreeDToThreeD,
    #[default]
    ThreeDToTwoD,
    TwoDToTwoD,
}

macro_rules! id_name_enum {
    ($ty:ty, [$(($variant:path, $id:expr, $name:expr)),+ $(,)?]) => {
        impl $ty {
            pub const ALL: &'static [$ty] = &[$($variant),+];

            pub fn id(self) -> i32 {
                match self {
                    $($variant => $id,)+
                }
            }

            pub fn name(self) -> &'static str {
                match self {
                    $($variant => $name,)+
                }
            }

            pub fn from_id(id: i32) -> Option<Self> {
                match id {
                    $($id => Some($variant),)+
                    _ => None,
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.name())
            }
        }

        impl FromStr for $ty {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let s = s.trim();
                if let Ok(id) = s.parse::<i32>() {
                    return Self::from_id(id).ok_or_else(|| format!("unknown id {id}"));
                }
                Self::ALL
                    .iter()
                    .copied()
                    .find(|v| v.name().eq_ignore_ascii_case(s))
                    .ok_or_else(|| {
                        let names: Vec<String> = Self::ALL
                            .iter()
                            .map(|v| format!("{}={}", v.id(), v.name()))
                            .collect();
                        format!("expected one of {}", names.join(", "))
                    })
            }
        }
    };
}

id_name_enum!(
    DetectorKind,
    [(DetectorKind::Fast, 0, "FAST"), (DetectorKind::Chess, 1, "ChESS")]
);

id_name_enum!(
    MatchingStrategy,
    [
        (MatchingStrategy::BruteForce, 0, "BruteForce"),
        (MatchingStrategy::KdTree, 1, "KdTree"),
        (MatchingStrategy::CrossCheck, 2, "BFCrossCheck"),
        (MatchingStrategy::Learned, 3, "Learned"),
    ]
);

id_name_enum!(
    EstimationMode,
    [
        (EstimationMode::ThreeDToThreeD, 0, "3D->3D"),
        (EstimationMode::ThreeDToTwoD, 1, "3D->2D"),
        (EstimationMode::TwoDToTwoD, 2, "2D->2D"),
    ]
);

impl MatchingStrategy {
    /// True for the strategies that apply the nearest-neighbour distance ratio.
    pub fn is_ratio_based(self) -> bool {
        matches!(self, MatchingStrategy::BruteForce | MatchingStrategy::KdTree)
    }
}

/// Parameters of the feature-based registration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistrationParams {
    pub detector: DetectorKind,
    /// Strongest keypoints kept per image (0 = unlimited).
    pub max_features: usize,
    pub matching: MatchingStrategy,
    /// Best/second-best distance ratio for ratio-based strategies.
    pub nn_ratio: f32,
    pub estimation: EstimationMode,
    /// Inlier threshold in pixels for 3D->2D and 2D->2D.
    pub pnp_reproj_error: f64,
    /// Variance attached to epipolar estimates; 1 marks an unknown scale.
    pub epipolar_geometry_var: f64,
    pub min_inliers: usize,
    /// Inlier threshold in metres for 3D->3D.
    pub inlier_distance: f64,
    /// RANSAC iteration budget.
    pub iterations: usize,
}

impl Default for RegistrationParams {
    fn default() -> Self {
        Self {
            detector: DetectorKind::Fast,
            max_features: 1000,
            matching: MatchingStrategy::KdTree,
            nn_ratio: 0.8,
            estimation: EstimationMode::ThreeDToTwoD,
            pnp_reproj_error: 2.0,
            epipolar_geometry_var: 0.1,
            min_inliers: 20,
            inlier_distance: 0.1,
            iterations: 300,
        }
    }
}

fn invalid(key: &str, value: &str, reason: impl ToString) -> ParamsError {
    ParamsError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, ParamsError>
where
    T::Err: fmt::Display,
{
    value.trim().parse::<T>().map_err(|e| invalid(key, value, e))
}

fn parse_positive(key: &str, value: &str) -> Result<f64, ParamsError> {
    let v: f64 = parse_num(key, value)?;
    if !v.is_finite() || v <= 0.0 {
        return Err(invalid(key, value, "must be a positive number"));
    }
    Ok(v)
}

impl RegistrationParams {
    /// Defaults overridden by every entry of `map`.
    pub fn from_map(map: &BTreeMap<String, String>) -> Result<Self, ParamsError> {
        let mut params = Self::default();
        params.apply(map)?;
        Ok(params)
    }

    pub fn apply(&mut self, map: &BTreeMap<String, String>) -> Result<(), ParamsError> {
        for (key, value) in map {
            self.set(key, value)?;
        }
        Ok(())
    }

    /// Set a single option from its string form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), ParamsError> {
        match key {
            KEY_FEATURE_TYPE => {
                self.detector = value.parse().map_err(|e| invalid(key, value, e))?;
            }
            KEY_MAX_FEATURES => self.max_features = parse_num(key, value)?,
            KEY_NN_TYPE => {
                self.matching = value.parse().map_err(|e| invalid(key, value, e))?;
            }
            KEY_NN_RATIO => {
                let r: f32 = parse_num(key, value)?;
                if !(r > 0.0 && r <= 1.0) {
                    return Err(invalid(key, value, "must be in (0, 1]"));
                }
                self.nn_ratio = r;
            }
            KEY_ESTIMATION_TYPE => {
                self.estimation = value.parse().map_err(|e| invalid(key, value, e))?;
            }
            KEY_PNP_REPROJ_ERROR => self.pnp_reproj_error = parse_positive(key, value)?,
            KEY_EPIPOLAR_GEOMETRY_VAR => self.epipolar_geometry_var = parse_positive(key, value)?,
            KEY_MIN_INLIERS => self.min_inliers = parse_num(key, value)?,
            KEY_INLIER_DISTANCE => self.inlier_distance = parse_positive(key, value)?,
            KEY_ITERATIONS => {
                let n: usize = parse_num(key, value)?;
                if n == 0 {
                    return Err(invalid(key, value, "must be at least 1"));
                }
                self.iterations = n;
            }
            _ => return Err(ParamsError::UnknownKey(key.to_string())),
        }
        Ok(())
    }

    /// String form of every option, keyed like [`RegistrationParams::set`].
    pub fn to_map(&self) -> BTreeMap<String, String> {
        let entries = [
            (KEY_FEATURE_TYPE, self.detector.id().to_string()),
            (KEY_MAX_FEATURES, self.max_features.to_string()),
            (KEY_NN_TYPE, self.matching.id().to_string()),
            (KEY_NN_RATIO, self.nn_ratio.to_string()),
            (KEY_ESTIMATION_TYPE, self.estimation.id().to_string()),
            (KEY_PNP_REPROJ_ERROR, self.pnp_reproj_error.to_string()),
            (KEY_EPIPOLAR_GEOMETRY_VAR, self.epipolar_geometry_var.to_string()),
            (KEY_MIN_INLIERS, self.min_inliers.to_string()),
            (KEY_INLIER_DISTANCE, self.inlier_distance.to_string()),
            (KEY_ITERATIONS, self.iterations.to_string()),
        ];
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect()
    }

    /// Table of keys with their defaults and accepted values.
    pub fn usage() -> String {
        let defaults = Self::default().to_map();
        let describe = |key: &str| -> String {
            match key {
                KEY_FEATURE_TYPE => enum_choices(DetectorKind::ALL.iter().map(|v| (v.id(), v.name()))),
                KEY_NN_TYPE => enum_choices(MatchingStrategy::ALL.iter().map(|v| (v.id(), v.name()))),
                KEY_ESTIMATION_TYPE => {
                    enum_choices(EstimationMode::ALL.iter().map(|v| (v.id(), v.name())))
                }
                KEY_MAX_FEATURES => "Maximum keypoints per image (0 = unlimited).".into(),
                KEY_NN_RATIO => "Nearest-neighbour distance ratio.".into(),
                KEY_PNP_REPROJ_ERROR => "Inlier reprojection error (px).".into(),
                KEY_EPIPOLAR_GEOMETRY_VAR => "Variance of 2D->2D estimates.".into(),
                KEY_MIN_INLIERS => "Minimum inliers to accept a transform.".into(),
                KEY_INLIER_DISTANCE => "Inlier distance for 3D->3D (m).".into(),
                KEY_ITERATIONS => "RANSAC iterations.".into(),
                _ => String::new(),
            }
        };
        let mut out = String::from("Registration parameters:\n");
        for key in KNOWN_KEYS {
            let default = defaults.get(key).map(String::as_str).unwrap_or("");
            out.push_str(&format!(
                "   --param {key}={default:<8} {}\n",
                describe(key)
            ));
        }
        out
    }
}

fn enum_choices<'a>(items: impl Iterator<Item = (i32, &'a str)>) -> String {
    let parts: Vec<String> = items.map(|(id, name)| format!("{id}={name}")).collect();
    parts.join(" ")
}
