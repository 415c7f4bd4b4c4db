//! Core types for two-view feature registration.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any image codec or feature detector: it resolves which camera
//! model is active for an image pair and packages images into immutable
//! [`Observation`]s.

mod calibration;
mod camera;
mod feature;
mod image;
mod logger;
mod observation;
mod stereo;

pub use calibration::{
    fake_camera_model, Calibration, CalibrationError, CalibrationKind, CalibrationLoader,
    CalibrationResolver, JsonCalibrationLoader, ResolvedCalibration,
};
pub use camera::{CameraModel, StereoCameraModel};
pub use feature::{Feature, FeatureMap, FeatureRect};
pub use image::{AuxFormat, AuxImage, ColorImage, DepthImage, GrayImage, GrayImageView};
pub use observation::{Observation, ObservationBuilder};
pub use stereo::{disparity_at, BlockMatchParams};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_logging, init_with_level, LogConfig};
