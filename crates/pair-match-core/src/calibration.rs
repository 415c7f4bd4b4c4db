//! Decide which calibration model is active for an image pair.
//!
//! The pair is either mono-calibrated, stereo-calibrated, or uncalibrated, in
//! which case a fake pinhole model is derived from the image size. Exactly one
//! model is produced per run.

use std::fs;
use std::path::{Path, PathBuf};

use crate::camera::{CameraModel, StereoCameraModel};
use crate::image::AuxFormat;

/// Errors raised while resolving the calibration.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("calibration required when depth is supplied")]
    MissingCalibration,
    #[error("depth/right inputs are inconsistent (from={from:?}, to={to:?})")]
    AuxMismatch {
        from: Option<AuxFormat>,
        to: Option<AuxFormat>,
    },
    #[error("failed to load calibration file \"{}\": {reason}", .path.display())]
    Load { path: PathBuf, reason: String },
}

impl CalibrationError {
    /// True for user configuration mistakes, false for unreadable files.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, CalibrationError::Load { .. })
    }
}

/// The single active calibration model.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Calibration {
    Mono(CameraModel),
    Stereo(StereoCameraModel),
}

impl Calibration {
    /// Intrinsics used for projecting features of the (left) image.
    pub fn camera(&self) -> &CameraModel {
        match self {
            Calibration::Mono(cam) => cam,
            Calibration::Stereo(stereo) => &stereo.left,
        }
    }

    pub fn is_stereo(&self) -> bool {
        matches!(self, Calibration::Stereo(_))
    }
}

/// How the active model was obtained.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationKind {
    Mono,
    Stereo,
    Fake,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolvedCalibration {
    pub calibration: Calibration,
    pub kind: CalibrationKind,
}

/// Loads calibration models from a source identifier.
pub trait CalibrationLoader {
    fn load_mono(&self, path: &Path) -> Result<CameraModel, CalibrationError>;
    fn load_stereo(&self, path: &Path) -> Result<StereoCameraModel, CalibrationError>;
}

/// Reads `CameraModel` / `StereoCameraModel` from JSON files.
#[derive(Clone, Copy, Debug, Default)]
pub struct JsonCalibrationLoader;

fn load_error(path: &Path, reason: impl ToString) -> CalibrationError {
    CalibrationError::Load {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T, CalibrationError> {
    let raw = fs::read_to_string(path).map_err(|e| load_error(path, e))?;
    serde_json::from_str(&raw).map_err(|e| load_error(path, e))
}

impl CalibrationLoader for JsonCalibrationLoader {
    fn load_mono(&self, path: &Path) -> Result<CameraModel, CalibrationError> {
        let cam: CameraModel = read_json(path)?;
        if !cam.is_valid_for_projection() {
            return Err(load_error(path, "camera model is not valid for projection"));
        }
        Ok(cam)
    }

    fn load_stereo(&self, path: &Path) -> Result<StereoCameraModel, CalibrationError> {
        let stereo: StereoCameraModel = read_json(path)?;
        if !stereo.is_valid_for_projection() {
            return Err(load_error(
                path,
                "stereo camera model is not valid for projection",
            ));
        }
        Ok(stereo)
    }
}

/// Heuristic intrinsics from the image size alone: `f = w/2`, principal point
/// at the image centre.
pub fn fake_camera_model(width: u32, height: u32) -> CameraModel {
    let f = (width / 2) as f64;
    CameraModel::new(f, f, (width / 2) as f64, (height / 2) as f64).with_image_size(width, height)
}

pub struct CalibrationResolver<L> {
    loader: L,
}

impl Default for CalibrationResolver<JsonCalibrationLoader> {
    fn default() -> Self {
        Self::new(JsonCalibrationLoader)
    }
}

impl<L: CalibrationLoader> CalibrationResolver<L> {
    pub fn new(loader: L) -> Self {
        Self { loader }
    }

    /// Resolve the active model.
    ///
    /// `image_size` is the size of the "from" image and only matters for the
    /// fake model.
    pub fn resolve(
        &self,
        source: Option<&Path>,
        from_aux: Option<AuxFormat>,
        to_aux: Option<AuxFormat>,
        image_size: (u32, u32),
    ) -> Result<ResolvedCalibration, CalibrationError> {
        let Some(path) = source else {
            if from_aux.is_some() || to_aux.is_some() {
                return Err(CalibrationError::MissingCalibration);
            }
            let (w, h) = image_size;
            log::debug!("no calibration source, using fake model for {w}x{h}");
            return Ok(ResolvedCalibration {
                calibration: Calibration::Mono(fake_camera_model(w, h)),
                kind: CalibrationKind::Fake,
            });
        };

        if let Some(to) = to_aux {
            if from_aux != Some(to) {
                return Err(CalibrationError::AuxMismatch {
                    from: from_aux,
                    to: to_aux,
                });
            }
        }

        match from_aux {
            Some(AuxFormat::Gray8) => {
                let stereo = self.loader.load_stereo(path)?;
                log::info!("loaded stereo calibration from {}", path.display());
                Ok(ResolvedCalibration {
                    calibration: Calibration::Stereo(stereo),
                    kind: CalibrationKind::Stereo,
                })
            }
            Some(AuxFormat::Depth) | None => {
                let cam = self.loader.load_mono(path)?;
                log::info!("loaded mono calibration from {}", path.display());
                Ok(ResolvedCalibration {
                    calibration: Calibration::Mono(cam),
                    kind: CalibrationKind::Mono,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[derive(Default)]
    struct CountingLoader {
        mono: Cell<usize>,
        stereo: Cell<usize>,
    }

    fn cam() -> CameraModel {
        CameraModel::new(500.0, 500.0, 320.0, 240.0).with_image_size(640, 480)
    }

    impl CalibrationLoader for CountingLoader {
        fn load_mono(&self, _path: &Path) -> Result<CameraModel, CalibrationError> {
            self.mono.set(self.mono.get() + 1);
            Ok(cam())
        }

        fn load_stereo(&self, _path: &Path) -> Result<StereoCameraModel, CalibrationError> {
            self.stereo.set(self.stereo.get() + 1);
            Ok(StereoCameraModel {
                left: cam(),
                right: cam(),
                baseline: 0.12,
            })
        }
    }

    #[test]
    fn fake_model_uses_half_width_focal() {
        for &(w, h) in &[(640u32, 480u32), (1280, 720), (480, 640), (101, 37)] {
            let resolved = CalibrationResolver::default()
                .resolve(None, None, None, (w, h))
                .expect("fake model");
            assert_eq!(resolved.kind, CalibrationKind::Fake);
            let cam = resolved.calibration.camera();
            assert_eq!(cam.fx, (w / 2) as f64);
            assert_eq!(cam.fy, (w / 2) as f64);
            assert_eq!(cam.cx, (w / 2) as f64);
            assert_eq!(cam.cy, (h / 2) as f64);
            assert_eq!(cam.image_size, Some((w, h)));
            assert!(cam.is_valid_for_projection());
        }
    }

    #[test]
    fn aux_without_source_is_configuration_error() {
        let loader = CountingLoader::default();
        let resolver = CalibrationResolver::new(loader);
        for (from, to) in [
            (Some(AuxFormat::Depth), None),
            (Some(AuxFormat::Gray8), Some(AuxFormat::Gray8)),
            (None, Some(AuxFormat::Depth)),
        ] {
            let err = resolver.resolve(None, from, to, (640, 480)).unwrap_err();
            assert!(matches!(err, CalibrationError::MissingCalibration));
            assert!(err.is_configuration());
        }
        assert_eq!(resolver.loader.mono.get(), 0);
        assert_eq!(resolver.loader.stereo.get(), 0);
    }

    #[test]
    fn gray8_aux_selects_stereo_loader() {
        let resolver = CalibrationResolver::new(CountingLoader::default());
        let resolved = resolver
            .resolve(
                Some(Path::new("calib.json")),
                Some(AuxFormat::Gray8),
                Some(AuxFormat::Gray8),
                (640, 480),
            )
            .unwrap();
        assert_eq!(resolved.kind, CalibrationKind::Stereo);
        assert!(resolved.calibration.is_stereo());
        assert_eq!(resolver.loader.stereo.get(), 1);
        assert_eq!(resolver.loader.mono.get(), 0);
    }

    #[test]
    fn depth_aux_and_no_aux_select_mono_loader() {
        let resolver = CalibrationResolver::new(CountingLoader::default());
        for aux in [Some(AuxFormat::Depth), None] {
            let resolved = resolver
                .resolve(Some(Path::new("calib.json")), aux, None, (640, 480))
                .unwrap();
            assert_eq!(resolved.kind, CalibrationKind::Mono);
        }
        assert_eq!(resolver.loader.mono.get(), 2);
    }

    #[test]
    fn mismatched_aux_formats_are_rejected() {
        let resolver = CalibrationResolver::new(CountingLoader::default());
        let err = resolver
            .resolve(
                Some(Path::new("calib.json")),
                Some(AuxFormat::Depth),
                Some(AuxFormat::Gray8),
                (640, 480),
            )
            .unwrap_err();
        assert!(matches!(err, CalibrationError::AuxMismatch { .. }));

        let err = resolver
            .resolve(
                Some(Path::new("calib.json")),
                None,
                Some(AuxFormat::Depth),
                (640, 480),
            )
            .unwrap_err();
        assert!(matches!(err, CalibrationError::AuxMismatch { .. }));
    }
}
