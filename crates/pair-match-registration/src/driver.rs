//! Runs a registration the way the tool reports it: the configured mode is
//! adapted to the available data, the capability is warmed up once and the
//! second call is timed.

use std::time::{Duration, Instant};

use nalgebra::Isometry3;
use pair_match_core::Observation;

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::error::RegistrationError;
use crate::info::RegistrationOutput;
use crate::params::{EstimationMode, RegistrationParams};
use crate::registration::{FeatureRegistration, Registration};

/// Variance reported for epipolar estimates when the scale is unknown.
pub const UNKNOWN_SCALE_VARIANCE: f64 = 1.0;

/// A timed registration result.
#[derive(Clone, Debug)]
pub struct Estimate {
    pub output: RegistrationOutput,
    /// Wall-clock duration of the timed call only.
    pub elapsed: Duration,
    /// Parameters the capability was built with.
    pub params: RegistrationParams,
}

impl Estimate {
    pub fn transform(&self) -> Option<&Isometry3<f64>> {
        self.output.transform.as_ref()
    }
}

#[derive(Clone, Debug, Default)]
pub struct RegistrationDriver {
    params: RegistrationParams,
}

impl RegistrationDriver {
    pub fn new(params: RegistrationParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &RegistrationParams {
        &self.params
    }

    /// Parameters adjusted to the observations: without depth or a right
    /// image on the "from" side only 2D->2D is possible.
    pub fn effective_params(&self, from: &Observation, _to: &Observation) -> RegistrationParams {
        let mut params = self.params.clone();
        if !from.has_aux() {
            if params.estimation != EstimationMode::TwoDToTwoD {
                log::info!(
                    "no depth for observation {}, using {} instead of {}",
                    from.id(),
                    EstimationMode::TwoDToTwoD,
                    params.estimation
                );
            }
            params.estimation = EstimationMode::TwoDToTwoD;
            params.epipolar_geometry_var = UNKNOWN_SCALE_VARIANCE;
        }
        params
    }

    /// Build the capability from the effective parameters and run it twice,
    /// returning the second (timed) result.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "info", skip_all, fields(from = from.id(), to = to.id()))
    )]
    pub fn estimate<R, F>(
        &self,
        from: &Observation,
        to: &Observation,
        guess: &Isometry3<f64>,
        build: F,
    ) -> Result<Estimate, RegistrationError>
    where
        R: Registration,
        F: FnOnce(&RegistrationParams) -> Result<R, RegistrationError>,
    {
        let params = self.effective_params(from, to);
        let registration = build(&params)?;

        let warm_up = registration.compute_transform(from, to, guess)?;

        let start = Instant::now();
        let output = registration.compute_transform(from, to, guess)?;
        let elapsed = start.elapsed();

        if warm_up.transform != output.transform || warm_up.info.inliers != output.info.inliers {
            log::debug!(
                "warm-up registration differs from the timed one ({} vs {} inliers)",
                warm_up.info.inliers,
                output.info.inliers
            );
        }
        log::debug!(
            "registration {} -> {} took {:.6}s",
            from.id(),
            to.id(),
            elapsed.as_secs_f64()
        );

        Ok(Estimate {
            output,
            elapsed,
            params,
        })
    }

    /// [`RegistrationDriver::estimate`] with the built-in [`FeatureRegistration`].
    pub fn estimate_features(
        &self,
        from: &Observation,
        to: &Observation,
        guess: &Isometry3<f64>,
    ) -> Result<Estimate, RegistrationError> {
        self.estimate(from, to, guess, |params| {
            Ok(FeatureRegistration::new(params.clone()))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};

    use pair_match_core::{
        fake_camera_model, AuxImage, Calibration, ColorImage, DepthImage, ObservationBuilder,
    };

    use super::*;
    use crate::info::RegistrationInfo;

    struct Recording<'a> {
        calls: &'a Cell<usize>,
        seen: &'a RefCell<Vec<EstimationMode>>,
        mode: EstimationMode,
    }

    impl Registration for Recording<'_> {
        fn compute_transform(
            &self,
            _from: &Observation,
            _to: &Observation,
            guess: &Isometry3<f64>,
        ) -> Result<RegistrationOutput, RegistrationError> {
            self.calls.set(self.calls.get() + 1);
            self.seen.borrow_mut().push(self.mode);
            Ok(RegistrationOutput {
                transform: Some(*guess),
                info: RegistrationInfo {
                    matches: 12,
                    inliers: 9,
                    ..RegistrationInfo::default()
                },
                ..RegistrationOutput::default()
            })
        }
    }

    fn observations(with_depth: bool) -> (Observation, Observation) {
        let builder = ObservationBuilder::new(Calibration::Mono(fake_camera_model(8, 6)));
        let image = || ColorImage {
            width: 8,
            height: 6,
            data: vec![0; 8 * 6 * 3],
        };
        let aux = || with_depth.then(|| AuxImage::Depth(DepthImage::from_millimeters(8, 6, &[1000; 48])));
        builder.build_pair((image(), aux()), (image(), aux()))
    }

    #[test]
    fn capability_runs_twice_and_returns_timed_result() {
        let (from, to) = observations(true);
        let calls = Cell::new(0);
        let seen = RefCell::new(Vec::new());
        let driver = RegistrationDriver::new(RegistrationParams::default());
        let guess = Isometry3::translation(0.0, 0.0, 1.0);
        let estimate = driver
            .estimate(&from, &to, &guess, |p| {
                Ok(Recording {
                    calls: &calls,
                    seen: &seen,
                    mode: p.estimation,
                })
            })
            .unwrap();
        assert_eq!(calls.get(), 2);
        assert_eq!(estimate.transform(), Some(&guess));
        assert_eq!(estimate.output.info.inliers, 9);
        assert_eq!(*seen.borrow(), vec![EstimationMode::ThreeDToTwoD; 2]);
    }

    #[test]
    fn missing_depth_forces_two_d_to_two_d() {
        let (from, to) = observations(false);
        let mut params = RegistrationParams::default();
        params.estimation = EstimationMode::ThreeDToThreeD;
        let driver = RegistrationDriver::new(params);

        let effective = driver.effective_params(&from, &to);
        assert_eq!(effective.estimation, EstimationMode::TwoDToTwoD);
        assert_eq!(effective.epipolar_geometry_var, UNKNOWN_SCALE_VARIANCE);

        let (from_d, to_d) = observations(true);
        let kept = driver.effective_params(&from_d, &to_d);
        assert_eq!(kept.estimation, EstimationMode::ThreeDToThreeD);
        assert_eq!(kept.epipolar_geometry_var, 0.1);
    }

    #[test]
    fn build_errors_propagate() {
        let (from, to) = observations(true);
        let driver = RegistrationDriver::default();
        let err = driver
            .estimate::<FeatureRegistration, _>(&from, &to, &Isometry3::identity(), |_| {
                Err(RegistrationError::Backend("offline".into()))
            })
            .unwrap_err();
        assert!(matches!(err, RegistrationError::Backend(_)));
    }
}
