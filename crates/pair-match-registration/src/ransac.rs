//! Seeded RANSAC shared by the pose estimators.
//!
//! Estimators are values rather than types so they can carry the camera
//! model or thresholds they need. A failed consensus is reported through
//! [`RansacResult::model`] being `None`, never by panicking.

use rand::prelude::IndexedRandom;
use rand::{rngs::StdRng, SeedableRng};

#[derive(Debug, Clone)]
pub struct RansacOptions {
    pub max_iters: usize,
    /// Inlier residual threshold, in the estimator's units.
    pub thresh: f64,
    pub min_inliers: usize,
    /// Desired probability of drawing one all-inlier sample.
    pub confidence: f64,
    pub seed: u64,
    /// Refit on the consensus set before scoring.
    pub refit_on_inliers: bool,
}

impl Default for RansacOptions {
    fn default() -> Self {
        Self {
            max_iters: 300,
            thresh: 2.0,
            min_inliers: 8,
            confidence: 0.999,
            seed: 0x5eed_cafe,
            refit_on_inliers: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RansacResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<usize>,
    pub inlier_rms: f64,
    pub iters: usize,
}

impl<M> Default for RansacResult<M> {
    fn default() -> Self {
        Self {
            model: None,
            inliers: Vec::new(),
            inlier_rms: f64::INFINITY,
            iters: 0,
        }
    }
}

pub trait Estimator {
    type Datum;
    type Model;

    const MIN_SAMPLES: usize;

    /// Fit from a subset of indices; `None` on degenerate input.
    fn fit(&self, data: &[Self::Datum], sample: &[usize]) -> Option<Self::Model>;

    /// Non-negative error of one datum, in the same units as `thresh`.
    fn residual(&self, model: &Self::Model, datum: &Self::Datum) -> f64;

    fn refit(&self, data: &[Self::Datum], inliers: &[usize]) -> Option<Self::Model> {
        self.fit(data, inliers)
    }
}

fn rms(vals: &[f64]) -> f64 {
    if vals.is_empty() {
        return f64::INFINITY;
    }
    let ss: f64 = vals.iter().map(|v| v * v).sum();
    (ss / vals.len() as f64).sqrt()
}

fn adaptive_iterations(confidence: f64, inlier_ratio: f64, min_samples: usize, so_far: usize, max: usize) -> usize {
    if confidence <= 0.0 || inlier_ratio <= 0.0 {
        return max;
    }
    let denom = (1.0 - inlier_ratio.powi(min_samples as i32)).max(1e-12).ln();
    if denom >= 0.0 {
        return max;
    }
    let n = ((1.0 - confidence).ln() / denom).ceil() as usize;
    n.clamp(so_far, max)
}

fn score<E: Estimator>(
    estimator: &E,
    model: &E::Model,
    data: &[E::Datum],
    thresh: f64,
    inliers: &mut Vec<usize>,
    residuals: &mut Vec<f64>,
) {
    inliers.clear();
    residuals.clear();
    for (i, datum) in data.iter().enumerate() {
        let r = estimator.residual(model, datum);
        if r.is_finite() && r <= thresh {
            inliers.push(i);
            residuals.push(r);
        }
    }
}

pub fn ransac<E: Estimator>(
    estimator: &E,
    data: &[E::Datum],
    opts: &RansacOptions,
) -> RansacResult<E::Model> {
    let mut best = RansacResult::default();
    if data.len() < E::MIN_SAMPLES || data.len() < opts.min_inliers {
        return best;
    }

    let all: Vec<usize> = (0..data.len()).collect();
    let mut rng = StdRng::seed_from_u64(opts.seed);
    let mut sample = vec![0usize; E::MIN_SAMPLES];
    let mut inliers = Vec::with_capacity(data.len());
    let mut residuals = Vec::with_capacity(data.len());

    let mut max_iters = opts.max_iters;
    let mut iters = 0;
    while iters < max_iters {
        iters += 1;
        all.as_slice()
            .choose_multiple(&mut rng, E::MIN_SAMPLES)
            .enumerate()
            .for_each(|(k, &idx)| sample[k] = idx);

        let Some(mut model) = estimator.fit(data, &sample) else {
            continue;
        };
        score(estimator, &model, data, opts.thresh, &mut inliers, &mut residuals);
        if inliers.len() < opts.min_inliers.max(E::MIN_SAMPLES) {
            continue;
        }

        if opts.refit_on_inliers {
            if let Some(refined) = estimator.refit(data, &inliers) {
                let mut refined_inliers = Vec::with_capacity(inliers.len());
                let mut refined_residuals = Vec::with_capacity(inliers.len());
                score(
                    estimator,
                    &refined,
                    data,
                    opts.thresh,
                    &mut refined_inliers,
                    &mut refined_residuals,
                );
                if refined_inliers.len() >= inliers.len() {
                    model = refined;
                    inliers = refined_inliers;
                    residuals = refined_residuals;
                }
            }
        }

        let inlier_rms = rms(&residuals);
        let better = best.model.is_none()
            || inliers.len() > best.inliers.len()
            || (inliers.len() == best.inliers.len() && inlier_rms < best.inlier_rms);
        if better {
            best.model = Some(model);
            best.inliers = inliers.clone();
            best.inlier_rms = inlier_rms;
            best.iters = iters;
        }

        let ratio = best.inliers.len() as f64 / data.len() as f64;
        max_iters = adaptive_iterations(opts.confidence, ratio, E::MIN_SAMPLES, iters, opts.max_iters);
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    struct LineFit;

    impl Estimator for LineFit {
        type Datum = (f64, f64);
        type Model = (f64, f64);
        const MIN_SAMPLES: usize = 2;

        fn fit(&self, data: &[(f64, f64)], sample: &[usize]) -> Option<(f64, f64)> {
            let (x0, y0) = data[sample[0]];
            let (x1, y1) = data[sample[1]];
            if (x1 - x0).abs() < 1e-12 {
                return None;
            }
            let m = (y1 - y0) / (x1 - x0);
            Some((m, y0 - m * x0))
        }

        fn residual(&self, model: &(f64, f64), datum: &(f64, f64)) -> f64 {
            (model.0 * datum.0 + model.1 - datum.1).abs()
        }
    }

    #[test]
    fn finds_line_among_outliers() {
        let mut data: Vec<(f64, f64)> = (0..40).map(|i| (i as f64, 2.0 * i as f64 + 1.0)).collect();
        data.extend([(3.0, 40.0), (7.0, -5.0), (11.0, 100.0), (20.0, 0.0)]);
        let opts = RansacOptions {
            thresh: 0.5,
            min_inliers: 10,
            ..RansacOptions::default()
        };
        let result = ransac(&LineFit, &data, &opts);
        let (m, b) = result.model.expect("line model");
        assert!((m - 2.0).abs() < 1e-9);
        assert!((b - 1.0).abs() < 1e-9);
        assert_eq!(result.inliers.len(), 40);
    }

    #[test]
    fn too_little_data_has_no_model() {
        let opts = RansacOptions::default();
        let result = ransac(&LineFit, &[(0.0, 0.0)], &opts);
        assert!(result.model.is_none());
        assert!(result.inliers.is_empty());
    }
}
