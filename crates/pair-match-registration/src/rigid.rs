//! 3D-3D rigid alignment.

use nalgebra::{Isometry3, Matrix3, Point3, Rotation3, Translation3, UnitQuaternion, Vector3};

use crate::ransac::Estimator;

/// A point seen in both frames.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointPair {
    pub from: Point3<f64>,
    pub to: Point3<f64>,
}

/// Kabsch alignment: the isometry `T` minimising `|from - T * to|`.
pub fn align_points(pairs: &[PointPair]) -> Option<Isometry3<f64>> {
    if pairs.len() < 3 {
        return None;
    }
    let n = pairs.len() as f64;
    let mut c_from = Vector3::zeros();
    let mut c_to = Vector3::zeros();
    for p in pairs {
        c_from += p.from.coords;
        c_to += p.to.coords;
    }
    c_from /= n;
    c_to /= n;

    let mut h = Matrix3::zeros();
    for p in pairs {
        h += (p.from.coords - c_from) * (p.to.coords - c_to).transpose();
    }

    let svd = h.svd(true, true);
    // Collinear or coincident points leave the rotation undetermined.
    let sv = &svd.singular_values;
    let largest = sv.max();
    if largest <= 1e-12 || sv.iter().filter(|&&s| s > 1e-9 * largest).count() < 2 {
        return None;
    }
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }

    let t = c_from - r * c_to;
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    Some(Isometry3::from_parts(Translation3::from(t), rot))
}

/// RANSAC model for [`align_points`], residual in metres.
pub struct RigidEstimator;

impl Estimator for RigidEstimator {
    type Datum = PointPair;
    type Model = Isometry3<f64>;
    const MIN_SAMPLES: usize = 3;

    fn fit(&self, data: &[PointPair], sample: &[usize]) -> Option<Isometry3<f64>> {
        let subset: Vec<PointPair> = sample.iter().map(|&i| data[i]).collect();
        align_points(&subset)
    }

    fn residual(&self, model: &Isometry3<f64>, datum: &PointPair) -> f64 {
        (datum.from - model.transform_point(&datum.to)).norm()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::ransac::{ransac, RansacOptions};

    fn cloud() -> Vec<Point3<f64>> {
        let mut pts = Vec::new();
        for i in 0..5 {
            for j in 0..4 {
                pts.push(Point3::new(i as f64 * 0.2 - 0.4, j as f64 * 0.15, 1.0 + ((i + j) % 3) as f64 * 0.3));
            }
        }
        pts
    }

    fn ground_truth() -> Isometry3<f64> {
        Isometry3::new(Vector3::new(0.1, -0.05, 0.2), Vector3::new(0.02, -0.1, 0.05))
    }

    #[test]
    fn kabsch_recovers_motion() {
        let gt = ground_truth();
        let pairs: Vec<PointPair> = cloud()
            .into_iter()
            .map(|to| PointPair {
                from: gt.transform_point(&to),
                to,
            })
            .collect();
        let est = align_points(&pairs).expect("alignment");
        assert_relative_eq!(est.to_homogeneous(), gt.to_homogeneous(), epsilon = 1e-9);
    }

    #[test]
    fn ransac_ignores_outliers() {
        let gt = ground_truth();
        let mut pairs: Vec<PointPair> = cloud()
            .into_iter()
            .map(|to| PointPair {
                from: gt.transform_point(&to),
                to,
            })
            .collect();
        pairs[3].from.x += 0.5;
        pairs[11].from.z -= 0.8;

        let opts = RansacOptions {
            thresh: 0.01,
            min_inliers: 10,
            ..RansacOptions::default()
        };
        let result = ransac(&RigidEstimator, &pairs, &opts);
        assert_eq!(result.inliers.len(), pairs.len() - 2);
        assert!(!result.inliers.contains(&3));
        let est = result.model.expect("model");
        assert_relative_eq!(est.to_homogeneous(), gt.to_homogeneous(), epsilon = 1e-6);
    }

    #[test]
    fn collinear_points_are_degenerate() {
        let pairs: Vec<PointPair> = (0..4)
            .map(|i| {
                let p = Point3::new(i as f64, 0.0, 1.0);
                PointPair { from: p, to: p }
            })
            .collect();
        assert!(align_points(&pairs).is_none());
    }
}
