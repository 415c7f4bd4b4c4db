//! 3D-2D pose from points of one view and pixels of the other.

use nalgebra::{
    DMatrix, Isometry3, Matrix3, Matrix3x4, Matrix4, Matrix6, Point2, Point3, Rotation3,
    Translation3, UnitQuaternion, Vector3, Vector6,
};
use pair_match_core::CameraModel;

use crate::ransac::Estimator;

/// A 3D point (reference frame) and the pixel where it was observed.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointPixel {
    pub point: Point3<f64>,
    pub pixel: Point2<f64>,
}

/// Normalized DLT on all inputs; returns `T_C_W`, the reference-to-camera
/// transform.
pub fn dlt(data: &[PointPixel], camera: &CameraModel) -> Option<Isometry3<f64>> {
    let n = data.len();
    if n < 6 {
        return None;
    }
    let k_inv = camera.k_matrix().try_inverse()?;

    let mut centroid = Vector3::zeros();
    for d in data {
        centroid += d.point.coords;
    }
    centroid /= n as f64;
    let mean_dist = data
        .iter()
        .map(|d| (d.point.coords - centroid).norm())
        .sum::<f64>()
        / n as f64;
    if mean_dist <= f64::EPSILON {
        return None;
    }
    let scale = 3.0_f64.sqrt() / mean_dist;
    #[rustfmt::skip]
    let t_world = Matrix4::new(
        scale, 0.0, 0.0, -scale * centroid.x,
        0.0, scale, 0.0, -scale * centroid.y,
        0.0, 0.0, scale, -scale * centroid.z,
        0.0, 0.0, 0.0, 1.0,
    );

    let mut a = DMatrix::<f64>::zeros(2 * n, 12);
    for (i, d) in data.iter().enumerate() {
        let p = (d.point.coords - centroid) * scale;
        let ray = k_inv * Vector3::new(d.pixel.x, d.pixel.y, 1.0);
        let (u, v) = (ray.x / ray.z, ray.y / ray.z);
        let (r0, r1) = (2 * i, 2 * i + 1);
        for (c, val) in [p.x, p.y, p.z, 1.0].into_iter().enumerate() {
            a[(r0, c)] = val;
            a[(r1, 4 + c)] = val;
            a[(r0, 8 + c)] = -u * val;
            a[(r1, 8 + c)] = -v * val;
        }
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let min_idx = svd.singular_values.imin();
    let mut p_norm = Matrix3x4::<f64>::zeros();
    for r in 0..3 {
        for c in 0..4 {
            p_norm[(r, c)] = v_t[(min_idx, 4 * r + c)];
        }
    }
    let p_mtx = p_norm * t_world;

    let mut r_approx: Matrix3<f64> = p_mtx.fixed_view::<3, 3>(0, 0).into_owned();
    let mut s = (r_approx.row(0).norm() + r_approx.row(1).norm() + r_approx.row(2).norm()) / 3.0;
    if r_approx.determinant() < 0.0 {
        s = -s;
    }
    if s.abs() <= f64::EPSILON {
        return None;
    }
    r_approx /= s;

    let svd = r_approx.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = u * v_t;
    if r.determinant() < 0.0 {
        let mut u_fix = u;
        u_fix.column_mut(2).neg_mut();
        r = u_fix * v_t;
    }
    let t: Vector3<f64> = p_mtx.column(3).into_owned() / s;

    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(r));
    Some(Isometry3::from_parts(Translation3::from(t), rot))
}

fn reprojection_error(pose: &Isometry3<f64>, camera: &CameraModel, d: &PointPixel) -> f64 {
    match camera.project(&pose.transform_point(&d.point)) {
        Some(uv) => (uv - d.pixel).norm(),
        None => f64::INFINITY,
    }
}

/// Gauss-Newton on the reprojection error, starting from `pose`.
pub fn refine_pose(
    pose: &Isometry3<f64>,
    data: &[PointPixel],
    camera: &CameraModel,
    iterations: usize,
) -> Isometry3<f64> {
    let mut current = *pose;
    for _ in 0..iterations {
        let mut jtj = Matrix6::<f64>::zeros();
        let mut jtr = Vector6::<f64>::zeros();
        let mut cost = 0.0;
        for d in data {
            let pc = current.transform_point(&d.point);
            if pc.z <= 1e-9 {
                continue;
            }
            let inv_z = 1.0 / pc.z;
            let u = camera.fx * pc.x * inv_z + camera.cx;
            let v = camera.fy * pc.y * inv_z + camera.cy;
            let r = [u - d.pixel.x, v - d.pixel.y];
            cost += r[0] * r[0] + r[1] * r[1];

            // d(pc) / d(twist) with a left perturbation: [-[pc]x | I].
            let du = Vector3::new(camera.fx * inv_z, 0.0, -camera.fx * pc.x * inv_z * inv_z);
            let dv = Vector3::new(0.0, camera.fy * inv_z, -camera.fy * pc.y * inv_z * inv_z);
            for (row, res) in [(du, r[0]), (dv, r[1])] {
                let rot_part = pc.coords.cross(&row);
                let j = Vector6::new(rot_part.x, rot_part.y, rot_part.z, row.x, row.y, row.z);
                jtj += j * j.transpose();
                jtr += j * res;
            }
        }
        let Some(delta) = jtj.cholesky().map(|c| c.solve(&(-jtr))) else {
            break;
        };
        let step = Isometry3::from_parts(
            Translation3::new(delta[3], delta[4], delta[5]),
            UnitQuaternion::from_scaled_axis(Vector3::new(delta[0], delta[1], delta[2])),
        );
        let candidate = step * current;
        let new_cost: f64 = data
            .iter()
            .map(|d| reprojection_error(&candidate, camera, d).powi(2))
            .filter(|e| e.is_finite())
            .sum();
        if new_cost >= cost {
            break;
        }
        current = candidate;
        if delta.norm() < 1e-10 {
            break;
        }
    }
    current
}

/// RANSAC model over [`dlt`], residual in pixels.
pub struct PnpEstimator {
    pub camera: CameraModel,
}

impl Estimator for PnpEstimator {
    type Datum = PointPixel;
    type Model = Isometry3<f64>;
    const MIN_SAMPLES: usize = 6;

    fn fit(&self, data: &[PointPixel], sample: &[usize]) -> Option<Isometry3<f64>> {
        let subset: Vec<PointPixel> = sample.iter().map(|&i| data[i]).collect();
        dlt(&subset, &self.camera)
    }

    fn residual(&self, model: &Isometry3<f64>, datum: &PointPixel) -> f64 {
        reprojection_error(model, &self.camera, datum)
    }

    fn refit(&self, data: &[PointPixel], inliers: &[usize]) -> Option<Isometry3<f64>> {
        let subset: Vec<PointPixel> = inliers.iter().map(|&i| data[i]).collect();
        let initial = dlt(&subset, &self.camera)?;
        Some(refine_pose(&initial, &subset, &self.camera, 10))
    }
}
