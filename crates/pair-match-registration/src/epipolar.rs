//! 2D-2D motion from the essential matrix.
//!
//! Points are normalized image coordinates (`K^-1 * pixel`). The essential
//! matrix satisfies `to^T * E * from = 0` and decomposes into the motion
//! `(R, t)` taking "from" camera coordinates into the "to" camera, with a
//! unit-length `t`.

use nalgebra::{
    DMatrix, Isometry3, Matrix3, Matrix4, Point2, Point3, Rotation3, Translation3,
    UnitQuaternion, Vector3,
};

use crate::ransac::Estimator;

/// Normalized coordinates of one feature seen in both views.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PointMatch {
    pub from: Point2<f64>,
    pub to: Point2<f64>,
}

/// Similarity moving the centroid to the origin with mean distance sqrt(2).
fn normalizing_transform(points: impl Iterator<Item = Point2<f64>> + Clone) -> Option<Matrix3<f64>> {
    let n = points.clone().count() as f64;
    if n == 0.0 {
        return None;
    }
    let (sx, sy) = points.clone().fold((0.0, 0.0), |acc, p| (acc.0 + p.x, acc.1 + p.y));
    let (cx, cy) = (sx / n, sy / n);
    let mean = points
        .map(|p| ((p.x - cx).powi(2) + (p.y - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;
    if mean <= f64::EPSILON {
        return None;
    }
    let s = std::f64::consts::SQRT_2 / mean;
    Some(Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0))
}

/// Normalized eight-point algorithm on at least eight matches.
pub fn essential_8point(matches: &[PointMatch]) -> Option<Matrix3<f64>> {
    if matches.len() < 8 {
        return None;
    }
    let t1 = normalizing_transform(matches.iter().map(|m| m.from))?;
    let t2 = normalizing_transform(matches.iter().map(|m| m.to))?;

    let rows = matches.len().max(9);
    let mut a = DMatrix::<f64>::zeros(rows, 9);
    for (i, m) in matches.iter().enumerate() {
        let p1 = t1 * Vector3::new(m.from.x, m.from.y, 1.0);
        let p2 = t2 * Vector3::new(m.to.x, m.to.y, 1.0);
        let (x, y, xp, yp) = (p1.x, p1.y, p2.x, p2.y);
        let row = [xp * x, xp * y, xp, yp * x, yp * y, yp, x, y, 1.0];
        for (c, v) in row.into_iter().enumerate() {
            a[(i, c)] = v;
        }
    }

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let min_idx = svd.singular_values.imin();
    let f_norm = Matrix3::from_fn(|r, c| v_t[(min_idx, 3 * r + c)]);
    // The normalized matrix is only fundamental-like; the (s, s, 0)
    // structure holds after undoing the normalization.
    let e = t2.transpose() * enforce_rank_two(&f_norm)? * t1;
    let e = enforce_essential_constraints(&e)?;
    let norm = e.norm();
    if norm <= f64::EPSILON {
        return None;
    }
    Some(e / norm)
}

/// Zero the smallest singular value.
fn enforce_rank_two(f: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = f.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut diag = svd.singular_values;
    let imin = diag.imin();
    diag[imin] = 0.0;
    Some(u * Matrix3::from_diagonal(&diag) * v_t)
}

/// Project onto the essential manifold: singular values `(s, s, 0)`.
pub fn enforce_essential_constraints(e: &Matrix3<f64>) -> Option<Matrix3<f64>> {
    let svd = e.svd(true, true);
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut sv: Vec<(usize, f64)> = svd.singular_values.iter().copied().enumerate().collect();
    sv.sort_by(|a, b| b.1.total_cmp(&a.1));
    let s = 0.5 * (sv[0].1 + sv[1].1);
    let mut diag = Vector3::zeros();
    diag[sv[0].0] = s;
    diag[sv[1].0] = s;
    Some(u * Matrix3::from_diagonal(&diag) * v_t)
}

/// Sampson approximation of the geometric epipolar error.
pub fn sampson_distance(e: &Matrix3<f64>, m: &PointMatch) -> f64 {
    let x1 = Vector3::new(m.from.x, m.from.y, 1.0);
    let x2 = Vector3::new(m.to.x, m.to.y, 1.0);
    let ex1 = e * x1;
    let etx2 = e.transpose() * x2;
    let num = x2.dot(&ex1);
    let den = ex1.x * ex1.x + ex1.y * ex1.y + etx2.x * etx2.x + etx2.y * etx2.y;
    if den <= f64::EPSILON {
        return f64::INFINITY;
    }
    (num * num / den).sqrt()
}

/// The four `(R, t)` candidates of an essential matrix, `t` unit-length.
pub fn decompose_essential(e: &Matrix3<f64>) -> Option<[(Matrix3<f64>, Vector3<f64>); 4]> {
    let e = enforce_essential_constraints(e)?;
    let svd = e.svd(true, true);
    let mut u = svd.u?;
    let mut v_t = svd.v_t?;
    // The null direction must be the third column of U for t.
    let null_idx = svd.singular_values.imin();
    if null_idx != 2 {
        u.swap_columns(null_idx, 2);
        v_t.swap_rows(null_idx, 2);
    }
    if u.determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    if v_t.determinant() < 0.0 {
        v_t.row_mut(2).neg_mut();
    }

    let w = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
    let r1 = u * w * v_t;
    let r2 = u * w.transpose() * v_t;
    let t: Vector3<f64> = u.column(2).normalize();
    Some([(r1, t), (r1, -t), (r2, t), (r2, -t)])
}

/// Linear triangulation with the "from" camera at the origin; the point is
/// returned in "from" coordinates.
pub fn triangulate(m: &PointMatch, r: &Matrix3<f64>, t: &Vector3<f64>) -> Option<Point3<f64>> {
    let mut a = Matrix4::<f64>::zeros();
    // P1 = [I | 0]
    a.set_row(0, &nalgebra::RowVector4::new(-1.0, 0.0, m.from.x, 0.0));
    a.set_row(1, &nalgebra::RowVector4::new(0.0, -1.0, m.from.y, 0.0));
    // P2 = [R | t]
    let p_row = |i: usize| nalgebra::RowVector4::new(r[(i, 0)], r[(i, 1)], r[(i, 2)], t[i]);
    a.set_row(2, &(p_row(2) * m.to.x - p_row(0)));
    a.set_row(3, &(p_row(2) * m.to.y - p_row(1)));

    let svd = a.svd(false, true);
    let v_t = svd.v_t?;
    let x = v_t.row(svd.singular_values.imin()).transpose();
    if x[3].abs() <= 1e-12 {
        return None;
    }
    Some(Point3::new(x[0] / x[3], x[1] / x[3], x[2] / x[3]))
}

fn in_front_count(matches: &[PointMatch], r: &Matrix3<f64>, t: &Vector3<f64>) -> usize {
    matches
        .iter()
        .filter_map(|m| triangulate(m, r, t))
        .filter(|p| p.z > 0.0 && (r * p.coords + t).z > 0.0)
        .count()
}

/// Choose the candidate with most points in front of both cameras; returns
/// `T_to_from` with unit translation and the count of points in front.
pub fn recover_pose(e: &Matrix3<f64>, matches: &[PointMatch]) -> Option<(Isometry3<f64>, usize)> {
    let candidates = decompose_essential(e)?;
    let (r, t, count) = candidates
        .iter()
        .map(|(r, t)| (r, t, in_front_count(matches, r, t)))
        .max_by_key(|(_, _, c)| *c)?;
    if count == 0 {
        return None;
    }
    let rot = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(*r));
    Some((Isometry3::from_parts(Translation3::from(*t), rot), count))
}

/// RANSAC model over [`essential_8point`]; the Sampson residual is scaled to
/// pixels by `focal`.
pub struct EssentialEstimator {
    pub focal: f64,
}

impl Estimator for EssentialEstimator {
    type Datum = PointMatch;
    type Model = Matrix3<f64>;
    const MIN_SAMPLES: usize = 8;

    fn fit(&self, data: &[PointMatch], sample: &[usize]) -> Option<Matrix3<f64>> {
        let subset: Vec<PointMatch> = sample.iter().map(|&i| data[i]).collect();
        essential_8point(&subset)
    }

    fn residual(&self, model: &Matrix3<f64>, datum: &PointMatch) -> f64 {
        sampson_distance(model, datum) * self.focal
    }
}

fn bearing(p: &Point2<f64>) -> Vector3<f64> {
    Vector3::new(p.x, p.y, 1.0).normalize()
}

/// Rotation `R` with `to ~ R * from` on the bearing vectors of the matches.
///
/// Explains views without parallax (identical images or a camera turning in
/// place), where the essential matrix is undetermined.
pub fn align_bearings(matches: &[PointMatch]) -> Option<Rotation3<f64>> {
    if matches.len() < 2 {
        return None;
    }
    let mut h = Matrix3::zeros();
    for m in matches {
        h += bearing(&m.from) * bearing(&m.to).transpose();
    }
    let svd = h.svd(true, true);
    let sv = &svd.singular_values;
    let largest = sv.max();
    if largest <= 1e-12 || sv.iter().filter(|&&s| s > 1e-9 * largest).count() < 2 {
        return None;
    }
    let u = svd.u?;
    let v_t = svd.v_t?;
    let mut r = v_t.transpose() * u.transpose();
    if r.determinant() < 0.0 {
        let mut v = v_t.transpose();
        v.column_mut(2).neg_mut();
        r = v * u.transpose();
    }
    // Re-extract the rotation so round-off never leaves a trace above 3.
    Some(Rotation3::from_matrix_eps(&r, f64::EPSILON, 64, Rotation3::identity()))
}

/// RANSAC model over [`align_bearings`]; the transfer error is scaled to
/// pixels by `focal`.
pub struct RotationEstimator {
    pub focal: f64,
}

impl Estimator for RotationEstimator {
    type Datum = PointMatch;
    type Model = Rotation3<f64>;
    const MIN_SAMPLES: usize = 2;

    fn fit(&self, data: &[PointMatch], sample: &[usize]) -> Option<Rotation3<f64>> {
        let subset: Vec<PointMatch> = sample.iter().map(|&i| data[i]).collect();
        align_bearings(&subset)
    }

    fn residual(&self, model: &Rotation3<f64>, datum: &PointMatch) -> f64 {
        let p = model * Vector3::new(datum.from.x, datum.from.y, 1.0);
        if p.z <= 1e-9 {
            return f64::INFINITY;
        }
        (Point2::new(p.x / p.z, p.y / p.z) - datum.to).norm() * self.focal
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::ransac::{ransac, RansacOptions};

    fn motion() -> Isometry3<f64> {
        Isometry3::new(Vector3::new(0.3, 0.05, -0.1), Vector3::new(0.02, 0.1, -0.03))
    }

    fn matches(t_to_from: &Isometry3<f64>) -> Vec<PointMatch> {
        let mut out = Vec::new();
        for i in 0..6 {
            for j in 0..5 {
                let p = Point3::new(
                    i as f64 * 0.3 - 0.75,
                    j as f64 * 0.25 - 0.5,
                    3.0 + ((i * 3 + j * 5) % 7) as f64 * 0.25,
                );
                let q = t_to_from.transform_point(&p);
                out.push(PointMatch {
                    from: Point2::new(p.x / p.z, p.y / p.z),
                    to: Point2::new(q.x / q.z, q.y / q.z),
                });
            }
        }
        out
    }

    #[test]
    fn eight_point_satisfies_epipolar_constraint() {
        let data = matches(&motion());
        let e = essential_8point(&data).expect("essential");
        for m in &data {
            assert!(sampson_distance(&e, m) < 1e-8);
        }
        let sv = e.singular_values();
        let mut sv: Vec<f64> = sv.iter().copied().collect();
        sv.sort_by(|a, b| b.total_cmp(a));
        assert_relative_eq!(sv[0], sv[1], epsilon = 1e-9);
        assert!(sv[2] < 1e-9);
    }

    #[test]
    fn eight_point_matches_ground_truth_essential() {
        let gt = motion();
        let t = gt.translation.vector;
        let cross = Matrix3::new(0.0, -t.z, t.y, t.z, 0.0, -t.x, -t.y, t.x, 0.0);
        let expected = cross * gt.rotation.to_rotation_matrix().into_inner();
        let expected = expected / expected.norm();
        let e = essential_8point(&matches(&gt)).expect("essential");
        // Equal up to sign.
        let sign = if (e - expected).norm() < (e + expected).norm() { 1.0 } else { -1.0 };
        assert_relative_eq!(e, expected * sign, epsilon = 1e-8);
    }

    #[test]
    fn recovers_rotation_and_direction() {
        let gt = motion();
        let data = matches(&gt);
        let e = essential_8point(&data).expect("essential");
        let (pose, in_front) = recover_pose(&e, &data).expect("pose");
        assert_eq!(in_front, data.len());
        assert_relative_eq!(
            pose.rotation.to_rotation_matrix().into_inner(),
            gt.rotation.to_rotation_matrix().into_inner(),
            epsilon = 1e-6
        );
        assert_relative_eq!(
            pose.translation.vector,
            gt.translation.vector.normalize(),
            epsilon = 1e-6
        );
    }

    #[test]
    fn ransac_rejects_mismatches() {
        let mut data = matches(&motion());
        data[4].to.y += 0.05;
        data[19].to.y -= 0.04;
        let opts = RansacOptions {
            thresh: 1.0,
            min_inliers: 15,
            ..RansacOptions::default()
        };
        let result = ransac(&EssentialEstimator { focal: 500.0 }, &data, &opts);
        assert_eq!(result.inliers.len(), data.len() - 2);
        assert!(!result.inliers.contains(&4));
        assert!(!result.inliers.contains(&19));
    }

    #[test]
    fn rotation_only_views_are_aligned_by_bearings() {
        let rot = Rotation3::from_euler_angles(0.02, -0.05, 0.01);
        let data: Vec<PointMatch> = matches(&Isometry3::identity())
            .into_iter()
            .map(|m| {
                let q = rot * Vector3::new(m.from.x, m.from.y, 1.0);
                PointMatch {
                    from: m.from,
                    to: Point2::new(q.x / q.z, q.y / q.z),
                }
            })
            .collect();
        let est = align_bearings(&data).expect("rotation");
        assert_relative_eq!(est.into_inner(), rot.into_inner(), epsilon = 1e-9);
        let residual = RotationEstimator { focal: 500.0 }.residual(&est, &data[3]);
        assert!(residual < 1e-6);
    }

    #[test]
    fn identical_views_have_identity_rotation() {
        let data = matches(&Isometry3::identity());
        let est = align_bearings(&data).expect("rotation");
        assert!(!est.angle().is_nan());
        assert!(est.angle() < 1e-6);
        let residual = RotationEstimator { focal: 500.0 }.residual(&est, &data[7]);
        assert!(residual < 1e-9);
    }
}
