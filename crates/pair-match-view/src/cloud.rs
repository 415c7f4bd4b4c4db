//! Point clouds of the two observations for 3D inspection.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use nalgebra::{Isometry3, Point2, Point3};
use pair_match_core::Observation;

use crate::error::ViewError;
use crate::layout::{Color, CANDIDATE_COLOR, CONFIRMED_MATCH_COLOR};

/// Points in the camera frame of one observation, metres.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointCloud {
    pub points: Vec<Point3<f64>>,
}

impl PointCloud {
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn transformed(&self, pose: &Isometry3<f64>) -> Self {
        Self {
            points: self.points.iter().map(|p| pose.transform_point(p)).collect(),
        }
    }
}

/// Back-project every `decimation`-th pixel that has a valid depth.
///
/// Empty when the observation carries neither depth nor a usable right image.
pub fn point_cloud(observation: &Observation, decimation: usize) -> PointCloud {
    if !observation.has_aux() {
        return PointCloud::default();
    }
    let step = decimation.max(1);
    let gray = observation.gray();
    let mut points = Vec::new();
    for y in (0..gray.height).step_by(step) {
        for x in (0..gray.width).step_by(step) {
            if let Some(p) = observation.point3(Point2::new(x as f32, y as f32)) {
                points.push(p);
            }
        }
    }
    log::debug!(
        "observation {}: {} points (decimation {step})",
        observation.id(),
        points.len()
    );
    PointCloud { points }
}

/// Colour of the "from" cloud.
pub const FROM_CLOUD_COLOR: Color = CONFIRMED_MATCH_COLOR;
/// Colour of the "to" cloud.
pub const TO_CLOUD_COLOR: Color = CANDIDATE_COLOR;

/// ASCII PLY with the "from" cloud as-is and the "to" cloud moved into the
/// "from" frame by `transform`.
pub fn write_ply<W: Write>(
    mut out: W,
    from: &PointCloud,
    to: &PointCloud,
    transform: &Isometry3<f64>,
) -> std::io::Result<()> {
    writeln!(out, "ply")?;
    writeln!(out, "format ascii 1.0")?;
    writeln!(out, "element vertex {}", from.len() + to.len())?;
    for axis in ["x", "y", "z"] {
        writeln!(out, "property float {axis}")?;
    }
    for channel in ["red", "green", "blue"] {
        writeln!(out, "property uchar {channel}")?;
    }
    writeln!(out, "end_header")?;
    let moved = to.transformed(transform);
    for (cloud, color) in [(from, FROM_CLOUD_COLOR), (&moved, TO_CLOUD_COLOR)] {
        for p in &cloud.points {
            writeln!(
                out,
                "{:.6} {:.6} {:.6} {} {} {}",
                p.x, p.y, p.z, color.r, color.g, color.b
            )?;
        }
    }
    out.flush()
}

/// [`write_ply`] into a file.
pub fn save_ply(
    path: &Path,
    from: &PointCloud,
    to: &PointCloud,
    transform: &Isometry3<f64>,
) -> Result<(), ViewError> {
    let file = File::create(path).map_err(|source| ViewError::Write {
        path: path.to_path_buf(),
        source,
    })?;
    write_ply(BufWriter::new(file), from, to, transform).map_err(|source| ViewError::Write {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use pair_match_core::{
        fake_camera_model, AuxImage, Calibration, ColorImage, DepthImage, ObservationBuilder,
    };

    use super::*;

    fn observation(aux: bool) -> Observation {
        let builder = ObservationBuilder::new(Calibration::Mono(fake_camera_model(8, 6)));
        let image = ColorImage {
            width: 8,
            height: 6,
            data: vec![90; 8 * 6 * 3],
        };
        let mut mm = vec![2000u16; 48];
        mm[0] = 0;
        let depth = aux.then(|| AuxImage::Depth(DepthImage::from_millimeters(8, 6, &mm)));
        builder.build(1, image, depth)
    }

    #[test]
    fn cloud_skips_invalid_depth_and_decimates() {
        let full = point_cloud(&observation(true), 1);
        assert_eq!(full.len(), 47);
        assert!(full.points.iter().all(|p| (p.z - 2.0).abs() < 1e-9));

        let sparse = point_cloud(&observation(true), 2);
        assert_eq!(sparse.len(), 4 * 3 - 1);
    }

    #[test]
    fn no_depth_means_no_cloud() {
        assert!(point_cloud(&observation(false), 1).is_empty());
    }

    #[test]
    fn ply_colors_and_moves_clouds() {
        let from = PointCloud {
            points: vec![Point3::new(0.0, 0.0, 1.0)],
        };
        let to = PointCloud {
            points: vec![Point3::new(1.0, 2.0, 3.0)],
        };
        let t = Isometry3::translation(0.5, 0.0, 0.0);
        let mut buf = Vec::new();
        write_ply(&mut buf, &from, &to, &t).unwrap();
        let text = String::from_utf8(buf).unwrap();
        assert!(text.contains("element vertex 2"));
        let body: Vec<&str> = text.split("end_header\n").nth(1).unwrap().lines().collect();
        assert_eq!(body, ["0.000000 0.000000 1.000000 255 0 255", "1.500000 2.000000 3.000000 0 255 255"]);
    }
}
