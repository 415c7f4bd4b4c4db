//! Match visualisation for two-view registration.
//!
//! The two images are stacked on a shared layout (side by side or one above
//! the other). [`layout_matches`] turns matched feature maps into line
//! segments expressed in each canvas' own pixel frame, so each canvas can
//! be drawn independently and still show lines continuing into its
//! neighbour. Renderers produce a PNG-ready raster, an SVG document and a
//! PLY point cloud of both observations.

mod canvas;
mod cloud;
mod error;
mod layout;
mod render;

use std::path::Path;

pub use canvas::{CanvasFrame, CanvasPair, StackOrientation, ViewCanvas};
pub use cloud::{point_cloud, save_ply, write_ply, PointCloud, FROM_CLOUD_COLOR, TO_CLOUD_COLOR};
pub use error::ViewError;
pub use layout::{
    color_for, correspondences, layout_lines, layout_matches, Color, Correspondence, MatchLayout,
    MatchLine, CANDIDATE_COLOR, CONFIRMED_MATCH_COLOR, UNMATCHED_FEATURE_COLOR,
};
pub use render::{render_canvas, render_matches, render_matches_svg, ViewLayer};

/// Long side of each canvas, in pixels.
pub const DEFAULT_CANVAS_SIZE: u32 = 640;

pub fn save_png(path: &Path, image: &image::RgbImage) -> Result<(), ViewError> {
    image.save(path).map_err(|source| ViewError::Encode {
        path: path.to_path_buf(),
        source,
    })
}

pub fn save_svg(path: &Path, svg: &str) -> Result<(), ViewError> {
    std::fs::write(path, svg).map_err(|source| ViewError::Write {
        path: path.to_path_buf(),
        source,
    })
}
