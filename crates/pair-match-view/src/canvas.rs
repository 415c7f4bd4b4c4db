//! Geometry of the two side-by-side (or stacked) views.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// How the two canvases are stacked in the composite.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum StackOrientation {
    /// "from" on the left, "to" on the right.
    Horizontal,
    /// "from" on top, "to" below.
    Vertical,
}

impl StackOrientation {
    /// Landscape images are stacked vertically, others side by side.
    pub fn for_image(width: usize, height: usize) -> Self {
        if width > height {
            StackOrientation::Vertical
        } else {
            StackOrientation::Horizontal
        }
    }
}

/// Maps image pixels of one view into the shared layout space:
/// `layout = pixel * scale + origin`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasFrame {
    pub scale: f32,
    pub origin: Vector2<f32>,
}

impl CanvasFrame {
    pub fn new(scale: f32, origin: Vector2<f32>) -> Self {
        Self { scale, origin }
    }

    pub fn to_layout(&self, p: Point2<f32>) -> Point2<f32> {
        p * self.scale + self.origin
    }

    pub fn from_layout(&self, p: Point2<f32>) -> Point2<f32> {
        (p - self.origin) / self.scale
    }

    /// Pixel `p` of the view behind `from`, expressed in pixels of the view
    /// behind `to`.
    pub fn map_point(p: Point2<f32>, from: &CanvasFrame, to: &CanvasFrame) -> Point2<f32> {
        to.from_layout(from.to_layout(p))
    }
}

/// One view: the source image size and its zoom onto the canvas.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewCanvas {
    pub image_size: (usize, usize),
    /// Canvas pixels per image pixel.
    pub scale: f32,
}

/// Two canvases of equal box size laid out along `orientation`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasPair {
    pub orientation: StackOrientation,
    /// Size of each canvas box in layout pixels.
    pub box_size: (u32, u32),
    pub a: ViewCanvas,
    pub b: ViewCanvas,
}

fn fit_scale(image: (usize, usize), box_size: (u32, u32)) -> f32 {
    if image.0 == 0 || image.1 == 0 {
        return 1.0;
    }
    let sx = box_size.0 as f32 / image.0 as f32;
    let sy = box_size.1 as f32 / image.1 as f32;
    sx.min(sy)
}

impl CanvasPair {
    /// Size both boxes from the "from" image: its long side along the free
    /// axis spans `long_side` pixels.
    pub fn fit(
        image_a: (usize, usize),
        image_b: (usize, usize),
        orientation: StackOrientation,
        long_side: u32,
    ) -> Self {
        let (w, h) = (image_a.0.max(1) as f32, image_a.1.max(1) as f32);
        let long = long_side as f32;
        let box_size = match orientation {
            StackOrientation::Vertical => (long_side, (long * h / w).round().max(1.0) as u32),
            StackOrientation::Horizontal => ((long * w / h).round().max(1.0) as u32, long_side),
        };
        Self {
            orientation,
            box_size,
            a: ViewCanvas {
                image_size: image_a,
                scale: fit_scale(image_a, box_size),
            },
            b: ViewCanvas {
                image_size: image_b,
                scale: fit_scale(image_b, box_size),
            },
        }
    }

    /// Extent of canvas A along the stack axis.
    pub fn stack_extent(&self) -> f32 {
        match self.orientation {
            StackOrientation::Vertical => self.box_size.1 as f32,
            StackOrientation::Horizontal => self.box_size.0 as f32,
        }
    }

    pub fn frame_a(&self) -> CanvasFrame {
        CanvasFrame::new(self.a.scale, Vector2::zeros())
    }

    pub fn frame_b(&self) -> CanvasFrame {
        let extent = self.stack_extent();
        let origin = match self.orientation {
            StackOrientation::Vertical => Vector2::new(0.0, extent),
            StackOrientation::Horizontal => Vector2::new(extent, 0.0),
        };
        CanvasFrame::new(self.b.scale, origin)
    }

    /// `scaleA / scaleB`.
    pub fn scale_diff(&self) -> f32 {
        self.a.scale / self.b.scale
    }

    /// Size of the composite holding both boxes.
    pub fn composite_size(&self) -> (u32, u32) {
        let (w, h) = self.box_size;
        match self.orientation {
            StackOrientation::Vertical => (w, 2 * h),
            StackOrientation::Horizontal => (2 * w, h),
        }
    }
}
