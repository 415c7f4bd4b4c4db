//! Lightweight image containers.
//!
//! Codecs live in the facade crate; everything here is plain row-major data.

#[derive(Clone, Copy, Debug)]
pub struct GrayImageView<'a> {
    pub width: usize,
    pub height: usize,
    pub data: &'a [u8], // row-major, len = w*h
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GrayImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl GrayImage {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![0; width * height],
        }
    }

    #[inline]
    pub fn view(&self) -> GrayImageView<'_> {
        GrayImageView {
            width: self.width,
            height: self.height,
            data: &self.data,
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// 8-bit RGB image, row-major, three bytes per pixel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<u8>,
}

impl ColorImage {
    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> [u8; 3] {
        let i = 3 * (y * self.width + x);
        [self.data[i], self.data[i + 1], self.data[i + 2]]
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Luma conversion with the ITU-R BT.601 weights.
    pub fn to_gray(&self) -> GrayImage {
        let data = self
            .data
            .chunks_exact(3)
            .map(|px| {
                let l = 0.299 * px[0] as f32 + 0.587 * px[1] as f32 + 0.114 * px[2] as f32;
                l.round().clamp(0.0, 255.0) as u8
            })
            .collect();
        GrayImage {
            width: self.width,
            height: self.height,
            data,
        }
    }
}

impl From<&GrayImage> for ColorImage {
    fn from(gray: &GrayImage) -> Self {
        let data = gray.data.iter().flat_map(|&v| [v, v, v]).collect();
        Self {
            width: gray.width,
            height: gray.height,
            data,
        }
    }
}

/// Metric depth map in metres. Zero or non-finite values are invalid.
#[derive(Clone, Debug, PartialEq)]
pub struct DepthImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl DepthImage {
    /// Build from a 16-bit millimetre depth buffer (the usual RGB-D format).
    pub fn from_millimeters(width: usize, height: usize, mm: &[u16]) -> Self {
        Self {
            width,
            height,
            data: mm.iter().map(|&d| d as f32 / 1000.0).collect(),
        }
    }

    #[inline]
    pub fn depth(&self, x: usize, y: usize) -> Option<f32> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let d = self.data[y * self.width + x];
        (d.is_finite() && d > 0.0).then_some(d)
    }
}

/// Pixel format of a depth-or-right input, after normalization.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuxFormat {
    /// Single 8-bit channel: right image of a rectified stereo pair.
    Gray8,
    /// Anything else: a depth map.
    Depth,
}

/// Optional second image attached to an observation.
#[derive(Clone, Debug, PartialEq)]
pub enum AuxImage {
    Right(GrayImage),
    Depth(DepthImage),
}

impl AuxImage {
    /// Three-channel input is reduced to a single gray channel before its
    /// format is inspected, which makes it a stereo right image.
    pub fn from_color(color: &ColorImage) -> Self {
        AuxImage::Right(color.to_gray())
    }

    pub fn format(&self) -> AuxFormat {
        match self {
            AuxImage::Right(_) => AuxFormat::Gray8,
            AuxImage::Depth(_) => AuxFormat::Depth,
        }
    }

    pub fn size(&self) -> (usize, usize) {
        match self {
            AuxImage::Right(img) => (img.width, img.height),
            AuxImage::Depth(img) => (img.width, img.height),
        }
    }
}
