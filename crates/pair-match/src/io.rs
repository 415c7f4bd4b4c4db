//! Decoding inputs into the core image containers.

use std::path::Path;

use image::{DynamicImage, ImageReader};
use pair_match_core::{AuxImage, ColorImage, DepthImage, GrayImage};

fn open(path: &Path) -> Result<DynamicImage, image::ImageError> {
    ImageReader::open(path)?.with_guessed_format()?.decode()
}

pub fn color_from_dynamic(img: &DynamicImage) -> ColorImage {
    let rgb = img.to_rgb8();
    ColorImage {
        width: rgb.width() as usize,
        height: rgb.height() as usize,
        data: rgb.into_raw(),
    }
}

/// Classify a depth-or-right image by its pixel format.
///
/// 8-bit inputs become a right image (three-channel inputs are converted to
/// gray first); anything wider is a depth map in millimetres.
pub fn aux_from_dynamic(img: &DynamicImage) -> AuxImage {
    let (w, h) = (img.width() as usize, img.height() as usize);
    match img {
        DynamicImage::ImageLuma8(_) | DynamicImage::ImageLumaA8(_) => {
            let gray = img.to_luma8();
            AuxImage::Right(GrayImage {
                width: w,
                height: h,
                data: gray.into_raw(),
            })
        }
        DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => {
            AuxImage::from_color(&color_from_dynamic(img))
        }
        DynamicImage::ImageRgb32F(_) | DynamicImage::ImageRgba32F(_) => {
            // Float depth is stored in metres.
            let data = img.to_rgb32f().pixels().map(|p| p.0[0]).collect();
            AuxImage::Depth(DepthImage {
                width: w,
                height: h,
                data,
            })
        }
        _ => {
            let raw = img.to_luma16().into_raw();
            AuxImage::Depth(DepthImage::from_millimeters(w, h, &raw))
        }
    }
}

pub fn load_color(path: &Path) -> Result<ColorImage, image::ImageError> {
    let img = open(path)?;
    log::debug!("loaded {} ({}x{}, {:?})", path.display(), img.width(), img.height(), img.color());
    Ok(color_from_dynamic(&img))
}

pub fn load_aux(path: &Path) -> Result<AuxImage, image::ImageError> {
    let img = open(path)?;
    let aux = aux_from_dynamic(&img);
    log::debug!("loaded {} as {:?} ({:?})", path.display(), aux.format(), img.color());
    Ok(aux)
}
