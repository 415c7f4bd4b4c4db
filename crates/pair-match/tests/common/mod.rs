use std::path::{Path, PathBuf};

use image::{GrayImage, ImageBuffer, Luma, Rgb, RgbImage};

pub const W: u32 = 160;
pub const H: u32 = 120;

fn block_value(x: u32, y: u32, shift: u32) -> u8 {
    let (bx, by) = ((x + shift) / 6, y / 6);
    let mut n = bx.wrapping_mul(0x9e37_79b1) ^ by.wrapping_mul(0x85eb_ca6b);
    n ^= n >> 15;
    n = n.wrapping_mul(0x2c1b_3c6d);
    n ^= n >> 12;
    (n & 0xff) as u8
}

/// Random 6x6 gray blocks, shifted right by `shift` pixels.
pub fn write_blocks(dir: &Path, name: &str, shift: u32) -> PathBuf {
    let img = RgbImage::from_fn(W, H, |x, y| {
        let v = block_value(x, y, shift);
        Rgb([v, v, v])
    });
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

/// 8-bit single-channel right image.
pub fn write_right(dir: &Path, name: &str, disparity: u32) -> PathBuf {
    let img = GrayImage::from_fn(W, H, |x, y| Luma([block_value(x, y, disparity)]));
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

/// 16-bit depth in millimetres, stepped so the scene is not planar.
pub fn write_depth(dir: &Path, name: &str) -> PathBuf {
    let img: ImageBuffer<Luma<u16>, Vec<u16>> =
        ImageBuffer::from_fn(W, H, |x, y| Luma([1000 + 400 * ((x / 20 + y / 15) % 3) as u16]));
    let path = dir.join(name);
    img.save(&path).unwrap();
    path
}

pub fn write_mono_calibration(dir: &Path) -> PathBuf {
    let path = dir.join("mono.json");
    std::fs::write(
        &path,
        r#"{"fx": 120.0, "fy": 120.0, "cx": 80.0, "cy": 60.0, "image_size": [160, 120]}"#,
    )
    .unwrap();
    path
}

pub fn write_stereo_calibration(dir: &Path) -> PathBuf {
    let cam = r#"{"fx": 120.0, "fy": 120.0, "cx": 80.0, "cy": 60.0, "image_size": [160, 120]}"#;
    let path = dir.join("stereo.json");
    std::fs::write(
        &path,
        format!(r#"{{"left": {cam}, "right": {cam}, "baseline": 0.1}}"#),
    )
    .unwrap();
    path
}
