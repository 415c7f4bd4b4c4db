//! Raster and vector renderings of a [`MatchLayout`].

use std::collections::BTreeMap;
use std::fmt::Write as _;

use image::{Rgb, RgbImage};
use nalgebra::Point2;
use pair_match_core::{AuxImage, ColorImage, FeatureMap};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::canvas::{CanvasPair, ViewCanvas};
use crate::layout::{Color, MatchLayout, MatchLine, UNMATCHED_FEATURE_COLOR};

const BACKGROUND: Rgb<u8> = Rgb([32, 32, 32]);
/// Weight of the image over its depth overlay.
const IMAGE_ALPHA: f32 = 200.0 / 255.0;

/// Everything drawn on one canvas.
#[derive(Clone, Copy, Debug)]
pub struct ViewLayer<'a> {
    pub image: &'a ColorImage,
    pub aux: Option<&'a AuxImage>,
    pub features: &'a FeatureMap,
}

fn rgb(c: Color) -> Rgb<u8> {
    Rgb([c.r, c.g, c.b])
}

/// Red for near, blue for far, over the valid depth range.
fn depth_color(z: f32, near: f32, far: f32) -> [f32; 3] {
    let t = if far > near { ((z - near) / (far - near)).clamp(0.0, 1.0) } else { 0.0 };
    [255.0 * (1.0 - t), 0.0, 255.0 * t]
}

struct Overlay<'a> {
    aux: &'a AuxImage,
    range: (f32, f32),
}

impl<'a> Overlay<'a> {
    fn new(aux: &'a AuxImage) -> Self {
        let range = match aux {
            AuxImage::Depth(d) => d
                .data
                .iter()
                .copied()
                .filter(|z| z.is_finite() && *z > 0.0)
                .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), z| (lo.min(z), hi.max(z))),
            AuxImage::Right(_) => (0.0, 255.0),
        };
        Self { aux, range }
    }

    /// Overlay colour at normalized image coordinates `(u, v)` in `[0, 1)`.
    fn sample(&self, u: f32, v: f32) -> Option<[f32; 3]> {
        let (w, h) = self.aux.size();
        if w == 0 || h == 0 {
            return None;
        }
        let x = ((u * w as f32) as usize).min(w - 1);
        let y = ((v * h as f32) as usize).min(h - 1);
        match self.aux {
            AuxImage::Depth(d) => d.depth(x, y).map(|z| depth_color(z, self.range.0, self.range.1)),
            AuxImage::Right(g) => {
                let p = g.get(x, y) as f32;
                Some([p, p, p])
            }
        }
    }
}

fn draw_line(img: &mut RgbImage, p1: (i32, i32), p2: (i32, i32), color: Rgb<u8>) {
    let (mut x0, mut y0) = p1;
    let (x1, y1) = p2;
    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };
    let mut err = dx + dy;
    loop {
        if x0 >= 0 && x0 < img.width() as i32 && y0 >= 0 && y0 < img.height() as i32 {
            img.put_pixel(x0 as u32, y0 as u32, color);
        }
        if x0 == x1 && y0 == y1 {
            break;
        }
        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x0 += sx;
        }
        if e2 <= dx {
            err += dx;
            y0 += sy;
        }
    }
}

/// Ring of radius `r` (one pixel thick).
fn draw_ring(img: &mut RgbImage, center: (i32, i32), radius: i32, color: Rgb<u8>) {
    let (cx, cy) = center;
    let outer = radius * radius;
    let inner = (radius - 1).max(0).pow(2);
    for y in (cy - radius)..=(cy + radius) {
        for x in (cx - radius)..=(cx + radius) {
            let d = (x - cx).pow(2) + (y - cy).pow(2);
            let inside = x >= 0 && x < img.width() as i32 && y >= 0 && y < img.height() as i32;
            if d <= outer && d >= inner && inside {
                img.put_pixel(x as u32, y as u32, color);
            }
        }
    }
}

fn to_canvas(p: Point2<f32>, scale: f32) -> (i32, i32) {
    ((p.x * scale).round() as i32, (p.y * scale).round() as i32)
}

/// Draw one view onto a box-sized canvas.
pub fn render_canvas(
    canvas: &ViewCanvas,
    box_size: (u32, u32),
    layer: &ViewLayer<'_>,
    lines: &[MatchLine],
    feature_colors: &BTreeMap<i32, Color>,
) -> RgbImage {
    let mut out = RgbImage::from_pixel(box_size.0, box_size.1, BACKGROUND);
    let (iw, ih) = (layer.image.width, layer.image.height);
    let overlay = layer.aux.map(Overlay::new);

    if iw > 0 && ih > 0 && canvas.scale > 0.0 {
        for (cx, cy, px) in out.enumerate_pixels_mut() {
            let x = cx as f32 / canvas.scale;
            let y = cy as f32 / canvas.scale;
            if x >= iw as f32 || y >= ih as f32 {
                continue;
            }
            let (xi, yi) = (x as usize, y as usize);
            let base = layer.image.pixel(xi, yi).map(|c| c as f32);
            let blended = match overlay
                .as_ref()
                .and_then(|o| o.sample(x / iw as f32, y / ih as f32))
            {
                Some(under) => {
                    std::array::from_fn(|k| IMAGE_ALPHA * base[k] + (1.0 - IMAGE_ALPHA) * under[k])
                }
                None => base,
            };
            *px = Rgb(blended.map(|c| c.round().clamp(0.0, 255.0) as u8));
        }
    }

    for line in lines {
        draw_line(
            &mut out,
            to_canvas(line.start, canvas.scale),
            to_canvas(line.end, canvas.scale),
            rgb(line.color),
        );
    }

    for f in layer.features.iter() {
        let color = feature_colors
            .get(&f.id)
            .copied()
            .unwrap_or(UNMATCHED_FEATURE_COLOR);
        let radius = ((f.size * 0.5 * canvas.scale).round() as i32).max(2);
        draw_ring(&mut out, to_canvas(f.center(), canvas.scale), radius, rgb(color));
    }
    out
}

/// Both canvases drawn independently and composited along the pair's
/// orientation.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(lines = layout.len()))
)]
pub fn render_matches(
    pair: &CanvasPair,
    a: &ViewLayer<'_>,
    b: &ViewLayer<'_>,
    layout: &MatchLayout,
) -> RgbImage {
    let canvas_a = render_canvas(&pair.a, pair.box_size, a, &layout.lines_a, &layout.feature_colors_a);
    let canvas_b = render_canvas(&pair.b, pair.box_size, b, &layout.lines_b, &layout.feature_colors_b);

    let (w, h) = pair.composite_size();
    let mut out = RgbImage::from_pixel(w, h, BACKGROUND);
    let origin = pair.frame_b().origin;
    let (ox, oy) = (origin.x.round() as u32, origin.y.round() as u32);
    for (x, y, px) in canvas_a.enumerate_pixels() {
        out.put_pixel(x, y, *px);
    }
    for (x, y, px) in canvas_b.enumerate_pixels() {
        if x + ox < w && y + oy < h {
            out.put_pixel(x + ox, y + oy, *px);
        }
    }
    out
}

struct SvgSide<'a> {
    id: &'a str,
    canvas: &'a ViewCanvas,
    offset: (f32, f32),
    features: &'a FeatureMap,
    lines: &'a [MatchLine],
    feature_colors: &'a BTreeMap<i32, Color>,
}

fn svg_canvas(svg: &mut String, box_size: (u32, u32), side: &SvgSide<'_>) -> std::fmt::Result {
    let (bw, bh) = box_size;
    let id = side.id;
    writeln!(svg, "<clipPath id=\"clip-{id}\"><rect x=\"0\" y=\"0\" width=\"{bw}\" height=\"{bh}\"/></clipPath>")?;
    writeln!(
        svg,
        "<g transform=\"translate({}, {})\" clip-path=\"url(#clip-{id})\">",
        side.offset.0, side.offset.1
    )?;
    writeln!(svg, "<rect x=\"0\" y=\"0\" width=\"{bw}\" height=\"{bh}\" fill=\"none\" stroke=\"#444\"/>")?;
    let s = side.canvas.scale;
    for line in side.lines {
        writeln!(
            svg,
            "<line x1=\"{:.2}\" y1=\"{:.2}\" x2=\"{:.2}\" y2=\"{:.2}\" stroke=\"{}\" stroke-width=\"1\"/>",
            line.start.x * s,
            line.start.y * s,
            line.end.x * s,
            line.end.y * s,
            line.color.to_hex()
        )?;
    }
    for f in side.features.iter() {
        let color = side
            .feature_colors
            .get(&f.id)
            .copied()
            .unwrap_or(UNMATCHED_FEATURE_COLOR);
        let c = f.center();
        writeln!(
            svg,
            "<circle cx=\"{:.2}\" cy=\"{:.2}\" r=\"{:.2}\" fill=\"none\" stroke=\"{}\"/>",
            c.x * s,
            c.y * s,
            (f.size * 0.5 * s).max(2.0),
            color.to_hex()
        )?;
    }
    writeln!(svg, "</g>")
}

fn write_svg(
    svg: &mut String,
    pair: &CanvasPair,
    features: (&FeatureMap, &FeatureMap),
    layout: &MatchLayout,
    title: &str,
    background: Option<&str>,
) -> std::fmt::Result {
    let (w, h) = pair.composite_size();
    let origin = pair.frame_b().origin;
    writeln!(
        svg,
        "<svg xmlns=\"http://www.w3.org/2000/svg\" viewBox=\"0 0 {w} {h}\" width=\"{w}\" height=\"{h}\">"
    )?;
    writeln!(svg, "<title>{}</title>", escape_xml(title))?;
    if let Some(href) = background {
        writeln!(
            svg,
            "<image href=\"{}\" x=\"0\" y=\"0\" width=\"{w}\" height=\"{h}\"/>",
            escape_xml(href)
        )?;
    }
    let sides = [
        SvgSide {
            id: "a",
            canvas: &pair.a,
            offset: (0.0, 0.0),
            features: features.0,
            lines: &layout.lines_a,
            feature_colors: &layout.feature_colors_a,
        },
        SvgSide {
            id: "b",
            canvas: &pair.b,
            offset: (origin.x, origin.y),
            features: features.1,
            lines: &layout.lines_b,
            feature_colors: &layout.feature_colors_b,
        },
    ];
    for side in &sides {
        svg_canvas(svg, pair.box_size, side)?;
    }
    writeln!(svg, "</svg>")
}

/// Vector version of [`render_matches`]; `background` is an optional image
/// href drawn under the lines (typically the PNG composite).
pub fn render_matches_svg(
    pair: &CanvasPair,
    features_a: &FeatureMap,
    features_b: &FeatureMap,
    layout: &MatchLayout,
    title: &str,
    background: Option<&str>,
) -> String {
    let mut svg = String::new();
    // Writing into a String cannot fail.
    let _ = write_svg(&mut svg, pair, (features_a, features_b), layout, title, background);
    svg
}

fn escape_xml(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}
