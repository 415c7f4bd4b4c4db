//! Correspondence lines between the two views.
//!
//! Each view draws its own copy of every line: view A draws from its feature
//! to the partner feature projected into A's pixel space, view B the reverse.
//! Everything here is pure; the same inputs always give the same layout.

use std::collections::{BTreeMap, BTreeSet};

use nalgebra::Point2;
use pair_match_core::FeatureMap;
use serde::{Deserialize, Serialize};

use crate::canvas::{CanvasFrame, CanvasPair};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

/// Lines and markers of correspondences the estimate agrees with.
pub const CONFIRMED_MATCH_COLOR: Color = Color::rgb(255, 0, 255);
/// Lines and markers of the other correspondences.
pub const CANDIDATE_COLOR: Color = Color::rgb(0, 255, 255);
/// Markers of features without a correspondence.
pub const UNMATCHED_FEATURE_COLOR: Color = Color::rgb(255, 255, 0);

/// A feature id present exactly once in both views.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Correspondence {
    pub id: i32,
    /// Feature centre in A's pixels.
    pub a: Point2<f32>,
    /// Feature centre in B's pixels.
    pub b: Point2<f32>,
    pub inlier: bool,
}

/// Ids `> 0` occurring exactly once in both maps, in ascending order.
pub fn correspondences(a: &FeatureMap, b: &FeatureMap, inliers: &BTreeSet<i32>) -> Vec<Correspondence> {
    a.ids()
        .filter(|&id| id > 0)
        .filter_map(|id| {
            let fa = a.unique(id)?;
            let fb = b.unique(id)?;
            Some(Correspondence {
                id,
                a: fa.center(),
                b: fb.center(),
                inlier: inliers.contains(&id),
            })
        })
        .collect()
}

/// A segment in the pixel space of the view that draws it.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MatchLine {
    pub id: i32,
    pub start: Point2<f32>,
    pub end: Point2<f32>,
    pub color: Color,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchLayout {
    pub lines_a: Vec<MatchLine>,
    pub lines_b: Vec<MatchLine>,
    /// Marker colour of every corresponding feature, per view.
    pub feature_colors_a: BTreeMap<i32, Color>,
    pub feature_colors_b: BTreeMap<i32, Color>,
}

impl MatchLayout {
    pub fn len(&self) -> usize {
        self.lines_a.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines_a.is_empty()
    }
}

pub fn color_for(inlier: bool) -> Color {
    if inlier {
        CONFIRMED_MATCH_COLOR
    } else {
        CANDIDATE_COLOR
    }
}

/// Lay out one line per correspondence in each view.
pub fn layout_lines(pair: &CanvasPair, correspondences: &[Correspondence]) -> MatchLayout {
    let frame_a = pair.frame_a();
    let frame_b = pair.frame_b();
    let mut layout = MatchLayout::default();
    for c in correspondences {
        let color = color_for(c.inlier);
        layout.lines_a.push(MatchLine {
            id: c.id,
            start: c.a,
            end: CanvasFrame::map_point(c.b, &frame_b, &frame_a),
            color,
        });
        layout.lines_b.push(MatchLine {
            id: c.id,
            start: CanvasFrame::map_point(c.a, &frame_a, &frame_b),
            end: c.b,
            color,
        });
        layout.feature_colors_a.insert(c.id, color);
        layout.feature_colors_b.insert(c.id, color);
    }
    layout
}

/// [`correspondences`] followed by [`layout_lines`].
pub fn layout_matches(
    pair: &CanvasPair,
    features_a: &FeatureMap,
    features_b: &FeatureMap,
    inliers: &BTreeSet<i32>,
) -> MatchLayout {
    layout_lines(pair, &correspondences(features_a, features_b, inliers))
}
