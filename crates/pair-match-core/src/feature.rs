use std::collections::BTreeMap;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// A keypoint with the id assigned by registration.
///
/// Ids `> 0` are matchable; the same positive id in both views of a pair
/// denotes a candidate correspondence.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Feature {
    pub id: i32,
    /// Keypoint position in source-image pixels.
    pub position: Point2<f32>,
    /// Diameter of the keypoint neighbourhood in pixels.
    pub size: f32,
    #[serde(default)]
    pub response: f32,
}

/// Axis-aligned bounding rectangle of a feature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FeatureRect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl FeatureRect {
    #[inline]
    pub fn center(&self) -> Point2<f32> {
        Point2::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

impl Feature {
    pub fn new(id: i32, position: Point2<f32>, size: f32) -> Self {
        Self {
            id,
            position,
            size,
            response: 0.0,
        }
    }

    pub fn bounding_box(&self) -> FeatureRect {
        let r = self.size / 2.0;
        FeatureRect {
            x: self.position.x - r,
            y: self.position.y - r,
            width: self.size,
            height: self.size,
        }
    }

    /// Centre of the bounding box, in source-image pixels.
    #[inline]
    pub fn center(&self) -> Point2<f32> {
        self.bounding_box().center()
    }

    #[inline]
    pub fn is_matchable(&self) -> bool {
        self.id > 0
    }
}

/// Ordered multimap from feature id to features of one view.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureMap {
    words: BTreeMap<i32, Vec<Feature>>,
    len: usize,
}

impl FeatureMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, feature: Feature) {
        self.words.entry(feature.id).or_default().push(feature);
        self.len += 1;
    }

    /// Total number of features, duplicates included.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn count(&self, id: i32) -> usize {
        self.words.get(&id).map_or(0, Vec::len)
    }

    /// The feature with this id if it occurs exactly once.
    pub fn unique(&self, id: i32) -> Option<&Feature> {
        match self.words.get(&id).map(Vec::as_slice) {
            Some([f]) => Some(f),
            _ => None,
        }
    }

    /// Distinct ids in ascending order.
    pub fn ids(&self) -> impl Iterator<Item = i32> + '_ {
        self.words.keys().copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Feature> {
        self.words.values().flatten()
    }
}

impl FromIterator<Feature> for FeatureMap {
    fn from_iter<I: IntoIterator<Item = Feature>>(iter: I) -> Self {
        let mut map = FeatureMap::new();
        for f in iter {
            map.insert(f);
        }
        map
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_matches_position() {
        let f = Feature::new(3, Point2::new(10.0, 20.0), 7.0);
        let rect = f.bounding_box();
        assert_eq!(rect.x, 6.5);
        assert_eq!(rect.y, 16.5);
        assert_eq!(f.center(), Point2::new(10.0, 20.0));
    }

    #[test]
    fn multimap_counts_duplicates() {
        let map: FeatureMap = [
            Feature::new(1, Point2::new(0.0, 0.0), 3.0),
            Feature::new(2, Point2::new(1.0, 0.0), 3.0),
            Feature::new(2, Point2::new(2.0, 0.0), 3.0),
            Feature::new(-1, Point2::new(3.0, 0.0), 3.0),
        ]
        .into_iter()
        .collect();
        assert_eq!(map.len(), 4);
        assert_eq!(map.count(2), 2);
        assert!(map.unique(2).is_none());
        assert!(map.unique(1).is_some());
        assert!(map.unique(7).is_none());
        assert_eq!(map.ids().collect::<Vec<_>>(), vec![-1, 1, 2]);
    }
}
