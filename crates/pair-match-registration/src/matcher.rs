//! Descriptor correspondence strategies.
//!
//! Every strategy returns at most one correspondence per feature on either
//! side; when several "from" features land on the same "to" feature the
//! closest one wins.

use std::collections::BTreeMap;

use kiddo::{KdTree, SquaredEuclidean};

use crate::descriptor::{Described, DESCRIPTOR_BITS};
use crate::params::MatchingStrategy;

/// A putative correspondence between `from[from_idx]` and `to[to_idx]`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Match {
    pub from_idx: usize,
    pub to_idx: usize,
    /// Hamming distance between the descriptors.
    pub distance: f32,
}

/// A pluggable matcher, e.g. a learned one.
pub trait DescriptorMatcher: Send + Sync {
    fn name(&self) -> &str;

    fn match_descriptors(&self, from: &[Described], to: &[Described]) -> Vec<Match>;
}

/// Best and second-best distances from `query` over `candidates`.
fn two_nearest(query: &Described, candidates: &[Described]) -> Option<(usize, u32, Option<u32>)> {
    let mut best: Option<(usize, u32)> = None;
    let mut second: Option<u32> = None;
    for (j, c) in candidates.iter().enumerate() {
        let d = query.descriptor.hamming(&c.descriptor);
        match best {
            Some((_, bd)) if d >= bd => {
                if second.is_none_or(|s| d < s) {
                    second = Some(d);
                }
            }
            _ => {
                second = best.map(|(_, bd)| bd);
                best = Some((j, d));
            }
        }
    }
    best.map(|(j, d)| (j, d, second))
}

fn passes_ratio(best: f32, second: Option<f32>, ratio: f32) -> bool {
    match second {
        Some(s) => best < ratio * s,
        // A single candidate has nothing to be ambiguous with.
        None => true,
    }
}

pub fn brute_force_ratio(from: &[Described], to: &[Described], ratio: f32) -> Vec<Match> {
    let raw = from
        .iter()
        .enumerate()
        .filter_map(|(i, q)| {
            let (j, best, second) = two_nearest(q, to)?;
            passes_ratio(best as f32, second.map(|s| s as f32), ratio).then_some(Match {
                from_idx: i,
                to_idx: j,
                distance: best as f32,
            })
        })
        .collect();
    unique_targets(raw)
}

/// Ratio matching through a kd-tree over bit-expanded descriptors.
///
/// Indexed points get a distinct offset below 2^-10 on every axis so no two
/// share a coordinate, which kd-tree bucket splitting requires.
pub fn kdtree_ratio(from: &[Described], to: &[Described], ratio: f32) -> Vec<Match> {
    if to.is_empty() {
        return Vec::new();
    }
    let mut tree: KdTree<f32, DESCRIPTOR_BITS> = KdTree::with_capacity(to.len());
    for (j, d) in to.iter().enumerate() {
        let offset = (j + 1) as f32 / 1_048_576.0;
        let mut point = d.descriptor.expand();
        point.iter_mut().for_each(|v| *v += offset);
        tree.add(&point, j as u64);
    }

    let raw = from
        .iter()
        .enumerate()
        .filter_map(|(i, q)| {
            let nn = tree.nearest_n::<SquaredEuclidean>(&q.descriptor.expand(), 2);
            let first = nn.first()?;
            let best = first.distance.round();
            let second = nn.get(1).map(|n| n.distance.round());
            passes_ratio(best, second, ratio).then_some(Match {
                from_idx: i,
                to_idx: first.item as usize,
                distance: best,
            })
        })
        .collect();
    unique_targets(raw)
}

/// Mutual nearest neighbours.
pub fn cross_check(from: &[Described], to: &[Described]) -> Vec<Match> {
    let backward: Vec<Option<usize>> = to
        .iter()
        .map(|q| two_nearest(q, from).map(|(i, _, _)| i))
        .collect();
    from.iter()
        .enumerate()
        .filter_map(|(i, q)| {
            let (j, best, _) = two_nearest(q, to)?;
            (backward[j] == Some(i)).then_some(Match {
                from_idx: i,
                to_idx: j,
                distance: best as f32,
            })
        })
        .collect()
}

/// Keep the closest correspondence for every "to" feature.
fn unique_targets(matches: Vec<Match>) -> Vec<Match> {
    let mut best: BTreeMap<usize, Match> = BTreeMap::new();
    for m in matches {
        best.entry(m.to_idx)
            .and_modify(|kept| {
                if m.distance < kept.distance {
                    *kept = m;
                }
            })
            .or_insert(m);
    }
    let mut out: Vec<Match> = best.into_values().collect();
    out.sort_by_key(|m| m.from_idx);
    out
}

/// Run the built-in strategies; `Learned` has no built-in and yields `None`.
pub fn match_with(
    strategy: MatchingStrategy,
    from: &[Described],
    to: &[Described],
    ratio: f32,
) -> Option<Vec<Match>> {
    match strategy {
        MatchingStrategy::BruteForce => Some(brute_force_ratio(from, to, ratio)),
        MatchingStrategy::KdTree => Some(kdtree_ratio(from, to, ratio)),
        MatchingStrategy::CrossCheck => Some(cross_check(from, to)),
        MatchingStrategy::Learned => None,
    }
}
