//! KD-tree point index for radius and nearest-neighbour queries.
//!
//! The topology stages repeatedly ask "which known points lie within N metres
//! of here?": node merging, edge endpoint resolution and gap bridging. The
//! index stores planar lng/lat coordinates in a `kiddo` KD-tree (k=2) and
//! returns caller-supplied keys. Radius queries are widened in degree space
//! and then confirmed with a haversine check, so results honour a metric
//! tolerance at any latitude.

use kiddo::float::kdtree::KdTree;
use kiddo::SquaredEuclidean;
use tracing::debug;

use crate::geometry::{search_radius_degrees, TrailPoint};

/// KD-tree bucket size (kiddo default).
const BUCKET_SIZE: usize = 32;

/// Point index keyed by a caller-defined identifier.
pub struct PointIndex<K> {
    tree: KdTree<f64, usize, 2, BUCKET_SIZE, u32>,
    entries: Vec<(K, TrailPoint)>,
}

impl<K: Clone> PointIndex<K> {
    pub fn new() -> Self {
        Self {
            tree: KdTree::new(),
            entries: Vec::new(),
        }
    }

    /// Build an index from `(key, point)` pairs.
    pub fn build(items: impl IntoIterator<Item = (K, TrailPoint)>) -> Self {
        let mut index = Self::new();
        for (key, point) in items {
            index.insert(key, point);
        }
        debug!(points = index.len(), "built point index");
        index
    }

    pub fn insert(&mut self, key: K, point: TrailPoint) {
        let slot = self.entries.len();
        self.tree.add(&[point.lng, point.lat], slot);
        self.entries.push((key, point));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All entries within `meters` of `point`, nearest first.
    ///
    /// Returns `(key, point, distance_m)` triples.
    pub fn within_meters(&self, point: &TrailPoint, meters: f64) -> Vec<(K, TrailPoint, f64)> {
        if meters < 0.0 || self.entries.is_empty() {
            return Vec::new();
        }

        let radius = search_radius_degrees(meters, point.lat);
        // Exact hits must survive a zero tolerance.
        let squared_radius = (radius * radius).max(f64::EPSILON);
        let candidates = self
            .tree
            .within::<SquaredEuclidean>(&[point.lng, point.lat], squared_radius);

        let mut results: Vec<(K, TrailPoint, f64)> = candidates
            .into_iter()
            .filter_map(|neighbour| {
                let (key, stored) = &self.entries[neighbour.item];
                let distance = point.haversine_m(stored);
                (distance <= meters).then(|| (key.clone(), *stored, distance))
            })
            .collect();

        results.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(std::cmp::Ordering::Equal));
        results
    }

    /// Nearest entry within `meters` that satisfies `accept`.
    pub fn nearest_matching<F>(
        &self,
        point: &TrailPoint,
        meters: f64,
        mut accept: F,
    ) -> Option<(K, TrailPoint, f64)>
    where
        F: FnMut(&K) -> bool,
    {
        self.within_meters(point, meters)
            .into_iter()
            .find(|(key, _, _)| accept(key))
    }
}

impl<K: Clone> Default for PointIndex<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> std::fmt::Debug for PointIndex<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointIndex")
            .field("point_count", &self.entries.len())
            .finish()
    }
}
