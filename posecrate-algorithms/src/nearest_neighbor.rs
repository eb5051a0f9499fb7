//! Nearest neighbor search implementations

use posecrate_core::{is_finite_point, NearestNeighborSearch, Point3f, PointCloud};
use rstar::{PointDistance, RTree, RTreeObject, AABB};

/// A finite point stored in the tree together with its index in the source cloud
#[derive(Debug, Clone, Copy)]
struct IndexedPoint {
    coords: [f32; 3],
    index: usize,
}

impl RTreeObject for IndexedPoint {
    type Envelope = AABB<[f32; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.coords)
    }
}

impl PointDistance for IndexedPoint {
    fn distance_2(&self, point: &[f32; 3]) -> f32 {
        squared_distance(&self.coords, point)
    }
}

#[inline]
fn squared_distance(a: &[f32; 3], b: &[f32; 3]) -> f32 {
    let dx = a[0] - b[0];
    let dy = a[1] - b[1];
    let dz = a[2] - b[2];
    dx * dx + dy * dy + dz * dz
}

#[inline]
fn to_coords(point: &Point3f) -> [f32; 3] {
    [point.x, point.y, point.z]
}

/// Order neighbors by squared distance, then by index
fn sort_by_distance(neighbors: &mut [(usize, f32)]) {
    neighbors.sort_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));
}

/// Spatial index over a dense cloud, backed by a bulk-loaded R*-tree.
///
/// Built once per cloud and shared read-only by every stage that needs
/// neighborhoods. Non-finite points are left out of the tree, but indices
/// always refer to positions in the original cloud.
pub struct SpatialIndex {
    tree: RTree<IndexedPoint>,
}

impl SpatialIndex {
    pub fn new(points: &[Point3f]) -> Self {
        let entries: Vec<IndexedPoint> = points
            .iter()
            .enumerate()
            .filter(|(_, p)| is_finite_point(p))
            .map(|(index, p)| IndexedPoint {
                coords: to_coords(p),
                index,
            })
            .collect();

        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn from_cloud(cloud: &PointCloud<Point3f>) -> Self {
        Self::new(&cloud.points)
    }

    /// Number of indexed (finite) points
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }
}

impl NearestNeighborSearch for SpatialIndex {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        if k == 0 || !is_finite_point(query) {
            return Vec::new();
        }

        // Keep collecting past the k-th neighbor while distances tie with it,
        // so the index tie-break does not depend on the tree layout.
        let mut neighbors = Vec::with_capacity(k);
        let mut cutoff = None;
        for (entry, distance) in self.tree.nearest_neighbor_iter_with_distance_2(&to_coords(query)) {
            if let Some(limit) = cutoff {
                if distance > limit {
                    break;
                }
            }
            neighbors.push((entry.index, distance));
            if neighbors.len() == k {
                cutoff = Some(distance);
            }
        }

        sort_by_distance(&mut neighbors);
        neighbors.truncate(k);
        neighbors
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        if !is_finite_point(query) || !(radius >= 0.0) {
            return Vec::new();
        }

        let coords = to_coords(query);
        let radius_squared = radius * radius;
        let mut neighbors: Vec<(usize, f32)> = self
            .tree
            .locate_within_distance(coords, radius_squared)
            .map(|entry| (entry.index, squared_distance(&entry.coords, &coords)))
            .filter(|(_, distance)| *distance <= radius_squared)
            .collect();

        neighbors.sort_unstable_by_key(|(index, _)| *index);
        neighbors
    }
}

/// Simple brute force nearest neighbor search for small datasets
///
/// Follows the same contract as [`SpatialIndex`]; mostly useful as a
/// reference when validating the tree.
pub struct BruteForceSearch {
    points: Vec<(usize, [f32; 3])>,
}

impl BruteForceSearch {
    pub fn new(points: &[Point3f]) -> Self {
        Self {
            points: points
                .iter()
                .enumerate()
                .filter(|(_, p)| is_finite_point(p))
                .map(|(index, p)| (index, to_coords(p)))
                .collect(),
        }
    }
}

impl NearestNeighborSearch for BruteForceSearch {
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)> {
        if k == 0 || !is_finite_point(query) {
            return Vec::new();
        }

        let coords = to_coords(query);
        let mut distances: Vec<(usize, f32)> = self
            .points
            .iter()
            .map(|(index, point)| (*index, squared_distance(point, &coords)))
            .collect();

        sort_by_distance(&mut distances);
        distances.truncate(k);
        distances
    }

    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)> {
        if !is_finite_point(query) || !(radius >= 0.0) {
            return Vec::new();
        }

        let coords = to_coords(query);
        let radius_squared = radius * radius;
        self.points
            .iter()
            .filter_map(|(index, point)| {
                let distance_squared = squared_distance(point, &coords);
                (distance_squared <= radius_squared).then_some((*index, distance_squared))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn random_points(count: usize, seed: u64) -> Vec<Point3f> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| Point3f::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0)))
            .collect()
    }

    #[test]
    fn test_self_match() {
        let points = random_points(500, 7);
        let index = SpatialIndex::new(&points);

        for (i, point) in points.iter().enumerate() {
            let nearest = index.find_k_nearest(point, 1);
            assert_eq!(nearest.len(), 1);
            assert_eq!(nearest[0].0, i);
            assert_eq!(nearest[0].1, 0.0);
        }
    }

    #[test]
    fn test_matches_brute_force() {
        let points = random_points(400, 11);
        let index = SpatialIndex::new(&points);
        let oracle = BruteForceSearch::new(&points);

        for query in random_points(50, 12) {
            assert_eq!(index.find_k_nearest(&query, 8), oracle.find_k_nearest(&query, 8));
            assert_eq!(
                index.find_radius_neighbors(&query, 0.3),
                oracle.find_radius_neighbors(&query, 0.3)
            );
        }
    }

    #[test]
    fn test_k_larger_than_cloud() {
        let points = random_points(5, 3);
        let index = SpatialIndex::new(&points);
        let neighbors = index.find_k_nearest(&Point3f::origin(), 10);
        assert_eq!(neighbors.len(), 5);
        assert!(neighbors.windows(2).all(|w| w[0].1 <= w[1].1));
    }

    #[test]
    fn test_non_finite_points_are_skipped() {
        let points = vec![
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(f32::NAN, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
        ];
        let index = SpatialIndex::new(&points);
        assert_eq!(index.len(), 2);

        let neighbors = index.find_k_nearest(&Point3f::new(0.1, 0.0, 0.0), 3);
        assert_eq!(neighbors.iter().map(|n| n.0).collect::<Vec<_>>(), vec![0, 2]);

        assert!(index.find_k_nearest(&Point3f::new(f32::NAN, 0.0, 0.0), 1).is_empty());
        assert!(index.find_radius_neighbors(&Point3f::new(0.0, f32::INFINITY, 0.0), 1.0).is_empty());
    }

    #[test]
    fn test_ties_break_by_index() {
        let points = vec![
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(-1.0, 0.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
            Point3f::new(0.0, -1.0, 0.0),
        ];
        let index = SpatialIndex::new(&points);
        let neighbors = index.find_k_nearest(&Point3f::origin(), 2);
        assert_eq!(neighbors, vec![(0, 1.0), (1, 1.0)]);
    }

    #[test]
    fn test_radius_search_is_inclusive_and_sorted() {
        let points = vec![
            Point3f::new(0.5, 0.0, 0.0),
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(2.0, 0.0, 0.0),
        ];
        let index = SpatialIndex::new(&points);
        let neighbors = index.find_radius_neighbors(&Point3f::origin(), 0.5);
        assert_eq!(neighbors, vec![(0, 0.25), (1, 0.0)]);
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::new(&[]);
        assert!(index.is_empty());
        assert!(index.find_k_nearest(&Point3f::origin(), 3).is_empty());
        assert!(index.find_radius_neighbors(&Point3f::origin(), 1.0).is_empty());
    }
}
