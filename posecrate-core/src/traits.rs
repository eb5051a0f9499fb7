//! Core traits for posecrate

use crate::point::Point3f;

/// Trait for nearest neighbor search functionality
///
/// Distances are squared Euclidean distances. Implementations never index
/// non-finite points, and a non-finite query yields no neighbors.
pub trait NearestNeighborSearch {
    /// Find the k nearest neighbors to a query point.
    ///
    /// Results are ordered by ascending squared distance; equal distances are
    /// ordered by ascending index.
    fn find_k_nearest(&self, query: &Point3f, k: usize) -> Vec<(usize, f32)>;

    /// Find all neighbors whose distance to the query is at most `radius`.
    ///
    /// Results are ordered by ascending index.
    fn find_radius_neighbors(&self, query: &Point3f, radius: f32) -> Vec<(usize, f32)>;
}
