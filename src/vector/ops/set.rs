use crate::errors::Result;
use crate::vector::engine::{GeoEngine, GeometryEngine};
use crate::vector::Geometry;

/// # Set Operations
///
/// These methods provide set operations over two geometries, producing a new geometry,
/// computed with [`GeoEngine`]. Results are 2D.
impl Geometry {
    /// Compute intersection.
    ///
    /// Generates a new geometry which is the region of intersection of
    /// the two geometries operated on. Disjoint inputs produce an empty
    /// geometry.
    pub fn intersection(&self, other: &Self) -> Result<Self> {
        GeoEngine.intersection(self, other)
    }

    pub fn union(&self, other: &Self) -> Result<Self> {
        GeoEngine.union(self, other)
    }

    /// The part of `self` not covered by `other`.
    pub fn difference(&self, other: &Self) -> Result<Self> {
        GeoEngine.difference(self, other)
    }

    /// The parts of either geometry not covered by the other.
    pub fn sym_difference(&self, other: &Self) -> Result<Self> {
        let left = GeoEngine.difference(self, other)?;
        let right = GeoEngine.difference(other, self)?;
        GeoEngine.union(&left, &right)
    }
}
