use geo::Relate;

use crate::errors::Result;
use crate::vector::engine::{GeoEngine, GeometryEngine};
use crate::vector::Geometry;

/// # Geometric Predicates
///
/// These methods provide common [spatial relations](https://en.wikipedia.org/wiki/DE-9IM#Spatial_predicates) between
/// two geometries, evaluated with [`GeoEngine`].
///
/// Curves and TINs are linearized or split first, and `Z`/`M` are ignored.
impl Geometry {
    /// Tests if two geometries [_intersect_][DE-9IM];
    /// `self` and `other` have at least one point in common.
    ///
    /// [DE-9IM]: https://en.wikipedia.org/wiki/DE-9IM#Spatial_predicates
    pub fn intersects(&self, other: &Self) -> Result<bool> {
        GeoEngine.intersects(self, other)
    }

    /// Tests if this geometry [_contains_][DE-9IM] the other geometry;
    /// `other` lies in `self`, and the interiors intersect.
    ///
    /// [DE-9IM]: https://en.wikipedia.org/wiki/DE-9IM#Spatial_predicates
    pub fn contains(&self, other: &Self) -> Result<bool> {
        GeoEngine.contains(self, other)
    }

    /// Tests if this geometry and the other geometry are [_disjoint_][DE-9IM].
    ///
    /// [DE-9IM]: https://en.wikipedia.org/wiki/DE-9IM#Spatial_predicates
    pub fn disjoint(&self, other: &Self) -> Result<bool> {
        Ok(!self.intersects(other)?)
    }

    /// Tests if this geometry and the other geometry are [_touching_][DE-9IM];
    /// they have at least one point in common, but their interiors do not intersect.
    ///
    /// [DE-9IM]: https://en.wikipedia.org/wiki/DE-9IM#Spatial_predicates
    pub fn touches(&self, other: &Self) -> Result<bool> {
        Ok(self.to_geo()?.relate(&other.to_geo()?).is_touches())
    }

    /// Tests if this geometry and the other geometry are [_crossing_][DE-9IM].
    ///
    /// [DE-9IM]: https://en.wikipedia.org/wiki/DE-9IM#Spatial_predicates
    pub fn crosses(&self, other: &Self) -> Result<bool> {
        Ok(self.to_geo()?.relate(&other.to_geo()?).is_crosses())
    }

    /// Tests if this geometry is [_within_][DE-9IM] the other.
    ///
    /// [DE-9IM]: https://en.wikipedia.org/wiki/DE-9IM#Spatial_predicates
    pub fn within(&self, other: &Self) -> Result<bool> {
        Ok(self.to_geo()?.relate(&other.to_geo()?).is_within())
    }

    /// Tests if this geometry and the other [_overlap_][DE-9IM].
    ///
    /// [DE-9IM]: https://en.wikipedia.org/wiki/DE-9IM#Spatial_predicates
    pub fn overlaps(&self, other: &Self) -> Result<bool> {
        Ok(self.to_geo()?.relate(&other.to_geo()?).is_overlaps())
    }
}
