//! Exact geometry kernel used by spatial filters and overlay operations.

use std::fmt::Debug;

use geo::algorithm::line_intersection::{line_intersection, LineIntersection};
use geo::{BooleanOps, Intersects, PreparedGeometry, Relate};
use geo_types::{Line, LineString, MultiLineString, MultiPolygon, Point, Polygon};

use crate::errors::Result;
use crate::vector::geometry::Shape;
use crate::vector::geometry_type::wkb_flatten;
use crate::vector::{Geometry, OGRwkbGeometryType};

/// Predicates evaluated repeatedly against one fixed geometry.
pub trait PreparedPredicates {
    fn intersects(&self, other: &Geometry) -> Result<bool>;
    fn contains(&self, other: &Geometry) -> Result<bool>;
}

/// Exact geometric predicates and set operations.
///
/// Layers hold an optional engine; without one, spatial filters fall back to
/// envelope tests and overlay operations report
/// [`OGRERR_UNSUPPORTED_OPERATION`](crate::errors::OGRErr::OGRERR_UNSUPPORTED_OPERATION).
pub trait GeometryEngine: Debug {
    fn intersects(&self, a: &Geometry, b: &Geometry) -> Result<bool>;
    /// Whether `b` lies in `a`, with no point of `b` in the exterior of `a`.
    fn contains(&self, a: &Geometry, b: &Geometry) -> Result<bool>;
    fn intersection(&self, a: &Geometry, b: &Geometry) -> Result<Geometry>;
    fn union(&self, a: &Geometry, b: &Geometry) -> Result<Geometry>;
    fn difference(&self, a: &Geometry, b: &Geometry) -> Result<Geometry>;
    fn prepare(&self, geom: &Geometry) -> Result<Box<dyn PreparedPredicates>>;
    /// Rounds the coordinates of `geom` to a grid of `grid_size`.
    fn set_precision(&self, geom: &Geometry, grid_size: f64) -> Result<Geometry>;
}

/// [`GeometryEngine`] backed by the `geo` crate.
///
/// Works in 2D: `Z` and `M` ordinates do not survive set operations.
#[derive(Clone, Copy, Debug, Default)]
pub struct GeoEngine;

struct GeoPrepared {
    prepared: PreparedGeometry<'static, geo_types::Geometry<f64>>,
}

impl PreparedPredicates for GeoPrepared {
    fn intersects(&self, other: &Geometry) -> Result<bool> {
        let other = other.to_geo()?;
        Ok(self.prepared.relate(&other).is_intersects())
    }

    fn contains(&self, other: &Geometry) -> Result<bool> {
        let other = other.to_geo()?;
        Ok(self.prepared.relate(&other).is_contains())
    }
}

/// A geometry split by topological dimension.
#[derive(Default)]
struct Parts {
    points: Vec<Point<f64>>,
    lines: Vec<LineString<f64>>,
    polygons: Vec<Polygon<f64>>,
}

impl Parts {
    fn new(geom: &geo_types::Geometry<f64>) -> Self {
        let mut parts = Parts::default();
        parts.add(geom);
        parts
    }

    fn add(&mut self, geom: &geo_types::Geometry<f64>) {
        match geom {
            geo_types::Geometry::Point(p) => self.points.push(*p),
            geo_types::Geometry::MultiPoint(mp) => self.points.extend(mp.iter().copied()),
            geo_types::Geometry::Line(l) => self.lines.push(LineString::from(*l)),
            geo_types::Geometry::LineString(ls) => {
                if !ls.0.is_empty() {
                    self.lines.push(ls.clone())
                }
            }
            geo_types::Geometry::MultiLineString(ml) => {
                self.lines.extend(ml.iter().filter(|ls| !ls.0.is_empty()).cloned())
            }
            geo_types::Geometry::Polygon(p) => {
                if !p.exterior().0.is_empty() {
                    self.polygons.push(p.clone())
                }
            }
            geo_types::Geometry::MultiPolygon(mp) => self
                .polygons
                .extend(mp.iter().filter(|p| !p.exterior().0.is_empty()).cloned()),
            geo_types::Geometry::GeometryCollection(gc) => gc.iter().for_each(|g| self.add(g)),
            geo_types::Geometry::Rect(r) => self.polygons.push(r.to_polygon()),
            geo_types::Geometry::Triangle(t) => self.polygons.push(t.to_polygon()),
        }
    }

    fn area(&self) -> MultiPolygon<f64> {
        // dissolve first so that overlapping members do not confuse the sweep
        self.polygons
            .iter()
            .fold(MultiPolygon::new(Vec::new()), |acc, p| {
                acc.union(&MultiPolygon::new(vec![p.clone()]))
            })
    }

    fn line_network(&self) -> MultiLineString<f64> {
        MultiLineString::new(self.lines.clone())
    }

    /// Packs the parts into the simplest geometry able to hold them.
    fn into_geometry(self) -> Geometry {
        let Parts {
            points,
            lines,
            polygons,
        } = self;
        let kinds = [!points.is_empty(), !lines.is_empty(), !polygons.is_empty()]
            .iter()
            .filter(|k| **k)
            .count();
        let geo = match kinds {
            0 => return empty_collection(),
            1 if polygons.len() == 1 => geo_types::Geometry::Polygon(polygons[0].clone()),
            1 if !polygons.is_empty() => {
                geo_types::Geometry::MultiPolygon(MultiPolygon::new(polygons))
            }
            1 if lines.len() == 1 => geo_types::Geometry::LineString(lines[0].clone()),
            1 if !lines.is_empty() => {
                geo_types::Geometry::MultiLineString(MultiLineString::new(lines))
            }
            1 if points.len() == 1 => geo_types::Geometry::Point(points[0]),
            1 => geo_types::Geometry::MultiPoint(points.into()),
            _ => {
                let members = polygons
                    .into_iter()
                    .map(geo_types::Geometry::Polygon)
                    .chain(lines.into_iter().map(geo_types::Geometry::LineString))
                    .chain(points.into_iter().map(geo_types::Geometry::Point))
                    .collect::<Vec<_>>();
                geo_types::Geometry::GeometryCollection(geo_types::GeometryCollection::new_from(
                    members,
                ))
            }
        };
        Geometry::from_geo(&geo)
    }
}

fn empty_collection() -> Geometry {
    Geometry::new(Shape::GeometryCollection(Vec::new()), false, false)
}

fn segments(lines: &[LineString<f64>]) -> impl Iterator<Item = Line<f64>> + '_ {
    lines.iter().flat_map(|ls| ls.lines())
}

/// Points and overlapping segments shared by two line networks.
fn line_line_intersection(a: &[LineString<f64>], b: &[LineString<f64>], out: &mut Parts) {
    for sa in segments(a) {
        for sb in segments(b) {
            match line_intersection(sa, sb) {
                Some(LineIntersection::SinglePoint { intersection, .. }) => {
                    let p = Point::from(intersection);
                    if !out.points.contains(&p) {
                        out.points.push(p);
                    }
                }
                Some(LineIntersection::Collinear { intersection }) => {
                    out.lines.push(LineString::from(intersection))
                }
                None => {}
            }
        }
    }
}

impl GeoEngine {
    pub fn new() -> Self {
        GeoEngine
    }
}

impl GeometryEngine for GeoEngine {
    fn intersects(&self, a: &Geometry, b: &Geometry) -> Result<bool> {
        Ok(a.to_geo()?.intersects(&b.to_geo()?))
    }

    fn contains(&self, a: &Geometry, b: &Geometry) -> Result<bool> {
        Ok(a.to_geo()?.relate(&b.to_geo()?).is_contains())
    }

    fn intersection(&self, a: &Geometry, b: &Geometry) -> Result<Geometry> {
        let (ga, gb) = (a.to_geo()?, b.to_geo()?);
        let (pa, pb) = (Parts::new(&ga), Parts::new(&gb));
        let (area_a, area_b) = (pa.area(), pb.area());
        let mut out = Parts::default();

        out.polygons = area_a.intersection(&area_b).0;

        if !pa.lines.is_empty() && !area_b.0.is_empty() {
            out.lines.extend(area_b.clip(&pa.line_network(), false));
        }
        if !pb.lines.is_empty() && !area_a.0.is_empty() {
            out.lines.extend(area_a.clip(&pb.line_network(), false));
        }
        line_line_intersection(&pa.lines, &pb.lines, &mut out);

        for p in &pa.points {
            if gb.intersects(p) && !out.points.contains(p) {
                out.points.push(*p);
            }
        }
        for p in &pb.points {
            if ga.intersects(p) && !out.points.contains(p) {
                out.points.push(*p);
            }
        }
        Ok(out.into_geometry())
    }

    fn union(&self, a: &Geometry, b: &Geometry) -> Result<Geometry> {
        let (ga, gb) = (a.to_geo()?, b.to_geo()?);
        let (pa, pb) = (Parts::new(&ga), Parts::new(&gb));
        let area = pa.area().union(&pb.area());
        let mut out = Parts::default();

        let mut lines = pa.lines.clone();
        lines.extend(pb.lines.iter().cloned());
        if area.0.is_empty() {
            out.lines = lines;
        } else if !lines.is_empty() {
            out.lines = area.clip(&MultiLineString::new(lines), true).0;
        }
        let covering = geo_types::GeometryCollection::new_from(vec![
            geo_types::Geometry::MultiPolygon(area.clone()),
            geo_types::Geometry::MultiLineString(MultiLineString::new(out.lines.clone())),
        ]);
        for p in pa.points.iter().chain(pb.points.iter()) {
            if !covering.intersects(p) && !out.points.contains(p) {
                out.points.push(*p);
            }
        }
        out.polygons = area.0;
        Ok(out.into_geometry())
    }

    fn difference(&self, a: &Geometry, b: &Geometry) -> Result<Geometry> {
        let (ga, gb) = (a.to_geo()?, b.to_geo()?);
        let (pa, pb) = (Parts::new(&ga), Parts::new(&gb));
        let area_b = pb.area();
        let mut out = Parts::default();

        out.polygons = pa.area().difference(&area_b).0;
        if !pa.lines.is_empty() {
            out.lines = if area_b.0.is_empty() {
                pa.lines.clone()
            } else {
                area_b.clip(&pa.line_network(), true).0
            };
        }
        out.points = pa
            .points
            .iter()
            .filter(|p| !gb.intersects(*p))
            .copied()
            .collect();
        Ok(out.into_geometry())
    }

    fn prepare(&self, geom: &Geometry) -> Result<Box<dyn PreparedPredicates>> {
        let prepared = PreparedGeometry::from(geom.to_geo()?);
        Ok(Box::new(GeoPrepared { prepared }))
    }

    fn set_precision(&self, geom: &Geometry, grid_size: f64) -> Result<Geometry> {
        if grid_size <= 0.0 {
            return Ok(geom.clone());
        }
        let snapped = geom.set_precision(grid_size);
        let flat = !snapped.is_3d() && !snapped.is_measured();
        if flat && snapped.dimension() == 2 && !snapped.has_curve_geometry() {
            // rebuild the rings so that parts collapsed by the rounding go away
            let parts = Parts::new(&snapped.to_geo()?);
            let mut out = Parts {
                polygons: parts.area().0,
                ..parts
            };
            out.polygons.retain(|p| p.exterior().0.len() >= 4);
            let rebuilt = out.into_geometry();
            if wkb_flatten(snapped.geometry_type())
                == OGRwkbGeometryType::wkbMultiPolygon
            {
                return Ok(rebuilt.promote_to_multi());
            }
            return Ok(rebuilt);
        }
        Ok(snapped)
    }
}
