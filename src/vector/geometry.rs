use std::f64::consts::PI;
use std::fmt::Write as _;
use std::str::FromStr;

use geo::Area;
use geo_traits::{
    CoordTrait, Dimensions, GeometryCollectionTrait, GeometryTrait, GeometryType,
    LineStringTrait, MultiLineStringTrait, MultiPointTrait, MultiPolygonTrait, PointTrait,
    PolygonTrait,
};
use wkt::types::Dimension;

use crate::errors::{GdalError, Result};
use crate::vector::geometry_type::{
    geometry_type_to_name, has_m, has_z, set_modifier, wkb_flatten, OGRwkbGeometryType,
};
use crate::vector::{Envelope, Envelope3D};

/// Angular step used when approximating circular arcs, in radians (4 degrees).
const ARC_STEP: f64 = PI / 45.0;

/// A coordinate with optional `Z` and `M` ordinates.
///
/// Whether `z` and `m` are meaningful is decided by the owning
/// [`Geometry`]; unused ordinates are kept at zero.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub m: f64,
}

impl Coord {
    pub fn xy(x: f64, y: f64) -> Self {
        Coord {
            x,
            y,
            ..Default::default()
        }
    }

    pub fn xyz(x: f64, y: f64, z: f64) -> Self {
        Coord {
            x,
            y,
            z,
            ..Default::default()
        }
    }
}

/// The structure of a [`Geometry`].
#[derive(Clone, Debug, PartialEq)]
pub enum Shape {
    /// `None` is the empty point.
    Point(Option<Coord>),
    LineString(Vec<Coord>),
    /// Sequence of arcs; each arc is described by three points, sharing end points.
    CircularString(Vec<Coord>),
    /// Exterior ring followed by interior rings.
    Polygon(Vec<Vec<Coord>>),
    Triangle(Vec<Coord>),
    MultiPoint(Vec<Geometry>),
    MultiLineString(Vec<Geometry>),
    MultiPolygon(Vec<Geometry>),
    GeometryCollection(Vec<Geometry>),
    /// Triangulated irregular network; members are [`Shape::Triangle`]s.
    Tin(Vec<Geometry>),
}

/// An owned geometry value.
#[derive(Clone, Debug, PartialEq)]
pub struct Geometry {
    shape: Shape,
    is_3d: bool,
    is_measured: bool,
}

impl Geometry {
    pub fn new(shape: Shape, is_3d: bool, is_measured: bool) -> Self {
        Geometry {
            shape,
            is_3d,
            is_measured,
        }
    }

    /// Creates an empty geometry of the given type.
    ///
    /// `wkbUnknown` yields an empty geometry collection.
    pub fn empty(geometry_type: OGRwkbGeometryType::Type) -> Result<Self> {
        use OGRwkbGeometryType::*;
        let shape = match wkb_flatten(geometry_type) {
            wkbPoint => Shape::Point(None),
            wkbLineString => Shape::LineString(Vec::new()),
            wkbCircularString => Shape::CircularString(Vec::new()),
            wkbPolygon => Shape::Polygon(Vec::new()),
            wkbTriangle => Shape::Triangle(Vec::new()),
            wkbMultiPoint => Shape::MultiPoint(Vec::new()),
            wkbMultiLineString => Shape::MultiLineString(Vec::new()),
            wkbMultiPolygon => Shape::MultiPolygon(Vec::new()),
            wkbUnknown | wkbGeometryCollection => Shape::GeometryCollection(Vec::new()),
            wkbTIN => Shape::Tin(Vec::new()),
            _ => return Err(GdalError::UnsupportedGdalGeometryType(geometry_type)),
        };
        Ok(Geometry::new(
            shape,
            has_z(geometry_type),
            has_m(geometry_type),
        ))
    }

    pub fn point(x: f64, y: f64) -> Self {
        Geometry::new(Shape::Point(Some(Coord::xy(x, y))), false, false)
    }

    pub fn point_z(x: f64, y: f64, z: f64) -> Self {
        Geometry::new(Shape::Point(Some(Coord::xyz(x, y, z))), true, false)
    }

    /// Closed axis aligned rectangle polygon, with the vertex order used for
    /// rectangular spatial filters.
    pub fn rect(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        let ring = vec![
            Coord::xy(min_x, min_y),
            Coord::xy(min_x, max_y),
            Coord::xy(max_x, max_y),
            Coord::xy(max_x, min_y),
            Coord::xy(min_x, min_y),
        ];
        Geometry::new(Shape::Polygon(vec![ring]), false, false)
    }

    /// Creates a geometry by parsing a
    /// [WKT](https://en.wikipedia.org/wiki/Well-known_text_representation_of_geometry) string.
    ///
    /// `Z`, `M` and `ZM` variants of the linear types are supported.
    pub fn from_wkt(wkt: &str) -> Result<Geometry> {
        let parsed = wkt::Wkt::<f64>::from_str(wkt)
            .map_err(|e| GdalError::BadArgument(format!("Invalid WKT '{wkt}': {e}")))?;
        from_geo_traits(&parsed)
    }

    /// Serializes the geometry as WKT.
    ///
    /// Linear geometries are written by the `wkt` crate, in any dimension.
    pub fn wkt(&self) -> Result<String> {
        if let Some(wkt) = self.to_wkt_types() {
            return Ok(wkt.to_string());
        }
        let mut out = String::new();
        self.write_wkt(&mut out, true);
        Ok(out)
    }

    /// Returns `None` for curves, triangles and TINs, and for multipoints
    /// holding an empty point, none of which the `wkt` writer handles.
    fn to_wkt_types(&self) -> Option<wkt::Wkt<f64>> {
        use wkt::types::{
            GeometryCollection, LineString, MultiLineString, MultiPoint, MultiPolygon, Point,
            Polygon,
        };

        let dim = match (self.is_3d, self.is_measured) {
            (false, false) => Dimension::XY,
            (true, false) => Dimension::XYZ,
            (false, true) => Dimension::XYM,
            (true, true) => Dimension::XYZM,
        };
        let coord = |c: &Coord| wkt::types::Coord {
            x: c.x,
            y: c.y,
            z: self.is_3d.then_some(c.z),
            m: self.is_measured.then_some(c.m),
        };
        let line = |coords: &[Coord]| LineString::new(coords.iter().map(&coord).collect(), dim);
        let polygon =
            |rings: &[Vec<Coord>]| Polygon::new(rings.iter().map(|r| line(r)).collect(), dim);

        let wkt = match &self.shape {
            Shape::Point(c) => wkt::Wkt::Point(Point::new(c.as_ref().map(&coord), dim)),
            Shape::LineString(coords) => wkt::Wkt::LineString(line(coords)),
            Shape::Polygon(rings) => wkt::Wkt::Polygon(polygon(rings)),
            Shape::MultiPoint(children) => {
                let points = children
                    .iter()
                    .map(|g| match &g.shape {
                        Shape::Point(Some(c)) => Some(Point::new(Some(coord(c)), dim)),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()?;
                wkt::Wkt::MultiPoint(MultiPoint::new(points, dim))
            }
            Shape::MultiLineString(children) => {
                let lines = children
                    .iter()
                    .map(|g| match &g.shape {
                        Shape::LineString(coords) => Some(line(coords)),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()?;
                wkt::Wkt::MultiLineString(MultiLineString::new(lines, dim))
            }
            Shape::MultiPolygon(children) => {
                let polygons = children
                    .iter()
                    .map(|g| match &g.shape {
                        Shape::Polygon(rings) => Some(polygon(rings)),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()?;
                wkt::Wkt::MultiPolygon(MultiPolygon::new(polygons, dim))
            }
            Shape::GeometryCollection(children) => {
                let geoms = children
                    .iter()
                    .map(Geometry::to_wkt_types)
                    .collect::<Option<Vec<_>>>()?;
                wkt::Wkt::GeometryCollection(GeometryCollection::new(geoms, dim))
            }
            Shape::CircularString(_) | Shape::Triangle(_) | Shape::Tin(_) => return None,
        };
        Some(wkt)
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn into_shape(self) -> Shape {
        self.shape
    }

    pub fn is_3d(&self) -> bool {
        self.is_3d
    }

    pub fn is_measured(&self) -> bool {
        self.is_measured
    }

    /// Adds or removes the `M` dimension; removed measures are discarded.
    pub fn set_measured(&mut self, measured: bool) {
        self.is_measured = measured;
        for child in self.children_mut() {
            child.set_measured(measured);
        }
        if !measured {
            self.for_each_coord_mut(&mut |c| c.m = 0.0);
        }
    }

    /// Adds or removes the `Z` dimension; removed elevations are discarded.
    pub fn set_3d(&mut self, is_3d: bool) {
        self.is_3d = is_3d;
        for child in self.children_mut() {
            child.set_3d(is_3d);
        }
        if !is_3d {
            self.for_each_coord_mut(&mut |c| c.z = 0.0);
        }
    }

    pub fn geometry_type(&self) -> OGRwkbGeometryType::Type {
        use OGRwkbGeometryType::*;
        let flat = match self.shape {
            Shape::Point(_) => wkbPoint,
            Shape::LineString(_) => wkbLineString,
            Shape::CircularString(_) => wkbCircularString,
            Shape::Polygon(_) => wkbPolygon,
            Shape::Triangle(_) => wkbTriangle,
            Shape::MultiPoint(_) => wkbMultiPoint,
            Shape::MultiLineString(_) => wkbMultiLineString,
            Shape::MultiPolygon(_) => wkbMultiPolygon,
            Shape::GeometryCollection(_) => wkbGeometryCollection,
            Shape::Tin(_) => wkbTIN,
        };
        set_modifier(flat, self.is_3d, self.is_measured)
    }

    pub fn geometry_name(&self) -> String {
        geometry_type_to_name(self.geometry_type())
    }

    pub fn is_empty(&self) -> bool {
        match &self.shape {
            Shape::Point(c) => c.is_none(),
            Shape::LineString(coords) | Shape::CircularString(coords) | Shape::Triangle(coords) => {
                coords.is_empty()
            }
            Shape::Polygon(rings) => rings.first().map_or(true, |r| r.is_empty()),
            Shape::MultiPoint(children)
            | Shape::MultiLineString(children)
            | Shape::MultiPolygon(children)
            | Shape::GeometryCollection(children)
            | Shape::Tin(children) => children.iter().all(Geometry::is_empty),
        }
    }

    /// Topological dimension: 0 for points, 1 for curves, 2 for surfaces.
    ///
    /// A collection has the highest dimension of its members, 0 when empty.
    pub fn dimension(&self) -> u32 {
        match &self.shape {
            Shape::Point(_) | Shape::MultiPoint(_) => 0,
            Shape::LineString(_) | Shape::CircularString(_) | Shape::MultiLineString(_) => 1,
            Shape::Polygon(_) | Shape::Triangle(_) | Shape::MultiPolygon(_) | Shape::Tin(_) => 2,
            Shape::GeometryCollection(children) => {
                children.iter().map(Geometry::dimension).max().unwrap_or(0)
            }
        }
    }

    /// Number of members of a collection, 0 for simple geometries.
    pub fn num_geometries(&self) -> usize {
        self.children().len()
    }

    /// Member `index` of a collection.
    pub fn geometry(&self, index: usize) -> Option<&Geometry> {
        self.children().get(index)
    }

    fn children(&self) -> &[Geometry] {
        match &self.shape {
            Shape::MultiPoint(children)
            | Shape::MultiLineString(children)
            | Shape::MultiPolygon(children)
            | Shape::GeometryCollection(children)
            | Shape::Tin(children) => children,
            _ => &[],
        }
    }

    fn children_mut(&mut self) -> &mut [Geometry] {
        match &mut self.shape {
            Shape::MultiPoint(children)
            | Shape::MultiLineString(children)
            | Shape::MultiPolygon(children)
            | Shape::GeometryCollection(children)
            | Shape::Tin(children) => children,
            _ => &mut [],
        }
    }

    /// Visits every vertex, descending into collections.
    pub fn for_each_coord(&self, f: &mut impl FnMut(&Coord)) {
        match &self.shape {
            Shape::Point(c) => c.iter().for_each(|c| f(c)),
            Shape::LineString(coords) | Shape::CircularString(coords) | Shape::Triangle(coords) => {
                coords.iter().for_each(|c| f(c))
            }
            Shape::Polygon(rings) => rings.iter().flatten().for_each(|c| f(c)),
            _ => self.children().iter().for_each(|g| g.for_each_coord(f)),
        }
    }

    fn for_each_coord_mut(&mut self, f: &mut impl FnMut(&mut Coord)) {
        match &mut self.shape {
            Shape::Point(c) => c.iter_mut().for_each(|c| f(c)),
            Shape::LineString(coords) | Shape::CircularString(coords) | Shape::Triangle(coords) => {
                coords.iter_mut().for_each(|c| f(c))
            }
            Shape::Polygon(rings) => rings.iter_mut().flatten().for_each(|c| f(c)),
            _ => self
                .children_mut()
                .iter_mut()
                .for_each(|g| g.for_each_coord_mut(f)),
        }
    }

    /// Computes and returns the axis-aligned 2D bounding rectangle.
    ///
    /// An empty geometry yields an uninitialized envelope.
    pub fn envelope(&self) -> Envelope {
        let mut env = Envelope::default();
        self.for_each_coord(&mut |c| env.merge_xy(c.x, c.y));
        env
    }

    /// Computes and returns the axis-aligned 3D bounding box.
    ///
    /// For 2D geometries the Z range is `[0, 0]`.
    pub fn envelope_3d(&self) -> Envelope3D {
        let mut env = Envelope3D::default();
        self.for_each_coord(&mut |c| env.merge_xyz(c.x, c.y, c.z));
        env
    }

    /// Whether the geometry is a polygon made of a single axis aligned rectangle ring.
    pub fn is_rectangle(&self) -> bool {
        let Shape::Polygon(rings) = &self.shape else {
            return false;
        };
        if rings.len() != 1 {
            return false;
        }
        let ring = &rings[0];
        if ring.len() != 4 && ring.len() != 5 {
            return false;
        }
        if ring.len() == 5 && (ring[0].x != ring[4].x || ring[0].y != ring[4].y) {
            return false;
        }
        let (p0, p1, p2, p3) = (ring[0], ring[1], ring[2], ring[3]);
        if p0.x == p2.x || p0.y == p2.y {
            return false;
        }
        (p0.x == p1.x && p1.y == p2.y && p2.x == p3.x && p3.y == p0.y)
            || (p0.y == p1.y && p1.x == p2.x && p2.y == p3.y && p3.x == p0.x)
    }

    pub fn has_curve_geometry(&self) -> bool {
        match &self.shape {
            Shape::CircularString(_) => true,
            _ => self.children().iter().any(Geometry::has_curve_geometry),
        }
    }

    fn contains_tin(&self) -> bool {
        match &self.shape {
            Shape::Tin(_) | Shape::Triangle(_) => true,
            _ => self.children().iter().any(Geometry::contains_tin),
        }
    }

    /// Returns a copy with every circular arc approximated by line segments.
    ///
    /// A circular string becomes a line string and a collection holding only
    /// line strings after conversion becomes a multi line string.
    pub fn linearize(&self) -> Geometry {
        let shape = match &self.shape {
            Shape::CircularString(coords) => Shape::LineString(stroke_circular_string(coords)),
            Shape::GeometryCollection(children) => {
                let children: Vec<Geometry> = children.iter().map(Geometry::linearize).collect();
                Shape::GeometryCollection(children)
            }
            Shape::MultiLineString(children) => {
                Shape::MultiLineString(children.iter().map(Geometry::linearize).collect())
            }
            other => other.clone(),
        };
        Geometry::new(shape, self.is_3d, self.is_measured)
    }

    /// Returns a copy with every X and Y ordinate rounded to a multiple of
    /// `grid_size`; repeated vertices produced by the rounding are removed.
    pub fn set_precision(&self, grid_size: f64) -> Geometry {
        let snap = |v: f64| (v / grid_size).round() * grid_size;
        let snap_coord = |c: &Coord| Coord {
            x: snap(c.x),
            y: snap(c.y),
            ..*c
        };
        let snap_seq = |coords: &[Coord]| {
            let mut out: Vec<Coord> = Vec::with_capacity(coords.len());
            for c in coords.iter().map(snap_coord) {
                if out.last().map_or(true, |p| p.x != c.x || p.y != c.y) {
                    out.push(c);
                }
            }
            out
        };
        let shape = match &self.shape {
            Shape::Point(c) => Shape::Point(c.as_ref().map(snap_coord)),
            Shape::LineString(coords) => Shape::LineString(snap_seq(coords)),
            Shape::CircularString(coords) => {
                Shape::CircularString(coords.iter().map(snap_coord).collect())
            }
            Shape::Triangle(coords) => Shape::Triangle(coords.iter().map(snap_coord).collect()),
            Shape::Polygon(rings) => Shape::Polygon(rings.iter().map(|r| snap_seq(r)).collect()),
            Shape::MultiPoint(c) => Shape::MultiPoint(snap_children(c, grid_size)),
            Shape::MultiLineString(c) => Shape::MultiLineString(snap_children(c, grid_size)),
            Shape::MultiPolygon(c) => Shape::MultiPolygon(snap_children(c, grid_size)),
            Shape::GeometryCollection(c) => Shape::GeometryCollection(snap_children(c, grid_size)),
            Shape::Tin(c) => Shape::Tin(snap_children(c, grid_size)),
        };
        Geometry::new(shape, self.is_3d, self.is_measured)
    }

    /// Wraps a point, line string or polygon into its multi counterpart.
    ///
    /// Other geometries are returned unchanged.
    pub fn promote_to_multi(self) -> Geometry {
        let (is_3d, is_measured) = (self.is_3d, self.is_measured);
        let shape = match self.shape {
            Shape::Point(_) => Shape::MultiPoint(vec![self]),
            Shape::LineString(_) => Shape::MultiLineString(vec![self]),
            Shape::Polygon(_) => Shape::MultiPolygon(vec![self]),
            _ => return self,
        };
        Geometry::new(shape, is_3d, is_measured)
    }

    /// Planar area of the surfaces of this geometry; 0 for points and curves.
    pub fn area(&self) -> f64 {
        match &self.shape {
            Shape::Tin(children) | Shape::GeometryCollection(children) => {
                children.iter().map(Geometry::area).sum()
            }
            _ => self.to_geo().map(|g| g.unsigned_area()).unwrap_or(0.0),
        }
    }

    /// Converts to a 2D [`geo_types::Geometry`].
    ///
    /// `Z` and `M` are dropped, arcs are linearized, and a TIN becomes a
    /// multi polygon. An empty point maps to an empty multi point.
    pub fn to_geo(&self) -> Result<geo_types::Geometry<f64>> {
        let line = |coords: &[Coord]| {
            geo_types::LineString::from(coords.iter().map(|c| (c.x, c.y)).collect::<Vec<_>>())
        };
        let polygon = |rings: &[Vec<Coord>]| match rings.split_first() {
            Some((exterior, interiors)) => {
                geo_types::Polygon::new(line(exterior), interiors.iter().map(|r| line(r)).collect())
            }
            None => geo_types::Polygon::new(geo_types::LineString::new(Vec::new()), Vec::new()),
        };
        Ok(match &self.shape {
            Shape::Point(Some(c)) => geo_types::Geometry::Point(geo_types::Point::new(c.x, c.y)),
            Shape::Point(None) => geo_types::Geometry::MultiPoint(geo_types::MultiPoint::new(vec![])),
            Shape::LineString(coords) => geo_types::Geometry::LineString(line(coords)),
            Shape::CircularString(coords) => {
                geo_types::Geometry::LineString(line(&stroke_circular_string(coords)))
            }
            Shape::Polygon(rings) => geo_types::Geometry::Polygon(polygon(rings)),
            Shape::Triangle(ring) => {
                geo_types::Geometry::Polygon(polygon(std::slice::from_ref(ring)))
            }
            Shape::MultiPoint(children) => {
                let points = children
                    .iter()
                    .filter_map(|g| match g.shape {
                        Shape::Point(Some(c)) => Some(geo_types::Point::new(c.x, c.y)),
                        _ => None,
                    })
                    .collect();
                geo_types::Geometry::MultiPoint(geo_types::MultiPoint::new(points))
            }
            Shape::MultiLineString(children) => {
                let lines = children
                    .iter()
                    .map(|g| match g.to_geo()? {
                        geo_types::Geometry::LineString(ls) => Ok(ls),
                        _ => Err(GdalError::UnsupportedGdalGeometryType(g.geometry_type())),
                    })
                    .collect::<Result<Vec<_>>>()?;
                geo_types::Geometry::MultiLineString(geo_types::MultiLineString::new(lines))
            }
            Shape::MultiPolygon(children) | Shape::Tin(children) => {
                let polygons = children
                    .iter()
                    .map(|g| match g.to_geo()? {
                        geo_types::Geometry::Polygon(p) => Ok(p),
                        _ => Err(GdalError::UnsupportedGdalGeometryType(g.geometry_type())),
                    })
                    .collect::<Result<Vec<_>>>()?;
                geo_types::Geometry::MultiPolygon(geo_types::MultiPolygon::new(polygons))
            }
            Shape::GeometryCollection(children) => {
                let members = children
                    .iter()
                    .map(Geometry::to_geo)
                    .collect::<Result<Vec<_>>>()?;
                geo_types::Geometry::GeometryCollection(geo_types::GeometryCollection::new_from(
                    members,
                ))
            }
        })
    }

    /// Creates a 2D geometry from a [`geo_types::Geometry`].
    pub fn from_geo(geo: &geo_types::Geometry<f64>) -> Geometry {
        let seq = |ls: &geo_types::LineString<f64>| -> Vec<Coord> {
            ls.coords().map(|c| Coord::xy(c.x, c.y)).collect()
        };
        let rings = |p: &geo_types::Polygon<f64>| -> Vec<Vec<Coord>> {
            if p.exterior().0.is_empty() {
                return Vec::new();
            }
            std::iter::once(p.exterior())
                .chain(p.interiors())
                .map(|r| seq(r))
                .collect()
        };
        let flat = |shape: Shape| Geometry::new(shape, false, false);
        match geo {
            geo_types::Geometry::Point(p) => flat(Shape::Point(Some(Coord::xy(p.x(), p.y())))),
            geo_types::Geometry::Line(l) => flat(Shape::LineString(vec![
                Coord::xy(l.start.x, l.start.y),
                Coord::xy(l.end.x, l.end.y),
            ])),
            geo_types::Geometry::LineString(ls) => flat(Shape::LineString(seq(ls))),
            geo_types::Geometry::Polygon(p) => flat(Shape::Polygon(rings(p))),
            geo_types::Geometry::MultiPoint(mp) => flat(Shape::MultiPoint(
                mp.iter()
                    .map(|p| flat(Shape::Point(Some(Coord::xy(p.x(), p.y())))))
                    .collect(),
            )),
            geo_types::Geometry::MultiLineString(ml) => flat(Shape::MultiLineString(
                ml.iter().map(|ls| flat(Shape::LineString(seq(ls)))).collect(),
            )),
            geo_types::Geometry::MultiPolygon(mp) => flat(Shape::MultiPolygon(
                mp.iter().map(|p| flat(Shape::Polygon(rings(p)))).collect(),
            )),
            geo_types::Geometry::GeometryCollection(gc) => flat(Shape::GeometryCollection(
                gc.iter().map(Geometry::from_geo).collect(),
            )),
            geo_types::Geometry::Rect(r) => {
                let (min, max) = (r.min(), r.max());
                Geometry::rect(min.x, min.y, max.x, max.y)
            }
            geo_types::Geometry::Triangle(t) => flat(Shape::Polygon(vec![vec![
                Coord::xy(t.0.x, t.0.y),
                Coord::xy(t.1.x, t.1.y),
                Coord::xy(t.2.x, t.2.y),
                Coord::xy(t.0.x, t.0.y),
            ]])),
        }
    }

    fn write_wkt(&self, out: &mut String, with_tag: bool) {
        if with_tag {
            let tag = match self.shape {
                Shape::Point(_) => "POINT",
                Shape::LineString(_) => "LINESTRING",
                Shape::CircularString(_) => "CIRCULARSTRING",
                Shape::Polygon(_) => "POLYGON",
                Shape::Triangle(_) => "TRIANGLE",
                Shape::MultiPoint(_) => "MULTIPOINT",
                Shape::MultiLineString(_) => "MULTILINESTRING",
                Shape::MultiPolygon(_) => "MULTIPOLYGON",
                Shape::GeometryCollection(_) => "GEOMETRYCOLLECTION",
                Shape::Tin(_) => "TIN",
            };
            out.push_str(tag);
            match (self.is_3d, self.is_measured) {
                (true, true) => out.push_str(" ZM"),
                (true, false) => out.push_str(" Z"),
                (false, true) => out.push_str(" M"),
                (false, false) => {}
            }
        }
        if self.is_empty() {
            if with_tag {
                out.push(' ');
            }
            out.push_str("EMPTY");
            return;
        }
        let write_coord = |out: &mut String, c: &Coord| {
            let _ = write!(out, "{} {}", c.x, c.y);
            if self.is_3d {
                let _ = write!(out, " {}", c.z);
            }
            if self.is_measured {
                let _ = write!(out, " {}", c.m);
            }
        };
        let write_seq = |out: &mut String, coords: &[Coord]| {
            out.push('(');
            for (i, c) in coords.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_coord(out, c);
            }
            out.push(')');
        };
        match &self.shape {
            Shape::Point(Some(c)) => write_seq(out, std::slice::from_ref(c)),
            Shape::Point(None) => {}
            Shape::LineString(coords) | Shape::CircularString(coords) => write_seq(out, coords),
            Shape::Triangle(ring) => {
                out.push('(');
                write_seq(out, ring);
                out.push(')');
            }
            Shape::Polygon(rings) => {
                out.push('(');
                for (i, ring) in rings.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_seq(out, ring);
                }
                out.push(')');
            }
            Shape::MultiPoint(children)
            | Shape::MultiLineString(children)
            | Shape::MultiPolygon(children)
            | Shape::Tin(children)
            | Shape::GeometryCollection(children) => {
                let tagged = matches!(self.shape, Shape::GeometryCollection(_));
                out.push('(');
                for (i, child) in children.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    child.write_wkt(out, tagged);
                }
                out.push(')');
            }
        }
    }
}

fn snap_children(children: &[Geometry], grid_size: f64) -> Vec<Geometry> {
    children.iter().map(|g| g.set_precision(grid_size)).collect()
}

/// Approximates a circular string by line segments.
fn stroke_circular_string(coords: &[Coord]) -> Vec<Coord> {
    let mut out = Vec::new();
    if let Some(first) = coords.first() {
        out.push(*first);
    }
    let mut i = 0;
    while i + 2 < coords.len() {
        stroke_arc(&coords[i], &coords[i + 1], &coords[i + 2], &mut out);
        i += 2;
    }
    out
}

/// Appends the vertices of the arc `p0 -> p1 -> p2` following `p0`.
fn stroke_arc(p0: &Coord, p1: &Coord, p2: &Coord, out: &mut Vec<Coord>) {
    let lerp = |t: f64, x: f64, y: f64| Coord {
        x,
        y,
        z: p0.z + (p2.z - p0.z) * t,
        m: p0.m + (p2.m - p0.m) * t,
    };

    let full_circle = p0.x == p2.x && p0.y == p2.y;
    let (cx, cy, sweep, a0) = if full_circle {
        let cx = (p0.x + p1.x) / 2.0;
        let cy = (p0.y + p1.y) / 2.0;
        (cx, cy, 2.0 * PI, (p0.y - cy).atan2(p0.x - cx))
    } else {
        let d = 2.0 * (p0.x * (p1.y - p2.y) + p1.x * (p2.y - p0.y) + p2.x * (p0.y - p1.y));
        if d.abs() < 1e-12 {
            out.push(*p1);
            out.push(*p2);
            return;
        }
        let s0 = p0.x * p0.x + p0.y * p0.y;
        let s1 = p1.x * p1.x + p1.y * p1.y;
        let s2 = p2.x * p2.x + p2.y * p2.y;
        let cx = (s0 * (p1.y - p2.y) + s1 * (p2.y - p0.y) + s2 * (p0.y - p1.y)) / d;
        let cy = (s0 * (p2.x - p1.x) + s1 * (p0.x - p2.x) + s2 * (p1.x - p0.x)) / d;

        let a0 = (p0.y - cy).atan2(p0.x - cx);
        let mut a1 = (p1.y - cy).atan2(p1.x - cx);
        let mut a2 = (p2.y - cy).atan2(p2.x - cx);
        let ccw = (p1.x - p0.x) * (p2.y - p1.y) - (p1.y - p0.y) * (p2.x - p1.x) > 0.0;
        if ccw {
            while a1 < a0 {
                a1 += 2.0 * PI;
            }
            while a2 < a1 {
                a2 += 2.0 * PI;
            }
        } else {
            while a1 > a0 {
                a1 -= 2.0 * PI;
            }
            while a2 > a1 {
                a2 -= 2.0 * PI;
            }
        }
        (cx, cy, a2 - a0, a0)
    };

    let radius = ((p0.x - cx).powi(2) + (p0.y - cy).powi(2)).sqrt();
    let steps = ((sweep.abs() / ARC_STEP).ceil() as usize).max(2);
    for step in 1..steps {
        let t = step as f64 / steps as f64;
        let angle = a0 + sweep * t;
        out.push(lerp(t, cx + radius * angle.cos(), cy + radius * angle.sin()));
    }
    out.push(*p2);
}

fn dims_flags(dim: Dimensions) -> (bool, bool) {
    match dim {
        Dimensions::Xyz => (true, false),
        Dimensions::Xym => (false, true),
        Dimensions::Xyzm => (true, true),
        _ => (false, false),
    }
}

fn coord_from_trait<C: CoordTrait<T = f64>>(c: &C, is_3d: bool, is_measured: bool) -> Coord {
    let z = if is_3d { c.nth(2).unwrap_or(0.0) } else { 0.0 };
    let m_index = if is_3d { 3 } else { 2 };
    let m = if is_measured {
        c.nth(m_index).unwrap_or(0.0)
    } else {
        0.0
    };
    Coord {
        x: c.x(),
        y: c.y(),
        z,
        m,
    }
}

fn seq_from_trait<L: LineStringTrait<T = f64>>(ls: &L, is_3d: bool, is_measured: bool) -> Vec<Coord> {
    ls.coords()
        .map(|c| coord_from_trait(&c, is_3d, is_measured))
        .collect()
}

fn rings_from_trait<P: PolygonTrait<T = f64>>(
    polygon: &P,
    is_3d: bool,
    is_measured: bool,
) -> Vec<Vec<Coord>> {
    let Some(exterior) = polygon.exterior() else {
        return Vec::new();
    };
    let mut rings = vec![seq_from_trait(&exterior, is_3d, is_measured)];
    rings.extend(
        polygon
            .interiors()
            .map(|r| seq_from_trait(&r, is_3d, is_measured)),
    );
    if rings[0].is_empty() {
        rings.clear();
    }
    rings
}

/// Converts any `geo-traits` geometry, keeping `Z` and `M` ordinates.
pub(crate) fn from_geo_traits<G: GeometryTrait<T = f64>>(geom: &G) -> Result<Geometry> {
    let (is_3d, is_measured) = dims_flags(geom.dim());
    let make = |shape: Shape| Geometry::new(shape, is_3d, is_measured);
    let shape = match geom.as_type() {
        GeometryType::Point(p) => {
            Shape::Point(p.coord().map(|c| coord_from_trait(&c, is_3d, is_measured)))
        }
        GeometryType::LineString(ls) => Shape::LineString(seq_from_trait(ls, is_3d, is_measured)),
        GeometryType::Polygon(p) => Shape::Polygon(rings_from_trait(p, is_3d, is_measured)),
        GeometryType::MultiPoint(mp) => Shape::MultiPoint(
            mp.points()
                .map(|p| {
                    make(Shape::Point(
                        p.coord().map(|c| coord_from_trait(&c, is_3d, is_measured)),
                    ))
                })
                .collect(),
        ),
        GeometryType::MultiLineString(ml) => Shape::MultiLineString(
            ml.line_strings()
                .map(|ls| make(Shape::LineString(seq_from_trait(&ls, is_3d, is_measured))))
                .collect(),
        ),
        GeometryType::MultiPolygon(mp) => Shape::MultiPolygon(
            mp.polygons()
                .map(|p| make(Shape::Polygon(rings_from_trait(&p, is_3d, is_measured))))
                .collect(),
        ),
        GeometryType::GeometryCollection(gc) => Shape::GeometryCollection(
            gc.geometries()
                .map(|g| from_geo_traits(&g))
                .collect::<Result<Vec<_>>>()?,
        ),
        _ => {
            return Err(GdalError::BadArgument(
                "Unsupported geometry kind".to_string(),
            ))
        }
    };
    Ok(make(shape))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::assert_almost_eq;
    use OGRwkbGeometryType::*;

    #[test]
    fn test_from_wkt_types() {
        let geom = Geometry::from_wkt("POLYGON ((0 0,0 1,1 1,1 0,0 0))").unwrap();
        assert_eq!(geom.geometry_type(), wkbPolygon);
        assert_eq!(geom.dimension(), 2);
        assert!(!geom.is_3d());

        let geom = Geometry::from_wkt("POINT Z (1 2 3)").unwrap();
        assert_eq!(geom.geometry_type(), wkbPointZ);
        assert_eq!(geom.shape(), &Shape::Point(Some(Coord::xyz(1.0, 2.0, 3.0))));

        let geom = Geometry::from_wkt("LINESTRING M (0 0 5,1 1 6)").unwrap();
        assert_eq!(geom.geometry_type(), wkbLineStringM);

        assert!(Geometry::from_wkt("POLYGON ((0 0").is_err());
    }

    #[test]
    fn test_wkt_roundtrip() {
        let wkt = "MULTIPOLYGON (((0 0,0 1,1 1,1 0,0 0)),((2 2,2 3,3 3,3 2,2 2)))";
        let geom = Geometry::from_wkt(wkt).unwrap();
        let back = Geometry::from_wkt(&geom.wkt().unwrap()).unwrap();
        assert_eq!(geom, back);
    }

    #[test]
    fn test_wkt_z() {
        let geom = Geometry::point_z(1.0, 2.0, 3.0);
        assert_eq!(geom.wkt().unwrap(), "POINT Z(1 2 3)");
    }

    #[test]
    fn test_wkt_measured() {
        let geom = Geometry::from_wkt("POINT ZM (1 2 3 4)").unwrap();
        assert_eq!(geom.wkt().unwrap(), "POINT ZM(1 2 3 4)");

        let line = Geometry::from_wkt("LINESTRING M (0 0 5,1 1 6)").unwrap();
        assert_eq!(line.wkt().unwrap(), "LINESTRING M(0 0 5,1 1 6)");

        let collection =
            Geometry::from_wkt("GEOMETRYCOLLECTION Z (POINT Z (1 2 3),LINESTRING Z (0 0 1,1 1 2))")
                .unwrap();
        let wkt = collection.wkt().unwrap();
        assert_eq!(
            wkt,
            "GEOMETRYCOLLECTION Z(POINT Z(1 2 3),LINESTRING Z(0 0 1,1 1 2))"
        );
        assert_eq!(Geometry::from_wkt(&wkt).unwrap(), collection);

        assert_eq!(Geometry::empty(wkbPoint).unwrap().wkt().unwrap(), "POINT EMPTY");

        let with_empty = Geometry::new(
            Shape::MultiPoint(vec![
                Geometry::point(1.0, 2.0),
                Geometry::new(Shape::Point(None), false, false),
            ]),
            false,
            false,
        );
        assert_eq!(with_empty.wkt().unwrap(), "MULTIPOINT((1 2),EMPTY)");
    }

    #[test]
    fn test_empty() {
        assert!(Geometry::empty(wkbPoint).unwrap().is_empty());
        assert!(Geometry::empty(wkbUnknown).unwrap().is_empty());
        assert_eq!(
            Geometry::empty(wkbUnknown).unwrap().geometry_type(),
            wkbGeometryCollection
        );
        let collection = Geometry::new(
            Shape::GeometryCollection(vec![Geometry::empty(wkbPoint).unwrap()]),
            false,
            false,
        );
        assert!(collection.is_empty());
        assert!(!Geometry::point(0.0, 0.0).is_empty());
    }

    #[test]
    fn test_envelope() {
        let geom = Geometry::from_wkt("LINESTRING (1 5,3 2,-1 4)").unwrap();
        assert_eq!(geom.envelope(), Envelope::new(-1.0, 2.0, 3.0, 5.0));

        let env = Geometry::point(1.0, 2.0).envelope_3d();
        assert_eq!((env.MinZ, env.MaxZ), (0.0, 0.0));
        let env = Geometry::point_z(1.0, 2.0, 7.0).envelope_3d();
        assert_eq!((env.MinZ, env.MaxZ), (7.0, 7.0));
    }

    #[test]
    fn test_is_rectangle() {
        assert!(Geometry::rect(0.0, 0.0, 2.0, 1.0).is_rectangle());
        let square = Geometry::from_wkt("POLYGON ((0 0,1 0,1 1,0 1,0 0))").unwrap();
        assert!(square.is_rectangle());
        let tri = Geometry::from_wkt("POLYGON ((0 0,1 0,1 1,0 0))").unwrap();
        assert!(!tri.is_rectangle());
        let with_hole = Geometry::from_wkt(
            "POLYGON ((0 0,0 4,4 4,4 0,0 0),(1 1,1 2,2 2,2 1,1 1))",
        )
        .unwrap();
        assert!(!with_hole.is_rectangle());
    }

    #[test]
    fn test_set_measured() {
        let mut geom = Geometry::from_wkt("LINESTRING ZM (0 0 1 5,1 1 2 6)").unwrap();
        assert_eq!(geom.geometry_type(), wkbLineStringZM);
        geom.set_measured(false);
        assert_eq!(geom.geometry_type(), wkbLineStringZ);
        let mut ms = Vec::new();
        geom.for_each_coord(&mut |c| ms.push(c.m));
        assert_eq!(ms, vec![0.0, 0.0]);
    }

    #[test]
    fn test_linearize_half_circle() {
        let arc = Geometry::new(
            Shape::CircularString(vec![
                Coord::xy(-1.0, 0.0),
                Coord::xy(0.0, 1.0),
                Coord::xy(1.0, 0.0),
            ]),
            false,
            false,
        );
        assert!(arc.has_curve_geometry());
        let line = arc.linearize();
        assert_eq!(line.geometry_type(), wkbLineString);
        assert!(!line.has_curve_geometry());
        let Shape::LineString(coords) = line.shape() else {
            panic!("expected a line string");
        };
        assert!(coords.len() > 10);
        assert_eq!(coords.first(), Some(&Coord::xy(-1.0, 0.0)));
        assert_eq!(coords.last(), Some(&Coord::xy(1.0, 0.0)));
        for c in coords {
            assert_almost_eq((c.x * c.x + c.y * c.y).sqrt(), 1.0);
            assert!(c.y >= -1e-9);
        }
    }

    #[test]
    fn test_set_precision() {
        let geom = Geometry::from_wkt("LINESTRING (0.12 0.49,0.14 0.51,1.26 1.74)").unwrap();
        let snapped = geom.set_precision(0.5);
        let Shape::LineString(coords) = snapped.shape() else {
            panic!("expected a line string");
        };
        assert_eq!(coords, &vec![Coord::xy(0.0, 0.5), Coord::xy(1.5, 1.5)]);
    }

    #[test]
    fn test_promote_to_multi() {
        let geom = Geometry::rect(0.0, 0.0, 1.0, 1.0).promote_to_multi();
        assert_eq!(geom.geometry_type(), wkbMultiPolygon);
        assert_eq!(geom.num_geometries(), 1);
        let geom = Geometry::point(0.0, 0.0).promote_to_multi();
        assert_eq!(geom.geometry_type(), wkbMultiPoint);
        let tin = Geometry::empty(wkbTIN).unwrap().promote_to_multi();
        assert_eq!(tin.geometry_type(), wkbTIN);
    }

    #[test]
    fn test_area_and_geo() {
        let geom = Geometry::from_wkt("POLYGON ((0 0,0 2,2 2,2 0,0 0),(0 0,0 1,1 1,1 0,0 0))")
            .unwrap();
        assert_almost_eq(geom.area(), 3.0);
        let back = Geometry::from_geo(&geom.to_geo().unwrap());
        assert_eq!(back, geom);

        let tin = Geometry::new(
            Shape::Tin(vec![Geometry::new(
                Shape::Triangle(vec![
                    Coord::xyz(0.0, 0.0, 1.0),
                    Coord::xyz(2.0, 0.0, 1.0),
                    Coord::xyz(0.0, 2.0, 1.0),
                    Coord::xyz(0.0, 0.0, 1.0),
                ]),
                true,
                false,
            )]),
            true,
            false,
        );
        assert_eq!(tin.geometry_type(), wkbTINZ);
        assert_almost_eq(tin.area(), 2.0);
        assert_eq!(
            tin.wkt().unwrap(),
            "TIN Z(((0 0 1,2 0 1,0 2 1,0 0 1)))"
        );
    }
}
