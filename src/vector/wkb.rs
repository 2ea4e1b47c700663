//! Byte-level access to WKB encoded geometries.
//!
//! Both byte orders are accepted, as well as ISO (`+1000`/`+2000`/`+3000`)
//! and extended (`0x80000000` Z flag, `0x40000000` M flag) type codes.
//! Linear geometries with ISO codes are decoded by the `wkb` crate; the
//! byte scanner here validates buffers, computes envelopes and reads the
//! curve and TIN types.

use wkb::reader::Wkb;

use crate::errors::{GdalError, Result};
use crate::vector::geometry::{from_geo_traits, Coord, Shape};
use crate::vector::geometry_type::OGRwkbGeometryType::*;
use crate::vector::{Envelope, Geometry, OGRwkbGeometryType};

const WKB_25D_BIT: u32 = 0x8000_0000;
const WKB_M_BIT: u32 = 0x4000_0000;

/// Collections nested deeper than this are rejected as corrupt.
const MAX_DEPTH: usize = 32;

struct Header {
    little_endian: bool,
    extended: bool,
    flat_type: OGRwkbGeometryType::Type,
    is_3d: bool,
    is_measured: bool,
}

impl Header {
    fn coord_size(&self) -> usize {
        8 * (2 + self.is_3d as usize + self.is_measured as usize)
    }
}

struct WkbReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> WkbReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        WkbReader { data, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(GdalError::InvalidWkb(format!(
                "Truncated WKB: need {n} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn u32(&mut self, little_endian: bool) -> Result<u32> {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(self.take(4)?);
        Ok(if little_endian {
            u32::from_le_bytes(buf)
        } else {
            u32::from_be_bytes(buf)
        })
    }

    fn f64(&mut self, little_endian: bool) -> Result<f64> {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(self.take(8)?);
        Ok(if little_endian {
            f64::from_le_bytes(buf)
        } else {
            f64::from_be_bytes(buf)
        })
    }

    fn header(&mut self) -> Result<Header> {
        let little_endian = match self.take(1)?[0] {
            0 => false,
            1 => true,
            other => {
                return Err(GdalError::InvalidWkb(format!(
                    "Invalid byte order marker {other}"
                )))
            }
        };
        let raw = self.u32(little_endian)?;
        let extended = raw & (WKB_25D_BIT | WKB_M_BIT) != 0;
        let mut is_3d = raw & WKB_25D_BIT != 0;
        let mut is_measured = raw & WKB_M_BIT != 0;
        let code = raw & !(WKB_25D_BIT | WKB_M_BIT);
        match code / 1000 {
            0 => {}
            1 => is_3d = true,
            2 => is_measured = true,
            3 => {
                is_3d = true;
                is_measured = true;
            }
            _ => return Err(GdalError::InvalidWkb(format!("Invalid geometry type {raw}"))),
        }
        let flat_type = code % 1000;
        Ok(Header {
            little_endian,
            extended,
            flat_type,
            is_3d,
            is_measured,
        })
    }

    /// Reads an element count, checking enough bytes remain for `count`
    /// elements of at least `min_size` bytes.
    fn count(&mut self, little_endian: bool, min_size: usize) -> Result<usize> {
        let count = self.u32(little_endian)? as usize;
        if count.saturating_mul(min_size) > self.remaining() {
            return Err(GdalError::InvalidWkb(format!(
                "Element count {count} exceeds the remaining {} bytes",
                self.remaining()
            )));
        }
        Ok(count)
    }

    fn skip(&mut self, n: usize) -> Result<()> {
        self.take(n).map(|_| ())
    }

    fn coord(&mut self, header: &Header) -> Result<Coord> {
        let le = header.little_endian;
        let x = self.f64(le)?;
        let y = self.f64(le)?;
        let z = if header.is_3d { self.f64(le)? } else { 0.0 };
        let m = if header.is_measured { self.f64(le)? } else { 0.0 };
        Ok(Coord { x, y, z, m })
    }

    fn coord_seq(&mut self, header: &Header) -> Result<Vec<Coord>> {
        let n = self.count(header.little_endian, header.coord_size())?;
        (0..n).map(|_| self.coord(header)).collect()
    }

    fn rings(&mut self, header: &Header) -> Result<Vec<Vec<Coord>>> {
        let n = self.count(header.little_endian, 4)?;
        (0..n).map(|_| self.coord_seq(header)).collect()
    }

    fn geometry(&mut self, depth: usize) -> Result<Geometry> {
        if depth > MAX_DEPTH {
            return Err(GdalError::InvalidWkb("Too many nesting levels".to_string()));
        }
        let header = self.header()?;
        let shape = match header.flat_type {
            wkbPoint => {
                let c = self.coord(&header)?;
                if c.x.is_nan() && c.y.is_nan() {
                    Shape::Point(None)
                } else {
                    Shape::Point(Some(c))
                }
            }
            wkbLineString => Shape::LineString(self.coord_seq(&header)?),
            wkbCircularString => Shape::CircularString(self.coord_seq(&header)?),
            wkbPolygon => Shape::Polygon(self.rings(&header)?),
            wkbTriangle => {
                let mut rings = self.rings(&header)?;
                if rings.len() > 1 {
                    return Err(GdalError::InvalidWkb(
                        "Triangle with more than one ring".to_string(),
                    ));
                }
                Shape::Triangle(rings.pop().unwrap_or_default())
            }
            wkbMultiPoint | wkbMultiLineString | wkbMultiPolygon | wkbGeometryCollection
            | wkbTIN => {
                let n = self.count(header.little_endian, 5)?;
                let children = (0..n)
                    .map(|_| self.geometry(depth + 1))
                    .collect::<Result<Vec<_>>>()?;
                match header.flat_type {
                    wkbMultiPoint => Shape::MultiPoint(children),
                    wkbMultiLineString => Shape::MultiLineString(children),
                    wkbMultiPolygon => Shape::MultiPolygon(children),
                    wkbTIN => Shape::Tin(children),
                    _ => Shape::GeometryCollection(children),
                }
            }
            other => return Err(GdalError::UnsupportedGdalGeometryType(other)),
        };
        Ok(Geometry::new(shape, header.is_3d, header.is_measured))
    }

    /// Checks the buffer structure, returning whether only linear types
    /// with ISO codes were met.
    fn linear_iso(&mut self, depth: usize) -> Result<bool> {
        if depth > MAX_DEPTH {
            return Err(GdalError::InvalidWkb("Too many nesting levels".to_string()));
        }
        let header = self.header()?;
        let mut linear = !header.extended;
        match header.flat_type {
            wkbPoint => self.skip(header.coord_size())?,
            wkbLineString | wkbCircularString => {
                linear &= header.flat_type == wkbLineString;
                let n = self.count(header.little_endian, header.coord_size())?;
                self.skip(n * header.coord_size())?;
            }
            wkbPolygon | wkbTriangle => {
                linear &= header.flat_type == wkbPolygon;
                let rings = self.count(header.little_endian, 4)?;
                for _ in 0..rings {
                    let n = self.count(header.little_endian, header.coord_size())?;
                    self.skip(n * header.coord_size())?;
                }
            }
            wkbMultiPoint | wkbMultiLineString | wkbMultiPolygon | wkbGeometryCollection
            | wkbTIN => {
                linear &= header.flat_type != wkbTIN;
                let n = self.count(header.little_endian, 5)?;
                for _ in 0..n {
                    linear &= self.linear_iso(depth + 1)?;
                }
            }
            other => return Err(GdalError::UnsupportedGdalGeometryType(other)),
        }
        Ok(linear)
    }

    /// Walks the vertices without building a geometry.
    ///
    /// Returns `false` when a curve was met, whose extent is not bounded
    /// by its vertices.
    fn visit(&mut self, depth: usize, f: &mut impl FnMut(&Coord)) -> Result<bool> {
        if depth > MAX_DEPTH {
            return Err(GdalError::InvalidWkb("Too many nesting levels".to_string()));
        }
        let header = self.header()?;
        let mut linear = true;
        match header.flat_type {
            wkbPoint => {
                let c = self.coord(&header)?;
                if !(c.x.is_nan() && c.y.is_nan()) {
                    f(&c);
                }
            }
            wkbLineString | wkbCircularString => {
                linear = header.flat_type == wkbLineString;
                let n = self.count(header.little_endian, header.coord_size())?;
                for _ in 0..n {
                    f(&self.coord(&header)?);
                }
            }
            wkbPolygon | wkbTriangle => {
                let rings = self.count(header.little_endian, 4)?;
                for _ in 0..rings {
                    let n = self.count(header.little_endian, header.coord_size())?;
                    for _ in 0..n {
                        f(&self.coord(&header)?);
                    }
                }
            }
            wkbMultiPoint | wkbMultiLineString | wkbMultiPolygon | wkbGeometryCollection
            | wkbTIN => {
                let n = self.count(header.little_endian, 5)?;
                for _ in 0..n {
                    linear &= self.visit(depth + 1, f)?;
                }
            }
            other => return Err(GdalError::UnsupportedGdalGeometryType(other)),
        }
        Ok(linear)
    }

    /// Visits the segments of one coordinate sequence, a single vertex being
    /// reported as a degenerate segment.
    fn segments(&mut self, header: &Header, f: &mut impl FnMut(&Coord, &Coord) -> bool) -> Result<bool> {
        let n = self.count(header.little_endian, header.coord_size())?;
        let mut prev: Option<Coord> = None;
        for _ in 0..n {
            let c = self.coord(header)?;
            let hit = match prev {
                None => f(&c, &c),
                Some(p) => f(&p, &c),
            };
            if hit {
                return Ok(true);
            }
            prev = Some(c);
        }
        Ok(false)
    }

    /// Visits every segment of line strings and polygon rings.
    fn visit_segments(&mut self, depth: usize, f: &mut impl FnMut(&Coord, &Coord) -> bool) -> Result<bool> {
        if depth > MAX_DEPTH {
            return Err(GdalError::InvalidWkb("Too many nesting levels".to_string()));
        }
        let header = self.header()?;
        match header.flat_type {
            wkbPoint => {
                let c = self.coord(&header)?;
                Ok(!(c.x.is_nan() && c.y.is_nan()) && f(&c, &c))
            }
            // arcs leave the chord, only their vertices are certain
            wkbCircularString => {
                let n = self.count(header.little_endian, header.coord_size())?;
                for _ in 0..n {
                    let c = self.coord(&header)?;
                    if f(&c, &c) {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            wkbLineString => self.segments(&header, f),
            wkbPolygon | wkbTriangle => {
                let rings = self.count(header.little_endian, 4)?;
                for _ in 0..rings {
                    if self.segments(&header, f)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            wkbMultiPoint | wkbMultiLineString | wkbMultiPolygon | wkbGeometryCollection
            | wkbTIN => {
                let n = self.count(header.little_endian, 5)?;
                for _ in 0..n {
                    if self.visit_segments(depth + 1, f)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            other => Err(GdalError::UnsupportedGdalGeometryType(other)),
        }
    }
}

/// Decodes a WKB buffer into a [`Geometry`].
pub fn read_geometry(wkb: &[u8]) -> Result<Geometry> {
    if !WkbReader::new(wkb).linear_iso(0)? {
        return WkbReader::new(wkb).geometry(0);
    }
    let parsed = Wkb::try_new(wkb).map_err(|e| GdalError::InvalidWkb(e.to_string()))?;
    from_geo_traits(&parsed)
}

/// Computes the 2D bounding box of a WKB geometry.
///
/// Returns `None` for empty or malformed geometries.
pub fn bounding_box(wkb: &[u8]) -> Option<Envelope> {
    let mut env = Envelope::default();
    let linear = WkbReader::new(wkb)
        .visit(0, &mut |c| env.merge_xy(c.x, c.y))
        .ok()?;
    if !linear {
        let geom = read_geometry(wkb).ok()?.linearize();
        env = geom.envelope();
    }
    env.is_init().then_some(env)
}

/// Whether the geometry certainly intersects `envelope`.
///
/// `true` is only returned when a vertex lies in the envelope or a segment
/// crosses it; `false` means "unknown", e.g. for a polygon enclosing the
/// whole envelope.
pub fn intersects_pessimistic(wkb: &[u8], envelope: &Envelope) -> bool {
    WkbReader::new(wkb)
        .visit_segments(0, &mut |a, b| segment_intersects_envelope(a, b, envelope))
        .unwrap_or(false)
}

/// Liang-Barsky clipping of the segment `a`-`b` against `env`.
fn segment_intersects_envelope(a: &Coord, b: &Coord, env: &Envelope) -> bool {
    if env.contains_xy(a.x, a.y) || env.contains_xy(b.x, b.y) {
        return true;
    }
    let (dx, dy) = (b.x - a.x, b.y - a.y);
    let mut t0: f64 = 0.0;
    let mut t1: f64 = 1.0;
    for (p, q) in [
        (-dx, a.x - env.MinX),
        (dx, env.MaxX - a.x),
        (-dy, a.y - env.MinY),
        (dy, env.MaxY - a.y),
    ] {
        if p == 0.0 {
            if q < 0.0 {
                return false;
            }
        } else {
            let r = q / p;
            if p < 0.0 {
                t0 = t0.max(r);
            } else {
                t1 = t1.min(r);
            }
            if t0 > t1 {
                return false;
            }
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn le_point_z(x: f64, y: f64, z: f64, extended: bool) -> Vec<u8> {
        let mut buf = vec![1u8];
        let code: u32 = if extended { 1 | WKB_25D_BIT } else { 1001 };
        buf.extend_from_slice(&code.to_le_bytes());
        for v in [x, y, z] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        buf
    }

    fn be_line(coords: &[(f64, f64)]) -> Vec<u8> {
        let mut buf = vec![0u8];
        buf.extend_from_slice(&2u32.to_be_bytes());
        buf.extend_from_slice(&(coords.len() as u32).to_be_bytes());
        for (x, y) in coords {
            buf.extend_from_slice(&x.to_be_bytes());
            buf.extend_from_slice(&y.to_be_bytes());
        }
        buf
    }

    #[test]
    fn test_read_point_z() {
        for extended in [false, true] {
            let geom = read_geometry(&le_point_z(1.0, 2.0, 3.0, extended)).unwrap();
            assert_eq!(geom, Geometry::point_z(1.0, 2.0, 3.0));
        }
    }

    #[test]
    fn test_read_big_endian_line() {
        let wkb = be_line(&[(0.0, 0.0), (2.0, 1.0)]);
        let geom = read_geometry(&wkb).unwrap();
        assert_eq!(geom.geometry_type(), wkbLineString);
        assert_eq!(bounding_box(&wkb), Some(Envelope::new(0.0, 0.0, 2.0, 1.0)));
    }

    #[test]
    fn test_read_through_wkb_reader() {
        let polygon = geo_types::Polygon::new(
            geo_types::LineString::from(vec![(0.0, 0.0), (4.0, 0.0), (4.0, 3.0), (0.0, 0.0)]),
            vec![],
        );
        let collection = geo_types::Geometry::GeometryCollection(geo_types::GeometryCollection(
            vec![
                geo_types::Geometry::Point(geo_types::Point::new(1.0, 2.0)),
                geo_types::Geometry::Polygon(polygon),
            ],
        ));
        let mut buf = Vec::new();
        wkb::writer::write_geometry(&mut buf, &collection, &Default::default()).unwrap();
        assert!(WkbReader::new(&buf).linear_iso(0).unwrap());

        let geom = read_geometry(&buf).unwrap();
        assert_eq!(
            geom,
            Geometry::from_wkt("GEOMETRYCOLLECTION (POINT (1 2),POLYGON ((0 0,4 0,4 3,0 0)))")
                .unwrap()
        );
        assert_eq!(bounding_box(&buf), Some(Envelope::new(0.0, 0.0, 4.0, 3.0)));
    }

    #[test]
    fn test_curves_bypass_wkb_reader() {
        let mut buf = vec![1u8];
        buf.extend_from_slice(&wkbCircularString.to_le_bytes());
        buf.extend_from_slice(&3u32.to_le_bytes());
        for v in [0.0f64, 0.0, 1.0, 1.0, 2.0, 0.0] {
            buf.extend_from_slice(&v.to_le_bytes());
        }
        assert!(!WkbReader::new(&buf).linear_iso(0).unwrap());
        let geom = read_geometry(&buf).unwrap();
        assert_eq!(geom.geometry_type(), wkbCircularString);
        assert!(!WkbReader::new(&le_point_z(1.0, 2.0, 3.0, true)).linear_iso(0).unwrap());
        assert!(WkbReader::new(&le_point_z(1.0, 2.0, 3.0, false)).linear_iso(0).unwrap());
    }

    #[test]
    fn test_truncated() {
        let wkb = be_line(&[(0.0, 0.0), (2.0, 1.0)]);
        assert!(matches!(
            read_geometry(&wkb[..wkb.len() - 3]),
            Err(GdalError::InvalidWkb(_))
        ));
        assert_eq!(bounding_box(&wkb[..12]), None);
        assert!(read_geometry(&[7u8, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn test_empty_point_has_no_bounding_box() {
        let mut buf = vec![1u8];
        buf.extend_from_slice(&1u32.to_le_bytes());
        buf.extend_from_slice(&f64::NAN.to_le_bytes());
        buf.extend_from_slice(&f64::NAN.to_le_bytes());
        assert!(read_geometry(&buf).unwrap().is_empty());
        assert_eq!(bounding_box(&buf), None);
    }

    #[test]
    fn test_intersects_pessimistic() {
        let env = Envelope::new(0.0, 0.0, 1.0, 1.0);
        // crosses the box without a vertex inside
        let crossing = be_line(&[(-1.0, 0.5), (2.0, 0.5)]);
        assert!(intersects_pessimistic(&crossing, &env));
        let outside = be_line(&[(-1.0, 2.0), (2.0, 2.0)]);
        assert!(!intersects_pessimistic(&outside, &env));
        assert!(!intersects_pessimistic(&[1u8, 2], &env));
    }

    #[test]
    fn test_segment_envelope() {
        let env = Envelope::new(0.0, 0.0, 1.0, 1.0);
        let c = |x, y| Coord::xy(x, y);
        assert!(segment_intersects_envelope(&c(-1.0, -1.0), &c(2.0, 2.0), &env));
        assert!(!segment_intersects_envelope(&c(-1.0, 0.5), &c(-0.5, 3.0), &env));
        assert!(segment_intersects_envelope(&c(0.5, -1.0), &c(0.5, 3.0), &env));
    }
}
