//! Spatial filter state and the predicates layers use to honour it.

use std::fmt::{Debug, Formatter};

use once_cell::unsync::OnceCell;

use crate::vector::engine::{GeometryEngine, PreparedPredicates};
use crate::vector::geometry::Shape;
use crate::vector::{wkb, Envelope, Geometry};

/// An installed spatial filter.
///
/// Holds its own copy of the filter geometry, with the envelope and
/// rectangle flag computed once, and a prepared geometry built on first use.
pub struct SpatialFilter {
    geom_field: usize,
    geom: Geometry,
    envelope: Envelope,
    is_envelope: bool,
    prepared: OnceCell<Option<Box<dyn PreparedPredicates>>>,
}

impl Debug for SpatialFilter {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpatialFilter")
            .field("geom_field", &self.geom_field)
            .field("geom", &self.geom)
            .field("is_envelope", &self.is_envelope)
            .finish()
    }
}

impl Clone for SpatialFilter {
    fn clone(&self) -> Self {
        SpatialFilter::new(self.geom_field, &self.geom)
    }
}

impl SpatialFilter {
    pub fn new(geom_field: usize, geom: &Geometry) -> Self {
        SpatialFilter {
            geom_field,
            geom: geom.clone(),
            envelope: geom.envelope(),
            is_envelope: geom.is_rectangle(),
            prepared: OnceCell::new(),
        }
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geom
    }

    /// Index of the geometry field the filter applies to.
    pub fn geom_field(&self) -> usize {
        self.geom_field
    }

    pub fn envelope(&self) -> &Envelope {
        &self.envelope
    }

    /// Whether the filter geometry is exactly its own envelope.
    pub fn is_envelope(&self) -> bool {
        self.is_envelope
    }

    fn prepared(&self, engine: &dyn GeometryEngine) -> Option<&dyn PreparedPredicates> {
        self.prepared
            .get_or_init(|| match engine.prepare(&self.geom) {
                Ok(prepared) => Some(prepared),
                Err(e) => {
                    tracing::debug!("Cannot prepare spatial filter geometry: {e}");
                    None
                }
            })
            .as_deref()
    }

    /// Whether `candidate` passes the filter.
    ///
    /// Null and empty geometries never pass. Without an `engine` a candidate
    /// whose envelope meets the filter envelope is accepted.
    pub fn filter_geometry(
        &self,
        candidate: Option<&Geometry>,
        engine: Option<&dyn GeometryEngine>,
    ) -> bool {
        let Some(candidate) = candidate.filter(|g| !g.is_empty()) else {
            return false;
        };

        let env = candidate.envelope();
        if !self.envelope.intersects(&env) {
            return false;
        }

        if self.is_envelope {
            if self.envelope.contains(&env) {
                return true;
            }
            if has_point_in_envelope(candidate, &self.envelope) {
                return true;
            }
        }

        let Some(engine) = engine else {
            return true;
        };
        let result = match self.prepared(engine) {
            Some(prepared) => prepared.intersects(candidate),
            None => engine.intersects(&self.geom, candidate),
        };
        result.unwrap_or_else(|e| {
            tracing::error!("Spatial filter evaluation failed: {e}");
            false
        })
    }

    /// WKB counterpart of [`SpatialFilter::filter_geometry`], caching the
    /// prepared geometry in the filter itself.
    pub fn filter_wkb(
        &self,
        wkb: &[u8],
        envelope: &mut Option<Envelope>,
        engine: Option<&dyn GeometryEngine>,
    ) -> bool {
        let mut slot = None;
        let prepared = match engine {
            Some(engine) => self.prepared(engine),
            None => None,
        };
        filter_wkb_with(wkb, envelope, self, engine, prepared, &mut slot)
    }
}

/// Tests a WKB geometry against `filter` without decoding it when the
/// bounding box is enough to decide.
///
/// `envelope` receives the bounding box of the geometry; a value already
/// present is trusted as is. `prepared` is a cache for the prepared filter
/// geometry owned by the caller, filled on first exact evaluation.
pub fn filter_wkb_geometry(
    wkb: &[u8],
    envelope: &mut Option<Envelope>,
    filter: Option<&SpatialFilter>,
    engine: Option<&dyn GeometryEngine>,
    prepared: &mut Option<Box<dyn PreparedPredicates>>,
) -> bool {
    let Some(filter) = filter else {
        return true;
    };
    filter_wkb_with(wkb, envelope, filter, engine, None, prepared)
}

fn filter_wkb_with(
    wkb: &[u8],
    envelope: &mut Option<Envelope>,
    filter: &SpatialFilter,
    engine: Option<&dyn GeometryEngine>,
    shared: Option<&dyn PreparedPredicates>,
    slot: &mut Option<Box<dyn PreparedPredicates>>,
) -> bool {
    if envelope.is_none() {
        *envelope = wkb::bounding_box(wkb);
    }
    let Some(env) = envelope.as_ref() else {
        return false;
    };
    if !filter.envelope.intersects(env) {
        return false;
    }
    if filter.is_envelope {
        if filter.envelope.contains(env) {
            return true;
        }
        if wkb::intersects_pessimistic(wkb, &filter.envelope) {
            return true;
        }
    }

    let Some(engine) = engine else {
        // assume intersection
        return true;
    };
    let geom = match wkb::read_geometry(wkb) {
        Ok(geom) => geom,
        Err(e) => {
            tracing::debug!("Cannot decode WKB geometry: {e}");
            return false;
        }
    };
    if shared.is_none() && slot.is_none() {
        *slot = engine.prepare(&filter.geom).ok();
    }
    let result = if let Some(prepared) = shared {
        prepared.intersects(&geom)
    } else if let Some(prepared) = slot.as_deref() {
        prepared.intersects(&geom)
    } else {
        engine.intersects(&filter.geom, &geom)
    };
    result.unwrap_or(false)
}

/// Whether any vertex of the geometry lies inside `env`.
///
/// Only the exterior ring of polygons is examined.
pub(crate) fn has_point_in_envelope(geom: &Geometry, env: &Envelope) -> bool {
    match geom.shape() {
        Shape::Point(Some(c)) => env.contains_xy(c.x, c.y),
        Shape::Point(None) => false,
        Shape::LineString(coords) | Shape::CircularString(coords) | Shape::Triangle(coords) => {
            coords.iter().any(|c| env.contains_xy(c.x, c.y))
        }
        Shape::Polygon(rings) => rings
            .first()
            .is_some_and(|ring| ring.iter().any(|c| env.contains_xy(c.x, c.y))),
        Shape::MultiPoint(children)
        | Shape::MultiLineString(children)
        | Shape::MultiPolygon(children)
        | Shape::GeometryCollection(children)
        | Shape::Tin(children) => children.iter().any(|g| has_point_in_envelope(g, env)),
    }
}
