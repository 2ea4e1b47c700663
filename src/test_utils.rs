use std::sync::atomic::{AtomicUsize, Ordering};

use crate::errors::Result;
use crate::vector::engine::PreparedPredicates;
use crate::vector::{
    Feature, FeatureIterator, FieldDefn, GeoEngine, Geometry, GeometryEngine, LayerAccess,
    MemoryLayer, OGRFieldType, OGRwkbGeometryType,
};

pub fn assert_almost_eq(a: f64, b: f64) {
    let f: f64 = a / b;
    assert!(
        (a - b).abs() < 1e-9 || (f - 1.0).abs() < 1e-9,
        "{a} is not almost equal to {b}"
    );
}

/// Axis-aligned square with lower left corner `(x, y)`.
pub fn square(x: f64, y: f64, size: f64) -> Geometry {
    Geometry::rect(x, y, x + size, y + size)
}

/// A polygon layer with one string field `field`, holding one feature per
/// `(value, geometry)` pair.
pub fn polygon_layer(name: &str, field: &str, rows: &[(&str, Geometry)]) -> MemoryLayer {
    let mut layer = MemoryLayer::new(name, OGRwkbGeometryType::wkbPolygon);
    layer
        .create_field(&FieldDefn::new(field, OGRFieldType::OFTString), true)
        .unwrap();
    for (value, geom) in rows {
        let mut feature = Feature::new(layer.base().defn_arc().clone());
        feature.set_field_string(field, value).unwrap();
        feature.set_geometry(geom.clone()).unwrap();
        layer.create_feature(&mut feature).unwrap();
    }
    layer
}

/// String values of `field`, in reading order.
pub fn field_strings(layer: &dyn LayerAccess, field: &str) -> Vec<String> {
    FeatureIterator::new(layer)
        .map(|f| {
            f.field(field)
                .unwrap()
                .and_then(|v| v.into_string())
                .unwrap_or_default()
        })
        .collect()
}

/// [`GeoEngine`] counting how often it is consulted.
#[derive(Debug, Default)]
pub struct CountingEngine {
    calls: AtomicUsize,
    prepare_calls: AtomicUsize,
}

impl CountingEngine {
    /// Every call, preparations included.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }

    pub fn prepare_calls(&self) -> usize {
        self.prepare_calls.load(Ordering::Relaxed)
    }

    fn hit(&self) -> GeoEngine {
        self.calls.fetch_add(1, Ordering::Relaxed);
        GeoEngine
    }
}

impl GeometryEngine for CountingEngine {
    fn intersects(&self, a: &Geometry, b: &Geometry) -> Result<bool> {
        self.hit().intersects(a, b)
    }

    fn contains(&self, a: &Geometry, b: &Geometry) -> Result<bool> {
        self.hit().contains(a, b)
    }

    fn intersection(&self, a: &Geometry, b: &Geometry) -> Result<Geometry> {
        self.hit().intersection(a, b)
    }

    fn union(&self, a: &Geometry, b: &Geometry) -> Result<Geometry> {
        self.hit().union(a, b)
    }

    fn difference(&self, a: &Geometry, b: &Geometry) -> Result<Geometry> {
        self.hit().difference(a, b)
    }

    fn prepare(&self, geom: &Geometry) -> Result<Box<dyn PreparedPredicates>> {
        self.prepare_calls.fetch_add(1, Ordering::Relaxed);
        self.hit().prepare(geom)
    }

    fn set_precision(&self, geom: &Geometry, grid_size: f64) -> Result<Geometry> {
        self.hit().set_precision(geom, grid_size)
    }
}
