//! Vector layers
//!
//! A layer is a set of features sharing a schema ([`Defn`]), read
//! sequentially through [`LayerAccess`] under optional spatial and attribute
//! filters. [`MemoryLayer`] keeps its features in memory; other backends
//! implement the few reading primitives of [`LayerAccess`] and inherit the
//! rest.
//!
//! ## Reading
//!
//! ```
//! use ogr_layer::vector::{Feature, Geometry, LayerAccess, MemoryLayer, OGRwkbGeometryType};
//!
//! let mut layer = MemoryLayer::new("roads", OGRwkbGeometryType::wkbLineString);
//! let mut feature = Feature::new(layer.base().defn_arc().clone());
//! feature.set_geometry(Geometry::from_wkt("LINESTRING (0 0,10 10)").unwrap()).unwrap();
//! layer.create_feature(&mut feature).unwrap();
//!
//! layer.set_spatial_filter_rect(0, 5.0, 5.0, 6.0, 6.0).unwrap();
//! for feature in layer.features() {
//!     let geometry = feature.geometry().unwrap();
//!     println!("{}", geometry.wkt().unwrap());
//! }
//! ```

pub use defn::{CoordPrecision, Defn, FieldDefn, GeomFieldDefn, OGRFieldType};
pub use engine::{GeoEngine, GeometryEngine, PreparedPredicates};
pub use envelope::{Envelope, Envelope3D};
pub use feature::{Feature, FieldValue, FID_NULL};
pub use filter::SpatialFilter;
pub use geometry::{Coord, Geometry, Shape};
pub use geometry_type::OGRwkbGeometryType;
pub use layer::{FeatureIterator, GeometryTypeCounter, LayerAccess, LayerBase, LayerCaps};
pub use memory::MemoryLayer;
pub use ops::overlay;
pub use query::{AttributeQuery, QueryCompiler, SimpleQueryCompiler};
pub use transaction::Transaction;

mod defn;
pub mod engine;
mod envelope;
mod feature;
pub mod filter;
mod geometry;
pub mod geometry_type;
mod layer;
mod memory;
mod ops;
pub mod query;
pub mod transaction;
pub mod wkb;
