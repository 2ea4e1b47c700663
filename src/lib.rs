//! A vector feature layer engine in the style of OGR.
//!
//! Layers hold features made of typed attribute fields and geometry
//! fields. The crate provides the behavior shared by every layer backend:
//! spatial and attribute filtering, extent and feature counting, schema
//! changes with transactional rollback, and overlay operations combining
//! two layers into a third one.
//!
//! ## Use
//!
//! ```
//! use ogr_layer::vector::{
//!     Feature, FieldDefn, Geometry, LayerAccess, MemoryLayer, OGRFieldType, OGRwkbGeometryType,
//! };
//!
//! let mut layer = MemoryLayer::new("cities", OGRwkbGeometryType::wkbPoint);
//! layer
//!     .create_field(&FieldDefn::new("name", OGRFieldType::OFTString), true)
//!     .unwrap();
//!
//! let mut feature = Feature::new(layer.base().defn_arc().clone());
//! feature.set_field_string("name", "Lyon").unwrap();
//! feature.set_geometry(Geometry::point(4.83, 45.76)).unwrap();
//! layer.create_feature(&mut feature).unwrap();
//!
//! layer.set_attribute_filter("name = 'Lyon'").unwrap();
//! for feature in layer.features() {
//!     let name = feature.field("name").unwrap().unwrap();
//!     let geometry = feature.geometry().unwrap();
//!     println!("{} {}", name.into_string().unwrap(), geometry.wkt().unwrap());
//! }
//! ```

#![crate_name = "ogr_layer"]
#![crate_type = "lib"]

pub mod config;
pub mod cpl;
pub mod errors;
pub mod options;
pub mod spatial_ref;
pub mod vector;

#[cfg(test)]
pub(crate) mod test_utils;
