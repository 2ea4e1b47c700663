use std::sync::Arc;

use crate::errors::*;
use crate::spatial_ref::SpatialRef;
use crate::vector::{LayerAccess, OGRwkbGeometryType};

/// Attribute field types.
#[allow(non_snake_case, non_upper_case_globals)]
pub mod OGRFieldType {
    pub type Type = u32;
    pub const OFTInteger: Type = 0;
    pub const OFTIntegerList: Type = 1;
    pub const OFTReal: Type = 2;
    pub const OFTRealList: Type = 3;
    pub const OFTString: Type = 4;
    pub const OFTStringList: Type = 5;
    pub const OFTWideString: Type = 6;
    pub const OFTWideStringList: Type = 7;
    pub const OFTBinary: Type = 8;
    pub const OFTDate: Type = 9;
    pub const OFTTime: Type = 10;
    pub const OFTDateTime: Type = 11;
    pub const OFTInteger64: Type = 12;
    pub const OFTInteger64List: Type = 13;
}

/// Attribute field definition.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldDefn {
    name: String,
    field_type: OGRFieldType::Type,
    width: i32,
    precision: i32,
    nullable: bool,
    unique: bool,
    default: Option<String>,
    ignored: bool,
}

impl FieldDefn {
    pub fn new(name: &str, field_type: OGRFieldType::Type) -> Self {
        FieldDefn {
            name: name.to_string(),
            field_type,
            width: 0,
            precision: 0,
            nullable: true,
            unique: false,
            default: None,
            ignored: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn field_type(&self) -> OGRFieldType::Type {
        self.field_type
    }

    pub fn set_type(&mut self, field_type: OGRFieldType::Type) {
        self.field_type = field_type;
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn set_width(&mut self, width: i32) {
        self.width = width;
    }

    pub fn precision(&self) -> i32 {
        self.precision
    }

    pub fn set_precision(&mut self, precision: i32) {
        self.precision = precision;
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn set_nullable(&mut self, nullable: bool) {
        self.nullable = nullable;
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    pub fn set_unique(&mut self, unique: bool) {
        self.unique = unique;
    }

    /// Default value expression, as written in SQL (`'text'`, `12`, `CURRENT_TIMESTAMP`).
    pub fn default_value(&self) -> Option<&str> {
        self.default.as_deref()
    }

    pub fn set_default(&mut self, default: &str) {
        self.default = Some(default.to_string());
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn set_ignored(&mut self, ignored: bool) {
        self.ignored = ignored;
    }

    /// Creates this field on `layer`, see [`LayerAccess::create_field`].
    pub fn add_to_layer<L: LayerAccess + ?Sized>(&self, layer: &mut L) -> Result<()> {
        layer.create_field(self, true)
    }
}

/// Resolution of the stored coordinates of a geometry field.
///
/// `0.0` means unknown.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct CoordPrecision {
    pub xy_resolution: f64,
    pub z_resolution: f64,
    pub m_resolution: f64,
}

/// Geometry field definition.
#[derive(Clone, Debug, PartialEq)]
pub struct GeomFieldDefn {
    name: String,
    geometry_type: OGRwkbGeometryType::Type,
    spatial_ref: Option<Arc<SpatialRef>>,
    nullable: bool,
    ignored: bool,
    coord_precision: CoordPrecision,
}

impl GeomFieldDefn {
    pub fn new(name: &str, geometry_type: OGRwkbGeometryType::Type) -> Self {
        GeomFieldDefn {
            name: name.to_string(),
            geometry_type,
            spatial_ref: None,
            nullable: true,
            ignored: false,
            coord_precision: CoordPrecision::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn geometry_type(&self) -> OGRwkbGeometryType::Type {
        self.geometry_type
    }

    pub fn set_geometry_type(&mut self, geometry_type: OGRwkbGeometryType::Type) {
        self.geometry_type = geometry_type;
    }

    pub fn spatial_ref(&self) -> Option<&Arc<SpatialRef>> {
        self.spatial_ref.as_ref()
    }

    pub fn set_spatial_ref(&mut self, spatial_ref: Option<Arc<SpatialRef>>) {
        self.spatial_ref = spatial_ref;
    }

    pub fn is_nullable(&self) -> bool {
        self.nullable
    }

    pub fn set_nullable(&mut self, nullable: bool) {
        self.nullable = nullable;
    }

    pub fn is_ignored(&self) -> bool {
        self.ignored
    }

    pub fn set_ignored(&mut self, ignored: bool) {
        self.ignored = ignored;
    }

    pub fn coord_precision(&self) -> CoordPrecision {
        self.coord_precision
    }

    pub fn set_coord_precision(&mut self, coord_precision: CoordPrecision) {
        self.coord_precision = coord_precision;
    }
}

/// Layer definition
///
/// Defines the attribute and geometry fields available for features in a layer.
/// Features share their layer's definition through an [`Arc`]; a layer
/// changes its schema with [`Arc::make_mut`], so features read before the
/// change keep the definition they were created with.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Defn {
    name: String,
    fields: Vec<FieldDefn>,
    geom_fields: Vec<GeomFieldDefn>,
    style_ignored: bool,
}

impl Defn {
    /// A definition without any field.
    pub fn new(name: &str) -> Self {
        Defn {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// A definition with a single unnamed geometry field, unless
    /// `geometry_type` is `wkbNone`.
    pub fn with_geometry(name: &str, geometry_type: OGRwkbGeometryType::Type) -> Self {
        let mut defn = Defn::new(name);
        if geometry_type != OGRwkbGeometryType::wkbNone {
            defn.add_geom_field_defn(GeomFieldDefn::new("", geometry_type));
        }
        defn
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Iterate over the field schema of this layer.
    pub fn fields(&self) -> impl Iterator<Item = &FieldDefn> {
        self.fields.iter()
    }

    /// Iterate over the geometry field schema of this layer.
    pub fn geom_fields(&self) -> impl Iterator<Item = &GeomFieldDefn> {
        self.geom_fields.iter()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn geom_field_count(&self) -> usize {
        self.geom_fields.len()
    }

    pub fn field(&self, index: usize) -> Option<&FieldDefn> {
        self.fields.get(index)
    }

    pub fn field_mut(&mut self, index: usize) -> Option<&mut FieldDefn> {
        self.fields.get_mut(index)
    }

    pub fn geom_field(&self, index: usize) -> Option<&GeomFieldDefn> {
        self.geom_fields.get(index)
    }

    pub fn geom_field_mut(&mut self, index: usize) -> Option<&mut GeomFieldDefn> {
        self.geom_fields.get_mut(index)
    }

    /// Index of the attribute field called `name`, compared case-insensitively.
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Index of the geometry field called `name`, compared case-insensitively.
    pub fn geom_field_index(&self, name: &str) -> Option<usize> {
        self.geom_fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
    }

    /// Get the geometry type of the first geometry field, `wkbNone` without one.
    pub fn geometry_type(&self) -> OGRwkbGeometryType::Type {
        self.geom_fields
            .first()
            .map_or(OGRwkbGeometryType::wkbNone, |g| g.geometry_type)
    }

    pub fn add_field_defn(&mut self, field: FieldDefn) {
        self.fields.push(field);
    }

    pub fn add_geom_field_defn(&mut self, field: GeomFieldDefn) {
        self.geom_fields.push(field);
    }

    /// Removes the attribute field at `index` and hands it back.
    pub fn steal_field_defn(&mut self, index: usize) -> Result<FieldDefn> {
        if index >= self.fields.len() {
            return Err(GdalError::InvalidFieldIndex {
                index,
                method_name: "steal_field_defn",
            });
        }
        Ok(self.fields.remove(index))
    }

    /// Removes the geometry field at `index` and hands it back.
    pub fn steal_geom_field_defn(&mut self, index: usize) -> Result<GeomFieldDefn> {
        if index >= self.geom_fields.len() {
            return Err(GdalError::InvalidFieldIndex {
                index,
                method_name: "steal_geom_field_defn",
            });
        }
        Ok(self.geom_fields.remove(index))
    }

    /// Reorders the attribute fields so that the field formerly at
    /// `new_order[i]` ends up at position `i`.
    pub fn reorder_field_defns(&mut self, new_order: &[usize]) -> Result<()> {
        if !is_valid_permutation(new_order, self.fields.len()) {
            return Err(GdalError::BadArgument(format!(
                "Invalid field order {new_order:?} for {} fields",
                self.fields.len()
            )));
        }
        let reordered = new_order.iter().map(|&i| self.fields[i].clone()).collect();
        self.fields = reordered;
        Ok(())
    }

    pub fn is_geometry_ignored(&self) -> bool {
        self.geom_fields.first().is_some_and(|g| g.ignored)
    }

    pub fn set_geometry_ignored(&mut self, ignored: bool) {
        if let Some(g) = self.geom_fields.first_mut() {
            g.ignored = ignored;
        }
    }

    pub fn is_style_ignored(&self) -> bool {
        self.style_ignored
    }

    pub fn set_style_ignored(&mut self, ignored: bool) {
        self.style_ignored = ignored;
    }
}

/// Whether `map` holds every index in `0..n` exactly once.
pub(crate) fn is_valid_permutation(map: &[usize], n: usize) -> bool {
    if map.len() != n {
        return false;
    }
    let mut seen = vec![false; n];
    for &i in map {
        if i >= n || seen[i] {
            return false;
        }
        seen[i] = true;
    }
    true
}
