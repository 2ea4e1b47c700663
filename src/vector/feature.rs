use std::sync::Arc;

use chrono::{DateTime, FixedOffset, NaiveDate};

use crate::errors::*;
use crate::vector::{Defn, Geometry, LayerAccess, OGRFieldType};

/// Identifier of a feature that has not been assigned one yet.
pub const FID_NULL: i64 = -1;

/// OGR Feature
///
/// Attribute values and geometries are stored in the order of the
/// definition the feature was created with.
#[derive(Clone, Debug, PartialEq)]
pub struct Feature {
    defn: Arc<Defn>,
    fid: i64,
    fields: Vec<Option<FieldValue>>,
    geometries: Vec<Option<Geometry>>,
    style: Option<String>,
}

impl Feature {
    pub fn new(defn: Arc<Defn>) -> Feature {
        let fields = vec![None; defn.field_count()];
        let geometries = vec![None; defn.geom_field_count()];
        Feature {
            defn,
            fid: FID_NULL,
            fields,
            geometries,
            style: None,
        }
    }

    pub fn defn(&self) -> &Arc<Defn> {
        &self.defn
    }

    /// Get the feature identifier, [`FID_NULL`] when unassigned.
    pub fn fid(&self) -> i64 {
        self.fid
    }

    pub fn set_fid(&mut self, fid: i64) {
        self.fid = fid;
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn geom_field_count(&self) -> usize {
        self.geometries.len()
    }

    /// Get the index of the named field.
    pub fn field_index(&self, field_name: &str) -> Result<usize> {
        self.defn
            .field_index(field_name)
            .ok_or_else(|| GdalError::InvalidFieldName {
                field_name: field_name.to_string(),
                method_name: "field_index",
            })
    }

    /// Get the value of a named field. If the field exists, it returns a
    /// `FieldValue` wrapper, that you need to unpack to a base type
    /// (string, float, etc). If the field is unset, returns `None`.
    pub fn field(&self, name: &str) -> Result<Option<FieldValue>> {
        let idx = self.field_index(name)?;
        Ok(self.fields[idx].clone())
    }

    pub fn field_by_index(&self, idx: usize) -> Result<Option<&FieldValue>> {
        self.fields
            .get(idx)
            .map(Option::as_ref)
            .ok_or(GdalError::InvalidFieldIndex {
                index: idx,
                method_name: "field_by_index",
            })
    }

    pub fn is_field_set(&self, idx: usize) -> bool {
        matches!(self.fields.get(idx), Some(Some(_)))
    }

    /// Set a field's value; the value must match the declared field type.
    pub fn set_field_by_index(&mut self, idx: usize, value: FieldValue) -> Result<()> {
        let field_type = self
            .defn
            .field(idx)
            .ok_or(GdalError::InvalidFieldIndex {
                index: idx,
                method_name: "set_field_by_index",
            })?
            .field_type();
        if !value.fits(field_type) {
            return Err(GdalError::UnhandledFieldType {
                field_type,
                method_name: "set_field_by_index",
            });
        }
        self.fields[idx] = Some(value);
        Ok(())
    }

    pub fn set_field(&mut self, field_name: &str, value: &FieldValue) -> Result<()> {
        let idx = self.field_index(field_name)?;
        self.set_field_by_index(idx, value.clone())
    }

    pub fn set_field_string(&mut self, field_name: &str, value: &str) -> Result<()> {
        self.set_field(field_name, &FieldValue::StringValue(value.to_string()))
    }

    pub fn set_field_double(&mut self, field_name: &str, value: f64) -> Result<()> {
        self.set_field(field_name, &FieldValue::RealValue(value))
    }

    pub fn set_field_integer(&mut self, field_name: &str, value: i32) -> Result<()> {
        self.set_field(field_name, &FieldValue::IntegerValue(value))
    }

    pub fn set_field_integer64(&mut self, field_name: &str, value: i64) -> Result<()> {
        self.set_field(field_name, &FieldValue::Integer64Value(value))
    }

    /// Marks the field as unset.
    pub fn unset_field(&mut self, idx: usize) -> Result<()> {
        let slot = self.fields.get_mut(idx).ok_or(GdalError::InvalidFieldIndex {
            index: idx,
            method_name: "unset_field",
        })?;
        *slot = None;
        Ok(())
    }

    /// Copies attribute values from `other`.
    ///
    /// `map[i]` gives the index in this feature receiving field `i` of
    /// `other`; `None` drops the value.
    pub fn set_fields_from(&mut self, other: &Feature, map: &[Option<usize>]) -> Result<()> {
        for (src, dst) in map.iter().enumerate() {
            let Some(dst) = *dst else {
                continue;
            };
            let value = other.fields.get(src).ok_or(GdalError::InvalidFieldIndex {
                index: src,
                method_name: "set_fields_from",
            })?;
            let slot = self.fields.get_mut(dst).ok_or(GdalError::InvalidFieldIndex {
                index: dst,
                method_name: "set_fields_from",
            })?;
            *slot = value.clone();
        }
        Ok(())
    }

    /// Get the feature's first geometry.
    pub fn geometry(&self) -> Option<&Geometry> {
        self.geometries.first().and_then(Option::as_ref)
    }

    pub fn geometry_by_index(&self, idx: usize) -> Result<Option<&Geometry>> {
        self.geometries
            .get(idx)
            .map(Option::as_ref)
            .ok_or(GdalError::InvalidFieldIndex {
                index: idx,
                method_name: "geometry_by_index",
            })
    }

    pub fn geometry_by_name(&self, field_name: &str) -> Result<Option<&Geometry>> {
        let idx = self
            .defn
            .geom_field_index(field_name)
            .ok_or_else(|| GdalError::InvalidFieldName {
                field_name: field_name.to_string(),
                method_name: "geometry_by_name",
            })?;
        self.geometry_by_index(idx)
    }

    /// Set the first geometry.
    pub fn set_geometry(&mut self, geom: Geometry) -> Result<()> {
        self.set_geometry_by_index(0, Some(geom))
    }

    pub fn set_geometry_by_index(&mut self, idx: usize, geom: Option<Geometry>) -> Result<()> {
        let slot = self
            .geometries
            .get_mut(idx)
            .ok_or(GdalError::InvalidFieldIndex {
                index: idx,
                method_name: "set_geometry_by_index",
            })?;
        *slot = geom;
        Ok(())
    }

    /// Takes the geometry out of slot `idx`, leaving it empty.
    pub fn steal_geometry(&mut self, idx: usize) -> Option<Geometry> {
        self.geometries.get_mut(idx).and_then(Option::take)
    }

    pub(crate) fn geometries_mut(&mut self) -> impl Iterator<Item = &mut Option<Geometry>> {
        self.geometries.iter_mut()
    }

    pub fn style_string(&self) -> Option<&str> {
        self.style.as_deref()
    }

    pub fn set_style_string(&mut self, style: Option<&str>) {
        self.style = style.map(str::to_string);
    }

    /// Inserts this feature into `layer`, see [`LayerAccess::create_feature`].
    pub fn create<L: LayerAccess + ?Sized>(&mut self, layer: &mut L) -> Result<()> {
        layer.create_feature(self)
    }

    /// Rebinds the feature to `defn`, where field `i` of the new
    /// definition takes the value of field `source[i]` of the old one.
    ///
    /// `None` entries start unset.
    pub(crate) fn remap_fields(&mut self, defn: Arc<Defn>, source: &[Option<usize>]) {
        let mut old = std::mem::take(&mut self.fields);
        self.fields = source
            .iter()
            .map(|s| s.and_then(|i| old.get_mut(i).and_then(Option::take)))
            .collect();
        self.fields.resize(defn.field_count(), None);
        self.geometries.resize(defn.geom_field_count(), None);
        self.defn = defn;
    }

    /// Rebinds the feature to `defn`, where geometry field `i` of the new
    /// definition takes geometry field `source[i]` of the old one.
    pub(crate) fn remap_geom_fields(&mut self, defn: Arc<Defn>, source: &[Option<usize>]) {
        let mut old = std::mem::take(&mut self.geometries);
        self.geometries = source
            .iter()
            .map(|s| s.and_then(|i| old.get_mut(i).and_then(Option::take)))
            .collect();
        self.geometries.resize(defn.geom_field_count(), None);
        self.fields.resize(defn.field_count(), None);
        self.defn = defn;
    }

    /// Points the feature at `defn`, which has the same field layout.
    pub(crate) fn rebind(&mut self, defn: Arc<Defn>) {
        self.defn = defn;
    }

    /// Clears the slots flagged as ignored in the definition.
    pub(crate) fn clear_ignored(&mut self) {
        for (i, field) in self.defn.fields().enumerate() {
            if field.is_ignored() {
                self.fields[i] = None;
            }
        }
        for (i, field) in self.defn.geom_fields().enumerate() {
            if field.is_ignored() {
                self.geometries[i] = None;
            }
        }
        if self.defn.is_style_ignored() {
            self.style = None;
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum FieldValue {
    IntegerValue(i32),
    IntegerListValue(Vec<i32>),
    Integer64Value(i64),
    Integer64ListValue(Vec<i64>),
    StringValue(String),
    StringListValue(Vec<String>),
    RealValue(f64),
    RealListValue(Vec<f64>),
    DateValue(NaiveDate),
    DateTimeValue(DateTime<FixedOffset>),
}

impl FieldValue {
    /// Interpret the value as `String`. Returns `None` if the value is something else.
    pub fn into_string(self) -> Option<String> {
        match self {
            FieldValue::StringValue(rv) => Some(rv),
            _ => None,
        }
    }

    /// Interpret the value as `f64`, converting integers.
    pub fn into_real(self) -> Option<f64> {
        match self {
            FieldValue::RealValue(rv) => Some(rv),
            FieldValue::IntegerValue(rv) => Some(rv as f64),
            FieldValue::Integer64Value(rv) => Some(rv as f64),
            _ => None,
        }
    }

    pub fn into_int(self) -> Option<i32> {
        match self {
            FieldValue::IntegerValue(rv) => Some(rv),
            FieldValue::Integer64Value(rv) => i32::try_from(rv).ok(),
            _ => None,
        }
    }

    pub fn into_int64(self) -> Option<i64> {
        match self {
            FieldValue::IntegerValue(rv) => Some(rv as i64),
            FieldValue::Integer64Value(rv) => Some(rv),
            _ => None,
        }
    }

    pub fn into_date(self) -> Option<NaiveDate> {
        match self {
            FieldValue::DateValue(rv) => Some(rv),
            FieldValue::DateTimeValue(rv) => Some(rv.date_naive()),
            _ => None,
        }
    }

    pub fn into_datetime(self) -> Option<DateTime<FixedOffset>> {
        match self {
            FieldValue::DateTimeValue(rv) => Some(rv),
            _ => None,
        }
    }

    /// The field type this value is stored as.
    pub fn ogr_field_type(&self) -> OGRFieldType::Type {
        match self {
            FieldValue::IntegerValue(_) => OGRFieldType::OFTInteger,
            FieldValue::IntegerListValue(_) => OGRFieldType::OFTIntegerList,
            FieldValue::Integer64Value(_) => OGRFieldType::OFTInteger64,
            FieldValue::Integer64ListValue(_) => OGRFieldType::OFTInteger64List,
            FieldValue::StringValue(_) => OGRFieldType::OFTString,
            FieldValue::StringListValue(_) => OGRFieldType::OFTStringList,
            FieldValue::RealValue(_) => OGRFieldType::OFTReal,
            FieldValue::RealListValue(_) => OGRFieldType::OFTRealList,
            FieldValue::DateValue(_) => OGRFieldType::OFTDate,
            FieldValue::DateTimeValue(_) => OGRFieldType::OFTDateTime,
        }
    }

    /// Whether the value may be stored in a field of `field_type`.
    fn fits(&self, field_type: OGRFieldType::Type) -> bool {
        use OGRFieldType::*;
        let own = self.ogr_field_type();
        own == field_type
            || matches!(
                (own, field_type),
                (OFTInteger, OFTInteger64) | (OFTInteger, OFTReal) | (OFTInteger64, OFTReal)
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{FieldDefn, OGRwkbGeometryType};

    fn defn() -> Arc<Defn> {
        let mut defn = Defn::with_geometry("places", OGRwkbGeometryType::wkbPoint);
        defn.add_field_defn(FieldDefn::new("name", OGRFieldType::OFTString));
        defn.add_field_defn(FieldDefn::new("population", OGRFieldType::OFTInteger64));
        defn.add_field_defn(FieldDefn::new("founded", OGRFieldType::OFTDate));
        Arc::new(defn)
    }

    #[test]
    fn test_fields() -> Result<()> {
        let mut feature = Feature::new(defn());
        assert_eq!(feature.fid(), FID_NULL);
        assert_eq!(feature.field("name")?, None);

        feature.set_field_string("name", "Lyon")?;
        feature.set_field_integer("population", 522_000)?;
        let date = NaiveDate::from_ymd_opt(1989, 1, 1).unwrap();
        feature.set_field("founded", &FieldValue::DateValue(date))?;

        assert_eq!(
            feature.field("NAME")?.and_then(FieldValue::into_string),
            Some("Lyon".to_string())
        );
        assert_eq!(
            feature.field("population")?.and_then(FieldValue::into_int64),
            Some(522_000)
        );
        assert_eq!(
            feature.field("founded")?.and_then(FieldValue::into_date),
            Some(date)
        );
        assert!(feature.set_field_double("name", 1.0).is_err());
        assert!(feature.field("missing").is_err());

        feature.unset_field(0)?;
        assert!(!feature.is_field_set(0));
        Ok(())
    }

    #[test]
    fn test_steal_geometry() -> Result<()> {
        let mut feature = Feature::new(defn());
        feature.set_geometry(Geometry::point(1.0, 2.0))?;
        assert!(feature.geometry().is_some());
        let geom = feature.steal_geometry(0);
        assert_eq!(geom, Some(Geometry::point(1.0, 2.0)));
        assert!(feature.geometry().is_none());
        assert!(feature.set_geometry_by_index(3, None).is_err());
        Ok(())
    }

    #[test]
    fn test_set_fields_from() -> Result<()> {
        let mut src = Feature::new(defn());
        src.set_field_string("name", "Lyon")?;
        src.set_field_integer64("population", 7)?;

        let mut other = Defn::new("other");
        other.add_field_defn(FieldDefn::new("pop", OGRFieldType::OFTInteger64));
        let mut dst = Feature::new(Arc::new(other));
        dst.set_fields_from(&src, &[None, Some(0), None])?;
        assert_eq!(
            dst.field("pop")?.and_then(FieldValue::into_int64),
            Some(7)
        );
        assert!(dst.set_fields_from(&src, &[Some(4)]).is_err());
        Ok(())
    }

    #[test]
    fn test_remap_fields() -> Result<()> {
        let mut feature = Feature::new(defn());
        feature.set_field_string("name", "Lyon")?;
        feature.set_field_integer64("population", 7)?;

        let mut reordered = (*defn()).clone();
        reordered.reorder_field_defns(&[1, 0, 2])?;
        feature.remap_fields(Arc::new(reordered), &[Some(1), Some(0), Some(2)]);
        assert_eq!(
            feature.field_by_index(0)?,
            Some(&FieldValue::Integer64Value(7))
        );
        assert_eq!(feature.field("name")?.and_then(FieldValue::into_string), Some("Lyon".into()));
        Ok(())
    }
}
