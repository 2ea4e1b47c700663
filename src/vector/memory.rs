//! In-process layer backend.

use std::cell::Cell;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use crate::errors::*;
use crate::options::{AlterFieldDefnFlags, AlterGeomFieldDefnFlags};
use crate::vector::transaction::{ChangeLogMark, FieldChangeKind};
use crate::vector::{
    Defn, Feature, FieldDefn, FieldValue, GeomFieldDefn, LayerAccess, LayerBase, LayerCaps,
    OGRFieldType, OGRwkbGeometryType, FID_NULL,
};

#[derive(Clone, Debug)]
struct Snapshot {
    name: String,
    rows: BTreeMap<i64, Feature>,
    next_fid: i64,
    log_mark: ChangeLogMark,
}

/// A layer keeping its features in memory, ordered by FID.
///
/// Supports every optional operation of [`LayerAccess`], including
/// transactions with named savepoints. Individual capabilities can be
/// switched off with [`MemoryLayer::set_capability`], which is how callers
/// make it behave like a backend without curve or measure support.
#[derive(Debug)]
pub struct MemoryLayer {
    base: LayerBase,
    rows: BTreeMap<i64, Feature>,
    next_fid: i64,
    // lowest FID the reader may return next, `None` once exhausted
    cursor: Cell<Option<i64>>,
    disabled: HashSet<LayerCaps>,
    transaction: Option<Snapshot>,
    savepoints: Vec<Snapshot>,
}

impl MemoryLayer {
    /// An empty layer with one unnamed geometry field of `geometry_type`,
    /// or none for `wkbNone`.
    pub fn new(name: &str, geometry_type: OGRwkbGeometryType::Type) -> Self {
        Self::from_defn(Defn::with_geometry(name, geometry_type))
    }

    pub fn from_defn(defn: Defn) -> Self {
        MemoryLayer {
            base: LayerBase::new(defn),
            rows: BTreeMap::new(),
            next_fid: 0,
            cursor: Cell::new(Some(i64::MIN)),
            disabled: HashSet::new(),
            transaction: None,
            savepoints: Vec::new(),
        }
    }

    /// Enables or disables a capability.
    ///
    /// Disabling a write capability only changes what the layer reports,
    /// except for curves and measures, which are then normalized away on
    /// write.
    pub fn set_capability(&mut self, capability: LayerCaps, enabled: bool) {
        if enabled {
            self.disabled.remove(&capability);
        } else {
            self.disabled.insert(capability);
        }
    }

    /// Number of stored features, regardless of filters.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    fn is_unfiltered(&self) -> bool {
        self.base.spatial_filter().is_none() && self.base.attribute_filter().is_none()
    }

    fn savepoint_name(&self) -> &str {
        self.savepoints.last().map_or("", |s| s.name.as_str())
    }

    fn in_transaction(&self) -> bool {
        self.transaction.is_some()
    }

    /// Copy of a stored row as handed to callers.
    fn output(&self, row: &Feature) -> Feature {
        let mut feature = row.clone();
        feature.rebind(self.base.defn_arc().clone());
        feature.clear_ignored();
        feature
    }

    /// Copy of `feature` laid out for the current schema.
    ///
    /// Features built on another definition are matched by field name.
    fn conform(&self, feature: &Feature) -> Result<Feature> {
        let defn = self.base.defn_arc();
        if same_layout(defn, feature.defn()) {
            let mut row = feature.clone();
            row.rebind(defn.clone());
            return Ok(row);
        }
        let mut row = Feature::new(defn.clone());
        row.set_fid(feature.fid());
        let map: Vec<Option<usize>> = feature
            .defn()
            .fields()
            .map(|f| defn.field_index(f.name()))
            .collect();
        row.set_fields_from(feature, &map)?;
        for (i, field) in feature.defn().geom_fields().enumerate() {
            let target = match field.name() {
                "" => Some(i).filter(|&i| i < defn.geom_field_count()),
                name => defn.geom_field_index(name),
            };
            if let Some(target) = target {
                row.set_geometry_by_index(target, feature.geometry_by_index(i)?.cloned())?;
            }
        }
        row.set_style_string(feature.style_string());
        Ok(row)
    }

    fn store(&mut self, mut row: Feature) {
        let fid = row.fid();
        self.next_fid = self.next_fid.max(fid.saturating_add(1));
        row.rebind(self.base.defn_arc().clone());
        self.rows.insert(fid, row);
    }

    /// Puts back rows saved before schema changes that were since undone.
    fn restore(&mut self, snapshot: &Snapshot) -> Result<()> {
        self.next_fid = snapshot.next_fid;
        self.rows = BTreeMap::new();
        for row in snapshot.rows.values() {
            let row = self.conform(row)?;
            self.rows.insert(row.fid(), row);
        }
        self.reset_reading();
        Ok(())
    }

    fn record_field(&mut self, kind: FieldChangeKind, index: usize, defn: FieldDefn) {
        if self.in_transaction() {
            let savepoint = self.savepoint_name().to_string();
            self.base
                .change_log_mut()
                .record_field(kind, index, defn, &savepoint);
        }
    }

    fn record_geom_field(&mut self, kind: FieldChangeKind, index: usize, defn: GeomFieldDefn) {
        if self.in_transaction() {
            let savepoint = self.savepoint_name().to_string();
            self.base
                .change_log_mut()
                .record_geom_field(kind, index, defn, &savepoint);
        }
    }

    fn remap_rows(&mut self, source: &[Option<usize>]) {
        let defn = self.base.defn_arc().clone();
        for row in self.rows.values_mut() {
            row.remap_fields(defn.clone(), source);
        }
    }

    /// Marks a named point inside the current transaction that
    /// [`rollback_to_savepoint`](MemoryLayer::rollback_to_savepoint) can
    /// return to.
    pub fn set_savepoint(&mut self, name: &str) -> Result<()> {
        if !self.in_transaction() {
            tracing::error!("Savepoint {name} set outside of a transaction");
            return Err(failure("set_savepoint"));
        }
        if name.is_empty() || self.savepoints.iter().any(|s| s.name == name) {
            return Err(GdalError::BadArgument(format!(
                "Invalid or duplicate savepoint name '{name}'"
            )));
        }
        self.savepoints.push(Snapshot {
            name: name.to_string(),
            rows: self.rows.clone(),
            next_fid: self.next_fid,
            log_mark: self.base.change_log().mark(),
        });
        Ok(())
    }

    /// Undoes the data and schema changes made since savepoint `name`,
    /// which stays set. Later savepoints are released.
    pub fn rollback_to_savepoint(&mut self, name: &str) -> Result<()> {
        let Some(pos) = self.savepoints.iter().position(|s| s.name == name) else {
            tracing::error!("Unknown savepoint {name}");
            return Err(failure("rollback_to_savepoint"));
        };
        self.savepoints.truncate(pos + 1);
        let snapshot = self.savepoints[pos].clone();
        self.base.finish_rollback_since(snapshot.log_mark);
        self.restore(&snapshot)
    }

    /// Forgets savepoint `name` and the ones set after it, keeping their changes.
    pub fn release_savepoint(&mut self, name: &str) -> Result<()> {
        let Some(pos) = self.savepoints.iter().position(|s| s.name == name) else {
            tracing::error!("Unknown savepoint {name}");
            return Err(failure("release_savepoint"));
        };
        self.savepoints.truncate(pos);
        Ok(())
    }
}

fn same_layout(a: &Arc<Defn>, b: &Arc<Defn>) -> bool {
    Arc::ptr_eq(a, b)
        || (a.field_count() == b.field_count()
            && a.geom_field_count() == b.geom_field_count()
            && a.fields()
                .zip(b.fields())
                .all(|(x, y)| x.name() == y.name() && x.field_type() == y.field_type())
            && a.geom_fields().zip(b.geom_fields()).all(|(x, y)| x.name() == y.name()))
}

/// Converts a value for a field whose type changed, `None` when it does
/// not carry over.
fn convert_value(value: FieldValue, field_type: OGRFieldType::Type) -> Option<FieldValue> {
    use OGRFieldType::*;
    if value.ogr_field_type() == field_type {
        return Some(value);
    }
    match field_type {
        OFTString => match value {
            FieldValue::IntegerValue(v) => Some(FieldValue::StringValue(v.to_string())),
            FieldValue::Integer64Value(v) => Some(FieldValue::StringValue(v.to_string())),
            FieldValue::RealValue(v) => Some(FieldValue::StringValue(v.to_string())),
            _ => None,
        },
        OFTReal => match value {
            FieldValue::StringValue(s) => s.trim().parse().ok().map(FieldValue::RealValue),
            other => other.into_real().map(FieldValue::RealValue),
        },
        OFTInteger64 => match value {
            FieldValue::StringValue(s) => s.trim().parse().ok().map(FieldValue::Integer64Value),
            other => other.into_int64().map(FieldValue::Integer64Value),
        },
        OFTInteger => match value {
            FieldValue::StringValue(s) => s.trim().parse().ok().map(FieldValue::IntegerValue),
            other => other.into_int().map(FieldValue::IntegerValue),
        },
        OFTDate => value.into_date().map(FieldValue::DateValue),
        _ => None,
    }
}

impl LayerAccess for MemoryLayer {
    fn base(&self) -> &LayerBase {
        &self.base
    }

    fn base_mut(&mut self) -> &mut LayerBase {
        &mut self.base
    }

    fn reset_reading(&self) {
        self.cursor.set(Some(i64::MIN));
    }

    fn next_feature(&self) -> Option<Feature> {
        let from = self.cursor.get()?;
        for (&fid, row) in self.rows.range(from..) {
            if self.base.accepts(row) {
                self.cursor.set(fid.checked_add(1));
                self.base.mark_feature_read();
                return Some(self.output(row));
            }
        }
        self.cursor.set(None);
        None
    }

    fn test_capability(&self, capability: &str) -> bool {
        let Some(capability) = LayerCaps::from_name(capability) else {
            return false;
        };
        if self.disabled.contains(&capability) {
            return false;
        }
        match capability {
            LayerCaps::OLCFastFeatureCount | LayerCaps::OLCFastSetNextByIndex => {
                self.is_unfiltered()
            }
            LayerCaps::OLCFastSpatialFilter
            | LayerCaps::OLCFastGetExtent
            | LayerCaps::OLCFastGetExtent3D => false,
            _ => true,
        }
    }

    fn rename(&mut self, new_name: &str) -> Result<()> {
        if !self.has_capability(LayerCaps::OLCRename) {
            tracing::error!("Rename() not supported by layer {}", self.name());
            return Err(unsupported("rename"));
        }
        self.base.defn_mut().set_name(new_name);
        Ok(())
    }

    fn count_features(&self, force: bool) -> i64 {
        if self.is_unfiltered() {
            return self.rows.len() as i64;
        }
        if !force {
            return -1;
        }
        self.rows.values().filter(|r| self.base.accepts(r)).count() as i64
    }

    fn feature(&mut self, fid: i64) -> Option<Feature> {
        self.rows.get(&fid).map(|row| self.output(row))
    }

    fn set_next_by_index(&self, index: i64) -> Result<()> {
        if index < 0 {
            return Err(failure("set_next_by_index"));
        }
        if self.is_unfiltered() {
            let index = index as usize;
            if index > self.rows.len() {
                return Err(failure("set_next_by_index"));
            }
            self.cursor.set(self.rows.keys().nth(index).copied());
            return Ok(());
        }
        self.reset_reading();
        for _ in 0..index {
            if self.next_feature().is_none() {
                return Err(failure("set_next_by_index"));
            }
        }
        Ok(())
    }

    fn i_create_feature(&mut self, feature: &mut Feature) -> Result<()> {
        let mut row = self.conform(feature)?;
        let fid = feature.fid();
        if fid < 0 || self.rows.contains_key(&fid) {
            row.set_fid(self.next_fid);
        }
        feature.set_fid(row.fid());
        self.store(row);
        Ok(())
    }

    fn i_set_feature(&mut self, feature: &mut Feature) -> Result<()> {
        if feature.fid() == FID_NULL {
            tracing::error!("SetFeature() with unset FID fails.");
            return Err(failure("set_feature"));
        }
        if !self.rows.contains_key(&feature.fid()) {
            return Err(ogr_error(OGRErr::OGRERR_NON_EXISTING_FEATURE, "set_feature"));
        }
        let row = self.conform(feature)?;
        self.store(row);
        Ok(())
    }

    fn i_upsert_feature(&mut self, feature: &mut Feature) -> Result<()> {
        if self.rows.contains_key(&feature.fid()) {
            self.i_set_feature(feature)
        } else {
            self.i_create_feature(feature)
        }
    }

    fn delete_feature(&mut self, fid: i64) -> Result<()> {
        match self.rows.remove(&fid) {
            Some(_) => Ok(()),
            None => Err(ogr_error(
                OGRErr::OGRERR_NON_EXISTING_FEATURE,
                "delete_feature",
            )),
        }
    }

    fn create_field(&mut self, field: &FieldDefn, _approx_ok: bool) -> Result<()> {
        let count = self.base.defn().field_count();
        self.base.defn_mut().add_field_defn(field.clone());
        let mut source: Vec<Option<usize>> = (0..count).map(Some).collect();
        source.push(None);
        self.remap_rows(&source);
        self.record_field(FieldChangeKind::Add, count, field.clone());
        Ok(())
    }

    fn delete_field(&mut self, index: usize) -> Result<()> {
        let count = self.base.defn().field_count();
        let removed = self.base.defn_mut().steal_field_defn(index)?;
        let source: Vec<Option<usize>> = (0..count).filter(|&i| i != index).map(Some).collect();
        self.remap_rows(&source);
        self.record_field(FieldChangeKind::Delete, index, removed);
        Ok(())
    }

    /// Permutes the fields and the row values with them.
    ///
    /// Reordering is not recorded in the transaction change log: the new
    /// order is kept when the transaction is rolled back.
    fn reorder_fields(&mut self, new_order: &[usize]) -> Result<()> {
        self.base.defn_mut().reorder_field_defns(new_order)?;
        let source: Vec<Option<usize>> = new_order.iter().copied().map(Some).collect();
        self.remap_rows(&source);
        Ok(())
    }

    fn alter_field_defn(
        &mut self,
        index: usize,
        new_defn: &FieldDefn,
        flags: AlterFieldDefnFlags,
    ) -> Result<()> {
        let Some(old) = self.base.defn().field(index).cloned() else {
            tracing::error!("Invalid field index {index}");
            return Err(GdalError::InvalidFieldIndex {
                index,
                method_name: "alter_field_defn",
            });
        };
        let field = self
            .base
            .defn_mut()
            .field_mut(index)
            .ok_or(GdalError::InvalidFieldIndex {
                index,
                method_name: "alter_field_defn",
            })?;
        if flags.contains(AlterFieldDefnFlags::NAME) {
            field.set_name(new_defn.name());
        }
        if flags.contains(AlterFieldDefnFlags::TYPE) {
            field.set_type(new_defn.field_type());
        }
        if flags.contains(AlterFieldDefnFlags::WIDTH_PRECISION) {
            field.set_width(new_defn.width());
            field.set_precision(new_defn.precision());
        }
        if flags.contains(AlterFieldDefnFlags::NULLABLE) {
            field.set_nullable(new_defn.is_nullable());
        }
        if flags.contains(AlterFieldDefnFlags::DEFAULT) {
            field.set_default(new_defn.default_value().unwrap_or_default());
        }
        if flags.contains(AlterFieldDefnFlags::UNIQUE) {
            field.set_unique(new_defn.is_unique());
        }
        let new_type = field.field_type();

        if new_type != old.field_type() {
            let defn = self.base.defn_arc().clone();
            for row in self.rows.values_mut() {
                let value = row.field_by_index(index)?.cloned();
                row.rebind(defn.clone());
                match value.and_then(|v| convert_value(v, new_type)) {
                    Some(converted) => row.set_field_by_index(index, converted)?,
                    None => row.unset_field(index)?,
                }
            }
        }
        self.record_field(FieldChangeKind::Alter, index, old);
        Ok(())
    }

    fn create_geom_field(&mut self, field: &GeomFieldDefn, _approx_ok: bool) -> Result<()> {
        let count = self.base.defn().geom_field_count();
        self.base.defn_mut().add_geom_field_defn(field.clone());
        let defn = self.base.defn_arc().clone();
        let mut source: Vec<Option<usize>> = (0..count).map(Some).collect();
        source.push(None);
        for row in self.rows.values_mut() {
            row.remap_geom_fields(defn.clone(), &source);
        }
        self.record_geom_field(FieldChangeKind::Add, count, field.clone());
        Ok(())
    }

    fn alter_geom_field_defn(
        &mut self,
        index: usize,
        new_defn: &GeomFieldDefn,
        flags: AlterGeomFieldDefnFlags,
    ) -> Result<()> {
        let Some(old) = self.base.defn().geom_field(index).cloned() else {
            tracing::error!("Invalid geometry field index {index}");
            return Err(GdalError::InvalidFieldIndex {
                index,
                method_name: "alter_geom_field_defn",
            });
        };
        let field = self
            .base
            .defn_mut()
            .geom_field_mut(index)
            .ok_or(GdalError::InvalidFieldIndex {
                index,
                method_name: "alter_geom_field_defn",
            })?;
        if flags.contains(AlterGeomFieldDefnFlags::NAME) {
            field.set_name(new_defn.name());
        }
        if flags.contains(AlterGeomFieldDefnFlags::TYPE) {
            field.set_geometry_type(new_defn.geometry_type());
        }
        if flags.contains(AlterGeomFieldDefnFlags::NULLABLE) {
            field.set_nullable(new_defn.is_nullable());
        }
        if flags.contains(AlterGeomFieldDefnFlags::SRS) {
            field.set_spatial_ref(new_defn.spatial_ref().cloned());
        }
        if flags.contains(AlterGeomFieldDefnFlags::COORD_PRECISION) {
            field.set_coord_precision(new_defn.coord_precision());
        }
        self.record_geom_field(FieldChangeKind::Alter, index, old);
        Ok(())
    }

    fn start_transaction(&mut self) -> Result<()> {
        if self.in_transaction() {
            tracing::error!("A transaction is already active on layer {}", self.name());
            return Err(failure("start_transaction"));
        }
        self.base.prepare_start_transaction();
        self.transaction = Some(Snapshot {
            name: String::new(),
            rows: self.rows.clone(),
            next_fid: self.next_fid,
            log_mark: self.base.change_log().mark(),
        });
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<()> {
        if self.transaction.take().is_none() {
            tracing::error!("No transaction to commit on layer {}", self.name());
            return Err(failure("commit_transaction"));
        }
        self.savepoints.clear();
        self.base.change_log_mut().clear();
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        let Some(snapshot) = self.transaction.take() else {
            tracing::error!("No transaction to roll back on layer {}", self.name());
            return Err(failure("rollback_transaction"));
        };
        self.savepoints.clear();
        self.base.finish_rollback_transaction(None);
        self.base.change_log_mut().clear();
        self.restore(&snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::{Coord, CoordPrecision, Geometry, Shape, OGRFieldType::*};

    fn layer() -> MemoryLayer {
        let mut layer = MemoryLayer::new("cities", OGRwkbGeometryType::wkbPoint);
        layer
            .create_field(&FieldDefn::new("name", OFTString), true)
            .unwrap();
        layer
            .create_field(&FieldDefn::new("pop", OFTInteger), true)
            .unwrap();
        for (name, pop, x) in [("a", 10, 0.0), ("b", 20, 1.0), ("c", 30, 2.0)] {
            let mut f = Feature::new(layer.base().defn_arc().clone());
            f.set_field_string("name", name).unwrap();
            f.set_field_integer("pop", pop).unwrap();
            f.set_geometry(Geometry::point(x, 0.0)).unwrap();
            layer.create_feature(&mut f).unwrap();
        }
        layer
    }

    fn names(layer: &MemoryLayer) -> Vec<String> {
        layer
            .features()
            .filter_map(|f| f.field("name").unwrap())
            .filter_map(FieldValue::into_string)
            .collect()
    }

    #[test]
    fn test_fid_assignment() -> Result<()> {
        let mut layer = layer();
        assert_eq!(layer.len(), 3);
        let mut f = Feature::new(layer.base().defn_arc().clone());
        f.set_fid(10);
        layer.create_feature(&mut f)?;
        assert_eq!(f.fid(), 10);

        // a taken FID is replaced by the next free one
        let mut dup = Feature::new(layer.base().defn_arc().clone());
        dup.set_fid(1);
        layer.create_feature(&mut dup)?;
        assert_eq!(dup.fid(), 11);
        Ok(())
    }

    #[test]
    fn test_set_and_delete() -> Result<()> {
        let mut layer = layer();
        let mut f = layer.feature(1).unwrap();
        f.set_field_string("name", "B")?;
        layer.set_feature(&mut f)?;
        assert_eq!(names(&layer), ["a", "B", "c"]);

        f.set_fid(42);
        let err = layer.set_feature(&mut f).unwrap_err();
        assert_eq!(err.ogr_err(), OGRErr::OGRERR_NON_EXISTING_FEATURE);
        layer.upsert_feature(&mut f)?;
        assert_eq!(layer.len(), 4);

        layer.delete_feature(0)?;
        assert!(layer.delete_feature(0).is_err());
        assert_eq!(names(&layer), ["B", "c", "B"]);
        Ok(())
    }

    #[test]
    fn test_foreign_feature_matched_by_name() -> Result<()> {
        let mut layer = layer();
        let mut other = Defn::with_geometry("other", OGRwkbGeometryType::wkbPoint);
        other.add_field_defn(FieldDefn::new("extra", OFTReal));
        other.add_field_defn(FieldDefn::new("name", OFTString));
        let mut f = Feature::new(Arc::new(other));
        f.set_field_string("name", "d")?;
        f.set_field_double("extra", 1.5)?;
        f.set_geometry(Geometry::point(5.0, 5.0))?;
        layer.create_feature(&mut f)?;

        let stored = layer.feature(f.fid()).unwrap();
        assert_eq!(stored.field_count(), 2);
        assert_eq!(stored.field("name")?.and_then(FieldValue::into_string).as_deref(), Some("d"));
        assert!(!stored.is_field_set(1));
        assert!(stored.geometry().is_some());
        Ok(())
    }

    #[test]
    fn test_fast_paths() -> Result<()> {
        let mut layer = layer();
        assert!(layer.has_capability(LayerCaps::OLCFastFeatureCount));
        assert_eq!(layer.try_feature_count(), Some(3));

        layer.set_next_by_index(2)?;
        assert_eq!(layer.next_feature().unwrap().fid(), 2);
        layer.set_next_by_index(3)?;
        assert!(layer.next_feature().is_none());
        assert!(layer.set_next_by_index(4).is_err());

        layer.set_attribute_filter("pop > 10")?;
        assert!(!layer.has_capability(LayerCaps::OLCFastFeatureCount));
        assert_eq!(layer.try_feature_count(), None);
        assert_eq!(layer.feature_count(), 2);
        layer.set_next_by_index(1)?;
        assert_eq!(layer.next_feature().unwrap().fid(), 2);
        Ok(())
    }

    #[test]
    fn test_schema_changes_reach_rows() -> Result<()> {
        let mut layer = layer();
        layer.create_field(&FieldDefn::new("area", OFTReal), true)?;
        layer.reorder_field(2, 0)?;
        let names: Vec<&str> = layer.defn().fields().map(|f| f.name()).collect();
        assert_eq!(names, ["area", "name", "pop"]);
        let f = layer.feature(2).unwrap();
        assert!(!f.is_field_set(0));
        assert_eq!(f.field("pop")?.and_then(FieldValue::into_int), Some(30));

        layer.delete_field(0)?;
        assert_eq!(layer.feature(2).unwrap().field_count(), 2);

        let mut renamed = FieldDefn::new("population", OFTString);
        renamed.set_width(8);
        layer.alter_field_defn(1, &renamed, AlterFieldDefnFlags::NAME | AlterFieldDefnFlags::TYPE)?;
        let field = layer.defn().field(1).unwrap();
        assert_eq!(field.name(), "population");
        assert_eq!(field.width(), 0);
        let f = layer.feature(2).unwrap();
        assert_eq!(
            f.field("population")?,
            Some(FieldValue::StringValue("30".to_string()))
        );
        Ok(())
    }

    #[test]
    fn test_geometry_fields() -> Result<()> {
        let mut layer = layer();
        layer.create_geom_field(&GeomFieldDefn::new("centroid", OGRwkbGeometryType::wkbPoint), true)?;
        assert_eq!(layer.feature(0).unwrap().geom_field_count(), 2);

        let mut altered = GeomFieldDefn::new("", OGRwkbGeometryType::wkbMultiPoint);
        altered.set_nullable(false);
        layer.alter_geom_field_defn(1, &altered, AlterGeomFieldDefnFlags::TYPE)?;
        let field = layer.defn().geom_field(1).unwrap();
        assert_eq!(field.name(), "centroid");
        assert_eq!(field.geometry_type(), OGRwkbGeometryType::wkbMultiPoint);
        assert!(field.is_nullable());
        Ok(())
    }

    #[test]
    fn test_write_normalization() -> Result<()> {
        let mut layer = MemoryLayer::new("arcs", OGRwkbGeometryType::wkbNone);
        let mut field = GeomFieldDefn::new("geom", OGRwkbGeometryType::wkbUnknown);
        field.set_coord_precision(CoordPrecision {
            xy_resolution: 0.5,
            ..Default::default()
        });
        layer.create_geom_field(&field, true)?;
        layer.set_capability(LayerCaps::OLCCurveGeometries, false);
        layer.set_capability(LayerCaps::OLCMeasuredGeometries, false);
        layer.base_mut().set_apply_geom_precision(Some(true));

        let arc = Shape::CircularString(vec![Coord::xy(0.0, 0.0), Coord::xy(1.0, 1.0), Coord::xy(2.0, 0.0)]);
        let measured = Shape::Point(Some(Coord {
            x: 1.1,
            y: 2.2,
            m: 7.0,
            ..Default::default()
        }));
        for (shape, is_measured) in [(arc, false), (measured, true)] {
            let mut f = Feature::new(layer.base().defn_arc().clone());
            f.set_geometry(Geometry::new(shape, false, is_measured))?;
            layer.create_feature(&mut f)?;
        }

        let line = layer.feature(0).unwrap().steal_geometry(0).unwrap();
        assert_eq!(line.geometry_type(), OGRwkbGeometryType::wkbLineString);
        line.for_each_coord(&mut |c| {
            assert_eq!((c.x * 2.0).fract(), 0.0);
            assert_eq!((c.y * 2.0).fract(), 0.0);
        });

        let point = layer.feature(1).unwrap().steal_geometry(0).unwrap();
        assert!(!point.is_measured());
        assert_eq!(point, Geometry::point(1.0, 2.0));
        Ok(())
    }

    #[test]
    fn test_rollback_restores_rows_and_schema() -> Result<()> {
        let mut layer = layer();
        layer.start_transaction()?;
        assert!(layer.start_transaction().is_err());
        layer.delete_field(0)?;
        layer.create_field(&FieldDefn::new("kind", OFTString), true)?;
        layer.delete_feature(1)?;
        layer.rollback_transaction()?;

        let names: Vec<&str> = layer.defn().fields().map(|f| f.name()).collect();
        assert_eq!(names, ["name", "pop"]);
        assert_eq!(layer.len(), 3);
        assert_eq!(self::names(&layer), ["a", "b", "c"]);
        assert!(layer.base().change_log().is_empty());
        assert!(layer.rollback_transaction().is_err());
        Ok(())
    }

    #[test]
    fn test_reorder_survives_rollback() -> Result<()> {
        let mut layer = layer();
        layer.start_transaction()?;
        layer.reorder_fields(&[1, 0])?;
        layer.rollback_transaction()?;

        let names: Vec<&str> = layer.defn().fields().map(|f| f.name()).collect();
        assert_eq!(names, ["pop", "name"]);
        let first = layer.feature(0).unwrap();
        assert_eq!(first.field("pop")?, Some(FieldValue::IntegerValue(10)));
        assert_eq!(self::names(&layer), ["a", "b", "c"]);
        Ok(())
    }

    #[test]
    fn test_savepoints() -> Result<()> {
        let mut layer = layer();
        assert!(layer.set_savepoint("early").is_err());
        layer.start_transaction()?;
        layer.delete_feature(0)?;
        layer.set_savepoint("sp1")?;
        assert!(layer.set_savepoint("sp1").is_err());
        layer.create_field(&FieldDefn::new("kind", OFTString), true)?;
        layer.delete_feature(1)?;

        layer.rollback_to_savepoint("sp1")?;
        assert_eq!(layer.defn().field_count(), 2);
        assert_eq!(names(&layer), ["b", "c"]);

        // changes after the rollback are again scoped to the savepoint
        layer.create_field(&FieldDefn::new("kind", OFTString), true)?;
        layer.rollback_to_savepoint("sp1")?;
        assert_eq!(layer.defn().field_count(), 2);

        layer.release_savepoint("sp1")?;
        assert!(layer.rollback_to_savepoint("sp1").is_err());
        layer.commit_transaction()?;
        assert_eq!(names(&layer), ["b", "c"]);
        Ok(())
    }

    #[test]
    fn test_nested_savepoints() -> Result<()> {
        let mut layer = layer();
        layer.start_transaction()?;
        layer.delete_field(1)?;
        layer.set_savepoint("outer")?;
        layer.set_savepoint("inner")?;
        layer.create_field(&FieldDefn::new("kind", OFTString), true)?;

        layer.rollback_to_savepoint("outer")?;
        let names: Vec<&str> = layer.defn().fields().map(|f| f.name()).collect();
        assert_eq!(names, ["name"]);
        assert!(layer.rollback_to_savepoint("inner").is_err());

        layer.rollback_transaction()?;
        assert_eq!(layer.defn().field_count(), 2);
        Ok(())
    }

    #[test]
    fn test_transaction_guard() -> Result<()> {
        let mut layer = layer();
        {
            let mut txn = layer.transaction()?;
            txn.delete_feature(0)?;
            assert_eq!(txn.len(), 2);
        }
        assert_eq!(layer.len(), 3);

        let mut txn = layer.transaction()?;
        txn.delete_feature(0)?;
        txn.commit()?;
        assert_eq!(layer.len(), 2);
        Ok(())
    }

    #[test]
    fn test_rename() -> Result<()> {
        let mut layer = layer();
        layer.rename("towns")?;
        assert_eq!(layer.name(), "towns");

        layer.set_capability(LayerCaps::OLCRename, false);
        let err = layer.rename("villages").unwrap_err();
        assert!(err.is_unsupported());
        assert_eq!(layer.name(), "towns");
        Ok(())
    }

    #[test]
    fn test_disabled_capabilities() {
        let mut layer = layer();
        assert!(layer.has_capability(LayerCaps::OLCCurveGeometries));
        layer.set_capability(LayerCaps::OLCCurveGeometries, false);
        assert!(!layer.has_capability(LayerCaps::OLCCurveGeometries));
        assert!(!layer.test_capability("Nonsense"));
    }
}
