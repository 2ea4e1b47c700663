use std::cell::Cell;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use once_cell::unsync::OnceCell;

use crate::config;
use crate::errors::*;
use crate::options::{AlterFieldDefnFlags, AlterGeomFieldDefnFlags, GeometryTypesFlags};
use crate::spatial_ref::SpatialRef;
use crate::vector::engine::{GeoEngine, GeometryEngine};
use crate::vector::filter::SpatialFilter;
use crate::vector::geometry_type::is_non_linear;
use crate::vector::query::{AttributeQuery, QueryCompiler, SimpleQueryCompiler};
use crate::vector::transaction::{ChangeLogMark, FieldChangeLog, Transaction};
use crate::vector::{
    Defn, Envelope, Envelope3D, Feature, FieldDefn, GeomFieldDefn, Geometry, OGRwkbGeometryType,
};

/// Layer capabilities
#[allow(clippy::enum_variant_names)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerCaps {
    /// Layer capability for random read
    OLCRandomRead,
    /// Layer capability for sequential write
    OLCSequentialWrite,
    /// Layer capability for random write
    OLCRandomWrite,
    /// Layer capability for fast spatial filter
    OLCFastSpatialFilter,
    /// Layer capability for fast feature count retrieval
    OLCFastFeatureCount,
    /// Layer capability for fast extent retrieval
    OLCFastGetExtent,
    /// Layer capability for fast 3D extent retrieval
    OLCFastGetExtent3D,
    /// Layer capability for field creation
    OLCCreateField,
    /// Layer capability for field deletion
    OLCDeleteField,
    /// Layer capability for field reordering
    OLCReorderFields,
    /// Layer capability for field alteration
    OLCAlterFieldDefn,
    /// Layer capability for geometry field alteration
    OLCAlterGeomFieldDefn,
    /// Layer capability for transactions
    OLCTransactions,
    /// Layer capability for feature deletion
    OLCDeleteFeature,
    /// Layer capability for feature upsert
    OLCUpsertFeature,
    /// Layer capability for specialized update
    OLCUpdateFeature,
    /// Layer capability for fast "next index" retrieval
    OLCFastSetNextByIndex,
    /// Layer capability for strings returned with UTF-8 encoding
    OLCStringsAsUTF8,
    /// Layer capability for field ignoring
    OLCIgnoreFields,
    /// Layer capability for geometry field creation
    OLCCreateGeomField,
    /// Layer capability for curve geometries support
    OLCCurveGeometries,
    /// Layer capability for measured geometries support
    OLCMeasuredGeometries,
    /// Layer capability for geometries with Z dimension support
    OLCZGeometries,
    /// Layer capability for renaming
    OLCRename,
}

impl LayerCaps {
    pub const ALL: [LayerCaps; 24] = [
        LayerCaps::OLCRandomRead,
        LayerCaps::OLCSequentialWrite,
        LayerCaps::OLCRandomWrite,
        LayerCaps::OLCFastSpatialFilter,
        LayerCaps::OLCFastFeatureCount,
        LayerCaps::OLCFastGetExtent,
        LayerCaps::OLCFastGetExtent3D,
        LayerCaps::OLCCreateField,
        LayerCaps::OLCDeleteField,
        LayerCaps::OLCReorderFields,
        LayerCaps::OLCAlterFieldDefn,
        LayerCaps::OLCAlterGeomFieldDefn,
        LayerCaps::OLCTransactions,
        LayerCaps::OLCDeleteFeature,
        LayerCaps::OLCUpsertFeature,
        LayerCaps::OLCUpdateFeature,
        LayerCaps::OLCFastSetNextByIndex,
        LayerCaps::OLCStringsAsUTF8,
        LayerCaps::OLCIgnoreFields,
        LayerCaps::OLCCreateGeomField,
        LayerCaps::OLCCurveGeometries,
        LayerCaps::OLCMeasuredGeometries,
        LayerCaps::OLCZGeometries,
        LayerCaps::OLCRename,
    ];

    /// The capability name understood by [`LayerAccess::test_capability`].
    pub fn name(&self) -> &'static str {
        match self {
            LayerCaps::OLCRandomRead => "RandomRead",
            LayerCaps::OLCSequentialWrite => "SequentialWrite",
            LayerCaps::OLCRandomWrite => "RandomWrite",
            LayerCaps::OLCFastSpatialFilter => "FastSpatialFilter",
            LayerCaps::OLCFastFeatureCount => "FastFeatureCount",
            LayerCaps::OLCFastGetExtent => "FastGetExtent",
            LayerCaps::OLCFastGetExtent3D => "FastGetExtent3D",
            LayerCaps::OLCCreateField => "CreateField",
            LayerCaps::OLCDeleteField => "DeleteField",
            LayerCaps::OLCReorderFields => "ReorderFields",
            LayerCaps::OLCAlterFieldDefn => "AlterFieldDefn",
            LayerCaps::OLCAlterGeomFieldDefn => "AlterGeomFieldDefn",
            LayerCaps::OLCTransactions => "Transactions",
            LayerCaps::OLCDeleteFeature => "DeleteFeature",
            LayerCaps::OLCUpsertFeature => "UpsertFeature",
            LayerCaps::OLCUpdateFeature => "UpdateFeature",
            LayerCaps::OLCFastSetNextByIndex => "FastSetNextByIndex",
            LayerCaps::OLCStringsAsUTF8 => "StringsAsUTF8",
            LayerCaps::OLCIgnoreFields => "IgnoreFields",
            LayerCaps::OLCCreateGeomField => "CreateGeomField",
            LayerCaps::OLCCurveGeometries => "CurveGeometries",
            LayerCaps::OLCMeasuredGeometries => "MeasuredGeometries",
            LayerCaps::OLCZGeometries => "ZGeometries",
            LayerCaps::OLCRename => "Rename",
        }
    }

    /// Looks a capability up by name, ignoring case.
    pub fn from_name(name: &str) -> Option<LayerCaps> {
        LayerCaps::ALL
            .into_iter()
            .find(|cap| cap.name().eq_ignore_ascii_case(name))
    }
}

/// Number of features of a given geometry type, see
/// [`LayerAccess::get_geometry_types`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GeometryTypeCounter {
    pub geometry_type: OGRwkbGeometryType::Type,
    pub count: i64,
}

#[derive(Clone, Copy, Debug)]
struct WriteNormalization {
    supports_curve: bool,
    supports_m: bool,
    apply_precision: bool,
}

/// State shared by every layer implementation: schema, filters, and the
/// bookkeeping the default [`LayerAccess`] methods rely on.
#[derive(Debug)]
pub struct LayerBase {
    defn: Arc<Defn>,
    filter: Option<SpatialFilter>,
    filter_geom_field: usize,
    attr_query: Option<Box<dyn AttributeQuery>>,
    attr_query_string: Option<String>,
    query_compiler: Arc<dyn QueryCompiler>,
    engine: Option<Arc<dyn GeometryEngine>>,
    ref_count: Cell<i32>,
    iterator_active: Cell<bool>,
    features_read: Cell<u64>,
    apply_geom_precision: Option<bool>,
    write_normalization: OnceCell<WriteNormalization>,
    change_log: FieldChangeLog,
}

/// Filters removed by [`LayerBase::take_filters`].
#[derive(Debug)]
pub(crate) struct SavedFilters {
    filter: Option<SpatialFilter>,
    filter_geom_field: usize,
    attr_query: Option<Box<dyn AttributeQuery>>,
    attr_query_string: Option<String>,
}

impl LayerBase {
    /// A base for a layer with schema `defn`, using [`GeoEngine`] for exact
    /// geometry predicates and [`SimpleQueryCompiler`] for attribute filters.
    pub fn new(defn: Defn) -> Self {
        LayerBase {
            defn: Arc::new(defn),
            filter: None,
            filter_geom_field: 0,
            attr_query: None,
            attr_query_string: None,
            query_compiler: Arc::new(SimpleQueryCompiler),
            engine: Some(Arc::new(GeoEngine::new())),
            ref_count: Cell::new(0),
            iterator_active: Cell::new(false),
            features_read: Cell::new(0),
            apply_geom_precision: None,
            write_normalization: OnceCell::new(),
            change_log: FieldChangeLog::new(),
        }
    }

    pub fn defn(&self) -> &Defn {
        &self.defn
    }

    /// The shared schema, as handed to the features of this layer.
    pub fn defn_arc(&self) -> &Arc<Defn> {
        &self.defn
    }

    /// Mutable access to the schema.
    ///
    /// Features holding the previous definition keep it.
    pub fn defn_mut(&mut self) -> &mut Defn {
        Arc::make_mut(&mut self.defn)
    }

    /// The exact geometry engine, `None` when the layer runs without one.
    pub fn engine(&self) -> Option<&dyn GeometryEngine> {
        self.engine.as_deref()
    }

    pub(crate) fn shared_engine(&self) -> Option<Arc<dyn GeometryEngine>> {
        self.engine.clone()
    }

    pub fn set_engine(&mut self, engine: Option<Arc<dyn GeometryEngine>>) {
        self.engine = engine;
        self.write_normalization = OnceCell::new();
    }

    pub fn set_query_compiler(&mut self, compiler: Arc<dyn QueryCompiler>) {
        self.query_compiler = compiler;
    }

    /// Overrides the `OGR_APPLY_GEOM_SET_PRECISION` configuration option for
    /// this layer. Must be called before the first write to take effect.
    pub fn set_apply_geom_precision(&mut self, apply: Option<bool>) {
        self.apply_geom_precision = apply;
    }

    pub fn spatial_filter(&self) -> Option<&SpatialFilter> {
        self.filter.as_ref()
    }

    pub fn spatial_filter_geom_field(&self) -> usize {
        self.filter_geom_field
    }

    pub fn attribute_filter(&self) -> Option<&str> {
        self.attr_query_string.as_deref()
    }

    /// Replaces the spatial filter with a copy of `geometry`.
    ///
    /// Returns whether the filter changed, in which case the caller resets reading.
    pub fn install_filter(&mut self, geom_field: usize, geometry: Option<&Geometry>) -> bool {
        self.filter_geom_field = geom_field;
        if self.filter.is_none() && geometry.is_none() {
            return false;
        }
        self.filter = geometry.map(|g| SpatialFilter::new(geom_field, g));
        true
    }

    pub(crate) fn take_filters(&mut self) -> SavedFilters {
        SavedFilters {
            filter: self.filter.take(),
            filter_geom_field: std::mem::take(&mut self.filter_geom_field),
            attr_query: self.attr_query.take(),
            attr_query_string: self.attr_query_string.take(),
        }
    }

    pub(crate) fn restore_filters(&mut self, saved: SavedFilters) {
        self.filter = saved.filter;
        self.filter_geom_field = saved.filter_geom_field;
        self.attr_query = saved.attr_query;
        self.attr_query_string = saved.attr_query_string;
    }

    /// Whether `geometry` passes the installed spatial filter.
    ///
    /// Passes everything without a filter.
    pub fn filter_geometry(&self, geometry: Option<&Geometry>) -> bool {
        match &self.filter {
            None => true,
            Some(filter) => filter.filter_geometry(geometry, self.engine()),
        }
    }

    /// Whether the WKB geometry passes the installed spatial filter, see
    /// [`filter_wkb_geometry`](crate::vector::filter::filter_wkb_geometry).
    pub fn filter_wkb_geometry(&self, wkb: &[u8], envelope: &mut Option<Envelope>) -> bool {
        match &self.filter {
            None => true,
            Some(filter) => filter.filter_wkb(wkb, envelope, self.engine()),
        }
    }

    /// Whether `feature` passes both the spatial and the attribute filter.
    pub fn accepts(&self, feature: &Feature) -> bool {
        if let Some(filter) = &self.filter {
            let geometry = feature
                .geometry_by_index(filter.geom_field())
                .ok()
                .flatten();
            if !filter.filter_geometry(geometry, self.engine()) {
                return false;
            }
        }
        self.attr_query
            .as_ref()
            .map_or(true, |query| query.evaluate(feature))
    }

    /// Counts a feature handed out by the sequential reader.
    pub fn mark_feature_read(&self) {
        self.features_read.set(self.features_read.get() + 1);
    }

    pub fn change_log(&self) -> &FieldChangeLog {
        &self.change_log
    }

    pub fn change_log_mut(&mut self) -> &mut FieldChangeLog {
        &mut self.change_log
    }

    /// Starts recording schema changes for a new transaction.
    pub fn prepare_start_transaction(&mut self) {
        self.change_log.clear();
    }

    /// Puts the schema back as it was at transaction start, or at `savepoint`.
    pub fn finish_rollback_transaction(&mut self, savepoint: Option<&str>) {
        let defn = Arc::make_mut(&mut self.defn);
        self.change_log.finish_rollback(defn, savepoint);
    }

    /// Puts the schema back as it was when `mark` was taken and forgets
    /// the changes recorded since.
    pub fn finish_rollback_since(&mut self, mark: ChangeLogMark) {
        let defn = Arc::make_mut(&mut self.defn);
        self.change_log.finish_rollback_since(defn, mark);
        self.change_log.truncate(mark);
    }
}

/// Fixes up the geometries of `feature` before it reaches the backend
/// writer: measures are stripped and curves linearized when the layer
/// cannot store them, and coordinates are snapped to the declared XY
/// resolution when `OGR_APPLY_GEOM_SET_PRECISION` is set.
pub(crate) fn convert_geoms_if_necessary<L: LayerAccess + ?Sized>(
    layer: &L,
    feature: &mut Feature,
) {
    let base = layer.base();
    let norm = *base.write_normalization.get_or_init(|| {
        let apply = base.apply_geom_precision.unwrap_or_else(|| {
            config::get_config_bool("OGR_APPLY_GEOM_SET_PRECISION", false).unwrap_or(false)
        });
        WriteNormalization {
            supports_curve: layer.has_capability(LayerCaps::OLCCurveGeometries),
            supports_m: layer.has_capability(LayerCaps::OLCMeasuredGeometries),
            apply_precision: apply
                && base.engine.is_some()
                && base
                    .defn
                    .geom_fields()
                    .any(|g| g.coord_precision().xy_resolution != 0.0),
        }
    });
    if norm.supports_curve && norm.supports_m && !norm.apply_precision {
        return;
    }

    for (i, slot) in feature.geometries_mut().enumerate() {
        let Some(geom) = slot else {
            continue;
        };
        if !norm.supports_m && geom.is_measured() {
            geom.set_measured(false);
        }
        if !norm.supports_curve && is_non_linear(geom.geometry_type()) {
            *geom = geom.linearize();
        }
        if norm.apply_precision {
            let resolution = base
                .defn
                .geom_field(i)
                .map_or(0.0, |g| g.coord_precision().xy_resolution);
            if resolution == 0.0 || geom.has_curve_geometry() {
                continue;
            }
            if let Some(engine) = base.engine() {
                match engine.set_precision(geom, resolution) {
                    Ok(snapped) => *geom = snapped,
                    Err(e) => tracing::debug!("Cannot apply coordinate precision: {e}"),
                }
            }
        }
    }
}

fn invalid_geom_field(geom_field: usize, method_name: &'static str) -> GdalError {
    tracing::error!("Invalid geometry field index : {geom_field}");
    GdalError::InvalidFieldIndex {
        index: geom_field,
        method_name,
    }
}

/// Name under which [`LayerAccess::set_ignored_fields`] finds geometry field `i`.
fn geom_field_ignore_name(i: usize, field: &GeomFieldDefn) -> Option<String> {
    match field.name() {
        "" if i == 0 => Some("OGR_GEOMETRY".to_string()),
        "" => None,
        name => Some(name.to_string()),
    }
}

fn as_refs(names: &[String]) -> Vec<&str> {
    names.iter().map(String::as_str).collect()
}

fn not_supported(what: &str, method_name: &'static str) -> GdalError {
    tracing::error!("{what} not supported by this layer.");
    unsupported(method_name)
}

/// Layer methods
///
/// A backend provides the [`LayerBase`] holding the shared state plus the
/// sequential reading primitives; everything else has a default
/// implementation that backends override when they can do better or
/// support more.
pub trait LayerAccess {
    fn base(&self) -> &LayerBase;

    fn base_mut(&mut self) -> &mut LayerBase;

    /// Rewinds the sequential reader to the first feature.
    fn reset_reading(&self);

    /// Returns the next feature passing the installed filters, or `None`
    /// at the end of the layer.
    ///
    /// Prefer [`features`](LayerAccess::features) for iteration.
    fn next_feature(&self) -> Option<Feature>;

    /// Tests a capability by its name, see [`LayerCaps::name`].
    fn test_capability(&self, capability: &str) -> bool;

    fn has_capability(&self, capability: LayerCaps) -> bool {
        self.test_capability(capability.name())
    }

    fn defn(&self) -> &Defn {
        self.base().defn()
    }

    fn name(&self) -> &str {
        self.defn().name()
    }

    /// Renames the layer.
    fn rename(&mut self, _new_name: &str) -> Result<()> {
        Err(not_supported("Rename()", "rename"))
    }

    fn fid_column(&self) -> &str {
        ""
    }

    /// Name of the first geometry field, empty without one.
    fn geometry_column(&self) -> &str {
        self.defn().geom_field(0).map_or("", |g| g.name())
    }

    fn geom_type(&self) -> OGRwkbGeometryType::Type {
        self.defn().geometry_type()
    }

    /// Spatial reference of the first geometry field.
    fn spatial_ref(&self) -> Option<Arc<SpatialRef>> {
        self.defn()
            .geom_field(0)
            .and_then(|g| g.spatial_ref().cloned())
    }

    fn find_field_index(&self, name: &str, _exact_match: bool) -> Option<usize> {
        self.defn().field_index(name)
    }

    /// Increments the advisory reference count, returning the new value.
    fn reference(&self) -> i32 {
        let count = &self.base().ref_count;
        count.set(count.get() + 1);
        count.get()
    }

    /// Decrements the advisory reference count, returning the new value.
    fn dereference(&self) -> i32 {
        let count = &self.base().ref_count;
        count.set(count.get() - 1);
        count.get()
    }

    fn reference_count(&self) -> i32 {
        self.base().ref_count.get()
    }

    /// Number of features handed out by the sequential reader so far.
    fn features_read(&self) -> u64 {
        self.base().features_read.get()
    }

    /// Returns iterator over the features in this layer.
    ///
    /// Only one iterator can be alive at a time on a layer: while one is,
    /// new ones log an error and yield nothing.
    fn features(&self) -> FeatureIterator<'_, Self>
    where
        Self: Sized,
    {
        FeatureIterator::new(self)
    }

    /// Counts the features passing the filters.
    ///
    /// Returns -1 when `force` is false and counting would require a scan.
    fn count_features(&self, force: bool) -> i64 {
        if !force {
            return -1;
        }
        let count = FeatureIterator::new(self).count();
        self.reset_reading();
        count as i64
    }

    /// Returns the number of features in this layer, scanning if needed.
    fn feature_count(&self) -> u64 {
        self.count_features(true).max(0) as u64
    }

    /// Returns the number of features when it is cheap to know.
    fn try_feature_count(&self) -> Option<u64> {
        u64::try_from(self.count_features(false)).ok()
    }

    /// Returns the extent of the features on geometry field `geom_field`.
    ///
    /// Fails on layers without such a geometry field, when no feature has
    /// a non-empty geometry, and when `force` is false and the extent is not
    /// known without a scan.
    fn get_extent(&self, geom_field: usize, force: bool) -> Result<Envelope> {
        let defn = self.defn();
        let valid = defn
            .geom_field(geom_field)
            .is_some_and(|g| g.geometry_type() != OGRwkbGeometryType::wkbNone);
        if !valid {
            if geom_field != 0 {
                return Err(invalid_geom_field(geom_field, "get_extent"));
            }
            return Err(failure("get_extent"));
        }
        self.i_get_extent(geom_field, force)
    }

    /// Computes the extent for [`get_extent`](LayerAccess::get_extent) on a
    /// validated geometry field.
    fn i_get_extent(&self, geom_field: usize, force: bool) -> Result<Envelope> {
        if !force {
            return Err(failure("get_extent"));
        }
        let mut extent: Option<Envelope> = None;
        for feature in FeatureIterator::new(self) {
            let Some(geom) = feature.geometry_by_index(geom_field).ok().flatten() else {
                continue;
            };
            if geom.is_empty() {
                continue;
            }
            let env = geom.envelope();
            match extent.as_mut() {
                Some(extent) => extent.merge(&env),
                None if !env.has_nan() => extent = Some(env),
                None => {}
            }
        }
        self.reset_reading();
        extent.ok_or_else(|| failure("get_extent"))
    }

    /// 3D counterpart of [`get_extent`](LayerAccess::get_extent).
    ///
    /// The Z range stays at `+inf..-inf` when no geometry has Z.
    fn get_extent_3d(&self, geom_field: usize, force: bool) -> Result<Envelope3D> {
        let defn = self.defn();
        let valid = defn
            .geom_field(geom_field)
            .is_some_and(|g| g.geometry_type() != OGRwkbGeometryType::wkbNone);
        if !valid {
            if geom_field != 0 {
                return Err(invalid_geom_field(geom_field, "get_extent_3d"));
            }
            return Err(failure("get_extent_3d"));
        }
        self.i_get_extent_3d(geom_field, force)
    }

    fn i_get_extent_3d(&self, geom_field: usize, force: bool) -> Result<Envelope3D> {
        if !force {
            return Err(failure("get_extent_3d"));
        }
        let mut extent: Option<Envelope3D> = None;
        for feature in FeatureIterator::new(self) {
            let Some(geom) = feature.geometry_by_index(geom_field).ok().flatten() else {
                continue;
            };
            if geom.is_empty() {
                continue;
            }
            let mut env = geom.envelope_3d();
            if !geom.is_3d() {
                env.clear_z();
            }
            match extent.as_mut() {
                Some(extent) => extent.merge(&env),
                None => extent = Some(env),
            }
        }
        self.reset_reading();
        extent.ok_or_else(|| failure("get_extent_3d"))
    }

    /// Installs a spatial filter on geometry field `geom_field`, replacing
    /// the previous one whichever field it was on. `None` clears it.
    ///
    /// The geometry is copied. Index 0 is accepted on layers without any
    /// geometry field.
    fn set_spatial_filter(&mut self, geom_field: usize, geometry: Option<&Geometry>) -> Result<()> {
        if geom_field != 0 && geom_field >= self.defn().geom_field_count() {
            return Err(invalid_geom_field(geom_field, "set_spatial_filter"));
        }
        if self.base_mut().install_filter(geom_field, geometry) {
            self.reset_reading();
        }
        Ok(())
    }

    /// Installs a rectangular spatial filter on geometry field `geom_field`.
    fn set_spatial_filter_rect(
        &mut self,
        geom_field: usize,
        min_x: f64,
        min_y: f64,
        max_x: f64,
        max_y: f64,
    ) -> Result<()> {
        let rect = Geometry::rect(min_x, min_y, max_x, max_y);
        self.set_spatial_filter(geom_field, Some(&rect))
    }

    fn clear_spatial_filter(&mut self) {
        if self.base_mut().install_filter(0, None) {
            self.reset_reading();
        }
    }

    /// The installed spatial filter geometry.
    fn spatial_filter(&self) -> Option<&Geometry> {
        self.base().spatial_filter().map(SpatialFilter::geometry)
    }

    fn spatial_filter_geom_field(&self) -> usize {
        self.base().spatial_filter_geom_field()
    }

    /// Set a feature attribute filter. An empty `query` clears it.
    ///
    /// On a compile failure no filter is left installed. Reading is reset
    /// in every case.
    fn set_attribute_filter(&mut self, query: &str) -> Result<()> {
        let base = self.base_mut();
        base.attr_query = None;
        base.attr_query_string = None;
        let result = if query.is_empty() {
            Ok(())
        } else {
            base.query_compiler
                .compile(query, &base.defn)
                .map(|compiled| {
                    base.attr_query = Some(compiled);
                    base.attr_query_string = Some(query.to_string());
                })
        };
        self.reset_reading();
        result
    }

    /// Clear the feature attribute filter.
    fn clear_attribute_filter(&mut self) {
        // clearing cannot fail
        let _ = self.set_attribute_filter("");
    }

    fn attribute_filter(&self) -> Option<&str> {
        self.base().attribute_filter()
    }

    /// Fetches the feature with identifier `fid`, regardless of filters.
    ///
    /// The default scans the whole layer with filters lifted, and leaves
    /// reading reset.
    fn feature(&mut self, fid: i64) -> Option<Feature> {
        let saved = self.base_mut().take_filters();
        self.reset_reading();
        let mut found = None;
        while let Some(feature) = self.next_feature() {
            if feature.fid() == fid {
                found = Some(feature);
                break;
            }
        }
        self.base_mut().restore_filters(saved);
        self.reset_reading();
        found
    }

    /// Positions the sequential reader so the next feature read is the
    /// `index`-th (0-based) passing the filters.
    fn set_next_by_index(&self, index: i64) -> Result<()> {
        if index < 0 {
            return Err(failure("set_next_by_index"));
        }
        self.reset_reading();
        for _ in 0..index {
            if self.next_feature().is_none() {
                return Err(failure("set_next_by_index"));
            }
        }
        Ok(())
    }

    /// Inserts a new feature, assigning its FID if the backend does.
    fn create_feature(&mut self, feature: &mut Feature) -> Result<()> {
        convert_geoms_if_necessary(self, feature);
        self.i_create_feature(feature)
    }

    /// Replaces the feature with the same FID.
    fn set_feature(&mut self, feature: &mut Feature) -> Result<()> {
        convert_geoms_if_necessary(self, feature);
        self.i_set_feature(feature)
    }

    /// Replaces the feature with the same FID, or inserts it.
    fn upsert_feature(&mut self, feature: &mut Feature) -> Result<()> {
        convert_geoms_if_necessary(self, feature);
        self.i_upsert_feature(feature)
    }

    /// Updates the listed attribute fields, geometry fields and, when
    /// `update_style` is set, the style string of the stored feature with
    /// the FID of `feature`.
    ///
    /// Geometries of the listed geometry fields are moved out of `feature`.
    /// An index must be valid both for the layer and for `feature`, which
    /// may have been built before a field was added.
    fn update_feature(
        &mut self,
        feature: &mut Feature,
        updated_fields: &[usize],
        updated_geom_fields: &[usize],
        update_style: bool,
    ) -> Result<()> {
        convert_geoms_if_necessary(self, feature);
        let defn = self.defn();
        let field_count = defn.field_count().min(feature.field_count());
        let geom_field_count = defn.geom_field_count().min(feature.geom_field_count());
        if let Some(&index) = updated_fields.iter().find(|&&i| i >= field_count) {
            tracing::error!("Invalid updated field index {index}");
            return Err(GdalError::InvalidFieldIndex {
                index,
                method_name: "update_feature",
            });
        }
        if let Some(&index) = updated_geom_fields
            .iter()
            .find(|&&i| i >= geom_field_count)
        {
            tracing::error!("Invalid updated geometry field index {index}");
            return Err(GdalError::InvalidFieldIndex {
                index,
                method_name: "update_feature",
            });
        }
        self.i_update_feature(feature, updated_fields, updated_geom_fields, update_style)
    }

    /// Backend insert, reached once geometries are normalized.
    fn i_create_feature(&mut self, _feature: &mut Feature) -> Result<()> {
        Err(not_supported("CreateFeature()", "create_feature"))
    }

    /// Backend replace, reached once geometries are normalized.
    fn i_set_feature(&mut self, _feature: &mut Feature) -> Result<()> {
        Err(not_supported("SetFeature()", "set_feature"))
    }

    /// Backend upsert, reached once geometries are normalized.
    fn i_upsert_feature(&mut self, _feature: &mut Feature) -> Result<()> {
        Err(not_supported("UpsertFeature()", "upsert_feature"))
    }

    /// Backend partial update on validated indices.
    ///
    /// The default reads the stored feature, patches it, and writes it
    /// back through [`i_set_feature`](LayerAccess::i_set_feature).
    fn i_update_feature(
        &mut self,
        feature: &mut Feature,
        updated_fields: &[usize],
        updated_geom_fields: &[usize],
        update_style: bool,
    ) -> Result<()> {
        if !self.has_capability(LayerCaps::OLCRandomWrite) {
            return Err(not_supported("UpdateFeature()", "update_feature"));
        }
        let Some(mut existing) = self.feature(feature.fid()) else {
            return Err(ogr_error(
                OGRErr::OGRERR_NON_EXISTING_FEATURE,
                "update_feature",
            ));
        };
        let mut map = vec![None; feature.field_count()];
        for &i in updated_fields {
            let slot = map.get_mut(i).ok_or(GdalError::InvalidFieldIndex {
                index: i,
                method_name: "update_feature",
            })?;
            *slot = Some(i);
        }
        existing.set_fields_from(feature, &map)?;
        for &i in updated_geom_fields {
            existing.set_geometry_by_index(i, feature.steal_geometry(i))?;
        }
        if update_style {
            existing.set_style_string(feature.style_string());
        }
        self.i_set_feature(&mut existing)
    }

    fn delete_feature(&mut self, _fid: i64) -> Result<()> {
        Err(not_supported("DeleteFeature()", "delete_feature"))
    }

    /// Flushes pending writes.
    fn sync_to_disk(&mut self) -> Result<()> {
        Ok(())
    }

    /// Adds an attribute field. With `approx_ok` the backend may adjust the
    /// definition to what it can store.
    fn create_field(&mut self, _field: &FieldDefn, _approx_ok: bool) -> Result<()> {
        Err(not_supported("CreateField()", "create_field"))
    }

    fn delete_field(&mut self, _index: usize) -> Result<()> {
        Err(not_supported("DeleteField()", "delete_field"))
    }

    /// Reorders the attribute fields: the field at `new_order[i]` moves to
    /// position `i`.
    fn reorder_fields(&mut self, _new_order: &[usize]) -> Result<()> {
        Err(not_supported("ReorderFields()", "reorder_fields"))
    }

    /// Moves the field at `old_index` to `new_index`, shifting the fields
    /// in between by one.
    fn reorder_field(&mut self, old_index: usize, new_index: usize) -> Result<()> {
        let count = self.defn().field_count();
        for index in [old_index, new_index] {
            if index >= count {
                tracing::error!("Invalid field index {index}");
                return Err(GdalError::InvalidFieldIndex {
                    index,
                    method_name: "reorder_field",
                });
            }
        }
        if old_index == new_index {
            return Ok(());
        }
        let mut order: Vec<usize> = (0..count).collect();
        let moved = order.remove(old_index);
        order.insert(new_index, moved);
        self.reorder_fields(&order)
    }

    fn alter_field_defn(
        &mut self,
        _index: usize,
        _new_defn: &FieldDefn,
        _flags: AlterFieldDefnFlags,
    ) -> Result<()> {
        Err(not_supported("AlterFieldDefn()", "alter_field_defn"))
    }

    fn create_geom_field(&mut self, _field: &GeomFieldDefn, _approx_ok: bool) -> Result<()> {
        Err(not_supported("CreateGeomField()", "create_geom_field"))
    }

    fn alter_geom_field_defn(
        &mut self,
        _index: usize,
        _new_defn: &GeomFieldDefn,
        _flags: AlterGeomFieldDefnFlags,
    ) -> Result<()> {
        Err(not_supported("AlterGeomFieldDefn()", "alter_geom_field_defn"))
    }

    /// Marks the named fields as ignored, clearing the flag on the others.
    ///
    /// `OGR_GEOMETRY` names the first geometry field and `OGR_STYLE` the
    /// style string. Fails on an unknown name.
    fn set_ignored_fields(&mut self, names: &[&str]) -> Result<()> {
        let defn = self.base_mut().defn_mut();
        for i in 0..defn.field_count() {
            if let Some(field) = defn.field_mut(i) {
                field.set_ignored(false);
            }
        }
        for i in 0..defn.geom_field_count() {
            if let Some(field) = defn.geom_field_mut(i) {
                field.set_ignored(false);
            }
        }
        defn.set_style_ignored(false);

        for &name in names {
            if name.eq_ignore_ascii_case("OGR_GEOMETRY") {
                defn.set_geometry_ignored(true);
            } else if name.eq_ignore_ascii_case("OGR_STYLE") {
                defn.set_style_ignored(true);
            } else if let Some(field) = defn.field_index(name).and_then(|i| defn.field_mut(i)) {
                field.set_ignored(true);
            } else if let Some(field) = defn
                .geom_field_index(name)
                .and_then(|i| defn.geom_field_mut(i))
            {
                field.set_ignored(true);
            } else {
                return Err(GdalError::InvalidFieldName {
                    field_name: name.to_string(),
                    method_name: "set_ignored_fields",
                });
            }
        }
        Ok(())
    }

    /// Tallies the geometry types found on geometry field `geom_field` of
    /// the features passing the filters. Null geometries count as `wkbNone`.
    ///
    /// Other fields are ignored during the scan. `progress` is called after
    /// each feature with the fraction of features read, or `0.0` when the
    /// feature count is not cheaply known, and cancels the scan by
    /// returning `false`. With [`GeometryTypesFlags::COUNT_NOT_NEEDED`] every
    /// count is reported as 0.
    fn get_geometry_types(
        &mut self,
        geom_field: usize,
        flags: GeometryTypesFlags,
        mut progress: Option<&mut dyn FnMut(f64) -> bool>,
    ) -> Result<Vec<GeometryTypeCounter>> {
        let defn = self.defn();
        if geom_field >= defn.geom_field_count() {
            tracing::error!("Invalid value for geom_field");
            return Err(GdalError::InvalidFieldIndex {
                index: geom_field,
                method_name: "get_geometry_types",
            });
        }

        let mut restore: Vec<String> = defn
            .fields()
            .filter(|f| f.is_ignored())
            .map(|f| f.name().to_string())
            .collect();
        restore.extend(
            defn.geom_fields()
                .enumerate()
                .filter(|(_, f)| f.is_ignored())
                .filter_map(|(i, f)| geom_field_ignore_name(i, f)),
        );
        if defn.is_style_ignored() {
            restore.push("OGR_STYLE".to_string());
        }
        let mut ignore: Vec<String> = defn.fields().map(|f| f.name().to_string()).collect();
        ignore.extend(
            defn.geom_fields()
                .enumerate()
                .filter(|(i, _)| *i != geom_field)
                .filter_map(|(i, f)| geom_field_ignore_name(i, f)),
        );
        ignore.push("OGR_STYLE".to_string());
        self.set_ignored_fields(&as_refs(&ignore))?;

        let tinz = flags.contains(GeometryTypesFlags::GEOMCOLLECTIONZ_TINZ);
        let stop_if_mixed = flags.contains(GeometryTypesFlags::STOP_IF_MIXED);
        let count_needed = !flags.contains(GeometryTypesFlags::COUNT_NOT_NEEDED);
        let total = if progress.is_some() {
            self.try_feature_count().unwrap_or(0)
        } else {
            0
        };
        let mut seen: u64 = 0;
        let mut counts: BTreeMap<OGRwkbGeometryType::Type, i64> = BTreeMap::new();
        let mut not_null = BTreeSet::new();
        let mut interrupted = false;
        for feature in FeatureIterator::new(&*self) {
            let geometry_type = match feature.geometry_by_index(geom_field).ok().flatten() {
                None => OGRwkbGeometryType::wkbNone,
                Some(geom) => {
                    let mut geometry_type = geom.geometry_type();
                    if tinz && geometry_type == OGRwkbGeometryType::wkbGeometryCollectionZ {
                        if let Some(first) = geom.geometry(0) {
                            if first.geometry_type() == OGRwkbGeometryType::wkbTINZ {
                                geometry_type = OGRwkbGeometryType::wkbTINZ;
                            }
                        }
                    }
                    geometry_type
                }
            };
            let count = counts.entry(geometry_type).or_default();
            if count_needed {
                *count += 1;
            }
            if geometry_type != OGRwkbGeometryType::wkbNone && stop_if_mixed {
                not_null.insert(geometry_type);
                if not_null.len() == 2 {
                    break;
                }
            }
            seen += 1;
            if let Some(progress) = progress.as_mut() {
                let done = if total > 0 {
                    seen as f64 / total as f64
                } else {
                    0.0
                };
                if !progress(done) {
                    interrupted = true;
                    break;
                }
            }
        }

        self.set_ignored_fields(&as_refs(&restore))?;
        if interrupted {
            return Err(GdalError::UserInterrupt);
        }
        Ok(counts
            .into_iter()
            .map(|(geometry_type, count)| GeometryTypeCounter {
                geometry_type,
                count,
            })
            .collect())
    }

    fn start_transaction(&mut self) -> Result<()> {
        Err(not_supported("StartTransaction()", "start_transaction"))
    }

    fn commit_transaction(&mut self) -> Result<()> {
        Err(not_supported("CommitTransaction()", "commit_transaction"))
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        Err(not_supported("RollbackTransaction()", "rollback_transaction"))
    }

    /// Starts a transaction rolled back on drop unless committed.
    fn transaction(&mut self) -> Result<Transaction<'_, Self>>
    where
        Self: Sized,
    {
        Transaction::new(self)
    }
}

/// Iterator over the features of a layer.
///
/// Reading is reset when the iterator is created. Trait objects, which
/// cannot call [`LayerAccess::features`], build one with
/// [`FeatureIterator::new`].
pub struct FeatureIterator<'a, L: LayerAccess + ?Sized> {
    layer: &'a L,
    failed: bool,
}

impl<'a, L: LayerAccess + ?Sized> FeatureIterator<'a, L> {
    pub fn new(layer: &'a L) -> Self {
        let active = &layer.base().iterator_active;
        if active.get() {
            tracing::error!(
                "Only one feature iterator can be active at a time on layer {}",
                layer.name()
            );
            return FeatureIterator {
                layer,
                failed: true,
            };
        }
        active.set(true);
        layer.reset_reading();
        FeatureIterator {
            layer,
            failed: false,
        }
    }
}

impl<L: LayerAccess + ?Sized> Iterator for FeatureIterator<'_, L> {
    type Item = Feature;

    #[inline]
    fn next(&mut self) -> Option<Feature> {
        if self.failed {
            return None;
        }
        self.layer.next_feature()
    }
}

impl<L: LayerAccess + ?Sized> Drop for FeatureIterator<'_, L> {
    fn drop(&mut self) {
        if !self.failed {
            self.layer.base().iterator_active.set(false);
        }
    }
}
