//! Overlay of two layers.
//!
//! Every operation reads the features of an *input* layer and a *method*
//! layer and writes the pieces it computes into a *result* layer. When the
//! result layer already has attribute fields they are used as is, matched
//! by name; otherwise they are created from the input layer, and for
//! [`intersection`], [`union`], [`sym_difference`] and [`identity`] from the
//! method layer as well.
//!
//! Only the first geometry field of each layer takes part. The spatial
//! filters of the input and method layers are narrowed while an operation
//! runs, and put back when it returns, whether it succeeded or not.
//!
//! Recognized options:
//!
//! * `SKIP_FAILURES=YES/NO` (`NO`): log and go on when a geometric operation
//!   or an insertion into the result layer fails, instead of aborting.
//! * `PROMOTE_TO_MULTI=YES/NO` (`NO`): write points, line strings and
//!   polygons as their multi counterparts.
//! * `INPUT_PREFIX=string`, `METHOD_PREFIX=string`: prefix of the result
//!   field names taken from the input and method layer. Without any prefix,
//!   a name present on both sides becomes `input_<name>` and `method_<name>`.
//! * `USE_PREPARED_GEOMETRIES=YES/NO` (`YES`): test pairs against a
//!   prepared input geometry before computing their intersection.
//! * `PRETEST_CONTAINMENT=YES/NO` (`NO`): in [`intersection`], copy method
//!   geometries lying inside the input geometry instead of intersecting them.
//! * `KEEP_LOWER_DIMENSION_GEOMETRIES=YES/NO` (`YES`): keep intersections
//!   of lower dimension than operands of equal dimension, such as the shared
//!   edge of two adjacent polygons. Turned off unless the result layer has
//!   geometry type `wkbUnknown`.
//! * `ADD_FIELDS=YES/NO` (`YES`): set to `NO` to leave the result layer
//!   without attributes.
//! * `ADD_INPUT_FIELDS=YES/NO`, `ADD_METHOD_FIELDS=YES/NO` (`YES`): whether
//!   the fields of either side are created in an empty result schema.
//!
//! ```
//! use ogr_layer::cpl::CslStringList;
//! use ogr_layer::vector::{overlay, Feature, Geometry, LayerAccess, MemoryLayer, OGRwkbGeometryType};
//!
//! let mut parcels = MemoryLayer::new("parcels", OGRwkbGeometryType::wkbPolygon);
//! let mut zones = MemoryLayer::new("zones", OGRwkbGeometryType::wkbPolygon);
//! for (layer, geom) in [
//!     (&mut parcels, Geometry::rect(0.0, 0.0, 2.0, 2.0)),
//!     (&mut zones, Geometry::rect(1.0, 1.0, 3.0, 3.0)),
//! ] {
//!     let mut feature = Feature::new(layer.base().defn_arc().clone());
//!     feature.set_geometry(geom).unwrap();
//!     layer.create_feature(&mut feature).unwrap();
//! }
//!
//! let mut result = MemoryLayer::new("result", OGRwkbGeometryType::wkbUnknown);
//! overlay::intersection(&mut parcels, &mut zones, &mut result, &CslStringList::new(), None).unwrap();
//! assert_eq!(result.feature_count(), 1);
//! ```

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use crate::cpl::CslStringList;
use crate::errors::*;
use crate::vector::engine::{GeometryEngine, PreparedPredicates};
use crate::vector::{Defn, Feature, FeatureIterator, Geometry, LayerAccess, OGRwkbGeometryType};

/// Progress callback of the overlay operations.
///
/// Called with the completed fraction of the work; returning `false`
/// cancels the operation with [`GdalError::UserInterrupt`].
pub type ProgressFn<'a> = &'a mut dyn FnMut(f64) -> bool;

#[derive(Debug)]
struct OverlaySettings {
    skip_failures: bool,
    promote_to_multi: bool,
    use_prepared_geometries: bool,
    pretest_containment: bool,
    keep_lower_dimension: bool,
    input_prefix: Option<String>,
    method_prefix: Option<String>,
    add_fields: bool,
    add_input_fields: bool,
    add_method_fields: bool,
}

impl OverlaySettings {
    fn new(options: &CslStringList) -> Self {
        OverlaySettings {
            skip_failures: options.fetch_bool("SKIP_FAILURES", false),
            promote_to_multi: options.fetch_bool("PROMOTE_TO_MULTI", false),
            use_prepared_geometries: options.fetch_bool("USE_PREPARED_GEOMETRIES", true),
            pretest_containment: options.fetch_bool("PRETEST_CONTAINMENT", false),
            keep_lower_dimension: options.fetch_bool("KEEP_LOWER_DIMENSION_GEOMETRIES", true),
            input_prefix: options.fetch_name_value("INPUT_PREFIX").map(str::to_string),
            method_prefix: options.fetch_name_value("METHOD_PREFIX").map(str::to_string),
            add_fields: options.fetch_bool("ADD_FIELDS", true),
            add_input_fields: options.fetch_bool("ADD_INPUT_FIELDS", true),
            add_method_fields: options.fetch_bool("ADD_METHOD_FIELDS", true),
        }
    }
}

struct Progress<'p> {
    callback: Option<ProgressFn<'p>>,
    counter: f64,
    max: f64,
}

impl Progress<'_> {
    /// Reports the fraction done before handling the next feature.
    fn tick(&mut self) -> Result<()> {
        if let Some(callback) = self.callback.as_mut() {
            let done = self.counter / self.max;
            if done > 0.0 && !callback(done) {
                tracing::error!("User terminated");
                return Err(GdalError::UserInterrupt);
            }
            self.counter += 1.0;
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(callback) = self.callback.as_mut() {
            if !callback(1.0) {
                tracing::error!("User terminated");
                return Err(GdalError::UserInterrupt);
            }
        }
        Ok(())
    }
}

/// Puts back the spatial filter a layer had when the guard was created.
///
/// The layer is reached through the guard while it lives.
struct FilterGuard<'a> {
    layer: &'a mut dyn LayerAccess,
    geom_field: usize,
    filter: Option<Geometry>,
}

impl<'a> FilterGuard<'a> {
    fn new(layer: &'a mut dyn LayerAccess) -> Self {
        let filter = layer.spatial_filter().cloned();
        let geom_field = layer.spatial_filter_geom_field();
        FilterGuard {
            layer,
            geom_field,
            filter,
        }
    }

    fn restore(&mut self) -> Result<()> {
        self.layer
            .set_spatial_filter(self.geom_field, self.filter.as_ref())
    }
}

impl<'a> Deref for FilterGuard<'a> {
    type Target = dyn LayerAccess + 'a;

    fn deref(&self) -> &Self::Target {
        self.layer
    }
}

impl DerefMut for FilterGuard<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.layer
    }
}

impl Drop for FilterGuard<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.restore() {
            tracing::error!("Cannot restore spatial filter: {e}");
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Side {
    Input,
    Method,
}

/// What a pass over the features of one layer emits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PassMode {
    /// Each non-empty intersection with a feature of the other layer.
    Intersection,
    /// Like `Intersection`, plus what is left of the feature after removing
    /// the intersecting features of the other layer.
    Identity,
    /// What is left of the feature after removing the other layer.
    Difference,
}

struct Overlay<'p> {
    method_name: &'static str,
    engine: Arc<dyn GeometryEngine>,
    settings: OverlaySettings,
    progress: Progress<'p>,
    map_input: Vec<Option<usize>>,
    map_method: Vec<Option<usize>>,
}

impl<'p> Overlay<'p> {
    fn new(
        method_name: &'static str,
        input: &dyn LayerAccess,
        method: &dyn LayerAccess,
        options: &CslStringList,
        progress: Option<ProgressFn<'p>>,
    ) -> Result<Self> {
        let Some(engine) = input.base().shared_engine() else {
            tracing::error!("{method_name}() requires a geometry engine");
            return Err(unsupported(method_name));
        };
        if input.defn().geom_field_count() == 0 || method.defn().geom_field_count() == 0 {
            tracing::error!("{method_name}() requires layers with a geometry field");
            return Err(ogr_error(OGRErr::OGRERR_INVALID_HANDLE, method_name));
        }
        Ok(Overlay {
            method_name,
            engine,
            settings: OverlaySettings::new(options),
            progress: Progress {
                callback: progress,
                counter: 0.0,
                max: 0.0,
            },
            map_input: Vec::new(),
            map_method: Vec::new(),
        })
    }

    /// Sets the total amount of work, one unit per feature of `layers`.
    fn count_work(&mut self, layers: &[&dyn LayerAccess]) {
        if self.progress.callback.is_some() {
            self.progress.max = layers.iter().map(|l| l.feature_count() as f64).sum();
        }
    }

    /// Turns a failure into `None` when failures are skipped.
    fn skip<T>(&self, result: Result<T>) -> Result<Option<T>> {
        match result {
            Ok(value) => Ok(Some(value)),
            Err(e) if self.settings.skip_failures => {
                tracing::debug!("{}: skipping failure: {e}", self.method_name);
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Resets `KEEP_LOWER_DIMENSION_GEOMETRIES` when `result` cannot hold
    /// geometries of mixed dimension.
    fn check_lower_dimension(&mut self, result: &dyn LayerAccess) {
        if self.settings.keep_lower_dimension
            && result.geom_type() != OGRwkbGeometryType::wkbUnknown
        {
            tracing::debug!(
                "Resetting KEEP_LOWER_DIMENSION_GEOMETRIES to NO since the result layer does not allow it."
            );
            self.settings.keep_lower_dimension = false;
        }
    }

    /// Fills the field maps, creating the fields of the result layer when
    /// it has none.
    ///
    /// `combined` operations write attributes of both sides into each result
    /// feature. Method fields are never created otherwise; a `method` schema
    /// then only gets matched by name against the result fields.
    fn set_result_schema(
        &mut self,
        result: &mut dyn LayerAccess,
        input: &Defn,
        method: Option<&Defn>,
        combined: bool,
    ) -> Result<()> {
        self.map_input = vec![None; input.field_count()];
        self.map_method = vec![None; method.map_or(0, Defn::field_count)];
        if !self.settings.add_fields {
            return Ok(());
        }
        let input_prefix = self.settings.input_prefix.clone();
        let method_prefix = self.settings.method_prefix.clone();
        let prefixed = |prefix: &Option<String>, name: &str| match prefix {
            Some(prefix) => format!("{prefix}{name}"),
            None => name.to_string(),
        };

        if result.defn().field_count() > 0 {
            let defn = result.defn();
            for (slot, field) in self.map_input.iter_mut().zip(input.fields()) {
                *slot = defn.field_index(&prefixed(&input_prefix, field.name()));
            }
            if let Some(method) = method {
                for (slot, field) in self.map_method.iter_mut().zip(method.fields()) {
                    *slot = defn.field_index(&prefixed(&method_prefix, field.name()));
                }
            }
            return Ok(());
        }

        if self.settings.add_input_fields {
            for (i, field) in input.fields().enumerate() {
                let mut field = field.clone();
                if input_prefix.is_some() {
                    field.set_name(&prefixed(&input_prefix, field.name()));
                } else if combined
                    && method_prefix.is_none()
                    && method.is_some_and(|m| m.field_index(field.name()).is_some())
                {
                    // same name on both sides
                    field.set_name(&format!("input_{}", field.name()));
                }
                if self.skip(result.create_field(&field, true))?.is_some() {
                    self.map_input[i] = result.defn().field_count().checked_sub(1);
                }
            }
        }

        let Some(method) = method else {
            return Ok(());
        };
        if !combined {
            let defn = result.defn();
            for (slot, field) in self.map_method.iter_mut().zip(method.fields()) {
                *slot = defn.field_index(&prefixed(&method_prefix, field.name()));
            }
            return Ok(());
        }
        if self.settings.add_method_fields {
            for (i, field) in method.fields().enumerate() {
                let mut field = field.clone();
                if method_prefix.is_some() {
                    field.set_name(&prefixed(&method_prefix, field.name()));
                } else if input_prefix.is_none() && input.field_index(field.name()).is_some() {
                    field.set_name(&format!("method_{}", field.name()));
                }
                if self.skip(result.create_field(&field, true))?.is_some() {
                    self.map_method[i] = result.defn().field_count().checked_sub(1);
                }
            }
        }
        Ok(())
    }

    fn maps(&self, side: Side) -> (Vec<Option<usize>>, Vec<Option<usize>>) {
        match side {
            Side::Input => (self.map_input.clone(), self.map_method.clone()),
            Side::Method => (self.map_method.clone(), self.map_input.clone()),
        }
    }

    /// Writes a result feature with `geometry` and the attributes of
    /// `sources`, mapped into the result schema.
    fn emit(
        &self,
        result: &mut dyn LayerAccess,
        geometry: Geometry,
        sources: &[(&Feature, &[Option<usize>])],
    ) -> Result<()> {
        let mut feature = Feature::new(result.base().defn_arc().clone());
        for (source, map) in sources {
            feature.set_fields_from(source, map)?;
        }
        let geometry = if self.settings.promote_to_multi {
            geometry.promote_to_multi()
        } else {
            geometry
        };
        if feature.geom_field_count() > 0 {
            feature.set_geometry(geometry)?;
        }
        self.skip(result.create_feature(&mut feature)).map(|_| ())
    }

    /// Narrows the spatial filter of `layer` to `geom`, within the filter
    /// `existing` the layer had before the operation.
    ///
    /// Returns `false` when nothing of `layer` can match.
    fn set_filter_from(
        &self,
        layer: &mut dyn LayerAccess,
        existing: Option<&Geometry>,
        geom: &Geometry,
    ) -> Result<bool> {
        match existing {
            None => layer.set_spatial_filter(0, Some(geom))?,
            Some(existing) => {
                if !self.engine.intersects(geom, existing)? {
                    return Ok(false);
                }
                let narrowed = self.engine.intersection(geom, existing)?;
                layer.set_spatial_filter(0, Some(&narrowed))?;
            }
        }
        Ok(true)
    }

    /// Handles the features of `x_layer` one at a time against the features
    /// of `y_layer` sharing some area with them.
    fn run_pass(
        &mut self,
        x_layer: &dyn LayerAccess,
        y_layer: &mut dyn LayerAccess,
        y_filter: Option<&Geometry>,
        result: &mut dyn LayerAccess,
        x_side: Side,
        mode: PassMode,
    ) -> Result<()> {
        let (x_map, y_map) = self.maps(x_side);
        let y_extent = match mode {
            PassMode::Intersection => y_layer.get_extent(0, true).ok(),
            _ => None,
        };

        for x in FeatureIterator::new(x_layer) {
            self.progress.tick()?;
            let Some(x_geom) = x.geometry() else {
                continue;
            };
            if let Some(extent) = &y_extent {
                if !x_geom.envelope().intersects(extent) {
                    continue;
                }
            }
            if self.skip(self.set_filter_from(y_layer, y_filter, x_geom))? != Some(true) {
                continue;
            }

            let leftover = match mode {
                PassMode::Difference => self.difference_of(x_geom, y_layer)?,
                _ => {
                    let maps = (x_map.as_slice(), y_map.as_slice());
                    self.intersections_of(&x, x_geom, y_layer, result, maps, mode)?
                }
            };
            if let Some(leftover) = leftover.filter(|g| !g.is_empty()) {
                self.emit(result, leftover, &[(&x, x_map.as_slice())])?;
            }
        }
        Ok(())
    }

    /// Emits the intersections of `x` with the features of `y_layer`.
    ///
    /// In [`PassMode::Identity`], returns what is left of `x_geom` outside
    /// the emitted intersections.
    fn intersections_of(
        &self,
        x: &Feature,
        x_geom: &Geometry,
        y_layer: &dyn LayerAccess,
        result: &mut dyn LayerAccess,
        (x_map, y_map): (&[Option<usize>], &[Option<usize>]),
        mode: PassMode,
    ) -> Result<Option<Geometry>> {
        let prepared: Option<Box<dyn PreparedPredicates>> = if self.settings.use_prepared_geometries
        {
            Some(self.engine.prepare(x_geom)?)
        } else {
            None
        };
        let pretest = mode == PassMode::Intersection && self.settings.pretest_containment;
        let mut leftover = (mode == PassMode::Identity).then(|| x_geom.clone());

        for y in FeatureIterator::new(y_layer) {
            let Some(y_geom) = y.geometry() else {
                continue;
            };
            let mut piece = None;
            if let Some(prepared) = &prepared {
                if pretest && self.skip(prepared.contains(y_geom))? == Some(true) {
                    piece = Some(y_geom.clone());
                } else if self.skip(prepared.intersects(y_geom))? == Some(false) {
                    continue;
                }
            }
            let piece = match piece {
                Some(piece) => piece,
                None => match self.skip(self.engine.intersection(x_geom, y_geom))? {
                    Some(piece) => piece,
                    None => continue,
                },
            };
            let collapsed = !self.settings.keep_lower_dimension
                && x_geom.dimension() == y_geom.dimension()
                && piece.dimension() < x_geom.dimension();
            if piece.is_empty() || collapsed {
                continue;
            }
            if let Some(rest) = leftover.as_mut() {
                if let Some(smaller) = self.skip(self.engine.difference(rest, y_geom))? {
                    *rest = smaller;
                }
            }
            self.emit(result, piece, &[(x, x_map), (&y, y_map)])?;
        }
        Ok(leftover)
    }

    /// What is left of `x_geom` after removing every feature of `y_layer`.
    fn difference_of(&self, x_geom: &Geometry, y_layer: &dyn LayerAccess) -> Result<Option<Geometry>> {
        let mut rest = x_geom.clone();
        for y in FeatureIterator::new(y_layer) {
            let Some(y_geom) = y.geometry() else {
                continue;
            };
            if let Some(smaller) = self.skip(self.engine.difference(&rest, y_geom))? {
                rest = smaller;
                if rest.is_empty() {
                    break;
                }
            }
        }
        Ok(Some(rest))
    }

    /// Union of the geometries of the features of `layer`, `None` when it
    /// has none.
    fn union_of(&self, layer: &dyn LayerAccess) -> Result<Option<Geometry>> {
        let mut total: Option<Geometry> = None;
        for feature in FeatureIterator::new(layer) {
            let Some(geom) = feature.geometry() else {
                continue;
            };
            total = match total {
                None => Some(geom.clone()),
                Some(acc) => match self.skip(self.engine.union(&acc, geom))? {
                    Some(merged) => Some(merged),
                    None => Some(acc),
                },
            };
        }
        Ok(total)
    }
}

/// Intersection of two layers.
///
/// The result holds one feature per pair of input and method features
/// sharing some area, with the attributes of both.
pub fn intersection(
    input: &mut dyn LayerAccess,
    method: &mut dyn LayerAccess,
    result: &mut dyn LayerAccess,
    options: &CslStringList,
    progress: Option<ProgressFn<'_>>,
) -> Result<()> {
    let mut overlay = Overlay::new("intersection", input, method, options, progress)?;
    overlay.count_work(&[&*input]);
    let input = FilterGuard::new(input);
    let mut method = FilterGuard::new(method);
    let method_filter = method.filter.clone();

    overlay.set_result_schema(
        result,
        input.defn(),
        Some(method.defn()),
        true,
    )?;
    overlay.check_lower_dimension(result);
    overlay.run_pass(
        &*input,
        &mut *method,
        method_filter.as_ref(),
        result,
        Side::Input,
        PassMode::Intersection,
    )?;
    overlay.progress.finish()
}

/// Union of two layers.
///
/// The result holds the features of [`intersection`], plus the parts of
/// input and method features not covered by the other layer, each with
/// the attributes of its own side only.
pub fn union(
    input: &mut dyn LayerAccess,
    method: &mut dyn LayerAccess,
    result: &mut dyn LayerAccess,
    options: &CslStringList,
    progress: Option<ProgressFn<'_>>,
) -> Result<()> {
    let mut overlay = Overlay::new("union", input, method, options, progress)?;
    overlay.count_work(&[&*input, &*method]);
    let mut input = FilterGuard::new(input);
    let mut method = FilterGuard::new(method);
    let input_filter = input.filter.clone();
    let method_filter = method.filter.clone();

    overlay.set_result_schema(
        result,
        input.defn(),
        Some(method.defn()),
        true,
    )?;
    overlay.check_lower_dimension(result);
    overlay.run_pass(
        &*input,
        &mut *method,
        method_filter.as_ref(),
        result,
        Side::Input,
        PassMode::Identity,
    )?;
    method.restore()?;
    overlay.run_pass(
        &*method,
        &mut *input,
        input_filter.as_ref(),
        result,
        Side::Method,
        PassMode::Difference,
    )?;
    overlay.progress.finish()
}

/// Symmetric difference of two layers.
///
/// The result holds the parts of input and method features not covered by
/// the other layer, each with the attributes of its own side only.
pub fn sym_difference(
    input: &mut dyn LayerAccess,
    method: &mut dyn LayerAccess,
    result: &mut dyn LayerAccess,
    options: &CslStringList,
    progress: Option<ProgressFn<'_>>,
) -> Result<()> {
    let mut overlay = Overlay::new("sym_difference", input, method, options, progress)?;
    overlay.count_work(&[&*input, &*method]);
    let mut input = FilterGuard::new(input);
    let mut method = FilterGuard::new(method);
    let input_filter = input.filter.clone();
    let method_filter = method.filter.clone();

    overlay.set_result_schema(
        result,
        input.defn(),
        Some(method.defn()),
        true,
    )?;
    overlay.run_pass(
        &*input,
        &mut *method,
        method_filter.as_ref(),
        result,
        Side::Input,
        PassMode::Difference,
    )?;
    method.restore()?;
    overlay.run_pass(
        &*method,
        &mut *input,
        input_filter.as_ref(),
        result,
        Side::Method,
        PassMode::Difference,
    )?;
    overlay.progress.finish()
}

/// Identity of the input layer with the method layer.
///
/// The result covers exactly the input features: their parts shared with
/// method features carry the attributes of both, the rest the input
/// attributes only.
pub fn identity(
    input: &mut dyn LayerAccess,
    method: &mut dyn LayerAccess,
    result: &mut dyn LayerAccess,
    options: &CslStringList,
    progress: Option<ProgressFn<'_>>,
) -> Result<()> {
    let mut overlay = Overlay::new("identity", input, method, options, progress)?;
    overlay.count_work(&[&*input]);
    let input = FilterGuard::new(input);
    let mut method = FilterGuard::new(method);
    let method_filter = method.filter.clone();

    overlay.set_result_schema(
        result,
        input.defn(),
        Some(method.defn()),
        true,
    )?;
    overlay.check_lower_dimension(result);
    overlay.run_pass(
        &*input,
        &mut *method,
        method_filter.as_ref(),
        result,
        Side::Input,
        PassMode::Identity,
    )?;
    overlay.progress.finish()
}

/// Update of the input layer with the method layer.
///
/// The result holds the parts of input features outside the method layer,
/// with their attributes, followed by every method feature unchanged.
/// Method attributes land in the result fields of the same name.
pub fn update(
    input: &mut dyn LayerAccess,
    method: &mut dyn LayerAccess,
    result: &mut dyn LayerAccess,
    options: &CslStringList,
    progress: Option<ProgressFn<'_>>,
) -> Result<()> {
    let mut overlay = Overlay::new("update", input, method, options, progress)?;
    overlay.count_work(&[&*input, &*method]);
    let input = FilterGuard::new(input);
    let mut method = FilterGuard::new(method);
    let method_filter = method.filter.clone();

    overlay.set_result_schema(
        result,
        input.defn(),
        Some(method.defn()),
        false,
    )?;
    overlay.run_pass(
        &*input,
        &mut *method,
        method_filter.as_ref(),
        result,
        Side::Input,
        PassMode::Difference,
    )?;

    method.restore()?;
    let map_method = overlay.map_method.clone();
    for mut y in FeatureIterator::new(&*method) {
        overlay.progress.tick()?;
        let Some(y_geom) = y.steal_geometry(0) else {
            continue;
        };
        overlay.emit(result, y_geom, &[(&y, map_method.as_slice())])?;
    }
    overlay.progress.finish()
}

/// Clip of the input layer by the method layer.
///
/// The result holds the parts of input features covered by the method
/// layer, with the input attributes.
pub fn clip(
    input: &mut dyn LayerAccess,
    method: &mut dyn LayerAccess,
    result: &mut dyn LayerAccess,
    options: &CslStringList,
    progress: Option<ProgressFn<'_>>,
) -> Result<()> {
    let mut overlay = Overlay::new("clip", input, method, options, progress)?;
    overlay.count_work(&[&*input]);
    let input = FilterGuard::new(input);
    let mut method = FilterGuard::new(method);
    let method_filter = method.filter.clone();

    overlay.set_result_schema(result, input.defn(), None, false)?;
    let map_input = overlay.map_input.clone();
    for x in FeatureIterator::new(&*input) {
        overlay.progress.tick()?;
        let Some(x_geom) = x.geometry() else {
            continue;
        };
        let narrowed = overlay.set_filter_from(&mut *method, method_filter.as_ref(), x_geom);
        if overlay.skip(narrowed)? != Some(true) {
            continue;
        }
        let Some(cover) = overlay.union_of(&*method)? else {
            continue;
        };
        let Some(piece) = overlay.skip(overlay.engine.intersection(x_geom, &cover))? else {
            continue;
        };
        if !piece.is_empty() {
            overlay.emit(result, piece, &[(&x, map_input.as_slice())])?;
        }
    }
    overlay.progress.finish()
}

/// Erase of the method layer from the input layer.
///
/// The result holds the parts of input features outside the method layer,
/// with the input attributes.
pub fn erase(
    input: &mut dyn LayerAccess,
    method: &mut dyn LayerAccess,
    result: &mut dyn LayerAccess,
    options: &CslStringList,
    progress: Option<ProgressFn<'_>>,
) -> Result<()> {
    let mut overlay = Overlay::new("erase", input, method, options, progress)?;
    overlay.count_work(&[&*input]);
    let input = FilterGuard::new(input);
    let mut method = FilterGuard::new(method);
    let method_filter = method.filter.clone();

    overlay.set_result_schema(result, input.defn(), None, false)?;
    overlay.run_pass(
        &*input,
        &mut *method,
        method_filter.as_ref(),
        result,
        Side::Input,
        PassMode::Difference,
    )?;
    overlay.progress.finish()
}
