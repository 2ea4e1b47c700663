use ogr_layer::cpl::CslStringList;
use ogr_layer::errors::{GdalError, Result};
use ogr_layer::vector::{
    overlay, Feature, FieldDefn, Geometry, LayerAccess, MemoryLayer, OGRFieldType,
    OGRwkbGeometryType,
};

fn assert_almost_eq(a: f64, b: f64) {
    assert!((a - b).abs() < 1e-9, "{a} != {b}");
}

/// A polygon layer with a string field `name` and an integer field `id`.
fn parcels(name: &str, rows: &[(&str, &str)]) -> MemoryLayer {
    let mut layer = MemoryLayer::new(name, OGRwkbGeometryType::wkbPolygon);
    layer
        .create_field(&FieldDefn::new("name", OGRFieldType::OFTString), true)
        .unwrap();
    layer
        .create_field(&FieldDefn::new("id", OGRFieldType::OFTInteger), true)
        .unwrap();
    for (i, (value, wkt)) in rows.iter().enumerate() {
        let mut feature = Feature::new(layer.base().defn_arc().clone());
        feature.set_field_string("name", value).unwrap();
        feature.set_field_integer("id", i as i32).unwrap();
        feature.set_geometry(Geometry::from_wkt(wkt).unwrap()).unwrap();
        layer.create_feature(&mut feature).unwrap();
    }
    layer
}

fn result_layer() -> MemoryLayer {
    MemoryLayer::new("result", OGRwkbGeometryType::wkbUnknown)
}

fn total_area(layer: &MemoryLayer) -> f64 {
    layer
        .features()
        .filter_map(|f| f.geometry().map(Geometry::area))
        .sum()
}

fn strings(layer: &MemoryLayer, field: &str) -> Vec<Option<String>> {
    layer
        .features()
        .map(|f| f.field(field).unwrap().and_then(|v| v.into_string()))
        .collect()
}

#[test]
fn test_union_field_collision() -> Result<()> {
    let mut input = parcels("input", &[("a", "POLYGON ((0 0,0 2,2 2,2 0,0 0))")]);
    let mut method = parcels("method", &[("b", "POLYGON ((1 1,1 3,3 3,3 1,1 1))")]);
    let mut result = result_layer();
    overlay::union(&mut input, &mut method, &mut result, &CslStringList::new(), None)?;

    let names: Vec<_> = result.defn().fields().map(|f| f.name().to_string()).collect();
    assert_eq!(names, ["input_name", "input_id", "method_name", "method_id"]);
    assert_eq!(result.feature_count(), 3);
    assert_almost_eq(total_area(&result), 7.0);
    assert_eq!(
        strings(&result, "input_name"),
        [Some("a".to_string()), Some("a".to_string()), None]
    );
    assert_eq!(
        strings(&result, "method_name"),
        [Some("b".to_string()), None, Some("b".to_string())]
    );
    Ok(())
}

#[test]
fn test_erase_l_shape() -> Result<()> {
    let mut input = parcels("input", &[("block", "POLYGON ((0 0,0 2,2 2,2 0,0 0))")]);
    let mut method = parcels("method", &[("corner", "POLYGON ((1 1,1 3,3 3,3 1,1 1))")]);
    let mut result = result_layer();
    overlay::erase(&mut input, &mut method, &mut result, &CslStringList::new(), None)?;

    assert_eq!(result.feature_count(), 1);
    let feature = result.features().next().unwrap();
    let l_shape = feature.geometry().unwrap();
    assert_eq!(l_shape.geometry_type(), OGRwkbGeometryType::wkbPolygon);
    assert_almost_eq(l_shape.area(), 3.0);
    assert_eq!(
        feature.field("name")?.and_then(|v| v.into_string()),
        Some("block".to_string())
    );
    // only input attributes
    assert_eq!(result.defn().field_count(), 2);
    Ok(())
}

#[test]
fn test_intersection_respects_method_filter() -> Result<()> {
    let mut input = parcels("input", &[("a", "POLYGON ((0 0,0 10,10 10,10 0,0 0))")]);
    let mut method = parcels(
        "method",
        &[
            ("left", "POLYGON ((-1 4,-1 6,2 6,2 4,-1 4))"),
            ("right", "POLYGON ((8 4,8 6,11 6,11 4,8 4))"),
        ],
    );
    let window = Geometry::rect(-5.0, -5.0, 5.0, 15.0);
    method.set_spatial_filter(0, Some(&window))?;

    let mut result = result_layer();
    let options = CslStringList::from(&[("METHOD_PREFIX", "m_"), ("INPUT_PREFIX", "i_")]);
    overlay::intersection(&mut input, &mut method, &mut result, &options, None)?;

    assert_eq!(strings(&result, "m_name"), [Some("left".to_string())]);
    assert_almost_eq(total_area(&result), 4.0);
    assert_eq!(method.spatial_filter(), Some(&window));
    assert!(input.spatial_filter().is_none());
    Ok(())
}

#[test]
fn test_identity_and_update_cover_input() -> Result<()> {
    let mut input = parcels(
        "input",
        &[
            ("a", "POLYGON ((0 0,0 2,2 2,2 0,0 0))"),
            ("b", "POLYGON ((4 0,4 2,6 2,6 0,4 0))"),
        ],
    );
    let mut method = parcels("method", &[("m", "POLYGON ((1 -1,1 3,5 3,5 -1,1 -1))")]);

    let mut identity = result_layer();
    overlay::identity(&mut input, &mut method, &mut identity, &CslStringList::new(), None)?;
    assert_eq!(identity.feature_count(), 4);
    assert_almost_eq(total_area(&identity), 8.0);

    let mut update = result_layer();
    overlay::update(&mut input, &mut method, &mut update, &CslStringList::new(), None)?;
    assert_eq!(update.feature_count(), 3);
    // two unit-wide leftovers plus the whole method feature
    assert_almost_eq(total_area(&update), 2.0 + 2.0 + 16.0);
    assert_eq!(
        strings(&update, "name"),
        [
            Some("a".to_string()),
            Some("b".to_string()),
            Some("m".to_string())
        ]
    );
    Ok(())
}

#[test]
fn test_clip_and_sym_difference() -> Result<()> {
    let mut input = parcels("input", &[("a", "POLYGON ((0 0,0 4,4 4,4 0,0 0))")]);
    let mut method = parcels(
        "method",
        &[
            ("m1", "POLYGON ((-1 -1,-1 2,2 2,2 -1,-1 -1))"),
            ("m2", "POLYGON ((1 1,1 3,3 3,3 1,1 1))"),
        ],
    );

    let mut clipped = result_layer();
    overlay::clip(&mut input, &mut method, &mut clipped, &CslStringList::new(), None)?;
    assert_eq!(clipped.feature_count(), 1);
    // 4 from m1, 4 from m2, 1 shared
    assert_almost_eq(total_area(&clipped), 7.0);

    let mut sym = result_layer();
    overlay::sym_difference(&mut input, &mut method, &mut sym, &CslStringList::new(), None)?;
    // input minus both, then m1 minus input; m2 lies inside the input
    assert_eq!(sym.feature_count(), 2);
    assert_almost_eq(total_area(&sym), 9.0 + 5.0);
    Ok(())
}

#[test]
fn test_cancellation_restores_filters() {
    let mut input = parcels(
        "input",
        &[
            ("a", "POLYGON ((0 0,0 2,2 2,2 0,0 0))"),
            ("b", "POLYGON ((4 0,4 2,6 2,6 0,4 0))"),
        ],
    );
    let mut method = parcels("method", &[("m", "POLYGON ((1 -1,1 3,5 3,5 -1,1 -1))")]);
    let mut calls = 0;
    let mut cancel_early = |_done: f64| {
        calls += 1;
        false
    };
    let mut result = result_layer();
    let err = overlay::union(
        &mut input,
        &mut method,
        &mut result,
        &CslStringList::new(),
        Some(&mut cancel_early),
    )
    .unwrap_err();
    assert!(matches!(err, GdalError::UserInterrupt));
    assert_eq!(calls, 1);
    assert!(input.spatial_filter().is_none());
    assert!(method.spatial_filter().is_none());
}
