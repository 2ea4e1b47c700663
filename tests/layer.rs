use ogr_layer::errors::{OGRErr, Result};
use ogr_layer::vector::{
    Feature, FieldDefn, Geometry, LayerAccess, LayerCaps, MemoryLayer, OGRFieldType,
    OGRwkbGeometryType,
};

fn field_names(layer: &MemoryLayer) -> Vec<String> {
    layer
        .defn()
        .fields()
        .map(|f| f.name().to_string())
        .collect()
}

fn layer_with_fields(names: &[&str]) -> MemoryLayer {
    let mut layer = MemoryLayer::new("fields", OGRwkbGeometryType::wkbPoint);
    for name in names {
        layer
            .create_field(&FieldDefn::new(name, OGRFieldType::OFTString), true)
            .unwrap();
    }
    layer
}

fn roads() -> MemoryLayer {
    let mut layer = MemoryLayer::new("roads", OGRwkbGeometryType::wkbLineString);
    layer
        .create_field(&FieldDefn::new("highway", OGRFieldType::OFTString), true)
        .unwrap();
    layer
        .create_field(&FieldDefn::new("lanes", OGRFieldType::OFTInteger), true)
        .unwrap();
    let rows = [
        ("primary", 2, "LINESTRING (0 0,10 0)"),
        ("residential", 1, "LINESTRING (0 5,0 15)"),
        ("motorway", 4, "LINESTRING (20 20,30 30)"),
        ("primary", 3, "LINESTRING (5 -5,5 5)"),
    ];
    for (highway, lanes, wkt) in rows {
        let mut feature = Feature::new(layer.base().defn_arc().clone());
        feature.set_field_string("highway", highway).unwrap();
        feature.set_field_integer("lanes", lanes).unwrap();
        feature.set_geometry(Geometry::from_wkt(wkt).unwrap()).unwrap();
        layer.create_feature(&mut feature).unwrap();
    }
    layer
}

fn fids(layer: &MemoryLayer) -> Vec<i64> {
    layer.features().map(|f| f.fid()).collect()
}

#[test]
fn test_reorder_field() -> Result<()> {
    let mut layer = layer_with_fields(&["A", "B", "C", "D", "E"]);
    layer.reorder_field(1, 3)?;
    assert_eq!(field_names(&layer), ["A", "C", "D", "B", "E"]);

    let mut layer = layer_with_fields(&["A", "B", "C", "D", "E"]);
    layer.reorder_field(3, 1)?;
    assert_eq!(field_names(&layer), ["A", "D", "B", "C", "E"]);

    assert!(layer.reorder_field(0, 5).is_err());
    Ok(())
}

#[test]
fn test_single_iterator() {
    let layer = roads();
    let first = layer.features();
    let mut second = layer.features();
    assert!(second.next().is_none());
    drop(second);
    assert_eq!(first.count(), 4);

    // the guard is released once the first iterator is gone
    assert_eq!(layer.features().count(), 4);
}

#[test]
fn test_attribute_filter_round_trip() -> Result<()> {
    let mut layer = roads();
    let unfiltered = fids(&layer);

    layer.set_attribute_filter("highway = 'primary' AND lanes >= 3")?;
    assert_eq!(fids(&layer), [3]);
    assert_eq!(layer.attribute_filter(), Some("highway = 'primary' AND lanes >= 3"));

    layer.clear_attribute_filter();
    assert_eq!(fids(&layer), unfiltered);
    assert!(layer.attribute_filter().is_none());

    // a filter that does not compile leaves none installed
    assert!(layer.set_attribute_filter("nope = 1").is_err());
    assert_eq!(fids(&layer), unfiltered);
    Ok(())
}

#[test]
fn test_spatial_filter() -> Result<()> {
    let mut layer = roads();
    layer.set_spatial_filter_rect(0, -1.0, -1.0, 6.0, 6.0)?;
    assert_eq!(fids(&layer), [0, 1, 3]);
    assert!(!layer.has_capability(LayerCaps::OLCFastFeatureCount));
    assert_eq!(layer.feature_count(), 3);

    // both filters apply together
    layer.set_attribute_filter("highway = 'primary'")?;
    assert_eq!(fids(&layer), [0, 3]);

    layer.clear_spatial_filter();
    layer.clear_attribute_filter();
    assert_eq!(layer.try_feature_count(), Some(4));
    Ok(())
}

#[test]
fn test_extent() -> Result<()> {
    let layer = MemoryLayer::new("empty", OGRwkbGeometryType::wkbPoint);
    assert!(layer.get_extent(0, true).is_err());

    let mut layer = MemoryLayer::new("one", OGRwkbGeometryType::wkbPoint);
    let mut feature = Feature::new(layer.base().defn_arc().clone());
    feature.set_geometry(Geometry::point(1.0, 2.0))?;
    layer.create_feature(&mut feature)?;
    let extent = layer.get_extent(0, true)?;
    assert_eq!(
        (extent.MinX, extent.MaxX, extent.MinY, extent.MaxY),
        (1.0, 1.0, 2.0, 2.0)
    );

    let extent = layer.get_extent_3d(0, true)?;
    assert_eq!(extent.MinZ, f64::INFINITY);
    assert_eq!(extent.MaxZ, f64::NEG_INFINITY);
    Ok(())
}

#[test]
fn test_set_next_by_index() -> Result<()> {
    let mut layer = roads();
    layer.set_attribute_filter("highway = 'primary'")?;
    layer.set_next_by_index(1)?;
    assert_eq!(layer.next_feature().map(|f| f.fid()), Some(3));
    assert!(layer.set_next_by_index(-1).is_err());
    Ok(())
}

#[test]
fn test_rollback_schema_and_rows() -> Result<()> {
    let mut layer = roads();
    let names = field_names(&layer);

    layer.start_transaction()?;
    layer.create_field(&FieldDefn::new("surface", OGRFieldType::OFTString), true)?;
    layer.delete_field(0)?;
    layer.delete_feature(2)?;
    assert_eq!(field_names(&layer), ["lanes", "surface"]);
    layer.rollback_transaction()?;

    assert_eq!(field_names(&layer), names);
    assert_eq!(fids(&layer), [0, 1, 2, 3]);
    let feature = layer.feature(2).unwrap();
    assert_eq!(
        feature.field("highway")?.and_then(|v| v.into_string()),
        Some("motorway".to_string())
    );
    Ok(())
}

#[test]
fn test_transaction_guard() -> Result<()> {
    let mut layer = roads();
    {
        let mut txn = layer.transaction()?;
        txn.delete_feature(0)?;
        txn.commit()?;
    }
    {
        let mut txn = layer.transaction()?;
        txn.delete_feature(1)?;
        // dropped without commit
    }
    assert_eq!(fids(&layer), [1, 2, 3]);

    let err = layer.commit_transaction().unwrap_err();
    assert_eq!(err.ogr_err(), OGRErr::OGRERR_FAILURE);
    Ok(())
}

#[test]
fn test_update_feature_selected_fields() -> Result<()> {
    let mut layer = roads();
    let mut patch = Feature::new(layer.base().defn_arc().clone());
    patch.set_fid(0);
    patch.set_field_integer("lanes", 6)?;
    patch.set_field_string("highway", "ignored")?;
    layer.update_feature(&mut patch, &[1], &[], false)?;

    let feature = layer.feature(0).unwrap();
    assert_eq!(feature.field("lanes")?.and_then(|v| v.into_int()), Some(6));
    assert_eq!(
        feature.field("highway")?.and_then(|v| v.into_string()),
        Some("primary".to_string())
    );
    Ok(())
}
