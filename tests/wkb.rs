use std::io::{Read, Write};

use geo_types::{LineString, Polygon};
use ogr_layer::errors::Result;
use ogr_layer::vector::filter::filter_wkb_geometry;
use ogr_layer::vector::{wkb, Envelope, GeoEngine, Geometry, SpatialFilter};

fn to_wkb(geometry: &Polygon<f64>) -> Vec<u8> {
    let mut buf = Vec::new();
    ::wkb::writer::write_geometry(&mut buf, geometry, &Default::default()).unwrap();
    buf
}

/// An L-shaped polygon whose envelope is the square (0,0)-(10,10).
fn l_shape() -> Polygon<f64> {
    Polygon::new(
        LineString::from(vec![
            (0.0, 0.0),
            (10.0, 0.0),
            (10.0, 1.0),
            (1.0, 1.0),
            (1.0, 10.0),
            (0.0, 10.0),
        ]),
        vec![],
    )
}

#[test]
fn test_read_external_wkb_through_file() -> Result<()> {
    let (mut file, path) = tempfile::Builder::new()
        .suffix(".wkb")
        .tempfile()
        .unwrap()
        .into_parts();
    file.write_all(&to_wkb(&l_shape())).unwrap();
    drop(file);

    let mut buf = Vec::new();
    std::fs::File::open(&path)
        .unwrap()
        .read_to_end(&mut buf)
        .unwrap();

    let geometry = wkb::read_geometry(&buf)?;
    let expected = Geometry::from_wkt("POLYGON ((0 0,10 0,10 1,1 1,1 10,0 10,0 0))")?;
    assert_eq!(geometry, expected);
    assert_eq!(geometry.area(), 19.0);
    Ok(())
}

#[test]
fn test_bounding_box() {
    let buf = to_wkb(&l_shape());
    let env = wkb::bounding_box(&buf).unwrap();
    assert_eq!(
        (env.MinX, env.MinY, env.MaxX, env.MaxY),
        (0.0, 0.0, 10.0, 10.0)
    );

    assert!(wkb::bounding_box(&buf[..buf.len() - 4]).is_none());
    assert!(wkb::bounding_box(&[]).is_none());
}

#[test]
fn test_filter_wkb_geometry() {
    let buf = to_wkb(&l_shape());

    // inside the envelope of the L but away from its arms
    let notch = SpatialFilter::new(0, &Geometry::rect(5.0, 5.0, 8.0, 8.0));
    let mut env = None;
    assert!(!filter_wkb_geometry(
        &buf,
        &mut env,
        Some(&notch),
        Some(&GeoEngine),
        &mut None
    ));
    assert_eq!(env.map(|e| e.MaxX), Some(10.0));

    // envelope test only
    assert!(filter_wkb_geometry(
        &buf,
        &mut None,
        Some(&notch),
        None,
        &mut None
    ));

    let corner = SpatialFilter::new(0, &Geometry::rect(-1.0, -1.0, 0.5, 0.5));
    assert!(filter_wkb_geometry(
        &buf,
        &mut None,
        Some(&corner),
        Some(&GeoEngine),
        &mut None
    ));

    let far = SpatialFilter::new(0, &Geometry::rect(20.0, 20.0, 30.0, 30.0));
    assert!(!filter_wkb_geometry(
        &buf,
        &mut None,
        Some(&far),
        Some(&GeoEngine),
        &mut None
    ));

    assert!(filter_wkb_geometry(&buf, &mut None, None, None, &mut None));
}

#[test]
fn test_trusted_envelope() {
    let buf = to_wkb(&l_shape());
    let far = SpatialFilter::new(0, &Geometry::rect(20.0, 20.0, 30.0, 30.0));
    // a cached envelope is used without looking at the buffer
    let mut env = Some(Envelope::new(19.0, 19.0, 21.0, 21.0));
    assert!(filter_wkb_geometry(
        &buf,
        &mut env,
        Some(&far),
        None,
        &mut None
    ));
}
