//! Geometry type codes and the helpers that classify them.

/// ISO geometry type codes.
///
/// `Z` variants add 1000, `M` variants 2000 and `ZM` variants 3000 to the
/// base code.
#[allow(non_snake_case, non_upper_case_globals)]
pub mod OGRwkbGeometryType {
    pub type Type = u32;
    pub const wkbUnknown: Type = 0;
    pub const wkbPoint: Type = 1;
    pub const wkbLineString: Type = 2;
    pub const wkbPolygon: Type = 3;
    pub const wkbMultiPoint: Type = 4;
    pub const wkbMultiLineString: Type = 5;
    pub const wkbMultiPolygon: Type = 6;
    pub const wkbGeometryCollection: Type = 7;
    pub const wkbCircularString: Type = 8;
    pub const wkbCompoundCurve: Type = 9;
    pub const wkbCurvePolygon: Type = 10;
    pub const wkbMultiCurve: Type = 11;
    pub const wkbMultiSurface: Type = 12;
    pub const wkbCurve: Type = 13;
    pub const wkbSurface: Type = 14;
    pub const wkbPolyhedralSurface: Type = 15;
    pub const wkbTIN: Type = 16;
    pub const wkbTriangle: Type = 17;
    pub const wkbNone: Type = 100;
    pub const wkbLinearRing: Type = 101;

    pub const wkbPointZ: Type = 1001;
    pub const wkbLineStringZ: Type = 1002;
    pub const wkbPolygonZ: Type = 1003;
    pub const wkbMultiPointZ: Type = 1004;
    pub const wkbMultiLineStringZ: Type = 1005;
    pub const wkbMultiPolygonZ: Type = 1006;
    pub const wkbGeometryCollectionZ: Type = 1007;
    pub const wkbCircularStringZ: Type = 1008;
    pub const wkbTINZ: Type = 1016;
    pub const wkbTriangleZ: Type = 1017;

    pub const wkbPointM: Type = 2001;
    pub const wkbLineStringM: Type = 2002;
    pub const wkbPolygonM: Type = 2003;
    pub const wkbCircularStringM: Type = 2008;

    pub const wkbPointZM: Type = 3001;
    pub const wkbLineStringZM: Type = 3002;
    pub const wkbPolygonZM: Type = 3003;
}

use OGRwkbGeometryType::*;

/// Strips the `Z`/`M` modifiers.
pub fn wkb_flatten(geometry_type: OGRwkbGeometryType::Type) -> OGRwkbGeometryType::Type {
    if geometry_type == wkbNone || geometry_type == wkbLinearRing {
        return geometry_type;
    }
    geometry_type % 1000
}

pub fn has_z(geometry_type: OGRwkbGeometryType::Type) -> bool {
    matches!(geometry_type / 1000, 1 | 3)
}

pub fn has_m(geometry_type: OGRwkbGeometryType::Type) -> bool {
    matches!(geometry_type / 1000, 2 | 3)
}

/// Applies the given `Z`/`M` modifiers to a (possibly already modified) type.
pub fn set_modifier(
    geometry_type: OGRwkbGeometryType::Type,
    z: bool,
    m: bool,
) -> OGRwkbGeometryType::Type {
    let flat = wkb_flatten(geometry_type);
    if flat == wkbNone || flat == wkbLinearRing {
        return flat;
    }
    flat + if z { 1000 } else { 0 } + if m { 2000 } else { 0 }
}

/// Whether the type can hold circular arcs or other curve segments.
pub fn is_non_linear(geometry_type: OGRwkbGeometryType::Type) -> bool {
    matches!(
        wkb_flatten(geometry_type),
        wkbCircularString
            | wkbCompoundCurve
            | wkbCurvePolygon
            | wkbMultiCurve
            | wkbMultiSurface
            | wkbCurve
            | wkbSurface
    )
}

/// The linear type curve geometries are approximated with.
pub fn get_linear(geometry_type: OGRwkbGeometryType::Type) -> OGRwkbGeometryType::Type {
    let linear = match wkb_flatten(geometry_type) {
        wkbCircularString | wkbCompoundCurve | wkbCurve => wkbLineString,
        wkbCurvePolygon | wkbSurface => wkbPolygon,
        wkbMultiCurve => wkbMultiLineString,
        wkbMultiSurface => wkbMultiPolygon,
        _ => return geometry_type,
    };
    set_modifier(linear, has_z(geometry_type), has_m(geometry_type))
}

/// Whether geometries of `sub_type` may be stored in a field declared as `super_type`.
pub fn is_sub_class_of(
    sub_type: OGRwkbGeometryType::Type,
    super_type: OGRwkbGeometryType::Type,
) -> bool {
    let sub = wkb_flatten(sub_type);
    let sup = wkb_flatten(super_type);
    if sup == wkbUnknown || sub == sup {
        return true;
    }
    match sup {
        wkbGeometryCollection => matches!(
            sub,
            wkbMultiPoint | wkbMultiLineString | wkbMultiPolygon | wkbMultiCurve | wkbMultiSurface
        ),
        wkbCurvePolygon => sub == wkbPolygon || sub == wkbTriangle,
        wkbMultiCurve => sub == wkbMultiLineString,
        wkbMultiSurface => sub == wkbMultiPolygon,
        wkbCurve => matches!(sub, wkbLineString | wkbCircularString | wkbCompoundCurve),
        wkbSurface => matches!(sub, wkbCurvePolygon | wkbPolygon | wkbTriangle | wkbTIN),
        wkbPolygon => sub == wkbTriangle,
        wkbPolyhedralSurface => sub == wkbTIN,
        _ => false,
    }
}

/// Human readable name, as produced by `OGRGeometryTypeToName`.
pub fn geometry_type_to_name(geometry_type: OGRwkbGeometryType::Type) -> String {
    let base = match wkb_flatten(geometry_type) {
        wkbUnknown => "Unknown (any)",
        wkbPoint => "Point",
        wkbLineString => "Line String",
        wkbPolygon => "Polygon",
        wkbMultiPoint => "Multi Point",
        wkbMultiLineString => "Multi Line String",
        wkbMultiPolygon => "Multi Polygon",
        wkbGeometryCollection => "Geometry Collection",
        wkbCircularString => "Circular String",
        wkbCompoundCurve => "Compound Curve",
        wkbCurvePolygon => "Curve Polygon",
        wkbMultiCurve => "Multi Curve",
        wkbMultiSurface => "Multi Surface",
        wkbCurve => "Curve",
        wkbSurface => "Surface",
        wkbPolyhedralSurface => "Polyhedral Surface",
        wkbTIN => "TIN",
        wkbTriangle => "Triangle",
        wkbNone => return "None".to_string(),
        wkbLinearRing => return "Linear Ring".to_string(),
        _ => return format!("Unrecognized: {geometry_type}"),
    };
    match (has_z(geometry_type), has_m(geometry_type)) {
        (true, true) => format!("3D Measured {base}"),
        (true, false) => format!("3D {base}"),
        (false, true) => format!("Measured {base}"),
        (false, false) => base.to_string(),
    }
}
