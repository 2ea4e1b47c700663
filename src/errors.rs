use thiserror::Error;

use crate::vector::{OGRFieldType, OGRwkbGeometryType};

pub type Result<T> = std::result::Result<T, GdalError>;

/// Result codes returned by layer operations.
///
/// Mirrors the `OGRErr` codes of the OGR C API so callers can tell a missing
/// capability ([`OGRErr::OGRERR_UNSUPPORTED_OPERATION`]) apart from an attempt
/// that failed ([`OGRErr::OGRERR_FAILURE`]).
#[allow(non_snake_case)]
pub mod OGRErr {
    pub type Type = u32;
    pub const OGRERR_NONE: Type = 0;
    pub const OGRERR_NOT_ENOUGH_DATA: Type = 1;
    pub const OGRERR_NOT_ENOUGH_MEMORY: Type = 2;
    pub const OGRERR_UNSUPPORTED_GEOMETRY_TYPE: Type = 3;
    pub const OGRERR_UNSUPPORTED_OPERATION: Type = 4;
    pub const OGRERR_CORRUPT_DATA: Type = 5;
    pub const OGRERR_FAILURE: Type = 6;
    pub const OGRERR_UNSUPPORTED_SRS: Type = 7;
    pub const OGRERR_INVALID_HANDLE: Type = 8;
    pub const OGRERR_NON_EXISTING_FEATURE: Type = 9;

    /// Symbolic name of an error code, for diagnostics.
    pub fn name(err: Type) -> &'static str {
        match err {
            OGRERR_NONE => "OGRERR_NONE",
            OGRERR_NOT_ENOUGH_DATA => "OGRERR_NOT_ENOUGH_DATA",
            OGRERR_NOT_ENOUGH_MEMORY => "OGRERR_NOT_ENOUGH_MEMORY",
            OGRERR_UNSUPPORTED_GEOMETRY_TYPE => "OGRERR_UNSUPPORTED_GEOMETRY_TYPE",
            OGRERR_UNSUPPORTED_OPERATION => "OGRERR_UNSUPPORTED_OPERATION",
            OGRERR_CORRUPT_DATA => "OGRERR_CORRUPT_DATA",
            OGRERR_FAILURE => "OGRERR_FAILURE",
            OGRERR_UNSUPPORTED_SRS => "OGRERR_UNSUPPORTED_SRS",
            OGRERR_INVALID_HANDLE => "OGRERR_INVALID_HANDLE",
            OGRERR_NON_EXISTING_FEATURE => "OGRERR_NON_EXISTING_FEATURE",
            _ => "OGRERR_UNKNOWN",
        }
    }
}

#[derive(Clone, Debug, Error)]
pub enum GdalError {
    #[error("OGR method '{method_name}' returned error: '{err:?}'")]
    OgrError {
        err: OGRErr::Type,
        method_name: &'static str,
    },
    #[error("Unhandled type '{field_type}' on OGR method {method_name}")]
    UnhandledFieldType {
        field_type: OGRFieldType::Type,
        method_name: &'static str,
    },
    #[error("Invalid field name '{field_name}' used on method {method_name}")]
    InvalidFieldName {
        field_name: String,
        method_name: &'static str,
    },
    #[error("Invalid field index {index} used on method {method_name}")]
    InvalidFieldIndex {
        index: usize,
        method_name: &'static str,
    },
    #[error("Unsupported GDAL geometry type: {0}")]
    UnsupportedGdalGeometryType(OGRwkbGeometryType::Type),
    #[error("Invalid WKB: {0}")]
    InvalidWkb(String),
    #[error("BadArgument: {0}")]
    BadArgument(String),
    #[error("User terminated")]
    UserInterrupt,
}

impl GdalError {
    /// The OGR result code equivalent to this error.
    ///
    /// Everything that is not an explicit [`GdalError::OgrError`] maps to
    /// [`OGRErr::OGRERR_FAILURE`].
    pub fn ogr_err(&self) -> OGRErr::Type {
        match self {
            GdalError::OgrError { err, .. } => *err,
            GdalError::UnsupportedGdalGeometryType(_) => OGRErr::OGRERR_UNSUPPORTED_GEOMETRY_TYPE,
            GdalError::InvalidWkb(_) => OGRErr::OGRERR_CORRUPT_DATA,
            _ => OGRErr::OGRERR_FAILURE,
        }
    }

    /// Whether the error means the capability is absent, as opposed to a
    /// failed attempt.
    pub fn is_unsupported(&self) -> bool {
        self.ogr_err() == OGRErr::OGRERR_UNSUPPORTED_OPERATION
    }
}

pub(crate) fn ogr_error(err: OGRErr::Type, method_name: &'static str) -> GdalError {
    GdalError::OgrError { err, method_name }
}

pub(crate) fn unsupported(method_name: &'static str) -> GdalError {
    ogr_error(OGRErr::OGRERR_UNSUPPORTED_OPERATION, method_name)
}

pub(crate) fn failure(method_name: &'static str) -> GdalError {
    ogr_error(OGRErr::OGRERR_FAILURE, method_name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ogr_err_mapping() {
        let err = unsupported("OGR_L_CreateField");
        assert!(err.is_unsupported());
        assert_eq!(err.ogr_err(), OGRErr::OGRERR_UNSUPPORTED_OPERATION);

        let err = GdalError::BadArgument("nope".to_string());
        assert_eq!(err.ogr_err(), OGRErr::OGRERR_FAILURE);
        assert!(!err.is_unsupported());
    }

    #[test]
    fn test_display() {
        let err = ogr_error(OGRErr::OGRERR_NON_EXISTING_FEATURE, "OGR_L_UpdateFeature");
        assert_eq!(
            err.to_string(),
            "OGR method 'OGR_L_UpdateFeature' returned error: '9'"
        );
        assert_eq!(OGRErr::name(err.ogr_err()), "OGRERR_NON_EXISTING_FEATURE");
    }
}
