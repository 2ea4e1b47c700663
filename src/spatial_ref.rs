//! Spatial reference systems attached to geometry fields.
//!
//! Layers only carry and compare spatial references; no coordinate
//! transformation is performed.

use crate::errors::{GdalError, Result};

/// A spatial reference system, kept as its user supplied definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SpatialRef {
    definition: String,
}

impl SpatialRef {
    /// Wraps a definition such as `EPSG:4326` or a WKT `GEOGCS[...]` string.
    pub fn from_definition(definition: &str) -> Result<SpatialRef> {
        let definition = definition.trim();
        if definition.is_empty() {
            return Err(GdalError::BadArgument(
                "Empty spatial reference definition".to_string(),
            ));
        }
        Ok(SpatialRef {
            definition: definition.to_string(),
        })
    }

    pub fn from_epsg(epsg_code: u32) -> Result<SpatialRef> {
        SpatialRef::from_definition(&format!("EPSG:{epsg_code}"))
    }

    pub fn definition(&self) -> &str {
        &self.definition
    }

    /// Authority name and code for `AUTHORITY:CODE` definitions.
    pub fn authority(&self) -> Option<(&str, i32)> {
        let (name, code) = self.definition.split_once(':')?;
        Some((name, code.parse().ok()?))
    }

    pub fn auth_code(&self) -> Result<i32> {
        self.authority().map(|(_, code)| code).ok_or_else(|| {
            GdalError::BadArgument(format!("No authority code in '{}'", self.definition))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_authority() {
        let srs = SpatialRef::from_epsg(4326).unwrap();
        assert_eq!(srs.definition(), "EPSG:4326");
        assert_eq!(srs.authority(), Some(("EPSG", 4326)));
        assert_eq!(srs.auth_code().unwrap(), 4326);

        let srs = SpatialRef::from_definition("LOCAL_CS[\"arbitrary\"]").unwrap();
        assert!(srs.auth_code().is_err());
        assert!(SpatialRef::from_definition("  ").is_err());
    }
}
