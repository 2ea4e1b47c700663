use bitflags::bitflags;

bitflags! {
    /// Flags for [`LayerAccess::get_geometry_types`].
    ///
    /// Correspond to the `OGR_GGT_*` flags of `OGR_L_GetGeometryTypes`.
    ///
    /// [`LayerAccess::get_geometry_types`]: crate::vector::LayerAccess::get_geometry_types
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct GeometryTypesFlags: u32 {
        /// Only the set of distinct types matters; counts may be left at zero.
        const COUNT_NOT_NEEDED = 0x1;
        /// Stop as soon as two distinct non-null geometry types have been seen.
        /// Counts are then meaningless.
        const STOP_IF_MIXED = 0x2;
        /// Report a `GEOMETRYCOLLECTION Z` whose first member is a `TIN Z` as `TIN Z`.
        const GEOMCOLLECTIONZ_TINZ = 0x4;
    }
}

bitflags! {
    /// Parts of a field definition replaced by [`LayerAccess::alter_field_defn`].
    ///
    /// [`LayerAccess::alter_field_defn`]: crate::vector::LayerAccess::alter_field_defn
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct AlterFieldDefnFlags: u32 {
        const NAME = 0x1;
        const TYPE = 0x2;
        const WIDTH_PRECISION = 0x4;
        const NULLABLE = 0x8;
        const DEFAULT = 0x10;
        const UNIQUE = 0x20;
        const ALL = Self::NAME.bits()
            | Self::TYPE.bits()
            | Self::WIDTH_PRECISION.bits()
            | Self::NULLABLE.bits()
            | Self::DEFAULT.bits()
            | Self::UNIQUE.bits();
    }
}

bitflags! {
    /// Parts of a geometry field definition replaced by
    /// [`LayerAccess::alter_geom_field_defn`].
    ///
    /// [`LayerAccess::alter_geom_field_defn`]: crate::vector::LayerAccess::alter_geom_field_defn
    #[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
    pub struct AlterGeomFieldDefnFlags: u32 {
        const NAME = 0x1000;
        const TYPE = 0x2000;
        const NULLABLE = 0x4000;
        const SRS = 0x8000;
        const COORD_PRECISION = 0x20000;
        const ALL = Self::NAME.bits()
            | Self::TYPE.bits()
            | Self::NULLABLE.bits()
            | Self::SRS.bits()
            | Self::COORD_PRECISION.bits();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_combine() {
        let flags = GeometryTypesFlags::STOP_IF_MIXED | GeometryTypesFlags::COUNT_NOT_NEEDED;
        assert!(flags.contains(GeometryTypesFlags::STOP_IF_MIXED));
        assert!(!flags.contains(GeometryTypesFlags::GEOMCOLLECTIONZ_TINZ));
        assert_eq!(GeometryTypesFlags::default(), GeometryTypesFlags::empty());
    }

    #[test]
    fn test_alter_all() {
        assert!(AlterFieldDefnFlags::ALL.contains(AlterFieldDefnFlags::WIDTH_PRECISION));
        assert!(AlterGeomFieldDefnFlags::ALL.contains(AlterGeomFieldDefnFlags::SRS));
        assert!(!AlterFieldDefnFlags::NAME.contains(AlterFieldDefnFlags::TYPE));
    }
}
