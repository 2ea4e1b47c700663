/// Axis aligned 2D bounding box.
///
/// A fresh envelope is "not initialized": its minimums are `+inf` and its
/// maximums `-inf`, so the first [`Envelope::merge`] sets it to the merged box.
#[derive(Clone, Copy, Debug, PartialEq)]
#[allow(non_snake_case)]
pub struct Envelope {
    pub MinX: f64,
    pub MaxX: f64,
    pub MinY: f64,
    pub MaxY: f64,
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope {
            MinX: f64::INFINITY,
            MaxX: f64::NEG_INFINITY,
            MinY: f64::INFINITY,
            MaxY: f64::NEG_INFINITY,
        }
    }
}

impl Envelope {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> Self {
        Envelope {
            MinX: min_x,
            MaxX: max_x,
            MinY: min_y,
            MaxY: max_y,
        }
    }

    pub fn is_init(&self) -> bool {
        self.MinX <= self.MaxX && self.MinY <= self.MaxY
    }

    pub fn merge(&mut self, other: &Envelope) {
        self.MinX = self.MinX.min(other.MinX);
        self.MaxX = self.MaxX.max(other.MaxX);
        self.MinY = self.MinY.min(other.MinY);
        self.MaxY = self.MaxY.max(other.MaxY);
    }

    pub fn merge_xy(&mut self, x: f64, y: f64) {
        self.MinX = self.MinX.min(x);
        self.MaxX = self.MaxX.max(x);
        self.MinY = self.MinY.min(y);
        self.MaxY = self.MaxY.max(y);
    }

    pub fn intersects(&self, other: &Envelope) -> bool {
        self.MinX <= other.MaxX
            && self.MaxX >= other.MinX
            && self.MinY <= other.MaxY
            && self.MaxY >= other.MinY
    }

    /// Whether `other` lies entirely inside this envelope (boundary included).
    pub fn contains(&self, other: &Envelope) -> bool {
        self.MinX <= other.MinX
            && self.MinY <= other.MinY
            && self.MaxX >= other.MaxX
            && self.MaxY >= other.MaxY
    }

    pub fn contains_xy(&self, x: f64, y: f64) -> bool {
        x >= self.MinX && y >= self.MinY && x <= self.MaxX && y <= self.MaxY
    }

    /// Whether any ordinate is NaN.
    pub fn has_nan(&self) -> bool {
        self.MinX.is_nan() || self.MinY.is_nan() || self.MaxX.is_nan() || self.MaxY.is_nan()
    }
}

/// Axis aligned 3D bounding box.
///
/// `MinZ = +inf` and `MaxZ = -inf` mean no Z range was recorded; merging such
/// an envelope leaves the other Z range untouched.
#[derive(Clone, Copy, Debug, PartialEq)]
#[allow(non_snake_case)]
pub struct Envelope3D {
    pub MinX: f64,
    pub MaxX: f64,
    pub MinY: f64,
    pub MaxY: f64,
    pub MinZ: f64,
    pub MaxZ: f64,
}

impl Default for Envelope3D {
    fn default() -> Self {
        Envelope3D {
            MinX: f64::INFINITY,
            MaxX: f64::NEG_INFINITY,
            MinY: f64::INFINITY,
            MaxY: f64::NEG_INFINITY,
            MinZ: f64::INFINITY,
            MaxZ: f64::NEG_INFINITY,
        }
    }
}

impl Envelope3D {
    pub fn is_init(&self) -> bool {
        self.MinX <= self.MaxX && self.MinY <= self.MaxY
    }

    pub fn merge(&mut self, other: &Envelope3D) {
        self.MinX = self.MinX.min(other.MinX);
        self.MaxX = self.MaxX.max(other.MaxX);
        self.MinY = self.MinY.min(other.MinY);
        self.MaxY = self.MaxY.max(other.MaxY);
        // min/max against the infinity sentinels leave a populated range intact
        self.MinZ = self.MinZ.min(other.MinZ);
        self.MaxZ = self.MaxZ.max(other.MaxZ);
    }

    pub fn merge_xyz(&mut self, x: f64, y: f64, z: f64) {
        self.MinX = self.MinX.min(x);
        self.MaxX = self.MaxX.max(x);
        self.MinY = self.MinY.min(y);
        self.MaxY = self.MaxY.max(y);
        self.MinZ = self.MinZ.min(z);
        self.MaxZ = self.MaxZ.max(z);
    }

    /// Resets the Z range to the "no Z recorded" sentinels.
    pub fn clear_z(&mut self) {
        self.MinZ = f64::INFINITY;
        self.MaxZ = f64::NEG_INFINITY;
    }

    pub fn intersects(&self, other: &Envelope3D) -> bool {
        self.MinX <= other.MaxX
            && self.MaxX >= other.MinX
            && self.MinY <= other.MaxY
            && self.MaxY >= other.MinY
            && self.MinZ <= other.MaxZ
            && self.MaxZ >= other.MinZ
    }

    pub fn contains(&self, other: &Envelope3D) -> bool {
        self.MinX <= other.MinX
            && self.MinY <= other.MinY
            && self.MaxX >= other.MaxX
            && self.MaxY >= other.MaxY
            && self.MinZ <= other.MinZ
            && self.MaxZ >= other.MaxZ
    }

    pub fn to_2d(&self) -> Envelope {
        Envelope::new(self.MinX, self.MinY, self.MaxX, self.MaxY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_2d() {
        let mut env = Envelope::default();
        assert!(!env.is_init());
        env.merge(&Envelope::new(0.0, 0.0, 1.0, 1.0));
        env.merge(&Envelope::new(-1.0, 0.5, 0.5, 3.0));
        assert_eq!(env, Envelope::new(-1.0, 0.0, 1.0, 3.0));
        assert!(env.is_init());
    }

    #[test]
    fn test_intersects_contains() {
        let env = Envelope::new(0.0, 0.0, 2.0, 2.0);
        assert!(env.intersects(&Envelope::new(2.0, 2.0, 3.0, 3.0)));
        assert!(!env.intersects(&Envelope::new(2.1, 0.0, 3.0, 3.0)));
        assert!(env.contains(&Envelope::new(0.0, 0.5, 2.0, 1.0)));
        assert!(!env.contains(&Envelope::new(0.0, 0.5, 2.5, 1.0)));
    }

    #[test]
    fn test_merge_3d_keeps_populated_z() {
        let mut env = Envelope3D::default();
        env.merge_xyz(0.0, 0.0, 5.0);
        env.merge_xyz(1.0, 1.0, 7.0);

        let mut flat = Envelope3D {
            MinX: -1.0,
            MaxX: 0.0,
            MinY: -1.0,
            MaxY: 0.0,
            MinZ: 0.0,
            MaxZ: 0.0,
        };
        flat.clear_z();
        env.merge(&flat);

        assert_eq!(env.MinX, -1.0);
        assert_eq!(env.MinZ, 5.0);
        assert_eq!(env.MaxZ, 7.0);
    }

    #[test]
    fn test_merge_3d_all_flat() {
        let mut env = Envelope3D::default();
        let mut flat = Envelope3D {
            MinX: 0.0,
            MaxX: 1.0,
            MinY: 0.0,
            MaxY: 1.0,
            MinZ: 0.0,
            MaxZ: 0.0,
        };
        flat.clear_z();
        env.merge(&flat);
        assert_eq!(env.MinZ, f64::INFINITY);
        assert_eq!(env.MaxZ, f64::NEG_INFINITY);
        assert_eq!(env.to_2d(), Envelope::new(0.0, 0.0, 1.0, 1.0));
    }
}
