//! Column field storage
//!
//! A [`Field`] stores one channel group for every column of a grid as a
//! flat row-major `Vec`. Passes never edit a published field; they build a
//! new one and hand it to [`super::GridBuffers`].

use crate::core_types::Texel;

/// One channel group over the whole grid
///
/// Stores values in row-major order (`z * width + x`).
#[derive(Debug, Clone, PartialEq)]
pub struct Field<T: Texel> {
    /// Column values in row-major order (z * width + x)
    pub data: Vec<T>,
    /// Grid width in columns (X axis)
    pub width: usize,
    /// Grid height in columns (Z axis)
    pub height: usize,
}

impl<T: Texel> Field<T> {
    /// Create a new field with given dimensions, initialized to the default texel
    ///
    /// # Arguments
    ///
    /// * `width` - Grid width in columns
    /// * `height` - Grid height in columns
    ///
    /// # Returns
    ///
    /// New field initialized to zeros
    #[must_use]
    pub fn new(width: usize, height: usize) -> Self {
        Self::with_value(width, height, T::default())
    }

    /// Create a new field with given dimensions, initialized to a value
    ///
    /// # Arguments
    ///
    /// * `width` - Grid width in columns
    /// * `height` - Grid height in columns
    /// * `value` - Initial value for all columns
    ///
    /// # Returns
    ///
    /// New field initialized to the specified value
    #[must_use]
    pub fn with_value(width: usize, height: usize, value: T) -> Self {
        Self {
            data: vec![value; width * height],
            width,
            height,
        }
    }

    /// Wrap existing row-major data
    ///
    /// Returns `None` when `data` does not hold exactly `width * height` values.
    #[must_use]
    pub fn from_vec(width: usize, height: usize, data: Vec<T>) -> Option<Self> {
        (data.len() == width * height).then_some(Self {
            data,
            width,
            height,
        })
    }

    /// Get reference to field data
    #[must_use]
    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Get mutable reference to field data
    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.data
    }

    /// Row-major index of a column
    #[inline]
    #[must_use]
    pub fn index(&self, x: usize, z: usize) -> usize {
        z * self.width + x
    }

    /// Get value at a column
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    #[inline]
    #[must_use]
    pub fn get(&self, x: usize, z: usize) -> T {
        assert!(
            x < self.width && z < self.height,
            "Coordinates out of bounds"
        );
        self.data[z * self.width + x]
    }

    /// Set value at a column
    ///
    /// # Panics
    ///
    /// Panics if coordinates are out of bounds
    #[inline]
    pub fn set(&mut self, x: usize, z: usize, value: T) {
        assert!(
            x < self.width && z < self.height,
            "Coordinates out of bounds"
        );
        self.data[z * self.width + x] = value;
    }

    /// Value at signed coordinates clamped onto the grid edge
    #[inline]
    #[must_use]
    pub fn get_clamped(&self, x: isize, z: isize) -> T {
        let cx = x.clamp(0, self.width as isize - 1) as usize;
        let cz = z.clamp(0, self.height as isize - 1) as usize;
        self.data[cz * self.width + cx]
    }

    /// Bilinear sample at fractional column coordinates
    ///
    /// Coordinates outside the grid are clamped to the edge columns.
    ///
    /// # Arguments
    ///
    /// * `px` - Fractional column coordinate along X
    /// * `pz` - Fractional column coordinate along Z
    ///
    /// # Returns
    ///
    /// Interpolated texel
    #[must_use]
    pub fn sample_bilinear(&self, px: f32, pz: f32) -> T {
        let max_x = (self.width - 1) as f32;
        let max_z = (self.height - 1) as f32;
        let gx = px.clamp(0.0, max_x);
        let gz = pz.clamp(0.0, max_z);

        let x0 = gx.floor() as isize;
        let z0 = gz.floor() as isize;
        let fx = gx - x0 as f32;
        let fz = gz - z0 as f32;

        let v00 = self.get_clamped(x0, z0);
        let v10 = self.get_clamped(x0 + 1, z0);
        let v01 = self.get_clamped(x0, z0 + 1);
        let v11 = self.get_clamped(x0 + 1, z0 + 1);

        v00.lerp(v10, fx).lerp(v01.lerp(v11, fx), fz)
    }

    /// Fill entire field with a value
    pub fn fill(&mut self, value: T) {
        self.data.fill(value);
    }

    /// Apply `f` to every texel in place (only used on unpublished fields)
    pub fn map_in_place(&mut self, f: impl Fn(T) -> T) {
        for v in &mut self.data {
            *v = f(*v);
        }
    }
}

impl Field<f32> {
    /// Sum of all values
    #[must_use]
    pub fn sum(&self) -> f64 {
        self.data.iter().map(|&v| f64::from(v)).sum()
    }

    /// Largest value, or zero for an empty field
    #[must_use]
    pub fn max_value(&self) -> f32 {
        self.data.iter().copied().fold(0.0, f32::max)
    }
}
