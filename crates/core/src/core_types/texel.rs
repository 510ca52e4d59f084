//! Per-column value lanes stored in grid fields.
//!
//! A texel is the value type of one column in one channel group: a scalar
//! for depth, a pair for ground/wet height, four lanes for outflow, color,
//! material and foam. All of them interpolate and quantise lane-wise.

/// Lane-wise operations required by [`crate::grid::Field`] values
pub trait Texel: Copy + Default + Send + Sync + PartialEq + std::fmt::Debug + 'static {
    /// Apply `f` to every lane
    #[must_use]
    fn map(self, f: impl Fn(f32) -> f32) -> Self;

    /// Combine lanes of two texels with `f`
    #[must_use]
    fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self;

    /// Linear interpolation between `self` and `other`
    #[inline]
    #[must_use]
    fn lerp(self, other: Self, t: f32) -> Self {
        self.zip(other, |a, b| a + (b - a) * t)
    }

    /// Multiply every lane by `s`
    #[inline]
    #[must_use]
    fn scale(self, s: f32) -> Self {
        self.map(|v| v * s)
    }

    /// Lane-wise sum
    #[inline]
    #[must_use]
    fn add(self, other: Self) -> Self {
        self.zip(other, |a, b| a + b)
    }
}

impl Texel for f32 {
    #[inline]
    fn map(self, f: impl Fn(f32) -> f32) -> Self {
        f(self)
    }

    #[inline]
    fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        f(self, other)
    }
}

impl<const N: usize> Texel for [f32; N]
where
    [f32; N]: Default,
{
    #[inline]
    fn map(self, f: impl Fn(f32) -> f32) -> Self {
        let mut out = self;
        for lane in &mut out {
            *lane = f(*lane);
        }
        out
    }

    #[inline]
    fn zip(self, other: Self, f: impl Fn(f32, f32) -> f32) -> Self {
        let mut out = self;
        for (lane, b) in out.iter_mut().zip(other) {
            *lane = f(*lane, b);
        }
        out
    }
}
