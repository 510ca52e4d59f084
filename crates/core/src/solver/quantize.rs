//! Fixed-point rate accumulators and exponential damping

/// Steps per unit in the fixed-point accumulator
const STEPS: f32 = 255.0;

/// Accumulates a per-second rate in 1/255 steps
///
/// Slow rates (foam clearing, drying) lose everything below one 8-bit step
/// if applied directly each tick. The counter gathers fractional steps and
/// only releases whole ones, so the long-run rate stays exact.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PixelCounter {
    counter: f32,
}

impl PixelCounter {
    /// Add `rate * dt` and release the whole steps gathered so far
    ///
    /// # Arguments
    ///
    /// * `rate` - Amount per second in units (1.0 = one full unit per second)
    /// * `dt` - Timestep in seconds
    ///
    /// # Returns
    ///
    /// Released amount in units, always a multiple of 1/255
    pub fn advance(&mut self, rate: f32, dt: f32) -> f32 {
        self.counter += STEPS * rate * dt;
        self.take()
    }

    /// Release whole steps without adding anything
    pub fn take(&mut self) -> f32 {
        let whole = self.counter.trunc();
        if whole >= 1.0 {
            self.counter -= whole;
            whole / STEPS
        } else {
            0.0
        }
    }

    /// Fractional steps still held back
    #[must_use]
    pub fn pending(&self) -> f32 {
        self.counter
    }
}

/// Fraction of a value removed by exponential decay over `dt`
///
/// Returns `1 - e^(-rate * dt)`; negative rates remove everything.
#[inline]
#[must_use]
pub fn dampen_factor(rate: f32, dt: f32) -> f32 {
    if rate < 0.0 {
        return 1.0;
    }
    1.0 - (-rate * dt).exp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_counter_holds_fraction() {
        let mut counter = PixelCounter::default();
        // 0.6 steps per tick
        assert_eq!(counter.advance(0.6 / 255.0, 1.0), 0.0);
        assert_eq!(counter.advance(0.6 / 255.0, 1.0), 1.0 / 255.0);
        assert_relative_eq!(counter.pending(), 0.2, epsilon = 1e-4);
    }

    #[test]
    fn test_counter_long_run_rate() {
        let mut counter = PixelCounter::default();
        let total: f32 = (0..1000).map(|_| counter.advance(0.5, 0.02)).sum();
        // 0.5 units per second for 20 seconds
        assert_relative_eq!(total, 10.0, epsilon = 2.0 / 255.0);
    }

    #[test]
    fn test_dampen_factor() {
        assert_eq!(dampen_factor(0.0, 1.0), 0.0);
        assert_eq!(dampen_factor(-1.0, 1.0), 1.0);
        assert_relative_eq!(dampen_factor(1.0, 1.0), 1.0 - (-1.0_f32).exp());
    }
}
