//! Pass timing
//!
//! Provides an RAII timer that reports each pass's duration through `tracing`.

use std::time::Instant;
use tracing::trace;

/// Times one pass and emits a `trace!` event when dropped.
pub struct PassTimer {
    start: Instant,
    name: &'static str,
}

impl PassTimer {
    /// Starts timing a pass.
    pub fn new(name: &'static str) -> Self {
        Self {
            start: Instant::now(),
            name,
        }
    }

    /// Gets elapsed time in milliseconds.
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for PassTimer {
    fn drop(&mut self) {
        trace!(pass = self.name, elapsed_ms = self.elapsed_ms(), "Pass finished");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_pass_timer_measures_time() {
        let timer = PassTimer::new("test");
        thread::sleep(Duration::from_millis(10));
        let elapsed = timer.elapsed_ms();
        assert!(elapsed >= 10.0, "Expected at least 10ms, got {elapsed}");
    }
}
