//! Fixed Timestep
//!
//! Accumulator-driven fixed-step simulation clock. Rendering runs at
//! whatever rate the frame loop achieves; simulation always advances in
//! identical increments, so physics results do not depend on frame rate.

use std::time::Duration;

/// Simulation rate in steps per second.
pub const DEFAULT_STEP_HZ: u32 = 60;

/// Largest frame delta fed into the accumulator. Longer gaps (a paused or
/// backgrounded process) are clamped so the loop never spirals trying to
/// catch up on wall-clock time that was never simulated.
pub const DEFAULT_MAX_FRAME_DELTA: Duration = Duration::from_millis(250);

/// Most simulation steps a single frame may run.
pub const DEFAULT_MAX_STEPS_PER_FRAME: u32 = 5;

/// Fixed-timestep accumulator.
///
/// Each frame, feed the elapsed wall-clock time to [`advance`] and run the
/// returned number of simulation steps. [`alpha`] then gives the fraction
/// of a step left in the accumulator, for blending rendered state between
/// the previous and current simulation states.
///
/// [`advance`]: FixedTimestep::advance
/// [`alpha`]: FixedTimestep::alpha
#[derive(Debug, Clone)]
pub struct FixedTimestep {
    fixed_step: Duration,
    max_frame_delta: Duration,
    max_steps_per_frame: u32,
    accumulator: Duration,
}

impl Default for FixedTimestep {
    fn default() -> Self {
        Self::new(
            Duration::from_secs(1) / DEFAULT_STEP_HZ,
            DEFAULT_MAX_FRAME_DELTA,
            DEFAULT_MAX_STEPS_PER_FRAME,
        )
    }
}

impl FixedTimestep {
    /// Create a timestep with explicit tuning.
    pub fn new(fixed_step: Duration, max_frame_delta: Duration, max_steps_per_frame: u32) -> Self {
        Self {
            fixed_step,
            max_frame_delta,
            max_steps_per_frame,
            accumulator: Duration::ZERO,
        }
    }

    /// The fixed simulation step length.
    pub fn step(&self) -> Duration {
        self.fixed_step
    }

    /// Feed one frame's elapsed time; returns how many simulation steps to
    /// run now.
    ///
    /// If the per-frame step cap is hit, the remaining accumulated time is
    /// discarded rather than carried: an overloaded machine slows the game
    /// down instead of entering a catch-up spiral.
    pub fn advance(&mut self, frame_delta: Duration) -> u32 {
        let delta = frame_delta.min(self.max_frame_delta);
        self.accumulator += delta;

        let mut steps = 0;
        while self.accumulator >= self.fixed_step && steps < self.max_steps_per_frame {
            self.accumulator -= self.fixed_step;
            steps += 1;
        }
        if steps == self.max_steps_per_frame {
            self.accumulator = Duration::ZERO;
        }
        steps
    }

    /// Fraction of a step currently in the accumulator, in `[0, 1)`.
    pub fn alpha(&self) -> f32 {
        self.accumulator.as_secs_f32() / self.fixed_step.as_secs_f32()
    }

    /// Empty the accumulator. Call when simulation restarts after a pause
    /// or reconnect so stale time is not replayed.
    pub fn reset(&mut self) {
        self.accumulator = Duration::ZERO;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sixty_hz() -> FixedTimestep {
        FixedTimestep::default()
    }

    #[test]
    fn test_exact_step_yields_one() {
        let mut ts = sixty_hz();
        assert_eq!(ts.advance(Duration::from_secs(1) / 60), 1);
        assert_eq!(ts.alpha(), 0.0);
    }

    #[test]
    fn test_small_deltas_accumulate() {
        let mut ts = sixty_hz();
        // 10ms < one 60Hz step (16.67ms): no step yet.
        assert_eq!(ts.advance(Duration::from_millis(10)), 0);
        assert!(ts.alpha() > 0.0);
        // Second 10ms crosses the step boundary.
        assert_eq!(ts.advance(Duration::from_millis(10)), 1);
        assert!(ts.alpha() < 1.0);
    }

    #[test]
    fn test_large_delta_runs_multiple_steps() {
        let mut ts = sixty_hz();
        // 50ms at 60Hz covers exactly 3 full steps.
        assert_eq!(ts.advance(Duration::from_millis(50)), 3);
    }

    #[test]
    fn test_frame_delta_clamped() {
        let mut ts = sixty_hz();
        // A 10s hitch is clamped to 250ms, which alone exceeds 5 steps,
        // so the cap applies.
        assert_eq!(ts.advance(Duration::from_secs(10)), DEFAULT_MAX_STEPS_PER_FRAME);
    }

    #[test]
    fn test_cap_discards_remainder() {
        let mut ts = sixty_hz();
        ts.advance(Duration::from_millis(250));
        // Remainder was discarded at the cap; a tiny next frame must not
        // produce a burst of catch-up steps.
        assert_eq!(ts.alpha(), 0.0);
        assert_eq!(ts.advance(Duration::from_millis(1)), 0);
    }

    #[test]
    fn test_alpha_in_unit_range() {
        let mut ts = sixty_hz();
        for ms in [3u64, 7, 12, 16, 17, 33, 100] {
            ts.advance(Duration::from_millis(ms));
            assert!(ts.alpha() >= 0.0 && ts.alpha() < 1.0, "alpha out of range");
        }
    }

    #[test]
    fn test_reset_clears_accumulator() {
        let mut ts = sixty_hz();
        ts.advance(Duration::from_millis(10));
        ts.reset();
        assert_eq!(ts.alpha(), 0.0);
        assert_eq!(ts.advance(Duration::from_millis(10)), 0);
    }

    #[test]
    fn test_steady_sixty_fps_one_step_per_frame() {
        let mut ts = sixty_hz();
        let frame = Duration::from_secs(1) / 60;
        let total: u32 = (0..120).map(|_| ts.advance(frame)).sum();
        assert_eq!(total, 120);
    }
}
