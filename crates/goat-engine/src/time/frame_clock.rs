use std::time::{Duration, Instant};

/// Frame timing snapshot.
#[derive(Debug, Copy, Clone)]
pub struct FrameTime {
    /// Clamped time since the previous tick, in seconds.
    pub dt: f32,

    /// Monotonic timestamp taken at the tick.
    pub now: Instant,

    /// Seconds since the clock started.
    pub elapsed: f32,

    pub frame_index: u64,
}

/// Produces one [`FrameTime`] per rendered frame.
///
/// Delta time is clamped so a debugger pause or a minimized window does not
/// teleport the camera on the next frame.
#[derive(Debug, Clone)]
pub struct FrameClock {
    start: Instant,
    last: Instant,
    frame_index: u64,
    dt_min: Duration,
    dt_max: Duration,
}

impl FrameClock {
    pub const DEFAULT_DT_MIN: Duration = Duration::from_micros(100);
    pub const DEFAULT_DT_MAX: Duration = Duration::from_millis(250);

    pub fn new() -> Self {
        Self::with_clamps(Self::DEFAULT_DT_MIN, Self::DEFAULT_DT_MAX)
    }

    pub fn with_clamps(dt_min: Duration, dt_max: Duration) -> Self {
        Self::starting_at(Instant::now(), dt_min, dt_max)
    }

    fn starting_at(start: Instant, dt_min: Duration, dt_max: Duration) -> Self {
        debug_assert!(dt_min <= dt_max);
        Self {
            start,
            last: start,
            frame_index: 0,
            dt_min,
            dt_max,
        }
    }

    /// Resets the delta baseline, e.g. after the window was restored.
    pub fn reset(&mut self) {
        self.last = Instant::now();
    }

    pub fn tick(&mut self) -> FrameTime {
        self.tick_at(Instant::now())
    }

    fn tick_at(&mut self, now: Instant) -> FrameTime {
        let dt = now
            .saturating_duration_since(self.last)
            .clamp(self.dt_min, self.dt_max);
        self.last = now;

        let ft = FrameTime {
            dt: dt.as_secs_f32(),
            now,
            elapsed: now.saturating_duration_since(self.start).as_secs_f32(),
            frame_index: self.frame_index,
        };
        self.frame_index = self.frame_index.wrapping_add(1);
        ft
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(start: Instant) -> FrameClock {
        FrameClock::starting_at(start, FrameClock::DEFAULT_DT_MIN, FrameClock::DEFAULT_DT_MAX)
    }

    #[test]
    fn dt_is_the_time_between_ticks() {
        let t0 = Instant::now();
        let mut c = clock(t0);
        let ft = c.tick_at(t0 + Duration::from_millis(16));
        assert!((ft.dt - 0.016).abs() < 1e-6);
        assert_eq!(ft.frame_index, 0);
        assert_eq!(c.tick_at(t0 + Duration::from_millis(32)).frame_index, 1);
    }

    #[test]
    fn long_stalls_are_clamped() {
        let t0 = Instant::now();
        let mut c = clock(t0);
        let ft = c.tick_at(t0 + Duration::from_secs(5));
        assert_eq!(ft.dt, 0.25);
        assert!((ft.elapsed - 5.0).abs() < 1e-4);
    }

    #[test]
    fn zero_dt_is_raised_to_the_minimum() {
        let t0 = Instant::now();
        let mut c = clock(t0);
        assert_eq!(c.tick_at(t0).dt, FrameClock::DEFAULT_DT_MIN.as_secs_f32());
    }
}
