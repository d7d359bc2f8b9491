use std::time::{Duration, Instant};

/// Monotonic performance clock shared by ports, metronome and scheduler.
/// Times are seconds since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64()
    }

    /// The instant corresponding to performance time `t`. Negative times
    /// clamp to the origin.
    pub fn instant_at(&self, t: f64) -> Instant {
        self.origin + Duration::from_secs_f64(t.max(0.0))
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_monotonic() {
        let clock = Clock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn test_instant_round_trip() {
        let clock = Clock::new();
        let at = clock.instant_at(0.25);
        assert_eq!(at.duration_since(clock.instant_at(0.0)), Duration::from_millis(250));
        assert_eq!(clock.instant_at(-1.0), clock.instant_at(0.0));
    }
}
