use std::time::{Duration, Instant};

/// Bounds how fast a dispatcher retries after repeated broker errors.
///
/// Each pause doubles the previous delay, up to `max_double` doublings;
/// a quiescent stretch of at least the initial window resets the
/// progression.
#[derive(Debug)]
pub struct PauseRateLimiter {
    min_delay: Duration,
    initial_window: Duration,
    max_double: u32,
    doubles: u32,
    last_pause: Option<Instant>,
}

impl PauseRateLimiter {
    pub fn new(min_delay: Duration,
               initial_window: Duration,
               max_double: u32)
               -> PauseRateLimiter {
        PauseRateLimiter {
            min_delay: min_delay,
            initial_window: initial_window,
            max_double: max_double,
            doubles: 0,
            last_pause: None,
        }
    }

    /// The delay to apply for an error observed at `now`.
    pub fn next_pause(&mut self, now: Instant) -> Duration {
        if let Some(last_pause) = self.last_pause {
            if now.duration_since(last_pause) >= self.initial_window {
                self.doubles = 0;
            } else if self.doubles < self.max_double {
                self.doubles += 1;
            }
        }

        self.last_pause = Some(now);
        self.min_delay * (1u32 << self.doubles)
    }
}
