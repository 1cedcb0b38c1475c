use std::time::{Duration, Instant};

/// Wall-clock stopwatch for throughput reporting.
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    // Chain updates per second over `elapsed`; infinite for a zero duration.
    pub fn throughput(updates: usize, elapsed: Duration) -> f64 {
        updates as f64 / elapsed.as_secs_f64()
    }
}
