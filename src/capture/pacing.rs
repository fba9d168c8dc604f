// capture/pacing.rs - Frame pacing for the capture loop
//
// Keeps a running deadline on the monotonic clock. When an iteration
// overruns, the deadline snaps to "now" instead of accumulating debt, so a
// slow frame is never followed by a burst of catch-up frames.

use std::time::{Duration, Instant};

/// Deadline-based pacer for a fixed target frame rate
#[derive(Debug, Clone)]
pub struct FramePacer {
    /// Target duration per iteration
    interval: Duration,
    /// When the next iteration should start
    next_deadline: Instant,
}

impl FramePacer {
    /// Create a pacer starting at `start`; a non-positive rate disables pacing
    pub fn new(target_fps: f64, start: Instant) -> Self {
        let interval = if target_fps.is_finite() && target_fps > 0.0 {
            Duration::from_secs_f64(1.0 / target_fps)
        } else {
            Duration::ZERO
        };
        Self {
            interval,
            next_deadline: start,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Advance the deadline and return how long to sleep from `now`
    pub fn next_delay(&mut self, now: Instant) -> Duration {
        if self.interval.is_zero() {
            return Duration::ZERO;
        }

        self.next_deadline += self.interval;
        if self.next_deadline > now {
            self.next_deadline - now
        } else {
            // Overran: restart the schedule from here
            self.next_deadline = now;
            Duration::ZERO
        }
    }

    /// Sleep until the next deadline
    pub fn wait(&mut self) {
        let delay = self.next_delay(Instant::now());
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Drive the pacer with a simulated clock; returns the start time of each iteration
    fn simulate(fps: f64, work: &[Duration]) -> Vec<Instant> {
        let start = Instant::now();
        let mut pacer = FramePacer::new(fps, start);
        let mut now = start;
        let mut starts = Vec::with_capacity(work.len());
        for w in work {
            starts.push(now);
            now += *w;
            now += pacer.next_delay(now);
        }
        starts
    }

    #[test]
    fn steady_rate_converges_to_interval() {
        let work = vec![Duration::from_millis(5); 60];
        let starts = simulate(15.0, &work);

        let span = *starts.last().unwrap() - starts[0];
        let mean = span / (starts.len() as u32 - 1);
        let target = Duration::from_secs_f64(1.0 / 15.0);
        let diff = if mean > target { mean - target } else { target - mean };
        assert!(diff < Duration::from_micros(10), "mean {mean:?} vs {target:?}");
    }

    #[test]
    fn slow_iteration_does_not_cause_burst() {
        let mut work = vec![Duration::from_millis(5); 20];
        work[5] = Duration::from_millis(500);
        let starts = simulate(15.0, &work);

        let interval = Duration::from_secs_f64(1.0 / 15.0);
        for pair in starts.windows(2).skip(6) {
            let gap = pair[1] - pair[0];
            assert!(gap + Duration::from_micros(10) >= interval, "burst gap {gap:?}");
        }
    }

    #[test]
    fn overrun_resets_deadline_to_now() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(10.0, start);

        let late = start + Duration::from_secs(2);
        assert_eq!(pacer.next_delay(late), Duration::ZERO);
        assert_eq!(pacer.next_delay(late), pacer.interval());
    }

    #[test]
    fn zero_rate_disables_pacing() {
        let start = Instant::now();
        let mut pacer = FramePacer::new(0.0, start);
        assert_eq!(pacer.interval(), Duration::ZERO);
        assert_eq!(pacer.next_delay(start), Duration::ZERO);
    }

    #[test]
    fn wait_sleeps_roughly_one_interval() {
        let mut pacer = FramePacer::new(100.0, Instant::now());
        let begin = Instant::now();
        for _ in 0..5 {
            pacer.wait();
        }
        let elapsed = begin.elapsed();
        assert!(elapsed >= Duration::from_millis(45), "{elapsed:?}");
        assert!(elapsed < Duration::from_secs(2), "{elapsed:?}");
    }
}
