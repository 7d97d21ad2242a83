use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source plus the busy-wait primitive used by register poll loops.
///
/// Production hosts back this with the OS clock. Tests use [`FakeClock`] so every bounded wait in
/// the driver (MDIO polls, PHY reset, teardown retries) completes instantly and deterministically.
pub trait Clock: Send + Sync {
    /// Monotonic nanoseconds since an arbitrary epoch.
    fn now_ns(&self) -> u64;

    /// Busy-waits (or sleeps) for at least `us` microseconds.
    fn delay_us(&self, us: u64);

    fn delay_ms(&self, ms: u64) {
        self.delay_us(ms.saturating_mul(1000));
    }

    fn now_ms(&self) -> u64 {
        self.now_ns() / 1_000_000
    }
}

impl<T: Clock + ?Sized> Clock for Arc<T> {
    fn now_ns(&self) -> u64 {
        (**self).now_ns()
    }

    fn delay_us(&self, us: u64) {
        (**self).delay_us(us)
    }
}

/// Wall-clock implementation backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    epoch: Instant,
}

impl StdClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for StdClock {
    fn now_ns(&self) -> u64 {
        u64::try_from(self.epoch.elapsed().as_nanos()).unwrap_or(u64::MAX)
    }

    fn delay_us(&self, us: u64) {
        // Short waits spin; anything at millisecond scale yields the thread.
        if us < 1000 {
            let deadline = Instant::now() + Duration::from_micros(us);
            while Instant::now() < deadline {
                std::hint::spin_loop();
            }
        } else {
            std::thread::sleep(Duration::from_micros(us));
        }
    }
}

/// Deterministic clock: time only moves when someone waits or calls [`FakeClock::advance`].
#[derive(Debug, Default)]
pub struct FakeClock {
    now_ns: AtomicU64,
    waited_us: AtomicU64,
}

impl FakeClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, delta: Duration) {
        let delta = u64::try_from(delta.as_nanos()).unwrap_or(u64::MAX);
        self.now_ns.fetch_add(delta, Ordering::SeqCst);
    }

    pub fn advance_ms(&self, ms: u64) {
        self.advance(Duration::from_millis(ms));
    }

    /// Total time spent inside [`Clock::delay_us`], in microseconds.
    pub fn waited_us(&self) -> u64 {
        self.waited_us.load(Ordering::SeqCst)
    }
}

impl Clock for FakeClock {
    fn now_ns(&self) -> u64 {
        self.now_ns.load(Ordering::SeqCst)
    }

    fn delay_us(&self, us: u64) {
        self.waited_us.fetch_add(us, Ordering::SeqCst);
        self.now_ns
            .fetch_add(us.saturating_mul(1000), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_clock_moves_only_on_wait_or_advance() {
        let clock = FakeClock::new();
        assert_eq!(clock.now_ns(), 0);

        clock.delay_us(150);
        assert_eq!(clock.now_ns(), 150_000);
        assert_eq!(clock.waited_us(), 150);

        clock.advance_ms(2);
        assert_eq!(clock.now_ms(), 2);
        assert_eq!(clock.waited_us(), 150);
    }

    #[test]
    fn std_clock_is_monotonic() {
        let clock = StdClock::new();
        let a = clock.now_ns();
        clock.delay_us(10);
        assert!(clock.now_ns() >= a + 10_000);
    }
}
