//! Clock abstraction for deadlines and key timestamps.
//!
//! Session deadlines and persisted-object keys both read the clock, so both
//! go through this trait instead of `Instant::now`/`SystemTime::now`
//! directly. Production wires [`RealClock`]; tests pin wall-clock time and
//! skip real waiting with [`TestClock`].

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};

/// Time source used by the ingestion pipeline.
pub trait Clock: Send + Sync {
    /// Current monotonic instant.
    fn now(&self) -> Instant;

    /// Current wall-clock time.
    fn now_system(&self) -> SystemTime;

    /// Sleeps for the given duration.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>>;
}

/// Production clock backed by the system and tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealClock;

impl RealClock {
    /// Creates a new real clock.
    pub fn new() -> Self {
        Self
    }
}

impl Clock for RealClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn now_system(&self) -> SystemTime {
        SystemTime::now()
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Deterministic clock for tests.
///
/// Monotonic and wall-clock readings advance together under explicit
/// control. `sleep` advances the clock instead of waiting, so deadline
/// logic runs immediately in tests that drive time by hand.
#[derive(Debug, Clone)]
pub struct TestClock {
    /// Nanoseconds of monotonic time elapsed since construction
    monotonic_ns: Arc<AtomicU64>,
    /// Wall-clock time as nanoseconds since UNIX_EPOCH
    system_ns: Arc<AtomicU64>,
    /// Base instant monotonic readings are derived from
    base: Instant,
}

impl TestClock {
    /// Creates a test clock starting at the current wall-clock time.
    pub fn new() -> Self {
        let since_epoch =
            SystemTime::now().duration_since(UNIX_EPOCH).unwrap_or_default();
        Self {
            monotonic_ns: Arc::new(AtomicU64::new(0)),
            system_ns: Arc::new(AtomicU64::new(u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX))),
            base: Instant::now(),
        }
    }

    /// Creates a test clock pinned to the given wall-clock time.
    pub fn at(system_time: SystemTime) -> Self {
        let clock = Self::new();
        clock.set_system(system_time);
        clock
    }

    /// Advances both monotonic and wall-clock time.
    pub fn advance(&self, duration: Duration) {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        self.monotonic_ns.fetch_add(nanos, Ordering::SeqCst);
        self.system_ns.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Pins the wall-clock reading without touching monotonic time.
    pub fn set_system(&self, system_time: SystemTime) {
        let since_epoch =
            system_time.duration_since(UNIX_EPOCH).unwrap_or_default();
        self.system_ns.store(
            u64::try_from(since_epoch.as_nanos()).unwrap_or(u64::MAX),
            Ordering::SeqCst,
        );
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now(&self) -> Instant {
        self.base + Duration::from_nanos(self.monotonic_ns.load(Ordering::SeqCst))
    }

    fn now_system(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_nanos(self.system_ns.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_both_readings() {
        let clock = TestClock::new();
        let start_mono = clock.now();
        let start_system = clock.now_system();

        clock.advance(Duration::from_secs(90));

        assert_eq!(clock.now() - start_mono, Duration::from_secs(90));
        assert_eq!(
            clock.now_system().duration_since(start_system).unwrap(),
            Duration::from_secs(90)
        );
    }

    #[test]
    fn set_system_pins_wall_clock_only() {
        let clock = TestClock::new();
        let mono_before = clock.now();

        let pinned = UNIX_EPOCH + Duration::from_secs(1_680_685_620);
        clock.set_system(pinned);

        assert_eq!(clock.now_system(), pinned);
        assert_eq!(clock.now(), mono_before);
    }

    #[tokio::test]
    async fn sleep_advances_instead_of_waiting() {
        let clock = TestClock::new();
        let before = clock.now();

        clock.sleep(Duration::from_secs(3600)).await;

        assert_eq!(clock.now() - before, Duration::from_secs(3600));
    }
}
