use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Wall-clock source for event timestamps.
pub trait Clock: Send + Sync + fmt::Debug {
    fn current_time_millis(&self) -> i64;
}

/// Monotonic source for the `nano_time` slot field.
pub trait NanoClock: Send + Sync + fmt::Debug {
    fn nano_time(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn current_time_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or_default()
    }
}

/// Always reports the stored time; tests move it with [`FixedClock::set`].
#[derive(Debug, Default)]
pub struct FixedClock {
    millis: AtomicI64,
}

impl FixedClock {
    pub fn new(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::Relaxed);
    }
}

impl Clock for FixedClock {
    fn current_time_millis(&self) -> i64 {
        self.millis.load(Ordering::Relaxed)
    }
}

/// Nanoseconds elapsed since the clock was created.
#[derive(Debug, Clone, Copy)]
pub struct SystemNanoClock {
    origin: Instant,
}

impl SystemNanoClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemNanoClock {
    fn default() -> Self {
        Self::new()
    }
}

impl NanoClock for SystemNanoClock {
    fn nano_time(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }
}

/// Returns a constant, so nothing is measured on the hot path.
#[derive(Debug, Default, Clone, Copy)]
pub struct DummyNanoClock {
    fixed: i64,
}

impl DummyNanoClock {
    pub const fn new(fixed: i64) -> Self {
        Self { fixed }
    }
}

impl NanoClock for DummyNanoClock {
    fn nano_time(&self) -> i64 {
        self.fixed
    }
}

/// Nano clock selection from configuration.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum NanoClockKind {
    #[default]
    Dummy,
    System,
}

impl NanoClockKind {
    pub fn create(self) -> Box<dyn NanoClock> {
        match self {
            NanoClockKind::Dummy => Box::new(DummyNanoClock::default()),
            NanoClockKind::System => Box::new(SystemNanoClock::new()),
        }
    }
}

impl FromStr for NanoClockKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "dummy" => Ok(NanoClockKind::Dummy),
            "system" => Ok(NanoClockKind::System),
            _ => Err(s.to_string()),
        }
    }
}
