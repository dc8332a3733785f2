// Pluggable waiting for the background consumer (new data) and for producers
// blocked on a full ring (free capacity). Both sides share one strategy
// instance: whoever changes a cursor calls `signal_all`.

use crossbeam_utils::CachePadded;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{fence, AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

use crate::Core::futex::{futex_wait, futex_wake_all};

pub const DEFAULT_TIMEOUT_MILLIS: u64 = 10;
pub const DEFAULT_SLEEP_TIME_NANOS: u64 = 100;
pub const DEFAULT_RETRIES: u32 = 200;

const SPIN_TRIES: u32 = 100;

/// How a thread waits for a cursor to move.
pub trait WaitStrategy: Send + Sync + fmt::Debug {
    /// Park until `ready` returns true.
    ///
    /// `ready` is re-evaluated after every wake-up, so it must be cheap and
    /// side-effect free.
    fn wait(&self, ready: &dyn Fn() -> bool);

    /// Wake every thread parked in [`WaitStrategy::wait`].
    fn signal_all(&self);

    fn name(&self) -> &'static str;
}

/// Built-in strategies selectable by name.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum WaitStrategyKind {
    Block,
    #[default]
    Timeout,
    Sleep,
    Yield,
    BusySpin,
}

impl WaitStrategyKind {
    pub const fn name(self) -> &'static str {
        match self {
            WaitStrategyKind::Block => "Block",
            WaitStrategyKind::Timeout => "Timeout",
            WaitStrategyKind::Sleep => "Sleep",
            WaitStrategyKind::Yield => "Yield",
            WaitStrategyKind::BusySpin => "BusySpin",
        }
    }

    /// Instantiate the strategy with the tuning values from configuration.
    pub fn create(self, timeout: Duration, retries: u32, sleep: Duration) -> Box<dyn WaitStrategy> {
        match self {
            WaitStrategyKind::Block => Box::new(BlockingWaitStrategy::new()),
            WaitStrategyKind::Timeout => Box::new(TimeoutBlockingWaitStrategy::new(timeout)),
            WaitStrategyKind::Sleep => Box::new(SleepingWaitStrategy::new(retries, sleep)),
            WaitStrategyKind::Yield => Box::new(YieldingWaitStrategy),
            WaitStrategyKind::BusySpin => Box::new(BusySpinWaitStrategy),
        }
    }
}

impl FromStr for WaitStrategyKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" | "blocking" => Ok(WaitStrategyKind::Block),
            "timeout" => Ok(WaitStrategyKind::Timeout),
            "sleep" | "sleeping" => Ok(WaitStrategyKind::Sleep),
            "yield" | "yielding" => Ok(WaitStrategyKind::Yield),
            "busyspin" | "busy_spin" => Ok(WaitStrategyKind::BusySpin),
            _ => Err(s.to_string()),
        }
    }
}

impl fmt::Display for WaitStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Futex-backed event count.
///
/// Waiters register, snapshot the epoch, re-check their condition and then
/// sleep on the epoch word. Signallers bump the epoch only when someone is
/// registered, so the uncontended publish path never enters the kernel.
struct EventCount {
    epoch: CachePadded<AtomicU32>,
    waiters: CachePadded<AtomicU32>,
}

impl EventCount {
    const fn new() -> Self {
        Self {
            epoch: CachePadded::new(AtomicU32::new(0)),
            waiters: CachePadded::new(AtomicU32::new(0)),
        }
    }

    fn wait(&self, ready: &dyn Fn() -> bool, timeout: Option<Duration>) {
        loop {
            if ready() {
                return;
            }
            self.waiters.fetch_add(1, Ordering::SeqCst);
            fence(Ordering::SeqCst);
            let epoch = self.epoch.load(Ordering::SeqCst);
            if ready() {
                self.waiters.fetch_sub(1, Ordering::SeqCst);
                return;
            }
            futex_wait(&self.epoch, epoch, timeout);
            self.waiters.fetch_sub(1, Ordering::SeqCst);
        }
    }

    fn notify_all(&self) {
        // Pairs with the fence in `wait`: either the waiter sees the new
        // cursor value or we see its registration.
        fence(Ordering::SeqCst);
        if self.waiters.load(Ordering::SeqCst) == 0 {
            return;
        }
        self.epoch.fetch_add(1, Ordering::SeqCst);
        futex_wake_all(&self.epoch);
    }
}

/// Parks until signalled, with no periodic wake-up.
pub struct BlockingWaitStrategy {
    events: EventCount,
}

impl BlockingWaitStrategy {
    pub const fn new() -> Self {
        Self {
            events: EventCount::new(),
        }
    }
}

impl Default for BlockingWaitStrategy {
    fn default() -> Self {
        Self::new()
    }
}

impl WaitStrategy for BlockingWaitStrategy {
    fn wait(&self, ready: &dyn Fn() -> bool) {
        self.events.wait(ready, None);
    }

    fn signal_all(&self) {
        self.events.notify_all();
    }

    fn name(&self) -> &'static str {
        WaitStrategyKind::Block.name()
    }
}

/// Parks until signalled, re-checking at least every `timeout`.
pub struct TimeoutBlockingWaitStrategy {
    events: EventCount,
    timeout: Duration,
}

impl TimeoutBlockingWaitStrategy {
    pub const fn new(timeout: Duration) -> Self {
        Self {
            events: EventCount::new(),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Default for TimeoutBlockingWaitStrategy {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TIMEOUT_MILLIS))
    }
}

impl WaitStrategy for TimeoutBlockingWaitStrategy {
    fn wait(&self, ready: &dyn Fn() -> bool) {
        self.events.wait(ready, Some(self.timeout));
    }

    fn signal_all(&self) {
        self.events.notify_all();
    }

    fn name(&self) -> &'static str {
        WaitStrategyKind::Timeout.name()
    }
}

/// Spins, then yields, then sleeps for `sleep` between checks.
pub struct SleepingWaitStrategy {
    retries: u32,
    sleep: Duration,
}

impl SleepingWaitStrategy {
    pub const fn new(retries: u32, sleep: Duration) -> Self {
        Self { retries, sleep }
    }
}

impl Default for SleepingWaitStrategy {
    fn default() -> Self {
        Self::new(DEFAULT_RETRIES, Duration::from_nanos(DEFAULT_SLEEP_TIME_NANOS))
    }
}

impl WaitStrategy for SleepingWaitStrategy {
    fn wait(&self, ready: &dyn Fn() -> bool) {
        let mut counter = self.retries;
        while !ready() {
            if counter > SPIN_TRIES {
                counter -= 1;
                std::hint::spin_loop();
            } else if counter > 0 {
                counter -= 1;
                thread::yield_now();
            } else {
                thread::sleep(self.sleep);
            }
        }
    }

    fn signal_all(&self) {}

    fn name(&self) -> &'static str {
        WaitStrategyKind::Sleep.name()
    }
}

/// Spins briefly, then yields the CPU between checks.
#[derive(Default)]
pub struct YieldingWaitStrategy;

impl WaitStrategy for YieldingWaitStrategy {
    fn wait(&self, ready: &dyn Fn() -> bool) {
        let mut counter = SPIN_TRIES;
        while !ready() {
            if counter > 0 {
                counter -= 1;
                std::hint::spin_loop();
            } else {
                thread::yield_now();
            }
        }
    }

    fn signal_all(&self) {}

    fn name(&self) -> &'static str {
        WaitStrategyKind::Yield.name()
    }
}

/// Never gives up the CPU.
#[derive(Default)]
pub struct BusySpinWaitStrategy;

impl WaitStrategy for BusySpinWaitStrategy {
    fn wait(&self, ready: &dyn Fn() -> bool) {
        while !ready() {
            std::hint::spin_loop();
        }
    }

    fn signal_all(&self) {}

    fn name(&self) -> &'static str {
        WaitStrategyKind::BusySpin.name()
    }
}

macro_rules! debug_by_name {
    ($($ty:ty),*) => {
        $(impl fmt::Debug for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.debug_struct(stringify!($ty)).finish_non_exhaustive()
            }
        })*
    };
}

debug_by_name!(BlockingWaitStrategy, SleepingWaitStrategy, YieldingWaitStrategy, BusySpinWaitStrategy);

impl fmt::Debug for TimeoutBlockingWaitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TimeoutBlockingWaitStrategy")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use std::sync::Arc;

    #[test]
    fn parses_known_names() {
        assert_eq!("block".parse(), Ok(WaitStrategyKind::Block));
        assert_eq!("Timeout".parse(), Ok(WaitStrategyKind::Timeout));
        assert_eq!("SLEEP".parse(), Ok(WaitStrategyKind::Sleep));
        assert_eq!("Yield".parse(), Ok(WaitStrategyKind::Yield));
        assert_eq!("BusySpin".parse(), Ok(WaitStrategyKind::BusySpin));
        assert!("LiteBlocking".parse::<WaitStrategyKind>().is_err());
    }

    fn wakes_waiter(strategy: Arc<dyn WaitStrategy>) {
        let flag = Arc::new(AtomicBool::new(false));
        let waiter = {
            let flag = Arc::clone(&flag);
            let strategy = Arc::clone(&strategy);
            thread::spawn(move || strategy.wait(&|| flag.load(Ordering::Acquire)))
        };
        thread::sleep(Duration::from_millis(20));
        flag.store(true, Ordering::Release);
        strategy.signal_all();
        waiter.join().unwrap();
    }

    #[test]
    fn every_strategy_wakes_on_condition() {
        for kind in [
            WaitStrategyKind::Block,
            WaitStrategyKind::Timeout,
            WaitStrategyKind::Sleep,
            WaitStrategyKind::Yield,
            WaitStrategyKind::BusySpin,
        ] {
            let strategy: Arc<dyn WaitStrategy> = Arc::from(kind.create(
                Duration::from_millis(DEFAULT_TIMEOUT_MILLIS),
                DEFAULT_RETRIES,
                Duration::from_nanos(DEFAULT_SLEEP_TIME_NANOS),
            ));
            assert_eq!(strategy.name(), kind.name());
            wakes_waiter(strategy);
        }
    }
}
