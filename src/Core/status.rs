// Internal diagnostic channel. Everything that goes wrong inside the async
// pipeline ends up here instead of propagating to the logging call site.

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;

use crate::Core::clock::{Clock, SystemClock};
use crate::Core::level::Level;

/// `log` target used when status entries are forwarded to the facade.
pub const STATUS_TARGET: &str = "dmxp_asynclog::status";

/// One diagnostic record.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusData {
    pub level: Level,
    pub message: String,
    pub timestamp_millis: i64,
}

/// Receives status records as they are reported.
pub trait StatusListener: Send + Sync {
    fn on_status(&self, data: &StatusData);

    /// Least specific level this listener wants.
    fn level(&self) -> Level {
        Level::All
    }
}

/// Keeps every record in memory.
#[derive(Default)]
pub struct ListStatusListener {
    entries: Mutex<Vec<StatusData>>,
}

impl ListStatusListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<StatusData> {
        self.entries.lock().clone()
    }

    pub fn find_level(&self, level: Level) -> Vec<StatusData> {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.level == level)
            .cloned()
            .collect()
    }

    pub fn count_matching(&self, level: Level, needle: &str) -> usize {
        self.entries
            .lock()
            .iter()
            .filter(|d| d.level == level && d.message.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }
}

impl StatusListener for ListStatusListener {
    fn on_status(&self, data: &StatusData) {
        self.entries.lock().push(data.clone());
    }
}

/// Fans status records out to listeners and to the `log` facade.
pub struct StatusLogger {
    listeners: RwLock<Vec<Arc<dyn StatusListener>>>,
    forward_to_log: bool,
    clock: Arc<dyn Clock>,
}

impl Default for StatusLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusLogger {
    pub fn new() -> Self {
        Self {
            listeners: RwLock::new(Vec::new()),
            forward_to_log: true,
            clock: Arc::new(SystemClock),
        }
    }

    /// A status logger that only notifies its listeners.
    pub fn silent() -> Self {
        Self {
            forward_to_log: false,
            ..Self::new()
        }
    }

    pub fn register_listener(&self, listener: Arc<dyn StatusListener>) {
        self.listeners.write().push(listener);
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_enabled(&self, level: Level) -> bool {
        (self.forward_to_log && log::log_enabled!(target: STATUS_TARGET, level.to_log_level()))
            || self
                .listeners
                .read()
                .iter()
                .any(|l| level.is_more_specific_than(l.level()))
    }

    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        if !self.is_enabled(level) {
            return;
        }
        let data = StatusData {
            level,
            message: args.to_string(),
            timestamp_millis: self.clock.current_time_millis(),
        };
        if self.forward_to_log {
            log::log!(target: STATUS_TARGET, level.to_log_level(), "{}", data.message);
        }
        for listener in self.listeners.read().iter() {
            if level.is_more_specific_than(listener.level()) {
                listener.on_status(&data);
            }
        }
    }

    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args);
    }
}

impl fmt::Debug for StatusLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatusLogger")
            .field("listeners", &self.listener_count())
            .field("forward_to_log", &self.forward_to_log)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ErrorsOnly(ListStatusListener);

    impl StatusListener for ErrorsOnly {
        fn on_status(&self, data: &StatusData) {
            self.0.on_status(data);
        }

        fn level(&self) -> Level {
            Level::Error
        }
    }

    #[test]
    fn listeners_receive_records() {
        let status = StatusLogger::silent();
        let list = Arc::new(ListStatusListener::new());
        status.register_listener(list.clone());

        status.warn(format_args!("queue {} is full", 1));
        status.debug(format_args!("detail"));

        assert_eq!(list.count_matching(Level::Warn, "queue 1 is full"), 1);
        assert_eq!(list.find_level(Level::Debug).len(), 1);
    }

    #[test]
    fn listener_level_filters() {
        let status = StatusLogger::silent();
        let errors = Arc::new(ErrorsOnly(ListStatusListener::new()));
        status.register_listener(errors.clone());

        status.warn(format_args!("ignored"));
        status.error(format_args!("kept"));

        let entries = errors.0.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].message, "kept");
    }
}
