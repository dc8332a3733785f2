// Settings the transport reads once at build/start time.
//
// Values are deliberately loose (strings for every named choice): anything
// that cannot be resolved falls back to its default and is reported on the
// status channel, it never stops the transport from starting.

use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::Core::clock::NanoClockKind;
use crate::Core::status::StatusLogger;
use crate::Core::thread_name::ThreadNameStrategy;
use crate::Core::wait_strategy::{
    WaitStrategyKind, DEFAULT_RETRIES, DEFAULT_SLEEP_TIME_NANOS, DEFAULT_TIMEOUT_MILLIS,
};
use crate::MPSC::Buffer::layout::{ring_buffer_size, DEFAULT_RING_BUFFER_SIZE, MIN_RING_BUFFER_SIZE};
use crate::MPSC::queue_full::DEFAULT_POLICY_NAME;

pub const DEFAULT_SHUTDOWN_TIMEOUT_MILLIS: u64 = 3000;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AsyncConfig {
    /// Used in the consumer thread name `AsyncLogger[<context_name>]`.
    pub context_name: String,
    pub ring_buffer_size: usize,
    pub wait_strategy: String,
    pub wait_timeout_millis: u64,
    pub sleep_time_nanos: u64,
    pub retries: u32,
    pub queue_full_policy: String,
    pub discard_threshold: String,
    pub thread_name_strategy: String,
    pub shutdown_timeout_millis: u64,
    pub synchronize_enqueue_when_queue_full: bool,
    pub format_messages_in_background: bool,
    pub include_location: bool,
    pub nano_clock: String,
}

impl Default for AsyncConfig {
    fn default() -> Self {
        Self {
            context_name: "default".to_string(),
            ring_buffer_size: DEFAULT_RING_BUFFER_SIZE,
            wait_strategy: WaitStrategyKind::default().name().to_string(),
            wait_timeout_millis: DEFAULT_TIMEOUT_MILLIS,
            sleep_time_nanos: DEFAULT_SLEEP_TIME_NANOS,
            retries: DEFAULT_RETRIES,
            queue_full_policy: DEFAULT_POLICY_NAME.to_string(),
            discard_threshold: "INFO".to_string(),
            thread_name_strategy: ThreadNameStrategy::default().to_string(),
            shutdown_timeout_millis: DEFAULT_SHUTDOWN_TIMEOUT_MILLIS,
            synchronize_enqueue_when_queue_full: true,
            format_messages_in_background: false,
            include_location: false,
            nano_clock: "Dummy".to_string(),
        }
    }
}

impl AsyncConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Build from key/value pairs keyed by field name.
    ///
    /// Bad pairs are reported to `status` and skipped.
    pub fn from_properties<I, K, V>(properties: I, status: &StatusLogger) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();
        for (key, value) in properties {
            if let Err(err) = config.set(key.as_ref(), value.as_ref()) {
                status.warn(format_args!("Ignoring configuration property: {err}"));
            }
        }
        config
    }

    /// Set one field from its textual form.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let invalid = || Error::InvalidConfig {
            key: key.to_string(),
            value: value.to_string(),
        };
        let value = value.trim();
        match key.trim() {
            "context_name" => self.context_name = value.to_string(),
            "ring_buffer_size" => self.ring_buffer_size = value.parse().map_err(|_| invalid())?,
            "wait_strategy" => self.wait_strategy = value.to_string(),
            "wait_timeout_millis" => self.wait_timeout_millis = value.parse().map_err(|_| invalid())?,
            "sleep_time_nanos" => self.sleep_time_nanos = value.parse().map_err(|_| invalid())?,
            "retries" => self.retries = value.parse().map_err(|_| invalid())?,
            "queue_full_policy" => self.queue_full_policy = value.to_string(),
            "discard_threshold" => self.discard_threshold = value.to_string(),
            "thread_name_strategy" => self.thread_name_strategy = value.to_string(),
            "shutdown_timeout_millis" => {
                self.shutdown_timeout_millis = value.parse().map_err(|_| invalid())?
            }
            "synchronize_enqueue_when_queue_full" => {
                self.synchronize_enqueue_when_queue_full = parse_bool(value).ok_or_else(invalid)?
            }
            "format_messages_in_background" => {
                self.format_messages_in_background = parse_bool(value).ok_or_else(invalid)?
            }
            "include_location" => self.include_location = parse_bool(value).ok_or_else(invalid)?,
            "nano_clock" => self.nano_clock = value.to_string(),
            _ => return Err(invalid()),
        }
        Ok(())
    }

    /// Ring size actually allocated.
    pub fn resolved_ring_buffer_size(&self, status: &StatusLogger) -> usize {
        if self.ring_buffer_size < MIN_RING_BUFFER_SIZE {
            status.warn(format_args!(
                "Invalid ring buffer size {}, using minimum size {MIN_RING_BUFFER_SIZE}",
                self.ring_buffer_size
            ));
        }
        let size = ring_buffer_size(self.ring_buffer_size);
        if size != self.ring_buffer_size && self.ring_buffer_size >= MIN_RING_BUFFER_SIZE {
            status.debug(format_args!(
                "Ring buffer size {} rounded up to {size}",
                self.ring_buffer_size
            ));
        }
        size
    }

    pub fn resolved_wait_strategy(&self, status: &StatusLogger) -> WaitStrategyKind {
        self.wait_strategy.parse().unwrap_or_else(|bad: String| {
            let fallback = WaitStrategyKind::default();
            status.warn(format_args!("Unknown wait strategy `{bad}`, using {fallback}"));
            fallback
        })
    }

    pub fn resolved_thread_name_strategy(&self, status: &StatusLogger) -> ThreadNameStrategy {
        self.thread_name_strategy.parse().unwrap_or_else(|bad: String| {
            let fallback = ThreadNameStrategy::default();
            status.debug(format_args!("Unknown thread name strategy `{bad}`, using {fallback}"));
            fallback
        })
    }

    pub fn resolved_nano_clock(&self, status: &StatusLogger) -> NanoClockKind {
        self.nano_clock.parse().unwrap_or_else(|bad: String| {
            status.warn(format_args!("Unknown nano clock `{bad}`, using Dummy"));
            NanoClockKind::default()
        })
    }

    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_millis)
    }

    pub fn sleep_time(&self) -> Duration {
        Duration::from_nanos(self.sleep_time_nanos)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_millis)
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "yes" | "1" | "on" => Some(true),
        "false" | "no" | "0" | "off" => Some(false),
        _ => None,
    }
}
