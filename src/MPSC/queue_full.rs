// What happens to an event when the ring has no free slot.

use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use crate::config::AsyncConfig;
use crate::error::panic_message;
use crate::Core::level::Level;
use crate::Core::status::StatusLogger;

/// Decision returned by a queue-full policy.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EventRoute {
    /// Block until a slot frees, then publish normally.
    Enqueue,
    /// Skip the ring and dispatch on the calling thread.
    Synchronous,
    /// Drop the event.
    Discard,
}

/// Consulted only when the ring is full.
pub trait AsyncQueueFullPolicy: Send + Sync + fmt::Debug {
    /// # Arguments
    /// * `background_thread_id` - The consumer thread of the full ring
    /// * `level` - Level of the event that does not fit
    fn get_route(&self, background_thread_id: ThreadId, level: Level) -> EventRoute;

    /// Events this policy has discarded so far.
    fn discard_count(&self) -> u64 {
        0
    }
}

/// The consumer thread dispatches synchronously, everyone else waits.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultAsyncQueueFullPolicy;

impl AsyncQueueFullPolicy for DefaultAsyncQueueFullPolicy {
    fn get_route(&self, background_thread_id: ThreadId, _level: Level) -> EventRoute {
        // The consumer is the only thread that can free a slot; it must not wait on itself.
        if thread::current().id() == background_thread_id {
            EventRoute::Synchronous
        } else {
            EventRoute::Enqueue
        }
    }
}

/// Drops events at or below `threshold` from any thread; the rest take the default route.
#[derive(Debug)]
pub struct DiscardingAsyncQueueFullPolicy {
    threshold: Level,
    discard_count: Arc<AtomicU64>,
    fallback: DefaultAsyncQueueFullPolicy,
}

impl DiscardingAsyncQueueFullPolicy {
    /// # Arguments
    /// * `threshold` - Least severe level that is still kept
    /// * `discard_count` - Shared counter incremented on every discard
    pub fn new(threshold: Level, discard_count: Arc<AtomicU64>) -> Self {
        Self {
            threshold,
            discard_count,
            fallback: DefaultAsyncQueueFullPolicy,
        }
    }

    pub fn threshold(&self) -> Level {
        self.threshold
    }
}

impl AsyncQueueFullPolicy for DiscardingAsyncQueueFullPolicy {
    fn get_route(&self, background_thread_id: ThreadId, level: Level) -> EventRoute {
        if level.is_less_specific_than(self.threshold) {
            self.discard_count.fetch_add(1, Ordering::Relaxed);
            return EventRoute::Discard;
        }
        self.fallback.get_route(background_thread_id, level)
    }

    fn discard_count(&self) -> u64 {
        self.discard_count.load(Ordering::Relaxed)
    }
}

pub const DEFAULT_POLICY_NAME: &str = "Default";
pub const DISCARD_POLICY_NAME: &str = "Discard";
pub const DEFAULT_DISCARD_THRESHOLD: Level = Level::Info;

/// Constructor for a user-supplied policy.
///
/// Receives the configuration and the transport's discard counter.
pub type PolicyFactory = Arc<
    dyn Fn(&AsyncConfig, Arc<AtomicU64>) -> Result<Box<dyn AsyncQueueFullPolicy>, String>
        + Send
        + Sync,
>;

/// Built-in policies by name.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueFullPolicyKind {
    Default,
    Discard,
}

impl QueueFullPolicyKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        if name.eq_ignore_ascii_case(DEFAULT_POLICY_NAME) {
            Some(QueueFullPolicyKind::Default)
        } else if name.eq_ignore_ascii_case(DISCARD_POLICY_NAME) {
            Some(QueueFullPolicyKind::Discard)
        } else {
            None
        }
    }
}

/// Maps configured identifiers to policy constructors.
///
/// Anything that cannot be resolved or constructed falls back to
/// [`DefaultAsyncQueueFullPolicy`] and is reported to the status channel.
#[derive(Clone, Default)]
pub struct QueueFullPolicyRegistry {
    factories: HashMap<String, PolicyFactory>,
}

impl QueueFullPolicyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a custom policy under `name`. Built-in names cannot be overridden.
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> &mut Self
    where
        F: Fn(&AsyncConfig, Arc<AtomicU64>) -> Result<Box<dyn AsyncQueueFullPolicy>, String>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        QueueFullPolicyKind::from_name(name).is_some() || self.factories.contains_key(name.trim())
    }

    /// Build the policy named by `config.queue_full_policy`.
    pub fn create(
        &self,
        config: &AsyncConfig,
        discard_count: Arc<AtomicU64>,
        status: &StatusLogger,
    ) -> Box<dyn AsyncQueueFullPolicy> {
        let name = config.queue_full_policy.trim();
        match QueueFullPolicyKind::from_name(name) {
            Some(QueueFullPolicyKind::Default) => return Box::new(DefaultAsyncQueueFullPolicy),
            Some(QueueFullPolicyKind::Discard) => {
                let threshold = discard_threshold(config, status);
                return Box::new(DiscardingAsyncQueueFullPolicy::new(threshold, discard_count));
            }
            None => {}
        }

        let Some(factory) = self.factories.get(name) else {
            status.error(format_args!(
                "Unknown queue-full policy `{name}`; using {DEFAULT_POLICY_NAME}"
            ));
            return Box::new(DefaultAsyncQueueFullPolicy);
        };

        match catch_unwind(AssertUnwindSafe(|| factory(config, discard_count))) {
            Ok(Ok(policy)) => policy,
            Ok(Err(reason)) => {
                status.error(format_args!(
                    "Could not create queue-full policy `{name}`: {reason}; using {DEFAULT_POLICY_NAME}"
                ));
                Box::new(DefaultAsyncQueueFullPolicy)
            }
            Err(payload) => {
                status.error(format_args!(
                    "Queue-full policy factory `{name}` panicked: {}; using {DEFAULT_POLICY_NAME}",
                    panic_message(&*payload)
                ));
                Box::new(DefaultAsyncQueueFullPolicy)
            }
        }
    }
}

fn discard_threshold(config: &AsyncConfig, status: &StatusLogger) -> Level {
    match config.discard_threshold.parse::<Level>() {
        Ok(level) => level,
        Err(err) => {
            status.warn(format_args!(
                "Invalid discard threshold: {err}; using {DEFAULT_DISCARD_THRESHOLD}"
            ));
            DEFAULT_DISCARD_THRESHOLD
        }
    }
}

impl fmt::Debug for QueueFullPolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueFullPolicyRegistry")
            .field("custom", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
