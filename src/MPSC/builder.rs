use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, AtomicUsize};
use std::sync::{Arc, OnceLock};

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex, RwLock};

use super::disruptor::{AsyncDisruptor, LifecycleState, Shared, TransportSettings};
use super::queue_full::QueueFullPolicyRegistry;
use super::sink::{NullSink, Sink};
use super::translator::EventEnvironment;
use crate::config::AsyncConfig;
use crate::error::Result;
use crate::Core::clock::{Clock, NanoClock, SystemClock};
use crate::Core::context::{ContextDataProvider, ThreadContextProvider};
use crate::Core::status::StatusLogger;
use crate::Core::wait_strategy::WaitStrategy;

/// Assembles an [`AsyncDisruptor`] from configuration and collaborators.
///
/// Anything not supplied gets its default: a [`NullSink`], a fresh
/// [`StatusLogger`], the system clock, the thread context provider, and the
/// wait strategy and queue-full policy named in the configuration.
#[derive(Default)]
pub struct AsyncLoggerBuilder {
    config: AsyncConfig,
    sink: Option<Arc<dyn Sink>>,
    status: Option<Arc<StatusLogger>>,
    clock: Option<Arc<dyn Clock>>,
    nano_clock: Option<Arc<dyn NanoClock>>,
    context: Option<Arc<dyn ContextDataProvider>>,
    wait_strategy: Option<Arc<dyn WaitStrategy>>,
    registry: QueueFullPolicyRegistry,
    discard_counter: Option<Arc<AtomicU64>>,
}

impl AsyncLoggerBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(mut self, config: AsyncConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_context_name(mut self, name: impl Into<String>) -> Self {
        self.config.context_name = name.into();
        self
    }

    /// Requested slot count; validated and rounded at build time.
    pub fn with_ring_buffer_size(mut self, size: usize) -> Self {
        self.config.ring_buffer_size = size;
        self
    }

    /// Name of the queue-full policy, built-in or registered.
    pub fn with_queue_full_policy(mut self, name: impl Into<String>) -> Self {
        self.config.queue_full_policy = name.into();
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn Sink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn with_status_logger(mut self, status: Arc<StatusLogger>) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Overrides the `nano_clock` setting.
    pub fn with_nano_clock(mut self, nano_clock: Arc<dyn NanoClock>) -> Self {
        self.nano_clock = Some(nano_clock);
        self
    }

    pub fn with_context_provider(mut self, context: Arc<dyn ContextDataProvider>) -> Self {
        self.context = Some(context);
        self
    }

    /// Overrides the `wait_strategy` setting with a caller-built strategy.
    pub fn with_wait_strategy(mut self, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        self.wait_strategy = Some(wait_strategy);
        self
    }

    pub fn with_queue_full_policy_registry(mut self, registry: QueueFullPolicyRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Share a discard counter with the caller.
    pub fn with_discard_counter(mut self, counter: Arc<AtomicU64>) -> Self {
        self.discard_counter = Some(counter);
        self
    }

    /// Resolve every setting and return a transport in the CREATED state.
    pub fn build(self) -> AsyncDisruptor {
        let config = self.config;
        let status = self.status.unwrap_or_default();

        let buffer_size = config.resolved_ring_buffer_size(&status);
        let wait_strategy = self.wait_strategy.unwrap_or_else(|| {
            Arc::from(config.resolved_wait_strategy(&status).create(
                config.wait_timeout(),
                config.retries,
                config.sleep_time(),
            ))
        });
        let nano_clock = self
            .nano_clock
            .unwrap_or_else(|| Arc::from(config.resolved_nano_clock(&status).create()));
        let discard_counter = self.discard_counter.unwrap_or_default();
        let policy = self.registry.create(&config, discard_counter, &status);

        let env = EventEnvironment {
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
            nano_clock,
            context: self.context.unwrap_or_else(|| Arc::new(ThreadContextProvider)),
            thread_names: config.resolved_thread_name_strategy(&status),
        };
        let settings = TransportSettings {
            context_name: config.context_name.clone(),
            buffer_size,
            synchronize_enqueue: config.synchronize_enqueue_when_queue_full,
            format_in_background: config.format_messages_in_background,
            include_location: config.include_location,
            shutdown_timeout: config.shutdown_timeout(),
        };

        status.debug(format_args!(
            "AsyncDisruptor[{}] configured: ring buffer size {buffer_size}, wait strategy {}, queue-full policy {policy:?}, thread names {}",
            settings.context_name,
            wait_strategy.name(),
            env.thread_names
        ));

        AsyncDisruptor::from_shared(Shared {
            settings,
            state: AtomicU8::new(LifecycleState::Created as u8),
            ring: RwLock::new(None),
            wait_strategy,
            policy,
            sink: self.sink.unwrap_or_else(|| Arc::new(NullSink)),
            status,
            env,
            background_thread: OnceLock::new(),
            active_publishers: CachePadded::new(AtomicUsize::new(0)),
            halted: AtomicBool::new(false),
            consumer_done: Mutex::new(false),
            consumer_done_signal: Condvar::new(),
            consumer_handle: Mutex::new(None),
            enqueue_lock: Mutex::new(()),
            out_of_order_warned: AtomicBool::new(false),
        })
    }

    /// [`build`](Self::build) followed by [`AsyncDisruptor::start`].
    pub fn build_started(self) -> Result<AsyncDisruptor> {
        let disruptor = self.build();
        disruptor.start()?;
        Ok(disruptor)
    }
}
