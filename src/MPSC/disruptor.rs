// Lifecycle of one async transport: ring allocation, consumer thread, drain on stop.

use crossbeam_utils::CachePadded;
use parking_lot::{Condvar, Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use crate::error::{panic_message, Error, Result};
use crate::Core::status::StatusLogger;
use crate::Core::wait_strategy::WaitStrategy;
use crate::MPSC::consumer::BackgroundConsumer;
use crate::MPSC::queue_full::AsyncQueueFullPolicy;
use crate::MPSC::sink::Sink;
use crate::MPSC::translator::EventEnvironment;
use crate::MPSC::Buffer::RingBuffer;
use crate::MPSC::Structs::LogEventSlot;

/// Granularity of the drain wait in [`AsyncDisruptor::stop`].
pub const SLEEP_MILLIS_BETWEEN_DRAIN_ATTEMPTS: u64 = 50;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum LifecycleState {
    Created = 0,
    Started = 1,
    Stopping = 2,
    Stopped = 3,
}

impl LifecycleState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => LifecycleState::Created,
            1 => LifecycleState::Started,
            2 => LifecycleState::Stopping,
            _ => LifecycleState::Stopped,
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "CREATED",
            LifecycleState::Started => "STARTED",
            LifecycleState::Stopping => "STOPPING",
            LifecycleState::Stopped => "STOPPED",
        };
        f.write_str(name)
    }
}

/// Resolved settings fixed at build time.
#[derive(Clone, Debug)]
pub(crate) struct TransportSettings {
    pub(crate) context_name: String,
    pub(crate) buffer_size: usize,
    pub(crate) synchronize_enqueue: bool,
    pub(crate) format_in_background: bool,
    pub(crate) include_location: bool,
    pub(crate) shutdown_timeout: Duration,
}

/// State shared by producers, the consumer thread and the controller.
pub(crate) struct Shared {
    pub(crate) settings: TransportSettings,
    pub(crate) state: AtomicU8,
    /// Set by `start`, released again once the transport is stopped.
    pub(crate) ring: RwLock<Option<Arc<RingBuffer<LogEventSlot>>>>,
    pub(crate) wait_strategy: Arc<dyn WaitStrategy>,
    pub(crate) policy: Box<dyn AsyncQueueFullPolicy>,
    pub(crate) sink: Arc<dyn Sink>,
    pub(crate) status: Arc<StatusLogger>,
    pub(crate) env: EventEnvironment,
    pub(crate) background_thread: OnceLock<ThreadId>,
    /// Publish calls between their state check and their return.
    pub(crate) active_publishers: CachePadded<AtomicUsize>,
    /// Raised when a stop timed out; consumer and blocked producers give up.
    pub(crate) halted: AtomicBool,
    pub(crate) consumer_done: Mutex<bool>,
    pub(crate) consumer_done_signal: Condvar,
    pub(crate) consumer_handle: Mutex<Option<JoinHandle<()>>>,
    /// Serializes producers waiting for capacity.
    pub(crate) enqueue_lock: Mutex<()>,
    pub(crate) out_of_order_warned: AtomicBool,
}

impl Shared {
    #[inline]
    pub(crate) fn lifecycle_state(&self) -> LifecycleState {
        LifecycleState::from_u8(self.state.load(Ordering::SeqCst))
    }

    pub(crate) fn ring(&self) -> Option<Arc<RingBuffer<LogEventSlot>>> {
        self.ring.read().clone()
    }

    fn backlog(&self) -> usize {
        self.ring.read().as_ref().map_or(0, |ring| ring.backlog())
    }

    pub(crate) fn is_background_thread(&self) -> bool {
        self.background_thread
            .get()
            .is_some_and(|id| *id == thread::current().id())
    }

    /// The consumer stops once nothing is pending and nobody is mid-publish.
    pub(crate) fn should_consumer_exit(&self, ring: &RingBuffer<LogEventSlot>) -> bool {
        self.halted.load(Ordering::Acquire)
            || (self.lifecycle_state() != LifecycleState::Started
                && self.active_publishers.load(Ordering::SeqCst) == 0
                && ring.is_empty())
    }

    pub(crate) fn mark_consumer_done(&self) {
        let mut done = self.consumer_done.lock();
        *done = true;
        self.consumer_done_signal.notify_all();
    }
}

/// An asynchronous event transport.
///
/// Producers publish through [`AsyncDisruptor::log_event`] (or an
/// [`AsyncLogger`](crate::MPSC::AsyncLogger) handle); one background thread
/// drains the ring into the configured sink.
pub struct AsyncDisruptor {
    pub(crate) shared: Arc<Shared>,
}

impl AsyncDisruptor {
    pub(crate) fn from_shared(shared: Shared) -> Self {
        Self {
            shared: Arc::new(shared),
        }
    }

    /// Allocate the ring and spawn the consumer thread.
    ///
    /// # Returns
    /// * `Ok(())` once the transport accepts events
    /// * `Err(Error::InvalidState)` if it was already started or stopped
    /// * `Err(Error::Spawn)` if the thread could not be created
    pub fn start(&self) -> Result<()> {
        let shared = &self.shared;
        let state = shared.lifecycle_state();
        if state != LifecycleState::Created {
            return Err(Error::InvalidState(state));
        }

        let ring = Arc::new(RingBuffer::new(
            shared.settings.buffer_size,
            Arc::clone(&shared.wait_strategy),
        ));
        {
            let mut installed = shared.ring.write();
            if installed.is_some() {
                // lost a race with a concurrent start
                return Err(Error::InvalidState(shared.lifecycle_state()));
            }
            *installed = Some(Arc::clone(&ring));
        }
        let Some(consumer) = ring.take_consumer() else {
            return Err(Error::InvalidState(shared.lifecycle_state()));
        };

        shared.status.debug(format_args!(
            "Starting AsyncDisruptor[{}] with ring buffer size {}, wait strategy {}",
            shared.settings.context_name,
            ring.capacity(),
            shared.wait_strategy.name()
        ));

        let background = BackgroundConsumer::new(Arc::clone(shared), consumer);
        let spawned = thread::Builder::new()
            .name(format!("AsyncLogger[{}]", shared.settings.context_name))
            .spawn(move || background.run());
        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                shared.state.store(LifecycleState::Stopped as u8, Ordering::SeqCst);
                return Err(Error::Spawn(err));
            }
        };

        let _ = shared.background_thread.set(handle.thread().id());
        *shared.consumer_handle.lock() = Some(handle);
        shared.state.store(LifecycleState::Started as u8, Ordering::SeqCst);
        Ok(())
    }

    /// Stop accepting events, drain what was published, and halt.
    ///
    /// # Arguments
    /// * `timeout` - How long to wait for the consumer to drain
    ///
    /// # Returns
    /// `true` if every pending event was dispatched, `false` if the timeout
    /// elapsed and the rest were dropped. Calling it again is a no-op.
    pub fn stop(&self, timeout: Duration) -> bool {
        let shared = &self.shared;
        if let Err(actual) = shared.state.compare_exchange(
            LifecycleState::Started as u8,
            LifecycleState::Stopping as u8,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            if actual == LifecycleState::Created as u8 {
                shared.state.store(LifecycleState::Stopped as u8, Ordering::SeqCst);
            }
            return true;
        }

        let backlog = shared.backlog();
        shared.status.debug(format_args!(
            "AsyncDisruptor[{}]: shutting down, {backlog} event(s) pending",
            shared.settings.context_name
        ));

        let deadline = Instant::now() + timeout;
        let drained = {
            let mut done = shared.consumer_done.lock();
            while !*done {
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                // wake a consumer parked without timeout so it re-checks for exit
                shared.wait_strategy.signal_all();
                let step = (deadline - now).min(Duration::from_millis(SLEEP_MILLIS_BETWEEN_DRAIN_ATTEMPTS));
                shared.consumer_done_signal.wait_for(&mut done, step);
            }
            *done
        };

        if !drained {
            let dropped = shared.backlog();
            shared.status.warn(format_args!(
                "AsyncDisruptor[{}]: shutdown timed out after {} ms, dropping {dropped} unconsumed event(s)",
                shared.settings.context_name,
                timeout.as_millis()
            ));
        }
        shared.halted.store(true, Ordering::Release);
        shared.wait_strategy.signal_all();

        let handle = shared.consumer_handle.lock().take();
        if let Some(handle) = handle {
            // a consumer stuck in a sink is left detached rather than joined
            if drained || handle.is_finished() {
                if let Err(payload) = handle.join() {
                    shared.status.error(format_args!(
                        "AsyncDisruptor[{}]: consumer thread panicked: {}",
                        shared.settings.context_name,
                        panic_message(&*payload)
                    ));
                }
            }
        }

        // a detached consumer keeps its own handle and clears what is left when it exits
        drop(shared.ring.write().take());

        let discarded = shared.policy.discard_count();
        if discarded > 0 {
            shared.status.debug(format_args!(
                "AsyncDisruptor[{}]: queue-full policy {:?} discarded {discarded} event(s)",
                shared.settings.context_name, shared.policy
            ));
        }

        shared.state.store(LifecycleState::Stopped as u8, Ordering::SeqCst);
        shared.status.debug(format_args!(
            "AsyncDisruptor[{}]: stopped",
            shared.settings.context_name
        ));
        drained
    }

    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle_state()
    }

    pub fn is_started(&self) -> bool {
        self.state() == LifecycleState::Started
    }

    /// Free slots in the ring; 0 before start and after stop.
    pub fn remaining_capacity(&self) -> usize {
        self.shared
            .ring
            .read()
            .as_ref()
            .map_or(0, |ring| ring.remaining_capacity())
    }

    /// Events dropped by the queue-full policy.
    pub fn discard_count(&self) -> u64 {
        self.shared.policy.discard_count()
    }

    /// Slots allocated (or to be allocated) for the ring.
    pub fn buffer_size(&self) -> usize {
        self.shared.settings.buffer_size
    }

    pub fn context_name(&self) -> &str {
        &self.shared.settings.context_name
    }

    pub fn background_thread_id(&self) -> Option<ThreadId> {
        self.shared.background_thread.get().copied()
    }

    pub fn status_logger(&self) -> &Arc<StatusLogger> {
        &self.shared.status
    }

    pub fn queue_full_policy(&self) -> &dyn AsyncQueueFullPolicy {
        self.shared.policy.as_ref()
    }

    pub fn wait_strategy(&self) -> &Arc<dyn WaitStrategy> {
        &self.shared.wait_strategy
    }
}

impl Drop for AsyncDisruptor {
    fn drop(&mut self) {
        if self.is_started() {
            self.stop(self.shared.settings.shutdown_timeout);
        }
    }
}

impl fmt::Debug for AsyncDisruptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_async_disruptor(self, f)
    }
}
