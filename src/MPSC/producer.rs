// Producer side of the transport: gate, render, claim, and the full-ring routes.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;

use crate::error::panic_message;
use crate::Core::level::Level;
use crate::MPSC::deadlock_guard::DeadlockGuard;
use crate::MPSC::disruptor::{AsyncDisruptor, LifecycleState, Shared};
use crate::MPSC::queue_full::{AsyncQueueFullPolicy, DefaultAsyncQueueFullPolicy, EventRoute};
use crate::MPSC::sink::dispatch_isolated;
use crate::MPSC::translator::{prepare_message, EventTranslator};
use crate::MPSC::Buffer::{Claim, RingBuffer};
use crate::MPSC::Structs::{LogEventSlot, Marker, Message, Thrown};

/// Counts the caller as an in-flight publisher until dropped.
///
/// Taken before the state check; `stop` and the consumer only consider the
/// ring drained once every ticket is gone.
struct PublishTicket<'a> {
    shared: &'a Shared,
}

impl<'a> PublishTicket<'a> {
    fn acquire(shared: &'a Shared) -> Self {
        shared.active_publishers.fetch_add(1, Ordering::SeqCst);
        Self { shared }
    }
}

impl Drop for PublishTicket<'_> {
    fn drop(&mut self) {
        self.shared.active_publishers.fetch_sub(1, Ordering::SeqCst);
        if self.shared.lifecycle_state() != LifecycleState::Started {
            // a draining consumer may be parked waiting for the last publisher
            self.shared.wait_strategy.signal_all();
        }
    }
}

impl Shared {
    pub(crate) fn publish(
        &self,
        logger_name: &str,
        level: Level,
        message: Message<'_>,
        marker: Option<&Marker>,
        thrown: Option<&Thrown>,
        location: Option<&'static Location<'static>>,
    ) {
        let guard = DeadlockGuard::enter();
        let _ticket = PublishTicket::acquire(self);

        let state = self.lifecycle_state();
        if state != LifecycleState::Started {
            let when = if state == LifecycleState::Created {
                "before start"
            } else {
                "after shutdown"
            };
            self.status.warn(format_args!(
                "Ignoring log event {when}: AsyncDisruptor[{}] is {state}, dropped {level} event for logger `{logger_name}`",
                self.settings.context_name
            ));
            return;
        }
        let Some(ring) = self.ring() else {
            return;
        };

        let prepared = match prepare_message(&guard, message, self.settings.format_in_background) {
            Ok(prepared) => prepared,
            Err(reason) => {
                self.status.error(format_args!(
                    "Dropping {level} event for logger `{logger_name}`: message formatting {reason}"
                ));
                return;
            }
        };
        let mut translator = EventTranslator {
            logger_name,
            level,
            marker,
            thrown,
            location,
            message: prepared,
        };

        if guard.is_blocked_for_capacity() {
            self.log_out_of_order(&mut translator);
        } else if let Some(claim) = ring.try_claim() {
            self.translate_and_publish(claim, &mut translator);
        } else {
            self.handle_ring_buffer_full(&guard, &ring, &mut translator);
        }

        guard.return_scratch(translator.take_text());
    }

    fn translate_and_publish(
        &self,
        mut claim: Claim<'_, LogEventSlot>,
        translator: &mut EventTranslator<'_>,
    ) {
        let translated = catch_unwind(AssertUnwindSafe(|| {
            translator.translate_to(&mut *claim, &self.env)
        }));
        if let Err(payload) = translated {
            // publish an empty slot so the sequence is not left as a gap
            claim.clear();
            self.status.error(format_args!(
                "Dropping {} event for logger `{}`: populating the slot panicked: {}",
                translator.level,
                translator.logger_name,
                panic_message(&*payload)
            ));
        }
        claim.publish();
    }

    fn handle_ring_buffer_full(
        &self,
        guard: &DeadlockGuard,
        ring: &RingBuffer<LogEventSlot>,
        translator: &mut EventTranslator<'_>,
    ) {
        if guard.is_nested() {
            self.log_out_of_order(translator);
            return;
        }

        match self.route(translator.level) {
            EventRoute::Enqueue => {
                let _blocked = guard.block_for_capacity();
                let _serialized = (self.settings.synchronize_enqueue
                    && !self.is_background_thread())
                .then(|| self.enqueue_lock.lock());
                match ring.claim_blocking(&self.halted) {
                    Some(claim) => self.translate_and_publish(claim, translator),
                    None => self.status.warn(format_args!(
                        "AsyncDisruptor[{}] halted while waiting for capacity, dropped {} event for logger `{}`",
                        self.settings.context_name, translator.level, translator.logger_name
                    )),
                }
            }
            EventRoute::Synchronous => self.dispatch_synchronously(translator),
            EventRoute::Discard => {}
        }
    }

    /// Ask the policy, never letting the consumer thread wait on itself.
    fn route(&self, level: Level) -> EventRoute {
        let Some(&background) = self.background_thread.get() else {
            return EventRoute::Synchronous;
        };
        let route = match catch_unwind(AssertUnwindSafe(|| self.policy.get_route(background, level))) {
            Ok(route) => route,
            Err(payload) => {
                self.status.error(format_args!(
                    "Queue-full policy {:?} panicked: {}; using the default route",
                    self.policy,
                    panic_message(&*payload)
                ));
                DefaultAsyncQueueFullPolicy.get_route(background, level)
            }
        };
        match route {
            EventRoute::Enqueue if thread::current().id() == background => EventRoute::Synchronous,
            route => route,
        }
    }

    fn log_out_of_order(&self, translator: &mut EventTranslator<'_>) {
        if !self.out_of_order_warned.swap(true, Ordering::Relaxed) {
            self.status.warn(format_args!(
                "AsyncDisruptor[{}]: logged an event out of order to prevent deadlock caused by \
                 an object's formatting logging recursively while the async queue is full",
                self.settings.context_name
            ));
        }
        self.dispatch_synchronously(translator);
    }

    /// Dispatch on the calling thread through a stack-local slot.
    fn dispatch_synchronously(&self, translator: &mut EventTranslator<'_>) {
        let mut slot = LogEventSlot::new();
        let translated = catch_unwind(AssertUnwindSafe(|| {
            translator.translate_to(&mut slot, &self.env);
            slot.format_deferred_message();
        }));
        match translated {
            Ok(()) => {
                slot.set_end_of_batch(true);
                if let Err(err) = dispatch_isolated(self.sink.as_ref(), &slot) {
                    self.status.error(format_args!(
                        "AsyncDisruptor[{}]: sink failed for {} event from logger `{}`: {err}",
                        self.settings.context_name, translator.level, translator.logger_name
                    ));
                }
            }
            Err(payload) => self.status.error(format_args!(
                "Dropping {} event for logger `{}`: populating the slot panicked: {}",
                translator.level,
                translator.logger_name,
                panic_message(&*payload)
            )),
        }
        // hand the rendered buffer back so it returns to the scratch pool
        slot.swap_message_text(&mut translator.message.text);
    }
}

impl AsyncDisruptor {
    /// Publish one event.
    ///
    /// Never fails: events that cannot be delivered are dropped and reported
    /// on the status channel.
    ///
    /// # Arguments
    /// * `logger_name` - Name of the logger the event belongs to
    /// * `level` - Event level
    /// * `message` - Literal, format arguments, or a [`Formattable`](crate::MPSC::Structs::Formattable)
    /// * `marker` - Optional marker
    /// * `thrown` - Optional error attached to the event
    /// * `location` - Explicit call site; when `None` the caller's location is
    ///   captured only if `include_location` is configured
    #[track_caller]
    pub fn log_event<'a>(
        &self,
        logger_name: &str,
        level: Level,
        message: impl Into<Message<'a>>,
        marker: Option<&Marker>,
        thrown: Option<&Thrown>,
        location: Option<&'static Location<'static>>,
    ) {
        let location = match location {
            Some(location) => Some(location),
            None if self.shared.settings.include_location => Some(Location::caller()),
            None => None,
        };
        self.shared
            .publish(logger_name, level, message.into(), marker, thrown, location);
    }
}

/// A named handle onto a transport.
#[derive(Clone)]
pub struct AsyncLogger {
    disruptor: Arc<AsyncDisruptor>,
    name: Arc<str>,
}

impl AsyncLogger {
    pub fn new(disruptor: Arc<AsyncDisruptor>, name: impl Into<Arc<str>>) -> Self {
        Self {
            disruptor,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn disruptor(&self) -> &Arc<AsyncDisruptor> {
        &self.disruptor
    }

    #[track_caller]
    pub fn log_event<'a>(
        &self,
        level: Level,
        message: impl Into<Message<'a>>,
        marker: Option<&Marker>,
        thrown: Option<&Thrown>,
    ) {
        self.disruptor
            .log_event(&self.name, level, message, marker, thrown, None);
    }

    #[track_caller]
    pub fn log(&self, level: Level, args: fmt::Arguments<'_>) {
        self.disruptor
            .log_event(&self.name, level, args, None, None, None);
    }

    #[track_caller]
    pub fn error(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Error, args);
    }

    #[track_caller]
    pub fn warn(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Warn, args);
    }

    #[track_caller]
    pub fn info(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Info, args);
    }

    #[track_caller]
    pub fn debug(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Debug, args);
    }

    #[track_caller]
    pub fn trace(&self, args: fmt::Arguments<'_>) {
        self.log(Level::Trace, args);
    }
}

impl fmt::Debug for AsyncLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncLogger")
            .field("name", &self.name)
            .field("context", &self.disruptor.context_name())
            .finish()
    }
}
