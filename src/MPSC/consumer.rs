// src/MPSC/consumer.rs

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crate::error::panic_message;
use crate::MPSC::disruptor::Shared;
use crate::MPSC::sink::dispatch_isolated;
use crate::MPSC::Buffer::RingConsumer;
use crate::MPSC::Structs::LogEventSlot;

/// Within a large batch, release consumed slots to producers this often.
pub const NOTIFY_PROGRESS_THRESHOLD: i64 = 50;

/// The loop run by the transport's background thread.
///
/// Waits for published batches, hands each populated slot to the sink, clears
/// it, and advances the consume cursor. Exits when the transport is halted, or
/// once it is no longer started and nothing is pending.
pub(crate) struct BackgroundConsumer {
    shared: Arc<Shared>,
    consumer: RingConsumer<LogEventSlot>,
}

/// Signals `stop` however the loop ends.
struct DoneSignal<'a>(&'a Shared);

impl Drop for DoneSignal<'_> {
    fn drop(&mut self) {
        self.0.mark_consumer_done();
    }
}

impl BackgroundConsumer {
    pub(crate) fn new(shared: Arc<Shared>, consumer: RingConsumer<LogEventSlot>) -> Self {
        Self { shared, consumer }
    }

    pub(crate) fn run(mut self) {
        let shared = Arc::clone(&self.shared);
        let _done = DoneSignal(&shared);
        let ring = Arc::clone(self.consumer.ring());
        let should_exit = || shared.should_consumer_exit(&ring);

        while let Some((start, end)) = self.consumer.wait_for_batch(&should_exit) {
            if !self.process_batch(start, end) {
                break;
            }
        }
        if shared.halted.load(Ordering::Acquire) {
            let released = self.discard_remaining();
            if released > 0 {
                shared.status.debug(format_args!(
                    "AsyncDisruptor[{}]: released {released} undelivered event(s) after halt",
                    shared.settings.context_name
                ));
            }
        }
        shared.status.debug(format_args!(
            "AsyncDisruptor[{}]: background consumer exiting",
            shared.settings.context_name
        ));
    }

    /// Dispatch sequences `start..=end`.
    ///
    /// # Returns
    /// `false` if the transport was halted part-way.
    fn process_batch(&mut self, start: i64, end: i64) -> bool {
        for sequence in start..=end {
            let slot = self.consumer.slot_mut(sequence);
            if sequence == end {
                slot.set_end_of_batch(true);
            }
            consume_slot(&self.shared, slot);

            if self.shared.halted.load(Ordering::Acquire) {
                self.consumer.advance(sequence);
                return false;
            }
            if sequence < end && (sequence - start + 1) % NOTIFY_PROGRESS_THRESHOLD == 0 {
                self.consumer.advance(sequence);
            }
        }
        self.consumer.advance(end);
        true
    }

    /// Clear every slot still in the ring without dispatching it.
    ///
    /// # Returns
    /// The number of populated events dropped.
    fn discard_remaining(&mut self) -> usize {
        // producers let go by the halt may still be publishing a claimed slot
        while self.shared.active_publishers.load(Ordering::SeqCst) > 0 {
            thread::sleep(Duration::from_millis(1));
        }
        let mut discarded = 0;
        while let Some((start, end)) = self.consumer.next_batch() {
            for sequence in start..=end {
                let slot = self.consumer.slot_mut(sequence);
                if slot.is_populated() {
                    discarded += 1;
                }
                slot.clear();
            }
            self.consumer.advance(end);
        }
        discarded
    }
}

fn consume_slot(shared: &Shared, slot: &mut LogEventSlot) {
    if !slot.is_populated() {
        // translation failed after the claim
        slot.clear();
        return;
    }

    if slot.has_deferred_message() {
        if let Err(payload) = catch_unwind(AssertUnwindSafe(|| slot.format_deferred_message())) {
            shared.status.error(format_args!(
                "Dropping {} event for logger `{}`: formatting the message panicked: {}",
                slot.level(),
                slot.logger_name(),
                panic_message(&*payload)
            ));
            slot.clear();
            return;
        }
    }

    if let Err(err) = dispatch_isolated(shared.sink.as_ref(), slot) {
        shared.status.error(format_args!(
            "AsyncDisruptor[{}]: sink failed for {} event from logger `{}`: {err}",
            shared.settings.context_name,
            slot.level(),
            slot.logger_name()
        ));
    }
    slot.clear();
}

