use std::cell::UnsafeCell;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::atomic::Ordering::{AcqRel, Acquire, Relaxed, Release};
use std::sync::atomic::{AtomicBool, AtomicI64};
use std::sync::Arc;

use super::layout::{ring_buffer_size, Cursors};
use super::Buffer::{Claim, Entry, RingBuffer, RingConsumer};
use crate::Core::wait_strategy::WaitStrategy;

impl<T: Default> RingBuffer<T> {
    /// Allocate a ring of `capacity` default-initialised slots.
    ///
    /// # Panics
    /// If `capacity` is zero or not a power of two.
    pub fn new(capacity: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        assert!(
            capacity > 0 && capacity.is_power_of_two(),
            "capacity must be a power of two, got {capacity}"
        );
        let entries = (0..capacity)
            .map(|index| Entry {
                published: AtomicI64::new(index as i64 - capacity as i64),
                value: UnsafeCell::new(T::default()),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            entries,
            cursors: Cursors::new(),
            capacity,
            mask: capacity - 1,
            wait_strategy,
            consumer_taken: AtomicBool::new(false),
        }
    }

    /// Allocate a ring sized from an unvalidated request (see [`ring_buffer_size`]).
    pub fn with_min_capacity(requested: usize, wait_strategy: Arc<dyn WaitStrategy>) -> Self {
        Self::new(ring_buffer_size(requested), wait_strategy)
    }
}

impl<T> RingBuffer<T> {
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn wait_strategy(&self) -> &Arc<dyn WaitStrategy> {
        &self.wait_strategy
    }

    #[inline]
    fn entry(&self, sequence: i64) -> &Entry<T> {
        &self.entries[(sequence as usize) & self.mask]
    }

    /// Highest sequence handed out to a producer.
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.cursors.claimed.load(Acquire)
    }

    /// Highest sequence fully consumed.
    #[inline]
    pub fn consumed(&self) -> i64 {
        self.cursors.consumed.load(Acquire)
    }

    #[inline]
    pub fn is_published(&self, sequence: i64) -> bool {
        self.entry(sequence).published.load(Acquire) == sequence
    }

    /// Highest sequence such that every sequence up to it has been published.
    pub fn published_cursor(&self) -> i64 {
        let claimed = self.cursor();
        let mut published = self.consumed();
        while published < claimed && self.is_published(published + 1) {
            published += 1;
        }
        published
    }

    /// Number of claimed sequences the consumer has not finished with.
    pub fn backlog(&self) -> usize {
        // consumed first: it only grows, so claimed read afterwards is never behind it
        let consumed = self.consumed();
        let claimed = self.cursor();
        (claimed - consumed).clamp(0, self.capacity as i64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.backlog() == 0
    }

    /// Free slots: `capacity - (claimed - consumed)`, within `0..=capacity`.
    pub fn remaining_capacity(&self) -> usize {
        self.capacity - self.backlog()
    }

    #[inline]
    pub fn has_capacity(&self) -> bool {
        self.cursor() - (self.capacity as i64) < self.consumed()
    }

    /// Claim the next free slot without blocking.
    ///
    /// # Returns
    /// * `Some(claim)` holding the next sequence
    /// * `None` if the ring is full
    pub fn try_claim(&self) -> Option<Claim<'_, T>> {
        let mut current = self.cursors.claimed.load(Relaxed);
        loop {
            let next = current + 1;
            let wrap_point = next - self.capacity as i64;
            if wrap_point > self.cursors.consumed.load(Acquire) {
                // full
                return None;
            }
            match self
                .cursors
                .claimed
                .compare_exchange_weak(current, next, AcqRel, Relaxed)
            {
                Ok(_) => {
                    return Some(Claim {
                        ring: self,
                        sequence: next,
                        published: false,
                    })
                }
                Err(actual) => {
                    // another producer won; retry from its value
                    current = actual;
                    std::hint::spin_loop();
                }
            }
        }
    }

    /// Claim the next slot, parking on the wait strategy while the ring is full.
    ///
    /// # Arguments
    /// * `halted` - Set when the transport is torn down; releases the waiter
    ///
    /// # Returns
    /// * `Some(claim)` once a slot frees up
    /// * `None` if `halted` was raised first
    pub fn claim_blocking(&self, halted: &AtomicBool) -> Option<Claim<'_, T>> {
        loop {
            if halted.load(Acquire) {
                return None;
            }
            if let Some(claim) = self.try_claim() {
                return Some(claim);
            }
            self.wait_strategy
                .wait(&|| self.has_capacity() || halted.load(Acquire));
        }
    }

    /// Hand out the consumer side. Succeeds once per ring.
    pub fn take_consumer(self: &Arc<Self>) -> Option<RingConsumer<T>> {
        if self.consumer_taken.swap(true, AcqRel) {
            return None;
        }
        Some(RingConsumer {
            ring: Arc::clone(self),
        })
    }
}

impl<T> Claim<'_, T> {
    #[inline]
    pub fn sequence(&self) -> i64 {
        self.sequence
    }

    /// Make the slot visible to the consumer and wake it.
    pub fn publish(mut self) {
        self.publish_once();
    }

    fn publish_once(&mut self) {
        if self.published {
            return;
        }
        self.published = true;
        self.ring
            .entry(self.sequence)
            .published
            .store(self.sequence, Release);
        self.ring.wait_strategy.signal_all();
    }
}

impl<T> Deref for Claim<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        // Safety: the CAS in `try_claim` gave this claim sole access until publish.
        unsafe { &*self.ring.entry(self.sequence).value.get() }
    }
}

impl<T> DerefMut for Claim<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.ring.entry(self.sequence).value.get() }
    }
}

impl<T> Drop for Claim<'_, T> {
    fn drop(&mut self) {
        self.publish_once();
    }
}

impl<T> fmt::Debug for Claim<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Claim")
            .field("sequence", &self.sequence)
            .field("published", &self.published)
            .finish()
    }
}

impl<T> RingConsumer<T> {
    pub fn ring(&self) -> &Arc<RingBuffer<T>> {
        &self.ring
    }

    /// The contiguous run of published sequences after the consume cursor.
    ///
    /// # Returns
    /// * `Some((start, end))`, both inclusive
    /// * `None` if the next sequence has not been published yet
    pub fn next_batch(&self) -> Option<(i64, i64)> {
        let start = self.ring.consumed() + 1;
        if !self.ring.is_published(start) {
            return None;
        }
        let claimed = self.ring.cursor();
        let mut end = start;
        while end < claimed && self.ring.is_published(end + 1) {
            end += 1;
        }
        Some((start, end))
    }

    /// Park on the wait strategy until a batch is available.
    ///
    /// # Returns
    /// * `Some((start, end))` when data arrived
    /// * `None` when `should_exit` turned true with nothing to consume
    pub fn wait_for_batch(&self, should_exit: &dyn Fn() -> bool) -> Option<(i64, i64)> {
        loop {
            if let Some(batch) = self.next_batch() {
                return Some(batch);
            }
            if should_exit() {
                return None;
            }
            let next = self.ring.consumed() + 1;
            let ring = &self.ring;
            ring.wait_strategy
                .wait(&|| ring.is_published(next) || should_exit());
        }
    }

    /// The slot for a sequence returned by [`RingConsumer::next_batch`].
    ///
    /// # Panics
    /// If `sequence` was already consumed or lies beyond the claimed cursor.
    pub fn slot_mut(&mut self, sequence: i64) -> &mut T {
        assert!(
            sequence > self.ring.consumed() && sequence <= self.ring.cursor(),
            "sequence {sequence} is not held by the consumer"
        );
        debug_assert!(self.ring.is_published(sequence));
        // Safety: published and not yet consumed, so no producer can touch it.
        unsafe { &mut *self.ring.entry(sequence).value.get() }
    }

    /// Release every sequence up to and including `sequence` back to producers.
    pub fn advance(&mut self, sequence: i64) {
        debug_assert!(sequence >= self.ring.consumed());
        self.ring.cursors.consumed.store(sequence, Release);
        self.ring.wait_strategy.signal_all();
    }
}

impl<T> Drop for RingConsumer<T> {
    fn drop(&mut self) {
        self.ring.consumer_taken.store(false, Release);
    }
}

impl<T> fmt::Debug for RingBuffer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        crate::Debug::StructDebug::debug_ring_buffer(self, f)
    }
}
