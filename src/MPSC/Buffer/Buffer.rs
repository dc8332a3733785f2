// The ring shared by every producer thread and the single background consumer.

use super::layout::Cursors;
use crate::Core::wait_strategy::WaitStrategy;

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicI64};
use std::sync::Arc;

/// A single entry in the ring buffer.
///
/// Aligned to a cache line so neighbouring entries written by different
/// producers do not share one.
#[repr(C, align(64))]
pub struct Entry<T> {
    /// The last sequence published into this entry. This is the core of the synchronization.
    /// - Starts at `index - capacity`, i.e. "published one lap ago".
    /// - A producer that claimed sequence `s` writes `value` and then stores `s`
    ///   here with `Release`.
    /// - The consumer may read `value` for `s` once it loads `s` with `Acquire`.
    pub published: AtomicI64,

    /// The slot itself. Exclusive to the claiming producer until published,
    /// then to the consumer until it advances past the sequence.
    pub value: UnsafeCell<T>,
}

/// A bounded, multi-producer, single-consumer ring of reusable slots.
///
/// ### Concurrency Design:
/// - **Producers (claim)**: a producer reserves sequence `s` by CAS on
///   `cursors.claimed`, allowed only while `s - capacity <= consumed`, so the
///   slot it lands on has already been cleared by the consumer. Population of
///   the slot happens after the CAS, so producers never serialize on each
///   other's writes.
/// - **Consumer (drain)**: exactly one [`RingConsumer`] walks the contiguous run
///   of published entries and advances `cursors.consumed` when done, which
///   is what frees capacity for producers.
pub struct RingBuffer<T> {
    pub(crate) entries: Box<[Entry<T>]>,

    pub(crate) cursors: Cursors,

    /// The capacity of the buffer (number of slots). Always a power of two.
    pub(crate) capacity: usize,

    /// A bitmask used to wrap sequence numbers around the buffer.
    /// Calculated as `capacity - 1`.
    pub(crate) mask: usize,

    /// Shared between producers waiting for capacity and the consumer waiting for data.
    pub(crate) wait_strategy: Arc<dyn WaitStrategy>,

    pub(crate) consumer_taken: AtomicBool,
}

unsafe impl<T: Send> Send for RingBuffer<T> {}
unsafe impl<T: Send> Sync for RingBuffer<T> {}

/// Exclusive access to one claimed slot.
///
/// Publishing makes the slot visible to the consumer. Dropping an unpublished
/// claim publishes it as well, so a sequence is never left as a gap that would
/// stall the consumer.
#[must_use = "a claimed slot is published when dropped"]
pub struct Claim<'a, T> {
    pub(crate) ring: &'a RingBuffer<T>,
    pub(crate) sequence: i64,
    pub(crate) published: bool,
}

/// The consumer side of a [`RingBuffer`]. Only one exists per ring.
pub struct RingConsumer<T> {
    pub(crate) ring: Arc<RingBuffer<T>>,
}
