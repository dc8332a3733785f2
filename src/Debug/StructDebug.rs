use std::fmt;
use std::sync::atomic::Ordering;

use crate::MPSC::disruptor::AsyncDisruptor;
use crate::MPSC::Buffer::RingBuffer;
use crate::MPSC::Structs::LogEventSlot;

/// Debug function for RingBuffer
///
/// Shows cursors and occupancy; slot contents are not read since
/// producers may be writing them.
pub fn debug_ring_buffer<T>(buffer: &RingBuffer<T>, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("RingBuffer")
        .field("capacity", &buffer.capacity)
        .field("claimed", &buffer.cursor())
        .field("consumed", &buffer.consumed())
        .field("backlog", &buffer.backlog())
        .field("wait_strategy", &buffer.wait_strategy.name())
        .field("consumer_taken", &buffer.consumer_taken.load(Ordering::Relaxed))
        .finish_non_exhaustive()
}

/// Debug function for LogEventSlot
///
/// Prints an empty slot as `LogEventSlot(<empty>)`.
pub fn debug_log_event_slot(slot: &LogEventSlot, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if !slot.is_populated() {
        return f.write_str("LogEventSlot(<empty>)");
    }
    f.debug_struct("LogEventSlot")
        .field("level", &slot.level())
        .field("logger", &slot.logger_name())
        .field("message", &slot.message())
        .field("deferred", &slot.has_deferred_message())
        .field("marker", &slot.marker())
        .field("thrown", &slot.thrown().map(|e| e.to_string()))
        .field("time_millis", &slot.time_millis())
        .field("thread", &slot.thread_name())
        .field("end_of_batch", &slot.is_end_of_batch())
        .finish_non_exhaustive()
}

/// Debug function for AsyncDisruptor
pub fn debug_async_disruptor(disruptor: &AsyncDisruptor, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let shared = &disruptor.shared;
    f.debug_struct("AsyncDisruptor")
        .field("context", &shared.settings.context_name)
        .field("state", &disruptor.state())
        .field("buffer_size", &shared.settings.buffer_size)
        .field("remaining_capacity", &disruptor.remaining_capacity())
        .field("wait_strategy", &shared.wait_strategy.name())
        .field("policy", &shared.policy)
        .field("active_publishers", &shared.active_publishers.load(Ordering::Relaxed))
        .field("halted", &shared.halted.load(Ordering::Relaxed))
        .finish_non_exhaustive()
}
