use crossbeam_utils::CachePadded;
use std::sync::atomic::AtomicI64;

/// Value of both cursors before the first claim.
pub const INITIAL_CURSOR_VALUE: i64 = -1;

/// Smallest ring the transport will allocate.
pub const MIN_RING_BUFFER_SIZE: usize = 128;

/// Default ring size when configuration does not say otherwise.
pub const DEFAULT_RING_BUFFER_SIZE: usize = 256 * 1024;

/// The producer and consumer cursors of one ring.
///
/// Each cursor lives on its own cache line so producers racing on `claimed`
/// do not invalidate the line the consumer writes `consumed` to.
#[repr(C)]
pub struct Cursors {
    /// Highest sequence handed out to a producer. Advanced by CAS.
    pub claimed: CachePadded<AtomicI64>,

    /// Highest sequence the consumer has dispatched and cleared.
    /// Only the consumer stores to it.
    pub consumed: CachePadded<AtomicI64>,
}

impl Cursors {
    pub const fn new() -> Self {
        Self {
            claimed: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
            consumed: CachePadded::new(AtomicI64::new(INITIAL_CURSOR_VALUE)),
        }
    }
}

impl Default for Cursors {
    fn default() -> Self {
        Self::new()
    }
}

/// Validated ring size: at least [`MIN_RING_BUFFER_SIZE`], rounded up to a
/// power of two.
///
/// # Arguments
/// * `requested` - The size asked for by configuration
///
/// # Returns
/// The number of slots to allocate.
pub fn ring_buffer_size(requested: usize) -> usize {
    requested
        .max(MIN_RING_BUFFER_SIZE)
        .checked_next_power_of_two()
        .unwrap_or(1 << (usize::BITS - 1))
}
