// Per-thread publish bookkeeping.
//
// A message may render through user code that logs again on the same thread.
// If the ring is full at that point, the nested call would wait for capacity
// that only the outer call's return can free. The guard tracks how deep the
// current thread is in publish calls, and whether it is parked waiting for
// capacity, so the producer can dispatch the nested event out of order.

use std::cell::{Cell, RefCell};
use std::marker::PhantomData;

use crate::MPSC::Structs::Buffer_Structs::MAX_REUSABLE_MESSAGE_SIZE;

struct PublishState {
    depth: Cell<usize>,
    blocked_for_capacity: Cell<bool>,
    // One text buffer per nesting depth, reused across calls.
    scratch: RefCell<Vec<String>>,
}

thread_local! {
    static PUBLISH_STATE: PublishState = const {
        PublishState {
            depth: Cell::new(0),
            blocked_for_capacity: Cell::new(false),
            scratch: RefCell::new(Vec::new()),
        }
    };
}

/// Marks the calling thread as inside a publish call for its lifetime.
///
/// Not `Send`: the guard describes the thread that created it.
pub struct DeadlockGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl DeadlockGuard {
    pub fn enter() -> Self {
        let depth = PUBLISH_STATE
            .try_with(|state| {
                let depth = state.depth.get() + 1;
                state.depth.set(depth);
                depth
            })
            // thread-local already torn down: treat as an outermost call
            .unwrap_or(1);
        Self {
            depth,
            _not_send: PhantomData,
        }
    }

    /// 1 for an outermost call, 2 or more when logging from inside a publish.
    #[inline]
    pub fn depth(&self) -> usize {
        self.depth
    }

    #[inline]
    pub fn is_nested(&self) -> bool {
        self.depth > 1
    }

    /// True while this thread is parked in a blocking claim further up the stack.
    pub fn is_blocked_for_capacity(&self) -> bool {
        PUBLISH_STATE
            .try_with(|state| state.blocked_for_capacity.get())
            .unwrap_or(false)
    }

    /// Flag this thread as waiting for capacity until the marker drops.
    pub fn block_for_capacity(&self) -> BlockedMarker {
        let previous = PUBLISH_STATE
            .try_with(|state| state.blocked_for_capacity.replace(true))
            .unwrap_or(false);
        BlockedMarker {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Borrow the reusable text buffer for this depth. Always empty.
    pub fn take_scratch(&self) -> String {
        PUBLISH_STATE
            .try_with(|state| {
                state
                    .scratch
                    .try_borrow_mut()
                    .ok()
                    .and_then(|mut buffers| buffers.get_mut(self.depth - 1).map(std::mem::take))
            })
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    /// Hand a buffer back for the next call at this depth.
    pub fn return_scratch(&self, mut buffer: String) {
        buffer.clear();
        if buffer.capacity() > MAX_REUSABLE_MESSAGE_SIZE {
            buffer.shrink_to(MAX_REUSABLE_MESSAGE_SIZE);
        }
        let _ = PUBLISH_STATE.try_with(|state| {
            if let Ok(mut buffers) = state.scratch.try_borrow_mut() {
                if buffers.len() < self.depth {
                    buffers.resize_with(self.depth, String::new);
                }
                buffers[self.depth - 1] = buffer;
            }
        });
    }
}

impl Drop for DeadlockGuard {
    fn drop(&mut self) {
        let _ = PUBLISH_STATE.try_with(|state| state.depth.set(state.depth.get().saturating_sub(1)));
    }
}

/// Clears the "blocked for capacity" flag when dropped.
pub struct BlockedMarker {
    previous: bool,
    _not_send: PhantomData<*const ()>,
}

impl Drop for BlockedMarker {
    fn drop(&mut self) {
        let previous = self.previous;
        let _ = PUBLISH_STATE.try_with(|state| state.blocked_for_capacity.set(previous));
    }
}
