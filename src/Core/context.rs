// Per-thread diagnostic context: a key/value map and a nested stack.
//
// Both are stored behind `Arc` and mutated copy-on-write, so a snapshot is an
// `Arc` clone that never observes later mutations by the owning thread.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

pub type ContextMap = BTreeMap<String, String>;
pub type ContextStack = Vec<String>;

/// Immutable point-in-time copy of a thread's context.
#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub struct ContextSnapshot {
    pub data: Option<Arc<ContextMap>>,
    pub stack: Option<Arc<ContextStack>>,
}

impl ContextSnapshot {
    pub fn is_empty(&self) -> bool {
        self.data.as_ref().map_or(true, |d| d.is_empty())
            && self.stack.as_ref().map_or(true, |s| s.is_empty())
    }
}

/// Supplies the calling thread's context at publish time.
pub trait ContextDataProvider: Send + Sync + fmt::Debug {
    fn snapshot(&self) -> ContextSnapshot;
}

/// Reads [`ThreadContext`] of the calling thread.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadContextProvider;

impl ContextDataProvider for ThreadContextProvider {
    fn snapshot(&self) -> ContextSnapshot {
        ThreadContext::snapshot()
    }
}

/// Always empty; for transports that don't carry context.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyContextProvider;

impl ContextDataProvider for EmptyContextProvider {
    fn snapshot(&self) -> ContextSnapshot {
        ContextSnapshot::default()
    }
}

#[derive(Default)]
struct ThreadContextState {
    data: Option<Arc<ContextMap>>,
    stack: Option<Arc<ContextStack>>,
}

thread_local! {
    static CONTEXT: RefCell<ThreadContextState> = RefCell::new(ThreadContextState::default());
}

/// Static accessors for the calling thread's context.
pub struct ThreadContext;

impl ThreadContext {
    pub fn put(key: impl Into<String>, value: impl Into<String>) {
        let (key, value) = (key.into(), value.into());
        Self::with_state(|state| {
            let data = state.data.get_or_insert_with(Default::default);
            Arc::make_mut(data).insert(key, value);
        });
    }

    pub fn get(key: &str) -> Option<String> {
        Self::with_state(|state| state.data.as_ref().and_then(|d| d.get(key).cloned())).flatten()
    }

    pub fn remove(key: &str) {
        Self::with_state(|state| {
            if let Some(data) = state.data.as_mut() {
                if data.contains_key(key) {
                    Arc::make_mut(data).remove(key);
                }
            }
        });
    }

    pub fn clear_map() {
        Self::with_state(|state| state.data = None);
    }

    pub fn push(message: impl Into<String>) {
        let message = message.into();
        Self::with_state(|state| {
            let stack = state.stack.get_or_insert_with(Default::default);
            Arc::make_mut(stack).push(message);
        });
    }

    pub fn pop() -> Option<String> {
        Self::with_state(|state| state.stack.as_mut().and_then(|s| Arc::make_mut(s).pop())).flatten()
    }

    pub fn clear_stack() {
        Self::with_state(|state| state.stack = None);
    }

    pub fn clear_all() {
        Self::clear_map();
        Self::clear_stack();
    }

    pub fn snapshot() -> ContextSnapshot {
        Self::with_state(|state| ContextSnapshot {
            data: state.data.clone().filter(|d| !d.is_empty()),
            stack: state.stack.clone().filter(|s| !s.is_empty()),
        })
        .unwrap_or_default()
    }

    // `None` once the thread-local has been torn down during thread exit.
    fn with_state<R>(f: impl FnOnce(&mut ThreadContextState) -> R) -> Option<R> {
        CONTEXT
            .try_with(|cell| cell.try_borrow_mut().ok().map(|mut state| f(&mut state)))
            .ok()
            .flatten()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_is_isolated_from_later_writes() {
        ThreadContext::clear_all();
        ThreadContext::put("user", "alice");
        ThreadContext::push("request-1");
        let snapshot = ThreadContext::snapshot();

        ThreadContext::put("user", "bob");
        ThreadContext::pop();

        let data = snapshot.data.as_ref().unwrap();
        assert_eq!(data.get("user").map(String::as_str), Some("alice"));
        assert_eq!(snapshot.stack.as_deref(), Some(&vec!["request-1".to_string()]));
        assert_eq!(ThreadContext::get("user").as_deref(), Some("bob"));
        ThreadContext::clear_all();
    }

    #[test]
    fn empty_context_snapshots_to_none() {
        ThreadContext::clear_all();
        let snapshot = ThreadContext::snapshot();
        assert!(snapshot.data.is_none());
        assert!(snapshot.stack.is_none());
        assert!(snapshot.is_empty());
    }

    #[test]
    fn unchanged_context_shares_storage() {
        ThreadContext::clear_all();
        ThreadContext::put("k", "v");
        let a = ThreadContext::snapshot();
        let b = ThreadContext::snapshot();
        assert!(Arc::ptr_eq(a.data.as_ref().unwrap(), b.data.as_ref().unwrap()));
        ThreadContext::clear_all();
    }
}
