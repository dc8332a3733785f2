// Downstream interface the background consumer dispatches into.

use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use crate::error::{panic_message, SinkError};
use crate::MPSC::Structs::{LogEventSlot, OwnedLogEvent};

/// Receives fully populated events.
///
/// Called from the background consumer thread, and from producer threads
/// when an event is routed synchronously, so implementations must be
/// thread-safe. The slot is only valid for the duration of the call; use
/// [`LogEventSlot::to_owned_event`] to keep it.
pub trait Sink: Send + Sync {
    fn dispatch(&self, event: &LogEventSlot) -> Result<(), SinkError>;
}

impl<F> Sink for F
where
    F: Fn(&LogEventSlot) -> Result<(), SinkError> + Send + Sync,
{
    fn dispatch(&self, event: &LogEventSlot) -> Result<(), SinkError> {
        self(event)
    }
}

/// Run a sink, turning a panic into [`SinkError::Panicked`].
pub fn dispatch_isolated(sink: &dyn Sink, event: &LogEventSlot) -> Result<(), SinkError> {
    match catch_unwind(AssertUnwindSafe(|| sink.dispatch(event))) {
        Ok(result) => result,
        Err(payload) => Err(SinkError::Panicked(panic_message(&*payload))),
    }
}

/// Dispatches to several named sinks; a failing sink does not stop the rest.
#[derive(Default)]
pub struct FanOutSink {
    sinks: Vec<(String, Arc<dyn Sink>)>,
}

impl FanOutSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, name: impl Into<String>, sink: Arc<dyn Sink>) -> Self {
        self.sinks.push((name.into(), sink));
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl Sink for FanOutSink {
    fn dispatch(&self, event: &LogEventSlot) -> Result<(), SinkError> {
        let mut failures = Vec::new();
        for (name, sink) in &self.sinks {
            if let Err(err) = dispatch_isolated(sink.as_ref(), event) {
                failures.push(SinkError::failed(name.as_str(), err.to_string()));
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(SinkError::FanOut {
                failures,
                total: self.sinks.len(),
            })
        }
    }
}

impl fmt::Debug for FanOutSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.sinks.iter().map(|(name, _)| name))
            .finish()
    }
}

/// Discards everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl Sink for NullSink {
    fn dispatch(&self, _event: &LogEventSlot) -> Result<(), SinkError> {
        Ok(())
    }
}

/// Keeps an owned copy of every event, in dispatch order.
#[derive(Default)]
pub struct CollectingSink {
    events: Mutex<Vec<OwnedLogEvent>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<OwnedLogEvent> {
        self.events.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.events.lock().iter().map(|e| e.message.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl Sink for CollectingSink {
    fn dispatch(&self, event: &LogEventSlot) -> Result<(), SinkError> {
        self.events.lock().push(event.to_owned_event());
        Ok(())
    }
}
