// The event record stored in each ring slot, and its owned copy.

use std::panic::Location;
use std::sync::Arc;

use super::message::{Formattable, Marker, Thrown};
use crate::Core::context::{ContextMap, ContextSnapshot, ContextStack};
use crate::Core::level::Level;
use crate::Core::thread_name::ThreadInfo;

/// Reusable text buffers that grew past this are shrunk back on clear.
pub const MAX_REUSABLE_MESSAGE_SIZE: usize = 518;

/// One log event held in a ring slot.
///
/// A slot is either fully populated with one event or fully cleared. Text
/// buffers keep their capacity across reuse; every other reference is
/// dropped by [`LogEventSlot::clear`] so nothing from a consumed event stays
/// reachable from the ring.
#[derive(Default)]
pub struct LogEventSlot {
    pub(crate) populated: bool,
    pub(crate) end_of_batch: bool,
    pub(crate) level: Level,
    pub(crate) time_millis: i64,
    pub(crate) nano_time: i64,
    pub(crate) logger_name: String,
    pub(crate) marker: Option<Marker>,
    pub(crate) message_text: String,
    pub(crate) deferred: Option<Arc<dyn Formattable>>,
    pub(crate) thrown: Option<Thrown>,
    pub(crate) context: ContextSnapshot,
    pub(crate) thread: Option<ThreadInfo>,
    pub(crate) location: Option<&'static Location<'static>>,
}

/// Everything needed to populate a slot.
pub struct EventValues<'a> {
    pub logger_name: &'a str,
    pub level: Level,
    pub marker: Option<&'a Marker>,
    /// Swapped with the slot's buffer; receives the slot's old, empty buffer.
    pub message_text: &'a mut String,
    pub deferred: Option<Arc<dyn Formattable>>,
    pub thrown: Option<&'a Thrown>,
    pub time_millis: i64,
    pub nano_time: i64,
    pub context: ContextSnapshot,
    pub thread: ThreadInfo,
    pub location: Option<&'static Location<'static>>,
}

impl LogEventSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy one event into the slot and mark it populated.
    pub fn set_values(&mut self, values: EventValues<'_>) {
        self.level = values.level;
        self.time_millis = values.time_millis;
        self.nano_time = values.nano_time;
        self.logger_name.clear();
        self.logger_name.push_str(values.logger_name);
        self.marker = values.marker.cloned();
        self.message_text.clear();
        std::mem::swap(&mut self.message_text, values.message_text);
        self.deferred = values.deferred;
        self.thrown = values.thrown.cloned();
        self.context = values.context;
        self.thread = Some(values.thread);
        self.location = values.location;
        self.end_of_batch = false;
        self.populated = true;
    }

    /// Release every reference held for the previous event.
    pub fn clear(&mut self) {
        self.populated = false;
        self.end_of_batch = false;
        self.level = Level::Off;
        self.time_millis = 0;
        self.nano_time = 0;
        self.logger_name.clear();
        trim(&mut self.logger_name);
        self.marker = None;
        self.message_text.clear();
        trim(&mut self.message_text);
        self.deferred = None;
        self.thrown = None;
        self.context = ContextSnapshot::default();
        self.thread = None;
        self.location = None;
    }

    #[inline]
    pub fn is_populated(&self) -> bool {
        self.populated
    }

    #[inline]
    pub fn is_end_of_batch(&self) -> bool {
        self.end_of_batch
    }

    #[inline]
    pub fn set_end_of_batch(&mut self, end_of_batch: bool) {
        self.end_of_batch = end_of_batch;
    }

    /// `Level::Off` when the slot is empty.
    #[inline]
    pub fn level(&self) -> Level {
        self.level
    }

    pub fn time_millis(&self) -> i64 {
        self.time_millis
    }

    pub fn nano_time(&self) -> i64 {
        self.nano_time
    }

    pub fn logger_name(&self) -> &str {
        &self.logger_name
    }

    pub fn marker(&self) -> Option<&Marker> {
        self.marker.as_ref()
    }

    /// The rendered message. Empty while a deferred message is still pending.
    pub fn message(&self) -> &str {
        &self.message_text
    }

    /// Exchange the text buffer with `other` without copying.
    pub fn swap_message_text(&mut self, other: &mut String) {
        std::mem::swap(&mut self.message_text, other);
    }

    pub fn has_deferred_message(&self) -> bool {
        self.deferred.is_some()
    }

    /// Render a deferred message into the text buffer and drop the reference.
    ///
    /// Runs user formatting code, which may panic; callers are expected to
    /// catch the unwind.
    pub fn format_deferred_message(&mut self) {
        if let Some(deferred) = self.deferred.take() {
            self.message_text.clear();
            deferred.format_to(&mut self.message_text);
        }
    }

    pub fn thrown(&self) -> Option<&Thrown> {
        self.thrown.as_ref()
    }

    pub fn context_data(&self) -> Option<&Arc<ContextMap>> {
        self.context.data.as_ref()
    }

    pub fn context_stack(&self) -> Option<&Arc<ContextStack>> {
        self.context.stack.as_ref()
    }

    pub fn thread_name(&self) -> Option<&str> {
        self.thread.as_ref().map(|t| &*t.name)
    }

    pub fn thread_id(&self) -> u64 {
        self.thread.as_ref().map_or(0, |t| t.id)
    }

    pub fn thread_priority(&self) -> i32 {
        self.thread.as_ref().map_or(0, |t| t.priority)
    }

    pub fn location(&self) -> Option<&'static Location<'static>> {
        self.location
    }

    /// Immutable copy for sinks that keep events past dispatch.
    pub fn to_owned_event(&self) -> OwnedLogEvent {
        OwnedLogEvent {
            level: self.level,
            time_millis: self.time_millis,
            nano_time: self.nano_time,
            logger_name: self.logger_name.clone(),
            marker: self.marker.clone(),
            message: self.message_text.clone(),
            thrown: self.thrown.clone(),
            context_data: self.context.data.clone(),
            context_stack: self.context.stack.clone(),
            thread_name: self.thread_name().map(str::to_string),
            thread_id: self.thread_id(),
            thread_priority: self.thread_priority(),
            location: self.location,
            end_of_batch: self.end_of_batch,
        }
    }
}

fn trim(buf: &mut String) {
    if buf.capacity() > MAX_REUSABLE_MESSAGE_SIZE {
        buf.shrink_to(MAX_REUSABLE_MESSAGE_SIZE);
    }
}

/// A detached event that no longer refers to any ring slot.
#[derive(Clone, Debug)]
pub struct OwnedLogEvent {
    pub level: Level,
    pub time_millis: i64,
    pub nano_time: i64,
    pub logger_name: String,
    pub marker: Option<Marker>,
    pub message: String,
    pub thrown: Option<Thrown>,
    pub context_data: Option<Arc<ContextMap>>,
    pub context_stack: Option<Arc<ContextStack>>,
    pub thread_name: Option<String>,
    pub thread_id: u64,
    pub thread_priority: i32,
    pub location: Option<&'static Location<'static>>,
    pub end_of_batch: bool,
}

impl std::fmt::Debug for LogEventSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        crate::Debug::StructDebug::debug_log_event_slot(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn thread_info() -> ThreadInfo {
        ThreadInfo {
            id: 7,
            name: Arc::from("main"),
            priority: 0,
        }
    }

    #[test]
    fn unset_level_is_off() {
        assert_eq!(LogEventSlot::new().level(), Level::Off);
    }

    #[test]
    fn oversized_buffer_is_trimmed_on_clear() {
        let mut slot = LogEventSlot::new();
        let mut text = "x".repeat(MAX_REUSABLE_MESSAGE_SIZE * 4);
        slot.set_values(EventValues {
            logger_name: "big",
            level: Level::Info,
            marker: None,
            message_text: &mut text,
            deferred: None,
            thrown: None,
            time_millis: 1,
            nano_time: 2,
            context: ContextSnapshot::default(),
            thread: thread_info(),
            location: None,
        });
        assert_eq!(slot.message().len(), MAX_REUSABLE_MESSAGE_SIZE * 4);
        slot.clear();
        assert!(slot.message_text.capacity() <= MAX_REUSABLE_MESSAGE_SIZE);
    }

    #[test]
    fn deferred_message_is_rendered_and_released() {
        let message: Arc<dyn Formattable> = Arc::new(|out: &mut String| out.push_str("later"));
        let mut slot = LogEventSlot::new();
        let mut text = String::new();
        slot.set_values(EventValues {
            logger_name: "lazy",
            level: Level::Debug,
            marker: None,
            message_text: &mut text,
            deferred: Some(Arc::clone(&message)),
            thrown: None,
            time_millis: 0,
            nano_time: 0,
            context: ContextSnapshot::default(),
            thread: thread_info(),
            location: None,
        });
        assert!(slot.has_deferred_message());
        slot.format_deferred_message();
        assert_eq!(slot.message(), "later");
        assert_eq!(Arc::strong_count(&message), 1);
    }

    #[test]
    fn clear_releases_previous_event() {
        let thrown: Thrown = Arc::new(std::io::Error::new(std::io::ErrorKind::Other, "gone"));
        let marker = Marker::new("AUDIT");
        let mut slot = LogEventSlot::new();
        let mut text = String::from("first");
        slot.set_values(EventValues {
            logger_name: "reused",
            level: Level::Warn,
            marker: Some(&marker),
            message_text: &mut text,
            deferred: None,
            thrown: Some(&thrown),
            time_millis: 5,
            nano_time: 6,
            context: ContextSnapshot::default(),
            thread: thread_info(),
            location: None,
        });
        assert!(slot.is_populated());
        assert_eq!(Arc::strong_count(&thrown), 2);

        slot.clear();
        assert!(!slot.is_populated());
        assert_eq!(Arc::strong_count(&thrown), 1);
        assert!(slot.marker().is_none());
        assert!(slot.thrown().is_none());
        assert_eq!(slot.message(), "");
        assert_eq!(slot.logger_name(), "");
        assert!(slot.thread_name().is_none());

        let mut text = String::from("second");
        slot.set_values(EventValues {
            logger_name: "reused",
            level: Level::Info,
            marker: None,
            message_text: &mut text,
            deferred: None,
            thrown: None,
            time_millis: 7,
            nano_time: 8,
            context: ContextSnapshot::default(),
            thread: thread_info(),
            location: None,
        });
        assert!(slot.is_populated());
        assert_eq!(slot.message(), "second");
        assert!(slot.marker().is_none());
    }
}
