// Turns the arguments of one `log_event` call into slot contents.

use std::fmt::{self, Write as _};
use std::panic::{catch_unwind, AssertUnwindSafe, Location};
use std::sync::Arc;

use crate::error::panic_message;
use crate::Core::clock::{Clock, NanoClock};
use crate::Core::context::ContextDataProvider;
use crate::Core::level::Level;
use crate::Core::thread_name::ThreadNameStrategy;
use crate::MPSC::deadlock_guard::DeadlockGuard;
use crate::MPSC::Structs::message::{Formattable, Marker, Message, Thrown};
use crate::MPSC::Structs::Buffer_Structs::{EventValues, LogEventSlot};

/// Services consulted while populating a slot.
pub struct EventEnvironment {
    pub clock: Arc<dyn Clock>,
    pub nano_clock: Arc<dyn NanoClock>,
    pub context: Arc<dyn ContextDataProvider>,
    pub thread_names: ThreadNameStrategy,
}

impl fmt::Debug for EventEnvironment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventEnvironment")
            .field("clock", &self.clock)
            .field("nano_clock", &self.nano_clock)
            .field("context", &self.context)
            .field("thread_names", &self.thread_names)
            .finish()
    }
}

/// Message after the producer-side rendering step.
pub(crate) struct PreparedMessage {
    pub(crate) text: String,
    pub(crate) deferred: Option<Arc<dyn Formattable>>,
    pub(crate) timestamp_millis: Option<i64>,
}

/// Render `message` into this depth's scratch buffer.
///
/// Runs before any slot is claimed, so a message that logs while rendering
/// never holds a slot the nested call would need. A panic or formatting
/// error yields `Err` with a description and leaves no state behind.
pub(crate) fn prepare_message(
    guard: &DeadlockGuard,
    message: Message<'_>,
    format_in_background: bool,
) -> Result<PreparedMessage, String> {
    let mut text = guard.take_scratch();
    let rendered = catch_unwind(AssertUnwindSafe(|| -> Result<_, String> {
        match message {
            Message::Text(literal) => {
                text.push_str(literal);
                Ok((None, None))
            }
            Message::Args(args) => match args.as_str() {
                Some(literal) => {
                    text.push_str(literal);
                    Ok((None, None))
                }
                None => text
                    .write_fmt(args)
                    .map(|_| (None, None))
                    .map_err(|_| "a formatting trait implementation returned an error".to_string()),
            },
            Message::Deferred(deferred) => {
                let timestamp = deferred.timestamp_millis();
                if format_in_background {
                    Ok((Some(deferred), timestamp))
                } else {
                    deferred.format_to(&mut text);
                    Ok((None, timestamp))
                }
            }
        }
    }));

    let failure = match rendered {
        Ok(Ok((deferred, timestamp_millis))) => {
            return Ok(PreparedMessage {
                text,
                deferred,
                timestamp_millis,
            })
        }
        Ok(Err(reason)) => reason,
        Err(payload) => format!("panicked: {}", panic_message(&*payload)),
    };
    guard.return_scratch(text);
    Err(failure)
}

/// One event on its way into a slot.
pub(crate) struct EventTranslator<'a> {
    pub(crate) logger_name: &'a str,
    pub(crate) level: Level,
    pub(crate) marker: Option<&'a Marker>,
    pub(crate) thrown: Option<&'a Thrown>,
    pub(crate) location: Option<&'static Location<'static>>,
    pub(crate) message: PreparedMessage,
}

impl EventTranslator<'_> {
    /// Populate `slot`. The slot's old text buffer ends up in `self.message.text`.
    pub(crate) fn translate_to(&mut self, slot: &mut LogEventSlot, env: &EventEnvironment) {
        let time_millis = self
            .message
            .timestamp_millis
            .unwrap_or_else(|| env.clock.current_time_millis());
        slot.set_values(EventValues {
            logger_name: self.logger_name,
            level: self.level,
            marker: self.marker,
            message_text: &mut self.message.text,
            deferred: self.message.deferred.take(),
            thrown: self.thrown,
            time_millis,
            nano_time: env.nano_clock.nano_time(),
            context: env.context.snapshot(),
            thread: env.thread_names.current(),
            location: self.location,
        });
    }

    pub(crate) fn take_text(&mut self) -> String {
        std::mem::take(&mut self.message.text)
    }
}
