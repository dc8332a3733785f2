use std::fmt;
use std::sync::Arc;

/// Error snapshot attached to an event.
pub type Thrown = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// A message whose text is produced on demand.
///
/// Formatting may run arbitrary user code, including further logging calls
/// on the same thread, and may panic. The transport guards against both.
pub trait Formattable: Send + Sync {
    fn format_to(&self, out: &mut String);

    /// Event time carried by the message itself, overriding the clock.
    fn timestamp_millis(&self) -> Option<i64> {
        None
    }
}

impl<F> Formattable for F
where
    F: Fn(&mut String) + Send + Sync,
{
    fn format_to(&self, out: &mut String) {
        self(out)
    }
}

/// Pre-rendered text with its own timestamp.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimestampedMessage {
    pub text: String,
    pub timestamp_millis: i64,
}

impl TimestampedMessage {
    pub fn new(text: impl Into<String>, timestamp_millis: i64) -> Self {
        Self {
            text: text.into(),
            timestamp_millis,
        }
    }
}

impl Formattable for TimestampedMessage {
    fn format_to(&self, out: &mut String) {
        out.push_str(&self.text);
    }

    fn timestamp_millis(&self) -> Option<i64> {
        Some(self.timestamp_millis)
    }
}

/// What a producer hands to `log_event`.
pub enum Message<'a> {
    /// Literal text.
    Text(&'a str),
    /// `format_args!` output; always rendered on the calling thread.
    Args(fmt::Arguments<'a>),
    /// Rendered on the calling thread, or by the consumer when background
    /// formatting is enabled.
    Deferred(Arc<dyn Formattable>),
}

impl<'a> From<&'a str> for Message<'a> {
    fn from(text: &'a str) -> Self {
        Message::Text(text)
    }
}

impl<'a> From<&'a String> for Message<'a> {
    fn from(text: &'a String) -> Self {
        Message::Text(text.as_str())
    }
}

impl<'a> From<fmt::Arguments<'a>> for Message<'a> {
    fn from(args: fmt::Arguments<'a>) -> Self {
        Message::Args(args)
    }
}

impl From<Arc<dyn Formattable>> for Message<'_> {
    fn from(message: Arc<dyn Formattable>) -> Self {
        Message::Deferred(message)
    }
}

impl fmt::Debug for Message<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Message::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Message::Args(args) => f.debug_tuple("Args").field(args).finish(),
            Message::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Named tag for filtering, with optional parents.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Marker(Arc<MarkerInner>);

#[derive(PartialEq, Eq, Hash)]
struct MarkerInner {
    name: String,
    parents: Vec<Marker>,
}

impl Marker {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_parents(name, Vec::new())
    }

    pub fn with_parents(name: impl Into<String>, parents: Vec<Marker>) -> Self {
        Marker(Arc::new(MarkerInner {
            name: name.into(),
            parents,
        }))
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn parents(&self) -> &[Marker] {
        &self.0.parents
    }

    /// True if this marker or any ancestor is named `name`.
    pub fn is_instance_of(&self, name: &str) -> bool {
        self.name() == name || self.parents().iter().any(|p| p.is_instance_of(name))
    }
}

impl fmt::Debug for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.parents().is_empty() {
            return f.write_str(self.name());
        }
        write!(f, "{}[ ", self.name())?;
        for (i, parent) in self.parents().iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{parent:?}")?;
        }
        f.write_str(" ]")
    }
}

impl fmt::Display for Marker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
