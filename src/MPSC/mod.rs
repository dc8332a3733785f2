mod builder;
mod consumer;
pub mod deadlock_guard;
pub mod disruptor;
mod producer;
pub mod queue_full;
pub mod sink;
pub mod translator;

pub use builder::AsyncLoggerBuilder;
pub use consumer::NOTIFY_PROGRESS_THRESHOLD;
pub use disruptor::{AsyncDisruptor, LifecycleState, SLEEP_MILLIS_BETWEEN_DRAIN_ATTEMPTS};
pub use producer::AsyncLogger;
pub use queue_full::{
    AsyncQueueFullPolicy, DefaultAsyncQueueFullPolicy, DiscardingAsyncQueueFullPolicy, EventRoute,
    QueueFullPolicyRegistry,
};
pub use sink::{CollectingSink, FanOutSink, NullSink, Sink};

pub mod Buffer {
    pub mod Buffer;
    pub mod Buffer_impl;
    pub mod layout;
    pub use Buffer::{Claim, Entry, RingBuffer, RingConsumer}; // re-export for stable path
}

pub mod Structs {
    pub mod Buffer_Structs;
    pub mod message;
    pub use Buffer_Structs::{EventValues, LogEventSlot, OwnedLogEvent, MAX_REUSABLE_MESSAGE_SIZE};
    pub use message::{Formattable, Marker, Message, Thrown, TimestampedMessage};
}
