// What ends up in a slot, and how failures on either side of the ring are contained.

use dmxp_asynclog::config::AsyncConfig;
use dmxp_asynclog::error::SinkError;
use dmxp_asynclog::Core::clock::{DummyNanoClock, FixedClock};
use dmxp_asynclog::Core::context::ThreadContext;
use dmxp_asynclog::Core::level::Level;
use dmxp_asynclog::Core::status::{ListStatusListener, StatusLogger};
use dmxp_asynclog::MPSC::sink::{CollectingSink, FanOutSink, Sink};
use dmxp_asynclog::MPSC::Structs::{Formattable, LogEventSlot, Marker, Message, Thrown, TimestampedMessage};
use dmxp_asynclog::MPSC::{AsyncDisruptor, AsyncLogger, AsyncLoggerBuilder};
use std::fmt;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

struct Harness {
    disruptor: Arc<AsyncDisruptor>,
    sink: Arc<CollectingSink>,
    status: Arc<ListStatusListener>,
}

impl Harness {
    fn new(config: AsyncConfig) -> Self {
        Self::with_sink(config, |collecting| collecting)
    }

    fn with_sink(config: AsyncConfig, wrap: impl FnOnce(Arc<dyn Sink>) -> Arc<dyn Sink>) -> Self {
        let sink = Arc::new(CollectingSink::new());
        let collecting: Arc<dyn Sink> = sink.clone();
        let status_logger = Arc::new(StatusLogger::silent());
        let status = Arc::new(ListStatusListener::new());
        status_logger.register_listener(status.clone());
        let disruptor = AsyncLoggerBuilder::new()
            .with_config(AsyncConfig {
                ring_buffer_size: 128,
                ..config
            })
            .with_sink(wrap(collecting))
            .with_status_logger(status_logger)
            .with_clock(Arc::new(FixedClock::new(1_700_000_000_000)))
            .with_nano_clock(Arc::new(DummyNanoClock::new(42)))
            .build_started()
            .unwrap();
        Self {
            disruptor: Arc::new(disruptor),
            sink,
            status,
        }
    }

    fn finish(&self) {
        assert!(self.disruptor.stop(Duration::from_secs(5)));
    }
}

#[test]
fn slot_carries_every_event_field() {
    let harness = Harness::new(AsyncConfig::default());
    let marker = Marker::with_parents("AUDIT", vec![Marker::new("SECURITY")]);
    let thrown: Thrown = Arc::new(io::Error::new(io::ErrorKind::Other, "disk on fire"));

    let disruptor = harness.disruptor.clone();
    let (marker_in, thrown_in) = (marker.clone(), thrown.clone());
    thread::Builder::new()
        .name("fields".into())
        .spawn(move || {
            ThreadContext::put("request", "r-1");
            ThreadContext::push("outer");
            disruptor.log_event(
                "app::fields",
                Level::Warn,
                format_args!("{} of {}", 3, 4),
                Some(&marker_in),
                Some(&thrown_in),
                None,
            );
            ThreadContext::clear_all();
            disruptor.log_event("app::fields", Level::Info, "bare", None, None, None);
        })
        .unwrap()
        .join()
        .unwrap();
    harness.finish();

    let events = harness.sink.events();
    assert_eq!(events.len(), 2);
    let first = &events[0];
    assert_eq!(first.level, Level::Warn);
    assert_eq!(first.logger_name, "app::fields");
    assert_eq!(first.message, "3 of 4");
    assert_eq!(first.time_millis, 1_700_000_000_000);
    assert_eq!(first.nano_time, 42);
    assert!(first.marker.as_ref().unwrap().is_instance_of("SECURITY"));
    assert_eq!(first.thrown.as_ref().unwrap().to_string(), "disk on fire");
    assert_eq!(first.context_data.as_ref().unwrap().get("request").map(String::as_str), Some("r-1"));
    assert_eq!(first.context_stack.as_ref().unwrap().as_slice(), &["outer".to_string()]);
    assert_eq!(first.thread_name.as_deref(), Some("fields"));
    assert!(first.location.is_none());

    let second = &events[1];
    assert!(second.marker.is_none());
    assert!(second.context_data.is_none());
    assert!(second.context_stack.is_none());
}

#[test]
fn location_is_captured_when_configured() {
    let harness = Harness::new(AsyncConfig {
        include_location: true,
        ..AsyncConfig::default()
    });
    let logger = AsyncLogger::new(harness.disruptor.clone(), "located");
    let line = line!() + 1;
    logger.info(format_args!("here"));
    harness.finish();

    let events = harness.sink.events();
    let location = events[0].location.unwrap();
    assert_eq!(location.file(), file!());
    assert_eq!(location.line(), line);
}

#[test]
fn message_timestamp_overrides_clock() {
    let harness = Harness::new(AsyncConfig::default());
    let stamped: Arc<dyn Formattable> = Arc::new(TimestampedMessage::new("from the past", 12_345));
    harness
        .disruptor
        .log_event("ts", Level::Info, Message::Deferred(stamped), None, None, None);
    harness.finish();

    let events = harness.sink.events();
    assert_eq!(events[0].message, "from the past");
    assert_eq!(events[0].time_millis, 12_345);
}

struct Exploding;

impl fmt::Display for Exploding {
    fn fmt(&self, _f: &mut fmt::Formatter<'_>) -> fmt::Result {
        panic!("Display exploded")
    }
}

#[test]
fn formatting_panic_drops_only_that_event() {
    let harness = Harness::new(AsyncConfig::default());
    let logger = AsyncLogger::new(harness.disruptor.clone(), "fmt");
    logger.info(format_args!("before"));
    logger.info(format_args!("{}", Exploding));
    logger.info(format_args!("after"));
    harness.finish();

    assert_eq!(harness.sink.messages(), vec!["before", "after"]);
    assert_eq!(harness.status.count_matching(Level::Error, "Display exploded"), 1);
}

#[test]
fn background_formatting_defers_rendering_to_consumer() {
    let harness = Harness::new(AsyncConfig {
        format_messages_in_background: true,
        ..AsyncConfig::default()
    });

    let rendered_on = Arc::new(parking_lot::Mutex::new(None::<String>));
    let deferred: Arc<dyn Formattable> = {
        let rendered_on = rendered_on.clone();
        Arc::new(move |out: &mut String| {
            *rendered_on.lock() = thread::current().name().map(str::to_string);
            out.push_str("rendered late");
        })
    };
    let broken: Arc<dyn Formattable> = Arc::new(|_out: &mut String| panic!("late render failed"));

    harness
        .disruptor
        .log_event("bg", Level::Info, Message::Deferred(deferred), None, None, None);
    harness
        .disruptor
        .log_event("bg", Level::Info, Message::Deferred(broken), None, None, None);
    harness.disruptor.log_event("bg", Level::Info, "plain", None, None, None);
    harness.finish();

    assert_eq!(harness.sink.messages(), vec!["rendered late", "plain"]);
    assert_eq!(rendered_on.lock().as_deref(), Some("AsyncLogger[default]"));
    assert_eq!(harness.status.count_matching(Level::Error, "late render failed"), 1);
}

#[test]
fn sink_failures_are_reported_and_consumer_keeps_going() {
    let calls = Arc::new(std::sync::atomic::AtomicUsize::new(0));
    let flaky = {
        let calls = calls.clone();
        move |event: &LogEventSlot| -> Result<(), SinkError> {
            match calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst) {
                0 => Err(SinkError::failed("flaky", "first call refused")),
                1 => panic!("second call panicked"),
                _ => {
                    assert!(event.is_populated());
                    Ok(())
                }
            }
        }
    };
    let harness = Harness::with_sink(AsyncConfig::default(), move |collecting| {
        Arc::new(
            FanOutSink::new()
                .with_sink("flaky", Arc::new(flaky))
                .with_sink("collecting", collecting),
        )
    });

    for i in 0..5 {
        harness
            .disruptor
            .log_event("sinks", Level::Error, format_args!("event {i}"), None, None, None);
    }
    harness.finish();

    // the healthy sink saw everything
    assert_eq!(harness.sink.len(), 5);
    let errors = harness.status.find_level(Level::Error);
    assert_eq!(errors.len(), 2);
    assert!(errors[0].message.contains("first call refused"));
    assert!(errors[0].message.contains("1 of 2"));
    assert!(errors[1].message.contains("second call panicked"));
}

#[test]
fn consumed_events_release_their_arguments() {
    let picky = |event: &LogEventSlot| -> Result<(), SinkError> {
        match event.message() {
            "refused" => Err(SinkError::failed("picky", "refused this one")),
            "explodes" => panic!("sink blew up"),
            _ => Ok(()),
        }
    };
    let harness = Harness::with_sink(
        AsyncConfig {
            format_messages_in_background: true,
            ..AsyncConfig::default()
        },
        move |_collecting| -> Arc<dyn Sink> { Arc::new(picky) },
    );

    let thrown: Thrown = Arc::new(io::Error::new(io::ErrorKind::Other, "attached"));
    let rendered: Arc<dyn Formattable> = Arc::new(|out: &mut String| out.push_str("fine"));
    let broken: Arc<dyn Formattable> = Arc::new(|_out: &mut String| panic!("cannot render"));

    let disruptor = &harness.disruptor;
    disruptor.log_event("args", Level::Info, Message::Deferred(rendered.clone()), None, Some(&thrown), None);
    disruptor.log_event("args", Level::Info, "refused", None, Some(&thrown), None);
    disruptor.log_event("args", Level::Info, "explodes", None, Some(&thrown), None);
    disruptor.log_event("args", Level::Info, Message::Deferred(broken.clone()), None, Some(&thrown), None);
    harness.finish();

    // delivered, refused by the sink, sink panic, failed background format
    assert_eq!(Arc::strong_count(&thrown), 1);
    assert_eq!(Arc::strong_count(&rendered), 1);
    assert_eq!(Arc::strong_count(&broken), 1);

    let errors = harness.status.find_level(Level::Error);
    assert_eq!(errors.len(), 3, "{errors:?}");
    assert!(errors[0].message.contains("refused this one"));
    assert!(errors[1].message.contains("sink blew up"));
    assert!(errors[2].message.contains("cannot render"));
}
