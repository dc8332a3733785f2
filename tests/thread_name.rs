#![cfg(target_os = "linux")]

use dmxp_asynclog::config::AsyncConfig;
use dmxp_asynclog::Core::status::StatusLogger;
use dmxp_asynclog::Core::thread_name::set_current_thread_name;
use dmxp_asynclog::MPSC::sink::CollectingSink;
use dmxp_asynclog::MPSC::{AsyncLogger, AsyncLoggerBuilder};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Log once, rename the OS thread, log again; return the recorded names.
fn names_recorded_with(strategy: &str) -> Vec<Option<String>> {
    let sink = Arc::new(CollectingSink::new());
    let config = AsyncConfig {
        context_name: format!("names-{strategy}"),
        ring_buffer_size: 128,
        thread_name_strategy: strategy.to_string(),
        ..AsyncConfig::default()
    };
    let disruptor = Arc::new(
        AsyncLoggerBuilder::new()
            .with_config(config)
            .with_sink(sink.clone())
            .with_status_logger(Arc::new(StatusLogger::silent()))
            .build_started()
            .unwrap(),
    );

    let logger = AsyncLogger::new(disruptor.clone(), "names");
    thread::Builder::new()
        .name("original".into())
        .spawn(move || {
            logger.info(format_args!("first"));
            assert!(set_current_thread_name("renamed"));
            logger.info(format_args!("second"));
        })
        .unwrap()
        .join()
        .unwrap();

    assert!(disruptor.stop(Duration::from_secs(5)));
    sink.events().into_iter().map(|e| e.thread_name).collect()
}

#[test]
fn cached_strategy_keeps_first_name() {
    assert_eq!(
        names_recorded_with("CACHED"),
        vec![Some("original".to_string()), Some("original".to_string())]
    );
}

#[test]
fn uncached_strategy_sees_rename() {
    assert_eq!(
        names_recorded_with("UNCACHED"),
        vec![Some("original".to_string()), Some("renamed".to_string())]
    );
}
