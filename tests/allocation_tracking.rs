// Allocation tracking for the publish path
//
// Tests using dhat are marked with #[serial_test::serial] because dhat only
// allows one profiler to run at a time.
//
//   cargo test --test allocation_tracking -- --nocapture

use dmxp_asynclog::config::AsyncConfig;
use dmxp_asynclog::error::SinkError;
use dmxp_asynclog::Core::status::StatusLogger;
use dmxp_asynclog::Core::wait_strategy::YieldingWaitStrategy;
use dmxp_asynclog::MPSC::Buffer::RingBuffer;
use dmxp_asynclog::MPSC::Structs::LogEventSlot;
use dmxp_asynclog::MPSC::{AsyncDisruptor, AsyncLogger, AsyncLoggerBuilder};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

const CAPACITY: usize = 1024;
const CHUNK: usize = CAPACITY / 2;

fn wait_until_drained(disruptor: &AsyncDisruptor) {
    while disruptor.remaining_capacity() < CAPACITY {
        thread::yield_now();
    }
}

/// Publish `count` events in chunks that never fill the ring.
fn publish(logger: &AsyncLogger, disruptor: &AsyncDisruptor, count: usize) {
    for chunk_start in (0..count).step_by(CHUNK) {
        for i in chunk_start..(chunk_start + CHUNK).min(count) {
            logger.info(format_args!("event {i:06}"));
        }
        wait_until_drained(disruptor);
    }
}

#[test]
#[serial_test::serial]
fn steady_state_publish_does_not_allocate() {
    let _dhat = dhat::Profiler::new_heap();

    let dispatched = Arc::new(AtomicUsize::new(0));
    let counting = {
        let dispatched = dispatched.clone();
        move |event: &LogEventSlot| -> Result<(), SinkError> {
            if event.is_populated() {
                dispatched.fetch_add(1, Ordering::Relaxed);
            }
            Ok(())
        }
    };
    let config = AsyncConfig {
        context_name: "dhat".to_string(),
        ring_buffer_size: CAPACITY,
        wait_strategy: "Yield".to_string(),
        ..AsyncConfig::default()
    };
    let disruptor = Arc::new(
        AsyncLoggerBuilder::new()
            .with_config(config)
            .with_sink(Arc::new(counting))
            .with_status_logger(Arc::new(StatusLogger::silent()))
            .build_started()
            .unwrap(),
    );
    let logger = AsyncLogger::new(disruptor.clone(), "hot.path");

    // every slot and the scratch buffer need a few laps to reach full size
    println!("Warming up...");
    publish(&logger, &disruptor, 3 * CAPACITY);

    let before = dhat::HeapStats::get();
    publish(&logger, &disruptor, 10_000);
    let after = dhat::HeapStats::get();

    println!(
        "blocks allocated during measured phase: {} ({} bytes)",
        after.total_blocks - before.total_blocks,
        after.total_bytes - before.total_bytes
    );
    assert_eq!(after.total_blocks, before.total_blocks);

    assert!(disruptor.stop(Duration::from_secs(5)));
    assert_eq!(dispatched.load(Ordering::Relaxed), 3 * CAPACITY + 10_000);
}

#[test]
#[serial_test::serial]
fn ring_claim_and_consume_do_not_allocate() {
    let _dhat = dhat::Profiler::new_heap();

    let rb: Arc<RingBuffer<u64>> = Arc::new(RingBuffer::new(CAPACITY, Arc::new(YieldingWaitStrategy)));
    let mut consumer = rb.take_consumer().unwrap();

    let before = dhat::HeapStats::get();
    for i in 0..10_000u64 {
        let mut claim = rb.try_claim().unwrap();
        *claim = i;
        claim.publish();
        let (start, end) = consumer.next_batch().unwrap();
        assert_eq!(*consumer.slot_mut(end), i);
        consumer.advance(end);
        assert_eq!(start, end);
    }
    let after = dhat::HeapStats::get();

    println!("blocks allocated: {}", after.total_blocks - before.total_blocks);
    assert_eq!(after.total_blocks, before.total_blocks);
}
