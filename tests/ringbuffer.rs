use dmxp_asynclog::Core::wait_strategy::{BlockingWaitStrategy, YieldingWaitStrategy};
use dmxp_asynclog::MPSC::Buffer::RingBuffer;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn ring(capacity: usize) -> Arc<RingBuffer<u64>> {
    Arc::new(RingBuffer::new(capacity, Arc::new(YieldingWaitStrategy)))
}

#[test]
fn single_producer_is_fifo() {
    let rb = ring(128);
    let mut consumer = rb.take_consumer().unwrap();

    let mut expected = 0u64;
    let mut next = 0u64;
    while expected < 1000 {
        // publish in bursts of varying size, then drain
        let burst = 1 + fastrand::usize(..64);
        for _ in 0..burst {
            match rb.try_claim() {
                Some(mut claim) => {
                    *claim = next;
                    claim.publish();
                    next += 1;
                }
                None => break,
            }
        }
        while let Some((start, end)) = consumer.next_batch() {
            for seq in start..=end {
                assert_eq!(*consumer.slot_mut(seq), expected);
                expected += 1;
            }
            consumer.advance(end);
        }
    }
    assert!(rb.is_empty());
}

#[test]
fn remaining_capacity_stays_in_bounds() {
    let rb = ring(128);
    let mut consumer = rb.take_consumer().unwrap();
    assert_eq!(rb.remaining_capacity(), 128);

    for _ in 0..128 {
        rb.try_claim().unwrap().publish();
        let claimed = rb.cursor() - rb.consumed();
        assert!((0..=128).contains(&claimed));
        assert!(rb.remaining_capacity() <= 128);
    }
    assert_eq!(rb.remaining_capacity(), 0);
    assert!(rb.try_claim().is_none());

    let (start, end) = consumer.next_batch().unwrap();
    assert_eq!((start, end), (0, 127));
    consumer.advance(63);
    assert_eq!(rb.remaining_capacity(), 64);
    consumer.advance(end);
    assert_eq!(rb.remaining_capacity(), 128);
}

#[test]
fn multi_producer_delivers_every_event_in_per_thread_order() {
    const PRODUCERS: u64 = 4;
    const PER_PRODUCER: u64 = 20_000;

    let rb: Arc<RingBuffer<u64>> = Arc::new(RingBuffer::new(256, Arc::new(BlockingWaitStrategy::new())));
    let mut consumer = rb.take_consumer().unwrap();
    let halted = Arc::new(AtomicBool::new(false));

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let rb = Arc::clone(&rb);
            let halted = Arc::clone(&halted);
            thread::spawn(move || {
                for i in 0..PER_PRODUCER {
                    let mut claim = rb.claim_blocking(&halted).unwrap();
                    *claim = (p << 32) | i;
                    claim.publish();
                    if fastrand::u8(..) == 0 {
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let mut last_seen = vec![None::<u64>; PRODUCERS as usize];
    let mut received = 0;
    while received < PRODUCERS * PER_PRODUCER {
        let Some((start, end)) = consumer.wait_for_batch(&|| false) else {
            continue;
        };
        for seq in start..=end {
            let value = *consumer.slot_mut(seq);
            let (producer, index) = ((value >> 32) as usize, value & 0xffff_ffff);
            if let Some(previous) = last_seen[producer] {
                assert!(index > previous, "producer {producer} out of order");
            }
            last_seen[producer] = Some(index);
            received += 1;
        }
        let claimed = rb.cursor() - rb.consumed();
        assert!(claimed <= 256);
        consumer.advance(end);
    }

    for producer in producers {
        producer.join().unwrap();
    }
    assert!(rb.is_empty());
    println!("received {received} events from {PRODUCERS} producers");
}

#[test]
fn halted_flag_releases_blocked_claimer() {
    let rb: Arc<RingBuffer<u64>> = Arc::new(RingBuffer::new(128, Arc::new(BlockingWaitStrategy::new())));
    let _consumer = rb.take_consumer().unwrap();
    for _ in 0..128 {
        rb.try_claim().unwrap().publish();
    }

    let halted = Arc::new(AtomicBool::new(false));
    let blocked = {
        let rb = Arc::clone(&rb);
        let halted = Arc::clone(&halted);
        thread::spawn(move || rb.claim_blocking(&halted).is_none())
    };
    thread::sleep(std::time::Duration::from_millis(50));
    halted.store(true, Ordering::Release);
    rb.wait_strategy().signal_all();
    assert!(blocked.join().unwrap());
}
