#![cfg(not(loom))]

use std::collections::HashSet;
use std::error::Error;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;

use turbo_lfq::{
    is_would_block, AnyQueue, Backoff, Builder, Cardinality, Direct, Full, Mpmc,
    MpmcCompactIndirect, MpmcIndirect, MpscCompact, MpscPtr, Ptr, Queue, Repr, Spmc, Spsc,
    WouldBlock,
};

/// One builder per engine, at the given capacity.
fn every_engine(capacity: usize) -> Vec<Builder> {
    vec![
        Builder::new(capacity).single_producer().single_consumer(),
        Builder::new(capacity).single_consumer(),
        Builder::new(capacity).single_producer(),
        Builder::new(capacity),
        Builder::new(capacity).single_consumer().compact(),
        Builder::new(capacity).single_producer().compact(),
        Builder::new(capacity).compact(),
    ]
}

#[test]
fn test_basic_enqueue_dequeue() {
    for builder in every_engine(8) {
        let queue = builder.build::<i32>();
        queue.enqueue(42).unwrap();
        assert_eq!(queue.dequeue(), Ok(42));
    }
}

#[test]
fn test_fifo_order() {
    for builder in every_engine(16) {
        let queue = builder.build::<i32>();
        for i in 0..10 {
            queue.enqueue(i).unwrap();
        }
        for i in 0..10 {
            assert_eq!(queue.dequeue(), Ok(i), "{:?}", queue.engine());
        }
    }
}

#[test]
fn test_full_queue() {
    for builder in every_engine(4) {
        let queue = builder.build::<i32>();
        for i in 0..4 {
            assert!(queue.enqueue(i).is_ok());
        }
        assert_eq!(queue.enqueue(99), Err(Full(99)), "{:?}", queue.engine());
        assert_eq!(queue.dequeue(), Ok(0));
        assert!(queue.enqueue(99).is_ok());
    }
}

#[test]
fn test_empty_queue() {
    for builder in every_engine(4) {
        let queue = builder.build::<i32>();
        assert_eq!(queue.dequeue(), Err(WouldBlock));
        queue.enqueue(1).unwrap();
        queue.dequeue().unwrap();
        assert_eq!(queue.dequeue(), Err(WouldBlock));
    }
}

#[test]
fn test_capacity_rounding() {
    assert_eq!(Builder::new(0).build::<u8>().capacity(), 1);
    assert_eq!(Builder::new(1).build::<u8>().capacity(), 1);
    assert_eq!(Builder::new(3).build::<u8>().capacity(), 4);
    assert_eq!(Builder::new(1000).compact().build::<u8>().capacity(), 1024);
    assert_eq!(Spsc::<u8>::new(1024).capacity(), 1024);
}

#[test]
fn test_capacity_one() {
    for builder in every_engine(1) {
        let queue = builder.build::<&str>();
        for round in ["a", "b", "c"] {
            queue.enqueue(round).unwrap();
            assert_eq!(queue.enqueue("x"), Err(Full("x")));
            assert_eq!(queue.dequeue(), Ok(round));
            assert_eq!(queue.dequeue(), Err(WouldBlock));
        }
    }
}

#[test]
fn test_len_and_empty() {
    for builder in every_engine(8) {
        let queue = builder.build::<i32>();
        assert!(queue.is_empty());
        assert_eq!(queue.len(), 0);

        queue.enqueue(1).unwrap();
        queue.enqueue(2).unwrap();
        assert!(!queue.is_empty());
        assert_eq!(queue.len(), 2);
    }
}

#[test]
fn test_alternating_enqueue_dequeue() {
    for builder in every_engine(4) {
        let queue = builder.build::<i32>();
        for i in 0..100 {
            queue.enqueue(i).unwrap();
            assert_eq!(queue.dequeue().unwrap(), i);
        }
    }
}

#[test]
fn test_wrap_around() {
    for builder in every_engine(8) {
        let queue = builder.build::<usize>();
        for round in 0..10 {
            for i in 0..8 {
                queue.enqueue(round * 100 + i).unwrap();
            }
            for i in 0..8 {
                assert_eq!(queue.dequeue().unwrap(), round * 100 + i);
            }
        }
    }
}

#[test]
fn test_cursor_wrap_past_u32() {
    for builder in every_engine(4) {
        let queue = builder.with_start(u32::MAX as u64 - 6).build::<u64>();
        for round in 0..8u64 {
            for i in 0..4 {
                queue.enqueue(round << 8 | i).unwrap();
            }
            assert!(queue.enqueue(0).is_err());
            for i in 0..4 {
                assert_eq!(queue.dequeue(), Ok(round << 8 | i), "{:?}", queue.engine());
            }
        }
    }
}

#[test]
fn test_full_returns_value() {
    let queue = Mpmc::<String>::new(2);

    queue.enqueue("first".to_string()).unwrap();
    queue.enqueue("second".to_string()).unwrap();

    match queue.enqueue("third".to_string()) {
        Err(Full(value)) => assert_eq!(value, "third"),
        _ => panic!("Expected Full"),
    }
}

#[test]
fn test_errors_are_would_block() {
    let queue = Spmc::<u8>::new(1);
    queue.enqueue(1).unwrap();

    let full: Box<dyn Error> = Box::new(queue.enqueue(2).unwrap_err());
    assert!(is_would_block(&*full));

    queue.dequeue().unwrap();
    let empty: Box<dyn Error> = Box::new(queue.dequeue().unwrap_err());
    assert!(is_would_block(&*empty));
    assert_eq!(empty.to_string(), "operation would block");
}

#[test]
fn test_drop_elements() {
    struct DropCounter(Arc<AtomicUsize>);

    impl Drop for DropCounter {
        fn drop(&mut self) {
            self.0.fetch_add(1, Ordering::Relaxed);
        }
    }

    for builder in every_engine(8) {
        let drops = Arc::new(AtomicUsize::new(0));
        {
            let queue = builder.build::<DropCounter>();
            for _ in 0..5 {
                assert!(queue.enqueue(DropCounter(drops.clone())).is_ok());
            }
            drop(queue.dequeue());
            drop(queue.dequeue());
            assert_eq!(drops.load(Ordering::Relaxed), 2);
        }
        assert_eq!(drops.load(Ordering::Relaxed), 5);
    }
}

#[test]
fn test_indirect_handles() {
    let scq = MpmcIndirect::new(4);
    scq.enqueue(u64::MAX).unwrap();
    scq.enqueue(0).unwrap();
    assert_eq!(scq.dequeue(), Ok(u64::MAX));
    assert_eq!(scq.dequeue(), Ok(0));

    let compact = MpmcCompactIndirect::new(4);
    compact.enqueue((1 << 63) - 1).unwrap();
    assert_eq!(compact.dequeue(), Ok((1 << 63) - 1));
}

#[test]
#[should_panic(expected = "limited to 63 bits")]
fn test_compact_indirect_rejects_top_bit() {
    let queue = MpmcCompactIndirect::new(4);
    let _ = queue.enqueue(1 << 63);
}

#[test]
fn test_drain_after_producers_stop() {
    for builder in every_engine(64).into_iter().skip(1) {
        let queue = builder.build::<usize>();
        for i in 0..40 {
            queue.enqueue(i).unwrap();
        }
        // Empty polls close the gate until the next enqueue.
        for _ in 0..40 {
            queue.dequeue().unwrap();
        }
        for _ in 0..1000 {
            let _ = queue.dequeue();
        }
        for i in 0..10 {
            queue.enqueue(i).unwrap();
        }
        queue.drainable().expect("multi-access engine").drain();
        let mut out = Vec::new();
        while let Ok(v) = queue.dequeue() {
            out.push(v);
        }
        assert_eq!(out, (0..10).collect::<Vec<_>>(), "{:?}", queue.engine());
    }
}

#[test]
fn test_concurrent_fill_then_drain() {
    const PRODUCERS: usize = 4;
    const MESSAGES_PER_PRODUCER: usize = 256;

    for builder in every_engine(PRODUCERS * MESSAGES_PER_PRODUCER).into_iter().skip(1) {
        if builder.selection().engine.cardinality() == Cardinality::Spmc {
            continue;
        }
        let queue = Arc::new(builder.build::<usize>());
        let handles: Vec<_> = (0..PRODUCERS)
            .map(|p| {
                let q = queue.clone();
                thread::spawn(move || {
                    for i in 0..MESSAGES_PER_PRODUCER {
                        q.enqueue(p * 10_000 + i).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(queue.len(), PRODUCERS * MESSAGES_PER_PRODUCER);
        queue.drainable().unwrap().drain();
        let mut seen = HashSet::new();
        while let Ok(v) = queue.dequeue() {
            assert!(seen.insert(v), "duplicate {v}");
        }
        assert_eq!(seen.len(), PRODUCERS * MESSAGES_PER_PRODUCER);
    }
}

#[test]
fn test_racing_producers_respect_capacity() {
    const PRODUCERS: usize = 8;

    for capacity in [1, 4] {
        for builder in every_engine(capacity) {
            let cardinality = builder.selection().engine.cardinality();
            if !matches!(cardinality, Cardinality::Mpsc | Cardinality::Mpmc) {
                continue;
            }
            let queue = Arc::new(builder.build::<usize>());
            for round in 0..50 {
                let barrier = Arc::new(Barrier::new(PRODUCERS));
                let handles: Vec<_> = (0..PRODUCERS)
                    .map(|p| {
                        let q = queue.clone();
                        let barrier = barrier.clone();
                        thread::spawn(move || {
                            barrier.wait();
                            q.enqueue(round * PRODUCERS + p).is_ok()
                        })
                    })
                    .collect();
                let accepted = handles
                    .into_iter()
                    .map(|h| h.join().unwrap())
                    .filter(|ok| *ok)
                    .count();

                assert_eq!(accepted, capacity, "{:?} round {round}", queue.engine());
                assert_eq!(queue.len(), capacity);
                for _ in 0..capacity {
                    queue.dequeue().unwrap();
                }
                assert_eq!(queue.dequeue(), Err(WouldBlock));
            }
        }
    }
}

/// Runs `producers` and `consumers` threads against `queue` and checks that
/// every value arrives exactly once, in per-producer order for each consumer.
fn stress(queue: AnyQueue<Direct<usize>>, producers: usize, consumers: usize, per_producer: usize) {
    stress_with(queue, producers, consumers, per_producer, |v| v, |v| v);
}

/// [`stress`] for any representation: `encode` turns a value into an item
/// and `decode` turns it back, checking it on the way.
fn stress_with<R>(
    queue: AnyQueue<R>,
    producers: usize,
    consumers: usize,
    per_producer: usize,
    encode: fn(usize) -> R::Item,
    decode: fn(R::Item) -> usize,
) where
    R: Repr + 'static,
    AnyQueue<R>: Send + Sync + 'static,
{
    let queue = Arc::new(queue);
    let total = producers * per_producer;
    let consumed = Arc::new(AtomicUsize::new(0));

    let consumer_handles: Vec<_> = (0..consumers)
        .map(|_| {
            let q = queue.clone();
            let consumed = consumed.clone();
            thread::spawn(move || {
                let mut received = Vec::new();
                let backoff = Backoff::new();
                while consumed.load(Ordering::Relaxed) < total {
                    match q.dequeue() {
                        Ok(v) => {
                            received.push(decode(v));
                            consumed.fetch_add(1, Ordering::Relaxed);
                            backoff.reset();
                        }
                        Err(WouldBlock) => backoff.snooze(),
                    }
                }
                received
            })
        })
        .collect();

    let producer_handles: Vec<_> = (0..producers)
        .map(|p| {
            let q = queue.clone();
            thread::spawn(move || {
                for i in 0..per_producer {
                    let mut item = encode(p * 1_000_000 + i);
                    while let Err(Full(rejected)) = q.enqueue(item) {
                        item = rejected;
                        std::hint::spin_loop();
                    }
                }
            })
        })
        .collect();

    for h in producer_handles {
        h.join().unwrap();
    }
    if let Some(d) = queue.drainable() {
        d.drain();
    }

    let mut all = HashSet::new();
    for h in consumer_handles {
        let received = h.join().unwrap();
        let mut last = vec![None; producers];
        for v in received {
            let (p, i) = (v / 1_000_000, v % 1_000_000);
            assert!(last[p].map_or(true, |prev| prev < i), "producer {p} out of order");
            last[p] = Some(i);
            assert!(all.insert(v), "duplicate {v}");
        }
    }
    assert_eq!(all.len(), total);
}

#[test]
fn test_spsc_threaded() {
    stress(Builder::new(128).single_producer().single_consumer().build(), 1, 1, 10_000);
}

#[test]
fn test_mpsc_threaded() {
    stress(Builder::new(512).single_consumer().build(), 4, 1, 2_500);
    stress(Builder::new(512).single_consumer().compact().build(), 4, 1, 2_500);
}

#[test]
fn test_spmc_threaded() {
    stress(Builder::new(512).single_producer().build(), 1, 4, 10_000);
    stress(Builder::new(512).single_producer().compact().build(), 1, 4, 10_000);
}

#[test]
fn test_mpmc_threaded() {
    stress(Builder::new(512).build(), 4, 4, 2_500);
    stress(Builder::new(512).compact().build(), 4, 4, 2_500);
}

#[test]
fn test_stress_small_capacity() {
    stress(Builder::new(2).build(), 4, 4, 2_000);
    stress(Builder::new(2).compact().build(), 4, 4, 2_000);
    stress(Builder::new(1).single_consumer().build(), 3, 1, 2_000);
}

const CHECK_BITS: u32 = 24;
const CHECK_MASK: u64 = (1 << CHECK_BITS) - 1;

/// Handle for `value`: the value in the high bits, a hash of it in the low
/// 24. Stays below 2^63 for every value the stress tests produce.
fn checked_handle(value: usize) -> u64 {
    let value = value as u64;
    (value << CHECK_BITS) | ((value.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 40) & CHECK_MASK)
}

fn verify_handle(handle: u64) -> usize {
    let value = handle >> CHECK_BITS;
    assert_eq!(
        handle & CHECK_MASK,
        (value.wrapping_mul(0x9E37_79B9_7F4A_7C15) >> 40) & CHECK_MASK,
        "torn handle {handle:#x}"
    );
    value as usize
}

#[test]
fn test_compact_indirect_threaded() {
    for capacity in [2, 512] {
        stress_with(
            Builder::new(capacity).single_consumer().compact().build_indirect(),
            4,
            1,
            2_500,
            checked_handle,
            verify_handle,
        );
        stress_with(
            Builder::new(capacity).single_producer().compact().build_indirect(),
            1,
            4,
            10_000,
            checked_handle,
            verify_handle,
        );
        stress_with(
            Builder::new(capacity).compact().build_indirect(),
            4,
            4,
            2_500,
            checked_handle,
            verify_handle,
        );
    }
}

#[test]
fn test_indirect_threaded() {
    stress_with(Builder::new(64).build_indirect(), 4, 4, 2_500, checked_handle, verify_handle);
}

#[test]
fn test_pointer_handoff() {
    const PRODUCERS: usize = 3;
    const MESSAGES_PER_PRODUCER: usize = 500;

    let queue = Arc::new(MpscPtr::<String>::new(64));
    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let q = queue.clone();
            thread::spawn(move || {
                for i in 0..MESSAGES_PER_PRODUCER {
                    let mut ptr = Ptr::new(Box::into_raw(Box::new(format!("{p}:{i}"))));
                    while let Err(Full(rejected)) = q.enqueue(ptr) {
                        ptr = rejected;
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let mut received = HashSet::new();
    while received.len() < PRODUCERS * MESSAGES_PER_PRODUCER {
        match queue.dequeue() {
            // SAFETY: every pointer came from `Box::into_raw` and is
            // dequeued exactly once.
            Ok(ptr) => assert!(received.insert(*unsafe { Box::from_raw(ptr.as_ptr()) })),
            Err(WouldBlock) => thread::yield_now(),
        }
    }
    for h in handles {
        h.join().unwrap();
    }
    assert!(received.contains("2:499"));
}

#[test]
fn test_direct_aliases_under_threads() {
    let queue = Arc::new(MpscCompact::<Vec<u32>>::new(16));
    let producers: Vec<_> = (0..2u32)
        .map(|p| {
            let q = queue.clone();
            thread::spawn(move || {
                for i in 0..1000 {
                    let mut item = vec![p, i];
                    while let Err(Full(rejected)) = q.enqueue(item) {
                        item = rejected;
                        thread::yield_now();
                    }
                }
            })
        })
        .collect();

    let mut count = 0;
    while count < 2000 {
        if let Ok(v) = queue.dequeue() {
            assert_eq!(v.len(), 2);
            count += 1;
        }
    }
    for h in producers {
        h.join().unwrap();
    }
    assert!(queue.is_empty());
}
