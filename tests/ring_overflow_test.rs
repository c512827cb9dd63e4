// S6: with a ring capacity far smaller than the total traffic, producers
// must overflow into the fallback list rather than drop or duplicate
// items; every pushed item is popped exactly once.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread;

use rusty_jobs::ring::RingBuffer;

#[test]
fn overflowing_producers_spill_into_fallback_without_loss() {
    const PRODUCERS: usize = 8;
    const PER_PRODUCER: u64 = 100;

    let ring: Arc<RingBuffer<u64, 4>> = Arc::new(RingBuffer::new());

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let ring = ring.clone();
            thread::spawn(move || {
                let base = p as u64 * PER_PRODUCER;
                for i in 0..PER_PRODUCER {
                    ring.push(base + i);
                }
            })
        })
        .collect();

    let total = PRODUCERS as u64 * PER_PRODUCER;
    let mut seen: HashMap<u64, u32> = HashMap::new();
    let mut popped = 0u64;
    while popped < total {
        if let Some(v) = ring.pop() {
            *seen.entry(v).or_insert(0) += 1;
            popped += 1;
        } else {
            thread::yield_now();
        }
    }

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(seen.len() as u64, total, "every distinct value must be observed");
    assert!(seen.values().all(|&count| count == 1), "no value may be popped more than once");
    for p in 0..PRODUCERS as u64 {
        for i in 0..PER_PRODUCER {
            assert!(seen.contains_key(&(p * PER_PRODUCER + i)));
        }
    }
}
