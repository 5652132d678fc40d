//! Cross-thread stress tests for the order and conservation laws.

#![cfg(not(loom))]

use std::thread;

use ringq::{mpsc, spsc};

const SPSC_ITEMS: u64 = 2_000_000;

#[test]
fn spsc_order_law_across_capacities() {
    for capacity in [1, 2, 7, 1000, 100_000] {
        let (mut tx, mut rx) = spsc::channel::<u64>(capacity).unwrap();

        let producer = thread::spawn(move || {
            for i in 0..SPSC_ITEMS {
                while tx.enqueue(i).is_err() {
                    std::hint::spin_loop();
                }
            }
        });

        for expected in 0..SPSC_ITEMS {
            let got = loop {
                if let Some(value) = rx.dequeue() {
                    break value;
                }
                std::hint::spin_loop();
            };
            assert_eq!(got, expected, "capacity {capacity}");
        }

        producer.join().unwrap();
        assert!(rx.is_empty());
        assert_eq!(rx.dequeue(), None);
    }
}

#[test]
fn spsc_heap_items_survive_transfer() {
    let (mut tx, mut rx) = spsc::channel::<Box<[u64; 4]>>(16).unwrap();

    let producer = thread::spawn(move || {
        for i in 0..100_000u64 {
            let mut item = Box::new([i, i + 1, i + 2, i + 3]);
            loop {
                match tx.enqueue(item) {
                    Ok(()) => break,
                    Err(full) => item = full.into_inner(),
                }
            }
        }
    });

    for i in 0..100_000u64 {
        let item = loop {
            if let Some(item) = rx.dequeue() {
                break item;
            }
            std::hint::spin_loop();
        };
        assert_eq!(*item, [i, i + 1, i + 2, i + 3]);
    }

    producer.join().unwrap();
}

fn mpsc_conservation(producers: usize, per_producer: usize, capacity: usize) {
    let (tx, mut rx) = mpsc::channel::<usize>(capacity).unwrap();

    let handles: Vec<_> = (0..producers)
        .map(|_| {
            let tx = tx.clone();
            thread::spawn(move || {
                for i in 0..per_producer {
                    while tx.enqueue(i).is_err() {
                        std::hint::spin_loop();
                    }
                }
            })
        })
        .collect();
    drop(tx);

    let mut counts = vec![0usize; per_producer];
    for _ in 0..producers * per_producer {
        let value = loop {
            if let Some(value) = rx.dequeue() {
                break value;
            }
            std::hint::spin_loop();
        };
        counts[value] += 1;
    }

    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(rx.dequeue(), None);
    for (value, &count) in counts.iter().enumerate() {
        assert_eq!(count, producers, "value {value} seen {count} times");
    }
}

#[test]
fn mpsc_conservation_three_producers() {
    mpsc_conservation(3, 300_000, (1 << 17) - 1);
}

#[test]
fn mpsc_conservation_small_ring() {
    mpsc_conservation(4, 100_000, 3);
}

#[test]
fn mpsc_conservation_single_slot() {
    mpsc_conservation(2, 50_000, 1);
}

#[test]
fn mpsc_per_producer_order() {
    const PRODUCERS: usize = 4;
    const N: u64 = 200_000;

    let (tx, mut rx) = mpsc::channel::<(usize, u64)>(256).unwrap();

    let handles: Vec<_> = (0..PRODUCERS)
        .map(|id| {
            let tx = tx.clone();
            thread::spawn(move || {
                for seq in 0..N {
                    while tx.enqueue((id, seq)).is_err() {
                        std::hint::spin_loop();
                    }
                }
            })
        })
        .collect();

    let mut next = [0u64; PRODUCERS];
    let mut remaining = PRODUCERS as u64 * N;
    while remaining > 0 {
        if let Some((id, seq)) = rx.dequeue() {
            assert_eq!(seq, next[id], "producer {id} out of order");
            next[id] += 1;
            remaining -= 1;
        } else {
            std::hint::spin_loop();
        }
    }

    for handle in handles {
        handle.join().unwrap();
    }
    assert!(next.iter().all(|&n| n == N));
}
