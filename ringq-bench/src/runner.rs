//! Pinned-thread throughput runs with end-to-end integrity checks.

use std::hint;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Barrier};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use ringq::{InvalidCapacity, mpsc, spsc};
use tracing::{debug, info, warn};

use crate::config::BenchConfig;

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("queue construction failed: {0}")]
    Queue(#[from] InvalidCapacity),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("out of order: expected {expected}, got {got}")]
    OutOfOrder { expected: u64, got: u64 },
    #[error("value {value} dequeued {got} times, expected {expected}")]
    Miscount {
        value: usize,
        expected: usize,
        got: usize,
    },
    #[error("{0} thread panicked")]
    WorkerPanicked(&'static str),
}

/// Pins the calling thread to `cpu`. Failure is logged and otherwise ignored.
pub fn pin_to_core(cpu: Option<usize>) {
    if let Some(id) = cpu {
        if core_affinity::set_for_current(core_affinity::CoreId { id }) {
            debug!(cpu = id, "pinned thread");
        } else {
            warn!(cpu = id, "failed to pin thread, running unpinned");
        }
    }
}

/// Items per second, rounded down.
fn throughput(items: u64, elapsed: Duration) -> u64 {
    let nanos = elapsed.as_nanos().max(1);
    u64::try_from(u128::from(items) * 1_000_000_000 / nanos).unwrap_or(u64::MAX)
}

fn spawn<T, F>(name: &str, f: F) -> Result<JoinHandle<T>, BenchError>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    Ok(thread::Builder::new().name(name.to_owned()).spawn(f)?)
}

fn join<T>(handle: JoinHandle<T>, role: &'static str) -> Result<T, BenchError> {
    handle.join().map_err(|_| BenchError::WorkerPanicked(role))
}

/// Run-wide stop flag.
///
/// Raised by a consumer that found bad data, or by a producer that unwinds,
/// so the surviving workers stop spinning on a queue nobody will service.
#[derive(Debug, Clone, Default)]
struct Abort(Arc<AtomicBool>);

impl Abort {
    fn raise(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    fn raised(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Raises the abort flag if the owning worker panics.
struct RaiseOnPanic(Abort);

impl Drop for RaiseOnPanic {
    fn drop(&mut self) {
        if thread::panicking() {
            self.0.raise();
        }
    }
}

/// `got` must be the next value of the in-order sequence.
fn check_order(expected: u64, got: u64) -> Result<(), BenchError> {
    if got == expected {
        Ok(())
    } else {
        Err(BenchError::OutOfOrder { expected, got })
    }
}

/// Counts `value`. Anything outside `0..counts.len()` was never sent.
fn tally(counts: &mut [usize], value: usize) -> Result<(), BenchError> {
    match counts.get_mut(value) {
        Some(count) => {
            *count += 1;
            Ok(())
        }
        None => Err(BenchError::Miscount {
            value,
            expected: 0,
            got: 1,
        }),
    }
}

/// Every value must have arrived exactly once per producer.
fn check_counts(counts: &[usize], producers: usize) -> Result<(), BenchError> {
    match counts.iter().enumerate().find(|&(_, &c)| c != producers) {
        Some((value, &got)) => Err(BenchError::Miscount {
            value,
            expected: producers,
            got,
        }),
        None => Ok(()),
    }
}

/// Runs the SPSC benchmark `config.runs` times and returns elems/s per run.
pub fn run_spsc(config: &BenchConfig) -> Result<Vec<u64>, BenchError> {
    info!(
        items = config.spsc_items,
        capacity = config.spsc_capacity,
        producer_cpu = ?config.producer_cpu,
        consumer_cpu = ?config.consumer_cpu,
        runs = config.runs,
        "starting spsc benchmark"
    );

    (0..config.runs)
        .map(|run| {
            let result = spsc_once(config, |i| i)?;
            debug!(run, elems_per_sec = result, "spsc run complete");
            Ok(result)
        })
        .collect()
}

fn consume_spsc(
    rx: &mut spsc::Consumer<u64>,
    items: u64,
    abort: &Abort,
) -> Result<(), BenchError> {
    for expected in 0..items {
        let got = loop {
            if let Some(value) = rx.dequeue() {
                break value;
            }
            if abort.raised() {
                return Err(BenchError::WorkerPanicked("spsc producer"));
            }
            hint::spin_loop();
        };
        check_order(expected, got)?;
    }
    Ok(())
}

/// One SPSC run. The producer sends `source(i)` for each `i` in `0..items`.
fn spsc_once(config: &BenchConfig, source: fn(u64) -> u64) -> Result<u64, BenchError> {
    let (mut tx, mut rx) = spsc::channel::<u64>(config.spsc_capacity)?;
    let items = config.spsc_items;
    let start = Arc::new(Barrier::new(2));
    let abort = Abort::default();

    let consumer = {
        let start = Arc::clone(&start);
        let abort = abort.clone();
        let cpu = config.consumer_cpu;
        spawn("spsc-consumer", move || {
            pin_to_core(cpu);
            start.wait();

            let result = consume_spsc(&mut rx, items, &abort);
            if result.is_err() {
                abort.raise();
            }
            result
        })?
    };

    let producer = {
        let cpu = config.producer_cpu;
        spawn("spsc-producer", move || {
            let _guard = RaiseOnPanic(abort.clone());
            pin_to_core(cpu);
            start.wait();

            let begin = Instant::now();
            for i in 0..items {
                let value = source(i);
                while tx.enqueue(value).is_err() {
                    if abort.raised() {
                        return None;
                    }
                    hint::spin_loop();
                }
            }
            while !tx.is_empty() {
                if abort.raised() {
                    return None;
                }
                hint::spin_loop();
            }
            Some(begin.elapsed())
        })?
    };

    let elapsed = join(producer, "spsc producer")?;
    join(consumer, "spsc consumer")??;

    // The producer only stops early after the consumer failed, handled above.
    Ok(throughput(items, elapsed.unwrap_or_default()))
}

/// Runs the MPSC benchmark `config.runs` times and returns elems/s per run.
///
/// Each of the `config.producers` producers sends `0..config.mpsc_items`; the
/// consumer checks every value arrived exactly once per producer.
pub fn run_mpsc(config: &BenchConfig) -> Result<Vec<u64>, BenchError> {
    info!(
        items_per_producer = config.mpsc_items,
        capacity = config.mpsc_capacity,
        producers = config.producers,
        consumer_cpu = ?config.mpsc_consumer_cpu,
        producer_cpus = ?config.mpsc_producer_cpus,
        runs = config.runs,
        "starting mpsc benchmark"
    );

    (0..config.runs)
        .map(|run| {
            let result = mpsc_once(config, |i| i)?;
            debug!(run, elems_per_sec = result, "mpsc run complete");
            Ok(result)
        })
        .collect()
}

fn consume_mpsc(
    rx: &mut mpsc::Consumer<usize>,
    counts: &mut [usize],
    total: usize,
    abort: &Abort,
) -> Result<(), BenchError> {
    for _ in 0..total {
        let value = loop {
            if let Some(value) = rx.dequeue() {
                break value;
            }
            if abort.raised() {
                return Err(BenchError::WorkerPanicked("mpsc producer"));
            }
            hint::spin_loop();
        };
        tally(counts, value)?;
    }
    Ok(())
}

/// One MPSC run. Each producer sends `source(i)` for each `i` in `0..items`.
fn mpsc_once(config: &BenchConfig, source: fn(usize) -> usize) -> Result<u64, BenchError> {
    let (tx, mut rx) = mpsc::channel::<usize>(config.mpsc_capacity)?;
    let items = config.mpsc_items;
    let producers = config.producers;
    // `BenchConfig::from_lookup` rejects totals that overflow.
    let total = config.mpsc_total().unwrap_or(usize::MAX);
    let start = Arc::new(Barrier::new(producers + 1));
    let abort = Abort::default();

    let consumer = {
        let start = Arc::clone(&start);
        let abort = abort.clone();
        let cpu = config.mpsc_consumer_cpu;
        spawn("mpsc-consumer", move || {
            pin_to_core(cpu);
            let mut counts = vec![0usize; items];
            start.wait();

            let begin = Instant::now();
            let result = consume_mpsc(&mut rx, &mut counts, total, &abort);
            let elapsed = begin.elapsed();
            if result.is_err() {
                abort.raise();
            }
            result.map(|()| (elapsed, counts))
        })?
    };

    let handles = (0..producers)
        .map(|index| {
            let tx = tx.clone();
            let start = Arc::clone(&start);
            let abort = abort.clone();
            let cpu = config.mpsc_producer_cpu(index);
            spawn(&format!("mpsc-producer-{index}"), move || {
                let _guard = RaiseOnPanic(abort.clone());
                pin_to_core(cpu);
                start.wait();

                for i in 0..items {
                    let value = source(i);
                    while tx.enqueue(value).is_err() {
                        if abort.raised() {
                            return;
                        }
                        hint::spin_loop();
                    }
                }
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    drop(tx);

    let mut produced = Ok(());
    for handle in handles {
        if let Err(e) = join(handle, "mpsc producer") {
            produced = Err(e);
        }
    }
    produced?;
    let (elapsed, counts) = join(consumer, "mpsc consumer")??;
    check_counts(&counts, producers)?;

    Ok(throughput(total as u64, elapsed))
}
