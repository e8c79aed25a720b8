#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Bounded-channel worker pool for embarrassingly parallel batch runs.
//!
//! A run has three roles:
//!
//! - **Producer**: one thread that enumerates the workload lazily and
//!   pushes items through a [`Feeder`]. Items are grouped into batches
//!   and sent over a bounded channel, so a fast producer blocks once the
//!   workers fall behind.
//! - **Workers**: a fixed number of threads. Each builds its own context
//!   once (scratch buffers, handles to read-only data) and then processes
//!   batches until the task channel is closed and drained.
//! - **Sink**: the calling thread. It receives one result per item, in
//!   completion order, and hands it to the sink closure (typically a CSV
//!   writer).
//!
//! Shutdown uses closed-channel semantics only. When the producer returns,
//! the task channel closes; workers drain it and exit; the result channel
//! closes when the last worker exits; the sink loop ends. Any error from
//! the producer, a worker, or the sink aborts the run: the sink drops its
//! receiver so blocked workers and the producer see a disconnected channel
//! and exit, and the first error is returned.

pub mod progress;

use std::num::NonZeroUsize;

use crossbeam_channel::{Receiver, Sender, bounded};

use progress::ProgressCallback;

/// Items per batch for queue-style runs.
pub const DEFAULT_BATCH_SIZE: usize = 1;

/// Capacity of both the task and the result channel.
pub const DEFAULT_QUEUE_CAPACITY: usize = 5000;

/// Errors raised by the pool itself (not by the work it runs).
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    /// The consuming side went away before all items were delivered.
    #[error("Worker pool disconnected before all work was delivered")]
    Disconnected,

    /// A configuration value was out of range.
    #[error("Invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// The producer thread panicked.
    #[error("Producer thread panicked")]
    ProducerPanicked,
}

/// Sizing for a pool run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Number of worker threads.
    pub workers: usize,
    /// Items grouped into one task message.
    pub batch_size: usize,
    /// Bound on queued task batches and on queued results.
    pub queue_capacity: usize,
}

impl PoolConfig {
    fn validate(&self) -> Result<(), PoolError> {
        if self.workers == 0 {
            return Err(PoolError::InvalidConfig(
                "workers must be at least 1".to_string(),
            ));
        }
        if self.batch_size == 0 {
            return Err(PoolError::InvalidConfig(
                "batch_size must be at least 1".to_string(),
            ));
        }
        if self.queue_capacity == 0 {
            return Err(PoolError::InvalidConfig(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            batch_size: DEFAULT_BATCH_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

/// Number of hardware threads, or 1 if that cannot be determined.
#[must_use]
pub fn default_workers() -> usize {
    std::thread::available_parallelism().map_or(1, NonZeroUsize::get)
}

/// Counts reported by a finished run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStats {
    /// Items pushed by the producer.
    pub produced: u64,
    /// Results accepted by the sink.
    pub completed: u64,
}

/// Producer-side handle that batches items into the task channel.
pub struct Feeder<I> {
    tx: Sender<Vec<I>>,
    batch: Vec<I>,
    batch_size: usize,
    pushed: u64,
}

impl<I> Feeder<I> {
    fn new(tx: Sender<Vec<I>>, batch_size: usize) -> Self {
        Self {
            tx,
            batch: Vec::with_capacity(batch_size),
            batch_size,
            pushed: 0,
        }
    }

    /// Queues one item, blocking while the task channel is full.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Disconnected`] once every worker has exited,
    /// which happens when the run is being aborted. Producers should
    /// propagate it and stop.
    pub fn push(&mut self, item: I) -> Result<(), PoolError> {
        self.batch.push(item);
        self.pushed += 1;
        if self.batch.len() >= self.batch_size {
            self.flush()
        } else {
            Ok(())
        }
    }

    /// Items pushed so far.
    #[must_use]
    pub const fn pushed(&self) -> u64 {
        self.pushed
    }

    fn flush(&mut self) -> Result<(), PoolError> {
        if self.batch.is_empty() {
            return Ok(());
        }
        let batch = std::mem::replace(&mut self.batch, Vec::with_capacity(self.batch_size));
        self.tx.send(batch).map_err(|_| PoolError::Disconnected)
    }
}

/// Runs a producer, `config.workers` workers, and a sink to completion.
///
/// - `produce` enumerates the workload into the [`Feeder`].
/// - `init` builds the per-worker context; it is called once per worker
///   with the worker's 0-based id.
/// - `work` turns one item into one result.
/// - `sink` consumes results on the calling thread, in completion order.
///
/// `progress` advances by one for every result the sink accepts.
///
/// # Errors
///
/// Returns the first error raised by `produce`, `init`, `work`, or
/// `sink`, or a [`PoolError`] if the configuration is invalid or the
/// producer panicked.
///
/// # Panics
///
/// Re-raises a panic from a worker thread once all threads have stopped.
#[allow(clippy::needless_pass_by_value)]
pub fn run<I, C, R, E, P, N, W, S>(
    config: &PoolConfig,
    produce: P,
    init: N,
    work: W,
    mut sink: S,
    progress: &dyn ProgressCallback,
) -> Result<PoolStats, E>
where
    I: Send,
    R: Send,
    E: Send + From<PoolError>,
    P: FnOnce(&mut Feeder<I>) -> Result<(), E> + Send,
    N: Fn(usize) -> Result<C, E> + Sync,
    W: Fn(&mut C, I) -> Result<R, E> + Sync,
    S: FnMut(R) -> Result<(), E>,
{
    config.validate()?;

    let (task_tx, task_rx) = bounded::<Vec<I>>(config.queue_capacity);
    let (result_tx, result_rx) = bounded::<Result<R, E>>(config.queue_capacity);
    let batch_size = config.batch_size;

    log::debug!(
        "Starting pool: {} workers, batch size {}, queue capacity {}",
        config.workers,
        config.batch_size,
        config.queue_capacity
    );

    std::thread::scope(|scope| -> Result<PoolStats, E> {
        let producer = scope.spawn(move || -> Result<u64, E> {
            let mut feeder = Feeder::new(task_tx, batch_size);
            produce(&mut feeder)?;
            feeder.flush()?;
            Ok(feeder.pushed())
        });

        let init = &init;
        let work = &work;
        for worker_id in 0..config.workers {
            let tasks = task_rx.clone();
            let results = result_tx.clone();
            scope.spawn(move || worker_loop(worker_id, &tasks, &results, init, work));
        }
        // Only workers hold these now, so the channels close when they exit.
        drop(task_rx);
        drop(result_tx);

        let mut completed = 0_u64;
        let mut failure: Option<E> = None;

        for result in &result_rx {
            match result.and_then(&mut sink) {
                Ok(()) => {
                    completed += 1;
                    progress.inc(1);
                }
                Err(e) => {
                    failure = Some(e);
                    break;
                }
            }
        }
        drop(result_rx);

        let produced = match producer.join() {
            Ok(Ok(produced)) => produced,
            Ok(Err(e)) => {
                if failure.is_none() {
                    failure = Some(e);
                }
                0
            }
            Err(_) => {
                if failure.is_none() {
                    failure = Some(PoolError::ProducerPanicked.into());
                }
                0
            }
        };

        if let Some(e) = failure {
            log::debug!("Pool aborted after {completed} results");
            return Err(e);
        }

        log::debug!("Pool finished: {produced} produced, {completed} completed");
        Ok(PoolStats {
            produced,
            completed,
        })
    })
}

fn worker_loop<I, C, R, E, N, W>(
    worker_id: usize,
    tasks: &Receiver<Vec<I>>,
    results: &Sender<Result<R, E>>,
    init: &N,
    work: &W,
) where
    N: Fn(usize) -> Result<C, E>,
    W: Fn(&mut C, I) -> Result<R, E>,
{
    let mut ctx = match init(worker_id) {
        Ok(ctx) => ctx,
        Err(e) => {
            results.send(Err(e)).ok();
            return;
        }
    };

    let mut handled = 0_u64;
    for batch in tasks {
        for item in batch {
            let result = work(&mut ctx, item);
            let failed = result.is_err();
            if results.send(result).is_err() || failed {
                log::debug!("Worker {worker_id} stopping after {handled} items");
                return;
            }
            handled += 1;
        }
    }

    log::trace!("Worker {worker_id} drained after {handled} items");
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::progress::NullProgress;

    #[derive(Debug)]
    enum TestError {
        Pool(PoolError),
        Bad(u64),
    }

    impl From<PoolError> for TestError {
        fn from(e: PoolError) -> Self {
            Self::Pool(e)
        }
    }

    fn config(workers: usize, batch_size: usize, queue_capacity: usize) -> PoolConfig {
        PoolConfig {
            workers,
            batch_size,
            queue_capacity,
        }
    }

    #[test]
    fn processes_every_item_once() {
        let mut seen = Vec::new();
        let stats = run(
            &config(4, 7, 3),
            |feeder: &mut Feeder<u64>| {
                for i in 0..1000 {
                    feeder.push(i)?;
                }
                Ok::<(), TestError>(())
            },
            |_| Ok(()),
            |_, item| Ok(item * 2),
            |r| {
                seen.push(r);
                Ok(())
            },
            &NullProgress,
        )
        .unwrap();

        assert_eq!(stats.produced, 1000);
        assert_eq!(stats.completed, 1000);
        seen.sort_unstable();
        let expected: Vec<u64> = (0..1000).map(|i| i * 2).collect();
        assert_eq!(seen, expected);
    }

    #[test]
    fn initializes_each_worker_once() {
        let inits = AtomicUsize::new(0);
        let stats = run(
            &config(3, 1, 10),
            |feeder: &mut Feeder<u32>| {
                for i in 0..50 {
                    feeder.push(i)?;
                }
                Ok::<(), TestError>(())
            },
            |worker_id| {
                inits.fetch_add(1, Ordering::SeqCst);
                Ok(worker_id)
            },
            |_ctx, item| Ok(item),
            |_| Ok(()),
            &NullProgress,
        )
        .unwrap();

        assert_eq!(stats.completed, 50);
        assert_eq!(inits.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn worker_context_is_reused_across_items() {
        let mut counts = Vec::new();
        run(
            &config(1, 4, 2),
            |feeder: &mut Feeder<u8>| {
                for _ in 0..5 {
                    feeder.push(0)?;
                }
                Ok::<(), TestError>(())
            },
            |_| Ok(0_usize),
            |calls, _| {
                *calls += 1;
                Ok(*calls)
            },
            |n| {
                counts.push(n);
                Ok(())
            },
            &NullProgress,
        )
        .unwrap();

        assert_eq!(counts, [1, 2, 3, 4, 5]);
    }

    #[test]
    fn slow_sink_throttles_the_producer() {
        let cfg = config(2, 1, 3);
        let pushed = AtomicU64::new(0);
        let mut completed = 0_u64;
        let mut max_in_flight = 0_u64;

        run(
            &cfg,
            |feeder: &mut Feeder<u32>| {
                for i in 0..2000 {
                    feeder.push(i)?;
                    pushed.fetch_add(1, Ordering::SeqCst);
                }
                Ok::<(), TestError>(())
            },
            |_| Ok(()),
            |_, item| Ok(item),
            |_| {
                let in_flight = pushed.load(Ordering::SeqCst).saturating_sub(completed);
                max_in_flight = max_in_flight.max(in_flight);
                std::thread::sleep(Duration::from_micros(200));
                completed += 1;
                Ok(())
            },
            &NullProgress,
        )
        .unwrap();

        assert_eq!(completed, 2000);
        // Task queue, result queue, one item per worker, one in the sink.
        let bound = 2 * cfg.queue_capacity * cfg.batch_size + cfg.workers + 1;
        assert!(
            max_in_flight <= bound as u64,
            "{max_in_flight} items in flight, bound {bound}"
        );
    }

    #[derive(Default)]
    struct CountingProgress {
        total: AtomicU64,
        done: AtomicU64,
        finished: AtomicUsize,
    }

    impl ProgressCallback for CountingProgress {
        fn set_total(&self, total: u64) {
            self.total.store(total, Ordering::SeqCst);
        }

        fn inc(&self, delta: u64) {
            self.done.fetch_add(delta, Ordering::SeqCst);
        }

        fn finish(&self, _msg: String) {
            self.finished.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn progress_advances_once_per_sunk_result() {
        let progress = CountingProgress::default();
        let mut accepted = 0_u64;
        let result = run(
            &config(3, 2, 4),
            |feeder: &mut Feeder<u64>| {
                for i in 0..100 {
                    feeder.push(i)?;
                }
                Ok::<(), TestError>(())
            },
            |_| Ok(()),
            |_, item| Ok(item),
            |_| {
                accepted += 1;
                if accepted == 40 {
                    Err(TestError::Bad(40))
                } else {
                    Ok(())
                }
            },
            &progress,
        );

        assert!(matches!(result, Err(TestError::Bad(40))));
        assert_eq!(progress.done.load(Ordering::SeqCst), 39);
        assert_eq!(progress.total.load(Ordering::SeqCst), 0);
        assert_eq!(progress.finished.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn work_error_aborts_without_hanging() {
        let result = run(
            &config(2, 1, 2),
            |feeder: &mut Feeder<u64>| {
                for i in 0..1_000_000 {
                    feeder.push(i)?;
                }
                Ok::<(), TestError>(())
            },
            |_| Ok(()),
            |_, item| {
                if item == 10 {
                    Err(TestError::Bad(item))
                } else {
                    Ok(item)
                }
            },
            |_| Ok(()),
            &NullProgress,
        );

        assert!(matches!(result, Err(TestError::Bad(10))));
    }

    #[test]
    fn producer_error_is_returned_after_drain() {
        let mut completed = 0;
        let result = run(
            &config(2, 1, 4),
            |feeder: &mut Feeder<u64>| {
                for i in 0..5 {
                    feeder.push(i)?;
                }
                Err(TestError::Bad(99))
            },
            |_| Ok(()),
            |_, item| Ok(item),
            |_| {
                completed += 1;
                Ok(())
            },
            &NullProgress,
        );

        assert!(matches!(result, Err(TestError::Bad(99))));
        assert_eq!(completed, 5);
    }

    #[test]
    fn sink_error_aborts() {
        let result = run(
            &config(2, 3, 1),
            |feeder: &mut Feeder<u64>| {
                for i in 0..10_000 {
                    feeder.push(i)?;
                }
                Ok::<(), TestError>(())
            },
            |_| Ok(()),
            |_, item| Ok(item),
            |_| Err(TestError::Bad(0)),
            &NullProgress,
        );

        assert!(matches!(result, Err(TestError::Bad(0))));
    }

    #[test]
    fn init_error_aborts() {
        let result = run(
            &config(2, 1, 1),
            |feeder: &mut Feeder<u64>| {
                for i in 0..100 {
                    feeder.push(i)?;
                }
                Ok::<(), TestError>(())
            },
            |worker_id| {
                if worker_id == 0 {
                    Err(TestError::Bad(7))
                } else {
                    Ok(())
                }
            },
            |_, item| Ok(item),
            |_| Ok(()),
            &NullProgress,
        );

        assert!(matches!(result, Err(TestError::Bad(7))));
    }

    #[test]
    fn rejects_zero_workers() {
        let result = run(
            &config(0, 1, 1),
            |_: &mut Feeder<u8>| Ok::<(), TestError>(()),
            |_| Ok(()),
            |_, item| Ok(item),
            |_| Ok(()),
            &NullProgress,
        );

        assert!(matches!(
            result,
            Err(TestError::Pool(PoolError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn empty_workload_finishes() {
        let stats = run(
            &PoolConfig::default(),
            |_: &mut Feeder<u8>| Ok::<(), TestError>(()),
            |_| Ok(()),
            |_, item| Ok(item),
            |_| Ok(()),
            &NullProgress,
        )
        .unwrap();

        assert_eq!(stats, PoolStats::default());
    }
}
