//! End-to-end scenarios for the priority worker pool

use parking_lot::Mutex;
use priority_thread_pool::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::{Duration, Instant};

/// Poll until `check` passes or the deadline expires
fn wait_until(deadline: Duration, check: impl Fn() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < deadline {
        if check() {
            return true;
        }
        thread::sleep(Duration::from_millis(5));
    }
    check()
}

#[test]
fn single_normal_worker_runs_jobs_in_order() {
    // S1: three NORMAL jobs on one NORMAL worker execute 1, 2, 3.
    let pool = ThreadPool::new();
    pool.add_worker(Arc::new(Worker::new(Priority::Normal)))
        .expect("Failed to add worker");
    pool.set_worker_priority_counts();

    let order = Arc::new(Mutex::new(Vec::new()));
    for id in [1u64, 2, 3] {
        let order_clone = Arc::clone(&order);
        pool.add_job(Job::from_fn(id, Priority::Normal, move || {
            order_clone.lock().push(id);
        }));
    }

    pool.stop_pool(true, Duration::ZERO);

    assert_eq!(*order.lock(), vec![1, 2, 3]);
    assert_eq!(pool.pending_jobs(), 0);
}

#[test]
fn mixed_priorities_dispatch_in_parallel() {
    // S2: one worker per class; three 150 ms jobs of distinct priorities
    // are spread one per worker and finish in parallel.
    let pool = ThreadPool::new();
    let high = Arc::new(Worker::new(Priority::High));
    let normal = Arc::new(Worker::new(Priority::Normal));
    let low = Arc::new(Worker::new(Priority::Low));
    for worker in [&high, &normal, &low] {
        pool.add_worker(Arc::clone(worker)).expect("Failed to add worker");
    }
    pool.set_worker_priority_counts();

    let completed = Arc::new(AtomicUsize::new(0));
    let start = Instant::now();
    for (id, priority) in [
        (300u64, Priority::Low),
        (200, Priority::Normal),
        (100, Priority::High),
    ] {
        let completed_clone = Arc::clone(&completed);
        pool.add_job(Job::from_fn(id, priority, move || {
            thread::sleep(Duration::from_millis(150));
            completed_clone.fetch_add(1, Ordering::SeqCst);
        }));
    }

    assert!(
        wait_until(Duration::from_millis(400), || completed
            .load(Ordering::SeqCst)
            == 3),
        "jobs did not finish in parallel: {} of 3 done after {:?}",
        completed.load(Ordering::SeqCst),
        start.elapsed()
    );

    // One job per worker: no worker sat idle while another ran two. The
    // dispatch counter trails the completion count by a hair, so poll.
    for worker in [&high, &normal, &low] {
        let stats = worker.stats();
        assert!(
            wait_until(Duration::from_millis(200), || stats.completed() == 1),
            "worker {} completed {} jobs",
            worker.id(),
            stats.completed()
        );
    }

    pool.stop_pool(true, Duration::ZERO);
}

#[test]
fn demoted_jobs_merge_into_normal_fifo() {
    // S3: with only a NORMAL worker registered, HIGH and LOW submissions
    // are demoted into the NORMAL bucket and keep submission order.
    let pool = ThreadPool::new();
    pool.add_worker(Arc::new(Worker::new(Priority::Normal)))
        .expect("Failed to add worker");
    pool.set_worker_priority_counts();

    let order = Arc::new(Mutex::new(Vec::new()));
    for (id, priority) in [(42u64, Priority::High), (43, Priority::Low)] {
        let order_clone = Arc::clone(&order);
        pool.add_job(Job::from_fn(id, priority, move || {
            order_clone.lock().push(id);
        }));
    }

    pool.stop_pool(true, Duration::ZERO);

    assert_eq!(*order.lock(), vec![42, 43]);
}

#[test]
fn stale_counts_still_keep_low_job_runnable() {
    // S4: HIGH worker only and no counts refresh. The LOW job demotes to
    // NORMAL, which the HIGH worker's match list covers, so it runs.
    let pool = ThreadPool::new();
    pool.add_worker(Arc::new(Worker::new(Priority::High)))
        .expect("Failed to add worker");

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = Arc::clone(&ran);
    pool.add_job(Job::from_fn(10, Priority::Low, move || {
        ran_clone.fetch_add(1, Ordering::SeqCst);
    }));

    assert!(wait_until(Duration::from_secs(1), || ran.load(Ordering::SeqCst) == 1));

    pool.stop_pool(true, Duration::ZERO);
}

#[test]
fn shutdown_drains_queue_when_untimed() {
    // S5: stop_pool(true, 0) waits for all five 100 ms jobs.
    let pool = ThreadPool::new();
    pool.add_worker(Arc::new(Worker::new(Priority::Normal)))
        .expect("Failed to add worker");
    pool.set_worker_priority_counts();

    let completed = Arc::new(AtomicUsize::new(0));
    for id in 1..=5u64 {
        let completed_clone = Arc::clone(&completed);
        pool.add_job(Job::from_fn(id, Priority::Normal, move || {
            thread::sleep(Duration::from_millis(100));
            completed_clone.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let start = Instant::now();
    pool.stop_pool(true, Duration::ZERO);
    let elapsed = start.elapsed();

    assert_eq!(completed.load(Ordering::SeqCst), 5);
    assert_eq!(pool.pending_jobs(), 0);
    // Five serial 100 ms jobs: the drain cannot beat the work itself, and
    // the coarse poll should not stretch it far past it either.
    assert!(elapsed >= Duration::from_millis(300), "drained too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(2), "drain took too long: {elapsed:?}");
}

#[test]
fn shutdown_times_out_and_leaves_work() {
    // S6: ten 1 s jobs on one worker, stop_pool(true, 500 ms) gives up
    // after the timeout; the in-flight job finishes, the rest stay queued.
    let pool = ThreadPool::new();
    pool.add_worker(Arc::new(Worker::new(Priority::Normal)))
        .expect("Failed to add worker");
    pool.set_worker_priority_counts();

    let completed = Arc::new(AtomicUsize::new(0));
    for id in 1..=10u64 {
        let completed_clone = Arc::clone(&completed);
        pool.add_job(Job::from_fn(id, Priority::Normal, move || {
            thread::sleep(Duration::from_secs(1));
            completed_clone.fetch_add(1, Ordering::SeqCst);
        }));
    }

    let start = Instant::now();
    pool.stop_pool(true, Duration::from_millis(500));
    let elapsed = start.elapsed();

    // Timeout plus the join window for the job that was already running.
    assert!(elapsed < Duration::from_secs(3), "stop took too long: {elapsed:?}");
    assert!(completed.load(Ordering::SeqCst) < 10);
    assert!(pool.pending_jobs() >= 8, "too few jobs left: {}", pool.pending_jobs());
}

#[test]
fn each_job_executes_at_most_once() {
    let pool = ThreadPool::with_workers(4).expect("Failed to create pool");

    let cells: Arc<Vec<AtomicUsize>> =
        Arc::new((0..100).map(|_| AtomicUsize::new(0)).collect());

    for i in 0..100 {
        let cells_clone = Arc::clone(&cells);
        pool.add_job(Job::normal(i as u64, move || {
            cells_clone[i].fetch_add(1, Ordering::SeqCst);
        }));
    }

    pool.stop_pool(true, Duration::ZERO);

    for (i, cell) in cells.iter().enumerate() {
        assert_eq!(cell.load(Ordering::SeqCst), 1, "job {i} ran a wrong number of times");
    }
}

#[test]
fn idle_worker_picks_up_matching_work_promptly() {
    let pool = ThreadPool::new();
    pool.add_worker(Arc::new(Worker::new(Priority::Low)))
        .expect("Failed to add worker");
    pool.set_worker_priority_counts();

    // Let the worker park first.
    thread::sleep(Duration::from_millis(50));

    let ran = Arc::new(AtomicUsize::new(0));
    let ran_clone = Arc::clone(&ran);
    pool.add_job(Job::from_fn(1, Priority::Low, move || {
        ran_clone.fetch_add(1, Ordering::SeqCst);
    }));

    assert!(
        wait_until(Duration::from_millis(500), || ran.load(Ordering::SeqCst) == 1),
        "parked worker was not woken by the push"
    );

    pool.stop_pool(true, Duration::ZERO);
}

#[test]
fn stopping_twice_changes_nothing() {
    let pool = ThreadPool::with_workers(2).expect("Failed to create pool");

    let completed = Arc::new(AtomicUsize::new(0));
    for id in 0..6u64 {
        let completed_clone = Arc::clone(&completed);
        pool.add_job(Job::normal(id, move || {
            completed_clone.fetch_add(1, Ordering::SeqCst);
        }));
    }

    pool.stop_pool(true, Duration::ZERO);
    let after_first = completed.load(Ordering::SeqCst);
    assert_eq!(after_first, 6);
    assert_eq!(pool.worker_count(), 0);

    pool.stop_pool(true, Duration::ZERO);
    assert_eq!(completed.load(Ordering::SeqCst), after_first);
    assert_eq!(pool.worker_count(), 0);
}

#[test]
fn jobs_queued_before_workers_arrive_still_run() {
    // Mis-ordered configuration: submissions queue until a worker shows up.
    let pool = ThreadPool::new();

    let completed = Arc::new(AtomicUsize::new(0));
    for id in 0..3u64 {
        let completed_clone = Arc::clone(&completed);
        pool.add_job(Job::normal(id, move || {
            completed_clone.fetch_add(1, Ordering::SeqCst);
        }));
    }
    assert_eq!(pool.pending_jobs(), 3);

    pool.add_worker(Arc::new(Worker::new(Priority::Normal)))
        .expect("Failed to add worker");
    pool.set_worker_priority_counts();
    pool.notify_wakeup_workers();

    assert!(wait_until(Duration::from_secs(1), || completed
        .load(Ordering::SeqCst)
        == 3));

    pool.stop_pool(true, Duration::ZERO);
}

/// Work action that resubmits follow-up jobs through the queue handle it
/// received at enqueue time.
struct ChainedWork {
    remaining: u32,
    counter: Arc<AtomicUsize>,
    queue: Weak<JobQueue>,
}

impl Work for ChainedWork {
    fn execute(&mut self) -> Result<()> {
        self.counter.fetch_add(1, Ordering::SeqCst);

        if self.remaining > 0 {
            if let Some(queue) = self.queue.upgrade() {
                queue.push(Job::new(
                    0,
                    Priority::Normal,
                    ChainedWork {
                        remaining: self.remaining - 1,
                        counter: Arc::clone(&self.counter),
                        queue: Weak::new(),
                    },
                ));
            }
        }

        Ok(())
    }

    fn label(&self) -> &str {
        "chained"
    }

    fn bind_queue(&mut self, queue: Weak<JobQueue>) {
        self.queue = queue;
    }
}

#[test]
fn jobs_can_resubmit_from_inside_work() {
    let pool = ThreadPool::with_workers(1).expect("Failed to create pool");

    let counter = Arc::new(AtomicUsize::new(0));
    pool.add_job(Job::new(
        1,
        Priority::Normal,
        ChainedWork {
            remaining: 4,
            counter: Arc::clone(&counter),
            queue: Weak::new(),
        },
    ));

    // The chain root plus four follow-ups.
    assert!(wait_until(Duration::from_secs(2), || counter
        .load(Ordering::SeqCst)
        == 5));

    pool.stop_pool(true, Duration::ZERO);
}

#[test]
fn submit_round_trip_with_mixed_priorities() {
    let pool = ThreadPool::new();
    for priority in [Priority::High, Priority::Normal, Priority::Low] {
        pool.add_worker(Arc::new(Worker::new(priority)))
            .expect("Failed to add worker");
    }
    pool.set_worker_priority_counts();

    let futures: Vec<_> = (0..12)
        .map(|i| {
            let priority = match i % 3 {
                0 => Priority::High,
                1 => Priority::Normal,
                _ => Priority::Low,
            };
            pool.submit(priority, move || i * 2)
        })
        .collect();

    for (i, future) in futures.into_iter().enumerate() {
        assert_eq!(future.wait().expect("job should succeed"), i * 2);
    }

    pool.stop_pool(true, Duration::ZERO);
}
