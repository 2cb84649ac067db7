//! Interval scheduler for the daemon.
//!
//! Jobs are keyed by identifier; installing under an existing identifier
//! cancels the previous job first. The action runs on the blocking pool —
//! the sync pipeline is sequential blocking I/O — and a graceful
//! [`Scheduler::shutdown`] waits for any in-flight tick to finish before
//! returning. Missed ticks are skipped, never bursted.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

struct Job {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Fires supplied actions on fixed intervals, each after one delayed
/// initial run.
#[derive(Default)]
pub struct Scheduler {
    jobs: HashMap<String, Job>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install (or replace) the job registered under `id`.
    ///
    /// The action first fires once after `initial_delay`, then on every
    /// `every` tick until cancelled.
    pub fn schedule<F>(&mut self, id: &str, every: Duration, initial_delay: Duration, action: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.cancel(id);

        let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
        let action = Arc::new(action);
        let label = id.to_string();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = shutdown_rx.changed() => return,
                _ = tokio::time::sleep(initial_delay) => {}
            }
            run_tick(&label, action.clone()).await;

            let mut interval = tokio::time::interval(every);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            interval.tick().await; // consume the immediate first tick

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => break,
                    _ = interval.tick() => {
                        run_tick(&label, action.clone()).await;
                    }
                }
            }
        });

        self.jobs.insert(
            id.to_string(),
            Job {
                shutdown: shutdown_tx,
                handle,
            },
        );
    }

    /// Signal the job registered under `id` to stop. Returns whether a job
    /// existed. The job's in-flight tick, if any, still runs to completion
    /// in the background; use [`Scheduler::shutdown`] to wait for it.
    pub fn cancel(&mut self, id: &str) -> bool {
        match self.jobs.remove(id) {
            Some(job) => {
                let _ = job.shutdown.send(true);
                true
            }
            None => false,
        }
    }

    pub fn job_count(&self) -> usize {
        self.jobs.len()
    }

    /// Graceful stop: signal every job and wait for each task — including
    /// any tick currently executing — to finish.
    pub async fn shutdown(&mut self) {
        let jobs: Vec<Job> = self.jobs.drain().map(|(_, job)| job).collect();
        for job in &jobs {
            let _ = job.shutdown.send(true);
        }
        for job in jobs {
            let _ = job.handle.await;
        }
    }
}

/// One tick: run the blocking action to completion on the blocking pool.
/// The select loops above only see the shutdown signal *between* ticks, so
/// an in-flight action is never torn down.
async fn run_tick(label: &str, action: Arc<dyn Fn() + Send + Sync>) {
    let result = tokio::task::spawn_blocking(move || action()).await;
    if let Err(err) = result {
        tracing::error!(job = label, error = %err, "scheduled tick panicked");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn job_fires_initial_run_and_interval_ticks() {
        let counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();
        let c = counter.clone();
        scheduler.schedule(
            "sync",
            Duration::from_millis(25),
            Duration::from_millis(5),
            move || {
                c.fetch_add(1, Ordering::SeqCst);
            },
        );

        tokio::time::sleep(Duration::from_millis(120)).await;
        scheduler.shutdown().await;

        let fired = counter.load(Ordering::SeqCst);
        assert!(fired >= 3, "expected initial run plus ticks, got {fired}");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn reinstalling_under_the_same_id_cancels_the_old_job() {
        let old_counter = Arc::new(AtomicUsize::new(0));
        let new_counter = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();

        // Old job would first fire far in the future.
        let old = old_counter.clone();
        scheduler.schedule(
            "sync",
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            move || {
                old.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert_eq!(scheduler.job_count(), 1);

        let new = new_counter.clone();
        scheduler.schedule(
            "sync",
            Duration::from_millis(20),
            Duration::from_millis(1),
            move || {
                new.fetch_add(1, Ordering::SeqCst);
            },
        );
        assert_eq!(scheduler.job_count(), 1, "same id replaces, never stacks");

        tokio::time::sleep(Duration::from_millis(80)).await;
        scheduler.shutdown().await;

        assert_eq!(old_counter.load(Ordering::SeqCst), 0);
        assert!(new_counter.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn shutdown_waits_for_the_in_flight_tick() {
        let started = Arc::new(AtomicUsize::new(0));
        let finished = Arc::new(AtomicUsize::new(0));
        let mut scheduler = Scheduler::new();

        let s = started.clone();
        let f = finished.clone();
        scheduler.schedule(
            "slow",
            Duration::from_secs(3600),
            Duration::from_millis(1),
            move || {
                s.fetch_add(1, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(80));
                f.fetch_add(1, Ordering::SeqCst);
            },
        );

        // Let the initial run start, then stop while it is mid-flight.
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(started.load(Ordering::SeqCst), 1, "tick should be running");
        scheduler.shutdown().await;

        assert_eq!(
            finished.load(Ordering::SeqCst),
            1,
            "shutdown must block until the tick completes"
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancel_reports_whether_a_job_existed() {
        let mut scheduler = Scheduler::new();
        scheduler.schedule(
            "sync",
            Duration::from_secs(3600),
            Duration::from_secs(3600),
            || {},
        );
        assert!(scheduler.cancel("sync"));
        assert!(!scheduler.cancel("sync"));
        assert_eq!(scheduler.job_count(), 0);
    }
}
