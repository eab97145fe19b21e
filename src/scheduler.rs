//! Deferred execution for the producers that drive promises.
//!
//! The promise core never sleeps or spawns; producers that settle "later" get
//! a [`Scheduler`] injected instead. [`ThreadScheduler`] runs jobs for real,
//! [`ManualScheduler`] runs them against a virtual clock for tests.

use crate::{error::Error, promise::Promise};
use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    thread,
    time::Duration,
};
use tracing::trace;

pub type Job = Box<dyn FnOnce() + Send + 'static>;

pub trait Scheduler: Send + Sync {
    /// Arranges for `job` to run once, no earlier than `delay` from now.
    fn schedule(&self, delay: Duration, job: Job);
}

impl<S: Scheduler + ?Sized> Scheduler for Arc<S> {
    fn schedule(&self, delay: Duration, job: Job) {
        (**self).schedule(delay, job)
    }
}

impl<V: Clone + Send + 'static> Promise<V> {
    /// A promise settled by `job`'s result once `scheduler` runs it.
    ///
    /// ```
    /// use promise_chain::{scheduler::ManualScheduler, Promise, State};
    /// use std::time::Duration;
    ///
    /// let scheduler = ManualScheduler::new();
    /// let promise = Promise::after(&scheduler, Duration::from_secs(1), || Ok(true));
    /// assert!(promise.is_pending());
    /// scheduler.advance(Duration::from_secs(1));
    /// assert!(matches!(promise.state(), State::Fulfilled(true)));
    /// ```
    pub fn after<S, F>(scheduler: &S, delay: Duration, job: F) -> Self
    where
        S: Scheduler + ?Sized,
        F: FnOnce() -> Result<V, Error> + Send + 'static,
    {
        Self::new(move |resolver| {
            scheduler.schedule(
                delay,
                Box::new(move || {
                    let _ = resolver.settle_with(job());
                }),
            );
        })
    }
}

/// Runs every job on its own thread after sleeping for its delay.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadScheduler;

impl Scheduler for ThreadScheduler {
    fn schedule(&self, delay: Duration, job: Job) {
        trace!(?delay, "spawning deferred job");
        thread::spawn(move || {
            if !delay.is_zero() {
                thread::sleep(delay);
            }
            job();
        });
    }
}

/// A scheduler with a virtual clock. Nothing runs until the clock is moved
/// with [`advance`](ManualScheduler::advance) or
/// [`run_until_idle`](ManualScheduler::run_until_idle).
///
/// Clones share the same clock and queue.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    queue: Arc<Mutex<Queue>>,
}

#[derive(Default)]
struct Queue {
    now: Duration,
    next_seq: u64,
    jobs: Vec<Entry>,
}

struct Entry {
    due: Duration,
    seq: u64,
    job: Job,
}

impl Queue {
    // Earliest due job, ties broken by scheduling order.
    fn pop_due(&mut self, deadline: Duration) -> Option<Entry> {
        let index = self
            .jobs
            .iter()
            .enumerate()
            .filter(|(_, entry)| entry.due <= deadline)
            .min_by_key(|(_, entry)| (entry.due, entry.seq))
            .map(|(index, _)| index)?;
        Some(self.jobs.remove(index))
    }
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Queue> {
        self.queue.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Time elapsed on the virtual clock.
    pub fn now(&self) -> Duration {
        self.lock().now
    }

    pub fn pending_jobs(&self) -> usize {
        self.lock().jobs.len()
    }

    /// Moves the clock forward by `by`, running every job that falls due.
    /// Returns how many jobs ran, including ones scheduled by those jobs.
    pub fn advance(&self, by: Duration) -> usize {
        let deadline = self.now().saturating_add(by);
        let mut ran = 0;
        loop {
            let entry = {
                let mut queue = self.lock();
                match queue.pop_due(deadline) {
                    Some(entry) => {
                        queue.now = queue.now.max(entry.due);
                        entry
                    }
                    None => {
                        queue.now = deadline;
                        break;
                    }
                }
            };
            trace!(due = ?entry.due, "running scheduled job");
            (entry.job)();
            ran += 1;
        }
        ran
    }

    /// Runs jobs in due order, jumping the clock to each one, until the queue
    /// is empty.
    pub fn run_until_idle(&self) -> usize {
        let mut ran = 0;
        loop {
            let next = self.lock().jobs.iter().map(|entry| entry.due).min();
            let Some(due) = next else {
                return ran;
            };
            let by = due.saturating_sub(self.now());
            ran += self.advance(by);
        }
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&self, delay: Duration, job: Job) {
        let mut queue = self.lock();
        let due = queue.now.saturating_add(delay);
        let seq = queue.next_seq;
        queue.next_seq += 1;
        trace!(?due, seq, "queued job");
        queue.jobs.push(Entry { due, seq, job });
    }
}
