//! Bounded FIFO admission for translation jobs.
//!
//! At most `limit` jobs run at once; the rest wait in submission order. Each
//! job's outcome is routed back to the caller through its own [`Ticket`].

use std::{
    collections::VecDeque,
    future::Future,
    pin::Pin,
    sync::{Arc, Mutex, MutexGuard},
};

use tokio::sync::oneshot;

use crate::{errors::Error, Result};

pub const DEFAULT_CONCURRENCY: usize = 3;

type Job = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

#[derive(Default)]
struct QueueState {
    active: usize,
    waiting: VecDeque<Job>,
}

/// Cheap to clone; clones share the same slots.
#[derive(Clone)]
pub struct ConcurrencyQueue {
    limit: usize,
    state: Arc<Mutex<QueueState>>,
}

/// Completion handle returned by [`ConcurrencyQueue::submit`].
pub struct Ticket<T> {
    rx: oneshot::Receiver<T>,
}

impl<T> Ticket<T> {
    /// Wait for the job. Fails only if the job panicked.
    pub async fn wait(self) -> Result<T> {
        self.rx
            .await
            .map_err(|_| Error::External("queued task aborted before completing".to_string()))
    }
}

impl ConcurrencyQueue {
    pub fn new(limit: usize) -> Self {
        Self {
            limit: limit.max(1),
            state: Arc::new(Mutex::new(QueueState::default())),
        }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn active(&self) -> usize {
        self.lock().active
    }

    pub fn waiting(&self) -> usize {
        self.lock().waiting.len()
    }

    /// Enqueue `task`. It starts immediately if a slot is free, otherwise after
    /// every job submitted before it has been started.
    ///
    /// Must be called from within a tokio runtime.
    pub fn submit<F, Fut, T>(&self, task: F) -> Ticket<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let job: Job = Box::pin(async move {
            let out = task().await;
            // Caller may have dropped the ticket.
            let _ = tx.send(out);
        });

        let start_now = {
            let mut st = self.lock();
            if st.active < self.limit {
                st.active += 1;
                Some(job)
            } else {
                st.waiting.push_back(job);
                None
            }
        };

        if let Some(job) = start_now {
            self.spawn_slot(job);
        }
        Ticket { rx }
    }

    fn spawn_slot(&self, job: Job) {
        let guard = SlotGuard {
            queue: self.clone(),
        };
        tokio::spawn(async move {
            let _guard = guard;
            job.await;
        });
    }

    /// Hand the freed slot to the next waiter, or release it.
    fn release_slot(&self) {
        let next = {
            let mut st = self.lock();
            match st.waiting.pop_front() {
                Some(job) => Some(job),
                None => {
                    st.active = st.active.saturating_sub(1);
                    None
                }
            }
        };
        if let Some(job) = next {
            self.spawn_slot(job);
        }
    }

    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for ConcurrencyQueue {
    fn default() -> Self {
        Self::new(DEFAULT_CONCURRENCY)
    }
}

/// Runs on completion, failure or panic of the job it guards.
struct SlotGuard {
    queue: ConcurrencyQueue,
}

impl Drop for SlotGuard {
    fn drop(&mut self) {
        self.queue.release_slot();
    }
}
