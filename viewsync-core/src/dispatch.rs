//! Main-thread dispatch queue.
//!
//! Any thread may [`enqueue`](DispatchQueue::enqueue) a mutation; only the
//! host thread [`drain`](DispatchQueue::drain)s, so every job runs on that one
//! thread, in FIFO order, each to completion before the next starts.

use std::collections::VecDeque;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};

use crate::{SceneError, SceneResult};

/// A queued mutation, run once against the host-thread context `C`.
pub type Job<C> = Box<dyn FnOnce(&mut C) -> SceneResult<()> + Send + 'static>;

struct Pending<C> {
    label: &'static str,
    job: Job<C>,
}

struct QueueInner<C> {
    pending: VecDeque<Pending<C>>,
    closed: bool,
}

/// Outcome of one [`DispatchQueue::drain`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    /// Jobs that ran to completion.
    pub executed: usize,
    /// Jobs that returned an error or panicked.
    pub failed: usize,
    /// Jobs left queued for the next drain.
    pub remaining: usize,
}

impl DrainReport {
    /// Total jobs taken from the queue.
    #[must_use]
    pub fn ran(&self) -> usize {
        self.executed + self.failed
    }
}

/// Thread-safe FIFO of pending mutations.
///
/// Cloning shares the queue.
pub struct DispatchQueue<C> {
    inner: Arc<Mutex<QueueInner<C>>>,
}

impl<C> Clone for DispatchQueue<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C> Default for DispatchQueue<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> std::fmt::Debug for DispatchQueue<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchQueue")
            .field("len", &self.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl<C> DispatchQueue<C> {
    /// Create an open, empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(QueueInner {
                pending: VecDeque::new(),
                closed: false,
            })),
        }
    }

    /// Queue a job for the host thread. Never waits for the job to run.
    ///
    /// `label` names the job in logs.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::Unavailable`] once the queue has been closed.
    pub fn enqueue<F>(&self, label: &'static str, job: F) -> SceneResult<()>
    where
        F: FnOnce(&mut C) -> SceneResult<()> + Send + 'static,
    {
        let mut inner = self.lock();
        if inner.closed {
            tracing::debug!(job = label, "Rejecting job, dispatch queue closed");
            return Err(SceneError::Unavailable(
                "dispatch queue is shutting down".to_string(),
            ));
        }
        inner.pending.push_back(Pending {
            label,
            job: Box::new(job),
        });
        Ok(())
    }

    /// Run every job queued at the time of the call.
    ///
    /// Jobs enqueued while draining (including by a running job) wait for the
    /// next call. A job that fails or panics is logged and counted; the
    /// remaining jobs still run.
    pub fn drain(&self, ctx: &mut C) -> DrainReport {
        let batch = std::mem::take(&mut self.lock().pending);
        let mut report = DrainReport::default();

        for Pending { label, job } in batch {
            match panic::catch_unwind(AssertUnwindSafe(|| job(ctx))) {
                Ok(Ok(())) => report.executed += 1,
                Ok(Err(e)) => {
                    tracing::error!(job = label, error = %e, "Dispatched job failed");
                    report.failed += 1;
                }
                Err(payload) => {
                    tracing::error!(
                        job = label,
                        panic = panic_message(payload.as_ref()),
                        "Dispatched job panicked"
                    );
                    report.failed += 1;
                }
            }
        }

        report.remaining = self.len();
        report
    }

    /// Stop accepting jobs. Jobs already queued still run on the next drain.
    pub fn close(&self) {
        let mut inner = self.lock();
        if !inner.closed {
            inner.closed = true;
            tracing::info!(pending = inner.pending.len(), "Dispatch queue closed");
        }
    }

    /// Whether [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of queued jobs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().pending.len()
    }

    /// Whether no jobs are queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().pending.is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, QueueInner<C>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    payload
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| payload.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string panic payload>")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_drain_runs_jobs_in_order() {
        let queue: DispatchQueue<Vec<u32>> = DispatchQueue::new();
        for i in 0..5 {
            queue
                .enqueue("push", move |log: &mut Vec<u32>| {
                    log.push(i);
                    Ok(())
                })
                .expect("enqueue should succeed");
        }

        let mut log = Vec::new();
        let report = queue.drain(&mut log);

        assert_eq!(log, vec![0, 1, 2, 3, 4]);
        assert_eq!(report.executed, 5);
        assert_eq!(report.failed, 0);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_producers_each_job_runs_once_in_order() {
        const THREADS: u32 = 8;
        const PER_THREAD: u32 = 100;

        let queue: DispatchQueue<Vec<(u32, u32)>> = DispatchQueue::new();
        let handles: Vec<_> = (0..THREADS)
            .map(|t| {
                let queue = queue.clone();
                thread::spawn(move || {
                    for seq in 0..PER_THREAD {
                        queue
                            .enqueue("record", move |log: &mut Vec<(u32, u32)>| {
                                log.push((t, seq));
                                Ok(())
                            })
                            .expect("enqueue should succeed");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("producer thread panicked");
        }

        let mut log = Vec::new();
        let report = queue.drain(&mut log);

        assert_eq!(report.executed, (THREADS * PER_THREAD) as usize);
        assert_eq!(log.len(), (THREADS * PER_THREAD) as usize);
        for t in 0..THREADS {
            let seqs: Vec<u32> = log.iter().filter(|(thread, _)| *thread == t).map(|(_, s)| *s).collect();
            assert_eq!(seqs, (0..PER_THREAD).collect::<Vec<_>>(), "thread {t} out of order");
        }
    }

    #[test]
    fn test_jobs_enqueued_during_drain_wait_for_next_cycle() {
        let queue: DispatchQueue<Vec<&'static str>> = DispatchQueue::new();
        let requeue = queue.clone();
        queue
            .enqueue("outer", move |log: &mut Vec<&'static str>| {
                log.push("outer");
                requeue.enqueue("inner", |log: &mut Vec<&'static str>| {
                    log.push("inner");
                    Ok(())
                })
            })
            .expect("enqueue should succeed");

        let mut log = Vec::new();
        let first = queue.drain(&mut log);
        assert_eq!(log, vec!["outer"]);
        assert_eq!(first.remaining, 1);

        let second = queue.drain(&mut log);
        assert_eq!(log, vec!["outer", "inner"]);
        assert_eq!(second.executed, 1);
        assert_eq!(second.remaining, 0);
    }

    #[test]
    fn test_failing_and_panicking_jobs_do_not_stop_drain() {
        let queue: DispatchQueue<Vec<u32>> = DispatchQueue::new();
        queue
            .enqueue("fail", |_: &mut Vec<u32>| {
                Err(SceneError::NotFound("missing".to_string()))
            })
            .expect("enqueue should succeed");
        queue
            .enqueue("panic", |_: &mut Vec<u32>| panic!("boom"))
            .expect("enqueue should succeed");
        queue
            .enqueue("ok", |log: &mut Vec<u32>| {
                log.push(7);
                Ok(())
            })
            .expect("enqueue should succeed");

        let mut log = Vec::new();
        let report = queue.drain(&mut log);

        assert_eq!(log, vec![7]);
        assert_eq!(report.executed, 1);
        assert_eq!(report.failed, 2);
        assert_eq!(report.ran(), 3);
    }

    #[test]
    fn test_closed_queue_rejects_but_keeps_pending() {
        let queue: DispatchQueue<Vec<u32>> = DispatchQueue::new();
        queue
            .enqueue("before", |log: &mut Vec<u32>| {
                log.push(1);
                Ok(())
            })
            .expect("enqueue should succeed");
        queue.close();

        let err = queue
            .enqueue("after", |log: &mut Vec<u32>| {
                log.push(2);
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, SceneError::Unavailable(_)));
        assert!(queue.is_closed());

        let mut log = Vec::new();
        queue.drain(&mut log);
        assert_eq!(log, vec![1]);
    }
}
