//! The dedicated host thread.
//!
//! The host is not `Send`, so it is created on the thread that owns it and
//! never leaves. The thread ticks the executor at a fixed interval until the
//! dispatch queue is closed, runs one final drain, unregisters its observer
//! and exits.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use viewsync_core::{DispatchQueue, SceneExecutor, SceneHost, SyncState};

use crate::metrics;

/// Liveness of the host thread, readable from any thread.
#[derive(Debug, Clone, Default)]
pub struct HostStatus {
    running: Arc<AtomicBool>,
}

impl HostStatus {
    /// Whether the host thread is running its tick loop.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    fn set(&self, running: bool) {
        self.running.store(running, Ordering::Release);
    }
}

/// Marks the host thread stopped however it exits, and stops the queue from
/// accepting jobs nobody will drain.
struct ExitGuard {
    status: HostStatus,
    queue: DispatchQueue<SceneExecutor>,
}

impl Drop for ExitGuard {
    fn drop(&mut self) {
        if thread::panicking() {
            tracing::error!("Host thread panicked, refusing further jobs");
        }
        self.queue.close();
        self.status.set(false);
    }
}

/// Owner of the host thread.
#[derive(Debug)]
pub struct HostRuntime {
    queue: DispatchQueue<SceneExecutor>,
    status: HostStatus,
    thread: JoinHandle<()>,
}

impl HostRuntime {
    /// Start the host thread.
    ///
    /// `make_host` runs on the new thread; `tick` is the interval between
    /// drains.
    ///
    /// # Errors
    ///
    /// Returns an error if the OS refuses to spawn the thread.
    pub fn spawn<F>(
        make_host: F,
        queue: DispatchQueue<SceneExecutor>,
        sync: SyncState,
        tick: Duration,
    ) -> io::Result<Self>
    where
        F: FnOnce() -> Box<dyn SceneHost> + Send + 'static,
    {
        let status = HostStatus::default();
        // Mark running before the thread starts so readiness never flaps at boot.
        status.set(true);
        let thread = {
            let queue = queue.clone();
            let status = status.clone();
            thread::Builder::new()
                .name("viewsync-host".to_string())
                .spawn(move || {
                    let _exit = ExitGuard {
                        status,
                        queue: queue.clone(),
                    };
                    run(make_host(), &queue, sync, tick);
                })?
        };
        Ok(Self {
            queue,
            status,
            thread,
        })
    }

    /// Shared liveness flag.
    #[must_use]
    pub fn status(&self) -> HostStatus {
        self.status.clone()
    }

    /// Close the queue and wait for the thread's final drain.
    ///
    /// Blocks the calling thread for at most one tick plus the final drain.
    pub fn shutdown(self) {
        self.queue.close();
        self.thread.thread().unpark();
        if self.thread.join().is_err() {
            tracing::error!("Host thread panicked");
        }
        self.status.set(false);
    }
}

fn run(
    host: Box<dyn SceneHost>,
    queue: &DispatchQueue<SceneExecutor>,
    sync: SyncState,
    tick: Duration,
) {
    let mut executor = SceneExecutor::new(host, sync);
    tracing::info!(?tick, "Host thread started");

    loop {
        let report = executor.tick(queue);
        metrics::record_drain(&report);
        metrics::set_queue_depth(report.remaining);
        if queue.is_closed() {
            break;
        }
        thread::park_timeout(tick);
    }

    // Jobs queued between the last drain and the close still run.
    let report = executor.tick(queue);
    metrics::record_drain(&report);
    metrics::set_queue_depth(0);
    executor.shutdown();
    tracing::info!(
        final_jobs = report.ran(),
        entities = executor.registry().len(),
        "Host thread stopped"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use viewsync_core::{AddEntityRequest, EntityId, HeadlessHost, Position};

    fn wait_until(mut check: impl FnMut() -> bool) -> bool {
        for _ in 0..200 {
            if check() {
                return true;
            }
            thread::sleep(Duration::from_millis(5));
        }
        false
    }

    #[test]
    fn test_jobs_run_on_host_thread() {
        let host = HeadlessHost::new();
        let scene = host.handle();
        let queue = DispatchQueue::new();
        let runtime = HostRuntime::spawn(
            move || Box::new(host),
            queue.clone(),
            SyncState::new(),
            Duration::from_millis(5),
        )
        .expect("host thread should spawn");
        assert!(runtime.status().is_running());

        queue
            .enqueue("add", |executor: &mut SceneExecutor| {
                assert_eq!(thread::current().name(), Some("viewsync-host"));
                executor.add_entity(AddEntityRequest {
                    id: EntityId::from("a"),
                    label: "a".to_string(),
                    position: Position::default(),
                    color: None,
                })
            })
            .expect("enqueue should succeed");

        assert!(wait_until(|| scene.object_count() == 1));
        runtime.shutdown();
    }

    #[test]
    fn test_host_panic_marks_stopped_and_closes_queue() {
        let queue = DispatchQueue::new();
        let runtime = HostRuntime::spawn(
            || -> Box<dyn SceneHost> { panic!("viewer failed to start") },
            queue.clone(),
            SyncState::new(),
            Duration::from_millis(5),
        )
        .expect("host thread should spawn");
        let status = runtime.status();

        assert!(wait_until(|| !status.is_running()));
        assert!(queue.is_closed());
        assert!(queue
            .enqueue("late", |_: &mut SceneExecutor| Ok(()))
            .is_err());
        runtime.shutdown();
    }

    #[test]
    fn test_shutdown_runs_final_drain_and_unregisters() {
        let host = HeadlessHost::new();
        let scene = host.handle();
        let queue = DispatchQueue::new();
        let runtime = HostRuntime::spawn(
            move || Box::new(host),
            queue.clone(),
            SyncState::new(),
            Duration::from_secs(60),
        )
        .expect("host thread should spawn");
        assert!(wait_until(|| scene.observer_count() == 1));

        queue
            .enqueue("close", |executor: &mut SceneExecutor| {
                executor.close();
                Ok(())
            })
            .expect("enqueue should succeed");
        let status = runtime.status();
        runtime.shutdown();

        assert!(scene.is_closed());
        assert_eq!(scene.observer_count(), 0);
        assert!(!status.is_running());
    }
}
