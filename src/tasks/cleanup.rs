//! Expiry Sweep Task
//!
//! Background task that periodically removes expired store entries.

use std::sync::Weak;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::{CacheError, Result};

/// Something a [`Janitor`] can sweep.
pub trait Sweep: Send + Sync + 'static {
    /// Removes expired entries, returning how many were removed.
    fn sweep(&self) -> usize;
}

// == Janitor ==
/// Handle to a background sweep loop.
///
/// Inside a tokio runtime the loop is a task on that runtime. Elsewhere it
/// gets its own thread running a current-thread runtime. Either way the loop
/// holds only a weak reference to its target, exits once the target is
/// dropped, and is stopped when the janitor is dropped.
#[derive(Debug)]
pub struct Janitor {
    host: Host,
}

#[derive(Debug)]
enum Host {
    Task(JoinHandle<()>),
    Thread {
        shutdown: Mutex<Option<oneshot::Sender<()>>>,
        thread: thread::JoinHandle<()>,
    },
}

impl Janitor {
    /// Starts a sweep loop that sleeps for `interval` between sweeps of
    /// `target`.
    ///
    /// # Errors
    /// Returns [`CacheError::SweeperUnavailable`] when there is no ambient
    /// runtime and the dedicated sweep thread cannot be spawned.
    pub fn start<S: Sweep>(target: Weak<S>, interval: Duration) -> Result<Self> {
        if let Ok(runtime) = Handle::try_current() {
            let handle = runtime.spawn(sweep_loop(target, interval));
            return Ok(Self {
                host: Host::Task(handle),
            });
        }

        let (shutdown, stopped) = oneshot::channel();
        let thread = thread::Builder::new()
            .name("cache-janitor".to_string())
            .spawn(move || {
                let runtime = match Builder::new_current_thread().enable_time().build() {
                    Ok(runtime) => runtime,
                    Err(err) => {
                        error!(error = %err, "failed to build expiry sweep runtime");
                        return;
                    }
                };

                runtime.block_on(async move {
                    tokio::select! {
                        _ = stopped => debug!("Expiry sweep thread shut down"),
                        _ = sweep_loop(target, interval) => {}
                    }
                });
            })
            .map_err(|e| CacheError::SweeperUnavailable(e.to_string()))?;

        Ok(Self {
            host: Host::Thread {
                shutdown: Mutex::new(Some(shutdown)),
                thread,
            },
        })
    }

    /// Stops the sweep loop. Stopping twice is harmless.
    pub fn stop(&self) {
        match &self.host {
            Host::Task(handle) => handle.abort(),
            Host::Thread { shutdown, .. } => {
                if let Some(shutdown) = shutdown.lock().take() {
                    // The thread may already be gone
                    let _ = shutdown.send(());
                }
            }
        }
    }

    /// Returns true once the sweep loop has exited.
    pub fn is_finished(&self) -> bool {
        match &self.host {
            Host::Task(handle) => handle.is_finished(),
            Host::Thread { thread, .. } => thread.is_finished(),
        }
    }
}

// The sweep thread is signalled, not joined: the last handle to a cache can
// be dropped from inside a sweep on that very thread.
impl Drop for Janitor {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn sweep_loop<S: Sweep>(target: Weak<S>, interval: Duration) {
    info!(?interval, "Starting expiry sweep task");

    loop {
        tokio::time::sleep(interval).await;

        // Upgrade only for the duration of one sweep
        let removed = match target.upgrade() {
            Some(target) => target.sweep(),
            None => break,
        };

        if removed > 0 {
            info!("Expiry sweep: removed {} expired entries", removed);
        } else {
            debug!("Expiry sweep: no expired entries found");
        }
    }

    debug!("Sweep target dropped, stopping expiry sweep task");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[derive(Default)]
    struct CountingTarget {
        sweeps: AtomicUsize,
    }

    impl Sweep for CountingTarget {
        fn sweep(&self) -> usize {
            self.sweeps.fetch_add(1, Ordering::SeqCst);
            0
        }
    }

    impl CountingTarget {
        fn sweeps(&self) -> usize {
            self.sweeps.load(Ordering::SeqCst)
        }
    }

    #[test]
    fn test_janitor_without_runtime_sweeps_on_own_thread() {
        let target = Arc::new(CountingTarget::default());
        let janitor = Janitor::start(Arc::downgrade(&target), Duration::from_millis(10)).unwrap();

        thread::sleep(Duration::from_millis(100));

        assert!(matches!(janitor.host, Host::Thread { .. }));
        assert!(target.sweeps() >= 2);
        assert!(!janitor.is_finished());
    }

    #[test]
    fn test_janitor_thread_stops_when_dropped() {
        let target = Arc::new(CountingTarget::default());
        let janitor = Janitor::start(Arc::downgrade(&target), Duration::from_millis(10)).unwrap();
        thread::sleep(Duration::from_millis(50));

        janitor.stop();
        thread::sleep(Duration::from_millis(50));
        assert!(janitor.is_finished());

        let sweeps = target.sweeps();
        drop(janitor);
        thread::sleep(Duration::from_millis(50));
        assert_eq!(target.sweeps(), sweeps);
    }

    #[test]
    fn test_janitor_thread_exits_when_target_dropped() {
        let target = Arc::new(CountingTarget::default());
        let janitor = Janitor::start(Arc::downgrade(&target), Duration::from_millis(10)).unwrap();

        drop(target);
        thread::sleep(Duration::from_millis(50));

        assert!(janitor.is_finished());
    }

    #[tokio::test]
    async fn test_janitor_sweeps_on_interval() {
        let target = Arc::new(CountingTarget::default());
        let janitor = Janitor::start(Arc::downgrade(&target), Duration::from_millis(10)).unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;

        assert!(matches!(janitor.host, Host::Task(_)));
        assert!(target.sweeps() >= 2);
        assert!(!janitor.is_finished());
    }

    #[tokio::test]
    async fn test_janitor_can_be_stopped() {
        let target = Arc::new(CountingTarget::default());
        let janitor = Janitor::start(Arc::downgrade(&target), Duration::from_millis(10)).unwrap();

        janitor.stop();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(janitor.is_finished(), "Task should be finished after stop");
        assert_eq!(target.sweeps(), 0);
    }

    #[tokio::test]
    async fn test_dropped_janitor_stops_sweeping() {
        let target = Arc::new(CountingTarget::default());
        let janitor = Janitor::start(Arc::downgrade(&target), Duration::from_millis(10)).unwrap();
        tokio::time::sleep(Duration::from_millis(35)).await;

        drop(janitor);
        let sweeps = target.sweeps();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(target.sweeps(), sweeps);
    }

    #[tokio::test]
    async fn test_janitor_exits_when_target_dropped() {
        let target = Arc::new(CountingTarget::default());
        let janitor = Janitor::start(Arc::downgrade(&target), Duration::from_millis(10)).unwrap();

        drop(target);
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert!(janitor.is_finished());
    }
}
