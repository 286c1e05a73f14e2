use std::fmt;
use std::sync::Arc;
use std::sync::Condvar;
use std::sync::Mutex;
use std::sync::PoisonError;
use std::time::Duration;

/// Wakeup flag of a partition runner.
///
/// Buffers signal it when data or space becomes available, the control handle when the
/// flowgraph is stopped or paused. A notification that arrives while the runner is busy is
/// remembered, so the next `wait_timeout` returns immediately.
#[derive(Clone, Default)]
pub(crate) struct Notify {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Notify {
    pub(crate) fn new() -> Notify {
        Notify::default()
    }

    pub(crate) fn notify(&self) {
        let (flag, cond) = &*self.inner;
        *flag.lock().unwrap_or_else(PoisonError::into_inner) = true;
        cond.notify_all();
    }

    /// Park until notified or until `timeout` elapsed.
    pub(crate) fn wait_timeout(&self, timeout: Duration) {
        let (flag, cond) = &*self.inner;
        let mut pending = flag.lock().unwrap_or_else(PoisonError::into_inner);
        if !*pending {
            pending = cond
                .wait_timeout(pending, timeout)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|e| e.into_inner().0);
        }
        *pending = false;
    }
}

impl fmt::Debug for Notify {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notify").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Instant;

    #[test]
    fn pending_notification_is_not_lost() {
        let n = Notify::new();
        n.notify();
        let start = Instant::now();
        n.wait_timeout(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn wakes_from_other_thread() {
        let n = Notify::new();
        let c = n.clone();
        let t = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            c.notify();
        });
        let start = Instant::now();
        n.wait_timeout(Duration::from_secs(5));
        assert!(start.elapsed() < Duration::from_secs(4));
        t.join().unwrap();
    }
}
