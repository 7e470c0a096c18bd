// Implements the one-shot readiness notification primitive shared
// between the controller thread and the server thread.

use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

/// `ReadinessLatch` is a waitable boolean signal whose wait reports
/// whether it woke because the latch fired or because the timeout
/// elapsed. It backs both the startup-ready and the shutdown-complete
/// notifications.
///
/// Once set, the latch stays set until `clear` is called again, so a
/// `set` racing with the start of a `wait` is never lost.
pub struct ReadinessLatch {
    flag: Mutex<bool>,
    cond: Condvar,
}

impl Default for ReadinessLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessLatch {
    #[must_use]
    pub fn new() -> Self {
        Self {
            flag: Mutex::new(false),
            cond: Condvar::new(),
        }
    }

    /// Resets the latch so it can be waited on again. Call before each reuse.
    pub fn clear(&self) {
        let mut flag = self.flag.lock().unwrap();
        *flag = false;
    }

    /// Fires the latch and wakes every waiter. Idempotent.
    pub fn set(&self) {
        let mut flag = self.flag.lock().unwrap();
        *flag = true;
        drop(flag);
        self.cond.notify_all();
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        *self.flag.lock().unwrap()
    }

    /// Blocks until the latch fires or `timeout` elapses, returning the
    /// latch state at wake time. `None` waits indefinitely.
    ///
    /// A `true` return means the latch fired; `false` means the timeout
    /// expired with the latch still unset. Spurious condvar wakeups are
    /// absorbed by re-checking the flag against the deadline.
    pub fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut flag = self.flag.lock().unwrap();
        match timeout {
            None => {
                while !*flag {
                    flag = self.cond.wait(flag).unwrap();
                }
                *flag
            }
            Some(limit) => {
                let deadline = Instant::now() + limit;
                while !*flag {
                    let now = Instant::now();
                    if now >= deadline {
                        break;
                    }
                    let (guard, _timed_out) =
                        self.cond.wait_timeout(flag, deadline - now).unwrap();
                    flag = guard;
                }
                *flag
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    use super::ReadinessLatch;

    #[test]
    fn wait_returns_true_once_set() {
        let latch = Arc::new(ReadinessLatch::new());

        let latch_clone = latch.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(50));
            latch_clone.set();
        });

        assert!(latch.wait(Some(Duration::from_secs(2))));
        handle.join().expect("should join setter thread");
    }

    #[test]
    fn wait_returns_false_on_timeout() {
        let latch = ReadinessLatch::new();
        let started = Instant::now();
        assert!(!latch.wait(Some(Duration::from_millis(50))));
        assert!(started.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn set_before_wait_is_not_lost() {
        let latch = ReadinessLatch::new();
        latch.set();
        assert!(latch.wait(Some(Duration::from_millis(1))));
        assert!(latch.wait(None));
    }

    #[test]
    fn set_is_idempotent_and_clear_resets() {
        let latch = ReadinessLatch::new();
        latch.set();
        latch.set();
        assert!(latch.is_set());

        latch.clear();
        assert!(!latch.is_set());
        assert!(!latch.wait(Some(Duration::from_millis(10))));
    }
}
