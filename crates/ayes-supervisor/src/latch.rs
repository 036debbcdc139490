//! Latches gating writes and acknowledging child output.
//!
//! All three are cheap clones sharing state; they are per-supervisor,
//! never global.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;

/// Gate that holds writers until the assistant signals readiness.
///
/// `ready()` releases every pending waiter and sets a sticky flag for
/// future ones; `unready()` clears the flag without revoking a release
/// that already happened. Waiters released by a `ready()` stay released
/// even if `unready()` follows immediately.
#[derive(Debug, Clone)]
pub struct ReadyLatch {
    inner: Arc<ReadyInner>,
}

#[derive(Debug)]
struct ReadyInner {
    flag: Mutex<bool>,
    /// Bumped on every `ready()`; waiters watch for a bump past their
    /// subscription point.
    fired: watch::Sender<u64>,
}

impl Default for ReadyLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyLatch {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ReadyInner {
                flag: Mutex::new(false),
                fired: watch::Sender::new(0),
            }),
        }
    }

    /// Suspend until the latch is (or becomes) ready.
    pub async fn wait(&self) {
        let mut rx = self.inner.fired.subscribe();
        let seen = *rx.borrow();
        if *self.inner.flag.lock().unwrap() {
            return;
        }
        loop {
            // The sender lives in `self.inner`, so `changed()` cannot fail
            // while we hold a clone; treat closure as released to be safe.
            if rx.changed().await.is_err() {
                return;
            }
            if *rx.borrow() > seen {
                return;
            }
        }
    }

    /// Release all pending waiters and set the sticky flag. Idempotent.
    pub fn ready(&self) {
        *self.inner.flag.lock().unwrap() = true;
        self.inner.fired.send_modify(|count| *count += 1);
    }

    /// Clear the sticky flag. In-flight waiters already released by a
    /// prior `ready()` are unaffected.
    pub fn unready(&self) {
        *self.inner.flag.lock().unwrap() = false;
    }

    pub fn is_ready(&self) -> bool {
        *self.inner.flag.lock().unwrap()
    }
}

/// One-shot latch: fires once, stays fired.
#[derive(Debug, Clone)]
pub struct OnceLatch {
    inner: Arc<OnceInner>,
}

#[derive(Debug)]
struct OnceInner {
    fired: AtomicBool,
    notify: watch::Sender<bool>,
}

impl Default for OnceLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl OnceLatch {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(OnceInner {
                fired: AtomicBool::new(false),
                notify: watch::Sender::new(false),
            }),
        }
    }

    /// Fire the latch. Returns true only on the first call.
    pub fn fire(&self) -> bool {
        let first = !self.inner.fired.swap(true, Ordering::SeqCst);
        if first {
            // send_replace stores the value even with no receiver yet.
            self.inner.notify.send_replace(true);
        }
        first
    }

    pub fn is_fired(&self) -> bool {
        self.inner.fired.load(Ordering::SeqCst)
    }

    /// Suspend until fired (returns immediately if already fired).
    pub async fn wait(&self) {
        let mut rx = self.inner.notify.subscribe();
        if self.inner.fired.load(Ordering::SeqCst) || *rx.borrow() {
            return;
        }
        while rx.changed().await.is_ok() {
            if *rx.borrow() {
                return;
            }
        }
    }
}

/// Pulse latch acknowledging "the child wrote something after point X".
///
/// Callers snapshot the pulse counter with [`observe`], perform their
/// write, then [`wait_since`] the snapshot with a timeout.
///
/// [`observe`]: StdoutLatch::observe
/// [`wait_since`]: StdoutLatch::wait_since
#[derive(Debug, Clone)]
pub struct StdoutLatch {
    inner: Arc<StdoutInner>,
}

#[derive(Debug)]
struct StdoutInner {
    count: AtomicU64,
    pulses: watch::Sender<u64>,
}

impl Default for StdoutLatch {
    fn default() -> Self {
        Self::new()
    }
}

impl StdoutLatch {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(StdoutInner {
                count: AtomicU64::new(0),
                pulses: watch::Sender::new(0),
            }),
        }
    }

    /// Record one output pulse.
    pub fn notify(&self) {
        let next = self.inner.count.fetch_add(1, Ordering::SeqCst) + 1;
        // send_replace stores the value even with no receiver yet.
        self.inner.pulses.send_replace(next);
    }

    /// Snapshot the pulse counter; pairs with [`wait_since`].
    ///
    /// [`wait_since`]: StdoutLatch::wait_since
    pub fn observe(&self) -> u64 {
        self.inner.count.load(Ordering::SeqCst)
    }

    /// Wait until a pulse lands after `seen`, or `timeout` elapses.
    /// Returns whether a pulse arrived.
    pub async fn wait_since(&self, seen: u64, timeout: Duration) -> bool {
        let mut rx = self.inner.pulses.subscribe();
        // A pulse may have landed between the caller's observe() and our
        // subscription; the counter is the source of truth.
        if self.inner.count.load(Ordering::SeqCst) > seen || *rx.borrow() > seen {
            return true;
        }
        tokio::time::timeout(timeout, async {
            loop {
                if rx.changed().await.is_err() {
                    return;
                }
                if *rx.borrow() > seen {
                    return;
                }
            }
        })
        .await
        .is_ok()
    }
}
