//! Per-supervisor shared state handed to protocol tasks.

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tracing::{trace, warn};

use crate::idle::IdleMonitor;
use crate::latch::{OnceLatch, ReadyLatch, StdoutLatch};

/// State shared between the bridge loop, the auto-responder, and the
/// enter/send-message protocol tasks. One instance per supervisor; the
/// child writer inside is swapped on respawn.
pub struct Shared {
    pub ready: ReadyLatch,
    pub first_ready: OnceLatch,
    pub next_stdout: StdoutLatch,
    pub idle: IdleMonitor,
    pub is_fatal: AtomicBool,
    pub restart_without_continue: AtomicBool,
    /// Guards the enter protocol: one confirmation sequence at a time.
    enter_in_flight: AtomicBool,
    writer: Mutex<Option<Box<dyn Write + Send>>>,
}

impl std::fmt::Debug for Shared {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shared")
            .field("ready", &self.ready.is_ready())
            .field("is_fatal", &self.is_fatal.load(Ordering::SeqCst))
            .finish()
    }
}

impl Default for Shared {
    fn default() -> Self {
        Self::new()
    }
}

impl Shared {
    pub fn new() -> Self {
        Self {
            ready: ReadyLatch::new(),
            first_ready: OnceLatch::new(),
            next_stdout: StdoutLatch::new(),
            idle: IdleMonitor::new(),
            is_fatal: AtomicBool::new(false),
            restart_without_continue: AtomicBool::new(false),
            enter_in_flight: AtomicBool::new(false),
            writer: Mutex::new(None),
        }
    }

    /// Install the writer for the current child (replaces any prior one).
    pub fn set_writer(&self, writer: Box<dyn Write + Send>) {
        *self.writer.lock().unwrap() = Some(writer);
    }

    pub fn clear_writer(&self) {
        *self.writer.lock().unwrap() = None;
    }

    /// Write bytes to the child immediately, bypassing the ready gate
    /// (control replies, typing responses, pre-ready passthrough).
    pub fn write_to_child(&self, bytes: &[u8]) {
        let mut guard = self.writer.lock().unwrap();
        if let Some(writer) = guard.as_mut() {
            if let Err(e) = writer.write_all(bytes).and_then(|()| writer.flush()) {
                warn!("write to child failed: {e}");
            }
        } else {
            trace!(len = bytes.len(), "dropping write: no child attached");
        }
    }

    /// Write bytes once the ready latch releases.
    pub async fn write_ready_gated(&self, bytes: &[u8]) {
        self.ready.wait().await;
        self.write_to_child(bytes);
    }
}

/// Timing of the enter protocol's quiet window and acknowledgement waits.
#[derive(Debug, Clone, Copy)]
pub struct EnterTiming {
    /// Required stream quiet before the first CR.
    pub initial_quiet: Duration,
    /// Wait for output after the first CR.
    pub first_ack: Duration,
    /// Wait for output after the retransmitted CR.
    pub second_ack: Duration,
}

impl EnterTiming {
    /// Confirming an on-screen prompt: 400 ms quiet, then 1 s / 3 s acks.
    pub fn confirm() -> Self {
        Self {
            initial_quiet: Duration::from_millis(400),
            first_ack: Duration::from_secs(1),
            second_ack: Duration::from_secs(3),
        }
    }

    /// Terminating a just-sent message: 1 s quiet, same acks.
    pub fn message() -> Self {
        Self {
            initial_quiet: Duration::from_secs(1),
            ..Self::confirm()
        }
    }
}

/// Enter protocol: confirm a UI prompt reliably.
///
/// Waits for the stream to go quiet, sends CR, and retransmits twice with
/// widening acknowledgement windows if the child stays silent: the
/// confirm UI may not have finished rendering when the first CR landed.
pub async fn enter_protocol(shared: &Shared, timing: EnterTiming) {
    if shared.enter_in_flight.swap(true, Ordering::SeqCst) {
        trace!("enter protocol already in flight, skipping");
        return;
    }

    shared.idle.wait(timing.initial_quiet).await;

    let seen = shared.next_stdout.observe();
    shared.write_to_child(b"\r");
    let acked = shared.next_stdout.wait_since(seen, timing.first_ack).await;

    if !acked {
        let seen = shared.next_stdout.observe();
        shared.write_to_child(b"\r");
        let acked = shared.next_stdout.wait_since(seen, timing.second_ack).await;

        if !acked {
            shared.write_to_child(b"\r");
        }
    }

    shared.enter_in_flight.store(false, Ordering::SeqCst);
}

/// Send-message protocol: inject a whole message (initial prompt, exit
/// command) and confirm it with the enter protocol.
pub async fn send_message(shared: &Shared, message: &str, wait_ready: bool) {
    send_message_with(shared, message, wait_ready, EnterTiming::message()).await;
}

pub async fn send_message_with(
    shared: &Shared,
    message: &str,
    wait_ready: bool,
    timing: EnterTiming,
) {
    if wait_ready {
        shared.ready.wait().await;
    }
    shared.write_to_child(message.as_bytes());
    shared.idle.ping();

    let seen = shared.next_stdout.observe();
    let _ = shared
        .next_stdout
        .wait_since(seen, Duration::from_secs(1))
        .await;

    enter_protocol(shared, timing).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::time::Instant;

    /// Writer that forwards each write to an mpsc channel with a timestamp.
    struct ChannelWriter(mpsc::Sender<(Instant, Vec<u8>)>);

    impl Write for ChannelWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let _ = self.0.send((Instant::now(), buf.to_vec()));
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn shared_with_channel() -> (Arc<Shared>, mpsc::Receiver<(Instant, Vec<u8>)>) {
        let (tx, rx) = mpsc::channel();
        let shared = Arc::new(Shared::new());
        shared.set_writer(Box::new(ChannelWriter(tx)));
        (shared, rx)
    }

    /// Poll-receive so the current-thread test runtime keeps making
    /// progress on spawned protocol tasks.
    async fn recv_async(rx: &mpsc::Receiver<(Instant, Vec<u8>)>) -> (Instant, Vec<u8>) {
        loop {
            if let Ok(v) = rx.try_recv() {
                return v;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn fast_timing() -> EnterTiming {
        EnterTiming {
            initial_quiet: Duration::from_millis(40),
            first_ack: Duration::from_millis(60),
            second_ack: Duration::from_millis(80),
        }
    }

    #[tokio::test]
    async fn test_enter_waits_for_quiet_before_cr() {
        let (shared, rx) = shared_with_channel();
        shared.idle.ping();
        let start = Instant::now();

        let task = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                enter_protocol(&shared, fast_timing()).await;
            })
        };

        // First CR arrives only after the quiet window.
        let (when, bytes) = recv_async(&rx).await;
        assert_eq!(bytes, b"\r");
        assert!(when.duration_since(start) >= Duration::from_millis(40));

        // Acknowledge so the protocol stops retransmitting.
        shared.next_stdout.notify();
        task.await.unwrap();
        assert!(rx.try_recv().is_err(), "no retransmission after ack");
    }

    #[tokio::test]
    async fn test_enter_retransmits_twice_when_unacknowledged() {
        let (shared, rx) = shared_with_channel();
        let task = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                enter_protocol(&shared, fast_timing()).await;
            })
        };
        task.await.unwrap();

        let sent: Vec<Vec<u8>> = rx.try_iter().map(|(_, b)| b).collect();
        assert_eq!(sent, vec![b"\r".to_vec(), b"\r".to_vec(), b"\r".to_vec()]);
    }

    #[tokio::test]
    async fn test_enter_stops_after_second_cr_is_acked() {
        let (shared, rx) = shared_with_channel();
        let task = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                enter_protocol(&shared, fast_timing()).await;
            })
        };

        // Let the first CR time out unacknowledged.
        let _ = recv_async(&rx).await;
        // Ack the second.
        let _ = recv_async(&rx).await;
        shared.next_stdout.notify();
        task.await.unwrap();

        assert!(rx.try_recv().is_err(), "no third CR after ack");
    }

    #[tokio::test]
    async fn test_enter_protocol_single_flight() {
        let (shared, rx) = shared_with_channel();
        shared.enter_in_flight.store(true, Ordering::SeqCst);
        enter_protocol(&shared, fast_timing()).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_send_message_writes_then_confirms() {
        let (shared, rx) = shared_with_channel();
        shared.ready.ready();

        let task = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                send_message_with(&shared, "/exit", true, fast_timing()).await;
            })
        };

        let (_, first) = recv_async(&rx).await;
        assert_eq!(first, b"/exit");

        // Child echoes; protocol proceeds to the enter phase.
        shared.next_stdout.notify();
        let (_, second) = recv_async(&rx).await;
        assert_eq!(second, b"\r");
        shared.next_stdout.notify();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_send_message_blocks_until_ready() {
        let (shared, rx) = shared_with_channel();

        let task = {
            let shared = Arc::clone(&shared);
            tokio::spawn(async move {
                send_message_with(&shared, "hello", true, fast_timing()).await;
            })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(rx.try_recv().is_err(), "nothing written before ready");

        shared.ready.ready();
        let (_, first) = recv_async(&rx).await;
        assert_eq!(first, b"hello");

        shared.next_stdout.notify();
        let _ = recv_async(&rx).await; // CR
        shared.next_stdout.notify();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_write_without_child_is_dropped() {
        let shared = Shared::new();
        shared.write_to_child(b"void");
    }
}
