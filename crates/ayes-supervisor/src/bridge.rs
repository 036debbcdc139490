//! PTY bridge: child spawn, output fan-in, and the host stdin pipeline.
//!
//! Blocking PTY and stdin reads live on dedicated threads feeding mpsc
//! channels; the supervisor's select loop is the single consumer, which
//! is what keeps the fan-out ordering deterministic (renderer before
//! responder for every chunk).

use anyhow::{Context, Result};
use portable_pty::{ChildKiller, CommandBuilder, MasterPty, PtySize, native_pty_system};
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace, warn};

use crate::shared::Shared;

/// Ctrl-Z byte: job control is unsupported, dropped silently.
const SUB: u8 = 0x1A;
/// Ctrl-C byte.
const ETX: u8 = 0x03;

/// Child output as seen by the supervisor loop.
#[derive(Debug)]
pub enum OutputEvent {
    Data(Vec<u8>),
    Eof,
}

/// Out-of-band notifications from the stdin pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BridgeEvent {
    /// Ctrl-C arrived before the ready latch released: deliberate abort.
    PreReadyInterrupt,
}

/// A spawned child attached to its PTY.
pub struct PtyChild {
    pub pid: Option<u32>,
    pub master: Box<dyn MasterPty + Send>,
    pub killer: Box<dyn ChildKiller + Send + Sync>,
    pub output_rx: mpsc::Receiver<OutputEvent>,
    pub exit_rx: oneshot::Receiver<i32>,
}

/// PTY dimensions from the host terminal.
///
/// Columns are floored at 20; the non-TTY path caps them at 80 so tools
/// render log-friendly lines. Rows come from the host (or `LINES`).
pub fn host_pty_size(host_is_tty: bool) -> PtySize {
    let mut cols: Option<u16> = None;
    let mut rows: Option<u16> = None;

    #[cfg(unix)]
    if host_is_tty {
        // SAFETY: TIOCGWINSZ only writes into the winsize out-param.
        let mut ws: libc::winsize = unsafe { std::mem::zeroed() };
        if unsafe { libc::ioctl(libc::STDOUT_FILENO, libc::TIOCGWINSZ, &mut ws) } == 0 {
            if ws.ws_col > 0 {
                cols = Some(ws.ws_col);
            }
            if ws.ws_row > 0 {
                rows = Some(ws.ws_row);
            }
        }
    }

    let env_dim = |name: &str| {
        std::env::var(name)
            .ok()
            .and_then(|v| v.parse::<u16>().ok())
            .filter(|v| *v > 0)
    };

    let mut cols = cols.or_else(|| env_dim("COLUMNS")).unwrap_or(80);
    let rows = rows.or_else(|| env_dim("LINES")).unwrap_or(24);

    cols = cols.max(20);
    if !host_is_tty {
        cols = cols.min(80);
    }

    PtySize {
        rows,
        cols,
        pixel_width: 0,
        pixel_height: 0,
    }
}

/// Spawn `binary args...` in a fresh PTY of the given size.
///
/// Starts a reader thread (PTY output → `output_rx`) and a waiter thread
/// (child exit code → `exit_rx`).
pub fn spawn_child(
    binary: &str,
    args: &[String],
    cwd: &Path,
    size: PtySize,
) -> Result<PtyChild> {
    let pty_system = native_pty_system();
    let pair = pty_system
        .openpty(size)
        .map_err(|e| anyhow::anyhow!("failed to allocate PTY: {e}"))?;

    let mut cmd = CommandBuilder::new(binary);
    cmd.args(args);
    cmd.cwd(cwd);
    cmd.env("TERM", "xterm-256color");

    debug!(binary, ?args, cols = size.cols, rows = size.rows, "spawning child in PTY");

    let mut child = pair
        .slave
        .spawn_command(cmd)
        .map_err(|e| anyhow::anyhow!("spawn failed: {e}"))?;

    // The slave side belongs to the child now; dropping our handle lets
    // the master observe EOF when the child exits.
    drop(pair.slave);

    let pid = child.process_id();
    let killer = child.clone_killer();

    let reader = pair
        .master
        .try_clone_reader()
        .map_err(|e| anyhow::anyhow!("failed cloning PTY reader: {e}"))?;

    let (output_tx, output_rx) = mpsc::channel::<OutputEvent>(256);
    std::thread::Builder::new()
        .name("ayes-pty-reader".to_string())
        .spawn(move || run_reader_loop(reader, &output_tx))
        .context("failed to spawn PTY reader thread")?;

    let (exit_tx, exit_rx) = oneshot::channel();
    std::thread::Builder::new()
        .name("ayes-pty-waiter".to_string())
        .spawn(move || {
            let code = match child.wait() {
                Ok(status) => status.exit_code() as i32,
                Err(e) => {
                    warn!("child wait failed: {e}");
                    1
                }
            };
            let _ = exit_tx.send(code);
        })
        .context("failed to spawn PTY waiter thread")?;

    Ok(PtyChild {
        pid,
        master: pair.master,
        killer,
        output_rx,
        exit_rx,
    })
}

fn run_reader_loop(mut reader: Box<dyn Read + Send>, tx: &mpsc::Sender<OutputEvent>) {
    let mut buf = [0u8; 4096];
    loop {
        match reader.read(&mut buf) {
            Ok(0) => {
                let _ = tx.blocking_send(OutputEvent::Eof);
                break;
            }
            Ok(n) => {
                if tx.blocking_send(OutputEvent::Data(buf[..n].to_vec())).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                // EIO is the normal PTY close on Linux.
                trace!("PTY read ended: {e}");
                let _ = tx.blocking_send(OutputEvent::Eof);
                break;
            }
        }
    }
}

/// Channel carrying host-stdin (and fifo) bytes into the pipeline.
pub fn stdin_channel() -> (
    mpsc::UnboundedSender<Vec<u8>>,
    mpsc::UnboundedReceiver<Vec<u8>>,
) {
    mpsc::unbounded_channel()
}

/// Read host stdin on a dedicated thread, forwarding chunks into `tx`.
pub fn spawn_stdin_reader(tx: mpsc::UnboundedSender<Vec<u8>>) {
    let spawned = std::thread::Builder::new()
        .name("ayes-stdin-reader".to_string())
        .spawn(move || {
            let mut stdin = std::io::stdin().lock();
            let mut buf = [0u8; 1024];
            loop {
                match stdin.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.send(buf[..n].to_vec()).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(_) => break,
                }
            }
        });
    if let Err(e) = spawned {
        warn!("could not start stdin reader: {e}");
    }
}

/// The stdin pipeline: terminate-signal filter, then the ready gate.
///
/// Ctrl-Z is dropped. A Ctrl-C before the ready latch releases is a
/// deliberate abort: the supervisor is notified (it signals the child and
/// resolves the run with code 130) and the byte passes through once.
/// Everything else waits for ready, pings the idle monitor, and goes to
/// the child.
pub async fn stdin_pump(
    shared: Arc<Shared>,
    mut rx: mpsc::UnboundedReceiver<Vec<u8>>,
    events: mpsc::UnboundedSender<BridgeEvent>,
) {
    while let Some(mut bytes) = rx.recv().await {
        bytes.retain(|b| *b != SUB);
        if bytes.is_empty() {
            continue;
        }

        if !shared.ready.is_ready() && bytes.contains(&ETX) {
            let _ = events.send(BridgeEvent::PreReadyInterrupt);
            shared.write_to_child(&[ETX]);
            continue;
        }

        shared.write_ready_gated(&bytes).await;
        shared.idle.ping();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use std::sync::Mutex;
    use std::time::Duration;

    #[test]
    fn test_host_pty_size_non_tty_caps_at_80() {
        let size = host_pty_size(false);
        assert!(size.cols <= 80);
        assert!(size.cols >= 20);
        assert!(size.rows > 0);
    }

    struct SinkWriter(Arc<Mutex<Vec<u8>>>);

    impl Write for SinkWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn shared_with_sink() -> (Arc<Shared>, Arc<Mutex<Vec<u8>>>) {
        let sink = Arc::new(Mutex::new(Vec::new()));
        let shared = Arc::new(Shared::new());
        shared.set_writer(Box::new(SinkWriter(Arc::clone(&sink))));
        (shared, sink)
    }

    #[tokio::test]
    async fn test_stdin_pump_drops_ctrl_z() {
        let (shared, sink) = shared_with_sink();
        shared.ready.ready();
        let (tx, rx) = stdin_channel();
        let (ev_tx, _ev_rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(stdin_pump(Arc::clone(&shared), rx, ev_tx));
        tx.send(vec![b'a', SUB, b'b']).unwrap();
        drop(tx);
        pump.await.unwrap();

        assert_eq!(sink.lock().unwrap().as_slice(), b"ab");
    }

    #[tokio::test]
    async fn test_stdin_pump_buffers_until_ready() {
        let (shared, sink) = shared_with_sink();
        let (tx, rx) = stdin_channel();
        let (ev_tx, _ev_rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(stdin_pump(Arc::clone(&shared), rx, ev_tx));
        tx.send(b"typed early".to_vec()).unwrap();
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(sink.lock().unwrap().is_empty(), "held while unready");

        shared.ready.ready();
        drop(tx);
        pump.await.unwrap();
        assert_eq!(sink.lock().unwrap().as_slice(), b"typed early");
    }

    #[tokio::test]
    async fn test_pre_ready_ctrl_c_is_an_abort() {
        let (shared, sink) = shared_with_sink();
        let (tx, rx) = stdin_channel();
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(stdin_pump(Arc::clone(&shared), rx, ev_tx));
        tx.send(vec![ETX]).unwrap();
        drop(tx);
        pump.await.unwrap();

        assert_eq!(ev_rx.try_recv().ok(), Some(BridgeEvent::PreReadyInterrupt));
        // The byte passes through exactly once.
        assert_eq!(sink.lock().unwrap().as_slice(), &[ETX]);
    }

    #[tokio::test]
    async fn test_post_ready_ctrl_c_is_forwarded_normally() {
        let (shared, sink) = shared_with_sink();
        shared.ready.ready();
        let (tx, rx) = stdin_channel();
        let (ev_tx, mut ev_rx) = mpsc::unbounded_channel();

        let pump = tokio::spawn(stdin_pump(Arc::clone(&shared), rx, ev_tx));
        tx.send(vec![ETX]).unwrap();
        drop(tx);
        pump.await.unwrap();

        assert!(ev_rx.try_recv().is_err(), "no abort after ready");
        assert_eq!(sink.lock().unwrap().as_slice(), &[ETX]);
    }
}
