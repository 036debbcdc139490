//! Single-key controls while waiting in the queue.
//!
//! The host terminal is put into raw mode with a 100 ms polling read
//! (VMIN=0, VTIME=1) so the reader thread can observe the stop flag and
//! restore termios instead of blocking forever on a final keystroke.

use std::io::Read;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;
use tracing::debug;

/// A recognized queue-control keystroke.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueKey {
    /// `b`: flip our record to running without waiting.
    Bypass,
    /// `k`: SIGTERM the first blocking holder.
    KillBlocker,
}

/// Handle to the key-reader thread. Dropping it stops the thread and
/// restores the terminal.
#[derive(Debug)]
pub struct KeyReader {
    rx: mpsc::UnboundedReceiver<QueueKey>,
    stop: Option<Arc<AtomicBool>>,
}

impl KeyReader {
    pub async fn recv(&mut self) -> Option<QueueKey> {
        self.rx.recv().await
    }

    /// False when stdin is not a terminal and no keys will ever arrive.
    pub fn is_active(&self) -> bool {
        self.stop.is_some()
    }
}

impl Drop for KeyReader {
    fn drop(&mut self) {
        if let Some(stop) = &self.stop {
            stop.store(true, Ordering::SeqCst);
        }
    }
}

/// Start reading queue-control keys from the host terminal. When stdin is
/// not a TTY the returned reader is inert.
pub fn spawn_key_reader() -> KeyReader {
    let (tx, rx) = mpsc::unbounded_channel();

    #[cfg(unix)]
    {
        if !stdin_is_tty() {
            return KeyReader { rx, stop: None };
        }

        let stop = Arc::new(AtomicBool::new(false));
        let stop_for_thread = Arc::clone(&stop);

        let spawned = std::thread::Builder::new()
            .name("ayes-queue-keys".to_string())
            .spawn(move || run_key_loop(&tx, &stop_for_thread));

        match spawned {
            Ok(_) => KeyReader { rx, stop: Some(stop) },
            Err(e) => {
                debug!("queue key reader unavailable: {e}");
                KeyReader { rx, stop: None }
            }
        }
    }

    #[cfg(not(unix))]
    {
        KeyReader { rx, stop: None }
    }
}

#[cfg(unix)]
fn stdin_is_tty() -> bool {
    // SAFETY: isatty only inspects the fd.
    unsafe { libc::isatty(libc::STDIN_FILENO) != 0 }
}

#[cfg(unix)]
fn run_key_loop(tx: &mpsc::UnboundedSender<QueueKey>, stop: &AtomicBool) {
    use nix::sys::termios::{SetArg, SpecialCharacterIndices, cfmakeraw, tcgetattr, tcsetattr};

    let stdin = std::io::stdin();
    let saved = match tcgetattr(&stdin) {
        Ok(attrs) => attrs,
        Err(e) => {
            debug!("tcgetattr failed, queue keys disabled: {e}");
            return;
        }
    };

    let mut raw = saved.clone();
    cfmakeraw(&mut raw);
    raw.control_chars[SpecialCharacterIndices::VMIN as usize] = 0;
    raw.control_chars[SpecialCharacterIndices::VTIME as usize] = 1;
    if let Err(e) = tcsetattr(&stdin, SetArg::TCSANOW, &raw) {
        debug!("tcsetattr failed, queue keys disabled: {e}");
        return;
    }

    let mut handle = stdin.lock();
    let mut buf = [0u8; 1];
    loop {
        if stop.load(Ordering::SeqCst) {
            break;
        }
        match handle.read(&mut buf) {
            Ok(0) => continue, // poll timeout
            Ok(_) => match buf[0] {
                b'b' => {
                    let _ = tx.send(QueueKey::Bypass);
                }
                b'k' => {
                    let _ = tx.send(QueueKey::KillBlocker);
                }
                // Raw mode swallows ISIG; re-deliver Ctrl-C ourselves.
                0x03 => {
                    let _ = tcsetattr(&std::io::stdin(), SetArg::TCSANOW, &saved);
                    // SAFETY: raise(2) is async-signal-safe.
                    unsafe {
                        libc::raise(libc::SIGINT);
                    }
                    return;
                }
                _ => {}
            },
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }

    let _ = tcsetattr(&std::io::stdin(), SetArg::TCSANOW, &saved);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_reader_is_inert_without_tty() {
        // Test harnesses run without a controlling terminal on stdin.
        let mut reader = spawn_key_reader();
        if !reader.is_active() {
            assert_eq!(reader.recv().await, None);
        }
    }
}
