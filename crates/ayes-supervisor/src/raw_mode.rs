//! RAII raw-mode guard for the host terminal.

#[cfg(unix)]
use nix::sys::termios::{SetArg, Termios, cfmakeraw, tcgetattr, tcsetattr};
use tracing::debug;

/// Saved termios state, restored on drop so every exit path leaves the
/// terminal usable.
#[derive(Debug)]
pub struct RawModeGuard {
    #[cfg(unix)]
    saved: Termios,
}

impl RawModeGuard {
    /// Put host stdin into raw mode. Returns `None` when stdin is not a
    /// terminal (piped input needs no byte-level passthrough).
    pub fn enter() -> Option<Self> {
        #[cfg(unix)]
        {
            // SAFETY: isatty only inspects the fd.
            if unsafe { libc::isatty(libc::STDIN_FILENO) } == 0 {
                return None;
            }
            let stdin = std::io::stdin();
            let saved = match tcgetattr(&stdin) {
                Ok(attrs) => attrs,
                Err(e) => {
                    debug!("tcgetattr failed, staying in cooked mode: {e}");
                    return None;
                }
            };
            let mut raw = saved.clone();
            cfmakeraw(&mut raw);
            if let Err(e) = tcsetattr(&stdin, SetArg::TCSANOW, &raw) {
                debug!("tcsetattr failed, staying in cooked mode: {e}");
                return None;
            }
            Some(Self { saved })
        }
        #[cfg(not(unix))]
        {
            None
        }
    }

    /// The saved attributes, for cleanup handlers that restore after an
    /// abnormal exit.
    #[cfg(unix)]
    pub fn saved(&self) -> Termios {
        self.saved.clone()
    }
}

impl Drop for RawModeGuard {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            let _ = tcsetattr(&std::io::stdin(), SetArg::TCSANOW, &self.saved);
        }
    }
}

/// Restore previously saved attributes (signal-exit path).
#[cfg(unix)]
pub fn restore(saved: &Termios) {
    let _ = tcsetattr(&std::io::stdin(), SetArg::TCSANOW, saved);
}
