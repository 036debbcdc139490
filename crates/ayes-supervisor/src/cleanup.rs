//! Process-wide exit cleanup registry.
//!
//! Subsystems register closures (queue-lock release, registry update,
//! fifo unlink, termios restore) and the signal handlers dispatch to all
//! of them, so no single subsystem owns SIGINT/SIGTERM.

use std::sync::{Mutex, OnceLock};
use tracing::{debug, warn};

type Cleanup = Box<dyn FnMut() + Send>;

fn registry() -> &'static Mutex<Vec<Cleanup>> {
    static REGISTRY: OnceLock<Mutex<Vec<Cleanup>>> = OnceLock::new();
    REGISTRY.get_or_init(|| Mutex::new(Vec::new()))
}

/// Register a closure to run at exit (signal or normal shutdown). Each
/// closure runs at most once.
pub fn on_exit(f: impl FnMut() + Send + 'static) {
    registry().lock().unwrap().push(Box::new(f));
}

/// Run and drain every registered cleanup. Safe to call repeatedly.
pub fn run_cleanups() {
    let mut closures = match registry().lock() {
        Ok(mut guard) => std::mem::take(&mut *guard),
        Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
    };
    for f in closures.iter_mut() {
        f();
    }
}

/// Install SIGINT/SIGTERM handlers that run the cleanups and exit with
/// the conventional 128+signal code. Idempotent per process in practice:
/// call once from the supervisor bootstrap.
pub fn install_signal_handlers() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigint = match signal(SignalKind::interrupt()) {
            Ok(s) => s,
            Err(e) => {
                warn!("could not install SIGINT handler: {e}");
                return;
            }
        };
        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                warn!("could not install SIGTERM handler: {e}");
                return;
            }
        };

        tokio::spawn(async move {
            let code = tokio::select! {
                _ = sigint.recv() => 130,
                _ = sigterm.recv() => 143,
            };
            debug!(code, "signal received, running cleanups");
            run_cleanups();
            std::process::exit(code);
        });
    }
}
