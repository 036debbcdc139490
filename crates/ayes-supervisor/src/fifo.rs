//! Append-prompt channel: a per-pid FIFO merged into the stdin stream.
//!
//! `agent-yes --fifo` creates `fifo/<pid>.stdin`; anything written there
//! (`echo 'also do X' > .agent-yes/fifo/<pid>.stdin`) reaches the child
//! as if typed. POSIX only; the endpoint lives and dies with the run.

use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Created FIFO endpoint; unlinked on drop.
#[derive(Debug)]
pub struct FifoChannel {
    path: PathBuf,
}

impl FifoChannel {
    /// Create the FIFO at `path` and start draining it into `tx`.
    #[cfg(unix)]
    pub fn create(path: &Path, tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<Self> {
        use nix::sys::stat::Mode;

        if path.exists() {
            std::fs::remove_file(path)
                .with_context(|| format!("failed clearing stale fifo {}", path.display()))?;
        }
        nix::unistd::mkfifo(path, Mode::S_IRUSR | Mode::S_IWUSR)
            .with_context(|| format!("failed creating fifo {}", path.display()))?;
        debug!(path = %path.display(), "append-prompt fifo ready");

        let reader_path = path.to_path_buf();
        let spawned = std::thread::Builder::new()
            .name("ayes-fifo-reader".to_string())
            .spawn(move || run_fifo_loop(&reader_path, &tx));
        if let Err(e) = spawned {
            warn!("could not start fifo reader: {e}");
        }

        Ok(Self {
            path: path.to_path_buf(),
        })
    }

    #[cfg(not(unix))]
    pub fn create(path: &Path, _tx: mpsc::UnboundedSender<Vec<u8>>) -> Result<Self> {
        anyhow::bail!(
            "append-prompt channel is not supported on this platform ({})",
            path.display()
        )
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FifoChannel {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            debug!(path = %self.path.display(), "fifo unlink skipped: {e}");
        }
    }
}

/// Open-read-reopen loop: each writer open/close cycle delivers one burst.
/// The thread ends when the channel side is gone; a reader blocked in
/// `open` after unlink is reclaimed at process exit.
#[cfg(unix)]
fn run_fifo_loop(path: &Path, tx: &mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = [0u8; 1024];
    loop {
        let mut file = match std::fs::File::open(path) {
            Ok(f) => f,
            Err(_) => return,
        };
        loop {
            match file.read(&mut buf) {
                Ok(0) => break, // writer closed; reopen for the next one
                Ok(n) => {
                    if tx.send(buf[..n].to_vec()).is_err() {
                        return;
                    }
                }
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(_) => return,
            }
        }
    }
}
