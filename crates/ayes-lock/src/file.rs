//! Lock-file I/O: tolerant reads, atomic writes with retry.

use anyhow::{Context, Result};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use crate::LockTask;

/// Backoff schedule for atomic-rename retries.
const WRITE_RETRY_DELAYS_MS: [u64; 5] = [50, 100, 200, 400, 800];

/// Read the lock file. Absence and corruption both yield an empty list;
/// corruption is logged.
pub fn read_tasks(path: &Path) -> Vec<LockTask> {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(_) => return Vec::new(),
    };
    match serde_json::from_str(&content) {
        Ok(tasks) => tasks,
        Err(e) => {
            warn!(path = %path.display(), "lock file unparsable, treating as empty: {e}");
            Vec::new()
        }
    }
}

/// Write the lock file atomically: serialize to a temp file in the same
/// directory, then rename over the target. Retries the whole sequence on
/// failure with exponential backoff (5 attempts).
pub fn write_tasks_atomic(path: &Path, tasks: &[LockTask]) -> Result<()> {
    let parent = path.parent().context("lock path has no parent")?;
    std::fs::create_dir_all(parent)
        .with_context(|| format!("failed creating {}", parent.display()))?;

    let json = serde_json::to_string_pretty(tasks).context("failed serializing lock tasks")?;

    let mut last_err = None;
    for (attempt, delay_ms) in WRITE_RETRY_DELAYS_MS.iter().enumerate() {
        match try_write_once(path, parent, &json) {
            Ok(()) => return Ok(()),
            Err(e) => {
                warn!(
                    attempt = attempt + 1,
                    path = %path.display(),
                    "atomic lock write failed, retrying in {delay_ms}ms: {e:#}"
                );
                last_err = Some(e);
                std::thread::sleep(Duration::from_millis(*delay_ms));
            }
        }
    }

    Err(last_err.unwrap()).context("atomic lock write failed after 5 attempts")
}

fn try_write_once(path: &Path, parent: &Path, json: &str) -> Result<()> {
    let mut tmp =
        tempfile::NamedTempFile::new_in(parent).context("failed creating lock temp file")?;
    tmp.write_all(json.as_bytes())
        .context("failed writing lock temp file")?;
    tmp.persist(path)
        .with_context(|| format!("failed renaming over {}", path.display()))?;
    Ok(())
}
