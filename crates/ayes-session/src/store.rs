//! Persistent directory → session-id store.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// At most this many records are kept per directory, newest first.
const MAX_RECORDS_PER_DIR: usize = 5;

/// One observed session id for a directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SessionRecord {
    pub session_id: String,
    pub last_used: DateTime<Utc>,
}

/// User-wide session store, one JSON file mapping resolved directories to
/// their recent session ids.
#[derive(Debug)]
pub struct SessionStore {
    path: PathBuf,
    records: HashMap<String, Vec<SessionRecord>>,
}

/// `<user-config>/agent-yes/codex-sessions.json`.
pub fn default_store_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "agent-yes")
        .map(|dirs| dirs.config_dir().join("codex-sessions.json"))
}

impl SessionStore {
    /// Open the store at `path`. A missing or malformed file is treated as
    /// empty; the next save rewrites it.
    pub fn open(path: PathBuf) -> Self {
        let records = match std::fs::read_to_string(&path) {
            Ok(content) => match serde_json::from_str(&content) {
                Ok(records) => records,
                Err(e) => {
                    warn!(path = %path.display(), "session store unparsable, starting empty: {e}");
                    HashMap::new()
                }
            },
            Err(_) => HashMap::new(),
        };
        Self { path, records }
    }

    /// Open at the default user-config location.
    pub fn open_default() -> Result<Self> {
        let path = default_store_path().context("cannot resolve user config directory")?;
        Ok(Self::open(path))
    }

    /// Newest stored session id for `dir`, if any.
    pub fn lookup(&self, dir: &Path) -> Option<&str> {
        self.records
            .get(&key_for(dir))
            .and_then(|list| list.first())
            .map(|r| r.session_id.as_str())
    }

    /// Record `session_id` as the newest for `dir` and persist.
    ///
    /// Re-observing a known id moves it to the front with a fresh
    /// timestamp; the list is capped at five records.
    pub fn record(&mut self, dir: &Path, session_id: &str) -> Result<()> {
        let list = self.records.entry(key_for(dir)).or_default();
        list.retain(|r| r.session_id != session_id);
        list.insert(
            0,
            SessionRecord {
                session_id: session_id.to_string(),
                last_used: Utc::now(),
            },
        );
        list.truncate(MAX_RECORDS_PER_DIR);
        self.save()
    }

    /// Write the store atomically: temp file in the same directory, then
    /// rename over the target.
    fn save(&self) -> Result<()> {
        let parent = self
            .path
            .parent()
            .context("session store path has no parent")?;
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed creating {}", parent.display()))?;

        let json = serde_json::to_string_pretty(&self.records)?;
        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .context("failed creating session store temp file")?;
        tmp.write_all(json.as_bytes())?;
        tmp.persist(&self.path)
            .with_context(|| format!("failed replacing {}", self.path.display()))?;
        Ok(())
    }

    #[cfg(test)]
    fn records_for(&self, dir: &Path) -> Option<&Vec<SessionRecord>> {
        self.records.get(&key_for(dir))
    }
}

/// Directories are keyed by their resolved absolute path so symlinked
/// spellings of the same workdir share a history.
fn key_for(dir: &Path) -> String {
    dir.canonicalize()
        .unwrap_or_else(|_| dir.to_path_buf())
        .to_string_lossy()
        .into_owned()
}
