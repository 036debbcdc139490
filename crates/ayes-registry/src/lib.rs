//! Per-working-directory registry of supervisor invocations.
//!
//! Backing store is `store.sqlite` under `<cwd>/.agent-yes/`, opened in WAL
//! mode so concurrent supervisors in the same directory can write safely.
//! The registry also owns the log/fifo path naming convention.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use ayes_core::{ExitReason, ProcStatus};

/// Directory name created under the working directory.
pub const STATE_DIR_NAME: &str = ".agent-yes";

/// One supervisor invocation, as stored.
#[derive(Debug, Clone)]
pub struct PidRecord {
    pub pid: u32,
    pub tool: String,
    pub args: Vec<String>,
    pub prompt: Option<String>,
    pub log_path: PathBuf,
    pub fifo_path: PathBuf,
    pub status: ProcStatus,
    pub exit_reason: Option<ExitReason>,
    pub exit_code: Option<i32>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Open handle to a working directory's registry.
#[derive(Debug)]
pub struct PidRegistry {
    conn: Connection,
    root: PathBuf,
}

impl PidRegistry {
    /// Open (creating if absent) the registry for `cwd`.
    ///
    /// Creates the `.agent-yes/{logs,fifo}` layout, then reconciles: any
    /// non-exited row whose pid is no longer alive is flipped to
    /// `exited`/`stale-cleanup`.
    pub fn open(cwd: &Path) -> Result<Self> {
        let root = cwd.join(STATE_DIR_NAME);
        std::fs::create_dir_all(root.join("logs"))
            .with_context(|| format!("failed creating {}", root.join("logs").display()))?;
        std::fs::create_dir_all(root.join("fifo"))
            .with_context(|| format!("failed creating {}", root.join("fifo").display()))?;

        let db_path = root.join("store.sqlite");
        let conn = Connection::open(&db_path)
            .with_context(|| format!("failed opening {}", db_path.display()))?;

        // WAL lets a second supervisor in the same directory read while we
        // hold a write. Failure is non-fatal (e.g. read-only mounts).
        if let Err(e) = conn.pragma_update(None, "journal_mode", "WAL") {
            warn!("could not enable WAL on pid registry: {e}");
        }
        conn.pragma_update(None, "busy_timeout", 5_000)
            .context("failed setting busy_timeout")?;

        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS procs (
                pid         INTEGER PRIMARY KEY,
                tool        TEXT NOT NULL,
                args        TEXT NOT NULL,
                prompt      TEXT,
                log_path    TEXT NOT NULL,
                fifo_path   TEXT NOT NULL,
                status      TEXT NOT NULL,
                exit_reason TEXT,
                exit_code   INTEGER,
                started_at  TEXT NOT NULL,
                updated_at  TEXT NOT NULL
            )",
        )
        .context("failed creating procs table")?;

        let registry = Self { conn, root };
        registry.reconcile_stale()?;
        Ok(registry)
    }

    /// `.agent-yes/` root this registry manages.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rendered transcript: `logs/<pid>.log`.
    pub fn log_path(&self, pid: u32) -> PathBuf {
        self.root.join("logs").join(format!("{pid}.log"))
    }

    /// Unfiltered stream: `logs/<pid>.raw.log`.
    pub fn raw_log_path(&self, pid: u32) -> PathBuf {
        self.root.join("logs").join(format!("{pid}.raw.log"))
    }

    /// Debug trace: `logs/<pid>.debug.log`.
    pub fn debug_log_path(&self, pid: u32) -> PathBuf {
        self.root.join("logs").join(format!("{pid}.debug.log"))
    }

    /// Append-prompt channel endpoint: `fifo/<pid>.stdin`.
    pub fn fifo_path(&self, pid: u32) -> PathBuf {
        self.root.join("fifo").join(format!("{pid}.stdin"))
    }

    /// Insert a new row for `pid`, or reset an existing row to active on
    /// pid collision (the OS recycled the pid).
    pub fn register(
        &self,
        pid: u32,
        tool: &str,
        args: &[String],
        prompt: Option<&str>,
    ) -> Result<()> {
        let now = Utc::now().to_rfc3339();
        let args_json = serde_json::to_string(args)?;
        self.conn
            .execute(
                "INSERT INTO procs
                    (pid, tool, args, prompt, log_path, fifo_path, status,
                     exit_reason, exit_code, started_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'active', NULL, NULL, ?7, ?7)
                 ON CONFLICT(pid) DO UPDATE SET
                    tool = excluded.tool,
                    args = excluded.args,
                    prompt = excluded.prompt,
                    log_path = excluded.log_path,
                    fifo_path = excluded.fifo_path,
                    status = 'active',
                    exit_reason = NULL,
                    exit_code = NULL,
                    started_at = excluded.started_at,
                    updated_at = excluded.updated_at",
                params![
                    pid,
                    tool,
                    args_json,
                    prompt,
                    self.log_path(pid).to_string_lossy().into_owned(),
                    self.fifo_path(pid).to_string_lossy().into_owned(),
                    now,
                ],
            )
            .context("failed registering pid")?;
        Ok(())
    }

    /// Update a row's status. Idempotent; always bumps `updated_at`.
    ///
    /// Flipping to `exited` requires a reason (invariant: exited rows carry
    /// a non-empty exit reason).
    pub fn update_status(
        &self,
        pid: u32,
        status: ProcStatus,
        reason: Option<ExitReason>,
        exit_code: Option<i32>,
    ) -> Result<()> {
        if status == ProcStatus::Exited && reason.is_none() {
            anyhow::bail!("exited status requires an exit reason");
        }
        let now = Utc::now().to_rfc3339();
        self.conn
            .execute(
                "UPDATE procs SET status = ?2, exit_reason = ?3, exit_code = ?4,
                    updated_at = ?5
                 WHERE pid = ?1",
                params![
                    pid,
                    status.to_string(),
                    reason.map(|r| r.to_string()),
                    exit_code,
                    now,
                ],
            )
            .context("failed updating pid status")?;
        Ok(())
    }

    /// Fetch one row.
    pub fn get(&self, pid: u32) -> Result<Option<PidRecord>> {
        self.conn
            .query_row(
                "SELECT pid, tool, args, prompt, log_path, fifo_path, status,
                        exit_reason, exit_code, started_at, updated_at
                 FROM procs WHERE pid = ?1",
                params![pid],
                row_to_record,
            )
            .optional()
            .context("failed reading pid row")
    }

    /// All rows, newest first.
    pub fn list(&self) -> Result<Vec<PidRecord>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT pid, tool, args, prompt, log_path, fifo_path, status,
                        exit_reason, exit_code, started_at, updated_at
                 FROM procs ORDER BY started_at DESC",
            )
            .context("failed preparing list query")?;
        let rows = stmt
            .query_map([], row_to_record)
            .context("failed listing pid rows")?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row.context("failed decoding pid row")?);
        }
        Ok(records)
    }

    /// Mark dead non-exited rows as `exited`/`stale-cleanup`.
    fn reconcile_stale(&self) -> Result<()> {
        let mut stmt = self
            .conn
            .prepare("SELECT pid FROM procs WHERE status != 'exited'")
            .context("failed preparing reconcile query")?;
        let pids: Vec<u32> = stmt
            .query_map([], |row| row.get(0))
            .context("failed scanning live rows")?
            .filter_map(|r| r.ok())
            .collect();
        drop(stmt);

        for pid in pids {
            if !pid_alive(pid) {
                debug!(pid, "reclaiming stale registry row");
                self.update_status(
                    pid,
                    ProcStatus::Exited,
                    Some(ExitReason::StaleCleanup),
                    None,
                )?;
            }
        }
        Ok(())
    }

    /// Close the registry; compaction is best-effort.
    pub fn close(self) {
        if let Err(e) = self.conn.execute_batch("VACUUM") {
            debug!("registry vacuum skipped: {e}");
        }
    }
}

fn row_to_record(row: &rusqlite::Row<'_>) -> rusqlite::Result<PidRecord> {
    let args_json: String = row.get(2)?;
    let status_str: String = row.get(6)?;
    let reason_str: Option<String> = row.get(7)?;
    let started_at: String = row.get(9)?;
    let updated_at: String = row.get(10)?;
    let log_path: String = row.get(4)?;
    let fifo_path: String = row.get(5)?;

    Ok(PidRecord {
        pid: row.get(0)?,
        tool: row.get(1)?,
        args: serde_json::from_str(&args_json).unwrap_or_default(),
        prompt: row.get(3)?,
        log_path: PathBuf::from(log_path),
        fifo_path: PathBuf::from(fifo_path),
        status: status_str.parse().unwrap_or(ProcStatus::Exited),
        exit_reason: reason_str.and_then(|s| s.parse().ok()),
        exit_code: row.get(8)?,
        started_at: parse_timestamp(&started_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

/// Whether `pid` refers to a live process (signal 0 probe). EPERM counts
/// as alive: the process exists under another uid.
pub fn pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match nix::sys::signal::kill(nix::unistd::Pid::from_raw(raw), None) {
            Ok(()) => true,
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_open_creates_layout() {
        let tmp = tempdir().unwrap();
        let registry = PidRegistry::open(tmp.path()).unwrap();
        assert!(tmp.path().join(".agent-yes/logs").is_dir());
        assert!(tmp.path().join(".agent-yes/fifo").is_dir());
        assert!(tmp.path().join(".agent-yes/store.sqlite").is_file());
        drop(registry);
    }

    #[test]
    fn test_path_conventions() {
        let tmp = tempdir().unwrap();
        let registry = PidRegistry::open(tmp.path()).unwrap();
        let root = tmp.path().join(".agent-yes");
        assert_eq!(registry.log_path(42), root.join("logs/42.log"));
        assert_eq!(registry.raw_log_path(42), root.join("logs/42.raw.log"));
        assert_eq!(registry.debug_log_path(42), root.join("logs/42.debug.log"));
        assert_eq!(registry.fifo_path(42), root.join("fifo/42.stdin"));
    }

    #[test]
    fn test_register_and_get() {
        let tmp = tempdir().unwrap();
        let registry = PidRegistry::open(tmp.path()).unwrap();
        let my_pid = std::process::id();
        registry
            .register(my_pid, "claude", &args(&["--continue"]), Some("do it"))
            .unwrap();

        let record = registry.get(my_pid).unwrap().expect("row exists");
        assert_eq!(record.tool, "claude");
        assert_eq!(record.args, vec!["--continue"]);
        assert_eq!(record.prompt.as_deref(), Some("do it"));
        assert_eq!(record.status, ProcStatus::Active);
        assert!(record.exit_reason.is_none());
    }

    #[test]
    fn test_register_pid_collision_resets_row() {
        let tmp = tempdir().unwrap();
        let registry = PidRegistry::open(tmp.path()).unwrap();
        let my_pid = std::process::id();

        registry.register(my_pid, "claude", &[], None).unwrap();
        registry
            .update_status(
                my_pid,
                ProcStatus::Exited,
                Some(ExitReason::Normal),
                Some(0),
            )
            .unwrap();

        registry.register(my_pid, "codex", &[], None).unwrap();
        let record = registry.get(my_pid).unwrap().unwrap();
        assert_eq!(record.tool, "codex");
        assert_eq!(record.status, ProcStatus::Active);
        assert!(record.exit_reason.is_none());
        assert!(record.exit_code.is_none());
    }

    #[test]
    fn test_exited_requires_reason() {
        let tmp = tempdir().unwrap();
        let registry = PidRegistry::open(tmp.path()).unwrap();
        let my_pid = std::process::id();
        registry.register(my_pid, "claude", &[], None).unwrap();

        let err = registry.update_status(my_pid, ProcStatus::Exited, None, Some(1));
        assert!(err.is_err());
    }

    #[test]
    fn test_update_status_idempotent() {
        let tmp = tempdir().unwrap();
        let registry = PidRegistry::open(tmp.path()).unwrap();
        let my_pid = std::process::id();
        registry.register(my_pid, "claude", &[], None).unwrap();

        for _ in 0..2 {
            registry
                .update_status(my_pid, ProcStatus::Idle, None, None)
                .unwrap();
        }
        let record = registry.get(my_pid).unwrap().unwrap();
        assert_eq!(record.status, ProcStatus::Idle);
    }

    #[test]
    fn test_stale_rows_reclaimed_on_open() {
        let tmp = tempdir().unwrap();
        {
            let registry = PidRegistry::open(tmp.path()).unwrap();
            // A pid from the kernel's theoretical range that is certainly
            // not alive in the test environment.
            registry.register(4_000_000, "claude", &[], None).unwrap();
        }

        let registry = PidRegistry::open(tmp.path()).unwrap();
        let record = registry.get(4_000_000).unwrap().unwrap();
        assert_eq!(record.status, ProcStatus::Exited);
        assert_eq!(record.exit_reason, Some(ExitReason::StaleCleanup));
    }

    #[test]
    fn test_live_rows_survive_reconcile() {
        let tmp = tempdir().unwrap();
        let my_pid = std::process::id();
        {
            let registry = PidRegistry::open(tmp.path()).unwrap();
            registry.register(my_pid, "claude", &[], None).unwrap();
        }

        let registry = PidRegistry::open(tmp.path()).unwrap();
        let record = registry.get(my_pid).unwrap().unwrap();
        assert_eq!(record.status, ProcStatus::Active);
    }

    #[test]
    fn test_list_returns_all_rows() {
        let tmp = tempdir().unwrap();
        let registry = PidRegistry::open(tmp.path()).unwrap();
        let my_pid = std::process::id();
        registry.register(my_pid, "claude", &[], None).unwrap();
        registry.register(4_000_001, "codex", &[], None).unwrap();

        let rows = registry.list().unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_pid_alive_self() {
        assert!(pid_alive(std::process::id()));
        assert!(!pid_alive(4_000_002));
    }
}
