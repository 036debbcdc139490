//! Cross-process queue lock keyed by git root (or resolved cwd).
//!
//! Multiple supervisors targeting the same repository serialize through a
//! single JSON array file under the user config directory. Liveness is
//! pid-based: only `running` records whose pid is still alive block, so a
//! crashed holder never wedges the queue. All writes go through a temp
//! file plus atomic rename.

mod file;
mod keys;

pub use file::{read_tasks, write_tasks_atomic};
pub use keys::{KeyReader, QueueKey, spawn_key_reader};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Poll cadence while queued behind another supervisor.
pub const QUEUE_POLL_INTERVAL: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Running,
    Queued,
    Completed,
    Failed,
}

/// One supervisor's entry in the lock file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LockTask {
    pub cwd: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub git_root: Option<String>,
    pub task: String,
    pub pid: u32,
    pub status: TaskStatus,
    pub started_at: DateTime<Utc>,
    pub locked_at: DateTime<Utc>,
}

/// Outcome of one non-blocking acquire step.
#[derive(Debug)]
pub enum AcquireStep {
    /// This pid now holds a `running` record.
    Acquired,
    /// Blocked; the file now carries a `queued` record for this pid.
    Queued { blockers: Vec<LockTask> },
}

/// Held queue lock. Releasing removes this pid's record; `Drop` is a
/// best-effort fallback for panics and early returns.
#[derive(Debug)]
pub struct QueueLock {
    path: PathBuf,
    pid: u32,
    released: bool,
}

/// `<user-config>/agent-yes/running.lock.json`.
pub fn default_lock_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "agent-yes")
        .map(|dirs| dirs.config_dir().join("running.lock.json"))
}

/// Walk up from `start` looking for a `.git` entry.
pub fn find_git_root(start: &Path) -> Option<PathBuf> {
    let start = start.canonicalize().ok()?;
    let mut current = start.as_path();
    loop {
        if current.join(".git").exists() {
            return Some(current.to_path_buf());
        }
        current = current.parent()?;
    }
}

/// Resolve `cwd` and its enclosing git root, the pair that forms the lock
/// key (`git-root ?? resolved cwd`).
pub fn lock_key(cwd: &Path) -> (PathBuf, Option<PathBuf>) {
    let resolved = cwd.canonicalize().unwrap_or_else(|_| cwd.to_path_buf());
    let git_root = find_git_root(&resolved);
    (resolved, git_root)
}

/// Whether `held` blocks `candidate`: both resolve to the same lock key.
/// When both are in repositories the git roots are compared, otherwise the
/// resolved cwds.
fn same_lock_key(held: &LockTask, cwd: &str, git_root: Option<&str>) -> bool {
    match (&held.git_root, git_root) {
        (Some(a), Some(b)) => a == b,
        _ => held.cwd == cwd,
    }
}

fn is_pid_alive(pid: u32) -> bool {
    #[cfg(unix)]
    {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        // EPERM means the process exists but belongs to someone else;
        // still a live lock holder.
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

impl QueueLock {
    /// One acquire step for `pid`: prune dead records, find live `running`
    /// blockers with the same key, and write back either a `running` or a
    /// `queued` record for this pid (replacing any prior record of ours).
    pub fn try_acquire_step(
        lock_path: &Path,
        cwd: &Path,
        task: &str,
        pid: u32,
    ) -> Result<AcquireStep> {
        let (resolved, git_root) = lock_key(cwd);
        let cwd_str = resolved.to_string_lossy().into_owned();
        let git_root_str = git_root.map(|p| p.to_string_lossy().into_owned());

        let mut tasks = read_tasks(lock_path);
        tasks.retain(|t| is_pid_alive(t.pid));

        let blockers: Vec<LockTask> = tasks
            .iter()
            .filter(|t| {
                t.pid != pid
                    && t.status == TaskStatus::Running
                    && same_lock_key(t, &cwd_str, git_root_str.as_deref())
            })
            .cloned()
            .collect();

        // Own record is replaced, never duplicated.
        tasks.retain(|t| t.pid != pid);

        let now = Utc::now();
        let status = if blockers.is_empty() {
            TaskStatus::Running
        } else {
            TaskStatus::Queued
        };
        tasks.push(LockTask {
            cwd: cwd_str,
            git_root: git_root_str,
            task: task.to_string(),
            pid,
            status,
            started_at: now,
            locked_at: now,
        });

        write_tasks_atomic(lock_path, &tasks)?;

        if blockers.is_empty() {
            Ok(AcquireStep::Acquired)
        } else {
            Ok(AcquireStep::Queued { blockers })
        }
    }

    /// Acquire the queue lock, waiting behind live holders.
    ///
    /// Polls every two seconds. While queued, single-key controls are read
    /// from the host terminal when it is one: `b` bypasses the queue, `k`
    /// sends SIGTERM to the first blocker.
    pub async fn acquire(lock_path: &Path, cwd: &Path, task: &str) -> Result<QueueLock> {
        let pid = std::process::id();

        match Self::try_acquire_step(lock_path, cwd, task, pid)? {
            AcquireStep::Acquired => {
                debug!(pid, "queue lock acquired immediately");
                return Ok(QueueLock {
                    path: lock_path.to_path_buf(),
                    pid,
                    released: false,
                });
            }
            AcquireStep::Queued { blockers } => {
                info!(
                    pid,
                    blocking_pid = blockers.first().map(|b| b.pid),
                    "another supervisor holds this repository; queued \
                     (press 'b' to bypass, 'k' to kill the holder)"
                );
            }
        }

        let mut keys = spawn_key_reader();
        let mut keys_active = keys.is_active();
        loop {
            let key = tokio::select! {
                _ = tokio::time::sleep(QUEUE_POLL_INTERVAL) => None,
                key = keys.recv(), if keys_active => {
                    if key.is_none() {
                        keys_active = false;
                    }
                    key
                }
            };

            match key {
                Some(QueueKey::Bypass) => {
                    info!(pid, "queue bypassed by user");
                    Self::force_running(lock_path, pid)?;
                    return Ok(QueueLock {
                        path: lock_path.to_path_buf(),
                        pid,
                        released: false,
                    });
                }
                Some(QueueKey::KillBlocker) => {
                    if let AcquireStep::Queued { blockers } =
                        Self::try_acquire_step(lock_path, cwd, task, pid)?
                    {
                        if let Some(first) = blockers.first() {
                            info!(blocker = first.pid, "terminating queue holder on request");
                            terminate_pid(first.pid);
                        }
                        continue;
                    }
                    // Re-check found no blockers; fall through as acquired.
                    debug!(pid, "queue cleared during kill request");
                    return Ok(QueueLock {
                        path: lock_path.to_path_buf(),
                        pid,
                        released: false,
                    });
                }
                None => match Self::try_acquire_step(lock_path, cwd, task, pid)? {
                    AcquireStep::Acquired => {
                        debug!(pid, "queue lock acquired after waiting");
                        return Ok(QueueLock {
                            path: lock_path.to_path_buf(),
                            pid,
                            released: false,
                        });
                    }
                    AcquireStep::Queued { .. } => continue,
                },
            }
        }
    }

    /// Flip this pid's record to `running` regardless of blockers.
    fn force_running(lock_path: &Path, pid: u32) -> Result<()> {
        let mut tasks = read_tasks(lock_path);
        let now = Utc::now();
        for t in tasks.iter_mut().filter(|t| t.pid == pid) {
            t.status = TaskStatus::Running;
            t.locked_at = now;
        }
        write_tasks_atomic(lock_path, &tasks)
    }

    /// Remove this pid's record. Idempotent.
    pub fn release(&mut self) -> Result<()> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        release_pid(&self.path, self.pid)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn lock_path(&self) -> &Path {
        &self.path
    }
}

impl Drop for QueueLock {
    fn drop(&mut self) {
        if !self.released {
            if let Err(e) = self.release() {
                warn!("queue lock release on drop failed: {e:#}");
            }
        }
    }
}

/// Remove `pid`'s record from the lock file. Used by [`QueueLock::release`]
/// and by exit/signal cleanup handlers that only hold path and pid.
pub fn release_pid(lock_path: &Path, pid: u32) -> Result<()> {
    let mut tasks = read_tasks(lock_path);
    tasks.retain(|t| t.pid != pid);
    write_tasks_atomic(lock_path, &tasks)
        .with_context(|| format!("failed releasing queue lock {}", lock_path.display()))
}

fn terminate_pid(pid: u32) {
    #[cfg(unix)]
    {
        if let Ok(raw) = i32::try_from(pid) {
            let _ = nix::sys::signal::kill(
                nix::unistd::Pid::from_raw(raw),
                nix::sys::signal::Signal::SIGTERM,
            );
        }
    }
    #[cfg(not(unix))]
    {
        let _ = pid;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn lock_file(dir: &Path) -> PathBuf {
        dir.join("running.lock.json")
    }

    #[test]
    fn test_acquire_step_on_empty_file() {
        let tmp = tempdir().unwrap();
        let path = lock_file(tmp.path());

        let step =
            QueueLock::try_acquire_step(&path, tmp.path(), "task one", std::process::id()).unwrap();
        assert!(matches!(step, AcquireStep::Acquired));

        let tasks = read_tasks(&path);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].status, TaskStatus::Running);
        assert_eq!(tasks[0].pid, std::process::id());
    }

    #[test]
    fn test_corrupt_file_treated_as_absent() {
        let tmp = tempdir().unwrap();
        let path = lock_file(tmp.path());
        std::fs::write(&path, "not json at all").unwrap();

        let step =
            QueueLock::try_acquire_step(&path, tmp.path(), "task", std::process::id()).unwrap();
        assert!(matches!(step, AcquireStep::Acquired));
    }

    #[test]
    fn test_dead_holder_does_not_block() {
        let tmp = tempdir().unwrap();
        let path = lock_file(tmp.path());
        let resolved = tmp.path().canonicalize().unwrap();

        let now = Utc::now();
        write_tasks_atomic(
            &path,
            &[LockTask {
                cwd: resolved.to_string_lossy().into_owned(),
                git_root: None,
                task: "ghost".to_string(),
                pid: 4_000_100,
                status: TaskStatus::Running,
                started_at: now,
                locked_at: now,
            }],
        )
        .unwrap();

        let step =
            QueueLock::try_acquire_step(&path, tmp.path(), "task", std::process::id()).unwrap();
        assert!(matches!(step, AcquireStep::Acquired));

        // The dead record was pruned.
        let tasks = read_tasks(&path);
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].pid, std::process::id());
    }

    #[test]
    fn test_live_holder_blocks_same_cwd() {
        let tmp = tempdir().unwrap();
        let path = lock_file(tmp.path());
        let resolved = tmp.path().canonicalize().unwrap();

        // A live pid that is not ours: pid 1 (init) is always alive.
        let now = Utc::now();
        write_tasks_atomic(
            &path,
            &[LockTask {
                cwd: resolved.to_string_lossy().into_owned(),
                git_root: None,
                task: "holder".to_string(),
                pid: 1,
                status: TaskStatus::Running,
                started_at: now,
                locked_at: now,
            }],
        )
        .unwrap();

        let step =
            QueueLock::try_acquire_step(&path, tmp.path(), "task", std::process::id()).unwrap();
        match step {
            AcquireStep::Queued { blockers } => {
                assert_eq!(blockers.len(), 1);
                assert_eq!(blockers[0].pid, 1);
            }
            AcquireStep::Acquired => panic!("expected queued"),
        }

        // Own queued record was appended.
        let tasks = read_tasks(&path);
        assert_eq!(tasks.len(), 2);
        assert!(
            tasks
                .iter()
                .any(|t| t.pid == std::process::id() && t.status == TaskStatus::Queued)
        );
    }

    #[test]
    fn test_different_cwd_does_not_block() {
        let tmp_a = tempdir().unwrap();
        let tmp_b = tempdir().unwrap();
        let path = lock_file(tmp_a.path());
        let resolved_b = tmp_b.path().canonicalize().unwrap();

        let now = Utc::now();
        write_tasks_atomic(
            &path,
            &[LockTask {
                cwd: resolved_b.to_string_lossy().into_owned(),
                git_root: None,
                task: "elsewhere".to_string(),
                pid: 1,
                status: TaskStatus::Running,
                started_at: now,
                locked_at: now,
            }],
        )
        .unwrap();

        let step =
            QueueLock::try_acquire_step(&path, tmp_a.path(), "task", std::process::id()).unwrap();
        assert!(matches!(step, AcquireStep::Acquired));
    }

    #[test]
    fn test_shared_git_root_blocks_across_subdirs() {
        let tmp = tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        let sub = tmp.path().join("deep/nested");
        std::fs::create_dir_all(&sub).unwrap();
        let path = lock_file(tmp.path());

        let root = tmp.path().canonicalize().unwrap();
        let now = Utc::now();
        write_tasks_atomic(
            &path,
            &[LockTask {
                cwd: root.to_string_lossy().into_owned(),
                git_root: Some(root.to_string_lossy().into_owned()),
                task: "repo holder".to_string(),
                pid: 1,
                status: TaskStatus::Running,
                started_at: now,
                locked_at: now,
            }],
        )
        .unwrap();

        // Acquiring from a subdirectory of the same repo queues.
        let step = QueueLock::try_acquire_step(&path, &sub, "task", std::process::id()).unwrap();
        assert!(matches!(step, AcquireStep::Queued { .. }));
    }

    #[test]
    fn test_reacquire_replaces_own_record() {
        let tmp = tempdir().unwrap();
        let path = lock_file(tmp.path());
        let pid = std::process::id();

        QueueLock::try_acquire_step(&path, tmp.path(), "first", pid).unwrap();
        QueueLock::try_acquire_step(&path, tmp.path(), "second", pid).unwrap();

        let tasks = read_tasks(&path);
        assert_eq!(tasks.len(), 1, "own record replaced, not duplicated");
        assert_eq!(tasks[0].task, "second");
    }

    #[test]
    fn test_release_removes_record() {
        let tmp = tempdir().unwrap();
        let path = lock_file(tmp.path());
        let pid = std::process::id();

        QueueLock::try_acquire_step(&path, tmp.path(), "task", pid).unwrap();
        let mut lock = QueueLock {
            path: path.clone(),
            pid,
            released: false,
        };
        lock.release().unwrap();
        assert!(read_tasks(&path).is_empty());

        // Idempotent.
        lock.release().unwrap();
    }

    #[test]
    fn test_find_git_root() {
        let tmp = tempdir().unwrap();
        std::fs::create_dir(tmp.path().join(".git")).unwrap();
        let sub = tmp.path().join("a/b");
        std::fs::create_dir_all(&sub).unwrap();

        let root = find_git_root(&sub).unwrap();
        assert_eq!(root, tmp.path().canonicalize().unwrap());
    }

    #[test]
    fn test_find_git_root_none_outside_repo() {
        let tmp = tempdir().unwrap();
        assert_eq!(find_git_root(tmp.path()), None);
    }
}
