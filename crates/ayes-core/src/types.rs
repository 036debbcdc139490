//! Lifecycle types shared across the supervisor crates.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Why a supervised child stopped being supervised.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    /// Child exited with code 0.
    Normal,
    /// Child exited non-zero and no restart was attempted.
    Crash,
    /// A fatal pattern matched; the supervisor shut the child down.
    Fatal,
    /// Child was replaced by a respawn (robust restart or resume retry).
    Restarted,
    /// Registry reconciliation found the pid dead on open.
    StaleCleanup,
}

impl std::fmt::Display for ExitReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ExitReason::Normal => "normal",
            ExitReason::Crash => "crash",
            ExitReason::Fatal => "fatal",
            ExitReason::Restarted => "restarted",
            ExitReason::StaleCleanup => "stale-cleanup",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ExitReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(ExitReason::Normal),
            "crash" => Ok(ExitReason::Crash),
            "fatal" => Ok(ExitReason::Fatal),
            "restarted" => Ok(ExitReason::Restarted),
            "stale-cleanup" => Ok(ExitReason::StaleCleanup),
            other => Err(format!("unknown exit reason '{other}'")),
        }
    }
}

/// Registry status of a supervisor invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcStatus {
    /// Child is producing output.
    Active,
    /// The idle window elapsed with no output.
    Idle,
    /// Child is gone; `exit_reason` says why.
    Exited,
}

impl std::fmt::Display for ProcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ProcStatus::Active => "active",
            ProcStatus::Idle => "idle",
            ProcStatus::Exited => "exited",
        };
        write!(f, "{s}")
    }
}

impl std::str::FromStr for ProcStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(ProcStatus::Active),
            "idle" => Ok(ProcStatus::Idle),
            "exited" => Ok(ProcStatus::Exited),
            other => Err(format!("unknown process status '{other}'")),
        }
    }
}

/// What a completed supervision run hands back to the caller.
#[derive(Debug, Clone)]
pub struct SupervisorOutcome {
    /// The child's final exit code (130 on pre-ready interrupt, 1 if the
    /// child never reported one).
    pub exit_code: i32,
    /// Rendered transcript saved at shutdown.
    pub log_path: PathBuf,
    /// Unfiltered byte stream, ANSI included.
    pub raw_log_path: PathBuf,
}
