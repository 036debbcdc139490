//! Shared types and errors for the agent-yes supervisor.

pub mod duration;
pub mod error;
pub mod types;

pub use duration::parse_duration;
pub use error::SupervisorError;
pub use types::{ExitReason, ProcStatus, SupervisorOutcome};
