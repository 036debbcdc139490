//! The supervisor engine: PTY bridge, auto-response state machine, and
//! lifecycle orchestration for interactive coding assistants.

mod bridge;
mod cleanup;
mod control;
mod fifo;
mod idle;
mod latch;
mod raw_mode;
mod respond;
mod shared;
mod strip;
mod supervisor;

pub use cleanup::{install_signal_handlers, on_exit, run_cleanups};
pub use idle::IdleMonitor;
pub use latch::{OnceLatch, ReadyLatch, StdoutLatch};
pub use supervisor::{Supervisor, SupervisorOptions};
