//! Per-tool profiles: pattern sets, prompt transport, and line policy.
//!
//! The supervisor engine is tool-agnostic; everything tool-specific lives
//! here as data. Built-in profiles cover the assistants we ship support
//! for, and `~/.config/agent-yes/profiles.toml` can add or replace entries
//! by tool key.

mod compiled;
mod defaults;
mod profile;
mod table;

pub use compiled::CompiledProfile;
pub use profile::{LinePolicy, PromptMode, ResumeStyle, ToolProfile, TypingResponse};
pub use table::{ProfileTable, user_profiles_path};
