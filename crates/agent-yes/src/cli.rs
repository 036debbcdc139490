//! Command-line surface.
//!
//! Shape: `agent-yes [tool] [supervisor flags] [tool args...] [-- prompt]`.
//! Parsing halts at the first non-option token: the tool name and
//! everything after it (including unknown flags) are forwarded to the
//! child verbatim. Everything after a standalone `--` is the prompt and
//! is split off before clap runs. Installing the binary as
//! `<tool>-yes` selects that tool without a positional.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use ayes_core::parse_duration;

fn parse_duration_arg(s: &str) -> Result<Duration, String> {
    parse_duration(s)
}

#[derive(Parser, Debug)]
#[command(name = "agent-yes", version)]
#[command(about = "Drive an interactive coding assistant non-interactively")]
pub struct Cli {
    /// Exit the assistant after this much quiet time (e.g. 5s, 1m)
    #[arg(long, value_parser = parse_duration_arg)]
    pub idle: Option<Duration>,

    /// Respawn with restore arguments when the assistant crashes (default)
    #[arg(long, overrides_with = "no_robust")]
    pub robust: bool,

    /// Exit instead of restarting a crashed assistant
    #[arg(long = "no-robust")]
    pub no_robust: bool,

    /// Wait behind other supervisors targeting the same repository (default)
    #[arg(long, overrides_with = "no_queue")]
    pub queue: bool,

    /// Start immediately even when the repository is busy
    #[arg(long = "no-queue")]
    pub no_queue: bool,

    /// Run the profile's install command when the tool binary is missing
    #[arg(long)]
    pub install: bool,

    /// Resume the previous session recorded for this directory
    #[arg(long = "continue")]
    pub resume: bool,

    /// Accepted for compatibility; SKILL.md prefixing is not performed
    #[arg(long = "use-skills", hide = true)]
    pub use_skills: bool,

    /// Create the per-pid append-prompt channel (fifo/<pid>.stdin)
    #[arg(long)]
    pub fifo: bool,

    /// Also write the rendered transcript to this path at exit
    #[arg(long = "logFile")]
    pub log_file: Option<PathBuf>,

    /// Debug logging (also enabled by the VERBOSE environment variable)
    #[arg(long)]
    pub verbose: bool,

    /// Prompt to inject once the assistant is ready
    #[arg(short = 'p', long)]
    pub prompt: Option<String>,

    /// Tool name followed by tool-specific arguments, forwarded verbatim
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub rest: Vec<String>,
}

impl Cli {
    pub fn effective_robust(&self) -> bool {
        !self.no_robust
    }

    pub fn effective_queue(&self) -> bool {
        !self.no_queue
    }
}

/// Split argv at the first standalone `--`: the left side goes to clap,
/// the right side joined with spaces becomes the prompt.
pub fn split_prompt_words(argv: &[String]) -> (Vec<String>, Option<String>) {
    match argv.iter().position(|a| a == "--") {
        Some(i) => {
            let words = argv[i + 1..].join(" ");
            let left = argv[..i].to_vec();
            (left, (!words.is_empty()).then_some(words))
        }
        None => (argv.to_vec(), None),
    }
}

/// Merge `--prompt` with trailing prompt words; both present concatenate.
pub fn merge_prompt(flag: Option<String>, words: Option<String>) -> Option<String> {
    match (flag, words) {
        (Some(p), Some(w)) => Some(format!("{p} {w}")),
        (Some(p), None) => Some(p),
        (None, Some(w)) => Some(w),
        (None, None) => None,
    }
}

/// Tool selected by the binary's own filename: `claude-yes` → `claude`.
pub fn tool_from_argv0(argv0: &str) -> Option<String> {
    let stem = std::path::Path::new(argv0).file_stem()?.to_str()?;
    let tool = stem.strip_suffix("-yes")?;
    (!tool.is_empty()).then(|| tool.to_string())
}
