//! Profile schema, TOML-compatible.

use serde::{Deserialize, Serialize};

/// How the initial prompt travels to the tool.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PromptMode {
    /// Prompt becomes the first positional argument.
    FirstPositional,
    /// Prompt is appended after all other arguments.
    LastPositional,
    /// Prompt is passed behind a named flag (e.g. `-i`).
    NamedFlag { flag: String },
    /// Prompt is typed into the tool once it reports ready.
    #[default]
    StdinOnly,
}

/// How output chunks are fed to the pattern matchers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LinePolicy {
    /// Buffer until `\n`, match complete lines (default).
    #[default]
    SplitOnNewline,
    /// Match each stripped chunk as it arrives. For tools that repaint by
    /// cursor motion and never emit newlines.
    NoSplit,
}

/// How a crashed or `--continue`d session is resumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResumeStyle {
    /// Positional subcommand taking the stored id (`resume <id>`).
    /// Resuming without a stored id is an error.
    Subcommand { prefix: String },
    /// Flag pair: `with-id <id>` when a session id is stored, bare
    /// `without-id` otherwise (`--resume <id>` / `--continue`).
    Flag { with_id: String, without_id: String },
}

/// A response string and the patterns that elicit it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypingResponse {
    /// Bytes typed into the child, verbatim, bypassing the ready gate.
    pub send: String,
    /// Ordered regex list; any match fires the response.
    pub patterns: Vec<String>,
}

/// Everything the engine needs to know about one tool. Immutable per run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ToolProfile {
    /// Tool key; also the default binary name.
    pub tool: String,

    /// Binary name override when it differs from the tool key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bin: Option<String>,

    /// Arguments always prepended to the user's tool args.
    #[serde(default)]
    pub default_args: Vec<String>,

    #[serde(default)]
    pub prompt_mode: PromptMode,

    #[serde(default)]
    pub line_policy: LinePolicy,

    /// Output matching this releases the ready latch.
    #[serde(default)]
    pub ready: Vec<String>,

    /// Output matching this gets an Enter keystroke (confirmation UIs).
    #[serde(default)]
    pub enter: Vec<String>,

    /// Output matching this is unrecoverable; shut down gracefully.
    #[serde(default)]
    pub fatal: Vec<String>,

    /// Output matching this means the resume attempt itself failed;
    /// relaunch once without resume arguments.
    #[serde(default)]
    pub restart_without_continue: Vec<String>,

    #[serde(default)]
    pub typing_respond: Vec<TypingResponse>,

    /// Arguments used to respawn after a crash when no session id is known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restore_args: Option<Vec<String>>,

    /// Strings sent in order for graceful termination.
    #[serde(default = "default_exit_commands")]
    pub exit_commands: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume: Option<ResumeStyle>,

    /// Ignore ready matches in the first N chunks (noisy boot banners).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_after_chunks: Option<usize>,

    /// Shell command that installs the tool.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub install: Option<String>,

    /// Template for the directory where the tool writes its own session
    /// metadata. Placeholders: `{home}`, `{cwd-dashed}` (cwd with `/` and
    /// `.` replaced by `-`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_dir: Option<String>,
}

pub(crate) fn default_exit_commands() -> Vec<String> {
    vec!["/exit".to_string()]
}

impl ToolProfile {
    /// Minimal profile: defaults everywhere, no patterns.
    pub fn bare(tool: &str) -> Self {
        Self {
            tool: tool.to_string(),
            bin: None,
            default_args: Vec::new(),
            prompt_mode: PromptMode::default(),
            line_policy: LinePolicy::default(),
            ready: Vec::new(),
            enter: Vec::new(),
            fatal: Vec::new(),
            restart_without_continue: Vec::new(),
            typing_respond: Vec::new(),
            restore_args: None,
            exit_commands: default_exit_commands(),
            resume: None,
            ready_after_chunks: None,
            install: None,
            session_dir: None,
        }
    }

    /// The binary to spawn.
    pub fn binary(&self) -> &str {
        self.bin.as_deref().unwrap_or(&self.tool)
    }

    /// Whether resuming this tool requires a stored session id.
    pub fn resume_requires_id(&self) -> bool {
        matches!(self.resume, Some(ResumeStyle::Subcommand { .. }))
    }

    /// Arguments that resume a session: `resume <id>` / `--resume <id>` /
    /// `--continue`, depending on style and whether an id is known.
    /// `None` when the style requires an id and none is stored.
    pub fn resume_args(&self, session_id: Option<&str>) -> Option<Vec<String>> {
        match &self.resume {
            None => None,
            Some(ResumeStyle::Subcommand { prefix }) => {
                session_id.map(|id| vec![prefix.clone(), id.to_string()])
            }
            Some(ResumeStyle::Flag { with_id, without_id }) => Some(match session_id {
                Some(id) => vec![with_id.clone(), id.to_string()],
                None => vec![without_id.clone()],
            }),
        }
    }
}
