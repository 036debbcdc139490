#[derive(thiserror::Error, Debug)]
pub enum SupervisorError {
    #[error("Unknown tool '{0}': not present in the profile table")]
    UnknownTool(String),

    #[error("Tool '{tool}' is not installed")]
    ChildNotFound {
        tool: String,
        /// Shell command that would install the tool, when the profile knows one.
        install_hint: Option<String>,
    },

    #[error("Failed to spawn '{tool}': {message}")]
    SpawnFailure { tool: String, message: String },

    #[error("No stored session to resume for '{tool}' in this directory")]
    NoSessionToResume { tool: String },
}
