//! Built-in tool profiles.
//!
//! Pattern strings are data, not code: they mirror what each assistant
//! actually prints and are expected to drift with tool releases. Users
//! patch them via `profiles.toml` without rebuilding.

use crate::profile::{LinePolicy, PromptMode, ResumeStyle, ToolProfile, TypingResponse};

pub(crate) fn builtin_profiles() -> Vec<ToolProfile> {
    vec![claude(), codex(), gemini(), copilot(), amp()]
}

fn claude() -> ToolProfile {
    ToolProfile {
        prompt_mode: PromptMode::LastPositional,
        ready: vec![
            r"\? for shortcuts".to_string(),
            r"Welcome to Claude".to_string(),
        ],
        enter: vec![
            r"❯ 1\. Yes".to_string(),
            r"Do you want to proceed\?".to_string(),
            r"Press Enter to continue".to_string(),
        ],
        fatal: vec![
            r"Claude usage limit reached\.".to_string(),
            r"Invalid API key".to_string(),
            r"OAuth token (?:expired|revoked)".to_string(),
        ],
        restart_without_continue: vec![
            r"No conversation found to continue".to_string(),
            r"tool_use.*without.*tool_result".to_string(),
        ],
        typing_respond: vec![TypingResponse {
            send: "1".to_string(),
            patterns: vec![r"Do you trust the files in this folder\?".to_string()],
        }],
        restore_args: Some(vec!["--continue".to_string()]),
        resume: Some(ResumeStyle::Flag {
            with_id: "--resume".to_string(),
            without_id: "--continue".to_string(),
        }),
        install: Some("npm install -g @anthropic-ai/claude-code".to_string()),
        session_dir: Some("{home}/.claude/projects/{cwd-dashed}".to_string()),
        ..ToolProfile::bare("claude")
    }
}

fn codex() -> ToolProfile {
    ToolProfile {
        prompt_mode: PromptMode::LastPositional,
        ready: vec![
            r"Ctrl\+C to exit".to_string(),
            r"/status for session".to_string(),
        ],
        enter: vec![
            r"❯ 1\. Yes".to_string(),
            r"Press enter to confirm".to_string(),
        ],
        fatal: vec![
            r"You've hit your usage limit".to_string(),
            r"stream error: unauthorized".to_string(),
        ],
        restart_without_continue: vec![r"No recorded session found".to_string()],
        typing_respond: vec![TypingResponse {
            send: "y".to_string(),
            patterns: vec![r"Allow command\?".to_string()],
        }],
        restore_args: Some(vec!["resume".to_string(), "--last".to_string()]),
        exit_commands: vec!["/quit".to_string()],
        resume: Some(ResumeStyle::Subcommand {
            prefix: "resume".to_string(),
        }),
        install: Some("npm install -g @openai/codex".to_string()),
        ..ToolProfile::bare("codex")
    }
}

fn gemini() -> ToolProfile {
    ToolProfile {
        prompt_mode: PromptMode::NamedFlag {
            flag: "-i".to_string(),
        },
        // Gemini repaints the whole screen with cursor motion; there are
        // no newlines to split on, and the boot banner scrolls for dozens
        // of chunks before the input box is real.
        line_policy: LinePolicy::NoSplit,
        ready_after_chunks: Some(80),
        ready: vec![r"Type your message".to_string()],
        enter: vec![
            r"● 1\. Yes, allow once".to_string(),
            r"Apply this change\?".to_string(),
        ],
        fatal: vec![
            r"Quota exceeded".to_string(),
            r"429.*RESOURCE_EXHAUSTED".to_string(),
        ],
        restart_without_continue: Vec::new(),
        typing_respond: Vec::new(),
        restore_args: None,
        exit_commands: vec!["/quit".to_string()],
        install: Some("npm install -g @google/gemini-cli".to_string()),
        ..ToolProfile::bare("gemini")
    }
}

fn copilot() -> ToolProfile {
    ToolProfile {
        ready: vec![r"How can I help".to_string()],
        enter: vec![r"❯ 1\. Yes".to_string(), r"Confirm with Enter".to_string()],
        fatal: vec![r"Rate limit exceeded".to_string()],
        restore_args: Some(vec!["--continue".to_string()]),
        resume: Some(ResumeStyle::Flag {
            with_id: "--resume".to_string(),
            without_id: "--continue".to_string(),
        }),
        install: Some("npm install -g @github/copilot".to_string()),
        ..ToolProfile::bare("copilot")
    }
}

fn amp() -> ToolProfile {
    ToolProfile {
        ready: vec![r"∿".to_string(), r"amp ›".to_string()],
        enter: vec![r"❯ Yes".to_string()],
        fatal: vec![r"Out of free credits".to_string()],
        install: Some("npm install -g @sourcegraph/amp".to_string()),
        ..ToolProfile::bare("amp")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CompiledProfile;

    #[test]
    fn test_all_builtin_profiles_compile() {
        for profile in builtin_profiles() {
            let tool = profile.tool.clone();
            CompiledProfile::compile(profile)
                .unwrap_or_else(|e| panic!("profile '{tool}' has an invalid pattern: {e}"));
        }
    }

    #[test]
    fn test_builtin_keys_are_unique() {
        let mut keys: Vec<String> = builtin_profiles().into_iter().map(|p| p.tool).collect();
        let before = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), before);
    }

    #[test]
    fn test_gemini_is_no_split_with_ready_gate() {
        let gemini = builtin_profiles()
            .into_iter()
            .find(|p| p.tool == "gemini")
            .unwrap();
        assert_eq!(gemini.line_policy, LinePolicy::NoSplit);
        assert_eq!(gemini.ready_after_chunks, Some(80));
    }

    #[test]
    fn test_claude_fatal_matches_usage_limit_line() {
        let claude = CompiledProfile::compile(claude()).unwrap();
        assert!(claude.fatal_matches("Claude usage limit reached."));
    }

    #[test]
    fn test_default_exit_commands_where_unset() {
        let claude = claude();
        assert_eq!(claude.exit_commands, vec!["/exit"]);
        let codex = codex();
        assert_eq!(codex.exit_commands, vec!["/quit"]);
    }
}
