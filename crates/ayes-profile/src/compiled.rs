//! Compiled form of a profile: regex lists built once at startup.

use anyhow::{Context, Result};
use regex::Regex;

use crate::profile::ToolProfile;

/// A [`ToolProfile`] with every pattern list compiled.
///
/// Pattern order within each list is preserved; the engine fires on the
/// first match.
#[derive(Debug)]
pub struct CompiledProfile {
    pub profile: ToolProfile,
    pub ready: Vec<Regex>,
    pub enter: Vec<Regex>,
    pub fatal: Vec<Regex>,
    pub restart_without_continue: Vec<Regex>,
    /// (response string, patterns) pairs, in profile order.
    pub typing_respond: Vec<(String, Vec<Regex>)>,
}

impl CompiledProfile {
    pub fn compile(profile: ToolProfile) -> Result<Self> {
        let ready = compile_list(&profile.ready, "ready")?;
        let enter = compile_list(&profile.enter, "enter")?;
        let fatal = compile_list(&profile.fatal, "fatal")?;
        let restart_without_continue =
            compile_list(&profile.restart_without_continue, "restart-without-continue")?;

        let mut typing_respond = Vec::with_capacity(profile.typing_respond.len());
        for entry in &profile.typing_respond {
            typing_respond.push((
                entry.send.clone(),
                compile_list(&entry.patterns, "typing-respond")?,
            ));
        }

        Ok(Self {
            profile,
            ready,
            enter,
            fatal,
            restart_without_continue,
            typing_respond,
        })
    }

    /// First ready pattern matching `chunk`, honoring the boot-banner gate:
    /// ready matches inside the first `ready_after_chunks` chunks are ignored.
    pub fn ready_matches(&self, chunk: &str, chunk_index: usize) -> bool {
        if let Some(min) = self.profile.ready_after_chunks {
            if chunk_index <= min {
                return false;
            }
        }
        self.ready.iter().any(|re| re.is_match(chunk))
    }

    pub fn enter_matches(&self, chunk: &str) -> bool {
        self.enter.iter().any(|re| re.is_match(chunk))
    }

    pub fn fatal_matches(&self, chunk: &str) -> bool {
        self.fatal.iter().any(|re| re.is_match(chunk))
    }

    pub fn restart_matches(&self, chunk: &str) -> bool {
        self.restart_without_continue
            .iter()
            .any(|re| re.is_match(chunk))
    }

    /// Response string for the first typing-respond entry whose pattern
    /// list matches, if any.
    pub fn typing_response(&self, chunk: &str) -> Option<&str> {
        self.typing_respond
            .iter()
            .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(chunk)))
            .map(|(send, _)| send.as_str())
    }
}

fn compile_list(patterns: &[String], field: &str) -> Result<Vec<Regex>> {
    patterns
        .iter()
        .map(|p| Regex::new(p).with_context(|| format!("invalid {field} pattern: {p}")))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compiled(mutate: impl FnOnce(&mut ToolProfile)) -> CompiledProfile {
        let mut p = ToolProfile::bare("t");
        mutate(&mut p);
        CompiledProfile::compile(p).unwrap()
    }

    #[test]
    fn test_invalid_pattern_is_an_error() {
        let mut p = ToolProfile::bare("t");
        p.ready = vec!["(".to_string()];
        let err = CompiledProfile::compile(p).unwrap_err().to_string();
        assert!(err.contains("ready"), "error names the field: {err}");
    }

    #[test]
    fn test_ready_gate_holds_for_early_chunks() {
        let c = compiled(|p| {
            p.ready = vec!["Type your message".to_string()];
            p.ready_after_chunks = Some(80);
        });
        assert!(!c.ready_matches("Type your message", 1));
        assert!(!c.ready_matches("Type your message", 80));
        assert!(c.ready_matches("Type your message", 81));
    }

    #[test]
    fn test_ready_without_gate() {
        let c = compiled(|p| p.ready = vec!["ready".to_string()]);
        assert!(c.ready_matches("ready now", 0));
    }

    #[test]
    fn test_typing_response_first_match_wins() {
        let c = compiled(|p| {
            p.typing_respond = vec![
                crate::TypingResponse {
                    send: "1".to_string(),
                    patterns: vec!["trust".to_string()],
                },
                crate::TypingResponse {
                    send: "y".to_string(),
                    patterns: vec!["trust this folder".to_string()],
                },
            ];
        });
        assert_eq!(c.typing_response("Do you trust this folder?"), Some("1"));
        assert_eq!(c.typing_response("nothing"), None);
    }

    #[test]
    fn test_enter_and_fatal() {
        let c = compiled(|p| {
            p.enter = vec![r"❯ 1\. Yes".to_string()];
            p.fatal = vec![r"usage limit reached\.".to_string()];
        });
        assert!(c.enter_matches("  ❯ 1. Yes"));
        assert!(!c.enter_matches("  2. No"));
        assert!(c.fatal_matches("Claude usage limit reached."));
    }
}
