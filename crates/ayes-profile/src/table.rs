//! Profile table: built-ins plus user overrides.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::defaults::builtin_profiles;
use crate::profile::ToolProfile;

/// On-disk shape of `profiles.toml`: an array of `[[profile]]` tables.
#[derive(Debug, serde::Deserialize)]
struct ProfilesFile {
    #[serde(default)]
    profile: Vec<ToolProfile>,
}

/// All known tool profiles, keyed by tool name.
#[derive(Debug)]
pub struct ProfileTable {
    profiles: HashMap<String, ToolProfile>,
}

/// `<user-config>/agent-yes/profiles.toml`.
pub fn user_profiles_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "agent-yes")
        .map(|dirs| dirs.config_dir().join("profiles.toml"))
}

impl ProfileTable {
    /// Built-in profiles only.
    pub fn builtin() -> Self {
        let profiles = builtin_profiles()
            .into_iter()
            .map(|p| (p.tool.clone(), p))
            .collect();
        Self { profiles }
    }

    /// Built-ins merged with the user override file, when present.
    ///
    /// Overrides are additive by tool key: an entry with a known key
    /// replaces the built-in wholesale, an unknown key adds a new tool.
    /// An unreadable or unparsable file is logged and ignored.
    pub fn load() -> Self {
        let mut table = Self::builtin();
        if let Some(path) = user_profiles_path() {
            if path.exists() {
                match table.merge_file(&path) {
                    Ok(count) => {
                        tracing::debug!(path = %path.display(), count, "merged user profiles")
                    }
                    Err(e) => {
                        warn!(path = %path.display(), "ignoring unreadable profiles file: {e:#}")
                    }
                }
            }
        }
        table
    }

    /// Merge one profiles file into this table. Returns how many entries
    /// were applied.
    pub fn merge_file(&mut self, path: &Path) -> Result<usize> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let file: ProfilesFile = toml::from_str(&content)
            .with_context(|| format!("failed parsing {}", path.display()))?;

        let count = file.profile.len();
        for profile in file.profile {
            self.profiles.insert(profile.tool.clone(), profile);
        }
        Ok(count)
    }

    pub fn get(&self, tool: &str) -> Option<&ToolProfile> {
        self.profiles.get(tool)
    }

    /// Known tool keys, sorted for stable help output.
    pub fn tools(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_has_claude() {
        let table = ProfileTable::builtin();
        let claude = table.get("claude").expect("claude profile exists");
        assert_eq!(claude.binary(), "claude");
    }

    #[test]
    fn test_unknown_tool_is_none() {
        let table = ProfileTable::builtin();
        assert!(table.get("definitely-not-a-tool").is_none());
    }

    #[test]
    fn test_tools_sorted() {
        let table = ProfileTable::builtin();
        let tools = table.tools();
        let mut sorted = tools.clone();
        sorted.sort_unstable();
        assert_eq!(tools, sorted);
        assert!(tools.contains(&"claude"));
        assert!(tools.contains(&"gemini"));
    }

    #[test]
    fn test_merge_replaces_by_key() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        std::fs::write(
            &path,
            r#"
[[profile]]
tool = "claude"
ready = ["custom ready banner"]

[[profile]]
tool = "my-local-agent"
ready = ["λ"]
"#,
        )
        .unwrap();

        let mut table = ProfileTable::builtin();
        let applied = table.merge_file(&path).unwrap();
        assert_eq!(applied, 2);

        let claude = table.get("claude").unwrap();
        assert_eq!(claude.ready, vec!["custom ready banner"]);
        // Replacement is wholesale: fields not present in the override
        // fall back to schema defaults, not the built-in values.
        assert!(claude.install.is_none());

        assert!(table.get("my-local-agent").is_some());
    }

    #[test]
    fn test_merge_rejects_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("profiles.toml");
        std::fs::write(&path, "this is not toml [[[").unwrap();

        let mut table = ProfileTable::builtin();
        assert!(table.merge_file(&path).is_err());
        // Table unchanged on failure.
        assert!(table.get("claude").is_some());
    }
}
