//! Discovery of the assistant's own session-metadata files.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::extract::{extract_uuid, is_uuid};

/// Working directory rendered the way assistants name their per-project
/// session folders: `/` and `.` become `-`.
pub fn cwd_dashed(cwd: &Path) -> String {
    cwd.to_string_lossy()
        .chars()
        .map(|c| if c == '/' || c == '.' { '-' } else { c })
        .collect()
}

/// Expand a profile's `session_dir` template for `cwd`.
///
/// Placeholders: `{home}`, `{cwd-dashed}`. Returns `None` when `{home}` is
/// needed but the home directory cannot be resolved.
pub fn resolve_session_dir(template: &str, cwd: &Path) -> Option<PathBuf> {
    let mut resolved = template.to_string();
    if resolved.contains("{home}") {
        let home = std::env::var_os("HOME").map(PathBuf::from)?;
        resolved = resolved.replace("{home}", &home.to_string_lossy());
    }
    if resolved.contains("{cwd-dashed}") {
        resolved = resolved.replace("{cwd-dashed}", &cwd_dashed(cwd));
    }
    Some(PathBuf::from(resolved))
}

/// Session id from the newest session-metadata file in `dir`.
///
/// Files are ordered by modification time, newest first. A file
/// contributes an id when its stem is a UUID (`<uuid>.jsonl` convention)
/// or, failing that, when its first line is a JSON object carrying a
/// UUID-valued `sessionId`/`session_id`/`id` field. Unreadable entries
/// are skipped.
pub fn latest_session_file_id(dir: &Path) -> Option<String> {
    let entries = std::fs::read_dir(dir).ok()?;

    let mut files: Vec<(SystemTime, PathBuf)> = entries
        .flatten()
        .filter_map(|entry| {
            let path = entry.path();
            if !path.is_file() {
                return None;
            }
            let mtime = entry.metadata().ok()?.modified().ok()?;
            Some((mtime, path))
        })
        .collect();
    files.sort_by(|a, b| b.0.cmp(&a.0));

    for (_, path) in files {
        if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
            if is_uuid(stem) {
                return Some(stem.to_string());
            }
        }
        if let Some(id) = id_from_metadata_file(&path) {
            return Some(id);
        }
    }
    None
}

fn id_from_metadata_file(path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(path).ok()?;
    let first_line = content.lines().next()?;
    let value: serde_json::Value = serde_json::from_str(first_line).ok()?;

    for field in ["sessionId", "session_id", "id"] {
        if let Some(id) = value.get(field).and_then(|v| v.as_str()) {
            if is_uuid(id) {
                return Some(id.to_string());
            }
        }
    }
    // Last resort: any UUID anywhere in the object.
    extract_uuid(first_line).map(str::to_string)
}
