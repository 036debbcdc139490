//! UUID extraction from assistant output.

use regex::Regex;
use std::sync::OnceLock;

fn uuid_regex() -> &'static Regex {
    static UUID_RE: OnceLock<Regex> = OnceLock::new();
    UUID_RE.get_or_init(|| {
        Regex::new(r"[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}")
            .expect("UUID regex is valid")
    })
}

/// First UUID occurrence in `text`, if any.
pub fn extract_uuid(text: &str) -> Option<&str> {
    uuid_regex().find(text).map(|m| m.as_str())
}

/// Whether `text` is exactly one UUID.
pub fn is_uuid(text: &str) -> bool {
    extract_uuid(text).is_some_and(|m| m.len() == text.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_from_session_line() {
        let line = "Session: 3b2e9a10-77cd-4c2e-9f6a-0c1d2e3f4a5b (resumable)";
        assert_eq!(
            extract_uuid(line),
            Some("3b2e9a10-77cd-4c2e-9f6a-0c1d2e3f4a5b")
        );
    }

    #[test]
    fn test_first_occurrence_wins() {
        let line = "a 11111111-2222-3333-4444-555555555555 b 99999999-8888-7777-6666-555555555555";
        assert_eq!(
            extract_uuid(line),
            Some("11111111-2222-3333-4444-555555555555")
        );
    }

    #[test]
    fn test_no_uuid() {
        assert_eq!(extract_uuid("nothing to see here"), None);
        assert_eq!(extract_uuid("almost-a-uuid-1234"), None);
    }

    #[test]
    fn test_is_uuid_exact() {
        assert!(is_uuid("3b2e9a10-77cd-4c2e-9f6a-0c1d2e3f4a5b"));
        assert!(!is_uuid("3b2e9a10-77cd-4c2e-9f6a-0c1d2e3f4a5b.jsonl"));
        assert!(!is_uuid(""));
    }

    #[test]
    fn test_wrong_group_lengths_rejected() {
        assert_eq!(extract_uuid("3b2e9a10-77cd-4c2e-9f6a-0c1d2e3f4a"), None);
    }
}
