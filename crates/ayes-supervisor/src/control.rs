//! Terminal device-query replies.
//!
//! Assistants probe the terminal at boot. When the host side cannot answer
//! (no TTY, or the query must not leak to the host), the supervisor
//! answers on the child's input:
//!
//! - Primary Device Attributes (`CSI c` / `CSI 0 c`): always answered with
//!   `CSI ? 1 ; 2 c` (VT100 with Advanced Video Option).
//! - Cursor Position Report (`CSI 6 n`): answered with
//!   `CSI <row> ; <col> R` from the renderer's cursor, only when the host
//!   stdin is not a TTY (a real terminal answers this itself).

const QUERY_DEVICE_ATTR: &[u8] = b"\x1b[c";
const QUERY_DEVICE_ATTR_ZERO: &[u8] = b"\x1b[0c";
const QUERY_CURSOR_POS: &[u8] = b"\x1b[6n";

const REPLY_DEVICE_ATTR: &[u8] = b"\x1b[?1;2c";

/// Longest query is 4 bytes; a 3-byte carry catches any split sequence.
const CARRY_LEN: usize = 3;

/// Scans raw child output for device queries and produces replies.
#[derive(Debug, Default)]
pub struct ControlResponder {
    /// Whether CPR queries are ours to answer (host stdin is not a TTY).
    pub respond_cpr: bool,
    tail: Vec<u8>,
}

impl ControlResponder {
    pub fn new(respond_cpr: bool) -> Self {
        Self {
            respond_cpr,
            tail: Vec::new(),
        }
    }

    /// Initial CPR nudge for tools that stall waiting for a position
    /// reply before printing anything.
    pub fn initial_cursor_reply() -> Vec<u8> {
        b"\x1b[1;1R".to_vec()
    }

    /// Scan `chunk` (with carry from the previous chunk) and return the
    /// replies to write to the child. `cursor` is the renderer's current
    /// 1-based (row, col).
    pub fn scan(&mut self, chunk: &[u8], cursor: (u16, u16)) -> Vec<Vec<u8>> {
        let mut window = Vec::with_capacity(self.tail.len() + chunk.len());
        window.extend_from_slice(&self.tail);
        window.extend_from_slice(chunk);

        let mut replies = Vec::new();
        // Only occurrences ending past the carry are new; anything wholly
        // inside the tail was answered when the previous chunk arrived.
        let new_from = self.tail.len();

        for _ in find_new(&window, QUERY_CURSOR_POS, new_from) {
            if self.respond_cpr {
                let (row, col) = cursor;
                replies.push(format!("\x1b[{row};{col}R").into_bytes());
            }
        }
        // `\x1b[c` is not a substring of `\x1b[0c`, so the two forms never
        // double count.
        for _ in find_new(&window, QUERY_DEVICE_ATTR_ZERO, new_from) {
            replies.push(REPLY_DEVICE_ATTR.to_vec());
        }
        for _ in find_new(&window, QUERY_DEVICE_ATTR, new_from) {
            replies.push(REPLY_DEVICE_ATTR.to_vec());
        }

        let keep = window.len().min(CARRY_LEN);
        self.tail = window[window.len() - keep..].to_vec();

        replies
    }
}

/// Offsets of `needle` occurrences in `haystack` whose end lies at or past
/// `new_from`.
fn find_new(haystack: &[u8], needle: &[u8], new_from: usize) -> Vec<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return Vec::new();
    }
    (0..=haystack.len() - needle.len())
        .filter(|&i| &haystack[i..i + needle.len()] == needle && i + needle.len() > new_from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_attr_reply_is_byte_exact() {
        let mut responder = ControlResponder::new(false);
        let replies = responder.scan(b"boot\x1b[c rest", (1, 1));
        assert_eq!(replies, vec![b"\x1b[?1;2c".to_vec()]);
    }

    #[test]
    fn test_device_attr_zero_form() {
        let mut responder = ControlResponder::new(false);
        let replies = responder.scan(b"\x1b[0c", (1, 1));
        assert_eq!(replies, vec![b"\x1b[?1;2c".to_vec()]);
    }

    #[test]
    fn test_cursor_reply_uses_renderer_cursor() {
        let mut responder = ControlResponder::new(true);
        let replies = responder.scan(b"\x1b[6n", (3, 12));
        assert_eq!(replies, vec![b"\x1b[3;12R".to_vec()]);
    }

    #[test]
    fn test_cursor_query_ignored_when_host_is_tty() {
        let mut responder = ControlResponder::new(false);
        let replies = responder.scan(b"\x1b[6n", (3, 12));
        assert!(replies.is_empty());
    }

    #[test]
    fn test_split_sequence_across_chunks() {
        let mut responder = ControlResponder::new(true);
        assert!(responder.scan(b"text\x1b[", (1, 1)).is_empty());
        let replies = responder.scan(b"6n", (5, 7));
        assert_eq!(replies, vec![b"\x1b[5;7R".to_vec()]);
    }

    #[test]
    fn test_no_double_reply_for_carried_bytes() {
        let mut responder = ControlResponder::new(false);
        let first = responder.scan(b"\x1b[c", (1, 1));
        assert_eq!(first.len(), 1);
        // The tail still holds the query bytes; a new empty-ish chunk must
        // not re-answer it.
        let second = responder.scan(b"hello", (1, 1));
        assert!(second.is_empty());
    }

    #[test]
    fn test_multiple_queries_in_one_chunk() {
        let mut responder = ControlResponder::new(true);
        let replies = responder.scan(b"\x1b[c..\x1b[6n", (2, 2));
        assert_eq!(replies.len(), 2);
        assert!(replies.contains(&b"\x1b[?1;2c".to_vec()));
        assert!(replies.contains(&b"\x1b[2;2R".to_vec()));
    }

    #[test]
    fn test_initial_cursor_reply() {
        assert_eq!(ControlResponder::initial_cursor_reply(), b"\x1b[1;1R");
    }
}
