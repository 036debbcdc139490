//! ANSI removal and chunking for the pattern matchers.

use ayes_profile::LinePolicy;
use regex::Regex;
use std::sync::OnceLock;

fn ansi_regex() -> &'static Regex {
    static ANSI_RE: OnceLock<Regex> = OnceLock::new();
    ANSI_RE.get_or_init(|| {
        // CSI, OSC (BEL or ST terminated), and lone two-byte escapes.
        Regex::new(concat!(
            r"\x1b\[[0-9;:?<=>]*[ -/]*[@-~]",
            r"|\x1b\][^\x07\x1b]*(?:\x07|\x1b\\)?",
            r"|\x1b[@-Z\\-_]",
        ))
        .expect("ANSI regex is valid")
    })
}

/// Remove ANSI escape sequences and control characters. Carriage returns
/// become newlines so overdrawn TUI lines still split; tabs survive.
pub fn strip_ansi(input: &str) -> String {
    let no_escapes = ansi_regex().replace_all(input, "");
    no_escapes
        .chars()
        .filter_map(|c| match c {
            '\r' => Some('\n'),
            '\n' | '\t' => Some(c),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect()
}

/// If `input` ends inside an escape sequence, split it off so the next
/// chunk can complete it. Returns (complete, carry).
fn split_partial_escape(input: &str) -> (&str, &str) {
    if let Some(pos) = input.rfind('\x1b') {
        let tail = &input[pos..];
        // A terminated sequence leaves nothing to carry; an unterminated
        // one longer than any plausible sequence is garbage we pass on.
        if tail.len() < 32 && !ansi_regex().is_match(tail) {
            return (&input[..pos], tail);
        }
    }
    (input, "")
}

/// Stateful stripper for mirroring the stream to a non-TTY stdout:
/// carries split escape sequences across chunk boundaries but preserves
/// all text, including whitespace-only chunks.
#[derive(Debug, Default)]
pub struct StreamStripper {
    carry: String,
}

impl StreamStripper {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, raw: &str) -> String {
        let mut joined = std::mem::take(&mut self.carry);
        joined.push_str(raw);
        let (complete, carry) = split_partial_escape(&joined);
        self.carry = carry.to_string();
        strip_ansi(complete)
    }
}

/// Applies a profile's line policy to the stripped stream.
///
/// `split-on-newline` buffers until complete lines exist and yields each
/// non-empty line; `no-split` yields every stripped chunk whole. Either
/// way the yield order equals arrival order, so chunked and concatenated
/// input produce the same match sequence.
#[derive(Debug)]
pub struct ChunkSplitter {
    policy: LinePolicy,
    /// Unconsumed text (newline policy) and escape carry (both policies).
    buf: String,
    escape_carry: String,
}

impl ChunkSplitter {
    pub fn new(policy: LinePolicy) -> Self {
        Self {
            policy,
            buf: String::new(),
            escape_carry: String::new(),
        }
    }

    /// Feed one raw chunk; returns the matcher-ready chunks it completes.
    pub fn push(&mut self, raw: &str) -> Vec<String> {
        let mut joined = std::mem::take(&mut self.escape_carry);
        joined.push_str(raw);
        let (complete, carry) = split_partial_escape(&joined);
        self.escape_carry = carry.to_string();
        let stripped = strip_ansi(complete);

        match self.policy {
            LinePolicy::NoSplit => {
                if stripped.trim().is_empty() {
                    Vec::new()
                } else {
                    vec![stripped]
                }
            }
            LinePolicy::SplitOnNewline => {
                self.buf.push_str(&stripped);
                let mut out = Vec::new();
                while let Some(pos) = self.buf.find('\n') {
                    let line: String = self.buf.drain(..=pos).collect();
                    let line = line.trim_end_matches('\n');
                    if !line.trim().is_empty() {
                        out.push(line.to_string());
                    }
                }
                out
            }
        }
    }

    /// Drain any trailing partial line (stream end).
    pub fn flush(&mut self) -> Option<String> {
        let rest = std::mem::take(&mut self.buf);
        let trimmed = rest.trim_end();
        if trimmed.trim().is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_colors_and_cursor_motion() {
        let input = "\x1b[1;36m  Thinking...\x1b[0m\x1b[2K\x1b[1A done";
        assert_eq!(strip_ansi(input), "  Thinking... done");
    }

    #[test]
    fn test_strip_osc_title() {
        let input = "\x1b]0;my title\x07real text";
        assert_eq!(strip_ansi(input), "real text");
    }

    #[test]
    fn test_carriage_return_becomes_newline() {
        assert_eq!(strip_ansi("progress 10%\rprogress 99%"), "progress 10%\nprogress 99%");
    }

    #[test]
    fn test_newline_policy_buffers_partial_lines() {
        let mut splitter = ChunkSplitter::new(LinePolicy::SplitOnNewline);
        assert!(splitter.push("hel").is_empty());
        assert_eq!(splitter.push("lo\nwor"), vec!["hello"]);
        assert_eq!(splitter.push("ld\n"), vec!["world"]);
    }

    #[test]
    fn test_newline_policy_skips_blank_lines() {
        let mut splitter = ChunkSplitter::new(LinePolicy::SplitOnNewline);
        assert_eq!(splitter.push("a\n\n  \nb\n"), vec!["a", "b"]);
    }

    #[test]
    fn test_line_split_equivalence_chunked_vs_whole() {
        let text = "one\ntwo\nthree\n";

        let mut chunked = ChunkSplitter::new(LinePolicy::SplitOnNewline);
        let mut chunked_out = Vec::new();
        for piece in ["on", "e\ntw", "o\nthr", "ee\n"] {
            chunked_out.extend(chunked.push(piece));
        }

        let mut whole = ChunkSplitter::new(LinePolicy::SplitOnNewline);
        let whole_out = whole.push(text);

        assert_eq!(chunked_out, whole_out);
        assert_eq!(chunked_out, vec!["one", "two", "three"]);
    }

    #[test]
    fn test_no_split_yields_each_chunk() {
        let mut splitter = ChunkSplitter::new(LinePolicy::NoSplit);
        assert_eq!(splitter.push("\x1b[2J\x1b[HType your"), vec!["Type your"]);
        assert_eq!(splitter.push(" message"), vec![" message"]);
        assert!(splitter.push("\x1b[0m").is_empty());
    }

    #[test]
    fn test_escape_split_across_chunks() {
        let mut splitter = ChunkSplitter::new(LinePolicy::SplitOnNewline);
        // Sequence \x1b[31m split between chunks must not leak bytes.
        assert!(splitter.push("red: \x1b[3").is_empty());
        assert_eq!(splitter.push("1mstop\x1b[0m\n"), vec!["red: stop"]);
    }

    #[test]
    fn test_flush_returns_trailing_partial_line() {
        let mut splitter = ChunkSplitter::new(LinePolicy::SplitOnNewline);
        assert!(splitter.push("no newline yet").is_empty());
        assert_eq!(splitter.flush(), Some("no newline yet".to_string()));
        assert_eq!(splitter.flush(), None);
    }
}
