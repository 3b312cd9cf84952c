//! Plain-text extraction from command output.

use vte::{Parser, Perform};

/// Removes terminal control sequences from command output.
pub struct OutputSanitizer;

impl OutputSanitizer {
    /// Text of `input` with every escape and control sequence dropped.
    /// Line feeds, carriage returns and tabs survive.
    pub fn strip_ansi(input: &[u8]) -> String {
        let mut text = TextOnly::default();
        Parser::new().advance(&mut text, input);
        String::from_utf8_lossy(&text.0).into_owned()
    }

    pub fn strip_ansi_str(input: &str) -> String {
        Self::strip_ansi(input.as_bytes())
    }

    /// At most `max_chars` characters of plain text from `input`.
    pub fn excerpt(input: &str, max_chars: usize) -> String {
        let plain = Self::strip_ansi_str(input);
        match plain.char_indices().nth(max_chars) {
            Some((end, _)) => plain[..end].to_string(),
            None => plain,
        }
    }
}

/// Collects printable characters; the default no-op dispatch methods
/// swallow CSI, OSC, DCS and plain escape sequences.
#[derive(Default)]
struct TextOnly(Vec<u8>);

impl Perform for TextOnly {
    fn print(&mut self, c: char) {
        let mut buf = [0u8; 4];
        self.0.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
    }

    fn execute(&mut self, byte: u8) {
        if matches!(byte, b'\n' | b'\r' | b'\t') {
            self.0.push(byte);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_unchanged() {
        assert_eq!(OutputSanitizer::strip_ansi(b"line1\nline2\tcol"), "line1\nline2\tcol");
    }

    #[test]
    fn test_strip_colors_and_cursor_moves() {
        let input = b"\x1b[2J\x1b[H\x1b[32m\x1b[1mok\x1b[0m done";
        assert_eq!(OutputSanitizer::strip_ansi(input), "ok done");
    }

    #[test]
    fn test_strip_title_sequence() {
        let input = b"\x1b]0;title\x07body";
        assert_eq!(OutputSanitizer::strip_ansi(input), "body");
    }

    #[test]
    fn test_only_escapes_gives_empty() {
        assert_eq!(OutputSanitizer::strip_ansi(b"\x1b[31m\x1b[0m"), "");
    }

    #[test]
    fn test_excerpt_truncates_on_char_boundary() {
        assert_eq!(OutputSanitizer::excerpt("h\u{e9}llo", 2), "h\u{e9}");
        assert_eq!(OutputSanitizer::excerpt("short", 100), "short");
    }

    #[test]
    fn test_excerpt_counts_plain_text_only() {
        assert_eq!(OutputSanitizer::excerpt("\x1b[31mabcdef\x1b[0m", 3), "abc");
    }
}
