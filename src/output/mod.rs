//! Output shaping for session channels.
//!
//! Command output is plain text with `\n` line ends. Sessions with a
//! terminal get `\r\n` instead, and audit records get a short excerpt with
//! escape sequences removed.

mod sanitizer;

pub use sanitizer::OutputSanitizer;

/// Convert lone `\n` to `\r\n`, leaving existing `\r\n` pairs alone.
pub fn translate_newlines(text: &str) -> String {
    let mut out = String::with_capacity(text.len() + text.len() / 16);
    let mut prev = '\0';
    for ch in text.chars() {
        if ch == '\n' && prev != '\r' {
            out.push('\r');
        }
        out.push(ch);
        prev = ch;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_translate_lone_newlines() {
        assert_eq!(translate_newlines("a\nb\n"), "a\r\nb\r\n");
    }

    #[test]
    fn test_translate_keeps_crlf() {
        assert_eq!(translate_newlines("a\r\nb\n\n"), "a\r\nb\r\n\r\n");
    }

    #[test]
    fn test_translate_without_newlines() {
        assert_eq!(translate_newlines(""), "");
        assert_eq!(translate_newlines("plain"), "plain");
    }
}
