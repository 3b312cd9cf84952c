//! Byte-level escape decoder.
//!
//! Turns the raw byte stream of an interactive session into [`Key`] events.
//! Escape sequences may arrive split across reads, so the decoder keeps an
//! explicit state between calls to [`EscapeDecoder::feed`]. The caller reads
//! the next byte with a bounded wait whenever [`EscapeDecoder::is_pending`]
//! is true and calls [`EscapeDecoder::expire`] when that wait runs out.

use std::time::Duration;

/// Default time to wait for the rest of an escape sequence.
pub const DEFAULT_ESCAPE_TIMEOUT: Duration = Duration::from_millis(50);

/// Longest parameter run accepted inside a CSI sequence.
const MAX_CSI_PARAMS: usize = 8;

/// A decoded edit event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    /// Printable ASCII character.
    Char(char),
    /// Line complete.
    Enter,
    /// Delete the character before the cursor.
    Backspace,
    /// Delete the character under the cursor.
    Delete,
    /// Ctrl-C.
    Interrupt,
    /// Ctrl-D.
    EndOfInput,
    /// Move to start of line.
    Home,
    /// Move to end of line.
    End,
    Left,
    Right,
    HistoryUp,
    HistoryDown,
    /// Ctrl-K.
    KillToEnd,
    /// Ctrl-U.
    KillToStart,
    /// Ctrl-W.
    DeleteWord,
    /// Ctrl-Y: insert the last killed text.
    Yank,
    /// Ctrl-L: clear screen and repaint.
    Redraw,
    /// Tab.
    Complete,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum State {
    #[default]
    Ground,
    /// Saw ESC.
    Escape,
    /// Saw `ESC [`, collecting parameter bytes.
    Csi(Vec<u8>),
    /// Saw `ESC O`.
    Ss3,
}

/// Escape sequence state machine.
#[derive(Debug, Default)]
pub struct EscapeDecoder {
    state: State,
}

impl EscapeDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a multi-byte sequence is in progress.
    pub fn is_pending(&self) -> bool {
        self.state != State::Ground
    }

    /// Abandon an incomplete sequence. Its bytes are dropped, never echoed.
    pub fn expire(&mut self) {
        if self.is_pending() {
            tracing::trace!(state = ?self.state, "discarding incomplete escape sequence");
        }
        self.state = State::Ground;
    }

    /// Feed one byte; returns a key when one is complete.
    pub fn feed(&mut self, byte: u8) -> Option<Key> {
        match std::mem::take(&mut self.state) {
            State::Ground => self.ground(byte),
            State::Escape => match byte {
                b'[' => {
                    self.state = State::Csi(Vec::new());
                    None
                }
                b'O' => {
                    self.state = State::Ss3;
                    None
                }
                // A second ESC restarts the sequence.
                0x1b => {
                    self.state = State::Escape;
                    None
                }
                _ => None,
            },
            State::Csi(mut params) => {
                if byte.is_ascii_digit() || byte == b';' {
                    if params.len() < MAX_CSI_PARAMS {
                        params.push(byte);
                    }
                    self.state = State::Csi(params);
                    return None;
                }
                csi_key(&params, byte)
            }
            State::Ss3 => match byte {
                b'A' => Some(Key::HistoryUp),
                b'B' => Some(Key::HistoryDown),
                b'C' => Some(Key::Right),
                b'D' => Some(Key::Left),
                b'H' => Some(Key::Home),
                b'F' => Some(Key::End),
                _ => None,
            },
        }
    }

    /// Feed a buffer, collecting every completed key.
    pub fn feed_all(&mut self, bytes: &[u8]) -> Vec<Key> {
        bytes.iter().filter_map(|&b| self.feed(b)).collect()
    }

    fn ground(&mut self, byte: u8) -> Option<Key> {
        match byte {
            0x20..=0x7e => Some(Key::Char(byte as char)),
            0x1b => {
                self.state = State::Escape;
                None
            }
            0x01 => Some(Key::Home),
            0x03 => Some(Key::Interrupt),
            0x04 => Some(Key::EndOfInput),
            0x05 => Some(Key::End),
            0x08 | 0x7f => Some(Key::Backspace),
            0x09 => Some(Key::Complete),
            0x0a | 0x0d => Some(Key::Enter),
            0x0b => Some(Key::KillToEnd),
            0x0c => Some(Key::Redraw),
            0x15 => Some(Key::KillToStart),
            0x17 => Some(Key::DeleteWord),
            0x19 => Some(Key::Yank),
            _ => None,
        }
    }
}

fn csi_key(params: &[u8], final_byte: u8) -> Option<Key> {
    match (params, final_byte) {
        (b"", b'A') => Some(Key::HistoryUp),
        (b"", b'B') => Some(Key::HistoryDown),
        (b"", b'C') => Some(Key::Right),
        (b"", b'D') => Some(Key::Left),
        (b"", b'H') => Some(Key::Home),
        (b"", b'F') => Some(Key::End),
        (b"3", b'~') => Some(Key::Delete),
        (b"1" | b"7", b'~') => Some(Key::Home),
        (b"4" | b"8", b'~') => Some(Key::End),
        _ => {
            tracing::trace!(
                params = %String::from_utf8_lossy(params),
                final_byte,
                "ignoring unrecognized CSI sequence"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Vec<Key> {
        EscapeDecoder::new().feed_all(bytes)
    }

    #[test]
    fn test_printable() {
        assert_eq!(decode(b"ab "), vec![Key::Char('a'), Key::Char('b'), Key::Char(' ')]);
        assert_eq!(decode(b"~"), vec![Key::Char('~')]);
    }

    #[test]
    fn test_control_bytes() {
        let keys = decode(&[8, 127, 3, 4, 1, 5, 11, 12, 21, 23, 9, 13]);
        assert_eq!(
            keys,
            vec![
                Key::Backspace,
                Key::Backspace,
                Key::Interrupt,
                Key::EndOfInput,
                Key::Home,
                Key::End,
                Key::KillToEnd,
                Key::Redraw,
                Key::KillToStart,
                Key::DeleteWord,
                Key::Complete,
                Key::Enter,
            ]
        );
    }

    #[test]
    fn test_arrow_keys() {
        assert_eq!(
            decode(b"\x1b[A\x1b[B\x1b[C\x1b[D"),
            vec![Key::HistoryUp, Key::HistoryDown, Key::Right, Key::Left]
        );
    }

    #[test]
    fn test_home_end_delete() {
        assert_eq!(
            decode(b"\x1b[H\x1b[F\x1b[3~"),
            vec![Key::Home, Key::End, Key::Delete]
        );
        assert_eq!(
            decode(b"\x1b[1~\x1b[4~\x1bOH\x1bOF"),
            vec![Key::Home, Key::End, Key::Home, Key::End]
        );
    }

    #[test]
    fn test_sequence_split_across_feeds() {
        let mut decoder = EscapeDecoder::new();
        assert_eq!(decoder.feed(0x1b), None);
        assert!(decoder.is_pending());
        assert_eq!(decoder.feed(b'['), None);
        assert!(decoder.is_pending());
        assert_eq!(decoder.feed(b'3'), None);
        assert_eq!(decoder.feed(b'~'), Some(Key::Delete));
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_expired_sequence_is_dropped() {
        let mut decoder = EscapeDecoder::new();
        decoder.feed(0x1b);
        decoder.feed(b'[');
        decoder.expire();
        assert!(!decoder.is_pending());
        // The bytes that follow are decoded fresh, not as part of the old sequence.
        assert_eq!(decoder.feed(b'A'), Some(Key::Char('A')));
    }

    #[test]
    fn test_unrecognized_sequence_is_silent() {
        assert_eq!(decode(b"\x1b[99Zx"), vec![Key::Char('x')]);
        assert_eq!(decode(b"\x1bxy"), vec![Key::Char('y')]);
        assert_eq!(decode(b"\x1b[2;5Ax"), vec![Key::Char('x')]);
    }

    #[test]
    fn test_oversized_params_do_not_grow() {
        let mut decoder = EscapeDecoder::new();
        decoder.feed(0x1b);
        decoder.feed(b'[');
        for _ in 0..100 {
            decoder.feed(b'1');
        }
        assert!(decoder.is_pending());
        assert_eq!(decoder.feed(b'~'), None);
        assert!(!decoder.is_pending());
    }

    #[test]
    fn test_ignored_bytes() {
        assert!(decode(&[0x00, 0x02, 0x80, 0xff]).is_empty());
    }
}
