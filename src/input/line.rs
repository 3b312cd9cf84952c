//! Editable line with a cursor and tail-only redraw.
//!
//! Every mutating operation returns the bytes that bring a terminal showing
//! the old line into agreement with the new one. Only the part of the line
//! from the edit point onward is rewritten, and the cursor is moved back
//! with relative motion, so no operation depends on absolute screen
//! coordinates. A full repaint only happens through [`LineBuffer::repaint`]
//! and [`LineBuffer::clear_screen`].

/// Erase from cursor to end of line.
const ERASE_TO_END: &[u8] = b"\x1b[K";

/// Outcome of pressing Enter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Submitted {
    /// The line ended with a continuation backslash; keep editing.
    Continue,
    /// A complete line, joined with any continued segments.
    Line(String),
}

/// Per-session line editing state.
#[derive(Debug, Default, Clone)]
pub struct LineBuffer {
    chars: Vec<char>,
    cursor: usize,
    /// Segments accepted with a trailing backslash.
    continued: Vec<String>,
    /// Text removed by the last kill, for yank.
    kill_ring: String,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current line text (without continued segments).
    pub fn text(&self) -> String {
        self.chars.iter().collect()
    }

    /// Cursor offset in characters, always within `[0, len]`.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Whether earlier segments are waiting for the rest of the line.
    pub fn is_continuing(&self) -> bool {
        !self.continued.is_empty()
    }

    /// Insert a character at the cursor.
    pub fn insert(&mut self, ch: char) -> Vec<u8> {
        self.chars.insert(self.cursor, ch);
        self.cursor += 1;
        let mut out = String::new();
        out.push(ch);
        self.redraw_tail_into(out.into_bytes(), false)
    }

    /// Insert a string at the cursor.
    pub fn insert_str(&mut self, s: &str) -> Vec<u8> {
        if s.is_empty() {
            return Vec::new();
        }
        let inserted: Vec<char> = s.chars().collect();
        let count = inserted.len();
        self.chars.splice(self.cursor..self.cursor, inserted);
        self.cursor += count;
        self.redraw_tail_into(s.as_bytes().to_vec(), false)
    }

    /// Delete the character before the cursor.
    pub fn delete_before(&mut self) -> Vec<u8> {
        if self.cursor == 0 {
            return Vec::new();
        }
        self.cursor -= 1;
        self.chars.remove(self.cursor);
        self.redraw_tail_into(move_left(1), true)
    }

    /// Delete the character under the cursor.
    pub fn delete_after(&mut self) -> Vec<u8> {
        if self.cursor >= self.chars.len() {
            return Vec::new();
        }
        self.chars.remove(self.cursor);
        self.redraw_tail_into(Vec::new(), true)
    }

    /// Remove everything from the cursor to the end of the line.
    pub fn kill_to_end(&mut self) -> Vec<u8> {
        if self.cursor >= self.chars.len() {
            return Vec::new();
        }
        self.kill_ring = self.chars.drain(self.cursor..).collect();
        ERASE_TO_END.to_vec()
    }

    /// Remove everything before the cursor.
    pub fn kill_to_start(&mut self) -> Vec<u8> {
        self.remove_before(0)
    }

    /// Remove the word before the cursor: one separating space directly
    /// before the cursor, then the run of non-space characters before it.
    pub fn delete_word_before(&mut self) -> Vec<u8> {
        let mut start = self.cursor;
        if start > 0 && self.chars[start - 1] == ' ' {
            start -= 1;
        }
        while start > 0 && self.chars[start - 1] != ' ' {
            start -= 1;
        }
        self.remove_before(start)
    }

    /// Insert the most recently killed text.
    pub fn yank(&mut self) -> Vec<u8> {
        let text = self.kill_ring.clone();
        self.insert_str(&text)
    }

    pub fn move_left(&mut self) -> Vec<u8> {
        if self.cursor == 0 {
            return Vec::new();
        }
        self.cursor -= 1;
        move_left(1)
    }

    pub fn move_right(&mut self) -> Vec<u8> {
        if self.cursor >= self.chars.len() {
            return Vec::new();
        }
        self.cursor += 1;
        move_right(1)
    }

    pub fn move_home(&mut self) -> Vec<u8> {
        let out = move_left(self.cursor);
        self.cursor = 0;
        out
    }

    pub fn move_end(&mut self) -> Vec<u8> {
        let out = move_right(self.chars.len() - self.cursor);
        self.cursor = self.chars.len();
        out
    }

    /// Replace the whole line (history navigation) leaving the cursor at the end.
    pub fn replace(&mut self, text: &str) -> Vec<u8> {
        let mut out = move_left(self.cursor);
        self.chars = text.chars().collect();
        self.cursor = self.chars.len();
        out.extend_from_slice(text.as_bytes());
        out.extend_from_slice(ERASE_TO_END);
        out
    }

    /// Rewrite the prompt and line from column zero (geometry change).
    pub fn repaint(&self, prompt: &str) -> Vec<u8> {
        let mut out = b"\r".to_vec();
        out.extend_from_slice(prompt.as_bytes());
        out.extend_from_slice(self.text().as_bytes());
        out.extend_from_slice(ERASE_TO_END);
        out.extend(move_left(self.chars.len() - self.cursor));
        out
    }

    /// Clear the screen and repaint prompt and line at the top.
    pub fn clear_screen(&self, prompt: &str) -> Vec<u8> {
        let mut out = b"\x1b[H\x1b[2J".to_vec();
        out.extend(self.repaint(prompt));
        out
    }

    /// Accept the line. A trailing backslash stores the segment and asks
    /// for more; otherwise all segments are joined with single spaces and
    /// the editing state is reset.
    pub fn submit(&mut self) -> Submitted {
        let mut text = self.text();
        self.chars.clear();
        self.cursor = 0;

        if text.ends_with('\\') {
            text.pop();
            self.continued.push(text);
            return Submitted::Continue;
        }

        if self.continued.is_empty() {
            return Submitted::Line(text);
        }
        let mut parts = std::mem::take(&mut self.continued);
        parts.push(text);
        Submitted::Line(parts.join(" "))
    }

    /// Drop the current line and any continued segments.
    pub fn reset(&mut self) {
        self.chars.clear();
        self.cursor = 0;
        self.continued.clear();
    }

    /// Start and end (character offsets) of the word under the cursor,
    /// and the index of that word within the line.
    pub fn word_at_cursor(&self) -> (usize, usize, usize) {
        let mut start = self.cursor;
        while start > 0 && self.chars[start - 1] != ' ' {
            start -= 1;
        }
        let mut end = self.cursor;
        while end < self.chars.len() && self.chars[end] != ' ' {
            end += 1;
        }
        let index = self.chars[..start]
            .split(|c| *c == ' ')
            .filter(|w| !w.is_empty())
            .count();
        (start, end, index)
    }

    /// Characters in `start..end` as a string.
    pub fn slice(&self, start: usize, end: usize) -> String {
        self.chars[start..end].iter().collect()
    }

    fn remove_before(&mut self, start: usize) -> Vec<u8> {
        if start >= self.cursor {
            return Vec::new();
        }
        let removed = self.cursor - start;
        self.kill_ring = self.chars.drain(start..self.cursor).collect();
        self.cursor = start;
        self.redraw_tail_into(move_left(removed), true)
    }

    /// Append the tail after the cursor to `out`, optionally erase what was
    /// past the old end, then move back to the cursor.
    fn redraw_tail_into(&self, mut out: Vec<u8>, erase: bool) -> Vec<u8> {
        let tail: String = self.chars[self.cursor..].iter().collect();
        out.extend_from_slice(tail.as_bytes());
        if erase {
            out.extend_from_slice(ERASE_TO_END);
        }
        out.extend(move_left(self.chars.len() - self.cursor));
        out
    }
}

fn move_left(n: usize) -> Vec<u8> {
    match n {
        0 => Vec::new(),
        1 => b"\x1b[D".to_vec(),
        n => format!("\x1b[{n}D").into_bytes(),
    }
}

fn move_right(n: usize) -> Vec<u8> {
    match n {
        0 => Vec::new(),
        1 => b"\x1b[C".to_vec(),
        n => format!("\x1b[{n}C").into_bytes(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Replays redraw bytes on a virtual terminal and returns the visible
    /// first row and cursor column.
    struct Replay {
        parser: vt100::Parser,
    }

    impl Replay {
        fn new() -> Self {
            Self {
                parser: vt100::Parser::new(4, 120, 0),
            }
        }

        fn apply(&mut self, bytes: &[u8]) {
            self.parser.process(bytes);
        }

        fn row(&self, len: usize) -> String {
            let screen = self.parser.screen();
            (0..len as u16)
                .map(|col| {
                    screen
                        .cell(0, col)
                        .map(|c| c.contents().to_string())
                        .filter(|s| !s.is_empty())
                        .unwrap_or_else(|| " ".to_string())
                })
                .collect()
        }

        fn tail_is_blank(&self, from: usize) -> bool {
            let screen = self.parser.screen();
            (from as u16..120).all(|col| {
                screen
                    .cell(0, col)
                    .map(|c| c.contents().trim().is_empty())
                    .unwrap_or(true)
            })
        }

        fn cursor_col(&self) -> usize {
            self.parser.screen().cursor_position().1 as usize
        }
    }

    fn assert_in_sync(line: &LineBuffer, replay: &Replay) {
        assert!(line.cursor() <= line.len());
        assert_eq!(replay.row(line.len()), line.text());
        assert!(replay.tail_is_blank(line.len()), "stale text after {:?}", line.text());
        assert_eq!(replay.cursor_col(), line.cursor());
    }

    #[test]
    fn test_insert_at_end_and_middle() {
        let mut line = LineBuffer::new();
        for c in "helo".chars() {
            line.insert(c);
        }
        line.move_left();
        let out = line.insert('l');
        assert_eq!(line.text(), "hello");
        assert_eq!(line.cursor(), 4);
        // Only the changed tail is rewritten.
        assert_eq!(out, b"lo\x1b[D".to_vec());
    }

    #[test]
    fn test_delete_before_and_after() {
        let mut line = LineBuffer::new();
        line.insert_str("abcd");
        line.move_left();
        line.move_left();
        line.delete_before();
        assert_eq!(line.text(), "acd");
        assert_eq!(line.cursor(), 1);
        line.delete_after();
        assert_eq!(line.text(), "ad");
        assert_eq!(line.cursor(), 1);
    }

    #[test]
    fn test_delete_at_boundaries_is_noop() {
        let mut line = LineBuffer::new();
        assert!(line.delete_before().is_empty());
        assert!(line.delete_after().is_empty());
        line.insert_str("x");
        assert!(line.delete_after().is_empty());
        line.move_home();
        assert!(line.delete_before().is_empty());
        assert_eq!(line.text(), "x");
    }

    #[test]
    fn test_kill_to_end_and_start() {
        let mut line = LineBuffer::new();
        line.insert_str("print hello world");
        for _ in 0..5 {
            line.move_left();
        }
        line.kill_to_end();
        assert_eq!(line.text(), "print hello ");
        line.move_left();
        line.kill_to_start();
        assert_eq!(line.text(), " ");
        assert_eq!(line.cursor(), 0);
    }

    #[test]
    fn test_delete_word_before() {
        let mut line = LineBuffer::new();
        line.insert_str("print hello world");
        line.delete_word_before();
        assert_eq!(line.text(), "print hello ");
        line.delete_word_before();
        assert_eq!(line.text(), "print ");
        line.delete_word_before();
        assert_eq!(line.text(), "");
        assert!(line.delete_word_before().is_empty());
    }

    #[test]
    fn test_yank_restores_kill() {
        let mut line = LineBuffer::new();
        line.insert_str("one two");
        line.delete_word_before();
        line.move_home();
        line.yank();
        assert_eq!(line.text(), "twoone ");
    }

    #[test]
    fn test_continuation() {
        let mut line = LineBuffer::new();
        line.insert_str("print one \\");
        assert_eq!(line.submit(), Submitted::Continue);
        assert!(line.is_continuing());
        assert!(line.is_empty());
        line.insert_str("two\\");
        assert_eq!(line.submit(), Submitted::Continue);
        line.insert_str("three");
        assert_eq!(
            line.submit(),
            Submitted::Line("print one  two three".to_string())
        );
        assert!(!line.is_continuing());
    }

    #[test]
    fn test_plain_submit_resets() {
        let mut line = LineBuffer::new();
        line.insert_str("help");
        assert_eq!(line.submit(), Submitted::Line("help".into()));
        assert!(line.is_empty());
        assert_eq!(line.cursor(), 0);
    }

    #[test]
    fn test_word_at_cursor() {
        let mut line = LineBuffer::new();
        line.insert_str("job cl");
        assert_eq!(line.word_at_cursor(), (4, 6, 1));
        line.move_home();
        assert_eq!(line.word_at_cursor(), (0, 3, 0));
    }

    #[test]
    fn test_replay_matches_buffer() {
        let mut line = LineBuffer::new();
        let mut replay = Replay::new();

        let script: Vec<Box<dyn Fn(&mut LineBuffer) -> Vec<u8>>> = vec![
            Box::new(|l: &mut LineBuffer| l.insert_str("print hello world")),
            Box::new(|l: &mut LineBuffer| l.move_left()),
            Box::new(|l: &mut LineBuffer| l.move_left()),
            Box::new(|l: &mut LineBuffer| l.insert('X')),
            Box::new(|l: &mut LineBuffer| l.delete_before()),
            Box::new(|l: &mut LineBuffer| l.delete_after()),
            Box::new(|l: &mut LineBuffer| l.move_home()),
            Box::new(|l: &mut LineBuffer| l.delete_after()),
            Box::new(|l: &mut LineBuffer| l.insert('P')),
            Box::new(|l: &mut LineBuffer| l.move_end()),
            Box::new(|l: &mut LineBuffer| l.delete_word_before()),
            Box::new(|l: &mut LineBuffer| l.insert_str("there")),
            Box::new(|l: &mut LineBuffer| l.move_left()),
            Box::new(|l: &mut LineBuffer| l.move_left()),
            Box::new(|l: &mut LineBuffer| l.move_left()),
            Box::new(|l: &mut LineBuffer| l.kill_to_end()),
            Box::new(|l: &mut LineBuffer| l.yank()),
            Box::new(|l: &mut LineBuffer| l.move_left()),
            Box::new(|l: &mut LineBuffer| l.kill_to_start()),
            Box::new(|l: &mut LineBuffer| l.replace("jobs")),
            Box::new(|l: &mut LineBuffer| l.move_left()),
            Box::new(|l: &mut LineBuffer| l.replace("a much longer replacement line")),
            Box::new(|l: &mut LineBuffer| l.replace("short")),
        ];

        for step in &script {
            let out = step(&mut line);
            replay.apply(&out);
            assert_in_sync(&line, &replay);
        }
    }

    #[test]
    fn test_replay_pseudo_random_edits() {
        let mut line = LineBuffer::new();
        let mut replay = Replay::new();
        let mut seed: u32 = 0x2545_f491;

        for _ in 0..500 {
            seed ^= seed << 13;
            seed ^= seed >> 17;
            seed ^= seed << 5;
            let out = match seed % 9 {
                _ if line.len() >= 100 => line.delete_before(),
                0..=2 => line.insert((b'a' + (seed % 26) as u8) as char),
                3 => line.delete_before(),
                4 => line.delete_after(),
                5 => line.move_left(),
                6 => line.move_right(),
                7 => line.insert(' '),
                _ => {
                    if line.len() > 60 {
                        line.delete_word_before()
                    } else {
                        line.move_home()
                    }
                }
            };
            replay.apply(&out);
            assert_in_sync(&line, &replay);
        }
    }

    #[test]
    fn test_repaint_with_prompt() {
        let mut line = LineBuffer::new();
        line.insert_str("abc");
        line.move_left();
        let mut replay = Replay::new();
        replay.apply(b"garbage that should vanish");
        replay.apply(&line.repaint("> "));
        assert_eq!(replay.row(5), "> abc");
        assert!(replay.tail_is_blank(5));
        assert_eq!(replay.cursor_col(), 4);
    }
}
