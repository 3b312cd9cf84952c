//! Interactive line editor: decoded keys in, echo bytes and actions out.

use super::completion::{complete, Completion};
use super::decoder::Key;
use super::history::History;
use super::line::{LineBuffer, Submitted};

/// Source of completion candidates.
pub trait Candidates {
    /// Names valid after the `preceding` words of the line.
    fn candidates(&self, preceding: &[String]) -> Vec<String>;
}

impl<F> Candidates for F
where
    F: Fn(&[String]) -> Vec<String>,
{
    fn candidates(&self, preceding: &[String]) -> Vec<String> {
        self(preceding)
    }
}

/// What the session should do after a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Keep reading keys.
    None,
    /// Run this line.
    Submit(String),
    /// The line was abandoned with Ctrl-C.
    Interrupt,
    /// Ctrl-D on an empty line: end the session.
    Close,
}

/// Result of handling one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    /// Bytes to write back to the terminal.
    pub echo: Vec<u8>,
    pub action: Action,
}

impl Step {
    fn echo(echo: Vec<u8>) -> Self {
        Self {
            echo,
            action: Action::None,
        }
    }
}

/// Line editor for one session.
#[derive(Debug, Clone)]
pub struct Editor {
    line: LineBuffer,
    history: History,
    prompt: String,
    continuation_prompt: String,
}

impl Editor {
    pub fn new(prompt: impl Into<String>, continuation_prompt: impl Into<String>, history_size: usize) -> Self {
        Self {
            line: LineBuffer::new(),
            history: History::new(history_size),
            prompt: prompt.into(),
            continuation_prompt: continuation_prompt.into(),
        }
    }

    /// Prompt for the line currently being edited.
    pub fn prompt(&self) -> &str {
        if self.line.is_continuing() {
            &self.continuation_prompt
        } else {
            &self.prompt
        }
    }

    pub fn line(&self) -> &LineBuffer {
        &self.line
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    /// Repaint prompt and line from column zero, e.g. after a resize.
    pub fn repaint(&self) -> Vec<u8> {
        self.line.repaint(self.prompt())
    }

    /// Handle one decoded key.
    pub fn handle(&mut self, key: Key, names: &dyn Candidates) -> Step {
        match key {
            Key::Char(ch) => Step::echo(self.line.insert(ch)),
            Key::Backspace => Step::echo(self.line.delete_before()),
            Key::Delete => Step::echo(self.line.delete_after()),
            Key::Left => Step::echo(self.line.move_left()),
            Key::Right => Step::echo(self.line.move_right()),
            Key::Home => Step::echo(self.line.move_home()),
            Key::End => Step::echo(self.line.move_end()),
            Key::KillToEnd => Step::echo(self.line.kill_to_end()),
            Key::KillToStart => Step::echo(self.line.kill_to_start()),
            Key::DeleteWord => Step::echo(self.line.delete_word_before()),
            Key::Yank => Step::echo(self.line.yank()),
            Key::Redraw => Step::echo(self.line.clear_screen(self.prompt())),
            Key::HistoryUp => {
                let current = self.line.text();
                match self.history.up(&current) {
                    Some(text) => Step::echo(self.line.replace(&text)),
                    None => Step::echo(Vec::new()),
                }
            }
            Key::HistoryDown => match self.history.down() {
                Some(text) => Step::echo(self.line.replace(&text)),
                None => Step::echo(Vec::new()),
            },
            Key::Complete => Step::echo(self.complete(names)),
            Key::Enter => self.enter(),
            Key::Interrupt => {
                self.line.reset();
                self.history.reset_navigation();
                let mut echo = b"^C\r\n".to_vec();
                echo.extend_from_slice(self.prompt.as_bytes());
                Step {
                    echo,
                    action: Action::Interrupt,
                }
            }
            Key::EndOfInput => {
                if self.line.is_empty() && !self.line.is_continuing() {
                    Step {
                        echo: b"\r\n".to_vec(),
                        action: Action::Close,
                    }
                } else {
                    Step::echo(self.line.delete_after())
                }
            }
        }
    }

    fn enter(&mut self) -> Step {
        let mut echo = b"\r\n".to_vec();
        match self.line.submit() {
            Submitted::Continue => {
                echo.extend_from_slice(self.continuation_prompt.as_bytes());
                Step::echo(echo)
            }
            Submitted::Line(text) => {
                self.history.push(&text);
                Step {
                    echo,
                    action: Action::Submit(text),
                }
            }
        }
    }

    fn complete(&mut self, names: &dyn Candidates) -> Vec<u8> {
        let (start, _, _) = self.line.word_at_cursor();
        let token = self.line.slice(start, self.line.cursor());
        let preceding: Vec<String> = self
            .line
            .slice(0, start)
            .split_whitespace()
            .map(String::from)
            .collect();
        let candidates = names.candidates(&preceding);

        match complete(&token, candidates.iter().map(String::as_str)) {
            Completion::NoMatch => b"\x07".to_vec(),
            Completion::Insert(rest) => self.line.insert_str(&rest),
            Completion::List(matches) => {
                let mut out = b"\r\n".to_vec();
                out.extend_from_slice(matches.join("  ").as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend(self.repaint());
                out
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::decoder::EscapeDecoder;

    fn names(preceding: &[String]) -> Vec<String> {
        let list: &[&str] = match preceding {
            [] => &["job", "jobs", "print"],
            [first] if first == "job" => &["list", "kill", "clean"],
            _ => &[],
        };
        list.iter().map(|s| s.to_string()).collect()
    }

    fn type_bytes(editor: &mut Editor, bytes: &[u8]) -> Vec<Step> {
        let mut decoder = EscapeDecoder::new();
        decoder
            .feed_all(bytes)
            .into_iter()
            .map(|key| editor.handle(key, &names))
            .collect()
    }

    fn submitted(steps: &[Step]) -> Vec<String> {
        steps
            .iter()
            .filter_map(|s| match &s.action {
                Action::Submit(line) => Some(line.clone()),
                _ => None,
            })
            .collect()
    }

    fn editor() -> Editor {
        Editor::new("> ", ". ", 100)
    }

    #[test]
    fn test_submit_line() {
        let mut editor = editor();
        let steps = type_bytes(&mut editor, b"print hi\r");
        assert_eq!(submitted(&steps), vec!["print hi"]);
        assert_eq!(editor.history().len(), 1);
    }

    #[test]
    fn test_edit_with_arrows_before_submit() {
        let mut editor = editor();
        let steps = type_bytes(&mut editor, b"prnt\x1b[D\x1b[D\x1b[Ci\r");
        assert_eq!(submitted(&steps), vec!["print"]);
    }

    #[test]
    fn test_history_recall() {
        let mut editor = editor();
        type_bytes(&mut editor, b"print one\rprint two\r");
        let steps = type_bytes(&mut editor, b"\x1b[A\x1b[A\r");
        assert_eq!(submitted(&steps), vec!["print one"]);
    }

    #[test]
    fn test_continuation_prompt() {
        let mut editor = editor();
        let steps = type_bytes(&mut editor, b"print a\\\r");
        assert_eq!(steps.last().map(|s| s.echo.clone()), Some(b"\r\n. ".to_vec()));
        assert_eq!(editor.prompt(), ". ");
        let steps = type_bytes(&mut editor, b"b\r");
        assert_eq!(submitted(&steps), vec!["print a b"]);
        assert_eq!(editor.prompt(), "> ");
    }

    #[test]
    fn test_interrupt_discards_line() {
        let mut editor = editor();
        let steps = type_bytes(&mut editor, b"print x\x03");
        assert_eq!(steps.last().map(|s| s.action.clone()), Some(Action::Interrupt));
        assert!(editor.line().is_empty());
    }

    #[test]
    fn test_ctrl_d_closes_only_empty_line() {
        let mut editor = editor();
        let steps = type_bytes(&mut editor, b"ab\x1b[D\x04");
        assert_eq!(steps.last().map(|s| s.action.clone()), Some(Action::None));
        assert_eq!(editor.line().text(), "a");
        type_bytes(&mut editor, b"\x7f");
        let steps = type_bytes(&mut editor, b"\x04");
        assert_eq!(steps.last().map(|s| s.action.clone()), Some(Action::Close));
    }

    #[test]
    fn test_tab_completes_common_prefix() {
        let mut editor = editor();
        type_bytes(&mut editor, b"pr\t");
        assert_eq!(editor.line().text(), "print");

        let mut other = Editor::new("> ", ". ", 100);
        type_bytes(&mut other, b"jo\t");
        assert_eq!(other.line().text(), "job");
    }

    #[test]
    fn test_tab_lists_ambiguous_matches() {
        let mut editor = editor();
        let steps = type_bytes(&mut editor, b"job\t");
        let echo = String::from_utf8(steps[3].echo.clone()).unwrap();
        assert!(echo.contains("job  jobs"));
        assert!(echo.ends_with("> job\x1b[K"));
    }

    #[test]
    fn test_tab_completes_namespace_children() {
        let mut editor = editor();
        type_bytes(&mut editor, b"job cl\t");
        assert_eq!(editor.line().text(), "job clean");
    }
}
