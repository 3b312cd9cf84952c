//! Per-session command history with a draft slot.

use std::collections::VecDeque;

/// Default number of retained entries.
pub const DEFAULT_HISTORY_SIZE: usize = 1000;

/// Bounded, ordered command log (oldest first).
///
/// While navigating, `index` points at the entry being shown. The line the
/// user was editing before the first "up" is kept in `draft` and restored
/// when navigation walks past the newest entry.
#[derive(Debug, Clone)]
pub struct History {
    entries: VecDeque<String>,
    capacity: usize,
    index: Option<usize>,
    draft: String,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: capacity.max(1),
            index: None,
            draft: String::new(),
        }
    }

    /// Append a submitted line. Empty lines and repeats of the newest entry
    /// are ignored. Always ends navigation.
    pub fn push(&mut self, line: &str) {
        self.index = None;
        self.draft.clear();

        if line.trim().is_empty() || self.entries.back().is_some_and(|last| last == line) {
            return;
        }
        self.entries.push_back(line.to_string());
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Step to an older entry. `current` is the line being edited; it is
    /// saved as the draft when navigation starts. Returns the text to show,
    /// or `None` when nothing changes.
    pub fn up(&mut self, current: &str) -> Option<String> {
        let index = match self.index {
            None if self.entries.is_empty() => return None,
            None => {
                self.draft = current.to_string();
                self.entries.len()
            }
            Some(0) => return None,
            Some(i) => i,
        };
        let index = index - 1;
        self.index = Some(index);
        self.entries.get(index).cloned()
    }

    /// Step to a newer entry; past the newest, restore the draft and stop
    /// navigating. A no-op when not navigating.
    pub fn down(&mut self) -> Option<String> {
        let index = self.index? + 1;
        if index >= self.entries.len() {
            self.index = None;
            return Some(std::mem::take(&mut self.draft));
        }
        self.index = Some(index);
        self.entries.get(index).cloned()
    }

    /// Stop navigating without restoring the draft (the user edited a
    /// recalled entry).
    pub fn reset_navigation(&mut self) {
        self.index = None;
        self.draft.clear();
    }

    /// Current navigation index, `None` when not navigating.
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn is_navigating(&self) -> bool {
        self.index.is_some()
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(String::as_str)
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_SIZE)
    }
}
