use std::collections::VecDeque;

pub const DEFAULT_LOG_CAPACITY: usize = 1000;

/// Human-readable activity log shown under the relay cards.
///
/// Lines are kept in arrival order. Once `capacity` lines are held the oldest
/// one is dropped for each new line, so a long-lived session stays bounded.
#[derive(Debug, Clone, PartialEq)]
pub struct ActivityLog {
    lines: VecDeque<String>,
    capacity: usize,
}

impl ActivityLog {
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { lines: VecDeque::with_capacity(capacity.min(64)), capacity }
    }

    pub fn push(&mut self, line: impl Into<String>) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line.into());
    }

    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::with_capacity(DEFAULT_LOG_CAPACITY)
    }
}
