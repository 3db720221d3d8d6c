use crate::net::protocol::ChatMessage;

/// Chat entries kept in the log.
pub const CHAT_CAPACITY: usize = 100;
/// Submitted lines kept for Up/Down recall.
pub const INPUT_CAPACITY: usize = 50;

/// Ring buffer of received messages. Fixed capacity, overwrites oldest.
pub struct MessageLog {
    buffer: Vec<Option<ChatMessage>>,
    capacity: usize,
    write_pos: usize,
    count: usize,
}

impl MessageLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: (0..capacity).map(|_| None).collect(),
            capacity,
            write_pos: 0,
            count: 0,
        }
    }

    /// Push a message. Returns true if the oldest entry was overwritten.
    pub fn push(&mut self, message: ChatMessage) -> bool {
        let evicted = self.count == self.capacity;
        self.buffer[self.write_pos] = Some(message);
        self.write_pos = (self.write_pos + 1) % self.capacity;
        if self.count < self.capacity {
            self.count += 1;
        }
        evicted
    }

    /// Oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ChatMessage> {
        let start = if self.count < self.capacity {
            0
        } else {
            self.write_pos
        };
        (0..self.count).filter_map(move |i| self.buffer[(start + i) % self.capacity].as_ref())
    }

    /// The most recent `n` messages, newest last.
    pub fn recent(&self, n: usize) -> Vec<&ChatMessage> {
        let skip = self.count - n.min(self.count);
        self.iter().skip(skip).collect()
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn clear(&mut self) {
        self.buffer.iter_mut().for_each(|slot| *slot = None);
        self.write_pos = 0;
        self.count = 0;
    }
}

impl Default for MessageLog {
    fn default() -> Self {
        Self::new(CHAT_CAPACITY)
    }
}

/// Shell-style recall of submitted lines.
#[derive(Debug, Default)]
pub struct InputHistory {
    lines: Vec<String>,
    /// Position while browsing; `None` means editing a fresh line.
    cursor: Option<usize>,
}

impl InputHistory {
    pub fn push(&mut self, line: &str) {
        self.cursor = None;
        if line.is_empty() || self.lines.last().is_some_and(|l| l == line) {
            return;
        }
        if self.lines.len() == INPUT_CAPACITY {
            self.lines.remove(0);
        }
        self.lines.push(line.to_string());
    }

    /// Step back to an older line.
    pub fn older(&mut self) -> Option<&str> {
        let next = match self.cursor {
            None => self.lines.len().checked_sub(1)?,
            Some(0) => 0,
            Some(i) => i - 1,
        };
        self.cursor = Some(next);
        self.lines.get(next).map(String::as_str)
    }

    /// Step forward. Walking past the newest line yields an empty string.
    pub fn newer(&mut self) -> Option<&str> {
        let i = self.cursor?;
        if i + 1 >= self.lines.len() {
            self.cursor = None;
            return Some("");
        }
        self.cursor = Some(i + 1);
        self.lines.get(i + 1).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

/// One-line rendering of a chat message for the log.
pub fn format_message(message: &ChatMessage) -> String {
    match (message.from.is_empty(), message.title.is_empty()) {
        (true, true) => message.body.clone(),
        (false, true) => format!("{}: {}", message.from, message.body),
        (true, false) => format!("[{}] {}", message.title, message.body),
        (false, false) => format!("[{}] {}: {}", message.title, message.from, message.body),
    }
}
