use std::collections::VecDeque;

use super::History;

/// Bounded in-memory history. When full, the oldest entry is evicted.
#[derive(Debug, Clone, Default)]
pub struct MemoryHistory {
    entries: VecDeque<String>,
    max_length: usize,
}

impl MemoryHistory {
    #[must_use]
    pub fn new(max_length: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            max_length,
        }
    }

    fn evict(&mut self) {
        while self.entries.len() > self.max_length {
            self.entries.pop_front();
        }
    }
}

impl History for MemoryHistory {
    fn append(&mut self, line: &str, force: bool) {
        if self.max_length == 0 || (!force && line.trim().is_empty()) {
            return;
        }
        self.entries.push_back(line.to_string());
        self.evict();
    }

    fn get(&self, index: usize) -> Option<String> {
        index
            .checked_sub(1)
            .and_then(|i| self.entries.get(i))
            .cloned()
    }

    fn total(&self) -> usize {
        self.entries.len()
    }

    fn remove(&mut self, index: usize) {
        if let Some(i) = index.checked_sub(1) {
            self.entries.remove(i);
        }
    }

    fn clear(&mut self) {
        self.entries.clear();
    }

    fn set_max_length(&mut self, max: usize) {
        self.max_length = max;
        self.evict();
    }

    fn max_length(&self) -> usize {
        self.max_length
    }
}
