//! Bounded buffer of page console output.

use std::collections::VecDeque;
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::types::ConsoleEntry;

pub const DEFAULT_CONSOLE_CAPACITY: usize = 500;

/// Keeps the most recent console lines; older ones are dropped first.
#[derive(Clone)]
pub struct ConsoleLog {
    lines: Arc<Mutex<VecDeque<ConsoleEntry>>>,
    capacity: usize,
}

impl ConsoleLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity.min(1024)))),
            capacity: capacity.max(1),
        }
    }

    pub async fn push(&self, entry: ConsoleEntry) {
        let mut lines = self.lines.lock().await;
        while lines.len() >= self.capacity {
            lines.pop_front();
        }
        lines.push_back(entry);
    }

    pub async fn snapshot(&self) -> Vec<ConsoleEntry> {
        self.lines.lock().await.iter().cloned().collect()
    }

    /// One `[level] text` line per entry.
    pub async fn render(&self) -> String {
        self.lines
            .lock()
            .await
            .iter()
            .map(|e| format!("{} [{}] {}", e.timestamp.format("%H:%M:%S%.3f"), e.level, e.text))
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub async fn len(&self) -> usize {
        self.lines.lock().await.len()
    }
}

impl Default for ConsoleLog {
    fn default() -> Self {
        Self::new(DEFAULT_CONSOLE_CAPACITY)
    }
}
