use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Number of log lines kept when no capacity is configured
pub const DEFAULT_LOG_BUFFER_SIZE: usize = 25;

/// Bounded, shared buffer of the most recent log lines.
///
/// Cloning is cheap and every clone sees the same lines. The lock is held only
/// for the push or the copy, never across I/O.
#[derive(Debug, Clone)]
pub struct LogRing {
    capacity: usize,
    lines: Arc<Mutex<VecDeque<String>>>,
}

impl Default for LogRing {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_BUFFER_SIZE)
    }
}

impl LogRing {
    /// A capacity of zero falls back to [`DEFAULT_LOG_BUFFER_SIZE`]
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            DEFAULT_LOG_BUFFER_SIZE
        } else {
            capacity
        };
        Self {
            capacity,
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store a line, evicting the oldest one when full
    pub fn append(&self, line: impl Into<String>) {
        let mut lines = self.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line.into());
    }

    /// Copy of the stored lines, oldest first
    pub fn snapshot(&self) -> Vec<String> {
        self.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<String>> {
        // A panic while holding the lock cannot leave the deque half-updated.
        self.lines.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
