//! Bounded record of recently resolved tasks

use std::collections::VecDeque;

use super::model::{TaskId, TaskStatus};

/// Default number of resolved task ids remembered
pub const DEFAULT_HISTORY_CAPACITY: usize = 50;

/// Fixed-size FIFO of resolved task ids.
///
/// Only used to tell a late or duplicate result for a known task apart from
/// a result for a task that never existed.
#[derive(Debug, Clone)]
pub struct TaskHistory {
    capacity: usize,
    entries: VecDeque<(TaskId, TaskStatus)>,
}

impl TaskHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Remember a resolved task, evicting the oldest entry when full
    pub fn record(&mut self, id: TaskId, status: TaskStatus) {
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back((id, status));
    }

    /// Final status of a remembered task
    pub fn find(&self, id: &TaskId) -> Option<TaskStatus> {
        self.entries
            .iter()
            .rev()
            .find(|(entry, _)| entry == id)
            .map(|(_, status)| *status)
    }

    pub fn contains(&self, id: &TaskId) -> bool {
        self.find(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for TaskHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_and_find() {
        let mut history = TaskHistory::new(3);
        let id = TaskId::new();
        history.record(id, TaskStatus::Completed);

        assert_eq!(history.find(&id), Some(TaskStatus::Completed));
        assert!(!history.contains(&TaskId::new()));
    }

    #[test]
    fn test_oldest_entry_is_evicted() {
        let mut history = TaskHistory::new(2);
        let first = TaskId::new();
        let second = TaskId::new();
        let third = TaskId::new();

        history.record(first, TaskStatus::Completed);
        history.record(second, TaskStatus::Failed);
        history.record(third, TaskStatus::TimedOut);

        assert_eq!(history.len(), 2);
        assert!(!history.contains(&first));
        assert!(history.contains(&second));
        assert!(history.contains(&third));
    }

    #[test]
    fn test_zero_capacity_remembers_nothing() {
        let mut history = TaskHistory::new(0);
        history.record(TaskId::new(), TaskStatus::Completed);
        assert!(history.is_empty());
    }
}
