use parking_lot::Mutex;

use super::task::Task;

/// Pending tasks ordered by priority, highest first.
///
/// Insertion scans for the first task with strictly lower priority, so
/// tasks of equal priority keep their submission order.
#[derive(Debug, Default)]
pub struct PriorityQueue {
    tasks: Mutex<Vec<Task>>,
}

impl PriorityQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task behind every task of equal or higher priority
    pub fn push(&self, task: Task) {
        let mut tasks = self.tasks.lock();
        let index = tasks
            .iter()
            .position(|queued| queued.priority < task.priority)
            .unwrap_or(tasks.len());
        tasks.insert(index, task);
    }

    /// Remove the highest-priority task
    pub fn pop(&self) -> Option<Task> {
        let mut tasks = self.tasks.lock();
        if tasks.is_empty() {
            None
        } else {
            Some(tasks.remove(0))
        }
    }

    /// Priority of the next task to pop
    pub fn peek_priority(&self) -> Option<i32> {
        self.tasks.lock().first().map(|task| task.priority)
    }

    pub fn len(&self) -> usize {
        self.tasks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.lock().is_empty()
    }

    /// Remove and return every task in priority order
    pub fn drain(&self) -> Vec<Task> {
        std::mem::take(&mut *self.tasks.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::ToolUse;

    fn push(queue: &PriorityQueue, id: &str, priority: i32) {
        let (task, _handle) = Task::new(ToolUse::new(id, "t"), priority, None);
        queue.push(task);
    }

    #[test]
    fn test_highest_priority_first() {
        let queue = PriorityQueue::new();
        push(&queue, "low", -1);
        push(&queue, "high", 10);
        push(&queue, "mid", 5);

        assert_eq!(queue.peek_priority(), Some(10));
        let order: Vec<String> = std::iter::from_fn(|| queue.pop()).map(|t| t.id).collect();
        assert_eq!(order, vec!["high", "mid", "low"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_ties_keep_insertion_order() {
        let queue = PriorityQueue::new();
        push(&queue, "a", 1);
        push(&queue, "b", 1);
        push(&queue, "urgent", 2);
        push(&queue, "c", 1);

        let order: Vec<String> = queue.drain().into_iter().map(|t| t.id).collect();
        assert_eq!(order, vec!["urgent", "a", "b", "c"]);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn test_pop_empty() {
        let queue = PriorityQueue::new();
        assert!(queue.pop().is_none());
        assert_eq!(queue.peek_priority(), None);
    }
}
