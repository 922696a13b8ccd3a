//! Deferred task queue.
//!
//! Work that must not run while a subscription is being constructed or
//! iterated (initial refreshes, retries after a bad cache) is queued here
//! and executed by the next [`crate::Manager::tick`].

use std::collections::VecDeque;

use crate::subscription::SubscriptionId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Task {
    /// Start a refresh of the subscription
    Update(SubscriptionId),
}

#[derive(Debug, Default)]
pub struct Scheduler {
    queue: VecDeque<Task>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `task` unless an identical one is already waiting.
    pub fn defer(&mut self, task: Task) -> bool {
        if self.queue.contains(&task) {
            return false;
        }
        self.queue.push_back(task);
        true
    }

    /// Take every queued task, in order. Tasks deferred while the returned
    /// batch runs wait for the next drain.
    pub fn drain(&mut self) -> Vec<Task> {
        self.queue.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defer_deduplicates() {
        let mut scheduler = Scheduler::new();
        assert!(scheduler.defer(Task::Update(SubscriptionId::new(1))));
        assert!(!scheduler.defer(Task::Update(SubscriptionId::new(1))));
        assert!(scheduler.defer(Task::Update(SubscriptionId::new(2))));
        assert_eq!(scheduler.len(), 2);
    }

    #[test]
    fn test_drain_keeps_order() {
        let mut scheduler = Scheduler::new();
        scheduler.defer(Task::Update(SubscriptionId::new(3)));
        scheduler.defer(Task::Update(SubscriptionId::new(1)));

        assert_eq!(
            scheduler.drain(),
            vec![Task::Update(SubscriptionId::new(3)), Task::Update(SubscriptionId::new(1))]
        );
        assert!(scheduler.is_empty());
    }
}
