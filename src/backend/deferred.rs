//! Deferred destruction of GPU resources.
//!
//! GPU commands run asynchronously: a staging buffer referenced by a copy
//! can't be released the moment the copy is recorded. Resources are queued
//! with the serial of the submission that last uses them and released once
//! that submission is known to be complete.
//!
//! ```text
//! destroy_deferred(res)      -> queued under the serial being recorded
//! submit()                   -> serial N handed to the GPU
//! collect_garbage(done = N)  -> every entry with serial <= N is released
//! ```

use std::collections::VecDeque;

/// Queue of resources waiting for their submission to complete
#[derive(Debug)]
pub struct DeferredQueue<T> {
    pending: VecDeque<(u64, T)>,
}

impl<T> DeferredQueue<T> {
    pub fn new() -> Self {
        Self {
            pending: VecDeque::new(),
        }
    }

    /// Queue `resource` until submission `serial` has completed.
    ///
    /// Serials must be pushed in non-decreasing order.
    pub fn push(&mut self, serial: u64, resource: T) {
        debug_assert!(
            self.pending.back().map_or(true, |(last, _)| *last <= serial),
            "deferred serials must not go backwards"
        );
        self.pending.push_back((serial, resource));
    }

    /// Remove every resource whose submission serial is `<= completed`
    pub fn drain_completed(&mut self, completed: u64) -> Vec<T> {
        let mut ready = Vec::new();
        while let Some((serial, _)) = self.pending.front() {
            if *serial > completed {
                break;
            }
            if let Some((_, resource)) = self.pending.pop_front() {
                ready.push(resource);
            }
        }
        ready
    }

    /// Remove everything regardless of serial (device idle)
    pub fn drain_all(&mut self) -> Vec<T> {
        self.pending.drain(..).map(|(_, resource)| resource).collect()
    }

    /// Number of resources pending destruction
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

impl<T> Default for DeferredQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_only_completed_serials() {
        let mut queue = DeferredQueue::new();
        queue.push(1, "a");
        queue.push(2, "b");
        queue.push(2, "c");
        queue.push(4, "d");

        assert!(queue.drain_completed(0).is_empty());
        assert_eq!(queue.drain_completed(2), vec!["a", "b", "c"]);
        assert_eq!(queue.len(), 1);
        assert!(queue.drain_completed(3).is_empty());
        assert_eq!(queue.drain_completed(4), vec!["d"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_all_empties_queue() {
        let mut queue = DeferredQueue::new();
        queue.push(7, 1u32);
        queue.push(9, 2u32);
        assert_eq!(queue.drain_all(), vec![1, 2]);
        assert!(queue.is_empty());
    }
}
