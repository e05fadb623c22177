//! Deferred destruction of GPU objects.
//!
//! Every object created for the renderer registers a release action here.
//! Actions run newest first, so an object is always released before anything
//! it was built from. There is one global queue, flushed at shutdown, and one
//! per frame slot, flushed once that slot's fence proves the GPU is done with
//! the frame's transient objects.

use tracing::{trace, warn};

type ReleaseAction = Box<dyn FnOnce()>;

/// LIFO list of release actions.
#[derive(Default)]
pub struct DeletionQueue {
    actions: Vec<ReleaseAction>,
}

impl DeletionQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `action` to run on the next [`flush`](Self::flush).
    ///
    /// The closure usually owns the RAII wrapper it releases, so the object
    /// stays alive exactly until the flush.
    pub fn push<F>(&mut self, action: F)
    where
        F: FnOnce() + 'static,
    {
        self.actions.push(Box::new(action));
    }

    /// Runs every pending action in reverse registration order and empties
    /// the queue. Flushing an empty queue does nothing.
    pub fn flush(&mut self) {
        if self.actions.is_empty() {
            return;
        }
        trace!("Flushing {} release action(s)", self.actions.len());
        while let Some(action) = self.actions.pop() {
            action();
        }
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

impl Drop for DeletionQueue {
    fn drop(&mut self) {
        if !self.actions.is_empty() {
            warn!(
                "Deletion queue dropped with {} pending action(s); flushing",
                self.actions.len()
            );
            self.flush();
        }
    }
}

impl std::fmt::Debug for DeletionQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeletionQueue")
            .field("pending", &self.actions.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn test_flush_runs_newest_first() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = DeletionQueue::new();
        for name in ["A", "B", "C"] {
            let log = log.clone();
            queue.push(move || log.borrow_mut().push(name));
        }
        assert_eq!(queue.len(), 3);

        queue.flush();

        assert_eq!(*log.borrow(), vec!["C", "B", "A"]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_second_flush_is_noop() {
        let count = Rc::new(RefCell::new(0));
        let mut queue = DeletionQueue::new();
        let c = count.clone();
        queue.push(move || *c.borrow_mut() += 1);

        queue.flush();
        queue.flush();

        assert_eq!(*count.borrow(), 1);
    }

    #[test]
    fn test_empty_flush() {
        let mut queue = DeletionQueue::new();
        queue.flush();
        assert!(queue.is_empty());
    }

    #[test]
    fn test_actions_pushed_after_flush_run_next_time() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue = DeletionQueue::new();

        let l = log.clone();
        queue.push(move || l.borrow_mut().push(1));
        queue.flush();

        let l = log.clone();
        queue.push(move || l.borrow_mut().push(2));
        queue.flush();

        assert_eq!(*log.borrow(), vec![1, 2]);
    }

    #[test]
    fn test_drop_flushes_pending_actions() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let mut queue = DeletionQueue::new();
            let l = log.clone();
            queue.push(move || l.borrow_mut().push("first"));
            let l = log.clone();
            queue.push(move || l.borrow_mut().push("second"));
        }
        assert_eq!(*log.borrow(), vec!["second", "first"]);
    }

    #[test]
    fn test_owned_object_released_on_flush() {
        let witness = Rc::new(());
        let mut queue = DeletionQueue::new();
        let held = witness.clone();
        queue.push(move || drop(held));
        assert_eq!(Rc::strong_count(&witness), 2);

        queue.flush();

        assert_eq!(Rc::strong_count(&witness), 1);
    }
}
