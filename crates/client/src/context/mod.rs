//! Execution context for deferred callbacks.
//!
//! All response events of one connection run on a single logical context. Work
//! that must not run synchronously (for example replaying buffered chunks after
//! `resume`) is handed to a [`Scheduler`] which runs it later, in submission
//! order and never re-entrantly.

mod task_queue;

pub use task_queue::TaskQueue;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + 'static>;

/// Enqueues tasks for later, ordered, non-reentrant execution.
///
/// Tasks scheduled earlier must run before tasks scheduled later.
pub trait Scheduler {
    fn schedule(&self, task: Task);
}

impl<S: Scheduler + ?Sized> Scheduler for std::rc::Rc<S> {
    fn schedule(&self, task: Task) {
        (**self).schedule(task);
    }
}
