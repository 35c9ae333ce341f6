use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use tokio::sync::Notify;
use tracing::trace;

use crate::context::{Scheduler, Task};

/// A FIFO run queue for a single-threaded execution context.
///
/// `TaskQueue` is a cheap cloneable handle, every clone feeds the same queue.
/// The owner of the context (usually the connection driver) calls
/// [`run_pending`](TaskQueue::run_pending) whenever it is safe to run callbacks,
/// and can wait for new work with [`ready`](TaskQueue::ready).
#[derive(Clone, Default)]
pub struct TaskQueue {
    inner: Rc<Inner>,
}

#[derive(Default)]
struct Inner {
    tasks: RefCell<VecDeque<Task>>,
    running: Cell<bool>,
    notify: Notify,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs queued tasks in submission order until the queue is empty.
    ///
    /// Tasks scheduled by a running task are run in the same pass, after the
    /// ones already queued. Calling this from inside a task does nothing and
    /// returns 0.
    pub fn run_pending(&self) -> usize {
        if self.inner.running.replace(true) {
            trace!("run_pending called from a running task, ignored");
            return 0;
        }

        let _running = RunningGuard(&self.inner.running);
        let mut ran = 0;
        loop {
            // the borrow must end before the task runs, tasks may schedule more tasks
            let next = self.inner.tasks.borrow_mut().pop_front();
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }

        if ran > 0 {
            trace!(tasks = ran, "ran pending tasks");
        }
        ran
    }

    /// Waits until a task has been scheduled since the last wake up.
    pub async fn ready(&self) {
        if !self.is_empty() {
            return;
        }
        self.inner.notify.notified().await;
    }

    pub fn len(&self) -> usize {
        self.inner.tasks.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.tasks.borrow().is_empty()
    }
}

/// Clears the running flag on exit, also when a task panics.
struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl Scheduler for TaskQueue {
    fn schedule(&self, task: Task) {
        self.inner.tasks.borrow_mut().push_back(task);
        self.inner.notify.notify_one();
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").field("pending", &self.len()).field("running", &self.inner.running.get()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_in_submission_order() {
        let queue = TaskQueue::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        for i in 0..3 {
            let seen = Rc::clone(&seen);
            queue.schedule(Box::new(move || seen.borrow_mut().push(i)));
        }

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.run_pending(), 3);
        assert!(queue.is_empty());
        assert_eq!(*seen.borrow(), vec![0, 1, 2]);
    }

    #[test]
    fn tasks_scheduled_by_tasks_run_after_queued_ones() {
        let queue = TaskQueue::new();
        let seen = Rc::new(RefCell::new(Vec::new()));

        {
            let seen = Rc::clone(&seen);
            let queue_in_task = queue.clone();
            queue.schedule(Box::new(move || {
                seen.borrow_mut().push("first");
                let seen = Rc::clone(&seen);
                queue_in_task.schedule(Box::new(move || seen.borrow_mut().push("nested")));
            }));
        }
        {
            let seen = Rc::clone(&seen);
            queue.schedule(Box::new(move || seen.borrow_mut().push("second")));
        }

        assert_eq!(queue.run_pending(), 3);
        assert_eq!(*seen.borrow(), vec!["first", "second", "nested"]);
    }

    #[test]
    fn nested_run_is_a_no_op() {
        let queue = TaskQueue::new();
        let nested = Rc::new(Cell::new(usize::MAX));

        {
            let queue_in_task = queue.clone();
            let nested = Rc::clone(&nested);
            queue.schedule(Box::new(move || nested.set(queue_in_task.run_pending())));
        }
        queue.schedule(Box::new(|| {}));

        assert_eq!(queue.run_pending(), 2);
        assert_eq!(nested.get(), 0);
    }

    #[test]
    fn panicking_task_does_not_wedge_the_queue() {
        let queue = TaskQueue::new();
        queue.schedule(Box::new(|| panic!("task failed")));

        std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| queue.run_pending())).unwrap_err();

        let ran = Rc::new(Cell::new(false));
        let flag = Rc::clone(&ran);
        queue.schedule(Box::new(move || flag.set(true)));

        assert_eq!(queue.run_pending(), 1);
        assert!(ran.get());
    }

    #[tokio::test]
    async fn ready_resolves_once_work_is_queued() {
        let queue = TaskQueue::new();
        let waiter = queue.clone();

        let (_, ()) = tokio::join!(waiter.ready(), async {
            tokio::task::yield_now().await;
            queue.schedule(Box::new(|| {}));
        });

        assert_eq!(queue.run_pending(), 1);
    }
}
