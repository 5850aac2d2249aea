//! Single-consumer task queue.
//!
//! Every public call, timer firing and I/O completion of a socket becomes a
//! task on one ordered queue, consumed by exactly one worker. Nothing in a
//! socket runs concurrently with anything else, so worker-owned state needs
//! no locks.
//!
//! # Semantics
//!
//! - [`TaskQueue::exec`] appends a task from outside the worker (public API,
//!   I/O tasks, timers). Code already running on the worker calls its own
//!   methods directly instead.
//! - [`TaskQueue::next_tick`] appends a task from inside the worker. It runs
//!   after the current task and after everything enqueued before it.
//!
//! ```text
//!   open/send/close ─┐
//!   I/O callbacks  ──┼──► [ t1 | t2 | t3 | ... ] ──► worker (one at a time)
//!   timers         ──┘
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::ops::ControlFlow;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

// ============================================================================
// TaskHandler
// ============================================================================

/// Consumer of queued tasks.
pub trait TaskHandler<T>: Send + 'static {
    /// Handles one task. Returning [`ControlFlow::Break`] stops the worker.
    fn handle(&mut self, task: T) -> ControlFlow<()>;

    /// Receives tasks still queued when the worker stopped.
    fn on_dropped(&mut self, _task: T) {}
}

// ============================================================================
// TaskQueue
// ============================================================================

/// Producer handle of a task queue.
#[derive(Debug)]
pub struct TaskQueue<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> Clone for TaskQueue<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

/// Consumer end of a task queue, handed to [`run`] or [`spawn`].
#[derive(Debug)]
pub struct TaskReceiver<T> {
    rx: mpsc::UnboundedReceiver<T>,
}

impl<T: Send + 'static> TaskQueue<T> {
    /// Creates a queue and its receiver.
    #[must_use]
    pub fn channel() -> (Self, TaskReceiver<T>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, TaskReceiver { rx })
    }

    /// Enqueues a task.
    ///
    /// Returns `false` if the worker has stopped; the task is dropped.
    pub fn exec(&self, task: T) -> bool {
        self.try_exec(task).is_ok()
    }

    /// Enqueues a task, handing it back if the worker has stopped.
    pub fn try_exec(&self, task: T) -> Result<(), T> {
        self.tx.send(task).map_err(|e| {
            trace!("task rejected, worker stopped");
            e.0
        })
    }

    /// Enqueues a task from inside the worker, behind everything already
    /// queued. Hands the task back if the worker has stopped.
    ///
    /// The queue is FIFO with a single consumer, so the task cannot run
    /// until the task calling this has returned.
    pub fn next_tick(&self, task: T) -> Result<(), T> {
        trace!("deferring task to next tick");
        self.try_exec(task)
    }

    /// Returns `true` once the worker has stopped.
    #[inline]
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// Worker
// ============================================================================

/// Runs `handler` until it breaks or every producer is dropped.
///
/// Tasks still queued after a break go to [`TaskHandler::on_dropped`].
///
/// Returns the handler so callers (and tests) can inspect its final state.
pub async fn run<T, H>(mut receiver: TaskReceiver<T>, mut handler: H) -> H
where
    T: Send + 'static,
    H: TaskHandler<T>,
{
    while let Some(task) = receiver.rx.recv().await {
        if handler.handle(task).is_break() {
            debug!("event loop stopped by handler");
            receiver.rx.close();
            while let Ok(task) = receiver.rx.try_recv() {
                handler.on_dropped(task);
            }
            return handler;
        }
    }

    debug!("event loop stopped, all producers dropped");
    handler
}

/// Spawns [`run`] on the current tokio runtime.
pub fn spawn<T, H>(receiver: TaskReceiver<T>, handler: H) -> JoinHandle<H>
where
    T: Send + 'static,
    H: TaskHandler<T>,
{
    tokio::spawn(run(receiver, handler))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    enum Task {
        Record(u32),
        Outer,
        Stop,
    }

    struct Recorder {
        queue: TaskQueue<Task>,
        seen: Vec<u32>,
        dropped: Vec<u32>,
    }

    impl TaskHandler<Task> for Recorder {
        fn handle(&mut self, task: Task) -> ControlFlow<()> {
            match task {
                Task::Record(n) => self.seen.push(n),
                Task::Outer => {
                    self.seen.push(0);
                    let _ = self.queue.next_tick(Task::Record(2));
                    let _ = self.queue.next_tick(Task::Stop);
                    self.seen.push(1);
                }
                Task::Stop => return ControlFlow::Break(()),
            }
            ControlFlow::Continue(())
        }

        fn on_dropped(&mut self, task: Task) {
            if let Task::Record(n) = task {
                self.dropped.push(n);
            }
        }
    }

    #[tokio::test]
    async fn test_exec_preserves_submission_order() {
        let (queue, receiver) = TaskQueue::channel();
        let handler = Recorder {
            queue: queue.clone(),
            seen: Vec::new(),
            dropped: Vec::new(),
        };

        for n in 0..10 {
            assert!(queue.exec(Task::Record(n)));
        }
        queue.exec(Task::Stop);

        let handler = run(receiver, handler).await;
        assert_eq!(handler.seen, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_next_tick_runs_after_current_task() {
        let (queue, receiver) = TaskQueue::channel();
        let handler = Recorder {
            queue: queue.clone(),
            seen: Vec::new(),
            dropped: Vec::new(),
        };

        queue.exec(Task::Outer);
        queue.exec(Task::Record(10));

        let handler = spawn(receiver, handler).await.unwrap();
        // Record(10) was already queued when Outer deferred Record(2).
        assert_eq!(handler.seen, vec![0, 1, 10, 2]);
    }

    #[tokio::test]
    async fn test_exec_after_stop_is_dropped() {
        let (queue, receiver) = TaskQueue::channel();
        let handler = Recorder {
            queue: queue.clone(),
            seen: Vec::new(),
            dropped: Vec::new(),
        };

        queue.exec(Task::Stop);
        queue.exec(Task::Record(7));
        let handler = run(receiver, handler).await;

        assert_eq!(handler.dropped, vec![7]);
        assert!(queue.is_closed());
        assert!(!queue.exec(Task::Record(1)));
        assert!(matches!(queue.try_exec(Task::Record(2)), Err(Task::Record(2))));
    }
}
