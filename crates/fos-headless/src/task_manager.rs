//! Async Task Manager
//!
//! Tracks a window's in-flight work (navigation fetches, script jobs) so
//! callers can wait for the window to settle, and so closing the window can
//! abort whatever is still running.

use std::cell::RefCell;
use std::collections::HashMap;

use fos_net::AbortController;
use smol::channel::{self, Sender};

/// Task ID type
pub type TaskId = u64;

#[derive(Debug, Default)]
struct TaskState {
    next_id: TaskId,
    running: HashMap<TaskId, Option<AbortController>>,
    waiters: Vec<Sender<()>>,
    destroyed: bool,
}

/// Per-window task tracker
#[derive(Debug, Default)]
pub struct AsyncTaskManager {
    state: RefCell<TaskState>,
}

impl AsyncTaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a task
    ///
    /// After `destroy` the returned ID is not tracked.
    pub fn start_task(&self) -> TaskId {
        self.register(None)
    }

    /// Register a task aborted by `destroy`
    pub fn start_task_with_abort(&self, controller: AbortController) -> TaskId {
        self.register(Some(controller))
    }

    fn register(&self, controller: Option<AbortController>) -> TaskId {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        let id = state.next_id;

        if state.destroyed {
            tracing::debug!("Task {} started on a destroyed task manager", id);
            if let Some(controller) = controller {
                controller.abort();
            }
            return id;
        }

        state.running.insert(id, controller);
        id
    }

    /// Mark a task finished; unknown IDs are ignored
    pub fn end_task(&self, id: TaskId) {
        let mut state = self.state.borrow_mut();
        if state.running.remove(&id).is_some() && state.running.is_empty() {
            // Dropping the senders wakes every waiter
            state.waiters.clear();
        }
    }

    /// Number of running tasks
    pub fn count(&self) -> usize {
        self.state.borrow().running.len()
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.borrow().destroyed
    }

    /// Resolves once no task is running
    pub async fn wait_until_complete(&self) {
        let receiver = {
            let mut state = self.state.borrow_mut();
            if state.running.is_empty() || state.destroyed {
                return;
            }
            let (sender, receiver) = channel::bounded::<()>(1);
            state.waiters.push(sender);
            receiver
        };
        let _ = receiver.recv().await;
    }

    /// Abort running tasks, wake waiters and refuse new work
    pub fn destroy(&self) {
        let (running, waiters) = {
            let mut state = self.state.borrow_mut();
            if state.destroyed {
                return;
            }
            state.destroyed = true;
            (std::mem::take(&mut state.running), std::mem::take(&mut state.waiters))
        };

        for controller in running.into_values().flatten() {
            controller.abort();
        }
        drop(waiters);
    }
}
