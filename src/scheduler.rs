//! Cancellable deferred tasks.
//!
//! Every timer the engine starts is represented by a [`DeferredTask`]
//! handle. Dropping or cancelling the handle guarantees the task will not
//! run, which is how popups scheduled on one page are kept from appearing
//! on the next.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use gloo_timers::callback::Timeout;

/// Handle to a scheduled task. Cancels on drop.
pub struct DeferredTask {
    cancel: Option<Box<dyn FnOnce()>>,
}

impl DeferredTask {
    pub fn new(cancel: impl FnOnce() + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for DeferredTask {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl std::fmt::Debug for DeferredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredTask")
            .field("armed", &self.cancel.is_some())
            .finish()
    }
}

/// Runs a task after a delay and hands back a cancellation handle.
pub trait TaskScheduler {
    fn defer(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> DeferredTask;
}

/// Browser timers via `setTimeout`.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrowserScheduler;

impl TaskScheduler for BrowserScheduler {
    fn defer(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> DeferredTask {
        let pending = PendingTask::new(task);
        let fire = pending.clone();

        // The callback is handed to JS; the task may drop its own handle
        // while running, so the closure must not be owned by the handle.
        let id = Timeout::new(delay_ms, move || fire.run()).forget();

        DeferredTask::new(move || {
            pending.discard();
            if let (Some(window), Some(handle)) = (web_sys::window(), id.as_f64()) {
                window.clear_timeout_with_handle(handle as i32);
            }
        })
    }
}

/// Task slot shared by a JS timer callback and its cancellation handle.
#[derive(Clone)]
struct PendingTask(Rc<Cell<Option<Box<dyn FnOnce()>>>>);

impl PendingTask {
    fn new(task: Box<dyn FnOnce()>) -> Self {
        Self(Rc::new(Cell::new(Some(task))))
    }

    fn run(&self) {
        if let Some(task) = self.0.take() {
            task();
        }
    }

    /// Drop the task without running it.
    fn discard(&self) {
        drop(self.0.take());
    }
}

type TaskSlot = (u64, u64);

#[derive(Default)]
struct ManualState {
    now_ms: u64,
    next_id: u64,
    tasks: BTreeMap<TaskSlot, Box<dyn FnOnce()>>,
}

/// Scheduler driven by an explicit clock.
///
/// Used where no event loop exists (server rendering) and in tests.
#[derive(Clone, Default)]
pub struct ManualScheduler {
    state: Rc<RefCell<ManualState>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now_ms(&self) -> u64 {
        self.state.borrow().now_ms
    }

    pub fn pending(&self) -> usize {
        self.state.borrow().tasks.len()
    }

    /// Move the clock forward, running due tasks in order. Returns how many ran.
    pub fn advance(&self, ms: u64) -> usize {
        let target = self.state.borrow().now_ms + ms;
        let mut ran = 0;
        loop {
            let next = {
                let mut state = self.state.borrow_mut();
                let due = state
                    .tasks
                    .keys()
                    .next()
                    .copied()
                    .filter(|(due, _)| *due <= target);
                due.and_then(|slot| {
                    state.now_ms = slot.0;
                    state.tasks.remove(&slot)
                })
            };
            match next {
                Some(task) => {
                    task();
                    ran += 1;
                }
                None => break,
            }
        }
        self.state.borrow_mut().now_ms = target;
        ran
    }
}

impl TaskScheduler for ManualScheduler {
    fn defer(&self, delay_ms: u32, task: Box<dyn FnOnce()>) -> DeferredTask {
        let slot = {
            let mut state = self.state.borrow_mut();
            let slot = (state.now_ms + delay_ms as u64, state.next_id);
            state.next_id += 1;
            state.tasks.insert(slot, task);
            slot
        };
        let weak: Weak<RefCell<ManualState>> = Rc::downgrade(&self.state);
        DeferredTask::new(move || {
            if let Some(state) = weak.upgrade() {
                state.borrow_mut().tasks.remove(&slot);
            }
        })
    }
}
