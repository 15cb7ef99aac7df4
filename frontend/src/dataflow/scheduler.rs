//! Single-threaded event loop
//!
//! All viewer state lives on one thread. Work that must not run re-entrantly
//! (callbacks registered on an already-resolved [`Deferred`](super::Deferred))
//! is queued on the [`Scheduler`] and executes on a later turn, when the owner
//! of the [`EventLoop`] drives it with [`EventLoop::run_until_idle`].

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;
use std::cell::RefCell;
use std::future::Future;

/// Owner of the viewer's task queue.
///
/// Nothing queued through a [`Scheduler`] runs until the loop is driven, which
/// gives every `schedule_deferred` call "next turn" semantics.
pub struct EventLoop {
    pool: RefCell<LocalPool>,
    scheduler: Scheduler,
}

impl EventLoop {
    pub fn new() -> Self {
        let pool = LocalPool::new();
        let scheduler = Scheduler {
            spawner: pool.spawner(),
        };
        Self {
            pool: RefCell::new(pool),
            scheduler,
        }
    }

    /// Handle for queueing work on this loop.
    pub fn scheduler(&self) -> Scheduler {
        self.scheduler.clone()
    }

    /// Run queued tasks until none can make progress, including tasks queued
    /// while running.
    ///
    /// Must not be called from inside a task of the same loop.
    pub fn run_until_idle(&self) {
        match self.pool.try_borrow_mut() {
            Ok(mut pool) => pool.run_until_stalled(),
            Err(_) => log::error!("EventLoop::run_until_idle called re-entrantly; ignoring"),
        }
    }
}

impl Default for EventLoop {
    fn default() -> Self {
        Self::new()
    }
}

/// Cloneable handle that queues work on an [`EventLoop`].
#[derive(Clone)]
pub struct Scheduler {
    spawner: LocalSpawner,
}

impl Scheduler {
    /// Queue `task` to run on a later turn of the event loop.
    pub fn schedule_deferred(&self, task: impl FnOnce() + 'static) {
        self.spawn_local(async move { task() });
    }

    /// Queue a local future. It is polled whenever the loop is driven.
    pub fn spawn_local(&self, future: impl Future<Output = ()> + 'static) {
        if let Err(error) = self.spawner.spawn_local(future) {
            // Only happens once the loop itself is gone
            log::error!("Failed to schedule task: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn test_deferred_task_waits_for_next_turn() {
        let event_loop = EventLoop::new();
        let ran = Rc::new(RefCell::new(Vec::new()));

        let log = ran.clone();
        event_loop
            .scheduler()
            .schedule_deferred(move || log.borrow_mut().push("first"));
        assert!(ran.borrow().is_empty());

        event_loop.run_until_idle();
        assert_eq!(*ran.borrow(), vec!["first"]);
    }

    #[test]
    fn test_tasks_queued_while_running_also_run() {
        let event_loop = EventLoop::new();
        let scheduler = event_loop.scheduler();
        let ran = Rc::new(RefCell::new(Vec::new()));

        let log = ran.clone();
        let inner_scheduler = scheduler.clone();
        scheduler.schedule_deferred(move || {
            log.borrow_mut().push(1);
            let log = log.clone();
            inner_scheduler.schedule_deferred(move || log.borrow_mut().push(2));
        });

        event_loop.run_until_idle();
        assert_eq!(*ran.borrow(), vec![1, 2]);
    }
}
