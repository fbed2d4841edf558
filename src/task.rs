//! Task-execution context capability.
//!
//! The scheduling engine owns the task lifecycle; sessions consume it
//! through this handle: query completion and interruption, register
//! completion hooks, and, for barrier-scheduled tasks, reach the
//! rendezvous primitive.
//!
//! Barrier capability is an explicit optional value supplied at
//! construction, present or absent, rather than a runtime type test.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::Notify;

/// Distributed rendezvous primitive.
///
/// All cooperating tasks of a group must arrive before any proceeds.
#[async_trait]
pub trait BarrierCoordinator: Send + Sync {
    /// Block until every participant arrives.
    ///
    /// The wait is deliberately unbounded; a rendezvous may legitimately
    /// take long to satisfy. Failures carry the message that is reported
    /// back to the worker.
    async fn wait(&self) -> std::result::Result<(), String>;
}

type CompletionHook = Box<dyn FnOnce() + Send>;

/// Handle onto one task's lifecycle, shared by every session unit.
pub struct TaskContext {
    completed: AtomicBool,
    interrupted: AtomicBool,
    changed: Notify,
    hooks: Mutex<Vec<CompletionHook>>,
    barrier: Option<Arc<dyn BarrierCoordinator>>,
}

impl TaskContext {
    /// Create a context for a regular (non-barrier) task.
    pub fn new() -> Self {
        Self {
            completed: AtomicBool::new(false),
            interrupted: AtomicBool::new(false),
            changed: Notify::new(),
            hooks: Mutex::new(Vec::new()),
            barrier: None,
        }
    }

    /// Create a context for a barrier-scheduled task.
    pub fn with_barrier(barrier: Arc<dyn BarrierCoordinator>) -> Self {
        Self {
            barrier: Some(barrier),
            ..Self::new()
        }
    }

    /// Whether the task has finished (successfully or not).
    #[inline]
    pub fn is_completed(&self) -> bool {
        self.completed.load(Ordering::Acquire)
    }

    /// Whether the task was asked to stop.
    #[inline]
    pub fn is_interrupted(&self) -> bool {
        self.interrupted.load(Ordering::Acquire)
    }

    /// Whether this task can participate in a barrier rendezvous.
    #[inline]
    pub fn is_barrier_capable(&self) -> bool {
        self.barrier.is_some()
    }

    /// The task's rendezvous primitive, if barrier-capable.
    pub fn barrier(&self) -> Option<Arc<dyn BarrierCoordinator>> {
        self.barrier.clone()
    }

    /// Register a hook to run once when the task completes.
    ///
    /// If the task has already completed, the hook runs immediately on
    /// the calling thread.
    pub fn on_complete(&self, hook: impl FnOnce() + Send + 'static) {
        if self.is_completed() {
            hook();
            return;
        }
        if let Ok(mut hooks) = self.hooks.lock() {
            // Completion may have drained the hooks between the check
            // above and taking the lock.
            if self.is_completed() {
                drop(hooks);
                hook();
                return;
            }
            hooks.push(Box::new(hook));
        }
    }

    /// Mark the task interrupted and wake any waiting session units.
    pub fn mark_interrupted(&self) {
        self.interrupted.store(true, Ordering::Release);
        self.changed.notify_waiters();
    }

    /// Mark the task completed, wake waiters and run completion hooks.
    ///
    /// Hooks run at most once even if called repeatedly.
    pub fn mark_completed(&self) {
        if self.completed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.changed.notify_waiters();
        let hooks = match self.hooks.lock() {
            Ok(mut guard) => std::mem::take(&mut *guard),
            Err(_) => Vec::new(),
        };
        for hook in hooks {
            hook();
        }
    }

    /// Wait until the task completes.
    pub async fn completed(&self) {
        loop {
            if self.is_completed() {
                return;
            }
            let notified = self.changed.notified();
            if self.is_completed() {
                return;
            }
            notified.await;
        }
    }

    /// Wait until the task is interrupted.
    pub async fn interrupted(&self) {
        loop {
            if self.is_interrupted() {
                return;
            }
            let notified = self.changed.notified();
            if self.is_interrupted() {
                return;
            }
            notified.await;
        }
    }
}

impl Default for TaskContext {
    fn default() -> Self {
        Self::new()
    }
}
