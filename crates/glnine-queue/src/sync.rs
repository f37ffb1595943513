//! Per-submission completion signalling.

use crate::command::Command;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};

/// One-shot completion flag shared between a submitting producer (which
/// waits) and the context thread (which signals once the associated command
/// has executed).
pub(crate) struct SyncPoint {
    done: Mutex<bool>,
    signaled: Condvar,
}

impl SyncPoint {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self {
            done: Mutex::new(false),
            signaled: Condvar::new(),
        })
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        match self.done.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    pub(crate) fn signal(&self) {
        *self.lock() = true;
        self.signaled.notify_all();
    }

    pub(crate) fn wait(&self) {
        let mut done = self.lock();
        while !*done {
            done = match self.signaled.wait(done) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
    }
}

/// Wraps a command so its completion is observable.
///
/// The ring drops the payload in place right after `execute` returns, so
/// signalling from `Drop` covers both outcomes with one code path: a
/// successful execution signals after the command's effects are in place,
/// and a submission refused during drain signals as the unexecuted command
/// is discarded (the waiter then sees its output slot untouched).
pub(crate) struct SyncCommand<C> {
    pub(crate) inner: C,
    pub(crate) point: Arc<SyncPoint>,
}

impl<D, C: Command<D>> Command<D> for SyncCommand<C> {
    fn execute(&mut self, ctx: &mut D) {
        self.inner.execute(ctx);
    }
}

impl<C> Drop for SyncCommand<C> {
    fn drop(&mut self) {
        self.point.signal();
    }
}
