//! The public queue facade: lifecycle, submission and the queue lock.

use crate::command::Command;
use crate::ring::{CommandRing, SubmitError};
use crate::sync::{SyncCommand, SyncPoint};
use crate::worker::{self, BindContext};
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::thread::JoinHandle;
use thiserror::Error;

/// Default ring transport capacity in bytes.
///
/// Commands are small (tens of bytes); 64 KiB gives producers thousands of
/// in-flight submissions before backpressure kicks in.
pub const DEFAULT_CAPACITY: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum QueueError {
    /// `init` was called on a queue that already left the uninitialized
    /// state (including one whose earlier `init` failed).
    #[error("queue is already initialized")]
    AlreadyInitialized,
    #[error("failed to spawn context thread: {0}")]
    Spawn(#[from] io::Error),
    #[error("failed to bind driver context: {0}")]
    ContextBind(String),
}

/// Cross-thread command queue: any number of producer threads, one context
/// thread owning the driver context `D`.
///
/// Lifecycle is `Uninitialized → Running → Draining → Stopped`, driven by
/// [`init`](Self::init) and [`deinit`](Self::deinit); there is no way back
/// to `Running`. Dropping the queue deinitializes it, so every submitted
/// command (resource teardown included) executes before the context is
/// released.
pub struct CommandQueue<D: BindContext> {
    ring: Arc<CommandRing<D>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    lock: LockState,
}

/// The queue lock proper: a dedicated mutual-exclusion token, deliberately
/// separate from the ring's internal enqueue mutex.
struct LockState {
    held: Mutex<bool>,
    released: Condvar,
}

impl<D: BindContext> CommandQueue<D> {
    /// Create an uninitialized queue with a fixed transport capacity.
    ///
    /// `capacity_bytes` must be a power of two (at least 8 bytes); it never
    /// grows after construction.
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            ring: Arc::new(CommandRing::new(capacity_bytes)),
            worker: Mutex::new(None),
            lock: LockState {
                held: Mutex::new(false),
                released: Condvar::new(),
            },
        }
    }

    /// Fixed transport capacity in bytes.
    pub fn capacity_bytes(&self) -> usize {
        self.ring.capacity_bytes()
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.worker.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Bind `ctx` to a newly spawned context thread and start the consume
    /// loop.
    ///
    /// On failure (thread spawn or context bind) the queue is left
    /// permanently stopped; the owning device's construction must fail.
    pub fn init(&self, ctx: D) -> Result<(), QueueError> {
        let mut worker = self.lock_worker();
        if !self.ring.try_set_running() {
            return Err(QueueError::AlreadyInitialized);
        }
        match worker::spawn(Arc::clone(&self.ring), ctx) {
            Ok(handle) => {
                *worker = Some(handle);
                Ok(())
            }
            Err(err) => {
                self.ring.begin_drain();
                Err(err)
            }
        }
    }

    /// Stop accepting new submissions, wait for the context thread to drain
    /// every previously submitted command, then join it.
    ///
    /// No command is ever discarded: drain is unconditional, so teardown
    /// commands already in the transport always reach the driver. Idempotent
    /// and a no-op on a never-initialized queue.
    pub fn deinit(&self) {
        self.ring.begin_drain();
        let handle = self.lock_worker().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                tracing::error!("context thread panicked during drain");
            }
        }
    }

    /// Submit `cmd` and return immediately; does not require the queue lock.
    ///
    /// Blocks only when the transport is out of space (backpressure). A
    /// submission after `deinit` began is a late-use error: logged and
    /// dropped, never executed.
    pub fn send<C: Command<D>>(&self, cmd: C) {
        if !self.try_send(cmd) {
            tracing::warn!("command dropped: queue is not accepting submissions");
        }
    }

    /// Like [`send`](Self::send), but reports whether the submission was
    /// accepted instead of logging. Callers that hand driver resources to a
    /// command (a teardown, say) use this to attribute the loss when the
    /// queue is already draining.
    pub fn try_send<C: Command<D>>(&self, cmd: C) -> bool {
        self.ring.push(cmd).is_ok()
    }

    /// Submit `cmd` and block until that exact submission has executed on
    /// the context thread.
    ///
    /// FIFO delivery means every earlier submission (from any producer) has
    /// also executed by the time this returns, and any output fields the
    /// command wrote are visible to the caller. If the queue is no longer
    /// accepting work the call returns immediately and the command never
    /// runs; callers observe their output slot untouched.
    pub fn send_sync<C: Command<D>>(&self, cmd: C) {
        let point = SyncPoint::new();
        let wrapped = SyncCommand {
            inner: cmd,
            point: Arc::clone(&point),
        };
        match self.ring.push(wrapped) {
            Ok(()) => point.wait(),
            Err(SubmitError::NotAccepting) => {
                tracing::warn!("synchronous command dropped: queue is not accepting submissions");
            }
        }
    }

    /// Acquire the queue lock.
    ///
    /// The lock exists so a producer can perform "write shadow state, then
    /// submit the matching command" as one step no other producer's
    /// submission can land inside; its acquire/release also provides the
    /// cross-thread memory ordering for those shadow writes. It is **not
    /// reentrant**: a second `lock()` from the same thread deadlocks, by
    /// design, to keep critical sections small and auditable.
    ///
    /// The guard releases the lock on drop; use
    /// [`send_and_unlock`](QueueLock::send_and_unlock) to couple the final
    /// submission with the release.
    pub fn lock(&self) -> QueueLock<'_, D> {
        let mut held = self.lock_held();
        while *held {
            held = match self.lock.released.wait(held) {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
        }
        *held = true;
        QueueLock { queue: self }
    }

    fn lock_held(&self) -> MutexGuard<'_, bool> {
        match self.lock.held.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl<D: BindContext> Drop for CommandQueue<D> {
    fn drop(&mut self) {
        self.deinit();
    }
}

/// Held queue lock. Dropping it unlocks.
#[must_use = "dropping the guard immediately releases the queue lock"]
pub struct QueueLock<'a, D: BindContext> {
    queue: &'a CommandQueue<D>,
}

impl<D: BindContext> QueueLock<'_, D> {
    /// Submit `cmd` and then release the queue lock, as one visible step to
    /// other producers.
    pub fn send_and_unlock<C: Command<D>>(self, cmd: C) {
        self.queue.send(cmd);
        // Drop releases the lock after the submission has been committed.
    }

    /// Release the queue lock without submitting anything.
    pub fn unlock(self) {}
}

impl<D: BindContext> Drop for QueueLock<'_, D> {
    fn drop(&mut self) {
        let mut held = self.queue.lock_held();
        *held = false;
        self.queue.lock.released.notify_one();
    }
}
