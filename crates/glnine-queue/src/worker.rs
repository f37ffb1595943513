//! The context thread: the single consumer that owns the driver context.

use crate::queue::QueueError;
use crate::ring::CommandRing;
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

/// Binding between a driver context and the one thread allowed to use it.
///
/// The context value is moved into the context thread at queue
/// initialization and never leaves it: `bind` runs there before the first
/// command, `release` runs there after the backlog has drained. Thread
/// affinity is enforced by ownership transfer, not by runtime checks.
pub trait BindContext: Send + 'static {
    type BindError: std::error::Error;

    /// Make the context current on the calling thread.
    fn bind(&mut self) -> Result<(), Self::BindError>;

    /// Undo [`bind`](Self::bind); called on the same thread during drain.
    fn release(&mut self);
}

/// Spawn the context thread and wait for it to report the bind outcome.
///
/// A bind failure is returned to the caller (and the thread exits without
/// consuming anything); the owning device must treat this as fatal.
pub(crate) fn spawn<D: BindContext>(
    ring: Arc<CommandRing<D>>,
    mut ctx: D,
) -> Result<JoinHandle<()>, QueueError> {
    let (ready_tx, ready_rx) = mpsc::channel::<Result<(), String>>();
    let handle = thread::Builder::new()
        .name("glnine-context".into())
        .spawn(move || {
            if let Err(err) = ctx.bind() {
                tracing::error!(%err, "driver context bind failed");
                let _ = ready_tx.send(Err(err.to_string()));
                return;
            }
            let _ = ready_tx.send(Ok(()));
            run(&ring, &mut ctx);
            ctx.release();
        })?;

    match ready_rx.recv() {
        Ok(Ok(())) => Ok(handle),
        Ok(Err(message)) => {
            let _ = handle.join();
            Err(QueueError::ContextBind(message))
        }
        Err(_) => {
            let _ = handle.join();
            Err(QueueError::ContextBind(
                "context thread exited before reporting bind status".into(),
            ))
        }
    }
}

fn run<D: BindContext>(ring: &CommandRing<D>, ctx: &mut D) {
    tracing::debug!("context thread running");
    let mut executed: u64 = 0;
    // Strict FIFO: one record at a time, in commit order. A command whose
    // driver-level operation fails reports that through its own output
    // state; the loop itself only ends on drain.
    while let Some(record) = ring.pop_wait() {
        ring.execute_record(record, ctx);
        executed += 1;
    }
    tracing::debug!(executed, "context thread drained");
}
