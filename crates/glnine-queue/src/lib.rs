//! Cross-thread command queue for a thread-affine driver context.
//!
//! Legacy 3D APIs allow calls from any application thread, but the driver
//! context that does the real work may only be touched by the thread that
//! owns it. This crate bridges that mismatch:
//!
//! - Producer threads serialize [`Command`] values into a fixed-capacity
//!   ring transport and return immediately (or block until their specific
//!   command has executed, see [`CommandQueue::send_sync`]).
//! - One dedicated context thread owns the driver context, drains the ring
//!   in strict submission order and executes each command against it.
//!
//! The queue knows nothing about graphics. It is generic over the context
//! type `D`; collaborators provide a [`BindContext`] implementation that
//! makes the context current on the consumer thread, plus [`Command`] types
//! that capture their arguments by value and issue the driver calls.
//!
//! Ordering guarantees: a single consumer thread means execution order is
//! exactly the order in which submissions were committed to the ring,
//! regardless of which producer committed them. The queue lock
//! ([`CommandQueue::lock`]) lets a producer pair a shadow-state write with
//! the matching submission as one atomic step relative to other producers.

mod command;
mod queue;
mod ring;
mod sync;
mod worker;

pub use command::Command;
pub use queue::{CommandQueue, QueueError, QueueLock, DEFAULT_CAPACITY};
pub use worker::BindContext;
