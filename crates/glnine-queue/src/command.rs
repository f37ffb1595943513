//! The unit of deferred driver work.

/// One self-contained, deferred driver operation.
///
/// A command is constructed on a producer thread, copied by value into the
/// ring transport, and executed later on the context thread. Implementations
/// must therefore capture everything they need by value (scalars, small
/// arrays, `Arc`s to shared output slots) and never borrow producer-thread
/// memory: by the time `execute` runs, the submitting stack frame may be
/// long gone.
///
/// Contract:
///
/// - `execute` is called exactly once, only on the context thread that owns
///   `D`.
/// - Driver-level failures (a program that fails to link, say) are handled
///   inside `execute`: log them and report them through whatever output
///   field a [`send_sync`](crate::CommandQueue::send_sync) caller inspects
///   afterwards. `execute` must not panic; the context thread does not
///   survive an unwinding command.
/// - Cleanup of resources a command owns happens inside `execute`. The ring
///   slot is reclaimed (and the payload dropped in place) the moment the
///   consumer's cursor passes it; there is no later destruction pass with
///   driver access.
pub trait Command<D>: Send + 'static {
    fn execute(&mut self, ctx: &mut D);
}
