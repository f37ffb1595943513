//! Bounded ring transport for variable-length command records.
//!
//! The ring is a fixed-capacity byte region holding consecutively packed
//! records, each a fixed header (total record length plus an erased
//! execute-and-drop shim) followed by the command payload constructed in
//! place. Wrap-around is handled with an explicit wrap marker stored in the
//! length field when a record does not fit contiguously before the end of
//! the buffer.
//!
//! Cursors are wrapping byte offsets: `tail` (write) advances under the
//! enqueue mutex as producers commit records, `head` (read) advances only on
//! the consumer thread after a record has executed. The producer never
//! overwrites bytes the consumer has not passed; when contiguous space runs
//! out it blocks on `space` until the consumer frees some. Capacity is fixed
//! at construction and never grows.

use crate::command::Command;
use std::marker::PhantomData;
use std::mem;
use std::ptr;
use std::sync::{Condvar, Mutex, MutexGuard};

/// All records (and the ring capacity) are aligned to this many bytes.
///
/// Must stay a power of two, at least 4 so the wrap marker always fits in
/// the space remaining at the end of the buffer, and at least the alignment
/// of every command payload (checked per submission).
pub(crate) const RECORD_ALIGN: usize = 8;

/// Stored in the record length field to mean "skip to the buffer start".
pub(crate) const WRAP_MARKER: u32 = 0xFFFF_FFFF;

pub(crate) const fn align_up(value: usize, align: usize) -> usize {
    debug_assert!(align.is_power_of_two());
    (value + (align - 1)) & !(align - 1)
}

/// Executes the command payload at `payload` against `ctx`, drops it in
/// place, and returns the payload's size in bytes.
type ErasedExec<D> = unsafe fn(*mut u8, &mut D) -> usize;

unsafe fn exec_shim<D, C: Command<D>>(payload: *mut u8, ctx: &mut D) -> usize {
    let cmd = payload.cast::<C>();
    (*cmd).execute(ctx);
    ptr::drop_in_place(cmd);
    mem::size_of::<C>()
}

#[repr(C)]
struct RecordHeader<D> {
    /// Total record length in bytes (header + payload + tail padding), or
    /// [`WRAP_MARKER`].
    len: u32,
    _pad: u32,
    exec: ErasedExec<D>,
}

const fn payload_offset<D>() -> usize {
    align_up(mem::size_of::<RecordHeader<D>>(), RECORD_ALIGN)
}

const fn record_size<D, C>() -> usize {
    align_up(payload_offset::<D>() + mem::size_of::<C>(), RECORD_ALIGN)
}

/// Queue lifecycle: `Idle` before `init`, `Running` while the context thread
/// consumes, `Draining` once shutdown has been requested. No way back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Phase {
    Idle,
    Running,
    Draining,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum SubmitError {
    /// The queue is not in the `Running` phase; the command was dropped
    /// without executing.
    NotAccepting,
}

struct RingState {
    head: u32,
    tail: u32,
    phase: Phase,
}

/// A record popped by the consumer but not yet consumed.
///
/// Holds a raw pointer into ring storage; only valid on the consumer thread
/// and only until [`CommandRing::execute_record`] advances past it.
pub(crate) struct Popped<D> {
    exec: ErasedExec<D>,
    payload: *mut u8,
    len: u32,
}

pub(crate) struct CommandRing<D> {
    cap: u32,
    state: Mutex<RingState>,
    /// Signaled by the consumer whenever the read cursor advances.
    space: Condvar,
    /// Signaled on every commit and on the transition to draining.
    work: Condvar,

    data_ptr: *mut u8,
    _storage: Box<[u64]>,
    _ctx: PhantomData<fn(&mut D)>,
}

// Payloads are constrained `Send` at submission time; the raw storage
// pointer is shared between producers and the single consumer under the
// cursor discipline above.
unsafe impl<D> Send for CommandRing<D> {}
unsafe impl<D> Sync for CommandRing<D> {}

impl<D> CommandRing<D> {
    pub(crate) fn new(capacity_bytes: usize) -> Self {
        // Cursors are free-running u32 counters reduced with `% cap`, which
        // is only sound when the capacity divides the counter range.
        assert!(capacity_bytes.is_power_of_two());
        assert!(capacity_bytes >= RECORD_ALIGN);
        assert!(capacity_bytes < u32::MAX as usize);
        // `u64` storage keeps the base pointer `RECORD_ALIGN`-aligned.
        let mut storage = vec![0u64; capacity_bytes / mem::size_of::<u64>()].into_boxed_slice();
        let data_ptr = storage.as_mut_ptr().cast::<u8>();
        Self {
            cap: capacity_bytes as u32,
            state: Mutex::new(RingState {
                head: 0,
                tail: 0,
                phase: Phase::Idle,
            }),
            space: Condvar::new(),
            work: Condvar::new(),
            data_ptr,
            _storage: storage,
            _ctx: PhantomData,
        }
    }

    pub(crate) fn capacity_bytes(&self) -> usize {
        self.cap as usize
    }

    fn lock_state(&self) -> MutexGuard<'_, RingState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn wait_space<'a>(&self, guard: MutexGuard<'a, RingState>) -> MutexGuard<'a, RingState> {
        match self.space.wait(guard) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn wait_work<'a>(&self, guard: MutexGuard<'a, RingState>) -> MutexGuard<'a, RingState> {
        match self.work.wait(guard) {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// Idle → Running. Returns false if the queue has already left `Idle`.
    pub(crate) fn try_set_running(&self) -> bool {
        let mut state = self.lock_state();
        if state.phase != Phase::Idle {
            return false;
        }
        state.phase = Phase::Running;
        true
    }

    /// Stop accepting submissions and wake everyone: the consumer (so it can
    /// notice the drain request once the backlog is empty) and any producers
    /// blocked on backpressure (their submissions are refused).
    pub(crate) fn begin_drain(&self) {
        let mut state = self.lock_state();
        state.phase = Phase::Draining;
        self.work.notify_all();
        self.space.notify_all();
    }

    /// Serialize `cmd` into the ring. Blocks while the ring lacks space for
    /// the record; returns an error (dropping `cmd` unexecuted) if the queue
    /// is not accepting submissions.
    pub(crate) fn push<C: Command<D>>(&self, cmd: C) -> Result<(), SubmitError> {
        assert!(
            mem::align_of::<C>() <= RECORD_ALIGN,
            "command payload alignment exceeds RECORD_ALIGN"
        );
        let record_len = record_size::<D, C>();
        assert!(
            record_len <= self.cap as usize,
            "command record ({record_len} bytes) can never fit the ring transport"
        );

        let mut state = self.lock_state();
        loop {
            if state.phase != Phase::Running {
                return Err(SubmitError::NotAccepting);
            }

            // An empty ring restarts at offset 0. With the cursors parked
            // mid-buffer, a record near the full capacity could owe wrap
            // padding it can never afford (padding + record > capacity) and
            // block forever on space the consumer already freed; resetting
            // removes the padding so anything that passed the capacity
            // assert fits contiguously. `head == tail` also means no popped
            // record is outstanding, so both cursors are safe to move.
            if state.head == state.tail {
                state.head = 0;
                state.tail = 0;
            }

            let used = state.tail.wrapping_sub(state.head) as usize;
            let free = self.cap as usize - used;
            let tail_index = (state.tail % self.cap) as usize;
            let remaining = self.cap as usize - tail_index;

            // Records are never split across the wrap point. `remaining` is
            // always a multiple of RECORD_ALIGN, so the marker fits.
            let (padding, write_wrap_marker) = if remaining < record_len {
                (remaining, true)
            } else {
                (0, false)
            };

            let need = padding + record_len;
            if need > free {
                state = self.wait_space(state);
                continue;
            }

            let start_index = if padding == 0 { tail_index } else { 0 };
            unsafe {
                if write_wrap_marker {
                    ptr::write(self.data_ptr.add(tail_index).cast::<u32>(), WRAP_MARKER);
                }
                let header = self.data_ptr.add(start_index).cast::<RecordHeader<D>>();
                ptr::write(
                    header,
                    RecordHeader {
                        len: record_len as u32,
                        _pad: 0,
                        exec: exec_shim::<D, C>,
                    },
                );
                ptr::write(
                    self.data_ptr.add(start_index + payload_offset::<D>()).cast::<C>(),
                    cmd,
                );
            }

            // The record is only visible to the consumer once `tail` moves,
            // which happens under the same mutex: no torn reads.
            state.tail = state.tail.wrapping_add(need as u32);
            self.work.notify_one();
            return Ok(());
        }
    }

    /// Pop the next record, blocking while the ring is empty. Returns `None`
    /// once the queue is draining and the backlog is exhausted.
    pub(crate) fn pop_wait(&self) -> Option<Popped<D>> {
        let mut state = self.lock_state();
        loop {
            if state.head != state.tail {
                let head_index = (state.head % self.cap) as usize;
                let remaining = self.cap as usize - head_index;
                let len = unsafe { ptr::read(self.data_ptr.add(head_index).cast::<u32>()) };
                if len == WRAP_MARKER {
                    state.head = state.head.wrapping_add(remaining as u32);
                    self.space.notify_all();
                    continue;
                }
                debug_assert!(len as usize <= remaining);
                debug_assert!(len <= state.tail.wrapping_sub(state.head));
                let exec = unsafe { (*self.data_ptr.add(head_index).cast::<RecordHeader<D>>()).exec };
                let payload = unsafe { self.data_ptr.add(head_index + payload_offset::<D>()) };
                return Some(Popped { exec, payload, len });
            }
            if state.phase == Phase::Draining {
                return None;
            }
            state = self.wait_work(state);
        }
    }

    /// Execute a popped record on the calling thread and advance the read
    /// cursor past it. Must only be called by the single consumer.
    pub(crate) fn execute_record(&self, record: Popped<D>, ctx: &mut D) {
        // Producers cannot reclaim these bytes until `head` advances below,
        // so the payload is executed without holding the state mutex.
        let payload_bytes = unsafe { (record.exec)(record.payload, ctx) };
        debug_assert_eq!(
            align_up(payload_offset::<D>() + payload_bytes, RECORD_ALIGN),
            record.len as usize,
            "command reported a footprint that disagrees with its ring record"
        );

        let mut state = self.lock_state();
        state.head = state.head.wrapping_add(record.len);
        self.space.notify_all();
    }
}
