//! End-to-end semantics of the cross-thread command queue: FIFO delivery,
//! synchronous submission, the queue-lock bundling discipline, backpressure
//! accounting and drain completeness.

use glnine_queue::{BindContext, Command, CommandQueue, QueueError, DEFAULT_CAPACITY};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug)]
struct BindRefused;

impl fmt::Display for BindRefused {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("driver refused to bind the context")
    }
}

impl std::error::Error for BindRefused {}

/// Stand-in for a thread-affine driver context.
#[derive(Default)]
struct TestCtx {
    fail_bind: bool,
    bound: Arc<AtomicBool>,
    released: Arc<AtomicBool>,
}

impl BindContext for TestCtx {
    type BindError = BindRefused;

    fn bind(&mut self) -> Result<(), BindRefused> {
        if self.fail_bind {
            return Err(BindRefused);
        }
        self.bound.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

struct Record {
    id: u32,
    log: Arc<Mutex<Vec<u32>>>,
}

impl Command<TestCtx> for Record {
    fn execute(&mut self, _ctx: &mut TestCtx) {
        self.log.lock().unwrap().push(self.id);
    }
}

struct AddOne {
    counter: Arc<AtomicU32>,
}

impl Command<TestCtx> for AddOne {
    fn execute(&mut self, _ctx: &mut TestCtx) {
        self.counter.fetch_add(1, Ordering::SeqCst);
    }
}

/// Computes a "driver-side" value the producer needs back, the way a shader
/// compilation returns a program handle.
struct SetOutput {
    value: u32,
    slot: Arc<AtomicU32>,
}

impl Command<TestCtx> for SetOutput {
    fn execute(&mut self, _ctx: &mut TestCtx) {
        self.slot.store(self.value, Ordering::SeqCst);
    }
}

/// Applies a shadowed state value on the context thread.
struct ShadowApply {
    value: u32,
    applied: Arc<AtomicU32>,
    history: Arc<Mutex<Vec<u32>>>,
}

impl Command<TestCtx> for ShadowApply {
    fn execute(&mut self, _ctx: &mut TestCtx) {
        self.applied.store(self.value, Ordering::SeqCst);
        self.history.lock().unwrap().push(self.value);
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn running_queue() -> CommandQueue<TestCtx> {
    init_logging();
    let queue = CommandQueue::new(DEFAULT_CAPACITY);
    queue.init(TestCtx::default()).expect("init");
    queue
}

#[test]
fn init_failure_is_fatal_and_queue_stays_dead() {
    init_logging();
    let queue: CommandQueue<TestCtx> = CommandQueue::new(DEFAULT_CAPACITY);
    let err = queue
        .init(TestCtx {
            fail_bind: true,
            ..TestCtx::default()
        })
        .unwrap_err();
    assert!(matches!(err, QueueError::ContextBind(_)), "{err}");

    // A failed init leaves the queue permanently stopped: re-init is
    // refused and late submissions are dropped, not executed.
    let err = queue.init(TestCtx::default()).unwrap_err();
    assert!(matches!(err, QueueError::AlreadyInitialized));

    let counter = Arc::new(AtomicU32::new(0));
    queue.send(AddOne {
        counter: Arc::clone(&counter),
    });
    queue.deinit();
    assert_eq!(counter.load(Ordering::SeqCst), 0);
}

#[test]
fn double_init_is_refused() {
    let queue = running_queue();
    let err = queue.init(TestCtx::default()).unwrap_err();
    assert!(matches!(err, QueueError::AlreadyInitialized));
    queue.deinit();
}

#[test]
fn fifo_single_producer() {
    let queue = running_queue();
    let log = Arc::new(Mutex::new(Vec::new()));
    for id in 0..1000 {
        queue.send(Record {
            id,
            log: Arc::clone(&log),
        });
    }
    queue.deinit();

    let executed = log.lock().unwrap();
    assert_eq!(*executed, (0..1000).collect::<Vec<_>>());
}

#[test]
fn fifo_per_producer_order_and_total_count() {
    let queue = Arc::new(running_queue());
    let log = Arc::new(Mutex::new(Vec::new()));

    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 2000;

    let mut handles = Vec::new();
    for pid in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        let log = Arc::clone(&log);
        handles.push(thread::spawn(move || {
            for seq in 0..PER_PRODUCER {
                queue.send(Record {
                    id: (pid << 16) | seq,
                    log: Arc::clone(&log),
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    queue.deinit();

    let executed = log.lock().unwrap();
    assert_eq!(executed.len() as u32, PRODUCERS * PER_PRODUCER);

    // The global order interleaves arbitrarily, but each producer's own
    // submissions execute in its submission order.
    let mut next_seq = [0u32; PRODUCERS as usize];
    for id in executed.iter() {
        let pid = (id >> 16) as usize;
        let seq = id & 0xFFFF;
        assert_eq!(seq, next_seq[pid], "producer {pid} ran out of order");
        next_seq[pid] += 1;
    }
}

#[test]
fn send_sync_waits_for_that_exact_command() {
    let queue = running_queue();
    let counter = Arc::new(AtomicU32::new(0));
    let slot = Arc::new(AtomicU32::new(0));

    for _ in 0..100 {
        queue.send(AddOne {
            counter: Arc::clone(&counter),
        });
    }
    queue.send_sync(SetOutput {
        value: 42,
        slot: Arc::clone(&slot),
    });

    // The synchronous command has executed, and FIFO means everything
    // submitted before it has too.
    assert_eq!(slot.load(Ordering::SeqCst), 42);
    assert_eq!(counter.load(Ordering::SeqCst), 100);
    queue.deinit();
}

#[test]
fn send_sync_after_deinit_returns_untouched_slot() {
    let queue = running_queue();
    queue.deinit();

    let slot = Arc::new(AtomicU32::new(0));
    queue.send_sync(SetOutput {
        value: 42,
        slot: Arc::clone(&slot),
    });
    assert_eq!(slot.load(Ordering::SeqCst), 0, "command must not have run");
}

#[test]
fn lock_bundles_shadow_write_with_submission() {
    let queue = Arc::new(running_queue());
    let shadow = Arc::new(AtomicU32::new(0));
    let applied = Arc::new(AtomicU32::new(0));
    let history = Arc::new(Mutex::new(Vec::new()));
    let committed = Arc::new(Mutex::new(Vec::new()));

    const PRODUCERS: u32 = 2;
    const ROUNDS: u32 = 1000;

    let mut handles = Vec::new();
    for pid in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        let shadow = Arc::clone(&shadow);
        let applied = Arc::clone(&applied);
        let history = Arc::clone(&history);
        let committed = Arc::clone(&committed);
        handles.push(thread::spawn(move || {
            for seq in 0..ROUNDS {
                let value = (pid << 16) | (seq + 1);
                let guard = queue.lock();
                shadow.store(value, Ordering::Relaxed);
                committed.lock().unwrap().push(value);
                guard.send_and_unlock(ShadowApply {
                    value,
                    applied: Arc::clone(&applied),
                    history: Arc::clone(&history),
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    queue.deinit();

    // Every (shadow write, submission) pair was atomic with respect to the
    // other producer, so the context thread applied values in exactly the
    // order the shadow saw them, and the final shadow value matches the
    // last applied command.
    let history = history.lock().unwrap();
    let committed = committed.lock().unwrap();
    assert_eq!(*history, *committed);
    assert_eq!(
        shadow.load(Ordering::Relaxed),
        applied.load(Ordering::SeqCst)
    );
}

#[test]
fn explicit_unlock_releases_for_other_producers() {
    let queue = Arc::new(running_queue());

    let guard = queue.lock();
    let contender = {
        let queue = Arc::clone(&queue);
        thread::spawn(move || {
            // Blocks until the main thread unlocks.
            queue.lock().unlock();
        })
    };
    thread::sleep(Duration::from_millis(20));
    guard.unlock();
    contender.join().unwrap();
    queue.deinit();
}

#[test]
fn backpressure_blocks_but_never_drops() {
    // A deliberately tiny transport so producers constantly outrun it.
    init_logging();
    let queue = Arc::new({
        let queue = CommandQueue::new(512);
        queue.init(TestCtx::default()).expect("init");
        queue
    });
    let counter = Arc::new(AtomicU32::new(0));

    const PRODUCERS: u32 = 4;
    const PER_PRODUCER: u32 = 5000;

    let mut handles = Vec::new();
    for _ in 0..PRODUCERS {
        let queue = Arc::clone(&queue);
        let counter = Arc::clone(&counter);
        handles.push(thread::spawn(move || {
            for _ in 0..PER_PRODUCER {
                queue.send(AddOne {
                    counter: Arc::clone(&counter),
                });
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }
    queue.deinit();

    assert_eq!(counter.load(Ordering::SeqCst), PRODUCERS * PER_PRODUCER);
}

#[test]
fn deinit_drains_every_pending_command() {
    init_logging();
    let bound = Arc::new(AtomicBool::new(false));
    let released = Arc::new(AtomicBool::new(false));
    let queue = CommandQueue::new(DEFAULT_CAPACITY);
    queue
        .init(TestCtx {
            fail_bind: false,
            bound: Arc::clone(&bound),
            released: Arc::clone(&released),
        })
        .expect("init");
    assert!(bound.load(Ordering::SeqCst));

    let counter = Arc::new(AtomicU32::new(0));
    const TEARDOWNS: u32 = 500;
    for _ in 0..TEARDOWNS {
        queue.send(AddOne {
            counter: Arc::clone(&counter),
        });
    }
    queue.deinit();

    // All pending commands executed before the context was released.
    assert_eq!(counter.load(Ordering::SeqCst), TEARDOWNS);
    assert!(released.load(Ordering::SeqCst));

    // Idempotent: a second deinit (and late submissions) are no-ops.
    queue.deinit();
    queue.send(AddOne {
        counter: Arc::clone(&counter),
    });
    assert_eq!(counter.load(Ordering::SeqCst), TEARDOWNS);
}

#[test]
fn deinit_on_uninitialized_queue_is_a_noop() {
    init_logging();
    let queue: CommandQueue<TestCtx> = CommandQueue::new(DEFAULT_CAPACITY);
    queue.deinit();
    queue.deinit();
}
