use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::error::QueueError;
use crate::param::Param;

/// Which synchronization discipline guards the ring buffer and each node's
/// `current` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueMode {
    /// One mutex guards the ring indices and the entry slab.
    Mutex,
    /// Atomic indices plus a per-slot ready flag; producers may reserve
    /// slots out of order.
    LockFree,
}

struct Entry {
    name: &'static str,
    param: Param,
}

/// A bounded single-consumer multi-producer ring buffer of capacity
/// `size + 1`. Grounded on `vivid_queue.c`.
pub(crate) enum Queue {
    Mutex(MutexQueue),
    LockFree(LockFreeQueue),
}

impl Queue {
    pub(crate) fn new(mode: QueueMode, size: usize) -> Self {
        match mode {
            QueueMode::Mutex => Queue::Mutex(MutexQueue::new(size)),
            QueueMode::LockFree => Queue::LockFree(LockFreeQueue::new(size)),
        }
    }

    pub(crate) fn push(&self, name: &'static str, param: Param) -> Result<(), QueueError> {
        match self {
            Queue::Mutex(q) => q.push(name, param),
            Queue::LockFree(q) => q.push(name, param),
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        match self {
            Queue::Mutex(q) => q.is_empty(),
            Queue::LockFree(q) => q.is_empty(),
        }
    }

    /// Borrow the front entry without removing it. `None` iff empty.
    pub(crate) fn with_front<R>(&self, f: impl FnOnce(Option<(&'static str, &Param)>) -> R) -> R {
        match self {
            Queue::Mutex(q) => q.with_front(f),
            Queue::LockFree(q) => q.with_front(f),
        }
    }

    /// Remove and drop the front entry (dropping `Param::Boxed` runs its
    /// destructor, the idiomatic replacement for the source's explicit
    /// `param_destructor` callback).
    pub(crate) fn pop(&self) {
        match self {
            Queue::Mutex(q) => q.pop(),
            Queue::LockFree(q) => q.pop(),
        }
    }
}

fn inc_index(index: usize, size: usize) -> usize {
    let next = index + 1;
    if next >= size {
        0
    } else {
        next
    }
}

// ---------------------------------------------------------------------
// Mutex mode
// ---------------------------------------------------------------------

/// Just the ring indices; the mutex below guards *these*, not the entry
/// slots themselves. Grounded on `vivid_queue.c`, whose `push`/`pop` also
/// only hold their lock across the index update, never across the caller's
/// subsequent use of the popped/peeked entry.
struct RingIndices {
    read: usize,
    write: usize,
}

pub(crate) struct MutexQueue {
    size: usize,
    entries: Box<[UnsafeCell<Option<Entry>>]>,
    indices: Mutex<RingIndices>,
}

// SAFETY: a slot is written only by the producer that reserved it under
// `indices`'s lock (see `push`), and read/cleared only by the single
// consumer via `with_front`/`pop`. The ring's fullness check keeps the
// producer's target slot (`write`) and the consumer's front slot (`read`)
// distinct whenever a front entry exists, so producer and consumer never
// touch the same slot concurrently.
unsafe impl Sync for MutexQueue {}

impl MutexQueue {
    fn new(size: usize) -> Self {
        let size = size + 1;
        Self {
            size,
            entries: (0..size).map(|_| UnsafeCell::new(None)).collect::<Vec<_>>().into_boxed_slice(),
            indices: Mutex::new(RingIndices { read: 0, write: 0 }),
        }
    }

    /// Locks only long enough to reserve and fill the slot at the old
    /// `write` index; never held across dispatch.
    fn push(&self, name: &'static str, param: Param) -> Result<(), QueueError> {
        let mut indices = self.indices.lock().unwrap();
        let new_write = inc_index(indices.write, self.size);
        if new_write == indices.read {
            tracing::error!(event = name, "queue full");
            return Err(QueueError::Full(param));
        }
        let write = indices.write;
        // SAFETY: slot `write` is free (not the consumer's front slot — see
        // the `Sync` impl's invariant) and no other producer can be writing
        // it concurrently, since `indices`'s lock is held.
        unsafe {
            *self.entries[write].get() = Some(Entry { name, param });
        }
        indices.write = new_write;
        Ok(())
    }

    fn is_empty(&self) -> bool {
        let indices = self.indices.lock().unwrap();
        indices.read == indices.write
    }

    /// Locks only to snapshot `read`/`write`; `f` (the dispatching walk)
    /// runs with the mutex released, matching `vivid_sm.c`'s
    /// `vivid_queue_front` discipline. This is what lets a producer thread's
    /// `queue_event` take only a brief critical section instead of blocking
    /// for the whole dispatch, and lets a handler enqueue onto its own
    /// chart (a self `ChartHandle`) without deadlocking on this same mutex.
    fn with_front<R>(&self, f: impl FnOnce(Option<(&'static str, &Param)>) -> R) -> R {
        let read = {
            let indices = self.indices.lock().unwrap();
            if indices.read == indices.write {
                return f(None);
            }
            indices.read
        };
        // SAFETY: see the `Sync` impl's invariant — the slot at `read` is
        // never written by a producer while it is the front entry.
        let entry = unsafe { &*self.entries[read].get() };
        let entry = entry.as_ref().expect("front slot populated");
        f(Some((entry.name, &entry.param)))
    }

    fn pop(&self) {
        let mut indices = self.indices.lock().unwrap();
        if indices.read == indices.write {
            return;
        }
        let read = indices.read;
        // SAFETY: only the single consumer ever touches the front slot.
        unsafe {
            *self.entries[read].get() = None; // drops the Param, running any Boxed destructor
        }
        indices.read = inc_index(read, self.size);
    }
}

// ---------------------------------------------------------------------
// Lock-free mode
// ---------------------------------------------------------------------

/// One ring slot. Producers and the single consumer never touch the same
/// slot's payload concurrently: a producer only writes a slot it alone
/// reserved via the `pending` CAS below, and only before publishing it by
/// flipping `ready`; the consumer only reads a slot once `read` has reached
/// it, which can only happen after that publish. This makes the `UnsafeCell`
/// access race-free without needing a per-slot lock.
struct Slot {
    payload: UnsafeCell<Option<Entry>>,
    ready: AtomicBool,
}

// SAFETY: see the protocol described on `Slot` and enforced by
// `LockFreeQueue::push`/`pop`.
unsafe impl Sync for Slot {}

pub(crate) struct LockFreeQueue {
    size: usize,
    slots: Box<[Slot]>,
    read: AtomicUsize,
    write: AtomicUsize,
    pending: AtomicUsize,
}

impl LockFreeQueue {
    fn new(size: usize) -> Self {
        let size = size + 1;
        let slots = (0..size)
            .map(|_| Slot {
                payload: UnsafeCell::new(None),
                ready: AtomicBool::new(false),
            })
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            size,
            slots,
            read: AtomicUsize::new(0),
            write: AtomicUsize::new(0),
            pending: AtomicUsize::new(0),
        }
    }

    fn push(&self, name: &'static str, param: Param) -> Result<(), QueueError> {
        // Reserve a slot by CAS-advancing `pending`.
        let mut index;
        loop {
            index = self.pending.load(Ordering::Acquire);
            let new_pending = inc_index(index, self.size);
            if new_pending == self.read.load(Ordering::Acquire) {
                tracing::error!(event = name, "queue full");
                return Err(QueueError::Full(param));
            }
            if self
                .pending
                .compare_exchange(index, new_pending, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                break;
            }
        }

        // SAFETY: this producer alone owns slot `index` between reserving it
        // above and setting `ready` below.
        let slot = &self.slots[index];
        unsafe {
            *slot.payload.get() = Some(Entry { name, param });
        }
        slot.ready.store(true, Ordering::Release);

        // Advance `write` over every contiguously-ready slot.
        let mut cursor = self.write.load(Ordering::Acquire);
        loop {
            let slot = &self.slots[cursor];
            if slot
                .ready
                .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                break;
            }
            cursor = inc_index(cursor, self.size);
            self.write.store(cursor, Ordering::Release);
        }
        Ok(())
    }

    fn is_empty(&self) -> bool {
        self.read.load(Ordering::Acquire) == self.write.load(Ordering::Acquire)
    }

    fn with_front<R>(&self, f: impl FnOnce(Option<(&'static str, &Param)>) -> R) -> R {
        let read = self.read.load(Ordering::Acquire);
        if read == self.write.load(Ordering::Acquire) {
            return f(None);
        }
        // SAFETY: the single consumer is the only reader/writer of a slot
        // once `read` has reached it and until `pop` advances `read` past it.
        let entry = unsafe { &*self.slots[read].payload.get() };
        let entry = entry.as_ref().expect("front slot populated");
        f(Some((entry.name, &entry.param)))
    }

    fn pop(&self) {
        let read = self.read.load(Ordering::Acquire);
        if read == self.write.load(Ordering::Acquire) {
            return;
        }
        // SAFETY: see `with_front`.
        unsafe {
            *self.slots[read].payload.get() = None;
        }
        self.read.store(inc_index(read, self.size), Ordering::Release);
    }
}
