//! One XID generation: a fixed slot array with multi-producer reserve
//! and commit, drained and paired by the event-loop side.
//!
//! Reservation is a bounded atomic cursor bump; the reserving producer
//! owns the slot payload until it commits. The slot state is the
//! publication point: the committing producer stores it with release
//! ordering after writing the payload, and the flusher acquires it
//! before reading, stalling at the first slot whose commit has not
//! landed. Everything past the flush cursor (pairing, implied
//! completion, failure) runs on the event-loop thread only.

use std::cell::UnsafeCell;
use std::fmt;

use tracing::debug;

use crate::entry::{EntryData, EntryState, ResponseTx};
use crate::error::ConnectionError;
use crate::frame::Frame;
use crate::sync::{AtomicU8, AtomicU32, Ordering};

struct Slot<M> {
    state: AtomicU8,
    data: UnsafeCell<EntryData<M>>,
}

impl<M> Slot<M> {
    fn new() -> Self {
        Self {
            state: AtomicU8::new(EntryState::Free as u8),
            data: UnsafeCell::new(EntryData::default()),
        }
    }

    fn state(&self, order: Ordering) -> EntryState {
        EntryState::from_u8(self.state.load(order))
    }
}

/// A single queue generation covering the contiguous XID range
/// `[base_xid, base_xid + capacity)`.
pub(crate) struct OutboundQueue<M> {
    base_xid: AtomicU32,
    capacity: u32,
    slots: Box<[Slot<M>]>,
    /// Next slot to hand out. Bounded CAS bump by producers.
    reserve_index: AtomicU32,
    /// Next slot the flush loop will emit. Event-loop writer only.
    /// The flusher stalls here until the slot's commit is published.
    flush_index: AtomicU32,
    /// Length of the contiguous completed prefix. Event-loop writer only.
    completed: AtomicU32,
}

// Safety: slot payload access follows the slot ownership protocol above;
// all cross-thread hand-offs go through the reserve/commit atomics.
unsafe impl<M: Send> Send for OutboundQueue<M> {}
unsafe impl<M: Send> Sync for OutboundQueue<M> {}

impl<M> OutboundQueue<M> {
    pub(crate) fn new(base_xid: u32, capacity: u32) -> Self {
        assert!(capacity >= 2);
        let slots = (0..capacity).map(|_| Slot::new()).collect::<Vec<_>>();
        Self {
            base_xid: AtomicU32::new(base_xid),
            capacity,
            slots: slots.into_boxed_slice(),
            reserve_index: AtomicU32::new(0),
            flush_index: AtomicU32::new(0),
            completed: AtomicU32::new(0),
        }
    }

    /// Reset all cursors and slots for a new XID range, without
    /// reallocating the slot array. Event-loop only; the generation must
    /// be finished.
    pub(crate) fn reuse(&self, base_xid: u32) {
        debug_assert!(self.is_finished());

        for slot in &self.slots {
            // Safety: a finished generation has no producer activity; the
            // event loop is the sole owner of every slot.
            unsafe { (*slot.data.get()).reset() };
            slot.state.store(EntryState::Free as u8, Ordering::Release);
        }
        self.completed.store(0, Ordering::Relaxed);
        self.flush_index.store(0, Ordering::Relaxed);
        self.base_xid.store(base_xid, Ordering::Relaxed);
        self.reserve_index.store(0, Ordering::Release);
    }

    pub(crate) fn base_xid(&self) -> u32 {
        self.base_xid.load(Ordering::Relaxed)
    }

    /// Reserve the next slot, returning its XID. Non-barrier
    /// reservations stop one slot short of capacity; the trailing slot
    /// is held back for a barrier.
    pub(crate) fn reserve_entry(&self, barrier: bool) -> Option<u32> {
        let limit = if barrier {
            self.capacity
        } else {
            self.capacity - 1
        };

        let mut index = self.reserve_index.load(Ordering::Relaxed);
        loop {
            if index >= limit {
                debug!(base_xid = self.base_xid(), barrier, "queue is full");
                return None;
            }
            match self.reserve_index.compare_exchange_weak(
                index,
                index + 1,
                Ordering::AcqRel,
                Ordering::Relaxed,
            ) {
                Ok(_) => break,
                Err(current) => index = current,
            }
        }

        let slot = &self.slots[index as usize];
        // Safety: the CAS above granted this thread exclusive ownership
        // of the slot payload until commit.
        unsafe { (*slot.data.get()).set_barrier(barrier) };
        if self
            .slot_cas(index, EntryState::Free, EntryState::Reserved)
            .is_err()
        {
            // Shutdown already failed this slot.
            debug!(index, "reservation raced shutdown");
            return None;
        }

        Some(self.base_xid().wrapping_add(index))
    }

    /// Commit a reserved entry, making it visible to the flush loop.
    /// Returns `false` when the generation was shut down underneath the
    /// producer; the completion is dropped, which cancels the caller's
    /// receiver.
    pub(crate) fn commit_entry(
        &self,
        xid: u32,
        request: M,
        completion: Option<ResponseTx<M>>,
    ) -> bool {
        let index = xid.wrapping_sub(self.base_xid());
        assert!(index < self.capacity, "xid {xid} outside this generation");
        let slot = &self.slots[index as usize];

        // Safety: between reservation and commit the payload belongs to
        // the committing producer. If the CAS below loses to a shutdown,
        // the payload is dropped with the generation, never read.
        unsafe { (*slot.data.get()).commit(request, completion) };

        match slot.state.compare_exchange(
            EntryState::Reserved as u8,
            EntryState::Committed as u8,
            Ordering::AcqRel,
            Ordering::Acquire,
        ) {
            Ok(_) => true,
            Err(state) => {
                debug_assert_eq!(EntryState::from_u8(state), EntryState::Completed);
                debug!(xid, "commit raced shutdown, dropping entry");
                false
            }
        }
    }

    /// Take the next committed request for writing. Event-loop only.
    /// Returns `None` when the generation is drained or the next slot's
    /// commit has not been published yet; flushing resumes at the gap
    /// once the committing producer catches up.
    pub(crate) fn flush_entry(&self) -> Option<M> {
        let flush = self.flush_index.load(Ordering::Relaxed);
        if flush == self.capacity {
            return None;
        }

        let slot = &self.slots[flush as usize];
        if slot.state(Ordering::Acquire) != EntryState::Committed {
            return None;
        }

        // Safety: the acquire load of the slot state above makes the
        // producer's payload write visible; from here the event loop owns
        // the slot.
        let request = unsafe { (*slot.data.get()).take_request() };
        debug_assert!(request.is_some());
        slot.state
            .store(EntryState::Flushed as u8, Ordering::Release);
        self.flush_index.store(flush + 1, Ordering::Release);

        request
    }

    /// No committed entries are waiting to be flushed.
    pub(crate) fn is_empty(&self) -> bool {
        let flush = self.flush_index.load(Ordering::Relaxed);
        flush == self.capacity
            || self.slots[flush as usize].state(Ordering::Acquire) != EntryState::Committed
    }

    /// Every slot has been emitted; the generation can no longer be the
    /// reservation target.
    pub(crate) fn is_flushed(&self) -> bool {
        self.flush_index.load(Ordering::Relaxed) == self.capacity
    }

    /// Every slot was emitted and every reserved entry completed; the
    /// generation can be retired. A generation still accepting
    /// reservations is never finished, even with nothing outstanding.
    pub(crate) fn is_finished(&self) -> bool {
        self.is_flushed()
            && self.completed.load(Ordering::Relaxed) == self.reserve_index.load(Ordering::Acquire)
    }

    /// Complete every still-flushed slot with implied success. Used when
    /// a barrier in a later generation acknowledged everything here.
    /// Event-loop only.
    pub(crate) fn complete_all(&self) {
        let reserve = self.reserve_index.load(Ordering::Acquire);
        let completed = self.completed.load(Ordering::Relaxed);

        for index in completed..reserve {
            let slot = &self.slots[index as usize];
            if slot.state(Ordering::Acquire) == EntryState::Flushed {
                // Safety: flushed slots belong to the event loop.
                unsafe { (*slot.data.get()).complete_implied() };
                slot.state
                    .store(EntryState::Completed as u8, Ordering::Release);
            }
        }
        self.completed.store(reserve, Ordering::Relaxed);
    }

    /// Fail every slot that has not completed, in XID order. Returns the
    /// number of entries failed. Event-loop only.
    pub(crate) fn fail_all(&self, cause: impl Fn() -> ConnectionError) -> u32 {
        let reserve = self.reserve_index.load(Ordering::Acquire);
        let completed = self.completed.load(Ordering::Relaxed);
        let mut failed = 0;

        for index in completed..reserve {
            let slot = &self.slots[index as usize];
            let mut state = slot.state(Ordering::Acquire);
            loop {
                match state {
                    EntryState::Completed => break,
                    EntryState::Committed | EntryState::Flushed => {
                        // Safety: the committed payload is published and
                        // the event loop owns it.
                        unsafe { (*slot.data.get()).fail(cause()) };
                        slot.state
                            .store(EntryState::Completed as u8, Ordering::Release);
                        failed += 1;
                        break;
                    }
                    // Free covers a producer that bumped the reserve
                    // cursor but has not published its slot yet. Race it
                    // for the slot; losing means the slot just advanced
                    // and we retry against the new state.
                    EntryState::Free | EntryState::Reserved => {
                        match self.slot_cas(index, state, EntryState::Completed) {
                            Ok(()) => {
                                failed += 1;
                                break;
                            }
                            Err(current) => state = EntryState::from_u8(current),
                        }
                    }
                }
            }
        }
        self.completed.store(reserve, Ordering::Relaxed);

        failed
    }

    fn slot_cas(&self, index: u32, from: EntryState, to: EntryState) -> Result<(), u8> {
        self.slots[index as usize]
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .map(|_| ())
            .map_err(|state| state)
    }
}

impl<M: Frame> OutboundQueue<M> {
    /// Pair an incoming response to its flushed entry by XID. On a
    /// match, delivers the completion and returns whether the entry was
    /// a barrier; a matched barrier first closes every preceding
    /// outstanding entry with implied success. Returns the response
    /// unconsumed when it does not belong to this generation. Event-loop
    /// only.
    pub(crate) fn pair_request(&self, response: M) -> Result<bool, M> {
        let index = response.xid().wrapping_sub(self.base_xid());
        let completed = self.completed.load(Ordering::Relaxed);
        let flush = self.flush_index.load(Ordering::Relaxed);
        if index < completed || index >= flush {
            return Err(response);
        }

        let slot = &self.slots[index as usize];
        if slot.state(Ordering::Acquire) != EntryState::Flushed {
            // Already completed out of order; a duplicate response.
            return Err(response);
        }

        // Safety: flushed slots belong to the event loop.
        let barrier = unsafe { (*slot.data.get()).is_barrier() };
        if barrier {
            // A barrier acknowledgement means the switch has processed
            // every earlier request in this generation.
            for preceding in completed..index {
                let slot = &self.slots[preceding as usize];
                if slot.state(Ordering::Acquire) == EntryState::Flushed {
                    unsafe { (*slot.data.get()).complete_implied() };
                    slot.state
                        .store(EntryState::Completed as u8, Ordering::Release);
                }
            }
        }

        unsafe { (*slot.data.get()).complete(response) };
        slot.state
            .store(EntryState::Completed as u8, Ordering::Release);

        // Advance over the contiguous completed prefix; out-of-order
        // completions beyond it are recorded in place.
        let mut head = completed;
        while head < flush
            && self.slots[head as usize].state(Ordering::Relaxed) == EntryState::Completed
        {
            head += 1;
        }
        self.completed.store(head, Ordering::Relaxed);

        Ok(barrier)
    }
}

impl<M> fmt::Debug for OutboundQueue<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OutboundQueue")
            .field("base_xid", &self.base_xid())
            .field("capacity", &self.capacity)
            .field("reserve", &self.reserve_index.load(Ordering::Relaxed))
            .field("flush", &self.flush_index.load(Ordering::Relaxed))
            .field("completed", &self.completed.load(Ordering::Relaxed))
            .finish()
    }
}
